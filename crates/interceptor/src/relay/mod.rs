//! Relay module: line-granular pumps between a client and the server process.
//!
//! Two relays run per interceptor session:
//! - `CLIENT_TO_SERVER`: parent stdin → server stdin (raw bytes)
//! - `SERVER_TO_CLIENT`: server stdout → parent stdout (text)

mod pipeline;
mod types;

pub use pipeline::{run, spawn_relay};
pub use types::*;
