//! Interceptor Core Library
//!
//! Shared functionality for the stdio interceptor:
//! - Line codec (trace previews and destination conversion)
//! - Tracing initialisation
//! - Common error types

pub mod error;
pub mod line;
pub mod tracing_init;

pub use error::{Error, Result};
pub use line::{DecodePolicy, LinePreview, StreamMode};
