//! Subprocess management for the intercepted server.

pub mod manager;

pub use manager::{ServerCommand, ServerProcess, SubprocessError};
