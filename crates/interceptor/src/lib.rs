//! Interceptor Library
//!
//! Sits between a client and a server subprocess speaking over stdio:
//! - Subprocess management for the server
//! - Line relays in both directions, tracing every line
//! - Diagnostic sinks for the intercept trace
//! - Supervisor tying spawn, relays and teardown together

pub mod relay;
pub mod sink;
pub mod subprocess;
pub mod supervisor;

pub use sink::{DiagnosticSink, MemorySink, StderrSink};
pub use subprocess::{ServerCommand, SubprocessError};
pub use supervisor::{Supervisor, SupervisorConfig, SupervisorReport};
