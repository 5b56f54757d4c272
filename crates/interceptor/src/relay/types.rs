//! Relay module types.

use std::fmt;

use interceptor_core::{DecodePolicy, StreamMode};

/// Which way a relay carries traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Label {
    /// Parent stdin to server stdin.
    ClientToServer,
    /// Server stdout to parent stdout.
    ServerToClient,
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ClientToServer => f.write_str("CLIENT_TO_SERVER"),
            Self::ServerToClient => f.write_str("SERVER_TO_CLIENT"),
        }
    }
}

/// Everything one relay loop needs. Consumed when the loop starts.
#[derive(Debug)]
pub struct RelayDirection<R, W> {
    pub source: R,
    pub destination: W,
    pub label: Label,
    /// Representation the destination expects.
    pub mode: StreamMode,
    /// Decoding used for trace previews.
    pub policy: DecodePolicy,
}

impl<R, W> RelayDirection<R, W> {
    pub const fn new(source: R, destination: W, label: Label, mode: StreamMode) -> Self {
        Self {
            source,
            destination,
            label,
            mode,
            policy: DecodePolicy::Lossy,
        }
    }

    #[must_use]
    pub fn with_policy(mut self, policy: DecodePolicy) -> Self {
        self.policy = policy;
        self
    }
}

/// Why a relay loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayExit {
    /// Source reached end-of-stream.
    EndOfStream,
    /// Writing or flushing the destination failed.
    PipeBroken,
    /// Reading the source failed.
    Failed,
}

/// Errors that terminate a relay loop.
///
/// The `Display` form is the suffix of the trace line written for it.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Pipe broken - {0}")]
    Write(#[source] std::io::Error),

    #[error("Error - {0}")]
    Read(#[source] std::io::Error),
}

impl RelayError {
    pub const fn exit(&self) -> RelayExit {
        match self {
            Self::Write(_) => RelayExit::PipeBroken,
            Self::Read(_) => RelayExit::Failed,
        }
    }
}
