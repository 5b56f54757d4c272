//! Interceptor supervisor: spawns the server, wires both relays, and owns
//! the child until it is reaped.

use std::future::Future;
use std::process::ExitStatus;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncWrite, BufReader};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use interceptor_core::{DecodePolicy, StreamMode};

use crate::relay::{self, Label, RelayDirection, RelayExit};
use crate::sink::DiagnosticSink;
use crate::subprocess::{ServerCommand, ServerProcess, SubprocessError};

pub const STARTING: &str = "Starting interceptor...";
pub const SHUTTING_DOWN: &str = "Interceptor shutting down...";
pub const FINISHED: &str = "Interceptor finished.";

/// Floor for [`SupervisorConfig::poll_interval`]; a zero period is rejected by
/// the tokio timer.
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Supervisor tuning.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Period between child liveness checks.
    pub poll_interval: Duration,
    /// Grace period between SIGTERM and SIGKILL.
    pub terminate_timeout: Duration,
    /// Upper bound on waiting for server output after the child exits.
    pub drain_timeout: Duration,
    /// Decoding used for trace previews in both directions.
    pub decode_policy: DecodePolicy,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            terminate_timeout: Duration::from_secs(5),
            drain_timeout: Duration::from_secs(1),
            decode_policy: DecodePolicy::Lossy,
        }
    }
}

/// Outcome of a supervised run.
#[derive(Debug, Clone, Copy)]
pub struct SupervisorReport {
    /// Exit status of the reaped server.
    pub status: ExitStatus,
    /// Whether shutdown was triggered by a signal rather than child exit.
    pub interrupted: bool,
}

impl SupervisorReport {
    /// Process exit code to propagate.
    ///
    /// An interrupted session is a normal shutdown and yields 0, whatever the
    /// terminated child reported. Otherwise: the child's code, `128 + signal`
    /// for signal deaths on unix, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        if self.interrupted {
            return 0;
        }
        if let Some(code) = self.status.code() {
            return code;
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(signal) = self.status.signal() {
                return 128 + signal;
            }
        }
        1
    }
}

/// Runs one interceptor session.
pub struct Supervisor {
    config: SupervisorConfig,
    sink: Arc<dyn DiagnosticSink>,
}

impl Supervisor {
    pub fn new(mut config: SupervisorConfig, sink: Arc<dyn DiagnosticSink>) -> Self {
        config.poll_interval = config.poll_interval.max(MIN_POLL_INTERVAL);
        Self { config, sink }
    }

    /// Intercept `command` using this process's stdin/stdout, shutting down
    /// on Ctrl+C or SIGTERM.
    pub async fn run(
        &self,
        command: &ServerCommand,
    ) -> Result<SupervisorReport, SubprocessError> {
        self.run_with(
            command,
            BufReader::new(tokio::io::stdin()),
            tokio::io::stdout(),
            shutdown_signal(),
        )
        .await
    }

    /// Intercept `command` between the given client streams.
    ///
    /// `shutdown` resolving is treated as an external interrupt. Once the
    /// server has been spawned, it is always terminated and reaped before
    /// this returns.
    pub async fn run_with<I, O, F>(
        &self,
        command: &ServerCommand,
        client_in: I,
        client_out: O,
        shutdown: F,
    ) -> Result<SupervisorReport, SubprocessError>
    where
        I: AsyncBufRead + Unpin + Send + 'static,
        O: AsyncWrite + Unpin + Send + 'static,
        F: Future<Output = ()>,
    {
        self.sink.write_line(STARTING);
        let mut process = ServerProcess::spawn(command, self.config.terminate_timeout)?;

        let supervised = self
            .supervise(&mut process, client_in, client_out, shutdown)
            .await;
        let terminated = process.terminate().await;
        self.sink.write_line(FINISHED);

        let interrupted = supervised?;
        let status = terminated?;
        info!(?status, interrupted, "Interceptor session complete");
        Ok(SupervisorReport {
            status,
            interrupted,
        })
    }

    /// Start both relays and wait for child exit or shutdown. Returns whether
    /// shutdown was requested.
    async fn supervise<I, O, F>(
        &self,
        process: &mut ServerProcess,
        client_in: I,
        client_out: O,
        shutdown: F,
    ) -> Result<bool, SubprocessError>
    where
        I: AsyncBufRead + Unpin + Send + 'static,
        O: AsyncWrite + Unpin + Send + 'static,
        F: Future<Output = ()>,
    {
        let server_in = process.take_stdin()?;
        let server_out = process.take_stdout()?;
        let policy = self.config.decode_policy;

        // Detached: may stay blocked on the parent's stdin until process exit.
        drop(relay::spawn_relay(
            RelayDirection::new(
                client_in,
                server_in,
                Label::ClientToServer,
                StreamMode::Binary,
            )
            .with_policy(policy),
            Arc::clone(&self.sink),
        ));
        let server_to_client = relay::spawn_relay(
            RelayDirection::new(
                BufReader::new(server_out),
                client_out,
                Label::ServerToClient,
                StreamMode::Text,
            )
            .with_policy(policy),
            Arc::clone(&self.sink),
        );

        tokio::pin!(shutdown);
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = &mut shutdown => {
                    self.sink.write_line(SHUTTING_DOWN);
                    return Ok(true);
                }
                _ = ticker.tick() => {
                    if let Some(status) = process.try_wait()? {
                        info!(?status, "Server exited");
                        self.drain(server_to_client).await;
                        return Ok(false);
                    }
                }
            }
        }
    }

    /// Give the server→client relay a bounded chance to forward output the
    /// server wrote just before exiting.
    async fn drain(&self, handle: JoinHandle<RelayExit>) {
        match tokio::time::timeout(self.config.drain_timeout, handle).await {
            Ok(Ok(exit)) => debug!(?exit, "Server output drained"),
            Ok(Err(e)) => warn!(error = %e, "Server-to-client relay task failed"),
            Err(_) => debug!(
                timeout = ?self.config.drain_timeout,
                "Server output still open after exit, leaving relay detached"
            ),
        }
    }
}

/// Resolves on Ctrl+C, or SIGTERM on unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C shutdown signal"),
        () = terminate => info!("Received SIGTERM shutdown signal"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config = SupervisorConfig::default();
        assert_eq!(config.poll_interval, Duration::from_millis(100));
        assert_eq!(config.terminate_timeout, Duration::from_secs(5));
        assert_eq!(config.decode_policy, DecodePolicy::Lossy);
    }

    #[cfg(unix)]
    #[test]
    fn exit_code_propagates_child_code_and_signal() {
        use std::os::unix::process::ExitStatusExt;

        let exited = SupervisorReport {
            status: ExitStatus::from_raw(3 << 8),
            interrupted: false,
        };
        assert_eq!(exited.exit_code(), 3);

        let killed = SupervisorReport {
            status: ExitStatus::from_raw(libc::SIGKILL),
            interrupted: false,
        };
        assert_eq!(killed.exit_code(), 128 + libc::SIGKILL);
    }

    #[cfg(unix)]
    #[test]
    fn interrupted_session_exits_cleanly() {
        use std::os::unix::process::ExitStatusExt;

        // Child died from the SIGTERM sent during our own shutdown.
        let terminated = SupervisorReport {
            status: ExitStatus::from_raw(libc::SIGTERM),
            interrupted: true,
        };
        assert_eq!(terminated.exit_code(), 0);

        let nonzero = SupervisorReport {
            status: ExitStatus::from_raw(2 << 8),
            interrupted: true,
        };
        assert_eq!(nonzero.exit_code(), 0);
    }

    #[test]
    fn zero_poll_interval_is_clamped() {
        let config = SupervisorConfig {
            poll_interval: Duration::ZERO,
            ..SupervisorConfig::default()
        };
        let supervisor = Supervisor::new(config, Arc::new(crate::sink::MemorySink::new()));
        assert_eq!(supervisor.config.poll_interval, MIN_POLL_INTERVAL);
    }
}
