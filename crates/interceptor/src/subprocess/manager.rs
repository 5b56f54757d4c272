//! Server subprocess lifecycle.
//!
//! Spawns the server with piped stdin/stdout and inherited stderr, and tears
//! it down gracefully (SIGTERM, then SIGKILL after a timeout).

use std::ffi::{OsStr, OsString};
use std::fmt;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, info, warn};

/// Program and arguments of the server to intercept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerCommand {
    program: OsString,
    args: Vec<OsString>,
}

impl ServerCommand {
    /// Build from an argv-style list; the first element is the program.
    pub fn new<I, S>(argv: I) -> Result<Self, SubprocessError>
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        let mut argv = argv.into_iter().map(Into::into);
        let program = argv
            .next()
            .filter(|p| !p.is_empty())
            .ok_or(SubprocessError::EmptyCommand)?;
        Ok(Self {
            program,
            args: argv.collect(),
        })
    }

    pub fn program(&self) -> &OsStr {
        &self.program
    }

    pub fn args(&self) -> &[OsString] {
        &self.args
    }

    fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        cmd
    }
}

impl fmt::Display for ServerCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.to_string_lossy())?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}

/// A running server process. Owned by exactly one supervisor.
#[derive(Debug)]
pub struct ServerProcess {
    child: Child,
    /// Timeout for graceful termination before SIGKILL.
    terminate_timeout: Duration,
}

impl ServerProcess {
    /// Spawn `command` with piped stdin/stdout and inherited stderr.
    pub fn spawn(
        command: &ServerCommand,
        terminate_timeout: Duration,
    ) -> Result<Self, SubprocessError> {
        info!(command = %command, "Spawning server subprocess");
        let child = command
            .to_command()
            .spawn()
            .map_err(|source| SubprocessError::SpawnFailed {
                program: command.program.to_string_lossy().into_owned(),
                source,
            })?;
        debug!(pid = ?child.id(), "Server subprocess started");
        Ok(Self {
            child,
            terminate_timeout,
        })
    }

    /// Take the server's stdin. Succeeds once.
    pub fn take_stdin(&mut self) -> Result<ChildStdin, SubprocessError> {
        self.child
            .stdin
            .take()
            .ok_or(SubprocessError::MissingPipe { stream: "stdin" })
    }

    /// Take the server's stdout. Succeeds once.
    pub fn take_stdout(&mut self) -> Result<ChildStdout, SubprocessError> {
        self.child
            .stdout
            .take()
            .ok_or(SubprocessError::MissingPipe { stream: "stdout" })
    }

    /// OS process id, `None` once the process has been reaped.
    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    /// Non-blocking liveness check. Reaps the process if it has exited.
    pub fn try_wait(&mut self) -> Result<Option<ExitStatus>, SubprocessError> {
        self.child.try_wait().map_err(SubprocessError::Wait)
    }

    /// Terminate the process if still running and reap it.
    ///
    /// Returns immediately with the exit status if the process already exited.
    pub async fn terminate(&mut self) -> Result<ExitStatus, SubprocessError> {
        if let Some(status) = self.try_wait()? {
            debug!(?status, "Server already exited");
            return Ok(status);
        }

        debug!(pid = ?self.child.id(), "Terminating server subprocess");

        #[cfg(unix)]
        {
            if let Some(pid) = self.child.id() {
                // SAFETY: pid is a valid process ID obtained from our own Child handle,
                // which has not been reaped yet (try_wait above returned None).
                #[allow(unsafe_code)]
                #[allow(clippy::cast_possible_wrap)]
                let ret = unsafe { libc::kill(pid as i32, libc::SIGTERM) };
                if ret != 0 {
                    let err = std::io::Error::last_os_error();
                    warn!(pid, error = %err, "Failed to send SIGTERM");
                }
            }
        }
        #[cfg(not(unix))]
        {
            self.child.start_kill().map_err(SubprocessError::Wait)?;
        }

        match tokio::time::timeout(self.terminate_timeout, self.child.wait()).await {
            Ok(Ok(status)) => {
                info!(?status, "Server exited after termination request");
                Ok(status)
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Error waiting for server, killing");
                self.force_kill().await
            }
            Err(_) => {
                warn!("Timeout waiting for graceful shutdown, killing");
                self.force_kill().await
            }
        }
    }

    async fn force_kill(&mut self) -> Result<ExitStatus, SubprocessError> {
        if let Err(e) = self.child.kill().await {
            warn!(error = %e, "Failed to kill server");
        }
        self.child.wait().await.map_err(SubprocessError::Wait)
    }
}

/// Errors from subprocess operations.
#[derive(Debug, thiserror::Error)]
pub enum SubprocessError {
    #[error("Server command is empty")]
    EmptyCommand,

    #[error("Failed to spawn server '{program}': {source}")]
    SpawnFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to capture server {stream}")]
    MissingPipe { stream: &'static str },

    #[error("Failed to wait for server: {0}")]
    Wait(#[source] std::io::Error),
}
