//! Interceptor
//!
//! Runs a stdio server as a subprocess and relays traffic between it and the
//! caller, tracing every line to stderr.

use std::ffi::OsString;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::info;

use interceptor::{ServerCommand, StderrSink, Supervisor, SupervisorConfig};
use interceptor_core::DecodePolicy;

#[derive(Parser, Debug)]
#[command(name = "interceptor")]
#[command(
    version,
    about = "Intercept and log stdio communication with a server subprocess"
)]
struct Args {
    /// Milliseconds between server liveness checks.
    #[arg(long, default_value_t = 100, env = "INTERCEPTOR_POLL_INTERVAL_MS")]
    poll_interval_ms: u64,

    /// Seconds to wait for graceful server shutdown before SIGKILL.
    #[arg(long, default_value_t = 5, env = "INTERCEPTOR_TERMINATE_TIMEOUT")]
    terminate_timeout: u64,

    /// Milliseconds to wait for remaining server output after it exits.
    #[arg(long, default_value_t = 1000, env = "INTERCEPTOR_DRAIN_TIMEOUT_MS")]
    drain_timeout_ms: u64,

    /// How lines are decoded for the trace ("lossy" or "strict").
    /// Strict logs undecodable lines as binary data.
    #[arg(long, default_value = "lossy", env = "INTERCEPTOR_DECODE")]
    decode: DecodePolicy,

    /// Log level filter for operational logs (e.g. "warn", "info", "debug").
    #[arg(long, default_value = "warn", env = "INTERCEPTOR_LOG_LEVEL")]
    log_level: String,

    /// Output operational logs as JSON.
    #[arg(long, env = "INTERCEPTOR_LOG_JSON")]
    log_json: bool,

    /// Command to run the server (e.g. `python3 ./server.py --stdio`).
    #[arg(
        required = true,
        num_args = 1..,
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    server_command: Vec<OsString>,
}

impl Args {
    fn supervisor_config(&self) -> SupervisorConfig {
        SupervisorConfig {
            poll_interval: Duration::from_millis(self.poll_interval_ms.max(1)),
            terminate_timeout: Duration::from_secs(self.terminate_timeout),
            drain_timeout: Duration::from_millis(self.drain_timeout_ms),
            decode_policy: self.decode,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_filter = format!("interceptor={}", args.log_level);
    interceptor_core::tracing_init::init_tracing(&log_filter, args.log_json);

    let command = ServerCommand::new(args.server_command.iter().cloned())?;
    let config = args.supervisor_config();
    info!(
        version = env!("CARGO_PKG_VERSION"),
        command = %command,
        ?config,
        "Starting interceptor"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let result = runtime.block_on(async {
        Supervisor::new(config, Arc::new(StderrSink))
            .run(&command)
            .await
    });
    // The client-to-server relay may still be blocked reading stdin; do not
    // wait for it.
    runtime.shutdown_background();

    let report = result?;
    std::process::exit(report.exit_code());
}
