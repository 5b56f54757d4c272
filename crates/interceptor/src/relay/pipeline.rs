//! Line relay loop.
//!
//! Data flow for one direction:
//! ```text
//! source ──read_until('\n')──▶ preview ──▶ sink ("INTERCEPT <label>: ...")
//!                             └─▶ convert(mode) ──▶ destination (write + flush)
//! ```

use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use interceptor_core::{DecodePolicy, StreamMode, line};

use super::types::{Label, RelayDirection, RelayError, RelayExit};
use crate::sink::DiagnosticSink;

const LINE_CAPACITY: usize = 4096;

/// Pump lines from `direction.source` to `direction.destination` until the
/// source ends or a stream fails.
///
/// Failures are written to `sink` and never returned. The destination is shut
/// down on exit so the peer sees end-of-file.
pub async fn run<R, W>(direction: RelayDirection<R, W>, sink: &dyn DiagnosticSink) -> RelayExit
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let RelayDirection {
        mut source,
        mut destination,
        label,
        mode,
        policy,
    } = direction;

    let exit = match pump(&mut source, &mut destination, label, mode, policy, sink).await {
        Ok(()) => RelayExit::EndOfStream,
        Err(e) => {
            sink.write_line(&format!("INTERCEPT {label}: {e}"));
            e.exit()
        }
    };

    if let Err(e) = destination.shutdown().await {
        debug!(%label, error = %e, "Destination shutdown failed");
    }
    exit
}

/// Run a relay as a detached background task.
///
/// Dropping the returned handle does not stop the relay.
pub fn spawn_relay<R, W>(
    direction: RelayDirection<R, W>,
    sink: Arc<dyn DiagnosticSink>,
) -> JoinHandle<RelayExit>
where
    R: AsyncBufRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let label = direction.label;
        debug!(%label, mode = ?direction.mode, "Relay started");
        let exit = run(direction, sink.as_ref()).await;
        info!(%label, ?exit, "Relay finished");
        exit
    })
}

async fn pump<R, W>(
    source: &mut R,
    destination: &mut W,
    label: Label,
    mode: StreamMode,
    policy: DecodePolicy,
    sink: &dyn DiagnosticSink,
) -> Result<(), RelayError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = Vec::with_capacity(LINE_CAPACITY);
    loop {
        buf.clear();
        let n = source
            .read_until(b'\n', &mut buf)
            .await
            .map_err(RelayError::Read)?;
        if n == 0 {
            return Ok(());
        }

        sink.write_line(&format!(
            "INTERCEPT {label}: {}",
            line::preview(&buf, policy)
        ));

        let out = line::convert(&buf, mode);
        destination
            .write_all(&out)
            .await
            .map_err(RelayError::Write)?;
        destination.flush().await.map_err(RelayError::Write)?;
    }
}
