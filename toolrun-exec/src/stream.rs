use std::io::ErrorKind;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tracing::debug;

use crate::completion::CompletionSignal;
use crate::sink::OutputSink;

const READ_CHUNK_SIZE: usize = 8_192;

/// Which child stream a reader is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

/// Read `reader` to EOF, forwarding every chunk to `sink` in arrival order
/// unless `silent`. The first non-empty stderr chunk is reported to the
/// completion state machine.
pub async fn forward_stream<R>(
    mut reader: R,
    kind: StreamKind,
    sink: Arc<dyn OutputSink>,
    silent: bool,
    signals: mpsc::UnboundedSender<CompletionSignal>,
) where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; READ_CHUNK_SIZE];
    let mut reported_stderr = false;
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                let Some(chunk) = buf.get(..n) else {
                    break;
                };
                if kind == StreamKind::Stderr && !reported_stderr {
                    reported_stderr = true;
                    if signals.send(CompletionSignal::StderrWritten).is_err() {
                        debug!("completion already settled; stderr signal dropped");
                    }
                }
                if !silent {
                    if let Err(err) = sink.write_chunk(chunk) {
                        debug!(?kind, error = %err, "failed to forward output chunk");
                    }
                }
            }
            Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(err) => {
                debug!(?kind, error = %err, "stream read failed");
                break;
            }
        }
    }
}
