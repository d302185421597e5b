// Streaming download: fixed-size chunks pumped from a background task
//
// The pump task owns the session and the remote handle. Whatever ends the
// stream (last byte, read failure, deadline, consumer gone), the handle is
// closed first, then the session, then the error (if any) is sent.

use crate::errors::TransferError;
use crate::models::TransportConfig;
use crate::sftp::{open_session, Connector, RemoteFile, SupervisedSession};
use crate::telemetry;
use crate::transfer::buffered::close_file;
use crate::transfer::{within, DownloadMode, RemoteFilePayload, TransferLimits};
use std::cmp::min;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, instrument, warn};

type ChunkSender = mpsc::Sender<Result<Vec<u8>, TransferError>>;

/// How the pump stopped without error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PumpEnd {
    Complete { bytes: u64 },
    ConsumerGone { bytes: u64 },
}

/// Open `path` and return its content as a lazy chunk stream
///
/// Fails before emitting anything when the file cannot be opened or its
/// declared size exceeds the ceiling. Never retried: bytes already delivered
/// downstream cannot be taken back.
#[instrument(skip(connector, config, limits))]
pub async fn download_streaming(
    connector: &dyn Connector,
    config: &TransportConfig,
    path: &str,
    limits: &TransferLimits,
) -> Result<RemoteFilePayload, TransferError> {
    let started = Instant::now();
    let deadline = started + limits.operation_timeout;

    let mut session = within(
        deadline,
        "download",
        limits.operation_timeout,
        open_session(connector, config, limits.connect_timeout),
    )
    .await?;

    let opened = within(
        deadline,
        "download",
        limits.operation_timeout,
        open_checked(&mut session, path, limits),
    )
    .await;

    let (file, total_size) = match opened {
        Ok(opened) => opened,
        Err(e) => {
            session.fail().await;
            return Err(e);
        }
    };

    info!(remote_path = %path, size = ?total_size, "Starting streaming download");

    let (tx, rx) = mpsc::channel(limits.stream_buffer.max(1));
    tokio::spawn(pump(
        session,
        file,
        path.to_string(),
        total_size,
        limits.clone(),
        started,
        deadline,
        tx,
    ));

    Ok(RemoteFilePayload::Streamed {
        total_size,
        chunks: Box::pin(ReceiverStream::new(rx)),
    })
}

async fn open_checked(
    session: &mut SupervisedSession,
    path: &str,
    limits: &TransferLimits,
) -> Result<(Box<dyn RemoteFile>, Option<u64>), TransferError> {
    let mut file = session.session()?.open(path).await?;

    let checked = match file.fstat().await {
        Ok(stat) if stat.is_directory => {
            Err(TransferError::NotFound(format!("{} is a directory", path)))
        }
        Ok(stat) => match stat.size {
            Some(size) => limits.check_ceiling(size).map(|_| Some(size)),
            None => Ok(None),
        },
        Err(e) => Err(e),
    };

    match checked {
        Ok(size) => Ok((file, size)),
        Err(e) => {
            close_file(file.as_mut(), path).await;
            Err(e)
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn pump(
    mut session: SupervisedSession,
    mut file: Box<dyn RemoteFile>,
    path: String,
    declared: Option<u64>,
    limits: TransferLimits,
    started: Instant,
    deadline: Instant,
    tx: ChunkSender,
) {
    let outcome = within(
        deadline,
        "download",
        limits.operation_timeout,
        send_chunks(file.as_mut(), &path, declared, &limits, &tx),
    )
    .await;

    close_file(file.as_mut(), &path).await;
    match outcome {
        Ok(_) => {
            if let Err(e) = session.close().await {
                warn!(remote_path = %path, error = %e, "Session close failed after streaming");
            }
        }
        Err(_) => session.fail().await,
    }

    let elapsed = started.elapsed().as_secs_f64();
    match outcome {
        Ok(PumpEnd::Complete { bytes }) => {
            info!(remote_path = %path, bytes, elapsed_secs = elapsed, "Streaming download complete");
            telemetry::record_download(DownloadMode::Streaming.as_str(), bytes);
            telemetry::record_transfer_duration("download_streaming", elapsed);
        }
        Ok(PumpEnd::ConsumerGone { bytes }) => {
            info!(remote_path = %path, bytes, "Consumer went away, streaming stopped");
        }
        Err(error) => {
            warn!(remote_path = %path, error = %error, "Streaming download aborted");
            telemetry::record_transfer_failure("download_streaming", error.kind().as_str());
            // Ignored when the consumer is already gone
            let _ = tx.send(Err(error)).await;
        }
    }
}

async fn send_chunks(
    file: &mut dyn RemoteFile,
    path: &str,
    declared: Option<u64>,
    limits: &TransferLimits,
    tx: &ChunkSender,
) -> Result<PumpEnd, TransferError> {
    let mut offset = 0u64;

    loop {
        let want = match declared {
            Some(size) if offset >= size => break,
            Some(size) => min(limits.chunk_size as u64, size - offset) as usize,
            None => limits.chunk_size,
        };

        let chunk = match tokio::time::timeout(limits.chunk_timeout, file.read_at(offset, want)).await
        {
            Ok(Ok(chunk)) => chunk,
            Ok(Err(e)) => {
                return Err(TransferError::PartialRead {
                    offset,
                    reason: e.to_string(),
                })
            }
            Err(_) => return Err(TransferError::timeout("chunk read", limits.chunk_timeout)),
        };

        if chunk.is_empty() {
            debug!(remote_path = %path, offset, "End of file");
            break;
        }

        offset += chunk.len() as u64;
        if declared.is_none() {
            limits.check_ceiling(offset)?;
        }

        if tx.send(Ok(chunk)).await.is_err() {
            return Ok(PumpEnd::ConsumerGone { bytes: offset });
        }
    }

    Ok(PumpEnd::Complete { bytes: offset })
}
