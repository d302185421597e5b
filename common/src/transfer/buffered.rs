// Buffered download: whole file into memory, size-scaled read deadline

use crate::errors::TransferError;
use crate::models::TransportConfig;
use crate::sftp::{open_session, Connector, RemoteFile, SupervisedSession};
use crate::transfer::{within, TransferLimits};
use std::cmp::min;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Download `path` into memory (single attempt)
///
/// Stat and the size ceiling are checked before the first read. Connect,
/// stat and read share the overall operation deadline; the read itself is
/// additionally bounded by [`TransferLimits::buffered_read_timeout`]. The
/// remote handle is closed whichever deadline fires.
#[instrument(skip(connector, config, limits))]
pub async fn download_buffered(
    connector: &dyn Connector,
    config: &TransportConfig,
    path: &str,
    limits: &TransferLimits,
) -> Result<Vec<u8>, TransferError> {
    let deadline = Instant::now() + limits.operation_timeout;

    let mut session = within(
        deadline,
        "download",
        limits.operation_timeout,
        open_session(connector, config, limits.connect_timeout),
    )
    .await?;

    let result = fetch(&mut session, path, limits, deadline).await;

    let data = session.finish(result).await?;
    info!(remote_path = %path, bytes = data.len(), "Buffered download complete");
    Ok(data)
}

async fn fetch(
    session: &mut SupervisedSession,
    path: &str,
    limits: &TransferLimits,
    deadline: Instant,
) -> Result<Vec<u8>, TransferError> {
    let remote = session.session()?;

    let (declared, mut file) = within(deadline, "download", limits.operation_timeout, async {
        let stat = remote.stat(path).await?;
        if stat.is_directory {
            return Err(TransferError::NotFound(format!("{} is a directory", path)));
        }
        if let Some(size) = stat.size {
            limits.check_ceiling(size)?;
        }
        let file = remote.open(path).await?;
        Ok((stat.size, file))
    })
    .await?;

    let read_timeout = limits.buffered_read_timeout(declared.unwrap_or(0));
    let read_deadline = min(Instant::now() + read_timeout, deadline);
    debug!(
        remote_path = %path,
        size = ?declared,
        read_timeout_secs = read_timeout.as_secs(),
        "Reading file into memory"
    );

    let read = match tokio::time::timeout_at(
        read_deadline,
        read_to_end(file.as_mut(), declared, limits),
    )
    .await
    {
        Ok(result) => result,
        Err(_) if read_deadline == deadline => {
            Err(TransferError::timeout("download", limits.operation_timeout))
        }
        Err(_) => Err(TransferError::timeout("file read", read_timeout)),
    };
    close_file(file.as_mut(), path).await;

    let data = read?;
    if data.is_empty() {
        return Err(TransferError::EmptyFile(path.to_string()));
    }
    Ok(data)
}

/// Read sequentially up to `declared` bytes, or to end of file when unknown
pub(crate) async fn read_to_end(
    file: &mut dyn RemoteFile,
    declared: Option<u64>,
    limits: &TransferLimits,
) -> Result<Vec<u8>, TransferError> {
    let capacity = declared
        .and_then(|size| usize::try_from(size).ok())
        .unwrap_or(0);
    let mut data = Vec::with_capacity(capacity);
    let mut offset = 0u64;

    loop {
        let want = match declared {
            Some(size) if offset >= size => break,
            Some(size) => min(limits.chunk_size as u64, size - offset) as usize,
            None => limits.chunk_size,
        };

        let chunk = file.read_at(offset, want).await?;
        if chunk.is_empty() {
            break;
        }
        offset += chunk.len() as u64;
        if declared.is_none() {
            limits.check_ceiling(offset)?;
        }
        data.extend_from_slice(&chunk);
    }

    Ok(data)
}

/// Read a small remote file whole, without the ceiling-and-empty checks of a download
pub(crate) async fn read_file(
    session: &mut SupervisedSession,
    path: &str,
    limits: &TransferLimits,
) -> Result<Vec<u8>, TransferError> {
    let mut file = session.session()?.open(path).await?;
    let declared = match file.fstat().await {
        Ok(stat) => stat.size,
        Err(e) => {
            close_file(file.as_mut(), path).await;
            return Err(e);
        }
    };

    let read = read_to_end(file.as_mut(), declared, limits).await;
    close_file(file.as_mut(), path).await;
    read
}

pub(crate) async fn close_file(file: &mut dyn RemoteFile, path: &str) {
    if let Err(e) = file.close().await {
        warn!(remote_path = %path, error = %e, "Failed to close remote file handle");
    }
}
