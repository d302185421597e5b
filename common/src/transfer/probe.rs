// File size probe used to pick a download mode

use crate::errors::TransferError;
use crate::models::TransportConfig;
use crate::sftp::{open_session, Connector};
use crate::transfer::{within, TransferLimits};
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

/// Byte size of `path`, connect and stat under one probe deadline
///
/// A size the server does not report is treated as zero; the buffered path
/// then reads to end of file.
#[instrument(skip(connector, config, limits))]
pub async fn probe_size(
    connector: &dyn Connector,
    config: &TransportConfig,
    path: &str,
    limits: &TransferLimits,
) -> Result<u64, TransferError> {
    let deadline = Instant::now() + limits.probe_timeout;

    let mut session = within(
        deadline,
        "file size check",
        limits.probe_timeout,
        open_session(connector, config, limits.connect_timeout),
    )
    .await?;

    let result = within(deadline, "file size check", limits.probe_timeout, async {
        let stat = session.session()?.stat(path).await?;
        if stat.is_directory {
            return Err(TransferError::NotFound(format!("{} is a directory", path)));
        }
        Ok(stat.size)
    })
    .await;

    let size = session.finish(result).await?;
    match size {
        Some(size) => {
            debug!(remote_path = %path, size, "File size probed");
            Ok(size)
        }
        None => {
            warn!(remote_path = %path, "Server did not report a size");
            Ok(0)
        }
    }
}
