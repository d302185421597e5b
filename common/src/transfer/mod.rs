// Remote file transfer: size probe, buffered and streaming downloads
//
// Every operation opens its own supervised session; deadlines are enforced
// with tokio timers around the session, never inside the transport.

pub mod buffered;
pub mod payload;
pub mod probe;
pub mod service;
pub mod streaming;

pub use buffered::download_buffered;
pub use payload::{ChunkStream, RemoteFilePayload};
pub use probe::probe_size;
pub use service::TransferService;
pub use streaming::download_streaming;

use crate::errors::TransferError;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

const MIB: u64 = 1024 * 1024;
const GIB: u64 = 1024 * MIB;

/// Deadlines, ceilings and sizes applied to transfer operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferLimits {
    pub connect_timeout: Duration,
    /// Whole enumeration, connect included
    pub listing_timeout: Duration,
    /// Connect plus stat
    pub probe_timeout: Duration,
    /// Hard ceiling for one download, connect to last byte
    pub operation_timeout: Duration,
    /// Per chunk read while streaming
    pub chunk_timeout: Duration,
    pub chunk_size: usize,
    pub max_file_size: u64,
    /// Sizes strictly above this stream; everything else is buffered
    pub streaming_threshold: u64,
    pub min_read_timeout: Duration,
    pub max_read_timeout: Duration,
    pub read_timeout_per_gib: Duration,
    /// Chunks buffered between the streaming pump and its consumer
    pub stream_buffer: usize,
}

impl Default for TransferLimits {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(15),
            listing_timeout: Duration::from_secs(120),
            probe_timeout: Duration::from_secs(30),
            operation_timeout: Duration::from_secs(45 * 60),
            chunk_timeout: Duration::from_secs(60),
            chunk_size: MIB as usize,
            max_file_size: 10 * GIB,
            streaming_threshold: 200 * MIB,
            min_read_timeout: Duration::from_secs(120),
            max_read_timeout: Duration::from_secs(1800),
            read_timeout_per_gib: Duration::from_secs(60),
            stream_buffer: 4,
        }
    }
}

impl TransferLimits {
    /// Read deadline for a buffered download: scales with size, clamped to [min, max]
    pub fn buffered_read_timeout(&self, size: u64) -> Duration {
        let scaled = self.read_timeout_per_gib.as_secs_f64() * (size as f64 / GIB as f64);
        Duration::from_secs_f64(scaled).clamp(self.min_read_timeout, self.max_read_timeout)
    }

    pub fn mode_for_size(&self, size: u64) -> DownloadMode {
        DownloadMode::for_size(size, self.streaming_threshold)
    }

    /// Fail before any transfer when the declared size exceeds the ceiling
    pub fn check_ceiling(&self, size: u64) -> Result<(), TransferError> {
        if size > self.max_file_size {
            return Err(TransferError::FileTooLarge {
                size,
                max: self.max_file_size,
            });
        }
        Ok(())
    }
}

/// How a file is delivered to the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadMode {
    Buffered,
    Streaming,
}

impl DownloadMode {
    /// Streaming iff `size > threshold`
    pub fn for_size(size: u64, threshold: u64) -> Self {
        if size > threshold {
            DownloadMode::Streaming
        } else {
            DownloadMode::Buffered
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DownloadMode::Buffered => "buffered",
            DownloadMode::Streaming => "streaming",
        }
    }
}

/// Run `fut` until `deadline`, reporting expiry as a timeout of `limit`
pub(crate) async fn within<T, F>(
    deadline: Instant,
    operation: &'static str,
    limit: Duration,
    fut: F,
) -> Result<T, TransferError>
where
    F: Future<Output = Result<T, TransferError>>,
{
    match tokio::time::timeout_at(deadline, fut).await {
        Ok(result) => result,
        Err(_) => Err(TransferError::timeout(operation, limit)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_timeout_clamped_below() {
        let limits = TransferLimits::default();
        assert_eq!(limits.buffered_read_timeout(0), Duration::from_secs(120));
        assert_eq!(limits.buffered_read_timeout(GIB), Duration::from_secs(120));
    }

    #[test]
    fn test_read_timeout_scales_with_size() {
        let limits = TransferLimits::default();
        assert_eq!(limits.buffered_read_timeout(5 * GIB), Duration::from_secs(300));
    }

    #[test]
    fn test_read_timeout_clamped_above() {
        let limits = TransferLimits::default();
        assert_eq!(limits.buffered_read_timeout(100 * GIB), Duration::from_secs(1800));
    }

    #[test]
    fn test_routing_boundary_is_exclusive() {
        let limits = TransferLimits::default();
        assert_eq!(limits.mode_for_size(200 * MIB), DownloadMode::Buffered);
        assert_eq!(limits.mode_for_size(200 * MIB + 1), DownloadMode::Streaming);
    }

    #[test]
    fn test_ceiling() {
        let limits = TransferLimits::default();
        assert!(limits.check_ceiling(10 * GIB).is_ok());
        assert_eq!(
            limits.check_ceiling(10 * GIB + 1),
            Err(TransferError::FileTooLarge {
                size: 10 * GIB + 1,
                max: 10 * GIB
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_within_reports_limit() {
        let limit = Duration::from_secs(30);
        let deadline = Instant::now() + limit;
        let result: Result<(), _> =
            within(deadline, "probe", limit, std::future::pending()).await;
        assert_eq!(result, Err(TransferError::timeout("probe", limit)));
    }
}
