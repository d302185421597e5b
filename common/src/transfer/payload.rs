// Download result shared by both delivery modes

use crate::errors::TransferError;
use crate::transfer::DownloadMode;
use futures::stream::{self, Stream};
use std::fmt;
use std::pin::Pin;

/// Lazy, finite, non-restartable sequence of file chunks
///
/// After an `Err` item the stream ends.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>, TransferError>> + Send>>;

/// A downloaded remote file, in memory or in flight
pub enum RemoteFilePayload {
    Buffered(Vec<u8>),
    Streamed {
        /// Declared size from the remote handle, when the server reports one
        total_size: Option<u64>,
        chunks: ChunkStream,
    },
}

impl RemoteFilePayload {
    pub fn total_size(&self) -> Option<u64> {
        match self {
            RemoteFilePayload::Buffered(data) => Some(data.len() as u64),
            RemoteFilePayload::Streamed { total_size, .. } => *total_size,
        }
    }

    pub fn mode(&self) -> DownloadMode {
        match self {
            RemoteFilePayload::Buffered(_) => DownloadMode::Buffered,
            RemoteFilePayload::Streamed { .. } => DownloadMode::Streaming,
        }
    }

    /// The full content of a buffered payload; a streamed payload is handed back
    pub fn into_bytes(self) -> Result<Vec<u8>, Self> {
        match self {
            RemoteFilePayload::Buffered(data) => Ok(data),
            streamed => Err(streamed),
        }
    }

    /// Chunk sequence for either mode. Buffered content is split at `chunk_size`.
    pub fn into_chunks(self, chunk_size: usize) -> ChunkStream {
        match self {
            RemoteFilePayload::Buffered(data) => {
                let chunks: Vec<Result<Vec<u8>, TransferError>> = data
                    .chunks(chunk_size.max(1))
                    .map(|chunk| Ok(chunk.to_vec()))
                    .collect();
                Box::pin(stream::iter(chunks))
            }
            RemoteFilePayload::Streamed { chunks, .. } => chunks,
        }
    }
}

impl fmt::Debug for RemoteFilePayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteFilePayload::Buffered(data) => f
                .debug_struct("Buffered")
                .field("len", &data.len())
                .finish(),
            RemoteFilePayload::Streamed { total_size, .. } => f
                .debug_struct("Streamed")
                .field("total_size", total_size)
                .finish_non_exhaustive(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_buffered_payload_rechunks() {
        let payload = RemoteFilePayload::Buffered(vec![7u8; 10]);
        assert_eq!(payload.total_size(), Some(10));
        assert_eq!(payload.mode(), DownloadMode::Buffered);

        let chunks: Vec<_> = payload.into_chunks(4).collect().await;
        let sizes: Vec<_> = chunks.iter().map(|c| c.as_ref().unwrap().len()).collect();
        assert_eq!(sizes, [4, 4, 2]);
    }

    #[test]
    fn test_streamed_payload_is_not_bytes() {
        let payload = RemoteFilePayload::Streamed {
            total_size: Some(3),
            chunks: Box::pin(stream::iter(vec![Ok(vec![1, 2, 3])])),
        };
        assert_eq!(payload.mode(), DownloadMode::Streaming);

        let payload = payload.into_bytes().unwrap_err();
        assert_eq!(payload.total_size(), Some(3));
    }
}
