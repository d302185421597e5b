// Transfer service: the operations the HTTP surface calls
//
// Each call opens its own session. Listing and buffered downloads go through
// the shared retry loop; streaming never does.

use crate::catalog;
use crate::config::Settings;
use crate::errors::TransferError;
use crate::models::{Creator, TransportConfig};
use crate::retry::{retry_with_backoff, ExponentialBackoff};
use crate::sftp::{open_session, Connector, Ssh2Connector};
use crate::telemetry;
use crate::transfer::buffered::read_file;
use crate::transfer::{
    buffered, probe, streaming, within, DownloadMode, RemoteFilePayload, TransferLimits,
};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{info, instrument};

pub struct TransferService {
    connector: Arc<dyn Connector>,
    transport: TransportConfig,
    limits: TransferLimits,
    listing_retry: ExponentialBackoff,
    download_retry: ExponentialBackoff,
}

impl TransferService {
    pub fn new(
        connector: Arc<dyn Connector>,
        transport: TransportConfig,
        limits: TransferLimits,
    ) -> Self {
        Self {
            connector,
            transport,
            limits,
            listing_retry: ExponentialBackoff::listing(),
            download_retry: ExponentialBackoff::download(),
        }
    }

    pub fn with_retry(mut self, listing: ExponentialBackoff, download: ExponentialBackoff) -> Self {
        self.listing_retry = listing;
        self.download_retry = download;
        self
    }

    /// Production service over ssh2
    pub fn from_settings(settings: &Settings) -> Self {
        let limits = settings.transfer.limits();
        let connector = Ssh2Connector::new(
            settings.host_key_policy(),
            limits.connect_timeout,
            limits.chunk_timeout,
        );

        Self::new(Arc::new(connector), settings.transport(), limits).with_retry(
            settings.transfer.listing_retry.strategy(),
            settings.transfer.download_retry.strategy(),
        )
    }

    pub fn limits(&self) -> &TransferLimits {
        &self.limits
    }

    pub fn transport(&self) -> &TransportConfig {
        &self.transport
    }

    /// Enumerate creators under the base path, retrying transient failures
    #[instrument(skip(self))]
    pub async fn list_creators(&self) -> Result<Vec<Creator>, TransferError> {
        let started = Instant::now();
        let result = retry_with_backoff(
            &self.listing_retry,
            "list_creators",
            TransferError::class,
            |_attempt| self.list_creators_once(),
        )
        .await;
        observe("list_creators", started, &result);
        result
    }

    async fn list_creators_once(&self) -> Result<Vec<Creator>, TransferError> {
        let deadline = Instant::now() + self.limits.listing_timeout;
        let limit = self.limits.listing_timeout;

        let mut session = within(
            deadline,
            "listing",
            limit,
            open_session(self.connector.as_ref(), &self.transport, self.limits.connect_timeout),
        )
        .await?;

        let base_path = self.transport.base_path.clone();
        let result = within(deadline, "listing", limit, async {
            catalog::list_creators(session.session()?, &base_path).await
        })
        .await;

        session.finish(result).await
    }

    pub async fn probe_size(&self, path: &str) -> Result<u64, TransferError> {
        let started = Instant::now();
        let result =
            probe::probe_size(self.connector.as_ref(), &self.transport, path, &self.limits).await;
        observe("probe_size", started, &result);
        result
    }

    /// Whole file in memory, retrying transient failures
    #[instrument(skip(self))]
    pub async fn download_buffered(&self, path: &str) -> Result<RemoteFilePayload, TransferError> {
        let started = Instant::now();
        let result = retry_with_backoff(
            &self.download_retry,
            "download_buffered",
            TransferError::class,
            |_attempt| {
                buffered::download_buffered(
                    self.connector.as_ref(),
                    &self.transport,
                    path,
                    &self.limits,
                )
            },
        )
        .await;
        observe("download_buffered", started, &result);

        let data = result?;
        telemetry::record_download(DownloadMode::Buffered.as_str(), data.len() as u64);
        Ok(RemoteFilePayload::Buffered(data))
    }

    /// Chunked download; failures after the first chunk arrive as a stream error
    #[instrument(skip(self))]
    pub async fn download_streaming(&self, path: &str) -> Result<RemoteFilePayload, TransferError> {
        let result = streaming::download_streaming(
            self.connector.as_ref(),
            &self.transport,
            path,
            &self.limits,
        )
        .await;
        if let Err(e) = &result {
            telemetry::record_transfer_failure("download_streaming", e.kind().as_str());
        }
        result
    }

    /// Probe the size, then stream above the threshold or buffer otherwise
    #[instrument(skip(self))]
    pub async fn download(&self, path: &str) -> Result<RemoteFilePayload, TransferError> {
        let size = self.probe_size(path).await?;
        let mode = self.limits.mode_for_size(size);
        info!(remote_path = %path, size, mode = mode.as_str(), "Routing download");

        match mode {
            DownloadMode::Streaming => self.download_streaming(path).await,
            DownloadMode::Buffered => self.download_buffered(path).await,
        }
    }

    /// Read a small text file, e.g. the recorder URL list
    #[instrument(skip(self))]
    pub async fn read_text_file(&self, path: &str) -> Result<String, TransferError> {
        let started = Instant::now();
        let result = self
            .read_file_once(path)
            .await
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned());
        observe("read_text_file", started, &result);
        result
    }

    async fn read_file_once(&self, path: &str) -> Result<Vec<u8>, TransferError> {
        let limit = self.limits.probe_timeout;
        let deadline = Instant::now() + limit;

        let mut session = within(
            deadline,
            "read",
            limit,
            open_session(self.connector.as_ref(), &self.transport, self.limits.connect_timeout),
        )
        .await?;

        let result = within(deadline, "read", limit, read_file(&mut session, path, &self.limits)).await;
        session.finish(result).await
    }

    /// Append text to a remote file through the file protocol
    #[instrument(skip(self, text))]
    pub async fn append_text(&self, path: &str, text: &str) -> Result<(), TransferError> {
        let started = Instant::now();
        let result = self.append_once(path, text.as_bytes()).await;
        observe("append_text", started, &result);
        result
    }

    async fn append_once(&self, path: &str, data: &[u8]) -> Result<(), TransferError> {
        let limit = self.limits.probe_timeout;
        let deadline = Instant::now() + limit;

        let mut session = within(
            deadline,
            "append",
            limit,
            open_session(self.connector.as_ref(), &self.transport, self.limits.connect_timeout),
        )
        .await?;

        let result = within(deadline, "append", limit, async {
            session.session()?.append(path, data).await
        })
        .await;
        session.finish(result).await
    }
}

fn observe<T>(operation: &'static str, started: Instant, result: &Result<T, TransferError>) {
    match result {
        Ok(_) => telemetry::record_transfer_duration(operation, started.elapsed().as_secs_f64()),
        Err(e) => telemetry::record_transfer_failure(operation, e.kind().as_str()),
    }
}
