use std::sync::Arc;

use common::config::Settings;
use common::transfer::TransferService;
use metrics_exporter_prometheus::PrometheusHandle;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Settings>,
    pub transfer: Arc<TransferService>,
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(
        config: Settings,
        transfer: TransferService,
        metrics: Option<PrometheusHandle>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            transfer: Arc::new(transfer),
            metrics,
        }
    }
}
