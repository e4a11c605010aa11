//! One collection cycle: authenticate, fetch, aggregate

use crate::client::CloudClient;
use crate::config::OpenStackConfig;
use crate::error::AuthError;
use crate::metrics::{self, MetricBatch};
use crate::resources::Inventory;
use std::time::Instant;
use tracing::info;

pub struct Collector {
    config: OpenStackConfig,
}

impl Collector {
    pub fn new(config: OpenStackConfig) -> Self {
        Self { config }
    }

    /// Run exactly one cycle
    ///
    /// Only authentication failures are returned; fetch failures narrow
    /// the batch instead.
    pub async fn collect(&self) -> Result<MetricBatch, AuthError> {
        let started = Instant::now();

        let client = CloudClient::authenticate(&self.config).await?;
        let inventory = Inventory::fetch(&client).await;

        let mut batch = MetricBatch::new();
        metrics::gather_all(&mut batch, &inventory);

        info!(
            "Collected {} metric records in {}ms",
            batch.len(),
            started.elapsed().as_millis()
        );
        Ok(batch)
    }
}
