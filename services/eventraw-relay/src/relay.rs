//! One relay run: resolve the device, fetch the range, publish every record.

use crate::config::RelayConfig;
use crate::device_identity::{resolve_chip_serial, DeviceIdentity, DeviceIdentityResolver};
use crate::event_fetcher::{EventRecord, EventRecordFetcher, TimeRange};
use crate::producer::MessageTransport;
use crate::publisher::{EventPublisher, PublishError, PublishOutcome};
use crate::routing::DeviceClass;
use crate::store::StoreError;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Error, Debug)]
pub enum RelayError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Publish(#[from] PublishError),
}

/// State shared by every record of one run
#[derive(Debug, Clone)]
pub struct RunContext {
    pub identity: DeviceIdentity,
    pub chip_serial: String,
    pub range: TimeRange,
}

/// Counts reported once the run completes
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub identity: DeviceIdentity,
    pub rows_found: usize,
    pub published: usize,
    pub dropped: usize,
    /// Records skipped because their timestamp could not be normalized
    pub skipped: usize,
}

impl RunSummary {
    fn new(identity: DeviceIdentity, rows_found: usize) -> Self {
        Self {
            identity,
            rows_found,
            published: 0,
            dropped: 0,
            skipped: 0,
        }
    }
}

pub struct Relay {
    config: RelayConfig,
    transport: Arc<dyn MessageTransport>,
}

impl Relay {
    pub fn new(config: RelayConfig, transport: Arc<dyn MessageTransport>) -> Self {
        Self { config, transport }
    }

    /// Run the relay over `range`.
    ///
    /// The transport is closed before returning, whether or not the run
    /// succeeded.
    pub async fn run(&self, range: TimeRange) -> Result<RunSummary, RelayError> {
        let result = self.relay_range(range).await;

        if let Err(e) = self.transport.close().await {
            warn!(error = %e, "Failed to close transport");
        }

        if let Err(ref e) = result {
            error!(error = %e, "Relay run failed");
        }
        result
    }

    /// Build the per-run context: device identity and chip serial
    pub async fn prepare(&self, range: TimeRange) -> Result<RunContext, RelayError> {
        let resolver = DeviceIdentityResolver::new(&self.config.storage, &self.config.device);
        let identity = match resolver.resolve().await {
            Ok(identity) => identity,
            Err(StoreError::NoDeviceRecord(table)) => {
                warn!(table = %table, "No device record, treating device as unclassified");
                DeviceIdentity::unclassified()
            }
            Err(e) => return Err(e.into()),
        };

        info!(company_serial = %identity.company_serial, device = %identity, "Device info");
        match identity.class {
            DeviceClass::Series15F => info!("15F device detected"),
            DeviceClass::Series25F => info!("25F device detected"),
            DeviceClass::Unclassified => info!("Unclassified device, records will not be sent"),
        }

        Ok(RunContext {
            identity,
            chip_serial: resolve_chip_serial(&self.config.device),
            range,
        })
    }

    async fn relay_range(&self, range: TimeRange) -> Result<RunSummary, RelayError> {
        let context = self.prepare(range).await?;

        let fetcher = EventRecordFetcher::new(&self.config.storage);
        let records = fetcher.fetch(&context.range).await?;
        info!(rows = records.len(), "Found {} records in range", records.len());

        let publisher = EventPublisher::new(
            self.transport.clone(),
            &self.config,
            context.chip_serial.clone(),
        );
        self.publish_all(&publisher, &context, &records).await
    }

    /// Publish records in order, one at a time
    pub async fn publish_all(
        &self,
        publisher: &EventPublisher,
        context: &RunContext,
        records: &[EventRecord],
    ) -> Result<RunSummary, RelayError> {
        let mut summary = RunSummary::new(context.identity.clone(), records.len());
        let record_delay = self.config.publish.record_delay();

        for record in records {
            debug!(record = ?record, "Sending data");

            match publisher.publish(record, &context.identity).await {
                Ok(PublishOutcome::Sent { .. }) => summary.published += 1,
                Ok(PublishOutcome::Dropped) => summary.dropped += 1,
                Err(PublishError::Timestamp(e)) if self.config.publish.skip_unparsable_timestamps => {
                    warn!(error = %e, roi_id = %record.region_id, "Skipping record");
                    summary.skipped += 1;
                }
                Err(e) => return Err(e.into()),
            }

            pace(record_delay).await;
        }

        info!(
            rows_found = summary.rows_found,
            published = summary.published,
            dropped = summary.dropped,
            skipped = summary.skipped,
            "Relay run complete"
        );
        Ok(summary)
    }
}

async fn pace(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}
