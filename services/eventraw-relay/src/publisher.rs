//! Enrichment and routing of event records.
//!
//! Each record gets the camera's chip serial and formatted upload/start
//! times, is wrapped in the backhaul envelope, and is sent to the routing key
//! of the device's class. Records from unclassified devices are dropped.

use crate::config::{EventStartSource, RelayConfig};
use crate::device_identity::DeviceIdentity;
use crate::event_fetcher::EventRecord;
use crate::producer::{MessageTransport, OutgoingMessage, ProducerError};
use crate::routing::RoutingTable;
use crate::time_normalizer::{TimeNormalizer, TimestampError};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, instrument};

/// Errors that abort publishing a record
#[derive(Error, Debug)]
pub enum PublishError {
    #[error(transparent)]
    Timestamp(#[from] TimestampError),

    #[error("Failed to serialize record: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Transport(#[from] ProducerError),
}

/// Event record with device identity and formatted times
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichedEventRecord {
    #[serde(flatten)]
    pub record: EventRecord,
    #[serde(rename = "CameraSerial")]
    pub camera_serial: String,
    #[serde(rename = "UploadedLocalDateTime")]
    pub uploaded_local: String,
    #[serde(rename = "UploadedUTCDateTime")]
    pub uploaded_utc: String,
    #[serde(rename = "EventStartLocalTime")]
    pub event_start_local: String,
    #[serde(rename = "EventStartUTCTime")]
    pub event_start_utc: String,
}

/// Wire body: the enriched record serialized a second time into `data`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PublishEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: String,
    pub topic: String,
}

impl PublishEnvelope {
    pub fn wrap(record: &EnrichedEventRecord, topic: impl Into<String>) -> Result<Self, serde_json::Error> {
        Ok(Self {
            kind: "json".to_string(),
            data: serde_json::to_string(record)?,
            topic: topic.into(),
        })
    }
}

/// What happened to a single record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    Sent { routing_key: String },
    /// The device class has no destination
    Dropped,
}

pub struct EventPublisher {
    transport: Arc<dyn MessageTransport>,
    routing: RoutingTable,
    normalizer: TimeNormalizer,
    chip_serial: String,
    topic: String,
    content_type: String,
    event_start_source: EventStartSource,
    publish_delay: Duration,
}

impl EventPublisher {
    pub fn new(
        transport: Arc<dyn MessageTransport>,
        config: &RelayConfig,
        chip_serial: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            routing: RoutingTable::new(&config.amqp),
            normalizer: TimeNormalizer::from_offset_seconds(config.publish.utc_offset_seconds),
            chip_serial: chip_serial.into(),
            topic: config.amqp.topic.clone(),
            content_type: config.amqp.content_type.clone(),
            event_start_source: config.publish.event_start_source,
            publish_delay: config.publish.publish_delay(),
        }
    }

    /// Override the zone used for local times
    pub fn with_normalizer(mut self, normalizer: TimeNormalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    /// Attach identity and formatted times to a record.
    ///
    /// Upload times always come from the end timestamp. With
    /// [`EventStartSource::EventEnd`] the `EventStart*` fields do too.
    pub fn enrich(&self, record: &EventRecord) -> Result<EnrichedEventRecord, TimestampError> {
        let uploaded = self.normalizer.normalize(&record.event_end_time)?;
        let event_start = match self.event_start_source {
            EventStartSource::EventEnd => uploaded.clone(),
            EventStartSource::EventStart => self.normalizer.normalize(&record.event_start_time)?,
        };

        Ok(EnrichedEventRecord {
            record: record.clone(),
            camera_serial: self.chip_serial.clone(),
            uploaded_local: uploaded.local,
            uploaded_utc: uploaded.utc,
            event_start_local: event_start.local,
            event_start_utc: event_start.utc,
        })
    }

    /// Enrich, route and send one record, then wait out the publish delay.
    #[instrument(skip_all, fields(roi_id = %record.region_id, metric_id = %record.metric_id))]
    pub async fn publish(
        &self,
        record: &EventRecord,
        identity: &DeviceIdentity,
    ) -> Result<PublishOutcome, PublishError> {
        let enriched = self.enrich(record)?;

        let Some(route) = self.routing.route(identity.class.destination()) else {
            debug!(class = %identity.class, "No destination for device class");
            tokio::time::sleep(self.publish_delay).await;
            return Ok(PublishOutcome::Dropped);
        };

        let envelope = PublishEnvelope::wrap(&enriched, &self.topic)?;
        let message = OutgoingMessage::new_json(&route.exchange, &route.routing_key, &envelope)?
            .with_content_type(&self.content_type);

        let sent = self.transport.send(message).await;
        tokio::time::sleep(self.publish_delay).await;
        sent?;

        info!(
            class = %identity.class,
            routing_key = %route.routing_key,
            "Sent data for RoiId={} MetricId={}",
            record.region_id,
            record.metric_id
        );

        Ok(PublishOutcome::Sent {
            routing_key: route.routing_key,
        })
    }
}
