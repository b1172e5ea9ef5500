//! Nier EventRaw Relay
//!
//! Relays raw event records from the camera's on-device SQLite store to the
//! backhaul broker. Each record in a start-timestamp range is enriched with
//! the camera's chip serial and formatted times, wrapped in the backhaul
//! envelope, and published to the routing key of the device's class.
//!
//! ```text
//! raspicam (SQLite) ──▶ DeviceIdentityResolver ──┐
//!                                                ▼
//! eventRaw.db (SQLite) ──▶ EventRecordFetcher ──▶ EventPublisher ──▶ AMQP exchange "data"
//!                                                ▲
//!                                 TimeNormalizer ┘
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use nier_eventraw_relay::{AmqpProducer, Relay, RelayConfig, TimeRange};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = RelayConfig::load(None)?;
//!     let producer = AmqpProducer::connect(&config.amqp_uri()).await?;
//!
//!     let relay = Relay::new(config, Arc::new(producer));
//!     let summary = relay.run(TimeRange::parse("1761868800", "1762127999")).await?;
//!     println!("published {} of {}", summary.published, summary.rows_found);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod device_identity;
pub mod event_fetcher;
pub mod producer;
pub mod publisher;
pub mod relay;
pub mod routing;
pub mod store;
pub mod time_normalizer;

// Re-export main types
pub use config::{ConfigError, EventStartSource, RelayConfig};
pub use device_identity::{DeviceIdentity, DeviceIdentityResolver};
pub use event_fetcher::{EventRecord, EventRecordFetcher, RangeBound, TimeRange};
pub use producer::{AmqpProducer, MessageTransport, OutgoingMessage, ProducerError};
pub use publisher::{EnrichedEventRecord, EventPublisher, PublishEnvelope, PublishError, PublishOutcome};
pub use relay::{Relay, RelayError, RunContext, RunSummary};
pub use routing::{DeviceClass, Destination, RoutingTable};
pub use store::{ColumnValue, StoreError};
pub use time_normalizer::{LocalZone, NormalizedTime, TimeNormalizer, TimestampError};
