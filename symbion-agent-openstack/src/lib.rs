//! Symbion OpenStack agent - cloud statistics for the Symbion network
//!
//! Polls Keystone, Nova and Cinder on a fixed interval, aggregates the
//! resource listings into summary metrics and publishes them over MQTT.

pub mod client;
pub mod collector;
pub mod config;
pub mod error;
pub mod metrics;
pub mod publisher;
pub mod resources;

pub use collector::Collector;
pub use config::AgentConfig;
pub use error::{AuthError, FetchError};
pub use metrics::{Accumulator, MetricBatch, MetricRecord};
