//! Metric publishing
//!
//! Each record of a cycle becomes one JSON message on
//! `<topic>/<measurement>` (matches openstack.metrics@v1 contract). One-shot
//! runs print the same messages as JSON lines instead.

use crate::config::MqttConfig;
use crate::metrics::{Fields, MetricBatch, MetricRecord, Tags};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use serde::Serialize;
use std::io::Write;
use std::time::Duration;
use tracing::{debug, error, info};

/// Published metric message
#[derive(Debug, Serialize)]
pub struct MetricMessage<'a> {
    pub agent_id: &'a str,
    pub measurement: String,
    pub tags: &'a Tags,
    pub fields: &'a Fields,
    pub timestamp: DateTime<Utc>,
}

impl<'a> MetricMessage<'a> {
    pub fn new(
        record: &'a MetricRecord,
        prefix: &str,
        agent_id: &'a str,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            agent_id,
            measurement: format!("{}{}", prefix, record.series),
            tags: &record.tags,
            fields: &record.fields,
            timestamp,
        }
    }
}

/// MQTT topic of one measurement under the configured base topic
pub fn topic_for(base: &str, measurement: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), measurement)
}

/// Write a batch as JSON lines, all stamped with the same timestamp
pub fn write_json_lines<W: Write>(
    out: &mut W,
    batch: &MetricBatch,
    prefix: &str,
    agent_id: &str,
    timestamp: DateTime<Utc>,
) -> Result<()> {
    for record in batch.records() {
        let message = MetricMessage::new(record, prefix, agent_id, timestamp);
        serde_json::to_writer(&mut *out, &message).context("Failed to serialize metric message")?;
        out.write_all(b"\n")?;
    }
    out.flush()?;
    Ok(())
}

/// MQTT publisher for cycle batches
pub struct MqttPublisher {
    client: AsyncClient,
    topic: String,
    agent_id: String,
    prefix: String,
}

impl MqttPublisher {
    /// Create the MQTT client and drive its event loop in the background
    pub fn connect(config: &MqttConfig, prefix: &str) -> Self {
        let agent_id = config.effective_client_id();

        let mut mqtt_options = MqttOptions::new(&agent_id, &config.broker_host, config.broker_port);
        mqtt_options.set_keep_alive(Duration::from_secs(config.keep_alive_secs as u64));
        mqtt_options.set_clean_session(true);

        let (client, mut eventloop) = AsyncClient::new(mqtt_options, 64);

        tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                        info!("Connected to MQTT broker");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!("MQTT connection error: {}", e);
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            }
        });

        info!(
            "MQTT publisher {} -> {}:{} ({})",
            agent_id, config.broker_host, config.broker_port, config.topic
        );

        Self {
            client,
            topic: config.topic.clone(),
            agent_id,
            prefix: prefix.to_string(),
        }
    }

    /// Queue every record without waiting on the broker
    ///
    /// Returns how many records were accepted. While the broker is
    /// unreachable the request queue fills up and further records are
    /// dropped with an error log.
    pub fn publish_batch(&self, batch: &MetricBatch) -> usize {
        let timestamp = Utc::now();
        let mut published = 0;

        for record in batch.records() {
            let message = MetricMessage::new(record, &self.prefix, &self.agent_id, timestamp);
            let topic = topic_for(&self.topic, &message.measurement);

            let payload = match serde_json::to_vec(&message) {
                Ok(payload) => payload,
                Err(e) => {
                    error!("Failed to serialize {}: {}", message.measurement, e);
                    continue;
                }
            };

            match self.client.try_publish(topic.as_str(), QoS::AtLeastOnce, false, payload) {
                Ok(()) => {
                    debug!("Queued {}", topic);
                    published += 1;
                }
                Err(e) => error!("Failed to publish {}: {}", topic, e),
            }
        }

        published
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{tag, Accumulator, FieldValue, Tags};
    use chrono::TimeZone;
    use serde_json::{json, Value};
    use symbion_devkit::MqttBrokerStub;

    fn sample_batch() -> MetricBatch {
        let mut batch = MetricBatch::new();
        batch.add_fields(
            "identity_total",
            Fields::from([("projects".to_string(), FieldValue::Integer(3))]),
            Tags::new(),
        );
        batch.add_fields(
            "storage_pool",
            Fields::from([
                ("free_capacity_gb".to_string(), FieldValue::Float(12.5)),
                ("total_capacity_gb".to_string(), FieldValue::Float(50.0)),
            ]),
            tag("name", "lvm"),
        );
        batch
    }

    #[test]
    fn test_json_lines_output() {
        let timestamp = Utc.with_ymd_and_hms(2026, 10, 19, 10, 0, 0).unwrap();
        let mut out = Vec::new();
        write_json_lines(&mut out, &sample_batch(), "openstack_", "agent-1", timestamp).unwrap();

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<Value> = text.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
        assert_eq!(lines.len(), 2);

        assert_eq!(
            lines[0],
            json!({
                "agent_id": "agent-1",
                "measurement": "openstack_identity_total",
                "tags": {},
                "fields": {"projects": 3},
                "timestamp": "2026-10-19T10:00:00Z"
            })
        );
        assert_eq!(lines[1]["tags"]["name"], "lvm");
        assert_eq!(lines[1]["fields"]["free_capacity_gb"], 12.5);
    }

    #[test]
    fn test_topic_for() {
        assert_eq!(
            topic_for("symbion/openstack/metrics@v1", "openstack_hypervisor"),
            "symbion/openstack/metrics@v1/openstack_hypervisor"
        );
        assert_eq!(topic_for("base//", "m"), "base/m");
    }

    fn mqtt_config(port: u16, topic: &str) -> MqttConfig {
        MqttConfig {
            broker_host: "127.0.0.1".to_string(),
            broker_port: port,
            client_id: Some("agent-test".to_string()),
            topic: topic.to_string(),
            ..MqttConfig::default()
        }
    }

    #[tokio::test]
    async fn test_publish_batch_reaches_broker() {
        let broker = MqttBrokerStub::start().await.unwrap();
        let publisher = MqttPublisher::connect(
            &mqtt_config(broker.port(), "symbion/openstack/metrics@v1/"),
            "openstack_",
        );

        assert_eq!(publisher.publish_batch(&sample_batch()), 2);

        let received = broker.wait_for(2, Duration::from_secs(5)).await;
        assert_eq!(received.len(), 2);
        assert_eq!(
            received[0].topic,
            "symbion/openstack/metrics@v1/openstack_identity_total"
        );
        assert_eq!(received[1].topic, "symbion/openstack/metrics@v1/openstack_storage_pool");
        assert!(received.iter().all(|m| m.qos == 1 && !m.retain));

        let body = received[0].json().unwrap();
        assert_eq!(body["agent_id"], "agent-test");
        assert_eq!(body["fields"]["projects"], 3);
    }

    #[tokio::test]
    async fn test_publish_batch_returns_with_broker_down() {
        let publisher = MqttPublisher::connect(&mqtt_config(1, "symbion/test"), "openstack_");

        let mut batch = MetricBatch::new();
        for i in 0..100 {
            batch.add_fields(
                "identity_total",
                Fields::from([("projects".to_string(), FieldValue::Integer(i))]),
                Tags::new(),
            );
        }

        let published = tokio::time::timeout(Duration::from_secs(5), async {
            publisher.publish_batch(&batch)
        })
        .await
        .expect("publish_batch must not wait for the broker");
        assert!(published < batch.len());
    }

    #[test]
    fn test_empty_prefix() {
        let batch = sample_batch();
        let record = &batch.records()[0];
        let message = MetricMessage::new(record, "", "agent-1", Utc::now());
        assert_eq!(message.measurement, "identity_total");
    }
}
