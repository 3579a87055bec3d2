//! Kafka stream source (`kafka` feature).
//!
//! Each [`KafkaSource`] owns one `StreamConsumer` subscribed to the topic
//! under the handler's consumer group. Offsets are auto-committed and a new
//! group starts at the latest offset.

use std::time::Duration;

use bytes::Bytes;
use rdkafka::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::Message;

use super::StreamSource;
use crate::error::RouterError;

/// Connection settings shared by every unit of one pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KafkaSettings {
    /// Comma-separated `host:port` list.
    pub bootstrap_servers: String,
    pub topic: String,
    pub group_id: String,
    pub metadata_timeout: Duration,
}

impl KafkaSettings {
    pub fn new(
        bootstrap_servers: impl Into<String>,
        topic: impl Into<String>,
        group_id: impl Into<String>,
    ) -> Self {
        Self {
            bootstrap_servers: bootstrap_servers.into(),
            topic: topic.into(),
            group_id: group_id.into(),
            metadata_timeout: Duration::from_secs(10),
        }
    }

    fn client_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", &self.bootstrap_servers)
            .set("group.id", &self.group_id)
            .set("enable.auto.commit", "true")
            .set("auto.offset.reset", "latest");
        config
    }
}

/// One Kafka consumer of the pool.
pub struct KafkaSource {
    settings: KafkaSettings,
    consumer: Option<StreamConsumer>,
}

impl KafkaSource {
    pub fn new(settings: KafkaSettings) -> Self {
        Self {
            settings,
            consumer: None,
        }
    }

    pub fn settings(&self) -> &KafkaSettings {
        &self.settings
    }

    fn consumer(&self) -> Result<&StreamConsumer, RouterError> {
        self.consumer
            .as_ref()
            .ok_or_else(|| RouterError::stream("kafka consumer is not started"))
    }
}

impl std::fmt::Debug for KafkaSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KafkaSource")
            .field("settings", &self.settings)
            .field("started", &self.consumer.is_some())
            .finish()
    }
}

impl StreamSource for KafkaSource {
    async fn start(&mut self) -> Result<(), RouterError> {
        if self.consumer.is_some() {
            return Ok(());
        }
        let consumer: StreamConsumer = self
            .settings
            .client_config()
            .create()
            .map_err(RouterError::stream)?;
        consumer
            .subscribe(&[self.settings.topic.as_str()])
            .map_err(RouterError::stream)?;
        tracing::info!(
            servers = %self.settings.bootstrap_servers,
            topic = %self.settings.topic,
            group = %self.settings.group_id,
            "kafka consumer subscribed"
        );
        self.consumer = Some(consumer);
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), RouterError> {
        if let Some(consumer) = self.consumer.take() {
            consumer.unsubscribe();
            tracing::info!(topic = %self.settings.topic, "kafka consumer stopped");
        }
        Ok(())
    }

    fn is_started(&self) -> bool {
        self.consumer.is_some()
    }

    /// Blocks the current worker thread for the metadata round trip; needs
    /// the multi-threaded runtime.
    async fn partition_count(&self) -> Result<usize, RouterError> {
        let consumer = self.consumer()?;
        let topic = self.settings.topic.as_str();
        let metadata = tokio::task::block_in_place(|| {
            consumer.fetch_metadata(Some(topic), self.settings.metadata_timeout)
        })
        .map_err(RouterError::stream)?;

        metadata
            .topics()
            .iter()
            .find(|t| t.name() == topic)
            .map(|t| t.partitions().len())
            .ok_or_else(|| RouterError::stream(format!("topic '{topic}' not found in metadata")))
    }

    async fn fork(&self) -> Result<Self, RouterError> {
        let mut unit = Self::new(self.settings.clone());
        unit.start().await?;
        Ok(unit)
    }

    async fn consume(&mut self) -> Result<Bytes, RouterError> {
        let message = self.consumer()?.recv().await.map_err(RouterError::stream)?;
        Ok(message.payload().map(Bytes::copy_from_slice).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_config_binds_group_and_commits() {
        let settings = KafkaSettings::new("kafka-1:9092,kafka-2:9092", "syslog", "syslog:core");
        let config = settings.client_config();
        assert_eq!(config.get("bootstrap.servers"), Some("kafka-1:9092,kafka-2:9092"));
        assert_eq!(config.get("group.id"), Some("syslog:core"));
        assert_eq!(config.get("enable.auto.commit"), Some("true"));
        assert_eq!(config.get("auto.offset.reset"), Some("latest"));
    }

    #[tokio::test]
    async fn unstarted_source_reports_state() {
        let mut source = KafkaSource::new(KafkaSettings::new("localhost:9092", "syslog", "g"));
        assert!(!source.is_started());
        assert!(source.consume().await.is_err());
        source.stop().await.unwrap();
    }
}
