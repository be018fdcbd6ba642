//! Publishes inferred facts to a Kafka topic.

use crate::config::KafkaConfig;
use crate::core::message::InferredFact;
use crate::error::SinkError;
use crate::sinks::{ntriples_line, FactSink};
use rdkafka::config::ClientConfig;
use rdkafka::producer::{BaseProducer, BaseRecord, Producer};
use std::time::Duration;

pub struct KafkaSink {
    producer: BaseProducer,
    topic: String,
}

impl KafkaSink {
    pub fn connect(config: &KafkaConfig) -> Result<Self, SinkError> {
        let producer: BaseProducer = ClientConfig::new()
            .set("bootstrap.servers", &config.bootstrap_servers)
            .set("client.id", &config.client_id)
            .set("message.timeout.ms", &config.message_timeout_ms)
            .create()
            .map_err(|e| SinkError::Broker(e.to_string()))?;

        Ok(Self { producer, topic: config.topic.clone() })
    }
}

impl FactSink for KafkaSink {
    fn name(&self) -> &str {
        "kafka"
    }

    /// Enqueue keyed by rule id, then serve delivery callbacks without waiting.
    fn consume(&mut self, fact: &InferredFact) -> Result<(), SinkError> {
        let line = ntriples_line(fact)?;
        self.producer
            .send(BaseRecord::to(&self.topic).key(&fact.rule_id).payload(&line))
            .map_err(|(e, _)| SinkError::Broker(e.to_string()))?;
        self.producer.poll(Duration::ZERO);
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        self.producer.flush(Duration::from_secs(5)).map_err(|e| SinkError::Broker(e.to_string()))
    }
}
