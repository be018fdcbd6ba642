//! Destinations for inferred facts.
//!
//! A sink receives every fact the conflict set accepts. Sink failures are
//! reported to the caller, which logs and counts them; they never fail the fire
//! event that produced the fact.

pub mod file_sink;
#[cfg(not(windows))]
pub mod kafka_sink;
pub mod mqtt_sink;

use crate::config::SinkConfig;
use crate::core::message::InferredFact;
use crate::error::SinkError;
use std::sync::{Arc, Mutex};
use tracing::info;

pub use file_sink::FileSink;
#[cfg(not(windows))]
pub use kafka_sink::KafkaSink;
pub use mqtt_sink::MqttSink;

pub trait FactSink: Send {
    fn name(&self) -> &str;

    fn consume(&mut self, fact: &InferredFact) -> Result<(), SinkError>;

    fn flush(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Open every sink named in the configuration.
pub fn from_config(config: &SinkConfig) -> Result<Vec<Box<dyn FactSink>>, SinkError> {
    let mut sinks: Vec<Box<dyn FactSink>> = Vec::new();

    if let Some(path) = &config.file {
        info!("Writing inferred facts to {}", path.display());
        sinks.push(Box::new(FileSink::open(path)?));
    }
    if let Some(mqtt) = &config.mqtt {
        info!("Publishing inferred facts to mqtt://{}:{}/{}", mqtt.host, mqtt.port, mqtt.topic);
        sinks.push(Box::new(MqttSink::connect(mqtt)?));
    }
    #[cfg(not(windows))]
    if let Some(kafka) = &config.kafka {
        info!(
            "Publishing inferred facts to Kafka topic {} at {}",
            kafka.topic, kafka.bootstrap_servers
        );
        sinks.push(Box::new(KafkaSink::connect(kafka)?));
    }
    #[cfg(windows)]
    if config.kafka.is_some() {
        tracing::warn!("Kafka sink is not available on Windows, ignoring it");
    }

    Ok(sinks)
}

/// Keeps every fact in memory. Clones share the same buffer.
#[derive(Clone, Debug, Default)]
pub struct CollectingSink {
    facts: Arc<Mutex<Vec<InferredFact>>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn facts(&self) -> Vec<InferredFact> {
        self.facts.lock().map(|f| f.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.facts.lock().map(|f| f.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FactSink for CollectingSink {
    fn name(&self) -> &str {
        "collector"
    }

    fn consume(&mut self, fact: &InferredFact) -> Result<(), SinkError> {
        self.facts
            .lock()
            .map_err(|_| SinkError::Broker("collector lock poisoned".to_string()))?
            .push(fact.clone());
        Ok(())
    }
}

/// N-Triples line for a fact, with terms validated through oxigraph.
pub fn ntriples_line(fact: &InferredFact) -> Result<String, SinkError> {
    file_sink::to_oxigraph(&fact.triple).map(|t| format!("{} .", t))
}
