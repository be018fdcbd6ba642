//! Publishes inferred facts to an MQTT topic.

use crate::config::MqttConfig;
use crate::core::message::InferredFact;
use crate::error::SinkError;
use crate::sinks::{ntriples_line, FactSink};
use rumqttc::{Client, MqttOptions, QoS};
use std::thread;
use std::time::Duration;
use tracing::warn;

pub struct MqttSink {
    client: Client,
    topic: String,
}

impl MqttSink {
    /// Connect and drive the connection on a background thread.
    pub fn connect(config: &MqttConfig) -> Result<Self, SinkError> {
        let mut options = MqttOptions::new(&config.client_id, &config.host, config.port);
        options.set_keep_alive(Duration::from_secs(config.keep_alive_secs));

        let (client, mut connection) = Client::new(options, 100);

        thread::spawn(move || {
            for notification in connection.iter() {
                if let Err(e) = notification {
                    warn!("MQTT sink connection error: {:?}", e);
                    break;
                }
            }
        });

        Ok(Self { client, topic: config.topic.clone() })
    }
}

impl FactSink for MqttSink {
    fn name(&self) -> &str {
        "mqtt"
    }

    /// Queue without blocking; a full request queue is reported as an error.
    fn consume(&mut self, fact: &InferredFact) -> Result<(), SinkError> {
        let line = ntriples_line(fact)?;
        self.client
            .try_publish(&self.topic, QoS::AtLeastOnce, false, line.into_bytes())
            .map_err(|e| SinkError::Broker(e.to_string()))
    }
}

impl Drop for MqttSink {
    fn drop(&mut self) {
        let _ = self.client.disconnect();
    }
}
