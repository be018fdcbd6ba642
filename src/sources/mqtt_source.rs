//! Subscribe to an MQTT topic and submit every N-Triples line received.

use crate::config::MqttConfig;
use crate::core::message::FactMessage;
use crate::error::Error;
use crate::parsing::rdf_parser::parse_rdf_line;
use crate::sources::SourceMetrics;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

pub struct MqttSource {
    config: MqttConfig,
    should_stop: Arc<AtomicBool>,
    events_received: Arc<AtomicU64>,
    parse_errors: Arc<AtomicU64>,
}

impl MqttSource {
    pub fn new(config: MqttConfig) -> Self {
        Self {
            config,
            should_stop: Arc::new(AtomicBool::new(false)),
            events_received: Arc::new(AtomicU64::new(0)),
            parse_errors: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Poll the broker until [`MqttSource::stop`] is called. Connection errors
    /// are logged and retried after a second.
    pub async fn run<F>(&self, mut submit: F) -> Result<SourceMetrics, Error>
    where
        F: FnMut(FactMessage),
    {
        let mut options =
            MqttOptions::new(&self.config.client_id, &self.config.host, self.config.port);
        options.set_keep_alive(Duration::from_secs(self.config.keep_alive_secs));

        let (client, mut eventloop) = AsyncClient::new(options, 100);
        client
            .subscribe(&self.config.topic, QoS::AtLeastOnce)
            .await
            .map_err(|e| Error::Transport(format!("subscribe to '{}': {}", self.config.topic, e)))?;

        info!(
            host = %self.config.host,
            port = self.config.port,
            topic = %self.config.topic,
            "Subscribed to MQTT fact stream"
        );

        let start = Instant::now();
        while !self.should_stop.load(Ordering::Relaxed) {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    for parsed in parse_payload(&publish.payload) {
                        match parsed {
                            Ok(fact) => {
                                self.events_received.fetch_add(1, Ordering::Relaxed);
                                debug!(triple = %fact.triple, "Received fact");
                                submit(fact);
                            }
                            Err(e) => {
                                self.parse_errors.fetch_add(1, Ordering::Relaxed);
                                warn!("Skipping MQTT payload line: {}", e);
                            }
                        }
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    error!("MQTT event loop error: {}", e);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }

        info!("MQTT source stopped");
        if let Err(e) = client.disconnect().await {
            debug!("MQTT disconnect failed: {}", e);
        }
        Ok(SourceMetrics {
            events_read: self.events_received.load(Ordering::Relaxed),
            parse_errors: self.parse_errors.load(Ordering::Relaxed),
            elapsed_seconds: start.elapsed().as_secs_f64(),
        })
    }

    pub fn stop(&self) {
        self.should_stop.store(true, Ordering::Relaxed);
    }

    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        self.should_stop.clone()
    }
}

/// One publish may carry several lines.
fn parse_payload(payload: &[u8]) -> Vec<Result<FactMessage, Error>> {
    String::from_utf8_lossy(payload)
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(parse_rdf_line)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::term::Term;

    #[test]
    fn test_payload_lines_are_parsed_independently() {
        let payload = b"<http://e/a> <http://e/p> <http://e/b> .\n\n\
                        garbage\n\
                        42 <http://e/c> <http://e/p> \"7\" .";
        let parsed = parse_payload(payload);

        assert_eq!(parsed.len(), 3);
        assert!(parsed[0].is_ok());
        assert!(parsed[1].is_err());
        let last = parsed[2].as_ref().unwrap();
        assert_eq!(last.timestamp, 42);
        assert_eq!(last.triple.subject, Term::uri("http://e/c"));
    }

    #[test]
    fn test_stop_flag_is_shared() {
        let source = MqttSource::new(MqttConfig::default());
        let flag = source.stop_flag();
        source.stop();
        assert!(flag.load(Ordering::Relaxed));
    }
}
