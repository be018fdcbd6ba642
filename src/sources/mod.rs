//! Fact sources.
//!
//! A source turns an external stream of N-Triples lines into [`FactMessage`]s and
//! hands each one to a submit callback, usually `ClusterHandle::submit`. Lines
//! that do not parse are logged and counted; they never stop the stream.
//!
//! [`FactMessage`]: crate::core::message::FactMessage

pub mod file_source;
pub mod mqtt_source;

pub use file_source::{FileSource, FileSourceConfig};
pub use mqtt_source::MqttSource;

use serde::Serialize;

/// Counters reported by a source once it stops.
#[derive(Clone, Debug, Default, Serialize)]
pub struct SourceMetrics {
    pub events_read: u64,
    pub parse_errors: u64,
    pub elapsed_seconds: f64,
}

impl SourceMetrics {
    pub fn events_per_second(&self) -> f64 {
        if self.elapsed_seconds > 0.0 {
            self.events_read as f64 / self.elapsed_seconds
        } else {
            0.0
        }
    }
}
