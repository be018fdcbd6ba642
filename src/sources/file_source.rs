//! Replay an N-Triples or N-Quads file at a fixed rate.

use crate::core::message::{now_millis, FactMessage};
use crate::error::Error;
use crate::parsing::rdf_parser::parse_rdf_line;
use crate::sources::SourceMetrics;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct FileSourceConfig {
    pub path: PathBuf,
    /// Facts per second; 0 replays as fast as possible.
    pub rate: u64,
    pub loop_file: bool,
    /// Stamp every fact with the wall clock instead of its file timestamp.
    pub add_timestamps: bool,
}

impl FileSourceConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), rate: 0, loop_file: false, add_timestamps: false }
    }
}

pub struct FileSource {
    config: FileSourceConfig,
    events_read: Arc<AtomicU64>,
    parse_errors: Arc<AtomicU64>,
    should_stop: Arc<AtomicBool>,
}

impl FileSource {
    pub fn new(config: FileSourceConfig) -> Self {
        Self {
            config,
            events_read: Arc::new(AtomicU64::new(0)),
            parse_errors: Arc::new(AtomicU64::new(0)),
            should_stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Read the file and pass every fact to `submit`, pacing by the configured
    /// rate. Returns when the file is exhausted (and `loop_file` is off) or
    /// when [`FileSource::stop`] is called.
    pub async fn replay<F>(&self, mut submit: F) -> Result<SourceMetrics, Error>
    where
        F: FnMut(FactMessage),
    {
        let text = tokio::fs::read_to_string(&self.config.path).await?;
        let lines: Vec<&str> =
            text.lines().map(str::trim).filter(|l| !l.is_empty() && !l.starts_with('#')).collect();

        info!(
            path = %self.config.path.display(),
            lines = lines.len(),
            rate = self.config.rate,
            "Replaying fact file"
        );

        let start = Instant::now();
        let mut ticker = (self.config.rate > 0).then(|| {
            let mut ticker = interval(Duration::from_secs_f64(1.0 / self.config.rate as f64));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Burst);
            ticker
        });

        'replay: loop {
            for line in &lines {
                if self.should_stop.load(Ordering::Relaxed) {
                    info!("Stop requested, ending replay");
                    break 'replay;
                }
                if let Some(ticker) = ticker.as_mut() {
                    ticker.tick().await;
                }
                match parse_rdf_line(line) {
                    Ok(mut fact) => {
                        if self.config.add_timestamps {
                            fact.timestamp = now_millis();
                        }
                        self.events_read.fetch_add(1, Ordering::Relaxed);
                        submit(fact);
                    }
                    Err(e) => {
                        self.parse_errors.fetch_add(1, Ordering::Relaxed);
                        warn!("Skipping line '{}': {}", line, e);
                    }
                }
            }
            if !self.config.loop_file || lines.is_empty() {
                break;
            }
            debug!("Reached end of file, looping");
        }

        Ok(self.metrics(start.elapsed().as_secs_f64()))
    }

    pub fn stop(&self) {
        self.should_stop.store(true, Ordering::Relaxed);
    }

    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        self.should_stop.clone()
    }

    fn metrics(&self, elapsed_seconds: f64) -> SourceMetrics {
        SourceMetrics {
            events_read: self.events_read.load(Ordering::Relaxed),
            parse_errors: self.parse_errors.load(Ordering::Relaxed),
            elapsed_seconds,
        }
    }
}
