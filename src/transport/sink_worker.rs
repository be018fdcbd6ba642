//! Sink I/O off the actor tasks.
//!
//! The runtime gives the conflict set a [`SinkDispatcher`] instead of the real
//! sinks. The dispatcher only enqueues; a dedicated thread owns the sinks and
//! writes each fact to all of them. Every queued fact is counted on the
//! cluster's [`InFlight`] until it has been written, so a cluster is not idle
//! while sink writes are pending.

use crate::core::message::InferredFact;
use crate::error::SinkError;
use crate::metrics::EngineMetrics;
use crate::sinks::FactSink;
use crate::transport::InFlight;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use tracing::{debug, error, warn};

enum SinkCommand {
    Write(InferredFact),
    Flush,
}

/// Sender half handed to the conflict set.
pub struct SinkDispatcher {
    tx: mpsc::Sender<SinkCommand>,
    in_flight: InFlight,
}

/// The thread that owns the sinks. Exits once every dispatcher is dropped,
/// after writing what was queued and flushing.
pub struct SinkWorker {
    handle: thread::JoinHandle<()>,
}

/// Move `sinks` onto a new thread.
pub fn spawn(
    sinks: Vec<Box<dyn FactSink>>,
    metrics: Arc<EngineMetrics>,
    in_flight: InFlight,
) -> Result<(SinkDispatcher, SinkWorker), SinkError> {
    let (tx, rx) = mpsc::channel();
    let worker_in_flight = in_flight.clone();
    let handle = thread::Builder::new()
        .name("retestream-sinks".to_string())
        .spawn(move || run(sinks, rx, &metrics, &worker_in_flight))?;
    Ok((SinkDispatcher { tx, in_flight }, SinkWorker { handle }))
}

fn run(
    mut sinks: Vec<Box<dyn FactSink>>,
    rx: mpsc::Receiver<SinkCommand>,
    metrics: &EngineMetrics,
    in_flight: &InFlight,
) {
    for command in rx {
        match command {
            SinkCommand::Write(fact) => {
                for sink in &mut sinks {
                    if let Err(e) = sink.consume(&fact) {
                        EngineMetrics::incr(&metrics.sink_errors);
                        warn!(sink = sink.name(), "Failed to export {}: {}", fact.triple, e);
                    }
                }
                in_flight.done();
            }
            SinkCommand::Flush => flush_all(&mut sinks),
        }
    }
    flush_all(&mut sinks);
    debug!("Sink worker stopped");
}

fn flush_all(sinks: &mut [Box<dyn FactSink>]) {
    for sink in sinks {
        if let Err(e) = sink.flush() {
            warn!(sink = sink.name(), "Failed to flush: {}", e);
        }
    }
}

impl FactSink for SinkDispatcher {
    fn name(&self) -> &str {
        "dispatcher"
    }

    fn consume(&mut self, fact: &InferredFact) -> Result<(), SinkError> {
        self.in_flight.add(1);
        if self.tx.send(SinkCommand::Write(fact.clone())).is_err() {
            self.in_flight.done();
            return Err(SinkError::Broker("sink worker has stopped".to_string()));
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        self.tx
            .send(SinkCommand::Flush)
            .map_err(|_| SinkError::Broker("sink worker has stopped".to_string()))
    }
}

impl SinkWorker {
    /// Wait for the thread to drain its queue. Only returns once every
    /// dispatcher has been dropped.
    pub fn join(self) {
        if self.handle.join().is_err() {
            error!("Sink worker panicked");
        }
    }
}
