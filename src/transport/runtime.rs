//! Tokio actor runtime.
//!
//! Every node instance runs as its own task with an unbounded mailbox and owns
//! its state exclusively. A task processes one delivery to completion, routes
//! the outputs, and only then acknowledges the delivery on the shared
//! [`InFlight`] counter. Sinks are written from a separate thread, see
//! [`sink_worker`](crate::transport::sink_worker).

use crate::core::message::{FactMessage, Message};
use crate::error::Error;
use crate::metrics::{EngineMetrics, MetricsSnapshot};
use crate::nodes::memory::Clock;
use crate::nodes::ReteNode;
use crate::sinks::FactSink;
use crate::topology::Topology;
use crate::transport::router::{Route, Router};
use crate::transport::sink_worker::{self, SinkWorker};
use crate::transport::{Envelope, InFlight};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

type Mailbox = mpsc::UnboundedSender<Envelope>;

struct Shared {
    router: Router,
    mailboxes: Vec<Vec<Mailbox>>,
    in_flight: InFlight,
    metrics: Arc<EngineMetrics>,
    max_redeliveries: u32,
}

impl Shared {
    /// Send one message along every route. All deliveries are counted before
    /// the first is sent, so the count cannot touch zero in between.
    fn send_all(&self, routes: Vec<Route>, message: &Message) {
        self.in_flight.add(routes.len());
        for route in routes {
            let envelope = match Envelope::new(route, message.clone(), false) {
                Ok(envelope) => envelope,
                Err(e) => {
                    EngineMetrics::incr(&self.metrics.dropped_deliveries);
                    error!("Dropping undeliverable message: {}", e);
                    self.in_flight.done();
                    continue;
                }
            };
            if self.mailboxes[route.node][route.instance].send(envelope).is_err() {
                EngineMetrics::incr(&self.metrics.dropped_deliveries);
                self.in_flight.done();
            }
        }
    }
}

pub struct Cluster;

impl Cluster {
    /// Instantiate every node and spawn one task per instance on the current
    /// runtime. `sinks` are attached to the conflict set.
    pub fn start(
        topology: Topology,
        clock: Arc<dyn Clock>,
        metrics: Arc<EngineMetrics>,
        sinks: Vec<Box<dyn FactSink>>,
    ) -> Result<ClusterHandle, Error> {
        let topology = Arc::new(topology);
        let in_flight = InFlight::new();
        let (dispatcher, sink_worker) =
            sink_worker::spawn(sinks, metrics.clone(), in_flight.clone())?;
        let mut dispatcher = Some(dispatcher);

        let mut nodes = Vec::new();
        let mut mailboxes = Vec::with_capacity(topology.nodes().len());
        let mut receivers = Vec::new();
        for decl in topology.nodes() {
            let mut senders = Vec::with_capacity(decl.parallelism);
            for _ in 0..decl.parallelism {
                let mut node = topology.instantiate(decl, clock.clone(), metrics.clone())?;
                if let ReteNode::ConflictSet(resolver) = &mut node {
                    if let Some(dispatcher) = dispatcher.take() {
                        resolver.add_sink(Box::new(dispatcher));
                    }
                }
                let (tx, rx) = mpsc::unbounded_channel();
                senders.push(tx);
                receivers.push(rx);
                nodes.push(node);
            }
            mailboxes.push(senders);
        }

        let shared = Arc::new(Shared {
            max_redeliveries: topology.config().max_redeliveries,
            router: Router::new(topology.clone()),
            mailboxes,
            in_flight: in_flight.clone(),
            metrics: metrics.clone(),
        });

        let (stop_tx, stop_rx) = watch::channel(false);
        let tasks = nodes
            .into_iter()
            .zip(receivers)
            .map(|(node, rx)| tokio::spawn(run_instance(node, rx, shared.clone(), stop_rx.clone())))
            .collect();

        info!(nodes = topology.nodes().len(), "Started RETE cluster");
        Ok(ClusterHandle { shared, in_flight, metrics, stop: stop_tx, tasks, sink_worker })
    }
}

async fn run_instance(
    mut node: ReteNode,
    mut mailbox: mpsc::UnboundedReceiver<Envelope>,
    shared: Arc<Shared>,
    mut stop: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            biased;
            _ = stop.changed() => break,
            envelope = mailbox.recv() => match envelope {
                Some(envelope) => handle(&mut node, envelope, &shared),
                None => break,
            },
        }
    }
    node.shutdown();
}

fn handle(node: &mut ReteNode, mut envelope: Envelope, shared: &Shared) {
    match envelope.delivery().and_then(|delivery| node.process(&delivery)) {
        Ok(outputs) => {
            for message in outputs {
                shared.send_all(shared.router.route(node.name(), &message), &message);
            }
            shared.in_flight.done();
        }
        Err(e) => {
            EngineMetrics::incr(&shared.metrics.failed_deliveries);
            let route = envelope.route;
            if envelope.attempts < shared.max_redeliveries {
                envelope.attempts += 1;
                warn!(
                    node = node.name(),
                    attempt = envelope.attempts,
                    "Redelivering after failure: {}",
                    e
                );
                if shared.mailboxes[route.node][route.instance].send(envelope).is_err() {
                    EngineMetrics::incr(&shared.metrics.dropped_deliveries);
                    shared.in_flight.done();
                }
            } else {
                EngineMetrics::incr(&shared.metrics.dropped_deliveries);
                error!(
                    node = node.name(),
                    "Dropping delivery after {} attempts: {}",
                    envelope.attempts + 1,
                    e
                );
                shared.in_flight.done();
            }
        }
    }
}

/// Handle to a running cluster.
pub struct ClusterHandle {
    shared: Arc<Shared>,
    in_flight: InFlight,
    metrics: Arc<EngineMetrics>,
    stop: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
    sink_worker: SinkWorker,
}

impl ClusterHandle {
    /// Submit an external fact to every source filter.
    pub fn submit(&self, fact: FactMessage) {
        EngineMetrics::incr(&self.metrics.facts_received);
        self.shared.send_all(self.shared.router.route_input(), &Message::Fact(fact));
    }

    pub fn in_flight(&self) -> &InFlight {
        &self.in_flight
    }

    /// Resolve once every submitted fact and everything it caused has been
    /// processed. Never resolves while a cyclic rule set keeps deriving.
    pub async fn wait_idle(&self) {
        self.in_flight.wait_idle().await;
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn metrics_handle(&self) -> Arc<EngineMetrics> {
        self.metrics.clone()
    }

    /// Signal every task to stop after its current delivery.
    pub fn stop(&self) {
        let _ = self.stop.send(true);
    }

    /// Stop every task and wait for it to exit. Sinks are flushed.
    pub async fn shutdown(self) {
        self.stop();
        for task in self.tasks {
            if let Err(e) = task.await {
                error!("Node task failed: {}", e);
            }
        }
        let sink_worker = self.sink_worker;
        if let Err(e) = tokio::task::spawn_blocking(move || sink_worker.join()).await {
            error!("Sink worker join failed: {}", e);
        }
        info!("RETE cluster stopped");
    }
}
