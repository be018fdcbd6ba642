//! Deterministic in-process executor.
//!
//! All node instances live in one thread and deliveries are processed in FIFO
//! order, one at a time. Runs are reproducible, which makes this the executor for
//! tests and for offline replay. `run` takes a step budget because cyclic rule
//! sets can derive facts forever.

use crate::core::message::{FactMessage, Message};
use crate::error::{Error, TopologyError};
use crate::metrics::{EngineMetrics, MetricsSnapshot};
use crate::nodes::memory::Clock;
use crate::nodes::{Port, ReteNode};
use crate::sinks::FactSink;
use crate::topology::{Topology, CONFLICT_SET};
use crate::transport::router::{Route, Router};
use crate::transport::{Envelope, InFlight};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, error, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every delivery was acknowledged.
    Idle { steps: u64 },
    /// The budget ran out with deliveries still queued.
    BudgetExhausted { steps: u64, pending: usize },
}

pub struct LocalCluster {
    router: Router,
    instances: Vec<Vec<ReteNode>>,
    queue: VecDeque<Envelope>,
    in_flight: InFlight,
    metrics: Arc<EngineMetrics>,
    max_redeliveries: u32,
    encode_on_wire: bool,
}

impl LocalCluster {
    pub fn new(
        topology: Topology,
        clock: Arc<dyn Clock>,
        metrics: Arc<EngineMetrics>,
    ) -> Result<Self, Error> {
        let topology = Arc::new(topology);
        let mut instances = Vec::with_capacity(topology.nodes().len());
        for decl in topology.nodes() {
            let nodes = (0..decl.parallelism)
                .map(|_| topology.instantiate(decl, clock.clone(), metrics.clone()))
                .collect::<Result<Vec<_>, _>>()?;
            instances.push(nodes);
        }

        Ok(Self {
            max_redeliveries: topology.config().max_redeliveries,
            router: Router::new(topology),
            instances,
            queue: VecDeque::new(),
            in_flight: InFlight::new(),
            metrics,
            encode_on_wire: false,
        })
    }

    /// Encode and decode every message on every hop.
    pub fn with_encode_on_wire(mut self, encode: bool) -> Self {
        self.encode_on_wire = encode;
        self
    }

    pub fn add_sink(&mut self, sink: Box<dyn FactSink>) {
        let Some(index) = self.router.topology().node_index(CONFLICT_SET) else {
            return;
        };
        if let Some(ReteNode::ConflictSet(resolver)) = self.instances[index].get_mut(0) {
            resolver.add_sink(sink);
        }
    }

    pub fn topology(&self) -> &Topology {
        self.router.topology()
    }

    /// Submit an external fact to every source filter.
    pub fn submit(&mut self, fact: FactMessage) {
        EngineMetrics::incr(&self.metrics.facts_received);
        for route in self.router.route_input() {
            self.enqueue(route, Message::Fact(fact.clone()));
        }
    }

    /// Deliver a message straight to one node instance.
    pub fn submit_to(
        &mut self,
        node: &str,
        instance: usize,
        port: Port,
        message: Message,
    ) -> Result<(), Error> {
        let index = self
            .router
            .topology()
            .node_index(node)
            .ok_or_else(|| TopologyError::UnknownNode(node.to_string()))?;
        if instance >= self.instances[index].len() {
            return Err(TopologyError::UnknownNode(format!("{}[{}]", node, instance)).into());
        }
        self.enqueue(Route { node: index, instance, port }, message);
        Ok(())
    }

    fn enqueue(&mut self, route: Route, message: Message) {
        match Envelope::new(route, message, self.encode_on_wire) {
            Ok(envelope) => {
                self.in_flight.add(1);
                self.queue.push_back(envelope);
            }
            Err(e) => {
                EngineMetrics::incr(&self.metrics.dropped_deliveries);
                error!("Dropping undeliverable message: {}", e);
            }
        }
    }

    /// Process the next delivery. Returns false when the queue is empty.
    pub fn step(&mut self) -> bool {
        let Some(mut envelope) = self.queue.pop_front() else {
            return false;
        };
        let Route { node, instance, .. } = envelope.route;
        let target = &mut self.instances[node][instance];

        let result = envelope.delivery().and_then(|delivery| target.process(&delivery));
        match result {
            Ok(outputs) => {
                let from = target.name().to_string();
                for message in outputs {
                    for route in self.router.route(&from, &message) {
                        self.enqueue(route, message.clone());
                    }
                }
                self.in_flight.done();
            }
            Err(e) => {
                EngineMetrics::incr(&self.metrics.failed_deliveries);
                if envelope.attempts < self.max_redeliveries {
                    envelope.attempts += 1;
                    warn!(
                        node = target.name(),
                        attempt = envelope.attempts,
                        "Redelivering after failure: {}",
                        e
                    );
                    self.queue.push_back(envelope);
                } else {
                    EngineMetrics::incr(&self.metrics.dropped_deliveries);
                    error!(
                        node = target.name(),
                        "Dropping delivery after {} attempts: {}",
                        envelope.attempts + 1,
                        e
                    );
                    self.in_flight.done();
                }
            }
        }
        true
    }

    /// Process until idle or until `max_steps` deliveries have been handled.
    pub fn run(&mut self, max_steps: u64) -> RunOutcome {
        let mut steps = 0;
        while steps < max_steps {
            if !self.step() {
                debug!(steps, "Local cluster idle");
                return RunOutcome::Idle { steps };
            }
            steps += 1;
        }
        if self.queue.is_empty() {
            RunOutcome::Idle { steps }
        } else {
            RunOutcome::BudgetExhausted { steps, pending: self.queue.len() }
        }
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn in_flight(&self) -> &InFlight {
        &self.in_flight
    }

    pub fn node(&self, name: &str, instance: usize) -> Option<&ReteNode> {
        let index = self.router.topology().node_index(name)?;
        self.instances[index].get(instance)
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Flush sinks. Queued deliveries are discarded.
    pub fn shutdown(&mut self) {
        for node in self.instances.iter_mut().flatten() {
            node.shutdown();
        }
        self.queue.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::core::binding::Binding;
    use crate::core::message::{FireEvent, GraphRef, Meta};
    use crate::core::term::{Term, Triple};
    use crate::nodes::ManualClock;
    use crate::parsing::RuleParser;
    use crate::sinks::CollectingSink;
    use crate::topology::TopologyBuilder;

    fn cluster(rules: &str, config: EngineConfig) -> LocalCluster {
        let rules = RuleParser::new().parse_rules(rules).unwrap();
        let topology = TopologyBuilder::new(config).add_rules(rules).build().unwrap();
        LocalCluster::new(topology, Arc::new(ManualClock::new(0)), Arc::new(EngineMetrics::new()))
            .unwrap()
    }

    fn fact(s: &str, p: &str, o: &str) -> FactMessage {
        FactMessage::assert(Triple::new(Term::uri(s), Term::uri(p), Term::uri(o)), 0)
    }

    #[test]
    fn test_single_pattern_rule_fires_through_the_wire() {
        let mut cluster = cluster(
            "[(?x <http://e/p> ?y) -> (?y <http://e/q> ?x)]",
            EngineConfig { feedback: false, ..EngineConfig::default() },
        )
        .with_encode_on_wire(true);
        let sink = CollectingSink::new();
        cluster.add_sink(Box::new(sink.clone()));

        cluster.submit(fact("http://e/a", "http://e/p", "http://e/b"));
        assert!(matches!(cluster.run(100), RunOutcome::Idle { .. }));
        assert!(cluster.in_flight().is_idle());

        let facts = sink.facts();
        assert_eq!(facts.len(), 1);
        assert_eq!(
            facts[0].triple,
            Triple::new(Term::uri("http://e/b"), Term::uri("http://e/q"), Term::uri("http://e/a"))
        );
    }

    #[test]
    fn test_failed_delivery_is_redelivered_then_dropped() {
        let mut config = EngineConfig::default();
        config.max_redeliveries = 2;
        let mut cluster = cluster("[(?x <http://e/p> ?y) -> (?y <http://e/q> ?x)]", config);

        // a fire event is not something a filter can process
        cluster
            .submit_to(
                "rule_0_filter_0",
                0,
                Port::Input,
                Message::Fire(FireEvent {
                    rule_id: "rule_0".to_string(),
                    binding: Binding::new(vec![]),
                    meta: Meta::added(GraphRef::empty(), 0),
                }),
            )
            .unwrap();

        assert_eq!(cluster.run(100), RunOutcome::Idle { steps: 3 });
        let metrics = cluster.metrics();
        assert_eq!(metrics.failed_deliveries, 3);
        assert_eq!(metrics.dropped_deliveries, 1);
        assert!(cluster.in_flight().is_idle());
    }

    #[test]
    fn test_unknown_target_is_rejected() {
        let mut cluster =
            cluster("[(?x <http://e/p> ?y) -> (?y <http://e/q> ?x)]", EngineConfig::default());
        let msg = Message::Fact(fact("http://e/a", "http://e/p", "http://e/b"));
        assert!(cluster.submit_to("nope", 0, Port::Input, msg.clone()).is_err());
        assert!(cluster.submit_to("rule_0_filter_0", 9, Port::Input, msg).is_err());
    }
}
