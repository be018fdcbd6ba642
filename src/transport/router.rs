//! Edge routing and instance selection.
//!
//! A join only sees matches between bindings that reach the same instance, so
//! field grouping must send value-equal join keys to the same instance. Keys are
//! hashed through `Term::value_key`, which is identical for value-equal terms.

use crate::core::message::Message;
use crate::core::term::Term;
use crate::nodes::Port;
use crate::topology::{Edge, Grouping, Topology};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// A target node instance and the port it receives on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Route {
    pub node: usize,
    pub instance: usize,
    pub port: Port,
}

/// Instance for a set of key values. Equal keys always give the same instance.
pub fn partition<'a, I>(values: I, parallelism: usize) -> usize
where
    I: IntoIterator<Item = &'a Term>,
{
    if parallelism <= 1 {
        return 0;
    }
    let mut hasher = DefaultHasher::new();
    for value in values {
        value.value_key().hash(&mut hasher);
    }
    (hasher.finish() % parallelism as u64) as usize
}

#[derive(Debug)]
pub struct Router {
    topology: Arc<Topology>,
    // round-robin position per target node
    cursors: Vec<AtomicUsize>,
}

impl Router {
    pub fn new(topology: Arc<Topology>) -> Self {
        let cursors = topology.nodes().iter().map(|_| AtomicUsize::new(0)).collect();
        Self { topology, cursors }
    }

    pub fn topology(&self) -> &Arc<Topology> {
        &self.topology
    }

    /// Targets for a message emitted by `from`.
    pub fn route(&self, from: &str, message: &Message) -> Vec<Route> {
        self.topology.outgoing(from).filter_map(|edge| self.select(edge, message)).collect()
    }

    /// Targets for an external input fact: one instance of every source filter.
    pub fn route_input(&self) -> Vec<Route> {
        self.topology
            .sources()
            .iter()
            .filter_map(|name| {
                let node = self.topology.node_index(name)?;
                Some(Route { node, instance: self.next_instance(node), port: Port::Input })
            })
            .collect()
    }

    fn select(&self, edge: &Edge, message: &Message) -> Option<Route> {
        let node = self.topology.node_index(&edge.to)?;
        let parallelism = self.topology.nodes()[node].parallelism;

        let instance = match (&edge.grouping, message) {
            (Grouping::Global, _) => 0,
            (Grouping::Shuffle, _) => self.next_instance(node),
            (Grouping::Fields(positions), Message::Binding(msg)) => {
                partition(positions.iter().filter_map(|&p| msg.binding.get(p)), parallelism)
            }
            (Grouping::Fields(_), _) => 0,
        };
        Some(Route { node, instance, port: edge.port })
    }

    fn next_instance(&self, node: usize) -> usize {
        let parallelism = self.topology.nodes()[node].parallelism.max(1);
        self.cursors[node].fetch_add(1, Ordering::Relaxed) % parallelism
    }
}
