//! Messages exchanged between nodes.
//!
//! Every binding message starts with the base fields `isAdd`, `graph` and
//! `timestamp`, followed by the producer's schema fields in schema order. That
//! positional layout is the wire contract between a producer and its consumers.

use crate::core::binding::Binding;
use crate::core::term::{Term, Triple};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::{SystemTime, UNIX_EPOCH};

/// Names of the metadata fields that precede every node's schema fields.
pub const BASE_FIELDS: [&str; 3] = ["isAdd", "graph", "timestamp"];

/// Milliseconds since the epoch.
pub fn now_millis() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as i64).unwrap_or(0)
}

/// The facts that contributed to a binding.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GraphRef(BTreeSet<Triple>);

impl GraphRef {
    pub fn empty() -> Self {
        GraphRef(BTreeSet::new())
    }

    pub fn of(fact: Triple) -> Self {
        let mut set = BTreeSet::new();
        set.insert(fact);
        GraphRef(set)
    }

    pub fn union(&self, other: &GraphRef) -> GraphRef {
        GraphRef(self.0.union(&other.0).cloned().collect())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn triples(&self) -> impl Iterator<Item = &Triple> {
        self.0.iter()
    }
}

/// Base fields carried by every message.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Meta {
    pub is_add: bool,
    pub graph: GraphRef,
    pub timestamp: i64,
}

impl Meta {
    pub fn added(graph: GraphRef, timestamp: i64) -> Self {
        Self { is_add: true, graph, timestamp }
    }
}

/// An input fact: `{subject, predicate, object, isAdd, graph, timestamp}`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FactMessage {
    pub triple: Triple,
    pub is_add: bool,
    pub graph: GraphRef,
    pub timestamp: i64,
}

impl FactMessage {
    /// A fresh assertion whose provenance is the fact itself.
    pub fn assert(triple: Triple, timestamp: i64) -> Self {
        Self { graph: GraphRef::of(triple.clone()), triple, is_add: true, timestamp }
    }

    pub fn subject(&self) -> &Term {
        &self.triple.subject
    }

    pub fn predicate(&self) -> &Term {
        &self.triple.predicate
    }

    pub fn object(&self) -> &Term {
        &self.triple.object
    }
}

/// Output of filters and joins: base fields followed by schema-ordered values.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BindingMessage {
    pub meta: Meta,
    pub binding: Binding,
}

impl BindingMessage {
    pub fn new(meta: Meta, binding: Binding) -> Self {
        Self { meta, binding }
    }

    /// Declared field names for a producer with `variable_count` schema fields.
    pub fn declared_fields(variable_count: usize) -> Vec<String> {
        let mut fields: Vec<String> = BASE_FIELDS.iter().map(|f| f.to_string()).collect();
        fields.extend((0..variable_count).map(|i| format!("?{}", i)));
        fields
    }
}

/// A complete rule-body binding whose guards succeeded.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FireEvent {
    pub rule_id: String,
    pub binding: Binding,
    pub meta: Meta,
}

/// A concrete triple produced by instantiating a rule head.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InferredFact {
    pub triple: Triple,
    pub rule_id: String,
    pub support: GraphRef,
    pub timestamp: i64,
}

impl InferredFact {
    /// The re-injection message: an assertion with a fresh timestamp.
    pub fn to_fact_message(&self, timestamp: i64) -> FactMessage {
        FactMessage::assert(self.triple.clone(), timestamp)
    }
}

/// Everything that travels over a topology edge.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Message {
    Fact(FactMessage),
    Binding(BindingMessage),
    Fire(FireEvent),
}

impl Message {
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Fact(_) => "fact",
            Message::Binding(_) => "binding",
            Message::Fire(_) => "fire",
        }
    }
}
