//! # retestream
//!
//! A distributed RETE engine for forward-chaining inference over live RDF
//! triple streams.
//!
//! Rules are compiled into a network of filter (alpha), join (beta), terminal
//! and conflict-set nodes. Each node is a single-threaded actor; a transport
//! routes messages between node instances and partitions join inputs by their
//! join key so that matching bindings always meet on the same instance. Joins
//! keep bounded, time-windowed memories, and inferred facts are written to
//! external sinks and fed back into the network.
//!
//! ## Features
//!
//! - Jena-style rule syntax with guard builtins
//! - Filter sharing across rules
//! - Count and time bounded join windows
//! - Deterministic local executor and a tokio actor runtime
//! - N-Triples file, MQTT and Kafka sinks; file and MQTT sources
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use retestream::config::EngineConfig;
//! use retestream::core::{FactMessage, Term, Triple};
//! use retestream::metrics::EngineMetrics;
//! use retestream::nodes::SystemClock;
//! use retestream::parsing::RuleParser;
//! use retestream::sinks::CollectingSink;
//! use retestream::topology::TopologyBuilder;
//! use retestream::transport::{LocalCluster, RunOutcome};
//!
//! fn main() -> retestream::Result<()> {
//!     let rules = RuleParser::new()
//!         .parse_rules("[(?x <http://e/parent> ?y) -> (?y <http://e/child> ?x)]")?;
//!     let config = EngineConfig { feedback: false, ..EngineConfig::default() };
//!     let topology = TopologyBuilder::new(config).add_rules(rules).build()?;
//!
//!     let mut cluster =
//!         LocalCluster::new(topology, Arc::new(SystemClock), Arc::new(EngineMetrics::new()))?;
//!     let sink = CollectingSink::new();
//!     cluster.add_sink(Box::new(sink.clone()));
//!
//!     let fact = Triple::new(
//!         Term::uri("http://e/ann"),
//!         Term::uri("http://e/parent"),
//!         Term::uri("http://e/bob"),
//!     );
//!     cluster.submit(FactMessage::assert(fact, 0));
//!     assert!(matches!(cluster.run(1_000), RunOutcome::Idle { .. }));
//!     assert_eq!(sink.len(), 1);
//!     Ok(())
//! }
//! ```

#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::redundant_closure_for_method_calls)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::new_without_default)]

/// Core data structures and types
pub mod core;

/// Rule and fact parsers
pub mod parsing;

/// Rule compiler: schemas, join keys and join plans
pub mod compiler;

/// RETE node implementations
pub mod nodes;

/// Topology builder
pub mod topology;

/// Message routing and executors
pub mod transport;

pub mod sinks;

pub mod sources;

pub mod config;

pub mod metrics;

/// HTTP ingestion and metrics adapter
pub mod http;

pub mod error;

// Re-export commonly used types
pub use error::{Error, Result};
