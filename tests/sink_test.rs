//! Sink integration tests
//!
//! These tests verify:
//! - Inferred facts written to an N-Triples file
//! - Sink construction from configuration
//! - The file output parses back as facts

use retestream::config::{EngineConfig, SinkConfig};
use retestream::core::{FactMessage, Term, Triple};
use retestream::metrics::EngineMetrics;
use retestream::nodes::ManualClock;
use retestream::parsing::{rdf_parser, RuleParser};
use retestream::sinks;
use retestream::topology::TopologyBuilder;
use retestream::transport::{LocalCluster, RunOutcome};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

fn temp_path(name: &str) -> PathBuf {
    let path =
        std::env::temp_dir().join(format!("retestream_sink_{}_{}.nt", name, std::process::id()));
    let _ = fs::remove_file(&path);
    path
}

#[test]
fn test_from_config_without_sinks_is_empty() {
    let sinks = sinks::from_config(&SinkConfig::default()).unwrap();
    assert!(sinks.is_empty());
}

#[test]
fn test_inferred_facts_are_written_as_ntriples() {
    let path = temp_path("inferred");
    let config = EngineConfig {
        feedback: false,
        sinks: SinkConfig { file: Some(path.clone()), ..SinkConfig::default() },
        ..EngineConfig::default()
    };

    let rules = RuleParser::new()
        .parse_rules("[(?x <http://e/name> ?n) -> (?x <http://e/label> ?n)]")
        .unwrap();
    let topology = TopologyBuilder::new(config.clone()).add_rules(rules).build().unwrap();
    let mut cluster =
        LocalCluster::new(topology, Arc::new(ManualClock::new(0)), Arc::new(EngineMetrics::new()))
            .unwrap();
    for sink in sinks::from_config(&config.sinks).unwrap() {
        cluster.add_sink(sink);
    }

    let ann = Term::literal("Ann \"A\"");
    cluster.submit(FactMessage::assert(
        Triple::new(Term::uri("http://e/a"), Term::uri("http://e/name"), ann.clone()),
        0,
    ));
    cluster.submit(FactMessage::assert(
        Triple::new(Term::blank("b1"), Term::uri("http://e/name"), Term::literal("Bob")),
        0,
    ));
    assert!(matches!(cluster.run(1_000), RunOutcome::Idle { .. }));
    cluster.shutdown();

    let written = fs::read_to_string(&path).unwrap();
    let facts = rdf_parser::parse_rdf_document(&written).unwrap();
    assert_eq!(facts.len(), 2);
    assert_eq!(
        facts[0].triple,
        Triple::new(Term::uri("http://e/a"), Term::uri("http://e/label"), ann)
    );
    assert_eq!(facts[1].triple.subject, Term::blank("b1"));
    assert_eq!(cluster.metrics().sink_errors, 0);

    fs::remove_file(path).unwrap();
}

#[test]
fn test_unwritable_file_sink_fails_at_startup() {
    let config = SinkConfig {
        file: Some(PathBuf::from("/nonexistent/dir/out.nt")),
        ..SinkConfig::default()
    };
    assert!(sinks::from_config(&config).is_err());
}
