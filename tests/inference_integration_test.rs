//! End-to-end inference tests
//!
//! These tests drive compiled rule sets through the deterministic local
//! executor and verify:
//! - Join results independent of fact arrival order
//! - Window expiry and count eviction
//! - Literal matching in filter patterns
//! - Rejection of facts with literal subjects
//! - Schema and join key properties of compiled rules
//! - Join key partitioning across parallel join instances
//! - Unbounded feedback under cyclic rules
//! - bound and unbound tests on variables no pattern binds

use retestream::compiler::compile;
use retestream::config::EngineConfig;
use retestream::core::{Binding, FactMessage, GraphRef, Meta, Rule, Schema, Term, Triple};
use retestream::metrics::EngineMetrics;
use retestream::nodes::{FilterNode, ManualClock, WindowConfig, WindowedMemory};
use retestream::parsing::RuleParser;
use retestream::sinks::CollectingSink;
use retestream::topology::{NodeKind, TopologyBuilder};
use retestream::transport::{LocalCluster, RunOutcome};
use std::collections::HashSet;
use std::sync::Arc;

const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";
const SUBCLASS_OF: &str = "http://www.w3.org/2000/01/rdf-schema#subClassOf";
const SUBCLASS_RULE: &str = "[sub: (?x rdf:type ?c) (?c rdfs:subClassOf ?d) -> (?x rdf:type ?d)]";

fn ex(local: &str) -> Term {
    Term::uri(&format!("http://example.org/{}", local))
}

fn fact(subject: Term, predicate: Term, object: Term) -> FactMessage {
    FactMessage::assert(Triple::new(subject, predicate, object), 0)
}

fn local_cluster(
    rules: &str,
    config: EngineConfig,
    clock: ManualClock,
) -> (LocalCluster, CollectingSink) {
    let rules = RuleParser::new().parse_rules(rules).unwrap();
    let topology = TopologyBuilder::new(config).add_rules(rules).build().unwrap();
    let mut cluster =
        LocalCluster::new(topology, Arc::new(clock), Arc::new(EngineMetrics::new())).unwrap();
    let sink = CollectingSink::new();
    cluster.add_sink(Box::new(sink.clone()));
    (cluster, sink)
}

fn inferred(sink: &CollectingSink) -> HashSet<Triple> {
    sink.facts().into_iter().map(|f| f.triple).collect()
}

#[test]
fn test_subclass_inference_is_order_independent() {
    let expected = Triple::new(ex("a"), Term::uri(RDF_TYPE), ex("Animal"));
    let type_fact = fact(ex("a"), Term::uri(RDF_TYPE), ex("Cat"));
    let subclass_fact = fact(ex("Cat"), Term::uri(SUBCLASS_OF), ex("Animal"));

    for order in [[type_fact.clone(), subclass_fact.clone()], [subclass_fact, type_fact]] {
        let (mut cluster, sink) =
            local_cluster(SUBCLASS_RULE, EngineConfig::default(), ManualClock::new(0));
        for f in order {
            cluster.submit(f);
        }
        assert!(matches!(cluster.run(10_000), RunOutcome::Idle { .. }));
        assert!(inferred(&sink).contains(&expected));
    }
}

#[test]
fn test_expired_entry_does_not_join() {
    let clock = ManualClock::new(0);
    let window = WindowConfig { capacity: 100, range_ms: 1_000 };
    let config = EngineConfig::default().with_window(window);
    let (mut cluster, sink) = local_cluster(SUBCLASS_RULE, config, clock.clone());

    cluster.submit(fact(ex("a"), Term::uri(RDF_TYPE), ex("Cat")));
    cluster.run(10_000);

    clock.advance(1_001);
    cluster.submit(fact(ex("Cat"), Term::uri(SUBCLASS_OF), ex("Animal")));
    assert!(matches!(cluster.run(10_000), RunOutcome::Idle { .. }));

    assert!(sink.is_empty());
    assert_eq!(cluster.metrics().join_matches, 0);
    assert!(cluster.metrics().window_evictions >= 1);
}

#[test]
fn test_entry_inside_the_window_still_joins() {
    let clock = ManualClock::new(0);
    let window = WindowConfig { capacity: 100, range_ms: 1_000 };
    let config = EngineConfig::default().with_window(window);
    let (mut cluster, sink) = local_cluster(SUBCLASS_RULE, config, clock.clone());

    cluster.submit(fact(ex("a"), Term::uri(RDF_TYPE), ex("Cat")));
    cluster.run(10_000);

    clock.advance(999);
    cluster.submit(fact(ex("Cat"), Term::uri(SUBCLASS_OF), ex("Animal")));
    cluster.run(10_000);

    assert!(inferred(&sink).contains(&Triple::new(ex("a"), Term::uri(RDF_TYPE), ex("Animal"))));
}

#[test]
fn test_literal_object_match() {
    let rule = RuleParser::new()
        .with_prefix("ex", "http://example.org/")
        .parse_rule("[(?x ex:p \"literal\") -> (?x ex:q ex:hit)]")
        .unwrap();
    let compiled = compile(&rule, "lit").unwrap();
    let metrics = Arc::new(EngineMetrics::new());
    let filter = FilterNode::new("lit_filter_0", compiled.filters[0].clone(), metrics);

    let hit = filter.match_fact(&fact(ex("a"), ex("p"), Term::literal("literal"))).unwrap();
    assert_eq!(hit, Binding::new(vec![ex("a")]));
    assert!(filter.match_fact(&fact(ex("a"), ex("p"), Term::literal("other"))).is_none());
}

#[test]
fn test_literal_subject_is_never_emitted() {
    let rules = "@prefix ex: <http://example.org/> .\n\
                 [swap: (?x ex:label ?y) -> (?y ex:labelOf ?x)]";
    let config = EngineConfig { feedback: false, ..EngineConfig::default() };
    let (mut cluster, sink) = local_cluster(rules, config, ManualClock::new(0));

    cluster.submit(fact(ex("a"), ex("label"), Term::literal("Alice")));
    cluster.submit(fact(ex("b"), ex("label"), ex("bee")));
    cluster.run(10_000);

    let facts = inferred(&sink);
    assert_eq!(facts.len(), 1);
    assert!(facts.iter().all(|t| !t.subject.is_literal()));
    let metrics = cluster.metrics();
    assert_eq!(metrics.fires, 2);
    assert_eq!(metrics.facts_rejected, 1);
}

#[test]
fn test_window_keeps_most_recent_entries() {
    let mut memory = WindowedMemory::new(WindowConfig { capacity: 3, range_ms: 1_000_000 });
    for i in 0..5 {
        let binding = Binding::new(vec![Term::literal(&i.to_string())]);
        memory.insert(binding, Meta::added(GraphRef::empty(), i), i);
    }

    assert_eq!(memory.len(), 3);
    let kept: Vec<Term> = memory.iter().map(|e| e.binding.values()[0].clone()).collect();
    assert_eq!(kept, vec![Term::literal("2"), Term::literal("3"), Term::literal("4")]);
    assert_eq!(memory.total_evicted(), 2);
}

#[test]
fn test_filter_schema_counts_distinct_variables() {
    let rule = Rule::parse(
        "[(?x <http://e/p> ?x) (?x <http://e/q> f(?y, ?z)) (<http://e/a> <http://e/r> ?w) \
         -> (?x <http://e/s> ?w)]",
    )
    .unwrap();
    let compiled = compile(&rule, "r").unwrap();
    let lengths: Vec<usize> = compiled.filters.iter().map(|f| f.schema.len()).collect();
    assert_eq!(lengths, vec![1, 3, 1]);
}

#[test]
fn test_join_keys_are_exactly_the_shared_variables() {
    let rule = Rule::parse(
        "[(?a <http://e/p> ?b) (?b <http://e/q> ?c) (?c <http://e/r> ?a) -> (?a <http://e/s> ?c)]",
    )
    .unwrap();
    let compiled = compile(&rule, "r").unwrap();

    for join in &compiled.joins {
        let left: HashSet<&String> = join.left_schema.vars().iter().collect();
        let right: HashSet<&String> = join.right_schema.vars().iter().collect();
        let shared: HashSet<&String> = left.intersection(&right).copied().collect();
        let keys: HashSet<&String> = join.keys.vars.iter().collect();
        assert_eq!(keys, shared);
    }
    assert_eq!(compiled.joins.len(), 2);
    assert_eq!(compiled.joins[1].keys.len(), 2);
}

#[test]
fn test_rule_text_round_trip() {
    let mut parser = RuleParser::new();
    let rules = parser
        .parse_rules(
            "@prefix ex: <http://example.org/> .\n\
             [r1: (?x ex:age ?a) greaterThan(?a, 17) -> (?x rdf:type ex:Adult)]\n\
             [(?x ex:name \"Ann\"@en) (?x ex:score 4.5) -> (?x ex:tag 'ok'^^xsd:string)]",
        )
        .unwrap();

    for rule in rules {
        let reparsed = Rule::parse(&rule.to_string()).unwrap();
        assert_eq!(reparsed, rule);
    }
}

#[test]
fn test_parallel_joins_find_every_match() {
    let mut config = EngineConfig { feedback: false, ..EngineConfig::default() };
    config.parallelism.join = 4;
    config.parallelism.filter = 3;
    config.parallelism.terminal = 2;
    let (mut cluster, sink) = local_cluster(SUBCLASS_RULE, config, ManualClock::new(0));

    for i in 0..20 {
        let class = ex(&format!("C{}", i % 5));
        cluster.submit(fact(ex(&format!("i{}", i)), Term::uri(RDF_TYPE), class));
    }
    for c in 0..5 {
        cluster.submit(fact(ex(&format!("C{}", c)), Term::uri(SUBCLASS_OF), ex("Top")));
    }
    assert!(matches!(cluster.run(100_000), RunOutcome::Idle { .. }));

    let facts = inferred(&sink);
    for i in 0..20 {
        let expected = Triple::new(ex(&format!("i{}", i)), Term::uri(RDF_TYPE), ex("Top"));
        assert!(facts.contains(&expected));
    }
    assert_eq!(facts.len(), 20);
}

#[test]
fn test_transitive_chain_through_feedback() {
    let rules = "@prefix ex: <http://example.org/> .\n\
                 [trans: (?a ex:before ?b) (?b ex:before ?c) -> (?a ex:before ?c)]";
    let (mut cluster, sink) = local_cluster(rules, EngineConfig::default(), ManualClock::new(0));

    for (a, b) in [("t1", "t2"), ("t2", "t3"), ("t3", "t4")] {
        cluster.submit(fact(ex(a), ex("before"), ex(b)));
    }
    assert!(matches!(cluster.run(100_000), RunOutcome::Idle { .. }));

    let facts = inferred(&sink);
    assert!(facts.contains(&Triple::new(ex("t1"), ex("before"), ex("t3"))));
    assert!(facts.contains(&Triple::new(ex("t2"), ex("before"), ex("t4"))));
    assert!(facts.contains(&Triple::new(ex("t1"), ex("before"), ex("t4"))));
}

#[test]
fn test_cyclic_rules_rederive_until_the_budget_runs_out() {
    let rules = "[sym: (?x <http://example.org/knows> ?y) -> (?y <http://example.org/knows> ?x)]";
    let (mut cluster, sink) = local_cluster(rules, EngineConfig::default(), ManualClock::new(0));

    cluster.submit(fact(ex("a"), ex("knows"), ex("b")));
    let outcome = cluster.run(500);

    assert!(matches!(outcome, RunOutcome::BudgetExhausted { steps: 500, .. }));
    assert!(sink.len() > 2);
    assert_eq!(inferred(&sink).len(), 2);
    assert!(!cluster.in_flight().is_idle());
}

#[test]
fn test_filters_are_shared_between_rules() {
    let rules = "@prefix ex: <http://example.org/> .\n\
                 [r1: (?x rdf:type ?c) -> (?x ex:typed ex:yes)]\n\
                 [r2: (?s rdf:type ?k) (?k rdfs:subClassOf ?d) -> (?s rdf:type ?d)]";
    let rules = RuleParser::new().parse_rules(rules).unwrap();
    let topology = TopologyBuilder::new(EngineConfig::default()).add_rules(rules).build().unwrap();

    let filters = topology.nodes().iter().filter(|n| matches!(n.kind, NodeKind::Filter(_))).count();
    assert_eq!(filters, 2);

    let schema = match &topology.node("r1_filter_0").unwrap().kind {
        NodeKind::Filter(spec) => spec.schema.clone(),
        _ => unreachable!(),
    };
    assert_eq!(schema.len(), Schema::new(vec!["x".to_string(), "c".to_string()]).len());
}

#[test]
fn test_unbound_test_on_variable_outside_patterns() {
    let rules = "@prefix ex: <http://example.org/> .\n\
                 [tag: (?x ex:name ?n) unbound(?missing) bound(?n) -> (?x ex:tagged ?n)]";
    let config = EngineConfig { feedback: false, ..EngineConfig::default() };
    let (mut cluster, sink) = local_cluster(rules, config, ManualClock::new(0));

    cluster.submit(fact(ex("a"), ex("name"), Term::literal("Ann")));
    assert!(matches!(cluster.run(1_000), RunOutcome::Idle { .. }));
    let expected = Triple::new(ex("a"), ex("tagged"), Term::literal("Ann"));
    assert_eq!(inferred(&sink), HashSet::from([expected]));
    assert_eq!(cluster.metrics().guard_rejections, 0);
}
