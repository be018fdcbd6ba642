//! Topology builder.
//!
//! Wires compiled rules into a network of node declarations and routed edges.
//! Filters are shared across every rule whose pattern is the same up to variable
//! renaming. Each join is fed by field grouping on its join keys, so equal keys
//! meet on one instance. Every terminal feeds the single conflict set, which
//! feeds accepted facts back into every filter.

use crate::compiler::{compile, CompiledRule, FilterSpec, JoinSpec, Stage};
use crate::config::EngineConfig;
use crate::core::rule::Rule;
use crate::error::{Error, RuleError, TopologyError};
use crate::metrics::EngineMetrics;
use crate::nodes::memory::Clock;
use crate::nodes::{ConflictSetResolver, FilterNode, JoinNode, Port, ReteNode, TerminalNode};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

pub const CONFLICT_SET: &str = "conflict_set";

/// How a producer's output is spread over a consumer's instances.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Grouping {
    /// Any instance.
    Shuffle,
    /// Hash of the values at these binding positions.
    Fields(Vec<usize>),
    /// Always instance 0.
    Global,
}

#[derive(Clone, Debug)]
pub enum NodeKind {
    Filter(FilterSpec),
    Join { rule_id: String, spec: JoinSpec },
    Terminal { rule_id: String, rule_text: String, input_arity: usize },
    ConflictSet,
}

#[derive(Clone, Debug)]
pub struct NodeDecl {
    pub name: String,
    pub kind: NodeKind,
    pub parallelism: usize,
}

impl NodeDecl {
    /// Number of schema fields this node emits, for binding producers.
    pub fn output_arity(&self) -> Option<usize> {
        match &self.kind {
            NodeKind::Filter(spec) => Some(spec.schema.len()),
            NodeKind::Join { spec, .. } => Some(spec.output_schema.len()),
            NodeKind::Terminal { .. } | NodeKind::ConflictSet => None,
        }
    }

    /// Number of schema fields expected on `port`, for binding consumers.
    pub fn input_arity(&self, port: Port) -> Option<usize> {
        match (&self.kind, port) {
            (NodeKind::Join { spec, .. }, Port::Left) => Some(spec.left_schema.len()),
            (NodeKind::Join { spec, .. }, Port::Right) => Some(spec.right_schema.len()),
            (NodeKind::Terminal { input_arity, .. }, Port::Input) => Some(*input_arity),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Edge {
    pub from: String,
    pub to: String,
    pub port: Port,
    pub grouping: Grouping,
}

#[derive(Debug)]
pub struct Topology {
    nodes: Vec<NodeDecl>,
    index: HashMap<String, usize>,
    edges: Vec<Edge>,
    outgoing: HashMap<String, Vec<usize>>,
    sources: Vec<String>,
    rules: Vec<(String, String)>,
    config: EngineConfig,
}

impl Topology {
    pub fn nodes(&self) -> &[NodeDecl] {
        &self.nodes
    }

    pub fn node(&self, name: &str) -> Option<&NodeDecl> {
        self.index.get(name).map(|&i| &self.nodes[i])
    }

    pub fn node_index(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Edges leaving `name`.
    pub fn outgoing(&self, name: &str) -> impl Iterator<Item = &Edge> {
        self.outgoing.get(name).into_iter().flatten().map(|&i| &self.edges[i])
    }

    /// Filters that receive external input facts.
    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    /// `(rule id, canonical text)` in registration order.
    pub fn rules(&self) -> &[(String, String)] {
        &self.rules
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Create a node instance from its declaration. Rules are rebuilt from their
    /// canonical text, as they would be in a separate process.
    pub fn instantiate(
        &self,
        decl: &NodeDecl,
        clock: Arc<dyn Clock>,
        metrics: Arc<EngineMetrics>,
    ) -> Result<ReteNode, RuleError> {
        Ok(match &decl.kind {
            NodeKind::Filter(spec) => {
                ReteNode::Filter(FilterNode::new(&decl.name, spec.clone(), metrics))
            }
            NodeKind::Join { spec, .. } => ReteNode::Join(JoinNode::new(
                &decl.name,
                spec.clone(),
                self.config.window.left,
                self.config.window.right,
                clock,
                metrics,
            )),
            NodeKind::Terminal { rule_id, rule_text, .. } => ReteNode::Terminal(
                TerminalNode::from_rule_text(&decl.name, rule_id, rule_text, metrics)?,
            ),
            NodeKind::ConflictSet => {
                let mut resolver =
                    ConflictSetResolver::new(&decl.name, clock, self.config.feedback, metrics);
                for (rule_id, rule_text) in &self.rules {
                    resolver.register_rule(rule_id, rule_text)?;
                }
                ReteNode::ConflictSet(resolver)
            }
        })
    }

    fn validate(&self) -> Result<(), TopologyError> {
        for edge in &self.edges {
            let producer = self
                .node(&edge.from)
                .ok_or_else(|| TopologyError::UnknownNode(edge.from.clone()))?;
            let consumer = self
                .node(&edge.to)
                .ok_or_else(|| TopologyError::UnknownNode(edge.to.clone()))?;

            if let (Some(produced), Some(expected)) =
                (producer.output_arity(), consumer.input_arity(edge.port))
            {
                if produced != expected {
                    return Err(TopologyError::SchemaMismatch {
                        producer: edge.from.clone(),
                        consumer: edge.to.clone(),
                        produced,
                        expected,
                    });
                }
            }

            if let Grouping::Fields(positions) = &edge.grouping {
                let arity = producer.output_arity().unwrap_or(0);
                if let Some(&bad) = positions.iter().find(|&&p| p >= arity) {
                    return Err(TopologyError::SchemaMismatch {
                        producer: edge.from.clone(),
                        consumer: edge.to.clone(),
                        produced: arity,
                        expected: bad + 1,
                    });
                }
            }
        }
        Ok(())
    }
}

impl fmt::Display for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Topology: {} nodes, {} edges", self.nodes.len(), self.edges.len())?;
        for edge in &self.edges {
            writeln!(f, "  {} -> {} [{}] {:?}", edge.from, edge.to, edge.port, edge.grouping)?;
        }
        Ok(())
    }
}

pub struct TopologyBuilder {
    rules: Vec<Rule>,
    config: EngineConfig,
}

impl TopologyBuilder {
    pub fn new(config: EngineConfig) -> Self {
        Self { rules: Vec::new(), config }
    }

    pub fn add_rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn add_rules<I: IntoIterator<Item = Rule>>(mut self, rules: I) -> Self {
        self.rules.extend(rules);
        self
    }

    pub fn build(self) -> Result<Topology, Error> {
        if self.rules.is_empty() {
            return Err(TopologyError::Empty.into());
        }
        let p = self.config.parallelism;
        for (hint, label) in [(p.filter, "filter"), (p.join, "join"), (p.terminal, "terminal")] {
            if hint == 0 {
                return Err(TopologyError::ZeroParallelism(label).into());
            }
        }

        let mut compiled: Vec<CompiledRule> = Vec::with_capacity(self.rules.len());
        let mut ids = HashSet::new();
        for (n, rule) in self.rules.iter().enumerate() {
            let rule = compile(rule, &format!("rule_{}", n))?;
            if !ids.insert(rule.id.clone()) {
                return Err(RuleError::DuplicateRule(rule.id).into());
            }
            compiled.push(rule);
        }

        let mut wiring = Wiring::default();
        wiring.declare(NodeDecl {
            name: CONFLICT_SET.to_string(),
            kind: NodeKind::ConflictSet,
            parallelism: 1,
        });

        let mut shared_filters: HashMap<String, String> = HashMap::new();
        let mut rules = Vec::with_capacity(compiled.len());

        for rule in &compiled {
            let filter_names: Vec<String> = rule
                .filters
                .iter()
                .enumerate()
                .map(|(i, spec)| {
                    let key = spec.share_key();
                    if let Some(existing) = shared_filters.get(&key) {
                        debug!(
                            rule = %rule.id,
                            filter = %existing,
                            "Sharing filter for {}",
                            spec.pattern
                        );
                        return existing.clone();
                    }
                    let name = format!("{}_filter_{}", rule.id, i);
                    wiring.declare(NodeDecl {
                        name: name.clone(),
                        kind: NodeKind::Filter(spec.clone()),
                        parallelism: p.filter,
                    });
                    shared_filters.insert(key, name.clone());
                    name
                })
                .collect();

            let stage_name = |stage: Stage| match stage {
                Stage::Filter(i) => filter_names[i].clone(),
                Stage::Join(j) => format!("{}_join_{}", rule.id, j),
            };

            for (j, spec) in rule.joins.iter().enumerate() {
                let name = stage_name(Stage::Join(j));
                let (left_grouping, right_grouping) = if spec.keys.is_empty() {
                    (Grouping::Global, Grouping::Global)
                } else {
                    (
                        Grouping::Fields(spec.keys.left_indices.clone()),
                        Grouping::Fields(spec.keys.right_indices.clone()),
                    )
                };
                wiring.connect(&stage_name(spec.left), &name, Port::Left, left_grouping);
                wiring.connect(&stage_name(spec.right), &name, Port::Right, right_grouping);
                wiring.declare(NodeDecl {
                    name,
                    kind: NodeKind::Join { rule_id: rule.id.clone(), spec: spec.clone() },
                    parallelism: p.join,
                });
            }

            let terminal = format!("{}_terminal", rule.id);
            let rule_text = rule.rule.canonical();
            wiring.declare(NodeDecl {
                name: terminal.clone(),
                kind: NodeKind::Terminal {
                    rule_id: rule.id.clone(),
                    rule_text: rule_text.clone(),
                    input_arity: rule.terminal.input_schema.len(),
                },
                parallelism: p.terminal,
            });
            wiring.connect(
                &stage_name(rule.last_stage()),
                &terminal,
                Port::Input,
                Grouping::Shuffle,
            );
            wiring.connect(&terminal, CONFLICT_SET, Port::Input, Grouping::Global);

            rules.push((rule.id.clone(), rule_text));
        }

        let mut sources: Vec<String> = shared_filters.into_values().collect();
        sources.sort_by_key(|name| wiring.index.get(name).copied());

        if self.config.feedback {
            for filter in &sources {
                wiring.connect(CONFLICT_SET, filter, Port::Input, Grouping::Shuffle);
            }
        }

        let mut outgoing: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, edge) in wiring.edges.iter().enumerate() {
            outgoing.entry(edge.from.clone()).or_default().push(i);
        }

        let topology = Topology {
            nodes: wiring.nodes,
            index: wiring.index,
            edges: wiring.edges,
            outgoing,
            sources,
            rules,
            config: self.config,
        };
        topology.validate()?;

        info!(
            rules = topology.rules.len(),
            nodes = topology.nodes.len(),
            edges = topology.edges.len(),
            "Built RETE topology"
        );
        Ok(topology)
    }
}

#[derive(Default)]
struct Wiring {
    nodes: Vec<NodeDecl>,
    index: HashMap<String, usize>,
    edges: Vec<Edge>,
}

impl Wiring {
    fn declare(&mut self, decl: NodeDecl) {
        self.index.insert(decl.name.clone(), self.nodes.len());
        self.nodes.push(decl);
    }

    fn connect(&mut self, from: &str, to: &str, port: Port, grouping: Grouping) {
        self.edges.push(Edge { from: from.to_string(), to: to.to_string(), port, grouping });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsing::RuleParser;

    fn build(rules: &str, config: EngineConfig) -> Result<Topology, Error> {
        let rules = RuleParser::new().parse_rules(rules)?;
        TopologyBuilder::new(config).add_rules(rules).build()
    }

    const TRANSITIVE: &str = "
        [sub: (?x rdf:type ?c) (?c rdfs:subClassOf ?d) -> (?x rdf:type ?d)]
        [trans: (?a rdfs:subClassOf ?b) (?b rdfs:subClassOf ?c) -> (?a rdfs:subClassOf ?c)]
    ";

    #[test]
    fn test_wiring_and_groupings() {
        let topology = build(TRANSITIVE, EngineConfig::default()).unwrap();

        // both trans patterns reuse sub_filter_1
        let filters: Vec<&str> = topology
            .nodes()
            .iter()
            .filter(|n| matches!(n.kind, NodeKind::Filter(_)))
            .map(|n| n.name.as_str())
            .collect();
        assert_eq!(filters, vec!["sub_filter_0", "sub_filter_1"]);
        assert_eq!(topology.sources(), &["sub_filter_0".to_string(), "sub_filter_1".to_string()]);

        let into_join: Vec<&Edge> =
            topology.edges().iter().filter(|e| e.to == "sub_join_0").collect();
        assert_eq!(into_join[0].grouping, Grouping::Fields(vec![1]));
        assert_eq!(into_join[1].grouping, Grouping::Fields(vec![0]));

        // self-join: one filter feeds both ports
        let trans: Vec<&Edge> =
            topology.edges().iter().filter(|e| e.to == "trans_join_0").collect();
        assert_eq!(trans.len(), 2);
        assert!(trans.iter().all(|e| e.from == "sub_filter_1"));
        assert_eq!(trans[0].port, Port::Left);
        assert_eq!(trans[1].port, Port::Right);

        let to_cs: Vec<&Edge> = topology.edges().iter().filter(|e| e.to == CONFLICT_SET).collect();
        assert_eq!(to_cs.len(), 2);
        assert!(to_cs.iter().all(|e| e.grouping == Grouping::Global));

        assert_eq!(topology.outgoing(CONFLICT_SET).count(), 2);
    }

    #[test]
    fn test_disconnected_patterns_use_global_grouping() {
        let topology = build(
            "[(?a <http://e/p> ?b) (?c <http://e/q> ?d) -> (?a <http://e/r> ?d)]",
            EngineConfig::default(),
        )
        .unwrap();
        assert!(topology
            .edges()
            .iter()
            .filter(|e| e.to == "rule_0_join_0")
            .all(|e| e.grouping == Grouping::Global));
    }

    #[test]
    fn test_no_feedback_edges_when_disabled() {
        let config = EngineConfig { feedback: false, ..EngineConfig::default() };
        let topology = build(TRANSITIVE, config).unwrap();
        assert_eq!(topology.outgoing(CONFLICT_SET).count(), 0);
    }

    #[test]
    fn test_build_errors() {
        assert!(matches!(
            TopologyBuilder::new(EngineConfig::default()).build(),
            Err(Error::Topology(TopologyError::Empty))
        ));
        assert!(matches!(
            build(
                "[a: (?x ?p ?o) -> (?x ?p ?o)]\n[a: (?y ?p ?o) -> (?y ?p ?o)]",
                EngineConfig::default()
            ),
            Err(Error::Rule(RuleError::DuplicateRule(_)))
        ));

        let mut config = EngineConfig::default();
        config.parallelism.join = 0;
        assert!(matches!(
            build(TRANSITIVE, config),
            Err(Error::Topology(TopologyError::ZeroParallelism("join")))
        ));
    }

    #[test]
    fn test_instantiated_nodes_rebuild_rules_from_text() {
        let topology = build(TRANSITIVE, EngineConfig::default()).unwrap();
        let metrics = Arc::new(EngineMetrics::new());
        let clock: Arc<dyn Clock> = Arc::new(crate::nodes::ManualClock::new(0));
        for decl in topology.nodes() {
            let node = topology.instantiate(decl, clock.clone(), metrics.clone()).unwrap();
            assert_eq!(node.name(), decl.name);
        }
    }
}
