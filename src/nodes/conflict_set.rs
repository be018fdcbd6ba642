//! Conflict-set resolver: turns fire events into concrete facts.
//!
//! There is exactly one resolver per topology. For every fire event it
//! instantiates each head pattern of the rule, drops candidates whose subject is
//! a literal, hands accepted facts to the sinks and returns them as new input
//! facts for the feedback edge. Nothing is deduplicated.

use crate::compiler::rule_schema;
use crate::core::binding::Schema;
use crate::core::message::{FireEvent, InferredFact, Message};
use crate::core::rule::Rule;
use crate::core::term::{Term, Triple, TriplePattern};
use crate::error::{ProcessError, RuleError};
use crate::metrics::EngineMetrics;
use crate::nodes::memory::Clock;
use crate::sinks::FactSink;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Outcome of instantiating one head pattern.
#[derive(Clone, Debug, PartialEq)]
pub enum Resolution {
    Emitted(InferredFact),
    Rejected { triple: Option<Triple>, reason: String },
}

struct RuleHead {
    schema: Schema,
    patterns: Vec<TriplePattern>,
}

pub struct ConflictSetResolver {
    name: String,
    rules: HashMap<String, RuleHead>,
    sinks: Vec<Box<dyn FactSink>>,
    clock: Arc<dyn Clock>,
    feedback: bool,
    metrics: Arc<EngineMetrics>,
}

impl std::fmt::Debug for ConflictSetResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sinks: Vec<&str> = self.sinks.iter().map(|s| s.name()).collect();
        f.debug_struct("ConflictSetResolver")
            .field("name", &self.name)
            .field("rules", &self.rules.len())
            .field("sinks", &sinks)
            .field("feedback", &self.feedback)
            .finish()
    }
}

impl ConflictSetResolver {
    pub fn new(
        name: &str,
        clock: Arc<dyn Clock>,
        feedback: bool,
        metrics: Arc<EngineMetrics>,
    ) -> Self {
        Self {
            name: name.to_string(),
            rules: HashMap::new(),
            sinks: Vec::new(),
            clock,
            feedback,
            metrics,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register a rule from its canonical text.
    pub fn register_rule(&mut self, rule_id: &str, rule_text: &str) -> Result<(), RuleError> {
        if self.rules.contains_key(rule_id) {
            return Err(RuleError::DuplicateRule(rule_id.to_string()));
        }
        let rule = Rule::parse(rule_text)?;
        let head = RuleHead {
            schema: rule_schema(&rule),
            patterns: rule.head_patterns().cloned().collect(),
        };
        self.rules.insert(rule_id.to_string(), head);
        Ok(())
    }

    pub fn add_sink(&mut self, sink: Box<dyn FactSink>) {
        self.sinks.push(sink);
    }

    /// Instantiate every head pattern of the fired rule.
    pub fn resolve(&self, fire: &FireEvent) -> Result<Vec<Resolution>, ProcessError> {
        let head = self
            .rules
            .get(&fire.rule_id)
            .ok_or_else(|| ProcessError::UnknownRule(fire.rule_id.clone()))?;
        if fire.binding.len() != head.schema.len() {
            return Err(ProcessError::Arity {
                node: self.name.clone(),
                expected: head.schema.len(),
                received: fire.binding.len(),
            });
        }

        let now = self.clock.now_millis();
        let lookup = |name: &str| fire.binding.lookup(&head.schema, name);

        Ok(head
            .patterns
            .iter()
            .map(|pattern| match pattern.instantiate(lookup) {
                None => Resolution::Rejected {
                    triple: None,
                    reason: format!("{} is not ground", pattern),
                },
                Some(triple) if matches!(triple.subject, Term::Literal(_) | Term::Functor(_)) => {
                    Resolution::Rejected {
                        triple: Some(triple),
                        reason: "literal subject".to_string(),
                    }
                }
                Some(triple) => Resolution::Emitted(InferredFact {
                    triple,
                    rule_id: fire.rule_id.clone(),
                    support: fire.meta.graph.clone(),
                    timestamp: now,
                }),
            })
            .collect())
    }

    /// Resolve, export accepted facts to every sink, and return the feedback
    /// messages.
    pub fn process(&mut self, fire: &FireEvent) -> Result<Vec<Message>, ProcessError> {
        let resolutions = self.resolve(fire)?;
        let mut feedback = Vec::new();

        for resolution in resolutions {
            let fact = match resolution {
                Resolution::Emitted(fact) => fact,
                Resolution::Rejected { triple, reason } => {
                    EngineMetrics::incr(&self.metrics.facts_rejected);
                    match triple {
                        Some(t) => {
                            warn!(rule = %fire.rule_id, "Rejected inferred fact {}: {}", t, reason);
                        }
                        None => warn!(rule = %fire.rule_id, "Rejected inferred fact: {}", reason),
                    }
                    continue;
                }
            };

            EngineMetrics::incr(&self.metrics.facts_inferred);
            debug!(rule = %fact.rule_id, support = fact.support.len(), "Inferred {}", fact.triple);

            for sink in self.sinks.iter_mut() {
                if let Err(e) = sink.consume(&fact) {
                    EngineMetrics::incr(&self.metrics.sink_errors);
                    warn!(sink = sink.name(), "Failed to export {}: {}", fact.triple, e);
                }
            }

            if self.feedback {
                EngineMetrics::incr(&self.metrics.facts_reinjected);
                feedback.push(Message::Fact(fact.to_fact_message(fact.timestamp)));
            }
        }

        Ok(feedback)
    }

    pub fn flush_sinks(&mut self) {
        for sink in self.sinks.iter_mut() {
            if let Err(e) = sink.flush() {
                warn!(sink = sink.name(), "Failed to flush: {}", e);
            }
        }
    }
}
