//! Filter (alpha) node: matches one triple pattern against incoming facts.

use crate::compiler::FilterSpec;
use crate::core::binding::Binding;
use crate::core::message::{BindingMessage, FactMessage, Message, Meta};
use crate::core::term::Term;
use crate::metrics::EngineMetrics;
use std::sync::Arc;
use tracing::{debug, trace};

#[derive(Debug)]
pub struct FilterNode {
    name: String,
    spec: FilterSpec,
    metrics: Arc<EngineMetrics>,
}

impl FilterNode {
    pub fn new(name: &str, spec: FilterSpec, metrics: Arc<EngineMetrics>) -> Self {
        Self { name: name.to_string(), spec, metrics }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn spec(&self) -> &FilterSpec {
        &self.spec
    }

    /// Match a fact against the pattern. Constants must be value-equal, and every
    /// occurrence of a repeated variable must see the same value. Functor objects
    /// are matched argument by argument under the same rules.
    pub fn match_fact(&self, fact: &FactMessage) -> Option<Binding> {
        let mut slots: Vec<Option<Term>> = vec![None; self.spec.schema.len()];
        let pattern = &self.spec.pattern;

        if !self.unify(&pattern.subject, fact.subject(), &mut slots)
            || !self.unify(&pattern.predicate, fact.predicate(), &mut slots)
            || !self.unify(&pattern.object, fact.object(), &mut slots)
        {
            return None;
        }

        slots.into_iter().collect::<Option<Vec<Term>>>().map(Binding::new)
    }

    fn unify(&self, pattern: &Term, value: &Term, slots: &mut [Option<Term>]) -> bool {
        match pattern {
            Term::Variable(name) => {
                let Some(slot) = self.spec.schema.index_of(name).and_then(|i| slots.get_mut(i))
                else {
                    return false;
                };
                if let Some(bound) = slot.as_ref() {
                    return bound.same_value_as(value);
                }
                *slot = Some(value.clone());
                true
            }
            Term::Functor(expected) => match value {
                Term::Functor(actual)
                    if actual.name == expected.name && actual.args.len() == expected.args.len() =>
                {
                    expected.args.iter().zip(&actual.args).all(|(p, v)| self.unify(p, v, slots))
                }
                _ => false,
            },
            constant => constant.same_value_as(value),
        }
    }

    /// Emit at most one binding for the fact.
    pub fn process(&self, fact: &FactMessage) -> Vec<Message> {
        if !fact.is_add {
            debug!(node = %self.name, "Ignoring retraction of {}", fact.triple);
            return Vec::new();
        }

        match self.match_fact(fact) {
            Some(binding) => {
                trace!(node = %self.name, %binding, "Matched {}", fact.triple);
                EngineMetrics::incr(&self.metrics.filter_bindings);
                let meta =
                    Meta { is_add: true, graph: fact.graph.clone(), timestamp: fact.timestamp };
                vec![Message::Binding(BindingMessage::new(meta, binding))]
            }
            None => Vec::new(),
        }
    }
}
