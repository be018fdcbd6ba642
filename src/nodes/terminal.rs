//! Terminal node: evaluates a rule's guards over a complete body binding.

use crate::compiler::{compile, TerminalSpec};
use crate::core::message::{BindingMessage, FireEvent, Message};
use crate::core::rule::Rule;
use crate::core::term::{substitute, Term};
use crate::error::{ProcessError, RuleError};
use crate::metrics::EngineMetrics;
use crate::nodes::builtins::Guard;
use std::sync::Arc;
use tracing::trace;

#[derive(Debug)]
pub struct TerminalNode {
    name: String,
    rule_id: String,
    spec: TerminalSpec,
    guards: Vec<Guard>,
    metrics: Arc<EngineMetrics>,
}

impl TerminalNode {
    /// Build from the rule's canonical text, compiling it locally.
    pub fn from_rule_text(
        name: &str,
        rule_id: &str,
        rule_text: &str,
        metrics: Arc<EngineMetrics>,
    ) -> Result<Self, RuleError> {
        let rule = Rule::parse(rule_text)?;
        let compiled = compile(&rule, rule_id)?;
        Ok(Self {
            name: name.to_string(),
            rule_id: rule_id.to_string(),
            spec: compiled.terminal,
            guards: compiled.guards,
            metrics,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rule_id(&self) -> &str {
        &self.rule_id
    }

    pub fn spec(&self) -> &TerminalSpec {
        &self.spec
    }

    /// Emit a fire event when every guard holds. A failed guard consumes the
    /// message without output.
    pub fn process(&self, message: &BindingMessage) -> Result<Vec<Message>, ProcessError> {
        if message.binding.len() != self.spec.input_schema.len() {
            return Err(ProcessError::Arity {
                node: self.name.clone(),
                expected: self.spec.input_schema.len(),
                received: message.binding.len(),
            });
        }

        let binding = message.binding.project(&self.spec.projection);
        let lookup = |name: &str| binding.lookup(&self.spec.schema, name);

        for guard in &self.guards {
            let args: Vec<Term> = guard
                .functor
                .args
                .iter()
                .map(|arg| substitute(arg, &lookup).unwrap_or_else(|| arg.clone()))
                .collect();
            if !guard.evaluate(&args) {
                trace!(node = %self.name, %binding, "Guard {} failed", guard.functor.name);
                EngineMetrics::incr(&self.metrics.guard_rejections);
                return Ok(Vec::new());
            }
        }

        EngineMetrics::incr(&self.metrics.fires);
        Ok(vec![Message::Fire(FireEvent {
            rule_id: self.rule_id.clone(),
            binding,
            meta: message.meta.clone(),
        })])
    }
}
