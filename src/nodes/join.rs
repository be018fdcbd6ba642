//! Join (beta) node: a streaming equi-join over two windowed memories.
//!
//! A binding arriving on one side is first stored in that side's window, then
//! probed against the opposite window. Every stored entry that agrees on all join
//! keys yields one merged binding. Both windows are owned by the node instance;
//! the transport guarantees that equal join keys reach the same instance.

use crate::compiler::{FieldSource, JoinSpec};
use crate::core::binding::Binding;
use crate::core::message::{BindingMessage, Message, Meta};
use crate::error::ProcessError;
use crate::metrics::EngineMetrics;
use crate::nodes::memory::{Clock, WindowConfig, WindowedMemory};
use crate::nodes::Port;
use std::sync::Arc;
use tracing::trace;

pub struct JoinNode {
    name: String,
    spec: JoinSpec,
    left: WindowedMemory,
    right: WindowedMemory,
    clock: Arc<dyn Clock>,
    metrics: Arc<EngineMetrics>,
}

impl std::fmt::Debug for JoinNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JoinNode")
            .field("name", &self.name)
            .field("keys", &self.spec.keys.vars)
            .field("left", &self.left.len())
            .field("right", &self.right.len())
            .finish()
    }
}

impl JoinNode {
    pub fn new(
        name: &str,
        spec: JoinSpec,
        left_window: WindowConfig,
        right_window: WindowConfig,
        clock: Arc<dyn Clock>,
        metrics: Arc<EngineMetrics>,
    ) -> Self {
        Self {
            name: name.to_string(),
            spec,
            left: WindowedMemory::new(left_window),
            right: WindowedMemory::new(right_window),
            clock,
            metrics,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn spec(&self) -> &JoinSpec {
        &self.spec
    }

    pub fn memory(&self, port: Port) -> Option<&WindowedMemory> {
        match port {
            Port::Left => Some(&self.left),
            Port::Right => Some(&self.right),
            Port::Input => None,
        }
    }

    pub fn process(
        &mut self,
        port: Port,
        message: &BindingMessage,
    ) -> Result<Vec<Message>, ProcessError> {
        let expected = match port {
            Port::Left => self.spec.left_schema.len(),
            Port::Right => self.spec.right_schema.len(),
            Port::Input => {
                return Err(ProcessError::UnknownPort {
                    node: self.name.clone(),
                    port: port.to_string(),
                })
            }
        };
        if message.binding.len() != expected {
            return Err(ProcessError::Arity {
                node: self.name.clone(),
                expected,
                received: message.binding.len(),
            });
        }

        let now = self.clock.now_millis();
        let (own, other) = match port {
            Port::Left => (&mut self.left, &mut self.right),
            _ => (&mut self.right, &mut self.left),
        };

        let evicted =
            own.insert(message.binding.clone(), message.meta.clone(), now) + other.expire(now);
        if evicted > 0 {
            EngineMetrics::add(&self.metrics.window_evictions, evicted as u64);
        }

        let mut out = Vec::new();
        for entry in other.probe(now) {
            let (left, right, left_meta, right_meta) = match port {
                Port::Left => (&message.binding, &entry.binding, &message.meta, &entry.meta),
                _ => (&entry.binding, &message.binding, &entry.meta, &message.meta),
            };
            if !self.spec.keys.agree(left, right) {
                continue;
            }

            let merged = merge(&self.spec.output_sources, left, right);
            trace!(node = %self.name, binding = %merged, "Join match");
            let meta = Meta {
                is_add: message.meta.is_add,
                graph: left_meta.graph.union(&right_meta.graph),
                timestamp: message.meta.timestamp,
            };
            out.push(Message::Binding(BindingMessage::new(meta, merged)));
        }

        if !out.is_empty() {
            EngineMetrics::add(&self.metrics.join_matches, out.len() as u64);
        }
        Ok(out)
    }
}

fn merge(sources: &[FieldSource], left: &Binding, right: &Binding) -> Binding {
    Binding::new(
        sources
            .iter()
            .filter_map(|source| match *source {
                FieldSource::Left(i) => left.get(i).cloned(),
                FieldSource::Right(i) => right.get(i).cloned(),
            })
            .collect(),
    )
}
