//! RETE network nodes.
//!
//! All four node kinds share one contract: process a single delivery and return
//! the messages to route onward. The kind is fixed when the topology is built.

pub mod builtins;
pub mod conflict_set;
pub mod filter;
pub mod join;
pub mod memory;
pub mod terminal;

use crate::core::message::Message;
use crate::error::ProcessError;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use conflict_set::{ConflictSetResolver, Resolution};
pub use filter::FilterNode;
pub use join::JoinNode;
pub use memory::{Clock, ManualClock, SystemClock, WindowConfig, WindowedMemory};
pub use terminal::TerminalNode;

/// The input a message arrives on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Port {
    Input,
    Left,
    Right,
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Port::Input => write!(f, "input"),
            Port::Left => write!(f, "left"),
            Port::Right => write!(f, "right"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Delivery {
    pub port: Port,
    pub message: Message,
}

impl Delivery {
    pub fn new(port: Port, message: Message) -> Self {
        Self { port, message }
    }
}

#[derive(Debug)]
pub enum ReteNode {
    Filter(FilterNode),
    Join(JoinNode),
    Terminal(TerminalNode),
    ConflictSet(ConflictSetResolver),
}

impl ReteNode {
    pub fn name(&self) -> &str {
        match self {
            ReteNode::Filter(n) => n.name(),
            ReteNode::Join(n) => n.name(),
            ReteNode::Terminal(n) => n.name(),
            ReteNode::ConflictSet(n) => n.name(),
        }
    }

    /// Process one delivery to completion. An error fails only this delivery.
    pub fn process(&mut self, delivery: &Delivery) -> Result<Vec<Message>, ProcessError> {
        match (self, &delivery.message) {
            (ReteNode::Filter(node), Message::Fact(fact)) => Ok(node.process(fact)),
            (ReteNode::Join(node), Message::Binding(msg)) => node.process(delivery.port, msg),
            (ReteNode::Terminal(node), Message::Binding(msg)) => node.process(msg),
            (ReteNode::ConflictSet(node), Message::Fire(fire)) => node.process(fire),
            (node, message) => Err(ProcessError::UnexpectedMessage {
                node: node.name().to_string(),
                kind: message.kind(),
            }),
        }
    }

    /// Called once when the node is torn down.
    pub fn shutdown(&mut self) {
        if let ReteNode::ConflictSet(node) = self {
            node.flush_sinks();
        }
    }
}
