//! Production rules.
//!
//! A rule is created once when a topology is built and never changes. Nodes in
//! other processes receive it as canonical text and parse it again, so
//! `Rule::parse(&rule.to_string())` must give back an equal rule.

use crate::core::term::{ClauseEntry, Functor, TriplePattern};
use crate::error::RuleError;
use crate::parsing::rule_parser::RuleParser;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rule {
    pub name: Option<String>,
    pub body: Vec<ClauseEntry>,
    pub head: Vec<ClauseEntry>,
}

impl Rule {
    pub fn new(name: Option<String>, body: Vec<ClauseEntry>, head: Vec<ClauseEntry>) -> Self {
        Self { name, body, head }
    }

    /// Parse a single rule using the default prefixes.
    pub fn parse(text: &str) -> Result<Rule, RuleError> {
        RuleParser::new().parse_rule(text)
    }

    /// The canonical text form. Full IRIs, no prefixes.
    pub fn canonical(&self) -> String {
        self.to_string()
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn body_patterns(&self) -> impl Iterator<Item = &TriplePattern> {
        patterns(&self.body)
    }

    pub fn head_patterns(&self) -> impl Iterator<Item = &TriplePattern> {
        patterns(&self.head)
    }

    /// Functor clauses from body and head, evaluated at the terminal.
    pub fn guards(&self) -> impl Iterator<Item = &Functor> {
        self.body.iter().chain(self.head.iter()).filter_map(|c| match c {
            ClauseEntry::Functor(f) => Some(f),
            ClauseEntry::Triple(_) => None,
        })
    }
}

fn patterns(clauses: &[ClauseEntry]) -> impl Iterator<Item = &TriplePattern> {
    clauses.iter().filter_map(|c| match c {
        ClauseEntry::Triple(tp) => Some(tp),
        ClauseEntry::Functor(_) => None,
    })
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        if let Some(name) = &self.name {
            write!(f, "{}: ", name)?;
        }
        for clause in &self.body {
            write!(f, "{} ", clause)?;
        }
        write!(f, "->")?;
        for clause in &self.head {
            write!(f, " {}", clause)?;
        }
        write!(f, "]")
    }
}
