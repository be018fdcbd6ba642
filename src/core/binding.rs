//! Variable schemas, join key sets and positional bindings.
//!
//! A schema fixes the position of every variable a node emits. Producer and
//! consumer compile their schemas independently from the same rule text, so the
//! ordering is purely a function of clause order: first occurrence, left to right,
//! subject then predicate then object, functor arguments in order.

use crate::core::term::{ClauseEntry, Term, TriplePattern};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Ordered list of distinct variable names.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Schema {
    vars: Vec<String>,
}

impl Schema {
    pub fn new(vars: Vec<String>) -> Self {
        let mut schema = Schema::default();
        for v in vars {
            schema.push(&v);
        }
        schema
    }

    pub fn from_pattern(pattern: &TriplePattern) -> Self {
        let mut schema = Schema::default();
        schema.extend_with_pattern(pattern);
        schema
    }

    pub fn from_clauses<'a, I>(clauses: I) -> Self
    where
        I: IntoIterator<Item = &'a ClauseEntry>,
    {
        let mut schema = Schema::default();
        for clause in clauses {
            schema.extend_with_clause(clause);
        }
        schema
    }

    pub fn extend_with_clause(&mut self, clause: &ClauseEntry) {
        match clause {
            ClauseEntry::Triple(tp) => self.extend_with_pattern(tp),
            ClauseEntry::Functor(f) => {
                for arg in &f.args {
                    self.extend_with_term(arg);
                }
            }
        }
    }

    pub fn extend_with_pattern(&mut self, pattern: &TriplePattern) {
        self.extend_with_term(&pattern.subject);
        self.extend_with_term(&pattern.predicate);
        self.extend_with_term(&pattern.object);
    }

    pub fn extend_with_term(&mut self, term: &Term) {
        match term {
            Term::Variable(name) => self.push(name),
            Term::Functor(f) => {
                for arg in &f.args {
                    self.extend_with_term(arg);
                }
            }
            _ => {}
        }
    }

    /// Append every variable of `other` not already present.
    pub fn merged_with(&self, other: &Schema) -> Schema {
        let mut merged = self.clone();
        for v in &other.vars {
            merged.push(v);
        }
        merged
    }

    fn push(&mut self, name: &str) {
        if !self.contains(name) {
            self.vars.push(name.to_string());
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.iter().any(|v| v == name)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.vars.iter().position(|v| v == name)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn vars(&self) -> &[String] {
        &self.vars
    }

    /// Wire field names: `?0 .. ?n-1`, positional and name independent.
    pub fn field_names(&self) -> Vec<String> {
        (0..self.vars.len()).map(|i| format!("?{}", i)).collect()
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.vars.iter().map(|v| format!("?{}", v)).collect();
        write!(f, "[{}]", names.join(", "))
    }
}

/// Variables shared by the two parents of a join, with their positions on each side.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinKeySet {
    pub vars: Vec<String>,
    pub left_indices: Vec<usize>,
    pub right_indices: Vec<usize>,
}

impl JoinKeySet {
    /// Variables present in both schemas, in left-schema order.
    pub fn between(left: &Schema, right: &Schema) -> Self {
        let mut keys = JoinKeySet::default();
        for (li, var) in left.vars().iter().enumerate() {
            if let Some(ri) = right.index_of(var) {
                keys.vars.push(var.clone());
                keys.left_indices.push(li);
                keys.right_indices.push(ri);
            }
        }
        keys
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// True when `left` and `right` agree on every join key.
    pub fn agree(&self, left: &Binding, right: &Binding) -> bool {
        self.left_indices
            .iter()
            .zip(&self.right_indices)
            .all(|(&l, &r)| match (left.get(l), right.get(r)) {
                (Some(a), Some(b)) => a.same_value_as(b),
                _ => false,
            })
    }
}

/// Terms aligned positionally to a schema.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Binding(pub Vec<Term>);

impl Binding {
    pub fn new(values: Vec<Term>) -> Self {
        Binding(values)
    }

    pub fn get(&self, index: usize) -> Option<&Term> {
        self.0.get(index)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn values(&self) -> &[Term] {
        &self.0
    }

    /// Look up a variable's value through the schema this binding is aligned to.
    pub fn lookup<'a>(&'a self, schema: &Schema, name: &str) -> Option<&'a Term> {
        schema.index_of(name).and_then(|i| self.0.get(i))
    }

    /// Reorder into another schema through a precomputed index map.
    pub fn project(&self, indices: &[usize]) -> Binding {
        Binding(indices.iter().filter_map(|&i| self.0.get(i).cloned()).collect())
    }
}

impl fmt::Display for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let values: Vec<String> = self.0.iter().map(|t| t.to_string()).collect();
        write!(f, "[{}]", values.join(", "))
    }
}
