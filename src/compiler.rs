//! Rule compiler.
//!
//! Turns a rule into the positional layout of its network: one filter per body
//! triple pattern, a left-deep chain of joins, and a terminal projection. The
//! output is a pure function of the rule text, so a producer and its consumers
//! can compile the same rule independently and agree on every field position.

use crate::core::binding::{JoinKeySet, Schema};
use crate::core::rule::Rule;
use crate::core::term::{substitute, ClauseEntry, Term, TriplePattern};
use crate::error::RuleError;
use crate::nodes::builtins::Guard;
use serde::{Deserialize, Serialize};

/// A filter stage: one body pattern and the schema of the bindings it emits.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSpec {
    pub pattern: TriplePattern,
    pub schema: Schema,
}

impl FilterSpec {
    pub fn new(pattern: TriplePattern) -> Self {
        let schema = Schema::from_pattern(&pattern);
        Self { pattern, schema }
    }

    /// Pattern text with variables renamed to their schema positions. Two patterns
    /// with the same key emit identical positional bindings for every fact.
    pub fn share_key(&self) -> String {
        let positional: Vec<Term> =
            (0..self.schema.len()).map(|i| Term::Variable(i.to_string())).collect();
        let lookup = |name: &str| self.schema.index_of(name).and_then(|i| positional.get(i));
        match (
            substitute(&self.pattern.subject, &lookup),
            substitute(&self.pattern.predicate, &lookup),
            substitute(&self.pattern.object, &lookup),
        ) {
            (Some(s), Some(p), Some(o)) => TriplePattern::new(s, p, o).to_string(),
            _ => self.pattern.to_string(),
        }
    }
}

/// Which earlier stage feeds one side of a join.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    Filter(usize),
    Join(usize),
}

/// Where a join output field is copied from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldSource {
    Left(usize),
    Right(usize),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinSpec {
    pub left: Stage,
    pub right: Stage,
    pub left_schema: Schema,
    pub right_schema: Schema,
    pub keys: JoinKeySet,
    pub output_schema: Schema,
    pub output_sources: Vec<FieldSource>,
}

impl JoinSpec {
    fn new(left: Stage, left_schema: Schema, right: Stage, right_schema: Schema) -> Self {
        let keys = JoinKeySet::between(&left_schema, &right_schema);
        let output_schema = left_schema.merged_with(&right_schema);
        let output_sources = output_schema
            .vars()
            .iter()
            .map(|var| match left_schema.index_of(var) {
                Some(i) => FieldSource::Left(i),
                // merged_with only adds variables taken from the right schema
                None => FieldSource::Right(right_schema.index_of(var).unwrap_or_default()),
            })
            .collect();
        Self { left, right, left_schema, right_schema, keys, output_schema, output_sources }
    }
}

/// The terminal stage: projection of the last plan stage onto the rule schema.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalSpec {
    pub input: Stage,
    pub input_schema: Schema,
    pub schema: Schema,
    pub projection: Vec<usize>,
}

#[derive(Clone, Debug)]
pub struct CompiledRule {
    pub id: String,
    pub rule: Rule,
    pub filters: Vec<FilterSpec>,
    pub joins: Vec<JoinSpec>,
    pub terminal: TerminalSpec,
    pub guards: Vec<Guard>,
}

impl CompiledRule {
    /// The stage whose output reaches the terminal.
    pub fn last_stage(&self) -> Stage {
        self.terminal.input
    }

    pub fn stage_schema(&self, stage: Stage) -> Option<&Schema> {
        match stage {
            Stage::Filter(i) => self.filters.get(i).map(|f| &f.schema),
            Stage::Join(i) => self.joins.get(i).map(|j| &j.output_schema),
        }
    }
}

/// Variables carried by the rule's fire events, in first-occurrence order. A
/// variable that only appears as the argument of `bound` or `unbound` is left
/// out; those builtins test whether a body pattern bound it.
pub fn rule_schema(rule: &Rule) -> Schema {
    Schema::from_clauses(rule.body.iter().chain(rule.head.iter()).filter(|clause| {
        !matches!(clause, ClauseEntry::Functor(f) if matches!(f.name.as_str(), "bound" | "unbound"))
    }))
}

/// Compile `rule`. Unnamed rules take `fallback_id`.
pub fn compile(rule: &Rule, fallback_id: &str) -> Result<CompiledRule, RuleError> {
    let id = rule.name.clone().unwrap_or_else(|| fallback_id.to_string());

    let filters: Vec<FilterSpec> = rule.body_patterns().cloned().map(FilterSpec::new).collect();
    if filters.is_empty() {
        return Err(RuleError::EmptyBody(id));
    }

    let mut joins = Vec::new();
    let mut current = Stage::Filter(0);
    let mut current_schema = filters[0].schema.clone();
    let mut remaining: Vec<usize> = (1..filters.len()).collect();

    while !remaining.is_empty() {
        let pick = remaining
            .iter()
            .position(|&i| filters[i].schema.vars().iter().any(|v| current_schema.contains(v)))
            .unwrap_or(0);
        let next = remaining.remove(pick);

        let join = JoinSpec::new(
            current,
            current_schema,
            Stage::Filter(next),
            filters[next].schema.clone(),
        );
        current_schema = join.output_schema.clone();
        joins.push(join);
        current = Stage::Join(joins.len() - 1);
    }

    let schema = rule_schema(rule);
    let projection = schema
        .vars()
        .iter()
        .map(|var| {
            current_schema.index_of(var).ok_or_else(|| RuleError::UnboundVariable {
                rule: id.clone(),
                variable: var.clone(),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let guards = rule.guards().map(|f| Guard::compile(&id, f)).collect::<Result<Vec<_>, _>>()?;

    Ok(CompiledRule {
        id,
        rule: rule.clone(),
        filters,
        joins,
        terminal: TerminalSpec { input: current, input_schema: current_schema, schema, projection },
        guards,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(text: &str) -> Rule {
        Rule::parse(text).unwrap()
    }

    fn first_filter(text: &str) -> FilterSpec {
        FilterSpec::new(rule(text).body_patterns().next().unwrap().clone())
    }

    #[test]
    fn test_subclass_rule_layout() {
        let compiled = compile(
            &rule("[sub: (?x rdf:type ?c) (?c rdfs:subClassOf ?d) -> (?x rdf:type ?d)]"),
            "rule_0",
        )
        .unwrap();

        assert_eq!(compiled.id, "sub");
        assert_eq!(compiled.filters.len(), 2);
        assert_eq!(compiled.filters[0].schema.vars(), &["x", "c"]);
        assert_eq!(compiled.filters[1].schema.vars(), &["c", "d"]);

        let join = &compiled.joins[0];
        assert_eq!(join.keys.vars, vec!["c"]);
        assert_eq!(join.output_schema.vars(), &["x", "c", "d"]);
        assert_eq!(
            join.output_sources,
            vec![FieldSource::Left(0), FieldSource::Left(1), FieldSource::Right(1)]
        );
        assert_eq!(compiled.terminal.schema.vars(), &["x", "c", "d"]);
        assert_eq!(compiled.terminal.projection, vec![0, 1, 2]);
    }

    #[test]
    fn test_greedy_plan_prefers_connected_patterns() {
        let compiled = compile(
            &rule(
                "[(?a <http://e/p> ?b) (?c <http://e/q> ?d) (?b <http://e/r> ?c) \
                 -> (?a <http://e/s> ?d)]",
            ),
            "rule_7",
        )
        .unwrap();

        assert_eq!(compiled.id, "rule_7");
        assert_eq!(compiled.joins[0].right, Stage::Filter(2));
        assert_eq!(compiled.joins[1].left, Stage::Join(0));
        assert_eq!(compiled.joins[1].right, Stage::Filter(1));
        assert_eq!(compiled.joins[1].keys.vars, vec!["c"]);
        assert_eq!(compiled.last_stage(), Stage::Join(1));
    }

    #[test]
    fn test_terminal_projection_reorders_fields() {
        let compiled = compile(
            &rule(
                "[(?x <http://e/p> ?y) notEqual(?z, ?x) (?w <http://e/q> ?z) \
                 -> (?x <http://e/r> ?w)]",
            ),
            "r",
        )
        .unwrap();

        assert_eq!(compiled.terminal.input_schema.vars(), &["x", "y", "w", "z"]);
        assert_eq!(compiled.terminal.schema.vars(), &["x", "y", "z", "w"]);
        assert_eq!(compiled.terminal.projection, vec![0, 1, 3, 2]);
        assert_eq!(compiled.guards.len(), 1);
    }

    #[test]
    fn test_share_key_ignores_variable_names() {
        let a = first_filter("[(?x rdf:type ?c) -> (?x rdf:type ?c)]");
        let b = first_filter("[(?s rdf:type ?k) -> (?s rdf:type ?k)]");
        let c = first_filter("[(?s rdf:type ?s) -> (?s rdf:type ?s)]");
        assert_eq!(a.share_key(), b.share_key());
        assert_ne!(a.share_key(), c.share_key());
    }

    #[test]
    fn test_compile_errors() {
        assert!(matches!(
            compile(&rule("[bad: greaterThan(?a, 1) -> (?a rdf:type rdfs:Class)]"), "r"),
            Err(RuleError::EmptyBody(_))
        ));
        assert!(matches!(
            compile(&rule("[bad: (?a rdf:type ?b) -> (?a rdf:type ?z)]"), "r"),
            Err(RuleError::UnboundVariable { variable, .. }) if variable == "z"
        ));
        assert!(matches!(
            compile(&rule("[bad: (?a rdf:type ?b) drop(0) -> (?a rdf:type ?b)]"), "r"),
            Err(RuleError::UnsupportedBuiltin { .. })
        ));
        let compared =
            rule("[bad: (?a rdf:type ?b) bound(?z) greaterThan(?z, 1) -> (?a rdf:type ?b)]");
        assert!(matches!(
            compile(&compared, "r"),
            Err(RuleError::UnboundVariable { variable, .. }) if variable == "z"
        ));
    }

    #[test]
    fn test_bound_tests_accept_variables_no_pattern_binds() {
        let optional = rule("[opt: (?a rdf:type ?b) unbound(?z) bound(?b) -> (?a rdf:type ?b)]");
        let compiled = compile(&optional, "r").unwrap();
        assert_eq!(compiled.terminal.schema.vars(), &["a", "b"]);
        assert_eq!(compiled.terminal.projection, vec![0, 1]);
        assert_eq!(compiled.guards.len(), 2);
    }
}
