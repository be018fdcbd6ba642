//! Builtin guard functors.
//!
//! Guards are side-effect free tests over a complete binding. Builtins that would
//! remove or hide data have no meaning over an append-only stream and are
//! rejected when a rule is compiled.

use crate::core::term::{Functor, Term};
use crate::error::RuleError;
use regex::Regex;
use std::cmp::Ordering;

const UNSUPPORTED: [&str; 5] = ["drop", "table", "tableAll", "remove", "hide"];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Builtin {
    Equal,
    NotEqual,
    LessThan,
    GreaterThan,
    Le,
    Ge,
    IsLiteral,
    NotLiteral,
    IsBNode,
    NotBNode,
    IsUri,
    Bound,
    Unbound,
    Regex,
    Print,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BuiltinLookup {
    Supported(Builtin),
    Unsupported,
    Unknown,
}

impl Builtin {
    pub fn lookup(name: &str) -> BuiltinLookup {
        let builtin = match name {
            "equal" => Builtin::Equal,
            "notEqual" => Builtin::NotEqual,
            "lessThan" => Builtin::LessThan,
            "greaterThan" => Builtin::GreaterThan,
            "le" => Builtin::Le,
            "ge" => Builtin::Ge,
            "isLiteral" => Builtin::IsLiteral,
            "notLiteral" => Builtin::NotLiteral,
            "isBNode" => Builtin::IsBNode,
            "notBNode" => Builtin::NotBNode,
            "isURI" => Builtin::IsUri,
            "bound" => Builtin::Bound,
            "unbound" => Builtin::Unbound,
            "regex" => Builtin::Regex,
            "print" => Builtin::Print,
            other if UNSUPPORTED.contains(&other) => return BuiltinLookup::Unsupported,
            _ => return BuiltinLookup::Unknown,
        };
        BuiltinLookup::Supported(builtin)
    }

    /// Required argument count, `None` for variadic builtins.
    pub fn arity(&self) -> Option<usize> {
        match self {
            Builtin::Equal
            | Builtin::NotEqual
            | Builtin::LessThan
            | Builtin::GreaterThan
            | Builtin::Le
            | Builtin::Ge
            | Builtin::Regex => Some(2),
            Builtin::IsLiteral
            | Builtin::NotLiteral
            | Builtin::IsBNode
            | Builtin::NotBNode
            | Builtin::IsUri
            | Builtin::Bound
            | Builtin::Unbound => Some(1),
            Builtin::Print => None,
        }
    }
}

/// A compiled guard clause.
#[derive(Clone, Debug)]
pub struct Guard {
    pub builtin: Builtin,
    pub functor: Functor,
    regex: Option<Regex>,
}

impl Guard {
    /// Validate a functor clause of `rule` and turn it into a guard.
    pub fn compile(rule: &str, functor: &Functor) -> Result<Guard, RuleError> {
        let builtin = match Builtin::lookup(&functor.name) {
            BuiltinLookup::Supported(b) => b,
            BuiltinLookup::Unsupported => {
                return Err(RuleError::UnsupportedBuiltin {
                    rule: rule.to_string(),
                    name: functor.name.clone(),
                })
            }
            BuiltinLookup::Unknown => {
                return Err(RuleError::UnknownBuiltin {
                    rule: rule.to_string(),
                    name: functor.name.clone(),
                })
            }
        };

        if let Some(expected) = builtin.arity() {
            if functor.args.len() != expected {
                return Err(RuleError::BuiltinArity {
                    rule: rule.to_string(),
                    name: functor.name.clone(),
                    expected,
                    found: functor.args.len(),
                });
            }
        }

        let regex = match (builtin, functor.args.get(1)) {
            (Builtin::Regex, Some(Term::Literal(lit))) => {
                Some(Regex::new(&lit.lexical).map_err(|e| RuleError::InvalidRegex {
                    rule: rule.to_string(),
                    message: e.to_string(),
                })?)
            }
            _ => None,
        };

        Ok(Guard { builtin, functor: functor.clone(), regex })
    }

    /// Evaluate against already substituted arguments.
    pub fn evaluate(&self, args: &[Term]) -> bool {
        match self.builtin {
            Builtin::Equal => args[0].same_value_as(&args[1]),
            Builtin::NotEqual => !args[0].same_value_as(&args[1]),
            Builtin::LessThan => compare(&args[0], &args[1]) == Some(Ordering::Less),
            Builtin::GreaterThan => compare(&args[0], &args[1]) == Some(Ordering::Greater),
            Builtin::Le => {
                matches!(compare(&args[0], &args[1]), Some(Ordering::Less | Ordering::Equal))
            }
            Builtin::Ge => {
                matches!(compare(&args[0], &args[1]), Some(Ordering::Greater | Ordering::Equal))
            }
            Builtin::IsLiteral => args[0].is_literal(),
            Builtin::NotLiteral => !args[0].is_literal(),
            Builtin::IsBNode => args[0].is_blank(),
            Builtin::NotBNode => !args[0].is_blank(),
            Builtin::IsUri => args[0].is_uri(),
            Builtin::Bound => args[0].is_ground(),
            Builtin::Unbound => !args[0].is_ground(),
            Builtin::Regex => self.matches_regex(&args[0], &args[1]),
            Builtin::Print => {
                let rendered: Vec<String> = args.iter().map(|a| a.to_string()).collect();
                tracing::info!(target: "retestream::print", "{}", rendered.join(" "));
                true
            }
        }
    }

    fn matches_regex(&self, text: &Term, pattern: &Term) -> bool {
        let subject = text.lexical_form();
        match &self.regex {
            Some(re) => re.is_match(&subject),
            None => match pattern {
                Term::Literal(lit) => {
                    Regex::new(&lit.lexical).map(|re| re.is_match(&subject)).unwrap_or(false)
                }
                _ => false,
            },
        }
    }
}

fn compare(a: &Term, b: &Term) -> Option<Ordering> {
    a.numeric_cmp(b)
}
