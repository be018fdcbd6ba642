//! Terms, functors and triple patterns.
//!
//! Every node in the network reads this vocabulary. Constants compare by value;
//! variables only matter to the compiler, which turns them into positions.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

pub const RDF: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#";
pub const RDFS: &str = "http://www.w3.org/2000/01/rdf-schema#";
pub const OWL: &str = "http://www.w3.org/2002/07/owl#";
pub const XSD: &str = "http://www.w3.org/2001/XMLSchema#";

/// An RDF literal: lexical form plus an optional datatype IRI or language tag.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Literal {
    pub lexical: String,
    pub datatype: Option<String>,
    pub language: Option<String>,
}

impl Literal {
    pub fn simple(lexical: &str) -> Self {
        Self { lexical: lexical.to_string(), datatype: None, language: None }
    }

    pub fn typed(lexical: &str, datatype: &str) -> Self {
        Self { lexical: lexical.to_string(), datatype: Some(datatype.to_string()), language: None }
    }

    pub fn lang(lexical: &str, language: &str) -> Self {
        Self {
            lexical: lexical.to_string(),
            datatype: None,
            language: Some(language.to_ascii_lowercase()),
        }
    }

    /// Value of a literal with an XSD numeric datatype. Integer and decimal
    /// types keep their exact digits; doubles and floats go through `f64`.
    pub fn numeric_value(&self) -> Option<NumericValue> {
        let dt = self.datatype.as_deref()?;
        match dt.strip_prefix(XSD)? {
            "integer" | "int" | "long" | "short" | "byte" | "decimal" | "nonNegativeInteger"
            | "positiveInteger" | "negativeInteger" | "nonPositiveInteger" | "unsignedInt"
            | "unsignedLong" | "unsignedShort" | "unsignedByte" => {
                canonical_decimal(&self.lexical).map(NumericValue::Decimal)
            }
            "double" | "float" => {
                let value = match self.lexical.trim() {
                    "INF" | "+INF" => f64::INFINITY,
                    "-INF" => f64::NEG_INFINITY,
                    other => other.parse::<f64>().ok()?,
                };
                Some(NumericValue::from_f64(value))
            }
            _ => None,
        }
    }

    pub fn numeric(&self) -> Option<f64> {
        self.numeric_value().map(|v| v.to_f64())
    }
}

/// The value of a numeric literal.
#[derive(Clone, Debug, PartialEq)]
pub enum NumericValue {
    /// Canonical decimal digits: optional `-`, no leading or trailing zeros,
    /// zero is always `0`. Equal values have equal text.
    Decimal(String),
    /// NaN or an infinity.
    Special(f64),
}

impl NumericValue {
    pub fn from_f64(value: f64) -> Self {
        // f64 Display never uses an exponent
        match canonical_decimal(&value.to_string()) {
            Some(digits) if value.is_finite() => NumericValue::Decimal(digits),
            _ => NumericValue::Special(value),
        }
    }

    pub fn to_f64(&self) -> f64 {
        match self {
            NumericValue::Decimal(digits) => digits.parse().unwrap_or(f64::NAN),
            NumericValue::Special(value) => *value,
        }
    }

    /// Exact for two decimals; otherwise compared as `f64`.
    pub fn compare(&self, other: &NumericValue) -> Option<Ordering> {
        match (self, other) {
            (NumericValue::Decimal(a), NumericValue::Decimal(b)) => Some(compare_decimal(a, b)),
            _ => self.to_f64().partial_cmp(&other.to_f64()),
        }
    }

    fn key(&self) -> String {
        match self {
            NumericValue::Decimal(digits) => format!("#num:{}", digits),
            NumericValue::Special(value) => format!("#num:{}", value),
        }
    }
}

fn canonical_decimal(text: &str) -> Option<String> {
    let text = text.trim();
    let (negative, unsigned) = match text.as_bytes().first()? {
        b'-' => (true, &text[1..]),
        b'+' => (false, &text[1..]),
        _ => (false, text),
    };
    let (int_part, frac_part) = unsigned.split_once('.').unwrap_or((unsigned, ""));
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }
    if !int_part.bytes().chain(frac_part.bytes()).all(|b| b.is_ascii_digit()) {
        return None;
    }

    let int_part = int_part.trim_start_matches('0');
    let frac_part = frac_part.trim_end_matches('0');
    if int_part.is_empty() && frac_part.is_empty() {
        return Some("0".to_string());
    }

    let mut out = String::with_capacity(int_part.len() + frac_part.len() + 3);
    if negative {
        out.push('-');
    }
    out.push_str(if int_part.is_empty() { "0" } else { int_part });
    if !frac_part.is_empty() {
        out.push('.');
        out.push_str(frac_part);
    }
    Some(out)
}

fn compare_decimal(a: &str, b: &str) -> Ordering {
    match (a.strip_prefix('-'), b.strip_prefix('-')) {
        (None, None) => compare_magnitude(a, b),
        (Some(a), Some(b)) => compare_magnitude(b, a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
    }
}

fn compare_magnitude(a: &str, b: &str) -> Ordering {
    let (a_int, a_frac) = a.split_once('.').unwrap_or((a, ""));
    let (b_int, b_frac) = b.split_once('.').unwrap_or((b, ""));
    a_int
        .len()
        .cmp(&b_int.len())
        .then_with(|| a_int.cmp(b_int))
        .then_with(|| a_frac.cmp(b_frac))
}

/// A named operator applied to a list of terms: builtin guards in rule bodies,
/// or structured values in the object position of a pattern.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Functor {
    pub name: String,
    pub args: Vec<Term>,
}

impl Functor {
    pub fn new(name: &str, args: Vec<Term>) -> Self {
        Self { name: name.to_string(), args }
    }

    pub fn is_ground(&self) -> bool {
        self.args.iter().all(Term::is_ground)
    }
}

/// An atomic value or a named placeholder.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Term {
    Uri(String),
    Literal(Literal),
    Blank(String),
    Variable(String),
    Functor(Functor),
}

impl Term {
    pub fn uri(iri: &str) -> Self {
        Term::Uri(iri.to_string())
    }

    pub fn literal(lexical: &str) -> Self {
        Term::Literal(Literal::simple(lexical))
    }

    pub fn typed_literal(lexical: &str, datatype: &str) -> Self {
        Term::Literal(Literal::typed(lexical, datatype))
    }

    pub fn blank(id: &str) -> Self {
        Term::Blank(id.to_string())
    }

    pub fn var(name: &str) -> Self {
        Term::Variable(name.trim_start_matches('?').to_string())
    }

    pub fn is_variable(&self) -> bool {
        matches!(self, Term::Variable(_))
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, Term::Literal(_))
    }

    pub fn is_blank(&self) -> bool {
        matches!(self, Term::Blank(_))
    }

    pub fn is_uri(&self) -> bool {
        matches!(self, Term::Uri(_))
    }

    pub fn variable_name(&self) -> Option<&str> {
        match self {
            Term::Variable(name) => Some(name),
            _ => None,
        }
    }

    /// True when no variable occurs anywhere in the term.
    pub fn is_ground(&self) -> bool {
        match self {
            Term::Variable(_) => false,
            Term::Functor(f) => f.is_ground(),
            _ => true,
        }
    }

    pub fn numeric_value(&self) -> Option<NumericValue> {
        match self {
            Term::Literal(lit) => lit.numeric_value(),
            _ => None,
        }
    }

    pub fn numeric(&self) -> Option<f64> {
        self.numeric_value().map(|v| v.to_f64())
    }

    /// Ordering of two numeric literals; `None` if either is not numeric.
    pub fn numeric_cmp(&self, other: &Term) -> Option<Ordering> {
        self.numeric_value()?.compare(&other.numeric_value()?)
    }

    /// Value equality: identical terms, or numeric literals with equal values
    /// (`"5"^^xsd:integer` and `"5.0"^^xsd:decimal`).
    pub fn same_value_as(&self, other: &Term) -> bool {
        if self == other {
            return true;
        }
        match (self.numeric_value(), other.numeric_value()) {
            (Some(NumericValue::Decimal(a)), Some(NumericValue::Decimal(b))) => a == b,
            (Some(a), Some(b)) => a.compare(&b) == Some(Ordering::Equal),
            _ => false,
        }
    }

    /// A key that is equal for any two terms that are `same_value_as` each other.
    /// Partitioned routing hashes this so that value-equal join keys meet.
    pub fn value_key(&self) -> String {
        match self.numeric_value() {
            Some(value) => value.key(),
            None => self.to_string(),
        }
    }

    /// The string a regex guard is matched against.
    pub fn lexical_form(&self) -> String {
        match self {
            Term::Uri(iri) => iri.clone(),
            Term::Literal(lit) => lit.lexical.clone(),
            Term::Blank(id) => id.clone(),
            Term::Variable(name) => format!("?{}", name),
            Term::Functor(f) => Term::Functor(f.clone()).to_string(),
        }
    }
}

pub(crate) fn escape_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
    }
    out
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\"", escape_literal(&self.lexical))?;
        if let Some(lang) = &self.language {
            write!(f, "@{}", lang)
        } else if let Some(dt) = &self.datatype {
            write!(f, "^^<{}>", dt)
        } else {
            Ok(())
        }
    }
}

impl fmt::Display for Functor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", arg)?;
        }
        write!(f, ")")
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Uri(iri) => write!(f, "<{}>", iri),
            Term::Literal(lit) => write!(f, "{}", lit),
            Term::Blank(id) => write!(f, "_:{}", id),
            Term::Variable(name) => write!(f, "?{}", name),
            Term::Functor(func) => write!(f, "{}", func),
        }
    }
}

/// A ground subject-predicate-object fact.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Triple {
    pub subject: Term,
    pub predicate: Term,
    pub object: Term,
}

impl Triple {
    pub fn new(subject: Term, predicate: Term, object: Term) -> Self {
        Self { subject, predicate, object }
    }

    /// N-Triples style line, terminated by ` .`
    pub fn to_ntriples(&self) -> String {
        format!("{} .", self)
    }
}

impl fmt::Display for Triple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.subject, self.predicate, self.object)
    }
}

/// A `(subject, predicate, object)` pattern whose positions may be variables.
/// The object may be a functor whose arguments are themselves patterns.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TriplePattern {
    pub subject: Term,
    pub predicate: Term,
    pub object: Term,
}

impl TriplePattern {
    pub fn new(subject: Term, predicate: Term, object: Term) -> Self {
        Self { subject, predicate, object }
    }

    /// Substitute variables through `lookup`. Returns `None` when any variable
    /// has no value.
    pub fn instantiate<'a, F>(&self, lookup: F) -> Option<Triple>
    where
        F: Fn(&str) -> Option<&'a Term>,
    {
        Some(Triple {
            subject: substitute(&self.subject, &lookup)?,
            predicate: substitute(&self.predicate, &lookup)?,
            object: substitute(&self.object, &lookup)?,
        })
    }
}

pub(crate) fn substitute<'a, F>(term: &Term, lookup: &F) -> Option<Term>
where
    F: Fn(&str) -> Option<&'a Term>,
{
    match term {
        Term::Variable(name) => lookup(name).cloned(),
        Term::Functor(f) => {
            let args = f.args.iter().map(|a| substitute(a, lookup)).collect::<Option<Vec<_>>>()?;
            Some(Term::Functor(Functor { name: f.name.clone(), args }))
        }
        other => Some(other.clone()),
    }
}

impl fmt::Display for TriplePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({} {} {})", self.subject, self.predicate, self.object)
    }
}

/// One clause of a rule body or head.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClauseEntry {
    Triple(TriplePattern),
    Functor(Functor),
}

impl fmt::Display for ClauseEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClauseEntry::Triple(tp) => write!(f, "{}", tp),
            ClauseEntry::Functor(func) => write!(f, "{}", func),
        }
    }
}
