//! Parser for rule text.
//!
//! Accepts rules of the form
//!
//! ```text
//! @prefix ex: <http://example.org/> .
//! [subclass: (?x rdf:type ?c) (?c rdfs:subClassOf ?d) -> (?x rdf:type ?d)]
//! [adult: (?p ex:age ?a) greaterThan(?a, 17) -> (?p rdf:type ex:Adult)]
//! ```
//!
//! Terms are `?var`, `<iri>`, `prefix:local`, `_:blank`, quoted literals with an
//! optional `^^datatype` or `@lang`, bare numbers and booleans, and functors
//! `name(arg, arg)`.

use crate::core::rule::Rule;
use crate::core::term::{ClauseEntry, Functor, Literal, Term, TriplePattern, OWL, RDF, RDFS, XSD};
use crate::error::RuleError;
use regex::Regex;
use std::collections::HashMap;

pub struct RuleParser {
    prefixes: HashMap<String, String>,
    prefix_regex: Regex,
    integer_regex: Regex,
    decimal_regex: Regex,
    double_regex: Regex,
}

impl RuleParser {
    pub fn new() -> Self {
        let mut prefixes = HashMap::new();
        prefixes.insert("rdf".to_string(), RDF.to_string());
        prefixes.insert("rdfs".to_string(), RDFS.to_string());
        prefixes.insert("owl".to_string(), OWL.to_string());
        prefixes.insert("xsd".to_string(), XSD.to_string());

        RuleParser {
            prefixes,
            prefix_regex: Regex::new(r"^@prefix\s+([A-Za-z][\w\-]*)?:\s*<([^>]*)>\s*\.?\s*$")
                .expect("static regex"),
            integer_regex: Regex::new(r"^[+-]?\d+$").expect("static regex"),
            decimal_regex: Regex::new(r"^[+-]?\d*\.\d+$").expect("static regex"),
            double_regex: Regex::new(r"^[+-]?(\d+\.?\d*|\.\d+)[eE][+-]?\d+$")
                .expect("static regex"),
        }
    }

    pub fn with_prefix(mut self, prefix: &str, namespace: &str) -> Self {
        self.prefixes.insert(prefix.to_string(), namespace.to_string());
        self
    }

    pub fn prefixes(&self) -> &HashMap<String, String> {
        &self.prefixes
    }

    /// Parse a rule file: `@prefix` declarations, comments and any number of rules.
    /// Prefix declarations apply to every rule that follows them.
    pub fn parse_rules(&mut self, text: &str) -> Result<Vec<Rule>, RuleError> {
        let mut rules = Vec::new();
        let mut pending = String::new();
        let mut pending_offset = 0;
        let mut offset = 0;

        for line in text.lines() {
            let trimmed = line.trim();
            let line_offset = offset;
            offset += line.len() + 1;

            if pending.is_empty() {
                if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with("//") {
                    continue;
                }
                if trimmed.starts_with("@prefix") {
                    let captures = self.prefix_regex.captures(trimmed).ok_or_else(|| {
                        RuleError::parse(
                            line_offset,
                            format!("malformed prefix declaration: {}", trimmed),
                        )
                    })?;
                    let prefix = captures.get(1).map(|m| m.as_str()).unwrap_or("").to_string();
                    let namespace = captures[2].to_string();
                    self.prefixes.insert(prefix, namespace);
                    continue;
                }
                pending_offset = line_offset;
            }

            if trimmed.starts_with('#') || trimmed.starts_with("//") {
                continue;
            }
            pending.push_str(line);
            pending.push('\n');

            if bracket_balance(&pending) == 0 {
                let rule_text = std::mem::take(&mut pending);
                let rule = self.parse_rule(rule_text.trim()).map_err(|e| shift(e, pending_offset))?;
                rules.push(rule);
            }
        }

        if !pending.trim().is_empty() {
            return Err(RuleError::parse(pending_offset, "unterminated rule, missing ']'"));
        }
        Ok(rules)
    }

    /// Parse a single bracketed rule.
    pub fn parse_rule(&self, text: &str) -> Result<Rule, RuleError> {
        let mut cursor = Cursor::new(text);
        cursor.skip_ws();
        cursor.expect('[')?;
        cursor.skip_ws();

        let name = self.parse_rule_name(&mut cursor);

        let mut body = Vec::new();
        loop {
            cursor.skip_ws();
            if cursor.starts_with("->") {
                cursor.advance(2);
                break;
            }
            if cursor.peek().is_none() {
                return Err(cursor.error("expected '->' before end of rule"));
            }
            body.push(self.parse_clause(&mut cursor)?);
        }

        let mut head = Vec::new();
        loop {
            cursor.skip_ws();
            match cursor.peek() {
                Some(']') => {
                    cursor.advance(1);
                    break;
                }
                Some(_) => head.push(self.parse_clause(&mut cursor)?),
                None => return Err(cursor.error("expected ']' at end of rule")),
            }
        }

        cursor.skip_ws();
        if cursor.peek() == Some('.') {
            cursor.advance(1);
            cursor.skip_ws();
        }
        if let Some(c) = cursor.peek() {
            return Err(cursor.error(format!("unexpected '{}' after rule", c)));
        }

        Ok(Rule::new(name, body, head))
    }

    fn parse_rule_name(&self, cursor: &mut Cursor) -> Option<String> {
        let start = cursor.pos;
        let word = cursor.word();
        if word.len() > 1 && word.ends_with(':') {
            let next = cursor.peek();
            if next.map_or(true, char::is_whitespace) {
                return Some(word[..word.len() - 1].to_string());
            }
        }
        cursor.pos = start;
        None
    }

    fn parse_clause(&self, cursor: &mut Cursor) -> Result<ClauseEntry, RuleError> {
        cursor.skip_ws();
        if cursor.peek() == Some('(') {
            cursor.advance(1);
            let subject = self.parse_term(cursor)?;
            let predicate = self.parse_term(cursor)?;
            let object = self.parse_term(cursor)?;
            cursor.skip_ws();
            cursor.expect(')')?;
            return Ok(ClauseEntry::Triple(TriplePattern::new(subject, predicate, object)));
        }

        match self.parse_term(cursor)? {
            Term::Functor(f) => Ok(ClauseEntry::Functor(f)),
            other => Err(cursor.error(format!(
                "expected a triple pattern or functor, found {}",
                other
            ))),
        }
    }

    fn parse_term(&self, cursor: &mut Cursor) -> Result<Term, RuleError> {
        cursor.skip_ws();
        match cursor.peek() {
            None => Err(cursor.error("unexpected end of rule")),
            Some('?') => {
                cursor.advance(1);
                let name = cursor.take_while(|c| c.is_alphanumeric() || c == '_');
                if name.is_empty() {
                    return Err(cursor.error("empty variable name"));
                }
                Ok(Term::Variable(name))
            }
            Some('<') => Ok(Term::Uri(self.parse_iri(cursor)?)),
            Some('"') | Some('\'') => self.parse_literal(cursor),
            Some('_') if cursor.starts_with("_:") => {
                cursor.advance(2);
                let id = cursor.take_while(|c| c.is_alphanumeric() || c == '_' || c == '-');
                if id.is_empty() {
                    return Err(cursor.error("empty blank node label"));
                }
                Ok(Term::Blank(id))
            }
            Some(c) if is_delimiter(c) => Err(cursor.error(format!("unexpected '{}'", c))),
            Some(_) => self.parse_word_term(cursor),
        }
    }

    fn parse_word_term(&self, cursor: &mut Cursor) -> Result<Term, RuleError> {
        let start = cursor.pos;
        let word = cursor.word();

        if cursor.peek() == Some('(') && !word.contains(':') {
            cursor.advance(1);
            let mut args = Vec::new();
            loop {
                cursor.skip_ws();
                match cursor.peek() {
                    Some(')') => {
                        cursor.advance(1);
                        break;
                    }
                    Some(',') => cursor.advance(1),
                    Some(_) => args.push(self.parse_term(cursor)?),
                    None => return Err(cursor.error(format!("unterminated functor '{}'", word))),
                }
            }
            return Ok(Term::Functor(Functor { name: word, args }));
        }

        if self.integer_regex.is_match(&word) {
            return Ok(Term::typed_literal(&word, &format!("{}integer", XSD)));
        }
        if self.decimal_regex.is_match(&word) {
            return Ok(Term::typed_literal(&word, &format!("{}decimal", XSD)));
        }
        if self.double_regex.is_match(&word) {
            return Ok(Term::typed_literal(&word, &format!("{}double", XSD)));
        }
        if word == "true" || word == "false" {
            return Ok(Term::typed_literal(&word, &format!("{}boolean", XSD)));
        }
        if let Some((prefix, local)) = word.split_once(':') {
            let namespace = self
                .prefixes
                .get(prefix)
                .ok_or_else(|| RuleError::UnknownPrefix(prefix.to_string()))?;
            return Ok(Term::Uri(format!("{}{}", namespace, local)));
        }

        cursor.pos = start;
        Err(cursor.error(format!("unrecognised term '{}'", word)))
    }

    fn parse_iri(&self, cursor: &mut Cursor) -> Result<String, RuleError> {
        cursor.expect('<')?;
        let iri = cursor.take_while(|c| c != '>' && !c.is_whitespace());
        cursor.expect('>')?;
        Ok(iri)
    }

    fn parse_literal(&self, cursor: &mut Cursor) -> Result<Term, RuleError> {
        let quote = cursor.peek().unwrap_or('"');
        cursor.advance(1);
        let mut value = String::new();
        loop {
            match cursor.next() {
                None => return Err(cursor.error("unterminated literal")),
                Some('\\') => match cursor.next() {
                    Some('n') => value.push('\n'),
                    Some('r') => value.push('\r'),
                    Some('t') => value.push('\t'),
                    Some(c) => value.push(c),
                    None => return Err(cursor.error("unterminated escape")),
                },
                Some(c) if c == quote => break,
                Some(c) => value.push(c),
            }
        }

        if cursor.starts_with("^^") {
            cursor.advance(2);
            let datatype = if cursor.peek() == Some('<') {
                self.parse_iri(cursor)?
            } else {
                match self.parse_word_term(cursor)? {
                    Term::Uri(iri) => iri,
                    other => return Err(cursor.error(format!("invalid datatype {}", other))),
                }
            };
            return Ok(Term::Literal(Literal::typed(&value, &datatype)));
        }
        if cursor.peek() == Some('@') {
            cursor.advance(1);
            let lang = cursor.take_while(|c| c.is_alphanumeric() || c == '-');
            if lang.is_empty() {
                return Err(cursor.error("empty language tag"));
            }
            return Ok(Term::Literal(Literal::lang(&value, &lang)));
        }
        Ok(Term::Literal(Literal::simple(&value)))
    }
}

impl Default for RuleParser {
    fn default() -> Self {
        Self::new()
    }
}

fn is_delimiter(c: char) -> bool {
    matches!(c, '(' | ')' | '[' | ']' | ',' | '<' | '>' | '"' | '\'')
}

/// Open minus closed square brackets, ignoring brackets inside literals and IRIs.
fn bracket_balance(text: &str) -> i64 {
    let mut depth = 0;
    let mut in_literal: Option<char> = None;
    let mut in_iri = false;
    let mut escaped = false;
    for c in text.chars() {
        if let Some(q) = in_literal {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                in_literal = None;
            }
            continue;
        }
        if in_iri {
            in_iri = c != '>';
            continue;
        }
        match c {
            '"' | '\'' => in_literal = Some(c),
            '<' => in_iri = true,
            '[' => depth += 1,
            ']' => depth -= 1,
            _ => {}
        }
    }
    depth
}

fn shift(err: RuleError, by: usize) -> RuleError {
    match err {
        RuleError::Parse { offset, message } => RuleError::Parse { offset: offset + by, message },
        other => other,
    }
}

struct Cursor {
    chars: Vec<char>,
    pos: usize,
}

impl Cursor {
    fn new(text: &str) -> Self {
        Cursor { chars: text.chars().collect(), pos: 0 }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn next(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn advance(&mut self, n: usize) {
        self.pos = (self.pos + n).min(self.chars.len());
    }

    fn starts_with(&self, s: &str) -> bool {
        s.chars().enumerate().all(|(i, c)| self.chars.get(self.pos + i) == Some(&c))
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn take_while<F: Fn(char) -> bool>(&mut self, pred: F) -> String {
        let start = self.pos;
        while self.peek().is_some_and(&pred) {
            self.pos += 1;
        }
        self.chars[start..self.pos].iter().collect()
    }

    /// A run of non-whitespace, non-delimiter characters.
    fn word(&mut self) -> String {
        self.take_while(|c| !c.is_whitespace() && !is_delimiter(c))
    }

    fn expect(&mut self, expected: char) -> Result<(), RuleError> {
        match self.peek() {
            Some(c) if c == expected => {
                self.pos += 1;
                Ok(())
            }
            Some(c) => Err(self.error(format!("expected '{}', found '{}'", expected, c))),
            None => Err(self.error(format!("expected '{}', found end of input", expected))),
        }
    }

    fn error(&self, message: impl Into<String>) -> RuleError {
        RuleError::parse(self.pos, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EX: &str = "http://example.org/";

    fn parser() -> RuleParser {
        RuleParser::new().with_prefix("ex", EX)
    }

    #[test]
    fn test_parse_subclass_rule() {
        let rule = parser()
            .parse_rule("[sub: (?x rdf:type ?c) (?c rdfs:subClassOf ?d) -> (?x rdf:type ?d)]")
            .unwrap();
        assert_eq!(rule.name.as_deref(), Some("sub"));
        assert_eq!(rule.body.len(), 2);
        assert_eq!(rule.head.len(), 1);
        let first = rule.body_patterns().next().unwrap();
        assert_eq!(first.predicate, Term::uri(&format!("{}type", RDF)));
    }

    #[test]
    fn test_parse_literals_and_functors() {
        let text = concat!(
            r#"[(?x ex:label "caf\"e"@EN) (?x ex:age 42) greaterThan(?a, 17.5) "#,
            r#"(?x ex:p 'single') -> (?x ex:q "v"^^xsd:string)]"#,
        );
        let rule = parser().parse_rule(text).unwrap();
        assert!(rule.name.is_none());
        let label = rule.body_patterns().next().unwrap();
        assert_eq!(label.object, Term::Literal(Literal::lang("caf\"e", "en")));
        let age = rule.body_patterns().nth(1).unwrap();
        assert_eq!(age.object, Term::typed_literal("42", &format!("{}integer", XSD)));
        let guard = rule.guards().next().unwrap();
        assert_eq!(guard.name, "greaterThan");
        assert_eq!(guard.args[1], Term::typed_literal("17.5", &format!("{}decimal", XSD)));
        let head = rule.head_patterns().next().unwrap();
        assert_eq!(head.object, Term::typed_literal("v", &format!("{}string", XSD)));
    }

    #[test]
    fn test_canonical_text_round_trips() {
        let rule = parser()
            .parse_rule(
                "[r1: (?x ex:p pair(?y, _:b1)) notEqual(?x ?y) -> (?y ex:q ?x) print(?x)]",
            )
            .unwrap();
        let text = rule.canonical();
        assert!(!text.contains("ex:"));
        let reparsed = Rule::parse(&text).unwrap();
        assert_eq!(reparsed, rule);
    }

    #[test]
    fn test_parse_rules_file_with_prefixes_and_comments() {
        let text = r#"
            # a comment
            @prefix ex: <http://example.org/> .
            [a: (?x ex:p ?y)
                -> (?y ex:q ?x)]
            // another comment
            [b: (?x ex:q ?y) -> (?x ex:r "]") ]
        "#;
        let mut parser = RuleParser::new();
        let rules = parser.parse_rules(text).unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[1].name.as_deref(), Some("b"));
        assert_eq!(rules[1].head_patterns().next().unwrap().object, Term::literal("]"));
    }

    #[test]
    fn test_malformed_rules_fail() {
        assert!(matches!(
            parser().parse_rule("[(?x ex:p ?y) (?y ex:q ?z)]"),
            Err(RuleError::Parse { .. })
        ));
        assert!(matches!(
            parser().parse_rule("[(?x nope:p ?y) -> (?y ex:q ?x)]"),
            Err(RuleError::UnknownPrefix(p)) if p == "nope"
        ));
        assert!(matches!(parser().parse_rule("[(?x ex:p) -> ]"), Err(RuleError::Parse { .. })));
        assert!(parser().parse_rules("[a: (?x ex:p ?y) -> ").is_err());
    }
}
