//! Parsers for rule text and N-Triples fact lines

pub mod rdf_parser;
pub mod rule_parser;

pub use rule_parser::RuleParser;
