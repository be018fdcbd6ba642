//! Appends inferred facts to a file, one N-Triples line each.

use crate::core::message::InferredFact;
use crate::core::term::{Term, Triple};
use crate::error::SinkError;
use crate::sinks::FactSink;
use oxigraph::model::{BlankNode, Literal, NamedNode};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

pub struct FileSink {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl FileSink {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, SinkError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self { path, writer: BufWriter::new(file) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FactSink for FileSink {
    fn name(&self) -> &str {
        "file"
    }

    fn consume(&mut self, fact: &InferredFact) -> Result<(), SinkError> {
        let triple = to_oxigraph(&fact.triple)?;
        writeln!(self.writer, "{} .", triple)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        self.writer.flush()?;
        Ok(())
    }
}

fn named_node(iri: &str) -> Result<NamedNode, SinkError> {
    NamedNode::new(iri).map_err(|e| SinkError::InvalidTerm(format!("<{}>: {}", iri, e)))
}

fn blank_node(id: &str) -> Result<BlankNode, SinkError> {
    BlankNode::new(id).map_err(|e| SinkError::InvalidTerm(format!("_:{}: {}", id, e)))
}

fn object_term(term: &Term) -> Result<oxigraph::model::Term, SinkError> {
    Ok(match term {
        Term::Uri(iri) => named_node(iri)?.into(),
        Term::Blank(id) => blank_node(id)?.into(),
        Term::Literal(lit) => match (&lit.language, &lit.datatype) {
            (Some(lang), _) => Literal::new_language_tagged_literal(&lit.lexical, lang)
                .map_err(|e| SinkError::InvalidTerm(format!("@{}: {}", lang, e)))?
                .into(),
            (None, Some(dt)) => Literal::new_typed_literal(&lit.lexical, named_node(dt)?).into(),
            (None, None) => Literal::new_simple_literal(&lit.lexical).into(),
        },
        // structured values travel as their text form
        Term::Functor(_) => Literal::new_simple_literal(term.to_string()).into(),
        Term::Variable(name) => {
            return Err(SinkError::InvalidTerm(format!("unbound variable ?{}", name)))
        }
    })
}

/// Convert a ground fact into an oxigraph triple, validating every term.
pub fn to_oxigraph(triple: &Triple) -> Result<oxigraph::model::Triple, SinkError> {
    let predicate = match &triple.predicate {
        Term::Uri(iri) => named_node(iri)?,
        other => return Err(SinkError::InvalidTerm(format!("predicate {} is not an IRI", other))),
    };
    let object = object_term(&triple.object)?;

    match &triple.subject {
        Term::Uri(iri) => Ok(oxigraph::model::Triple::new(named_node(iri)?, predicate, object)),
        Term::Blank(id) => Ok(oxigraph::model::Triple::new(blank_node(id)?, predicate, object)),
        other => Err(SinkError::InvalidTerm(format!(
            "subject {} is not an IRI or blank node",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::message::GraphRef;
    use crate::core::term::XSD;

    fn temp_path(name: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir()
            .join(format!("retestream_file_sink_{}_{}.nt", name, std::process::id()));
        let _ = std::fs::remove_file(&path);
        path
    }

    fn fact(triple: Triple) -> InferredFact {
        InferredFact { triple, rule_id: "r".to_string(), support: GraphRef::empty(), timestamp: 0 }
    }

    #[test]
    fn test_writes_ntriples_lines() {
        let path = temp_path("lines");

        {
            let mut sink = FileSink::open(&path).unwrap();
            sink.consume(&fact(Triple::new(
                Term::uri("http://e/a"),
                Term::uri("http://e/age"),
                Term::typed_literal("5", &format!("{}integer", XSD)),
            )))
            .unwrap();
            sink.consume(&fact(Triple::new(
                Term::blank("b0"),
                Term::uri("http://e/name"),
                Term::literal("x"),
            )))
            .unwrap();
        }

        let written = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = written.lines().collect();
        assert_eq!(
            lines,
            vec![
                "<http://e/a> <http://e/age> \"5\"^^<http://www.w3.org/2001/XMLSchema#integer> .",
                "_:b0 <http://e/name> \"x\" .",
            ]
        );
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_lines_are_buffered_until_flush() {
        let path = temp_path("buffered");

        let mut sink = FileSink::open(&path).unwrap();
        let triple =
            Triple::new(Term::uri("http://e/a"), Term::uri("http://e/p"), Term::uri("http://e/b"));
        sink.consume(&fact(triple)).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "");

        sink.flush().unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written, "<http://e/a> <http://e/p> <http://e/b> .\n");
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_rejects_literal_subject() {
        let triple =
            Triple::new(Term::literal("x"), Term::uri("http://e/p"), Term::uri("http://e/o"));
        assert!(matches!(to_oxigraph(&triple), Err(SinkError::InvalidTerm(_))));
    }
}
