use crate::core::message::{now_millis, FactMessage};
use crate::core::term::{Literal, Term, Triple};
use crate::error::Error;

/// Parse a line of N-Triples/N-Quads into an input fact message.
///
/// An optional leading integer is taken as the fact's timestamp in milliseconds;
/// otherwise the current time is used. A trailing graph label is accepted and
/// ignored: provenance is tracked per binding, not per named graph.
pub fn parse_rdf_line(line: &str) -> Result<FactMessage, Error> {
    let trimmed = line.trim();

    if trimmed.is_empty() {
        return Err(Error::FactParse("Empty line".to_string()));
    }

    let trimmed = trimmed.strip_suffix('.').unwrap_or(trimmed).trim_end();

    let (timestamp, remaining) = parse_optional_timestamp(trimmed);
    let (subject, remaining) = parse_resource(remaining, "subject")?;
    let (predicate, remaining) = parse_resource(remaining, "predicate")?;
    let (object, remaining) = parse_object(remaining)?;

    if !remaining.trim().is_empty() {
        parse_resource(remaining, "graph")?;
    }

    Ok(FactMessage::assert(Triple::new(subject, predicate, object), timestamp))
}

/// Parse every non-empty, non-comment line; the first bad line fails the batch.
pub fn parse_rdf_document(text: &str) -> Result<Vec<FactMessage>, Error> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| {
            let t = line.trim();
            !t.is_empty() && !t.starts_with('#')
        })
        .map(|(i, line)| {
            parse_rdf_line(line).map_err(|e| Error::FactParse(format!("line {}: {}", i + 1, e)))
        })
        .collect()
}

/// Parse optional timestamp at the beginning of the line
fn parse_optional_timestamp(input: &str) -> (i64, &str) {
    let input = input.trim_start();

    if let Some(space_idx) = input.find(char::is_whitespace) {
        let first_token = &input[..space_idx];
        if let Ok(ts) = first_token.parse::<i64>() {
            return (ts, input[space_idx..].trim_start());
        }
    }

    (now_millis(), input)
}

/// Parse a URI in angle brackets or a `_:` blank node label
fn parse_resource<'a>(input: &'a str, field_name: &str) -> Result<(Term, &'a str), Error> {
    let input = input.trim_start();

    if let Some(rest) = input.strip_prefix("_:") {
        let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        if end == 0 {
            return Err(Error::FactParse(format!("Empty blank node label for {}", field_name)));
        }
        return Ok((Term::Blank(rest[..end].to_string()), rest[end..].trim_start()));
    }

    let (uri, remaining) = parse_uri(input, field_name)?;
    Ok((Term::Uri(uri), remaining))
}

/// Parse a URI enclosed in angle brackets
fn parse_uri<'a>(input: &'a str, field_name: &str) -> Result<(String, &'a str), Error> {
    let input = input.trim_start();

    if !input.starts_with('<') {
        return Err(Error::FactParse(format!(
            "Expected '<' for {} URI, got: {}",
            field_name, input
        )));
    }

    let end_idx = input
        .find('>')
        .ok_or_else(|| Error::FactParse(format!("Missing closing '>' for {} URI", field_name)))?;

    let uri = input[1..end_idx].to_string();
    let remaining = input[end_idx + 1..].trim_start();

    Ok((uri, remaining))
}

/// Parse object which can be:
/// - URI: <http://example.org/resource>
/// - Blank node: _:b0
/// - Plain literal: "some text"
/// - Typed literal: "23.5"^^<http://www.w3.org/2001/XMLSchema#decimal>
/// - Language-tagged literal: "hello"@en
fn parse_object(input: &str) -> Result<(Term, &str), Error> {
    let input = input.trim_start();

    if input.starts_with('"') {
        return parse_literal(input);
    }

    parse_resource(input, "object")
}

/// Parse a literal with optional datatype or language tag
fn parse_literal(input: &str) -> Result<(Term, &str), Error> {
    let mut value = String::new();
    let mut chars = input.char_indices().skip(1);
    let mut end = None;

    while let Some((idx, c)) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some((_, 'n')) => value.push('\n'),
                Some((_, 'r')) => value.push('\r'),
                Some((_, 't')) => value.push('\t'),
                Some((_, other)) => value.push(other),
                None => break,
            },
            '"' => {
                end = Some(idx);
                break;
            }
            other => value.push(other),
        }
    }

    let end = end.ok_or_else(|| Error::FactParse("Missing closing quote for literal".to_string()))?;
    let after_quote = &input[end + 1..];

    if let Some(after_caret) = after_quote.strip_prefix("^^") {
        let (datatype, rest) = parse_uri(after_caret, "datatype")?;
        return Ok((Term::Literal(Literal::typed(&value, &datatype)), rest));
    }

    if let Some(after_at) = after_quote.strip_prefix('@') {
        let lang_end = after_at.find(char::is_whitespace).unwrap_or(after_at.len());
        let lang = &after_at[..lang_end];
        if lang.is_empty() {
            return Err(Error::FactParse("Empty language tag".to_string()));
        }
        return Ok((Term::Literal(Literal::lang(&value, lang)), after_at[lang_end..].trim_start()));
    }

    Ok((Term::Literal(Literal::simple(&value)), after_quote.trim_start()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::term::XSD;

    #[test]
    fn test_parse_typed_literal() {
        let line = concat!(
            r#"<http://example.org/sensor1> <http://example.org/temperature> "#,
            r#""23.5"^^<http://www.w3.org/2001/XMLSchema#decimal> "#,
            r#"<http://example.org/sensorStream> ."#,
        );
        let result = parse_rdf_line(line).unwrap();

        assert_eq!(result.subject(), &Term::uri("http://example.org/sensor1"));
        assert_eq!(result.predicate(), &Term::uri("http://example.org/temperature"));
        assert_eq!(result.object(), &Term::typed_literal("23.5", &format!("{}decimal", XSD)));
        assert!(result.is_add);
    }

    #[test]
    fn test_parse_plain_and_language_literals() {
        let line = r#"<http://example.org/s> <http://example.org/name> "Temperature \"Sensor\"" ."#;
        assert_eq!(
            parse_rdf_line(line).unwrap().object(),
            &Term::literal("Temperature \"Sensor\"")
        );

        let line = r#"<http://example.org/s> <http://example.org/name> "hallo"@DE ."#;
        assert_eq!(
            parse_rdf_line(line).unwrap().object(),
            &Term::Literal(Literal::lang("hallo", "de"))
        );
    }

    #[test]
    fn test_parse_blank_nodes() {
        let line = r#"_:b0 <http://example.org/knows> _:b1 ."#;
        let result = parse_rdf_line(line).unwrap();
        assert_eq!(result.subject(), &Term::blank("b0"));
        assert_eq!(result.object(), &Term::blank("b1"));
    }

    #[test]
    fn test_parse_with_timestamp() {
        let line = concat!(
            r#"1234567890 <http://example.org/s> <http://example.org/p> "value" "#,
            r#"<http://example.org/g> ."#,
        );
        let result = parse_rdf_line(line).unwrap();

        assert_eq!(result.timestamp, 1234567890);
        assert_eq!(result.subject(), &Term::uri("http://example.org/s"));
        assert_eq!(result.graph.len(), 1);
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_rdf_line("").is_err());
        assert!(
            parse_rdf_line(r#""lit" <http://example.org/p> <http://example.org/o> ."#).is_err()
        );
        assert!(
            parse_rdf_line(r#"<http://example.org/s> <http://example.org/p> "open ."#).is_err()
        );
    }

    #[test]
    fn test_parse_document_reports_line_numbers() {
        let doc = "# header\n<http://a> <http://p> <http://b> .\nnot a triple\n";
        let err = parse_rdf_document(doc).unwrap_err();
        assert!(err.to_string().contains("line 3"));
    }
}
