//! EPrints record XML and leaf-field access.
//!
//! EPrints serves records as XML in the namespace
//! `http://eprints.org/ep2/data/2.0`. The core only ever needs the text of a
//! handful of named leaf fields (`eprintid`, `lastmod`, `eprint_status`,
//! `official_url`), looked up by local name regardless of namespace prefix,
//! so the record is reduced at parse time to a map of element local-names to
//! their first-occurring text content.

use std::collections::HashMap;

use quick_xml::Reader;
use quick_xml::events::Event;
use thiserror::Error;

/// Error returned when record XML cannot be parsed.
#[derive(Debug, Error)]
#[error("unable to parse EPrints record XML: {reason}")]
pub struct RecordParseError {
    /// Parser diagnostic.
    pub reason: String,
}

/// A parsed EPrints record.
///
/// Field access is by local name; the first occurrence in document order
/// wins, which matches how the fields of interest appear in EPrints output.
#[derive(Debug, Clone, Default)]
pub struct EPrintRecord {
    fields: HashMap<String, String>,
}

impl EPrintRecord {
    /// Parses record XML into a field map.
    ///
    /// # Errors
    ///
    /// Returns [`RecordParseError`] on malformed XML.
    pub fn parse(xml: &str) -> Result<Self, RecordParseError> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut fields: HashMap<String, String> = HashMap::new();
        // Stack of (local name, accumulated text) for currently open elements.
        let mut open: Vec<(String, String)> = Vec::new();
        let mut saw_root = false;

        loop {
            match reader.read_event() {
                Ok(Event::Eof) => break,
                Ok(Event::Start(element)) => {
                    saw_root = true;
                    let name =
                        String::from_utf8_lossy(element.local_name().as_ref()).into_owned();
                    open.push((name, String::new()));
                }
                Ok(Event::Text(text)) => {
                    if let Some((_, buffer)) = open.last_mut() {
                        let chunk = text.unescape().map_err(|e| RecordParseError {
                            reason: e.to_string(),
                        })?;
                        buffer.push_str(&chunk);
                    }
                }
                Ok(Event::End(_)) => {
                    if let Some((name, buffer)) = open.pop() {
                        let value = buffer.trim();
                        if !value.is_empty() {
                            fields.entry(name).or_insert_with(|| value.to_string());
                        }
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    return Err(RecordParseError {
                        reason: e.to_string(),
                    });
                }
            }
        }

        if !saw_root {
            return Err(RecordParseError {
                reason: "document contains no elements".to_string(),
            });
        }
        if let Some((name, _)) = open.last() {
            return Err(RecordParseError {
                reason: format!("unclosed element <{name}>"),
            });
        }
        Ok(Self { fields })
    }

    /// Returns the text of the named leaf field, or `None` when the field is
    /// absent or empty.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    /// The record's own identifier, when present.
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.field("eprintid")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version='1.0' encoding='utf-8'?>
<eprints xmlns="http://eprints.org/ep2/data/2.0">
  <eprint id="https://srv.test/id/eprint/84">
    <eprintid>84</eprintid>
    <rev_number>19</rev_number>
    <eprint_status>archive</eprint_status>
    <lastmod>2020-07-29 13:45:00</lastmod>
    <official_url>https://ex.org/paper.pdf</official_url>
    <creators>
      <item>
        <name>
          <family>Doe</family>
          <given>Jan</given>
        </name>
      </item>
    </creators>
    <title>An Example Work</title>
  </eprint>
</eprints>"#;

    #[test]
    fn test_parse_extracts_leaf_fields() {
        let record = EPrintRecord::parse(SAMPLE).unwrap();
        assert_eq!(record.field("eprintid"), Some("84"));
        assert_eq!(record.field("eprint_status"), Some("archive"));
        assert_eq!(record.field("lastmod"), Some("2020-07-29 13:45:00"));
        assert_eq!(record.field("official_url"), Some("https://ex.org/paper.pdf"));
        assert_eq!(record.id(), Some("84"));
    }

    #[test]
    fn test_nested_fields_resolve_by_local_name() {
        let record = EPrintRecord::parse(SAMPLE).unwrap();
        assert_eq!(record.field("family"), Some("Doe"));
        assert_eq!(record.field("title"), Some("An Example Work"));
    }

    #[test]
    fn test_absent_field_is_none() {
        let record = EPrintRecord::parse(SAMPLE).unwrap();
        assert_eq!(record.field("no_such_field"), None);
    }

    #[test]
    fn test_empty_field_is_none() {
        let xml = r#"<eprint xmlns="http://eprints.org/ep2/data/2.0">
            <official_url></official_url>
            <eprintid>7</eprintid>
        </eprint>"#;
        let record = EPrintRecord::parse(xml).unwrap();
        assert_eq!(record.field("official_url"), None);
        assert_eq!(record.field("eprintid"), Some("7"));
    }

    #[test]
    fn test_first_occurrence_wins() {
        let xml = "<r><v>first</v><v>second</v></r>";
        let record = EPrintRecord::parse(xml).unwrap();
        assert_eq!(record.field("v"), Some("first"));
    }

    #[test]
    fn test_namespace_prefix_is_ignored() {
        let xml = r#"<ep:eprint xmlns:ep="http://eprints.org/ep2/data/2.0">
            <ep:eprintid>12</ep:eprintid>
        </ep:eprint>"#;
        let record = EPrintRecord::parse(xml).unwrap();
        assert_eq!(record.field("eprintid"), Some("12"));
    }

    #[test]
    fn test_malformed_xml_fails() {
        assert!(EPrintRecord::parse("<eprint><unclosed>").is_err());
        assert!(EPrintRecord::parse("just text, no elements").is_err());
    }
}
