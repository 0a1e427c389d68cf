//! Memento TimeMap parsing (RFC 7089 link format).
//!
//! Web archives describe the snapshots they hold for a URL as a TimeMap in
//! the link format, e.g.:
//!
//! ```text
//! <http://ex.org/>; rel="original",
//! <https://web.archive.org/web/timemap/link/http://ex.org/>; rel="self";
//!   type="application/link-format",
//! <https://web.archive.org/web/http://ex.org/>; rel="timegate",
//! <https://web.archive.org/web/20200101000000/http://ex.org/>;
//!   rel="first memento"; datetime="Wed, 01 Jan 2020 00:00:00 GMT"
//! ```
//!
//! The parser is a hand-rolled character state machine: archives emit enough
//! almost-conformant output that a lenient, resumable scanner beats a strict
//! grammar. With `skip_errors`, malformed segments are silently skipped;
//! otherwise parsing stops with a [`TimeMapError`].

use std::collections::HashMap;
use std::time::SystemTime;

use thiserror::Error;

/// Error describing where a TimeMap stopped making sense.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("corrupted TimeMap content at character {position}: {reason}")]
pub struct TimeMapError {
    /// 1-based character offset of the problem.
    pub position: usize,
    /// What the parser was looking for.
    pub reason: &'static str,
}

/// One archived snapshot of a URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Memento {
    /// The snapshot URI.
    pub uri: String,
    /// Snapshot time (RFC 1123 GMT in the wire format), when present.
    pub datetime: Option<SystemTime>,
}

/// A parsed TimeMap.
///
/// The fan-out only ever cares about [`mementos`](Self::mementos); the other
/// URIs are retained for diagnostics.
#[derive(Debug, Clone, Default)]
pub struct TimeMap {
    /// URI of the original resource.
    pub original_uri: Option<String>,
    /// URI of the archive's TimeGate for the resource.
    pub timegate_uri: Option<String>,
    /// URI of this TimeMap itself.
    pub timemap_uri: Option<String>,
    /// The memento marked `rel="first memento"`, if any.
    pub first: Option<Memento>,
    /// The memento marked `rel="last memento"`, if any.
    pub last: Option<Memento>,
    /// All dated mementos, in listing order.
    pub mementos: Vec<Memento>,
}

/// Parser states; see the state machine in [`TimeMap::parse`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Expecting `<` opening a URI.
    LinkStart,
    /// Reading the URI up to `>`.
    Uri,
    /// Expecting `;` before the first parameter.
    ParamsStart,
    /// Reading a parameter key up to `=`.
    Key,
    /// After a key: expecting `"`, `;`, or `,`.
    ValueStart,
    /// Reading a quoted value up to the closing `"`.
    QuotedValue,
}

impl TimeMap {
    /// Parses link-format text into a TimeMap.
    ///
    /// # Errors
    ///
    /// Returns [`TimeMapError`] on malformed input unless `skip_errors` is
    /// set, in which case the offending characters are skipped.
    pub fn parse(text: &str, skip_errors: bool) -> Result<Self, TimeMapError> {
        let mut map = TimeMap::default();
        let mut state = State::LinkStart;
        let mut uri = String::new();
        let mut key = String::new();
        let mut value = String::new();
        let mut attrs: HashMap<String, String> = HashMap::new();

        for (index, character) in text.chars().enumerate() {
            let position = index + 1;
            match state {
                State::LinkStart => {
                    uri.clear();
                    attrs.clear();
                    if character == '<' {
                        state = State::Uri;
                    } else if !character.is_whitespace() && !skip_errors {
                        return Err(TimeMapError {
                            position,
                            reason: "looking for next URI",
                        });
                    }
                }
                State::Uri => {
                    if character == '>' {
                        uri = uri.trim().to_string();
                        state = State::ParamsStart;
                    } else {
                        uri.push(character);
                    }
                }
                State::ParamsStart => {
                    if character == ';' {
                        state = State::Key;
                    } else if !character.is_whitespace() && !skip_errors {
                        return Err(TimeMapError {
                            position,
                            reason: "looking for relation",
                        });
                    }
                }
                State::Key => {
                    if character == '=' {
                        state = State::ValueStart;
                    } else {
                        key.push(character);
                    }
                }
                State::ValueStart => match character {
                    ';' => state = State::Key,
                    ',' => {
                        map.merge_link(&uri, &attrs, skip_errors)?;
                        state = State::LinkStart;
                    }
                    '"' => state = State::QuotedValue,
                    c if c.is_whitespace() => {}
                    _ => {
                        if !skip_errors {
                            return Err(TimeMapError {
                                position,
                                reason: "looking for value",
                            });
                        }
                    }
                },
                State::QuotedValue => {
                    if character == '"' {
                        attrs.insert(key.trim().to_string(), value.trim().to_string());
                        key.clear();
                        value.clear();
                        state = State::ValueStart;
                    } else {
                        value.push(character);
                    }
                }
            }
        }
        map.merge_link(&uri, &attrs, skip_errors)?;
        Ok(map)
    }

    /// The list of dated mementos in this TimeMap.
    #[must_use]
    pub fn mementos(&self) -> &[Memento] {
        &self.mementos
    }

    /// Whether the TimeMap holds no mementos at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mementos.is_empty()
    }

    /// Folds one parsed `<uri>; params` link into the TimeMap.
    fn merge_link(
        &mut self,
        uri: &str,
        attrs: &HashMap<String, String>,
        skip_errors: bool,
    ) -> Result<(), TimeMapError> {
        if uri.is_empty() && attrs.is_empty() {
            return Ok(());
        }
        let Some(relation) = attrs.get("rel") else {
            if skip_errors {
                return Ok(());
            }
            return Err(TimeMapError {
                position: 0,
                reason: "link without a rel parameter",
            });
        };

        match relation.as_str() {
            "original" => self.original_uri = Some(uri.to_string()),
            "timegate" => self.timegate_uri = Some(uri.to_string()),
            "self" => self.timemap_uri = Some(uri.to_string()),
            rel if rel.contains("memento") => {
                let datetime = match attrs.get("datetime") {
                    Some(text) => match httpdate::parse_http_date(text) {
                        Ok(parsed) => Some(parsed),
                        Err(_) if skip_errors => None,
                        Err(_) => {
                            return Err(TimeMapError {
                                position: 0,
                                reason: "unparseable memento datetime",
                            });
                        }
                    },
                    None => None,
                };
                let memento = Memento {
                    uri: uri.to_string(),
                    datetime,
                };
                if rel.contains("first") {
                    self.first = Some(memento.clone());
                }
                if rel.contains("last") {
                    self.last = Some(memento.clone());
                }
                if datetime.is_some() {
                    self.mementos.push(memento);
                }
            }
            _ => {}
        }
        Ok(())
    }
}
