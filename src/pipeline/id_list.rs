//! Parsing of the `--id-list` option.
//!
//! The option accepts, in order of elimination:
//!
//! 1. a single decimal integer (`--id-list 54602`)
//! 2. the path of an existing readable file, one identifier per line
//! 3. a comma-delimited expression of integers and inclusive ranges
//!    (`--id-list 1-100,54602`); range endpoints are sorted, so `3-1` means
//!    `1,2,3`
//!
//! Anything else is a usage error. Identifiers stay as strings throughout
//! the program to avoid repeated conversion.

use std::fs;
use std::path::Path;

use thiserror::Error;

/// Error produced for an unusable `--id-list` value.
#[derive(Debug, Error)]
pub enum IdListError {
    /// The expression is neither a number, a file, nor a valid list.
    #[error("unable to understand list of record identifiers: \"{0}\"")]
    BadExpression(String),

    /// A file was named but could not be read.
    #[error("unable to read identifier file \"{path}\": {source}")]
    Unreadable {
        /// The file path given.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Parses an `--id-list` value into record identifiers.
///
/// # Errors
///
/// Returns [`IdListError`] for unreadable files and malformed expressions.
pub fn parse_id_list(spec: &str) -> Result<Vec<String>, IdListError> {
    let spec = spec.trim();
    if spec.is_empty() {
        return Err(IdListError::BadExpression(spec.to_string()));
    }

    // A bare number is never treated as a file name.
    if spec.chars().all(|c| c.is_ascii_digit()) {
        return Ok(vec![spec.to_string()]);
    }

    // Anything else could (however improbably) be a file, so eliminate that
    // possibility before parsing as numbers.
    if Path::new(spec).exists() {
        let content = fs::read_to_string(spec).map_err(|source| IdListError::Unreadable {
            path: spec.to_string(),
            source,
        })?;
        let content = content.strip_prefix('\u{feff}').unwrap_or(&content);
        return Ok(content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect());
    }

    if !spec.contains(',') && !spec.contains('-') {
        return Err(IdListError::BadExpression(spec.to_string()));
    }
    let mut ids = Vec::new();
    for element in spec.split(',') {
        ids.extend(expand_range(element.trim())?);
    }
    Ok(ids)
}

/// Expands `a-b` into every integer in the inclusive range (endpoints
/// sorted); a plain integer expands to itself.
///
/// # Errors
///
/// Returns [`IdListError::BadExpression`] for non-numeric elements.
pub fn expand_range(text: &str) -> Result<Vec<String>, IdListError> {
    let bad = || IdListError::BadExpression(text.to_string());
    if let Some((left, right)) = text.split_once('-') {
        let a: u64 = left.trim().parse().map_err(|_| bad())?;
        let b: u64 = right.trim().parse().map_err(|_| bad())?;
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        Ok((low..=high).map(|n| n.to_string()).collect())
    } else if text.chars().all(|c| c.is_ascii_digit()) && !text.is_empty() {
        Ok(vec![text.to_string()])
    } else {
        Err(bad())
    }
}
