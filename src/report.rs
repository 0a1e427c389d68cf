//! Append-only plain-text report of per-URL outcomes.
//!
//! The report is UTF-8 with LF line endings. The file is opened, appended,
//! and closed for every entry; inefficient, but the surrounding network
//! operations dominate wall time, and it keeps entries visible even if the
//! run is killed.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::PathBuf;

use chrono::Local;
use tracing::{debug, warn};

/// Writer for the optional `--report` file.
///
/// With no path configured, every operation is a no-op, so callers never
/// need to branch on whether reporting is active.
#[derive(Debug)]
pub struct Reporter {
    path: Option<PathBuf>,
}

impl Reporter {
    /// Creates a reporter for the given path, or an inert one for `None`.
    #[must_use]
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }

    /// Whether a report file is being written.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.path.is_some()
    }

    /// Checks that the report file can be created and appended to.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error when the file is not writable.
    pub fn verify_writable(&self) -> io::Result<()> {
        if let Some(path) = &self.path {
            OpenOptions::new().create(true).append(true).open(path)?;
        }
        Ok(())
    }

    /// Truncates the report and writes the opening line.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error on failure.
    pub fn start(&self) -> io::Result<()> {
        if let Some(path) = &self.path {
            let mut file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(path)?;
            writeln!(
                file,
                "eprints2archives starting {}.",
                Local::now().to_rfc3339()
            )?;
        }
        Ok(())
    }

    /// Appends one line to the report. Failures are logged, not raised: a
    /// briefly unwritable report must not kill archive submissions already
    /// in flight.
    pub fn record(&self, text: &str) {
        debug!(report = text);
        let Some(path) = &self.path else {
            return;
        };
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .and_then(|mut file| writeln!(file, "{text}"));
        if let Err(error) = result {
            warn!(path = %path.display(), %error, "could not append to report file");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_inactive_reporter_is_noop() {
        let reporter = Reporter::new(None);
        assert!(!reporter.is_active());
        assert!(reporter.verify_writable().is_ok());
        assert!(reporter.start().is_ok());
        reporter.record("goes nowhere");
    }

    #[test]
    fn test_start_truncates_and_record_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.txt");
        std::fs::write(&path, "stale content\n").unwrap();

        let reporter = Reporter::new(Some(path.clone()));
        reporter.verify_writable().unwrap();
        reporter.start().unwrap();
        reporter.record("https://ex.org/x ➜ Internet Archive: added");
        reporter.record("Finished sending 1 URLs.");

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("eprints2archives starting "));
        assert!(lines[0].ends_with('.'));
        assert_eq!(lines[1], "https://ex.org/x ➜ Internet Archive: added");
        assert_eq!(lines[2], "Finished sending 1 URLs.");
        assert!(!content.contains("stale"));
    }

    #[test]
    fn test_verify_writable_fails_for_bad_path() {
        let reporter = Reporter::new(Some(PathBuf::from("/no/such/dir/report.txt")));
        assert!(reporter.verify_writable().is_err());
    }
}
