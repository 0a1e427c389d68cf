//! Interfaces to web archiving services.
//!
//! Each service is an [`ArchiveDriver`]: a small capability set (`save`,
//! `name`, `label`, `color`) behind a trait object so the pipeline can fan
//! out to any mix of services. Drivers own their runtime state (current
//! Archive.today host, submit-id, availability) and implement their own
//! idempotency check, rate-limit pauses, error back-off, and host failover.

pub mod archive_today;
pub mod internet_archive;
pub mod timemap;

use std::sync::Arc;

use async_trait::async_trait;

use crate::interrupt::InterruptToken;
use crate::net::{NetClient, NetError};

pub use archive_today::ArchiveToday;
pub use internet_archive::InternetArchive;
pub use timemap::{Memento, TimeMap};

/// Maximum save attempts per URL before a driver gives up.
pub const MAX_RETRIES: u32 = 8;

/// Base pause, in seconds, for driver error back-off.
pub const RETRY_SLEEP_SECS: u64 = 60;

/// State of a driver's work on behalf of one fan-out worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceStatus {
    /// Actively submitting URLs.
    Running,
    /// Paused because the service signalled a rate limit.
    PausedRateLimit,
    /// Paused in error back-off before a retry.
    PausedError,
    /// The service stopped answering entirely.
    Unavailable,
}

/// Non-blocking callback for driver status transitions.
pub type StatusSink = dyn Fn(ServiceStatus) + Send + Sync;

/// Result of one [`ArchiveDriver::save`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveOutcome {
    /// Whether a new snapshot was requested from the service.
    pub added: bool,
    /// How many mementos already existed, or `-1` when the existence check
    /// was skipped (`force`) or could not be made.
    pub existing: i64,
}

/// A web archiving service the pipeline can submit URLs to.
#[async_trait]
pub trait ArchiveDriver: Send + Sync {
    /// Canonical registry name (lowercase, used in `--dest`).
    fn name(&self) -> &'static str;

    /// Human-facing label.
    fn label(&self) -> &'static str;

    /// UI color hint for progress display.
    fn color(&self) -> &'static str;

    /// Asks the service to archive `url`.
    ///
    /// With `force`, the existence check is skipped and
    /// [`SaveOutcome::existing`] is `-1`. Otherwise the service's TimeMap is
    /// consulted first and an already-archived URL is skipped. `notify` is
    /// called on every [`ServiceStatus`] transition.
    ///
    /// # Errors
    ///
    /// Returns the final [`NetError`] once the driver's retry policy is
    /// exhausted, or [`NetError::Cancelled`] on interrupt.
    async fn save(
        &self,
        url: &str,
        notify: &StatusSink,
        force: bool,
    ) -> Result<SaveOutcome, NetError>;
}

/// Normalises a URL for submission: trims and replaces spaces with `_`, the
/// form the archive endpoints expect embedded in their own URLs.
#[must_use]
pub fn uniform(url: &str) -> String {
    url.trim().replace(' ', "_")
}

/// The set of services this build knows about, as drivers ready for a run.
#[must_use]
pub fn known_services(
    net: &NetClient,
    interrupt: &InterruptToken,
) -> Vec<Arc<dyn ArchiveDriver>> {
    vec![
        Arc::new(ArchiveToday::new(net.clone(), interrupt.clone())),
        Arc::new(InternetArchive::new(net.clone(), interrupt.clone())),
    ]
}

/// Names of all known services, sorted, for `--services` output and
/// destination validation.
#[must_use]
pub fn service_names() -> Vec<&'static str> {
    vec!["archivetoday", "internetarchive"]
}

/// Resolves a service name (case-insensitively) to a fresh driver.
#[must_use]
pub fn service_by_name(
    name: &str,
    net: &NetClient,
    interrupt: &InterruptToken,
) -> Option<Arc<dyn ArchiveDriver>> {
    match name.to_ascii_lowercase().as_str() {
        "archivetoday" => Some(Arc::new(ArchiveToday::new(net.clone(), interrupt.clone()))),
        "internetarchive" => Some(Arc::new(InternetArchive::new(
            net.clone(),
            interrupt.clone(),
        ))),
        _ => None,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_trims_and_replaces_spaces() {
        assert_eq!(uniform("  https://ex.org/a b  "), "https://ex.org/a_b");
        assert_eq!(uniform("https://ex.org/x"), "https://ex.org/x");
    }

    #[test]
    fn test_service_names_sorted_and_known() {
        let names = service_names();
        let mut sorted = names.clone();
        sorted.sort_unstable();
        assert_eq!(names, sorted);

        let net = NetClient::new(InterruptToken::new()).unwrap();
        let token = InterruptToken::new();
        for name in names {
            assert!(service_by_name(name, &net, &token).is_some());
        }
        assert!(service_by_name("wayback", &net, &token).is_none());
    }

    #[test]
    fn test_service_by_name_is_case_insensitive() {
        let net = NetClient::new(InterruptToken::new()).unwrap();
        let token = InterruptToken::new();
        let driver = service_by_name("InternetArchive", &net, &token).unwrap();
        assert_eq!(driver.name(), "internetarchive");
    }
}
