//! Internet Archive ("Wayback Machine") driver.
//!
//! Existence checks go through the public TimeMap endpoint; submissions go
//! through the Save Page Now form endpoint. The Internet Archive signals
//! rate limiting with HTTP 429, which this driver handles itself (the
//! NetClient's own 429 handling is disabled) so it can report pause states
//! to the progress display.

use async_trait::async_trait;
use tracing::{debug, instrument, warn};

use crate::interrupt::InterruptToken;
use crate::net::{NetClient, NetError, RequestOptions};

use super::timemap::TimeMap;
use super::{ArchiveDriver, MAX_RETRIES, RETRY_SLEEP_SECS, SaveOutcome, ServiceStatus, StatusSink, uniform};

/// Public origin of the Internet Archive web endpoints.
const DEFAULT_BASE_URL: &str = "https://web.archive.org";

/// Pause after a 429 before retrying.
const RATE_LIMIT_SLEEP: std::time::Duration = std::time::Duration::from_secs(10);

/// Driver for <https://web.archive.org>.
#[derive(Debug)]
pub struct InternetArchive {
    net: NetClient,
    interrupt: InterruptToken,
    base_url: String,
}

impl InternetArchive {
    /// Creates a driver against the public Internet Archive endpoints.
    #[must_use]
    pub fn new(net: NetClient, interrupt: InterruptToken) -> Self {
        Self::with_base_url(net, interrupt, DEFAULT_BASE_URL)
    }

    /// Creates a driver against a custom origin (e.g. a local mirror or a
    /// mock service).
    #[must_use]
    pub fn with_base_url(
        net: NetClient,
        interrupt: InterruptToken,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            net,
            interrupt,
            base_url: base_url.into(),
        }
    }

    /// Fetches the TimeMap for `url`. A missing TimeMap is an empty one.
    async fn saved_copies(&self, url: &str) -> Result<TimeMap, NetError> {
        let action_url = format!("{}/web/timemap/link/{url}", self.base_url);
        let opts = RequestOptions::new().handle_rate_limit(false);
        match self.net.get(&action_url, &opts).await {
            Ok(response) => {
                let body = response
                    .text()
                    .await
                    .map_err(|e| NetError::service(&action_url, e.to_string()))?;
                TimeMap::parse(&body, true).map_err(|e| NetError::internal(e.to_string()))
            }
            Err(NetError::NoContent { .. }) => Ok(TimeMap::default()),
            Err(err) => Err(err),
        }
    }

    /// Submits `url` to Save Page Now.
    async fn submit(&self, url: &str) -> Result<(), NetError> {
        let action_url = format!("{}/save/{url}", self.base_url);
        let opts = RequestOptions::new().handle_rate_limit(false).form(vec![
            ("url".to_string(), url.to_string()),
            ("capture_all".to_string(), "on".to_string()),
        ]);
        self.net.post(&action_url, &opts).await?;
        debug!(%url, "save request accepted");
        Ok(())
    }

    /// One existence-check-plus-submit pass, no retries.
    async fn try_save(&self, url: &str, force: bool) -> Result<SaveOutcome, NetError> {
        if !force {
            let existing = self.saved_copies(url).await?;
            if !existing.is_empty() {
                let count = existing.mementos().len() as i64;
                debug!(%url, count, "mementos already exist, skipping");
                return Ok(SaveOutcome {
                    added: false,
                    existing: count,
                });
            }
        }
        self.submit(url).await?;
        Ok(SaveOutcome {
            added: true,
            existing: if force { -1 } else { 0 },
        })
    }
}

#[async_trait]
impl ArchiveDriver for InternetArchive {
    fn name(&self) -> &'static str {
        "internetarchive"
    }

    fn label(&self) -> &'static str {
        "Internet Archive"
    }

    fn color(&self) -> &'static str {
        "white"
    }

    #[instrument(level = "debug", skip(self, notify))]
    async fn save(
        &self,
        url: &str,
        notify: &StatusSink,
        force: bool,
    ) -> Result<SaveOutcome, NetError> {
        let url = uniform(url);
        let mut failures: u32 = 0;
        loop {
            self.interrupt.raise_if_set()?;
            match self.try_save(&url, force).await {
                Ok(outcome) => return Ok(outcome),
                Err(NetError::RateLimitExceeded { .. }) => {
                    // Rate-limit pauses are on top of the error budget.
                    warn!(%url, "Internet Archive rate limit, pausing");
                    notify(ServiceStatus::PausedRateLimit);
                    self.interrupt.wait(RATE_LIMIT_SLEEP).await?;
                    notify(ServiceStatus::Running);
                }
                Err(err) if err.is_retryable() => {
                    failures += 1;
                    if failures >= MAX_RETRIES {
                        return Err(err);
                    }
                    // The first failure retries immediately; later ones pause
                    // quadratically longer.
                    let pause_secs =
                        RETRY_SLEEP_SECS * u64::from(failures - 1) * u64::from(failures - 1);
                    if pause_secs > 0 {
                        warn!(%url, failures, pause_secs, error = %err, "save failed, backing off");
                        notify(ServiceStatus::PausedError);
                        self.interrupt
                            .wait(std::time::Duration::from_secs(pause_secs))
                            .await?;
                        notify(ServiceStatus::Running);
                    }
                }
                Err(err) => return Err(err),
            }
        }
    }
}
