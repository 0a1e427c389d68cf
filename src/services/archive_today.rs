//! Archive.today driver with host failover.
//!
//! Archive.today answers under a rotating set of domain names; some stop
//! responding and others start, with no way to know in advance which one
//! works. On first use the driver walks the candidate hosts in order and
//! adopts the first that serves its front page, extracting the `submitid`
//! hidden-input value that submissions must echo back. The adopted host and
//! submit-id are driver state for the rest of the run.
//!
//! The service signals rate limiting with HTTP 503 (it does not use 429),
//! and rejects form bodies whose fields are not ordered `submitid` first,
//! `url` second.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::interrupt::InterruptToken;
use crate::net::{NetClient, NetError, RequestOptions};
use crate::user_agent;

use super::timemap::TimeMap;
use super::{ArchiveDriver, MAX_RETRIES, RETRY_SLEEP_SECS, SaveOutcome, ServiceStatus, StatusSink, uniform};

/// Candidate origins, tried in order during host discovery.
const DEFAULT_HOSTS: &[&str] = &[
    "https://archive.li",
    "https://archive.vn",
    "https://archive.fo",
    "https://archive.md",
    "https://archive.ph",
    "https://archive.today",
    "https://archive.is",
];

/// Pause after a rate-limit signal before retrying. Archive.today blocks
/// aggressively, so this is much longer than the Internet Archive's pause.
const RATE_LIMIT_SLEEP: Duration = Duration::from_secs(300);

/// Driver for <https://archive.today> and its sibling domains.
#[derive(Debug)]
pub struct ArchiveToday {
    net: NetClient,
    interrupt: InterruptToken,
    hosts: Vec<String>,
    state: Mutex<HostState>,
}

/// Runtime host-selection state. Written during discovery, read-only after.
#[derive(Debug, Default)]
struct HostState {
    origin: Option<String>,
    submit_id: Option<String>,
    unavailable: bool,
}

impl ArchiveToday {
    /// Creates a driver against the public Archive.today domains.
    #[must_use]
    pub fn new(net: NetClient, interrupt: InterruptToken) -> Self {
        Self::with_hosts(
            net,
            interrupt,
            DEFAULT_HOSTS.iter().map(ToString::to_string).collect(),
        )
    }

    /// Creates a driver with a custom list of candidate origins.
    #[must_use]
    pub fn with_hosts(net: NetClient, interrupt: InterruptToken, hosts: Vec<String>) -> Self {
        Self {
            net,
            interrupt,
            hosts,
            state: Mutex::new(HostState::default()),
        }
    }

    /// Returns the adopted `(origin, submit_id)`, running host discovery on
    /// first use.
    ///
    /// When every host rate-limits, a 503-flavored error is returned so the
    /// caller pauses and tries again later; when every host fails outright,
    /// the driver marks itself unavailable for the rest of the run.
    async fn ensure_host(&self) -> Result<(String, String), NetError> {
        let mut state = self.state.lock().await;
        if let (Some(origin), Some(sid)) = (&state.origin, &state.submit_id) {
            return Ok((origin.clone(), sid.clone()));
        }

        let mut saw_rate_limit = false;
        for origin in &self.hosts {
            self.interrupt.raise_if_set()?;
            let front_page = format!("{origin}/");
            match self.net.get(&front_page, &self.browser_options()).await {
                Ok(response) => {
                    let body = response
                        .text()
                        .await
                        .map_err(|e| NetError::service(&front_page, e.to_string()))?;
                    let sid = extract_submit_id(&body)?;
                    debug!(%origin, "adopted Archive.today host");
                    state.origin = Some(origin.clone());
                    state.submit_id = Some(sid.clone());
                    return Ok((origin.clone(), sid));
                }
                Err(NetError::Cancelled) => return Err(NetError::Cancelled),
                Err(err) if err.status() == Some(503) => {
                    debug!(%origin, "host rate-limited during discovery");
                    saw_rate_limit = true;
                }
                Err(err) => {
                    warn!(%origin, error = %err, "host did not answer");
                }
            }
        }

        if saw_rate_limit {
            // Leave the state untouched so later calls run discovery again.
            Err(NetError::service_status(
                self.hosts.first().map_or("archive.today", String::as_str),
                503,
                "every Archive.today host is rate limiting",
            ))
        } else {
            state.unavailable = true;
            Err(NetError::service(
                "archive.today",
                "no Archive.today host answered",
            ))
        }
    }

    /// Fetches the TimeMap for `url` from the adopted host.
    async fn saved_copies(&self, origin: &str, url: &str) -> Result<TimeMap, NetError> {
        let action_url = format!("{origin}/timemap/{url}");
        match self.net.get(&action_url, &self.browser_options()).await {
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

    /// Submits `url` through the adopted host's form endpoint.
    async fn submit(&self, origin: &str, submit_id: &str, url: &str) -> Result<(), NetError> {
        let action_url = format!("{origin}/submit/");
        let host = Url::parse(origin)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_default();
        // Field order matters to the server: submitid first, then url.
        let opts = self
            .browser_options()
            .header("host", host)
            .form(vec![
                ("submitid".to_string(), submit_id.to_string()),
                ("url".to_string(), url.to_string()),
            ]);
        let response = self.net.post(&action_url, &opts).await?;

        // The saved memento arrives as a Refresh header, a Location header,
        // or a redirect that the client has already followed.
        if let Some(refresh) = response.headers().get("refresh") {
            let text = refresh.to_str().unwrap_or_default();
            let Some((_, saved)) = text.split_once(";url=") else {
                return Err(NetError::internal(
                    "unexpected Refresh header format from Archive.today",
                ));
            };
            debug!(saved, "Archive.today accepted submission");
            return Ok(());
        }
        if response.headers().get(reqwest::header::LOCATION).is_some() {
            return Ok(());
        }
        if response.url().as_str() != action_url {
            debug!(saved = %response.url(), "Archive.today redirected to memento");
            return Ok(());
        }
        Err(NetError::internal(
            "Archive.today returned unexpected response",
        ))
    }

    /// One existence-check-plus-submit pass, no retries.
    async fn try_save(&self, url: &str, force: bool) -> Result<SaveOutcome, NetError> {
        let (origin, submit_id) = self.ensure_host().await?;
        if !force {
            let existing = self.saved_copies(&origin, url).await?;
            if !existing.is_empty() {
                let count = existing.mementos().len() as i64;
                debug!(%url, count, "mementos already exist, skipping");
                return Ok(SaveOutcome {
                    added: false,
                    existing: count,
                });
            }
        }
        self.submit(&origin, &submit_id, url).await?;
        Ok(SaveOutcome {
            added: true,
            existing: if force { -1 } else { 0 },
        })
    }

    fn browser_options(&self) -> RequestOptions {
        RequestOptions::new().header("user-agent", user_agent::browser_user_agent())
    }
}

#[async_trait]
impl ArchiveDriver for ArchiveToday {
    fn name(&self) -> &'static str {
        "archivetoday"
    }

    fn label(&self) -> &'static str {
        "Archive.today"
    }

    fn color(&self) -> &'static str {
        "yellow"
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
            if self.state.lock().await.unavailable {
                notify(ServiceStatus::Unavailable);
                return Ok(SaveOutcome {
                    added: false,
                    existing: -1,
                });
            }
            match self.try_save(&url, force).await {
                Ok(outcome) => return Ok(outcome),
                Err(NetError::Cancelled) => return Err(NetError::Cancelled),
                Err(err) => {
                    // Host discovery may have just concluded that no host
                    // answers at all; that is a terminal state, not a retry.
                    if self.state.lock().await.unavailable {
                        notify(ServiceStatus::Unavailable);
                        return Ok(SaveOutcome {
                            added: false,
                            existing: -1,
                        });
                    }
                    if is_rate_limit(&err) {
                        warn!(%url, "Archive.today rate limit, pausing");
                        notify(ServiceStatus::PausedRateLimit);
                        self.interrupt.wait(RATE_LIMIT_SLEEP).await?;
                        notify(ServiceStatus::Running);
                    } else if err.is_retryable() {
                        failures += 1;
                        if failures >= MAX_RETRIES {
                            return Err(err);
                        }
                        let pause_secs =
                            RETRY_SLEEP_SECS * u64::from(failures) * u64::from(failures);
                        warn!(%url, failures, pause_secs, error = %err, "save failed, backing off");
                        notify(ServiceStatus::PausedError);
                        self.interrupt.wait(Duration::from_secs(pause_secs)).await?;
                        notify(ServiceStatus::Running);
                    } else {
                        return Err(err);
                    }
                }
            }
        }
    }
}

/// Archive.today signals rate limiting with 503 rather than 429.
fn is_rate_limit(err: &NetError) -> bool {
    matches!(err, NetError::RateLimitExceeded { .. }) || err.status() == Some(503)
}

/// Extracts the `submitid` hidden-input value from the front-page HTML.
fn extract_submit_id(html: &str) -> Result<String, NetError> {
    html.split_once("name=\"submitid")
        .and_then(|(_, rest)| rest.split_once("value=\""))
        .and_then(|(_, rest)| rest.split_once('"'))
        .map(|(sid, _)| sid.to_string())
        .ok_or_else(|| NetError::internal("unable to parse Archive.today front page"))
}
