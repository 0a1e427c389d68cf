//! The archival fan-out pipeline.
//!
//! [`Pipeline::run`] performs, in strict order: preflight validation, index
//! fetch, record filtering, URL assembly and de-duplication, and the
//! parallel dispatch of every URL to every selected archiving service. It
//! owns the worker pools and observes the [`InterruptToken`] at every loop
//! boundary, so a user interrupt stops the run at the next URL or record.
//!
//! # Phases
//!
//! 1. **Preflight** — network precheck, option validation, destination
//!    resolution, credential acquisition, report-file check.
//! 2. **Identifier set** — the server index intersected with `--id-list`.
//! 3. **URL assembly** — site URLs from the front page and `/view`, per-
//!    record `official_url` values, and verified `/N` + `/id/eprint/N`
//!    pairs; validated and de-duplicated preserving first occurrence.
//! 4. **Fan-out** — one worker per destination service, each walking the
//!    URL list in order.
//! 5. **Shutdown** — final report line, or `Interrupted` on cancellation.

pub mod error;
pub mod id_list;

use std::collections::HashSet;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::dates;
use crate::eprints::{EPrintRecord, EPrintsClient};
use crate::interrupt::InterruptToken;
use crate::net::{self, NetClient, NetError};
use crate::progress::ProgressSink;
use crate::report::Reporter;
use crate::services::{self, ArchiveDriver, ServiceStatus};

pub use error::{ExitStatus, PipelineError};

/// When the item count is at or below `threads * PARALLEL_THRESHOLD`, the
/// gather phase stays sequential; spawning workers costs more than it saves
/// for small batches of slow EPrints RPCs.
const PARALLEL_THRESHOLD: usize = 2;

/// Default worker-pool size: half the cores, at least one.
#[must_use]
pub fn default_threads() -> usize {
    (num_cpus::get() / 2).max(1)
}

/// Everything a run needs to know, resolved from the CLI.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// The EPrints server URL (bare host, site URL, or full REST URL).
    pub api_url: Option<String>,
    /// Destination services: `all` or a comma-separated list of names.
    pub dest: String,
    /// Skip the existence check and submit every URL.
    pub force: bool,
    /// Restriction to specific records; see [`id_list`].
    pub id_list: Option<String>,
    /// Only records modified at or after this (human-friendly) date.
    pub lastmod: Option<String>,
    /// Status filter: `any`, or a comma list optionally negated with `^`.
    pub status: Option<String>,
    /// Worker-pool size for gathering and fan-out.
    pub threads: usize,
    /// Optional report file path.
    pub report_file: Option<PathBuf>,
    /// Fail fast on missing records and per-record errors.
    pub error_out: bool,
    /// Pause between submissions to the same service.
    pub delay: Duration,
    /// Probe general connectivity before starting. Disable for servers on
    /// isolated networks that cannot reach the public probe address.
    pub network_precheck: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            api_url: None,
            dest: "all".to_string(),
            force: false,
            id_list: None,
            lastmod: None,
            status: None,
            threads: default_threads(),
            report_file: None,
            error_out: false,
            delay: Duration::ZERO,
            network_precheck: true,
        }
    }
}

/// Result of asking the credential collaborator for a server's login.
#[derive(Debug, Clone, Default)]
pub struct CredentialOutcome {
    /// The user name; empty string is a legal value, `None` means none.
    pub user: Option<String>,
    /// The password; empty string is a legal value, `None` means none.
    pub password: Option<String>,
    /// The user declined to provide credentials at all.
    pub cancelled: bool,
}

/// Supplier of EPrints server credentials (keychain, prompt, flags).
///
/// The pipeline calls this exactly once per run, during preflight.
pub trait CredentialSource: Send + Sync {
    /// Returns credentials for the server at `host`.
    fn credentials(&self, host: &str) -> CredentialOutcome;
}

/// A [`CredentialSource`] with fixed values, for `--user`/`--password` and
/// for servers that need no login.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials {
    /// Fixed user name, if any.
    pub user: Option<String>,
    /// Fixed password, if any.
    pub password: Option<String>,
}

impl CredentialSource for StaticCredentials {
    fn credentials(&self, _host: &str) -> CredentialOutcome {
        CredentialOutcome {
            user: self.user.clone(),
            password: self.password.clone(),
            cancelled: false,
        }
    }
}

/// Parsed `--status` filter.
///
/// A leading `^` on the first element negates the whole set. Comparisons are
/// case-insensitive. Records with no status are always accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusFilter {
    negated: bool,
    statuses: Vec<String>,
}

impl StatusFilter {
    /// Parses a `--status` value. The literal `any` means "no filter".
    ///
    /// # Errors
    ///
    /// Returns a message for an empty or unusable specification.
    pub fn parse(spec: &str) -> Result<Option<Self>, String> {
        let spec = spec.trim();
        if spec.eq_ignore_ascii_case("any") {
            return Ok(None);
        }
        let mut negated = false;
        let mut statuses = Vec::new();
        for (index, element) in spec.split(',').enumerate() {
            let mut element = element.trim();
            if index == 0 {
                if let Some(stripped) = element.strip_prefix('^') {
                    negated = true;
                    element = stripped.trim();
                }
            }
            if !element.is_empty() {
                statuses.push(element.to_ascii_lowercase());
            }
        }
        if statuses.is_empty() {
            return Err(format!("unusable status filter: \"{spec}\""));
        }
        Ok(Some(Self { negated, statuses }))
    }

    /// Whether a record with this status passes the filter.
    #[must_use]
    pub fn accepts(&self, status: &str) -> bool {
        let listed = self.statuses.iter().any(|s| s.eq_ignore_ascii_case(status));
        if self.negated { !listed } else { listed }
    }
}

/// What happened to one URL at one service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeKind {
    /// A new snapshot was requested.
    Added,
    /// The service already held mementos for the URL.
    Skipped,
    /// The driver exhausted its retries.
    Failed,
}

impl OutcomeKind {
    fn as_str(self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
        }
    }
}

/// The fan-out engine. Owns all component instances for one run.
pub struct Pipeline {
    config: RunConfig,
    interrupt: InterruptToken,
    credentials: Box<dyn CredentialSource>,
    progress: Arc<dyn ProgressSink>,
    drivers_override: Option<Vec<Arc<dyn ArchiveDriver>>>,
}

/// Values resolved by preflight and consumed by the main work.
struct Prepared {
    net: NetClient,
    drivers: Vec<Arc<dyn ArchiveDriver>>,
    lastmod: Option<DateTime<Utc>>,
    status_filter: Option<StatusFilter>,
    user: Option<String>,
    password: Option<String>,
    wanted_list: Vec<String>,
}

impl Pipeline {
    /// Creates a pipeline over the standard service registry.
    #[must_use]
    pub fn new(
        config: RunConfig,
        credentials: Box<dyn CredentialSource>,
        progress: Arc<dyn ProgressSink>,
        interrupt: InterruptToken,
    ) -> Self {
        Self {
            config,
            interrupt,
            credentials,
            progress,
            drivers_override: None,
        }
    }

    /// Replaces the service registry with a custom driver set. `--dest` is
    /// resolved against these drivers' names.
    #[must_use]
    pub fn with_drivers(mut self, drivers: Vec<Arc<dyn ArchiveDriver>>) -> Self {
        self.drivers_override = Some(drivers);
        self
    }

    /// Runs the pipeline to completion (or interruption).
    ///
    /// # Errors
    ///
    /// Returns a [`PipelineError`] whose [`exit_status`](PipelineError::exit_status)
    /// gives the process exit code.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<(), PipelineError> {
        let prepared = self.preflight().await?;
        let reporter = Arc::new(Reporter::new(self.config.report_file.clone()));
        reporter
            .verify_writable()
            .map_err(|e| PipelineError::File(e.to_string()))?;

        match self.archive(prepared, &reporter).await {
            Ok(()) => Ok(()),
            Err(err) => {
                if err.exit_status() == ExitStatus::Interrupted {
                    reporter.record("Interrupted");
                }
                Err(err)
            }
        }
    }

    /// Validates option values and resolves collaborators before any real
    /// work starts.
    async fn preflight(&self) -> Result<Prepared, PipelineError> {
        if self.config.network_precheck && !net::network_available().await {
            return Err(PipelineError::NoNetwork);
        }

        let api_url = self
            .config
            .api_url
            .as_deref()
            .ok_or_else(|| PipelineError::BadArg("an EPrints API URL is required".to_string()))?;

        let lastmod = self
            .config
            .lastmod
            .as_deref()
            .map(dates::parse_lastmod)
            .transpose()
            .map_err(|e| PipelineError::BadArg(e.to_string()))?;
        if let Some(parsed) = &lastmod {
            debug!(lastmod = %parsed, "parsed lastmod filter");
        }

        let status_filter = match self.config.status.as_deref() {
            Some(spec) => StatusFilter::parse(spec).map_err(PipelineError::BadArg)?,
            None => None,
        };

        let net = NetClient::new(self.interrupt.clone())?;
        let drivers = self.resolve_destinations(&net)?;

        let host = host_of(api_url);
        let creds = self.credentials.credentials(&host);
        if creds.cancelled {
            return Err(PipelineError::Cancelled);
        }
        if let Some(user) = &creds.user {
            self.progress
                .info(&format!("Using login credentials for user \"{user}\" on {host}."));
        } else {
            self.progress
                .info(&format!("Will not use a login or password for {host}."));
        }

        let wanted_list = match self.config.id_list.as_deref() {
            Some(spec) => {
                id_list::parse_id_list(spec).map_err(|e| PipelineError::BadArg(e.to_string()))?
            }
            None => Vec::new(),
        };

        Ok(Prepared {
            net,
            drivers,
            lastmod,
            status_filter,
            user: creds.user,
            password: creds.password,
            wanted_list,
        })
    }

    /// Resolves `--dest` against the available drivers.
    fn resolve_destinations(
        &self,
        net: &NetClient,
    ) -> Result<Vec<Arc<dyn ArchiveDriver>>, PipelineError> {
        let available = match &self.drivers_override {
            Some(drivers) => drivers.clone(),
            None => services::known_services(net, &self.interrupt),
        };
        let dest = self.config.dest.trim();
        if dest.eq_ignore_ascii_case("all") || dest.is_empty() {
            return Ok(available);
        }
        let mut selected = Vec::new();
        for name in dest.split(',') {
            let name = name.trim();
            let driver = available
                .iter()
                .find(|d| d.name().eq_ignore_ascii_case(name))
                .ok_or_else(|| {
                    PipelineError::BadArg(format!("unknown destination service \"{name}\""))
                })?;
            selected.push(Arc::clone(driver));
        }
        Ok(selected)
    }

    /// The core work: index, filter, assemble, fan out.
    async fn archive(&self, prepared: Prepared, reporter: &Arc<Reporter>) -> Result<(), PipelineError> {
        reporter
            .start()
            .map_err(|e| PipelineError::File(e.to_string()))?;

        let api_url = self.config.api_url.as_deref().unwrap_or_default();
        let client = Arc::new(
            EPrintsClient::connect(
                api_url,
                prepared.user.clone(),
                prepared.password.clone(),
                prepared.net.clone(),
            )
            .await?,
        );
        let host = client.hostname().to_string();

        self.progress
            .info(&format!("Getting full EPrints index from {host} ..."));
        let available = client.index().await?;
        if available.is_empty() {
            return Err(PipelineError::Failed(format!(
                "received an empty record index from {host}"
            )));
        }
        reporter.record(&format!(
            "EPrints server at {} has {} records.",
            client.api_url(),
            available.len()
        ));

        let wanted = self.wanted_records(available, &prepared, reporter)?;

        let urls = self
            .assemble_urls(&client, &prepared, &wanted, reporter)
            .await?;
        debug!(count = urls.len(), "assembled URL list");

        self.interrupt.raise_if_set()?;
        self.send(Arc::new(urls), prepared.drivers, Arc::clone(reporter))
            .await?;
        self.progress.info("Done.");
        Ok(())
    }

    /// Intersects the user's id list (if any) with the server index.
    fn wanted_records(
        &self,
        available: &[String],
        prepared: &Prepared,
        reporter: &Reporter,
    ) -> Result<Vec<String>, PipelineError> {
        if prepared.wanted_list.is_empty() {
            return Ok(available.to_vec());
        }

        let available_set: HashSet<&str> = available.iter().map(String::as_str).collect();
        let mut missing: Vec<String> = prepared
            .wanted_list
            .iter()
            .filter(|id| !available_set.contains(id.as_str()))
            .cloned()
            .collect();
        sort_numeric(&mut missing);

        if !missing.is_empty() {
            if self.config.error_out {
                return Err(PipelineError::Failed(format!(
                    "{} of the requested records do not exist on the server: {}",
                    missing.len(),
                    missing.join(", ")
                )));
            }
            let message = format!(
                "Of the records requested, the following don't exist and will be skipped: {}.",
                missing.join(", ")
            );
            self.progress.warning(&message);
            reporter.record(&message);
        }

        let mut wanted: Vec<String> = prepared
            .wanted_list
            .iter()
            .filter(|id| available_set.contains(id.as_str()))
            .cloned()
            .collect();
        sort_numeric(&mut wanted);
        wanted.dedup();
        reporter.record(&format!(
            "A total of {} records from {} will be used.",
            wanted.len(),
            host_of(self.config.api_url.as_deref().unwrap_or_default())
        ));
        Ok(wanted)
    }

    /// Builds the complete, validated, de-duplicated URL list.
    async fn assemble_urls(
        &self,
        client: &Arc<EPrintsClient>,
        prepared: &Prepared,
        wanted: &[String],
        reporter: &Reporter,
    ) -> Result<Vec<String>, PipelineError> {
        // General site URLs come first. When the user restricted the run to
        // specific records, only the matching /view pages qualify.
        self.progress.info("Looking through /view pages for URLs ...");
        let mut candidates: Vec<String> = if prepared.wanted_list.is_empty() {
            let mut general = client.top_level_urls().await?;
            general.extend(client.view_urls(None).await?);
            general
        } else {
            client.view_urls(Some(wanted)).await?
        };

        // Per-record URLs. Without filters, one <official_url> field lookup
        // per record is cheaper than fetching record XML; with filters the
        // XML is needed anyway, so fetch it once and read fields locally.
        let pair_ids: Vec<String>;
        if prepared.lastmod.is_none() && prepared.status_filter.is_none() {
            let fetch = {
                let client = Arc::clone(client);
                move |id: String| {
                    let client = Arc::clone(&client);
                    async move { client.field_value(&id, "official_url").await }
                }
            };
            candidates.extend(
                self.gather(wanted.to_vec(), fetch, "Gathering <official_url> values")
                    .await?,
            );
            pair_ids = wanted.to_vec();
        } else {
            let fetch = {
                let client = Arc::clone(client);
                move |id: String| {
                    let client = Arc::clone(&client);
                    async move { client.eprint_xml(&id).await }
                }
            };
            let records = self
                .gather(wanted.to_vec(), fetch, "Gathering record materials")
                .await?;

            let fetched = records.len();
            let kept = filter_records(records, prepared.lastmod.as_ref(), prepared.status_filter.as_ref());
            let skipped = fetched.saturating_sub(kept.len());
            if skipped > 0 {
                let message = format!("Skipping {skipped} records due to filtering.");
                self.progress.info(&message);
                reporter.record(&message);
            }
            if kept.is_empty() {
                self.progress
                    .warning("Filtering left 0 records; nothing left to do.");
                return Ok(Vec::new());
            }
            candidates.extend(
                kept.iter()
                    .filter_map(|r| r.field("official_url"))
                    .map(str::to_string),
            );
            pair_ids = kept.iter().filter_map(|r| r.id()).map(str::to_string).collect();
        }

        // Verified record page URL pairs: /id/eprint/N and /N.
        let fetch = {
            let client = Arc::clone(client);
            move |id: String| {
                let client = Arc::clone(&client);
                async move {
                    let mut pair = Vec::new();
                    if let Some(url) = client.eprint_id_url(&id, true).await? {
                        pair.push(url);
                    }
                    if let Some(url) = client.eprint_page_url(&id, true).await? {
                        pair.push(url);
                    }
                    Ok(Some(pair))
                }
            }
        };
        let pairs = self
            .gather(pair_ids, fetch, "Checking variant record URLs")
            .await?;
        candidates.extend(pairs.into_iter().flatten());

        // Validate, then de-duplicate preserving first occurrence.
        let mut seen = HashSet::new();
        let mut urls = Vec::new();
        for candidate in candidates {
            if !is_valid_url(&candidate) {
                reporter.record(&format!("Ignoring invalid URL: {candidate}"));
                continue;
            }
            if seen.insert(candidate.clone()) {
                urls.push(candidate);
            }
        }
        Ok(urls)
    }

    /// Applies `fetch` to every item, sequentially for small batches and
    /// over contiguous slices on the worker pool otherwise. Results are
    /// concatenated in slice order; `None` results are dropped (or fatal
    /// under `--error-out`).
    async fn gather<T, F, Fut>(
        &self,
        items: Vec<String>,
        fetch: F,
        description: &str,
    ) -> Result<Vec<T>, PipelineError>
    where
        T: Send + 'static,
        F: Fn(String) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<T>, NetError>> + Send + 'static,
    {
        let context = GatherContext {
            interrupt: self.interrupt.clone(),
            progress: Arc::clone(&self.progress),
            error_out: self.config.error_out,
        };
        self.progress.gather_started(description, items.len());

        let threads = self.config.threads.max(1);
        let result = if threads == 1 || items.len() <= threads * PARALLEL_THRESHOLD {
            run_slice(context, items, fetch).await
        } else {
            let worker_count = items.len().min(threads);
            debug!(workers = worker_count, "gathering in parallel");
            let handles: Vec<_> = chunk(items, worker_count)
                .into_iter()
                .map(|slice| tokio::spawn(run_slice(context.clone(), slice, fetch.clone())))
                .collect();
            let mut collected = Vec::new();
            let mut first_error = None;
            for handle in join_all(handles).await {
                match handle {
                    Ok(Ok(values)) => collected.extend(values),
                    Ok(Err(err)) if first_error.is_none() => first_error = Some(err),
                    Ok(Err(_)) => {}
                    Err(join_error) => {
                        return Err(PipelineError::Failed(format!(
                            "gather worker panicked: {join_error}"
                        )));
                    }
                }
            }
            match first_error {
                Some(err) => Err(err),
                None => Ok(collected),
            }
        };
        self.progress.gather_finished();
        result
    }

    /// Fans the URL list out to every destination, one worker per service,
    /// bounded by the configured thread count.
    async fn send(
        &self,
        urls: Arc<Vec<String>>,
        drivers: Vec<Arc<dyn ArchiveDriver>>,
        reporter: Arc<Reporter>,
    ) -> Result<(), PipelineError> {
        let num_urls = urls.len();
        let num_dest = drivers.len();
        self.progress.info(&format!(
            "We have a total of {num_urls} URLs to send to {num_dest} archive(s)."
        ));
        if self.config.force {
            self.progress
                .info("Force option given; adding URLs even if archives have copies.");
        }
        reporter.record(&format!("Sending {num_urls} URLs to {num_dest} services."));

        let semaphore = Arc::new(Semaphore::new(self.config.threads.max(1)));
        let handles: Vec<_> = drivers
            .into_iter()
            .map(|driver| {
                tokio::spawn(send_worker(SendContext {
                    driver,
                    urls: Arc::clone(&urls),
                    interrupt: self.interrupt.clone(),
                    progress: Arc::clone(&self.progress),
                    reporter: Arc::clone(&reporter),
                    force: self.config.force,
                    delay: self.config.delay,
                    semaphore: Arc::clone(&semaphore),
                }))
            })
            .collect();

        let mut first_error = None;
        for handle in join_all(handles).await {
            match handle {
                Ok(Ok(())) => {}
                Ok(Err(err)) if first_error.is_none() => first_error = Some(err),
                Ok(Err(_)) => {}
                Err(join_error) => {
                    return Err(PipelineError::Failed(format!(
                        "send worker panicked: {join_error}"
                    )));
                }
            }
        }
        if self.interrupt.is_set() {
            return Err(PipelineError::Cancelled);
        }
        if let Some(err) = first_error {
            return Err(err);
        }
        reporter.record(&format!("Finished sending {num_urls} URLs."));
        Ok(())
    }
}

/// Shared state for one gather worker.
#[derive(Clone)]
struct GatherContext {
    interrupt: InterruptToken,
    progress: Arc<dyn ProgressSink>,
    error_out: bool,
}

/// Runs `fetch` over one contiguous slice of items.
///
/// Record-scope failures (`NoContent`, authentication, service errors)
/// degrade to warnings unless `error_out` is set; everything else
/// propagates.
async fn run_slice<T, F, Fut>(
    context: GatherContext,
    items: Vec<String>,
    fetch: F,
) -> Result<Vec<T>, PipelineError>
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Option<T>, NetError>> + Send,
{
    let mut results = Vec::new();
    for item in items {
        context.interrupt.raise_if_set()?;
        match fetch(item.clone()).await {
            Ok(Some(value)) => results.push(value),
            Ok(None) => {
                if context.error_out {
                    return Err(PipelineError::Failed(format!(
                        "received no data for record {item}"
                    )));
                }
            }
            Err(err) if is_record_scope_failure(&err) => {
                let message = record_failure_message(&err, &item);
                if context.error_out {
                    return Err(PipelineError::Failed(message));
                }
                warn!(record = %item, error = %err, "skipping record");
                context.progress.warning(&message);
            }
            Err(err) => return Err(err.into()),
        }
        context.progress.gather_tick();
    }
    Ok(results)
}

/// Shared state for one fan-out worker.
struct SendContext {
    driver: Arc<dyn ArchiveDriver>,
    urls: Arc<Vec<String>>,
    interrupt: InterruptToken,
    progress: Arc<dyn ProgressSink>,
    reporter: Arc<Reporter>,
    force: bool,
    delay: Duration,
    semaphore: Arc<Semaphore>,
}

/// Sends every URL to one service, in list order.
///
/// A URL whose driver exhausts its retries is reported as failed and the
/// worker moves on; only cancellation stops the loop.
async fn send_worker(context: SendContext) -> Result<(), PipelineError> {
    let _permit = context
        .semaphore
        .acquire_owned()
        .await
        .map_err(|_| PipelineError::Failed("worker pool closed unexpectedly".to_string()))?;

    let name = context.driver.name();
    let label = context.driver.label();
    context
        .progress
        .service_started(name, context.driver.color(), context.urls.len());
    context.progress.service_status(name, ServiceStatus::Running);

    let notify = {
        let progress = Arc::clone(&context.progress);
        move |status: ServiceStatus| progress.service_status(name, status)
    };

    let mut added: u64 = 0;
    let mut skipped: u64 = 0;
    for url in context.urls.iter() {
        context.interrupt.raise_if_set()?;
        debug!(%url, service = name, "next URL");
        let kind = match context.driver.save(url, &notify, context.force).await {
            Ok(outcome) => {
                if outcome.added {
                    added += 1;
                    OutcomeKind::Added
                } else {
                    skipped += 1;
                    OutcomeKind::Skipped
                }
            }
            Err(NetError::Cancelled) => return Err(PipelineError::Cancelled),
            Err(err) => {
                warn!(%url, service = name, error = %err, "giving up on URL");
                context
                    .progress
                    .warning(&format!("Unable to send {url} to {label}: {err}"));
                OutcomeKind::Failed
            }
        };
        context
            .reporter
            .record(&format!("{url} ➜ {label}: {}", kind.as_str()));
        context.progress.service_progress(name, added, skipped);
        if !context.delay.is_zero() {
            context.interrupt.wait(context.delay).await?;
        }
    }
    context.progress.service_finished(name);
    info!(service = name, added, skipped, "service worker finished");
    Ok(())
}

/// Drops records older than the cutoff or with an unacceptable status.
/// Records lacking the relevant field are kept.
fn filter_records(
    records: Vec<Arc<EPrintRecord>>,
    lastmod: Option<&DateTime<Utc>>,
    status_filter: Option<&StatusFilter>,
) -> Vec<Arc<EPrintRecord>> {
    records
        .into_iter()
        .filter(|record| {
            if let (Some(cutoff), Some(modtime)) = (
                lastmod,
                record.field("lastmod").and_then(dates::parse_record_datetime),
            ) && modtime < *cutoff
            {
                debug!(id = record.id().unwrap_or("?"), "dropped by lastmod filter");
                return false;
            }
            if let (Some(filter), Some(status)) = (status_filter, record.field("eprint_status"))
                && !filter.accepts(status)
            {
                debug!(id = record.id().unwrap_or("?"), status, "dropped by status filter");
                return false;
            }
            true
        })
        .collect()
}

/// Failures that skip one record rather than ending the run.
fn is_record_scope_failure(err: &NetError) -> bool {
    matches!(
        err,
        NetError::NoContent { .. }
            | NetError::AuthenticationFailure { .. }
            | NetError::ServiceFailure { .. }
    )
}

fn record_failure_message(err: &NetError, item: &str) -> String {
    match err {
        NetError::NoContent { .. } => format!("Server has no content for {item}"),
        NetError::AuthenticationFailure { .. } => {
            format!("Authentication failure trying to get data for {item}")
        }
        _ => format!("{err} trying to get data for {item}"),
    }
}

/// RFC 3986 absolute http(s) URL check used at assembly time.
fn is_valid_url(candidate: &str) -> bool {
    match Url::parse(candidate) {
        Ok(url) => matches!(url.scheme(), "http" | "https") && url.host_str().is_some(),
        Err(_) => false,
    }
}

/// The hostname of a possibly scheme-less URL, for messages and keyring
/// lookups.
fn host_of(url: &str) -> String {
    let candidate = if url.contains("://") {
        url.to_string()
    } else {
        format!("https://{url}")
    };
    Url::parse(&candidate)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| url.to_string())
}

/// Sorts identifier strings by numeric value.
fn sort_numeric(ids: &mut [String]) {
    ids.sort_by_key(|id| id.parse::<u64>().unwrap_or(u64::MAX));
}

/// Partitions `items` into `n` contiguous slices of near-equal size.
fn chunk(items: Vec<String>, n: usize) -> Vec<Vec<String>> {
    let len = items.len();
    let base = len / n;
    let remainder = len % n;
    let mut iterator = items.into_iter();
    (0..n)
        .map(|i| {
            let size = if i < remainder { base + 1 } else { base };
            iterator.by_ref().take(size).collect()
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    // ==================== Status Filter Tests ====================

    #[test]
    fn test_status_filter_any_is_no_filter() {
        assert!(StatusFilter::parse("any").unwrap().is_none());
        assert!(StatusFilter::parse(" ANY ").unwrap().is_none());
    }

    #[test]
    fn test_status_filter_positive() {
        let filter = StatusFilter::parse("archive,buffer").unwrap().unwrap();
        assert!(filter.accepts("archive"));
        assert!(filter.accepts("Archive"));
        assert!(filter.accepts("buffer"));
        assert!(!filter.accepts("inbox"));
    }

    #[test]
    fn test_status_filter_negated() {
        let filter = StatusFilter::parse("^inbox,buffer,deletion").unwrap().unwrap();
        assert!(!filter.accepts("inbox"));
        assert!(!filter.accepts("buffer"));
        assert!(!filter.accepts("deletion"));
        assert!(filter.accepts("archive"));
    }

    #[test]
    fn test_status_filter_empty_is_error() {
        assert!(StatusFilter::parse("").is_err());
        assert!(StatusFilter::parse("^").is_err());
        assert!(StatusFilter::parse(",,").is_err());
    }

    // ==================== URL Validation Tests ====================

    #[test]
    fn test_is_valid_url() {
        assert!(is_valid_url("https://ex.org/paper.pdf"));
        assert!(is_valid_url("http://ex.org/"));
        assert!(!is_valid_url("not a url"));
        assert!(!is_valid_url("ftp://ex.org/file"));
        assert!(!is_valid_url("/relative/path"));
        assert!(!is_valid_url(""));
    }

    #[test]
    fn test_host_of() {
        assert_eq!(host_of("https://srv.test/rest"), "srv.test");
        assert_eq!(host_of("srv.test/rest"), "srv.test");
        assert_eq!(host_of("srv.test"), "srv.test");
    }

    // ==================== Helper Tests ====================

    #[test]
    fn test_sort_numeric_not_lexicographic() {
        let mut ids = vec!["10".to_string(), "9".to_string(), "101".to_string()];
        sort_numeric(&mut ids);
        assert_eq!(ids, vec!["9", "10", "101"]);
    }

    #[test]
    fn test_chunk_contiguous_and_balanced() {
        let items: Vec<String> = (1..=7).map(|n| n.to_string()).collect();
        let chunks = chunk(items, 3);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0], vec!["1", "2", "3"]);
        assert_eq!(chunks[1], vec!["4", "5"]);
        assert_eq!(chunks[2], vec!["6", "7"]);
    }

    #[test]
    fn test_chunk_more_workers_than_items() {
        let items: Vec<String> = vec!["1".to_string(), "2".to_string()];
        let chunks = chunk(items, 2);
        assert_eq!(chunks, vec![vec!["1".to_string()], vec!["2".to_string()]]);
    }

    #[test]
    fn test_default_threads_at_least_one() {
        assert!(default_threads() >= 1);
    }

    // ==================== Record Filtering Tests ====================

    fn record(id: &str, lastmod: Option<&str>, status: Option<&str>) -> Arc<EPrintRecord> {
        let lastmod = lastmod.map_or(String::new(), |v| format!("<lastmod>{v}</lastmod>"));
        let status =
            status.map_or(String::new(), |v| format!("<eprint_status>{v}</eprint_status>"));
        let xml = format!(
            "<eprint xmlns=\"http://eprints.org/ep2/data/2.0\">\
             <eprintid>{id}</eprintid>{lastmod}{status}</eprint>"
        );
        Arc::new(EPrintRecord::parse(&xml).unwrap())
    }

    #[test]
    fn test_filter_records_by_lastmod() {
        let cutoff = dates::parse_lastmod("2020-06-01").unwrap();
        let records = vec![
            record("1", Some("2020-07-01 00:00:00"), None),
            record("2", Some("2020-05-01 00:00:00"), None),
            record("3", None, None),
        ];
        let kept = filter_records(records, Some(&cutoff), None);
        let ids: Vec<_> = kept.iter().filter_map(|r| r.id()).collect();
        assert_eq!(ids, vec!["1", "3"]);
    }

    #[test]
    fn test_filter_records_by_status_negation() {
        let filter = StatusFilter::parse("^inbox").unwrap().unwrap();
        let records = vec![
            record("1", None, Some("archive")),
            record("2", None, Some("inbox")),
            record("3", None, None),
        ];
        let kept = filter_records(records, None, Some(&filter));
        let ids: Vec<_> = kept.iter().filter_map(|r| r.id()).collect();
        assert_eq!(ids, vec!["1", "3"]);
    }

    #[test]
    fn test_record_scope_failures() {
        assert!(is_record_scope_failure(&NetError::no_content("u")));
        assert!(is_record_scope_failure(&NetError::auth("u")));
        assert!(is_record_scope_failure(&NetError::service("u", "oops")));
        assert!(!is_record_scope_failure(&NetError::Cancelled));
        assert!(!is_record_scope_failure(&NetError::internal("x")));
        assert!(!is_record_scope_failure(&NetError::rate_limited("u")));
    }
}
