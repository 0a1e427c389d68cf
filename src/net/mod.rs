//! Thin HTTP façade used by every other component.
//!
//! [`NetClient`] wraps a shared [`reqwest::Client`] and layers on the
//! behavior the rest of the crate relies on:
//!
//! - per-request timeouts (default 20 s) separate from the retry budget
//! - retry of transient transport failures: up to [`MAX_CONSECUTIVE_FAILS`]
//!   tight attempts with a short pause, then up to [`MAX_RETRIES`] coarser
//!   rounds with quadratic back-off
//! - cooperative handling of HTTP 429, sleeping progressively longer up to
//!   [`MAX_RECURSIVE_CALLS`] occurrences
//! - classification of HTTP statuses into the [`NetError`] taxonomy
//! - a connectivity precheck ([`network_available`])
//!
//! Every pause is a cooperative [`InterruptToken::wait`], so a user
//! interrupt aborts in-flight retries at the next attempt boundary.

pub mod error;

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method, Response};
use tokio::net::TcpStream;
use tracing::{debug, instrument, warn};

use crate::interrupt::InterruptToken;
use crate::user_agent;

pub use error::NetError;

/// Default per-request timeout (connect + read).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

/// Consecutive transport failures tolerated before entering coarse back-off.
const MAX_CONSECUTIVE_FAILS: u32 = 3;

/// Coarse back-off rounds after the consecutive-failure budget is exhausted.
const MAX_RETRIES: u32 = 5;

/// Occurrences of HTTP 429 tolerated before surfacing `RateLimitExceeded`.
const MAX_RECURSIVE_CALLS: u32 = 10;

/// Pause between tight retry attempts.
const INTER_ATTEMPT_PAUSE: Duration = Duration::from_millis(500);

/// Address probed by [`network_available`].
const CONNECTIVITY_PROBE: (&str, u16) = ("8.8.8.8", 53);

/// Timeout for the connectivity probe.
const CONNECTIVITY_TIMEOUT: Duration = Duration::from_secs(5);

/// Options for a single [`NetClient::request`] call.
#[derive(Debug, Clone)]
pub struct RequestOptions {
    /// Per-request timeout. Defaults to [`DEFAULT_TIMEOUT`].
    pub timeout: Duration,
    /// When true (the default), HTTP 429 responses cause a cooperative
    /// pause-and-retry; when false, `RateLimitExceeded` surfaces immediately.
    pub handle_rate_limit: bool,
    /// When true, 404/410 are returned as normal responses instead of being
    /// classified as `NoContent`.
    pub polling: bool,
    /// Extra request headers.
    pub headers: Vec<(String, String)>,
    /// Form-encoded body as ordered key/value pairs. Order is preserved on
    /// the wire (some services reject reordered bodies).
    pub form: Option<Vec<(String, String)>>,
    /// HTTP basic authentication. The password may be absent.
    pub basic_auth: Option<(String, Option<String>)>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            handle_rate_limit: true,
            polling: false,
            headers: Vec::new(),
            form: None,
            basic_auth: None,
        }
    }
}

impl RequestOptions {
    /// Creates options with all defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the per-request timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Enables or disables cooperative 429 handling.
    #[must_use]
    pub fn handle_rate_limit(mut self, handle: bool) -> Self {
        self.handle_rate_limit = handle;
        self
    }

    /// Enables polling mode (404/410 returned as normal responses).
    #[must_use]
    pub fn polling(mut self, polling: bool) -> Self {
        self.polling = polling;
        self
    }

    /// Adds a request header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Sets an ordered form-encoded body.
    #[must_use]
    pub fn form(mut self, pairs: Vec<(String, String)>) -> Self {
        self.form = Some(pairs);
        self
    }

    /// Sets HTTP basic authentication.
    #[must_use]
    pub fn basic_auth(mut self, user: impl Into<String>, password: Option<String>) -> Self {
        self.basic_auth = Some((user.into(), password));
        self
    }
}

/// HTTP client façade shared across components.
///
/// Cloning is cheap; clones share the underlying connection pool and cookie
/// store as well as the interrupt token.
#[derive(Debug, Clone)]
pub struct NetClient {
    client: Client,
    interrupt: InterruptToken,
}

impl NetClient {
    /// Builds a client with the crate's default networking policy.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::Internal`] if the underlying client cannot be
    /// constructed.
    pub fn new(interrupt: InterruptToken) -> Result<Self, NetError> {
        let client = Client::builder()
            .user_agent(user_agent::default_user_agent())
            .cookie_store(true)
            .gzip(true)
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| NetError::internal(format!("HTTP client construction failed: {e}")))?;
        Ok(Self { client, interrupt })
    }

    /// Returns the interrupt token observed by this client.
    #[must_use]
    pub fn interrupt(&self) -> &InterruptToken {
        &self.interrupt
    }

    /// Convenience wrapper for `GET`.
    pub async fn get(&self, url: &str, opts: &RequestOptions) -> Result<Response, NetError> {
        self.request(Method::GET, url, opts).await
    }

    /// Convenience wrapper for `HEAD`.
    pub async fn head(&self, url: &str, opts: &RequestOptions) -> Result<Response, NetError> {
        self.request(Method::HEAD, url, opts).await
    }

    /// Convenience wrapper for `POST`.
    pub async fn post(&self, url: &str, opts: &RequestOptions) -> Result<Response, NetError> {
        self.request(Method::POST, url, opts).await
    }

    /// Performs an HTTP request with retry, rate-limit handling, and status
    /// classification.
    ///
    /// Redirects (301/302) are followed transparently. The returned response
    /// always has a non-error status with respect to the taxonomy; callers
    /// read the body and headers from it directly.
    ///
    /// # Errors
    ///
    /// Returns a [`NetError`] classified per the taxonomy in
    /// [`error`](self::error).
    #[instrument(level = "debug", skip(self, opts))]
    pub async fn request(
        &self,
        method: Method,
        url: &str,
        opts: &RequestOptions,
    ) -> Result<Response, NetError> {
        if url::Url::parse(url).is_err() {
            return Err(NetError::bad_url(url));
        }

        let mut rate_hits: u32 = 0;
        loop {
            self.interrupt.raise_if_set()?;
            let response = self.timed_request(&method, url, opts).await?;
            let code = response.status().as_u16();
            debug!(code, %url, "got http status");

            if code == 429 {
                if opts.handle_rate_limit && rate_hits < MAX_RECURSIVE_CALLS {
                    let pause = rate_limit_pause(rate_hits);
                    warn!(%url, pause_secs = pause.as_secs(), "rate limit hit, pausing");
                    self.interrupt.wait(pause).await?;
                    rate_hits += 1;
                    continue;
                }
                return Err(NetError::rate_limited(url));
            }

            return match classify_status(url, code, opts.polling) {
                Some(err) => Err(err),
                None => Ok(response),
            };
        }
    }

    /// Performs the transport-level request with the two-level retry budget.
    ///
    /// Transient transport failures are retried up to
    /// [`MAX_CONSECUTIVE_FAILS`] times with a short pause; when that budget
    /// is exhausted, the failure counter resets and up to [`MAX_RETRIES`]
    /// coarser rounds follow, sleeping `10·k²` seconds before round `k`. The
    /// first observed error is the one surfaced: during an outage the later
    /// ones degrade into "cannot reconnect" noise.
    async fn timed_request(
        &self,
        method: &Method,
        url: &str,
        opts: &RequestOptions,
    ) -> Result<Response, NetError> {
        let mut failures: u32 = 0;
        let mut retries: u32 = 0;
        let mut first_error: Option<reqwest::Error> = None;

        loop {
            self.interrupt.raise_if_set()?;
            match self.send_once(method, url, opts).await {
                Ok(response) => return Ok(response),
                Err(err) => {
                    if err.is_connect() {
                        // The connection layer already exhausted its own
                        // attempts; retrying a refused connection only delays
                        // the inevitable.
                        return Err(classify_transport_error(url, &err).await);
                    }
                    failures += 1;
                    debug!(%url, failures, error = %err, "transport failure");
                    let first = first_error.get_or_insert(err);
                    if failures < MAX_CONSECUTIVE_FAILS {
                        self.interrupt.wait(INTER_ATTEMPT_PAUSE).await?;
                    } else if retries < MAX_RETRIES {
                        retries += 1;
                        failures = 0;
                        let pause = outer_backoff(retries);
                        warn!(%url, round = retries, pause_secs = pause.as_secs(),
                            "consecutive transport failures, backing off");
                        self.interrupt.wait(pause).await?;
                    } else {
                        return Err(classify_transport_error(url, first).await);
                    }
                }
            }
        }
    }

    /// One attempt, no retries.
    async fn send_once(
        &self,
        method: &Method,
        url: &str,
        opts: &RequestOptions,
    ) -> Result<Response, reqwest::Error> {
        let mut request = self
            .client
            .request(method.clone(), url)
            .timeout(opts.timeout)
            .headers(header_map(&opts.headers));
        if let Some((user, password)) = &opts.basic_auth {
            request = request.basic_auth(user, password.as_ref());
        }
        if let Some(form) = &opts.form {
            request = request.form(form);
        }
        request.send().await
    }
}

/// Returns whether a network connection appears to be available, by
/// attempting a plain TCP connection to a public DNS server.
pub async fn network_available() -> bool {
    matches!(
        tokio::time::timeout(CONNECTIVITY_TIMEOUT, TcpStream::connect(CONNECTIVITY_PROBE)).await,
        Ok(Ok(_))
    )
}

/// Pause before the k-th retry of a 429 response (0-indexed occurrence):
/// 5 s, 10 s, 15 s, ...
fn rate_limit_pause(occurrence: u32) -> Duration {
    Duration::from_secs(5 * u64::from(occurrence + 1))
}

/// Pause before coarse retry round `k` (1-indexed): 10 s, 40 s, 90 s, ...
fn outer_backoff(round: u32) -> Duration {
    Duration::from_secs(10 * u64::from(round) * u64::from(round))
}

/// Maps an HTTP status to the error taxonomy. `None` means the response is
/// acceptable and should be handed to the caller.
#[allow(clippy::match_same_arms)]
fn classify_status(url: &str, code: u16, polling: bool) -> Option<NetError> {
    match code {
        400 => Some(NetError::service_status(url, code, "server rejected the request")),
        401 | 402 | 403 | 407 | 451 | 511 => Some(NetError::auth(url)),
        404 | 410 if !polling => Some(NetError::no_content(url)),
        404 | 410 => None,
        405 | 406 | 409 | 411 | 412 | 414 | 417 | 428 | 431 | 505 | 510 => Some(
            NetError::internal(format!("server returned code {code} for {url}")),
        ),
        415 | 416 => Some(NetError::service_status(url, code, "server rejected the request")),
        429 => Some(NetError::rate_limited(url)),
        503 => Some(NetError::service_status(url, code, "service unavailable")),
        504 => Some(NetError::service_status(url, code, "server timeout")),
        500 | 501 | 502 | 506 | 507 | 508 => {
            Some(NetError::service_status(url, code, "server error"))
        }
        code if (200..400).contains(&code) => None,
        _ => Some(NetError::network(url, format!("unable to resolve (code {code})"))),
    }
}

/// Classifies a transport-level error once the retry budgets are exhausted.
///
/// A timeout with the network up is the server's fault (`ServiceFailure`);
/// with the network down it is a `NetworkFailure`.
async fn classify_transport_error(url: &str, error: &reqwest::Error) -> NetError {
    if error.is_timeout() {
        if network_available().await {
            NetError::service(url, "timed out reading data from server")
        } else {
            NetError::network(url, "timed out reading data over network")
        }
    } else if error.is_connect() {
        if network_available().await {
            NetError::network(url, "unable to resolve host")
        } else {
            NetError::network(url, "lost network connection with server")
        }
    } else {
        NetError::network(url, error.to_string())
    }
}

fn header_map(headers: &[(String, String)]) -> HeaderMap {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            map.insert(name, value);
        } else {
            warn!(header = %name, "skipping invalid request header");
        }
    }
    map
}
