//! Client for one EPrints REST endpoint.
//!
//! [`EPrintsClient`] canonicalises the server URL it is given, fetches the
//! record index, retrieves per-record XML and per-field text, scrapes the
//! front page and the `/view` hierarchy for public URLs, and verifies the
//! `/N` and `/id/eprint/N` page variants with HEAD probes. Record XML and the
//! index are memoised for the lifetime of the client; field lookups consult
//! the cache before touching the network.
//!
//! # Canonicalisation
//!
//! The user may supply a bare host, a site URL, or a full REST URL. The
//! client probes bare hosts with `https://` then `http://`, strips a
//! trailing `/` and a trailing `/eprint`, and appends `/rest` when missing:
//!
//! ```text
//! eprints.example.edu            -> https://eprints.example.edu/rest
//! https://eprints.example.edu/   -> https://eprints.example.edu/rest
//! https://e.example.edu/rest/eprint -> https://e.example.edu/rest
//! ```

pub mod record;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use scraper::{Html, Selector};
use tokio::sync::OnceCell;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::net::{NetClient, NetError, RequestOptions};

pub use record::EPrintRecord;

/// Request timeout ceiling for EPrints API traffic. EPrints servers are
/// often old and slow, so this is longer than the crate default.
const EPRINTS_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for HEAD probes used to verify record page URLs.
const HEAD_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Substrings that disqualify a front-page link from the top-level URL list.
const TOP_LEVEL_SKIP: &[&str] = &["/cgi", "#", "css"];

/// Client for a single EPrints server.
///
/// Cheap to share behind an [`Arc`]; the record cache is safe for concurrent
/// read-through from gather workers.
#[derive(Debug)]
pub struct EPrintsClient {
    net: NetClient,
    api_url: String,
    base_url: String,
    hostname: String,
    user: Option<String>,
    password: Option<String>,
    index: OnceCell<Vec<String>>,
    records: DashMap<String, Option<Arc<EPrintRecord>>>,
}

impl EPrintsClient {
    /// Connects to the server at `given_url`, canonicalising the URL.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::BadUrl`] when the URL cannot be made into a valid
    /// REST endpoint, or [`NetError::Cancelled`] if interrupted while
    /// probing.
    pub async fn connect(
        given_url: &str,
        user: Option<String>,
        password: Option<String>,
        net: NetClient,
    ) -> Result<Self, NetError> {
        let api_url = canonical_endpoint_url(&net, given_url).await?;
        let parsed = Url::parse(&api_url).map_err(|_| NetError::bad_url(given_url))?;
        let base_url = parsed.origin().ascii_serialization();
        let hostname = parsed
            .host_str()
            .ok_or_else(|| NetError::bad_url(given_url))?
            .to_string();
        debug!(%api_url, "created EPrints client");
        Ok(Self {
            net,
            api_url,
            base_url,
            hostname,
            user,
            password,
            index: OnceCell::new(),
            records: DashMap::new(),
        })
    }

    /// The canonical REST API URL for this server.
    #[must_use]
    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// The server's hostname, for display and keyring lookups.
    #[must_use]
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// The public front page URL (scheme + netloc) of this server.
    #[must_use]
    pub fn front_page_url(&self) -> &str {
        &self.base_url
    }

    /// Returns all record identifiers known to the server, numerically
    /// sorted. Cached for the lifetime of the client.
    ///
    /// # Errors
    ///
    /// Propagates network errors; an index body that is not XHTML raises
    /// [`NetError::Internal`].
    #[instrument(level = "debug", skip(self))]
    pub async fn index(&self) -> Result<&[String], NetError> {
        self.index
            .get_or_try_init(|| async {
                let url = format!("{}/eprint", self.api_url);
                let response = self.net.get(&url, &self.api_options()).await?;
                let body = response
                    .text()
                    .await
                    .map_err(|e| NetError::service(&url, e.to_string()))?;
                if !body.starts_with("<?xml") {
                    return Err(NetError::internal(
                        "unexpected index format from EPrints server",
                    ));
                }
                let mut ids: Vec<String> = scrape_attr(&body, "a", "href")
                    .into_iter()
                    .filter_map(|href| {
                        href.ends_with(".xml")
                            .then(|| href.split('.').next().unwrap_or("").to_string())
                    })
                    .filter(|id| !id.is_empty())
                    .collect::<HashSet<_>>()
                    .into_iter()
                    .collect();
                ids.sort_by_key(|id| id.parse::<u64>().unwrap_or(u64::MAX));
                debug!(count = ids.len(), "parsed EPrints index");
                Ok(ids)
            })
            .await
            .map(Vec::as_slice)
    }

    /// Fetches (or returns the cached) record XML for `id`.
    ///
    /// `NoContent` and `AuthenticationFailure` cache a null for the record
    /// and surface the error; later calls return the cached null without
    /// I/O. Other errors propagate without caching.
    #[instrument(level = "debug", skip(self))]
    pub async fn eprint_xml(&self, id: &str) -> Result<Option<Arc<EPrintRecord>>, NetError> {
        if let Some(cached) = self.records.get(id) {
            return Ok(cached.clone());
        }

        let url = format!("{}/eprint/{id}.xml", self.api_url);
        let response = match self.net.get(&url, &self.api_options()).await {
            Ok(response) => response,
            Err(err @ (NetError::NoContent { .. } | NetError::AuthenticationFailure { .. })) => {
                self.records.insert(id.to_string(), None);
                return Err(err);
            }
            Err(err) => return Err(err),
        };
        let body = response
            .text()
            .await
            .map_err(|e| NetError::service(&url, e.to_string()))?;
        let record = Arc::new(
            EPrintRecord::parse(&body).map_err(|e| NetError::internal(e.to_string()))?,
        );
        self.records.insert(id.to_string(), Some(record.clone()));
        Ok(Some(record))
    }

    /// Returns the value of `field` for the record with identifier `id`.
    ///
    /// `eprintid` is answered from the argument without I/O. A cached record
    /// (including a cached null) is consulted before the network. Uncached
    /// lookups hit `GET /eprint/{id}/{field}.txt`; an empty body, missing
    /// content, or an authentication failure all yield `None` (non-fatal).
    #[instrument(level = "debug", skip(self))]
    pub async fn field_value(&self, id: &str, field: &str) -> Result<Option<String>, NetError> {
        if field == "eprintid" {
            return Ok(Some(id.to_string()));
        }
        if let Some(cached) = self.records.get(id) {
            return Ok(cached
                .as_ref()
                .and_then(|record| record.field(field))
                .map(str::to_string));
        }

        let url = format!("{}/eprint/{id}/{field}.txt", self.api_url);
        match self.net.get(&url, &self.api_options()).await {
            Ok(response) => {
                let body = response
                    .text()
                    .await
                    .map_err(|e| NetError::service(&url, e.to_string()))?;
                Ok((!body.is_empty()).then_some(body))
            }
            Err(NetError::NoContent { .. } | NetError::AuthenticationFailure { .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Returns the top-level public URLs found on the server's front page.
    ///
    /// Links are made absolute; only those on this server survive, minus CGI
    /// endpoints, fragments, and stylesheets. A scrape failure yields an
    /// empty list rather than an error.
    #[instrument(level = "debug", skip(self))]
    pub async fn top_level_urls(&self) -> Result<Vec<String>, NetError> {
        let body = match self.fetch_page(&self.base_url).await? {
            Some(body) => body,
            None => return Ok(Vec::new()),
        };
        let urls = scrape_links(&body, "a", &self.base_url)
            .into_iter()
            .filter(|u| {
                u.starts_with(&self.base_url) && !TOP_LEVEL_SKIP.iter().any(|skip| u.contains(skip))
            });
        Ok(dedup_preserving_order(urls))
    }

    /// Returns URLs of pages under `/view`.
    ///
    /// Without a subset, both the `/view` browse pages and their immediate
    /// subpages are returned. With a subset of record identifiers, only
    /// subpage URLs of the form `.../{id}.html` survive, excluding
    /// `/view/year` pages (year pages also end in `N.html`).
    #[instrument(level = "debug", skip(self, subset))]
    pub async fn view_urls(&self, subset: Option<&[String]>) -> Result<Vec<String>, NetError> {
        let view_base = format!("{}/view/", self.base_url);
        let body = match self.fetch_page(&view_base).await? {
            Some(body) => body,
            None => return Ok(Vec::new()),
        };
        let view_pages = dedup_preserving_order(
            scrape_links(&body, "div.ep_view_browse_list li a", &view_base).into_iter(),
        );
        debug!(count = view_pages.len(), "found /view pages");

        let mut subpage_urls: Vec<String> = Vec::new();
        for page in &view_pages {
            self.net.interrupt().raise_if_set()?;
            let Some(body) = self.fetch_page(page).await? else {
                continue;
            };
            subpage_urls.extend(scrape_links(&body, "div.ep_view_menu li a", page));
        }
        let subpage_urls = dedup_preserving_order(subpage_urls.into_iter());
        debug!(count = subpage_urls.len(), "collected /view subpage URLs");

        if let Some(ids) = subset {
            let mut kept = Vec::new();
            for id in ids {
                let suffix = format!("/{id}.html");
                if let Some(found) = subpage_urls
                    .iter()
                    .find(|u| !u.contains("/view/year") && u.ends_with(&suffix))
                {
                    kept.push(found.clone());
                }
            }
            Ok(kept)
        } else {
            Ok(dedup_preserving_order(
                view_pages.into_iter().chain(subpage_urls),
            ))
        }
    }

    /// Returns the `{base}/id/eprint/{id}` page URL for a record.
    ///
    /// With `verify`, the URL is HEAD-probed and `None` is returned when the
    /// page does not answer; this is how deleted or private records are
    /// filtered out.
    pub async fn eprint_id_url(&self, id: &str, verify: bool) -> Result<Option<String>, NetError> {
        let url = format!("{}/id/eprint/{id}", self.base_url);
        self.verified(url, verify).await
    }

    /// Returns the `{base}/{id}` page URL for a record, optionally verified
    /// like [`eprint_id_url`](Self::eprint_id_url).
    pub async fn eprint_page_url(
        &self,
        id: &str,
        verify: bool,
    ) -> Result<Option<String>, NetError> {
        let url = format!("{}/{id}", self.base_url);
        self.verified(url, verify).await
    }

    async fn verified(&self, url: String, verify: bool) -> Result<Option<String>, NetError> {
        if !verify {
            return Ok(Some(url));
        }
        let opts = RequestOptions::new().timeout(HEAD_PROBE_TIMEOUT);
        match self.net.head(&url, &opts).await {
            Ok(_) => Ok(Some(url)),
            Err(NetError::Cancelled) => Err(NetError::Cancelled),
            Err(err) => {
                debug!(%url, error = %err, "record page did not verify");
                Ok(None)
            }
        }
    }

    /// Fetches a public page, returning `None` (not an error) when the page
    /// cannot be retrieved. Cancellation still propagates.
    async fn fetch_page(&self, url: &str) -> Result<Option<String>, NetError> {
        let opts = RequestOptions::new().timeout(EPRINTS_TIMEOUT);
        match self.net.get(url, &opts).await {
            Ok(response) => Ok(response.text().await.ok()),
            Err(NetError::Cancelled) => Err(NetError::Cancelled),
            Err(err) => {
                debug!(%url, error = %err, "page fetch failed");
                Ok(None)
            }
        }
    }

    fn api_options(&self) -> RequestOptions {
        let mut opts = RequestOptions::new().timeout(EPRINTS_TIMEOUT);
        if let Some(user) = &self.user {
            opts = opts.basic_auth(user.clone(), self.password.clone());
        }
        opts
    }
}

/// Canonicalises a user-supplied EPrints URL into the REST endpoint form.
async fn canonical_endpoint_url(net: &NetClient, given: &str) -> Result<String, NetError> {
    let mut url = given.trim().trim_end_matches('/').to_string();
    if url.is_empty() {
        return Err(NetError::bad_url(given));
    }

    if !url.contains("://") {
        url = probe_scheme(net, &url)
            .await?
            .ok_or_else(|| NetError::bad_url(given))?;
    }

    if let Some(stripped) = url.strip_suffix("/eprint") {
        url = stripped.to_string();
    }
    if !url.ends_with("/rest") {
        url.push_str("/rest");
    }

    let parsed = Url::parse(&url).map_err(|_| NetError::bad_url(given))?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return Err(NetError::bad_url(given));
    }
    Ok(url)
}

/// Probes a bare host with `https://` then `http://`, returning the first
/// candidate whose server answers at the HTTP level.
async fn probe_scheme(net: &NetClient, bare: &str) -> Result<Option<String>, NetError> {
    for prefix in ["https://", "http://"] {
        let candidate = format!("{prefix}{bare}");
        match net.head(&candidate, &RequestOptions::default()).await {
            Ok(_) => return Ok(Some(candidate)),
            Err(NetError::Cancelled) => return Err(NetError::Cancelled),
            // An HTTP-level error still means something answered there.
            Err(
                NetError::NoContent { .. }
                | NetError::AuthenticationFailure { .. }
                | NetError::ServiceFailure { .. }
                | NetError::RateLimitExceeded { .. }
                | NetError::Internal { .. },
            ) => return Ok(Some(candidate)),
            Err(err) => {
                warn!(%candidate, error = %err, "scheme probe failed");
            }
        }
    }
    Ok(None)
}

/// Extracts an attribute from every element matching `selector`, in document
/// order.
fn scrape_attr(html: &str, selector: &str, attr: &str) -> Vec<String> {
    let Ok(selector) = Selector::parse(selector) else {
        return Vec::new();
    };
    let document = Html::parse_document(html);
    document
        .select(&selector)
        .filter_map(|element| element.value().attr(attr))
        .map(str::to_string)
        .collect()
}

/// Extracts `href` values matching `selector` and makes them absolute
/// against `base`. Unresolvable links are dropped.
fn scrape_links(html: &str, selector: &str, base: &str) -> Vec<String> {
    let Ok(base) = Url::parse(base) else {
        return Vec::new();
    };
    scrape_attr(html, selector, "href")
        .into_iter()
        .filter_map(|href| base.join(&href).ok())
        .map(String::from)
        .collect()
}

/// First-occurrence de-duplication preserving input order.
fn dedup_preserving_order(urls: impl Iterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    urls.filter(|u| seen.insert(u.clone())).collect()
}
