//! Shared User-Agent strings for outbound HTTP traffic.
//!
//! Single source for the UA format so EPrints and archive traffic stay
//! consistent and easy to update (good citizenship; RFC 9308).

/// Project URL for User-Agent identification.
const PROJECT_UA_URL: &str = "https://github.com/fierce/eprints2archives";

/// Default User-Agent identifying the tool.
#[must_use]
pub(crate) fn default_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("eprints2archives/{version} (web-archiving-tool; +{PROJECT_UA_URL})")
}

/// Browser-style User-Agent for services that refuse tool traffic.
///
/// Archive.today rejects submissions from non-browser agents, so its driver
/// sends this instead of the default.
#[must_use]
pub(crate) fn browser_user_agent() -> &'static str {
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_5) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/83.0.4103.116 Safari/537.36"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ua_contains_version_and_url() {
        let ua = default_user_agent();
        assert!(ua.starts_with("eprints2archives/"));
        assert!(ua.contains(env!("CARGO_PKG_VERSION")));
        assert!(ua.contains(PROJECT_UA_URL));
    }

    #[test]
    fn test_browser_ua_looks_like_a_browser() {
        assert!(browser_user_agent().starts_with("Mozilla/5.0"));
    }
}
