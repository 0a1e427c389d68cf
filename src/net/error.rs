//! Error taxonomy for network operations.
//!
//! Every HTTP interaction in the crate funnels through [`NetError`], so the
//! EPrints client, the archive drivers, and the pipeline can pattern-match on
//! the kind of failure instead of inspecting status codes or message strings.

use thiserror::Error;

use crate::interrupt::Cancelled;

/// Errors produced by [`NetClient`](super::NetClient) and everything above it.
#[derive(Debug, Error)]
pub enum NetError {
    /// TCP/DNS-level failure, connection reset, or timeout while the network
    /// itself appears to be down.
    #[error("network failure: {reason} for {url}")]
    NetworkFailure {
        /// The URL that was being contacted.
        url: String,
        /// Short description of the transport problem.
        reason: String,
    },

    /// The remote service misbehaved: 5xx, 415/416, a malformed response, or
    /// a timeout while the network is up.
    #[error("service failure: {reason} for {url}")]
    ServiceFailure {
        /// The URL that was being contacted.
        url: String,
        /// The HTTP status, when the failure came from a status code.
        status: Option<u16>,
        /// Short description of the problem.
        reason: String,
    },

    /// The service signalled "too many requests" and the retry budget for
    /// cooperative pausing was exhausted (or pausing was disabled).
    #[error("rate limit exceeded for {url}")]
    RateLimitExceeded {
        /// The URL that was being contacted.
        url: String,
    },

    /// 404/410 outside polling mode. Non-fatal at record scope; callers
    /// treat it as "absent".
    #[error("no content found for {url}")]
    NoContent {
        /// The URL that had no content.
        url: String,
    },

    /// 401, 402, 403, 407, 451, or 511.
    #[error("access is forbidden for {url}")]
    AuthenticationFailure {
        /// The URL that refused access.
        url: String,
    },

    /// The URL is not a valid absolute http/https URL.
    #[error("invalid URL: {url}")]
    BadUrl {
        /// The offending URL string.
        url: String,
    },

    /// A response had an unexpected shape (unparseable page, impossible
    /// status code, malformed submit reply).
    #[error("internal error: {reason}")]
    Internal {
        /// What was unexpected.
        reason: String,
    },

    /// The interrupt token was set while waiting or between attempts.
    #[error("operation interrupted by user")]
    Cancelled,
}

impl NetError {
    /// Creates a network failure with context.
    pub fn network(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::NetworkFailure {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Creates a service failure without a status code.
    pub fn service(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ServiceFailure {
            url: url.into(),
            status: None,
            reason: reason.into(),
        }
    }

    /// Creates a service failure carrying the HTTP status that caused it.
    pub fn service_status(url: impl Into<String>, status: u16, reason: impl Into<String>) -> Self {
        Self::ServiceFailure {
            url: url.into(),
            status: Some(status),
            reason: reason.into(),
        }
    }

    /// Creates a rate-limit error.
    pub fn rate_limited(url: impl Into<String>) -> Self {
        Self::RateLimitExceeded { url: url.into() }
    }

    /// Creates a no-content error.
    pub fn no_content(url: impl Into<String>) -> Self {
        Self::NoContent { url: url.into() }
    }

    /// Creates an authentication failure.
    pub fn auth(url: impl Into<String>) -> Self {
        Self::AuthenticationFailure { url: url.into() }
    }

    /// Creates a bad-URL error.
    pub fn bad_url(url: impl Into<String>) -> Self {
        Self::BadUrl { url: url.into() }
    }

    /// Creates an internal error.
    pub fn internal(reason: impl Into<String>) -> Self {
        Self::Internal {
            reason: reason.into(),
        }
    }

    /// Returns the HTTP status code attached to this error, if any.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::ServiceFailure { status, .. } => *status,
            _ => None,
        }
    }

    /// Returns whether a driver's error policy should retry after this error.
    ///
    /// Rate limits are excluded: they have their own cooperative pause
    /// handling, distinct from error back-off.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NetworkFailure { .. } | Self::ServiceFailure { .. }
        )
    }
}

impl From<Cancelled> for NetError {
    fn from(_: Cancelled) -> Self {
        Self::Cancelled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_accessor_only_on_service_failures() {
        let err = NetError::service_status("https://x.test/", 503, "unavailable");
        assert_eq!(err.status(), Some(503));
        assert_eq!(NetError::no_content("https://x.test/").status(), None);
        assert_eq!(NetError::rate_limited("https://x.test/").status(), None);
    }

    #[test]
    fn test_retryable_kinds() {
        assert!(NetError::network("u", "reset").is_retryable());
        assert!(NetError::service("u", "oops").is_retryable());
        assert!(!NetError::rate_limited("u").is_retryable());
        assert!(!NetError::no_content("u").is_retryable());
        assert!(!NetError::auth("u").is_retryable());
        assert!(!NetError::bad_url("u").is_retryable());
        assert!(!NetError::internal("weird").is_retryable());
        assert!(!NetError::Cancelled.is_retryable());
    }

    #[test]
    fn test_cancelled_conversion() {
        let err: NetError = Cancelled.into();
        assert!(matches!(err, NetError::Cancelled));
    }

    #[test]
    fn test_display_includes_url() {
        let err = NetError::no_content("https://srv.test/eprint/9.xml");
        assert!(err.to_string().contains("https://srv.test/eprint/9.xml"));
    }
}
