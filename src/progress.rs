//! Progress notifications consumed from the boundary.
//!
//! The core never touches the terminal directly. It emits structured
//! progress events through a [`ProgressSink`], and the binary decides how to
//! render them (indicatif bars, plain lines, or nothing at all).

use crate::services::ServiceStatus;

/// Receiver for progress events from the pipeline and the drivers.
///
/// Implementations must be non-blocking: drivers call
/// [`service_status`](Self::service_status) from inside their retry loops.
/// All methods default to no-ops so sinks only implement what they render.
pub trait ProgressSink: Send + Sync {
    /// An informational message for the user.
    fn info(&self, _message: &str) {}

    /// A warning for the user (a skipped record, a failed URL).
    fn warning(&self, _message: &str) {}

    /// A gather phase (index fetch, record fetch, URL verification) began.
    fn gather_started(&self, _description: &str, _total: usize) {}

    /// One item of the current gather phase completed.
    fn gather_tick(&self) {}

    /// The current gather phase finished.
    fn gather_finished(&self) {}

    /// A fan-out worker for `service` started over `total` URLs.
    fn service_started(&self, _service: &'static str, _color: &'static str, _total: usize) {}

    /// A driver transitioned between running/paused/unavailable states.
    fn service_status(&self, _service: &'static str, _status: ServiceStatus) {}

    /// Counter update after a URL was processed by `service`.
    fn service_progress(&self, _service: &'static str, _added: u64, _skipped: u64) {}

    /// The fan-out worker for `service` finished its URL list.
    fn service_finished(&self, _service: &'static str) {}
}

/// A sink that renders nothing. Used under `--quiet` and in tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentProgress;

impl ProgressSink for SilentProgress {}
