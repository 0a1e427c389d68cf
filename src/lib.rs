//! eprints2archives Core Library
//!
//! This library sends the public-facing URLs of an EPrints repository to
//! web archiving services, so snapshots of the repository's pages survive
//! outside the origin server.
//!
//! # Architecture
//!
//! - [`net`] - HTTP façade with retry, rate-limit handling, and a typed
//!   error taxonomy
//! - [`interrupt`] - process-wide cancellation latch
//! - [`eprints`] - client for one EPrints REST endpoint
//! - [`services`] - archive drivers (Internet Archive, Archive.today) and
//!   the TimeMap parser
//! - [`pipeline`] - preflight, URL discovery and assembly, parallel fan-out
//! - [`report`] - append-only per-URL outcome log
//! - [`progress`] - progress events consumed by the binary's display layer

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod dates;
pub mod eprints;
pub mod interrupt;
pub mod net;
pub mod pipeline;
pub mod progress;
pub mod report;
pub mod services;

mod user_agent;

// Re-export commonly used types
pub use eprints::{EPrintRecord, EPrintsClient};
pub use interrupt::InterruptToken;
pub use net::{NetClient, NetError, RequestOptions};
pub use pipeline::{
    CredentialOutcome, CredentialSource, ExitStatus, Pipeline, PipelineError, RunConfig,
    StaticCredentials, StatusFilter, default_threads,
};
pub use progress::{ProgressSink, SilentProgress};
pub use report::Reporter;
pub use services::{
    ArchiveDriver, ArchiveToday, InternetArchive, SaveOutcome, ServiceStatus, TimeMap,
};
