//! Pipeline error type and exit-code mapping.

use thiserror::Error;

use crate::interrupt::Cancelled;
use crate::net::NetError;

/// Process exit statuses, matching the documented CLI contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// Everything worked.
    Success,
    /// No network connection was available.
    NoNetwork,
    /// A command-line argument was unusable.
    BadArg,
    /// A file (typically the report file) could not be used.
    FileError,
    /// The user interrupted the run.
    Interrupted,
    /// Any other failure.
    Exception,
}

impl ExitStatus {
    /// The numeric process exit code.
    #[must_use]
    pub fn code(self) -> i32 {
        match self {
            Self::Success => 0,
            Self::NoNetwork => 1,
            Self::BadArg => 2,
            Self::FileError => 3,
            Self::Interrupted => 4,
            Self::Exception => 5,
        }
    }
}

/// Errors surfaced by [`Pipeline::run`](super::Pipeline::run).
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The connectivity precheck failed.
    #[error("no network connection")]
    NoNetwork,

    /// Preflight validation rejected an option value.
    #[error("{0}")]
    BadArg(String),

    /// The report file could not be written.
    #[error("file error: {0}")]
    File(String),

    /// The run was interrupted by the user.
    #[error("operation interrupted by user")]
    Cancelled,

    /// The run failed partway for a reason other than the above.
    #[error("{0}")]
    Failed(String),

    /// A network operation failed beyond recovery.
    #[error(transparent)]
    Net(#[from] NetError),
}

impl PipelineError {
    /// Maps this error onto the process exit contract.
    #[must_use]
    pub fn exit_status(&self) -> ExitStatus {
        match self {
            Self::NoNetwork => ExitStatus::NoNetwork,
            Self::BadArg(_) | Self::Net(NetError::BadUrl { .. }) => ExitStatus::BadArg,
            Self::File(_) => ExitStatus::FileError,
            Self::Cancelled | Self::Net(NetError::Cancelled) => ExitStatus::Interrupted,
            Self::Failed(_) | Self::Net(_) => ExitStatus::Exception,
        }
    }
}

impl From<Cancelled> for PipelineError {
    fn from(_: Cancelled) -> Self {
        Self::Cancelled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_values() {
        assert_eq!(ExitStatus::Success.code(), 0);
        assert_eq!(ExitStatus::NoNetwork.code(), 1);
        assert_eq!(ExitStatus::BadArg.code(), 2);
        assert_eq!(ExitStatus::FileError.code(), 3);
        assert_eq!(ExitStatus::Interrupted.code(), 4);
        assert_eq!(ExitStatus::Exception.code(), 5);
    }

    #[test]
    fn test_error_mapping() {
        assert_eq!(PipelineError::NoNetwork.exit_status(), ExitStatus::NoNetwork);
        assert_eq!(
            PipelineError::BadArg("bad".into()).exit_status(),
            ExitStatus::BadArg
        );
        assert_eq!(
            PipelineError::Net(NetError::bad_url("x")).exit_status(),
            ExitStatus::BadArg
        );
        assert_eq!(
            PipelineError::File("denied".into()).exit_status(),
            ExitStatus::FileError
        );
        assert_eq!(PipelineError::Cancelled.exit_status(), ExitStatus::Interrupted);
        assert_eq!(
            PipelineError::Net(NetError::Cancelled).exit_status(),
            ExitStatus::Interrupted
        );
        assert_eq!(
            PipelineError::Net(NetError::internal("boom")).exit_status(),
            ExitStatus::Exception
        );
        assert_eq!(
            PipelineError::Failed("boom".into()).exit_status(),
            ExitStatus::Exception
        );
    }
}
