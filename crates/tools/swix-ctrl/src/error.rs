//! Error kinds of Swix Ctrl.

use std::any::Any;

use reportify::{Printable, Report, ReportBuilder, Whatever};
use thiserror::Error;

/// Kind of failure, used for handling.
///
/// Freeform details for the operator are attached to the [`Report`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SwixError {
    /// Boot metadata is missing or corrupt.
    #[error("boot environment is missing or corrupt")]
    Environment,
    /// The operation is not allowed in the current state.
    #[error("operation rejected by policy")]
    PolicyViolation,
    /// A delegated command failed.
    #[error("external tool failed")]
    ExternalTool { status: Option<i32> },
    /// A bounded wait ran out of attempts.
    #[error("timeout exceeded")]
    Timeout,
    /// An input does not satisfy the preconditions of the operation.
    #[error("precondition failed")]
    Precondition,
    /// Any other error.
    #[error("unexpected error")]
    Other,
}

impl SwixError {
    /// Create a report of this kind with the given description.
    #[track_caller]
    pub fn report<D: Printable>(self, description: D) -> Report<Self> {
        ReportBuilder::new()
            .with_backtrace()
            .with_location()
            .with_description(description)
            .with_error(self)
            .build()
    }

    /// Exit status of the process when failing with this error.
    pub fn exit_status(&self) -> i32 {
        match self {
            SwixError::ExternalTool {
                status: Some(status),
            } if *status != 0 => *status,
            _ => 1,
        }
    }
}

impl Whatever for SwixError {
    fn new() -> Self {
        SwixError::Other
    }

    // Wrapping a report keeps its kind.
    fn from_error<E>(error: &E) -> Self
    where
        E: reportify::Error,
    {
        (error as &dyn Any)
            .downcast_ref::<SwixError>()
            .cloned()
            .unwrap_or(SwixError::Other)
    }
}

pub type SwixResult<T> = Result<T, Report<SwixError>>;

#[cfg(test)]
mod tests {
    use reportify::ResultExt;

    use super::*;

    fn failing() -> SwixResult<()> {
        Err(SwixError::PolicyViolation.report("cannot remove the current image"))
    }

    #[test]
    fn test_whatever_keeps_kind() {
        let report = failing()
            .whatever::<SwixError, _>("unable to remove image")
            .unwrap_err();
        assert_eq!(report.error(), &SwixError::PolicyViolation);
        let report = std::fs::read("/does/not/exist")
            .whatever::<SwixError, _>("unable to read")
            .unwrap_err();
        assert_eq!(report.error(), &SwixError::Other);
    }

    #[test]
    fn test_exit_status() {
        assert_eq!(SwixError::ExternalTool { status: Some(3) }.exit_status(), 3);
        assert_eq!(SwixError::ExternalTool { status: None }.exit_status(), 1);
        assert_eq!(SwixError::Precondition.exit_status(), 1);
    }
}
