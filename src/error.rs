//! Error types for the driver core.
//!
//! Every error can be reported as a [`Status`], which is what the query
//! orchestrator hands back to its callers.

use thiserror::Error;

use crate::driver::TransportError;
use crate::status::{Status, StatusCode};

#[derive(Error, Debug)]
pub enum Error {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Unsuccessful status: {0}")]
    Status(Status),

    #[error("Invalid argument: {0}")]
    Argument(String),

    #[error("Type conversion error: {0}")]
    Type(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Pool error: {0}")]
    Pool(Status),

    #[error("Rollback failed: {rollback}")]
    RollbackFailed {
        rollback: Status,
        #[source]
        cause: Box<Error>,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Status reported to callers for this error.
    ///
    /// A failed rollback reports the rollback status, with the original failure
    /// chained as its cause.
    pub fn status(&self) -> Status {
        match self {
            Error::Transport(e) => e.status(),
            Error::Status(status) | Error::Pool(status) => status.clone(),
            Error::Argument(msg) => Status::with_message(StatusCode::BadRequest, msg.clone()),
            Error::Type(msg) | Error::Protocol(msg) | Error::Internal(msg) => {
                Status::with_message(StatusCode::ClientInternalError, msg.clone())
            }
            Error::RollbackFailed { rollback, cause } => rollback.clone().caused_by(cause.status()),
        }
    }

    /// Only transport-level failures are retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Transport(_))
    }

    /// Check if the session that produced this error must not be reused.
    pub fn invalidates_session(&self) -> bool {
        match self {
            Error::Transport(_) => true,
            Error::Status(status) => status.code.is_session_invalidating(),
            Error::RollbackFailed { rollback, cause } => {
                rollback.code.is_transport_error()
                    || rollback.code.is_session_invalidating()
                    || cause.invalidates_session()
            }
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rollback_failure_reports_rollback_status() {
        let original = Status::with_message(StatusCode::GenericError, "body failed");
        let rollback = Status::with_message(StatusCode::Unavailable, "rollback failed");
        let err = Error::RollbackFailed {
            rollback: rollback.clone(),
            cause: Box::new(Error::Status(original.clone())),
        };

        let status = err.status();
        assert_eq!(status.code, rollback.code);
        assert_eq!(status.issues, rollback.issues);
        assert_eq!(status.cause(), Some(&original));
    }

    #[test]
    fn test_only_transport_is_retryable() {
        let transport = Error::Transport(TransportError::new(
            StatusCode::ClientTransportUnavailable,
            "connection reset",
        ));
        assert!(transport.is_retryable());
        assert!(transport.invalidates_session());

        let logic = Error::Status(Status::with_message(StatusCode::Aborted, "conflict"));
        assert!(!logic.is_retryable());
        assert!(!logic.invalidates_session());

        let bad_session = Error::Status(Status::with_message(StatusCode::BadSession, "gone"));
        assert!(!bad_session.is_retryable());
        assert!(bad_session.invalidates_session());
    }

    #[test]
    fn test_argument_maps_to_bad_request() {
        let err = Error::Argument("empty list".to_string());
        assert_eq!(err.status().code, StatusCode::BadRequest);
    }
}
