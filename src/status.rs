//! Status codes and diagnostic issues attached to every remote outcome.

use std::fmt;

use serde::{Deserialize, Serialize};

// ============================================================================
// Status Codes
// ============================================================================

/// Result code of a remote operation.
///
/// Server codes use the numeric values of the query service. Client-side codes
/// (transport failures, pool failures) live in the 500000/600000 ranges so they
/// can never be confused with a server verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatusCode {
    Unspecified,
    Success,
    BadRequest,
    Unauthorized,
    InternalError,
    Aborted,
    Unavailable,
    Overloaded,
    SchemeError,
    GenericError,
    Timeout,
    BadSession,
    PreconditionFailed,
    AlreadyExists,
    NotFound,
    SessionExpired,
    Cancelled,
    Undetermined,
    Unsupported,
    SessionBusy,
    ExternalError,

    // Client side
    ClientInternalError,
    ClientDisposed,
    ClientResourceExhausted,

    // Transport
    ClientTransportUnknown,
    ClientTransportUnavailable,
    ClientTransportTimeout,
    ClientTransportResourceExhausted,
    ClientTransportUnimplemented,
}

impl StatusCode {
    /// Numeric wire value of this code.
    pub fn code(self) -> u32 {
        match self {
            StatusCode::Unspecified => 0,
            StatusCode::Success => 400000,
            StatusCode::BadRequest => 400010,
            StatusCode::Unauthorized => 400020,
            StatusCode::InternalError => 400030,
            StatusCode::Aborted => 400040,
            StatusCode::Unavailable => 400050,
            StatusCode::Overloaded => 400060,
            StatusCode::SchemeError => 400070,
            StatusCode::GenericError => 400080,
            StatusCode::Timeout => 400090,
            StatusCode::BadSession => 400100,
            StatusCode::PreconditionFailed => 400120,
            StatusCode::AlreadyExists => 400130,
            StatusCode::NotFound => 400140,
            StatusCode::SessionExpired => 400150,
            StatusCode::Cancelled => 400160,
            StatusCode::Undetermined => 400170,
            StatusCode::Unsupported => 400180,
            StatusCode::SessionBusy => 400190,
            StatusCode::ExternalError => 400200,
            StatusCode::ClientInternalError => 500000,
            StatusCode::ClientDisposed => 500010,
            StatusCode::ClientResourceExhausted => 500020,
            StatusCode::ClientTransportUnknown => 600010,
            StatusCode::ClientTransportUnavailable => 600020,
            StatusCode::ClientTransportTimeout => 600030,
            StatusCode::ClientTransportResourceExhausted => 600040,
            StatusCode::ClientTransportUnimplemented => 600050,
        }
    }

    /// Map a numeric wire value back to a code. Unknown values become `Unspecified`.
    pub fn from_code(code: u32) -> Self {
        match code {
            400000 => StatusCode::Success,
            400010 => StatusCode::BadRequest,
            400020 => StatusCode::Unauthorized,
            400030 => StatusCode::InternalError,
            400040 => StatusCode::Aborted,
            400050 => StatusCode::Unavailable,
            400060 => StatusCode::Overloaded,
            400070 => StatusCode::SchemeError,
            400080 => StatusCode::GenericError,
            400090 => StatusCode::Timeout,
            400100 => StatusCode::BadSession,
            400120 => StatusCode::PreconditionFailed,
            400130 => StatusCode::AlreadyExists,
            400140 => StatusCode::NotFound,
            400150 => StatusCode::SessionExpired,
            400160 => StatusCode::Cancelled,
            400170 => StatusCode::Undetermined,
            400180 => StatusCode::Unsupported,
            400190 => StatusCode::SessionBusy,
            400200 => StatusCode::ExternalError,
            500000 => StatusCode::ClientInternalError,
            500010 => StatusCode::ClientDisposed,
            500020 => StatusCode::ClientResourceExhausted,
            600010 => StatusCode::ClientTransportUnknown,
            600020 => StatusCode::ClientTransportUnavailable,
            600030 => StatusCode::ClientTransportTimeout,
            600040 => StatusCode::ClientTransportResourceExhausted,
            600050 => StatusCode::ClientTransportUnimplemented,
            _ => StatusCode::Unspecified,
        }
    }

    /// Check if this code was produced by the transport layer.
    pub fn is_transport_error(self) -> bool {
        matches!(
            self,
            StatusCode::ClientTransportUnknown
                | StatusCode::ClientTransportUnavailable
                | StatusCode::ClientTransportTimeout
                | StatusCode::ClientTransportResourceExhausted
                | StatusCode::ClientTransportUnimplemented
        )
    }

    /// Check if this code means the server no longer considers the session usable.
    pub fn is_session_invalidating(self) -> bool {
        matches!(
            self,
            StatusCode::BadSession | StatusCode::SessionExpired | StatusCode::SessionBusy
        )
    }
}

// ============================================================================
// Issues
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IssueSeverity {
    Fatal,
    Error,
    Warning,
    Info,
}

/// A single diagnostic message, possibly with nested sub-issues.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub message: String,
    pub code: u32,
    pub severity: IssueSeverity,
    #[serde(default)]
    pub issues: Vec<Issue>,
}

impl Issue {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: 0,
            severity: IssueSeverity::Error,
            issues: Vec::new(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            severity: IssueSeverity::Warning,
            ..Self::error(message)
        }
    }

    fn write_indented(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        write!(f, "\n{:indent$}[{:?}] {}", "", self.severity, self.message, indent = depth * 2)?;
        if self.code != 0 {
            write!(f, " (code: {})", self.code)?;
        }
        for nested in &self.issues {
            nested.write_indented(f, depth + 1)?;
        }
        Ok(())
    }
}

// ============================================================================
// Status
// ============================================================================

/// Result code plus ordered diagnostics.
///
/// `cause` carries an earlier failure that this status superseded, e.g. the body
/// failure hidden behind a failed rollback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub code: StatusCode,
    #[serde(default)]
    pub issues: Vec<Issue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<Box<Status>>,
}

impl Status {
    pub fn new(code: StatusCode, issues: Vec<Issue>) -> Self {
        Self {
            code,
            issues,
            cause: None,
        }
    }

    pub fn success() -> Self {
        Self::new(StatusCode::Success, Vec::new())
    }

    /// Status with a single error issue.
    pub fn with_message(code: StatusCode, message: impl Into<String>) -> Self {
        Self::new(code, vec![Issue::error(message)])
    }

    /// Attach the failure this status supersedes.
    pub fn caused_by(mut self, cause: Status) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    #[inline]
    pub fn is_success(&self) -> bool {
        self.code == StatusCode::Success
    }

    /// Turn a non-success status into an error.
    pub fn ensure_success(&self) -> crate::Result<()> {
        if self.is_success() {
            Ok(())
        } else {
            Err(crate::Error::Status(self.clone()))
        }
    }

    pub fn cause(&self) -> Option<&Status> {
        self.cause.as_deref()
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Status: {:?}", self.code)?;
        for issue in &self.issues {
            issue.write_indented(f, 1)?;
        }
        if let Some(cause) = &self.cause {
            write!(f, "\nCaused by: {}", cause)?;
        }
        Ok(())
    }
}
