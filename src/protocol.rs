//! Request and response messages exchanged with the query service.
//!
//! Unary responses carry their own `Status`; transport failures are reported
//! separately by the driver as `TransportError`.

use crate::status::{Status, StatusCode};
use crate::tx::TxMode;
use crate::value::{Params, ResultSet};

// ============================================================================
// Sessions
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CreateSessionRequest;

#[derive(Debug, Clone, PartialEq)]
pub struct CreateSessionResponse {
    pub status: Status,
    pub session_id: String,
    pub node_id: i64,
    /// Endpoint the session is bound to, if the driver knows it.
    pub endpoint: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteSessionRequest {
    pub session_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteSessionResponse {
    pub status: Status,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttachSessionRequest {
    pub session_id: String,
}

/// One message of the attach stream. Any non-success state ends the session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    pub status: Status,
}

// ============================================================================
// Transactions
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct TxSettings {
    pub mode: TxMode,
}

/// Transaction a query runs in. Queries never commit; that is left to the
/// explicit commit call.
#[derive(Debug, Clone, PartialEq)]
pub struct TxControl {
    pub tx_id: String,
}

impl TxControl {
    pub fn tx_id(tx_id: impl Into<String>) -> Self {
        Self { tx_id: tx_id.into() }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BeginTransactionRequest {
    pub session_id: String,
    pub tx_settings: TxSettings,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BeginTransactionResponse {
    pub status: Status,
    pub tx_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommitTransactionRequest {
    pub session_id: String,
    pub tx_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommitTransactionResponse {
    pub status: Status,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RollbackTransactionRequest {
    pub session_id: String,
    pub tx_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RollbackTransactionResponse {
    pub status: Status,
}

// ============================================================================
// Query Execution
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct ExecuteQueryRequest {
    pub session_id: String,
    pub text: String,
    pub params: Params,
    pub tx_control: Option<TxControl>,
    /// Numeric `ExecMode` code.
    pub exec_mode: u32,
    /// Numeric `Syntax` code.
    pub syntax: u32,
    /// Numeric `StatsMode` code.
    pub stats_mode: u32,
}

/// One part of an `ExecuteQuery` response stream.
#[derive(Debug, Clone)]
pub struct ExecuteQueryResponsePart {
    pub status: Status,
    pub result_set_index: u64,
    pub result_set: Option<ResultSet>,
}

impl ExecuteQueryResponsePart {
    pub fn success(result_set_index: u64, result_set: Option<ResultSet>) -> Self {
        Self {
            status: Status::success(),
            result_set_index,
            result_set,
        }
    }

    pub fn failure(status: Status) -> Self {
        Self {
            status,
            result_set_index: 0,
            result_set: None,
        }
    }
}

// ============================================================================
// Table Service Operations
// ============================================================================

/// Long-running operation envelope returned by table-service calls.
#[derive(Debug, Clone, PartialEq)]
pub struct Operation<R> {
    pub id: String,
    pub ready: bool,
    pub status: Status,
    pub result: Option<R>,
}

impl<R> Operation<R> {
    /// Completed operation with a result.
    pub fn ready(status: Status, result: Option<R>) -> Self {
        Self {
            id: String::new(),
            ready: true,
            status,
            result,
        }
    }

    /// Split into status and result. An operation that is not ready yet is
    /// reported as an internal error, since transaction calls are synchronous.
    pub fn unpack(self) -> (Status, Option<R>) {
        if !self.ready {
            return (
                Status::with_message(
                    StatusCode::ClientInternalError,
                    format!("Operation {} is not ready", self.id),
                ),
                None,
            );
        }
        (self.status, self.result)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableBeginTransactionResult {
    pub tx_id: String,
}
