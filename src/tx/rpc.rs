//! Transaction RPCs.
//!
//! Transactions can be driven either through the query service or through the
//! legacy table-service calls, which wrap their results in an `Operation`. Both
//! behave the same for callers.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::driver::with_timeout;
use crate::error::{Error, Result};
use crate::protocol::{
    BeginTransactionRequest, CommitTransactionRequest, RollbackTransactionRequest, TxSettings,
};
use crate::session::Session;
use crate::settings::RequestSettings;

use super::TxMode;

/// Begin, commit and rollback of a transaction on a session.
#[async_trait]
pub trait TxRpc: Send + Sync {
    /// Begin a transaction and return its id.
    async fn begin(&self, session: &Session, mode: &TxMode, settings: &RequestSettings) -> Result<String>;

    async fn commit(&self, session: &Session, tx_id: &str, settings: &RequestSettings) -> Result<()>;

    async fn rollback(&self, session: &Session, tx_id: &str, settings: &RequestSettings) -> Result<()>;
}

/// Which `TxRpc` implementation a client uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TxRpcKind {
    #[default]
    QueryService,
    TableService,
}

impl TxRpcKind {
    pub fn build(self) -> Arc<dyn TxRpc> {
        match self {
            TxRpcKind::QueryService => Arc::new(QueryServiceTxRpc),
            TxRpcKind::TableService => Arc::new(TableServiceTxRpc),
        }
    }
}

fn begin_request(session: &Session, mode: &TxMode) -> BeginTransactionRequest {
    BeginTransactionRequest {
        session_id: session.id().to_string(),
        tx_settings: TxSettings { mode: mode.clone() },
    }
}

// ============================================================================
// Query Service
// ============================================================================

/// Query-service Begin/Commit/RollbackTransaction.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryServiceTxRpc;

#[async_trait]
impl TxRpc for QueryServiceTxRpc {
    async fn begin(&self, session: &Session, mode: &TxMode, settings: &RequestSettings) -> Result<String> {
        let response = with_timeout(
            settings.transport_timeout,
            session
                .driver()
                .begin_transaction(begin_request(session, mode), settings),
        )
        .await?;
        response.status.ensure_success()?;
        Ok(response.tx_id)
    }

    async fn commit(&self, session: &Session, tx_id: &str, settings: &RequestSettings) -> Result<()> {
        let request = CommitTransactionRequest {
            session_id: session.id().to_string(),
            tx_id: tx_id.to_string(),
        };
        let response = with_timeout(
            settings.transport_timeout,
            session.driver().commit_transaction(request, settings),
        )
        .await?;
        response.status.ensure_success()
    }

    async fn rollback(&self, session: &Session, tx_id: &str, settings: &RequestSettings) -> Result<()> {
        let request = RollbackTransactionRequest {
            session_id: session.id().to_string(),
            tx_id: tx_id.to_string(),
        };
        let response = with_timeout(
            settings.transport_timeout,
            session.driver().rollback_transaction(request, settings),
        )
        .await?;
        response.status.ensure_success()
    }
}

// ============================================================================
// Table Service
// ============================================================================

/// Legacy table-service transaction calls.
#[derive(Debug, Clone, Copy, Default)]
pub struct TableServiceTxRpc;

#[async_trait]
impl TxRpc for TableServiceTxRpc {
    async fn begin(&self, session: &Session, mode: &TxMode, settings: &RequestSettings) -> Result<String> {
        let operation = with_timeout(
            settings.transport_timeout,
            session
                .driver()
                .table_begin_transaction(begin_request(session, mode), settings),
        )
        .await?;

        let (status, result) = operation.unpack();
        status.ensure_success()?;
        result
            .map(|r| r.tx_id)
            .ok_or_else(|| Error::Protocol("BeginTransaction operation has no result".to_string()))
    }

    async fn commit(&self, session: &Session, tx_id: &str, settings: &RequestSettings) -> Result<()> {
        let request = CommitTransactionRequest {
            session_id: session.id().to_string(),
            tx_id: tx_id.to_string(),
        };
        let operation = with_timeout(
            settings.transport_timeout,
            session.driver().table_commit_transaction(request, settings),
        )
        .await?;
        operation.unpack().0.ensure_success()
    }

    async fn rollback(&self, session: &Session, tx_id: &str, settings: &RequestSettings) -> Result<()> {
        let request = RollbackTransactionRequest {
            session_id: session.id().to_string(),
            tx_id: tx_id.to_string(),
        };
        let operation = with_timeout(
            settings.transport_timeout,
            session.driver().table_rollback_transaction(request, settings),
        )
        .await?;
        operation.unpack().0.ensure_success()
    }
}
