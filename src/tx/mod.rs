//! Transaction controller.
//!
//! A [`Tx`] starts unbound, is bound to a server transaction by [`Tx::begin`] and
//! ends with exactly one of [`Tx::commit`] or [`Tx::rollback`], both of which
//! consume it. Queries run through a [`TxHandle`], a cheap clone that shares the
//! transaction state. At most one query runs on a transaction at a time.

pub mod rpc;

use std::sync::Arc;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::driver::with_timeout;
use crate::error::{Error, Result};
use crate::protocol::{ExecuteQueryRequest, TxControl};
use crate::query::ExecuteQueryStream;
use crate::session::Session;
use crate::settings::{ExecuteQuerySettings, RequestSettings};
use crate::value::Params;

pub use rpc::{QueryServiceTxRpc, TableServiceTxRpc, TxRpc, TxRpcKind};

/// Isolation mode selected at begin.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TxMode {
    #[default]
    SerializableReadWrite,
    OnlineReadOnly { allow_inconsistent_reads: bool },
    StaleReadOnly,
    SnapshotReadOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    Unbound,
    Begun,
    Committed,
    RolledBack,
    Failed,
}

impl TxState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TxState::Committed | TxState::RolledBack | TxState::Failed)
    }
}

struct TxShared {
    session: Arc<Session>,
    mode: TxMode,
    rpc: Arc<dyn TxRpc>,
    settings: RequestSettings,
    state: Mutex<TxState>,
    id: Mutex<Option<String>>,
    /// Held for the whole execute, consume and drain of a query.
    running: tokio::sync::Mutex<()>,
}

impl TxShared {
    fn state(&self) -> TxState {
        *self.state.lock()
    }

    fn id(&self) -> Option<String> {
        self.id.lock().clone()
    }

    fn set_state(&self, state: TxState) {
        let mut current = self.state.lock();
        tracing::trace!(
            "Tx {} on session {}: {:?} -> {:?}",
            self.id().unwrap_or_default(),
            self.session.id(),
            *current,
            state
        );
        *current = state;
    }

    /// Id of the transaction, if it can still run queries or be finished.
    fn active_id(&self) -> Result<String> {
        match (self.state(), self.id()) {
            (TxState::Begun, Some(id)) => Ok(id),
            (state, id) => Err(Error::Internal(format!(
                "Transaction {} is {:?}, expected Begun",
                id.unwrap_or_else(|| "<unbound>".to_string()),
                state
            ))),
        }
    }
}

// ============================================================================
// Tx
// ============================================================================

/// One logical transaction on one session.
pub struct Tx {
    shared: Arc<TxShared>,
}

impl Tx {
    pub fn new(session: Arc<Session>, mode: TxMode, rpc: Arc<dyn TxRpc>, settings: RequestSettings) -> Self {
        Self {
            shared: Arc::new(TxShared {
                session,
                mode,
                rpc,
                settings,
                state: Mutex::new(TxState::Unbound),
                id: Mutex::new(None),
                running: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Server-issued id; `None` until begin succeeds.
    pub fn id(&self) -> Option<String> {
        self.shared.id()
    }

    pub fn session_id(&self) -> &str {
        self.shared.session.id()
    }

    pub fn mode(&self) -> &TxMode {
        &self.shared.mode
    }

    pub fn state(&self) -> TxState {
        self.shared.state()
    }

    /// Begin the transaction. On failure the Tx stays unbound.
    pub async fn begin(&mut self) -> Result<()> {
        let shared = &self.shared;
        if shared.state() != TxState::Unbound {
            return Err(Error::Internal(format!(
                "Cannot begin transaction in state {:?}",
                shared.state()
            )));
        }

        let tx_id = shared
            .rpc
            .begin(&shared.session, &shared.mode, &shared.settings)
            .await?;
        *shared.id.lock() = Some(tx_id);
        shared.set_state(TxState::Begun);
        Ok(())
    }

    /// Commit. A failed commit leaves the transaction `Failed`.
    pub async fn commit(self) -> Result<()> {
        let shared = &self.shared;
        let _idle = shared.running.lock().await;
        let tx_id = shared.active_id()?;
        match shared
            .rpc
            .commit(&shared.session, &tx_id, &shared.settings)
            .await
        {
            Ok(()) => {
                shared.set_state(TxState::Committed);
                Ok(())
            }
            Err(e) => {
                shared.set_state(TxState::Failed);
                Err(e)
            }
        }
    }

    /// Roll back. A failed rollback leaves the transaction `Failed`.
    pub async fn rollback(self) -> Result<()> {
        let shared = &self.shared;
        let _idle = shared.running.lock().await;
        let tx_id = shared.active_id()?;
        match shared
            .rpc
            .rollback(&shared.session, &tx_id, &shared.settings)
            .await
        {
            Ok(()) => {
                shared.set_state(TxState::RolledBack);
                Ok(())
            }
            Err(e) => {
                shared.set_state(TxState::Failed);
                Err(e)
            }
        }
    }

    /// Query view of this transaction.
    pub fn handle(&self) -> TxHandle {
        TxHandle {
            shared: Arc::clone(&self.shared),
        }
    }
}

// ============================================================================
// Tx Handle
// ============================================================================

/// Runs queries inside a begun transaction.
///
/// Handles stay valid only while the transaction is `Begun`; afterwards every
/// call fails with an internal error. Starting a query while another one is
/// still running on the same transaction fails the same way.
#[derive(Clone)]
pub struct TxHandle {
    shared: Arc<TxShared>,
}

impl TxHandle {
    pub fn tx_id(&self) -> Option<String> {
        self.shared.id()
    }

    pub fn session_id(&self) -> &str {
        self.shared.session.id()
    }

    pub fn state(&self) -> TxState {
        self.shared.state()
    }

    /// Execute `text` and hand the response stream to `consumer`.
    ///
    /// After the consumer returns successfully the rest of the stream is drained,
    /// so a failure reported by a later part still fails the query. If the
    /// consumer fails the stream is aborted.
    pub async fn query<T, F>(
        &self,
        text: &str,
        params: Params,
        consumer: F,
        settings: &ExecuteQuerySettings,
    ) -> Result<T>
    where
        F: for<'s> FnOnce(&'s mut ExecuteQueryStream) -> BoxFuture<'s, Result<T>> + Send,
        T: Send,
    {
        let _running = self.shared.running.try_lock().map_err(|_| {
            Error::Internal(format!(
                "Transaction {} already has a query in flight",
                self.shared.id().unwrap_or_default()
            ))
        })?;
        let tx_id = self.shared.active_id()?;
        let session = &self.shared.session;

        let request = ExecuteQueryRequest {
            session_id: session.id().to_string(),
            text: text.to_string(),
            params,
            tx_control: Some(TxControl::tx_id(tx_id)),
            exec_mode: settings.exec_mode.code(),
            syntax: settings.syntax.code(),
            stats_mode: settings.stats_mode.code(),
        };

        let timeout = settings.request.transport_timeout;
        let parts = with_timeout(
            timeout,
            session.driver().execute_query(request, &settings.request),
        )
        .await?;
        let mut stream = ExecuteQueryStream::new(parts, timeout);

        match consumer(&mut stream).await {
            Ok(value) => {
                stream.drain().await?;
                Ok(value)
            }
            Err(e) => {
                stream.abort();
                Err(e)
            }
        }
    }

    /// Execute `text`, reading the response only to check it.
    pub async fn non_query(&self, text: &str, params: Params, settings: &ExecuteQuerySettings) -> Result<()> {
        self.query(text, params, |stream| Box::pin(stream.drain()), settings)
            .await
    }
}
