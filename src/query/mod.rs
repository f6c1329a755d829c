//! Query orchestrator.
//!
//! [`QueryClient`] acquires a session, runs a transaction around the caller's
//! work and turns the outcome into exactly one [`QueryResponse`].

mod stream;


use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};

use crate::driver::Driver;
use crate::error::{Error, Result};
use crate::pool::{ExecOnSession, SessionPool, SessionPoolConfig};
use crate::settings::{ExecuteQuerySettings, RequestSettings, RetrySettings};
use crate::status::{Status, StatusCode};
use crate::tx::{Tx, TxHandle, TxMode, TxRpc, TxRpcKind};
use crate::value::Params;

pub use stream::ExecuteQueryStream;

// ============================================================================
// Configuration
// ============================================================================

/// Query client configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryClientConfig {
    pub session_pool: SessionPoolConfig,
    /// Which service drives Begin/Commit/Rollback
    pub tx_rpc: TxRpcKind,
    /// Settings of the transaction calls
    pub tx_request: RequestSettings,
}

impl QueryClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session_pool(mut self, config: SessionPoolConfig) -> Self {
        self.session_pool = config;
        self
    }

    pub fn tx_rpc(mut self, kind: TxRpcKind) -> Self {
        self.tx_rpc = kind;
        self
    }

    pub fn tx_request(mut self, settings: RequestSettings) -> Self {
        self.tx_request = settings;
        self
    }
}

// ============================================================================
// Query Response
// ============================================================================

/// Terminal outcome of a top-level call: a status and, on success, a value.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResponse<T> {
    pub status: Status,
    pub result: Option<T>,
}

impl<T> QueryResponse<T> {
    pub fn from_result(result: Result<T>) -> Self {
        match result {
            Ok(value) => Self {
                status: Status::success(),
                result: Some(value),
            },
            Err(e) => Self {
                status: e.status(),
                result: None,
            },
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Convert back into a `Result`, failing with the status if unsuccessful.
    pub fn into_result(self) -> Result<T> {
        match self.result {
            Some(value) if self.status.is_success() => Ok(value),
            _ if !self.status.is_success() => Err(Error::Status(self.status)),
            _ => Err(Error::Internal("Successful response without a result".to_string())),
        }
    }
}

// ============================================================================
// Query Client
// ============================================================================

/// Runs queries and transaction bodies on pooled sessions.
pub struct QueryClient<P: ExecOnSession = SessionPool> {
    pool: P,
    tx_rpc: Arc<dyn TxRpc>,
    tx_request: RequestSettings,
}

impl QueryClient<SessionPool> {
    /// Create a client with its own session pool.
    pub fn new(driver: Arc<dyn Driver>, config: QueryClientConfig) -> Self {
        let pool = SessionPool::new(driver, config.session_pool);
        Self::with_pool(pool, config.tx_rpc, config.tx_request)
    }

    pub fn pool(&self) -> &SessionPool {
        &self.pool
    }

    /// Dispose the session pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

impl<P: ExecOnSession> QueryClient<P> {
    /// Create a client on top of any session provider.
    pub fn with_pool(pool: P, tx_rpc: TxRpcKind, tx_request: RequestSettings) -> Self {
        Self {
            pool,
            tx_rpc: tx_rpc.build(),
            tx_request,
        }
    }

    /// Run `body` inside one transaction.
    ///
    /// The transaction is begun before `body` runs and committed after it
    /// succeeds. If `body` fails or panics it is rolled back exactly once; a
    /// failed commit is reported as is, without a rollback.
    pub async fn do_tx<T, F, Fut>(&self, body: F, tx_mode: TxMode, retry: &RetrySettings) -> QueryResponse<T>
    where
        T: Send,
        F: Fn(TxHandle) -> Fut + Send + Sync,
        Fut: Future<Output = Result<T>> + Send,
    {
        let body = &body;
        let tx_mode = &tx_mode;
        let rpc = &self.tx_rpc;
        let tx_request = &self.tx_request;

        let result = self
            .pool
            .exec_on_session(
                |session| {
                    let tx = Tx::new(session, tx_mode.clone(), Arc::clone(rpc), tx_request.clone());
                    run_tx(tx, body)
                },
                retry,
            )
            .await;

        QueryResponse::from_result(result)
    }

    /// Execute one query in its own transaction and hand the response stream
    /// to `consumer`. The stream is drained after the consumer returns.
    pub async fn query<T, F>(
        &self,
        text: &str,
        params: Params,
        consumer: F,
        tx_mode: TxMode,
        exec_settings: &ExecuteQuerySettings,
        retry: &RetrySettings,
    ) -> QueryResponse<T>
    where
        T: Send,
        F: for<'s> Fn(&'s mut ExecuteQueryStream) -> BoxFuture<'s, Result<T>> + Send + Sync,
    {
        let consumer = &consumer;
        let params = &params;

        self.do_tx(
            |tx| {
                let params = params.clone();
                async move { tx.query(text, params, consumer, exec_settings).await }
            },
            tx_mode,
            retry,
        )
        .await
    }

    /// Execute a query whose response is only checked for success.
    pub async fn non_query(
        &self,
        text: &str,
        params: Params,
        tx_mode: TxMode,
        exec_settings: &ExecuteQuerySettings,
        retry: &RetrySettings,
    ) -> QueryResponse<()> {
        self.query(
            text,
            params,
            |stream| Box::pin(stream.drain()),
            tx_mode,
            exec_settings,
            retry,
        )
        .await
    }
}

/// Begin `tx`, run `body` and finish the transaction.
async fn run_tx<T, F, Fut>(mut tx: Tx, body: &F) -> Result<T>
where
    F: Fn(TxHandle) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    // A failed begin has nothing to roll back.
    tx.begin().await?;
    let tx_id = tx.id().unwrap_or_default();

    let failure = match AssertUnwindSafe(body(tx.handle())).catch_unwind().await {
        Ok(Ok(value)) => {
            tx.commit().await?;
            return Ok(value);
        }
        Ok(Err(e)) => body_failure(&tx_id, e),
        Err(panic) => body_error(&tx_id, format!("panicked: {}", panic_message(panic.as_ref()))),
    };

    tracing::debug!("Body failed on tx {}, rolling back: {}", tx_id, failure);
    match tx.rollback().await {
        Ok(()) => Err(failure),
        Err(rollback) => {
            tracing::error!("Failed to rollback tx {}: {}", tx_id, rollback);
            Err(Error::RollbackFailed {
                rollback: rollback.status(),
                cause: Box::new(failure),
            })
        }
    }
}

/// Errors that carry a remote status pass through; everything else becomes an
/// `InternalError` status naming the transaction.
fn body_failure(tx_id: &str, error: Error) -> Error {
    match error {
        Error::Status(_) | Error::Transport(_) | Error::Pool(_) | Error::RollbackFailed { .. } => error,
        other => body_error(tx_id, other.to_string()),
    }
}

fn body_error(tx_id: &str, detail: String) -> Error {
    Error::Status(Status::with_message(
        StatusCode::InternalError,
        format!("Failed to execute body on tx {}: {}", tx_id, detail),
    ))
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}
