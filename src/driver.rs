//! Transport contract.
//!
//! The `Driver` performs the actual unary and server-streaming calls. This crate
//! never talks to the network itself; it drives whatever `Driver` it is given.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{BoxStream, Stream, StreamExt};
use thiserror::Error;

use crate::protocol::{
    AttachSessionRequest, BeginTransactionRequest, BeginTransactionResponse,
    CommitTransactionRequest, CommitTransactionResponse, CreateSessionRequest,
    CreateSessionResponse, DeleteSessionRequest, DeleteSessionResponse, ExecuteQueryRequest,
    ExecuteQueryResponsePart, Operation, RollbackTransactionRequest, RollbackTransactionResponse,
    SessionState, TableBeginTransactionResult,
};
use crate::settings::RequestSettings;
use crate::status::{Status, StatusCode};

/// Transport-level failure: the call did not produce a server verdict.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{code:?}: {message}")]
pub struct TransportError {
    pub code: StatusCode,
    pub message: String,
}

impl TransportError {
    pub fn new(code: StatusCode, message: &str) -> Self {
        Self {
            code,
            message: message.to_string(),
        }
    }

    pub fn timeout(after: Duration) -> Self {
        Self {
            code: StatusCode::ClientTransportTimeout,
            message: format!("Transport timeout after {:?}", after),
        }
    }

    pub fn status(&self) -> Status {
        Status::with_message(self.code, self.message.clone())
    }
}

pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Server-streaming response.
pub type ResponseStream<T> = BoxStream<'static, TransportResult<T>>;

/// One typed method per remote call.
#[async_trait]
pub trait Driver: Send + Sync + 'static {
    async fn create_session(
        &self,
        request: CreateSessionRequest,
        settings: &RequestSettings,
    ) -> TransportResult<CreateSessionResponse>;

    async fn delete_session(
        &self,
        request: DeleteSessionRequest,
        settings: &RequestSettings,
    ) -> TransportResult<DeleteSessionResponse>;

    async fn attach_session(
        &self,
        request: AttachSessionRequest,
        settings: &RequestSettings,
    ) -> TransportResult<ResponseStream<SessionState>>;

    async fn begin_transaction(
        &self,
        request: BeginTransactionRequest,
        settings: &RequestSettings,
    ) -> TransportResult<BeginTransactionResponse>;

    async fn commit_transaction(
        &self,
        request: CommitTransactionRequest,
        settings: &RequestSettings,
    ) -> TransportResult<CommitTransactionResponse>;

    async fn rollback_transaction(
        &self,
        request: RollbackTransactionRequest,
        settings: &RequestSettings,
    ) -> TransportResult<RollbackTransactionResponse>;

    async fn execute_query(
        &self,
        request: ExecuteQueryRequest,
        settings: &RequestSettings,
    ) -> TransportResult<ResponseStream<ExecuteQueryResponsePart>>;

    // Legacy table-service transaction calls.

    async fn table_begin_transaction(
        &self,
        request: BeginTransactionRequest,
        settings: &RequestSettings,
    ) -> TransportResult<Operation<TableBeginTransactionResult>>;

    async fn table_commit_transaction(
        &self,
        request: CommitTransactionRequest,
        settings: &RequestSettings,
    ) -> TransportResult<Operation<()>>;

    async fn table_rollback_transaction(
        &self,
        request: RollbackTransactionRequest,
        settings: &RequestSettings,
    ) -> TransportResult<Operation<()>>;
}

/// Run a driver call under the client-side transport deadline.
pub(crate) async fn with_timeout<T, F>(timeout: Option<Duration>, call: F) -> TransportResult<T>
where
    F: Future<Output = TransportResult<T>>,
{
    match timeout {
        Some(after) => tokio::time::timeout(after, call)
            .await
            .map_err(|_| TransportError::timeout(after))?,
        None => call.await,
    }
}

/// Pull the next stream item under the client-side transport deadline.
pub(crate) async fn next_with_timeout<S, T>(
    stream: &mut S,
    timeout: Option<Duration>,
) -> Option<TransportResult<T>>
where
    S: Stream<Item = TransportResult<T>> + Unpin,
{
    match timeout {
        Some(after) => match tokio::time::timeout(after, stream.next()).await {
            Ok(item) => item,
            Err(_) => Some(Err(TransportError::timeout(after))),
        },
        None => stream.next().await,
    }
}
