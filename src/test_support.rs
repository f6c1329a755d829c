//! In-memory `Driver` for tests.
//!
//! Every call is recorded by method name. Replies are scripted per method and
//! default to success when nothing is queued.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;

use crate::driver::{Driver, ResponseStream, TransportError, TransportResult};
use crate::protocol::{
    AttachSessionRequest, BeginTransactionRequest, BeginTransactionResponse,
    CommitTransactionRequest, CommitTransactionResponse, CreateSessionRequest,
    CreateSessionResponse, DeleteSessionRequest, DeleteSessionResponse, ExecuteQueryRequest,
    ExecuteQueryResponsePart, Operation, RollbackTransactionRequest, RollbackTransactionResponse,
    SessionState, TableBeginTransactionResult,
};
use crate::settings::RequestSettings;
use crate::status::{Status, StatusCode};

/// Scripted outcome of one unary call.
#[derive(Debug, Clone)]
pub(crate) enum Reply {
    Status(Status),
    Transport(TransportError),
    /// Table-service operation that is not ready.
    NotReady,
}

impl Reply {
    pub(crate) fn status(code: StatusCode, message: &str) -> Self {
        Reply::Status(Status::with_message(code, message))
    }

    pub(crate) fn transport(code: StatusCode, message: &str) -> Self {
        Reply::Transport(TransportError::new(code, message))
    }
}

#[derive(Debug, Clone)]
pub(crate) enum AttachBehavior {
    /// One success message, then the stream stays open.
    KeepOpen,
    /// One success message, then the stream ends.
    EndAfterFirst,
    /// The first message carries this status.
    FirstStatus(Status),
}

pub(crate) struct MockDriver {
    calls: Mutex<Vec<String>>,
    replies: Mutex<HashMap<&'static str, VecDeque<Reply>>>,
    query_streams: Mutex<VecDeque<Vec<TransportResult<ExecuteQueryResponsePart>>>>,
    executed: Mutex<Vec<ExecuteQueryRequest>>,
    attach: Mutex<AttachBehavior>,
    next_session: AtomicU64,
    next_tx: AtomicU64,
}

impl MockDriver {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            replies: Mutex::new(HashMap::new()),
            query_streams: Mutex::new(VecDeque::new()),
            executed: Mutex::new(Vec::new()),
            attach: Mutex::new(AttachBehavior::KeepOpen),
            next_session: AtomicU64::new(1),
            next_tx: AtomicU64::new(1),
        })
    }

    /// Queue a reply for the next call of `method`.
    pub(crate) fn push_reply(&self, method: &'static str, reply: Reply) {
        self.replies
            .lock()
            .entry(method)
            .or_default()
            .push_back(reply);
    }

    /// Queue the parts returned by the next `execute_query` stream.
    pub(crate) fn push_query_stream(&self, parts: Vec<TransportResult<ExecuteQueryResponsePart>>) {
        self.query_streams.lock().push_back(parts);
    }

    pub(crate) fn set_attach(&self, behavior: AttachBehavior) {
        *self.attach.lock() = behavior;
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub(crate) fn count(&self, method: &str) -> usize {
        self.calls.lock().iter().filter(|c| c.as_str() == method).count()
    }

    pub(crate) fn executed(&self) -> Vec<ExecuteQueryRequest> {
        self.executed.lock().clone()
    }

    fn record(&self, method: &'static str) -> Option<Reply> {
        self.calls.lock().push(method.to_string());
        self.replies.lock().get_mut(method).and_then(VecDeque::pop_front)
    }

    /// Status of a unary call, or its transport failure.
    fn unary(&self, method: &'static str) -> TransportResult<Status> {
        match self.record(method) {
            None | Some(Reply::NotReady) => Ok(Status::success()),
            Some(Reply::Status(status)) => Ok(status),
            Some(Reply::Transport(e)) => Err(e),
        }
    }

    fn operation<R>(&self, method: &'static str, result: impl FnOnce() -> R) -> TransportResult<Operation<R>> {
        match self.record(method) {
            None => Ok(Operation::ready(Status::success(), Some(result()))),
            Some(Reply::Status(status)) => Ok(Operation::ready(status, None)),
            Some(Reply::Transport(e)) => Err(e),
            Some(Reply::NotReady) => Ok(Operation {
                id: format!("op-{}", method),
                ready: false,
                status: Status::success(),
                result: None,
            }),
        }
    }

    fn new_tx_id(&self) -> String {
        format!("tx-{}", self.next_tx.fetch_add(1, Ordering::Relaxed))
    }
}

#[async_trait]
impl Driver for MockDriver {
    async fn create_session(
        &self,
        _request: CreateSessionRequest,
        _settings: &RequestSettings,
    ) -> TransportResult<CreateSessionResponse> {
        let status = self.unary("create_session")?;
        let n = self.next_session.fetch_add(1, Ordering::Relaxed);
        Ok(CreateSessionResponse {
            status,
            session_id: format!("session-{}", n),
            node_id: 1,
            endpoint: Some("localhost:2136".to_string()),
        })
    }

    async fn delete_session(
        &self,
        _request: DeleteSessionRequest,
        _settings: &RequestSettings,
    ) -> TransportResult<DeleteSessionResponse> {
        let status = self.unary("delete_session")?;
        Ok(DeleteSessionResponse { status })
    }

    async fn attach_session(
        &self,
        _request: AttachSessionRequest,
        _settings: &RequestSettings,
    ) -> TransportResult<ResponseStream<SessionState>> {
        self.unary("attach_session")?;
        let ok = SessionState {
            status: Status::success(),
        };
        let behavior = self.attach.lock().clone();
        let stream = match behavior {
            AttachBehavior::KeepOpen => stream::once(async move { Ok::<_, TransportError>(ok) })
                .chain(stream::pending())
                .boxed(),
            AttachBehavior::EndAfterFirst => stream::once(async move { Ok::<_, TransportError>(ok) }).boxed(),
            AttachBehavior::FirstStatus(status) => {
                stream::once(async move { Ok::<_, TransportError>(SessionState { status }) })
                    .chain(stream::pending())
                    .boxed()
            }
        };
        Ok(stream)
    }

    async fn begin_transaction(
        &self,
        _request: BeginTransactionRequest,
        _settings: &RequestSettings,
    ) -> TransportResult<BeginTransactionResponse> {
        let status = self.unary("begin_transaction")?;
        Ok(BeginTransactionResponse {
            status,
            tx_id: self.new_tx_id(),
        })
    }

    async fn commit_transaction(
        &self,
        _request: CommitTransactionRequest,
        _settings: &RequestSettings,
    ) -> TransportResult<CommitTransactionResponse> {
        let status = self.unary("commit_transaction")?;
        Ok(CommitTransactionResponse { status })
    }

    async fn rollback_transaction(
        &self,
        _request: RollbackTransactionRequest,
        _settings: &RequestSettings,
    ) -> TransportResult<RollbackTransactionResponse> {
        let status = self.unary("rollback_transaction")?;
        Ok(RollbackTransactionResponse { status })
    }

    async fn execute_query(
        &self,
        request: ExecuteQueryRequest,
        _settings: &RequestSettings,
    ) -> TransportResult<ResponseStream<ExecuteQueryResponsePart>> {
        self.unary("execute_query")?;
        self.executed.lock().push(request);
        let parts = self
            .query_streams
            .lock()
            .pop_front()
            .unwrap_or_else(|| vec![Ok(ExecuteQueryResponsePart::success(0, None))]);
        Ok(stream::iter(parts).boxed())
    }

    async fn table_begin_transaction(
        &self,
        _request: BeginTransactionRequest,
        _settings: &RequestSettings,
    ) -> TransportResult<Operation<TableBeginTransactionResult>> {
        self.operation("table_begin_transaction", || TableBeginTransactionResult {
            tx_id: self.new_tx_id(),
        })
    }

    async fn table_commit_transaction(
        &self,
        _request: CommitTransactionRequest,
        _settings: &RequestSettings,
    ) -> TransportResult<Operation<()>> {
        self.operation("table_commit_transaction", || ())
    }

    async fn table_rollback_transaction(
        &self,
        _request: RollbackTransactionRequest,
        _settings: &RequestSettings,
    ) -> TransportResult<Operation<()>> {
        self.operation("table_rollback_transaction", || ())
    }
}
