//! Server-side sessions.
//!
//! A session is created with `CreateSession` and kept alive by an `AttachSession`
//! stream. A background task consumes that stream; once it ends, fails or reports
//! a non-success state the session is marked broken and the pool discards it on
//! its next release.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::driver::{next_with_timeout, with_timeout, Driver, ResponseStream, TransportError};
use crate::error::{Error, Result};
use crate::protocol::{self, AttachSessionRequest, CreateSessionRequest, DeleteSessionRequest};
use crate::settings::RequestSettings;
use crate::status::StatusCode;

/// Client deadline of the attach stream itself. Individual messages may be
/// arbitrarily far apart.
const ATTACH_STREAM_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

/// Lifecycle of a pooled session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    InUse,
    Broken,
    Closed,
}

/// A server-side execution context bound to one node.
pub struct Session {
    id: String,
    node_id: i64,
    endpoint: Option<String>,
    state: Arc<Mutex<SessionState>>,
    keep_alive: Mutex<Option<JoinHandle<()>>>,
    driver: Arc<dyn Driver>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("node_id", &self.node_id)
            .field("endpoint", &self.endpoint)
            .field("state", &self.state())
            .finish()
    }
}

impl Session {
    /// Create a session and wait for the first attach message.
    ///
    /// If the attach step fails the freshly created session is deleted before the
    /// error is returned.
    pub(crate) async fn create(
        driver: Arc<dyn Driver>,
        create_settings: &RequestSettings,
        delete_settings: &RequestSettings,
    ) -> Result<Arc<Session>> {
        let response = with_timeout(
            create_settings.transport_timeout,
            driver.create_session(CreateSessionRequest, create_settings),
        )
        .await?;
        response.status.ensure_success()?;

        let session = Session {
            id: response.session_id,
            node_id: response.node_id,
            endpoint: response.endpoint,
            state: Arc::new(Mutex::new(SessionState::Idle)),
            keep_alive: Mutex::new(None),
            driver,
        };

        let attached = session.attach(create_settings).await;
        match attached {
            Ok(stream) => {
                session.spawn_keep_alive(stream);
                tracing::debug!(
                    "Session {} created on node {}",
                    session.id,
                    session.node_id
                );
                Ok(Arc::new(session))
            }
            Err(e) => {
                tracing::warn!("Session {} failed to attach: {}", session.id, e);
                let _ = session.delete(delete_settings).await;
                Err(e)
            }
        }
    }

    async fn attach(&self, settings: &RequestSettings) -> Result<ResponseStream<protocol::SessionState>> {
        let attach_settings = settings.clone().transport_timeout(ATTACH_STREAM_TIMEOUT);
        let mut stream = with_timeout(
            settings.transport_timeout,
            self.driver.attach_session(
                AttachSessionRequest {
                    session_id: self.id.clone(),
                },
                &attach_settings,
            ),
        )
        .await?;

        match next_with_timeout(&mut stream, settings.transport_timeout).await {
            Some(Ok(first)) => {
                first.status.ensure_success()?;
                Ok(stream)
            }
            Some(Err(e)) => Err(e.into()),
            None => Err(Error::Transport(TransportError::new(
                StatusCode::ClientTransportUnavailable,
                "Attach stream closed before the first message",
            ))),
        }
    }

    fn spawn_keep_alive(&self, mut stream: ResponseStream<protocol::SessionState>) {
        let state = Arc::clone(&self.state);
        let id = self.id.clone();

        let handle = tokio::spawn(async move {
            let reason = loop {
                match stream.next().await {
                    Some(Ok(message)) if message.status.is_success() => continue,
                    Some(Ok(message)) => break format!("state {:?}", message.status.code),
                    Some(Err(e)) => break e.to_string(),
                    None => break "stream closed".to_string(),
                }
            };

            let mut state = state.lock();
            if *state != SessionState::Closed {
                tracing::warn!("Session {} is broken: attach {}", id, reason);
                *state = SessionState::Broken;
            }
        });

        *self.keep_alive.lock() = Some(handle);
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn node_id(&self) -> i64 {
        self.node_id
    }

    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    pub fn is_broken(&self) -> bool {
        self.state() == SessionState::Broken
    }

    /// Mark the session unusable. Closed sessions stay closed.
    pub fn mark_broken(&self) {
        let mut state = self.state.lock();
        if *state != SessionState::Closed {
            *state = SessionState::Broken;
        }
    }

    pub(crate) fn driver(&self) -> &Arc<dyn Driver> {
        &self.driver
    }

    /// Move between Idle and InUse. Broken and Closed are sticky.
    pub(crate) fn set_in_use(&self, in_use: bool) {
        let mut state = self.state.lock();
        if matches!(*state, SessionState::Idle | SessionState::InUse) {
            *state = if in_use {
                SessionState::InUse
            } else {
                SessionState::Idle
            };
        }
    }

    /// Delete the session on the server. Stops the keep-alive task first.
    pub(crate) async fn delete(&self, settings: &RequestSettings) -> Result<()> {
        *self.state.lock() = SessionState::Closed;
        if let Some(handle) = self.keep_alive.lock().take() {
            handle.abort();
        }

        let response = with_timeout(
            settings.transport_timeout,
            self.driver.delete_session(
                DeleteSessionRequest {
                    session_id: self.id.clone(),
                },
                settings,
            ),
        )
        .await?;

        tracing::debug!("Session {} deleted: {:?}", self.id, response.status.code);
        response.status.ensure_success()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(handle) = self.keep_alive.get_mut().take() {
            handle.abort();
        }
    }
}
