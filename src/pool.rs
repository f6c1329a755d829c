//! Session pool.
//!
//! A semaphore bounds the number of checked-out sessions; idle sessions are kept
//! in a mutex-protected stack and reused before new ones are created.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::driver::Driver;
use crate::error::{Error, Result};
use crate::session::Session;
use crate::settings::{RequestSettings, RetrySettings};
use crate::status::{Status, StatusCode};

// ============================================================================
// Pool Configuration
// ============================================================================

/// Session pool configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionPoolConfig {
    /// Maximum number of sessions checked out at the same time
    pub max_sessions: usize,
    /// How long to wait for a free slot; `None` waits indefinitely
    pub acquire_timeout: Option<Duration>,
    /// Deadline of CreateSession and of the first attach message
    pub create_session_timeout: Duration,
    /// Deadline of DeleteSession
    pub delete_session_timeout: Duration,
}

impl Default for SessionPoolConfig {
    fn default() -> Self {
        Self {
            max_sessions: 100,
            acquire_timeout: None,
            create_session_timeout: Duration::from_secs(30),
            delete_session_timeout: Duration::from_secs(5),
        }
    }
}

impl SessionPoolConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of concurrently used sessions.
    pub fn max_sessions(mut self, max: usize) -> Self {
        self.max_sessions = max.max(1);
        self
    }

    /// Fail acquisition after waiting this long for a free slot.
    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = Some(timeout);
        self
    }

    pub fn create_session_timeout(mut self, timeout: Duration) -> Self {
        self.create_session_timeout = timeout;
        self
    }

    pub fn delete_session_timeout(mut self, timeout: Duration) -> Self {
        self.delete_session_timeout = timeout;
        self
    }

    fn create_settings(&self) -> RequestSettings {
        RequestSettings::new().transport_timeout(self.create_session_timeout)
    }

    fn delete_settings(&self) -> RequestSettings {
        RequestSettings::new().transport_timeout(self.delete_session_timeout)
    }
}

// ============================================================================
// Exec On Session
// ============================================================================

/// Runs an action against exactly one session, with retries.
#[async_trait]
pub trait ExecOnSession: Send + Sync {
    /// Run `action` on a session and return what it produced.
    ///
    /// Transport failures are retried according to `retry`, each attempt on a
    /// freshly acquired session. Every other error is returned as is.
    async fn exec_on_session<T, F, Fut>(&self, action: F, retry: &RetrySettings) -> Result<T>
    where
        T: Send,
        F: Fn(Arc<Session>) -> Fut + Send + Sync,
        Fut: Future<Output = Result<T>> + Send;
}

// ============================================================================
// Pooled Session
// ============================================================================

/// A session checked out from the pool.
///
/// Return it with [`PooledSession::release`]. A guard dropped without release
/// (e.g. a cancelled future) is treated as broken and the session is deleted.
pub struct PooledSession {
    session: Arc<Session>,
    pool: Arc<SessionPoolInner>,
    released: bool,
    _permit: OwnedSemaphorePermit,
}

impl PooledSession {
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Return the session to the pool, or delete it if it is broken or the
    /// pool is closed.
    pub async fn release(mut self) {
        self.released = true;
        self.pool.release(Arc::clone(&self.session)).await;
    }
}

impl Drop for PooledSession {
    fn drop(&mut self) {
        self.pool.in_use.fetch_sub(1, Ordering::AcqRel);
        if self.released {
            return;
        }

        tracing::warn!(
            "Session {} dropped without release, discarding it",
            self.session.id()
        );
        self.session.mark_broken();

        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let session = Arc::clone(&self.session);
            let settings = self.pool.config.delete_settings();
            handle.spawn(async move {
                let _ = session.delete(&settings).await;
            });
        }
    }
}

// ============================================================================
// Pool Inner
// ============================================================================

struct SessionPoolInner {
    config: SessionPoolConfig,
    driver: Arc<dyn Driver>,
    /// Idle sessions waiting to be used
    idle_sessions: Mutex<Vec<Arc<Session>>>,
    /// Semaphore to limit checked-out sessions
    semaphore: Arc<Semaphore>,
    in_use: AtomicUsize,
    closed: AtomicBool,
}

impl SessionPoolInner {
    async fn release(&self, session: Arc<Session>) {
        session.set_in_use(false);

        if !session.is_broken() {
            let mut idle = self.idle_sessions.lock();
            // Checked under the idle lock so close() cannot miss this session.
            if !self.closed.load(Ordering::Acquire) {
                idle.push(session);
                return;
            }
        }

        tracing::debug!(
            "Deleting session {} ({:?}) on release",
            session.id(),
            session.state()
        );
        let _ = session.delete(&self.config.delete_settings()).await;
    }
}

// ============================================================================
// Session Pool
// ============================================================================

/// Bounded pool of reusable sessions.
#[derive(Clone)]
pub struct SessionPool {
    inner: Arc<SessionPoolInner>,
}

impl SessionPool {
    /// Create an empty pool. Sessions are created on demand.
    pub fn new(driver: Arc<dyn Driver>, config: SessionPoolConfig) -> Self {
        let inner = Arc::new(SessionPoolInner {
            semaphore: Arc::new(Semaphore::new(config.max_sessions.max(1))),
            config,
            driver,
            idle_sessions: Mutex::new(Vec::new()),
            in_use: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        });

        Self { inner }
    }

    /// Get a session from the pool, waiting for a free slot if necessary.
    pub async fn acquire(&self) -> Result<PooledSession> {
        if self.is_closed() {
            return Err(disposed());
        }

        let permit = Arc::clone(&self.inner.semaphore).acquire_owned();
        let permit = match self.inner.config.acquire_timeout {
            Some(timeout) => tokio::time::timeout(timeout, permit).await.map_err(|_| {
                Error::Pool(Status::with_message(
                    StatusCode::ClientResourceExhausted,
                    format!("No session available after {:?}", timeout),
                ))
            })?,
            None => permit.await,
        }
        .map_err(|_| disposed())?;

        let session = match self.pop_idle().await {
            Some(session) => session,
            None => {
                Session::create(
                    Arc::clone(&self.inner.driver),
                    &self.inner.config.create_settings(),
                    &self.inner.config.delete_settings(),
                )
                .await?
            }
        };

        session.set_in_use(true);
        self.inner.in_use.fetch_add(1, Ordering::AcqRel);

        Ok(PooledSession {
            session,
            pool: Arc::clone(&self.inner),
            released: false,
            _permit: permit,
        })
    }

    /// Pop the most recently used idle session, deleting any that broke while idle.
    async fn pop_idle(&self) -> Option<Arc<Session>> {
        loop {
            let session = self.inner.idle_sessions.lock().pop()?;
            if !session.is_broken() {
                return Some(session);
            }
            tracing::debug!("Discarding idle session {} that broke", session.id());
            let _ = session.delete(&self.inner.config.delete_settings()).await;
        }
    }

    /// Close the pool.
    ///
    /// Waiting and future acquisitions fail with `ClientDisposed`; idle sessions
    /// are deleted now and checked-out ones when they are released.
    pub async fn close(&self) {
        let sessions = {
            let mut idle = self.inner.idle_sessions.lock();
            self.inner.closed.store(true, Ordering::Release);
            std::mem::take(&mut *idle)
        };
        self.inner.semaphore.close();

        tracing::debug!("Closing session pool, deleting {} idle sessions", sessions.len());
        let settings = self.inner.config.delete_settings();
        for session in sessions {
            let _ = session.delete(&settings).await;
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Get the current number of idle sessions.
    pub fn idle_count(&self) -> usize {
        self.inner.idle_sessions.lock().len()
    }

    /// Get the current number of checked-out sessions.
    pub fn in_use_count(&self) -> usize {
        self.inner.in_use.load(Ordering::Acquire)
    }

    /// Get the pool configuration.
    pub fn config(&self) -> &SessionPoolConfig {
        &self.inner.config
    }
}

#[async_trait]
impl ExecOnSession for SessionPool {
    async fn exec_on_session<T, F, Fut>(&self, action: F, retry: &RetrySettings) -> Result<T>
    where
        T: Send,
        F: Fn(Arc<Session>) -> Fut + Send + Sync,
        Fut: Future<Output = Result<T>> + Send,
    {
        let max_attempts = retry.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;

            let result = match self.acquire().await {
                Ok(pooled) => {
                    let result = action(Arc::clone(pooled.session())).await;
                    if let Err(e) = &result {
                        if e.invalidates_session() {
                            tracing::warn!(
                                "Session {} invalidated by error: {}",
                                pooled.session().id(),
                                e
                            );
                            pooled.session().mark_broken();
                        }
                    }
                    pooled.release().await;
                    result
                }
                Err(e) => Err(e),
            };

            match result {
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    let delay = retry.backoff(attempt);
                    tracing::warn!(
                        "Attempt {}/{} failed with {}, retrying in {:?}",
                        attempt,
                        max_attempts,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                other => return other,
            }
        }
    }
}

fn disposed() -> Error {
    Error::Pool(Status::with_message(
        StatusCode::ClientDisposed,
        "Session pool is closed",
    ))
}

#[cfg(test)]
mod tests;
