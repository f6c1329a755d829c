//! Session pool tests against the in-memory driver.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::*;
use crate::test_support::{AttachBehavior, MockDriver, Reply};

fn no_backoff(attempts: u32) -> RetrySettings {
    RetrySettings::new()
        .max_attempts(attempts)
        .initial_backoff(Duration::ZERO)
        .jitter(false)
}

async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

#[test]
fn test_pool_config() {
    let config = SessionPoolConfig::new()
        .max_sessions(20)
        .acquire_timeout(Duration::from_millis(250))
        .create_session_timeout(Duration::from_secs(3));

    assert_eq!(config.max_sessions, 20);
    assert_eq!(config.acquire_timeout, Some(Duration::from_millis(250)));
    assert_eq!(config.create_session_timeout, Duration::from_secs(3));
    assert_eq!(config.delete_session_timeout, Duration::from_secs(5));
    assert_eq!(SessionPoolConfig::new().max_sessions(0).max_sessions, 1);
}

#[test]
fn test_pool_config_from_json() {
    let config: SessionPoolConfig = serde_json::from_str(r#"{"max_sessions": 7}"#).unwrap();
    assert_eq!(config.max_sessions, 7);
    assert_eq!(config.acquire_timeout, None);
}

#[tokio::test]
async fn test_release_reuses_session() {
    let driver = MockDriver::new();
    let pool = SessionPool::new(driver.clone(), SessionPoolConfig::new().max_sessions(2));

    let first = pool.acquire().await.unwrap();
    let id = first.session().id().to_string();
    assert_eq!(pool.in_use_count(), 1);
    first.release().await;
    assert_eq!(pool.in_use_count(), 0);
    assert_eq!(pool.idle_count(), 1);

    let second = pool.acquire().await.unwrap();
    assert_eq!(second.session().id(), id);
    second.release().await;
    assert_eq!(driver.count("create_session"), 1);
}

#[tokio::test]
async fn test_in_use_never_exceeds_max() {
    let driver = MockDriver::new();
    let pool = SessionPool::new(driver.clone(), SessionPoolConfig::new().max_sessions(3));
    let current = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let mut tasks = Vec::new();
    for _ in 0..20 {
        let pool = pool.clone();
        let current = Arc::clone(&current);
        let peak = Arc::clone(&peak);
        tasks.push(tokio::spawn(async move {
            pool.exec_on_session(
                |_session| {
                    let current = Arc::clone(&current);
                    let peak = Arc::clone(&peak);
                    async move {
                        let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(5)).await;
                        current.fetch_sub(1, Ordering::SeqCst);
                        Ok(())
                    }
                },
                &RetrySettings::no_retry(),
            )
            .await
        }));
    }

    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert!(peak.load(Ordering::SeqCst) <= 3);
    assert!(driver.count("create_session") <= 3);
    assert_eq!(pool.in_use_count(), 0);
    assert_eq!(pool.idle_count(), driver.count("create_session"));
}

#[tokio::test]
async fn test_acquire_blocks_at_max_until_release() {
    let driver = MockDriver::new();
    let pool = SessionPool::new(driver.clone(), SessionPoolConfig::new().max_sessions(1));

    let held = pool.acquire().await.unwrap();
    let held_id = held.session().id().to_string();

    let waiter = {
        let pool = pool.clone();
        tokio::spawn(async move {
            let pooled = pool.acquire().await.unwrap();
            let id = pooled.session().id().to_string();
            pooled.release().await;
            id
        })
    };

    settle().await;
    assert!(!waiter.is_finished());
    assert_eq!(pool.in_use_count(), 1);

    held.release().await;
    let reused = waiter.await.unwrap();
    assert_eq!(reused, held_id);
    assert_eq!(driver.count("create_session"), 1);
}

#[tokio::test]
async fn test_acquire_timeout() {
    let driver = MockDriver::new();
    let pool = SessionPool::new(
        driver,
        SessionPoolConfig::new()
            .max_sessions(1)
            .acquire_timeout(Duration::from_millis(20)),
    );

    let held = pool.acquire().await.unwrap();
    let err = pool.acquire().await.err().unwrap();
    assert!(matches!(&err, Error::Pool(s) if s.code == StatusCode::ClientResourceExhausted));
    assert!(!err.is_retryable());
    held.release().await;
}

#[tokio::test]
async fn test_transport_errors_are_retried() {
    let driver = MockDriver::new();
    let pool = SessionPool::new(driver.clone(), SessionPoolConfig::new().max_sessions(2));
    let attempts = AtomicUsize::new(0);

    let result = pool
        .exec_on_session(
            |_session| {
                let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if attempt < 3 {
                        Err(Error::Transport(crate::driver::TransportError::new(
                            StatusCode::ClientTransportUnavailable,
                            "connection reset",
                        )))
                    } else {
                        Ok(attempt)
                    }
                }
            },
            &no_backoff(5),
        )
        .await;

    assert_eq!(result.unwrap(), 3);
    // Each failed attempt broke its session.
    assert_eq!(driver.count("create_session"), 3);
    assert_eq!(driver.count("delete_session"), 2);
    assert_eq!(pool.idle_count(), 1);
}

#[tokio::test]
async fn test_retries_stop_at_max_attempts() {
    let driver = MockDriver::new();
    let pool = SessionPool::new(driver, SessionPoolConfig::new());
    let attempts = AtomicUsize::new(0);

    let err = pool
        .exec_on_session(
            |_session| {
                attempts.fetch_add(1, Ordering::SeqCst);
                async {
                    Err::<(), _>(Error::Transport(crate::driver::TransportError::new(
                        StatusCode::ClientTransportTimeout,
                        "deadline exceeded",
                    )))
                }
            },
            &no_backoff(4),
        )
        .await
        .unwrap_err();

    assert_eq!(attempts.load(Ordering::SeqCst), 4);
    assert_eq!(err.status().code, StatusCode::ClientTransportTimeout);
}

#[tokio::test]
async fn test_status_errors_are_not_retried() {
    let driver = MockDriver::new();
    let pool = SessionPool::new(driver, SessionPoolConfig::new());
    let attempts = AtomicUsize::new(0);

    let err = pool
        .exec_on_session(
            |_session| {
                attempts.fetch_add(1, Ordering::SeqCst);
                async {
                    Err::<(), _>(Error::Status(Status::with_message(
                        StatusCode::PreconditionFailed,
                        "constraint violated",
                    )))
                }
            },
            &no_backoff(5),
        )
        .await
        .unwrap_err();

    assert_eq!(attempts.load(Ordering::SeqCst), 1);
    assert_eq!(err.status().code, StatusCode::PreconditionFailed);
    // A plain status failure keeps the session.
    assert_eq!(pool.idle_count(), 1);
}

#[tokio::test]
async fn test_bad_session_is_discarded() {
    let driver = MockDriver::new();
    let pool = SessionPool::new(driver.clone(), SessionPoolConfig::new());

    let err = pool
        .exec_on_session(
            |_session| async {
                Err::<(), _>(Error::Status(Status::with_message(
                    StatusCode::BadSession,
                    "session not found",
                )))
            },
            &no_backoff(3),
        )
        .await
        .unwrap_err();

    assert_eq!(err.status().code, StatusCode::BadSession);
    assert_eq!(pool.idle_count(), 0);
    assert_eq!(driver.count("delete_session"), 1);
}

#[tokio::test]
async fn test_create_session_transport_failure_is_retried() {
    let driver = MockDriver::new();
    driver.push_reply(
        "create_session",
        Reply::transport(StatusCode::ClientTransportUnavailable, "no endpoints"),
    );
    let pool = SessionPool::new(driver.clone(), SessionPoolConfig::new());

    let value = pool
        .exec_on_session(|session| async move { Ok(session.id().to_string()) }, &no_backoff(3))
        .await
        .unwrap();

    assert_eq!(driver.count("create_session"), 2);
    assert!(value.starts_with("session-"));
}

#[tokio::test]
async fn test_broken_idle_session_is_skipped() {
    let driver = MockDriver::new();
    driver.set_attach(AttachBehavior::EndAfterFirst);
    let pool = SessionPool::new(driver.clone(), SessionPoolConfig::new());

    let first = pool.acquire().await.unwrap();
    let first_id = first.session().id().to_string();
    settle().await;
    assert!(first.session().is_broken());
    first.release().await;
    assert_eq!(pool.idle_count(), 0);

    driver.set_attach(AttachBehavior::KeepOpen);
    let second = pool.acquire().await.unwrap();
    assert_ne!(second.session().id(), first_id);
    second.release().await;
}

#[tokio::test]
async fn test_dropped_guard_discards_session() {
    let driver = MockDriver::new();
    let pool = SessionPool::new(driver.clone(), SessionPoolConfig::new());

    let pooled = pool.acquire().await.unwrap();
    let session = Arc::clone(pooled.session());
    drop(pooled);

    assert!(session.is_broken() || session.state() == crate::session::SessionState::Closed);
    assert_eq!(pool.in_use_count(), 0);
    settle().await;
    assert_eq!(driver.count("delete_session"), 1);
    assert_eq!(pool.idle_count(), 0);
}

#[tokio::test]
async fn test_close_fails_waiters_and_deletes_sessions() {
    let driver = MockDriver::new();
    let pool = SessionPool::new(driver.clone(), SessionPoolConfig::new().max_sessions(2));

    let idle = pool.acquire().await.unwrap();
    let held = pool.acquire().await.unwrap();
    idle.release().await;
    let held_again = pool.acquire().await.unwrap();

    let waiter = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.acquire().await.err() })
    };
    settle().await;

    pool.close().await;
    let err = waiter.await.unwrap().unwrap();
    assert!(matches!(&err, Error::Pool(s) if s.code == StatusCode::ClientDisposed));

    held.release().await;
    held_again.release().await;
    assert_eq!(pool.idle_count(), 0);
    assert_eq!(driver.count("delete_session"), 2);

    let err = pool.acquire().await.err().unwrap();
    assert_eq!(err.status().code, StatusCode::ClientDisposed);
}
