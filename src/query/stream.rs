//! Forward-only stream of `ExecuteQuery` response parts.

use std::time::Duration;

use crate::driver::{next_with_timeout, ResponseStream};
use crate::error::{Error, Result};
use crate::protocol::ExecuteQueryResponsePart;
use crate::value::ResultSet;

/// Pull-based view of an `ExecuteQuery` response.
///
/// A part with a non-success status ends the stream and is returned as an error.
/// Once the stream has ended, failed or been aborted, `next` returns `None`.
pub struct ExecuteQueryStream {
    inner: Option<ResponseStream<ExecuteQueryResponsePart>>,
    part_timeout: Option<Duration>,
}

impl ExecuteQueryStream {
    pub(crate) fn new(inner: ResponseStream<ExecuteQueryResponsePart>, part_timeout: Option<Duration>) -> Self {
        Self {
            inner: Some(inner),
            part_timeout,
        }
    }

    /// Next successful part.
    pub async fn next(&mut self) -> Result<Option<ExecuteQueryResponsePart>> {
        let Some(inner) = self.inner.as_mut() else {
            return Ok(None);
        };

        match next_with_timeout(inner, self.part_timeout).await {
            Some(Ok(part)) if part.status.is_success() => Ok(Some(part)),
            Some(Ok(part)) => {
                self.inner = None;
                Err(Error::Status(part.status))
            }
            Some(Err(e)) => {
                self.inner = None;
                Err(e.into())
            }
            None => {
                self.inner = None;
                Ok(None)
            }
        }
    }

    /// Next part that carries a result set, with its index.
    pub async fn next_result_set(&mut self) -> Result<Option<(u64, ResultSet)>> {
        while let Some(part) = self.next().await? {
            if let Some(result_set) = part.result_set {
                return Ok(Some((part.result_set_index, result_set)));
            }
        }
        Ok(None)
    }

    /// Read the rest of the stream, merging parts that belong to the same
    /// result set. Result sets are ordered by index.
    pub async fn collect_result_sets(&mut self) -> Result<Vec<ResultSet>> {
        let mut sets: Vec<(u64, ResultSet)> = Vec::new();
        while let Some((index, result_set)) = self.next_result_set().await? {
            match sets.iter_mut().find(|(i, _)| *i == index) {
                Some((_, existing)) => existing.append(result_set),
                None => sets.push((index, result_set)),
            }
        }
        sets.sort_by_key(|(index, _)| *index);
        Ok(sets.into_iter().map(|(_, set)| set).collect())
    }

    /// Consume the remaining parts, failing on the first non-success one.
    pub async fn drain(&mut self) -> Result<()> {
        while self.next().await?.is_some() {}
        Ok(())
    }

    /// Stop reading and release the underlying stream.
    pub fn abort(&mut self) {
        self.inner = None;
    }

    pub fn is_finished(&self) -> bool {
        self.inner.is_none()
    }
}
