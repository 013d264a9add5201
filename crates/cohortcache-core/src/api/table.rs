//! Retrying, throttled access to a single remote table.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use crate::config::RetryConfig;
use crate::error::DataError;
use crate::throttle::Throttler;

use super::{ApiError, Fields, ListQuery, Record, RecordBackend};

/// Which failures one operation may retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RetryPolicy {
    /// Repeating the request is harmless: rate limits and one transient failure.
    Idempotent,
    /// A lost response may hide an applied write, so only rate limits, which
    /// the service rejects before applying anything.
    RateLimitOnly,
}

/// Client for one table. Clone is cheap; clones share the backend and the
/// process-wide throttler.
#[derive(Clone)]
pub struct TableClient {
    backend: Arc<dyn RecordBackend>,
    throttler: Throttler,
    table: Arc<str>,
    retry: RetryConfig,
}

impl TableClient {
    pub fn new(
        backend: Arc<dyn RecordBackend>,
        throttler: Throttler,
        table: &str,
        retry: RetryConfig,
    ) -> Self {
        Self {
            backend,
            throttler,
            table: Arc::from(table),
            retry,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// `Ok(None)` when the record does not exist.
    pub async fn find(&self, id: &str) -> Result<Option<Record>, DataError> {
        self.call("find", RetryPolicy::Idempotent, || self.backend.find(&self.table, id))
            .await
    }

    pub async fn list(&self, query: &ListQuery) -> Result<Vec<Record>, DataError> {
        let records = self
            .call("list", RetryPolicy::Idempotent, || self.backend.list(&self.table, query))
            .await?;
        debug!(table = %self.table, count = records.len(), "Listed records");
        Ok(records)
    }

    pub async fn update(&self, id: &str, fields: Fields) -> Result<Record, DataError> {
        self.call("update", RetryPolicy::Idempotent, || {
            self.backend.update(&self.table, id, fields.clone())
        })
        .await
    }

    /// A transport or server failure is surfaced at once: the row may
    /// already exist, and a second POST would create another.
    pub async fn create(&self, fields: Fields) -> Result<Record, DataError> {
        self.call("create", RetryPolicy::RateLimitOnly, || {
            self.backend.create(&self.table, fields.clone())
        })
        .await
    }

    /// Delay before the next rate-limited attempt.
    fn backoff_delay(&self, backoff_ms: u64) -> Duration {
        let max_jitter = (backoff_ms as f64 * self.retry.jitter.max(0.0)) as u64;
        let jitter = if max_jitter > 0 {
            rand::thread_rng().gen_range(0..=max_jitter)
        } else {
            0
        };
        Duration::from_millis(backoff_ms + jitter)
    }

    /// Run one logical operation: every attempt takes its own throttle permit,
    /// and the permit is dropped before any backoff sleep.
    async fn call<T, F, Fut>(
        &self,
        op: &'static str,
        policy: RetryPolicy,
        mut attempt: F,
    ) -> Result<T, DataError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut rate_limited = 0u32;
        let mut transient_retry = policy == RetryPolicy::Idempotent;
        let mut backoff_ms = self.retry.initial_backoff_ms;

        loop {
            let result = {
                let _permit = self
                    .throttler
                    .acquire()
                    .await
                    .map_err(|e| DataError::Transport(e.to_string()))?;
                attempt().await
            };

            match result {
                Ok(value) => return Ok(value),
                Err(ApiError::RateLimited) => {
                    rate_limited += 1;
                    if rate_limited >= max_attempts {
                        warn!(table = %self.table, op = op, attempts = rate_limited, "Rate limit retries exhausted");
                        return Err(DataError::RateLimited {
                            attempts: rate_limited,
                        });
                    }
                    let delay = self.backoff_delay(backoff_ms);
                    warn!(
                        table = %self.table,
                        op = op,
                        retry = rate_limited,
                        backoff_ms = delay.as_millis() as u64,
                        "Rate limited, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    backoff_ms = backoff_ms.saturating_mul(2).min(self.retry.max_backoff_ms);
                }
                Err(e) if e.is_transient() && transient_retry => {
                    transient_retry = false;
                    warn!(table = %self.table, op = op, error = %e, "Transient error, retrying once");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}
