//! Latency budgets and partial-failure joins for read resolvers.
//!
//! A read gets one [`Budget`] for all of its upstream work. Sibling lookups
//! run concurrently through [`join_within`]; whatever completes before the
//! deadline is kept and the rest is reported as missing, so an aggregate
//! degrades piece by piece instead of failing as a whole.

use std::future::Future;
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::error::DataError;

/// Failures and gaps behind a read result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct ResolveMeta {
    /// The data is empty or partial.
    pub degraded: bool,
    pub errors: Vec<String>,
    /// Labels of pieces left out, e.g. `cohort c1`.
    pub missing: Vec<String>,
}

impl ResolveMeta {
    pub fn note(&mut self, piece: &str, error: &DataError) {
        self.degraded = true;
        self.errors.push(format!("{}: {}", piece, error));
        self.missing.push(piece.to_string());
    }

    pub fn merge(&mut self, other: ResolveMeta) {
        self.degraded |= other.degraded;
        self.errors.extend(other.errors);
        self.missing.extend(other.missing);
    }
}

/// A read result with its metadata annotation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Resolved<T> {
    pub data: T,
    pub meta: ResolveMeta,
}

impl<T> Resolved<T> {
    pub fn ok(data: T) -> Self {
        Self {
            data,
            meta: ResolveMeta::default(),
        }
    }

    pub fn with_meta(data: T, meta: ResolveMeta) -> Self {
        Self { data, meta }
    }

    pub fn degraded(data: T, piece: &str, error: &DataError) -> Self {
        let mut meta = ResolveMeta::default();
        meta.note(piece, error);
        Self { data, meta }
    }

    pub fn is_degraded(&self) -> bool {
        self.meta.degraded
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Resolved<U> {
        Resolved {
            data: f(self.data),
            meta: self.meta,
        }
    }

    pub fn into_data(self) -> T {
        self.data
    }
}

/// Deadline shared by every upstream call of one resolver invocation.
#[derive(Debug, Clone, Copy)]
pub struct Budget {
    deadline: Instant,
    total: Duration,
}

impl Budget {
    pub fn start(total: Duration) -> Self {
        Self {
            deadline: Instant::now() + total,
            total,
        }
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn timeout_error(&self, operation: &str) -> DataError {
        DataError::Timeout {
            operation: operation.to_string(),
            budget_ms: self.total.as_millis() as u64,
        }
    }

    /// Await `fut` until the deadline.
    pub async fn run<T, Fut>(&self, operation: &str, fut: Fut) -> Result<T, DataError>
    where
        Fut: Future<Output = Result<T, DataError>>,
    {
        match tokio::time::timeout_at(self.deadline, fut).await {
            Ok(outcome) => outcome,
            Err(_) => Err(self.timeout_error(operation)),
        }
    }
}

/// Run labelled lookups concurrently and collect them in input order.
///
/// Lookups still pending at the deadline come back as `Timeout` errors. They
/// are only abandoned here; cache loads underneath keep running in their own
/// tasks and release their throttle permits when the upstream call returns.
pub async fn join_within<T, Fut>(
    budget: Budget,
    pieces: Vec<(String, Fut)>,
) -> Vec<(String, Result<T, DataError>)>
where
    Fut: Future<Output = Result<T, DataError>>,
{
    let (labels, futures): (Vec<String>, Vec<Fut>) = pieces.into_iter().unzip();
    let mut slots: Vec<Option<Result<T, DataError>>> = labels.iter().map(|_| None).collect();

    let mut pending: FuturesUnordered<_> = futures
        .into_iter()
        .enumerate()
        .map(|(i, fut)| async move { (i, fut.await) })
        .collect();

    loop {
        match tokio::time::timeout_at(budget.deadline(), pending.next()).await {
            Ok(Some((i, outcome))) => slots[i] = Some(outcome),
            Ok(None) | Err(_) => break,
        }
    }
    drop(pending);

    labels
        .into_iter()
        .zip(slots)
        .map(|(label, slot)| {
            let outcome = slot.unwrap_or_else(|| Err(budget.timeout_error(&label)));
            (label, outcome)
        })
        .collect()
}
