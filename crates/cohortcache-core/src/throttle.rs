//! Process-wide gate in front of the tabular service.
//!
//! Two limits apply to every outbound request:
//! - at most `max_concurrent` requests in flight (FIFO semaphore), and
//! - request starts spaced at least `1 / requests_per_second` apart.
//!
//! Both tokio primitives used here queue waiters in FIFO order, so a burst
//! is served in arrival order and no caller starves.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tracing::debug;

use crate::config::ThrottleConfig;

#[derive(Debug, thiserror::Error)]
#[error("throttler closed")]
pub struct ThrottleClosed;

/// Scoped admission to the upstream service. Dropping it frees the slot,
/// including when the holder errors out or its future is cancelled.
#[derive(Debug)]
pub struct ThrottlePermit {
    _permit: OwnedSemaphorePermit,
}

#[derive(Debug, Clone)]
pub struct Throttler {
    semaphore: Arc<Semaphore>,
    next_slot: Arc<Mutex<Option<Instant>>>,
    min_interval: Duration,
    max_concurrent: usize,
}

impl Throttler {
    pub fn new(config: &ThrottleConfig) -> Self {
        let max_concurrent = config.max_concurrent.max(1);
        let min_interval = if config.requests_per_second > 0.0 {
            Duration::from_secs_f64(1.0 / config.requests_per_second)
        } else {
            Duration::ZERO
        };

        debug!(
            max_concurrent = max_concurrent,
            min_interval_ms = min_interval.as_millis() as u64,
            "Throttler initialized"
        );

        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            next_slot: Arc::new(Mutex::new(None)),
            min_interval,
            max_concurrent,
        }
    }

    /// Wait for a concurrency slot and a rate slot, in that order.
    pub async fn acquire(&self) -> Result<ThrottlePermit, ThrottleClosed> {
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| ThrottleClosed)?;

        if !self.min_interval.is_zero() {
            let start_at = {
                let mut next_slot = self.next_slot.lock().await;
                let now = Instant::now();
                let slot = next_slot.map_or(now, |next| next.max(now));
                *next_slot = Some(slot + self.min_interval);
                slot
            };
            if start_at > Instant::now() {
                tokio::time::sleep_until(start_at).await;
            }
        }

        Ok(ThrottlePermit { _permit: permit })
    }

    /// Permits currently held.
    pub fn in_flight(&self) -> usize {
        self.max_concurrent - self.semaphore.available_permits()
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn throttler(max_concurrent: usize, requests_per_second: f64) -> Throttler {
        Throttler::new(&ThrottleConfig {
            max_concurrent,
            requests_per_second,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_never_exceeds_concurrency_ceiling() {
        let throttler = throttler(3, 0.0);
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        // 10x the ceiling
        let tasks: Vec<_> = (0..30)
            .map(|_| {
                let throttler = throttler.clone();
                let active = Arc::clone(&active);
                let peak = Arc::clone(&peak);
                tokio::spawn(async move {
                    let _permit = throttler.acquire().await.expect("acquire");
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();

        for task in futures::future::join_all(tasks).await {
            task.expect("task completes");
        }

        assert_eq!(peak.load(Ordering::SeqCst), 3);
        assert_eq!(throttler.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_spacing() {
        let throttler = throttler(10, 5.0);
        let started = Instant::now();

        for _ in 0..11 {
            let _permit = throttler.acquire().await.expect("acquire");
        }

        // first start is immediate, the next ten are 200ms apart
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(1990), "elapsed {:?}", elapsed);
        assert!(elapsed < Duration::from_millis(2100), "elapsed {:?}", elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permit_released_when_holder_fails() {
        let throttler = throttler(1, 0.0);

        let result: Result<(), &str> = async {
            let _permit = throttler.acquire().await.expect("acquire");
            Err("upstream blew up")
        }
        .await;
        assert!(result.is_err());
        assert_eq!(throttler.in_flight(), 0);

        let handle = {
            let throttler = throttler.clone();
            tokio::spawn(async move {
                let _permit = throttler.acquire().await.expect("acquire");
                panic!("holder panics");
            })
        };
        assert!(handle.await.is_err());
        assert_eq!(throttler.in_flight(), 0);

        // cancelled while holding
        let held = tokio::time::timeout(Duration::from_millis(10), async {
            let _permit = throttler.acquire().await.expect("acquire");
            tokio::time::sleep(Duration::from_secs(60)).await;
        })
        .await;
        assert!(held.is_err());
        assert_eq!(throttler.in_flight(), 0);
        let _permit = throttler.acquire().await.expect("slot is free again");
    }
}
