use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::DataError;

type Value = Arc<dyn Any + Send + Sync>;
type LoadOutcome = Result<Value, DataError>;

struct Entry {
    value: Value,
    tags: Vec<String>,
    expires_at: Instant,
}

/// A load other callers can wait on.
struct InFlight {
    id: u64,
    tags: Vec<String>,
    rx: watch::Receiver<Option<LoadOutcome>>,
}

/// Inserts between sweeps of expired entries.
const SWEEP_EVERY_INSERTS: usize = 256;
/// Longest time between sweeps while entries are still being written.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

struct State {
    entries: HashMap<String, Entry>,
    tag_index: HashMap<String, HashSet<String>>,
    /// Sequence number of the latest invalidation of each tag.
    invalidated: HashMap<String, u64>,
    in_flight: HashMap<String, InFlight>,
    /// Loads still running, detached ones included.
    running: HashSet<u64>,
    /// Shared by load ids and invalidations, so the two are ordered.
    seq: u64,
    inserts_since_sweep: usize,
    last_sweep: Instant,
}

impl Default for State {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            tag_index: HashMap::new(),
            invalidated: HashMap::new(),
            in_flight: HashMap::new(),
            running: HashSet::new(),
            seq: 0,
            inserts_since_sweep: 0,
            last_sweep: Instant::now(),
        }
    }
}

impl State {
    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    /// True if a load started as `load_id` saw none of its tags invalidated since.
    fn load_is_current(&self, load_id: u64, tags: &[String]) -> bool {
        tags.iter()
            .all(|tag| self.invalidated.get(tag).map_or(true, |at| *at < load_id))
    }

    /// Drop expired entries, and invalidation marks no running load predates.
    fn sweep(&mut self) -> usize {
        let now = Instant::now();
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, e)| e.expires_at <= now)
            .map(|(k, _)| k.clone())
            .collect();
        for key in &expired {
            self.remove_entry(key);
        }
        let oldest_running = self.running.iter().min().copied().unwrap_or(u64::MAX);
        self.invalidated.retain(|_, at| *at > oldest_running);
        self.inserts_since_sweep = 0;
        self.last_sweep = now;
        expired.len()
    }

    fn fresh(&mut self, key: &str) -> Option<Value> {
        let expired = match self.entries.get(key) {
            Some(entry) => entry.expires_at <= Instant::now(),
            None => return None,
        };
        if expired {
            self.remove_entry(key);
            return None;
        }
        self.entries.get(key).map(|e| Arc::clone(&e.value))
    }

    fn remove_entry(&mut self, key: &str) -> bool {
        match self.entries.remove(key) {
            Some(entry) => {
                for tag in &entry.tags {
                    if let Some(keys) = self.tag_index.get_mut(tag) {
                        keys.remove(key);
                        if keys.is_empty() {
                            self.tag_index.remove(tag);
                        }
                    }
                }
                true
            }
            None => false,
        }
    }

    fn insert_entry(&mut self, key: &str, value: Value, tags: &[String], ttl: Duration) {
        self.inserts_since_sweep += 1;
        if self.inserts_since_sweep >= SWEEP_EVERY_INSERTS
            || self.last_sweep.elapsed() >= SWEEP_INTERVAL
        {
            let removed = self.sweep();
            debug!(removed = removed, remaining = self.entries.len(), "Swept expired cache entries");
        }
        self.remove_entry(key);
        for tag in tags {
            self.tag_index
                .entry(tag.clone())
                .or_default()
                .insert(key.to_string());
        }
        self.entries.insert(
            key.to_string(),
            Entry {
                value,
                tags: tags.to_vec(),
                expires_at: Instant::now() + ttl,
            },
        );
    }
}

/// Tag-keyed TTL cache with request coalescing.
///
/// Values of any `Clone + Send + Sync` type are stored type-erased and read
/// back by type; reading a key as the wrong type is a miss.
///
/// Invalidation is synchronous: when [`invalidate`](Self::invalidate)
/// returns, no entry carrying the tag remains, in-flight loads carrying it are
/// detached (their result reaches the callers already waiting but is not
/// stored), and the next `get_or_load` starts a fresh load.
#[derive(Clone, Default)]
pub struct CacheStore {
    state: Arc<Mutex<State>>,
}

impl CacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn get<T>(&self, key: &str) -> Option<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        let value = self.lock().fresh(key)?;
        value.downcast_ref::<T>().cloned()
    }

    pub fn set<T>(&self, key: &str, value: T, tags: &[String], ttl: Duration)
    where
        T: Clone + Send + Sync + 'static,
    {
        self.lock().insert_entry(key, Arc::new(value), tags, ttl);
    }

    /// Drop every entry carrying `tag`. Returns the number of entries removed.
    pub fn invalidate(&self, tag: &str) -> usize {
        let mut state = self.lock();
        let at = state.next_seq();
        state.invalidated.insert(tag.to_string(), at);

        let keys = state.tag_index.remove(tag).unwrap_or_default();
        let mut removed = 0;
        for key in &keys {
            if state.remove_entry(key) {
                removed += 1;
            }
        }

        let before = state.in_flight.len();
        state.in_flight.retain(|_, flight| !flight.tags.iter().any(|t| t == tag));
        let detached = before - state.in_flight.len();

        debug!(tag = tag, removed = removed, detached = detached, "Cache tag invalidated");
        removed
    }

    /// Sweep now instead of waiting for the next write. Returns the number
    /// of expired entries removed.
    pub fn purge_expired(&self) -> usize {
        self.lock().sweep()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Return the cached value, or run `loader` once for all concurrent callers.
    ///
    /// The loader runs in its own task, so a caller that stops waiting (for
    /// example on a timeout) does not cancel the upstream call; the result is
    /// still cached for the next reader. Loader errors reach every waiter and
    /// are not cached.
    pub async fn get_or_load<T, F, Fut>(
        &self,
        key: &str,
        tags: &[String],
        ttl: Duration,
        loader: F,
    ) -> Result<T, DataError>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, DataError>> + Send + 'static,
    {
        let rx = {
            let mut state = self.lock();
            if let Some(value) = state.fresh(key) {
                debug!(key = key, "Cache hit");
                return downcast(key, value);
            }
            let joined = state.in_flight.get(key).map(|flight| flight.rx.clone());
            if let Some(rx) = joined {
                debug!(key = key, "Joining in-flight load");
                rx
            } else {
                debug!(key = key, "Cache miss, loading");
                let id = state.next_seq();
                state.running.insert(id);
                let (tx, rx) = watch::channel(None);
                state.in_flight.insert(
                    key.to_string(),
                    InFlight {
                        id,
                        tags: tags.to_vec(),
                        rx: rx.clone(),
                    },
                );

                let guard = LoadGuard {
                    store: self.clone(),
                    key: key.to_string(),
                    tags: tags.to_vec(),
                    id,
                    completed: false,
                };
                tokio::spawn(async move {
                    let outcome = loader().await.map(|v| Arc::new(v) as Value);
                    guard.complete(&outcome, ttl);
                    let _ = tx.send(Some(outcome));
                });
                rx
            }
        };

        let value = wait_for(rx).await?;
        downcast(key, value)
    }
}

fn downcast<T: Clone + 'static>(key: &str, value: Value) -> Result<T, DataError> {
    value
        .downcast_ref::<T>()
        .cloned()
        .ok_or_else(|| DataError::Schema(format!("cache key {} holds a different type", key)))
}

async fn wait_for(mut rx: watch::Receiver<Option<LoadOutcome>>) -> LoadOutcome {
    loop {
        let current = rx.borrow_and_update().clone();
        if let Some(outcome) = current {
            return outcome;
        }
        if rx.changed().await.is_err() {
            let last = rx.borrow().clone();
            return last.unwrap_or_else(|| Err(DataError::Upstream("cache load aborted".to_string())));
        }
    }
}

/// Owns the in-flight registration of one load. Storing the result and
/// clearing the registration happen under one lock; if the load task panics
/// the registration is cleared on drop and waiters see the channel close.
struct LoadGuard {
    store: CacheStore,
    key: String,
    tags: Vec<String>,
    id: u64,
    completed: bool,
}

impl LoadGuard {
    fn complete(mut self, outcome: &LoadOutcome, ttl: Duration) {
        let mut state = self.store.lock();
        state.running.remove(&self.id);
        if let Ok(value) = outcome {
            if state.load_is_current(self.id, &self.tags) {
                state.insert_entry(&self.key, Arc::clone(value), &self.tags, ttl);
            } else {
                debug!(key = %self.key, "Discarding load result invalidated while in flight");
            }
        }
        if state.in_flight.get(&self.key).map(|f| f.id) == Some(self.id) {
            state.in_flight.remove(&self.key);
        }
        self.completed = true;
    }
}

impl Drop for LoadGuard {
    fn drop(&mut self) {
        if self.completed {
            return;
        }
        warn!(key = %self.key, "Cache load ended without a result");
        let mut state = self.store.lock();
        state.running.remove(&self.id);
        if state.in_flight.get(&self.key).map(|f| f.id) == Some(self.id) {
            state.in_flight.remove(&self.key);
        }
    }
}
