//! Domain-level reads and writes over the remote tables.
//!
//! Reads go through the [`CacheStore`] and run under the read budget: when
//! the upstream is slow or failing they return a [`Resolved`] whose data is
//! empty or partial and whose metadata says what is missing. Mutations check
//! their preconditions against freshly read state, write, and revalidate
//! before returning; they run under the mutation budget and surface a
//! timeout as an error.
//!
//! Operations are split by entity across the submodules, each adding an
//! `impl Resolver` block.

mod contact;
mod event;
mod institution;
pub mod join;
mod participation;
mod partnership;
mod points;
mod program;
mod submission;
mod team;

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use tokio::sync::OwnedMutexGuard;
use tracing::{info, warn};

use crate::api::{ListQuery, RecordBackend, TableClient};
use crate::cache::keys;
use crate::cache::{CacheStore, Volatility};
use crate::config::{CacheTtls, Config, RetryConfig, TableNames, TimeoutConfig};
use crate::error::DataError;
use crate::revalidate::{Mutation, PageInvalidator, Revalidation, RevalidationCoordinator};
use crate::schema::{map_records, FromRecord, NamedRecord};
use crate::throttle::Throttler;

pub use join::{join_within, Budget, ResolveMeta, Resolved};

/// One client per table, all sharing the backend and the throttler.
pub struct Tables {
    pub contacts: TableClient,
    pub institutions: TableClient,
    pub initiatives: TableClient,
    pub cohorts: TableClient,
    pub topics: TableClient,
    pub classes: TableClient,
    pub teams: TableClient,
    pub members: TableClient,
    pub participation: TableClient,
    pub submissions: TableClient,
    pub milestones: TableClient,
    pub events: TableClient,
    pub partnerships: TableClient,
    pub rewards: TableClient,
    pub claimed_rewards: TableClient,
    pub achievements: TableClient,
}

impl Tables {
    pub fn new(
        backend: Arc<dyn RecordBackend>,
        throttler: &Throttler,
        names: &TableNames,
        retry: &RetryConfig,
    ) -> Self {
        let client = |name: &str| {
            TableClient::new(Arc::clone(&backend), throttler.clone(), name, retry.clone())
        };
        Self {
            contacts: client(&names.contacts),
            institutions: client(&names.institutions),
            initiatives: client(&names.initiatives),
            cohorts: client(&names.cohorts),
            topics: client(&names.topics),
            classes: client(&names.classes),
            teams: client(&names.teams),
            members: client(&names.members),
            participation: client(&names.participation),
            submissions: client(&names.submissions),
            milestones: client(&names.milestones),
            events: client(&names.events),
            partnerships: client(&names.partnerships),
            rewards: client(&names.rewards),
            claimed_rewards: client(&names.claimed_rewards),
            achievements: client(&names.achievements),
        }
    }
}

/// Serialises read-check-write sequences on one resource within the process.
#[derive(Clone, Default)]
struct MutationLocks {
    locks: Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
}

impl MutationLocks {
    async fn lock(&self, key: String) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            Arc::clone(locks.entry(key).or_default())
        };
        lock.lock_owned().await
    }
}

/// The entity resolver. Clone is cheap and clones share cache and throttle.
#[derive(Clone)]
pub struct Resolver {
    tables: Arc<Tables>,
    cache: CacheStore,
    revalidator: RevalidationCoordinator,
    ttls: CacheTtls,
    timeouts: TimeoutConfig,
    locks: MutationLocks,
}

impl Resolver {
    pub fn new(
        config: &Config,
        backend: Arc<dyn RecordBackend>,
        invalidator: Arc<dyn PageInvalidator>,
    ) -> Self {
        let throttler = Throttler::new(&config.throttle);
        let tables = Tables::new(backend, &throttler, &config.tables, &config.retry);
        let cache = CacheStore::new();
        Self {
            tables: Arc::new(tables),
            revalidator: RevalidationCoordinator::new(cache.clone(), invalidator),
            cache,
            ttls: config.cache.clone(),
            timeouts: config.timeouts.clone(),
            locks: MutationLocks::default(),
        }
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    pub fn tables(&self) -> &Tables {
        &self.tables
    }

    // ========================================================================
    // Read plumbing
    // ========================================================================

    /// Run a read under the read budget, degrading to `T::default()` when
    /// it fails or runs out of time.
    async fn read<T, F, Fut>(&self, operation: &str, body: F) -> Resolved<T>
    where
        T: Default,
        F: FnOnce(Budget) -> Fut,
        Fut: Future<Output = Result<Resolved<T>, DataError>>,
    {
        let budget = Budget::start(self.timeouts.read_budget());
        match budget.run(operation, body(budget)).await {
            Ok(resolved) => {
                if resolved.is_degraded() {
                    warn!(
                        operation = operation,
                        missing = ?resolved.meta.missing,
                        "Returning partial result"
                    );
                }
                resolved
            }
            Err(e) => {
                warn!(operation = operation, error = %e, "Read degraded to empty result");
                Resolved::degraded(T::default(), operation, &e)
            }
        }
    }

    /// One record by id through the cache, tagged `<entity>` and `<entity>-<id>`.
    async fn cached_find<T>(
        &self,
        table: &TableClient,
        entity: &'static str,
        id: &str,
        volatility: Volatility,
    ) -> Result<Option<T>, DataError>
    where
        T: FromRecord + Clone + Send + Sync + 'static,
    {
        let client = table.clone();
        let owned = id.to_string();
        self.cache
            .get_or_load(
                &keys::key(entity, id),
                &[entity.to_string(), keys::entity_tag(entity, id)],
                self.ttls.ttl(volatility),
                move || async move {
                    match client.find(&owned).await? {
                        Some(record) => T::from_record(&record).map(Some),
                        None => Ok(None),
                    }
                },
            )
            .await
    }

    async fn cached_list<T>(
        &self,
        table: &TableClient,
        key: String,
        tags: Vec<String>,
        query: ListQuery,
        volatility: Volatility,
    ) -> Result<Vec<T>, DataError>
    where
        T: FromRecord + Clone + Send + Sync + 'static,
    {
        let client = table.clone();
        self.cache
            .get_or_load(&key, &tags, self.ttls.ttl(volatility), move || async move {
                let records = client.list(&query).await?;
                map_records(&records)
            })
            .await
    }

    /// Names for a list of lookup-table ids, skipping the ones that could
    /// not be resolved in time.
    async fn names_for(
        &self,
        table: &TableClient,
        entity: &'static str,
        ids: &[String],
        budget: Budget,
    ) -> Resolved<Vec<(String, String)>> {
        let pieces = ids
            .iter()
            .map(|id| {
                let label = format!("{} {}", entity, id);
                (label, self.cached_find::<NamedRecord>(table, entity, id, Volatility::Slow))
            })
            .collect();

        let mut meta = ResolveMeta::default();
        let mut names = Vec::new();
        for (id, (label, outcome)) in ids.iter().zip(join_within(budget, pieces).await) {
            match outcome {
                Ok(Some(named)) => names.push((named.id, named.name)),
                Ok(None) => meta.note(&label, &DataError::not_found(entity, id.as_str())),
                Err(e) => meta.note(&label, &e),
            }
        }
        Resolved::with_meta(names, meta)
    }

    // ========================================================================
    // Write plumbing
    // ========================================================================

    /// Run a mutation under the mutation budget.
    ///
    /// The body runs in its own task, so a caller that times out does not
    /// cut it off between the write and the revalidation.
    async fn mutate<T, Fut>(&self, operation: &'static str, body: Fut) -> Result<T, DataError>
    where
        T: Send + 'static,
        Fut: Future<Output = Result<T, DataError>> + Send + 'static,
    {
        let budget = self.timeouts.mutation_budget();
        let handle = tokio::spawn(body);
        match tokio::time::timeout(budget, handle).await {
            Ok(Ok(outcome)) => {
                if let Err(e) = &outcome {
                    info!(operation = operation, error = %e, "Mutation rejected");
                }
                outcome
            }
            Ok(Err(join_error)) => Err(DataError::Upstream(format!(
                "{} failed: {}",
                operation, join_error
            ))),
            Err(_) => {
                warn!(operation = operation, budget_ms = budget.as_millis() as u64, "Mutation timed out");
                Err(DataError::Timeout {
                    operation: operation.to_string(),
                    budget_ms: budget.as_millis() as u64,
                })
            }
        }
    }

    /// Read a record straight from the table for a precondition check.
    async fn fresh<T: FromRecord>(&self, table: &TableClient, id: &str) -> Result<T, DataError> {
        match table.find(id).await? {
            Some(record) => T::from_record(&record),
            None => Err(DataError::not_found(T::ENTITY, id)),
        }
    }

    async fn fresh_list<T: FromRecord>(
        &self,
        table: &TableClient,
        query: &ListQuery,
    ) -> Result<Vec<T>, DataError> {
        let records = table.list(query).await?;
        map_records(&records)
    }

    fn revalidate(&self, mutation: Mutation) -> Revalidation {
        self.revalidator.on_mutation(&mutation)
    }
}

/// Reject blank required text.
fn required(value: &str, field: &'static str) -> Result<(), DataError> {
    if value.trim().is_empty() {
        Err(crate::error::ValidationError::MissingField(field).into())
    } else {
        Ok(())
    }
}
