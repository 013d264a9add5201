//! In-process cache of resolved values.
//!
//! `CacheStore` holds typed values under string keys with a TTL and a set of
//! tags. Concurrent misses on one key share a single load, and a mutation
//! drops everything carrying a tag in one call. Nothing is persisted; an
//! empty cache after restart is the normal state.
//!
//! Lifetimes follow how often the underlying tables change:
//! - Slow: institutions, initiatives, cohorts, topics, classes, milestones, rewards
//! - Events
//! - Volatile: teams, points, participation, submissions, partnerships, contacts

pub mod keys;
pub mod store;

use std::time::Duration;

pub use store::CacheStore;

use crate::config::CacheTtls;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Volatility {
    Slow,
    Events,
    Volatile,
}

impl CacheTtls {
    pub fn ttl(&self, volatility: Volatility) -> Duration {
        let secs = match volatility {
            Volatility::Slow => self.slow_secs,
            Volatility::Events => self.events_secs,
            Volatility::Volatile => self.volatile_secs,
        };
        Duration::from_secs(secs)
    }
}
