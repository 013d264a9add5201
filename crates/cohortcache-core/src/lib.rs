//! cohortcache-core: read-through data layer over an external tabular service.
//!
//! The service stores contacts, programs, teams, events and the points
//! ledger as rows in named tables. This crate:
//! - talks to it through a throttled, retrying client (`api`, `throttle`)
//! - maps rows to typed records (`schema`, `models`)
//! - caches resolved values under tags (`cache`)
//! - joins related reads within a fixed time budget (`resolver`)
//! - invalidates cached values and rendered pages after writes (`revalidate`)

pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod resolver;
pub mod revalidate;
pub mod schema;
pub mod throttle;

pub use api::{HttpBackend, MemoryBackend, RecordBackend, TableClient};
pub use auth::{Identity, IdentityProvider, StaticIdentity};
pub use cache::CacheStore;
pub use config::Config;
pub use error::{DataError, ValidationError};
pub use resolver::{Budget, ResolveMeta, Resolved, Resolver};
pub use revalidate::{
    EntityKind, Mutation, NoopInvalidator, PageInvalidator, RecordingInvalidator, Relation,
    RevalidationCoordinator,
};
pub use throttle::Throttler;
