//! Transport to the external tabular service.
//!
//! - `RecordBackend`: single-attempt raw I/O, implemented by `HttpBackend`
//!   (REST, bearer token) and `MemoryBackend` (in-process substitute).
//! - `TableClient`: one table, throttled, retrying on rate limits and
//!   transient failures.
//!
//! Records here are untyped field maps; the `schema` module is the only
//! place that reads them.

pub mod backend;
pub mod client;
pub mod error;
pub mod memory;
pub mod record;
pub mod table;

pub use backend::RecordBackend;
pub use client::HttpBackend;
pub use error::ApiError;
pub use memory::MemoryBackend;
pub use record::{Fields, Filter, ListQuery, Record, Sort, SortDirection};
pub use table::TableClient;
