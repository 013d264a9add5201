use async_trait::async_trait;

use super::{ApiError, Fields, ListQuery, Record};

/// Single-attempt access to the tables of one base.
///
/// `find` maps a missing record to `Ok(None)`; every other failure is an
/// [`ApiError`]. Implementations must not retry.
#[async_trait]
pub trait RecordBackend: Send + Sync {
    async fn find(&self, table: &str, id: &str) -> Result<Option<Record>, ApiError>;

    async fn list(&self, table: &str, query: &ListQuery) -> Result<Vec<Record>, ApiError>;

    async fn update(&self, table: &str, id: &str, fields: Fields) -> Result<Record, ApiError>;

    async fn create(&self, table: &str, fields: Fields) -> Result<Record, ApiError>;
}
