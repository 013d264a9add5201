//! In-process tables standing in for the remote service.
//!
//! Used as the substitute backend in tests and for local development. It
//! evaluates structured filters, and can inject latency and failures per
//! table so retry, throttle and timeout paths can be exercised.

use std::cmp::Ordering;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::{ApiError, Fields, ListQuery, Record, RecordBackend, Sort, SortDirection};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Find,
    List,
    Update,
    Create,
}

#[derive(Default)]
struct MemoryState {
    tables: HashMap<String, Vec<Record>>,
    latency: HashMap<String, Duration>,
    failures: HashMap<String, VecDeque<ApiError>>,
    calls: HashMap<(Op, String), usize>,
    /// table -> (link field, lookup field) pairs kept in sync on every write
    mirrors: HashMap<String, Vec<(String, String)>>,
    next_id: u64,
}

impl MemoryState {
    fn apply_mirrors(&self, table: &str, fields: &mut Fields) {
        if let Some(pairs) = self.mirrors.get(table) {
            for (link, ids) in pairs {
                match fields.get(link).cloned() {
                    Some(value) => {
                        fields.insert(ids.clone(), value);
                    }
                    None => {
                        fields.remove(ids);
                    }
                }
            }
        }
    }
}

#[derive(Default)]
pub struct MemoryBackend {
    state: Mutex<MemoryState>,
    active: AtomicUsize,
    peak: AtomicUsize,
}

/// Tracks concurrently active calls for [`MemoryBackend::peak_concurrency`].
struct ActiveCall<'a> {
    backend: &'a MemoryBackend,
}

impl<'a> ActiveCall<'a> {
    fn start(backend: &'a MemoryBackend) -> Self {
        let now = backend.active.fetch_add(1, AtomicOrdering::SeqCst) + 1;
        backend.peak.fetch_max(now, AtomicOrdering::SeqCst);
        Self { backend }
    }
}

impl Drop for ActiveCall<'_> {
    fn drop(&mut self) {
        self.backend.active.fetch_sub(1, AtomicOrdering::SeqCst);
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        // A panicking test thread must not poison the fixture for the others.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Emulate a lookup column exposing the ids of a linked-record column.
    pub fn mirror_link(&self, table: &str, link: &str, ids: &str) {
        self.lock()
            .mirrors
            .entry(table.to_string())
            .or_default()
            .push((link.to_string(), ids.to_string()));
    }

    pub fn insert(&self, table: &str, mut record: Record) {
        let mut state = self.lock();
        state.apply_mirrors(table, &mut record.fields);
        let rows = state.tables.entry(table.to_string()).or_default();
        rows.retain(|r| r.id != record.id);
        rows.push(record);
    }

    /// Insert a record built from a JSON object literal.
    pub fn insert_json(&self, table: &str, id: &str, fields: Value) {
        let fields = match fields {
            Value::Object(map) => map,
            _ => Fields::new(),
        };
        self.insert(table, Record::new(id, fields));
    }

    pub fn record(&self, table: &str, id: &str) -> Option<Record> {
        self.lock()
            .tables
            .get(table)
            .and_then(|rows| rows.iter().find(|r| r.id == id).cloned())
    }

    pub fn records(&self, table: &str) -> Vec<Record> {
        self.lock().tables.get(table).cloned().unwrap_or_default()
    }

    /// Delay every call against `table`.
    pub fn set_latency(&self, table: &str, latency: Duration) {
        self.lock().latency.insert(table.to_string(), latency);
    }

    /// Fail the next `times` calls against `table` with `error`.
    pub fn fail_next(&self, table: &str, error: ApiError, times: usize) {
        let mut state = self.lock();
        let queue = state.failures.entry(table.to_string()).or_default();
        for _ in 0..times {
            queue.push_back(error.clone());
        }
    }

    pub fn calls(&self, op: Op, table: &str) -> usize {
        self.lock()
            .calls
            .get(&(op, table.to_string()))
            .copied()
            .unwrap_or(0)
    }

    /// Highest number of calls observed in flight at once.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(AtomicOrdering::SeqCst)
    }

    /// Count the call and pop an injected failure, returning the configured latency.
    fn begin(&self, op: Op, table: &str) -> Result<Duration, (Duration, ApiError)> {
        let mut state = self.lock();
        *state.calls.entry((op, table.to_string())).or_insert(0) += 1;
        let latency = state.latency.get(table).copied().unwrap_or_default();
        match state.failures.get_mut(table).and_then(|q| q.pop_front()) {
            Some(error) => Err((latency, error)),
            None => Ok(latency),
        }
    }

    async fn enter(&self, op: Op, table: &str) -> Result<(), ApiError> {
        let outcome = self.begin(op, table);
        let (latency, failure) = match outcome {
            Ok(latency) => (latency, None),
            Err((latency, error)) => (latency, Some(error)),
        };
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        match failure {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}

fn sort_records(records: &mut [Record], sort: &[Sort]) {
    records.sort_by(|a, b| {
        for s in sort {
            let ord = compare_values(a.fields.get(&s.field), b.fields.get(&s.field));
            let ord = match s.direction {
                SortDirection::Asc => ord,
                SortDirection::Desc => ord.reverse(),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
}

#[async_trait]
impl RecordBackend for MemoryBackend {
    async fn find(&self, table: &str, id: &str) -> Result<Option<Record>, ApiError> {
        let _active = ActiveCall::start(self);
        self.enter(Op::Find, table).await?;
        Ok(self.record(table, id))
    }

    async fn list(&self, table: &str, query: &ListQuery) -> Result<Vec<Record>, ApiError> {
        let _active = ActiveCall::start(self);
        self.enter(Op::List, table).await?;
        let mut rows: Vec<Record> = self
            .records(table)
            .into_iter()
            .filter(|r| query.filter.as_ref().map_or(true, |f| f.matches(&r.fields)))
            .collect();
        sort_records(&mut rows, &query.sort);
        if let Some(max) = query.max_records {
            rows.truncate(max as usize);
        }
        Ok(rows)
    }

    async fn update(&self, table: &str, id: &str, fields: Fields) -> Result<Record, ApiError> {
        let _active = ActiveCall::start(self);
        self.enter(Op::Update, table).await?;
        let mut state = self.lock();
        let mut merged = state
            .tables
            .get(table)
            .and_then(|rows| rows.iter().find(|r| r.id == id))
            .map(|r| r.fields.clone())
            .ok_or_else(|| ApiError::NotFound(format!("{}/{}", table, id)))?;
        for (name, value) in fields {
            if value.is_null() {
                merged.remove(&name);
            } else {
                merged.insert(name, value);
            }
        }
        state.apply_mirrors(table, &mut merged);
        let record = state
            .tables
            .get_mut(table)
            .and_then(|rows| rows.iter_mut().find(|r| r.id == id))
            .ok_or_else(|| ApiError::NotFound(format!("{}/{}", table, id)))?;
        record.fields = merged;
        Ok(record.clone())
    }

    async fn create(&self, table: &str, fields: Fields) -> Result<Record, ApiError> {
        let _active = ActiveCall::start(self);
        self.enter(Op::Create, table).await?;
        let mut state = self.lock();
        state.next_id += 1;
        let mut fields = fields;
        state.apply_mirrors(table, &mut fields);
        let record = Record::new(format!("recMem{:06}", state.next_id), fields);
        state
            .tables
            .entry(table.to_string())
            .or_default()
            .push(record.clone());
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::Filter;
    use serde_json::json;

    #[tokio::test]
    async fn test_list_filters_and_sorts() {
        let backend = MemoryBackend::new();
        backend.insert_json("Events", "e1", json!({"Name": "B", "Capacity": 5}));
        backend.insert_json("Events", "e2", json!({"Name": "A", "Capacity": 10}));
        backend.insert_json("Events", "e3", json!({"Name": "C", "Capacity": 1}));

        let query = ListQuery::all().sort_by("Capacity", SortDirection::Desc).limit(2);
        let rows = backend.list("Events", &query).await.expect("list");
        let ids: Vec<_> = rows.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["e2", "e1"]);

        let rows = backend
            .list("Events", &ListQuery::filtered(Filter::eq("Name", "C")))
            .await
            .expect("list");
        assert_eq!(rows.len(), 1);
        assert_eq!(backend.calls(Op::List, "Events"), 2);
    }

    #[tokio::test]
    async fn test_injected_failures_are_consumed_in_order() {
        let backend = MemoryBackend::new();
        backend.insert_json("Teams", "t1", json!({"Name": "Owls"}));
        backend.fail_next("Teams", ApiError::RateLimited, 1);

        assert_eq!(backend.find("Teams", "t1").await, Err(ApiError::RateLimited));
        assert!(backend.find("Teams", "t1").await.expect("find").is_some());
        assert_eq!(backend.find("Teams", "nope").await, Ok(None));
    }

    #[tokio::test]
    async fn test_mirrored_lookup_follows_link() {
        let backend = MemoryBackend::new();
        backend.mirror_link("Participation", "Contacts", "Contact ID");
        let fields = json!({"Contacts": ["u1"]}).as_object().cloned().unwrap_or_default();
        let created = backend.create("Participation", fields).await.expect("create");
        assert_eq!(created.fields.get("Contact ID"), Some(&json!(["u1"])));

        let rows = backend
            .list("Participation", &ListQuery::filtered(Filter::contains("Contact ID", "u1")))
            .await
            .expect("list");
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn test_update_merges_and_removes_null_fields() {
        let backend = MemoryBackend::new();
        backend.insert_json("Contacts", "u1", json!({"First Name": "Ada", "Phone": "1"}));
        let updated = backend
            .update(
                "Contacts",
                "u1",
                json!({"Last Name": "Lovelace", "Phone": null}).as_object().cloned().unwrap_or_default(),
            )
            .await
            .expect("update");
        assert_eq!(updated.fields.get("Last Name"), Some(&json!("Lovelace")));
        assert!(updated.fields.get("Phone").is_none());
        assert!(matches!(
            backend.update("Contacts", "zz", Fields::new()).await,
            Err(ApiError::NotFound(_))
        ));
    }
}
