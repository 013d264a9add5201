//! HTTP backend for the tabular REST service.
//!
//! One request per call. Retries, backoff and throttling live in
//! [`TableClient`](super::TableClient); this type only speaks the wire format.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::config::ApiConfig;

use super::{ApiError, Fields, ListQuery, Record, RecordBackend};

/// Largest page the service will return.
const PAGE_SIZE: u32 = 100;

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    records: Vec<Record>,
    offset: Option<String>,
}

/// REST client for one base.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: Url,
    api_key: Arc<String>,
}

impl HttpBackend {
    pub fn new(config: &ApiConfig) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        let mut base_url = Url::parse(&config.base_url)
            .map_err(|e| ApiError::InvalidResponse(format!("invalid base url: {}", e)))?;
        base_url
            .path_segments_mut()
            .map_err(|_| ApiError::InvalidResponse("base url cannot be a base".to_string()))?
            .pop_if_empty()
            .push(&config.base_id);

        Ok(Self {
            client,
            base_url,
            api_key: Arc::new(config.api_key.clone()),
        })
    }

    fn table_url(&self, table: &str, id: Option<&str>) -> Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| ApiError::InvalidResponse("base url cannot be a base".to_string()))?;
            segments.push(table);
            if let Some(id) = id {
                segments.push(id);
            }
        }
        Ok(url)
    }

    /// Query parameters for one page of a list call.
    fn list_params(query: &ListQuery, offset: Option<&str>) -> Vec<(String, String)> {
        let mut params = vec![("pageSize".to_string(), PAGE_SIZE.to_string())];
        if let Some(ref filter) = query.filter {
            params.push(("filterByFormula".to_string(), filter.to_formula()));
        }
        for (i, sort) in query.sort.iter().enumerate() {
            params.push((format!("sort[{}][field]", i), sort.field.clone()));
            params.push((format!("sort[{}][direction]", i), sort.direction.as_str().to_string()));
        }
        if let Some(max) = query.max_records {
            params.push(("maxRecords".to_string(), max.to_string()));
        }
        if let Some(offset) = offset {
            params.push(("offset".to_string(), offset.to_string()));
        }
        params
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, ApiError> {
        let response = request.bearer_auth(self.api_key.as_str()).send().await?;
        Self::check_response(response).await
    }
}

#[async_trait]
impl RecordBackend for HttpBackend {
    async fn find(&self, table: &str, id: &str) -> Result<Option<Record>, ApiError> {
        let url = self.table_url(table, Some(id))?;
        match self.send(self.client.get(url)).await {
            Ok(response) => Ok(Some(response.json().await?)),
            Err(ApiError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn list(&self, table: &str, query: &ListQuery) -> Result<Vec<Record>, ApiError> {
        let url = self.table_url(table, None)?;
        let mut records = Vec::new();
        let mut offset: Option<String> = None;

        loop {
            let params = Self::list_params(query, offset.as_deref());
            let response = self.send(self.client.get(url.clone()).query(&params)).await?;
            let page: ListResponse = response.json().await?;
            debug!(table = table, count = page.records.len(), "List page received");
            records.extend(page.records);

            match page.offset {
                Some(next) if query.max_records.map_or(true, |max| records.len() < max as usize) => {
                    offset = Some(next);
                }
                _ => break,
            }
        }

        Ok(records)
    }

    async fn update(&self, table: &str, id: &str, fields: Fields) -> Result<Record, ApiError> {
        let url = self.table_url(table, Some(id))?;
        let body = json!({ "fields": fields, "typecast": true });
        let response = self.send(self.client.patch(url).json(&body)).await?;
        Ok(response.json().await?)
    }

    async fn create(&self, table: &str, fields: Fields) -> Result<Record, ApiError> {
        let url = self.table_url(table, None)?;
        let body = json!({ "fields": fields, "typecast": true });
        let response = self.send(self.client.post(url).json(&body)).await?;
        Ok(response.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{Filter, SortDirection};

    fn backend() -> HttpBackend {
        let config = ApiConfig {
            base_url: "https://api.example.com/v0".to_string(),
            base_id: "appBase1".to_string(),
            api_key: "key".to_string(),
            request_timeout_secs: 5,
        };
        HttpBackend::new(&config).expect("backend builds")
    }

    #[test]
    fn test_table_url_encodes_table_names() {
        let url = backend().table_url("Claimed Rewards", Some("rec1")).expect("url");
        assert_eq!(url.as_str(), "https://api.example.com/v0/appBase1/Claimed%20Rewards/rec1");
    }

    #[test]
    fn test_list_params() {
        let query = ListQuery::filtered(Filter::eq("Status", "Active"))
            .sort_by("Start", SortDirection::Desc)
            .limit(10);
        let params = HttpBackend::list_params(&query, Some("itr1"));
        assert!(params.contains(&("filterByFormula".to_string(), "{Status} = 'Active'".to_string())));
        assert!(params.contains(&("sort[0][field]".to_string(), "Start".to_string())));
        assert!(params.contains(&("sort[0][direction]".to_string(), "desc".to_string())));
        assert!(params.contains(&("maxRecords".to_string(), "10".to_string())));
        assert!(params.contains(&("offset".to_string(), "itr1".to_string())));
    }

    #[test]
    fn test_parse_list_response() {
        let json = r#"{"records":[{"id":"rec1","createdTime":"2024-01-01T00:00:00.000Z","fields":{"Name":"Ada"}}],"offset":"itr2"}"#;
        let page: ListResponse = serde_json::from_str(json).expect("parse list page");
        assert_eq!(page.records.len(), 1);
        assert_eq!(page.records[0].id, "rec1");
        assert_eq!(page.records[0].fields.get("Name").and_then(|v| v.as_str()), Some("Ada"));
        assert_eq!(page.offset.as_deref(), Some("itr2"));
    }
}
