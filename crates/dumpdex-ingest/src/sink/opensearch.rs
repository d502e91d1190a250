//! OpenSearch / Elasticsearch `_bulk` sink

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use super::{BulkResult, IndexSink, ItemError, ItemOutcome, SinkError};
use crate::schema::Record;

/// Connection settings for the search cluster
#[derive(Debug, Clone)]
pub struct OpenSearchConfig {
    /// Base URL, e.g. `https://localhost:9200`
    pub url: String,
    /// Target index name
    pub index: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Skip TLS certificate verification (self-signed dev clusters)
    pub accept_invalid_certs: bool,
    /// Per-request timeout; a timed-out bulk call counts as a failed batch
    pub timeout: Duration,
}

/// Bulk sink that writes every record as an `index` action
pub struct OpenSearchSink {
    http: reqwest::Client,
    config: OpenSearchConfig,
}

impl OpenSearchSink {
    pub fn new(config: OpenSearchConfig) -> Result<Self, SinkError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(Duration::from_secs(10))
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .user_agent(concat!("dumpdex/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { http, config })
    }

    pub fn config(&self) -> &OpenSearchConfig {
        &self.config
    }

    fn base_url(&self) -> &str {
        self.config.url.trim_end_matches('/')
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.username {
            Some(username) => request.basic_auth(username, self.config.password.as_deref()),
            None => request,
        }
    }

    /// Check that the cluster answers on its root endpoint
    pub async fn healthcheck(&self) -> Result<(), SinkError> {
        let response = self
            .authorize(self.http.get(format!("{}/", self.base_url())))
            .send()
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(SinkError::Status { status, body })
        }
    }

    /// NDJSON body: one action line, then the document, per record
    pub fn bulk_body(&self, records: &[Record]) -> Result<String, SinkError> {
        let action = serde_json::to_string(&json!({ "index": { "_index": self.config.index } }))?;
        let mut body = String::with_capacity(records.len() * 256);

        for record in records {
            body.push_str(&action);
            body.push('\n');
            body.push_str(&serde_json::to_string(record)?);
            body.push('\n');
        }

        Ok(body)
    }
}

#[derive(Debug, Deserialize)]
struct BulkResponse {
    #[serde(default)]
    errors: bool,
    #[serde(default)]
    items: Vec<HashMap<String, BulkResponseItem>>,
}

#[derive(Debug, Deserialize)]
struct BulkResponseItem {
    #[serde(rename = "_id")]
    id: Option<String>,
    status: Option<u16>,
    error: Option<Value>,
}

impl BulkResponseItem {
    fn into_outcome(self) -> ItemOutcome {
        let failed_status = self.status.is_some_and(|s| s >= 300);
        match (self.error, failed_status) {
            (None, false) => ItemOutcome::Indexed,
            (error, _) => ItemOutcome::Rejected(ItemError {
                reason: error
                    .as_ref()
                    .map(error_reason)
                    .unwrap_or_else(|| format!("status {}", self.status.unwrap_or_default())),
                doc_id: self.id,
            }),
        }
    }
}

fn error_reason(error: &Value) -> String {
    match error {
        Value::String(reason) => reason.clone(),
        Value::Object(fields) => fields
            .get("reason")
            .or_else(|| fields.get("type"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string()),
        other => other.to_string(),
    }
}

#[async_trait]
impl IndexSink for OpenSearchSink {
    async fn bulk_write(&mut self, records: &[Record]) -> Result<BulkResult, SinkError> {
        if records.is_empty() {
            return Ok(BulkResult::default());
        }

        let body = self.bulk_body(records)?;
        let response = self
            .authorize(self.http.post(format!("{}/_bulk", self.base_url())))
            .header(CONTENT_TYPE, "application/x-ndjson")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SinkError::Status { status, body });
        }

        let bytes = response.bytes().await?;
        let parsed: BulkResponse = serde_json::from_slice(&bytes)?;
        debug!(
            items = parsed.items.len(),
            errors = parsed.errors,
            "Bulk response received"
        );

        let items = parsed
            .items
            .into_iter()
            .map(|mut action| match action.drain().next() {
                Some((_, item)) => item.into_outcome(),
                None => ItemOutcome::Rejected(ItemError {
                    reason: "empty bulk response item".to_string(),
                    doc_id: None,
                }),
            })
            .collect();

        Ok(BulkResult { items })
    }

    fn describe(&self) -> String {
        format!("opensearch {} index {}", self.base_url(), self.config.index)
    }
}
