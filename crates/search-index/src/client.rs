//! HTTP client for an Elasticsearch-compatible search index.
//!
//! Only the endpoints the sync engine needs are covered: `_bulk`,
//! `_update_by_query` and `_search`.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, error};
use reqwest::header::{HeaderValue, CONTENT_TYPE};
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use carematch_core::sync::{
    BulkItemResult, BulkOperation, BulkResponse, Script, SearchIndexClientTrait,
    UpdateByQueryRequest, UpdateByQueryResponse,
};

use crate::config::SearchIndexConfig;
use crate::error::{Result, SearchIndexError};

const MAX_LOG_BODY_CHARS: usize = 512;
const NDJSON: &str = "application/x-ndjson";

/// A document returned by `_search`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SearchHit {
    #[serde(rename = "_index")]
    pub index: String,
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_source", default)]
    pub source: Map<String, Value>,
}

/// Script applied to one document through `_bulk`, possibly in another index.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptedUpdate {
    pub index: String,
    pub id: String,
    pub script: Script,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: Value,
}

#[derive(Debug, Deserialize)]
struct RawBulkResponse {
    #[serde(default)]
    took: u64,
    #[serde(default)]
    errors: bool,
    #[serde(default)]
    items: Vec<HashMap<String, RawBulkItem>>,
}

#[derive(Debug, Deserialize)]
struct RawBulkItem {
    #[serde(rename = "_id", default)]
    id: Option<String>,
    #[serde(default)]
    status: u16,
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct RawSearchResponse {
    hits: RawHits,
}

#[derive(Debug, Deserialize)]
struct RawHits {
    #[serde(default)]
    hits: Vec<SearchHit>,
}

impl From<RawBulkResponse> for BulkResponse {
    fn from(raw: RawBulkResponse) -> Self {
        let items = raw
            .items
            .into_iter()
            .flat_map(|entry| {
                entry.into_iter().map(|(action, item)| BulkItemResult {
                    action,
                    id: item.id.unwrap_or_default(),
                    status: item.status,
                    result: item.result,
                    error: item.error,
                })
            })
            .collect();
        BulkResponse {
            took: raw.took,
            errors: raw.errors,
            items,
        }
    }
}

fn script_body(script: &Script) -> Value {
    let mut body = Map::new();
    body.insert("source".to_string(), Value::String(script.source.clone()));
    body.insert("lang".to_string(), Value::String("painless".to_string()));
    if !script.params.is_empty() {
        body.insert("params".to_string(), Value::Object(script.params.clone()));
    }
    Value::Object(body)
}

fn push_line(body: &mut String, value: &Value) -> Result<()> {
    body.push_str(&serde_json::to_string(value)?);
    body.push('\n');
    Ok(())
}

/// Encodes user index writes as a `_bulk` NDJSON body.
///
/// Upserts become partial `update`s with `doc_as_upsert`, plain writes
/// replace the whole document.
pub fn encode_bulk(operations: &[BulkOperation]) -> Result<String> {
    let mut body = String::new();
    for operation in operations {
        match operation {
            BulkOperation::Index {
                id,
                document,
                upsert: true,
                retry_on_conflict,
            } => {
                push_line(
                    &mut body,
                    &json!({"update": {"_id": id, "retry_on_conflict": retry_on_conflict}}),
                )?;
                push_line(&mut body, &json!({"doc": document, "doc_as_upsert": true}))?;
            }
            BulkOperation::Index {
                id,
                document,
                upsert: false,
                ..
            } => {
                push_line(&mut body, &json!({"index": {"_id": id}}))?;
                push_line(&mut body, document)?;
            }
            BulkOperation::Delete { id } => {
                push_line(&mut body, &json!({"delete": {"_id": id}}))?;
            }
        }
    }
    Ok(body)
}

/// Encodes scripted updates that each name their own index.
pub fn encode_scripted_updates(updates: &[ScriptedUpdate]) -> Result<String> {
    let mut body = String::new();
    for update in updates {
        push_line(
            &mut body,
            &json!({"update": {"_index": update.index, "_id": update.id}}),
        )?;
        push_line(&mut body, &json!({"script": script_body(&update.script)}))?;
    }
    Ok(body)
}

fn index_path(index: &str) -> Result<String> {
    let index = index.trim();
    if index.is_empty() {
        return Err(SearchIndexError::invalid_request("index name is empty"));
    }
    Ok(urlencoding::encode(index).into_owned())
}

/// Client for the search index REST API.
#[derive(Debug, Clone)]
pub struct ElasticClient {
    client: reqwest::Client,
    base_url: String,
    username: Option<String>,
    password: Option<String>,
}

impl ElasticClient {
    fn log_response(status: reqwest::StatusCode, body: &str) {
        if status.is_success() {
            debug!("[SearchIndex] response status: {}", status);
            return;
        }

        let mut preview = body.chars().take(MAX_LOG_BODY_CHARS).collect::<String>();
        if body.chars().count() > MAX_LOG_BODY_CHARS {
            preview.push_str("...");
        }
        debug!("[SearchIndex] response error ({}): {}", status, preview);
    }

    pub fn new(config: &SearchIndexConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path_and_query: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/{}", self.base_url, path_and_query);
        let builder = self.client.request(method, url);
        match &self.username {
            Some(username) => builder.basic_auth(username, self.password.as_deref()),
            None => builder,
        }
    }

    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T> {
        let status = response.status();
        let body = response.text().await?;
        Self::log_response(status, &body);

        if !status.is_success() {
            if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(&body) {
                let reason = envelope
                    .error
                    .get("reason")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| envelope.error.to_string());
                return Err(SearchIndexError::api(status.as_u16(), reason));
            }
            return Err(SearchIndexError::api(
                status.as_u16(),
                format!("Request failed: {}", body),
            ));
        }

        serde_json::from_str(&body).map_err(|e| {
            error!("[SearchIndex] failed to deserialize response: {}", e);
            SearchIndexError::api(status.as_u16(), format!("Failed to parse response: {}", e))
        })
    }

    async fn post_ndjson<T: serde::de::DeserializeOwned>(
        &self,
        path_and_query: &str,
        body: String,
    ) -> Result<T> {
        let response = self
            .request(Method::POST, path_and_query)
            .header(CONTENT_TYPE, HeaderValue::from_static(NDJSON))
            .body(body)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// POST /{index}/_bulk?refresh=true|false
    pub async fn send_bulk(
        &self,
        index: &str,
        operations: &[BulkOperation],
        refresh: bool,
    ) -> Result<BulkResponse> {
        if operations.is_empty() {
            return Ok(BulkResponse::default());
        }
        let path = format!("{}/_bulk?refresh={}", index_path(index)?, refresh);
        debug!(
            "[SearchIndex] bulk of {} operation(s) to '{}'",
            operations.len(),
            index
        );

        let raw: RawBulkResponse = self.post_ndjson(&path, encode_bulk(operations)?).await?;
        Ok(raw.into())
    }

    /// POST /_bulk with scripted updates addressed to their own indices.
    pub async fn send_scripted_updates(
        &self,
        updates: &[ScriptedUpdate],
        refresh: bool,
    ) -> Result<BulkResponse> {
        if updates.is_empty() {
            return Ok(BulkResponse::default());
        }
        let path = format!("_bulk?refresh={}", refresh);
        let raw: RawBulkResponse = self
            .post_ndjson(&path, encode_scripted_updates(updates)?)
            .await?;
        Ok(raw.into())
    }

    /// POST /{index}/_update_by_query?conflicts=..&refresh=..
    pub async fn send_update_by_query(
        &self,
        index: &str,
        request: &UpdateByQueryRequest,
    ) -> Result<UpdateByQueryResponse> {
        let path = format!(
            "{}/_update_by_query?conflicts={}&refresh={}",
            index_path(index)?,
            request.conflicts.as_str(),
            request.refresh
        );
        debug!("[SearchIndex] update_by_query on '{}'", index);

        let response = self
            .request(Method::POST, &path)
            .json(&json!({
                "query": request.query,
                "script": script_body(&request.script),
            }))
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// POST /{index}/_search, returning the hits of one page.
    pub async fn search(
        &self,
        index: &str,
        query: &Value,
        from: usize,
        size: usize,
    ) -> Result<Vec<SearchHit>> {
        let path = format!("{}/_search", index_path(index)?);
        let response = self
            .request(Method::POST, &path)
            .json(&json!({
                "from": from,
                "size": size,
                "sort": ["_doc"],
                "query": query,
            }))
            .send()
            .await?;

        let raw: RawSearchResponse = Self::parse_response(response).await?;
        Ok(raw.hits.hits)
    }
}

#[async_trait]
impl SearchIndexClientTrait for ElasticClient {
    async fn bulk(
        &self,
        index: &str,
        operations: &[BulkOperation],
        refresh: bool,
    ) -> carematch_core::Result<BulkResponse> {
        self.send_bulk(index, operations, refresh)
            .await
            .map_err(carematch_core::Error::from)
    }

    async fn update_by_query(
        &self,
        index: &str,
        request: &UpdateByQueryRequest,
    ) -> carematch_core::Result<UpdateByQueryResponse> {
        self.send_update_by_query(index, request)
            .await
            .map_err(carematch_core::Error::from)
    }
}
