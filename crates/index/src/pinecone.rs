//! Pinecone vector store.
//!
//! Control plane (`https://api.pinecone.io`): list, describe, create and
//! delete indexes. Data plane (`https://<index host>`): stats, upsert and
//! query. Both authenticate with the `Api-Key` header.

use crate::store::VectorStore;
use crate::types::{
    IndexDescription, IndexHandle, IndexSpec, IndexStats, Metric, QueryMatch, UpsertRecord,
};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, instrument, warn};
use vecquery_core::retry::{backoff_delay, is_retryable_status};
use vecquery_core::{ApiKey, AppError, AppResult};

const DEFAULT_CONTROLLER_URL: &str = "https://api.pinecone.io";
const API_VERSION: &str = "2024-07";

/// Pinecone rejects upsert requests larger than this many vectors
const MAX_UPSERT_BATCH: usize = 100;

const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Attempts per request, first one included
const MAX_ATTEMPTS: u32 = 3;

/// Pinecone-backed [`VectorStore`].
#[derive(Debug, Clone)]
pub struct PineconeStore {
    client: Client,
    controller_url: String,
    api_key: ApiKey,
}

#[derive(Debug, Deserialize)]
struct ListIndexesResponse {
    #[serde(default)]
    indexes: Vec<IndexModel>,
}

#[derive(Debug, Deserialize)]
struct IndexModel {
    name: String,
    dimension: usize,
    metric: Metric,
    #[serde(default)]
    host: Option<String>,
    #[serde(default)]
    status: Option<IndexStatus>,
}

#[derive(Debug, Deserialize)]
struct IndexStatus {
    #[serde(default)]
    ready: bool,
}

impl From<IndexModel> for IndexDescription {
    fn from(model: IndexModel) -> Self {
        Self {
            name: model.name,
            dimension: model.dimension,
            metric: model.metric,
            host: model.host.filter(|h| !h.is_empty()),
            ready: model.status.map(|s| s.ready).unwrap_or(false),
        }
    }
}

#[derive(Debug, Serialize)]
struct CreateIndexRequest<'a> {
    name: &'a str,
    dimension: usize,
    metric: Metric,
    spec: CreateSpec<'a>,
}

#[derive(Debug, Serialize)]
struct CreateSpec<'a> {
    serverless: ServerlessSpec<'a>,
}

#[derive(Debug, Serialize)]
struct ServerlessSpec<'a> {
    cloud: &'a str,
    region: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatsResponse {
    #[serde(default)]
    namespaces: BTreeMap<String, NamespaceSummary>,
    #[serde(default)]
    dimension: usize,
    #[serde(default)]
    index_fullness: f32,
    #[serde(default)]
    total_vector_count: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NamespaceSummary {
    #[serde(default)]
    vector_count: u64,
}

impl From<StatsResponse> for IndexStats {
    fn from(resp: StatsResponse) -> Self {
        Self {
            total_vector_count: resp.total_vector_count,
            dimension: resp.dimension,
            index_fullness: resp.index_fullness,
            namespaces: resp
                .namespaces
                .into_iter()
                .map(|(name, summary)| (name, summary.vector_count))
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
struct UpsertRequest<'a> {
    vectors: &'a [UpsertRecord],
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpsertResponse {
    #[serde(default)]
    upserted_count: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    vector: &'a [f32],
    top_k: usize,
    include_metadata: bool,
    include_values: bool,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<QueryMatch>,
}

impl PineconeStore {
    /// Create a store talking to `controller_url` (default `https://api.pinecone.io`).
    pub fn new(api_key: ApiKey, controller_url: Option<&str>) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| AppError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            controller_url: controller_url
                .unwrap_or(DEFAULT_CONTROLLER_URL)
                .trim_end_matches('/')
                .to_string(),
            api_key,
        })
    }

    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("Api-Key", self.api_key.expose())
            .header("X-Pinecone-API-Version", API_VERSION)
    }

    fn data_url(&self, handle: &IndexHandle, path: &str) -> AppResult<String> {
        let host = handle.host.as_deref().ok_or_else(|| {
            AppError::Index(format!("Index '{}' has no data plane host yet", handle.name))
        })?;
        Ok(format!("{}{}", host_base(host), path))
    }

    /// Send with bounded retry on connect errors, timeouts, 429 and 5xx.
    ///
    /// The final response is returned whatever its status, so callers still
    /// map Pinecone's error body themselves.
    async fn send(&self, request: RequestBuilder, action: &str) -> AppResult<Response> {
        let request = self.authed(request);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let this_try = request.try_clone().ok_or_else(|| {
                AppError::Index(format!("Failed to {}: request cannot be retried", action))
            })?;
            let last = attempt >= MAX_ATTEMPTS;

            match this_try.send().await {
                Ok(response) if !last && is_retryable_status(response.status().as_u16()) => {
                    warn!(
                        "Pinecone {} returned {} (attempt {}/{}); retrying",
                        action,
                        response.status(),
                        attempt,
                        MAX_ATTEMPTS
                    );
                }
                Ok(response) => return Ok(response),
                Err(e) if !last && is_transient(&e) => {
                    warn!(
                        "Failed to {} (attempt {}/{}): {}; retrying",
                        action, attempt, MAX_ATTEMPTS, e
                    );
                }
                Err(e) => return Err(AppError::Index(format!("Failed to {}: {}", action, e))),
            }

            tokio::time::sleep(backoff_delay(attempt)).await;
        }
    }
}

fn is_transient(error: &reqwest::Error) -> bool {
    error.is_connect() || error.is_timeout()
}

/// Hosts come back without a scheme; local emulators may include one.
fn host_base(host: &str) -> String {
    let host = host.trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{}", host)
    }
}

/// Turn a non-success response into an error carrying Pinecone's message.
async fn error_for(response: Response, action: &str) -> AppError {
    let status = response.status();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    AppError::Index(format!(
        "Pinecone {} failed ({}): {}",
        action,
        status,
        error_message(&body)
    ))
}

fn error_message(body: &str) -> String {
    #[derive(Deserialize)]
    struct Envelope {
        error: Option<Inner>,
        message: Option<String>,
    }
    #[derive(Deserialize)]
    struct Inner {
        message: String,
    }

    match serde_json::from_str::<Envelope>(body) {
        Ok(Envelope {
            error: Some(inner), ..
        }) => inner.message,
        Ok(Envelope {
            message: Some(message),
            ..
        }) => message,
        _ => body.trim().to_string(),
    }
}

async fn parse_json<T: serde::de::DeserializeOwned>(response: Response, action: &str) -> AppResult<T> {
    response
        .json()
        .await
        .map_err(|e| AppError::Index(format!("Failed to parse Pinecone {} response: {}", action, e)))
}

#[async_trait::async_trait]
impl VectorStore for PineconeStore {
    fn backend_name(&self) -> &str {
        "pinecone"
    }

    #[instrument(skip(self))]
    async fn list_indexes(&self) -> AppResult<Vec<IndexDescription>> {
        let url = format!("{}/indexes", self.controller_url);
        let response = self.send(self.client.get(&url), "list indexes").await?;

        if !response.status().is_success() {
            return Err(error_for(response, "list indexes").await);
        }

        let list: ListIndexesResponse = parse_json(response, "list indexes").await?;
        Ok(list.indexes.into_iter().map(IndexDescription::from).collect())
    }

    #[instrument(skip(self))]
    async fn describe_index(&self, name: &str) -> AppResult<Option<IndexDescription>> {
        let url = format!("{}/indexes/{}", self.controller_url, name);
        let response = self.send(self.client.get(&url), "describe index").await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let model: IndexModel = parse_json(response, "describe index").await?;
                Ok(Some(model.into()))
            }
            _ => Err(error_for(response, "describe index").await),
        }
    }

    #[instrument(skip(self, spec), fields(index = %spec.name, dimension = spec.dimension))]
    async fn create_index(&self, spec: &IndexSpec) -> AppResult<()> {
        let url = format!("{}/indexes", self.controller_url);
        let body = CreateIndexRequest {
            name: &spec.name,
            dimension: spec.dimension,
            metric: spec.metric,
            spec: CreateSpec {
                serverless: ServerlessSpec {
                    cloud: &spec.cloud,
                    region: &spec.region,
                },
            },
        };

        let response = self
            .send(self.client.post(&url).json(&body), "create index")
            .await?;

        match response.status() {
            // Another creator won the race; the listing decides from here
            StatusCode::CONFLICT => {
                debug!("Index '{}' already exists", spec.name);
                Ok(())
            }
            status if status.is_success() => {
                debug!("Create request accepted for index '{}'", spec.name);
                Ok(())
            }
            _ => Err(error_for(response, "create index").await),
        }
    }

    #[instrument(skip(self))]
    async fn delete_index(&self, name: &str) -> AppResult<()> {
        let url = format!("{}/indexes/{}", self.controller_url, name);
        let response = self.send(self.client.delete(&url), "delete index").await?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(AppError::IndexNotFound(name.to_string())),
            status if status.is_success() => Ok(()),
            _ => Err(error_for(response, "delete index").await),
        }
    }

    #[instrument(skip(self, handle), fields(index = %handle.name))]
    async fn describe_stats(&self, handle: &IndexHandle) -> AppResult<IndexStats> {
        let url = self.data_url(handle, "/describe_index_stats")?;
        let response = self
            .send(
                self.client.post(&url).json(&serde_json::json!({})),
                "describe index stats",
            )
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(AppError::IndexNotFound(handle.name.clone()));
        }
        if !response.status().is_success() {
            return Err(error_for(response, "describe index stats").await);
        }

        let stats: StatsResponse = parse_json(response, "describe index stats").await?;
        Ok(stats.into())
    }

    #[instrument(skip(self, handle, records), fields(index = %handle.name, count = records.len()))]
    async fn upsert(&self, handle: &IndexHandle, records: &[UpsertRecord]) -> AppResult<usize> {
        let url = self.data_url(handle, "/vectors/upsert")?;
        let mut upserted = 0;

        for batch in records.chunks(MAX_UPSERT_BATCH) {
            let response = self
                .send(
                    self.client.post(&url).json(&UpsertRequest { vectors: batch }),
                    "upsert vectors",
                )
                .await?;

            if !response.status().is_success() {
                return Err(error_for(response, "upsert").await);
            }

            let body: UpsertResponse = parse_json(response, "upsert").await?;
            upserted += body.upserted_count;
        }

        debug!("Upserted {} vectors into '{}'", upserted, handle.name);
        Ok(upserted)
    }

    #[instrument(skip(self, handle, vector), fields(index = %handle.name))]
    async fn query(
        &self,
        handle: &IndexHandle,
        vector: &[f32],
        top_k: usize,
    ) -> AppResult<Vec<QueryMatch>> {
        let url = self.data_url(handle, "/query")?;
        let body = QueryRequest {
            vector,
            top_k,
            include_metadata: true,
            include_values: false,
        };

        let response = self
            .send(self.client.post(&url).json(&body), "query index")
            .await?;

        if !response.status().is_success() {
            return Err(error_for(response, "query").await);
        }

        let result: QueryResponse = parse_json(response, "query").await?;
        Ok(result.matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use vecquery_core::testing::StubServer;

    const LISTING: &str = r#"{"indexes":[{"name":"article-index","dimension":1536,"metric":"cosine",
        "host":"article-index-x.svc.pinecone.io","status":{"ready":true,"state":"Ready"}}]}"#;

    /// Fails the first `failures` requests with `status`, then serves `body`.
    async fn flaky_server(failures: usize, status: u16, body: &'static str) -> StubServer {
        let calls = Arc::new(AtomicUsize::new(0));
        StubServer::start(move |_| {
            if calls.fetch_add(1, Ordering::SeqCst) < failures {
                (status, r#"{"error":{"message":"try again"}}"#.to_string())
            } else {
                (200, body.to_string())
            }
        })
        .await
        .unwrap()
    }

    fn store() -> PineconeStore {
        PineconeStore::new(ApiKey::new("pc-test"), None).unwrap()
    }

    #[test]
    fn test_store_creation() {
        let store = store();
        assert_eq!(store.backend_name(), "pinecone");
        assert_eq!(store.controller_url, "https://api.pinecone.io");

        let local = PineconeStore::new(ApiKey::new("k"), Some("http://localhost:5080/")).unwrap();
        assert_eq!(local.controller_url, "http://localhost:5080");
    }

    #[test]
    fn test_host_base() {
        assert_eq!(
            host_base("article-index-abc.svc.aped-4627-b74a.pinecone.io"),
            "https://article-index-abc.svc.aped-4627-b74a.pinecone.io"
        );
        assert_eq!(host_base("http://localhost:5081/"), "http://localhost:5081");
    }

    #[test]
    fn test_data_url_requires_host() {
        let handle = IndexHandle {
            name: "article-index".to_string(),
            dimension: 1536,
            metric: Metric::Cosine,
            host: None,
        };
        assert!(store().data_url(&handle, "/query").is_err());

        let handle = IndexHandle {
            host: Some("idx.pinecone.io".to_string()),
            ..handle
        };
        assert_eq!(
            store().data_url(&handle, "/query").unwrap(),
            "https://idx.pinecone.io/query"
        );
    }

    #[test]
    fn test_parse_list_response() {
        let body = r#"{"indexes":[{"name":"article-index","dimension":1536,"metric":"cosine",
            "host":"article-index-x.svc.pinecone.io","spec":{"serverless":{"cloud":"aws","region":"us-east-1"}},
            "status":{"ready":true,"state":"Ready"},"deletion_protection":"disabled"}]}"#;
        let list: ListIndexesResponse = serde_json::from_str(body).unwrap();
        let desc: IndexDescription = list.indexes.into_iter().next().unwrap().into();

        assert_eq!(desc.name, "article-index");
        assert_eq!(desc.dimension, 1536);
        assert_eq!(desc.metric, Metric::Cosine);
        assert!(desc.ready);
        assert_eq!(desc.host.as_deref(), Some("article-index-x.svc.pinecone.io"));
    }

    #[test]
    fn test_parse_initializing_index() {
        let body = r#"{"name":"article-index","dimension":1536,"metric":"cosine","host":"",
            "status":{"ready":false,"state":"Initializing"}}"#;
        let desc: IndexDescription = serde_json::from_str::<IndexModel>(body).unwrap().into();
        assert!(!desc.ready);
        assert!(desc.host.is_none());
    }

    #[test]
    fn test_create_request_body() {
        let body = CreateIndexRequest {
            name: "article-index",
            dimension: 1536,
            metric: Metric::Cosine,
            spec: CreateSpec {
                serverless: ServerlessSpec {
                    cloud: "aws",
                    region: "us-east-1",
                },
            },
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            serde_json::json!({
                "name": "article-index",
                "dimension": 1536,
                "metric": "cosine",
                "spec": {"serverless": {"cloud": "aws", "region": "us-east-1"}}
            })
        );
    }

    #[test]
    fn test_parse_stats() {
        let body = r#"{"namespaces":{"":{"vectorCount":3}},"dimension":1536,"indexFullness":0.0,"totalVectorCount":3}"#;
        let stats: IndexStats = serde_json::from_str::<StatsResponse>(body).unwrap().into();
        assert_eq!(stats.total_vector_count, 3);
        assert_eq!(stats.namespaces.get(""), Some(&3));
    }

    #[test]
    fn test_query_request_body() {
        let body = QueryRequest {
            vector: &[0.1, 0.2],
            top_k: 3,
            include_metadata: true,
            include_values: false,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["topK"], 3);
        assert_eq!(json["includeMetadata"], true);
    }

    #[test]
    fn test_parse_query_response() {
        let body = r#"{"results":[],"matches":[{"id":"article-0","score":0.87,"values":[],
            "metadata":{"text":"AI is revolutionizing industries"}}],"namespace":""}"#;
        let resp: QueryResponse = serde_json::from_str(body).unwrap();
        assert_eq!(resp.matches.len(), 1);
        assert_eq!(resp.matches[0].id, "article-0");
        assert_eq!(resp.matches[0].text(), Some("AI is revolutionizing industries"));
    }

    #[test]
    fn test_error_message_shapes() {
        assert_eq!(
            error_message(r#"{"error":{"code":"NOT_FOUND","message":"Resource article-index not found"},"status":404}"#),
            "Resource article-index not found"
        );
        assert_eq!(error_message(r#"{"code":3,"message":"Vector dimension 2 does not match"}"#), "Vector dimension 2 does not match");
        assert_eq!(error_message("gateway timeout"), "gateway timeout");
    }

    #[tokio::test]
    async fn test_list_retries_server_errors() {
        let server = flaky_server(1, 503, LISTING).await;
        let store = PineconeStore::new(ApiKey::new("pc-test"), Some(server.url())).unwrap();

        let indexes = store.list_indexes().await.unwrap();
        assert_eq!(indexes.len(), 1);
        assert_eq!(indexes[0].name, "article-index");

        let requests = server.requests();
        assert_eq!(requests.len(), 2);
        assert!(requests.iter().all(|r| r.method == "GET" && r.path == "/indexes"));
    }

    #[tokio::test]
    async fn test_create_retries_rate_limit_with_body() {
        let server = flaky_server(1, 429, "{}").await;
        let store = PineconeStore::new(ApiKey::new("pc-test"), Some(server.url())).unwrap();

        store
            .create_index(&IndexSpec::new("article-index", 1536, Metric::Cosine))
            .await
            .unwrap();

        let requests = server.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].body, requests[1].body);
        assert!(requests[1].body.contains("\"dimension\":1536"));
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let server = flaky_server(usize::MAX, 500, LISTING).await;
        let store = PineconeStore::new(ApiKey::new("pc-test"), Some(server.url())).unwrap();

        let err = store.list_indexes().await.unwrap_err();
        assert!(err.to_string().contains("try again"));
        assert_eq!(server.requests().len(), MAX_ATTEMPTS as usize);
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let server = flaky_server(usize::MAX, 401, LISTING).await;
        let store = PineconeStore::new(ApiKey::new("pc-test"), Some(server.url())).unwrap();

        assert!(store.list_indexes().await.is_err());
        assert_eq!(server.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_connection_refused_is_retried_then_reported() {
        // Bind then drop to get a port nothing listens on
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let store =
            PineconeStore::new(ApiKey::new("pc-test"), Some(&format!("http://127.0.0.1:{}", port)))
                .unwrap();

        let err = store.list_indexes().await.unwrap_err();
        assert!(err.to_string().contains("Failed to list indexes"));
    }
}
