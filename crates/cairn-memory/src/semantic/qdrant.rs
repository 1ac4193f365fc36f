//! Qdrant vector backend over its HTTP API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::{debug, info};

use super::{EmbeddingPoint, ScoredPoint, VectorIndex};
use crate::backend::{BackendResult, BackendUnavailable};

const BACKEND: &str = "qdrant";

/// Connection probes before giving up.
const CONNECT_ATTEMPTS: u32 = 3;
const CONNECT_BACKOFF: Duration = Duration::from_millis(250);

/// Payload field carrying the owning project.
const PROJECT_FIELD: &str = "project_path";
const TEXT_FIELD: &str = "text";

#[derive(Debug, Clone)]
pub struct QdrantIndex {
    client: Client,
    base_url: String,
    collection: String,
}

impl QdrantIndex {
    /// Connect and verify the server answers.
    ///
    /// Retries a few times with a growing delay before reporting the backend
    /// unavailable.
    pub async fn connect(
        base_url: &str,
        collection: &str,
        timeout: Duration,
    ) -> BackendResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BackendUnavailable::new(BACKEND, e))?;
        let index = Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            collection: collection.to_string(),
        };

        let mut last_error = None;
        for attempt in 1..=CONNECT_ATTEMPTS {
            match index.probe().await {
                Ok(()) => {
                    info!(url = %index.base_url, collection = %index.collection, "Connected to Qdrant");
                    return Ok(index);
                }
                Err(e) => {
                    debug!(attempt, error = %e, "Qdrant probe failed");
                    last_error = Some(e);
                    if attempt < CONNECT_ATTEMPTS {
                        tokio::time::sleep(CONNECT_BACKOFF * attempt).await;
                    }
                }
            }
        }
        Err(last_error.unwrap_or_else(|| BackendUnavailable::new(BACKEND, "no connection attempt made")))
    }

    async fn probe(&self) -> BackendResult<()> {
        let response = self
            .client
            .get(format!("{}/collections", self.base_url))
            .send()
            .await
            .map_err(unavailable)?;
        check_status(response.status(), "list collections")
    }

    fn collection_url(&self) -> String {
        format!("{}/collections/{}", self.base_url, self.collection)
    }
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    fn kind(&self) -> &'static str {
        BACKEND
    }

    async fn ensure_collection(&self, dimensions: usize) -> BackendResult<()> {
        let url = self.collection_url();
        let existing = self.client.get(&url).send().await.map_err(unavailable)?;

        if existing.status() == StatusCode::NOT_FOUND {
            let created = self
                .client
                .put(&url)
                .json(&collection_body(dimensions))
                .send()
                .await
                .map_err(unavailable)?;
            // Another writer may have created it first.
            if created.status() != StatusCode::CONFLICT {
                check_status(created.status(), "create collection")?;
            }
            info!(collection = %self.collection, dimensions, "Created Qdrant collection");
        } else {
            check_status(existing.status(), "get collection")?;
        }

        let indexed = self
            .client
            .put(format!("{url}/index"))
            .json(&json!({ "field_name": PROJECT_FIELD, "field_schema": "keyword" }))
            .send()
            .await
            .map_err(unavailable)?;
        check_status(indexed.status(), "create payload index")
    }

    async fn upsert(&self, point: EmbeddingPoint) -> BackendResult<()> {
        let response = self
            .client
            .put(format!("{}/points?wait=true", self.collection_url()))
            .json(&upsert_body(&point))
            .send()
            .await
            .map_err(unavailable)?;
        check_status(response.status(), "upsert point")?;
        debug!(point_id = %point.id, "Upserted Qdrant point");
        Ok(())
    }

    async fn search(
        &self,
        vector: Vec<f32>,
        limit: usize,
        project_path: Option<&str>,
    ) -> BackendResult<Vec<ScoredPoint>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let response = self
            .client
            .post(format!("{}/points/search", self.collection_url()))
            .json(&search_body(&vector, limit, project_path))
            .send()
            .await
            .map_err(unavailable)?;
        check_status(response.status(), "search points")?;

        let body: SearchResponse = response.json().await.map_err(unavailable)?;
        Ok(body.result.into_iter().map(SearchHit::into_scored).collect())
    }

    async fn delete_project(&self, project_path: &str) -> BackendResult<()> {
        let response = self
            .client
            .post(format!("{}/points/delete?wait=true", self.collection_url()))
            .json(&delete_body(project_path))
            .send()
            .await
            .map_err(unavailable)?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        check_status(response.status(), "delete points")?;
        info!(project = project_path, "Deleted Qdrant points");
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Wire format
// ─────────────────────────────────────────────────────────────────────────────

fn collection_body(dimensions: usize) -> Value {
    json!({ "vectors": { "size": dimensions, "distance": "Cosine" } })
}

fn upsert_body(point: &EmbeddingPoint) -> Value {
    let mut payload = point.metadata.clone();
    payload.insert(TEXT_FIELD.into(), Value::String(point.text.clone()));
    payload.insert(PROJECT_FIELD.into(), Value::String(point.project_path.clone()));
    json!({
        "points": [{
            "id": point.id,
            "vector": point.vector,
            "payload": payload,
        }]
    })
}

fn search_body(vector: &[f32], limit: usize, project_path: Option<&str>) -> Value {
    let mut body = json!({
        "vector": vector,
        "limit": limit,
        "with_payload": true,
    });
    if let Some(project) = project_path {
        body["filter"] = json!({
            "must": [{ "key": PROJECT_FIELD, "match": { "value": project } }]
        });
    }
    body
}

fn delete_body(project_path: &str) -> Value {
    json!({
        "filter": {
            "must": [{ "key": PROJECT_FIELD, "match": { "value": project_path } }]
        }
    })
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    result: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    id: Value,
    score: f32,
    #[serde(default)]
    payload: Option<Map<String, Value>>,
}

impl SearchHit {
    fn into_scored(self) -> ScoredPoint {
        let mut payload = self.payload.unwrap_or_default();
        let text = take_string(&mut payload, TEXT_FIELD);
        let project_path = take_string(&mut payload, PROJECT_FIELD);
        let id = match self.id {
            Value::String(s) => s,
            other => other.to_string(),
        };
        ScoredPoint {
            id,
            text,
            project_path,
            metadata: payload,
            score: self.score,
        }
    }
}

fn take_string(payload: &mut Map<String, Value>, key: &str) -> String {
    match payload.remove(key) {
        Some(Value::String(s)) => s,
        _ => String::new(),
    }
}

fn unavailable(e: reqwest::Error) -> BackendUnavailable {
    BackendUnavailable::new(BACKEND, e)
}

fn check_status(status: StatusCode, operation: &str) -> BackendResult<()> {
    if status.is_success() {
        Ok(())
    } else {
        Err(BackendUnavailable::new(
            BACKEND,
            format!("{operation} returned HTTP {status}"),
        ))
    }
}
