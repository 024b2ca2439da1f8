//! Qdrant REST implementation of the vector index seam.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::memory::index::{IndexError, SearchHit, VectorIndex};

#[derive(Serialize)]
struct CreateCollectionBody {
    vectors: VectorParams,
}

#[derive(Serialize)]
struct VectorParams {
    size: usize,
    distance: &'static str,
}

#[derive(Serialize)]
struct SearchBody<'a> {
    vector: &'a [f32],
    limit: usize,
    with_payload: bool,
}

#[derive(Deserialize)]
struct CountResponse {
    result: CountResult,
}

#[derive(Deserialize)]
struct CountResult {
    count: u64,
}

#[derive(Deserialize)]
struct SearchResponse {
    result: Vec<ScoredPoint>,
}

#[derive(Deserialize)]
struct ScoredPoint {
    id: u64,
    score: f32,
    #[serde(default)]
    payload: Payload,
}

#[derive(Deserialize, Default)]
struct Payload {
    #[serde(default)]
    text: String,
}

/// Vector index backed by a Qdrant instance over its REST API.
pub struct QdrantIndex {
    client: reqwest::Client,
    base_url: String,
}

impl QdrantIndex {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_owned(),
        }
    }

    fn collection_url(&self, name: &str) -> String {
        format!("{}/collections/{name}", self.base_url)
    }

    async fn check(resp: reqwest::Response) -> Result<reqwest::Response, IndexError> {
        if resp.status().is_success() {
            return Ok(resp);
        }
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        Err(IndexError::RequestFailed(format!("{status}: {body}")))
    }
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    async fn collection_exists(&self, name: &str) -> Result<bool, IndexError> {
        let resp = self
            .client
            .get(self.collection_url(name))
            .send()
            .await
            .map_err(|e| IndexError::RequestFailed(e.to_string()))?;
        match resp.status().as_u16() {
            200 => Ok(true),
            404 => Ok(false),
            _ => {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                Err(IndexError::RequestFailed(format!("{status}: {body}")))
            }
        }
    }

    async fn create_collection(&self, name: &str, dim: usize) -> Result<(), IndexError> {
        let body = CreateCollectionBody {
            vectors: VectorParams { size: dim, distance: "Cosine" },
        };
        let resp = self
            .client
            .put(self.collection_url(name))
            .json(&body)
            .send()
            .await
            .map_err(|e| IndexError::RequestFailed(e.to_string()))?;
        Self::check(resp).await?;
        Ok(())
    }

    async fn count(&self, name: &str) -> Result<u64, IndexError> {
        let resp = self
            .client
            .post(format!("{}/points/count", self.collection_url(name)))
            .json(&json!({ "exact": true }))
            .send()
            .await
            .map_err(|e| IndexError::RequestFailed(e.to_string()))?;
        let resp = Self::check(resp).await?;
        let parsed: CountResponse = resp
            .json()
            .await
            .map_err(|e| IndexError::RequestFailed(e.to_string()))?;
        Ok(parsed.result.count)
    }

    async fn search(
        &self,
        name: &str,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<SearchHit>, IndexError> {
        let body = SearchBody { vector, limit, with_payload: true };
        let resp = self
            .client
            .post(format!("{}/points/search", self.collection_url(name)))
            .json(&body)
            .send()
            .await
            .map_err(|e| IndexError::RequestFailed(e.to_string()))?;
        let resp = Self::check(resp).await?;
        let parsed: SearchResponse = resp
            .json()
            .await
            .map_err(|e| IndexError::RequestFailed(e.to_string()))?;

        Ok(parsed
            .result
            .into_iter()
            .map(|p| SearchHit { id: p.id, score: p.score, text: p.payload.text })
            .collect())
    }

    async fn upsert(
        &self,
        name: &str,
        id: u64,
        vector: Vec<f32>,
        text: String,
    ) -> Result<(), IndexError> {
        // wait=true: synchronous write confirmation, best-effort durability.
        let body = json!({
            "points": [{
                "id": id,
                "vector": vector,
                "payload": { "text": text },
            }]
        });
        let resp = self
            .client
            .put(format!("{}/points?wait=true", self.collection_url(name)))
            .json(&body)
            .send()
            .await
            .map_err(|e| IndexError::RequestFailed(e.to_string()))?;
        Self::check(resp).await?;
        Ok(())
    }
}
