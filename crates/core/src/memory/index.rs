//! The vector index seam: upsert-by-id and nearest-neighbor search with a
//! cosine similarity score. Index internals (on-disk format, ANN structure)
//! stay behind this trait.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;

/// Error type for index operations.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("unknown collection: {0}")]
    UnknownCollection(String),
    #[error("vector dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
    #[error("index request failed: {0}")]
    RequestFailed(String),
}

/// One nearest-neighbor hit, highest score first in search results.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub id: u64,
    pub score: f32,
    pub text: String,
}

/// Capability interface the core requires from a vector store.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn collection_exists(&self, name: &str) -> Result<bool, IndexError>;

    /// Create a collection with the given dimensionality and cosine metric.
    async fn create_collection(&self, name: &str, dim: usize) -> Result<(), IndexError>;

    async fn count(&self, name: &str) -> Result<u64, IndexError>;

    /// Up to `limit` nearest neighbors of `vector`, highest score first.
    async fn search(
        &self,
        name: &str,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<SearchHit>, IndexError>;

    /// Write a record under `id`, overwriting any existing record with that id.
    async fn upsert(
        &self,
        name: &str,
        id: u64,
        vector: Vec<f32>,
        text: String,
    ) -> Result<(), IndexError>;
}

/// Cosine similarity of two equal-length vectors. Zero-magnitude input
/// scores 0.0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }

    dot / (mag_a * mag_b)
}

struct MemCollection {
    dim: usize,
    // BTreeMap keeps scan order deterministic for reproducible tie-breaks.
    records: BTreeMap<u64, (Vec<f32>, String)>,
}

/// Brute-force in-memory index. Backs tests and ephemeral mode (no
/// index service configured).
#[derive(Default)]
pub struct InMemoryIndex {
    collections: RwLock<HashMap<String, MemCollection>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn collection_exists(&self, name: &str) -> Result<bool, IndexError> {
        Ok(self.collections.read().await.contains_key(name))
    }

    async fn create_collection(&self, name: &str, dim: usize) -> Result<(), IndexError> {
        let mut cols = self.collections.write().await;
        cols.entry(name.to_owned())
            .or_insert_with(|| MemCollection { dim, records: BTreeMap::new() });
        Ok(())
    }

    async fn count(&self, name: &str) -> Result<u64, IndexError> {
        let cols = self.collections.read().await;
        let col = cols
            .get(name)
            .ok_or_else(|| IndexError::UnknownCollection(name.to_owned()))?;
        Ok(col.records.len() as u64)
    }

    async fn search(
        &self,
        name: &str,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<SearchHit>, IndexError> {
        let cols = self.collections.read().await;
        let col = cols
            .get(name)
            .ok_or_else(|| IndexError::UnknownCollection(name.to_owned()))?;
        if vector.len() != col.dim {
            return Err(IndexError::DimensionMismatch { expected: col.dim, got: vector.len() });
        }

        let mut hits: Vec<SearchHit> = col
            .records
            .iter()
            .map(|(&id, (vec, text))| SearchHit {
                id,
                score: cosine_similarity(vector, vec),
                text: text.clone(),
            })
            .collect();
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(limit);
        Ok(hits)
    }

    async fn upsert(
        &self,
        name: &str,
        id: u64,
        vector: Vec<f32>,
        text: String,
    ) -> Result<(), IndexError> {
        let mut cols = self.collections.write().await;
        let col = cols
            .get_mut(name)
            .ok_or_else(|| IndexError::UnknownCollection(name.to_owned()))?;
        if vector.len() != col.dim {
            return Err(IndexError::DimensionMismatch { expected: col.dim, got: vector.len() });
        }
        col.records.insert(id, (vector, text));
        Ok(())
    }
}
