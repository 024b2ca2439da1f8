//! Cross-collection retrieval: fan a query out, filter by a relevance
//! floor, then merge into one globally ranked list.
//!
//! Filter-then-merge (rather than per-collection top-k) keeps relevance
//! comparable across heterogeneous collections — raw book text competes
//! with compressed conversation summaries on the same score scale.

use std::sync::Arc;

use fable_llm::embedding::EmbedProvider;

use crate::error::Result;
use crate::memory::index::{SearchHit, VectorIndex};
use crate::types::Collection;

pub struct Retriever {
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn EmbedProvider>,
}

impl Retriever {
    pub fn new(index: Arc<dyn VectorIndex>, embedder: Arc<dyn EmbedProvider>) -> Self {
        Self { index, embedder }
    }

    /// Up to `limit` nearest neighbors of `query` in one collection,
    /// highest similarity first.
    pub async fn search(
        &self,
        query: &str,
        collection: Collection,
        limit: usize,
    ) -> Result<Vec<SearchHit>> {
        let vector = self.embedder.embed(query).await?;
        Ok(self.index.search(collection.as_str(), &vector, limit).await?)
    }

    /// Query every listed collection, drop hits below `threshold`, and
    /// globally sort the survivors by score descending. Ties keep
    /// collection-then-rank order (stable sort over the concatenation), so
    /// results are reproducible. Collections that do not exist yet are
    /// skipped, not errors.
    pub async fn retrieve(
        &self,
        query: &str,
        threshold: f32,
        limit: usize,
        collections: &[Collection],
    ) -> Result<Vec<String>> {
        let vector = self.embedder.embed(query).await?;

        let mut merged: Vec<SearchHit> = Vec::new();
        for &collection in collections {
            let name = collection.as_str();
            if !self.index.collection_exists(name).await? {
                continue;
            }
            let hits = self.index.search(name, &vector, limit).await?;
            merged.extend(hits.into_iter().filter(|h| h.score >= threshold));
        }

        // Vec::sort_by is stable: equal scores stay in collection-then-rank
        // insertion order.
        merged.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        merged.truncate(limit);

        tracing::debug!(query_len = query.len(), hits = merged.len(), "retrieval complete");
        Ok(merged.into_iter().map(|h| h.text).collect())
    }
}
