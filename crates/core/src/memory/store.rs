//! Deduplicated vector storage of text fragments per named collection.
//!
//! Upsert policy, in order: identical text → skip; nearest neighbor at or
//! above the dedup threshold → overwrite that neighbor's id; otherwise
//! insert under a freshly allocated id. This makes upsert idempotent under
//! repeated identical input and convergent under near-duplicate input.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use fable_llm::embedding::EmbedProvider;
use tokio::sync::Mutex;

use crate::error::{Error, Result};
use crate::memory::index::VectorIndex;
use crate::types::Collection;

/// Per-item result of a batch upsert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// True insertion under a new id; the record count grew.
    Inserted(u64),
    /// Near-duplicate overwrite of an existing id.
    Updated(u64),
    /// Exact duplicate, no write.
    Skipped(u64),
    /// Embedding failed for this item after retries; the rest of the batch
    /// proceeded.
    Failed(String),
}

impl UpsertOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Per-collection state: upserts are read-modify-write on the nearest
/// neighbor, so they serialize behind a collection lock. Ids come from an
/// explicit monotonic counter seeded from the record count (records are
/// never deleted, so counter and count agree).
struct CollectionState {
    write_lock: Mutex<()>,
    next_id: AtomicU64,
}

/// Durable, deduplicated storage of text fragments per named collection.
pub struct VectorMemory {
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn EmbedProvider>,
    dedup_threshold: f32,
    collections: Mutex<HashMap<Collection, Arc<CollectionState>>>,
}

impl VectorMemory {
    pub fn new(
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn EmbedProvider>,
        dedup_threshold: f32,
    ) -> Self {
        Self {
            index,
            embedder,
            dedup_threshold,
            collections: Mutex::new(HashMap::new()),
        }
    }

    /// Idempotent: creates the collection (configured dimensionality,
    /// cosine metric) if absent and seeds the id counter.
    pub async fn ensure_collection(&self, collection: Collection) -> Result<()> {
        self.state(collection).await?;
        Ok(())
    }

    async fn state(&self, collection: Collection) -> Result<Arc<CollectionState>> {
        let mut map = self.collections.lock().await;
        if let Some(state) = map.get(&collection) {
            return Ok(state.clone());
        }

        let name = collection.as_str();
        if !self.index.collection_exists(name).await? {
            self.index.create_collection(name, self.embedder.dim()).await?;
        }
        let count = self.index.count(name).await?;
        let state = Arc::new(CollectionState {
            write_lock: Mutex::new(()),
            next_id: AtomicU64::new(count),
        });
        map.insert(collection, state.clone());
        Ok(state)
    }

    /// Dedup-upsert a batch of text fragments. Items fail independently
    /// (embedding retry exhaustion); the call errors only when every item
    /// failed or the index itself is unreachable.
    pub async fn upsert(
        &self,
        collection: Collection,
        items: &[String],
    ) -> Result<Vec<UpsertOutcome>> {
        let state = self.state(collection).await?;
        let name = collection.as_str();

        let mut outcomes = Vec::with_capacity(items.len());
        for item in items {
            let vector = match self.embedder.embed(item).await {
                Ok(v) => v,
                Err(e) => {
                    tracing::warn!(collection = name, error = %e, "upsert item failed to embed");
                    outcomes.push(UpsertOutcome::Failed(e.to_string()));
                    continue;
                }
            };

            let _guard = state.write_lock.lock().await;
            let nearest = self.index.search(name, &vector, 1).await?.into_iter().next();

            let outcome = match nearest {
                Some(hit) if hit.text == *item => {
                    tracing::debug!(collection = name, id = hit.id, "exact duplicate, skipping");
                    UpsertOutcome::Skipped(hit.id)
                }
                Some(hit) if hit.score >= self.dedup_threshold => {
                    self.index.upsert(name, hit.id, vector, item.clone()).await?;
                    tracing::debug!(
                        collection = name,
                        id = hit.id,
                        score = hit.score,
                        "near-duplicate, overwrote existing record"
                    );
                    UpsertOutcome::Updated(hit.id)
                }
                _ => {
                    let id = state.next_id.fetch_add(1, Ordering::SeqCst);
                    self.index.upsert(name, id, vector, item.clone()).await?;
                    UpsertOutcome::Inserted(id)
                }
            };
            outcomes.push(outcome);
        }

        if !outcomes.is_empty() && outcomes.iter().all(UpsertOutcome::is_failed) {
            return Err(Error::Gateway(format!(
                "all {} upsert items failed to embed",
                outcomes.len()
            )));
        }
        Ok(outcomes)
    }

    /// Single-item convenience over [`Self::upsert`].
    pub async fn upsert_one(&self, collection: Collection, text: &str) -> Result<UpsertOutcome> {
        let items = [text.to_owned()];
        let outcomes = self.upsert(collection, &items).await?;
        outcomes
            .into_iter()
            .next()
            .ok_or_else(|| Error::Gateway("empty upsert result".into()))
    }

    /// Record count of a collection.
    pub async fn count(&self, collection: Collection) -> Result<u64> {
        self.ensure_collection(collection).await?;
        Ok(self.index.count(collection.as_str()).await?)
    }
}
