//! Vector memory: index seam, dedup-upsert store, and cross-collection
//! retrieval.

pub mod index;
pub mod qdrant;
pub mod retrieval;
pub mod store;

pub use index::{InMemoryIndex, IndexError, SearchHit, VectorIndex};
pub use qdrant::QdrantIndex;
pub use retrieval::Retriever;
pub use store::{UpsertOutcome, VectorMemory};
