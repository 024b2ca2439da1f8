/// All fable system parameters. `Default` holds the reference values;
/// `from_env` lets any of them be overridden via `FABLE_*` variables.
#[derive(Debug, Clone)]
pub struct FableCfg {
    /// Embedding vector dimensionality every collection is created with.
    pub embed_dim: usize,

    // vector memory
    /// Nearest-neighbor similarity at or above which an upsert overwrites
    /// the neighbor instead of inserting.
    pub dedup_threshold: f32,
    /// Relevance floor applied to merged retrieval results.
    pub retrieval_threshold: f32,
    /// Per-collection search k, and the cap on the merged result set.
    pub retrieval_limit: usize,

    // embedding gateway retry
    pub embed_max_attempts: u32,
    pub embed_backoff_ms: u64,

    // character resolution
    /// Minimum LLM match confidence to accept a resolved character.
    pub resolver_confidence: f32,

    // conversation session
    /// Summary truncation length (chars, word boundary).
    pub max_summary_length: usize,
    /// Transcript entries kept after archival once the window is exceeded.
    pub transcript_keep: usize,

    // book chunking
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for FableCfg {
    fn default() -> Self {
        Self {
            embed_dim: 768,
            dedup_threshold: 0.9,
            retrieval_threshold: 0.6,
            retrieval_limit: 5,
            embed_max_attempts: 3,
            embed_backoff_ms: 200,
            resolver_confidence: 0.3,
            max_summary_length: 500,
            transcript_keep: 10,
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

impl FableCfg {
    /// Build from defaults, overriding any field set in the environment.
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            embed_dim: env_or("FABLE_EMBED_DIM", d.embed_dim),
            dedup_threshold: env_or("FABLE_DEDUP_THRESHOLD", d.dedup_threshold),
            retrieval_threshold: env_or("FABLE_RETRIEVAL_THRESHOLD", d.retrieval_threshold),
            retrieval_limit: env_or("FABLE_RETRIEVAL_LIMIT", d.retrieval_limit),
            embed_max_attempts: env_or("FABLE_EMBED_MAX_ATTEMPTS", d.embed_max_attempts),
            embed_backoff_ms: env_or("FABLE_EMBED_BACKOFF_MS", d.embed_backoff_ms),
            resolver_confidence: env_or("FABLE_RESOLVER_CONFIDENCE", d.resolver_confidence),
            max_summary_length: env_or("FABLE_MAX_SUMMARY_LENGTH", d.max_summary_length),
            transcript_keep: env_or("FABLE_TRANSCRIPT_KEEP", d.transcript_keep),
            chunk_size: env_or("FABLE_CHUNK_SIZE", d.chunk_size),
            chunk_overlap: env_or("FABLE_CHUNK_OVERLAP", d.chunk_overlap),
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
