use std::path::PathBuf;
use std::time::Duration;

/// How long a built index is considered fresh before the next
/// `ensure_index` call triggers a resync.
pub const SYNC_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Default number of snippets returned by `retrieve`.
pub const DEFAULT_TOP_K: usize = 6;

/// Chunker token budget and sliding overlap (whitespace-separated units).
pub const MAX_CHUNK_TOKENS: usize = 800;
pub const CHUNK_OVERLAP_TOKENS: usize = 120;

/// Dimension of the deterministic local hash embedder.
pub const LOCAL_EMBED_DIM: usize = 384;

/// Maximum inputs per remote embeddings request.
pub const EMBED_BATCH_SIZE: usize = 64;

/// Per-request deadline for the embeddings endpoint.
pub const EMBED_HTTP_TIMEOUT: Duration = Duration::from_secs(25);

/// Deadline for every git subprocess invocation.
pub const GIT_TIMEOUT: Duration = Duration::from_secs(45);

/// Reciprocal Rank Fusion constant: each leg contributes 1/(K + rank).
pub const RRF_K: f64 = 60.0;

/// Fused-score bonus for candidates whose page matched an explicit hint.
pub const HINT_BOOST: f64 = 0.012;

/// Best cosine similarity below this (but above zero) annotates the
/// response with a low-confidence warning.
pub const LOW_CONFIDENCE_THRESHOLD: f64 = 0.30;

/// Snippet content is trimmed to this many characters for prompt use.
pub const SNIPPET_MAX_CHARS: usize = 760;

#[derive(Debug, Clone)]
pub struct RagConfig {
    /// Root for per-repo mirrors and persisted indexes.
    pub data_dir: PathBuf,
    /// Fallback "owner/name" used when a retrieve call passes an empty repo.
    pub default_repo: String,
    /// Enables the remote embedding path when present.
    pub openai_api_key: Option<String>,
    pub openai_embedding_model: String,
    pub openai_base_url: String,
}

impl RagConfig {
    pub fn from_env() -> Self {
        let data_dir = std::env::var("WIKI_RAG_DATA_DIR")
            .unwrap_or_else(|_| "data/wiki-rag".to_string());

        Self {
            data_dir: PathBuf::from(data_dir),
            default_repo: std::env::var("WIKI_RAG_DEFAULT_REPO").unwrap_or_default(),
            openai_api_key: std::env::var("OPENAI_API_KEY")
                .ok()
                .filter(|k| !k.is_empty()),
            openai_embedding_model: std::env::var("OPENAI_EMBEDDING_MODEL")
                .unwrap_or_else(|_| "text-embedding-3-small".to_string()),
            openai_base_url: std::env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
        }
    }
}
