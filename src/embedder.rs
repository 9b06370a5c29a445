//! Embedding provider: remote OpenAI-compatible endpoint when an API
//! key is configured, deterministic local hash embeddings otherwise.
//!
//! Dense scores are only meaningful when query and corpus vectors come
//! from the same embedder, so the kind/model/dimension chosen at build
//! time are persisted with the index and honored at query time. A
//! stored remote kind with no key present is a configuration error,
//! never a silent fallback.

use serde::{Deserialize, Serialize};

use crate::config::{EMBED_BATCH_SIZE, EMBED_HTTP_TIMEOUT, LOCAL_EMBED_DIM, RagConfig};
use crate::error::{RagError, RagResult};
use crate::text::tokenize;

/// Model identifier recorded for locally hashed indexes.
const LOCAL_EMBED_MODEL: &str = "hash-fnv1a-384";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbedKind {
    OpenAi,
    Local,
}

/// Vectors for a corpus plus the embedder identity that produced them.
#[derive(Debug)]
pub struct EmbedBatch {
    pub vectors: Vec<Vec<f32>>,
    pub kind: EmbedKind,
    pub model: String,
    pub dim: usize,
}

pub struct EmbeddingProvider {
    api_key: Option<String>,
    model: String,
    base_url: String,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    index: usize,
    embedding: Vec<f64>,
}

impl EmbeddingProvider {
    pub fn new(config: &RagConfig) -> RagResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(EMBED_HTTP_TIMEOUT)
            .build()?;
        Ok(Self {
            api_key: config.openai_api_key.clone(),
            model: config.openai_embedding_model.clone(),
            base_url: config.openai_base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Embed a corpus. Picks the remote path when a key is configured,
    /// the local hash embedder otherwise.
    pub async fn embed_texts(&self, texts: &[String]) -> RagResult<EmbedBatch> {
        if self.api_key.is_some() {
            let vectors = self.embed_remote(texts).await?;
            let dim = vectors.first().map(Vec::len).unwrap_or(0);
            Ok(EmbedBatch {
                vectors,
                kind: EmbedKind::OpenAi,
                model: self.model.clone(),
                dim,
            })
        } else {
            let vectors = texts
                .iter()
                .map(|t| local_hash_embedding(t, LOCAL_EMBED_DIM))
                .collect();
            Ok(EmbedBatch {
                vectors,
                kind: EmbedKind::Local,
                model: LOCAL_EMBED_MODEL.to_string(),
                dim: LOCAL_EMBED_DIM,
            })
        }
    }

    /// Embed a query with the same embedder the index was built with.
    pub async fn embed_query(
        &self,
        text: &str,
        kind: EmbedKind,
        model: &str,
        dim: usize,
    ) -> RagResult<Vec<f32>> {
        match kind {
            EmbedKind::Local => Ok(local_hash_embedding(text, dim)),
            EmbedKind::OpenAi => {
                if self.api_key.is_none() {
                    return Err(RagError::Config(
                        "index was built with remote embeddings but OPENAI_API_KEY is not set"
                            .to_string(),
                    ));
                }
                let input = [text.to_string()];
                let mut vectors = self.embed_remote_batch(&input, model).await?;
                vectors.pop().ok_or_else(|| {
                    RagError::Embedding("embeddings endpoint returned no query vector".to_string())
                })
            }
        }
    }

    async fn embed_remote(&self, texts: &[String]) -> RagResult<Vec<Vec<f32>>> {
        let mut all = Vec::with_capacity(texts.len());
        for batch in texts.chunks(EMBED_BATCH_SIZE) {
            all.extend(self.embed_remote_batch(batch, &self.model).await?);
        }
        Ok(all)
    }

    /// POST one batch to `{base_url}/embeddings`. Any non-2xx status,
    /// parse failure, or count mismatch fails the whole batch.
    async fn embed_remote_batch(&self, batch: &[String], model: &str) -> RagResult<Vec<Vec<f32>>> {
        let key = self.api_key.as_deref().ok_or_else(|| {
            RagError::Config("remote embedding requested without an API key".to_string())
        })?;

        let url = format!("{}/embeddings", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(key)
            .json(&serde_json::json!({ "model": model, "input": batch }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RagError::Embedding(format!(
                "embeddings endpoint returned {status}: {}",
                body.chars().take(500).collect::<String>()
            )));
        }

        let parsed: EmbeddingsResponse = response
            .json()
            .await
            .map_err(|e| RagError::Embedding(format!("invalid embeddings response: {e}")))?;

        if parsed.data.len() != batch.len() {
            return Err(RagError::Embedding(format!(
                "embeddings count mismatch: sent {} inputs, got {} vectors",
                batch.len(),
                parsed.data.len()
            )));
        }

        // The endpoint is free to reorder entries; the `index` field is
        // the only authoritative position.
        let mut data = parsed.data;
        data.sort_by_key(|item| item.index);

        Ok(data
            .into_iter()
            .map(|item| {
                let mut v: Vec<f32> = item.embedding.iter().map(|&x| x as f32).collect();
                l2_normalize(&mut v);
                v
            })
            .collect())
    }
}

/// Deterministic hash embedding: each token lands on axis
/// `fnv1a64(token) % dim` with the hash's top bit as the sign.
/// Reproducible across runs and platforms, which keeps query and
/// corpus vectors comparable without any external dependency.
pub fn local_hash_embedding(text: &str, dim: usize) -> Vec<f32> {
    let mut v = vec![0f32; dim];
    if dim == 0 {
        return v;
    }
    for token in tokenize(text) {
        let hash = fnv1a64(token.as_bytes());
        let axis = (hash % dim as u64) as usize;
        let sign = if hash & (1 << 63) != 0 { -1.0 } else { 1.0 };
        v[axis] += sign;
    }
    l2_normalize(&mut v);
    v
}

fn fnv1a64(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for &b in bytes {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

/// Scale to unit length. All-zero vectors stay zero.
pub fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}
