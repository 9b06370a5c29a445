//! Wiki index: chunk a synchronized mirror, embed, persist atomically,
//! load with verification.
//!
//! Chunks and vectors are parallel arrays so the cosine loop walks
//! contiguous storage. An index is immutable once built; refreshes
//! replace it wholesale.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use ignore::WalkBuilder;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::chunker::split_with_overlap;
use crate::config::{CHUNK_OVERLAP_TOKENS, MAX_CHUNK_TOKENS};
use crate::embedder::{EmbedKind, EmbeddingProvider};
use crate::error::{RagError, RagResult};
use crate::lexical::Lexical;
use crate::markdown::split_sections;
use crate::mirror::repo_key;
use crate::text::{detect_locale, whitespace_token_count};

/// One retrievable passage. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// `<relative path>#<sequence>`, unique within an index.
    pub id: String,
    /// Relative, forward-slashed source path.
    pub path: String,
    pub page_title: String,
    pub page_slug: String,
    /// Heading breadcrumb joined with " > ", empty for untitled bodies.
    pub section: String,
    /// Context prefix prepended to the content when embedding.
    pub breadcrumb: String,
    pub locale: String,
    pub content: String,
    pub token_count: usize,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct WikiIndex {
    pub repo: String,
    pub built_at: DateTime<Utc>,
    /// Relative path -> sha256 hex, for every file that contributed at
    /// least one chunk. Drives the rebuild short-circuit.
    pub file_hashes: BTreeMap<String, String>,
    pub embed_kind: EmbedKind,
    pub embed_model: String,
    pub embed_dim: usize,
    pub chunks: Vec<Chunk>,
    /// Parallel to `chunks`; unit-norm embeddings of breadcrumb+content.
    pub vectors: Vec<Vec<f32>>,
    #[serde(skip)]
    lexical: Lexical,
}

impl WikiIndex {
    pub fn lexical(&self) -> &Lexical {
        &self.lexical
    }

    /// Recompute the derived BM25 state from the chunk array.
    pub fn rebuild_lexical(&mut self) {
        self.lexical = Lexical::build(&self.chunks);
    }
}

pub fn index_path(data_dir: &Path, repo: &str) -> PathBuf {
    data_dir.join(repo_key(repo)).join("index.json")
}

struct SourceFile {
    rel: String,
    content: String,
    hash: String,
}

/// Chunked corpus plus the hashes of contributing files, computed
/// before any embedding work so the cache check stays cheap.
struct Prepared {
    chunks: Vec<Chunk>,
    embed_inputs: Vec<String>,
    file_hashes: BTreeMap<String, String>,
    file_count: usize,
}

/// Build the index for `repo` from its mirror, reusing the persisted
/// index when the content hashes are unchanged.
pub async fn build_or_load_index(
    data_dir: &Path,
    provider: &EmbeddingProvider,
    repo: &str,
    mirror: &Path,
) -> RagResult<WikiIndex> {
    let sources = read_sources(mirror)?;
    if sources.is_empty() {
        return Err(RagError::IndexBuild(format!(
            "no markdown files in wiki mirror for {repo}"
        )));
    }

    let prepared = prepare(&sources);
    if prepared.chunks.is_empty() {
        return Err(RagError::IndexBuild(format!(
            "wiki for {repo} produced no chunks"
        )));
    }

    let path = index_path(data_dir, repo);
    if let Some(cached) = load_index(&path) {
        if cached.repo == repo && cached.file_hashes == prepared.file_hashes {
            info!(
                repo,
                chunks = cached.chunks.len(),
                "wiki index up-to-date, reusing cached build"
            );
            return Ok(cached);
        }
    }

    let index = build_index(provider, repo, prepared).await?;
    persist_index(&index, &path)?;
    Ok(index)
}

/// Load a persisted index. Every failure mode (missing file, parse
/// error, parallel-array mismatch) is a cache miss, not an error.
pub fn load_index(path: &Path) -> Option<WikiIndex> {
    let json = std::fs::read_to_string(path).ok()?;
    let mut index: WikiIndex = match serde_json::from_str(&json) {
        Ok(index) => index,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "discarding unreadable wiki index");
            return None;
        }
    };

    if index.chunks.is_empty() || index.chunks.len() != index.vectors.len() {
        warn!(
            path = %path.display(),
            chunks = index.chunks.len(),
            vectors = index.vectors.len(),
            "discarding corrupted wiki index"
        );
        return None;
    }

    if index.embed_dim == 0 {
        index.embed_dim = index.vectors.first().map(Vec::len).unwrap_or(0);
    }
    index.rebuild_lexical();
    Some(index)
}

/// Pretty JSON via tmp-then-rename so readers never observe a torn
/// write.
pub fn persist_index(index: &WikiIndex, path: &Path) -> RagResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(index)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, &json)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

fn read_sources(mirror: &Path) -> RagResult<Vec<SourceFile>> {
    let mut entries: Vec<(PathBuf, String)> = WalkBuilder::new(mirror)
        .build()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_some_and(|ft| ft.is_file()))
        .filter(|entry| {
            entry
                .path()
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("md"))
        })
        .map(|entry| {
            let rel = entry
                .path()
                .strip_prefix(mirror)
                .unwrap_or(entry.path())
                .to_string_lossy()
                .replace('\\', "/");
            (entry.into_path(), rel)
        })
        .collect();
    entries.sort_by(|a, b| a.1.cmp(&b.1));

    entries
        .par_iter()
        .map(|(abs, rel)| {
            let content = std::fs::read_to_string(abs)?;
            let mut hasher = Sha256::new();
            hasher.update(content.as_bytes());
            Ok(SourceFile {
                rel: rel.clone(),
                hash: format!("{:x}", hasher.finalize()),
                content,
            })
        })
        .collect()
}

fn prepare(sources: &[SourceFile]) -> Prepared {
    let mut chunks = Vec::new();
    let mut embed_inputs = Vec::new();
    let mut file_hashes = BTreeMap::new();

    for source in sources {
        let slug = Path::new(&source.rel)
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| source.rel.clone());
        let title = slug.replace('-', " ");

        let mut seq = 0usize;
        for section in split_sections(&source.content) {
            let section_label = section.headings.join(" > ");
            let mut trail = vec![title.clone()];
            trail.extend(section.headings.iter().cloned());
            let breadcrumb = format!("[Page: {}]", trail.join(" > "));

            for piece in
                split_with_overlap(&section.content, MAX_CHUNK_TOKENS, CHUNK_OVERLAP_TOKENS)
            {
                embed_inputs.push(format!("{breadcrumb}\n{piece}"));
                chunks.push(Chunk {
                    id: format!("{}#{}", source.rel, seq),
                    path: source.rel.clone(),
                    page_title: title.clone(),
                    page_slug: slug.clone(),
                    section: section_label.clone(),
                    breadcrumb: breadcrumb.clone(),
                    locale: detect_locale(&piece).to_string(),
                    token_count: whitespace_token_count(&piece),
                    content: piece,
                });
                seq += 1;
            }
        }

        if seq > 0 {
            file_hashes.insert(source.rel.clone(), source.hash.clone());
        }
    }

    Prepared {
        chunks,
        embed_inputs,
        file_hashes,
        file_count: sources.len(),
    }
}

async fn build_index(
    provider: &EmbeddingProvider,
    repo: &str,
    prepared: Prepared,
) -> RagResult<WikiIndex> {
    let start = std::time::Instant::now();

    let batch = provider.embed_texts(&prepared.embed_inputs).await?;
    if batch.vectors.len() != prepared.chunks.len() {
        return Err(RagError::IndexBuild(format!(
            "embedding count mismatch: {} chunks, {} vectors",
            prepared.chunks.len(),
            batch.vectors.len()
        )));
    }

    let mut index = WikiIndex {
        repo: repo.to_string(),
        built_at: Utc::now(),
        file_hashes: prepared.file_hashes,
        embed_kind: batch.kind,
        embed_model: batch.model,
        embed_dim: batch.dim,
        chunks: prepared.chunks,
        vectors: batch.vectors,
        lexical: Lexical::default(),
    };
    index.rebuild_lexical();

    info!(
        repo,
        files = prepared.file_count,
        chunks = index.chunks.len(),
        kind = ?index.embed_kind,
        model = %index.embed_model,
        dim = index.embed_dim,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "wiki index built"
    );
    Ok(index)
}
