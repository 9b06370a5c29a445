//! Retrieval service: single-flight index coordination plus the
//! collaborator-facing retrieve/force-refresh surface.
//!
//! The live index is published as an immutable `Arc` swapped under a
//! short write lock; build lifecycle state lives behind an async mutex
//! with a `Notify` so concurrent callers wait out an in-flight build
//! instead of racing it. A failed refresh keeps serving the previous
//! index for the same repo.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::{Mutex, Notify};
use tracing::{info, warn};

use crate::config::{DEFAULT_TOP_K, RagConfig, SNIPPET_MAX_CHARS, SYNC_INTERVAL};
use crate::embedder::EmbeddingProvider;
use crate::error::{RagError, RagResult};
use crate::filter::candidate_indices;
use crate::index::{WikiIndex, build_or_load_index};
use crate::mirror::sync_mirror;
use crate::query::{Intent, expand_query, query_hint_pages};
use crate::ranker::rank_candidates;

#[derive(Debug, Clone, Serialize)]
pub struct Snippet {
    pub source: &'static str,
    /// `page` or `page - section` for display.
    pub title: String,
    pub page: String,
    pub section: String,
    pub locale: String,
    pub url: String,
    /// Chunk content trimmed for prompt use.
    pub content: String,
    /// Fused score scaled to an integer (x1000, rounded).
    pub score: i64,
    pub dense_score: f64,
    pub sparse_score: f64,
    pub fused_score: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Retrieval {
    pub snippets: Vec<Snippet>,
    pub warnings: Vec<String>,
}

struct Lifecycle {
    repo: String,
    last_sync: Option<Instant>,
    building: bool,
}

pub struct WikiRagService {
    config: RagConfig,
    provider: EmbeddingProvider,
    /// Latest consistent index. Readers clone the Arc under a short
    /// lock and then read the arrays without further locking.
    published: RwLock<Option<Arc<WikiIndex>>>,
    lifecycle: Mutex<Lifecycle>,
    build_done: Notify,
}

impl WikiRagService {
    pub fn new(config: RagConfig) -> RagResult<Arc<Self>> {
        let provider = EmbeddingProvider::new(&config)?;
        Ok(Arc::new(Self {
            config,
            provider,
            published: RwLock::new(None),
            lifecycle: Mutex::new(Lifecycle {
                repo: String::new(),
                last_sync: None,
                building: false,
            }),
            build_done: Notify::new(),
        }))
    }

    /// Answer a chat question with the most relevant wiki passages.
    ///
    /// An empty query returns an empty result set. An empty repo falls
    /// back to the configured default. `top_k` of zero means the
    /// default of 6.
    pub async fn retrieve(
        &self,
        repo: &str,
        locale: &str,
        query: &str,
        intent: Intent,
        top_k: usize,
    ) -> RagResult<Retrieval> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Retrieval::default());
        }

        let repo = self.resolve_repo(repo)?;
        let top_k = if top_k == 0 { DEFAULT_TOP_K } else { top_k };

        let index = self.ensure_index(&repo, false).await?;
        let (snippets, warnings) = search_index(
            &index,
            &self.provider,
            normalize_locale(locale),
            query,
            intent,
            top_k,
        )
        .await;

        Ok(Retrieval { snippets, warnings })
    }

    /// Rebuild now, bypassing the freshness schedule.
    pub async fn force_refresh(&self, repo: &str) -> RagResult<Arc<WikiIndex>> {
        let repo = self.resolve_repo(repo)?;
        self.ensure_index(&repo, true).await
    }

    /// Background ticker that refreshes the index every sync interval.
    pub fn spawn_scheduled_refresh(self: &Arc<Self>, repo: String) -> tokio::task::JoinHandle<()> {
        let service = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SYNC_INTERVAL);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The interval fires immediately; the first retrieve call
            // already builds lazily, so skip that tick.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = service.ensure_index(&repo, true).await {
                    warn!(repo = %repo, error = %e, "scheduled wiki refresh failed");
                }
            }
        })
    }

    /// Return a fresh-enough index, building one if needed. At most
    /// one build runs at a time; other callers wait for its result.
    pub async fn ensure_index(&self, repo: &str, force: bool) -> RagResult<Arc<WikiIndex>> {
        loop {
            let mut state = self.lifecycle.lock().await;
            if state.building {
                let waiter = self.build_done.notified();
                drop(state);
                waiter.await;
                continue;
            }

            if !force && state.repo == repo {
                let fresh = state
                    .last_sync
                    .map_or(false, |at| at.elapsed() < SYNC_INTERVAL);
                if fresh {
                    if let Some(index) = self.published.read().clone() {
                        return Ok(index);
                    }
                }
            }

            state.building = true;
            break;
        }

        // The expensive part runs without any lock held; queries keep
        // being served from the previously published index.
        let result = self.rebuild(repo).await;

        let mut state = self.lifecycle.lock().await;
        // Set on failure too, so a broken wiki cannot cause a hot
        // retry loop.
        state.last_sync = Some(Instant::now());
        state.building = false;

        let outcome = match result {
            Ok(index) => {
                let index = Arc::new(index);
                *self.published.write() = Some(index.clone());
                state.repo = repo.to_string();
                info!(repo, chunks = index.chunks.len(), "wiki index published");
                Ok(index)
            }
            Err(e) => {
                let fallback = if state.repo == repo {
                    self.published.read().clone()
                } else {
                    None
                };
                match fallback {
                    Some(index) => {
                        warn!(repo, error = %e, "wiki refresh failed, serving previous index");
                        Ok(index)
                    }
                    None => Err(e),
                }
            }
        };

        drop(state);
        self.build_done.notify_waiters();
        outcome
    }

    async fn rebuild(&self, repo: &str) -> RagResult<WikiIndex> {
        let mirror = sync_mirror(&self.config.data_dir, repo).await?;
        build_or_load_index(&self.config.data_dir, &self.provider, repo, &mirror).await
    }

    fn resolve_repo(&self, repo: &str) -> RagResult<String> {
        let candidate = repo.trim();
        let candidate = if candidate.is_empty() {
            self.config.default_repo.trim()
        } else {
            candidate
        };
        sanitize_repo(candidate)
    }
}

/// Run the query pipeline against an already-built index. Split out of
/// `retrieve` so the ranking path is exercisable without a mirror.
pub async fn search_index(
    index: &WikiIndex,
    provider: &EmbeddingProvider,
    locale: &str,
    query: &str,
    intent: Intent,
    top_k: usize,
) -> (Vec<Snippet>, Vec<String>) {
    let expanded = expand_query(query, intent);
    let hints = query_hint_pages(query);
    let candidates = candidate_indices(&index.chunks, locale, intent, &hints);

    let (ranked, warning) =
        rank_candidates(index, provider, &candidates, &expanded, &hints, top_k).await;

    let snippets = ranked
        .iter()
        .map(|r| {
            let chunk = &index.chunks[r.index];
            Snippet {
                source: "WIKI",
                title: if chunk.section.is_empty() {
                    chunk.page_title.clone()
                } else {
                    format!("{} - {}", chunk.page_title, chunk.section)
                },
                page: chunk.page_title.clone(),
                section: chunk.section.clone(),
                locale: chunk.locale.clone(),
                url: format!(
                    "https://github.com/{}/wiki/{}",
                    index.repo, chunk.page_slug
                ),
                content: truncate_chars(&chunk.content, SNIPPET_MAX_CHARS),
                score: (r.fused * 1000.0).round() as i64,
                dense_score: r.dense,
                sparse_score: r.sparse,
                fused_score: r.fused,
            }
        })
        .collect();

    (snippets, warning.into_iter().collect())
}

fn sanitize_repo(repo: &str) -> RagResult<String> {
    let valid = match repo.split('/').collect::<Vec<_>>()[..] {
        [owner, name] => is_safe_segment(owner) && is_safe_segment(name),
        _ => false,
    };
    if valid {
        Ok(repo.to_string())
    } else {
        Err(RagError::BadRequest(format!(
            "invalid repo identifier: {repo:?}"
        )))
    }
}

fn is_safe_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

fn normalize_locale(locale: &str) -> &'static str {
    let lower = locale.trim().to_lowercase();
    if lower.starts_with("ru") {
        "ru"
    } else if lower.starts_with("en") {
        "en"
    } else {
        ""
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        text.chars().take(max_chars).collect()
    }
}
