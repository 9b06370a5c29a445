//! Hybrid ranking over filtered candidates: a dense cosine leg and a
//! sparse BM25 leg fused with Reciprocal Rank Fusion, plus a flat
//! boost for explicitly hinted pages.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use tracing::warn;

use crate::config::{HINT_BOOST, LOW_CONFIDENCE_THRESHOLD, RRF_K};
use crate::embedder::EmbeddingProvider;
use crate::index::WikiIndex;
use crate::text::tokenize;

/// One ranked candidate. Raw per-leg scores are kept alongside the
/// fused score for observability.
#[derive(Debug, Clone)]
pub struct RankedChunk {
    pub index: usize,
    pub dense: f64,
    pub sparse: f64,
    pub fused: f64,
}

/// Rank `candidates` against the expanded query. Returns the top-k
/// fused results and, when the best cosine similarity is positive but
/// weak, a low-confidence warning.
///
/// A query-side embedding failure degrades to BM25-only ranking; it is
/// logged, never surfaced to the caller.
pub async fn rank_candidates(
    index: &WikiIndex,
    provider: &EmbeddingProvider,
    candidates: &[usize],
    expanded_query: &str,
    hints: &HashSet<String>,
    top_k: usize,
) -> (Vec<RankedChunk>, Option<String>) {
    let query_vector = match provider
        .embed_query(
            expanded_query,
            index.embed_kind,
            &index.embed_model,
            index.embed_dim,
        )
        .await
    {
        Ok(v) if v.len() == index.embed_dim => Some(v),
        Ok(v) => {
            warn!(
                got = v.len(),
                expected = index.embed_dim,
                "query vector dimension mismatch, ranking with BM25 only"
            );
            None
        }
        Err(e) => {
            warn!(error = %e, "query embedding failed, ranking with BM25 only");
            None
        }
    };

    // Dense leg: both sides are unit-norm, so cosine is a dot product.
    let mut dense: Vec<(usize, f64)> = Vec::new();
    if let Some(q) = &query_vector {
        for &ci in candidates {
            let score = dot(q, &index.vectors[ci]) as f64;
            if score > 0.0 {
                dense.push((ci, score));
            }
        }
        sort_leg(&mut dense);
    }

    // Sparse leg.
    let terms = tokenize(expanded_query);
    let mut sparse: Vec<(usize, f64)> = candidates
        .iter()
        .filter_map(|&ci| {
            let score = index.lexical().score(ci, &terms);
            (score > 0.0).then_some((ci, score))
        })
        .collect();
    sort_leg(&mut sparse);

    // Reciprocal Rank Fusion: rank r (1-based) in a leg contributes
    // 1/(K + r) to the fused score.
    let mut fused: HashMap<usize, f64> = HashMap::new();
    for leg in [&dense, &sparse] {
        for (rank, (ci, _)) in leg.iter().enumerate() {
            *fused.entry(*ci).or_default() += 1.0 / (RRF_K + (rank + 1) as f64);
        }
    }

    let dense_by: HashMap<usize, f64> = dense.iter().copied().collect();
    let sparse_by: HashMap<usize, f64> = sparse.iter().copied().collect();

    let mut ranked: Vec<RankedChunk> = fused
        .into_iter()
        .map(|(ci, mut fused_score)| {
            if hints.contains(&index.chunks[ci].page_slug) {
                fused_score += HINT_BOOST;
            }
            RankedChunk {
                index: ci,
                dense: dense_by.get(&ci).copied().unwrap_or(0.0),
                sparse: sparse_by.get(&ci).copied().unwrap_or(0.0),
                fused: fused_score,
            }
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.fused
            .partial_cmp(&a.fused)
            .unwrap_or(Ordering::Equal)
            .then(b.dense.partial_cmp(&a.dense).unwrap_or(Ordering::Equal))
            .then(a.index.cmp(&b.index))
    });
    ranked.truncate(top_k);

    // Low confidence annotates, never suppresses.
    let warning = dense
        .first()
        .map(|&(_, best)| best)
        .filter(|&best| best > 0.0 && best < LOW_CONFIDENCE_THRESHOLD)
        .map(|best| {
            format!("low semantic similarity to the wiki corpus (best cosine {best:.2})")
        });

    (ranked, warning)
}

fn sort_leg(leg: &mut [(usize, f64)]) {
    leg.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(Ordering::Equal)
            .then(a.0.cmp(&b.0))
    });
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}
