//! Sparse lexical model: per-chunk term statistics and BM25 scoring.
//!
//! Derived entirely from the chunk array, never persisted; rebuilding
//! it after a load is pure and idempotent.

use std::collections::{HashMap, HashSet};

use crate::index::Chunk;
use crate::text::tokenize;

const BM25_K1: f64 = 1.5;
const BM25_B: f64 = 0.75;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Lexical {
    /// Term frequencies per chunk, over content + section + page text.
    doc_tf: Vec<HashMap<String, u32>>,
    doc_len: Vec<u32>,
    /// Number of chunks containing each term at least once.
    doc_freq: HashMap<String, u32>,
    avg_doc_len: f64,
}

impl Lexical {
    pub fn build(chunks: &[Chunk]) -> Self {
        let mut doc_tf = Vec::with_capacity(chunks.len());
        let mut doc_len = Vec::with_capacity(chunks.len());
        let mut doc_freq: HashMap<String, u32> = HashMap::new();

        for chunk in chunks {
            // Section and page names carry retrieval signal that the
            // body often omits, so they count toward the term stats.
            let text = format!("{}\n{}\n{}", chunk.content, chunk.section, chunk.page_title);
            let mut tf: HashMap<String, u32> = HashMap::new();
            for token in tokenize(&text) {
                *tf.entry(token).or_insert(0) += 1;
            }
            for term in tf.keys() {
                *doc_freq.entry(term.clone()).or_insert(0) += 1;
            }
            doc_len.push(tf.values().sum());
            doc_tf.push(tf);
        }

        let avg_doc_len = if doc_len.is_empty() {
            0.0
        } else {
            doc_len.iter().map(|&l| l as f64).sum::<f64>() / doc_len.len() as f64
        };

        Self {
            doc_tf,
            doc_len,
            doc_freq,
            avg_doc_len,
        }
    }

    pub fn doc_count(&self) -> usize {
        self.doc_tf.len()
    }

    pub fn avg_doc_len(&self) -> f64 {
        self.avg_doc_len
    }

    /// BM25 score of one chunk against the query terms. Duplicate
    /// query terms are counted once.
    pub fn score(&self, doc: usize, query_terms: &[String]) -> f64 {
        let n = self.doc_tf.len() as f64;
        if n == 0.0 || self.avg_doc_len <= 0.0 {
            return 0.0;
        }

        let tf = &self.doc_tf[doc];
        let dl = self.doc_len[doc] as f64;

        let mut seen: HashSet<&str> = HashSet::new();
        let mut score = 0.0;
        for term in query_terms {
            if !seen.insert(term.as_str()) {
                continue;
            }
            let Some(&f) = tf.get(term) else { continue };
            let Some(&df) = self.doc_freq.get(term) else { continue };
            let f = f as f64;
            let df = df as f64;

            // +1 smoothing keeps idf non-negative for very common terms.
            let idf = (1.0 + (n - df + 0.5) / (df + 0.5)).ln();
            let tf_component = (f + f * BM25_K1)
                / (f + BM25_K1 * (1.0 - BM25_B + BM25_B * dl / self.avg_doc_len));
            score += idf * tf_component;
        }
        score
    }
}
