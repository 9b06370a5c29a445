//! Candidate selection: a graded (locale x intent x hint) fallback
//! ladder over the chunk array.
//!
//! Strict filtering starves the ranker on sparse wikis, so each tier
//! drops one constraint until something matches; the last tier is the
//! whole corpus.

use std::collections::HashSet;

use crate::index::Chunk;
use crate::query::Intent;

/// Pages each intent may draw from. `None` leaves the intent
/// unconstrained.
fn intent_allowed_pages(intent: Intent) -> Option<&'static [&'static str]> {
    match intent {
        Intent::Trading => Some(&[
            "Station-Trading",
            "Radius-Scan",
            "Execution-Plan",
            "PLEX-Dashboard",
            "War-Tracker",
        ]),
        Intent::Debug => Some(&["API-Reference", "FAQ"]),
        Intent::Product => Some(&[
            "Station-Trading",
            "PLEX-Dashboard",
            "Execution-Plan",
            "Home",
        ]),
        Intent::Other => None,
    }
}

struct Tier {
    locale: bool,
    intent: bool,
    hints: bool,
}

/// Softening order: hints are the strongest signal and survive the
/// longest; locale goes first because detection is heuristic.
const TIERS: [Tier; 6] = [
    Tier { locale: true, intent: true, hints: true },
    Tier { locale: false, intent: true, hints: true },
    Tier { locale: false, intent: false, hints: true },
    Tier { locale: true, intent: true, hints: false },
    Tier { locale: false, intent: true, hints: false },
    Tier { locale: false, intent: false, hints: false },
];

/// Indices of chunks eligible for ranking: the first non-empty tier.
pub fn candidate_indices(
    chunks: &[Chunk],
    locale: &str,
    intent: Intent,
    hints: &HashSet<String>,
) -> Vec<usize> {
    let allowed = intent_allowed_pages(intent);

    for tier in &TIERS {
        let selected: Vec<usize> = chunks
            .iter()
            .enumerate()
            .filter(|(_, chunk)| {
                if tier.locale && !locale.is_empty() && chunk.locale != locale {
                    return false;
                }
                if tier.intent {
                    if let Some(pages) = allowed {
                        if !pages.contains(&chunk.page_slug.as_str()) {
                            return false;
                        }
                    }
                }
                if tier.hints && !hints.contains(&chunk.page_slug) {
                    return false;
                }
                true
            })
            .map(|(i, _)| i)
            .collect();

        if !selected.is_empty() {
            return selected;
        }
    }

    Vec::new()
}
