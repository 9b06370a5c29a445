//! Query expansion and explicit page hinting.
//!
//! Expansion widens short or jargon-heavy queries with intent terms
//! and domain synonyms before ranking. The hint rulebook maps obvious
//! phrasings straight to canonical page slugs so the candidate filter
//! can anchor on them.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    Trading,
    Debug,
    Product,
    Other,
}

impl Intent {
    /// Lenient parse; anything unrecognized is `Other`.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "trading" => Intent::Trading,
            "debug" => Intent::Debug,
            "product" => Intent::Product,
            _ => Intent::Other,
        }
    }
}

/// Queries at or below this many whitespace tokens get intent terms
/// appended; longer queries carry enough signal on their own.
const SHORT_QUERY_TOKENS: usize = 5;

/// (case-insensitive substrings, appended expansion)
const SYNONYMS: &[(&[&str], &str)] = &[
    (&["sds"], "scam detection score"),
    (&["cts"], "composite trade score"),
    (&["pvi"], "price volatility index"),
    (&["bvs", "s2b", "bfs"], "buy sell flow ratio market velocity"),
];

/// Expand a query for ranking. The original query is always a prefix
/// of the result.
pub fn expand_query(query: &str, intent: Intent) -> String {
    let mut expanded = query.to_string();

    if query.split_whitespace().count() <= SHORT_QUERY_TOKENS {
        let generic = match intent {
            Intent::Trading => "station trading metrics cts sds pvi filters scan parameters",
            Intent::Debug => "troubleshooting errors station ai config",
            Intent::Product => "product workflow settings documentation",
            Intent::Other => "",
        };
        if !generic.is_empty() {
            expanded.push(' ');
            expanded.push_str(generic);
        }
    }

    let lower = query.to_lowercase();
    for (needles, expansion) in SYNONYMS {
        if needles.iter().any(|needle| lower.contains(needle)) {
            expanded.push(' ');
            expanded.push_str(expansion);
        }
    }

    expanded
}

#[derive(Clone, Copy)]
enum HintPattern {
    /// Substring of the normalized query.
    Phrase(&'static str),
    /// Substring of the lowercased raw query; survives normalization
    /// stripping (used for path-like needles).
    RawPhrase(&'static str),
    /// Every needle appears somewhere in the normalized query. Stems
    /// match inflected forms ("trade" hits "trading").
    CoOccur(&'static [&'static str]),
    /// Some whitespace token of the normalized query equals a needle.
    /// Exact tokens keep short abbreviations from firing inside words.
    AnyToken(&'static [&'static str]),
}

struct HintRule {
    pattern: HintPattern,
    page: &'static str,
}

use HintPattern::{AnyToken, CoOccur, Phrase, RawPhrase};

const HINT_RULES: &[HintRule] = &[
    HintRule { pattern: Phrase("radius scan"), page: "Radius-Scan" },
    HintRule { pattern: CoOccur(&["радиус", "скан"]), page: "Radius-Scan" },
    HintRule { pattern: CoOccur(&["station", "trade"]), page: "Station-Trading" },
    HintRule { pattern: CoOccur(&["станц", "трейд"]), page: "Station-Trading" },
    HintRule {
        pattern: AnyToken(&["sds", "cts", "pvi", "bvs", "s2b", "bfs"]),
        page: "Station-Trading",
    },
    HintRule { pattern: Phrase("execution plan"), page: "Execution-Plan" },
    HintRule { pattern: CoOccur(&["done", "ignored"]), page: "Execution-Plan" },
    HintRule { pattern: RawPhrase("/api/"), page: "API-Reference" },
    HintRule { pattern: Phrase("api endpoint"), page: "API-Reference" },
    HintRule { pattern: CoOccur(&["omega", "plex"]), page: "PLEX-Dashboard" },
    HintRule { pattern: CoOccur(&["war", "tracker"]), page: "War-Tracker" },
    HintRule { pattern: CoOccur(&["war", "hot"]), page: "War-Tracker" },
];

/// Canonical page slugs the query points at explicitly. Empty when
/// nothing matches.
pub fn query_hint_pages(query: &str) -> HashSet<String> {
    let raw_lower = query.to_lowercase();
    let normalized = normalize(query);

    let mut hints = HashSet::new();
    for rule in HINT_RULES {
        let hit = match rule.pattern {
            Phrase(phrase) => normalized.contains(phrase),
            RawPhrase(phrase) => raw_lower.contains(phrase),
            CoOccur(needles) => needles.iter().all(|n| normalized.contains(n)),
            AnyToken(tokens) => normalized.split_whitespace().any(|t| tokens.contains(&t)),
        };
        if hit {
            hints.insert(rule.page.to_string());
        }
    }
    hints
}

/// Lowercase, punctuation to spaces, whitespace collapsed.
fn normalize(query: &str) -> String {
    let mapped: String = query
        .to_lowercase()
        .chars()
        .map(|ch| if ch.is_alphanumeric() { ch } else { ' ' })
        .collect();
    mapped.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intent_parse_is_lenient() {
        assert_eq!(Intent::parse("Trading"), Intent::Trading);
        assert_eq!(Intent::parse(" debug "), Intent::Debug);
        assert_eq!(Intent::parse("anything else"), Intent::Other);
    }

    #[test]
    fn expansion_keeps_query_as_prefix() {
        for intent in [Intent::Trading, Intent::Debug, Intent::Product, Intent::Other] {
            let expanded = expand_query("what is cts", intent);
            assert!(expanded.starts_with("what is cts"));
        }
    }

    #[test]
    fn short_query_gets_intent_terms() {
        let expanded = expand_query("scan settings", Intent::Trading);
        assert!(expanded.contains("station trading metrics"));

        let long = expand_query(
            "how do i tune the scan settings for low volume regions",
            Intent::Trading,
        );
        assert!(!long.contains("station trading metrics"));
    }

    #[test]
    fn synonyms_are_appended_regardless_of_length() {
        let expanded = expand_query(
            "please explain what the sds number on the order screen means",
            Intent::Other,
        );
        assert!(expanded.contains("scam detection score"));

        let multi = expand_query("cts vs pvi", Intent::Other);
        assert!(multi.contains("composite trade score"));
        assert!(multi.contains("price volatility index"));
    }

    #[test]
    fn hints_are_case_and_punctuation_insensitive() {
        let a = query_hint_pages("How radius scan works?");
        let b = query_hint_pages("how radius scan works");
        assert_eq!(a, b);
        assert!(a.contains("Radius-Scan"));
    }

    #[test]
    fn abbreviations_hint_station_trading_as_whole_tokens() {
        assert!(query_hint_pages("what is cts").contains("Station-Trading"));
        // "products" must not fire the "cts" abbreviation.
        assert!(query_hint_pages("compare products").is_empty());
    }

    #[test]
    fn russian_co_occurrence_rules() {
        assert!(query_hint_pages("как работает радиус скан").contains("Radius-Scan"));
        assert!(query_hint_pages("станционный трейдинг помощь").contains("Station-Trading"));
    }

    #[test]
    fn api_hints() {
        assert!(query_hint_pages("POST /api/chat fails").contains("API-Reference"));
        assert!(query_hint_pages("which api endpoint lists orders").contains("API-Reference"));
    }

    #[test]
    fn execution_plan_hints() {
        assert!(query_hint_pages("my execution plan is stuck").contains("Execution-Plan"));
        assert!(query_hint_pages("items marked done and ignored").contains("Execution-Plan"));
    }

    #[test]
    fn dashboard_and_war_hints() {
        assert!(query_hint_pages("omega plex spread").contains("PLEX-Dashboard"));
        assert!(query_hint_pages("war tracker hot zones").contains("War-Tracker"));
    }

    #[test]
    fn unrelated_query_has_no_hints() {
        assert!(query_hint_pages("hello there").is_empty());
    }
}
