//! Query/document tokenization and locale detection.
//!
//! One tokenizer feeds both the BM25 statistics and the local hash
//! embedder so sparse and dense views of a chunk never diverge.

/// Extract lowercase tokens: maximal runs of letters (any script),
/// digits, `_`, `+`, `-`. Runs shorter than 2 chars are discarded.
pub fn tokenize(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    let mut tokens = Vec::new();
    let mut current = String::new();

    for ch in lowered.chars() {
        if is_token_char(ch) {
            current.push(ch);
        } else if !current.is_empty() {
            if current.chars().count() >= 2 {
                tokens.push(std::mem::take(&mut current));
            } else {
                current.clear();
            }
        }
    }
    if current.chars().count() >= 2 {
        tokens.push(current);
    }

    tokens
}

fn is_token_char(ch: char) -> bool {
    ch.is_alphabetic() || ch.is_ascii_digit() || ch == '_' || ch == '+' || ch == '-'
}

/// Count whitespace-separated units. This is the "token" the chunker
/// budgets against, distinct from the lexical tokens above.
pub fn whitespace_token_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Guess the chunk locale from its script mix: a Cyrillic fraction of
/// at least 0.25 over all letters reads as Russian. Everything else,
/// including letterless input, reads as English.
pub fn detect_locale(text: &str) -> &'static str {
    let mut letters = 0usize;
    let mut cyrillic = 0usize;

    for ch in text.chars() {
        if ch.is_alphabetic() {
            letters += 1;
            if ('\u{0400}'..='\u{04FF}').contains(&ch) {
                cyrillic += 1;
            }
        }
    }

    if letters == 0 {
        return "en";
    }
    if cyrillic as f64 / letters as f64 >= 0.25 {
        "ru"
    } else {
        "en"
    }
}
