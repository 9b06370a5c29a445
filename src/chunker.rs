//! Recursive text chunking against a token budget.
//!
//! Long section bodies are split along a separator cascade (paragraph,
//! line, sentence) so chunk boundaries land on natural breaks, with a
//! token-window fallback for pathological unbroken text. Adjacent
//! chunks share a sliding overlap so context survives the cut.

use crate::text::whitespace_token_count;

/// Separator cascade, coarsest first. Each level only applies to
/// groups the previous level could not fit into the budget.
const SEPARATORS: [&str; 3] = ["\n\n", "\n", ". "];

/// Split `text` into chunks of at most `max_tokens` whitespace tokens
/// (pre-overlap), then prepend to every chunk but the first the last
/// `overlap_tokens` tokens of its pre-overlap predecessor.
pub fn split_with_overlap(text: &str, max_tokens: usize, overlap_tokens: usize) -> Vec<String> {
    let base: Vec<String> = split_recursive(text, max_tokens, &SEPARATORS)
        .into_iter()
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .collect();

    if overlap_tokens == 0 || base.len() <= 1 {
        return base;
    }

    let mut out = Vec::with_capacity(base.len());
    out.push(base[0].clone());
    for i in 1..base.len() {
        // Overlap always comes from the original previous chunk, not
        // its already-overlapped form, so tails do not compound.
        let prev: Vec<&str> = base[i - 1].split_whitespace().collect();
        let tail = prev[prev.len().saturating_sub(overlap_tokens)..].join(" ");
        if tail.is_empty() {
            out.push(base[i].clone());
        } else {
            out.push(format!("{} {}", tail, base[i]));
        }
    }
    out
}

fn split_recursive(text: &str, max_tokens: usize, separators: &[&str]) -> Vec<String> {
    if whitespace_token_count(text) <= max_tokens {
        return vec![text.to_string()];
    }

    for (level, sep) in separators.iter().enumerate() {
        let parts: Vec<&str> = text.split(sep).collect();
        if parts.len() <= 1 {
            continue;
        }

        // Greedily refill groups up to the budget. Every separator in
        // the cascade contains whitespace, so the token count of a
        // joined group is the sum of its parts' counts.
        let mut groups: Vec<String> = Vec::new();
        let mut buffer: Vec<&str> = Vec::new();
        let mut buffered = 0usize;
        for part in parts {
            let count = whitespace_token_count(part);
            if !buffer.is_empty() && buffered + count > max_tokens {
                groups.push(buffer.join(sep));
                buffer.clear();
                buffered = 0;
            }
            buffer.push(part);
            buffered += count;
        }
        if !buffer.is_empty() {
            groups.push(buffer.join(sep));
        }

        let mut out = Vec::new();
        for group in groups {
            if whitespace_token_count(&group) > max_tokens {
                out.extend(split_recursive(&group, max_tokens, &separators[level + 1..]));
            } else {
                out.push(group);
            }
        }
        return out;
    }

    // No separator produced more than one part: fall back to plain
    // non-overlapping token windows.
    let tokens: Vec<&str> = text.split_whitespace().collect();
    tokens
        .chunks(max_tokens.max(1))
        .map(|window| window.join(" "))
        .collect()
}
