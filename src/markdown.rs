//! Markdown sectioning: split a wiki page into (heading path, body)
//! sections at heading levels 1-3.

use regex::Regex;
use std::sync::LazyLock;

static HEADING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(#{1,3})\s+(.*\S)\s*$").unwrap());

#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    /// Heading breadcrumb from level 1 down. Empty for body content
    /// that precedes the first heading.
    pub headings: Vec<String>,
    pub content: String,
}

/// Split a document into sections. Levels deeper than 3 (and every
/// non-heading line) are treated as body text. Skipped heading levels
/// are padded with a literal "Section" so the breadcrumb depth always
/// matches the heading level.
pub fn split_sections(text: &str) -> Vec<Section> {
    let normalized = text.replace("\r\n", "\n");

    let mut sections = Vec::new();
    let mut stack: Vec<String> = Vec::new();
    let mut body = String::new();

    let flush = |stack: &[String], body: &mut String, out: &mut Vec<Section>| {
        let content = body.trim();
        if !content.is_empty() {
            out.push(Section {
                headings: stack.to_vec(),
                content: content.to_string(),
            });
        }
        body.clear();
    };

    for line in normalized.lines() {
        if let Some(caps) = HEADING_RE.captures(line) {
            flush(&stack, &mut body, &mut sections);

            let level = caps[1].len();
            let title = caps[2].to_string();
            stack.truncate(level - 1);
            while stack.len() < level - 1 {
                stack.push("Section".to_string());
            }
            stack.push(title);
        } else {
            body.push_str(line);
            body.push('\n');
        }
    }
    flush(&stack, &mut body, &mut sections);

    // A page with headings but no body under any of them still needs to
    // be retrievable as a whole.
    if sections.is_empty() {
        let whole = normalized.trim();
        if !whole.is_empty() {
            sections.push(Section {
                headings: Vec::new(),
                content: whole.to_string(),
            });
        }
    }

    sections
}
