//! Response formatting for SiteMentor.
//!
//! [`format`] normalizes arbitrary generator output into the canonical
//! section structure: every known section title is rewritten to the single
//! form `## {glyph} **{Title}**`, typography and lists are cleaned up, pipe
//! tables become styled blocks, and the mandatory sections ("Technical
//! Answer", "Mentoring Insight", plus "Next Steps") are guaranteed present.
//!
//! The whole pass is a deterministic, pure function of the input string and
//! the fixed section table; no network or storage calls, and running it
//! twice produces no further change.

pub mod text;

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use sitementor_core::sections::{
    self, canonical_header, Section, MENTORING_INSIGHT, NEXT_STEPS, SECTIONS, TECHNICAL_ANSWER,
    WRONG_MENTORING_GLYPHS,
};

/// One detected section marker in the formatted text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmojiItem {
    /// Canonical section name.
    pub name: String,
    /// The section's marker glyph.
    pub char: String,
}

/// The result of formatting one raw generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormattedResponse {
    /// Canonical-structure text.
    pub text: String,
    /// One entry per canonical section marker found in `text`.
    pub emoji_items: Vec<EmojiItem>,
}

static MENTORING_BODY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)## 🤝 \*\*Mentoring Insight\*\*\s*(.*?)(?:\n## |\z)").unwrap()
});

/// Generic mentoring text appended when the generator produced none.
const GENERIC_MENTORING: &str = "Every detail you document today saves a dispute tomorrow. \
Keep building the habit of verifying requirements before work starts on site.";

/// Generic next-steps list appended when the generator produced none.
const GENERIC_NEXT_STEPS: &str = "- Review the relevant code clauses for your project\n\
- Confirm requirements with your certifier before installation\n\
- Document the installed system with photos and product data sheets";

/// Normalize raw generation text into the canonical section structure.
pub fn format(raw: &str) -> FormattedResponse {
    let text = normalize_headers(raw);
    let text = text::normalize_typography(&text);
    let text = text::normalize_lists(&text);
    let text = text::convert_tables(&text);

    let text = ensure_mandatory_sections(&text);
    let emoji_items = extract_emoji_items(&text);

    FormattedResponse { text, emoji_items }
}

/// Pull just the body of the "Mentoring Insight" section, up to the next
/// header or end of text.
pub fn extract_mentoring_insight(text: &str) -> Option<String> {
    let body = MENTORING_BODY.captures(text)?.get(1)?.as_str().trim();
    (!body.is_empty()).then(|| body.to_string())
}

/// Strip a line down to its bare title text: heading markers, bold markers,
/// glyphs, and trailing colons all removed.
fn bare_title(line: &str) -> String {
    let cleaned: String = line
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Identify a line as a section header, regardless of which marker glyph or
/// heading level precedes the title (including none at all).
fn match_section(line: &str) -> Option<&'static Section> {
    // A long prose line that merely mentions a title is not a header.
    if line.trim().chars().count() > 64 {
        return None;
    }
    // Models have been seen marking "Mentoring Insight" with a handful of
    // wrong glyphs; whatever glyph appears before that exact title text is
    // forced to the canonical one. The generic rule below covers them, and
    // they are checked explicitly so the correction is deliberate, not
    // incidental.
    if WRONG_MENTORING_GLYPHS.iter().any(|g| line.contains(g))
        && bare_title(line).eq_ignore_ascii_case(MENTORING_INSIGHT)
    {
        return sections::find(MENTORING_INSIGHT);
    }
    sections::find(&bare_title(line))
}

/// Rewrite every recognizable section header to the canonical
/// `## {glyph} **{Title}**` form, followed by a blank line. Each section
/// appears at most once: a repeated header is dropped and its body merges
/// into the first occurrence.
fn normalize_headers(raw: &str) -> String {
    let lines: Vec<&str> = raw.lines().collect();
    let mut out: Vec<String> = Vec::with_capacity(lines.len());
    let mut seen: Vec<&'static str> = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];
        match match_section(line) {
            Some(section) if seen.contains(&section.title) => {
                // Duplicate marker: drop it (and its separator blank when the
                // preceding output already ends blank), keep the body.
                if lines.get(i + 1).is_some_and(|next| next.trim().is_empty())
                    && out.last().is_none_or(|prev| prev.trim().is_empty())
                {
                    i += 1;
                }
            }
            Some(section) => {
                seen.push(section.title);
                out.push(canonical_header(section));
                let next_is_blank = lines
                    .get(i + 1)
                    .is_none_or(|next| next.trim().is_empty());
                if !next_is_blank {
                    out.push(String::new());
                }
            }
            None => out.push(line.to_string()),
        }
        i += 1;
    }

    out.join("\n")
}

/// Scan for each canonical `{glyph} **{Title}**` occurrence. If anything was
/// found but "Mentoring Insight" was not among the matches, synthesize it:
/// once formatting has produced any structure, the mentoring marker is
/// guaranteed to be reported.
fn extract_emoji_items(text: &str) -> Vec<EmojiItem> {
    let mut items: Vec<EmojiItem> = SECTIONS
        .iter()
        .filter(|s| text.contains(&canonical_header(s)))
        .map(|s| EmojiItem {
            name: s.title.to_string(),
            char: s.glyph.to_string(),
        })
        .collect();

    if !items.is_empty() && !items.iter().any(|i| i.name == MENTORING_INSIGHT) {
        if let Some(mentoring) = sections::find(MENTORING_INSIGHT) {
            items.push(EmojiItem {
                name: mentoring.title.to_string(),
                char: mentoring.glyph.to_string(),
            });
        }
    }
    items
}

/// Final completeness pass: guarantee the two mandatory sections plus
/// "Next Steps" are present regardless of what the generator produced.
/// Table order puts Technical Answer first, so the prepend happens before
/// the appends.
fn ensure_mandatory_sections(text: &str) -> String {
    let mut result = text.trim_end().to_string();

    for section in SECTIONS {
        let header = canonical_header(section);
        if result.contains(&header) {
            continue;
        }
        match section.title {
            t if t == TECHNICAL_ANSWER => {
                result = if result.is_empty() {
                    header
                } else {
                    format!("{header}\n\n{result}")
                };
            }
            t if t == MENTORING_INSIGHT => {
                result = format!("{result}\n\n{header}\n\n{GENERIC_MENTORING}");
            }
            t if t == NEXT_STEPS => {
                result = format!("{result}\n\n{header}\n\n{GENERIC_NEXT_STEPS}");
            }
            _ => {}
        }
    }
    result
}
