//! Line-level text normalization: typography, lists, and table conversion.
//!
//! All passes here are pure and idempotent; re-running any of them on its
//! own output produces no further change.

use regex::Regex;
use std::sync::LazyLock;

static NUMBERED_ITEM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\s*)(\d+)[.)]\s+(.*)$").unwrap());

/// Bullet glyphs normalized to the single dash-bullet style.
const BULLET_GLYPHS: &[&str] = &["• ", "◦ ", "▪ ", "* "];

/// Alternating markers for converted table body rows.
const ROW_MARKERS: [&str; 2] = ["▸", "▹"];

fn is_blank(line: &str) -> bool {
    line.trim().is_empty()
}

fn is_header(line: &str) -> bool {
    line.trim_start().starts_with('#')
}

fn is_list_item(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with("- ") || NUMBERED_ITEM.is_match(line)
}

fn is_bold_line(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.len() > 4 && trimmed.starts_with("**") && trimmed.ends_with("**")
}

fn is_table_or_marker_row(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with('|')
        || ROW_MARKERS.iter().any(|m| trimmed.starts_with(m))
        || line.contains('|')
}

/// Collapse runs of 3+ blank lines to exactly 2; ensure a blank line follows
/// a bolded header line; insert a blank line before a capitalized sentence
/// start that immediately follows another prose line (paragraph separation
/// heuristic).
pub fn normalize_typography(text: &str) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let mut out: Vec<String> = Vec::with_capacity(lines.len());

    for line in &lines {
        let starts_paragraph = line
            .trim_start()
            .chars()
            .next()
            .is_some_and(|c| c.is_uppercase());

        if let Some(prev) = out.last() {
            let prev_ends_sentence = prev
                .trim_end()
                .chars()
                .last()
                .is_some_and(|c| matches!(c, '.' | '!' | '?' | ':'));

            let needs_break = if is_bold_line(prev) && !is_blank(line) {
                // Bolded header lines always get a following blank line.
                true
            } else {
                starts_paragraph
                    && prev_ends_sentence
                    && !is_blank(prev)
                    && !is_header(prev)
                    && !is_header(line)
                    && !is_list_item(prev)
                    && !is_list_item(line)
                    && !is_table_or_marker_row(prev)
                    && !is_table_or_marker_row(line)
                    && !is_bold_line(line)
            };
            if needs_break {
                out.push(String::new());
            }
        }
        out.push((*line).to_string());
    }

    // Collapse 3+ consecutive blank lines to exactly 2.
    let mut collapsed: Vec<String> = Vec::with_capacity(out.len());
    let mut blanks = 0usize;
    for line in out {
        if is_blank(&line) {
            blanks += 1;
            if blanks <= 2 {
                collapsed.push(String::new());
            }
        } else {
            blanks = 0;
            collapsed.push(line);
        }
    }

    collapsed.join("\n")
}

/// Convert every bullet variant to the dash-bullet style and normalize
/// numbered-list punctuation to `N. `.
pub fn normalize_lists(text: &str) -> String {
    text.lines()
        .map(|line| {
            let indent_len = line.len() - line.trim_start().len();
            let (indent, rest) = line.split_at(indent_len);
            for glyph in BULLET_GLYPHS {
                if let Some(item) = rest.strip_prefix(glyph) {
                    return format!("{indent}- {item}");
                }
            }
            if let Some(caps) = NUMBERED_ITEM.captures(line) {
                return format!("{}{}. {}", &caps[1], &caps[2], &caps[3]);
            }
            line.to_string()
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn is_separator_row(line: &str) -> bool {
    let trimmed = line.trim();
    !trimmed.is_empty()
        && trimmed.contains('-')
        && trimmed
            .chars()
            .all(|c| matches!(c, '|' | '-' | ':' | ' '))
}

fn split_cells(line: &str) -> Vec<String> {
    line.trim()
        .trim_matches('|')
        .split('|')
        .map(|c| c.trim().to_string())
        .collect()
}

/// Detect markdown pipe tables (header row + separator row + body rows) and
/// convert each to a styled block: a bolded header line followed by body
/// rows with alternating markers. This is the only structural reshaping
/// beyond section headers.
pub fn convert_tables(text: &str) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let mut out: Vec<String> = Vec::with_capacity(lines.len());
    let mut i = 0;

    while i < lines.len() {
        let looks_like_header = lines[i].contains('|') && lines[i].matches('|').count() >= 2;
        let has_separator = looks_like_header
            && i + 1 < lines.len()
            && is_separator_row(lines[i + 1])
            && lines[i + 1].contains('|');

        if !has_separator {
            out.push(lines[i].to_string());
            i += 1;
            continue;
        }

        out.push(format!("**{}**", split_cells(lines[i]).join(" | ")));
        i += 2; // skip header + separator
        if i < lines.len() {
            out.push(String::new());
        }

        let mut row = 0usize;
        while i < lines.len() && lines[i].contains('|') && !is_separator_row(lines[i]) {
            let marker = ROW_MARKERS[row % 2];
            out.push(format!("{marker} {}", split_cells(lines[i]).join(" | ")));
            row += 1;
            i += 1;
        }
        // A trailing blank here would be dropped by the next `lines()` pass,
        // so it only goes in when more text follows.
        if i < lines.len() {
            out.push(String::new());
        }
    }

    out.join("\n")
}
