//! The canonical section table.
//!
//! Every response is organized into named sections, each bound to exactly one
//! marker glyph. The table is process-wide constant state: loaded once,
//! safe for unsynchronized concurrent reads, never mutated at runtime.
//! "Technical Answer" and "Mentoring Insight" are mandatory in every
//! response; the rest appear only when the generator produced them.

/// A canonical response section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Section {
    /// Exact title text (also the match key, compared case-insensitively).
    pub title: &'static str,
    /// The one designated marker glyph for this section.
    pub glyph: &'static str,
    /// Whether the formatter must guarantee this section's presence.
    pub mandatory: bool,
}

pub const TECHNICAL_ANSWER: &str = "Technical Answer";
pub const MENTORING_INSIGHT: &str = "Mentoring Insight";
pub const NEXT_STEPS: &str = "Next Steps";

/// The fixed, non-configurable section table.
pub const SECTIONS: &[Section] = &[
    Section { title: TECHNICAL_ANSWER, glyph: "🔧", mandatory: true },
    Section { title: MENTORING_INSIGHT, glyph: "🤝", mandatory: true },
    Section { title: NEXT_STEPS, glyph: "📋", mandatory: false },
    Section { title: "Code Requirements", glyph: "📐", mandatory: false },
    Section { title: "Compliance Verification", glyph: "✅", mandatory: false },
    Section { title: "Alternative Solutions", glyph: "🔄", mandatory: false },
    Section { title: "Authority Requirements", glyph: "🏛️", mandatory: false },
    Section { title: "Documentation Needed", glyph: "📄", mandatory: false },
    Section { title: "Workflow Recommendations", glyph: "🗂️", mandatory: false },
    Section { title: "Clarifying Questions", glyph: "❓", mandatory: false },
];

/// Glyphs models have been observed to use for "Mentoring Insight" instead of
/// the canonical one. The formatter forces all of these to the canonical glyph.
pub const WRONG_MENTORING_GLYPHS: &[&str] = &["💡", "🧠", "🎓"];

/// Look up a section by title, case-insensitively.
pub fn find(title: &str) -> Option<&'static Section> {
    let title = title.trim();
    SECTIONS.iter().find(|s| s.title.eq_ignore_ascii_case(title))
}

/// The canonical glyph for a section title, if the title is known.
pub fn glyph_for(title: &str) -> Option<&'static str> {
    find(title).map(|s| s.glyph)
}

/// Render the single canonical header form for a section.
pub fn canonical_header(section: &Section) -> String {
    format!("## {} **{}**", section.glyph, section.title)
}
