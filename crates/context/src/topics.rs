//! Topic anchoring for pronoun resolution.
//!
//! A deliberately low-precision heuristic: a small static table of keywords
//! mapped to domain topics, matched by case-insensitive substring scan over
//! recent turn text. It is a pragmatic disambiguation aid, not a semantic
//! system. Anchors are derived per request and never persisted.

use sitementor_core::turn::Turn;

/// One row of the fixed keyword table.
struct TopicRow {
    key: &'static str,
    label: &'static str,
    keywords: &'static [&'static str],
}

const TOPIC_TABLE: &[TopicRow] = &[
    TopicRow {
        key: "acoustic_system",
        label: "acoustic lagging",
        keywords: &["acoustic lagging", "acoustic", "soundproof", "lagging"],
    },
    TopicRow {
        key: "fire_system",
        label: "fire safety systems",
        keywords: &["fire collar", "fire damper", "fire rating", "fire-rated", "fire safety", "firestop"],
    },
    TopicRow {
        key: "waterproofing_system",
        label: "waterproofing membranes",
        keywords: &["waterproof", "membrane", "wet area"],
    },
    TopicRow {
        key: "insulation_system",
        label: "thermal insulation",
        keywords: &["insulation", "thermal", "r-value"],
    },
    TopicRow {
        key: "penetration_system",
        label: "service penetrations",
        keywords: &["penetration"],
    },
];

/// Single referential words that trigger a context hint.
const REFERENTIAL_WORDS: &[&str] = &["it", "this", "that", "them", "these", "those"];

/// Referential bigrams ("when do I need to install...").
const REFERENTIAL_BIGRAMS: &[&str] = &["when do", "where do", "how do", "why do"];

/// Ordered topic→label anchors, most recently mentioned last.
///
/// Re-inserting an existing key moves it to the end, so the most recent
/// mention of a topic always wins.
#[derive(Debug, Clone, Default)]
pub struct TopicAnchors {
    entries: Vec<(&'static str, &'static str)>,
}

impl TopicAnchors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or refresh an anchor; the key moves to the most-recent slot.
    pub fn insert(&mut self, key: &'static str, label: &'static str) {
        self.entries.retain(|(k, _)| *k != key);
        self.entries.push((key, label));
    }

    /// The most recently inserted anchor.
    pub fn last(&self) -> Option<(&'static str, &'static str)> {
        self.entries.last().copied()
    }

    pub fn get(&self, key: &str) -> Option<&'static str> {
        self.entries
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, label)| *label)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Scan recent turns for topic keywords. Turns are scanned in chronological
/// order, so a topic mentioned in a later turn overwrites an earlier mention.
pub fn extract_topics(turns: &[Turn]) -> TopicAnchors {
    let mut anchors = TopicAnchors::new();
    for turn in turns {
        let mut text = turn.question.to_lowercase();
        if let Some(response) = &turn.response {
            text.push(' ');
            text.push_str(&response.to_lowercase());
        }
        for row in TOPIC_TABLE {
            if row.keywords.iter().any(|kw| text.contains(kw)) {
                anchors.insert(row.key, row.label);
            }
        }
    }
    anchors
}

/// Whether the question contains a referential trigger: one of the fixed
/// pronouns as a whole word, or one of the fixed bigrams anywhere.
pub fn has_referential_trigger(question: &str) -> bool {
    let lowered = question.to_lowercase();
    if REFERENTIAL_BIGRAMS.iter().any(|b| lowered.contains(b)) {
        return true;
    }
    lowered
        .split(|c: char| !c.is_alphanumeric())
        .any(|word| REFERENTIAL_WORDS.contains(&word))
}

/// Build the contextual hint injected into the prompt for follow-up
/// questions. Empty unless the question contains a referential trigger and
/// at least one topic is anchored.
///
/// Only the most recently added topic is surfaced; last-topic-wins is the
/// deliberate disambiguation rule, and it will misresolve genuinely
/// ambiguous multi-topic follow-ups ("what about the other one?"). That is
/// a known non-guarantee, not a bug.
pub fn build_context_hint(question: &str, topics: &TopicAnchors) -> String {
    if !has_referential_trigger(question) {
        return String::new();
    }
    let Some((_, label)) = topics.last() else {
        return String::new();
    };
    format!(
        "CONVERSATION CONTEXT: the user's question refers back to the earlier \
         discussion about {label}. Answer the question about {label} directly; \
         do not ask which system they mean."
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn completed_turn(question: &str, response: &str) -> Turn {
        let mut turn = Turn::stub("s1", None, question);
        turn.complete(response, 10);
        turn
    }

    #[test]
    fn extracts_topic_from_question() {
        let turns = vec![completed_turn("Tell me about acoustic lagging", "Sure...")];
        let anchors = extract_topics(&turns);
        assert_eq!(anchors.get("acoustic_system"), Some("acoustic lagging"));
    }

    #[test]
    fn extracts_topic_from_response() {
        let turns = vec![completed_turn(
            "What do I need around pipes?",
            "You will need a fire collar rated for the wall type.",
        )];
        let anchors = extract_topics(&turns);
        assert_eq!(anchors.get("fire_system"), Some("fire safety systems"));
    }

    #[test]
    fn later_mention_wins() {
        let turns = vec![
            completed_turn("Tell me about fire dampers", "Fire dampers..."),
            completed_turn("And acoustic lagging?", "Acoustic lagging..."),
        ];
        let anchors = extract_topics(&turns);
        assert_eq!(anchors.len(), 2);
        assert_eq!(anchors.last().unwrap().0, "acoustic_system");
    }

    #[test]
    fn re_mention_moves_topic_to_front() {
        let turns = vec![
            completed_turn("fire rating question", "..."),
            completed_turn("acoustic question", "..."),
            completed_turn("back to the fire damper", "..."),
        ];
        let anchors = extract_topics(&turns);
        assert_eq!(anchors.last().unwrap().0, "fire_system");
    }

    #[test]
    fn matching_is_case_insensitive() {
        let turns = vec![completed_turn("ACOUSTIC LAGGING requirements?", "...")];
        assert!(!extract_topics(&turns).is_empty());
    }

    #[test]
    fn pronouns_trigger_as_whole_words_only() {
        assert!(has_referential_trigger("when do I need to install it?"));
        assert!(has_referential_trigger("Is this required?"));
        assert!(has_referential_trigger("What about those?"));
        // "it" inside a longer word must not trigger
        assert!(!has_referential_trigger("install the item per spec"));
        assert!(!has_referential_trigger("tell me about acoustic lagging"));
    }

    #[test]
    fn bigrams_trigger() {
        assert!(has_referential_trigger("How do I certify the install?"));
        assert!(has_referential_trigger("where do the collars go"));
    }

    #[test]
    fn hint_names_most_recent_topic_only() {
        let mut anchors = TopicAnchors::new();
        anchors.insert("fire_system", "fire safety systems");
        anchors.insert("acoustic_system", "acoustic lagging");

        let hint = build_context_hint("when do I need to install it?", &anchors);
        assert!(hint.contains("acoustic lagging"));
        assert!(!hint.contains("fire safety"));
    }

    #[test]
    fn hint_empty_without_trigger() {
        let mut anchors = TopicAnchors::new();
        anchors.insert("acoustic_system", "acoustic lagging");
        assert!(build_context_hint("tell me about fire collars", &anchors).is_empty());
    }

    #[test]
    fn hint_empty_without_topics() {
        let anchors = TopicAnchors::new();
        assert!(build_context_hint("when do I install it?", &anchors).is_empty());
    }
}
