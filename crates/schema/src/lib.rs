//! Schema validation and repair for generator output.
//!
//! [`SchemaGuard`] is the single gate every response passes through before
//! reaching a client. Well-formed payloads pass untouched; legacy flat-text
//! payloads are mapped into the current shape; malformed payloads get their
//! missing fields synthesized. Only a payload that is still invalid after
//! repair is rejected, and the guard keeps running counters so a drifting
//! generator shows up in metrics before users notice.

use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

use sitementor_core::error::SchemaError;
use sitementor_core::response::{Block, ResponseMeta, StructuredResponse, SCHEMA_VERSION};
use sitementor_core::sections::{self, TECHNICAL_ANSWER};

/// Fallback summary when nothing usable can be pulled from the payload.
const GENERIC_SUMMARY: &str =
    "Guidance on your construction compliance question is provided below.";

/// Structural classification of an incoming payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// Has the current top-level fields.
    WellFormed,
    /// The pre-v2 flat shape: a top-level `text` field and no `title`.
    Legacy,
    /// Anything else.
    Malformed,
}

/// Classify a payload by its top-level fields alone.
pub fn classify(value: &Value) -> Shape {
    let Some(obj) = value.as_object() else {
        return Shape::Malformed;
    };
    if obj.contains_key("title")
        && obj.contains_key("summary")
        && obj.contains_key("blocks")
        && obj.contains_key("meta")
    {
        return Shape::WellFormed;
    }
    if obj.get("text").is_some_and(Value::is_string) && !obj.contains_key("title") {
        return Shape::Legacy;
    }
    Shape::Malformed
}

// ── Metrics ──

/// Running counters for guard activity. All counters are monotonic between
/// [`GuardMetrics::reset`] calls and safe to bump from concurrent requests.
#[derive(Debug, Default)]
pub struct GuardMetrics {
    validated: AtomicU64,
    repaired: AtomicU64,
    legacy_mapped: AtomicU64,
    failed: AtomicU64,
    missing_title: AtomicU64,
    missing_summary: AtomicU64,
    missing_blocks: AtomicU64,
    missing_meta: AtomicU64,
}

/// A point-in-time view of [`GuardMetrics`], serializable for diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub validated: u64,
    pub repaired: u64,
    pub legacy_mapped: u64,
    pub failed: u64,
    pub missing_title: u64,
    pub missing_summary: u64,
    pub missing_blocks: u64,
    pub missing_meta: u64,
    /// Share of responses that needed repair, as a percentage.
    pub repair_rate_pct: f64,
    /// Whether the repair rate is within the 0.5% operating threshold.
    pub acceptable: bool,
}

/// Repair rate above this percentage indicates generator drift.
pub const REPAIR_RATE_THRESHOLD_PCT: f64 = 0.5;

impl GuardMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let validated = self.validated.load(Ordering::Relaxed);
        let repaired = self.repaired.load(Ordering::Relaxed);
        let repair_rate_pct = if validated == 0 {
            0.0
        } else {
            repaired as f64 / validated as f64 * 100.0
        };
        MetricsSnapshot {
            validated,
            repaired,
            legacy_mapped: self.legacy_mapped.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            missing_title: self.missing_title.load(Ordering::Relaxed),
            missing_summary: self.missing_summary.load(Ordering::Relaxed),
            missing_blocks: self.missing_blocks.load(Ordering::Relaxed),
            missing_meta: self.missing_meta.load(Ordering::Relaxed),
            repair_rate_pct,
            acceptable: repair_rate_pct <= REPAIR_RATE_THRESHOLD_PCT,
        }
    }

    pub fn reset(&self) {
        for counter in [
            &self.validated,
            &self.repaired,
            &self.legacy_mapped,
            &self.failed,
            &self.missing_title,
            &self.missing_summary,
            &self.missing_blocks,
            &self.missing_meta,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

// ── Guard ──

/// Validates, maps, and repairs response payloads.
#[derive(Debug, Default)]
pub struct SchemaGuard {
    metrics: GuardMetrics,
}

impl SchemaGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn metrics(&self) -> &GuardMetrics {
        &self.metrics
    }

    /// Validate a payload, repairing it into shape if needed.
    ///
    /// Returns the valid response and whether it had to be mapped or
    /// repaired. A payload that is still invalid after repair is a hard
    /// error; there is no pass-through for broken output.
    pub fn ensure_valid(
        &self,
        value: Value,
    ) -> std::result::Result<(StructuredResponse, bool), SchemaError> {
        GuardMetrics::bump(&self.metrics.validated);

        if classify(&value) == Shape::WellFormed {
            if let Ok(response) = serde_json::from_value::<StructuredResponse>(value.clone()) {
                if response.validate().is_ok() {
                    return Ok((response, false));
                }
            }
        }

        GuardMetrics::bump(&self.metrics.repaired);
        let repaired = match classify(&value) {
            Shape::Legacy => {
                GuardMetrics::bump(&self.metrics.legacy_mapped);
                debug!("Mapping legacy flat-text payload to current schema");
                self.convert_legacy(&value)
            }
            _ => {
                warn!("Repairing malformed response payload");
                self.repair_malformed(value)
            }
        };

        match repaired.validate() {
            Ok(()) => Ok((repaired, true)),
            Err(e) => {
                GuardMetrics::bump(&self.metrics.failed);
                Err(SchemaError::RepairFailed(e.to_string()))
            }
        }
    }

    /// Map the pre-v2 flat shape (`{"text": ..., "mentoring_insight": ...,
    /// "meta": {...}}`) into the current one. The whole text becomes a single
    /// markdown block; title and summary are derived from its content.
    fn convert_legacy(&self, value: &Value) -> StructuredResponse {
        let text = value
            .get("text")
            .and_then(Value::as_str)
            .unwrap_or_default();

        let title = first_heading_title(text)
            .unwrap_or_else(|| TECHNICAL_ANSWER.to_string());

        let summary = value
            .get("mentoring_insight")
            .and_then(Value::as_str)
            .map(|s| truncate(s.trim(), 200))
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| summarize(text));

        let mut meta = ResponseMeta::new(
            value
                .get("meta")
                .and_then(|m| m.get("emoji"))
                .and_then(Value::as_str)
                .unwrap_or("🔧"),
        );
        meta.mapped = true;
        if let Some(extras) = value.get("meta").and_then(Value::as_object) {
            for (key, val) in extras {
                if !matches!(key.as_str(), "emoji" | "schema" | "mapped") {
                    meta.extra.insert(key.clone(), val.clone());
                }
            }
        }

        StructuredResponse {
            title,
            summary,
            blocks: vec![Block::markdown(text)],
            meta,
        }
    }

    /// Synthesize whatever top-level fields are missing or unusable,
    /// counting each kind so drift is attributable.
    fn repair_malformed(&self, value: Value) -> StructuredResponse {
        let obj = value.as_object().cloned().unwrap_or_else(Map::new);

        let title = match obj.get("title").and_then(Value::as_str) {
            Some(t) if !t.trim().is_empty() => t.trim().to_string(),
            _ => {
                GuardMetrics::bump(&self.metrics.missing_title);
                TECHNICAL_ANSWER.to_string()
            }
        };

        let summary = match obj.get("summary").and_then(Value::as_str) {
            Some(s) if !s.trim().is_empty() => s.trim().to_string(),
            _ => {
                GuardMetrics::bump(&self.metrics.missing_summary);
                GENERIC_SUMMARY.to_string()
            }
        };

        let blocks = obj
            .get("blocks")
            .and_then(|b| serde_json::from_value::<Vec<Block>>(b.clone()).ok())
            .filter(|blocks| {
                !blocks.is_empty() && blocks.iter().all(|b| !b.content.trim().is_empty())
            })
            .unwrap_or_else(|| {
                GuardMetrics::bump(&self.metrics.missing_blocks);
                // Whatever text-like content exists becomes the one block.
                let content = obj
                    .get("text")
                    .or_else(|| obj.get("content"))
                    .and_then(Value::as_str)
                    .filter(|s| !s.trim().is_empty())
                    .unwrap_or(GENERIC_SUMMARY);
                vec![Block::markdown(content)]
            });

        let meta = obj
            .get("meta")
            .and_then(|m| serde_json::from_value::<ResponseMeta>(m.clone()).ok())
            .map(|mut m| {
                if m.emoji.trim().is_empty() {
                    m.emoji = "🔧".into();
                }
                m.schema = SCHEMA_VERSION.into();
                m.mapped = true;
                m
            })
            .unwrap_or_else(|| {
                GuardMetrics::bump(&self.metrics.missing_meta);
                let mut m = ResponseMeta::new("🔧");
                m.mapped = true;
                m
            });

        StructuredResponse {
            title,
            summary,
            blocks,
            meta,
        }
    }
}

/// Pull a title from the first heading-looking line of flat text: a markdown
/// heading, or a bold line carrying a known section glyph.
fn first_heading_title(text: &str) -> Option<String> {
    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let heading = trimmed.starts_with('#')
            || (trimmed.contains("**")
                && sections::SECTIONS.iter().any(|s| trimmed.contains(s.glyph)));
        if !heading {
            continue;
        }
        let cleaned: String = trimmed
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { ' ' })
            .collect();
        let title = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
        if !title.is_empty() {
            return Some(truncate(&title, 80));
        }
    }
    None
}

/// First sentence of the text, capped at 200 characters.
fn summarize(text: &str) -> String {
    let prose = text
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty() && !l.starts_with('#'))
        .unwrap_or_default();
    let sentence = prose
        .split_inclusive(['.', '!', '?'])
        .next()
        .unwrap_or(prose)
        .trim();
    if sentence.is_empty() {
        GENERIC_SUMMARY.to_string()
    } else {
        truncate(sentence, 200)
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_chars).collect();
        format!("{}…", cut.trim_end())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid_payload() -> Value {
        json!({
            "title": "Technical Answer",
            "summary": "Fire collars are required at service penetrations.",
            "blocks": [{"type": "markdown", "content": "## 🔧 **Technical Answer**\n\nBody."}],
            "meta": {"emoji": "🔧", "schema": "v2", "mapped": false}
        })
    }

    #[test]
    fn classify_shapes() {
        assert_eq!(classify(&valid_payload()), Shape::WellFormed);
        assert_eq!(classify(&json!({"text": "flat"})), Shape::Legacy);
        assert_eq!(classify(&json!({"whatever": 1})), Shape::Malformed);
        assert_eq!(classify(&json!("not an object")), Shape::Malformed);
    }

    #[test]
    fn valid_payload_passes_untouched() {
        let guard = SchemaGuard::new();
        let (response, repaired) = guard.ensure_valid(valid_payload()).unwrap();
        assert!(!repaired);
        assert!(!response.meta.mapped);
        assert_eq!(guard.metrics().snapshot().repaired, 0);
    }

    #[test]
    fn legacy_payload_is_mapped() {
        let guard = SchemaGuard::new();
        let payload = json!({
            "text": "## 🔧 **Technical Answer**\n\nCollars go on the pipe.",
            "mentoring_insight": "Always photograph the installation.",
            "meta": {"emoji": "🔧", "tokens_used": 42}
        });
        let (response, repaired) = guard.ensure_valid(payload).unwrap();
        assert!(repaired);
        assert!(response.meta.mapped);
        assert_eq!(response.title, "Technical Answer");
        assert_eq!(response.summary, "Always photograph the installation.");
        assert_eq!(response.blocks.len(), 1);
        assert!(response.blocks[0].content.contains("Collars go on the pipe."));
        assert_eq!(response.meta.schema, "v2");
        assert_eq!(response.meta.extra.get("tokens_used").unwrap(), 42);
        assert_eq!(guard.metrics().snapshot().legacy_mapped, 1);
    }

    #[test]
    fn legacy_without_insight_summarizes_text() {
        let guard = SchemaGuard::new();
        let payload = json!({
            "text": "The membrane must extend 150mm up the wall. Additional detail follows here."
        });
        let (response, _) = guard.ensure_valid(payload).unwrap();
        assert_eq!(response.summary, "The membrane must extend 150mm up the wall.");
        assert_eq!(response.title, "Technical Answer");
    }

    #[test]
    fn malformed_fields_are_synthesized() {
        let guard = SchemaGuard::new();
        let payload = json!({"blocks": [{"type": "markdown", "content": "Some body."}]});
        let (response, repaired) = guard.ensure_valid(payload).unwrap();
        assert!(repaired);
        assert_eq!(response.title, "Technical Answer");
        assert!(!response.summary.is_empty());
        assert_eq!(response.blocks[0].content, "Some body.");

        let snapshot = guard.metrics().snapshot();
        assert_eq!(snapshot.missing_title, 1);
        assert_eq!(snapshot.missing_summary, 1);
        assert_eq!(snapshot.missing_blocks, 0);
        assert_eq!(snapshot.missing_meta, 1);
    }

    #[test]
    fn empty_blocks_are_replaced() {
        let guard = SchemaGuard::new();
        let payload = json!({
            "title": "T", "summary": "S", "blocks": [], "meta": {"emoji": "🔧", "schema": "v2", "mapped": false},
            "text": "salvaged body text"
        });
        let (response, repaired) = guard.ensure_valid(payload).unwrap();
        assert!(repaired);
        assert_eq!(response.blocks[0].content, "salvaged body text");
        assert_eq!(guard.metrics().snapshot().missing_blocks, 1);
    }

    #[test]
    fn wrong_schema_tag_is_corrected() {
        let mut payload = valid_payload();
        payload["meta"]["schema"] = json!("v1");
        let guard = SchemaGuard::new();
        let (response, repaired) = guard.ensure_valid(payload).unwrap();
        assert!(repaired);
        assert_eq!(response.meta.schema, "v2");
        assert!(response.meta.mapped);
    }

    #[test]
    fn unrepairable_payload_is_rejected() {
        let guard = SchemaGuard::new();
        // Legacy with an empty text body leaves an empty block after mapping.
        let err = guard.ensure_valid(json!({"text": ""})).unwrap_err();
        assert!(matches!(err, SchemaError::RepairFailed(_)));
        assert_eq!(guard.metrics().snapshot().failed, 1);
    }

    #[test]
    fn repair_rate_tracks_threshold() {
        let guard = SchemaGuard::new();
        for _ in 0..199 {
            guard.ensure_valid(valid_payload()).unwrap();
        }
        guard.ensure_valid(json!({"text": "flat body."})).unwrap();

        let snapshot = guard.metrics().snapshot();
        assert_eq!(snapshot.validated, 200);
        assert_eq!(snapshot.repaired, 1);
        assert!((snapshot.repair_rate_pct - 0.5).abs() < f64::EPSILON);
        assert!(snapshot.acceptable);

        guard.ensure_valid(json!({"text": "another flat one."})).unwrap();
        assert!(!guard.metrics().snapshot().acceptable);
    }

    #[test]
    fn reset_clears_counters() {
        let guard = SchemaGuard::new();
        guard.ensure_valid(json!({"text": "flat."})).unwrap();
        guard.metrics().reset();
        let snapshot = guard.metrics().snapshot();
        assert_eq!(snapshot.validated, 0);
        assert_eq!(snapshot.repaired, 0);
        assert_eq!(snapshot.repair_rate_pct, 0.0);
    }

    #[test]
    fn heading_title_extraction() {
        assert_eq!(
            first_heading_title("## 🔧 **Technical Answer**\nbody").as_deref(),
            Some("Technical Answer")
        );
        assert_eq!(
            first_heading_title("# Fire Collar Basics\nbody").as_deref(),
            Some("Fire Collar Basics")
        );
        assert_eq!(first_heading_title("plain prose only"), None);
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let long = "建".repeat(250);
        let out = truncate(&long, 200);
        assert_eq!(out.chars().count(), 201); // 200 kept + ellipsis
    }
}
