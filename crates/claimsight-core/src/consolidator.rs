//! Context consolidation: fan-in of per-unit results.
//!
//! Results are regrouped by modality and re-sorted by ordinal, so the
//! order in which units finished never leaks into the adjudication context.
//! Failed units stay visible as entries; a modality with no evidence at all
//! becomes the [`NO_DATA_SENTINEL`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};

use crate::types::{CaseShape, Modality, Payload, TaskKey, TaskResult};

/// Rendered in place of a modality the caller supplied no evidence for.
pub const NO_DATA_SENTINEL: &str = "no data provided";

/// Separator between audio transcripts.
pub const TRANSCRIPT_SEPARATOR: &str = " | ";

/// One position inside a modality slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SlotEntry {
    Ok { ordinal: usize, payload: Payload },
    Failed { ordinal: usize, error: String },
}

impl SlotEntry {
    pub fn ordinal(&self) -> usize {
        match self {
            SlotEntry::Ok { ordinal, .. } | SlotEntry::Failed { ordinal, .. } => *ordinal,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, SlotEntry::Failed { .. })
    }

    fn render_text(&self, modality: Modality) -> String {
        match self {
            SlotEntry::Ok { payload, .. } => payload.render(),
            SlotEntry::Failed { ordinal, error } => failure_line(modality, *ordinal, error),
        }
    }

    fn render_json(&self, modality: Modality) -> JsonValue {
        match self {
            SlotEntry::Ok { payload, .. } => payload.to_json(),
            SlotEntry::Failed { ordinal, error } => {
                JsonValue::String(failure_line(modality, *ordinal, error))
            }
        }
    }
}

fn failure_line(modality: Modality, ordinal: usize, error: &str) -> String {
    format!("{} item {} failed: {}", modality, ordinal + 1, error)
}

/// All results for one modality, in input order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", content = "entries", rename_all = "snake_case")]
pub enum EvidenceSlot {
    /// The caller supplied no evidence of this modality.
    NoData,
    /// One entry per supplied item, sorted by ordinal.
    Entries(Vec<SlotEntry>),
}

impl EvidenceSlot {
    pub fn is_no_data(&self) -> bool {
        matches!(self, EvidenceSlot::NoData)
    }

    pub fn entries(&self) -> &[SlotEntry] {
        match self {
            EvidenceSlot::NoData => &[],
            EvidenceSlot::Entries(entries) => entries,
        }
    }

    pub fn failed_count(&self) -> usize {
        self.entries().iter().filter(|e| e.is_failed()).count()
    }

    /// JSON form handed to the adjudicator: the sentinel string or a list.
    pub fn render_json(&self, modality: Modality) -> JsonValue {
        match self {
            EvidenceSlot::NoData => JsonValue::String(NO_DATA_SENTINEL.to_string()),
            EvidenceSlot::Entries(entries) => JsonValue::Array(
                entries.iter().map(|e| e.render_json(modality)).collect(),
            ),
        }
    }

    /// Entries joined into one text, or the sentinel.
    pub fn render_joined(&self, modality: Modality, separator: &str) -> String {
        match self {
            EvidenceSlot::NoData => NO_DATA_SENTINEL.to_string(),
            EvidenceSlot::Entries(entries) => entries
                .iter()
                .map(|e| e.render_text(modality))
                .collect::<Vec<_>>()
                .join(separator),
        }
    }
}

/// The single structured value handed to adjudication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsolidatedContext {
    /// Visual results.
    pub static_evidence: EvidenceSlot,

    /// Video results.
    pub video_evidence: EvidenceSlot,

    /// Audio results; rendered as one joined transcript.
    pub transcript: EvidenceSlot,
}

impl ConsolidatedContext {
    pub fn slot(&self, modality: Modality) -> &EvidenceSlot {
        match modality {
            Modality::Visual => &self.static_evidence,
            Modality::Audio => &self.transcript,
            Modality::Video => &self.video_evidence,
        }
    }

    /// Visual analysis section: static and video evidence.
    pub fn visual_json(&self) -> JsonValue {
        json!({
            "static_evidence": self.static_evidence.render_json(Modality::Visual),
            "video_evidence": self.video_evidence.render_json(Modality::Video),
        })
    }

    /// Audio transcripts joined in input order, or the sentinel.
    pub fn transcript_text(&self) -> String {
        self.transcript
            .render_joined(Modality::Audio, TRANSCRIPT_SEPARATOR)
    }

    /// Number of failed entries across all slots.
    pub fn failed_count(&self) -> usize {
        Modality::ALL
            .iter()
            .map(|m| self.slot(*m).failed_count())
            .sum()
    }
}

/// Merges per-unit results into a [`ConsolidatedContext`].
///
/// Deterministic: the same results produce the same context regardless of
/// the order they are supplied in.
#[derive(Debug, Default, Clone, Copy)]
pub struct ContextConsolidator;

impl ContextConsolidator {
    pub fn new() -> Self {
        Self
    }

    /// Consolidate `results` for a case of the given shape.
    ///
    /// A key the shape expects but `results` lacks becomes a failed entry.
    /// Keys outside the shape are ignored.
    pub fn consolidate<I>(&self, results: I, shape: &CaseShape) -> ConsolidatedContext
    where
        I: IntoIterator<Item = (TaskKey, TaskResult)>,
    {
        let mut by_key: BTreeMap<TaskKey, TaskResult> = BTreeMap::new();
        for (key, result) in results {
            if key.ordinal >= shape.count(key.modality) {
                tracing::warn!(key = %key, "Result outside case shape ignored");
                continue;
            }
            by_key.insert(key, result);
        }

        let mut slot_for = |modality: Modality| -> EvidenceSlot {
            let count = shape.count(modality);
            if count == 0 {
                return EvidenceSlot::NoData;
            }
            let entries = (0..count)
                .map(|ordinal| match by_key.remove(&TaskKey::new(modality, ordinal)) {
                    Some(TaskResult::Success { payload }) => SlotEntry::Ok { ordinal, payload },
                    Some(TaskResult::Failure { error }) => SlotEntry::Failed { ordinal, error },
                    None => SlotEntry::Failed {
                        ordinal,
                        error: "no result recorded".to_string(),
                    },
                })
                .collect();
            EvidenceSlot::Entries(entries)
        };

        ConsolidatedContext {
            static_evidence: slot_for(Modality::Visual),
            video_evidence: slot_for(Modality::Video),
            transcript: slot_for(Modality::Audio),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ok(modality: Modality, ordinal: usize, text: &str) -> (TaskKey, TaskResult) {
        (
            TaskKey::new(modality, ordinal),
            TaskResult::success(Payload::text(text)),
        )
    }

    #[test]
    fn test_transcript_joined_in_input_order() {
        let shape = CaseShape {
            visual: 1,
            audio: 2,
            video: 0,
        };
        let results = vec![
            ok(Modality::Audio, 1, "second call"),
            ok(Modality::Visual, 0, "rear bumper damage"),
            ok(Modality::Audio, 0, "first call"),
        ];

        let context = ContextConsolidator::new().consolidate(results, &shape);

        assert_eq!(context.transcript_text(), "first call | second call");
        assert!(context.video_evidence.is_no_data());
        assert_eq!(
            context.visual_json(),
            json!({
                "static_evidence": ["rear bumper damage"],
                "video_evidence": "no data provided",
            })
        );
    }

    #[test]
    fn test_failures_are_visible_entries() {
        let shape = CaseShape {
            visual: 2,
            audio: 0,
            video: 0,
        };
        let results = vec![
            ok(Modality::Visual, 0, "windshield cracked"),
            (
                TaskKey::new(Modality::Visual, 1),
                TaskResult::failure("model call failed: quota"),
            ),
        ];

        let context = ContextConsolidator::new().consolidate(results, &shape);

        assert_eq!(context.failed_count(), 1);
        assert_eq!(
            context.visual_json()["static_evidence"][1],
            "visual item 2 failed: model call failed: quota"
        );
        assert_eq!(context.transcript_text(), NO_DATA_SENTINEL);
    }

    #[test]
    fn test_missing_result_distinguished_from_no_data() {
        let shape = CaseShape {
            visual: 0,
            audio: 1,
            video: 0,
        };
        let context = ContextConsolidator::new().consolidate(Vec::new(), &shape);

        assert!(!context.transcript.is_no_data());
        assert_eq!(
            context.transcript_text(),
            "audio item 1 failed: no result recorded"
        );
        assert!(context.static_evidence.is_no_data());
    }

    #[test]
    fn test_out_of_shape_results_ignored() {
        let shape = CaseShape {
            visual: 1,
            audio: 0,
            video: 0,
        };
        let results = vec![ok(Modality::Visual, 0, "a"), ok(Modality::Video, 3, "stray")];
        let context = ContextConsolidator::new().consolidate(results, &shape);
        assert!(context.video_evidence.is_no_data());
    }

    #[test]
    fn test_structured_payload_kept_as_json() {
        let shape = CaseShape {
            visual: 0,
            audio: 0,
            video: 1,
        };
        let results = vec![(
            TaskKey::new(Modality::Video, 0),
            TaskResult::success(Payload::Structured(json!({"impact": "rear"}))),
        )];
        let context = ContextConsolidator::new().consolidate(results, &shape);
        assert_eq!(
            context.visual_json()["video_evidence"],
            json!([{"impact": "rear"}])
        );
    }

    proptest! {
        #[test]
        fn prop_order_independent_of_insertion(
            audio in 0usize..6,
            video in 0usize..6,
            seed in any::<u64>(),
        ) {
            let shape = CaseShape { visual: 0, audio, video };
            let mut results: Vec<(TaskKey, TaskResult)> = shape
                .keys()
                .map(|k| (k, TaskResult::success(Payload::text(k.to_string()))))
                .collect();

            let in_order = ContextConsolidator::new().consolidate(results.clone(), &shape);

            // Deterministic shuffle driven by the seed.
            let mut state = seed;
            for i in (1..results.len()).rev() {
                state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                let j = (state >> 33) as usize % (i + 1);
                results.swap(i, j);
            }
            let shuffled = ContextConsolidator::new().consolidate(results.clone(), &shape);
            results.reverse();
            let reversed = ContextConsolidator::new().consolidate(results, &shape);

            prop_assert_eq!(&in_order, &shuffled);
            prop_assert_eq!(&in_order, &reversed);

            for (position, entry) in in_order.transcript.entries().iter().enumerate() {
                prop_assert_eq!(entry.ordinal(), position);
            }
        }
    }
}
