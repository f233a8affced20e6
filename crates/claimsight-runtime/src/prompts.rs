//! Prompts for modality processing and adjudication.
//!
//! Built-in defaults cover every call. A YAML file can override any of
//! them by key (`visual`, `audio`, `video`, `adjudication`); keys it does
//! not mention keep their default.

use std::path::Path;

use claimsight_core::{ConsolidatedContext, Modality, Ruleset};
use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

/// Default prompt for photos and PDF documents.
pub const VISUAL_PROMPT: &str = "\
Analyze the attached accident evidence (photo or PDF document).
Describe the visible damage to each vehicle, the positions of the vehicles
involved, and any road signs, signals or lane markings.
Report only what is visible. Do not assign fault.";

/// Default prompt for recorded statements.
pub const AUDIO_PROMPT: &str = "\
Transcribe the attached audio recording verbatim in its original language.
Label speakers when they can be distinguished (Speaker 1, Speaker 2, ...).
Mark unintelligible passages as [inaudible]. Do not summarize.";

/// Default prompt for dashcam and CCTV footage.
pub const VIDEO_PROMPT: &str = "\
Analyze the attached accident video.
Describe the sequence of events in order, which vehicle strikes which,
and any traffic infraction that is visible (red light, lane change without
signalling, speeding, wrong-way driving).
Report only what is visible. Do not assign fault.";

/// Default adjudication instructions. The model must answer with JSON.
pub const ADJUDICATION_PROMPT: &str = r#"
You are a motor-claims adjudicator. Apply the circumstance rules below to the
case evidence and decide liability.

## Rules
- Use ONLY the rules provided. Do not invent criteria.
- Base every finding on the evidence sections. Cite which section supports it.
- An evidence section marked "no data provided" was not supplied.
- An entry reading "<modality> item <n> failed: ..." could not be analyzed.
  Treat it as missing evidence, not as evidence of anything.
- When the evidence cannot support a decision, say so in "decision".

## Output Format (JSON only, no prose, no code fences)
{
  "decision": "string",
  "liable_party": "string | null",
  "liability_percentage": { "<party>": 0-100 },
  "applied_rules": ["rule identifiers"],
  "reasoning": "string",
  "confidence": 0.0-1.0
}
"#;

/// Prompt set used by the model-backed processors and adjudicator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptLibrary {
    pub visual: String,
    pub audio: String,
    pub video: String,
    pub adjudication: String,
}

impl Default for PromptLibrary {
    fn default() -> Self {
        Self {
            visual: VISUAL_PROMPT.to_string(),
            audio: AUDIO_PROMPT.to_string(),
            video: VIDEO_PROMPT.to_string(),
            adjudication: ADJUDICATION_PROMPT.trim().to_string(),
        }
    }
}

impl PromptLibrary {
    /// Parse overrides; missing keys keep their defaults.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let library: Self = serde_yaml::from_str(yaml)?;
        for (key, prompt) in [
            ("visual", &library.visual),
            ("audio", &library.audio),
            ("video", &library.video),
            ("adjudication", &library.adjudication),
        ] {
            if prompt.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("prompt '{}' is empty", key)));
            }
        }
        Ok(library)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&yaml)
    }

    pub fn for_modality(&self, modality: Modality) -> &str {
        match modality {
            Modality::Visual => &self.visual,
            Modality::Audio => &self.audio,
            Modality::Video => &self.video,
        }
    }

    pub fn adjudication(&self) -> &str {
        &self.adjudication
    }

    /// Full adjudication prompt: instructions, rules, then the case data.
    pub fn build_adjudication_prompt(
        &self,
        ruleset: &Ruleset,
        context: &ConsolidatedContext,
    ) -> String {
        format!(
            "{instructions}\n\n\
             ## Circumstance Rules ({name})\n{rules}\n\n\
             ## Case Evidence\n\
             ### Visual analysis (JSON)\n{visual}\n\n\
             ### Audio transcripts\n{transcript}\n",
            instructions = self.adjudication,
            name = ruleset.name,
            rules = ruleset.content.trim(),
            visual = context.visual_json(),
            transcript = context.transcript_text(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use claimsight_core::{CaseRequest, ContextConsolidator, EvidenceRef, Payload, TaskKey, TaskResult};

    #[test]
    fn test_defaults_cover_each_modality() {
        let library = PromptLibrary::default();
        assert!(library.for_modality(Modality::Visual).contains("road signs"));
        assert!(library.for_modality(Modality::Audio).contains("Transcribe"));
        assert!(library.for_modality(Modality::Video).contains("sequence of events"));
        assert!(library.adjudication().contains("JSON only"));
    }

    #[test]
    fn test_yaml_overrides_only_named_keys() {
        let library = PromptLibrary::from_yaml("audio: Transcribe in Spanish.").unwrap();
        assert_eq!(library.audio, "Transcribe in Spanish.");
        assert_eq!(library.visual, VISUAL_PROMPT);
    }

    #[test]
    fn test_rejects_empty_override() {
        assert!(matches!(
            PromptLibrary::from_yaml("video: '  '"),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_adjudication_prompt_includes_all_sections() {
        let request = CaseRequest::new()
            .with_visual(EvidenceRef::uri("gs://b/scene.jpg"))
            .with_audio(EvidenceRef::uri("gs://b/a.mp3"))
            .with_audio(EvidenceRef::uri("gs://b/b.mp3"));
        let context = ContextConsolidator::new().consolidate(
            vec![
                (TaskKey::new(Modality::Visual, 0), TaskResult::success(Payload::text("rear damage"))),
                (TaskKey::new(Modality::Audio, 0), TaskResult::success(Payload::text("I braked"))),
                (TaskKey::new(Modality::Audio, 1), TaskResult::success(Payload::text("He ran the light"))),
            ],
            &request.shape(),
        );
        let ruleset = Ruleset::new("circumstances", "Rule 1: rear impact implies follower fault.");

        let prompt = PromptLibrary::default().build_adjudication_prompt(&ruleset, &context);

        assert!(prompt.contains("Rule 1: rear impact"));
        assert!(prompt.contains("(circumstances)"));
        assert!(prompt.contains("rear damage"));
        assert!(prompt.contains("no data provided"));
        assert!(prompt.contains("I braked | He ran the light"));
    }
}
