//! Case request data model.
//!
//! A case is three ordered sequences of evidence references, one per
//! modality. Every unit of work dispatched for a case is identified by a
//! [`TaskKey`] and settles into exactly one [`TaskResult`].

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;

/// One evidence category.
///
/// The declaration order is the dispatch order and the key order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Modality {
    /// Photos and PDF documents.
    Visual,
    /// Recorded statements and calls.
    Audio,
    /// Dashcam and CCTV footage.
    Video,
}

impl Modality {
    /// All modalities in dispatch order.
    pub const ALL: [Modality; 3] = [Modality::Visual, Modality::Audio, Modality::Video];

    pub fn as_str(&self) -> &'static str {
        match self {
            Modality::Visual => "visual",
            Modality::Audio => "audio",
            Modality::Video => "video",
        }
    }

    /// Media type assumed when neither the caller nor the extension says otherwise.
    pub fn default_media_type(&self) -> &'static str {
        match self {
            Modality::Visual => "image/jpeg",
            Modality::Audio => "audio/mpeg",
            Modality::Video => "video/mp4",
        }
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Locator for one evidence item.
///
/// On the wire a reference is either a bare locator string, an object with
/// `uri` and optional `media_type`, or an object with base64 `data` and a
/// required `media_type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum EvidenceRef {
    Uri {
        uri: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        media_type: Option<String>,
    },
    Inline {
        #[serde(with = "base64_bytes")]
        data: Vec<u8>,
        media_type: String,
    },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum EvidenceRefRepr {
    Locator(String),
    Uri {
        uri: String,
        #[serde(default)]
        media_type: Option<String>,
    },
    Inline {
        #[serde(with = "base64_bytes")]
        data: Vec<u8>,
        media_type: String,
    },
}

impl<'de> Deserialize<'de> for EvidenceRef {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match EvidenceRefRepr::deserialize(deserializer)? {
            EvidenceRefRepr::Locator(uri) => EvidenceRef::Uri {
                uri,
                media_type: None,
            },
            EvidenceRefRepr::Uri { uri, media_type } => EvidenceRef::Uri { uri, media_type },
            EvidenceRefRepr::Inline { data, media_type } => {
                EvidenceRef::Inline { data, media_type }
            }
        })
    }
}

impl EvidenceRef {
    /// Reference evidence by URI or filesystem path.
    pub fn uri(uri: impl Into<String>) -> Self {
        EvidenceRef::Uri {
            uri: uri.into(),
            media_type: None,
        }
    }

    /// Carry evidence bytes inline.
    pub fn inline(data: impl Into<Vec<u8>>, media_type: impl Into<String>) -> Self {
        EvidenceRef::Inline {
            data: data.into(),
            media_type: media_type.into(),
        }
    }

    /// Declare the media type of a URI reference.
    pub fn with_media_type(self, media_type: impl Into<String>) -> Self {
        match self {
            EvidenceRef::Uri { uri, .. } => EvidenceRef::Uri {
                uri,
                media_type: Some(media_type.into()),
            },
            EvidenceRef::Inline { data, .. } => EvidenceRef::Inline {
                data,
                media_type: media_type.into(),
            },
        }
    }

    /// Human-readable locator, safe to log.
    pub fn locator(&self) -> String {
        match self {
            EvidenceRef::Uri { uri, .. } => uri.clone(),
            EvidenceRef::Inline { data, media_type } => {
                format!("inline:{} ({} bytes)", media_type, data.len())
            }
        }
    }

    /// Media type declared by the caller, if any.
    pub fn declared_media_type(&self) -> Option<&str> {
        match self {
            EvidenceRef::Uri { media_type, .. } => media_type.as_deref(),
            EvidenceRef::Inline { media_type, .. } => Some(media_type),
        }
    }

    /// Media type to send to the model: declared, else by extension, else
    /// the modality default.
    pub fn resolve_media_type(&self, modality: Modality) -> String {
        if let Some(declared) = self.declared_media_type() {
            return declared.to_string();
        }
        let EvidenceRef::Uri { uri, .. } = self else {
            return modality.default_media_type().to_string();
        };
        let extension = uri
            .rsplit('/')
            .next()
            .and_then(|name| name.rsplit_once('.'))
            .map(|(_, ext)| ext.to_ascii_lowercase());

        let inferred = match extension.as_deref() {
            Some("pdf") => Some("application/pdf"),
            Some("png") => Some("image/png"),
            Some("jpg") | Some("jpeg") => Some("image/jpeg"),
            Some("webp") => Some("image/webp"),
            Some("mp3") => Some("audio/mpeg"),
            Some("wav") => Some("audio/wav"),
            Some("ogg") => Some("audio/ogg"),
            Some("m4a") => Some("audio/mp4"),
            Some("mp4") => Some("video/mp4"),
            Some("mov") => Some("video/quicktime"),
            Some("webm") => Some("video/webm"),
            _ => None,
        };
        inferred
            .unwrap_or_else(|| modality.default_media_type())
            .to_string()
    }

    /// Stable content fingerprint used as a cache key.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        match self {
            EvidenceRef::Uri { uri, media_type } => {
                0u8.hash(&mut hasher);
                uri.hash(&mut hasher);
                media_type.hash(&mut hasher);
            }
            EvidenceRef::Inline { data, media_type } => {
                1u8.hash(&mut hasher);
                data.hash(&mut hasher);
                media_type.hash(&mut hasher);
            }
        }
        hasher.finish()
    }
}

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

/// A claim submitted for adjudication.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseRequest {
    /// Caller-supplied identifier; generated when absent or blank.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub case_id: Option<String>,

    /// Photos and PDFs, in caller order.
    #[serde(default)]
    pub visual: Vec<EvidenceRef>,

    /// Audio recordings, in caller order.
    #[serde(default)]
    pub audio: Vec<EvidenceRef>,

    /// Video recordings, in caller order.
    #[serde(default)]
    pub video: Vec<EvidenceRef>,
}

impl CaseRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_case_id(mut self, case_id: impl Into<String>) -> Self {
        self.case_id = Some(case_id.into());
        self
    }

    pub fn with_visual(mut self, evidence: EvidenceRef) -> Self {
        self.visual.push(evidence);
        self
    }

    pub fn with_audio(mut self, evidence: EvidenceRef) -> Self {
        self.audio.push(evidence);
        self
    }

    pub fn with_video(mut self, evidence: EvidenceRef) -> Self {
        self.video.push(evidence);
        self
    }

    /// Parse a request from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Evidence sequence for one modality.
    pub fn evidence(&self, modality: Modality) -> &[EvidenceRef] {
        match modality {
            Modality::Visual => &self.visual,
            Modality::Audio => &self.audio,
            Modality::Video => &self.video,
        }
    }

    /// Total number of evidence references across all modalities.
    pub fn total_evidence(&self) -> usize {
        self.visual.len() + self.audio.len() + self.video.len()
    }

    /// Caller case id, if it is non-blank.
    pub fn supplied_case_id(&self) -> Option<&str> {
        self.case_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }

    pub fn shape(&self) -> CaseShape {
        CaseShape {
            visual: self.visual.len(),
            audio: self.audio.len(),
            video: self.video.len(),
        }
    }
}

/// Per-modality item counts of a request.
///
/// Consolidation needs the shape to tell "no evidence supplied" apart from
/// "evidence supplied but no result recorded".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseShape {
    pub visual: usize,
    pub audio: usize,
    pub video: usize,
}

impl CaseShape {
    pub fn count(&self, modality: Modality) -> usize {
        match modality {
            Modality::Visual => self.visual,
            Modality::Audio => self.audio,
            Modality::Video => self.video,
        }
    }

    pub fn total(&self) -> usize {
        self.visual + self.audio + self.video
    }

    /// All keys of the case in dispatch order.
    pub fn keys(&self) -> impl Iterator<Item = TaskKey> + '_ {
        Modality::ALL.into_iter().flat_map(move |modality| {
            (0..self.count(modality)).map(move |ordinal| TaskKey::new(modality, ordinal))
        })
    }
}

/// Identity of one unit of work: modality plus 0-based position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TaskKey {
    pub modality: Modality,
    pub ordinal: usize,
}

impl TaskKey {
    pub fn new(modality: Modality, ordinal: usize) -> Self {
        Self { modality, ordinal }
    }
}

impl fmt::Display for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.modality, self.ordinal)
    }
}

/// Output of a modality processor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Payload {
    Text(String),
    Structured(JsonValue),
}

impl Payload {
    pub fn text(text: impl Into<String>) -> Self {
        Payload::Text(text.into())
    }

    /// Render as plain text (structured payloads as compact JSON).
    pub fn render(&self) -> String {
        match self {
            Payload::Text(text) => text.clone(),
            Payload::Structured(value) => value.to_string(),
        }
    }

    pub fn to_json(&self) -> JsonValue {
        match self {
            Payload::Text(text) => JsonValue::String(text.clone()),
            Payload::Structured(value) => value.clone(),
        }
    }
}

/// Settled outcome of one unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskResult {
    Success { payload: Payload },
    Failure { error: String },
}

impl TaskResult {
    pub fn success(payload: Payload) -> Self {
        TaskResult::Success { payload }
    }

    pub fn failure(error: impl fmt::Display) -> Self {
        TaskResult::Failure {
            error: error.to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TaskResult::Success { .. })
    }
}

/// Static domain rules the adjudicator applies.
///
/// Opaque to the orchestration core; only its name is inspected, for logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ruleset {
    pub name: String,
    pub content: String,
}

impl Ruleset {
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }

    /// Read a ruleset from a text file; the name is the file stem.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "ruleset".to_string());
        Ok(Self::new(name, content))
    }
}
