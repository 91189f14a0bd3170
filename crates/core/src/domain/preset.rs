use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::DomainError;

/// Version pinned when a preset reference does not name one.
pub const DEFAULT_PRESET_VERSION: &str = "1";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PresetType {
    Llm,
    Stt,
    Tts,
    Realtime,
}

impl PresetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Llm => "LLM",
            Self::Stt => "STT",
            Self::Tts => "TTS",
            Self::Realtime => "REALTIME",
        }
    }
}

impl std::fmt::Display for PresetType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PresetType {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "LLM" => Ok(Self::Llm),
            "STT" => Ok(Self::Stt),
            "TTS" => Ok(Self::Tts),
            "REALTIME" => Ok(Self::Realtime),
            other => Err(DomainError::InvalidPresetType(other.to_string())),
        }
    }
}

/// Reference from a profile to a versioned model preset.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresetRef {
    pub id: String,
    pub version: Option<String>,
}

impl PresetRef {
    pub fn new(id: impl Into<String>, version: Option<&str>) -> Self {
        Self { id: id.into(), version: version.map(str::to_string) }
    }

    /// An absent version means version 1, never "latest".
    pub fn pinned_version(&self) -> &str {
        self.version
            .as_deref()
            .filter(|version| !version.trim().is_empty())
            .unwrap_or(DEFAULT_PRESET_VERSION)
    }
}

/// A model preset as stored, read-only at runtime.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Preset {
    pub preset_type: PresetType,
    pub id: String,
    pub version: String,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub params: Map<String, Value>,
    pub voice_id: Option<String>,
    pub voice: Option<String>,
    pub region: Option<String>,
}

impl Preset {
    /// Builds a preset from a decoded store record. Missing or mistyped
    /// attributes are left empty; the caller applies provider defaults.
    pub fn from_record(
        preset_type: PresetType,
        preset_ref: &PresetRef,
        record: &Map<String, Value>,
    ) -> Self {
        let text = |key: &str| {
            record
                .get(key)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        };

        Self {
            preset_type,
            id: text("preset_id").unwrap_or_else(|| preset_ref.id.clone()),
            version: text("version").unwrap_or_else(|| preset_ref.pinned_version().to_string()),
            provider: text("provider"),
            model: text("model"),
            params: record.get("params").and_then(Value::as_object).cloned().unwrap_or_default(),
            voice_id: text("voice_id"),
            voice: text("voice"),
            region: text("region"),
        }
    }
}

/// Strips a leading `<provider>-` or `<provider>/` segment so that
/// re-prefixing does not produce `openai/openai-gpt`.
pub fn normalize_provider_model_id<'a>(model_id: &'a str, provider: &str) -> &'a str {
    let dash = format!("{provider}-");
    let slash = format!("{provider}/");
    model_id
        .strip_prefix(dash.as_str())
        .or_else(|| model_id.strip_prefix(slash.as_str()))
        .unwrap_or(model_id)
}
