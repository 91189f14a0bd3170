//! Model construction from presets.
//!
//! Preset parameters are applied through a static schema per model kind.
//! Unknown parameters are dropped up front. When the factory still rejects a
//! named parameter that was applied, that parameter is cleared and
//! construction is retried; any other rejection is fatal to session startup.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

use logicall_core::domain::preset::{normalize_provider_model_id, Preset, PresetRef, PresetType};

use crate::presets::PresetResolver;

pub const DEFAULT_LLM_MODEL: &str = "openai/gpt-5.1";
pub const DEFAULT_STT_MODEL: &str = "deepgram/nova-3";
pub const DEFAULT_STT_LANGUAGE: &str = "multi";
pub const DEFAULT_TTS_MODEL: &str = "cartesia/sonic-3";
pub const DEFAULT_TTS_VOICE: &str = "9626c31c-bec5-4cca-baa8-f8ba9e84c8bc";
pub const DEFAULT_REALTIME_MODEL: &str = "amazon.nova-2-sonic-v1:0";
pub const DEFAULT_OPENAI_REALTIME_VOICE: &str = "marin";

const DEFAULT_LLM_PROVIDER: &str = "openai";
const DEFAULT_STT_PROVIDER: &str = "deepgram";
const DEFAULT_TTS_PROVIDER: &str = "cartesia";

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct LlmOptions {
    pub model: String,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    pub top_p: Option<f64>,
    pub tool_calling_mode: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct SttOptions {
    pub model: String,
    pub language: Option<String>,
    pub punctuation: Option<bool>,
    pub diarization: Option<bool>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct TtsOptions {
    pub model: String,
    pub voice: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct AwsRealtimeOptions {
    pub model: String,
    pub voice: Option<String>,
    pub region: Option<String>,
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub max_tokens: Option<u32>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OpenAiRealtimeOptions {
    pub voice: String,
}

/// What the host runtime is asked to construct.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelSpec {
    Llm(LlmOptions),
    Stt(SttOptions),
    Tts(TtsOptions),
    AwsRealtime(AwsRealtimeOptions),
    OpenAiRealtime(OpenAiRealtimeOptions),
}

impl ModelSpec {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Llm(_) => "llm",
            Self::Stt(_) => "stt",
            Self::Tts(_) => "tts",
            Self::AwsRealtime(_) => "aws_realtime",
            Self::OpenAiRealtime(_) => "openai_realtime",
        }
    }
}

/// A live model object owned by the host runtime.
pub trait Model: Send + Sync + fmt::Debug {
    fn spec(&self) -> &ModelSpec;
}

pub type ModelHandle = Arc<dyn Model>;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ModelFactoryError {
    #[error("unsupported parameter `{name}`")]
    UnsupportedParameter { name: String },
    #[error("{0}")]
    Other(String),
}

/// Provider-side model constructor supplied by the host runtime.
pub trait ModelFactory: Send + Sync {
    fn build(&self, spec: &ModelSpec) -> Result<ModelHandle, ModelFactoryError>;
}

#[derive(Debug, Error)]
#[error("{model} construction failed: {source}")]
pub struct ModelBuildError {
    pub model: &'static str,
    #[source]
    pub source: ModelFactoryError,
}

/// Model that only records what it was built from.
#[derive(Clone, Debug, PartialEq)]
pub struct SpecModel(pub ModelSpec);

impl Model for SpecModel {
    fn spec(&self) -> &ModelSpec {
        &self.0
    }
}

/// Factory that accepts every spec. Used for dry runs.
#[derive(Clone, Copy, Debug, Default)]
pub struct SpecOnlyFactory;

impl ModelFactory for SpecOnlyFactory {
    fn build(&self, spec: &ModelSpec) -> Result<ModelHandle, ModelFactoryError> {
        Ok(Arc::new(SpecModel(spec.clone())))
    }
}

struct ParamSetter<T> {
    name: &'static str,
    apply: fn(&mut T, &Value) -> bool,
    clear: fn(&mut T),
}

const LLM_PARAMS: &[ParamSetter<LlmOptions>] = &[
    ParamSetter {
        name: "temperature",
        apply: |options, value| set(&mut options.temperature, value.as_f64()),
        clear: |options| options.temperature = None,
    },
    ParamSetter {
        name: "max_tokens",
        apply: |options, value| set(&mut options.max_tokens, as_u32(value)),
        clear: |options| options.max_tokens = None,
    },
    ParamSetter {
        name: "top_p",
        apply: |options, value| set(&mut options.top_p, value.as_f64()),
        clear: |options| options.top_p = None,
    },
    ParamSetter {
        name: "tool_calling_mode",
        apply: |options, value| set(&mut options.tool_calling_mode, as_text(value)),
        clear: |options| options.tool_calling_mode = None,
    },
];

const STT_PARAMS: &[ParamSetter<SttOptions>] = &[
    ParamSetter {
        name: "language",
        apply: |options, value| set(&mut options.language, as_text(value)),
        clear: |options| options.language = None,
    },
    ParamSetter {
        name: "punctuation",
        apply: |options, value| set(&mut options.punctuation, value.as_bool()),
        clear: |options| options.punctuation = None,
    },
    ParamSetter {
        name: "diarization",
        apply: |options, value| set(&mut options.diarization, value.as_bool()),
        clear: |options| options.diarization = None,
    },
];

const TTS_PARAMS: &[ParamSetter<TtsOptions>] = &[ParamSetter {
    name: "voice",
    apply: |options, value| set(&mut options.voice, as_text(value)),
    clear: |options| options.voice = None,
}];

const AWS_REALTIME_PARAMS: &[ParamSetter<AwsRealtimeOptions>] = &[
    ParamSetter {
        name: "voice",
        apply: |options, value| set(&mut options.voice, as_text(value)),
        clear: |options| options.voice = None,
    },
    ParamSetter {
        name: "region",
        apply: |options, value| set(&mut options.region, as_text(value)),
        clear: |options| options.region = None,
    },
    ParamSetter {
        name: "temperature",
        apply: |options, value| set(&mut options.temperature, value.as_f64()),
        clear: |options| options.temperature = None,
    },
    ParamSetter {
        name: "top_p",
        apply: |options, value| set(&mut options.top_p, value.as_f64()),
        clear: |options| options.top_p = None,
    },
    ParamSetter {
        name: "max_tokens",
        apply: |options, value| set(&mut options.max_tokens, as_u32(value)),
        clear: |options| options.max_tokens = None,
    },
];

fn set<T>(slot: &mut Option<T>, value: Option<T>) -> bool {
    let applied = value.is_some();
    if applied {
        *slot = value;
    }
    applied
}

fn as_u32(value: &Value) -> Option<u32> {
    match value {
        Value::Number(number) => number
            .as_u64()
            .or_else(|| number.as_f64().filter(|value| *value >= 0.0).map(|value| value as u64))
            .and_then(|value| u32::try_from(value).ok()),
        Value::String(raw) => raw.trim().parse().ok(),
        _ => None,
    }
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(raw) if !raw.trim().is_empty() => Some(raw.trim().to_string()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

/// Options with schema parameters applied, plus the names that took effect.
struct Draft<T: 'static> {
    options: T,
    applied: Vec<&'static str>,
    schema: &'static [ParamSetter<T>],
}

impl<T: Clone + 'static> Draft<T> {
    fn new(options: T, schema: &'static [ParamSetter<T>]) -> Self {
        Self { options, applied: Vec::new(), schema }
    }

    fn with_params(mut self, kind: &'static str, params: &Map<String, Value>) -> Self {
        for (name, value) in params {
            let Some(setter) = self.schema.iter().find(|setter| setter.name == name.as_str())
            else {
                warn!(
                    event_name = "models.params.unsupported",
                    model = kind,
                    param = %name,
                    "dropping parameter not in the model schema"
                );
                continue;
            };
            if (setter.apply)(&mut self.options, value) {
                self.applied.push(setter.name);
            } else {
                warn!(
                    event_name = "models.params.mistyped",
                    model = kind,
                    param = %name,
                    "dropping parameter with an unusable value"
                );
            }
        }
        self
    }

    fn build(
        mut self,
        factory: &dyn ModelFactory,
        wrap: fn(T) -> ModelSpec,
    ) -> Result<ModelHandle, ModelBuildError> {
        loop {
            let spec = wrap(self.options.clone());
            let kind = spec.kind();
            let source = match factory.build(&spec) {
                Ok(handle) => {
                    debug!(event_name = "models.build.completed", model = kind, "model built");
                    return Ok(handle);
                }
                Err(source) => source,
            };

            let ModelFactoryError::UnsupportedParameter { name } = &source else {
                return Err(ModelBuildError { model: kind, source });
            };
            let Some(position) = self.applied.iter().position(|applied| *applied == name.as_str())
            else {
                return Err(ModelBuildError { model: kind, source });
            };

            let param = self.applied.remove(position);
            if let Some(setter) = self.schema.iter().find(|setter| setter.name == param) {
                (setter.clear)(&mut self.options);
            }
            warn!(
                event_name = "models.params.rejected",
                model = kind,
                param,
                "factory rejected parameter, retrying without it"
            );
        }
    }
}

/// Resolves preset references into model handles.
pub struct ModelResolver {
    presets: PresetResolver,
    factory: Arc<dyn ModelFactory>,
}

impl ModelResolver {
    pub fn new(presets: PresetResolver, factory: Arc<dyn ModelFactory>) -> Self {
        Self { presets, factory }
    }

    pub async fn llm(
        &self,
        preset_ref: Option<&PresetRef>,
    ) -> Result<ModelHandle, ModelBuildError> {
        let draft = match preset_ref {
            None => Draft::new(
                LlmOptions { model: DEFAULT_LLM_MODEL.to_string(), ..LlmOptions::default() },
                LLM_PARAMS,
            ),
            Some(preset_ref) => match self.presets.fetch(PresetType::Llm, preset_ref).await {
                None => Draft::new(
                    LlmOptions {
                        model: fallback_model(DEFAULT_LLM_PROVIDER, &preset_ref.id),
                        ..LlmOptions::default()
                    },
                    LLM_PARAMS,
                ),
                Some(preset) => Draft::new(
                    LlmOptions {
                        model: preset_model(&preset, DEFAULT_LLM_PROVIDER),
                        ..LlmOptions::default()
                    },
                    LLM_PARAMS,
                )
                .with_params("llm", &preset.params),
            },
        };
        draft.build(self.factory.as_ref(), ModelSpec::Llm)
    }

    pub async fn stt(
        &self,
        preset_ref: Option<&PresetRef>,
        language: &str,
    ) -> Result<ModelHandle, ModelBuildError> {
        let draft = match preset_ref {
            None => Draft::new(
                SttOptions {
                    model: DEFAULT_STT_MODEL.to_string(),
                    language: Some(DEFAULT_STT_LANGUAGE.to_string()),
                    ..SttOptions::default()
                },
                STT_PARAMS,
            ),
            Some(preset_ref) => match self.presets.fetch(PresetType::Stt, preset_ref).await {
                None => Draft::new(
                    SttOptions {
                        model: fallback_model(DEFAULT_STT_PROVIDER, &preset_ref.id),
                        language: Some(language.to_string()),
                        ..SttOptions::default()
                    },
                    STT_PARAMS,
                ),
                Some(preset) => {
                    let mut params = preset.params.clone();
                    let has_language = params.get("language").and_then(as_text).is_some();
                    if !has_language {
                        params.insert("language".to_string(), Value::from(language));
                    }
                    Draft::new(
                        SttOptions {
                            model: preset_model(&preset, DEFAULT_STT_PROVIDER),
                            ..SttOptions::default()
                        },
                        STT_PARAMS,
                    )
                    .with_params("stt", &params)
                }
            },
        };
        draft.build(self.factory.as_ref(), ModelSpec::Stt)
    }

    /// Voice comes from the preset's `voice_id`; other TTS params are not used.
    pub async fn tts(
        &self,
        preset_ref: Option<&PresetRef>,
    ) -> Result<ModelHandle, ModelBuildError> {
        let draft = match preset_ref {
            None => Draft::new(
                TtsOptions {
                    model: DEFAULT_TTS_MODEL.to_string(),
                    voice: Some(DEFAULT_TTS_VOICE.to_string()),
                },
                TTS_PARAMS,
            ),
            Some(preset_ref) => match self.presets.fetch(PresetType::Tts, preset_ref).await {
                None => Draft::new(
                    TtsOptions {
                        model: fallback_model(DEFAULT_TTS_PROVIDER, &preset_ref.id),
                        voice: None,
                    },
                    TTS_PARAMS,
                ),
                Some(preset) => {
                    let mut params = Map::new();
                    if let Some(voice_id) = &preset.voice_id {
                        params.insert("voice".to_string(), Value::from(voice_id.as_str()));
                    }
                    Draft::new(
                        TtsOptions {
                            model: preset_model(&preset, DEFAULT_TTS_PROVIDER),
                            voice: None,
                        },
                        TTS_PARAMS,
                    )
                    .with_params("tts", &params)
                }
            },
        };
        draft.build(self.factory.as_ref(), ModelSpec::Tts)
    }

    pub async fn realtime(
        &self,
        preset_ref: Option<&PresetRef>,
    ) -> Result<ModelHandle, ModelBuildError> {
        let preset = match preset_ref {
            Some(preset_ref) => self.presets.fetch(PresetType::Realtime, preset_ref).await,
            None => None,
        };
        let Some(preset) = preset else {
            return default_aws_realtime().build(self.factory.as_ref(), ModelSpec::AwsRealtime);
        };

        let provider = preset.provider.as_deref().unwrap_or("aws").to_ascii_lowercase();
        match provider.as_str() {
            "aws" | "amazon" | "bedrock" => {
                let mut params = preset.params.clone();
                for (name, value) in [("voice", &preset.voice), ("region", &preset.region)] {
                    if let Some(value) = value {
                        params.insert(name.to_string(), Value::from(value.as_str()));
                    }
                }
                let model =
                    preset.model.clone().unwrap_or_else(|| DEFAULT_REALTIME_MODEL.to_string());
                Draft::new(
                    AwsRealtimeOptions { model, ..AwsRealtimeOptions::default() },
                    AWS_REALTIME_PARAMS,
                )
                .with_params("aws_realtime", &params)
                .build(self.factory.as_ref(), ModelSpec::AwsRealtime)
            }
            "openai" => {
                let voice = preset
                    .voice
                    .clone()
                    .unwrap_or_else(|| DEFAULT_OPENAI_REALTIME_VOICE.to_string());
                self.factory
                    .build(&ModelSpec::OpenAiRealtime(OpenAiRealtimeOptions { voice }))
                    .map_err(|source| ModelBuildError { model: "openai_realtime", source })
            }
            other => {
                warn!(
                    event_name = "models.realtime.unsupported_provider",
                    provider = %other,
                    "realtime provider not supported, using the default AWS model"
                );
                default_aws_realtime().build(self.factory.as_ref(), ModelSpec::AwsRealtime)
            }
        }
    }
}

fn default_aws_realtime() -> Draft<AwsRealtimeOptions> {
    Draft::new(
        AwsRealtimeOptions {
            model: DEFAULT_REALTIME_MODEL.to_string(),
            ..AwsRealtimeOptions::default()
        },
        AWS_REALTIME_PARAMS,
    )
}

fn fallback_model(provider: &str, preset_id: &str) -> String {
    format!("{provider}/{}", normalize_provider_model_id(preset_id, provider))
}

fn preset_model(preset: &Preset, default_provider: &str) -> String {
    let provider = preset.provider.as_deref().unwrap_or(default_provider);
    let model = preset.model.as_deref().unwrap_or(&preset.id);
    format!("{provider}/{}", normalize_provider_model_id(model, provider))
}
