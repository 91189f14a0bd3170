//! Session configuration built from a resolved profile, and the host
//! runtime collaborators the agent drives.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use logicall_core::domain::profile::{
    AgentMode, AgentProfile, AudioInputOptions, AudioOutputOptions, Channel, ConnectionOptions,
    RoomOptions, SessionBehavior, TextOutputOptions, TurnDetectionMode,
};

use crate::models::{ModelBuildError, ModelHandle, ModelResolver};
use crate::tools::Tool;

pub const DEFAULT_TTS_TEXT_TRANSFORMS: &[&str] = &["filter_markdown", "filter_emoji"];

#[derive(Clone, Debug)]
pub enum SessionModels {
    Realtime { model: ModelHandle },
    Pipeline { llm: ModelHandle, stt: ModelHandle, tts: ModelHandle },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnDetection {
    Stt,
    Vad,
    RealtimeLlm,
    Manual,
    /// End-of-turn model used by pipeline sessions when nothing is configured.
    MultilingualModel,
    /// Leave the choice to the session runtime.
    RuntimeDefault,
}

impl TurnDetection {
    pub fn resolve(configured: Option<TurnDetectionMode>, mode: AgentMode) -> Self {
        match (configured, mode) {
            (Some(TurnDetectionMode::Stt), _) => Self::Stt,
            (Some(TurnDetectionMode::Vad), _) => Self::Vad,
            (Some(TurnDetectionMode::RealtimeLlm), _) => Self::RealtimeLlm,
            (Some(TurnDetectionMode::Manual), _) => Self::Manual,
            (None, AgentMode::Pipeline) => Self::MultilingualModel,
            (None, AgentMode::Realtime) => Self::RuntimeDefault,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum ParticipantKind {
    Sip,
    Standard,
    Connector,
}

impl ParticipantKind {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "PARTICIPANT_KIND_SIP" => Some(Self::Sip),
            "PARTICIPANT_KIND_STANDARD" => Some(Self::Standard),
            "PARTICIPANT_KIND_CONNECTOR" => Some(Self::Connector),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoiseFilter {
    Bvc,
    BvcTelephony,
}

/// Noise cancellation that picks a filter per participant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoiseCancellation {
    TelephonyAware,
}

impl NoiseCancellation {
    pub fn filter_for(&self, kind: ParticipantKind) -> NoiseFilter {
        match (self, kind) {
            (Self::TelephonyAware, ParticipantKind::Sip) => NoiseFilter::BvcTelephony,
            (Self::TelephonyAware, _) => NoiseFilter::Bvc,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AudioInputConfig {
    pub sample_rate: u32,
    pub num_channels: u32,
    pub frame_size_ms: u32,
    pub noise_cancellation: Option<NoiseCancellation>,
    pub pre_connect_audio: bool,
    pub pre_connect_audio_timeout: f64,
}

impl From<&AudioInputOptions> for AudioInputConfig {
    fn from(options: &AudioInputOptions) -> Self {
        Self {
            sample_rate: options.sample_rate,
            num_channels: options.num_channels,
            frame_size_ms: options.frame_size_ms,
            noise_cancellation: options
                .noise_cancellation
                .as_ref()
                .map(|_| NoiseCancellation::TelephonyAware),
            pre_connect_audio: options.pre_connect_audio,
            pre_connect_audio_timeout: options.pre_connect_audio_timeout,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RoomIoConfig {
    pub text_input: bool,
    pub audio_input: Channel<AudioInputConfig>,
    pub video_input: bool,
    pub audio_output: Channel<AudioOutputOptions>,
    pub text_output: Channel<TextOutputOptions>,
    /// `None` keeps the runtime's accepted participant kinds.
    pub participant_kinds: Option<Vec<ParticipantKind>>,
    pub participant_identity: Option<String>,
    pub close_on_disconnect: bool,
    pub delete_room_on_close: bool,
}

impl From<&RoomOptions> for RoomIoConfig {
    fn from(room: &RoomOptions) -> Self {
        let text_input = match &room.text_input {
            Channel::Disabled => false,
            Channel::Enabled => true,
            Channel::Configured(options) => options.enabled,
        };
        let audio_input = match &room.audio_input {
            Channel::Disabled => Channel::Disabled,
            Channel::Enabled => Channel::Enabled,
            Channel::Configured(options) => Channel::Configured(AudioInputConfig::from(options)),
        };
        let text_output = match &room.text_output {
            Channel::Configured(options) if !options.enabled => Channel::Disabled,
            other => other.clone(),
        };

        let participant_kinds = room.participant_kinds.as_ref().and_then(|raw| {
            let kinds: Vec<ParticipantKind> = raw
                .iter()
                .filter_map(|name| {
                    let kind = ParticipantKind::parse(name);
                    if kind.is_none() {
                        warn!(
                            event_name = "session.room.unknown_participant_kind",
                            participant_kind = %name,
                            "ignoring unknown participant kind"
                        );
                    }
                    kind
                })
                .collect();
            (!kinds.is_empty()).then_some(kinds)
        });

        Self {
            text_input,
            audio_input,
            video_input: room.video_input,
            audio_output: room.audio_output.clone(),
            text_output,
            participant_kinds,
            participant_identity: room.participant_identity.clone(),
            close_on_disconnect: room.close_on_disconnect,
            delete_room_on_close: room.delete_room_on_close,
        }
    }
}

/// Everything the host runtime needs to create a session.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub models: SessionModels,
    pub turn_detection: TurnDetection,
    pub behavior: SessionBehavior,
    pub tts_text_transforms: Vec<String>,
    pub conn_options: ConnectionOptions,
    pub room: RoomIoConfig,
}

/// Builds the session configuration. Model construction failures are the
/// only errors, and they abort session startup.
pub async fn build_session(
    profile: &AgentProfile,
    models: &ModelResolver,
) -> Result<SessionConfig, ModelBuildError> {
    let session_models = match profile.mode {
        AgentMode::Realtime => SessionModels::Realtime {
            model: models.realtime(profile.realtime_preset_ref.as_ref()).await?,
        },
        AgentMode::Pipeline => SessionModels::Pipeline {
            llm: models.llm(profile.llm_preset_ref.as_ref()).await?,
            stt: models.stt(profile.stt_preset_ref.as_ref(), &profile.language).await?,
            tts: models.tts(profile.tts_preset_ref.as_ref()).await?,
        },
    };

    let behavior = profile.session_behavior.clone();
    let turn_detection = TurnDetection::resolve(behavior.turn_detection, profile.mode);
    let tts_text_transforms = behavior.tts_text_transforms.clone().unwrap_or_else(|| {
        DEFAULT_TTS_TEXT_TRANSFORMS.iter().map(|name| (*name).to_string()).collect()
    });

    debug!(
        event_name = "session.build.completed",
        profile_id = %profile.profile_id,
        mode = profile.mode.as_str(),
        turn_detection = ?turn_detection,
        "session configuration built"
    );

    Ok(SessionConfig {
        models: session_models,
        turn_detection,
        behavior,
        tts_text_transforms,
        conn_options: profile.conn_options.clone(),
        room: RoomIoConfig::from(&profile.room_options),
    })
}

/// A batch of tool calls the session executed in one step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolExecutionEvent {
    pub tool_names: Vec<String>,
}

impl ToolExecutionEvent {
    pub fn new<I, S>(tool_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { tool_names: tool_names.into_iter().map(Into::into).collect() }
    }

    pub fn call_count(&self) -> usize {
        self.tool_names.len()
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("{0} is not supported by this session")]
    Unsupported(&'static str),
    #[error("session creation failed: {0}")]
    Create(String),
    #[error("session start failed: {0}")]
    Start(String),
    #[error("session transport error: {0}")]
    Transport(String),
}

/// A live voice session owned by the host runtime.
#[async_trait]
pub trait AgentSession: Send + Sync {
    async fn start(
        &self,
        instructions: &str,
        tools: Vec<Arc<dyn Tool>>,
    ) -> Result<(), SessionError>;

    /// `drain` lets in-flight speech and tool calls finish first.
    async fn shutdown(&self, drain: bool);

    async fn send_dtmf(&self, _digits: &str) -> Result<(), SessionError> {
        Err(SessionError::Unsupported("dtmf"))
    }

    /// Hands out the tool-execution event stream. Only the first call
    /// returns `Some`.
    fn take_tool_events(&self) -> Option<mpsc::UnboundedReceiver<ToolExecutionEvent>>;
}

/// The room/job context a session is created in.
#[async_trait]
pub trait SessionHost: Send + Sync {
    fn room_metadata(&self) -> Option<String>;

    async fn create_session(
        &self,
        config: SessionConfig,
    ) -> Result<Arc<dyn AgentSession>, SessionError>;
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use logicall_core::domain::profile::{
        default_profile, AgentMode, AudioInputOptions, Channel, RoomOptions, TextOutputOptions,
        TurnDetectionMode,
    };
    use logicall_store::InMemoryRecordStore;

    use super::*;
    use crate::models::{ModelResolver, ModelSpec, SpecOnlyFactory};
    use crate::presets::PresetResolver;

    fn models() -> ModelResolver {
        ModelResolver::new(
            PresetResolver::new(Arc::new(InMemoryRecordStore::new())),
            Arc::new(SpecOnlyFactory),
        )
    }

    #[tokio::test]
    async fn realtime_profile_builds_only_a_realtime_model() {
        let config = build_session(&default_profile(), &models()).await.expect("build");

        let SessionModels::Realtime { model } = &config.models else {
            panic!("expected realtime models")
        };
        assert!(matches!(model.spec(), ModelSpec::AwsRealtime(_)));
        assert_eq!(config.turn_detection, TurnDetection::RuntimeDefault);
        assert_eq!(config.tts_text_transforms, vec!["filter_markdown", "filter_emoji"]);
        assert_eq!(config.conn_options.max_unrecoverable_errors, 3);
    }

    #[tokio::test]
    async fn pipeline_profile_builds_three_models() {
        let mut profile = default_profile();
        profile.mode = AgentMode::Pipeline;
        profile.language = "es".to_string();
        profile.session_behavior.tts_text_transforms = Some(vec![]);

        let config = build_session(&profile, &models()).await.expect("build");

        let SessionModels::Pipeline { llm, stt, tts } = &config.models else {
            panic!("expected pipeline models")
        };
        let ModelSpec::Llm(llm) = llm.spec() else { panic!("expected llm spec") };
        assert_eq!(llm.model, "openai/gpt-5.1");
        let ModelSpec::Stt(stt) = stt.spec() else { panic!("expected stt spec") };
        assert_eq!(stt.language.as_deref(), Some("es"));
        let ModelSpec::Tts(tts) = tts.spec() else { panic!("expected tts spec") };
        assert_eq!(tts.model, "cartesia/sonic-3");
        assert_eq!(config.turn_detection, TurnDetection::MultilingualModel);
        assert!(config.tts_text_transforms.is_empty());
    }

    #[test]
    fn explicit_turn_detection_wins_over_mode() {
        assert_eq!(
            TurnDetection::resolve(Some(TurnDetectionMode::Vad), AgentMode::Pipeline),
            TurnDetection::Vad
        );
        assert_eq!(
            TurnDetection::resolve(Some(TurnDetectionMode::Manual), AgentMode::Realtime),
            TurnDetection::Manual
        );
    }

    #[test]
    fn room_options_map_to_room_io() {
        let room = RoomOptions {
            audio_input: Channel::Configured(AudioInputOptions {
                noise_cancellation: Some("bvc".to_string()),
                ..AudioInputOptions::default()
            }),
            text_output: Channel::Configured(TextOutputOptions {
                enabled: false,
                ..TextOutputOptions::default()
            }),
            participant_kinds: Some(vec![
                "PARTICIPANT_KIND_SIP".to_string(),
                "PARTICIPANT_KIND_AGENT".to_string(),
            ]),
            ..RoomOptions::default()
        };

        let config = RoomIoConfig::from(&room);

        let audio = config.audio_input.options().expect("configured audio input");
        let noise = audio.noise_cancellation.expect("noise cancellation selected");
        assert_eq!(noise.filter_for(ParticipantKind::Sip), NoiseFilter::BvcTelephony);
        assert_eq!(noise.filter_for(ParticipantKind::Standard), NoiseFilter::Bvc);
        assert_eq!(config.text_output, Channel::Disabled);
        assert!(config.text_input);
        assert_eq!(config.participant_kinds, Some(vec![ParticipantKind::Sip]));
    }

    #[test]
    fn unknown_participant_kinds_only_means_runtime_default() {
        let room = RoomOptions {
            participant_kinds: Some(vec!["PARTICIPANT_KIND_ROBOT".to_string()]),
            ..RoomOptions::default()
        };

        assert_eq!(RoomIoConfig::from(&room).participant_kinds, None);
    }
}
