use serde::{Deserialize, Serialize};

use crate::domain::preset::PresetRef;
use crate::errors::DomainError;

pub const DEFAULT_TENANT_ID: &str = "default";
pub const DEFAULT_PROFILE_ID: &str = "default";
pub const DEFAULT_PROFILE_VERSION: &str = "1";
pub const DEFAULT_LANGUAGE: &str = "en";
pub const DEFAULT_STATUS: &str = "active";

/// Prompt used when a stored profile omits `system_prompt`.
pub const FALLBACK_SYSTEM_PROMPT: &str = "You are a helpful assistant.";

const BUILTIN_SYSTEM_PROMPT: &str = "You are a helpful voice AI assistant. \
The user is interacting with you via voice, even if you perceive the conversation as text. \
Your responses are concise, to the point, and without any complex formatting or punctuation \
including emojis, asterisks, or other symbols. \
You are curious, friendly, and have a sense of humor.";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentMode {
    Pipeline,
    #[default]
    Realtime,
}

impl AgentMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pipeline => "pipeline",
            Self::Realtime => "realtime",
        }
    }
}

impl std::str::FromStr for AgentMode {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pipeline" => Ok(Self::Pipeline),
            "realtime" => Ok(Self::Realtime),
            other => Err(DomainError::InvalidMode(other.to_string())),
        }
    }
}

/// Per-session usage caps. `None` means unlimited.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Limits {
    pub max_minutes: Option<u32>,
    pub max_tool_calls: Option<u32>,
    pub max_tool_calls_per_minute: Option<u32>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnDetectionMode {
    Stt,
    Vad,
    RealtimeLlm,
    Manual,
}

impl std::str::FromStr for TurnDetectionMode {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "stt" => Ok(Self::Stt),
            "vad" => Ok(Self::Vad),
            "realtime_llm" => Ok(Self::RealtimeLlm),
            "manual" => Ok(Self::Manual),
            other => Err(DomainError::InvalidTurnDetection(other.to_string())),
        }
    }
}

/// Interruption, endpointing and tool-step tunables. Durations are seconds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionBehavior {
    pub allow_interruptions: bool,
    pub discard_audio_if_uninterruptible: bool,
    pub min_interruption_duration: f64,
    pub min_interruption_words: u32,
    pub min_endpointing_delay: f64,
    pub max_endpointing_delay: f64,
    /// `None` disables false-interruption detection.
    pub false_interruption_timeout: Option<f64>,
    pub resume_false_interruption: bool,
    pub min_consecutive_speech_delay: f64,
    /// `None` disables the away-state timer.
    pub user_away_timeout: Option<f64>,
    pub max_tool_steps: u32,
    /// `None` lets the runtime auto-detect.
    pub use_tts_aligned_transcript: Option<bool>,
    /// `None` selects the runtime's default transform chain.
    pub tts_text_transforms: Option<Vec<String>>,
    pub preemptive_generation: bool,
    pub ivr_detection: bool,
    /// `None` auto-selects based on mode.
    pub turn_detection: Option<TurnDetectionMode>,
}

impl Default for SessionBehavior {
    fn default() -> Self {
        Self {
            allow_interruptions: true,
            discard_audio_if_uninterruptible: true,
            min_interruption_duration: 0.5,
            min_interruption_words: 0,
            min_endpointing_delay: 0.5,
            max_endpointing_delay: 3.0,
            false_interruption_timeout: Some(2.0),
            resume_false_interruption: true,
            min_consecutive_speech_delay: 0.0,
            user_away_timeout: Some(15.0),
            max_tool_steps: 3,
            use_tts_aligned_transcript: None,
            tts_text_transforms: None,
            preemptive_generation: false,
            ivr_detection: false,
            turn_detection: None,
        }
    }
}

/// A room I/O channel: switched off, on with runtime defaults, or tuned.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", content = "options", rename_all = "snake_case")]
pub enum Channel<T> {
    Disabled,
    Enabled,
    Configured(T),
}

impl<T> Channel<T> {
    pub fn is_enabled(&self) -> bool {
        !matches!(self, Self::Disabled)
    }

    pub fn options(&self) -> Option<&T> {
        match self {
            Self::Configured(options) => Some(options),
            Self::Disabled | Self::Enabled => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AudioInputOptions {
    pub sample_rate: u32,
    pub num_channels: u32,
    pub frame_size_ms: u32,
    pub noise_cancellation: Option<String>,
    pub pre_connect_audio: bool,
    pub pre_connect_audio_timeout: f64,
}

impl Default for AudioInputOptions {
    fn default() -> Self {
        Self {
            sample_rate: 24_000,
            num_channels: 1,
            frame_size_ms: 50,
            noise_cancellation: None,
            pre_connect_audio: true,
            pre_connect_audio_timeout: 3.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AudioOutputOptions {
    pub sample_rate: u32,
    pub num_channels: u32,
    pub track_name: Option<String>,
}

impl Default for AudioOutputOptions {
    fn default() -> Self {
        Self { sample_rate: 24_000, num_channels: 1, track_name: None }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextInputOptions {
    pub enabled: bool,
}

impl Default for TextInputOptions {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TextOutputOptions {
    pub enabled: bool,
    pub sync_transcription: Option<bool>,
    pub transcription_speed_factor: f64,
}

impl Default for TextOutputOptions {
    fn default() -> Self {
        Self { enabled: true, sync_transcription: None, transcription_speed_factor: 1.0 }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoomOptions {
    pub text_input: Channel<TextInputOptions>,
    pub audio_input: Channel<AudioInputOptions>,
    pub video_input: bool,
    pub audio_output: Channel<AudioOutputOptions>,
    pub text_output: Channel<TextOutputOptions>,
    /// Raw participant kind names; `None` keeps the runtime defaults.
    pub participant_kinds: Option<Vec<String>>,
    /// `None` links to the first participant that joins.
    pub participant_identity: Option<String>,
    pub close_on_disconnect: bool,
    pub delete_room_on_close: bool,
}

impl Default for RoomOptions {
    fn default() -> Self {
        Self {
            text_input: Channel::Enabled,
            audio_input: Channel::Enabled,
            video_input: false,
            audio_output: Channel::Enabled,
            text_output: Channel::Enabled,
            participant_kinds: None,
            participant_identity: None,
            close_on_disconnect: true,
            delete_room_on_close: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionOptions {
    pub max_unrecoverable_errors: u32,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self { max_unrecoverable_errors: 3 }
    }
}

/// A fully specified agent profile. Every optional section has already been
/// defaulted by the time a value of this type exists.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgentProfile {
    pub profile_id: String,
    pub version: String,
    pub tenant_id: String,
    pub mode: AgentMode,
    pub system_prompt: String,
    pub language: String,
    pub llm_preset_ref: Option<PresetRef>,
    pub stt_preset_ref: Option<PresetRef>,
    pub tts_preset_ref: Option<PresetRef>,
    pub realtime_preset_ref: Option<PresetRef>,
    pub tool_refs: Vec<String>,
    pub limits: Limits,
    pub session_behavior: SessionBehavior,
    pub room_options: RoomOptions,
    pub conn_options: ConnectionOptions,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    pub status: String,
}

/// The built-in profile used whenever resolution cannot complete.
pub fn default_profile() -> AgentProfile {
    AgentProfile {
        profile_id: DEFAULT_PROFILE_ID.to_string(),
        version: DEFAULT_PROFILE_VERSION.to_string(),
        tenant_id: DEFAULT_TENANT_ID.to_string(),
        mode: AgentMode::Realtime,
        system_prompt: BUILTIN_SYSTEM_PROMPT.to_string(),
        language: DEFAULT_LANGUAGE.to_string(),
        llm_preset_ref: Some(PresetRef::new("gpt-5.1", Some("1"))),
        stt_preset_ref: Some(PresetRef::new("nova-3", Some("1"))),
        tts_preset_ref: Some(PresetRef::new("sonic-3", Some("1"))),
        realtime_preset_ref: Some(PresetRef::new("amazon.nova-2-sonic-v1:0", Some("1"))),
        tool_refs: vec!["http:weather_geocode@1".to_string(), "http:weather_current@1".to_string()],
        limits: Limits {
            max_minutes: Some(30),
            max_tool_calls: Some(50),
            max_tool_calls_per_minute: Some(10),
        },
        session_behavior: SessionBehavior::default(),
        room_options: RoomOptions {
            audio_input: Channel::Configured(AudioInputOptions::default()),
            audio_output: Channel::Configured(AudioOutputOptions::default()),
            text_output: Channel::Configured(TextOutputOptions::default()),
            ..RoomOptions::default()
        },
        conn_options: ConnectionOptions::default(),
        created_at: None,
        updated_at: None,
        status: DEFAULT_STATUS.to_string(),
    }
}
