//! Profile resolution: pointer indirection, cached record fetch and the
//! field-level default cascade.
//!
//! [`ProfileResolver::resolve`] never fails. Every miss or store error is
//! logged and answered with [`default_profile`], and every malformed field
//! inside a found record is answered with that field's default.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use logicall_core::domain::preset::PresetRef;
use logicall_core::domain::profile::{
    default_profile, AgentMode, AgentProfile, AudioInputOptions, AudioOutputOptions, Channel,
    ConnectionOptions, Limits, RoomOptions, SessionBehavior, TextInputOptions, TextOutputOptions,
    TurnDetectionMode, DEFAULT_LANGUAGE, DEFAULT_PROFILE_ID, DEFAULT_PROFILE_VERSION,
    DEFAULT_STATUS, DEFAULT_TENANT_ID, FALLBACK_SYSTEM_PROMPT,
};
use logicall_store::{RecordKey, RecordStore};

type ProfileRecord = Map<String, Value>;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct ProfileCacheKey {
    tenant_id: String,
    profile_id: String,
    version: String,
}

pub struct ProfileResolver {
    store: Arc<dyn RecordStore>,
    cache: RwLock<HashMap<ProfileCacheKey, Arc<ProfileRecord>>>,
}

impl ProfileResolver {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store, cache: RwLock::new(HashMap::new()) }
    }

    pub async fn resolve(
        &self,
        tenant_id: &str,
        profile_id: Option<&str>,
        profile_version: Option<&str>,
    ) -> AgentProfile {
        let profile_id = match profile_id {
            Some(profile_id) => profile_id.to_string(),
            None => match self.default_profile_id(tenant_id).await {
                Some(profile_id) => profile_id,
                None => return fallback(tenant_id, "no default profile pointer"),
            },
        };

        let version = match profile_version {
            Some(version) => version.to_string(),
            None => match self.latest_version(tenant_id, &profile_id).await {
                Some(version) => version,
                None => return fallback(tenant_id, "no latest version pointer"),
            },
        };

        let Some(record) = self.fetch_profile(tenant_id, &profile_id, &version).await else {
            return fallback(tenant_id, "profile record not found");
        };

        debug!(
            event_name = "profile.resolve.loaded",
            tenant_id,
            profile_id = %profile_id,
            version = %version,
            "profile record loaded"
        );
        build_profile(&record)
    }

    /// Number of profile bodies held in the cache.
    pub async fn cached_profiles(&self) -> usize {
        self.cache.read().await.len()
    }

    async fn default_profile_id(&self, tenant_id: &str) -> Option<String> {
        let record = self.read_record(&RecordKey::profile_default(tenant_id)).await?;
        text(&record, "profile_id")
    }

    async fn latest_version(&self, tenant_id: &str, profile_id: &str) -> Option<String> {
        let record = self.read_record(&RecordKey::profile_latest(tenant_id, profile_id)).await?;
        text(&record, "latest_version")
    }

    async fn fetch_profile(
        &self,
        tenant_id: &str,
        profile_id: &str,
        version: &str,
    ) -> Option<Arc<ProfileRecord>> {
        let cache_key = ProfileCacheKey {
            tenant_id: tenant_id.to_string(),
            profile_id: profile_id.to_string(),
            version: version.to_string(),
        };

        if let Some(record) = self.cache.read().await.get(&cache_key) {
            return Some(Arc::clone(record));
        }

        let record = Arc::new(
            self.read_record(&RecordKey::profile(tenant_id, profile_id, version)).await?,
        );
        // Versions are immutable, so a racing insert for the same key holds the same data.
        self.cache.write().await.entry(cache_key).or_insert_with(|| Arc::clone(&record));
        Some(record)
    }

    async fn read_record(&self, key: &RecordKey) -> Option<ProfileRecord> {
        match self.store.get_record(key).await {
            Ok(record) => record,
            Err(error) => {
                warn!(
                    event_name = "profile.resolve.store_error",
                    key = %key,
                    error = %error,
                    "profile store lookup failed"
                );
                None
            }
        }
    }
}

fn fallback(tenant_id: &str, reason: &'static str) -> AgentProfile {
    warn!(
        event_name = "profile.resolve.fallback",
        tenant_id,
        reason,
        "using built-in default profile"
    );
    default_profile()
}

/// Applies the default cascade to a decoded profile record.
pub fn build_profile(record: &ProfileRecord) -> AgentProfile {
    let mode = match text(record, "mode") {
        None => AgentMode::default(),
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            warn!(event_name = "profile.decode.unknown_mode", mode = %raw, "unknown agent mode");
            AgentMode::default()
        }),
    };

    AgentProfile {
        profile_id: text(record, "profile_id").unwrap_or_else(|| DEFAULT_PROFILE_ID.to_string()),
        version: text(record, "version").unwrap_or_else(|| DEFAULT_PROFILE_VERSION.to_string()),
        tenant_id: text(record, "tenant_id").unwrap_or_else(|| DEFAULT_TENANT_ID.to_string()),
        mode,
        system_prompt: text(record, "system_prompt")
            .unwrap_or_else(|| FALLBACK_SYSTEM_PROMPT.to_string()),
        language: text(record, "language").unwrap_or_else(|| DEFAULT_LANGUAGE.to_string()),
        llm_preset_ref: preset_ref(record.get("llm_preset_ref"), "gpt-5.1"),
        stt_preset_ref: preset_ref(record.get("stt_preset_ref"), "nova-3"),
        tts_preset_ref: preset_ref(record.get("tts_preset_ref"), "sonic-3"),
        realtime_preset_ref: preset_ref(
            record.get("realtime_preset_ref"),
            "amazon.nova-2-sonic-v1:0",
        ),
        tool_refs: string_list(record.get("tool_refs")).unwrap_or_default(),
        limits: limits(&section(record, "limits")),
        session_behavior: session_behavior(&section(record, "session_behavior")),
        room_options: room_options(&section(record, "room_options")),
        conn_options: conn_options(&section(record, "conn_options")),
        created_at: text(record, "created_at"),
        updated_at: text(record, "updated_at"),
        status: text(record, "status").unwrap_or_else(|| DEFAULT_STATUS.to_string()),
    }
}

/// A nested section may be stored as a map or as a JSON-encoded string.
/// Anything unreadable becomes an empty section, i.e. all defaults.
fn section(record: &ProfileRecord, name: &'static str) -> ProfileRecord {
    match record.get(name) {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(fields)) => fields.clone(),
        Some(Value::String(raw)) if raw.trim().is_empty() => Map::new(),
        Some(Value::String(raw)) => match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(fields)) => fields,
            Ok(_) | Err(_) => {
                warn!(
                    event_name = "profile.decode.malformed_section",
                    section = name,
                    "section is not a JSON object, using defaults"
                );
                Map::new()
            }
        },
        Some(_) => {
            warn!(
                event_name = "profile.decode.malformed_section",
                section = name,
                "section has an unexpected type, using defaults"
            );
            Map::new()
        }
    }
}

fn preset_ref(raw: Option<&Value>, default_id: &str) -> Option<PresetRef> {
    match raw? {
        Value::Object(fields) => Some(PresetRef {
            id: text(fields, "id").unwrap_or_else(|| default_id.to_string()),
            version: text(fields, "version"),
        }),
        Value::String(id) if !id.trim().is_empty() => Some(PresetRef::new(id.trim(), None)),
        _ => None,
    }
}

fn limits(fields: &ProfileRecord) -> Limits {
    Limits {
        max_minutes: count(fields, "max_minutes"),
        max_tool_calls: count(fields, "max_tool_calls"),
        max_tool_calls_per_minute: count(fields, "max_tool_calls_per_minute"),
    }
}

fn session_behavior(fields: &ProfileRecord) -> SessionBehavior {
    let defaults = SessionBehavior::default();

    let turn_detection = text(fields, "turn_detection").and_then(|raw| {
        raw.parse::<TurnDetectionMode>()
            .map_err(|_| {
                warn!(
                    event_name = "profile.decode.unknown_turn_detection",
                    turn_detection = %raw,
                    "unknown turn detection mode, using auto"
                );
            })
            .ok()
    });

    SessionBehavior {
        allow_interruptions: flag(fields, "allow_interruptions")
            .unwrap_or(defaults.allow_interruptions),
        discard_audio_if_uninterruptible: flag(fields, "discard_audio_if_uninterruptible")
            .unwrap_or(defaults.discard_audio_if_uninterruptible),
        min_interruption_duration: float(fields, "min_interruption_duration")
            .unwrap_or(defaults.min_interruption_duration),
        min_interruption_words: count(fields, "min_interruption_words")
            .unwrap_or(defaults.min_interruption_words),
        min_endpointing_delay: float(fields, "min_endpointing_delay")
            .unwrap_or(defaults.min_endpointing_delay),
        max_endpointing_delay: float(fields, "max_endpointing_delay")
            .unwrap_or(defaults.max_endpointing_delay),
        false_interruption_timeout: nullable_float(
            fields,
            "false_interruption_timeout",
            defaults.false_interruption_timeout,
        ),
        resume_false_interruption: flag(fields, "resume_false_interruption")
            .unwrap_or(defaults.resume_false_interruption),
        min_consecutive_speech_delay: float(fields, "min_consecutive_speech_delay")
            .unwrap_or(defaults.min_consecutive_speech_delay),
        user_away_timeout: nullable_float(fields, "user_away_timeout", defaults.user_away_timeout),
        max_tool_steps: count(fields, "max_tool_steps").unwrap_or(defaults.max_tool_steps),
        use_tts_aligned_transcript: flag(fields, "use_tts_aligned_transcript"),
        tts_text_transforms: string_list(fields.get("tts_text_transforms")),
        preemptive_generation: flag(fields, "preemptive_generation")
            .unwrap_or(defaults.preemptive_generation),
        ivr_detection: flag(fields, "ivr_detection").unwrap_or(defaults.ivr_detection),
        turn_detection,
    }
}

fn room_options(fields: &ProfileRecord) -> RoomOptions {
    let defaults = RoomOptions::default();

    RoomOptions {
        text_input: channel(fields.get("text_input"), |options| TextInputOptions {
            enabled: flag(options, "enabled").unwrap_or(true),
        }),
        audio_input: channel(fields.get("audio_input"), |options| {
            let defaults = AudioInputOptions::default();
            AudioInputOptions {
                sample_rate: count(options, "sample_rate").unwrap_or(defaults.sample_rate),
                num_channels: count(options, "num_channels").unwrap_or(defaults.num_channels),
                frame_size_ms: count(options, "frame_size_ms").unwrap_or(defaults.frame_size_ms),
                noise_cancellation: text(options, "noise_cancellation"),
                pre_connect_audio: flag(options, "pre_connect_audio")
                    .unwrap_or(defaults.pre_connect_audio),
                pre_connect_audio_timeout: float(options, "pre_connect_audio_timeout")
                    .unwrap_or(defaults.pre_connect_audio_timeout),
            }
        }),
        video_input: matches!(
            fields.get("video_input"),
            Some(Value::Bool(true) | Value::Object(_))
        ),
        audio_output: channel(fields.get("audio_output"), |options| {
            let defaults = AudioOutputOptions::default();
            AudioOutputOptions {
                sample_rate: count(options, "sample_rate").unwrap_or(defaults.sample_rate),
                num_channels: count(options, "num_channels").unwrap_or(defaults.num_channels),
                track_name: text(options, "track_name"),
            }
        }),
        text_output: channel(fields.get("text_output"), |options| TextOutputOptions {
            enabled: flag(options, "enabled").unwrap_or(true),
            sync_transcription: flag(options, "sync_transcription"),
            transcription_speed_factor: float(options, "transcription_speed_factor").unwrap_or(1.0),
        }),
        participant_kinds: string_list(fields.get("participant_kinds")),
        participant_identity: text(fields, "participant_identity"),
        close_on_disconnect: flag(fields, "close_on_disconnect")
            .unwrap_or(defaults.close_on_disconnect),
        delete_room_on_close: flag(fields, "delete_room_on_close")
            .unwrap_or(defaults.delete_room_on_close),
    }
}

fn conn_options(fields: &ProfileRecord) -> ConnectionOptions {
    ConnectionOptions {
        max_unrecoverable_errors: count(fields, "max_unrecoverable_errors")
            .unwrap_or(ConnectionOptions::default().max_unrecoverable_errors),
    }
}

/// `false` disables a channel, a map configures it, anything else enables it
/// with runtime defaults.
fn channel<T>(raw: Option<&Value>, configure: impl FnOnce(&ProfileRecord) -> T) -> Channel<T> {
    match raw {
        Some(Value::Bool(false)) => Channel::Disabled,
        Some(Value::Object(options)) => Channel::Configured(configure(options)),
        _ => Channel::Enabled,
    }
}

fn text(fields: &ProfileRecord, key: &str) -> Option<String> {
    match fields.get(key)? {
        Value::String(value) => {
            let trimmed = value.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(value) => Some(value.to_string()),
        _ => None,
    }
}

fn flag(fields: &ProfileRecord, key: &str) -> Option<bool> {
    fields.get(key).and_then(Value::as_bool)
}

fn float(fields: &ProfileRecord, key: &str) -> Option<f64> {
    fields.get(key).and_then(Value::as_f64).filter(|value| value.is_finite())
}

/// Absent keeps the default, explicit `null` switches the feature off.
fn nullable_float(fields: &ProfileRecord, key: &str, default: Option<f64>) -> Option<f64> {
    match fields.get(key) {
        None => default,
        Some(Value::Null) => None,
        Some(_) => float(fields, key).or(default),
    }
}

fn count(fields: &ProfileRecord, key: &str) -> Option<u32> {
    let value = fields.get(key)?;
    if let Some(value) = value.as_u64() {
        return u32::try_from(value).ok();
    }
    value
        .as_f64()
        .filter(|value| value.fract() == 0.0 && *value >= 0.0 && *value <= f64::from(u32::MAX))
        .map(|value| value as u32)
}

fn string_list(raw: Option<&Value>) -> Option<Vec<String>> {
    match raw? {
        Value::Array(values) => {
            Some(values.iter().filter_map(Value::as_str).map(str::to_string).collect())
        }
        _ => None,
    }
}
