use chrono::Utc;
use serde_json::{json, Value};

use logicall_core::domain::preset::PresetType;
use logicall_core::domain::profile::{default_profile, AgentProfile};

use crate::keys::RecordKey;
use crate::repositories::{RecordStore, StoreError};
use crate::value::encode_item;

const SEED_PRESETS: &[SeedPreset] = &[
    SeedPreset {
        preset_type: PresetType::Llm,
        preset_id: "gpt-4.1-mini",
        provider: "openai",
        voice_id: None,
    },
    SeedPreset {
        preset_type: PresetType::Stt,
        preset_id: "nova-3",
        provider: "deepgram",
        voice_id: None,
    },
    SeedPreset {
        preset_type: PresetType::Tts,
        preset_id: "sonic-3",
        provider: "cartesia",
        voice_id: Some("9626c31c-bec5-4cca-baa8-f8ba9e84c8bc"),
    },
];

const SEED_HTTP_TOOLS: &[&str] = &["weather_geocode", "weather_current"];

/// Default records every tenant needs for a working first session.
///
/// Writes, in order:
/// 1. the default profile pointer
/// 2. the default profile body (v1)
/// 3. the latest-version pointer for that profile
/// 4. LLM, STT and TTS presets
/// 5. the two weather HTTP tool definitions the profile references
///
/// Seeding is idempotent: re-running overwrites the same keys.
pub async fn seed_defaults(
    store: &dyn RecordStore,
    tenant_id: &str,
) -> Result<SeedResult, StoreError> {
    let now = Utc::now().to_rfc3339();
    let profile = AgentProfile { tenant_id: tenant_id.to_string(), ..default_profile() };
    let mut records = Vec::new();

    let pointer_key = RecordKey::profile_default(tenant_id);
    put_json(
        store,
        &pointer_key,
        json!({
            "entity_type": "default_pointer",
            "profile_id": profile.profile_id,
            "profile_version": profile.version,
            "updated_at": now,
        }),
    )
    .await?;
    records.push(pointer_key);

    let profile_key = RecordKey::profile(tenant_id, &profile.profile_id, &profile.version);
    put_json(store, &profile_key, profile_record(&profile, &now)).await?;
    records.push(profile_key);

    let latest_key = RecordKey::profile_latest(tenant_id, &profile.profile_id);
    put_json(
        store,
        &latest_key,
        json!({
            "entity_type": "latest_pointer",
            "latest_version": profile.version,
            "updated_at": now,
        }),
    )
    .await?;
    records.push(latest_key);

    for preset in SEED_PRESETS {
        let key = RecordKey::preset(preset.preset_type, preset.preset_id, "1");
        put_json(store, &key, preset.record(&now)).await?;
        records.push(key);
    }

    for tool_id in SEED_HTTP_TOOLS {
        let key = RecordKey::http_tool(tool_id, "1");
        put_json(store, &key, http_tool_record(tool_id, &now)).await?;
        records.push(key);
    }

    tracing::info!(
        event_name = "store.seed.completed",
        tenant_id,
        records = records.len(),
        "seeded default records"
    );

    Ok(SeedResult { tenant_id: tenant_id.to_string(), records })
}

/// Checks that every record [`seed_defaults`] writes is present.
pub async fn verify_defaults(
    store: &dyn RecordStore,
    tenant_id: &str,
) -> Result<VerificationResult, StoreError> {
    let mut keys = vec![
        RecordKey::profile_default(tenant_id),
        RecordKey::profile(tenant_id, "default", "1"),
        RecordKey::profile_latest(tenant_id, "default"),
    ];
    keys.extend(
        SEED_PRESETS
            .iter()
            .map(|preset| RecordKey::preset(preset.preset_type, preset.preset_id, "1")),
    );
    keys.extend(SEED_HTTP_TOOLS.iter().map(|tool_id| RecordKey::http_tool(tool_id, "1")));

    let mut checks = Vec::with_capacity(keys.len());
    for key in keys {
        let present = store.get_item(&key).await?.is_some();
        checks.push((key.to_string(), present));
    }

    let all_present = checks.iter().all(|(_, present)| *present);
    Ok(VerificationResult { all_present, checks })
}

async fn put_json(
    store: &dyn RecordStore,
    key: &RecordKey,
    record: Value,
) -> Result<(), StoreError> {
    let Value::Object(record) = record else {
        return Err(StoreError::Decode(format!("seed record for {key} is not an object")));
    };
    store.put_item(key, encode_item(&record)).await
}

fn profile_record(profile: &AgentProfile, now: &str) -> Value {
    let preset_ref = |preset_ref: &Option<logicall_core::PresetRef>| {
        preset_ref.as_ref().map(|preset_ref| {
            json!({"id": preset_ref.id, "version": preset_ref.pinned_version()})
        })
    };
    let behavior = &profile.session_behavior;

    // Nested sections are stored as JSON strings, the layout operators edit by hand.
    let session_behavior = json!({
        "allow_interruptions": behavior.allow_interruptions,
        "discard_audio_if_uninterruptible": behavior.discard_audio_if_uninterruptible,
        "min_interruption_duration": behavior.min_interruption_duration,
        "min_interruption_words": behavior.min_interruption_words,
        "min_endpointing_delay": behavior.min_endpointing_delay,
        "max_endpointing_delay": behavior.max_endpointing_delay,
        "false_interruption_timeout": behavior.false_interruption_timeout,
        "resume_false_interruption": behavior.resume_false_interruption,
        "min_consecutive_speech_delay": behavior.min_consecutive_speech_delay,
        "user_away_timeout": behavior.user_away_timeout,
        "max_tool_steps": behavior.max_tool_steps,
        "preemptive_generation": behavior.preemptive_generation,
        "ivr_detection": behavior.ivr_detection,
    });
    let room_options = json!({
        "text_input": true,
        "audio_input": true,
        "video_input": false,
        "audio_output": true,
        "text_output": true,
        "close_on_disconnect": true,
        "delete_room_on_close": false,
    });
    let conn_options =
        json!({"max_unrecoverable_errors": profile.conn_options.max_unrecoverable_errors});

    json!({
        "entity_type": "profile",
        "profile_id": profile.profile_id,
        "version": profile.version,
        "tenant_id": profile.tenant_id,
        "mode": profile.mode.as_str(),
        "system_prompt": profile.system_prompt,
        "language": profile.language,
        "status": profile.status,
        "llm_preset_ref": preset_ref(&profile.llm_preset_ref),
        "stt_preset_ref": preset_ref(&profile.stt_preset_ref),
        "tts_preset_ref": preset_ref(&profile.tts_preset_ref),
        "realtime_preset_ref": preset_ref(&profile.realtime_preset_ref),
        "tool_refs": profile.tool_refs,
        "limits": {
            "max_minutes": profile.limits.max_minutes,
            "max_tool_calls": profile.limits.max_tool_calls,
            "max_tool_calls_per_minute": profile.limits.max_tool_calls_per_minute,
        },
        "session_behavior": session_behavior.to_string(),
        "room_options": room_options.to_string(),
        "conn_options": conn_options.to_string(),
        "created_at": now,
        "updated_at": now,
    })
}

fn http_tool_record(tool_id: &str, now: &str) -> Value {
    let mut record = match tool_id {
        "weather_geocode" => json!({
            "description": "Look up latitude and longitude for a place name. \
                Pass the place in query_json as {\"name\": \"Paris\", \"count\": 1}.",
            "method": "GET",
            "base_url": "https://geocoding-api.open-meteo.com",
            "path_template": "/v1/search",
            "allowed_query_keys": ["name", "count", "language", "format"],
            "headers_static": {"Accept": "application/json"},
            "headers_dynamic_allowlist": [],
            "timeout_ms": 5000,
            "max_response_bytes": 4096,
            "response_allowlist": ["results"],
        }),
        _ => json!({
            "description": "Get current weather for a latitude/longitude. Pass query_json as \
                {\"latitude\": 48.85, \"longitude\": 2.35, \
                \"current\": \"temperature_2m,wind_speed_10m\"}.",
            "method": "GET",
            "base_url": "https://api.open-meteo.com",
            "path_template": "/v1/forecast",
            "allowed_query_keys": [
                "latitude",
                "longitude",
                "current",
                "timezone",
                "temperature_unit",
                "wind_speed_unit",
            ],
            "headers_static": {"Accept": "application/json"},
            "headers_dynamic_allowlist": [],
            "timeout_ms": 5000,
            "max_response_bytes": 4096,
            "response_allowlist": ["current", "current_units", "timezone"],
        }),
    };

    if let Value::Object(fields) = &mut record {
        fields.insert("entity_type".to_string(), json!("http_tool"));
        fields.insert("http_tool_id".to_string(), json!(tool_id));
        fields.insert("version".to_string(), json!("1"));
        fields.insert("updated_at".to_string(), json!(now));
    }
    record
}

#[derive(Debug, Clone, Copy)]
struct SeedPreset {
    preset_type: PresetType,
    preset_id: &'static str,
    provider: &'static str,
    voice_id: Option<&'static str>,
}

impl SeedPreset {
    fn record(&self, now: &str) -> Value {
        let params = match self.preset_type {
            PresetType::Llm => json!({"temperature": 0.7, "max_tokens": 4096, "top_p": 1.0}),
            PresetType::Stt => {
                json!({"language": "multi", "punctuation": true, "diarization": false})
            }
            PresetType::Tts | PresetType::Realtime => json!({"speed": 1.0, "style": "default"}),
        };

        let mut record = json!({
            "entity_type": "preset",
            "preset_id": self.preset_id,
            "version": "1",
            "provider": self.provider,
            "model": self.preset_id,
            "params": params,
            "created_at": now,
            "updated_at": now,
        });
        if let (Some(voice_id), Value::Object(fields)) = (self.voice_id, &mut record) {
            fields.insert("voice_id".to_string(), json!(voice_id));
        }
        record
    }
}

#[derive(Debug)]
pub struct SeedResult {
    pub tenant_id: String,
    pub records: Vec<RecordKey>,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(String, bool)>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::repositories::InMemoryRecordStore;

    #[tokio::test]
    async fn seed_is_complete_and_idempotent() {
        let store = InMemoryRecordStore::new();

        let first = seed_defaults(&store, "acme").await.expect("seed");
        let first_verification = verify_defaults(&store, "acme").await.expect("verify");
        assert!(first_verification.all_present);
        assert_eq!(first.records.len(), 8);

        let second = seed_defaults(&store, "acme").await.expect("reseed");
        let second_verification = verify_defaults(&store, "acme").await.expect("re-verify");
        assert_eq!(second.records, first.records);
        assert_eq!(first_verification.checks, second_verification.checks);
        assert_eq!(store.len().await, 8);
    }

    #[tokio::test]
    async fn other_tenants_are_not_seeded() {
        let store = InMemoryRecordStore::new();
        seed_defaults(&store, "acme").await.expect("seed");

        let verification = verify_defaults(&store, "globex").await.expect("verify");
        assert!(!verification.all_present);
    }

    #[tokio::test]
    async fn seeded_numbers_keep_their_shape() {
        let store = InMemoryRecordStore::new();
        seed_defaults(&store, "acme").await.expect("seed");

        let preset = store
            .get_record(&RecordKey::preset(PresetType::Llm, "gpt-4.1-mini", "1"))
            .await
            .expect("get")
            .expect("preset present");
        assert_eq!(preset["params"]["max_tokens"], json!(4096));
        assert_eq!(preset["params"]["temperature"], json!(0.7));

        let profile = store
            .get_record(&RecordKey::profile("acme", "default", "1"))
            .await
            .expect("get")
            .expect("profile present");
        assert_eq!(profile["tenant_id"], json!("acme"));
        assert_eq!(profile["limits"]["max_minutes"], json!(30));
        assert!(profile["session_behavior"].is_string());
    }
}
