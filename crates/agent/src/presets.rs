use std::sync::Arc;

use tracing::{debug, warn};

use logicall_core::domain::preset::{Preset, PresetRef, PresetType};
use logicall_store::{RecordKey, RecordStore};

/// Fetches versioned model presets. Absent versions pin to `"1"`.
pub struct PresetResolver {
    store: Arc<dyn RecordStore>,
}

impl PresetResolver {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Returns `None` on a miss or a store failure; callers build a
    /// fallback model from the reference id.
    pub async fn fetch(&self, preset_type: PresetType, preset_ref: &PresetRef) -> Option<Preset> {
        let key = RecordKey::preset(preset_type, &preset_ref.id, preset_ref.pinned_version());

        match self.store.get_record(&key).await {
            Ok(Some(record)) => {
                debug!(event_name = "presets.fetch.hit", key = %key, "preset loaded");
                Some(Preset::from_record(preset_type, preset_ref, &record))
            }
            Ok(None) => {
                warn!(
                    event_name = "presets.fetch.miss",
                    key = %key,
                    "preset not found, falling back to reference id"
                );
                None
            }
            Err(error) => {
                warn!(
                    event_name = "presets.fetch.store_error",
                    key = %key,
                    error = %error,
                    "preset lookup failed, falling back to reference id"
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use logicall_core::domain::preset::{PresetRef, PresetType};
    use logicall_store::{encode_item, InMemoryRecordStore, RecordKey, RecordStore};

    use super::PresetResolver;

    #[tokio::test]
    async fn unversioned_ref_reads_version_one() {
        let store = Arc::new(InMemoryRecordStore::new());
        let record = json!({"provider": "openai", "model": "gpt-4.1-mini"});
        let record = record.as_object().cloned().unwrap_or_default();
        let key = RecordKey::preset(PresetType::Llm, "gpt-4.1-mini", "1");
        store.put_item(&key, encode_item(&record)).await.expect("put");

        let resolver = PresetResolver::new(store.clone());
        let preset = resolver
            .fetch(PresetType::Llm, &PresetRef::new("gpt-4.1-mini", None))
            .await
            .expect("preset should resolve");

        assert_eq!(preset.version, "1");
        assert_eq!(preset.provider.as_deref(), Some("openai"));
        assert_eq!(key.sk, "ID#gpt-4.1-mini#V#1");
    }

    #[tokio::test]
    async fn missing_preset_is_none() {
        let resolver = PresetResolver::new(Arc::new(InMemoryRecordStore::new()));
        let preset = resolver.fetch(PresetType::Tts, &PresetRef::new("sonic-9", Some("4"))).await;

        assert!(preset.is_none());
    }
}
