use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::RwLock;

use super::{with_key_attributes, RecordStore, StoreError};
use crate::keys::RecordKey;
use crate::value::Item;

#[derive(Default)]
pub struct InMemoryRecordStore {
    items: RwLock<HashMap<RecordKey, Item>>,
    reads: AtomicUsize,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `get_item` calls served so far.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }

    pub async fn len(&self) -> usize {
        self.items.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.read().await.is_empty()
    }
}

#[async_trait::async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn get_item(&self, key: &RecordKey) -> Result<Option<Item>, StoreError> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        let items = self.items.read().await;
        Ok(items.get(key).cloned())
    }

    async fn put_item(&self, key: &RecordKey, item: Item) -> Result<(), StoreError> {
        let mut items = self.items.write().await;
        items.insert(key.clone(), with_key_attributes(key, item));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::keys::RecordKey;
    use crate::repositories::{InMemoryRecordStore, RecordStore};
    use crate::value::AttributeValue;

    #[tokio::test]
    async fn put_then_get_returns_decoded_record_with_keys() {
        let store = InMemoryRecordStore::new();
        let key = RecordKey::profile_latest("acme", "support");
        let item = [("latest_version".to_string(), AttributeValue::string("4"))]
            .into_iter()
            .collect();

        store.put_item(&key, item).await.expect("put");
        let record = store.get_record(&key).await.expect("get").expect("record present");

        assert_eq!(record.get("latest_version"), Some(&json!("4")));
        assert_eq!(record.get("pk"), Some(&json!("TENANT#acme")));
        assert_eq!(record.get("sk"), Some(&json!("PROFILE_LATEST#support")));
        assert_eq!(store.reads(), 1);
    }

    #[tokio::test]
    async fn missing_key_is_none() {
        let store = InMemoryRecordStore::new();
        let record = store.get_record(&RecordKey::profile_default("nobody")).await.expect("get");

        assert!(record.is_none());
        assert!(store.is_empty().await);
    }
}
