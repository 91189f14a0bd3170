use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::keys::{RecordKey, PARTITION_KEY, SORT_KEY};
use crate::value::{decode_item, AttributeValue, Item};

pub mod memory;
pub mod sql;

pub use memory::InMemoryRecordStore;
pub use sql::SqlRecordStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get_item(&self, key: &RecordKey) -> Result<Option<Item>, StoreError>;

    /// Writes `item` under `key`, replacing any previous record. The key
    /// attributes are stored alongside the payload.
    async fn put_item(&self, key: &RecordKey, item: Item) -> Result<(), StoreError>;

    async fn get_record(&self, key: &RecordKey) -> Result<Option<Map<String, Value>>, StoreError> {
        Ok(self.get_item(key).await?.map(|item| decode_item(&item)))
    }
}

pub(crate) fn with_key_attributes(key: &RecordKey, mut item: Item) -> Item {
    item.insert(PARTITION_KEY.to_string(), AttributeValue::string(&key.pk));
    item.insert(SORT_KEY.to_string(), AttributeValue::string(&key.sk));
    item
}
