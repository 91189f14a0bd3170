use chrono::Utc;
use sqlx::Row;

use super::{with_key_attributes, RecordStore, StoreError};
use crate::keys::RecordKey;
use crate::value::Item;
use crate::DbPool;

pub struct SqlRecordStore {
    pool: DbPool,
}

impl SqlRecordStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_item(row: &sqlx::sqlite::SqliteRow) -> Result<Item, StoreError> {
    let raw: String = row.try_get("item").map_err(|e| StoreError::Decode(e.to_string()))?;
    serde_json::from_str(&raw).map_err(|e| StoreError::Decode(e.to_string()))
}

#[async_trait::async_trait]
impl RecordStore for SqlRecordStore {
    async fn get_item(&self, key: &RecordKey) -> Result<Option<Item>, StoreError> {
        let row = sqlx::query("SELECT item FROM config_record WHERE pk = ? AND sk = ?")
            .bind(&key.pk)
            .bind(&key.sk)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_item(r)?)),
            None => Ok(None),
        }
    }

    async fn put_item(&self, key: &RecordKey, item: Item) -> Result<(), StoreError> {
        let item = with_key_attributes(key, item);
        let payload = serde_json::to_string(&item).map_err(|e| StoreError::Decode(e.to_string()))?;

        sqlx::query(
            "INSERT INTO config_record (pk, sk, item, updated_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(pk, sk) DO UPDATE SET
                 item = excluded.item,
                 updated_at = excluded.updated_at",
        )
        .bind(&key.pk)
        .bind(&key.sk)
        .bind(payload)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::SqlRecordStore;
    use crate::keys::RecordKey;
    use crate::repositories::{RecordStore, StoreError};
    use crate::value::{encode_item, AttributeValue};
    use crate::{connect_with_settings, migrations};

    async fn store() -> SqlRecordStore {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("run migrations");
        SqlRecordStore::new(pool)
    }

    #[tokio::test]
    async fn records_round_trip_through_sqlite() {
        let store = store().await;
        let key = RecordKey::http_tool("weather_current", "1");
        let record = json!({
            "base_url": "https://api.open-meteo.com",
            "timeout_ms": 8000,
            "allowed_query_keys": ["latitude", "longitude"],
        });
        let record = record.as_object().cloned().unwrap_or_default();

        store.put_item(&key, encode_item(&record)).await.expect("put");
        let loaded = store.get_record(&key).await.expect("get").expect("record present");

        assert_eq!(loaded.get("timeout_ms"), Some(&json!(8000)));
        assert_eq!(loaded.get("allowed_query_keys"), Some(&json!(["latitude", "longitude"])));
        assert_eq!(loaded.get("sk"), Some(&json!("ID#weather_current#V#1")));
    }

    #[tokio::test]
    async fn put_replaces_existing_record() {
        let store = store().await;
        let key = RecordKey::profile_latest("default", "default");

        for version in ["1", "2"] {
            let item = [("latest_version".to_string(), AttributeValue::string(version))]
                .into_iter()
                .collect();
            store.put_item(&key, item).await.expect("put");
        }

        let loaded = store.get_record(&key).await.expect("get").expect("record present");
        assert_eq!(loaded.get("latest_version"), Some(&json!("2")));
    }

    #[tokio::test]
    async fn corrupt_payload_is_a_decode_error() {
        let store = store().await;
        sqlx::query(
            "INSERT INTO config_record (pk, sk, item, updated_at)
             VALUES ('X', 'Y', '{\"a\":1}', '')",
        )
        .execute(&store.pool)
        .await
        .expect("insert raw row");

        let result = store.get_item(&RecordKey::new("X", "Y")).await;
        assert!(matches!(result, Err(StoreError::Decode(_))));
    }
}
