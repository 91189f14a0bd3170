//! Record Store Adapter: tagged attribute values, record keys and the
//! `RecordStore` implementations the resolvers read from.

pub mod connection;
pub mod fixtures;
pub mod keys;
pub mod migrations;
pub mod repositories;
pub mod value;

pub use connection::{connect, connect_with_settings, DbPool};
pub use fixtures::{seed_defaults, verify_defaults, SeedResult, VerificationResult};
pub use keys::RecordKey;
pub use repositories::{InMemoryRecordStore, RecordStore, SqlRecordStore, StoreError};
pub use value::{decode_item, encode_item, AttributeValue, Item};
