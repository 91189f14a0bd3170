use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use logicall_agent::ProfileResolver;
use logicall_core::domain::profile::default_profile;
use logicall_store::{seed_defaults, InMemoryRecordStore, Item, RecordKey, RecordStore, StoreError};

type ProfileResolutionTestResult<T = ()> = Result<T, String>;

macro_rules! require {
    ($cond:expr) => {
        if !$cond {
            return Err(format!("assertion failed: `{}`", stringify!($cond)));
        }
    };
}

macro_rules! require_eq {
    ($left:expr, $right:expr) => {
        if $left != $right {
            return Err(format!(
                "assertion failed: `left == right` (`{:?}` != `{:?}`)",
                $left,
                $right
            ));
        }
    };
}

/// Counts reads and can be switched to fail every call.
#[derive(Default)]
struct CountingStore {
    inner: InMemoryRecordStore,
    reads: AtomicUsize,
    unavailable: AtomicBool,
}

#[async_trait]
impl RecordStore for CountingStore {
    async fn get_item(&self, key: &RecordKey) -> Result<Option<Item>, StoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection refused".to_string()));
        }
        self.inner.get_item(key).await
    }

    async fn put_item(&self, key: &RecordKey, item: Item) -> Result<(), StoreError> {
        self.inner.put_item(key, item).await
    }
}

async fn seeded(tenant_id: &str) -> ProfileResolutionTestResult<Arc<CountingStore>> {
    let store = Arc::new(CountingStore::default());
    seed_defaults(store.as_ref(), tenant_id).await.map_err(|err| format!("seed failed: {err}"))?;
    Ok(store)
}

#[tokio::test]
async fn pointers_lead_to_the_seeded_profile() -> ProfileResolutionTestResult {
    let store = seeded("acme").await?;
    let resolver = ProfileResolver::new(store.clone());

    let profile = resolver.resolve("acme", None, None).await;

    require_eq!(profile.tenant_id.as_str(), "acme");
    require_eq!(profile.profile_id.as_str(), "default");
    require_eq!(profile.version.as_str(), "1");
    require_eq!(store.reads.load(Ordering::SeqCst), 3);
    Ok(())
}

#[tokio::test]
async fn repeated_resolution_is_served_from_cache() -> ProfileResolutionTestResult {
    let store = seeded("acme").await?;
    let resolver = ProfileResolver::new(store.clone());

    let first = resolver.resolve("acme", Some("default"), Some("1")).await;
    let reads_after_first = store.reads.load(Ordering::SeqCst);
    let second = resolver.resolve("acme", Some("default"), Some("1")).await;

    require_eq!(first, second);
    require_eq!(reads_after_first, 1);
    require_eq!(store.reads.load(Ordering::SeqCst), 1);
    require_eq!(resolver.cached_profiles().await, 1);
    Ok(())
}

#[tokio::test]
async fn cached_versions_survive_a_store_outage() -> ProfileResolutionTestResult {
    let store = seeded("acme").await?;
    let resolver = ProfileResolver::new(store.clone());
    let warmed = resolver.resolve("acme", Some("default"), Some("1")).await;

    store.unavailable.store(true, Ordering::SeqCst);
    let cached = resolver.resolve("acme", Some("default"), Some("1")).await;
    let uncached = resolver.resolve("acme", None, None).await;

    require_eq!(cached, warmed);
    require_eq!(cached.tenant_id.as_str(), "acme");
    require_eq!(uncached, default_profile());
    Ok(())
}

#[tokio::test]
async fn missing_records_fall_back_at_every_step() -> ProfileResolutionTestResult {
    let store = seeded("acme").await?;
    let resolver = ProfileResolver::new(store);

    for (tenant, profile_id, version) in [
        ("globex", None, None),
        ("acme", Some("sales"), None),
        ("acme", Some("default"), Some("7")),
    ] {
        let profile = resolver.resolve(tenant, profile_id, version).await;
        require_eq!(profile, default_profile());
    }
    require!(resolver.cached_profiles().await == 0);
    Ok(())
}
