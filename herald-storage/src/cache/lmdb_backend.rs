//! LMDB-backed rule cache that survives process restarts.
//!
//! Uses the heed crate (Rust bindings for LMDB). Keys are stored in the
//! versioned binary form of [`NotificationRuleCacheKey`], so every entry of a
//! tenant sits under [`NotificationRuleCacheKey::tenant_prefix`] and a
//! reopened environment can still read keys written by an earlier process.
//!
//! # Value Format
//!
//! `[cached_at: 8 bytes, unix millis little-endian][value as JSON]`
//!
//! # Thread Safety
//!
//! LMDB provides ACID transactions. The backend uses:
//! - Read transactions for `get` and prefix scans
//! - Write transactions for `put`, `evict`, `evict_tenant` and expiry
//! - Statistics are tracked with atomic counters

use std::marker::PhantomData;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions, RoTxn, RwTxn};
use herald_core::{CacheError, HeraldError, HeraldResult, TenantId};

use super::config::RuleCacheConfig;
use super::rule_key::NotificationRuleCacheKey;
use super::traits::{CacheCounters, CacheStats, CacheValue, RuleCacheBackend};

/// Length of the timestamp header in front of every stored value.
const TIMESTAMP_LEN: usize = 8;

/// Error type for LMDB cache operations.
#[derive(Debug, thiserror::Error)]
pub enum LmdbCacheError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    /// Failed to open the database within the environment.
    #[error("Failed to open database: {0}")]
    DbOpen(String),

    /// Transaction error.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Deserialization error.
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<LmdbCacheError> for HeraldError {
    fn from(e: LmdbCacheError) -> Self {
        let reason = e.to_string();
        let cache_error = match e {
            LmdbCacheError::Serialization(_) => CacheError::Serialization { reason },
            LmdbCacheError::Deserialization(_) => CacheError::Deserialization { reason },
            _ => CacheError::Backend { reason },
        };
        HeraldError::Cache(cache_error)
    }
}

fn txn_error(e: heed::Error) -> LmdbCacheError {
    LmdbCacheError::Transaction(e.to_string())
}

/// Persistent notification rule cache.
///
/// The handle is typed by the value it stores; the environment itself only
/// holds bytes.
///
/// # Example
///
/// ```ignore
/// let cache = LmdbRuleCache::<Vec<RuleId>>::open(
///     "/var/lib/herald/rules",
///     64,
///     RuleCacheConfig::default(),
/// )?;
///
/// cache.put(key, rule_ids).await?;
/// let cached = cache.get(&key).await?;
/// ```
pub struct LmdbRuleCache<V> {
    /// The LMDB environment.
    env: Env,
    /// The main database (single unnamed database).
    db: Database<Bytes, Bytes>,
    config: RuleCacheConfig,
    counters: CacheCounters,
    _value: PhantomData<fn() -> V>,
}

impl<V: CacheValue> LmdbRuleCache<V> {
    /// Open (or create) a cache stored under `path`.
    ///
    /// # Arguments
    ///
    /// * `path` - Directory where LMDB files will be stored
    /// * `max_size_mb` - Maximum size of the database in megabytes
    /// * `config` - Expiry and capacity settings
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, `max_size_mb` does
    /// not fit in bytes, the directory cannot be created, or the LMDB
    /// environment or database cannot be opened.
    pub fn open<P: AsRef<Path>>(
        path: P,
        max_size_mb: usize,
        config: RuleCacheConfig,
    ) -> HeraldResult<Self> {
        config.validate()?;

        let map_size = max_size_mb.checked_mul(1024 * 1024).ok_or_else(|| {
            LmdbCacheError::EnvOpen(format!("Map size of {} MB overflows usize", max_size_mb))
        })?;

        std::fs::create_dir_all(&path).map_err(LmdbCacheError::from)?;

        // SAFETY: the environment directory is owned by this cache and is not
        // opened elsewhere with different options.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(map_size)
                .max_dbs(1)
                .open(path.as_ref())
        }
        .map_err(|e| LmdbCacheError::EnvOpen(e.to_string()))?;

        let mut wtxn = env.write_txn().map_err(txn_error)?;
        let db: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| LmdbCacheError::DbOpen(e.to_string()))?;
        wtxn.commit().map_err(txn_error)?;

        tracing::debug!(path = %path.as_ref().display(), "Opened notification rule cache");

        Ok(Self {
            env,
            db,
            config,
            counters: CacheCounters::default(),
            _value: PhantomData,
        })
    }

    /// Get the cache configuration.
    pub fn config(&self) -> &RuleCacheConfig {
        &self.config
    }

    /// Copy the stored bytes for `key` out of a read transaction.
    fn read_value(&self, key: &[u8]) -> Result<Option<Vec<u8>>, LmdbCacheError> {
        let rtxn = self.env.read_txn().map_err(txn_error)?;
        let value = self.db.get(&rtxn, key).map_err(txn_error)?.map(<[u8]>::to_vec);
        Ok(value)
    }

    fn entry_count(&self) -> Result<u64, LmdbCacheError> {
        let rtxn = self.env.read_txn().map_err(txn_error)?;
        self.db.len(&rtxn).map_err(txn_error)
    }

    /// Iterate over stored keys, keeping those accepted by `filter`.
    fn collect_keys<F>(
        &self,
        txn: &RoTxn<'_>,
        filter: F,
    ) -> Result<Vec<Vec<u8>>, LmdbCacheError>
    where
        F: Fn(&[u8], &[u8]) -> bool,
    {
        let mut keys = Vec::new();
        for result in self.db.iter(txn).map_err(txn_error)? {
            let (key, value) = result.map_err(txn_error)?;
            if filter(key, value) {
                keys.push(key.to_vec());
            }
        }

        Ok(keys)
    }

    fn delete_keys(
        &self,
        wtxn: &mut RwTxn<'_>,
        keys: &[Vec<u8>],
    ) -> Result<u64, LmdbCacheError> {
        let mut deleted = 0u64;
        for key in keys {
            if self.db.delete(wtxn, key).map_err(txn_error)? {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    /// Delete expired entries inside `wtxn`. The caller commits.
    fn purge_expired(
        &self,
        wtxn: &mut RwTxn<'_>,
        now: DateTime<Utc>,
    ) -> Result<u64, LmdbCacheError> {
        let expired = self.collect_keys(wtxn, |_, value| {
            read_cached_at(value)
                .map(|cached_at| self.config.is_expired(cached_at, now))
                .unwrap_or(false)
        })?;
        self.delete_keys(wtxn, &expired)
    }

    /// Drop the entry under `key` if it is still expired.
    ///
    /// The entry is read again inside the write transaction, so a value
    /// refreshed since the caller's read is kept.
    fn remove_if_expired(&self, key: &[u8], now: DateTime<Utc>) -> Result<u64, LmdbCacheError> {
        let mut wtxn = self.env.write_txn().map_err(txn_error)?;

        let still_expired = match self.db.get(&wtxn, key).map_err(txn_error)? {
            Some(bytes) => self.config.is_expired(read_cached_at(bytes)?, now),
            None => false,
        };
        if !still_expired {
            return Ok(0);
        }

        let removed = self.delete_keys(&mut wtxn, &[key.to_vec()])?;
        wtxn.commit().map_err(txn_error)?;
        Ok(removed)
    }
}

fn read_cached_at(bytes: &[u8]) -> Result<DateTime<Utc>, LmdbCacheError> {
    let header: [u8; TIMESTAMP_LEN] = bytes
        .get(..TIMESTAMP_LEN)
        .and_then(|header| header.try_into().ok())
        .ok_or_else(|| LmdbCacheError::Deserialization("Missing timestamp header".into()))?;
    let millis = i64::from_le_bytes(header);
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| LmdbCacheError::Deserialization(format!("Invalid timestamp {}", millis)))
}

fn encode_entry<V: CacheValue>(
    value: &V,
    cached_at: DateTime<Utc>,
) -> Result<Vec<u8>, LmdbCacheError> {
    let value_bytes =
        serde_json::to_vec(value).map_err(|e| LmdbCacheError::Serialization(e.to_string()))?;

    let mut bytes = Vec::with_capacity(TIMESTAMP_LEN + value_bytes.len());
    bytes.extend_from_slice(&cached_at.timestamp_millis().to_le_bytes());
    bytes.extend_from_slice(&value_bytes);
    Ok(bytes)
}

#[async_trait]
impl<V: CacheValue> RuleCacheBackend for LmdbRuleCache<V> {
    type Value = V;

    async fn get(&self, key: &NotificationRuleCacheKey) -> HeraldResult<Option<V>> {
        if !self.config.is_enabled() {
            self.counters.record_miss();
            return Ok(None);
        }

        let encoded_key = key.encode();
        let Some(bytes) = self.read_value(&encoded_key)? else {
            self.counters.record_miss();
            return Ok(None);
        };

        let now = Utc::now();
        let cached_at = read_cached_at(&bytes)?;
        if self.config.is_expired(cached_at, now) {
            let removed = self.remove_if_expired(&encoded_key, now)?;
            self.counters.record_evictions(removed);
            self.counters.record_miss();
            tracing::trace!(%key, removed, "Expired notification rule cache entry");
            return Ok(None);
        }

        let value: V = serde_json::from_slice(&bytes[TIMESTAMP_LEN..])
            .map_err(|e| LmdbCacheError::Deserialization(e.to_string()))?;
        self.counters.record_hit();
        Ok(Some(value))
    }

    async fn put_at(
        &self,
        key: NotificationRuleCacheKey,
        value: V,
        cached_at: DateTime<Utc>,
    ) -> HeraldResult<()> {
        if !self.config.is_enabled() {
            return Ok(());
        }

        let encoded_key = key.encode();
        let entry = encode_entry(&value, cached_at)?;

        // LMDB allows a single writer, so the capacity check, the purge and the
        // insert below see one consistent count.
        let mut wtxn = self.env.write_txn().map_err(txn_error)?;
        let is_new = self.db.get(&wtxn, &encoded_key).map_err(txn_error)?.is_none();
        let count = self.db.len(&wtxn).map_err(txn_error)?;

        let max_size = self.config.max_size as u64;
        let mut purged = 0;
        if is_new && count >= max_size {
            purged = self.purge_expired(&mut wtxn, Utc::now())?;
        }
        let full = is_new && count.saturating_sub(purged) >= max_size;

        if !full {
            self.db
                .put(&mut wtxn, &encoded_key, &entry)
                .map_err(txn_error)?;
        }
        wtxn.commit().map_err(txn_error)?;

        if purged > 0 {
            self.counters.record_evictions(purged);
            tracing::trace!(purged, "Purged expired notification rule cache entries");
        }

        if full {
            tracing::warn!(
                %key,
                max_size = self.config.max_size,
                "Notification rule cache is full, not caching entry"
            );
            return Ok(());
        }

        tracing::debug!(%key, bytes = entry.len(), "Cached notification rules");
        Ok(())
    }

    async fn evict(&self, key: &NotificationRuleCacheKey) -> HeraldResult<bool> {
        let mut wtxn = self.env.write_txn().map_err(txn_error)?;
        let removed = self.delete_keys(&mut wtxn, &[key.encode().to_vec()])? > 0;
        wtxn.commit().map_err(txn_error)?;

        if removed {
            tracing::debug!(%key, "Evicted notification rule cache entry");
        }
        Ok(removed)
    }

    async fn evict_tenant(&self, tenant_id: TenantId) -> HeraldResult<u64> {
        let prefix = NotificationRuleCacheKey::tenant_prefix(tenant_id);

        let mut wtxn = self.env.write_txn().map_err(txn_error)?;
        let keys = self.collect_keys(&wtxn, |key, _| key.starts_with(&prefix))?;
        let removed = self.delete_keys(&mut wtxn, &keys)?;
        wtxn.commit().map_err(txn_error)?;

        tracing::debug!(%tenant_id, removed, "Evicted notification rules of tenant");
        Ok(removed)
    }

    async fn stats(&self) -> HeraldResult<CacheStats> {
        Ok(self.counters.snapshot(self.entry_count()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use herald_core::NotificationRuleTriggerType;
    use serde::{Deserialize, Serialize};
    use std::time::Duration;
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct RuleSet {
        rule_ids: Vec<String>,
        revision: u32,
    }

    fn rule_set(revision: u32) -> RuleSet {
        RuleSet {
            rule_ids: vec!["high-temp".to_string(), "offline".to_string()],
            revision,
        }
    }

    fn create_test_cache(config: RuleCacheConfig) -> (LmdbRuleCache<RuleSet>, TempDir) {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        let cache = LmdbRuleCache::open(temp_dir.path(), 10, config)
            .expect("cache creation should succeed");
        (cache, temp_dir)
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let (cache, _temp_dir) = create_test_cache(RuleCacheConfig::default());
        let key =
            NotificationRuleCacheKey::new(TenantId::now_v7(), NotificationRuleTriggerType::Alarm);

        cache.put(key, rule_set(1)).await.expect("put should succeed");

        let cached = cache.get(&key).await.expect("get should succeed");
        assert_eq!(cached, Some(rule_set(1)));
    }

    #[tokio::test]
    async fn test_get_nonexistent() {
        let (cache, _temp_dir) = create_test_cache(RuleCacheConfig::default());
        let key =
            NotificationRuleCacheKey::new(TenantId::now_v7(), NotificationRuleTriggerType::Alarm);

        assert!(cache.get(&key).await.expect("get should succeed").is_none());
    }

    #[tokio::test]
    async fn test_entries_survive_reopen() {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        let key = NotificationRuleCacheKey::new(
            TenantId::now_v7(),
            NotificationRuleTriggerType::EdgeConnection,
        );

        {
            let cache =
                LmdbRuleCache::<RuleSet>::open(temp_dir.path(), 10, RuleCacheConfig::default())
                    .expect("cache creation should succeed");
            cache.put(key, rule_set(7)).await.expect("put should succeed");
        }

        let reopened =
            LmdbRuleCache::<RuleSet>::open(temp_dir.path(), 10, RuleCacheConfig::default())
                .expect("cache reopen should succeed");
        let cached = reopened.get(&key).await.expect("get should succeed");
        assert_eq!(cached, Some(rule_set(7)));
    }

    #[tokio::test]
    async fn test_evict() {
        let (cache, _temp_dir) = create_test_cache(RuleCacheConfig::default());
        let key =
            NotificationRuleCacheKey::new(TenantId::now_v7(), NotificationRuleTriggerType::Alarm);

        cache.put(key, rule_set(1)).await.expect("put should succeed");
        assert!(cache.evict(&key).await.expect("evict should succeed"));
        assert!(!cache.evict(&key).await.expect("evict should succeed"));
        assert!(cache.get(&key).await.expect("get should succeed").is_none());
    }

    #[tokio::test]
    async fn test_evict_tenant() {
        let (cache, _temp_dir) = create_test_cache(RuleCacheConfig::default());
        let tenant1 = TenantId::now_v7();
        let tenant2 = TenantId::now_v7();

        for trigger_type in NotificationRuleTriggerType::ALL {
            cache
                .put(NotificationRuleCacheKey::new(tenant1, trigger_type), rule_set(1))
                .await
                .expect("put should succeed");
        }
        let other = NotificationRuleCacheKey::new(tenant2, NotificationRuleTriggerType::Alarm);
        cache.put(other, rule_set(2)).await.expect("put should succeed");

        let removed = cache.evict_tenant(tenant1).await.expect("evict_tenant should succeed");
        assert_eq!(removed, NotificationRuleTriggerType::ALL.len() as u64);

        let cached = cache.get(&other).await.expect("get should succeed");
        assert_eq!(cached, Some(rule_set(2)), "Tenant2's rules should not be affected");
    }

    #[tokio::test]
    async fn test_evict_tenant_leaves_tenantless_keys() {
        let (cache, _temp_dir) = create_test_cache(RuleCacheConfig::default());
        let tenantless = NotificationRuleCacheKey::default()
            .with_trigger_type(NotificationRuleTriggerType::NewPlatformVersion);

        cache.put(tenantless, rule_set(3)).await.expect("put should succeed");
        let removed = cache
            .evict_tenant(TenantId::nil())
            .await
            .expect("evict_tenant should succeed");

        assert_eq!(removed, 0);
        assert!(cache.get(&tenantless).await.expect("get should succeed").is_some());
    }

    #[tokio::test]
    async fn test_expired_entry_is_a_miss() {
        let (cache, _temp_dir) =
            create_test_cache(RuleCacheConfig::new().with_ttl(Duration::from_secs(60)));
        let key =
            NotificationRuleCacheKey::new(TenantId::now_v7(), NotificationRuleTriggerType::Alarm);

        cache
            .put_at(key, rule_set(1), Utc::now() - chrono::Duration::minutes(10))
            .await
            .expect("put should succeed");

        assert!(cache.get(&key).await.expect("get should succeed").is_none());

        let stats = cache.stats().await.expect("stats should succeed");
        assert_eq!(stats.entry_count, 0);
        assert_eq!(stats.evictions, 1);
    }

    #[tokio::test]
    async fn test_full_cache_skips_new_keys() {
        let (cache, _temp_dir) = create_test_cache(RuleCacheConfig::new().with_max_size(1));
        let first =
            NotificationRuleCacheKey::new(TenantId::now_v7(), NotificationRuleTriggerType::Alarm);
        let second =
            NotificationRuleCacheKey::new(TenantId::now_v7(), NotificationRuleTriggerType::Alarm);

        cache.put(first, rule_set(1)).await.expect("put should succeed");
        cache.put(second, rule_set(2)).await.expect("put should succeed");
        cache.put(first, rule_set(3)).await.expect("put should succeed");

        assert!(cache.get(&second).await.expect("get should succeed").is_none());
        assert_eq!(cache.get(&first).await.expect("get should succeed"), Some(rule_set(3)));
    }

    #[tokio::test]
    async fn test_full_cache_purges_expired_before_skipping() {
        let config = RuleCacheConfig::new()
            .with_ttl(Duration::from_secs(60))
            .with_max_size(1);
        let (cache, _temp_dir) = create_test_cache(config);
        let stale = NotificationRuleCacheKey::new(
            TenantId::now_v7(),
            NotificationRuleTriggerType::Alarm,
        );
        let fresh = NotificationRuleCacheKey::new(
            TenantId::now_v7(),
            NotificationRuleTriggerType::Alarm,
        );

        cache
            .put_at(stale, rule_set(1), Utc::now() - chrono::Duration::hours(1))
            .await
            .expect("put should succeed");
        cache.put(fresh, rule_set(2)).await.expect("put should succeed");

        assert_eq!(cache.get(&fresh).await.expect("get should succeed"), Some(rule_set(2)));
        let stats = cache.stats().await.expect("stats should succeed");
        assert_eq!(stats.entry_count, 1);
        assert_eq!(stats.evictions, 1);
    }

    #[tokio::test]
    async fn test_refreshed_entry_survives_expiry_removal() {
        let (cache, _temp_dir) =
            create_test_cache(RuleCacheConfig::new().with_ttl(Duration::from_secs(60)));
        let key = NotificationRuleCacheKey::new(
            TenantId::now_v7(),
            NotificationRuleTriggerType::DeviceActivity,
        );
        let now = Utc::now();

        cache
            .put_at(key, rule_set(1), now - chrono::Duration::minutes(10))
            .await
            .expect("put should succeed");
        // Another writer refreshes the entry after a reader saw it expired.
        cache.put_at(key, rule_set(2), now).await.expect("put should succeed");

        let removed = cache
            .remove_if_expired(&key.encode(), now)
            .expect("removal should succeed");
        assert_eq!(removed, 0);
        assert_eq!(cache.get(&key).await.expect("get should succeed"), Some(rule_set(2)));
    }

    #[tokio::test]
    async fn test_stats() {
        let (cache, _temp_dir) = create_test_cache(RuleCacheConfig::default());
        let key =
            NotificationRuleCacheKey::new(TenantId::now_v7(), NotificationRuleTriggerType::Alarm);

        cache.get(&key).await.expect("get should succeed");
        cache.put(key, rule_set(1)).await.expect("put should succeed");
        cache.get(&key).await.expect("get should succeed");

        let stats = cache.stats().await.expect("stats should succeed");
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entry_count, 1);
    }

    #[tokio::test]
    async fn test_corrupt_value_is_deserialization_error() {
        let (cache, _temp_dir) = create_test_cache(RuleCacheConfig::default());
        let key =
            NotificationRuleCacheKey::new(TenantId::now_v7(), NotificationRuleTriggerType::Alarm);

        let mut bytes = Utc::now().timestamp_millis().to_le_bytes().to_vec();
        bytes.extend_from_slice(b"not json");
        let mut wtxn = cache.env.write_txn().expect("write txn");
        cache.db.put(&mut wtxn, &key.encode(), &bytes).expect("raw put");
        wtxn.commit().expect("commit");

        let err = cache.get(&key).await.expect_err("corrupt value must fail");
        assert!(matches!(err, HeraldError::Cache(CacheError::Deserialization { .. })));
    }

    #[test]
    fn test_open_rejects_oversized_map() {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        let result =
            LmdbRuleCache::<RuleSet>::open(temp_dir.path(), usize::MAX, RuleCacheConfig::default());

        match result {
            Err(HeraldError::Cache(CacheError::Backend { reason })) => {
                assert!(reason.contains("overflows"), "unexpected reason: {}", reason);
            }
            Err(other) => panic!("unexpected error: {:?}", other),
            Ok(_) => panic!("oversized map must be rejected"),
        }
    }

    #[test]
    fn test_read_cached_at_rejects_short_value() {
        assert!(matches!(
            read_cached_at(&[1, 2, 3]),
            Err(LmdbCacheError::Deserialization(_))
        ));
    }

    #[test]
    fn test_entry_header_roundtrip() {
        let cached_at =
            DateTime::from_timestamp_millis(1_700_000_000_123).expect("valid timestamp");
        let entry = encode_entry(&rule_set(1), cached_at).expect("encode should succeed");
        assert_eq!(read_cached_at(&entry).expect("header should parse"), cached_at);
    }
}
