//! In-process rule cache keyed directly by [`NotificationRuleCacheKey`].
//!
//! Entries live in a `HashMap` behind a `tokio::sync::RwLock`, so lookups rely
//! on the key's structural `Hash` and `Eq`. Expired entries are dropped when
//! read, and purged in bulk when the map reaches `max_size`.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use herald_core::{HeraldResult, TenantId};
use tokio::sync::RwLock;

use super::config::RuleCacheConfig;
use super::rule_key::NotificationRuleCacheKey;
use super::traits::{CacheCounters, CacheStats, CacheValue, RuleCacheBackend};

#[derive(Debug, Clone)]
struct CachedEntry<V> {
    value: V,
    cached_at: DateTime<Utc>,
}

/// In-memory notification rule cache.
///
/// # Example
///
/// ```ignore
/// let cache = InMemoryRuleCache::<Vec<RuleId>>::new(RuleCacheConfig::default())?;
/// let key = NotificationRuleCacheKey::new(tenant_id, NotificationRuleTriggerType::Alarm);
///
/// let rules = cache.get_or_load(key, || load_enabled_rules(tenant_id)).await?;
///
/// // Rules of the tenant changed
/// cache.evict_tenant(tenant_id).await?;
/// ```
pub struct InMemoryRuleCache<V> {
    entries: RwLock<HashMap<NotificationRuleCacheKey, CachedEntry<V>>>,
    config: RuleCacheConfig,
    counters: CacheCounters,
}

impl<V: CacheValue> InMemoryRuleCache<V> {
    /// Create a cache with the given configuration.
    pub fn new(config: RuleCacheConfig) -> HeraldResult<Self> {
        config.validate()?;
        Ok(Self {
            entries: RwLock::new(HashMap::new()),
            config,
            counters: CacheCounters::default(),
        })
    }

    /// Create a cache with default configuration.
    pub fn with_defaults() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            config: RuleCacheConfig::default(),
            counters: CacheCounters::default(),
        }
    }

    /// Get the cache configuration.
    pub fn config(&self) -> &RuleCacheConfig {
        &self.config
    }

    /// Number of stored entries, expired ones included until purged.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    fn purge_expired(
        &self,
        entries: &mut HashMap<NotificationRuleCacheKey, CachedEntry<V>>,
        now: DateTime<Utc>,
    ) -> u64 {
        let before = entries.len();
        entries.retain(|_, entry| !self.config.is_expired(entry.cached_at, now));
        let purged = (before - entries.len()) as u64;
        if purged > 0 {
            self.counters.record_evictions(purged);
            tracing::trace!(purged, "Purged expired notification rule cache entries");
        }
        purged
    }
}

#[async_trait]
impl<V: CacheValue> RuleCacheBackend for InMemoryRuleCache<V> {
    type Value = V;

    async fn get(&self, key: &NotificationRuleCacheKey) -> HeraldResult<Option<V>> {
        if !self.config.is_enabled() {
            self.counters.record_miss();
            return Ok(None);
        }

        let now = Utc::now();
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(entry) if !self.config.is_expired(entry.cached_at, now) => {
                    self.counters.record_hit();
                    return Ok(Some(entry.value.clone()));
                }
                Some(_) => {}
                None => {
                    self.counters.record_miss();
                    return Ok(None);
                }
            }
        }

        // Expired: re-check under the write lock, a concurrent put may have refreshed it.
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.get(key) {
            if !self.config.is_expired(entry.cached_at, now) {
                self.counters.record_hit();
                return Ok(Some(entry.value.clone()));
            }
            entries.remove(key);
            self.counters.record_evictions(1);
            tracing::trace!(%key, "Expired notification rule cache entry");
        }
        self.counters.record_miss();
        Ok(None)
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

        let mut entries = self.entries.write().await;
        if !entries.contains_key(&key) && entries.len() >= self.config.max_size {
            self.purge_expired(&mut entries, Utc::now());
            if entries.len() >= self.config.max_size {
                tracing::warn!(
                    %key,
                    max_size = self.config.max_size,
                    "Notification rule cache is full, not caching entry"
                );
                return Ok(());
            }
        }

        entries.insert(key, CachedEntry { value, cached_at });
        tracing::debug!(%key, "Cached notification rules");
        Ok(())
    }

    async fn evict(&self, key: &NotificationRuleCacheKey) -> HeraldResult<bool> {
        let removed = self.entries.write().await.remove(key).is_some();
        if removed {
            tracing::debug!(%key, "Evicted notification rule cache entry");
        }
        Ok(removed)
    }

    async fn evict_tenant(&self, tenant_id: TenantId) -> HeraldResult<u64> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|key, _| !key.belongs_to(tenant_id));
        let removed = (before - entries.len()) as u64;

        tracing::debug!(%tenant_id, removed, "Evicted notification rules of tenant");
        Ok(removed)
    }

    async fn stats(&self) -> HeraldResult<CacheStats> {
        let entry_count = self.entries.read().await.len() as u64;
        Ok(self.counters.snapshot(entry_count))
    }
}
