//! Cache backend traits and cacheable value marker.
//!
//! This module defines the contract between notification rule lookups and
//! whatever store holds the cached rules.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use herald_core::{HeraldResult, TenantId};
use serde::{de::DeserializeOwned, Serialize};

use super::rule_key::NotificationRuleCacheKey;

/// Marker trait for values that can be cached.
///
/// Values are cloned out of in-memory backends and serialized into
/// persistent ones, and must be shareable across tasks.
pub trait CacheValue: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> CacheValue for T where T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

/// Cache backend trait for pluggable notification rule caches.
///
/// Keys are compared structurally: any [`NotificationRuleCacheKey`] equal to
/// the one used on `put` finds the entry. A miss is `Ok(None)`, never an
/// error. Implementations must be safe to share across tasks.
#[async_trait]
pub trait RuleCacheBackend: Send + Sync {
    /// Type of the cached value.
    type Value: CacheValue;

    /// Get the value cached under `key`, if any and not expired.
    async fn get(&self, key: &NotificationRuleCacheKey) -> HeraldResult<Option<Self::Value>>;

    /// Store `value` under `key`, recording `cached_at` for expiry.
    ///
    /// Replaces any existing entry for an equal key.
    async fn put_at(
        &self,
        key: NotificationRuleCacheKey,
        value: Self::Value,
        cached_at: DateTime<Utc>,
    ) -> HeraldResult<()>;

    /// Store `value` under `key` as of now.
    async fn put(&self, key: NotificationRuleCacheKey, value: Self::Value) -> HeraldResult<()> {
        self.put_at(key, value, Utc::now()).await
    }

    /// Remove the entry for `key`. Returns whether an entry was removed.
    async fn evict(&self, key: &NotificationRuleCacheKey) -> HeraldResult<bool>;

    /// Remove every entry belonging to a tenant, whatever its trigger type.
    ///
    /// Used when a tenant's notification rules change. Returns the number of
    /// entries removed.
    async fn evict_tenant(&self, tenant_id: TenantId) -> HeraldResult<u64>;

    /// Get cache statistics.
    async fn stats(&self) -> HeraldResult<CacheStats>;

    /// Get the cached value, or load it with `load` and cache the result.
    ///
    /// Errors from `load` are returned as-is and nothing is cached.
    async fn get_or_load<F, Fut>(
        &self,
        key: NotificationRuleCacheKey,
        load: F,
    ) -> HeraldResult<Self::Value>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = HeraldResult<Self::Value>> + Send,
    {
        if let Some(value) = self.get(&key).await? {
            return Ok(value);
        }

        let value = load().await?;
        self.put(key, value.clone()).await?;
        Ok(value)
    }
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses, including reads of expired entries.
    pub misses: u64,
    /// Number of entries currently in cache.
    pub entry_count: u64,
    /// Number of entries dropped because they expired.
    pub evictions: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Hit, miss and eviction counters shared by the backends.
#[derive(Debug, Default)]
pub(crate) struct CacheCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl CacheCounters {
    pub(crate) fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_evictions(&self, count: u64) {
        self.evictions.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, entry_count: u64) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entry_count,
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}
