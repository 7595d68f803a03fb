//! Herald Storage - Notification Rule Cache
//!
//! The composite cache key for notification rules plus the cache contract
//! it is used with and two reference backends.

pub mod cache;

pub use cache::{
    CacheStats, CacheValue, InMemoryRuleCache, KeyDecodeError, LmdbCacheError, LmdbRuleCache,
    NotificationRuleCacheKey, NotificationRuleCacheKeyBuilder, RuleCacheBackend, RuleCacheConfig,
};
