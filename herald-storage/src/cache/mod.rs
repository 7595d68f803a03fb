//! Notification rule cache.
//!
//! Notification rules are looked up per tenant and per trigger type every
//! time an event arrives, so the matching rules are cached under a
//! [`NotificationRuleCacheKey`]. The key is a plain value; the store behind it
//! is pluggable through [`RuleCacheBackend`].
//!
//! # Backends
//!
//! - [`InMemoryRuleCache`]: a map inside the process, keyed structurally.
//! - [`LmdbRuleCache`]: an LMDB environment keyed by the versioned binary
//!   encoding of the key, readable across restarts.
//!
//! # Example
//!
//! ```ignore
//! let key = NotificationRuleCacheKey::new(tenant_id, NotificationRuleTriggerType::Alarm);
//! let rules = cache.get_or_load(key, || repository.enabled_rules(tenant_id, trigger)).await?;
//!
//! // When a tenant edits its rules
//! cache.evict_tenant(tenant_id).await?;
//! ```

pub mod config;
pub mod lmdb_backend;
pub mod memory_backend;
pub mod rule_key;
pub mod traits;

pub use config::RuleCacheConfig;
pub use lmdb_backend::{LmdbCacheError, LmdbRuleCache};
pub use memory_backend::InMemoryRuleCache;
pub use rule_key::{KeyDecodeError, NotificationRuleCacheKey, NotificationRuleCacheKeyBuilder};
pub use traits::{CacheStats, CacheValue, RuleCacheBackend};
