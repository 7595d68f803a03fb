//! Herald Core - Entity Types
//!
//! Pure data structures shared by the storage layer. No I/O lives here.

pub mod enums;
pub mod error;
pub mod identity;

pub use enums::{NotificationRuleTriggerType, TriggerTypeParseError};
pub use error::{CacheError, ConfigError, HeraldError, HeraldResult};
pub use identity::TenantId;
