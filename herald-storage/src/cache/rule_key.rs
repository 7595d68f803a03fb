//! Composite cache key for notification rules.
//!
//! A [`NotificationRuleCacheKey`] addresses the cached rules of one tenant for
//! one trigger type. It is a plain value: equality and hashing are structural,
//! so two keys built independently from the same parts hit the same entry.
//!
//! Both parts are optional. A default key with no parts exists so that
//! deserialization can start from an empty value; such a key is not
//! [complete](NotificationRuleCacheKey::is_complete) but is still accepted by
//! every operation, and it compares equal to every other empty key.

use std::fmt;

use herald_core::{CacheError, HeraldError, NotificationRuleTriggerType, TenantId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Separator byte between the tenant part and the trigger part.
const SEPARATOR: u8 = 0xFF;

/// Rendering of an absent part in `Display`.
const ABSENT: &str = "null";

/// Key for the notification rules of a tenant and trigger type.
///
/// # Binary Format
///
/// [`encode`](Self::encode) produces a fixed 21-byte array:
/// - Byte 0: schema version ([`SCHEMA_VERSION`](Self::SCHEMA_VERSION))
/// - Byte 1: tenant presence flag (0 or 1)
/// - Bytes 2-17: tenant id (UUID bytes, zero when absent)
/// - Byte 18: separator (0xFF)
/// - Byte 19: trigger type presence flag (0 or 1)
/// - Byte 20: trigger type discriminant (zero when absent)
///
/// The tenant part comes first so byte-ordered stores keep a tenant's keys
/// contiguous, see [`tenant_prefix`](Self::tenant_prefix).
///
/// # Serde Format
///
/// `{"version":1,"tenantId":"<uuid>","triggerType":"ALARM"}`, with `null` for
/// absent parts. Records carrying another version are rejected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "KeyRecord", try_from = "KeyRecord")]
pub struct NotificationRuleCacheKey {
    tenant_id: Option<TenantId>,
    trigger_type: Option<NotificationRuleTriggerType>,
}

impl NotificationRuleCacheKey {
    /// Version of both serialized forms.
    ///
    /// Bump this whenever a field is added, removed or reordered; keys
    /// persisted under another version are refused on decode.
    pub const SCHEMA_VERSION: u8 = 1;

    /// Length of the binary encoding.
    pub const ENCODED_LEN: usize = 21;

    /// Length of the tenant prefix shared by all encoded keys of a tenant.
    pub const TENANT_PREFIX_LEN: usize = 19;

    /// Create a key for a tenant and trigger type.
    pub fn new(tenant_id: TenantId, trigger_type: NotificationRuleTriggerType) -> Self {
        Self {
            tenant_id: Some(tenant_id),
            trigger_type: Some(trigger_type),
        }
    }

    /// Create a key from parts that may be absent. No validation is done.
    pub fn from_parts(
        tenant_id: Option<TenantId>,
        trigger_type: Option<NotificationRuleTriggerType>,
    ) -> Self {
        Self {
            tenant_id,
            trigger_type,
        }
    }

    /// Start building a key part by part.
    pub fn builder() -> NotificationRuleCacheKeyBuilder {
        NotificationRuleCacheKeyBuilder::default()
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn trigger_type(&self) -> Option<NotificationRuleTriggerType> {
        self.trigger_type
    }

    /// Copy of this key with the tenant replaced.
    pub fn with_tenant_id(self, tenant_id: TenantId) -> Self {
        Self {
            tenant_id: Some(tenant_id),
            ..self
        }
    }

    /// Copy of this key with the trigger type replaced.
    pub fn with_trigger_type(self, trigger_type: NotificationRuleTriggerType) -> Self {
        Self {
            trigger_type: Some(trigger_type),
            ..self
        }
    }

    /// Whether both parts are present.
    pub fn is_complete(&self) -> bool {
        self.tenant_id.is_some() && self.trigger_type.is_some()
    }

    /// Whether this key belongs to the given tenant.
    pub fn belongs_to(&self, tenant_id: TenantId) -> bool {
        self.tenant_id == Some(tenant_id)
    }

    /// Encode this key to its fixed-size binary form.
    pub fn encode(&self) -> [u8; Self::ENCODED_LEN] {
        let mut bytes = [0u8; Self::ENCODED_LEN];
        bytes[..Self::TENANT_PREFIX_LEN].copy_from_slice(&Self::tenant_prefix_of(self.tenant_id));

        if let Some(trigger_type) = self.trigger_type {
            bytes[19] = 1;
            bytes[20] = trigger_type.as_byte();
        }

        bytes
    }

    /// Decode a key from its binary form.
    pub fn decode(bytes: &[u8]) -> Result<Self, KeyDecodeError> {
        if bytes.len() != Self::ENCODED_LEN {
            return Err(KeyDecodeError::InvalidLength {
                expected: Self::ENCODED_LEN,
                actual: bytes.len(),
            });
        }

        if bytes[0] != Self::SCHEMA_VERSION {
            return Err(KeyDecodeError::UnsupportedVersion {
                expected: Self::SCHEMA_VERSION,
                found: bytes[0],
            });
        }

        if bytes[18] != SEPARATOR {
            return Err(KeyDecodeError::MissingSeparator { found: bytes[18] });
        }

        let tenant_id = match bytes[1] {
            0 if bytes[2..18].iter().all(|b| *b == 0) => None,
            0 => return Err(KeyDecodeError::NonZeroPadding { part: "tenant_id" }),
            1 => {
                let mut uuid_bytes = [0u8; 16];
                uuid_bytes.copy_from_slice(&bytes[2..18]);
                Some(TenantId::new(Uuid::from_bytes(uuid_bytes)))
            }
            flag => {
                return Err(KeyDecodeError::InvalidPresenceFlag {
                    position: 1,
                    value: flag,
                })
            }
        };

        let trigger_type = match bytes[19] {
            0 if bytes[20] == 0 => None,
            0 => {
                return Err(KeyDecodeError::NonZeroPadding {
                    part: "trigger_type",
                })
            }
            1 => Some(
                NotificationRuleTriggerType::from_byte(bytes[20])
                    .ok_or(KeyDecodeError::UnknownTriggerType { value: bytes[20] })?,
            ),
            flag => {
                return Err(KeyDecodeError::InvalidPresenceFlag {
                    position: 19,
                    value: flag,
                })
            }
        };

        Ok(Self {
            tenant_id,
            trigger_type,
        })
    }

    /// Prefix shared by the encoding of every key of a tenant.
    ///
    /// Byte-keyed stores use it to find all entries of a tenant when its
    /// rules change.
    pub fn tenant_prefix(tenant_id: TenantId) -> [u8; Self::TENANT_PREFIX_LEN] {
        Self::tenant_prefix_of(Some(tenant_id))
    }

    fn tenant_prefix_of(tenant_id: Option<TenantId>) -> [u8; Self::TENANT_PREFIX_LEN] {
        let mut prefix = [0u8; Self::TENANT_PREFIX_LEN];
        prefix[0] = Self::SCHEMA_VERSION;
        if let Some(tenant_id) = tenant_id {
            prefix[1] = 1;
            prefix[2..18].copy_from_slice(tenant_id.as_bytes());
        }
        prefix[18] = SEPARATOR;
        prefix
    }
}

/// Renders as `<tenant_id>_<trigger_type>`, with `null` for an absent part.
impl fmt::Display for NotificationRuleCacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.tenant_id {
            Some(tenant_id) => write!(f, "{}", tenant_id)?,
            None => f.write_str(ABSENT)?,
        }
        f.write_str("_")?;
        match self.trigger_type {
            Some(trigger_type) => f.write_str(trigger_type.as_str()),
            None => f.write_str(ABSENT),
        }
    }
}

/// Builder for [`NotificationRuleCacheKey`].
#[derive(Debug, Clone, Copy, Default)]
pub struct NotificationRuleCacheKeyBuilder {
    tenant_id: Option<TenantId>,
    trigger_type: Option<NotificationRuleTriggerType>,
}

impl NotificationRuleCacheKeyBuilder {
    pub fn tenant_id(mut self, tenant_id: TenantId) -> Self {
        self.tenant_id = Some(tenant_id);
        self
    }

    pub fn trigger_type(mut self, trigger_type: NotificationRuleTriggerType) -> Self {
        self.trigger_type = Some(trigger_type);
        self
    }

    /// Build the key. Parts that were never set stay absent.
    pub fn build(self) -> NotificationRuleCacheKey {
        NotificationRuleCacheKey::from_parts(self.tenant_id, self.trigger_type)
    }
}

/// Error returned when bytes or a record are not a valid encoded key.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyDecodeError {
    #[error("expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("unsupported key schema version {found}, expected {expected}")]
    UnsupportedVersion { expected: u8, found: u8 },

    #[error("expected separator 0xFF at byte 18, found {found:#04x}")]
    MissingSeparator { found: u8 },

    #[error("invalid presence flag {value} at byte {position}")]
    InvalidPresenceFlag { position: usize, value: u8 },

    #[error("absent {part} has non-zero padding")]
    NonZeroPadding { part: &'static str },

    #[error("unknown trigger type discriminant {value}")]
    UnknownTriggerType { value: u8 },
}

impl From<KeyDecodeError> for HeraldError {
    fn from(e: KeyDecodeError) -> Self {
        HeraldError::Cache(CacheError::KeyDecode {
            reason: e.to_string(),
        })
    }
}

/// Versioned serde form of the key.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KeyRecord {
    version: u8,
    #[serde(default)]
    tenant_id: Option<TenantId>,
    #[serde(default)]
    trigger_type: Option<NotificationRuleTriggerType>,
}

impl From<NotificationRuleCacheKey> for KeyRecord {
    fn from(key: NotificationRuleCacheKey) -> Self {
        Self {
            version: NotificationRuleCacheKey::SCHEMA_VERSION,
            tenant_id: key.tenant_id,
            trigger_type: key.trigger_type,
        }
    }
}

impl TryFrom<KeyRecord> for NotificationRuleCacheKey {
    type Error = KeyDecodeError;

    fn try_from(record: KeyRecord) -> Result<Self, Self::Error> {
        if record.version != Self::SCHEMA_VERSION {
            return Err(KeyDecodeError::UnsupportedVersion {
                expected: Self::SCHEMA_VERSION,
                found: record.version,
            });
        }
        Ok(Self::from_parts(record.tenant_id, record.trigger_type))
    }
}
