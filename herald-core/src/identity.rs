//! Identity types for Herald entities

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Identifier of a tenant, the isolation scope for notification rules.
///
/// Wraps a UUID so tenant ids cannot be mixed up with other identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(Uuid);

impl TenantId {
    /// Wrap an existing UUID.
    pub const fn new(id: Uuid) -> Self {
        Self(id)
    }

    /// Generate a new timestamp-sortable tenant id.
    pub fn now_v7() -> Self {
        Self(Uuid::now_v7())
    }

    /// The all-zero tenant id.
    pub const fn nil() -> Self {
        Self(Uuid::nil())
    }

    /// Get the underlying UUID.
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl From<Uuid> for TenantId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl From<TenantId> for Uuid {
    fn from(id: TenantId) -> Self {
        id.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TenantId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}
