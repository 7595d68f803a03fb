//! Herald Test Utilities
//!
//! Shared test infrastructure for the Herald workspace:
//! - Proptest generators for tenant ids and trigger types
//! - Fixed fixtures for examples that need stable values

pub use herald_core::{NotificationRuleTriggerType, TenantId};

use proptest::prelude::*;
use uuid::Uuid;

// ============================================================================
// GENERATORS
// ============================================================================

/// Strategy producing arbitrary tenant ids, including the nil id.
pub fn tenant_id_strategy() -> impl Strategy<Value = TenantId> {
    any::<[u8; 16]>().prop_map(|bytes| TenantId::new(Uuid::from_bytes(bytes)))
}

/// Strategy producing any trigger type.
pub fn trigger_type_strategy() -> impl Strategy<Value = NotificationRuleTriggerType> {
    proptest::sample::select(NotificationRuleTriggerType::ALL.to_vec())
}

/// Strategy producing a tenant id or nothing.
pub fn optional_tenant_id_strategy() -> impl Strategy<Value = Option<TenantId>> {
    proptest::option::of(tenant_id_strategy())
}

/// Strategy producing a trigger type or nothing.
pub fn optional_trigger_type_strategy(
) -> impl Strategy<Value = Option<NotificationRuleTriggerType>> {
    proptest::option::of(trigger_type_strategy())
}

// ============================================================================
// FIXTURES
// ============================================================================

/// A tenant id with a fixed, recognizable rendering.
pub fn fixed_tenant_id() -> TenantId {
    TenantId::new(Uuid::from_u128(0x3f2d_0000_0000_4000_8000_0000_0000_0001))
}

/// The canonical rendering of [`fixed_tenant_id`].
pub const FIXED_TENANT_ID_STR: &str = "3f2d0000-0000-4000-8000-000000000001";
