//! Enum types for Herald entities

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Category of event that can cause a notification rule to fire.
///
/// The set is closed. Serialized and displayed as SCREAMING_SNAKE_CASE names
/// (`ALARM`, `DEVICE_ACTIVITY`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationRuleTriggerType {
    EntityAction,
    Alarm,
    AlarmComment,
    AlarmAssignment,
    DeviceActivity,
    RuleEngineComponentLifecycleEvent,
    EdgeConnection,
    EdgeCommunicationFailure,
    NewPlatformVersion,
    EntitiesLimit,
    ApiUsageLimit,
    RateLimits,
    TaskProcessingFailure,
    ResourcesShortage,
}

impl NotificationRuleTriggerType {
    /// Every trigger type, in discriminant order.
    pub const ALL: [NotificationRuleTriggerType; 14] = [
        NotificationRuleTriggerType::EntityAction,
        NotificationRuleTriggerType::Alarm,
        NotificationRuleTriggerType::AlarmComment,
        NotificationRuleTriggerType::AlarmAssignment,
        NotificationRuleTriggerType::DeviceActivity,
        NotificationRuleTriggerType::RuleEngineComponentLifecycleEvent,
        NotificationRuleTriggerType::EdgeConnection,
        NotificationRuleTriggerType::EdgeCommunicationFailure,
        NotificationRuleTriggerType::NewPlatformVersion,
        NotificationRuleTriggerType::EntitiesLimit,
        NotificationRuleTriggerType::ApiUsageLimit,
        NotificationRuleTriggerType::RateLimits,
        NotificationRuleTriggerType::TaskProcessingFailure,
        NotificationRuleTriggerType::ResourcesShortage,
    ];

    /// Canonical name, as rendered in cache keys and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationRuleTriggerType::EntityAction => "ENTITY_ACTION",
            NotificationRuleTriggerType::Alarm => "ALARM",
            NotificationRuleTriggerType::AlarmComment => "ALARM_COMMENT",
            NotificationRuleTriggerType::AlarmAssignment => "ALARM_ASSIGNMENT",
            NotificationRuleTriggerType::DeviceActivity => "DEVICE_ACTIVITY",
            NotificationRuleTriggerType::RuleEngineComponentLifecycleEvent => {
                "RULE_ENGINE_COMPONENT_LIFECYCLE_EVENT"
            }
            NotificationRuleTriggerType::EdgeConnection => "EDGE_CONNECTION",
            NotificationRuleTriggerType::EdgeCommunicationFailure => "EDGE_COMMUNICATION_FAILURE",
            NotificationRuleTriggerType::NewPlatformVersion => "NEW_PLATFORM_VERSION",
            NotificationRuleTriggerType::EntitiesLimit => "ENTITIES_LIMIT",
            NotificationRuleTriggerType::ApiUsageLimit => "API_USAGE_LIMIT",
            NotificationRuleTriggerType::RateLimits => "RATE_LIMITS",
            NotificationRuleTriggerType::TaskProcessingFailure => "TASK_PROCESSING_FAILURE",
            NotificationRuleTriggerType::ResourcesShortage => "RESOURCES_SHORTAGE",
        }
    }

    /// Stable single-byte discriminant used in binary key encodings.
    ///
    /// Values are part of the persisted key format and must never be reused.
    pub fn as_byte(&self) -> u8 {
        match self {
            NotificationRuleTriggerType::EntityAction => 0,
            NotificationRuleTriggerType::Alarm => 1,
            NotificationRuleTriggerType::AlarmComment => 2,
            NotificationRuleTriggerType::AlarmAssignment => 3,
            NotificationRuleTriggerType::DeviceActivity => 4,
            NotificationRuleTriggerType::RuleEngineComponentLifecycleEvent => 5,
            NotificationRuleTriggerType::EdgeConnection => 6,
            NotificationRuleTriggerType::EdgeCommunicationFailure => 7,
            NotificationRuleTriggerType::NewPlatformVersion => 8,
            NotificationRuleTriggerType::EntitiesLimit => 9,
            NotificationRuleTriggerType::ApiUsageLimit => 10,
            NotificationRuleTriggerType::RateLimits => 11,
            NotificationRuleTriggerType::TaskProcessingFailure => 12,
            NotificationRuleTriggerType::ResourcesShortage => 13,
        }
    }

    /// Inverse of [`as_byte`](Self::as_byte).
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(NotificationRuleTriggerType::EntityAction),
            1 => Some(NotificationRuleTriggerType::Alarm),
            2 => Some(NotificationRuleTriggerType::AlarmComment),
            3 => Some(NotificationRuleTriggerType::AlarmAssignment),
            4 => Some(NotificationRuleTriggerType::DeviceActivity),
            5 => Some(NotificationRuleTriggerType::RuleEngineComponentLifecycleEvent),
            6 => Some(NotificationRuleTriggerType::EdgeConnection),
            7 => Some(NotificationRuleTriggerType::EdgeCommunicationFailure),
            8 => Some(NotificationRuleTriggerType::NewPlatformVersion),
            9 => Some(NotificationRuleTriggerType::EntitiesLimit),
            10 => Some(NotificationRuleTriggerType::ApiUsageLimit),
            11 => Some(NotificationRuleTriggerType::RateLimits),
            12 => Some(NotificationRuleTriggerType::TaskProcessingFailure),
            13 => Some(NotificationRuleTriggerType::ResourcesShortage),
            _ => None,
        }
    }
}

impl fmt::Display for NotificationRuleTriggerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationRuleTriggerType {
    type Err = TriggerTypeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace('-', "_");
        Self::ALL
            .iter()
            .copied()
            .find(|trigger_type| trigger_type.as_str() == normalized)
            .ok_or_else(|| TriggerTypeParseError(s.to_string()))
    }
}

/// Error when parsing an invalid trigger type string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerTypeParseError(pub String);

impl fmt::Display for TriggerTypeParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid notification rule trigger type: {}", self.0)
    }
}

impl std::error::Error for TriggerTypeParseError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_matches_serde_name() {
        for trigger_type in NotificationRuleTriggerType::ALL {
            let json = serde_json::to_string(&trigger_type).expect("serialize");
            assert_eq!(json, format!("\"{}\"", trigger_type));
        }
    }

    #[test]
    fn test_display_examples() {
        assert_eq!(NotificationRuleTriggerType::Alarm.to_string(), "ALARM");
        assert_eq!(
            NotificationRuleTriggerType::DeviceActivity.to_string(),
            "DEVICE_ACTIVITY"
        );
    }

    #[test]
    fn test_from_str_accepts_case_variants() {
        assert_eq!(
            "device_activity".parse::<NotificationRuleTriggerType>(),
            Ok(NotificationRuleTriggerType::DeviceActivity)
        );
        assert_eq!(
            " Api-Usage-Limit ".parse::<NotificationRuleTriggerType>(),
            Ok(NotificationRuleTriggerType::ApiUsageLimit)
        );
    }

    #[test]
    fn test_from_str_rejects_unknown() {
        let err = "DEVICE_OFFLINE"
            .parse::<NotificationRuleTriggerType>()
            .unwrap_err();
        assert_eq!(err, TriggerTypeParseError("DEVICE_OFFLINE".to_string()));
        assert!(err.to_string().contains("DEVICE_OFFLINE"));
    }

    #[test]
    fn test_byte_discriminants_roundtrip_and_are_dense() {
        for (index, trigger_type) in NotificationRuleTriggerType::ALL.iter().enumerate() {
            assert_eq!(trigger_type.as_byte() as usize, index);
            assert_eq!(
                NotificationRuleTriggerType::from_byte(trigger_type.as_byte()),
                Some(*trigger_type)
            );
        }
        assert_eq!(NotificationRuleTriggerType::from_byte(14), None);
        assert_eq!(NotificationRuleTriggerType::from_byte(255), None);
    }
}
