//! Gateway policy configuration.
//!
//! Serialized to JSON and carried in server config; governs the public
//! knock surface and knock-log retention.

use serde::{Deserialize, Serialize};

/// Rate-limit settings for the public knock endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KnockLimits {
    /// Max knocks admitted per source IP within the rolling window.
    pub max_per_window: u32,
    /// Rolling window length in seconds.
    pub window_seconds: u64,
}

impl Default for KnockLimits {
    fn default() -> Self {
        Self {
            max_per_window: 5,
            window_seconds: 3600,
        }
    }
}

/// Operational policy for the gateway surface.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GatewayPolicy {
    /// Knock rate-limit settings.
    #[serde(default)]
    pub knock_limits: KnockLimits,
    /// Allowed clock skew for knock timestamps, in seconds.
    #[serde(default = "default_timestamp_skew_seconds")]
    pub timestamp_skew_seconds: i64,
    /// Retention for knock audit records, in days.
    #[serde(default = "default_knock_retention_days")]
    pub knock_retention_days: u32,
    /// Maximum inbox message body length, in characters.
    #[serde(default = "default_max_body_chars")]
    pub max_body_chars: usize,
}

fn default_timestamp_skew_seconds() -> i64 {
    300
}

fn default_knock_retention_days() -> u32 {
    30
}

fn default_max_body_chars() -> usize {
    2000
}

impl Default for GatewayPolicy {
    fn default() -> Self {
        Self {
            knock_limits: KnockLimits::default(),
            timestamp_skew_seconds: default_timestamp_skew_seconds(),
            knock_retention_days: default_knock_retention_days(),
            max_body_chars: default_max_body_chars(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_values() {
        let policy = GatewayPolicy::default();
        assert_eq!(policy.knock_limits.max_per_window, 5);
        assert_eq!(policy.knock_limits.window_seconds, 3600);
        assert_eq!(policy.timestamp_skew_seconds, 300);
        assert_eq!(policy.knock_retention_days, 30);
        assert_eq!(policy.max_body_chars, 2000);
    }

    #[test]
    fn serialization_round_trip() {
        let policy = GatewayPolicy::default();
        let json = serde_json::to_string(&policy).expect("should serialize");
        let decoded: GatewayPolicy = serde_json::from_str(&json).expect("should deserialize");
        assert_eq!(policy, decoded);
    }
}
