use std::path::PathBuf;

use {
    anonka_common::UserId,
    serde::{Deserialize, Serialize},
};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnonkaConfig {
    pub relay: RelayConfig,
    pub delivery: DeliveryConfig,
    pub database: DatabaseConfig,
    pub channels: ChannelsConfig,
}

impl AnonkaConfig {
    /// Every identity that must hold `Operator`, primary first, deduplicated.
    pub fn operator_ids(&self) -> Vec<UserId> {
        let mut ids: Vec<UserId> = self.relay.operator.into_iter().collect();
        for id in &self.relay.operators {
            if !ids.contains(id) {
                ids.push(*id);
            }
        }
        ids
    }
}

/// When the per-user message counter is bumped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CountPolicy {
    /// Every successfully relayed content item.
    #[default]
    OnRelay,
    /// Every `/start`.
    OnStart,
    Both,
}

impl CountPolicy {
    pub fn counts_relay(self) -> bool {
        matches!(self, Self::OnRelay | Self::Both)
    }

    pub fn counts_start(self) -> bool {
        matches!(self, Self::OnStart | Self::Both)
    }
}

/// Relay behaviour and the bootstrap role seed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Primary operator: receives every relayed item.
    pub operator: Option<UserId>,
    /// Additional identities seeded as operators.
    pub operators: Vec<UserId>,
    /// Identities seeded as trusted.
    pub trusted: Vec<UserId>,
    /// Sent in reply to `/start`.
    pub greeting: String,
    /// Confirmation sent to the sender after a successful relay.
    pub default_answer: String,
    pub count_policy: CountPolicy,
    /// Upper bound on inbound events handled at once.
    pub max_concurrent_events: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            operator: None,
            operators: Vec::new(),
            trusted: Vec::new(),
            greeting: "Hi! Here you can send an anonymous message to the admin. \
                       Press the button below to start."
                .into(),
            default_answer: "Your message was delivered anonymously. Thank you!".into(),
            count_policy: CountPolicy::default(),
            max_concurrent_events: 16,
        }
    }
}

/// Retry policy for outbound sends.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    /// Attempts in total, including the first one.
    pub max_attempts: u32,
    /// Delay before the first retry, doubled for every further retry.
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Randomize each delay by up to ±25%.
    pub jitter: bool,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 500,
            max_delay_ms: 30_000,
            jitter: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite file. Defaults to `<data dir>/anonka.db`.
    pub path: Option<PathBuf>,
}

/// Transport configuration, kept opaque here and parsed by the channel crate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelsConfig {
    pub telegram: Option<serde_json::Value>,
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = AnonkaConfig::default();
        assert_eq!(cfg.relay.count_policy, CountPolicy::OnRelay);
        assert_eq!(cfg.relay.max_concurrent_events, 16);
        assert_eq!(cfg.delivery.max_attempts, 5);
        assert_eq!(cfg.delivery.base_delay_ms, 500);
        assert!(cfg.operator_ids().is_empty());
    }

    #[test]
    fn deserialize_partial_toml() {
        let raw = r#"
            [relay]
            operator = 42
            operators = [42, 43]
            trusted = [7]
            count_policy = "both"

            [delivery]
            max_attempts = 3

            [channels.telegram]
            token = "123:ABC"
        "#;
        let cfg: AnonkaConfig = toml::from_str(raw).unwrap();
        assert_eq!(cfg.relay.operator, Some(UserId(42)));
        assert_eq!(cfg.operator_ids(), vec![UserId(42), UserId(43)]);
        assert_eq!(cfg.relay.trusted, vec![UserId(7)]);
        assert_eq!(cfg.relay.count_policy, CountPolicy::Both);
        assert_eq!(cfg.delivery.max_attempts, 3);
        // Unspecified fields keep their defaults.
        assert_eq!(cfg.delivery.max_delay_ms, 30_000);
        assert!(!cfg.relay.greeting.is_empty());
        let tg = cfg.channels.telegram.unwrap();
        assert_eq!(tg["token"], "123:ABC");
    }

    #[test]
    fn count_policy_flags() {
        assert!(CountPolicy::OnRelay.counts_relay());
        assert!(!CountPolicy::OnRelay.counts_start());
        assert!(!CountPolicy::OnStart.counts_relay());
        assert!(CountPolicy::Both.counts_relay() && CountPolicy::Both.counts_start());
    }
}
