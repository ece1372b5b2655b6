use std::time::Duration;

use serde::Deserialize;

pub const DEFAULT_TTL_SECONDS: u64 = 86_400;
pub const DEFAULT_NUMBER_OF_SETS: u32 = 10;

/// Cluster configuration.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Prepended to every storage key and to the default channel name.
    pub prefix: String,
    /// Sliding membership expiry in seconds. Zero disables native expiry.
    pub ttl_seconds: u64,
    /// How many time buckets a logical key is sharded across.
    pub number_of_sets: u32,
    /// Shared pub/sub channel. Defaults to `"<prefix>pubsub"`.
    pub channel: Option<String>,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            ttl_seconds: DEFAULT_TTL_SECONDS,
            number_of_sets: DEFAULT_NUMBER_OF_SETS,
            channel: None,
        }
    }
}

impl ClusterConfig {
    pub fn channel_name(&self) -> String {
        self.channel
            .clone()
            .unwrap_or_else(|| format!("{}pubsub", self.prefix))
    }

    /// Expiry applied to membership keys, when enabled.
    pub fn ttl(&self) -> Option<Duration> {
        (self.ttl_seconds > 0).then(|| Duration::from_secs(self.ttl_seconds))
    }

    /// TTL used for bucket width. Falls back to the default when expiry is
    /// disabled so bucket arithmetic stays defined.
    pub fn bucket_ttl(&self) -> Duration {
        if self.ttl_seconds > 0 {
            Duration::from_secs(self.ttl_seconds)
        } else {
            Duration::from_secs(DEFAULT_TTL_SECONDS)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ClusterConfig::default();
        assert_eq!(config.prefix, "");
        assert_eq!(config.ttl_seconds, 86_400);
        assert_eq!(config.number_of_sets, 10);
        assert_eq!(config.channel_name(), "pubsub");
        assert_eq!(config.ttl(), Some(Duration::from_secs(86_400)));
    }

    #[test]
    fn channel_name_carries_prefix() {
        let config = ClusterConfig {
            prefix: "app:".into(),
            ..Default::default()
        };
        assert_eq!(config.channel_name(), "app:pubsub");

        let explicit = ClusterConfig {
            prefix: "app:".into(),
            channel: Some("events".into()),
            ..Default::default()
        };
        assert_eq!(explicit.channel_name(), "events");
    }

    #[test]
    fn zero_ttl_disables_expiry_but_keeps_bucket_width() {
        let config = ClusterConfig {
            ttl_seconds: 0,
            ..Default::default()
        };
        assert_eq!(config.ttl(), None);
        assert_eq!(config.bucket_ttl(), Duration::from_secs(DEFAULT_TTL_SECONDS));
    }

    #[test]
    fn deserializes_with_partial_fields() {
        let config: ClusterConfig =
            serde_json::from_str(r#"{"prefix":"fleet:","ttl_seconds":100}"#).unwrap();
        assert_eq!(config.prefix, "fleet:");
        assert_eq!(config.ttl_seconds, 100);
        assert_eq!(config.number_of_sets, 10);
    }
}
