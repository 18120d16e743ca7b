//! Engine configuration loaded from the environment.
//!
//! Every setting has a default except the client id tag, which is the
//! per-deployment prefix the exchange sees in front of each order id.

use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_DATABASE_PATH: &str = "engine.db";
const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";
const DEFAULT_COMMAND_QUEUE: &str = "user_ds_cmd";

/// Length of the client id tag, in word characters.
pub const CLIENT_ID_TAG_LEN: usize = 12;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing environment variable: {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

/// Runtime settings shared by the supervisor, workers and CLI.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Twelve word characters placed in front of every client order id.
    pub client_id_tag: String,
    pub database_path: String,
    pub redis_url: String,
    pub command_queue: String,
    pub reconcile_interval: Duration,
    pub keepalive_interval: Duration,
    /// Streaming sessions are recycled after this long.
    pub max_session_lifetime: Duration,
    pub event_channel_capacity: usize,
    /// Balance the fake exchange reports for every asset.
    pub fake_balance: u64,
}

impl EngineConfig {
    /// Defaults for everything but the tag.
    pub fn default_for_tag(client_id_tag: impl Into<String>) -> Self {
        Self {
            client_id_tag: client_id_tag.into(),
            database_path: DEFAULT_DATABASE_PATH.to_string(),
            redis_url: DEFAULT_REDIS_URL.to_string(),
            command_queue: DEFAULT_COMMAND_QUEUE.to_string(),
            reconcile_interval: Duration::from_secs(10 * 60),
            keepalive_interval: Duration::from_secs(30 * 60),
            max_session_lifetime: Duration::from_secs(23 * 60 * 60),
            event_channel_capacity: 1024,
            fake_balance: 1_000_000,
        }
    }

    /// Load from process environment, reading `.env` first if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let tag = lookup("ENGINE_CLIENT_ID_TAG").ok_or(ConfigError::Missing("ENGINE_CLIENT_ID_TAG"))?;
        if !is_client_id_tag(&tag) {
            return Err(ConfigError::Invalid {
                key: "ENGINE_CLIENT_ID_TAG",
                value: tag,
            });
        }

        let mut config = Self::default_for_tag(tag);

        if let Some(path) = lookup("ENGINE_DATABASE_PATH") {
            config.database_path = path;
        }
        if let Some(url) = lookup("ENGINE_REDIS_URL") {
            config.redis_url = url;
        }
        if let Some(queue) = lookup("ENGINE_COMMAND_QUEUE") {
            config.command_queue = queue;
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "ENGINE_RECONCILE_INTERVAL_SECS")? {
            config.reconcile_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "ENGINE_KEEPALIVE_INTERVAL_SECS")? {
            config.keepalive_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "ENGINE_MAX_SESSION_SECS")? {
            config.max_session_lifetime = Duration::from_secs(secs);
        }
        if let Some(capacity) = parse_var(&lookup, "ENGINE_EVENT_CHANNEL_CAPACITY")? {
            config.event_channel_capacity = capacity;
        }
        if let Some(balance) = parse_var(&lookup, "ENGINE_FAKE_BALANCE")? {
            config.fake_balance = balance;
        }

        Ok(config)
    }
}

/// True when `tag` is exactly twelve ASCII word characters (`[A-Za-z0-9_]`).
pub fn is_client_id_tag(tag: &str) -> bool {
    tag.len() == CLIENT_ID_TAG_LEN && tag.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn parse_var<T, F>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => match raw.trim().parse::<T>() {
            Ok(value) => Ok(Some(value)),
            Err(_) => Err(ConfigError::Invalid { key, value: raw }),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_apply() {
        let config = EngineConfig::from_lookup(lookup_from(&[("ENGINE_CLIENT_ID_TAG", "tbotprod0001")]))
            .unwrap();
        assert_eq!(config.client_id_tag, "tbotprod0001");
        assert_eq!(config.command_queue, "user_ds_cmd");
        assert_eq!(config.max_session_lifetime, Duration::from_secs(82_800));
        assert_eq!(config.keepalive_interval, Duration::from_secs(1_800));
    }

    #[test]
    fn test_overrides_are_parsed() {
        let config = EngineConfig::from_lookup(lookup_from(&[
            ("ENGINE_CLIENT_ID_TAG", "ABCDEFGHIJKL"),
            ("ENGINE_RECONCILE_INTERVAL_SECS", "30"),
            ("ENGINE_COMMAND_QUEUE", "cmds"),
        ]))
        .unwrap();
        assert_eq!(config.reconcile_interval, Duration::from_secs(30));
        assert_eq!(config.command_queue, "cmds");
    }

    #[test]
    fn test_missing_tag_is_rejected() {
        let err = EngineConfig::from_lookup(lookup_from(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("ENGINE_CLIENT_ID_TAG")));
    }

    #[test]
    fn test_bad_tag_is_rejected() {
        for tag in ["short", "thirteen_char", "has-dash-000"] {
            let err =
                EngineConfig::from_lookup(lookup_from(&[("ENGINE_CLIENT_ID_TAG", tag)])).unwrap_err();
            assert!(matches!(err, ConfigError::Invalid { .. }), "tag {tag}");
        }
    }

    #[test]
    fn test_bad_number_is_rejected() {
        let err = EngineConfig::from_lookup(lookup_from(&[
            ("ENGINE_CLIENT_ID_TAG", "tbotprod0001"),
            ("ENGINE_MAX_SESSION_SECS", "soon"),
        ]))
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                key: "ENGINE_MAX_SESSION_SECS",
                ..
            }
        ));
    }
}
