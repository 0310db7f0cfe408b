// File: supportchat-core/src/config.rs

use std::str::FromStr;
use std::time::Duration;
use serde::Deserialize;
use tracing::debug;

use supportchat_common::Error;

/// Tunables for the engine. Everything here is policy, not protocol: the
/// defaults are conservative and the server exposes overrides.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Attempts per customer message before the assistant is declared unavailable.
    pub bot_max_attempts: u32,
    /// Per-attempt deadline for `BotResponder::generate_reply`.
    pub bot_timeout_ms: u64,
    /// Base delay between attempts; attempt `n` waits `n * backoff`.
    pub bot_retry_backoff_ms: u64,
    /// Sender id stamped on assistant replies.
    pub bot_sender_id: String,
    /// Sender id stamped on system notices.
    pub system_sender_id: String,
    /// Text of the system notice appended when every attempt failed.
    pub bot_unavailable_notice: String,

    /// Idle time after which a session waiting for an agent is closed.
    /// `None` disables auto-close.
    pub pending_timeout_secs: Option<u64>,
    pub reaper_interval_secs: u64,

    /// Capacity of the channel each observer reads from.
    pub subscriber_buffer: usize,
    /// Length of `last_message_preview`, in characters.
    pub preview_chars: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            bot_max_attempts: 2,
            bot_timeout_ms: 20_000,
            bot_retry_backoff_ms: 500,
            bot_sender_id: "assistant".to_string(),
            system_sender_id: "system".to_string(),
            bot_unavailable_notice:
                "Our assistant is unavailable right now. You can ask to talk to a person.".to_string(),
            pending_timeout_secs: None,
            reaper_interval_secs: 60,
            subscriber_buffer: crate::eventbus::DEFAULT_BUFFER_SIZE,
            preview_chars: 120,
        }
    }
}

impl EngineConfig {
    pub fn bot_timeout(&self) -> Duration {
        Duration::from_millis(self.bot_timeout_ms)
    }

    pub fn bot_retry_backoff(&self) -> Duration {
        Duration::from_millis(self.bot_retry_backoff_ms)
    }

    pub fn pending_timeout(&self) -> Option<Duration> {
        self.pending_timeout_secs.map(Duration::from_secs)
    }

    pub fn reaper_interval(&self) -> Duration {
        Duration::from_secs(self.reaper_interval_secs.max(1))
    }

    /// Loads `.env` (if any) and reads `SUPPORTCHAT_*` overrides from the environment.
    pub fn from_env() -> Result<Self, Error> {
        if let Ok(path) = dotenv::dotenv() {
            debug!("Loaded environment from {}", path.display());
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as `from_env`, reading variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        if let Some(v) = parse_var(&lookup, "SUPPORTCHAT_BOT_MAX_ATTEMPTS")? {
            cfg.bot_max_attempts = v;
        }
        if let Some(v) = parse_var(&lookup, "SUPPORTCHAT_BOT_TIMEOUT_MS")? {
            cfg.bot_timeout_ms = v;
        }
        if let Some(v) = parse_var(&lookup, "SUPPORTCHAT_BOT_RETRY_BACKOFF_MS")? {
            cfg.bot_retry_backoff_ms = v;
        }
        if let Some(v) = lookup("SUPPORTCHAT_BOT_SENDER_ID") {
            cfg.bot_sender_id = v;
        }
        if let Some(v) = lookup("SUPPORTCHAT_BOT_UNAVAILABLE_NOTICE") {
            cfg.bot_unavailable_notice = v;
        }
        if let Some(v) = parse_var::<u64, _>(&lookup, "SUPPORTCHAT_PENDING_TIMEOUT_SECS")? {
            // 0 means "never auto-close"
            cfg.pending_timeout_secs = if v == 0 { None } else { Some(v) };
        }
        if let Some(v) = parse_var(&lookup, "SUPPORTCHAT_REAPER_INTERVAL_SECS")? {
            cfg.reaper_interval_secs = v;
        }
        if let Some(v) = parse_var(&lookup, "SUPPORTCHAT_SUBSCRIBER_BUFFER")? {
            cfg.subscriber_buffer = v;
        }
        if let Some(v) = parse_var(&lookup, "SUPPORTCHAT_PREVIEW_CHARS")? {
            cfg.preview_chars = v;
        }
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.bot_max_attempts == 0 {
            return Err(Error::Config("bot_max_attempts must be at least 1".into()));
        }
        if self.subscriber_buffer == 0 {
            return Err(Error::Config("subscriber_buffer must be at least 1".into()));
        }
        Ok(())
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>, Error>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| Error::Config(format!("{}={:?}: {}", key, raw, e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_overrides() {
        let cfg = EngineConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(cfg, EngineConfig::default());
        assert!(cfg.pending_timeout().is_none());
    }

    #[test]
    fn test_overrides_are_applied() {
        let cfg = EngineConfig::from_lookup(lookup_from(&[
            ("SUPPORTCHAT_BOT_MAX_ATTEMPTS", "4"),
            ("SUPPORTCHAT_PENDING_TIMEOUT_SECS", "900"),
            ("SUPPORTCHAT_PREVIEW_CHARS", " 40 "),
        ]))
        .unwrap();
        assert_eq!(cfg.bot_max_attempts, 4);
        assert_eq!(cfg.pending_timeout(), Some(Duration::from_secs(900)));
        assert_eq!(cfg.preview_chars, 40);
    }

    #[test]
    fn test_malformed_value_is_config_error() {
        let err = EngineConfig::from_lookup(lookup_from(&[("SUPPORTCHAT_BOT_TIMEOUT_MS", "soon")]))
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let err = EngineConfig::from_lookup(lookup_from(&[("SUPPORTCHAT_BOT_MAX_ATTEMPTS", "0")]))
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
