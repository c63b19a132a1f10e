use std::env;
use std::str::FromStr;
use std::time::Duration;

use gxp_core::model::DEFAULT_INVITATION_TTL_DAYS;
use serde::{Deserialize, Serialize};

/// Tuning for questionnaire sessions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// How many times a save waits for confirmation before giving up.
    pub save_poll_attempts: u32,
    /// Delay between confirmation checks.
    pub save_poll_interval: Duration,
    /// Re-save in the background on every answer and move once a snapshot id is known.
    pub autosave: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            save_poll_attempts: 50,
            save_poll_interval: Duration::from_millis(100),
            autosave: true,
        }
    }
}

impl SessionConfig {
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup. Missing or unparsable
    /// values keep their defaults.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            save_poll_attempts: parse(&lookup, "GXP_SAVE_POLL_ATTEMPTS")
                .unwrap_or(defaults.save_poll_attempts),
            save_poll_interval: parse(&lookup, "GXP_SAVE_POLL_INTERVAL_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.save_poll_interval),
            autosave: lookup("GXP_AUTOSAVE")
                .and_then(|raw| parse_flag(&raw))
                .unwrap_or(defaults.autosave),
        }
    }

    /// Upper bound on how long a save waits for confirmation.
    #[must_use]
    pub fn save_budget(&self) -> Duration {
        self.save_poll_interval
            .saturating_mul(self.save_poll_attempts)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InvitationConfig {
    pub ttl: Duration,
    /// Prefix of invitation deep links; the token is appended as a query.
    pub link_scheme: String,
}

impl Default for InvitationConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(u64::try_from(DEFAULT_INVITATION_TTL_DAYS).unwrap_or(7) * 86_400),
            link_scheme: "validator://invite".into(),
        }
    }
}

impl InvitationConfig {
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            ttl: parse::<u64>(&lookup, "GXP_INVITATION_TTL_HOURS")
                .filter(|hours| *hours > 0)
                .map(|hours| Duration::from_secs(hours * 3_600))
                .unwrap_or(defaults.ttl),
            link_scheme: lookup("GXP_INVITATION_LINK_SCHEME")
                .map(|raw| raw.trim().to_owned())
                .filter(|raw| !raw.is_empty())
                .unwrap_or(defaults.link_scheme),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppConfig {
    pub db_url: String,
    pub session: SessionConfig,
    pub invitations: InvitationConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_url: "sqlite://gxp.sqlite3".into(),
            session: SessionConfig::default(),
            invitations: InvitationConfig::default(),
        }
    }
}

impl AppConfig {
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let db_url = lookup("GXP_DB_URL")
            .filter(|url| !url.trim().is_empty())
            .unwrap_or_else(|| Self::default().db_url);
        Self {
            db_url,
            session: SessionConfig::from_lookup(&lookup),
            invitations: InvitationConfig::from_lookup(&lookup),
        }
    }
}

fn parse<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|raw| raw.trim().parse().ok())
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_the_save_budget() {
        let config = SessionConfig::from_lookup(lookup(&[]));
        assert_eq!(config, SessionConfig::default());
        assert_eq!(config.save_budget(), Duration::from_secs(5));
        assert!(config.autosave);
    }

    #[test]
    fn overrides_are_parsed() {
        let config = AppConfig::from_lookup(lookup(&[
            ("GXP_DB_URL", "sqlite::memory:"),
            ("GXP_SAVE_POLL_ATTEMPTS", "3"),
            ("GXP_SAVE_POLL_INTERVAL_MS", "20"),
            ("GXP_AUTOSAVE", "off"),
            ("GXP_INVITATION_TTL_HOURS", "48"),
        ]));
        assert_eq!(config.db_url, "sqlite::memory:");
        assert_eq!(config.session.save_poll_attempts, 3);
        assert_eq!(config.session.save_poll_interval, Duration::from_millis(20));
        assert!(!config.session.autosave);
        assert_eq!(config.invitations.ttl, Duration::from_secs(48 * 3_600));
        assert_eq!(config.invitations.link_scheme, "validator://invite");
    }

    #[test]
    fn garbage_falls_back_to_defaults() {
        let config = AppConfig::from_lookup(lookup(&[
            ("GXP_DB_URL", "  "),
            ("GXP_SAVE_POLL_ATTEMPTS", "many"),
            ("GXP_AUTOSAVE", "maybe"),
            ("GXP_INVITATION_TTL_HOURS", "0"),
        ]));
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.invitations.ttl, Duration::from_secs(7 * 86_400));
    }
}
