//! Environment-backed runtime configuration for `larkchat-headless`.

use std::{env, error::Error, fmt};

const DEFAULT_WS_URL: &str = "ws://127.0.0.1:8080/ws";
const DEFAULT_API_URL: &str = "http://127.0.0.1:8080/";
const DEFAULT_ROOM: &str = "general";
const DEFAULT_HISTORY_LIMIT: u16 = 50;

/// Runtime configuration used by the headless client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadlessConfig {
    /// WebSocket base address.
    pub ws_url: String,
    /// REST API base address.
    pub api_url: String,
    /// Bearer token, when the server requires auth.
    pub token: Option<String>,
    /// Display key of the room to join on startup.
    pub room: String,
    /// Canonical wire key for the startup room; defaults to the display key.
    pub room_id: Option<String>,
    /// History page size fetched on room activation.
    pub history_limit: u16,
}

impl HeadlessConfig {
    /// Parse configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(mut lookup: F) -> Result<Self, ConfigError>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let ws_url = optional_trimmed_env("LARKCHAT_WS_URL", &mut lookup)
            .unwrap_or_else(|| DEFAULT_WS_URL.to_owned());
        let api_url = optional_trimmed_env("LARKCHAT_API_URL", &mut lookup)
            .unwrap_or_else(|| DEFAULT_API_URL.to_owned());
        let token = optional_trimmed_env("LARKCHAT_TOKEN", &mut lookup);
        let room = optional_trimmed_env("LARKCHAT_ROOM", &mut lookup)
            .unwrap_or_else(|| DEFAULT_ROOM.to_owned());
        let room_id = optional_trimmed_env("LARKCHAT_ROOM_ID", &mut lookup);
        let history_limit = parse_optional_u16_with_default(
            "LARKCHAT_HISTORY_LIMIT",
            DEFAULT_HISTORY_LIMIT,
            &mut lookup,
        )?;

        if history_limit == 0 {
            return Err(ConfigError::InvalidValue {
                key: "LARKCHAT_HISTORY_LIMIT",
                value: "0".to_owned(),
                reason: "must be at least 1".to_owned(),
            });
        }

        Ok(Self {
            ws_url,
            api_url,
            token,
            room,
            room_id,
            history_limit,
        })
    }

    /// Canonical wire key for the startup room.
    pub fn canonical_room(&self) -> &str {
        self.room_id.as_deref().unwrap_or(&self.room)
    }
}

/// Errors produced while parsing runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// An environment variable could not be parsed.
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidValue { key, value, reason } => {
                write!(f, "invalid {key}='{value}': {reason}")
            }
        }
    }
}

impl Error for ConfigError {}

fn optional_trimmed_env<F>(key: &'static str, lookup: &mut F) -> Option<String>
where
    F: FnMut(&str) -> Option<String>,
{
    lookup(key)
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn parse_optional_u16_with_default<F>(
    key: &'static str,
    default: u16,
    lookup: &mut F,
) -> Result<u16, ConfigError>
where
    F: FnMut(&str) -> Option<String>,
{
    let Some(value) = lookup(key) else {
        return Ok(default);
    };
    value
        .parse::<u16>()
        .map_err(|err| ConfigError::InvalidValue {
            key,
            value,
            reason: err.to_string(),
        })
}
