use std::env;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_API_URL: &str = "http://localhost:8000";
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;
const API_PATH: &str = "/api";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key} must be {expected}, got {value:?}")]
    Invalid {
        key: &'static str,
        expected: &'static str,
        value: String,
    },
    #[error("could not read .env file: {0}")]
    DotEnv(String),
}

/// Where the backend lives and how the client paces itself.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Backend origin, without the `/api` suffix.
    pub api_url: String,
    pub ws_url: String,
    /// Per-call timeout applied by the transport.
    pub timeout: Duration,
    pub poll_interval: Duration,
    /// Served from the same origin as the UI: display references stay relative.
    pub colocated: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::for_origin(DEFAULT_API_URL)
    }
}

impl ClientConfig {
    pub fn for_origin(api_url: impl Into<String>) -> Self {
        let api_url = api_url.into().trim_end_matches('/').to_string();
        Self {
            ws_url: ws_url_for(&api_url),
            api_url,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            colocated: false,
        }
    }

    /// Reads `IG_*` variables, after loading a `.env` file if one exists.
    pub fn load() -> Result<Self, ConfigError> {
        match dotenvy::dotenv() {
            Ok(path) => log::debug!("Loaded environment from {}", path.display()),
            Err(e) if e.not_found() => {}
            Err(e) => return Err(ConfigError::DotEnv(e.to_string())),
        }

        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let api_url = lookup("IG_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let mut config = Self::for_origin(api_url);

        if let Some(ws_url) = lookup("IG_WS_URL") {
            config.ws_url = ws_url.trim_end_matches('/').to_string();
        }
        if let Some(value) = lookup("IG_TIMEOUT_MS") {
            config.timeout = Duration::from_millis(parse_millis("IG_TIMEOUT_MS", value)?);
        }
        if let Some(value) = lookup("IG_POLL_INTERVAL_MS") {
            config.poll_interval = Duration::from_millis(parse_millis("IG_POLL_INTERVAL_MS", value)?);
        }
        if let Some(value) = lookup("IG_COLOCATED") {
            config.colocated = parse_bool("IG_COLOCATED", value)?;
        }

        Ok(config)
    }

    /// Absolute base every HTTP call goes to.
    pub fn api_base(&self) -> String {
        format!("{}{API_PATH}", self.api_url)
    }

    /// Base used for references handed to a display layer.
    pub fn public_base(&self) -> String {
        if self.colocated {
            API_PATH.to_string()
        } else {
            self.api_base()
        }
    }

    pub fn push_url(&self) -> String {
        format!("{}/ws", self.ws_url)
    }
}

fn ws_url_for(api_url: &str) -> String {
    if let Some(rest) = api_url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = api_url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        api_url.to_string()
    }
}

fn parse_millis(key: &'static str, value: String) -> Result<u64, ConfigError> {
    match value.trim().parse::<u64>() {
        Ok(ms) if ms > 0 => Ok(ms),
        _ => Err(ConfigError::Invalid {
            key,
            expected: "a positive number of milliseconds",
            value,
        }),
    }
}

fn parse_bool(key: &'static str, value: String) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::Invalid {
            key,
            expected: "a boolean",
            value,
        }),
    }
}
