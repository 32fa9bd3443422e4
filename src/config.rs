//! Client configuration parsed from environment variables.

pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_CHANNEL_BUFFER: usize = 256;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required env var {0}")]
    Missing(&'static str),
    #[error("invalid value for {var}: {value}")]
    Invalid { var: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Base URL of the hosted backend, without trailing slash.
    pub backend_url: String,
    /// Public API key sent with every backend request.
    pub anon_key: String,
    pub timeouts: Timeouts,
    /// Capacity of each realtime channel's delivery queue.
    pub channel_buffer: usize,
}

impl SyncConfig {
    /// Build typed config from environment variables.
    ///
    /// Required:
    /// - `ORGSYNC_BACKEND_URL`
    /// - `ORGSYNC_ANON_KEY`
    ///
    /// Optional:
    /// - `ORGSYNC_REQUEST_TIMEOUT_SECS`: default 30
    /// - `ORGSYNC_CONNECT_TIMEOUT_SECS`: default 10
    /// - `ORGSYNC_CHANNEL_BUFFER`: default 256
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] when a required variable is unset and
    /// [`ConfigError::Invalid`] when the backend URL is not http(s).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build typed config from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Same as [`SyncConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let backend_url = lookup("ORGSYNC_BACKEND_URL").ok_or(ConfigError::Missing("ORGSYNC_BACKEND_URL"))?;
        if !(backend_url.starts_with("http://") || backend_url.starts_with("https://")) {
            return Err(ConfigError::Invalid { var: "ORGSYNC_BACKEND_URL", value: backend_url });
        }
        let anon_key = lookup("ORGSYNC_ANON_KEY").ok_or(ConfigError::Missing("ORGSYNC_ANON_KEY"))?;

        let timeouts = Timeouts {
            request_secs: parse_or(&lookup, "ORGSYNC_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS),
            connect_secs: parse_or(&lookup, "ORGSYNC_CONNECT_TIMEOUT_SECS", DEFAULT_CONNECT_TIMEOUT_SECS),
        };
        let channel_buffer = parse_or(&lookup, "ORGSYNC_CHANNEL_BUFFER", DEFAULT_CHANNEL_BUFFER).max(1);

        Ok(Self { backend_url: backend_url.trim_end_matches('/').to_string(), anon_key, timeouts, channel_buffer })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    lookup(key)
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
