//! Console configuration parsed from environment variables.

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;

use std::time::Duration;

pub const DEFAULT_API_URL: &str = "http://localhost:8000";
pub const DEFAULT_API_KEY_HEADER: &str = "X-API-Key";
/// Tokens are renewed every nine minutes.
pub const DEFAULT_REFRESH_SECS: u64 = 9 * 60;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Errors produced while reading configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A variable was set to a value that cannot be used.
    #[error("invalid value for {var}: {value:?}")]
    InvalidValue { var: &'static str, value: String },
}

/// What the session does when the server rejects a scheduled token refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RefreshFailurePolicy {
    /// End the session so the user is sent back to the login screen.
    #[default]
    Logout,
    /// Keep the current token and only log the failure.
    Keep,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleConfig {
    pub api_url: String,
    pub api_key_header: String,
    pub refresh_interval: Duration,
    pub connect_timeout: Duration,
    pub refresh_failure: RefreshFailurePolicy,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_owned(),
            api_key_header: DEFAULT_API_KEY_HEADER.to_owned(),
            refresh_interval: Duration::from_secs(DEFAULT_REFRESH_SECS),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            refresh_failure: RefreshFailurePolicy::default(),
        }
    }
}

impl ConsoleConfig {
    /// Build typed console config from environment variables.
    ///
    /// Optional:
    /// - `IDENTITY_API_URL`: default `http://localhost:8000`
    /// - `IDENTITY_API_KEY_HEADER`: default `X-API-Key`
    /// - `IDENTITY_REFRESH_SECS`: default 540
    /// - `IDENTITY_CONNECT_TIMEOUT_SECS`: default 10
    /// - `IDENTITY_REFRESH_FAILURE`: `logout` (default) or `keep`
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set to an unusable value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_url = lookup("IDENTITY_API_URL").map_or_else(|| DEFAULT_API_URL.to_owned(), |raw| normalize_api_url(&raw));
        if api_url.is_empty() {
            return Err(ConfigError::InvalidValue { var: "IDENTITY_API_URL", value: String::new() });
        }

        let api_key_header = match lookup("IDENTITY_API_KEY_HEADER") {
            Some(raw) if raw.trim().is_empty() => {
                return Err(ConfigError::InvalidValue { var: "IDENTITY_API_KEY_HEADER", value: raw });
            }
            Some(raw) => raw.trim().to_owned(),
            None => DEFAULT_API_KEY_HEADER.to_owned(),
        };

        let refresh_secs = parse_secs("IDENTITY_REFRESH_SECS", lookup("IDENTITY_REFRESH_SECS"), DEFAULT_REFRESH_SECS)?;
        let connect_secs = parse_secs(
            "IDENTITY_CONNECT_TIMEOUT_SECS",
            lookup("IDENTITY_CONNECT_TIMEOUT_SECS"),
            DEFAULT_CONNECT_TIMEOUT_SECS,
        )?;
        let refresh_failure = parse_refresh_failure(lookup("IDENTITY_REFRESH_FAILURE").as_deref())?;

        Ok(Self {
            api_url,
            api_key_header,
            refresh_interval: Duration::from_secs(refresh_secs),
            connect_timeout: Duration::from_secs(connect_secs),
            refresh_failure,
        })
    }
}

/// Trim whitespace and trailing slashes so paths can be appended directly.
pub fn normalize_api_url(raw: &str) -> String {
    raw.trim().trim_end_matches('/').to_owned()
}

fn parse_secs(var: &'static str, raw: Option<String>, default: u64) -> Result<u64, ConfigError> {
    let Some(raw) = raw else {
        return Ok(default);
    };
    match raw.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(secs),
        _ => Err(ConfigError::InvalidValue { var, value: raw }),
    }
}

fn parse_refresh_failure(raw: Option<&str>) -> Result<RefreshFailurePolicy, ConfigError> {
    let Some(raw) = raw else {
        return Ok(RefreshFailurePolicy::default());
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "logout" => Ok(RefreshFailurePolicy::Logout),
        "keep" => Ok(RefreshFailurePolicy::Keep),
        _ => Err(ConfigError::InvalidValue { var: "IDENTITY_REFRESH_FAILURE", value: raw.to_owned() }),
    }
}
