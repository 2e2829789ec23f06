//! Configuration types.
//!
//! All configuration is environment-driven and resolved once at startup.
//! The upstream model credential is required — the process refuses to start
//! without it rather than failing lazily on the first chat request.

use secrecy::SecretString;

use crate::error::ConfigError;

/// Default upstream chat-completion endpoint.
pub const DEFAULT_UPSTREAM_URL: &str = "https://api.openai.com/v1/chat/completions";

/// Default model identifier sent with every upstream request.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Chat relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Bearer credential for the upstream model API.
    pub upstream_api_key: SecretString,
    /// Upstream chat-completion endpoint URL.
    pub upstream_url: String,
    /// Model identifier sent with every request.
    pub model: String,
    /// Base URL of the managed backend (auth + relational reads).
    pub backend_url: String,
    /// Publishable API key the backend requires alongside user tokens.
    pub backend_api_key: SecretString,
    /// Port the relay listens on.
    pub port: u16,
}

impl RelayConfig {
    /// Build config from environment variables, failing fast on anything
    /// required.
    pub fn from_env() -> Result<Self, ConfigError> {
        let upstream_api_key =
            require_env("PM_ASSIST_UPSTREAM_API_KEY", "export the model API key")?;
        let backend_url = require_env("PM_ASSIST_BACKEND_URL", "set the managed backend base URL")?;
        let backend_api_key = require_env(
            "PM_ASSIST_BACKEND_API_KEY",
            "set the backend publishable API key",
        )?;

        let upstream_url = std::env::var("PM_ASSIST_UPSTREAM_URL")
            .unwrap_or_else(|_| DEFAULT_UPSTREAM_URL.to_string());
        let model =
            std::env::var("PM_ASSIST_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());

        let port: u16 = match std::env::var("PM_ASSIST_PORT") {
            Ok(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
                key: "PM_ASSIST_PORT".to_string(),
                message: format!("not a valid port: {raw}"),
            })?,
            Err(_) => 8787,
        };

        Ok(Self {
            upstream_api_key: SecretString::from(upstream_api_key),
            upstream_url,
            model,
            backend_url: backend_url.trim_end_matches('/').to_string(),
            backend_api_key: SecretString::from(backend_api_key),
            port,
        })
    }
}

fn require_env(key: &str, hint: &str) -> Result<String, ConfigError> {
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ConfigError::MissingRequired {
            key: key.to_string(),
            hint: hint.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_upstream_key_is_fatal() {
        // Env-var tests share process state; use keys no other test touches.
        unsafe {
            std::env::remove_var("PM_ASSIST_UPSTREAM_API_KEY");
        }
        let err = RelayConfig::from_env().unwrap_err();
        match err {
            ConfigError::MissingRequired { key, .. } => {
                assert_eq!(key, "PM_ASSIST_UPSTREAM_API_KEY");
            }
            other => panic!("expected MissingRequired, got {other:?}"),
        }
    }
}
