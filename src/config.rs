/// Harness configuration
use crate::error::{Result, SessionError};
use std::env;
use std::time::Duration;
use url::Url;

const DEFAULT_BACKEND_URL: &str = "http://localhost:8081";
const DEFAULT_CALLBACK_URL: &str = "http://localhost:5173/callback";
const DEFAULT_LOGOUT_REDIRECT_URL: &str = "http://localhost:5173";

/// Timeout applied to every backend request.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Upper bound on how long logout waits for the backend before discarding the call.
const DEFAULT_LOGOUT_TIMEOUT_MS: u64 = 3000;

/// Harness configuration
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// Backend origin, e.g. `http://localhost:8081`. The `/api/v1` prefix is added by [`crate::backend::Endpoints`].
    pub backend_base_url: Url,
    /// Where the identity provider sends the browser back with `?code=`
    pub callback_url: Url,
    /// Application base URL the browser lands on after logout
    pub logout_redirect_url: Url,
    pub request_timeout: Duration,
    pub logout_notify_timeout: Duration,
}

impl HarnessConfig {
    /// Create a configuration with default timeouts
    pub fn new(backend_base_url: Url, callback_url: Url, logout_redirect_url: Url) -> Result<Self> {
        for (name, url) in [
            ("backend URL", &backend_base_url),
            ("callback URL", &callback_url),
            ("logout redirect URL", &logout_redirect_url),
        ] {
            validate_url(name, url)?;
        }

        Ok(Self {
            backend_base_url,
            callback_url,
            logout_redirect_url,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            logout_notify_timeout: Duration::from_millis(DEFAULT_LOGOUT_TIMEOUT_MS),
        })
    }

    /// Load configuration from `CODEFLOW_*` environment variables
    ///
    /// Missing variables fall back to the local development defaults.
    /// Timeouts that fail to parse fall back to their defaults as well; URLs
    /// that fail to parse are reported as configuration errors.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::new(
            url_var("CODEFLOW_BACKEND_URL", DEFAULT_BACKEND_URL)?,
            url_var("CODEFLOW_CALLBACK_URL", DEFAULT_CALLBACK_URL)?,
            url_var("CODEFLOW_LOGOUT_REDIRECT_URL", DEFAULT_LOGOUT_REDIRECT_URL)?,
        )?;

        config.request_timeout = Duration::from_secs(
            env::var("CODEFLOW_REQUEST_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
        );
        config.logout_notify_timeout = Duration::from_millis(
            env::var("CODEFLOW_LOGOUT_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_LOGOUT_TIMEOUT_MS),
        );

        Ok(config)
    }

    /// Override the backend origin
    pub fn with_backend_url(mut self, backend_base_url: Url) -> Result<Self> {
        validate_url("backend URL", &backend_base_url)?;
        self.backend_base_url = backend_base_url;
        Ok(self)
    }

    pub fn with_logout_notify_timeout(mut self, timeout: Duration) -> Self {
        self.logout_notify_timeout = timeout;
        self
    }
}

fn url_var(name: &str, default: &str) -> Result<Url> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    Url::parse(&raw).map_err(|e| SessionError::ConfigError(format!("{} is not a valid URL: {}", name, e)))
}

fn validate_url(name: &str, url: &Url) -> Result<()> {
    if !matches!(url.scheme(), "http" | "https") {
        return Err(SessionError::ConfigError(format!(
            "{} must use http or https, got {}",
            name,
            url.scheme()
        )));
    }
    if url.cannot_be_a_base() {
        return Err(SessionError::ConfigError(format!("{} cannot carry a path", name)));
    }
    Ok(())
}
