use std::time::Duration;

use reqwest::Url;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettingsError {
    #[error("invalid endpoint url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("setting `{0}` must not be empty")]
    Empty(&'static str),
    #[error("setting `{0}` must be greater than zero")]
    Zero(&'static str),
}

/// Remote endpoint layout and HTTP behaviour shared by every prober.
#[derive(Debug, Clone)]
pub struct ProbeSettings {
    pub base_url: String,
    /// Path of the acknowledgment form that hands out a session cookie.
    pub handshake_path: String,
    pub handshake_fields: Vec<(String, String)>,
    /// Path of the availability form.
    pub check_path: String,
    pub session_cookie: String,
    /// Positional fields are named `{prefix}0` through `{prefix}6`.
    pub char_field_prefix: String,
    /// Static fields appended after the positional ones.
    pub extra_fields: Vec<(String, String)>,
    /// Dotted path of the status code in the JSON response.
    pub status_field: String,
    pub available_code: String,
    pub user_agent: Option<String>,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    /// Ceiling on simultaneous requests across the whole pool; also split into
    /// each worker's idle keep-alive allowance.
    pub connection_limit: usize,
    pub max_body_bytes: u64,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080".to_string(),
            handshake_path: "/plates/acknowledge".to_string(),
            handshake_fields: vec![("acceptTerms".to_string(), "true".to_string())],
            check_path: "/plates/check".to_string(),
            session_cookie: "JSESSIONID".to_string(),
            char_field_prefix: "plateChar".to_string(),
            extra_fields: Vec::new(),
            status_field: "code".to_string(),
            available_code: "AVAILABLE".to_string(),
            user_agent: None,
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(15),
            connection_limit: 4,
            max_body_bytes: 64 * 1024,
        }
    }
}

impl ProbeSettings {
    pub fn validate(&self) -> Result<(), SettingsError> {
        self.handshake_url()?;
        self.check_url()?;
        if self.session_cookie.trim().is_empty() {
            return Err(SettingsError::Empty("session_cookie"));
        }
        if self.status_field.trim().is_empty() {
            return Err(SettingsError::Empty("status_field"));
        }
        if self.char_field_prefix.is_empty() {
            return Err(SettingsError::Empty("char_field_prefix"));
        }
        if self.connection_limit == 0 {
            return Err(SettingsError::Zero("connection_limit"));
        }
        if self.request_timeout.is_zero() {
            return Err(SettingsError::Zero("request_timeout"));
        }
        Ok(())
    }

    pub fn handshake_url(&self) -> Result<Url, SettingsError> {
        self.endpoint(&self.handshake_path)
    }

    pub fn check_url(&self) -> Result<Url, SettingsError> {
        self.endpoint(&self.check_path)
    }

    /// Idle connections each worker's client may keep for `concurrency` workers.
    pub fn idle_connections_per_worker(&self, concurrency: usize) -> usize {
        (self.connection_limit / concurrency.max(1)).max(1)
    }

    fn endpoint(&self, path: &str) -> Result<Url, SettingsError> {
        let invalid = |reason: String| SettingsError::InvalidUrl {
            url: format!("{}{}", self.base_url, path),
            reason,
        };
        let base = Url::parse(&self.base_url).map_err(|err| invalid(err.to_string()))?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(invalid(format!("unsupported scheme {}", base.scheme())));
        }
        base.join(path).map_err(|err| invalid(err.to_string()))
    }
}
