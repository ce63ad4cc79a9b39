use std::fmt;

use reqwest::header::{HeaderMap, SET_COOKIE};
use reqwest::Url;
use thiserror::Error;

use crate::ProbeSettings;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InitError {
    #[error("handshake returned http status {0}")]
    UnexpectedStatus(u16),
    #[error("handshake response carried no `{cookie}` session cookie")]
    NoSessionToken { cookie: String },
    #[error("handshake timed out: {0}")]
    Timeout(String),
    #[error("handshake transport error: {0}")]
    Transport(String),
    #[error("could not build http client: {0}")]
    Client(String),
}

impl InitError {
    fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            InitError::Timeout(err.to_string())
        } else {
            InitError::Transport(err.to_string())
        }
    }
}

/// An authenticated context against the remote form.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    id: String,
    cookie: String,
}

impl Session {
    pub fn new(cookie_name: &str, id: impl Into<String>) -> Self {
        let id = id.into();
        let cookie = format!("{cookie_name}={id}");
        Self { id, cookie }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Value for the `Cookie` request header.
    pub fn cookie_header(&self) -> &str {
        &self.cookie
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Only a prefix of the token goes to logs.
        let shown: String = self.id.chars().take(6).collect();
        f.debug_struct("Session")
            .field("id", &format_args!("{shown}…"))
            .finish()
    }
}

/// Submits the acknowledgment form once and captures the session cookie.
pub async fn acquire(
    client: &reqwest::Client,
    handshake_url: &Url,
    settings: &ProbeSettings,
) -> Result<Session, InitError> {
    let response = client
        .post(handshake_url.clone())
        .form(&settings.handshake_fields)
        .send()
        .await
        .map_err(InitError::from_reqwest)?;

    let status = response.status();
    let token = session_token(response.headers(), &settings.session_cookie);

    // Drain the body so the connection goes back to the pool.
    let _ = response.bytes().await;

    if !status.is_success() {
        return Err(InitError::UnexpectedStatus(status.as_u16()));
    }
    let id = token.ok_or_else(|| InitError::NoSessionToken {
        cookie: settings.session_cookie.clone(),
    })?;
    Ok(Session::new(&settings.session_cookie, id))
}

/// Finds a non-empty value for cookie `name` among the `Set-Cookie` headers.
pub fn session_token(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter_map(|raw| raw.split(';').next())
        .filter_map(|pair| pair.split_once('='))
        .filter(|(key, _)| key.trim() == name)
        .map(|(_, value)| value.trim().trim_matches('"'))
        .find(|value| !value.is_empty())
        .map(str::to_string)
}
