use std::fmt;
use std::sync::Arc;

use engine_logging::{engine_debug, engine_info, engine_warn};
use plate_core::{Candidate, ProbeOutcome, Verdict, WorkerId};
use reqwest::header::COOKIE;
use reqwest::Url;
use thiserror::Error;
use tokio::sync::{Semaphore, SemaphorePermit};

use crate::classify::classify_body;
use crate::form::probe_form;
use crate::session::{acquire, InitError, Session};
use crate::{ProbeSettings, SettingsError};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct ProbeError {
    pub kind: ProbeFailure,
    pub message: String,
}

impl ProbeError {
    pub(crate) fn new(kind: ProbeFailure, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn into_outcome(self) -> ProbeOutcome {
        ProbeOutcome::error(self.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeFailure {
    Timeout,
    Network,
    HttpStatus(u16),
    TooLarge { max_bytes: u64, actual: Option<u64> },
    MalformedBody,
    MissingStatusField,
    Panicked,
}

impl fmt::Display for ProbeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeFailure::Timeout => write!(f, "timeout"),
            ProbeFailure::Network => write!(f, "network error"),
            ProbeFailure::HttpStatus(code) => write!(f, "http status {code}"),
            ProbeFailure::TooLarge { max_bytes, actual } => {
                write!(f, "response too large (max {max_bytes}, actual {actual:?})")
            }
            ProbeFailure::MalformedBody => write!(f, "malformed body"),
            ProbeFailure::MissingStatusField => write!(f, "missing status field"),
            ProbeFailure::Panicked => write!(f, "prober panicked"),
        }
    }
}

/// Classifies candidates through one session. Never fails to its caller.
#[async_trait::async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, candidate: &Candidate) -> ProbeOutcome;
}

/// Opens a session and hands back a prober bound to it.
#[async_trait::async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, worker: WorkerId) -> Result<Box<dyn Prober>, InitError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestConnector {
    settings: Arc<ProbeSettings>,
    handshake_url: Url,
    check_url: Url,
    idle_per_worker: usize,
    /// `connection_limit` permits shared by every prober this connector opens.
    in_flight: Arc<Semaphore>,
}

impl ReqwestConnector {
    /// `concurrency` splits `settings.connection_limit` across worker clients.
    pub fn new(settings: ProbeSettings, concurrency: usize) -> Result<Self, SettingsError> {
        settings.validate()?;
        Ok(Self {
            handshake_url: settings.handshake_url()?,
            check_url: settings.check_url()?,
            idle_per_worker: settings.idle_connections_per_worker(concurrency),
            in_flight: Arc::new(Semaphore::new(settings.connection_limit)),
            settings: Arc::new(settings),
        })
    }

    fn build_client(&self) -> Result<reqwest::Client, InitError> {
        let mut builder = reqwest::Client::builder()
            .connect_timeout(self.settings.connect_timeout)
            .timeout(self.settings.request_timeout)
            .pool_max_idle_per_host(self.idle_per_worker)
            .redirect(reqwest::redirect::Policy::limited(5));
        if let Some(agent) = &self.settings.user_agent {
            builder = builder.user_agent(agent.clone());
        }
        builder
            .build()
            .map_err(|err| InitError::Client(err.to_string()))
    }
}

#[async_trait::async_trait]
impl Connector for ReqwestConnector {
    async fn connect(&self, worker: WorkerId) -> Result<Box<dyn Prober>, InitError> {
        let client = self.build_client()?;
        let session = {
            let _permit = self
                .in_flight
                .acquire()
                .await
                .map_err(|err| InitError::Client(err.to_string()))?;
            acquire(&client, &self.handshake_url, &self.settings).await?
        };
        engine_info!("worker {} acquired session {:?}", worker, session);
        Ok(Box::new(
            ReqwestProber::new(client, session, self.check_url.clone(), self.settings.clone())
                .with_limit(self.in_flight.clone()),
        ))
    }
}

/// Prober owning one session and one keep-alive client.
#[derive(Debug, Clone)]
pub struct ReqwestProber {
    client: reqwest::Client,
    session: Session,
    check_url: Url,
    settings: Arc<ProbeSettings>,
    in_flight: Option<Arc<Semaphore>>,
}

impl ReqwestProber {
    pub fn new(
        client: reqwest::Client,
        session: Session,
        check_url: Url,
        settings: Arc<ProbeSettings>,
    ) -> Self {
        Self {
            client,
            session,
            check_url,
            settings,
            in_flight: None,
        }
    }

    /// Shares a cap on simultaneous requests with other probers.
    pub fn with_limit(mut self, in_flight: Arc<Semaphore>) -> Self {
        self.in_flight = Some(in_flight);
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub async fn try_probe(&self, candidate: &Candidate) -> Result<Verdict, ProbeError> {
        // Held until the body has been read.
        let _permit = self.permit().await?;
        let response = self
            .client
            .post(self.check_url.clone())
            .header(COOKIE, self.session.cookie_header())
            .form(&probe_form(candidate, &self.settings))
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            let _ = response.bytes().await;
            return Err(ProbeError::new(
                ProbeFailure::HttpStatus(status.as_u16()),
                status.to_string(),
            ));
        }

        let max_bytes = self.settings.max_body_bytes;
        if let Some(content_len) = response.content_length() {
            if content_len > max_bytes {
                return Err(ProbeError::new(
                    ProbeFailure::TooLarge {
                        max_bytes,
                        actual: Some(content_len),
                    },
                    "response too large",
                ));
            }
        }

        let body = response.bytes().await.map_err(map_reqwest_error)?;
        if body.len() as u64 > max_bytes {
            return Err(ProbeError::new(
                ProbeFailure::TooLarge {
                    max_bytes,
                    actual: Some(body.len() as u64),
                },
                "response too large",
            ));
        }

        classify_body(&body, &self.settings)
    }

    async fn permit(&self) -> Result<Option<SemaphorePermit<'_>>, ProbeError> {
        match &self.in_flight {
            Some(limit) => limit
                .acquire()
                .await
                .map(Some)
                .map_err(|err| ProbeError::new(ProbeFailure::Network, err.to_string())),
            None => Ok(None),
        }
    }
}

#[async_trait::async_trait]
impl Prober for ReqwestProber {
    async fn probe(&self, candidate: &Candidate) -> ProbeOutcome {
        match self.try_probe(candidate).await {
            Ok(verdict) => ProbeOutcome {
                verdict,
                error_detail: None,
            },
            Err(err) => {
                if matches!(err.kind, ProbeFailure::HttpStatus(401 | 403)) {
                    engine_warn!("probe of {} rejected, session may be stale: {}", candidate, err);
                } else {
                    engine_debug!("probe of {} failed: {}", candidate, err);
                }
                err.into_outcome()
            }
        }
    }
}

fn map_reqwest_error(err: reqwest::Error) -> ProbeError {
    if err.is_timeout() {
        return ProbeError::new(ProbeFailure::Timeout, err.to_string());
    }
    ProbeError::new(ProbeFailure::Network, err.to_string())
}
