use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use engine_logging::{LevelFilter, LogDestination};
use plate_core::{Alphabet, LengthBounds, DEFAULT_ALPHABET};
use plate_engine::{PoolConfig, ProbeSettings};
use serde::{Deserialize, Serialize};

pub(crate) const DEFAULT_CONFIG_FILENAME: &str = "plates.ron";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) enum OutputFormat {
    Table,
    JsonLines,
}

/// Everything `plate_app` reads from its RON file. Missing fields keep their
/// defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct AppConfig {
    pub base_url: String,
    pub handshake_path: String,
    pub handshake_fields: Vec<(String, String)>,
    pub check_path: String,
    pub session_cookie: String,
    pub char_field_prefix: String,
    pub extra_fields: Vec<(String, String)>,
    pub status_field: String,
    pub available_code: String,
    pub user_agent: Option<String>,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub connection_limit: usize,

    pub concurrency: usize,
    pub min_length: usize,
    pub max_length: usize,
    pub alphabet: String,
    /// One candidate per line. When unset, candidates are generated.
    pub candidates_file: Option<PathBuf>,
    /// Length of generated candidates; every length within the bounds if unset.
    pub generate_length: Option<usize>,

    pub output_dir: PathBuf,
    pub output: OutputFormat,
    pub show_checking: bool,
    pub log_file: PathBuf,
    pub log_to_terminal: bool,
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        let probe = ProbeSettings::default();
        let bounds = LengthBounds::default();
        Self {
            base_url: probe.base_url,
            handshake_path: probe.handshake_path,
            handshake_fields: probe.handshake_fields,
            check_path: probe.check_path,
            session_cookie: probe.session_cookie,
            char_field_prefix: probe.char_field_prefix,
            extra_fields: probe.extra_fields,
            status_field: probe.status_field,
            available_code: probe.available_code,
            user_agent: probe.user_agent,
            connect_timeout_secs: probe.connect_timeout.as_secs(),
            request_timeout_secs: probe.request_timeout.as_secs(),
            connection_limit: probe.connection_limit,
            concurrency: PoolConfig::default().concurrency,
            min_length: bounds.min(),
            max_length: bounds.max(),
            alphabet: DEFAULT_ALPHABET.to_string(),
            candidates_file: None,
            generate_length: Some(3),
            output_dir: PathBuf::from("output"),
            output: OutputFormat::Table,
            show_checking: false,
            log_file: PathBuf::from("plate_app.log"),
            log_to_terminal: false,
            log_level: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Reads `path`; `None` when it does not exist.
    ///
    /// Runs before logging is up, so the caller reports the outcome.
    pub(crate) fn load(path: &Path) -> Result<Option<Self>> {
        let content = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err).with_context(|| format!("reading config {}", path.display()));
            }
        };
        Self::parse(&content)
            .map(Some)
            .with_context(|| format!("parsing config {}", path.display()))
    }

    pub(crate) fn parse(content: &str) -> Result<Self> {
        Ok(ron::from_str(content)?)
    }

    pub(crate) fn probe_settings(&self) -> Result<ProbeSettings> {
        let settings = ProbeSettings {
            base_url: self.base_url.clone(),
            handshake_path: self.handshake_path.clone(),
            handshake_fields: self.handshake_fields.clone(),
            check_path: self.check_path.clone(),
            session_cookie: self.session_cookie.clone(),
            char_field_prefix: self.char_field_prefix.clone(),
            extra_fields: self.extra_fields.clone(),
            status_field: self.status_field.clone(),
            available_code: self.available_code.clone(),
            user_agent: self.user_agent.clone(),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            connection_limit: self.connection_limit,
            ..ProbeSettings::default()
        };
        settings.validate()?;
        Ok(settings)
    }

    pub(crate) fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            concurrency: self.concurrency,
            ..PoolConfig::default()
        }
    }

    pub(crate) fn bounds(&self) -> Result<LengthBounds> {
        Ok(LengthBounds::new(self.min_length, self.max_length)?)
    }

    pub(crate) fn alphabet(&self) -> Result<Alphabet> {
        Ok(Alphabet::parse(&self.alphabet)?)
    }

    pub(crate) fn log_level(&self) -> Result<LevelFilter> {
        self.log_level
            .parse()
            .with_context(|| format!("unknown log level {:?}", self.log_level))
    }

    pub(crate) fn log_destination(&self) -> LogDestination {
        if self.log_to_terminal {
            LogDestination::Both(self.log_file.clone())
        } else {
            LogDestination::File(self.log_file.clone())
        }
    }
}
