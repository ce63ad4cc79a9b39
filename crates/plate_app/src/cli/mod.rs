mod config;
mod render;

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use engine_logging::{engine_info, engine_warn};
use plate_core::LengthBounds;
use plate_engine::{
    write_summary, CandidateSource, CombinationSource, ExportOptions, LineSource, PoolHandle,
    ReqwestConnector,
};

use config::{AppConfig, DEFAULT_CONFIG_FILENAME};
use render::{render_event, summary_line};

pub fn run_app(config_path: Option<PathBuf>) -> Result<()> {
    let config_path = config_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILENAME));
    let loaded = AppConfig::load(&config_path)?;
    let found = loaded.is_some();
    let config = loaded.unwrap_or_default();

    if !engine_logging::initialize(config.log_destination(), config.log_level()?) {
        eprintln!("Warning: logging was not initialized");
    }
    if found {
        engine_info!("Loaded config from {:?}", config_path);
    } else {
        engine_warn!("No config at {:?}, using defaults", config_path);
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("starting async runtime")?;
    runtime.block_on(probe_all(&config))
}

async fn probe_all(config: &AppConfig) -> Result<()> {
    let settings = config.probe_settings()?;
    let pool_config = config.pool_config();
    let source = build_source(config)?;
    let connector = ReqwestConnector::new(settings, pool_config.concurrency)?;
    let handle = PoolHandle::start(source, Arc::new(connector), pool_config)?;

    let cancel = handle.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            engine_warn!("Interrupted, cancelling run");
            cancel.cancel();
        }
    });

    let mut events = handle.subscribe();
    let mut stdout = io::stdout();
    while let Some(event) = events.next().await {
        if let Some(line) = render_event(&event, config.output, config.show_checking)? {
            writeln!(stdout, "{line}")?;
        }
    }

    let summary = handle.finish().await?;
    eprintln!("{}", summary_line(&summary));
    let paths = write_summary(&config.output_dir, &summary, &ExportOptions::default())
        .with_context(|| format!("exporting to {}", config.output_dir.display()))?;
    engine_info!("Available list written to {:?}", paths.available_path);
    Ok(())
}

fn build_source(config: &AppConfig) -> Result<Box<dyn CandidateSource>> {
    let bounds = config.bounds()?;
    let alphabet = config.alphabet()?;
    if let Some(path) = &config.candidates_file {
        return Ok(Box::new(open_list(path, bounds)?.with_alphabet(alphabet)));
    }
    let source = match config.generate_length {
        Some(length) => CombinationSource::new(alphabet, length)?,
        None => CombinationSource::for_bounds(alphabet, bounds),
    };
    engine_info!("Generating {} candidates", source.total());
    Ok(Box::new(source))
}

fn open_list(path: &Path, bounds: LengthBounds) -> Result<LineSource<io::BufReader<File>>> {
    LineSource::open(path, bounds).with_context(|| format!("opening {}", path.display()))
}
