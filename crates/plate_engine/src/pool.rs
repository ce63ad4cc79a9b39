use std::fmt;
use std::sync::Arc;

use engine_logging::{engine_info, engine_warn};
use futures_util::future::join_all;
use plate_core::{Msg, Notice, RunOutcome, RunSummary, SequenceId, StreamEvent};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::probe::Connector;
use crate::source::{CandidateSource, SharedSource};
use crate::stream::{EventSubscription, MsgSink, StreamReader, StreamWriter};
use crate::worker::{Worker, WorkerExit};

/// Produces the RFC 3339 timestamp stamped on each result.
pub type Clock = Arc<dyn Fn() -> String + Send + Sync>;

pub fn utc_clock() -> Clock {
    Arc::new(|| chrono::Utc::now().to_rfc3339())
}

#[derive(Clone)]
pub struct PoolConfig {
    pub concurrency: usize,
    pub clock: Clock,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            clock: utc_clock(),
        }
    }
}

impl fmt::Debug for PoolConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolConfig")
            .field("concurrency", &self.concurrency)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    #[error("concurrency must be at least 1")]
    InvalidConcurrency,
    #[error("all {attempted} sessions failed to initialize: {detail}")]
    AllSessionsFailed { attempted: usize, detail: String },
    #[error("pool driver failed: {0}")]
    Driver(String),
}

/// Caller's side of a running pool.
///
/// Dropping the handle before [`PoolHandle::finish`] cancels the run.
pub struct PoolHandle {
    reader: StreamReader,
    cancel: CancellationToken,
    driver: JoinHandle<Result<RunSummary, PoolError>>,
    cancel_on_drop: DropGuard,
}

impl PoolHandle {
    /// Starts a pool on the current Tokio runtime.
    pub fn start(
        source: Box<dyn CandidateSource>,
        connector: Arc<dyn Connector>,
        config: PoolConfig,
    ) -> Result<Self, PoolError> {
        if config.concurrency == 0 {
            return Err(PoolError::InvalidConcurrency);
        }
        let cancel = CancellationToken::new();
        let (writer, reader) = StreamWriter::new();
        let driver = tokio::spawn(drive(source, connector, config, cancel.clone(), writer));
        Ok(Self {
            reader,
            cancel_on_drop: cancel.clone().drop_guard(),
            cancel,
            driver,
        })
    }

    pub fn subscribe(&self) -> EventSubscription {
        self.reader.subscribe_after(0)
    }

    /// Resumes after the last event a consumer saw.
    pub fn subscribe_after(&self, sequence_id: SequenceId) -> EventSubscription {
        self.reader.subscribe_after(sequence_id)
    }

    /// Snapshot of the events emitted after `sequence_id` so far.
    pub fn events_after(&self, sequence_id: SequenceId) -> Vec<StreamEvent> {
        self.reader.events_after(sequence_id)
    }

    pub fn last_sequence_id(&self) -> SequenceId {
        self.reader.last_sequence_id()
    }

    /// Sorted candidates confirmed available so far.
    pub fn available(&self) -> Vec<String> {
        self.reader.available()
    }

    pub fn checked(&self) -> u64 {
        self.reader.checked()
    }

    /// Asks every worker to stop before its next pull.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Waits for the stream to close and returns the run's summary.
    pub async fn finish(self) -> Result<RunSummary, PoolError> {
        let Self {
            driver,
            cancel_on_drop,
            ..
        } = self;
        let result = driver
            .await
            .map_err(|err| PoolError::Driver(err.to_string()))?;
        let _ = cancel_on_drop.disarm();
        result
    }
}

async fn drive(
    source: Box<dyn CandidateSource>,
    connector: Arc<dyn Connector>,
    config: PoolConfig,
    cancel: CancellationToken,
    writer: StreamWriter,
) -> Result<RunSummary, PoolError> {
    let requested = config.concurrency;
    engine_info!("initializing {} sessions", requested);
    writer.emit(Msg::Notice(Notice::Initializing {
        sessions: requested,
    }));

    let connector = connector.as_ref();
    let attempts = join_all((0..requested).map(|worker| async move {
        (worker, connector.connect(worker).await)
    }))
    .await;

    let mut workers = Vec::with_capacity(requested);
    let mut last_failure = None;
    for (worker, attempt) in attempts {
        match attempt {
            Ok(prober) => workers.push(Worker::new(worker, prober, config.clock.clone())),
            Err(err) => {
                engine_warn!("worker {} has no session: {}", worker, err);
                last_failure = Some(err.to_string());
            }
        }
    }

    if workers.is_empty() {
        let detail = last_failure.unwrap_or_default();
        writer.emit(Msg::Notice(Notice::PoolInitFailed {
            attempted: requested,
            detail: detail.clone(),
        }));
        writer.close();
        return Err(PoolError::AllSessionsFailed {
            attempted: requested,
            detail,
        });
    }

    if cancel.is_cancelled() {
        writer.emit(Msg::Notice(Notice::Cancelled));
        return Ok(writer.finish(RunOutcome::Cancelled));
    }

    engine_info!("{} of {} sessions ready", workers.len(), requested);
    writer.emit(Msg::Notice(Notice::Ready {
        workers: workers.len(),
    }));

    let source = SharedSource::new(source);
    let exits = join_all(
        workers
            .into_iter()
            .map(|worker| worker.run(&source, &writer, &cancel)),
    )
    .await;

    let source_failure = exits.iter().find_map(|exit| match exit {
        WorkerExit::SourceFailed(detail) => Some(detail.clone()),
        _ => None,
    });
    let outcome = if exits.contains(&WorkerExit::Cancelled) {
        writer.emit(Msg::Notice(Notice::Cancelled));
        RunOutcome::Cancelled
    } else if let Some(detail) = source_failure {
        // Other workers may have reported results after the failure itself.
        writer.emit(Msg::Notice(Notice::SourceAborted { detail }));
        RunOutcome::SourceFailed
    } else {
        RunOutcome::Completed
    };
    let summary = writer.finish(outcome);
    engine_info!(
        "run {:?}: {} pulled, {} checked, {} available",
        outcome,
        source.pulled(),
        summary.checked,
        summary.available.len()
    );
    Ok(summary)
}
