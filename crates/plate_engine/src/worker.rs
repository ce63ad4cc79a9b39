use std::any::Any;
use std::panic::AssertUnwindSafe;

use engine_logging::{engine_debug, engine_error, engine_warn};
use futures_util::FutureExt;
use plate_core::{Candidate, Msg, Notice, ProbeOutcome, WorkerId};
use tokio_util::sync::CancellationToken;

use crate::pool::Clock;
use crate::probe::{ProbeError, ProbeFailure, Prober};
use crate::source::{Pull, SharedSource};
use crate::stream::MsgSink;

/// Why a worker stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerExit {
    Exhausted,
    Cancelled,
    /// Carries the source's error text.
    SourceFailed(String),
}

/// Pulls candidates one at a time and probes them through its own session.
pub struct Worker {
    id: WorkerId,
    prober: Box<dyn Prober>,
    clock: Clock,
}

impl Worker {
    pub fn new(id: WorkerId, prober: Box<dyn Prober>, clock: Clock) -> Self {
        Self { id, prober, clock }
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    /// Runs until the source is exhausted or fails, or `cancel` is observed
    /// between candidates. A probe already started always completes and is
    /// reported.
    pub async fn run(
        self,
        source: &SharedSource,
        sink: &dyn MsgSink,
        cancel: &CancellationToken,
    ) -> WorkerExit {
        engine_debug!("worker {} started", self.id);
        let exit = loop {
            if cancel.is_cancelled() {
                break WorkerExit::Cancelled;
            }
            let candidate = match source.pull(cancel).await {
                Pull::Candidate(candidate) => candidate,
                Pull::Exhausted => break WorkerExit::Exhausted,
                Pull::Cancelled => break WorkerExit::Cancelled,
                Pull::Failed(detail) => {
                    engine_warn!("worker {} stopping, source failed: {}", self.id, detail);
                    sink.emit(Msg::Notice(Notice::SourceFailed {
                        worker: self.id,
                        detail: detail.clone(),
                    }));
                    break WorkerExit::SourceFailed(detail);
                }
            };

            sink.emit(Msg::Checking {
                worker: self.id,
                candidate: candidate.clone(),
            });
            let outcome = self.probe(&candidate).await;
            sink.emit(Msg::Checked {
                worker: self.id,
                candidate,
                outcome,
                timestamp: (self.clock)(),
            });
        };
        engine_debug!("worker {} stopped: {:?}", self.id, exit);
        exit
    }

    async fn probe(&self, candidate: &Candidate) -> ProbeOutcome {
        match AssertUnwindSafe(self.prober.probe(candidate))
            .catch_unwind()
            .await
        {
            Ok(outcome) => outcome,
            Err(panic) => {
                let detail = panic_message(panic.as_ref());
                engine_error!("worker {} prober panicked on {}: {}", self.id, candidate, detail);
                ProbeError::new(ProbeFailure::Panicked, detail).into_outcome()
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
