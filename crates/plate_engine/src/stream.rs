use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use engine_logging::engine_error;
use futures_util::Stream;
use plate_core::{update, EventLog, Msg, RunOutcome, RunState, RunSummary, SequenceId, StreamEvent};
use tokio::sync::watch;

/// Where workers report what they are doing.
pub trait MsgSink: Send + Sync {
    fn emit(&self, msg: Msg);
}

#[derive(Debug, Default)]
struct Shared {
    state: RunState,
    log: EventLog,
}

type SharedHandle = Arc<Mutex<Shared>>;

fn lock(shared: &SharedHandle) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The pool's single merge point: folds messages into the run state,
/// stamps sequence ids, and publishes the resulting events.
pub(crate) struct StreamWriter {
    shared: SharedHandle,
    closed_tx: watch::Sender<bool>,
}

impl StreamWriter {
    pub(crate) fn new() -> (Self, StreamReader) {
        let shared = SharedHandle::default();
        let (closed_tx, closed_rx) = watch::channel(false);
        let reader = StreamReader {
            shared: shared.clone(),
            closed_rx,
        };
        (Self { shared, closed_tx }, reader)
    }

    /// Summarizes the run and closes the stream.
    pub(crate) fn finish(&self, outcome: RunOutcome) -> RunSummary {
        let summary = lock(&self.shared).state.summary(outcome);
        self.close();
        summary
    }

    pub(crate) fn close(&self) {
        self.closed_tx.send_replace(true);
    }
}

impl MsgSink for StreamWriter {
    fn emit(&self, msg: Msg) {
        {
            let mut guard = lock(&self.shared);
            let state = std::mem::take(&mut guard.state);
            let (state, event) = update(state, msg);
            guard.state = state;
            // Sequence ids come from the same state, so they always advance.
            if let Err(err) = guard.log.push(event) {
                engine_error!("event dropped from the stream: {}", err);
            }
        }
        // Wake subscribers without changing the closed flag.
        self.closed_tx.send_modify(|_| {});
    }
}

/// Read side of a run's stream, shared by the handle and its subscriptions.
#[derive(Debug, Clone)]
pub(crate) struct StreamReader {
    shared: SharedHandle,
    closed_rx: watch::Receiver<bool>,
}

impl StreamReader {
    pub(crate) fn subscribe_after(&self, sequence_id: SequenceId) -> EventSubscription {
        EventSubscription {
            reader: self.clone(),
            cursor: sequence_id,
        }
    }

    pub(crate) fn events_after(&self, sequence_id: SequenceId) -> Vec<StreamEvent> {
        lock(&self.shared).log.after(sequence_id).to_vec()
    }

    pub(crate) fn available(&self) -> Vec<String> {
        lock(&self.shared).state.available()
    }

    pub(crate) fn checked(&self) -> u64 {
        lock(&self.shared).state.checked()
    }

    pub(crate) fn last_sequence_id(&self) -> SequenceId {
        lock(&self.shared).log.last_sequence_id()
    }

    fn next_after(&self, sequence_id: SequenceId) -> Option<StreamEvent> {
        lock(&self.shared).log.next_after(sequence_id).cloned()
    }
}

/// A resumable cursor over a run's events.
///
/// Yields every event after the sequence id it was created with, waits for
/// new ones while the run is live, and ends once the run has closed and
/// everything has been delivered.
#[derive(Debug)]
pub struct EventSubscription {
    reader: StreamReader,
    cursor: SequenceId,
}

impl EventSubscription {
    /// Sequence id of the last event handed out.
    pub fn cursor(&self) -> SequenceId {
        self.cursor
    }

    pub async fn next(&mut self) -> Option<StreamEvent> {
        loop {
            let closed = *self.reader.closed_rx.borrow_and_update();
            if let Some(event) = self.take_next() {
                return Some(event);
            }
            if closed {
                return None;
            }
            if self.reader.closed_rx.changed().await.is_err() {
                // The writer is gone; deliver whatever it left behind.
                return self.take_next();
            }
        }
    }

    pub fn into_stream(self) -> impl Stream<Item = StreamEvent> + Send {
        futures_util::stream::unfold(self, |mut subscription| async move {
            let event = subscription.next().await?;
            Some((event, subscription))
        })
    }

    fn take_next(&mut self) -> Option<StreamEvent> {
        let event = self.reader.next_after(self.cursor)?;
        self.cursor = event.sequence_id;
        Some(event)
    }
}
