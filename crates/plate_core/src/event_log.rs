use thiserror::Error;

use crate::{SequenceId, StreamEvent};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("event {got} does not follow last retained event {last}")]
pub struct OutOfOrder {
    pub last: SequenceId,
    pub got: SequenceId,
}

/// Retained, sequence-addressable history of a stream.
///
/// Consumers that disconnect can resume from the last sequence id they saw.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Vec<StreamEvent>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: StreamEvent) -> Result<(), OutOfOrder> {
        let last = self.last_sequence_id();
        if event.sequence_id <= last {
            return Err(OutOfOrder {
                last,
                got: event.sequence_id,
            });
        }
        self.events.push(event);
        Ok(())
    }

    /// Sequence id of the newest event, or 0 when empty.
    pub fn last_sequence_id(&self) -> SequenceId {
        self.events.last().map_or(0, |event| event.sequence_id)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Events with a sequence id strictly greater than `sequence_id`.
    pub fn after(&self, sequence_id: SequenceId) -> &[StreamEvent] {
        let start = self
            .events
            .partition_point(|event| event.sequence_id <= sequence_id);
        &self.events[start..]
    }

    /// The first event following `sequence_id`, if any.
    pub fn next_after(&self, sequence_id: SequenceId) -> Option<&StreamEvent> {
        self.after(sequence_id).first()
    }

    pub fn iter(&self) -> impl Iterator<Item = &StreamEvent> + '_ {
        self.events.iter()
    }
}
