use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::{Candidate, EventPayload, SequenceId, StreamEvent, Verdict, WorkerId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Completed,
    Cancelled,
    /// The source failed; candidates after the failure were never checked.
    SourceFailed,
}

/// Final report of a run, available once the stream has closed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub outcome: RunOutcome,
    pub checked: u64,
    /// Sorted, de-duplicated candidates classified as available.
    pub available: Vec<String>,
    pub unavailable: u64,
    pub errors: u64,
    pub last_sequence_id: SequenceId,
}

/// Aggregated state of one pool run.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RunState {
    last_sequence_id: SequenceId,
    checked: u64,
    unavailable: u64,
    errors: u64,
    available: BTreeSet<String>,
    in_flight: BTreeMap<WorkerId, Candidate>,
}

impl RunState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_sequence_id(&self) -> SequenceId {
        self.last_sequence_id
    }

    pub fn checked(&self) -> u64 {
        self.checked
    }

    /// Sorted snapshot of the candidates confirmed available so far.
    pub fn available(&self) -> Vec<String> {
        self.available.iter().cloned().collect()
    }

    /// Candidate each worker is currently probing.
    pub fn in_flight(&self) -> impl Iterator<Item = (WorkerId, &Candidate)> + '_ {
        self.in_flight.iter().map(|(worker, candidate)| (*worker, candidate))
    }

    pub fn summary(&self, outcome: RunOutcome) -> RunSummary {
        RunSummary {
            outcome,
            checked: self.checked,
            available: self.available(),
            unavailable: self.unavailable,
            errors: self.errors,
            last_sequence_id: self.last_sequence_id,
        }
    }

    pub(crate) fn begin_check(&mut self, worker: WorkerId, candidate: Candidate) {
        self.in_flight.insert(worker, candidate);
    }

    /// Counts a finished check and returns the new pool-wide total.
    pub(crate) fn finish_check(
        &mut self,
        worker: WorkerId,
        candidate: &Candidate,
        verdict: Verdict,
    ) -> u64 {
        if self.in_flight.get(&worker) == Some(candidate) {
            self.in_flight.remove(&worker);
        }
        self.checked += 1;
        match verdict {
            Verdict::Available => {
                self.available.insert(candidate.as_str().to_ascii_uppercase());
            }
            Verdict::Unavailable => self.unavailable += 1,
            Verdict::Error => self.errors += 1,
        }
        self.checked
    }

    pub(crate) fn stamp(&mut self, payload: EventPayload) -> StreamEvent {
        self.last_sequence_id += 1;
        StreamEvent {
            sequence_id: self.last_sequence_id,
            payload,
        }
    }
}
