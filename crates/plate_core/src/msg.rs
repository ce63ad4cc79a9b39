use crate::{Candidate, Notice, ProbeOutcome, WorkerId};

/// Input to the run state machine. Only the pool's merge point feeds these in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Msg {
    /// Pool-level status from the orchestrator, or a worker's source failure.
    Notice(Notice),
    /// A worker pulled a candidate and is about to probe it.
    Checking {
        worker: WorkerId,
        candidate: Candidate,
    },
    /// A worker finished probing a candidate.
    Checked {
        worker: WorkerId,
        candidate: Candidate,
        outcome: ProbeOutcome,
        timestamp: String,
    },
}
