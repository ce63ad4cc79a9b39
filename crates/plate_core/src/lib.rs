//! Plate core: pure data model and run state machine.
mod candidate;
mod event;
mod event_log;
mod msg;
mod state;
mod update;

pub use candidate::{
    Alphabet, Candidate, CandidateError, LengthBounds, DEFAULT_ALPHABET, MAX_CANDIDATE_LEN,
};
pub use event::{
    CheckResult, EventPayload, Notice, ProbeOutcome, SequenceId, StreamEvent, Verdict, WorkerId,
};
pub use event_log::{EventLog, OutOfOrder};
pub use msg::Msg;
pub use state::{RunOutcome, RunState, RunSummary};
pub use update::update;
