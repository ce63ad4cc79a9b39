use std::fmt;

use serde::{Deserialize, Serialize};

use crate::Candidate;

pub type WorkerId = usize;
pub type SequenceId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Available,
    Unavailable,
    Error,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Available => write!(f, "AVAILABLE"),
            Verdict::Unavailable => write!(f, "UNAVAILABLE"),
            Verdict::Error => write!(f, "ERROR"),
        }
    }
}

/// What a prober reports for one candidate, before the pool stamps it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeOutcome {
    pub verdict: Verdict,
    pub error_detail: Option<String>,
}

impl ProbeOutcome {
    pub fn available() -> Self {
        Self {
            verdict: Verdict::Available,
            error_detail: None,
        }
    }

    pub fn unavailable() -> Self {
        Self {
            verdict: Verdict::Unavailable,
            error_detail: None,
        }
    }

    pub fn error(detail: impl Into<String>) -> Self {
        Self {
            verdict: Verdict::Error,
            error_detail: Some(detail.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    pub candidate: Candidate,
    pub verdict: Verdict,
    /// RFC 3339 time at which the probe completed.
    pub timestamp: String,
    pub error_detail: Option<String>,
    /// Pool-wide count of results emitted so far, this one included.
    pub running_total_checked: u64,
    pub worker: WorkerId,
}

/// Pool-level status, never tied to a candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notice {
    Initializing { sessions: usize },
    Ready { workers: usize },
    SourceFailed { worker: WorkerId, detail: String },
    /// Last event of a run that stopped because its source failed.
    SourceAborted { detail: String },
    PoolInitFailed { attempted: usize, detail: String },
    Cancelled,
}

impl Notice {
    /// Whether this notice ends the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Notice::SourceAborted { .. } | Notice::PoolInitFailed { .. } | Notice::Cancelled
        )
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::Initializing { sessions } => write!(f, "initializing {sessions} sessions"),
            Notice::Ready { workers } => {
                write!(f, "sessions ready, starting checks ({workers} workers)")
            }
            Notice::SourceFailed { worker, detail } => {
                write!(f, "candidate source failed in worker {worker}: {detail}")
            }
            Notice::SourceAborted { detail } => {
                write!(f, "run stopped, candidate source failed: {detail}")
            }
            Notice::PoolInitFailed { attempted, detail } => {
                write!(f, "all {attempted} sessions failed to initialize: {detail}")
            }
            Notice::Cancelled => write!(f, "run cancelled"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum EventPayload {
    Notice(Notice),
    /// Provisional marker emitted when a worker starts probing a candidate.
    Checking {
        worker: WorkerId,
        candidate: Candidate,
    },
    Result(CheckResult),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamEvent {
    pub sequence_id: SequenceId,
    pub payload: EventPayload,
}

impl StreamEvent {
    pub fn as_result(&self) -> Option<&CheckResult> {
        match &self.payload {
            EventPayload::Result(result) => Some(result),
            _ => None,
        }
    }

    pub fn as_notice(&self) -> Option<&Notice> {
        match &self.payload {
            EventPayload::Notice(notice) => Some(notice),
            _ => None,
        }
    }
}
