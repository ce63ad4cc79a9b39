use crate::{CheckResult, EventPayload, Msg, RunState, StreamEvent};

/// Pure update function: folds one message into the run state and returns
/// the stream event it produces.
pub fn update(mut state: RunState, msg: Msg) -> (RunState, StreamEvent) {
    let payload = match msg {
        Msg::Notice(notice) => EventPayload::Notice(notice),
        Msg::Checking { worker, candidate } => {
            state.begin_check(worker, candidate.clone());
            EventPayload::Checking { worker, candidate }
        }
        Msg::Checked {
            worker,
            candidate,
            outcome,
            timestamp,
        } => {
            let running_total_checked = state.finish_check(worker, &candidate, outcome.verdict);
            EventPayload::Result(CheckResult {
                candidate,
                verdict: outcome.verdict,
                timestamp,
                error_detail: outcome.error_detail,
                running_total_checked,
                worker,
            })
        }
    };

    let event = state.stamp(payload);
    (state, event)
}
