use plate_core::{EventPayload, RunSummary, StreamEvent};

use super::config::OutputFormat;

/// One output line for `event`, or `None` when the format hides it.
pub(crate) fn render_event(
    event: &StreamEvent,
    format: OutputFormat,
    show_checking: bool,
) -> serde_json::Result<Option<String>> {
    match format {
        OutputFormat::JsonLines => serde_json::to_string(event).map(Some),
        OutputFormat::Table => Ok(table_row(event, show_checking)),
    }
}

fn table_row(event: &StreamEvent, show_checking: bool) -> Option<String> {
    let seq = event.sequence_id;
    match &event.payload {
        EventPayload::Notice(notice) => Some(format!("{seq:>6}  -- {notice}")),
        EventPayload::Checking { worker, candidate } => show_checking
            .then(|| format!("{seq:>6}  {:<7}  {:<11}  worker {worker}", candidate.as_str(), "...")),
        EventPayload::Result(result) => {
            let mut row = format!(
                "{seq:>6}  {:<7}  {:<11}  #{}",
                result.candidate.as_str(),
                result.verdict.to_string(),
                result.running_total_checked
            );
            if let Some(detail) = &result.error_detail {
                row.push_str("  ");
                row.push_str(detail);
            }
            Some(row)
        }
    }
}

pub(crate) fn summary_line(summary: &RunSummary) -> String {
    format!(
        "{:?}: {} checked, {} available, {} unavailable, {} errors",
        summary.outcome,
        summary.checked,
        summary.available.len(),
        summary.unavailable,
        summary.errors
    )
}
