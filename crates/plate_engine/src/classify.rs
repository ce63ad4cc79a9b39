use plate_core::Verdict;
use serde_json::Value;

use crate::{ProbeError, ProbeFailure, ProbeSettings};

/// Maps a successful response body to a verdict.
///
/// Pure over its inputs: the same body always yields the same verdict.
pub fn classify_body(body: &[u8], settings: &ProbeSettings) -> Result<Verdict, ProbeError> {
    let code = status_code(body, &settings.status_field)?;
    if code.eq_ignore_ascii_case(settings.available_code.trim()) {
        Ok(Verdict::Available)
    } else {
        Ok(Verdict::Unavailable)
    }
}

/// Reads the scalar at dotted path `field` from a JSON-ish body.
///
/// Bodies wrapped in non-JSON text (a callback, a prefix guard) are accepted
/// as long as one outermost object can be cut out of them.
pub fn status_code(body: &[u8], field: &str) -> Result<String, ProbeError> {
    let text = String::from_utf8_lossy(body);
    let document = parse_lenient(&text).ok_or_else(|| {
        ProbeError::new(ProbeFailure::MalformedBody, format!("not json: {}", excerpt(&text)))
    })?;

    let mut node = &document;
    for key in field.split('.') {
        node = node.get(key).ok_or_else(|| missing(field))?;
    }

    match node {
        Value::String(value) => Ok(value.trim().to_string()),
        Value::Number(value) => Ok(value.to_string()),
        Value::Bool(value) => Ok(value.to_string()),
        Value::Null => Err(missing(field)),
        Value::Array(_) | Value::Object(_) => Err(ProbeError::new(
            ProbeFailure::MalformedBody,
            format!("status field `{field}` is not a scalar"),
        )),
    }
}

fn parse_lenient(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Some(value);
    }
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&trimmed[start..=end]).ok()
}

fn missing(field: &str) -> ProbeError {
    ProbeError::new(
        ProbeFailure::MissingStatusField,
        format!("response has no `{field}` field"),
    )
}

fn excerpt(text: &str) -> String {
    const LIMIT: usize = 80;
    let trimmed = text.trim();
    if trimmed.chars().count() <= LIMIT {
        trimmed.to_string()
    } else {
        let head: String = trimmed.chars().take(LIMIT).collect();
        format!("{head}…")
    }
}
