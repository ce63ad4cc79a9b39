use plate_core::{Candidate, MAX_CANDIDATE_LEN};

use crate::ProbeSettings;

/// Form fields for one availability check.
///
/// One positional field per character, padded with empty values up to
/// `MAX_CANDIDATE_LEN`, followed by the configured static fields.
pub fn probe_form(candidate: &Candidate, settings: &ProbeSettings) -> Vec<(String, String)> {
    let mut chars = candidate.chars();
    let mut fields = Vec::with_capacity(MAX_CANDIDATE_LEN + settings.extra_fields.len());
    for position in 0..MAX_CANDIDATE_LEN {
        let value = chars.next().map(String::from).unwrap_or_default();
        fields.push((format!("{}{position}", settings.char_field_prefix), value));
    }
    fields.extend(settings.extra_fields.iter().cloned());
    fields
}
