//! Parsing of `Type/id` style references found in resource bodies.

use crate::model::ResourceType;

pub const PATIENT: &str = "Patient";
pub const ENCOUNTER: &str = "Encounter";
pub const OBSERVATION: &str = "Observation";
pub const PROCEDURE: &str = "Procedure";
pub const MEDICATION_REQUEST: &str = "MedicationRequest";
pub const MEDICATION_STATEMENT: &str = "MedicationStatement";

const MAX_ID_LEN: usize = 64;

/// Extracts the id from a reference to `expected`.
///
/// Accepts relative (`Procedure/123`), absolute (`https://host/fhir/Procedure/123`)
/// and versioned (`Procedure/123/_history/2`) forms. Returns `None` for
/// contained (`#x`) references, other types, and malformed ids.
pub fn parse_reference(raw: &str, expected: &ResourceType) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() || raw.starts_with('#') {
        return None;
    }

    let mut segments: Vec<&str> = raw.split('/').filter(|s| !s.is_empty()).collect();
    if let Some(history) = segments.iter().position(|s| *s == "_history") {
        segments.truncate(history);
    }

    let (id, resource_type) = match segments.as_slice() {
        [.., resource_type, id] => (*id, *resource_type),
        _ => return None,
    };

    if resource_type != expected.as_str() || !is_valid_id(id) {
        return None;
    }
    Some(id.to_owned())
}

pub fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_ID_LEN
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
}
