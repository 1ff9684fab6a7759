//! Identity resolution: stable dedup keys plus a name-similarity fallback
//! that tolerates mid-session display-name drift.

use crate::types::{ParticipantRecord, RawParticipant};

/// Build the stable dedup key for a wire participant.
///
/// Priority, first non-blank wins: visual fingerprint → meeting-assigned
/// participant id → account id → roster id → `{name}-{session_code}`.
/// Returns `None` when no identity field and no name is present; such a
/// participant is malformed and dropped upstream.
pub fn identity_key(raw: &RawParticipant, session_code: &str) -> Option<String> {
    for candidate in [
        &raw.fingerprint,
        &raw.participant_id,
        &raw.account_id,
        &raw.roster_id,
    ] {
        if let Some(value) = candidate.as_deref() {
            let value = value.trim();
            if !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }
    let name = raw.name.trim();
    if name.is_empty() {
        None
    } else {
        Some(format!("{name}-{session_code}"))
    }
}

/// Lowercase and collapse runs of whitespace to single spaces.
pub fn normalize_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Similarity test between two display names.
///
/// Hits on: exact normalized match, prefix containment in either
/// direction, or first-two-token equality when the shared prefix is at
/// least `min_prefix` characters long.
pub fn names_similar(a: &str, b: &str, min_prefix: usize) -> bool {
    let a = normalize_name(a);
    let b = normalize_name(b);
    if a.is_empty() || b.is_empty() {
        return false;
    }
    if a == b || a.starts_with(&b) || b.starts_with(&a) {
        return true;
    }
    if shared_prefix_len(&a, &b) < min_prefix {
        return false;
    }
    let a_tokens: Vec<&str> = a.split(' ').take(2).collect();
    let b_tokens: Vec<&str> = b.split(' ').take(2).collect();
    a_tokens.len() == 2 && a_tokens == b_tokens
}

fn shared_prefix_len(a: &str, b: &str) -> usize {
    a.chars()
        .zip(b.chars())
        .take_while(|(ca, cb)| ca == cb)
        .count()
}

/// Find an existing record whose display name is similar to `name`.
/// Keys are scanned in sorted order so the result is deterministic when
/// more than one record would match.
pub fn find_similar_key(
    records: &std::collections::HashMap<String, ParticipantRecord>,
    name: &str,
    min_prefix: usize,
) -> Option<String> {
    let mut keys: Vec<&String> = records.keys().collect();
    keys.sort();
    for key in keys {
        let record = &records[key];
        if names_similar(&record.display_name, name, min_prefix) {
            return Some(key.clone());
        }
    }
    None
}
