//! Keeps tool responses under the configured payload ceiling.

use serde::Serialize;
use tagscope_models::read::ReadResponse;
use tagscope_models::resolution::ResolutionResult;

pub const READ_GUIDANCE: &str = "Response exceeded the payload limit and was truncated. \
Narrow the time range, request fewer tags, or lower page_size.";

pub const RESOLVE_GUIDANCE: &str = "candidate list truncated to fit the payload limit; \
lower top_k or add site/equipment words to the query";

/// Serialized JSON size in bytes.
pub fn encoded_len<T: Serialize>(value: &T) -> usize {
    serde_json::to_vec(value).map(|v| v.len()).unwrap_or(usize::MAX)
}

/// Drop trailing items from the list selected by `items` until `value`
/// serializes within `max_bytes`. Returns how many items were removed.
pub fn fit_to_limit<T, I, F>(value: &mut T, max_bytes: usize, mut items: F) -> usize
where
    T: Serialize,
    I: Clone,
    F: FnMut(&mut T) -> &mut Vec<I>,
{
    if encoded_len(value) <= max_bytes {
        return 0;
    }
    let mut all = std::mem::take(items(value));
    let total = all.len();

    // Largest prefix that fits; an empty list is the floor.
    let (mut lo, mut hi) = (0usize, total);
    while lo < hi {
        let mid = (lo + hi + 1) / 2;
        *items(value) = all[..mid].to_vec();
        if encoded_len(value) <= max_bytes {
            lo = mid;
        } else {
            hi = mid - 1;
        }
    }
    all.truncate(lo);
    *items(value) = all;
    total - lo
}

/// Notes kept verbatim on an oversized response; the rest are summarized.
const MAX_NOTES: usize = 20;

/// Collapse notes past `MAX_NOTES` into one summary line.
fn cap_notes(notes: &mut Vec<String>) {
    if notes.len() > MAX_NOTES {
        let dropped = notes.len() - (MAX_NOTES - 1);
        notes.truncate(MAX_NOTES - 1);
        notes.push(format!("{dropped} more notes omitted"));
    }
}

/// Trim a read response to `max_bytes`, flagging the truncation. Points go
/// first, then trailing notes. The truncation note is kept at the front.
pub fn fit_read(response: &mut ReadResponse, max_bytes: usize) {
    if encoded_len(response) <= max_bytes {
        return;
    }
    let total = response.data.len();
    response.truncated = true;
    response.guidance = Some(READ_GUIDANCE.to_string());
    response
        .notes
        .insert(0, format!("{total} points available before truncation"));
    cap_notes(&mut response.notes);
    fit_to_limit(response, max_bytes, |r| &mut r.data);
    response.count = response.data.len();
    fit_to_limit(response, max_bytes, |r| &mut r.notes);
}

/// Trim a resolution result to `max_bytes`. Lowest-ranked candidates go first,
/// then trailing notes.
pub fn fit_resolution(result: &mut ResolutionResult, max_bytes: usize) {
    if encoded_len(result) <= max_bytes {
        return;
    }
    result.notes.insert(0, RESOLVE_GUIDANCE.to_string());
    cap_notes(&mut result.notes);
    fit_to_limit(result, max_bytes, |r| &mut r.candidates);
    fit_to_limit(result, max_bytes, |r| &mut r.notes);
}
