//! Removal of raw request input from validation failures in response
//! events.
//!
//! A response event carries a `log` of request-scoped records. When a
//! payload fails validation, the record's `data.data._object` holds the
//! pre-validation input verbatim, which may include credentials or personal
//! data. Only that one field is removed; the rest of the validation error
//! (`name`, `details`, ...) is kept.

use crate::value::Value;

/// Record tags that mark a record as eligible for redaction. A record
/// qualifies when its `tags` contain at least one of these.
pub const FILTER_TAGS: [&str; 3] = ["error", "payload", "validation"];

const RESPONSE_EVENT: &str = "response";
const SENSITIVE_FIELD: &str = "_object";

/// Strip `log[i].data.data._object` from every qualifying record of a
/// response event, in place.
///
/// Returns `true` if any field was removed. Events of any other shape are
/// left untouched; missing or oddly-typed fields simply do not qualify.
pub fn redact(event: &Value) -> bool {
    let kind = event.get("event");
    if kind.as_ref().and_then(Value::as_str) != Some(RESPONSE_EVENT) {
        return false;
    }

    let Some(records) = event.get("log").and_then(|log| log.elements()) else {
        return false;
    };

    let mut removed = false;
    for record in records.iter().filter(|record| qualifies(record)) {
        let inner = record.get("data").and_then(|data| data.get("data"));
        if let Some(inner) = inner {
            removed |= inner.remove(SENSITIVE_FIELD).is_some();
        }
    }
    removed
}

fn qualifies(record: &Value) -> bool {
    record
        .get("tags")
        .and_then(|tags| tags.elements())
        .is_some_and(|tags| {
            tags.iter()
                .filter_map(Value::as_str)
                .any(|tag| FILTER_TAGS.contains(&tag))
        })
}
