//! Classification of Mandrill's per-recipient send results.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Statuses Mandrill reports for a recipient the message reached or will
/// reach.
pub const ACCEPTED_STATUSES: &[&str] = &["sent", "queued", "scheduled"];

/// One recipient's result as reported by Mandrill.
///
/// Every field is optional on the wire. A field of the wrong type is read as
/// absent; an entry that is not an object is kept as an empty record and
/// classified as rejected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderResult {
    /// Mandrill's id for this recipient's message.
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Recipient address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// `sent`, `queued`, `scheduled`, `rejected`, `invalid`, ...
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reject_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queued_reason: Option<String>,
}

impl ProviderResult {
    /// Whether this recipient counts as accepted.
    pub fn is_accepted(&self) -> bool {
        self.status
            .as_deref()
            .is_some_and(|status| ACCEPTED_STATUSES.contains(&status))
    }

    /// Read each field on its own, so one field of the wrong type blanks
    /// only that field.
    fn from_value(value: Value) -> Self {
        if !value.is_object() {
            tracing::warn!(entry = %value, "Malformed Mandrill result entry");
            return Self::default();
        }

        let field = |key: &str| match value.get(key) {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => {
                tracing::warn!(field = key, value = %other, "Ignoring non-string Mandrill result field");
                None
            }
        };

        Self {
            id: field("_id"),
            email: field("email"),
            status: field("status"),
            reject_reason: field("reject_reason"),
            queued_reason: field("queued_reason"),
        }
    }
}

/// The outcome of one send call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendOutcome {
    /// `_id` of the first result. Mandrill assigns one id per recipient; only
    /// the first is surfaced.
    pub message_id: Option<String>,
    pub accepted: Vec<ProviderResult>,
    pub rejected: Vec<ProviderResult>,
}

impl SendOutcome {
    /// Partition already-parsed results.
    pub fn from_results(results: Vec<ProviderResult>) -> Self {
        let message_id = results.first().and_then(|r| r.id.clone());
        let (accepted, rejected): (Vec<_>, Vec<_>) =
            results.into_iter().partition(ProviderResult::is_accepted);
        Self {
            message_id,
            accepted,
            rejected,
        }
    }

    /// Total number of results classified.
    pub fn len(&self) -> usize {
        self.accepted.len() + self.rejected.len()
    }

    /// True when the provider returned no results.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True when at least one recipient was rejected.
    pub fn has_rejections(&self) -> bool {
        !self.rejected.is_empty()
    }
}

/// Classify a raw Mandrill response body.
///
/// An array is classified element by element; a single object is treated as
/// a one-element array; anything else as an empty one.
///
/// ```
/// use mandrill_transport::classify;
/// use serde_json::json;
///
/// let outcome = classify(json!([
///     {"_id": "m1", "email": "a@x.com", "status": "sent"},
///     {"_id": "m2", "email": "b@x.com", "status": "invalid"}
/// ]));
/// assert_eq!(outcome.message_id.as_deref(), Some("m1"));
/// assert_eq!(outcome.accepted.len(), 1);
/// assert_eq!(outcome.rejected.len(), 1);
/// ```
pub fn classify(results: Value) -> SendOutcome {
    let entries = match results {
        Value::Array(items) => items,
        Value::Object(_) => vec![results],
        Value::Null => Vec::new(),
        other => {
            tracing::warn!(response = %other, "Unexpected Mandrill response shape");
            Vec::new()
        }
    };

    SendOutcome::from_results(entries.into_iter().map(ProviderResult::from_value).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_accepted_statuses() {
        for status in ["sent", "queued", "scheduled"] {
            let outcome = classify(json!([{"_id": "fake-id", "status": status}]));
            assert_eq!(outcome.accepted.len(), 1, "{status}");
            assert!(outcome.rejected.is_empty());
            assert_eq!(outcome.message_id.as_deref(), Some("fake-id"));
        }
    }

    #[test]
    fn test_rejected_statuses() {
        for status in ["rejected", "invalid", "bounced", "something-new"] {
            let outcome = classify(json!([{"_id": "fake-id", "status": status}]));
            assert!(outcome.accepted.is_empty(), "{status}");
            assert_eq!(outcome.rejected.len(), 1);
        }
    }

    #[test]
    fn test_one_of_each() {
        let outcome = classify(json!([{"status": "sent"}, {"status": "rejected"}]));
        assert_eq!(outcome.accepted.len(), 1);
        assert_eq!(outcome.rejected.len(), 1);
        assert_eq!(outcome.message_id, None);
    }

    #[test]
    fn test_empty_has_no_message_id() {
        let outcome = classify(json!([]));
        assert_eq!(outcome.message_id, None);
        assert!(outcome.is_empty());
        assert_eq!(classify(Value::Null), SendOutcome::default());
    }

    #[test]
    fn test_single_object_is_coerced() {
        let outcome = classify(json!({"_id": "solo", "status": "queued", "queued_reason": "attachments"}));
        assert_eq!(outcome.message_id.as_deref(), Some("solo"));
        assert_eq!(outcome.accepted[0].queued_reason.as_deref(), Some("attachments"));
    }

    #[test]
    fn test_malformed_entries_are_rejected() {
        let outcome = classify(json!([
            {"_id": "ok", "status": "sent"},
            {"_id": "no-status"},
            "garbage",
            {"_id": "bad-status", "status": 7},
            null
        ]));
        assert_eq!(outcome.len(), 5);
        assert_eq!(outcome.accepted.len(), 1);
        assert_eq!(outcome.rejected.len(), 4);
        assert_eq!(outcome.rejected[2].id.as_deref(), Some("bad-status"));
        assert!(outcome.has_rejections());
    }

    #[test]
    fn test_bad_field_type_blanks_only_that_field() {
        let outcome = classify(json!([{"_id": 42, "email": "a@x.com", "status": "sent"}]));
        assert_eq!(outcome.accepted.len(), 1);
        assert!(outcome.rejected.is_empty());
        assert_eq!(outcome.message_id, None);
        let result = &outcome.accepted[0];
        assert_eq!(result.email.as_deref(), Some("a@x.com"));
        assert_eq!(result.status.as_deref(), Some("sent"));
        assert_eq!(result.id, None);
    }

    #[test]
    fn test_partition_is_exhaustive_and_ordered() {
        let results = json!([
            {"_id": "1", "status": "sent"},
            {"_id": "2", "status": "rejected", "reject_reason": "hard-bounce"},
            {"_id": "3", "status": "scheduled"},
            {"_id": "4", "status": "invalid"}
        ]);
        let outcome = classify(results);
        let ids = |rs: &[ProviderResult]| rs.iter().map(|r| r.id.clone().unwrap()).collect::<Vec<_>>();
        assert_eq!(ids(&outcome.accepted), vec!["1", "3"]);
        assert_eq!(ids(&outcome.rejected), vec!["2", "4"]);
        assert_eq!(outcome.rejected[0].reject_reason.as_deref(), Some("hard-bounce"));
        assert_eq!(outcome.message_id.as_deref(), Some("1"));
    }

    #[test]
    fn test_scalar_response_is_empty() {
        assert!(classify(json!("ok")).is_empty());
    }
}
