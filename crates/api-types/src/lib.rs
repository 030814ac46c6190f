//! Wire types exchanged with the remote ingestion API.

use codetrack_core::domain::{Submission, UserId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Body of `POST {apiBase}/submissions`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionRecord {
    #[serde(flatten)]
    pub submission: Submission,
    pub user_id: UserId,
    /// Milliseconds since the Unix epoch, taken when the record is sent.
    pub timestamp: i64,
}

impl SubmissionRecord {
    #[must_use]
    pub fn new(submission: Submission, user_id: UserId, timestamp: i64) -> Self {
        Self {
            submission,
            user_id,
            timestamp,
        }
    }
}

/// Identifier the ingestion API assigned to a stored record, if it reported one.
///
/// Accepts `id` or `_id`, as a string or a number.
pub fn server_id_from_body(body: &Value) -> Option<String> {
    ["id", "_id"]
        .iter()
        .filter_map(|key| body.get(*key))
        .find_map(|value| match value {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    #[serde(default)]
    pub code: String,
    pub message: String,
}
