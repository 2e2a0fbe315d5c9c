use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::ActiveSession;

// --- Router management API types ---

/// One row of a RouterOS menu, keyed by property name ("address", ".id", ...)
pub type RouterRow = serde_json::Map<String, Value>;

/// Router API failure. Services convert these into failure results.
#[derive(Debug, thiserror::Error)]
pub enum RouterApiError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("router API error {status}: {body}")]
    Status { status: u16, body: String },
    #[error("router rejected request: {0}")]
    Rejected(String),
    #[error("unexpected response: {0}")]
    Decode(String),
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ActiveSessionsResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub sessions: Vec<ActiveSession>,
}

/// Rows from a print response: either a bare array or `{"data": [...]}`
pub(crate) fn rows_from(body: Value) -> Result<Vec<RouterRow>, RouterApiError> {
    let items = match body {
        Value::Array(items) => items,
        Value::Object(mut obj) => match obj.remove("data") {
            Some(Value::Array(items)) => items,
            _ => return Err(RouterApiError::Decode("print response has no data array".to_string())),
        },
        other => return Err(RouterApiError::Decode(format!("print response is {}", other))),
    };
    Ok(items
        .into_iter()
        .filter_map(|item| match item {
            Value::Object(row) => Some(row),
            _ => None,
        })
        .collect())
}

/// Reject bodies carrying `"success": false`
pub(crate) fn check_success(body: &Value) -> Result<(), RouterApiError> {
    if body.get("success").and_then(Value::as_bool) == Some(false) {
        let message = body
            .get("message")
            .or_else(|| body.get("error"))
            .and_then(Value::as_str)
            .unwrap_or("unspecified error");
        return Err(RouterApiError::Rejected(message.to_string()));
    }
    Ok(())
}

/// RouterOS reports numbers as JSON numbers or as strings
pub fn row_f64(row: &RouterRow, key: &str) -> Option<f64> {
    match row.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('%').parse().ok(),
        _ => None,
    }
}

pub fn row_str<'a>(row: &'a RouterRow, key: &str) -> Option<&'a str> {
    row.get(key).and_then(Value::as_str)
}
