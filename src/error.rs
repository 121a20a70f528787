//! Error types for the API client and the schema converter.
//!
//! The two components fail independently and never wrap each other's
//! errors. Nothing here is retried: every error is terminal for the call
//! that produced it.

use std::fmt;

use serde_json::Value;
use thiserror::Error;

use crate::api::Method;
use crate::rows::ColumnType;

// ---

/// Errors returned by [`PurpleAirClient`](crate::api::PurpleAirClient).
#[derive(Debug, Error)]
pub enum ApiError {
    /// The client was constructed with an empty API key.
    #[error("API key must be provided")]
    MissingApiKey,

    /// The call was rejected before anything was sent.
    #[error("invalid request: {0}")]
    InvalidRequest(&'static str),

    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),

    /// Transport failure, non-2xx status, or undecodable body.
    #[error(transparent)]
    Remote(#[from] RemoteApiError),
}

impl ApiError {
    /// The remote error, if the failure came back from the wire.
    pub fn remote(&self) -> Option<&RemoteApiError> {
        match self {
            ApiError::Remote(e) => Some(e),
            _ => None,
        }
    }
}

/// Label distinguishing the ways a request can fail after it was built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteErrorKind {
    /// Connection, timeout, or body read failure.
    Transport,
    /// Status outside `[200, 300)`.
    Status,
    /// A 2xx JSON response whose body would not decode.
    Decode,
}

impl fmt::Display for RemoteErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // ---
        let label = match self {
            RemoteErrorKind::Transport => "Transport error",
            RemoteErrorKind::Status => "Error",
            RemoteErrorKind::Decode => "Non-JSON response",
        };
        f.write_str(label)
    }
}

/// Body captured from a failed response.
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorBody {
    Json(Value),
    Text(String),
}

impl ErrorBody {
    /// Decode as JSON when possible, otherwise keep the raw text.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        // ---
        match serde_json::from_slice(bytes) {
            Ok(value) => ErrorBody::Json(value),
            Err(_) => ErrorBody::Text(String::from_utf8_lossy(bytes).into_owned()),
        }
    }
}

impl fmt::Display for ErrorBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorBody::Json(value) => write!(f, "{value}"),
            ErrorBody::Text(text) => f.write_str(text),
        }
    }
}

/// A request that reached (or tried to reach) the remote service and failed.
#[derive(Debug, Error)]
#[error("{kind} {} {method} {url}: {body}", status_label(.status))]
pub struct RemoteApiError {
    pub kind: RemoteErrorKind,
    pub status: Option<u16>,
    pub method: Method,
    pub url: String,
    pub body: ErrorBody,
}

fn status_label(status: &Option<u16>) -> String {
    status.map_or_else(|| "-".to_string(), |s| s.to_string())
}

// ---

/// Errors raised while validating records or moving fields between records
/// and storage rows.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchemaError {
    /// A record failed validation. `field` is a path such as `answers[2].key`.
    #[error("validation failed for `{field}`: {constraint}")]
    Validation { field: String, constraint: String },

    /// Child rows cannot be linked before the parent has an identifier.
    #[error("{reason}")]
    Precomposition { reason: &'static str },

    #[error("table `{table}` has no column `{column}`")]
    UnknownColumn { table: &'static str, column: String },

    #[error("column `{table}.{column}` expects {expected}")]
    ColumnType {
        table: &'static str,
        column: String,
        expected: ColumnType,
    },
}

impl SchemaError {
    pub(crate) fn validation(field: impl Into<String>, constraint: impl Into<String>) -> Self {
        SchemaError::Validation {
            field: field.into(),
            constraint: constraint.into(),
        }
    }

    /// Prefix the field path of a validation error, e.g. `key` → `answers[1].key`.
    pub(crate) fn within(self, prefix: &str) -> Self {
        // ---
        match self {
            SchemaError::Validation { field, constraint } => SchemaError::Validation {
                field: format!("{prefix}.{field}"),
                constraint,
            },
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn remote_error_message_names_status_method_and_url() {
        // ---
        let err = RemoteApiError {
            kind: RemoteErrorKind::Status,
            status: Some(404),
            method: Method::Get,
            url: "https://api.purpleair.com/v1/groups/9".to_string(),
            body: ErrorBody::Text("Not Found".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "Error 404 GET https://api.purpleair.com/v1/groups/9: Not Found"
        );
    }

    #[test]
    fn error_body_prefers_json() {
        // ---
        let body = ErrorBody::from_bytes(br#"{"error":"NotFoundError"}"#);
        assert_eq!(
            body,
            ErrorBody::Json(serde_json::json!({"error": "NotFoundError"}))
        );

        let body = ErrorBody::from_bytes(b"<html>bad gateway</html>");
        assert_eq!(body, ErrorBody::Text("<html>bad gateway</html>".to_string()));
    }

    #[test]
    fn within_prefixes_validation_paths_only() {
        // ---
        let err = SchemaError::validation("key", "must not be empty").within("answers[1]");
        assert_eq!(err, SchemaError::validation("answers[1].key", "must not be empty"));

        let other = SchemaError::Precomposition { reason: "x" };
        assert_eq!(other.clone().within("answers[0]"), other);
    }
}
