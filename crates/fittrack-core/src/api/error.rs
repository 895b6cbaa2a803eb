use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;
use thiserror::Error;

/// Keys the server uses for messages that don't belong to a single field.
const FORM_LEVEL_KEYS: [&str; 2] = ["non_field_errors", "detail"];

/// Field-keyed validation messages returned by the server on a 400.
///
/// Each field maps to one or more messages. Messages under
/// `non_field_errors` or `detail` apply to the whole form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerErrors {
    fields: BTreeMap<String, Vec<String>>,
}

impl ServerErrors {
    /// Parse a structured error body. Returns `None` unless the body is a
    /// JSON object whose values are strings or lists of strings.
    pub fn from_body(body: &str) -> Option<Self> {
        let value: Value = serde_json::from_str(body).ok()?;
        let object = value.as_object()?;
        if object.is_empty() {
            return None;
        }

        let mut fields = BTreeMap::new();
        for (key, value) in object {
            let messages = match value {
                Value::String(s) => vec![s.clone()],
                Value::Array(items) => items
                    .iter()
                    .map(|item| match item {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect(),
                Value::Null => continue,
                other => vec![other.to_string()],
            };
            fields.insert(key.clone(), messages);
        }

        if fields.is_empty() {
            None
        } else {
            Some(Self { fields })
        }
    }

    /// Messages for one field, joined for display.
    pub fn field(&self, name: &str) -> Option<String> {
        self.fields.get(name).map(|m| m.join(", "))
    }

    /// Messages that apply to the form as a whole.
    pub fn form_messages(&self) -> Vec<String> {
        FORM_LEVEL_KEYS
            .iter()
            .filter_map(|key| self.fields.get(*key))
            .flatten()
            .cloned()
            .collect()
    }

    /// Per-field messages, excluding form-level ones.
    pub fn field_messages(&self) -> impl Iterator<Item = (&str, String)> {
        self.fields
            .iter()
            .filter(|(key, _)| !FORM_LEVEL_KEYS.contains(&key.as_str()))
            .map(|(key, messages)| (key.as_str(), messages.join(", ")))
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl fmt::Display for ServerErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = self.form_messages();
        parts.extend(
            self.field_messages()
                .map(|(field, messages)| format!("{}: {}", field, messages)),
        );
        write!(f, "{}", parts.join("; "))
    }
}

/// Normalized error category, used by callers to decide how to display a
/// failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Structured server-side validation error, shown per field.
    Validation,
    /// Network failure or unexpected response, shown as one generic message.
    Transport,
    /// The token was rejected; the session has to end.
    Unauthorized,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Transport => "transport",
            ErrorKind::Unauthorized => "unauthorized",
        }
    }
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Request rejected: {0}")]
    Rejected(ServerErrors),

    #[error("Unauthorized - token may be invalid or expired")]
    Unauthorized,

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        match status.as_u16() {
            400 | 422 => match ServerErrors::from_body(body) {
                Some(errors) => ApiError::Rejected(errors),
                None => ApiError::InvalidResponse(format!(
                    "Status {}: {}",
                    status,
                    Self::truncate_body(body)
                )),
            },
            401 => ApiError::Unauthorized,
            403 => ApiError::AccessDenied(Self::truncate_body(body)),
            404 => ApiError::NotFound(Self::truncate_body(body)),
            429 => ApiError::RateLimited,
            500..=599 => ApiError::ServerError(Self::truncate_body(body)),
            _ => ApiError::InvalidResponse(format!(
                "Status {}: {}",
                status,
                Self::truncate_body(body)
            )),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::Rejected(_) => ErrorKind::Validation,
            ApiError::Unauthorized => ErrorKind::Unauthorized,
            _ => ErrorKind::Transport,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized)
    }
}
