use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Network, DNS, connection reset, timeout: likely to succeed on retry.
    Transport,
    /// The function ran (or was rejected) and reported failure.
    Application,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport => f.write_str("transport"),
            Self::Application => f.write_str("application"),
        }
    }
}

/// Failure of a single remote call, as classified by the dispatcher.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{kind} error: {message}")]
pub struct RemoteError {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl RemoteError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Transport,
            message: message.into(),
            status: None,
        }
    }

    pub fn application(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Application,
            message: message.into(),
            status: None,
        }
    }

    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            return body.to_string();
        }
        let mut end = MAX_ERROR_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!(
            "{}... (truncated, {} total bytes)",
            &body[..end],
            body.len()
        )
    }

    /// A non-success HTTP response from the function endpoint.
    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        Self {
            kind: ErrorKind::Application,
            message: format!("Status {}: {}", status, Self::truncate_body(body)),
            status: Some(status.as_u16()),
        }
    }

    /// Default retry classification: transport failures only.
    pub fn is_transient(&self) -> bool {
        self.kind == ErrorKind::Transport
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(e: reqwest::Error) -> Self {
        // Body errors are connections dropped mid-response.
        if e.is_connect() || e.is_timeout() || e.is_request() || e.is_body() {
            Self::transport(e.to_string())
        } else {
            let mut err = Self::application(e.to_string());
            err.status = e.status().map(|s| s.as_u16());
            err
        }
    }
}

/// The retry budget was exhausted, or a terminal error stopped the loop.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{function} failed after {attempts} attempt(s): {last}")]
pub struct InvokeError {
    pub function: String,
    pub attempts: u32,
    #[source]
    pub last: RemoteError,
}
