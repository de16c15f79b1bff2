//! Error types for the NDFC client.
//!
//! Every HTTP failure is captured as a structured [`NdfcError::Http`] with
//! method, path, status and (truncated) body, so callers can log something
//! legible and branch on the status class. Batch endpoints report partial
//! failure through [`BatchError`]. The `is_*` predicates keep working after
//! the error has been wrapped in `anyhow` context layers; use the free
//! functions at the bottom when you only hold an `anyhow::Error`.

use std::fmt;

use thiserror::Error;

/// How much of an upstream response body we keep around for diagnostics.
const BODY_SNIPPET_LEN: usize = 500;

#[derive(Debug, Error)]
pub enum NdfcError {
    /// Non-2xx response from the fabric manager.
    #[error("{method} {path} returned {status}: {body}")]
    Http {
        method: String,
        path: String,
        status: u16,
        body: String,
    },

    /// A batch endpoint reported one or more failed items.
    #[error("{0}")]
    Batch(BatchError),

    /// Request payload failed client-side validation; nothing was sent.
    #[error("invalid request: {0}")]
    Validation(String),

    /// Logical API namespace missing from the registry.
    #[error("unknown API namespace: {0}")]
    UnknownNamespace(String),

    /// Credentials rejected or no token obtainable.
    #[error("login failed for user {user}: {reason}")]
    Login { user: String, reason: String },

    /// Response arrived but did not parse as the expected shape.
    #[error("failed to decode response from {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    /// Transport-level failure (connect, TLS, timeout inside reqwest).
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

impl NdfcError {
    pub fn http(method: &str, path: &str, status: u16, body: &str) -> Self {
        Self::Http {
            method: method.to_string(),
            path: path.to_string(),
            status,
            body: truncate_body(body),
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Upstream response body, when one was captured.
    pub fn body(&self) -> Option<&str> {
        match self {
            Self::Http { body, .. } => Some(body),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    pub fn is_conflict(&self) -> bool {
        self.status() == Some(409)
    }

    pub fn is_bad_request(&self) -> bool {
        self.status() == Some(400)
    }

    /// The one retryable error class: the fabric manager already has a
    /// config-deploy running. Matched on the response body, not the status,
    /// because NDFC reports it as a 500.
    pub fn is_deploy_in_progress(&self) -> bool {
        match self {
            Self::Http { body, .. } => is_deploy_in_progress_message(body),
            _ => false,
        }
    }
}

/// Case-insensitive match for the "deploy already running" sentinel.
pub fn is_deploy_in_progress_message(body: &str) -> bool {
    let body = body.to_ascii_lowercase();
    if body.contains("deploy is already in progress") {
        return true;
    }
    (body.contains("deploy") || body.contains("config-deploy")) && body.contains("in progress")
}

pub(crate) fn truncate_body(body: &str) -> String {
    if body.len() <= BODY_SNIPPET_LEN {
        return body.to_string();
    }
    let mut end = BODY_SNIPPET_LEN;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &body[..end])
}

/// One failed item from a batch response.
#[derive(Debug, Clone)]
pub struct BatchFailure {
    pub name: Option<String>,
    pub id: Option<i64>,
    pub code: Option<String>,
    pub message: Option<String>,
}

/// A batch create/update that did not fully succeed.
///
/// `failed < total` means partial success: some items exist upstream and the
/// caller has to decide whether compensation is needed.
#[derive(Debug, Clone)]
pub struct BatchError {
    pub op: String,
    pub fabric: String,
    pub failed: u32,
    pub total: u32,
    pub code: Option<String>,
    pub message: Option<String>,
    pub failures: Vec<BatchFailure>,
}

impl BatchError {
    /// Some items succeeded, some failed.
    pub fn is_partial(&self) -> bool {
        self.failed > 0 && self.failed < self.total
    }

    pub fn is_total(&self) -> bool {
        self.total > 0 && self.failed >= self.total
    }
}

impl fmt::Display for BatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} on fabric {}: {}/{} items failed",
            self.op, self.fabric, self.failed, self.total
        )?;
        if let Some(code) = &self.code {
            write!(f, " (code {})", code)?;
        }
        if let Some(message) = &self.message {
            write!(f, ": {}", message)?;
        }
        if let Some(first) = self.failures.first() {
            write!(
                f,
                "; first failure: name={} id={} code={} message={}",
                first.name.as_deref().unwrap_or("-"),
                first.id.map(|i| i.to_string()).unwrap_or_else(|| "-".into()),
                first.code.as_deref().unwrap_or("-"),
                first.message.as_deref().unwrap_or("-"),
            )?;
        }
        Ok(())
    }
}

impl std::error::Error for BatchError {}

fn find_ndfc_error(err: &anyhow::Error) -> Option<&NdfcError> {
    err.chain().find_map(|cause| cause.downcast_ref::<NdfcError>())
}

/// `is_not_found` that sees through `anyhow` context wrapping.
pub fn error_is_not_found(err: &anyhow::Error) -> bool {
    find_ndfc_error(err).is_some_and(NdfcError::is_not_found)
}

pub fn error_is_conflict(err: &anyhow::Error) -> bool {
    find_ndfc_error(err).is_some_and(NdfcError::is_conflict)
}

pub fn error_is_bad_request(err: &anyhow::Error) -> bool {
    find_ndfc_error(err).is_some_and(NdfcError::is_bad_request)
}

pub fn error_is_deploy_in_progress(err: &anyhow::Error) -> bool {
    find_ndfc_error(err).is_some_and(NdfcError::is_deploy_in_progress)
}

/// Recover the upstream response body from a wrapped client error, for logs.
pub fn error_body(err: &anyhow::Error) -> Option<&str> {
    find_ndfc_error(err).and_then(NdfcError::body)
}
