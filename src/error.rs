//! Error taxonomy shared by the pipeline and the binary
//!
//! Every failure a command can hit maps to exactly one [`ErrorKind`], and
//! each kind has a stable process exit code so scripts can branch on it.

use serde_json::Value;
use thiserror::Error;

use crate::api::{AuthError, TransportError};
use crate::resource::{Action, LookupError, NormalizeError};

/// Failure category, one exit code each
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Rejected before any network call
    LocalValidation,
    /// Missing credential or 401/403
    Auth,
    /// Server rejected the request body or query (400/422)
    RemoteValidation,
    NotFound,
    Conflict,
    /// Network failure, unexpected status, or unreadable response
    Transport,
}

impl ErrorKind {
    pub fn exit_code(self) -> u8 {
        match self {
            ErrorKind::LocalValidation => 2,
            ErrorKind::Auth => 3,
            ErrorKind::RemoteValidation => 4,
            ErrorKind::NotFound => 5,
            ErrorKind::Conflict => 6,
            ErrorKind::Transport => 7,
        }
    }
}

/// Input problems detected locally; none of these reach the network
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("unknown resource \"{0}\"")]
    UnknownResource(String),

    #[error("{resource} does not support {action} (supported: {supported})")]
    UnsupportedAction {
        resource: String,
        action: Action,
        supported: String,
    },

    #[error("\"{action}\" is not available under \"xbe {verb}\"; use \"xbe {expected} <resource> {action}\"")]
    VerbMismatch {
        verb: &'static str,
        expected: &'static str,
        action: Action,
    },

    #[error("unknown flag: --{flag} for {resource} {action}")]
    UnknownFlag {
        flag: String,
        resource: String,
        action: Action,
    },

    #[error("flag needs an argument: --{0}")]
    MissingValue(String),

    #[error("invalid value \"{value}\" for --{flag}: expected {expected}")]
    InvalidValue {
        flag: String,
        value: String,
        expected: String,
    },

    #[error("required flag(s) {} not set", quote_flags(.0))]
    MissingRequired(Vec<String>),

    #[error("at least one field to update is required")]
    NoUpdateFields,

    #[error("{0} requires a resource id")]
    MissingId(Action),

    #[error("unexpected argument \"{0}\"")]
    UnexpectedArgument(String),

    #[error("--{0}-type and --{0}-id must be set together")]
    IncompleteRelationship(String),

    #[error("invalid type \"{type_name}\" for --{flag}: expected one of {allowed}")]
    InvalidRelationshipType {
        flag: String,
        type_name: String,
        allowed: String,
    },

    #[error("--{0} requires an id")]
    EmptyRelationship(String),

    #[error("refusing to delete {resource} {id} without --confirm")]
    ConfirmationRequired { resource: String, id: String },

    #[error("flag --{0} is declared more than once")]
    AmbiguousFlag(String),

    #[error("invalid base URL \"{url}\": {reason}")]
    InvalidBaseUrl { url: String, reason: String },
}

fn quote_flags(flags: &[String]) -> String {
    flags
        .iter()
        .map(|f| format!("\"{f}\""))
        .collect::<Vec<_>>()
        .join(", ")
}

impl From<LookupError> for ValidationError {
    fn from(err: LookupError) -> Self {
        match err {
            LookupError::UnknownResource(name) => ValidationError::UnknownResource(name),
            LookupError::UnsupportedAction {
                resource,
                action,
                supported,
            } => ValidationError::UnsupportedAction {
                resource,
                action,
                supported: supported
                    .iter()
                    .map(|a| a.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
            },
        }
    }
}

/// Any failure surfaced to the user by a resource command
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Not Authorized: {0}")]
    Auth(String),

    #[error("{0}")]
    RemoteValidation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Transport(String),
}

impl CliError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CliError::Validation(_) => ErrorKind::LocalValidation,
            CliError::Auth(_) => ErrorKind::Auth,
            CliError::RemoteValidation(_) => ErrorKind::RemoteValidation,
            CliError::NotFound(_) => ErrorKind::NotFound,
            CliError::Conflict(_) => ErrorKind::Conflict,
            CliError::Transport(_) => ErrorKind::Transport,
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.kind().exit_code()
    }
}

impl From<LookupError> for CliError {
    fn from(err: LookupError) -> Self {
        CliError::Validation(err.into())
    }
}

impl From<AuthError> for CliError {
    fn from(err: AuthError) -> Self {
        CliError::Auth(err.to_string())
    }
}

impl From<TransportError> for CliError {
    fn from(err: TransportError) -> Self {
        CliError::Transport(err.to_string())
    }
}

impl From<NormalizeError> for CliError {
    fn from(err: NormalizeError) -> Self {
        CliError::Transport(format!("unexpected response: {err}"))
    }
}

/// Map a non-2xx response to its error kind.
///
/// JSON:API error objects are surfaced verbatim: each `detail` (or `title`
/// when there is no detail) appears in the message. Bodies without an
/// `errors` array are quoted as-is.
pub fn classify_status(status: u16, body: &str) -> CliError {
    let reason = reqwest::StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("Unknown Status");

    let details = error_details(body);
    let message = if details.is_empty() {
        let trimmed = body.trim();
        if trimmed.is_empty() {
            format!("API request failed: {status} {reason}")
        } else {
            format!("API request failed: {status} {reason}: {trimmed}")
        }
    } else {
        format!("API request failed: {status} {reason}: {}", details.join("; "))
    };

    match status {
        401 | 403 => CliError::Auth(message),
        400 | 422 => CliError::RemoteValidation(message),
        404 => CliError::NotFound(message),
        409 => CliError::Conflict(message),
        _ => CliError::Transport(message),
    }
}

fn error_details(body: &str) -> Vec<String> {
    let Ok(doc) = serde_json::from_str::<Value>(body) else {
        return Vec::new();
    };
    let Some(errors) = doc.get("errors").and_then(Value::as_array) else {
        return Vec::new();
    };

    errors
        .iter()
        .filter_map(|e| {
            e.get("detail")
                .and_then(Value::as_str)
                .or_else(|| e.get("title").and_then(Value::as_str))
                .map(str::to_string)
        })
        .collect()
}
