//! The query-lifecycle error taxonomy, plus programmer-facing error types.
//!
//! Query failures are carried as *data* on [`QuerySnapshot`](crate::record::QuerySnapshot),
//! not as Rust `Error` values — a failed query is a normal outcome a caller
//! polls for, not an exceptional control-flow event. [`RegistryError`] is
//! reserved for the small set of conditions that really are programmer
//! errors.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Classification of why a query ended up in a non-success terminal state,
/// or why a single-shot effect call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Opening a connection to Snowflake failed.
    Connect,
    /// Submitting the statement for asynchronous execution failed.
    Submit,
    /// Snowflake reported the statement itself failed (a SQL error).
    Execution,
    /// The query exceeded its configured timeout before reaching a terminal state.
    Timeout,
    /// An unexpected internal condition: a panic, a logic bug, a joined task failure.
    Internal,
    /// The driver returned a result payload that could not be parsed into rows.
    ParseResult,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Connect => "connect",
            ErrorKind::Submit => "submit",
            ErrorKind::Execution => "execution",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Internal => "internal",
            ErrorKind::ParseResult => "parse_result",
        };
        f.write_str(s)
    }
}

/// A structured, serializable description of why a query failed.
///
/// Carried as data on a terminal [`QuerySnapshot`](crate::record::QuerySnapshot)
/// rather than returned as a Rust error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Which category of failure this is.
    pub kind: ErrorKind,
    /// Human-readable description, suitable for surfacing to a caller.
    pub message: String,
    /// Driver- or Snowflake-reported error code, when one is available.
    pub code: Option<String>,
}

impl ErrorInfo {
    /// Build an [`ErrorInfo`] with no driver-specific code.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            code: None,
        }
    }

    /// Build an [`ErrorInfo`] carrying a driver- or Snowflake-reported code.
    pub fn with_code(kind: ErrorKind, message: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            code: Some(code.into()),
        }
    }

    /// Shorthand for [`ErrorKind::Internal`], used when a `spawn_blocking`
    /// join fails or an invariant is violated.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "[{}:{}] {}", self.kind, code, self.message),
            None => write!(f, "[{}] {}", self.kind, self.message),
        }
    }
}

/// Programmer-facing errors: conditions that indicate a bug or a misuse of
/// the registry API, as opposed to a query outcome.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// A background task could not be joined (it panicked).
    #[error("background task panicked: {0}")]
    TaskPanicked(String),

    /// An operation was attempted on a registry that has already been closed.
    #[error("registry has been shut down")]
    AlreadyClosed,
}
