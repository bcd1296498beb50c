//! Error taxonomy shared by every component.
//!
//! Each variant is a deliberate veto surfaced verbatim to the caller; the
//! engine never retries or recovers on its own.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::guard::DenyReason;
use crate::models::TaskId;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("not in a taskctl workspace ({0} missing); run `taskctl init` first")]
    NotInitialized(PathBuf),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid id '{id}': expected {expected}")]
    InvalidId { id: String, expected: &'static str },

    #[error("dependency cycle: {}", format_path(.path))]
    Cycle { path: Vec<TaskId> },

    #[error("illegal transition {from} -> {to}: {reason}")]
    IllegalTransition {
        from: String,
        to: String,
        reason: String,
    },

    #[error("{id} is {status} and can no longer be modified")]
    AlreadyTerminal { id: String, status: String },

    #[error("mutation denied: {0}")]
    Denied(DenyReason),

    #[error("invalid value: {0}")]
    Invalid(String),

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt record {}: {source}", .path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl Error {
    pub fn illegal(
        from: impl ToString,
        to: impl ToString,
        reason: impl Into<String>,
    ) -> Self {
        Self::IllegalTransition {
            from: from.to_string(),
            to: to.to_string(),
            reason: reason.into(),
        }
    }

    pub fn terminal(id: impl ToString, status: impl ToString) -> Self {
        Self::AlreadyTerminal {
            id: id.to_string(),
            status: status.to_string(),
        }
    }

    /// Process exit code for the command-line surface.
    ///
    /// `Denied` uses 2 so that tool-call hooks treat a guard veto as a block.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Denied(_) => 2,
            Self::NotFound(_) => 3,
            Self::InvalidId { .. } => 4,
            Self::Cycle { .. } => 5,
            Self::IllegalTransition { .. } => 6,
            Self::AlreadyTerminal { .. } => 7,
            Self::NotInitialized(_)
            | Self::Invalid(_)
            | Self::Io { .. }
            | Self::Corrupt { .. } => 1,
        }
    }

    /// Whether the error reports a caller mistake or veto rather than a
    /// storage failure.
    pub fn is_user_error(&self) -> bool {
        !matches!(self, Self::Io { .. } | Self::Corrupt { .. })
    }
}

/// Attach the offending path to an I/O error.
pub(crate) fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> Error + '_ {
    move |source| Error::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn format_path(path: &[TaskId]) -> String {
    path.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}
