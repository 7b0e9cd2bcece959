//! Failure model for a single fetch-and-execute attempt.
//!
//! The worker never inspects error types at runtime. The engine resolves a
//! failure into one of two variants when it happens, including the optional
//! nested cause and the reference code its detail was logged under.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ulid::Ulid;

/// Identifier under which a logged exception's full detail is stored.
///
/// Rendered as `YYYYmmddHHMMSS` followed by six lowercase hex digits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReferenceCode(String);

impl ReferenceCode {
    /// Generate a fresh reference code for the current instant.
    pub fn generate() -> Self {
        let suffix = Ulid::new().random() & 0x00ff_ffff;
        Self(format!("{}{:06x}", Utc::now().format("%Y%m%d%H%M%S"), suffix))
    }

    /// Wrap an existing code, e.g. one read back from a log.
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File name the detail is stored under.
    pub fn file_name(&self) -> String {
        format!("{}.txt", self.0)
    }
}

impl std::fmt::Display for ReferenceCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Underlying error wrapped by a domain failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureCause {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_code: Option<ReferenceCode>,
}

impl FailureCause {
    /// A cause without a reference code.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            reference_code: None,
        }
    }

    /// A cause with a freshly generated reference code.
    pub fn logged(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            reference_code: Some(ReferenceCode::generate()),
        }
    }

    pub fn with_reference_code(mut self, code: ReferenceCode) -> Self {
        self.reference_code = Some(code);
        self
    }
}

/// Tagged result of a failed fetch-and-execute attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExecutionFailure {
    /// An expected job-queue condition (backend unavailable, job failed, ...).
    #[error("{message}")]
    Domain {
        message: String,
        cause: Option<FailureCause>,
    },
    /// Anything else, e.g. a handler panic.
    #[error("{message}")]
    Unexpected {
        message: String,
        reference_code: Option<ReferenceCode>,
    },
}

impl ExecutionFailure {
    /// Domain failure with no nested cause.
    pub fn domain(message: impl Into<String>) -> Self {
        ExecutionFailure::Domain {
            message: message.into(),
            cause: None,
        }
    }

    /// Domain failure wrapping a cause.
    pub fn domain_with_cause(message: impl Into<String>, cause: FailureCause) -> Self {
        ExecutionFailure::Domain {
            message: message.into(),
            cause: Some(cause),
        }
    }

    /// Unexpected failure logged under a fresh reference code.
    pub fn unexpected(message: impl Into<String>) -> Self {
        ExecutionFailure::Unexpected {
            message: message.into(),
            reference_code: Some(ReferenceCode::generate()),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ExecutionFailure::Domain { message, .. } => message,
            ExecutionFailure::Unexpected { message, .. } => message,
        }
    }

    pub fn is_domain(&self) -> bool {
        matches!(self, ExecutionFailure::Domain { .. })
    }
}
