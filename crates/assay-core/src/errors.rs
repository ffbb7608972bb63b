//! Structured error types shared across assay crates.

use std::collections::BTreeMap;
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Structured payload attached to every [`AssayError`] variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Stable machine readable error code.
    pub code: String,
    /// Human readable diagnostic message.
    pub message: String,
    /// Contextual key value pairs (paths, plate ids, field names, etc.).
    #[serde(default)]
    pub context: BTreeMap<String, String>,
    /// Optional hint that may help the caller resolve the issue.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl ErrorInfo {
    /// Creates a new error payload with the provided code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            context: BTreeMap::new(),
            hint: None,
        }
    }

    /// Adds a context entry to the payload.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Sets a human readable hint for remediation.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

/// Canonical error type for the assay pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "family", content = "detail")]
pub enum AssayError {
    /// A reader or rule set could not recognise the file format.
    #[error("parse mismatch: {0}")]
    ParseMismatch(ErrorInfo),
    /// Required assay details are empty or still at their defaults.
    #[error("missing metadata: {0}")]
    MissingMetadata(ErrorInfo),
    /// The plate layout violates a structural invariant.
    #[error("inconsistent layout: {0}")]
    LayoutInconsistent(ErrorInfo),
    /// A fit could not be performed or did not converge.
    #[error("fit underdetermined: {0}")]
    FitUnderdetermined(ErrorInfo),
    /// A file could not be read or written, or an archive is corrupt.
    #[error("io failure: {0}")]
    Io(ErrorInfo),
    /// A well label or index lies outside the plate format.
    #[error("invalid well: {0}")]
    InvalidWell(ErrorInfo),
    /// Configuration, template or rule set errors.
    #[error("config error: {0}")]
    Config(ErrorInfo),
    /// Serialization and schema errors.
    #[error("serde error: {0}")]
    Serde(ErrorInfo),
}

impl Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code: {})", self.message, self.code)?;
        if !self.context.is_empty() {
            write!(f, " | context: [")?;
            for (idx, (key, value)) in self.context.iter().enumerate() {
                if idx > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{key}={value}")?;
            }
            write!(f, "]")?;
        }
        if let Some(hint) = &self.hint {
            write!(f, " | hint: {hint}")?;
        }
        Ok(())
    }
}

impl AssayError {
    /// Returns a reference to the payload describing the error.
    pub fn info(&self) -> &ErrorInfo {
        match self {
            AssayError::ParseMismatch(info)
            | AssayError::MissingMetadata(info)
            | AssayError::LayoutInconsistent(info)
            | AssayError::FitUnderdetermined(info)
            | AssayError::Io(info)
            | AssayError::InvalidWell(info)
            | AssayError::Config(info)
            | AssayError::Serde(info) => info,
        }
    }

    /// Shorthand for an [`AssayError::Io`] tagged with the offending path.
    pub fn io(code: &str, path: &std::path::Path, err: impl ToString) -> Self {
        AssayError::Io(
            ErrorInfo::new(code, err.to_string()).with_context("path", path.display().to_string()),
        )
    }

    /// Shorthand for an [`AssayError::Config`] without context.
    pub fn config(code: &str, message: impl Into<String>) -> Self {
        AssayError::Config(ErrorInfo::new(code, message))
    }
}
