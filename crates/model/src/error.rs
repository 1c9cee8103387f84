//! Error types for the domain model.

use thiserror::Error;

use crate::record::RecordKind;

/// A structure payload the toolkit refused to accept.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("malformed {kind} structure: {message}")]
pub struct MalformedStructure {
    /// The kind the payload was checked against.
    pub kind: RecordKind,
    /// What the toolkit objected to.
    pub message: String,
}

impl MalformedStructure {
    /// Convenience constructor.
    pub fn new(kind: RecordKind, message: impl Into<String>) -> Self {
        MalformedStructure {
            kind,
            message: message.into(),
        }
    }
}

/// A record kind outside the supported set.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unsupported record kind: {name}")]
pub struct UnsupportedKind {
    /// The kind tag that failed to resolve.
    pub name: String,
}
