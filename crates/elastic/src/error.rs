//! Error types for repository operations.

// Error enum variant fields are self-documenting via their #[error(...)] messages
#![allow(missing_docs)]

use std::time::Duration;

use thiserror::Error;

use bingo_model::{MalformedStructure, UnsupportedKind};

/// The primary error type for all repository operations.
///
/// Every variant carries enough context (operation, index, identifier,
/// engine status) to diagnose a failure without re-running with extra
/// logging. None of these are retried internally; retry policy belongs
/// to the caller.
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// A builder option is missing or invalid.
    #[error("configuration error for option '{option}': {message}")]
    Config { option: String, message: String },

    /// The target record kind is outside the supported set.
    #[error("unsupported record kind: {kind}")]
    UnsupportedKind { kind: String },

    /// The engine rejected index creation, typically a schema conflict
    /// with an existing index of the same name.
    #[error("index creation failed for '{index}': {message}")]
    IndexCreation { index: String, message: String },

    /// A record could not be turned into a document, or a document back
    /// into a record.
    #[error("encoding failed for {kind} record: {message}")]
    Encoding {
        kind: String,
        /// Identifier of the offending record, when one was assigned.
        id: Option<String>,
        message: String,
    },

    /// An operation named an identifier the engine does not know.
    #[error("document not found: {index}/{id}")]
    NotFound { index: String, id: String },

    /// The configured deadline elapsed before the engine answered.
    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    /// An operation was invoked on a closed repository.
    #[error("repository is closed, {operation} rejected")]
    Closed { operation: String },

    /// The engine reported a failure not covered by a more specific
    /// variant.
    #[error("engine failure during {operation}: {message}")]
    Engine {
        operation: String,
        /// HTTP status, when the failure came with one.
        status: Option<u16>,
        message: String,
    },
}

/// Result type alias for repository operations.
pub type RepositoryResult<T> = Result<T, RepositoryError>;

impl From<UnsupportedKind> for RepositoryError {
    fn from(err: UnsupportedKind) -> Self {
        RepositoryError::UnsupportedKind { kind: err.name }
    }
}

impl From<MalformedStructure> for RepositoryError {
    fn from(err: MalformedStructure) -> Self {
        RepositoryError::Encoding {
            kind: err.kind.to_string(),
            id: None,
            message: err.message,
        }
    }
}

/// Maps a transport-level failure into the taxonomy. The transport's own
/// request timeout is armed at the operation deadline, so a transport
/// timeout is the deadline elapsing and reports as such.
pub(crate) fn transport_error(
    operation: &str,
    timeout: Duration,
    error: elasticsearch::Error,
) -> RepositoryError {
    if error.is_timeout() {
        return RepositoryError::Timeout {
            operation: operation.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        };
    }
    RepositoryError::Engine {
        operation: operation.to_string(),
        status: error.status_code().map(|s| s.as_u16()),
        message: error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bingo_model::RecordKind;

    #[test]
    fn config_error_names_the_option() {
        let err = RepositoryError::Config {
            option: "indexName".to_string(),
            message: "required option is missing".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "configuration error for option 'indexName': required option is missing"
        );
    }

    #[test]
    fn not_found_shows_index_and_id() {
        let err = RepositoryError::NotFound {
            index: "bingo-molecules".to_string(),
            id: "mol-1".to_string(),
        };
        assert_eq!(err.to_string(), "document not found: bingo-molecules/mol-1");
    }

    #[test]
    fn malformed_structure_converts_to_encoding() {
        let err: RepositoryError =
            MalformedStructure::new(RecordKind::Molecule, "empty payload").into();
        assert!(matches!(err, RepositoryError::Encoding { ref kind, .. } if kind == "molecule"));
        assert_eq!(
            err.to_string(),
            "encoding failed for molecule record: empty payload"
        );
    }

    #[test]
    fn unsupported_kind_converts_from_the_model_error() {
        let err: RepositoryError = UnsupportedKind {
            name: "peptide".to_string(),
        }
        .into();
        assert_eq!(err.to_string(), "unsupported record kind: peptide");
    }
}
