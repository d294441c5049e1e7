//! Error types for the detection core.
//!
//! Errors here cover construction and ingest paths (pattern compilation,
//! signed imports). The analysis entry points themselves never surface these
//! to callers: on internal failure they degrade to a structurally valid safe
//! result instead.

use thiserror::Error;

/// Warden core error type.
#[derive(Debug, Error)]
pub enum WardenError {
    /// A pattern expression failed to compile.
    #[error("invalid pattern '{id}': {reason}")]
    InvalidPattern {
        /// Id of the offending pattern.
        id: String,
        /// Compiler diagnostic.
        reason: String,
    },

    /// A pattern's stored integrity hash does not match its defining fields.
    #[error("integrity hash mismatch for pattern '{id}'")]
    IntegrityMismatch {
        /// Id of the tampered pattern.
        id: String,
    },

    /// A signed pattern batch failed signature verification.
    #[error("pattern batch signature mismatch: expected {expected}, got {supplied}")]
    SignatureMismatch {
        /// Digest computed over the batch.
        expected: String,
        /// Signature supplied with the batch.
        supplied: String,
    },

    /// A pattern id was not found in the registry.
    #[error("unknown pattern '{0}'")]
    UnknownPattern(String),

    /// A pattern group was not found in the registry.
    #[error("unknown pattern group '{0}'")]
    UnknownGroup(String),

    /// Batch serialization failed during signature verification.
    #[error("batch serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for warden-core operations.
pub type Result<T> = std::result::Result<T, WardenError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages_name_the_pattern() {
        let err = WardenError::IntegrityMismatch {
            id: "jb-001".into(),
        };
        assert_eq!(err.to_string(), "integrity hash mismatch for pattern 'jb-001'");
    }

    #[test]
    fn signature_mismatch_shows_both_digests() {
        let err = WardenError::SignatureMismatch {
            expected: "aa".into(),
            supplied: "bb".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("aa"));
        assert!(msg.contains("bb"));
    }
}
