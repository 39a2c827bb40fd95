//! Error types for chain example loading
//!
//! Every failure is fatal for the batch group that hit it: a malformed
//! manifest or example is an operator problem, not a transient fault.

use thiserror::Error;

/// Primary error type for all chain-egs operations
#[derive(Debug, Error)]
pub enum EgsError {
    // ========== Setup Errors ==========

    /// Loader or index misconfigured (no manifests, bad parameters)
    #[error("Configuration error: {reason}")]
    Configuration { reason: String },

    /// Manifest line is not exactly `key location`
    #[error("Parse error in {path} line {line}: {reason}")]
    Parse {
        path: String,
        line: usize,
        reason: String,
    },

    // ========== Storage Errors ==========

    /// Example stream or manifest could not be opened
    #[error("I/O error on {location}: {source}")]
    Io {
        location: String,
        #[source]
        source: std::io::Error,
    },

    /// Stream content does not match the expected record layout
    #[error("Deserialization failed: {reason}")]
    Deserialization { reason: String },

    // ========== Collation Errors ==========

    /// Missing or unexpected named input/output stream
    #[error("Schema error: {reason}")]
    Schema { reason: String },

    /// Row or dimension count invariant violated
    #[error("Shape mismatch: {reason}")]
    ShapeMismatch { reason: String },

    // ========== Runtime Errors ==========

    /// Data exhausted (end of epoch)
    #[error("Data exhausted for current epoch")]
    DataExhausted,

    /// Internal error
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl EgsError {
    pub(crate) fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    pub(crate) fn io(location: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            location: location.into(),
            source,
        }
    }

    pub(crate) fn deserialization(reason: impl Into<String>) -> Self {
        Self::Deserialization {
            reason: reason.into(),
        }
    }

    pub(crate) fn schema(reason: impl Into<String>) -> Self {
        Self::Schema {
            reason: reason.into(),
        }
    }

    pub(crate) fn shape(reason: impl Into<String>) -> Self {
        Self::ShapeMismatch {
            reason: reason.into(),
        }
    }

    /// Returns true if this error is retryable
    pub fn is_retryable(&self) -> bool {
        false
    }

    /// Returns true if this error indicates a corrupt or malformed example
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            EgsError::Deserialization { .. }
                | EgsError::Schema { .. }
                | EgsError::ShapeMismatch { .. }
        )
    }
}

/// Result type alias for chain-egs operations
pub type Result<T> = std::result::Result<T, EgsError>;
