//! Error types for the migration library.

use thiserror::Error;

/// Main error type for migration operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Source object store could not be reached or rejected the credentials
    #[error("Source store unavailable: {0}")]
    SourceUnavailable(String),

    /// Bucket or key does not exist in the source store
    #[error("Object not found: {0}")]
    ObjectNotFound(String),

    /// Destination answered with a payload matching none of the known encodings
    #[error("Unrecognized destination response: {reason} (body: {body})")]
    UnrecognizedResponse { reason: String, body: String },

    /// Destination answered with an unexpected HTTP status
    #[error("Destination returned status {status}: {body}")]
    HttpStatus { status: u16, body: String },

    /// Blob retrieval exhausted its retry budget
    #[error("Blob retrieval failed after {attempts} attempts: {source}")]
    RetrievalFailed {
        attempts: u32,
        #[source]
        source: Box<MigrateError>,
    },

    /// Blob does not exist on the destination
    #[error("Blob not found: {0}")]
    BlobNotFound(String),

    /// Blob status probe returned something other than 200/404
    #[error("Status check failed with code {0}")]
    StatusCheckFailed(u16),

    /// Local index could not be written
    #[error("Failed to persist local index: {0}")]
    IndexPersistFailed(String),

    /// Request or input validation failed
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A single object failed during one phase of its transfer
    #[error("Transfer of {key} failed during {phase}: {source}")]
    Transfer {
        key: String,
        phase: &'static str,
        #[source]
        source: Box<MigrateError>,
    },

    /// HTTP transport error talking to the destination
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error (file operations, streamed bodies)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Batch was cancelled (SIGINT, etc.)
    #[error("Transfer cancelled")]
    Cancelled,
}

impl MigrateError {
    /// Wrap an error with the key and phase of the transfer it interrupted.
    pub fn transfer(key: impl Into<String>, phase: &'static str, source: MigrateError) -> Self {
        MigrateError::Transfer {
            key: key.into(),
            phase,
            source: Box::new(source),
        }
    }

    /// Create an UnrecognizedResponse error carrying the raw body.
    pub fn unrecognized(reason: impl Into<String>, body: &[u8]) -> Self {
        MigrateError::UnrecognizedResponse {
            reason: reason.into(),
            body: String::from_utf8_lossy(body).into_owned(),
        }
    }

    /// Process exit code for the launcher.
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrateError::Config(_) | MigrateError::Yaml(_) | MigrateError::Validation(_) => 2,
            MigrateError::SourceUnavailable(_) | MigrateError::ObjectNotFound(_) => 3,
            MigrateError::UnrecognizedResponse { .. }
            | MigrateError::HttpStatus { .. }
            | MigrateError::RetrievalFailed { .. }
            | MigrateError::BlobNotFound(_)
            | MigrateError::StatusCheckFailed(_)
            | MigrateError::Http(_) => 4,
            MigrateError::Transfer { .. } => 5,
            MigrateError::Cancelled => 130,
            _ => 1,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
