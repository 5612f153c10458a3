//! Error types shared by every catalog crate.

use thiserror::Error;

/// Result type alias using CatalogError.
pub type CatalogResult<T> = Result<T, CatalogError>;

/// Primary error type for catalog operations.
#[derive(Debug, Error)]
pub enum CatalogError {
    // === Query Errors ===
    /// A data kind outside the supported closed set.
    #[error("Type mismatch: unsupported data kind {0}")]
    TypeMismatch(String),

    /// A coordinate bound that does not reproduce any stored coordinate value.
    #[error("Value {value} not found in coordinate '{coordinate}'")]
    ValueNotFound { coordinate: String, value: f64 },

    /// A coordinate that names none of the variable's dimensions.
    #[error("Coordinate not found: {0}")]
    CoordinateNotFound(String),

    #[error("Variable not found: {0}")]
    VariableNotFound(String),

    #[error("Invalid bounds for '{coordinate}': {message}")]
    InvalidBounds { coordinate: String, message: String },

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Invalid watcher event: {0}")]
    InvalidEvent(String),

    // === Data Errors ===
    #[error("Dataset error: {0}")]
    Dataset(String),

    #[error("Failed to decode values: {0}")]
    Decode(String),

    #[error("Metadata extraction failed for '{path}': {reason}")]
    ExtractionFailure { path: String, reason: String },

    // === Storage Errors ===
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Catalog store error: {0}")]
    StoreFailure(String),

    #[error("Event handler failed: {0}")]
    Handler(String),

    // === Infrastructure Errors ===
    #[error("Job fault: {0}")]
    JobFault(String),

    #[error("Worker pool is closed")]
    PoolClosed,

    #[error("Watch error: {0}")]
    Watch(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CatalogError {
    /// Get the HTTP status code for this error.
    pub fn http_status_code(&self) -> u16 {
        match self {
            CatalogError::TypeMismatch(_)
            | CatalogError::ValueNotFound { .. }
            | CatalogError::InvalidBounds { .. }
            | CatalogError::InvalidPath(_)
            | CatalogError::InvalidEvent(_) => 400,

            CatalogError::CoordinateNotFound(_)
            | CatalogError::VariableNotFound(_)
            | CatalogError::FileNotFound(_) => 404,

            CatalogError::PoolClosed => 503,

            _ => 500,
        }
    }

    /// Whether the failure came from the request itself rather than the system.
    ///
    /// Callers use this to decide whether retrying the same request can help.
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.http_status_code())
    }
}

// Conversion from common error types
impl From<std::io::Error> for CatalogError {
    fn from(err: std::io::Error) -> Self {
        CatalogError::Internal(format!("I/O error: {}", err))
    }
}

impl From<serde_json::Error> for CatalogError {
    fn from(err: serde_json::Error) -> Self {
        CatalogError::Internal(format!("JSON error: {}", err))
    }
}
