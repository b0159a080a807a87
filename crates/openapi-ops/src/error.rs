//! Error types for `unrelated-openapi-ops`.
//!
//! Schema resolution never produces these: unresolvable or cyclic references degrade to
//! permissive placeholder schemas. Everything below aborts one load or one call.

use serde_json::Value;
use thiserror::Error;

/// Main error type for `OpenAPI` operation loading and invocation.
#[derive(Error, Debug)]
pub enum OpenApiOpsError {
    /// Configuration errors (invalid config file, missing fields).
    #[error("Configuration error: {0}")]
    Config(String),

    /// `OpenAPI` errors (document structure, server URLs).
    #[error("OpenAPI error: {0}")]
    OpenApi(String),

    #[error("OpenAPI error: failed to fetch spec from '{url}': {message}")]
    SpecFetch { url: String, message: String },

    #[error("OpenAPI error: failed to read spec file '{path}': {source}")]
    SpecReadFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("OpenAPI error: failed to parse OpenAPI spec from '{location}': {source}")]
    SpecParse {
        location: String,
        #[source]
        source: serde_yaml::Error,
    },

    /// Neither an explicit base URL nor a document server URL is available.
    #[error("No base URL configured and none found in the OpenAPI servers list")]
    NoBaseUrl,

    /// The catalog has no operation with this identifier.
    #[error("Operation not found: {operation_id}")]
    OperationNotFound { operation_id: String },

    /// Every required parameter the caller omitted, reported together.
    #[error(
        "Missing required parameters for '{operation_id}': {}",
        missing.join(", ")
    )]
    MissingRequiredParameters {
        operation_id: String,
        /// Entries formatted as `name (location)`.
        missing: Vec<String>,
    },

    #[error(
        "Invalid value for parameter '{name}' ({location}) of '{operation_id}': \
         expected {expected}, got {value}"
    )]
    InvalidParameterType {
        operation_id: String,
        name: String,
        location: String,
        expected: String,
        value: String,
    },

    #[error("File not found for field '{field}': {path}")]
    FileNotFound { field: String, path: String },

    #[error("Path for field '{field}' is not a file: {path}")]
    NotAFile { field: String, path: String },

    #[error(
        "Invalid file path for field '{field}': \
         expected a string or array of strings, got {found}"
    )]
    InvalidFilePathType { field: String, found: String },

    /// Remote HTTP failure (non-2xx/3xx) or transport failure (no status).
    #[error("Request failed: {method} {url}: {message}")]
    RequestFailed {
        method: String,
        url: String,
        status: Option<u16>,
        status_text: Option<String>,
        body: Option<Value>,
        message: String,
    },

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing errors.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl OpenApiOpsError {
    /// `true` when the remote service could not be reached at all (no HTTP status).
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::RequestFailed { status: None, .. })
    }

    /// The HTTP status of a failed request, if the remote service answered.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::RequestFailed { status, .. } => *status,
            _ => None,
        }
    }
}

/// Result type alias for `OpenAPI` operation tooling.
pub type Result<T> = std::result::Result<T, OpenApiOpsError>;
