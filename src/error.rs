//! Error types for telemetry decoding.
//!
//! Every fallible operation in the crate returns [`TelemetryError`]. The
//! polling surface (`get`, `get_all`, `session_info`) converts these into
//! absence so callers reading at tick rate never have to handle a transient
//! gap as a failure; the `Result`-returning twins (`value`, `record`, ...)
//! expose the exact kind for diagnostics.
//!
//! ## Error Categories
//!
//! - **Layout Errors**: a region or file whose header or descriptor table
//!   cannot describe usable telemetry ([`TelemetryError::MalformedLayout`])
//! - **Lookup Errors**: unknown variable names and out-of-range replay records
//! - **Session Text Errors**: missing sections and text that will not parse
//! - **Memory Errors**: reads past the end of a region
//! - **Platform Errors**: shared memory and window-message failures on Windows
//!
//! ## Recovery and Retry
//!
//! ```rust
//! use pitlane::TelemetryError;
//!
//! let error = TelemetryError::connection_failed("simulator not running");
//! if error.is_retryable() {
//!     for suggestion in error.recovery_suggestions() {
//!         println!("  - {}", suggestion);
//!     }
//! }
//! ```

use std::path::PathBuf;
use thiserror::Error;

#[cfg(windows)]
use windows_core as core;

/// Result type alias for telemetry operations.
pub type Result<T, E = TelemetryError> = std::result::Result<T, E>;

/// Main error type for telemetry operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TelemetryError {
    #[error("Failed to connect to simulator: {reason}")]
    Connection {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Replay file error: {path}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed telemetry layout: {reason}")]
    MalformedLayout { reason: String },

    #[error("Memory access out of bounds at offset {offset:#x} (len {len}, region {available})")]
    Memory { offset: usize, len: usize, available: usize },

    #[error("Parse error in {context}: {details}")]
    Parse { context: String, details: String },

    #[error("Field '{field}' not found in telemetry data")]
    FieldNotFound { field: String },

    #[error("Record index {index} out of range (file has {len} records)")]
    IndexOutOfRange { index: i128, len: usize },

    #[error("Session section '{section}' not found")]
    SectionNotFound { section: String },

    #[error("Malformed session text in '{section}': {details}")]
    MalformedText { section: String, details: String },

    #[error("Type conversion error: {details}")]
    TypeConversion { details: String },

    #[error("{feature} is only available on {required_platform}")]
    UnsupportedPlatform { feature: String, required_platform: String },

    #[error("Windows API error: {operation}")]
    #[cfg(windows)]
    WindowsApi {
        operation: String,
        #[source]
        source: core::Error,
    },

    #[error("Buffer operation failed: {context}")]
    Buffer { context: String, buffer_index: Option<usize> },
}

impl TelemetryError {
    /// Returns whether this error is potentially recoverable through retry.
    ///
    /// Nothing in the crate retries on its own; this only classifies whether
    /// the next poll has a chance of succeeding.
    pub fn is_retryable(&self) -> bool {
        match self {
            TelemetryError::Connection { .. } => true,
            TelemetryError::Buffer { .. } => true,
            TelemetryError::SectionNotFound { .. } => true,
            TelemetryError::MalformedText { .. } => true,
            TelemetryError::Memory { .. } => false,
            TelemetryError::File { .. } => false,
            TelemetryError::MalformedLayout { .. } => false,
            TelemetryError::Parse { .. } => false,
            TelemetryError::FieldNotFound { .. } => false,
            TelemetryError::IndexOutOfRange { .. } => false,
            TelemetryError::TypeConversion { .. } => false,
            TelemetryError::UnsupportedPlatform { .. } => false,
            #[cfg(windows)]
            TelemetryError::WindowsApi { .. } => true,
        }
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            TelemetryError::Connection { .. } => vec![
                "Ensure the simulator is running",
                "Check permissions for shared memory access",
                "Try again once a session has loaded",
            ],
            TelemetryError::File { .. } => vec![
                "Check file exists and is readable",
                "Check file permissions",
            ],
            TelemetryError::MalformedLayout { .. } => vec![
                "Verify the region or file was written by a compatible simulator",
                "Re-open once the simulator has finished initializing the region",
            ],
            TelemetryError::Memory { .. } => vec![
                "Check memory access bounds",
                "Verify the region is still mapped",
            ],
            TelemetryError::Parse { .. } => vec![
                "Check data format compatibility",
                "Verify source data integrity",
            ],
            TelemetryError::FieldNotFound { .. } => vec![
                "Check field name spelling",
                "Some fields only exist while the driver is in a session",
                "Use optional field access patterns",
            ],
            TelemetryError::IndexOutOfRange { .. } => vec![
                "Use record_count() to bound record indices",
            ],
            TelemetryError::SectionNotFound { .. } => vec![
                "Check the section name spelling",
                "Poll again after the session info update counter advances",
            ],
            TelemetryError::MalformedText { .. } => vec![
                "Poll again after the session info update counter advances",
                "Add the offending key to the quoted key list",
            ],
            TelemetryError::TypeConversion { .. } => vec![
                "Check data type compatibility",
                "Use Value accessors for loosely typed reads",
            ],
            TelemetryError::UnsupportedPlatform { .. } => vec![
                "Use platform-appropriate features",
                "Use replay files for cross-platform analysis",
            ],
            #[cfg(windows)]
            TelemetryError::WindowsApi { .. } => vec![
                "Check Windows API permissions",
                "Verify system resources availability",
            ],
            TelemetryError::Buffer { .. } => vec![
                "Check buffer synchronization",
                "Retry the freeze on the next tick",
            ],
        }
    }

    /// Helper constructor for file errors with path context.
    pub fn file_error(path: PathBuf, source: std::io::Error) -> Self {
        TelemetryError::File { path, source }
    }

    /// Helper constructor for connection errors.
    pub fn connection_failed(reason: impl Into<String>) -> Self {
        TelemetryError::Connection { reason: reason.into(), source: None }
    }

    /// Helper constructor for layout errors.
    pub fn malformed_layout(reason: impl Into<String>) -> Self {
        TelemetryError::MalformedLayout { reason: reason.into() }
    }

    /// Helper constructor for out-of-bounds reads.
    pub fn memory_access_error(offset: usize, len: usize, available: usize) -> Self {
        TelemetryError::Memory { offset, len, available }
    }

    /// Helper constructor for unknown variable names.
    pub fn field_not_found(field: impl Into<String>) -> Self {
        TelemetryError::FieldNotFound { field: field.into() }
    }

    /// Helper constructor for Windows API errors.
    #[cfg(windows)]
    pub fn windows_api_error(operation: impl Into<String>, source: core::Error) -> Self {
        TelemetryError::WindowsApi { operation: operation.into(), source }
    }

    /// Helper constructor for buffer operation errors.
    pub fn buffer_operation_error(context: impl Into<String>, buffer_index: Option<usize>) -> Self {
        TelemetryError::Buffer { context: context.into(), buffer_index }
    }

    /// Helper constructor for unsupported platform errors.
    pub fn unsupported_platform(
        feature: impl Into<String>,
        required_platform: impl Into<String>,
    ) -> Self {
        TelemetryError::UnsupportedPlatform {
            feature: feature.into(),
            required_platform: required_platform.into(),
        }
    }
}

impl From<std::io::Error> for TelemetryError {
    fn from(err: std::io::Error) -> Self {
        TelemetryError::File { path: PathBuf::from("<unknown>"), source: err }
    }
}

#[cfg(windows)]
impl From<core::Error> for TelemetryError {
    fn from(err: core::Error) -> Self {
        TelemetryError::WindowsApi {
            operation: "Unknown Windows operation".to_string(),
            source: err,
        }
    }
}
