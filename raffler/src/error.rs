//! Error types for `raffler`
//!
//! One enum per concern, aggregated by [`RafflerError`] which also maps
//! every failure onto a process exit code.

use std::path::PathBuf;

use raffler_core::{EntityId, ValidationError};
use thiserror::Error;

// ============================================================================
// Exit Codes
// ============================================================================

/// Exit codes for `raffler` CLI operations.
///
/// These codes follow Unix conventions.
pub struct ExitCode;

impl ExitCode {
    /// Successful execution
    pub const SUCCESS: i32 = 0;

    /// General error
    pub const ERROR: i32 = 1;

    /// Configuration error (invalid YAML, validation failure)
    pub const CONFIG_ERROR: i32 = 2;

    /// I/O error (file not found, permission denied)
    pub const IO_ERROR: i32 = 3;

    /// Scheduler error (rejected operation, unknown entity)
    pub const SCHEDULER_ERROR: i32 = 5;

    /// Entity store error (unreadable data directory, failed write)
    pub const STORAGE_ERROR: i32 = 6;

    /// Usage error (invalid arguments, missing required options)
    pub const USAGE_ERROR: i32 = 64;

    /// Interrupted by SIGINT (Ctrl+C)
    pub const INTERRUPTED: i32 = 130;

    /// Terminated by SIGTERM
    pub const TERMINATED: i32 = 143;
}

// ============================================================================
// Top-Level Error
// ============================================================================

/// Top-level error type for `raffler` operations.
///
/// This enum aggregates all domain-specific errors and provides
/// a unified interface for error handling and exit code mapping.
#[derive(Debug, Error)]
pub enum RafflerError {
    /// Configuration loading or validation error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Entity store error
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Scheduler error
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    /// Invalid command-line usage
    #[error("usage error: {0}")]
    Usage(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RafflerError {
    /// Returns the appropriate exit code for this error.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Json(_) => ExitCode::CONFIG_ERROR,
            Self::Store(_) => ExitCode::STORAGE_ERROR,
            Self::Scheduler(SchedulerError::Storage(_)) => ExitCode::STORAGE_ERROR,
            Self::Scheduler(_) => ExitCode::SCHEDULER_ERROR,
            Self::Usage(_) => ExitCode::USAGE_ERROR,
            Self::Io(_) => ExitCode::IO_ERROR,
        }
    }
}

// ============================================================================
// Configuration Errors
// ============================================================================

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// YAML parsing failed
    #[error("parse error in {path}{}: {message}", line.map_or_else(String::new, |l| format!(" (line {l})")))]
    ParseError {
        /// Path to the configuration file
        path: PathBuf,
        /// Line number where the error occurred (if available)
        line: Option<usize>,
        /// Error message from the parser
        message: String,
    },

    /// Configuration validation failed
    #[error("validation failed for {path}: {}", summarize(errors))]
    ValidationError {
        /// Path to the configuration file
        path: String,
        /// List of validation issues found
        errors: Vec<ValidationIssue>,
    },

    /// Referenced configuration file not found
    #[error("file not found: {path}")]
    MissingFile {
        /// Path to the missing file
        path: PathBuf,
    },

    /// One or more configuration files failed validation
    #[error("{count} file(s) failed validation")]
    ValidationFailed {
        /// Number of files that failed validation.
        count: usize,
    },
}

fn summarize(errors: &[ValidationIssue]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

// ============================================================================
// Validation Types
// ============================================================================

/// A single validation issue found during configuration validation.
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    /// Path to the problematic field (e.g., "chain.phases[1].ratio")
    pub path: String,
    /// Description of the validation issue
    pub message: String,
    /// Severity level of the issue
    pub severity: Severity,
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let prefix = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(f, "{}: {} at {}", prefix, self.message, self.path)
    }
}

/// Severity level for validation issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Error - validation failure that prevents configuration from being used
    Error,
    /// Warning - potential issue that does not prevent configuration loading
    Warning,
}

// ============================================================================
// Store Errors
// ============================================================================

/// Persistence failures raised by an [`EntityStore`](crate::store::EntityStore).
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying I/O failed
    #[error("storage I/O error at {path}: {source}")]
    Io {
        /// File or directory involved
        path: PathBuf,
        /// Original error
        #[source]
        source: std::io::Error,
    },

    /// A record could not be encoded or decoded
    #[error("record {id} could not be (de)serialized: {source}")]
    Serialization {
        /// Entity id (or file stem) of the record
        id: String,
        /// Original error
        #[source]
        source: serde_json::Error,
    },
}

// ============================================================================
// Scheduler Errors
// ============================================================================

/// Errors surfaced by scheduler operations to the command layer.
///
/// Lost races (a second finalize or a cancel after finalize) are not
/// errors; those operations report a no-op instead.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The entity has no current record (already ended, cancelled, or never existed)
    #[error("entity {0} no longer exists")]
    NotFound(EntityId),

    /// The creation parameters were rejected; nothing was persisted
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Persisting or loading the entity failed
    #[error(transparent)]
    Storage(#[from] StoreError),

    /// The entity is past its deadline and no longer accepts changes
    #[error("entity {0} is closed")]
    Closed(EntityId),

    /// Later tournament phases are seeded from qualifiers only
    #[error("entity {0} does not accept new participants")]
    JoinClosed(EntityId),

    /// The actor acted again inside its cooldown window
    #[error("actor {0} is acting too quickly")]
    RateLimited(String),

    /// Creates are refused until startup recovery has completed
    #[error("scheduler is not accepting new entities until recovery completes")]
    NotReady,
}

// ============================================================================
// Notification Errors
// ============================================================================

/// Failure reported by a presentation or messaging collaborator.
///
/// Never rolls back a lifecycle transition; it is logged and dropped.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// The display surface (message, thread, channel) no longer exists
    #[error("display surface gone: {0}")]
    SurfaceGone(String),

    /// The collaborator could not be reached
    #[error("notification delivery failed: {0}")]
    Delivery(String),
}

// ============================================================================
// Result Type Alias
// ============================================================================

/// Result type alias for `raffler` operations.
pub type Result<T> = std::result::Result<T, RafflerError>;

// ============================================================================
// Tests
// ============================================================================
