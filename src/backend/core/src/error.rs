//! Error handling for Tessera Core.
//!
//! Policy outcomes (allow, deny, not a member, invalid right) are never
//! errors; they are [`Decision`](crate::rbac::Decision) values. This module
//! covers system faults only: storage outages, bad configuration, corrupt
//! records, and the explicit `Forbidden` produced by
//! [`AuthorizationEngine::enforce`](crate::rbac::AuthorizationEngine::enforce).
//!
//! # Usage
//!
//! ```rust,ignore
//! use tessera_core::error::{AuthzError, ErrorCode, Result};
//!
//! fn load() -> Result<()> {
//!     Err(AuthzError::new(ErrorCode::InvalidConfiguration, "bad separator"))
//! }
//! ```

use metrics::counter;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use thiserror::Error;
use tracing::{error, warn};

// ═══════════════════════════════════════════════════════════════════════════════
// Result Type Alias
// ═══════════════════════════════════════════════════════════════════════════════

/// A specialized Result type for Tessera operations.
pub type Result<T> = std::result::Result<T, AuthzError>;

// ═══════════════════════════════════════════════════════════════════════════════
// Error Codes
// ═══════════════════════════════════════════════════════════════════════════════

/// Machine-readable error codes.
///
/// These codes are stable and can be used by callers for programmatic error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    DatabaseError,
    DatabaseConnectionFailed,
    DatabaseQueryFailed,
    MigrationFailed,
    RecordNotFound,
    InvalidRecord,

    SerializationError,
    DeserializationError,

    Forbidden,
    InvalidInput,

    ConfigurationError,
    InvalidConfiguration,

    IoError,
}

impl ErrorCode {
    /// Get the error category for metrics and logging.
    pub const fn category(&self) -> &'static str {
        match self {
            Self::DatabaseError
            | Self::DatabaseConnectionFailed
            | Self::DatabaseQueryFailed
            | Self::MigrationFailed
            | Self::RecordNotFound
            | Self::InvalidRecord => "database",

            Self::SerializationError | Self::DeserializationError => "serialization",

            Self::Forbidden => "authorization",

            Self::InvalidInput => "validation",

            Self::ConfigurationError | Self::InvalidConfiguration => "configuration",

            Self::IoError => "io",
        }
    }

    /// Whether retrying the same operation may succeed.
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::DatabaseConnectionFailed | Self::DatabaseQueryFailed | Self::IoError
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::DatabaseError => "DATABASE_ERROR",
            Self::DatabaseConnectionFailed => "DATABASE_CONNECTION_FAILED",
            Self::DatabaseQueryFailed => "DATABASE_QUERY_FAILED",
            Self::MigrationFailed => "MIGRATION_FAILED",
            Self::RecordNotFound => "RECORD_NOT_FOUND",
            Self::InvalidRecord => "INVALID_RECORD",
            Self::SerializationError => "SERIALIZATION_ERROR",
            Self::DeserializationError => "DESERIALIZATION_ERROR",
            Self::Forbidden => "FORBIDDEN",
            Self::InvalidInput => "INVALID_INPUT",
            Self::ConfigurationError => "CONFIGURATION_ERROR",
            Self::InvalidConfiguration => "INVALID_CONFIGURATION",
            Self::IoError => "IO_ERROR",
        };
        write!(f, "{}", name)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Severity
// ═══════════════════════════════════════════════════════════════════════════════

/// Error severity, used to choose the log level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl ErrorSeverity {
    pub fn from_code(code: &ErrorCode) -> Self {
        match code {
            ErrorCode::DatabaseConnectionFailed | ErrorCode::MigrationFailed => Self::Critical,
            ErrorCode::DatabaseError
            | ErrorCode::DatabaseQueryFailed
            | ErrorCode::InvalidRecord
            | ErrorCode::IoError => Self::High,
            ErrorCode::ConfigurationError
            | ErrorCode::InvalidConfiguration
            | ErrorCode::SerializationError
            | ErrorCode::DeserializationError => Self::Medium,
            ErrorCode::RecordNotFound | ErrorCode::Forbidden | ErrorCode::InvalidInput => Self::Low,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Main Error Type
// ═══════════════════════════════════════════════════════════════════════════════

/// The error type for Tessera operations.
///
/// Carries a stable code, a message that is safe to show to end users, an
/// optional internal message for logs, and the underlying source error.
#[derive(Error, Debug)]
pub struct AuthzError {
    /// Machine-readable error code
    code: ErrorCode,

    /// User-friendly error message (safe to expose to clients)
    user_message: Cow<'static, str>,

    /// Detailed internal message (for logging only)
    internal_message: Option<String>,

    /// The source error that caused this error
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl fmt::Display for AuthzError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.user_message)?;
        if let Some(ref internal) = self.internal_message {
            write!(f, " (internal: {})", internal)?;
        }
        Ok(())
    }
}

impl AuthzError {
    // ─────────────────────────────────────────────────────────────────────────
    // Constructors
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a new error with code and user message.
    pub fn new(code: ErrorCode, user_message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            code,
            user_message: user_message.into(),
            internal_message: None,
            source: None,
        }
    }

    /// Create an error with both user and internal messages.
    pub fn with_internal(
        code: ErrorCode,
        user_message: impl Into<Cow<'static, str>>,
        internal_message: impl Into<String>,
    ) -> Self {
        Self {
            internal_message: Some(internal_message.into()),
            ..Self::new(code, user_message)
        }
    }

    /// Uniform "forbidden" error; carries no grant or reason detail.
    pub fn forbidden() -> Self {
        Self::new(ErrorCode::Forbidden, "You do not have permission to perform this action")
    }

    /// Attach the underlying source error.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    /// Get the error code.
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    /// Get the user-friendly message.
    pub fn user_message(&self) -> &str {
        &self.user_message
    }

    /// Get the internal message (if any).
    pub fn internal_message(&self) -> Option<&str> {
        self.internal_message.as_deref()
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }

    /// Get the error severity.
    pub fn severity(&self) -> ErrorSeverity {
        ErrorSeverity::from_code(&self.code)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Logging
    // ─────────────────────────────────────────────────────────────────────────

    /// Log this error with appropriate severity and count it.
    pub fn log(&self) {
        let code = self.code.to_string();
        let category = self.code.category();

        counter!("authz_errors_total", "category" => category).increment(1);

        match self.severity() {
            ErrorSeverity::Critical | ErrorSeverity::High => {
                error!(
                    error_code = %code,
                    category = category,
                    user_message = %self.user_message,
                    internal_message = ?self.internal_message,
                    source = ?self.source,
                    "Authorization system error"
                );
            }
            ErrorSeverity::Medium => {
                warn!(
                    error_code = %code,
                    category = category,
                    user_message = %self.user_message,
                    internal_message = ?self.internal_message,
                    "Authorization system error"
                );
            }
            ErrorSeverity::Low => {
                tracing::debug!(
                    error_code = %code,
                    category = category,
                    user_message = %self.user_message,
                    "Authorization error"
                );
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Conversions
// ═══════════════════════════════════════════════════════════════════════════════

impl From<sqlx::Error> for AuthzError {
    fn from(error: sqlx::Error) -> Self {
        let (code, user_msg) = match &error {
            sqlx::Error::RowNotFound => (
                ErrorCode::RecordNotFound,
                "The requested record was not found",
            ),
            sqlx::Error::Database(_) => (
                ErrorCode::DatabaseQueryFailed,
                "A database error occurred",
            ),
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => (
                ErrorCode::DatabaseConnectionFailed,
                "Unable to connect to the database",
            ),
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => (
                ErrorCode::InvalidRecord,
                "A stored authorization record could not be decoded",
            ),
            _ => (ErrorCode::DatabaseError, "A database error occurred"),
        };
        Self::with_internal(code, user_msg, error.to_string()).with_source(error)
    }
}

impl From<sqlx::migrate::MigrateError> for AuthzError {
    fn from(error: sqlx::migrate::MigrateError) -> Self {
        Self::with_internal(
            ErrorCode::MigrationFailed,
            "Database migrations could not be applied",
            error.to_string(),
        )
        .with_source(error)
    }
}

impl From<config::ConfigError> for AuthzError {
    fn from(error: config::ConfigError) -> Self {
        Self::with_internal(
            ErrorCode::ConfigurationError,
            "Configuration could not be loaded",
            error.to_string(),
        )
        .with_source(error)
    }
}

impl From<serde_json::Error> for AuthzError {
    fn from(error: serde_json::Error) -> Self {
        let code = if error.is_data() || error.is_syntax() || error.is_eof() {
            ErrorCode::DeserializationError
        } else {
            ErrorCode::SerializationError
        };
        Self::with_internal(code, "Invalid JSON document", error.to_string()).with_source(error)
    }
}

impl From<std::io::Error> for AuthzError {
    fn from(error: std::io::Error) -> Self {
        Self::with_internal(ErrorCode::IoError, "An I/O error occurred", error.to_string())
            .with_source(error)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
