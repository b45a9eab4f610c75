//! Error taxonomy for tenant resolution and scoped execution.
//!
//! Every failure the core can produce maps to a stable [`ErrorCode`]:
//!
//! - 1xxx: client input (missing host, unknown tenant)
//! - 3xxx: connection pool and connection faults
//! - 5xxx: session setup and statement execution
//! - 7xxx: configuration
//! - 9xxx: internal and invariant violations
//!
//! ```rust
//! use tenantry_core::{ErrorCode, TenancyError};
//!
//! let err = TenancyError::unknown_tenant("nope.example.com");
//! assert_eq!(err.code(), ErrorCode::UnknownTenant);
//! assert_eq!(err.code().code(), "T1002");
//! assert!(err.is_client_error());
//! assert!(!err.is_retryable());
//! ```

use std::fmt;

use thiserror::Error;

/// Result type for tenancy operations.
pub type TenancyResult<T> = Result<T, TenancyError>;

/// Error codes for programmatic error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // Client input (1xxx)
    /// Neither a forwarded host nor a host header was supplied (T1001).
    MissingHost = 1001,
    /// No active tenant owns the requested host (T1002).
    UnknownTenant = 1002,

    // Connection errors (3xxx)
    /// Timed out waiting for a pooled connection (T3001).
    PoolTimeout = 3001,
    /// The pool has been closed (T3002).
    PoolClosed = 3002,
    /// Establishing or using a connection failed (T3003).
    ConnectionFailed = 3003,

    // Session and execution errors (5xxx)
    /// Configuring session variables failed (T5001).
    SessionConfig = 5001,
    /// A statement failed (T5002).
    DatabaseError = 5002,
    /// The caller cancelled the operation (T5003).
    Cancelled = 5003,
    /// The operation exceeded its deadline (T5004).
    Timeout = 5004,

    // Configuration errors (7xxx)
    /// Invalid or missing configuration (T7001).
    InvalidConfiguration = 7001,

    // Internal errors (9xxx)
    /// Internal error (T9001).
    Internal = 9001,
    /// A host matched more than one active tenant (T9002).
    AmbiguousTenant = 9002,
}

impl ErrorCode {
    /// Get the error code string (e.g., "T1002").
    pub fn code(&self) -> String {
        format!("T{}", *self as u16)
    }

    /// Get a short description of the error code.
    pub fn description(&self) -> &'static str {
        match self {
            Self::MissingHost => "Missing host header",
            Self::UnknownTenant => "Unknown tenant",
            Self::PoolTimeout => "Connection pool timeout",
            Self::PoolClosed => "Connection pool closed",
            Self::ConnectionFailed => "Database connection failed",
            Self::SessionConfig => "Session configuration failed",
            Self::DatabaseError => "Database error",
            Self::Cancelled => "Operation cancelled",
            Self::Timeout => "Operation timed out",
            Self::InvalidConfiguration => "Invalid configuration",
            Self::Internal => "Internal error",
            Self::AmbiguousTenant => "Ambiguous tenant",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Errors produced while resolving a tenant or running scoped work.
#[derive(Error, Debug)]
pub enum TenancyError {
    /// No usable host header on the request.
    #[error("missing host header")]
    MissingHost,

    /// The host is not registered, or its tenant is inactive.
    #[error("no active tenant for host '{host}'")]
    UnknownTenant {
        /// The host that failed to resolve.
        host: String,
    },

    /// The directory holds several active rows for one host.
    #[error("host '{host}' matches {matches} active tenants")]
    AmbiguousTenant {
        /// The host that resolved more than once.
        host: String,
        /// How many active tenants matched.
        matches: usize,
    },

    /// The session-configuration statement failed.
    #[error("session configuration failed: {0}")]
    SessionConfig(String),

    /// Waiting for a pooled connection timed out.
    #[error("timed out waiting for a pooled connection")]
    PoolTimeout,

    /// The pool is closed.
    #[error("connection pool is closed")]
    PoolClosed,

    /// Connection-level failure.
    #[error("connection error: {0}")]
    Connection(String),

    /// Statement failure.
    #[error("database error: {0}")]
    Database(String),

    /// The caller cancelled the operation.
    #[error("operation cancelled")]
    Cancelled,

    /// The operation exceeded its deadline.
    #[error("operation timed out after {0}ms")]
    Timeout(u64),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl TenancyError {
    /// Create an unknown-tenant error.
    pub fn unknown_tenant(host: impl Into<String>) -> Self {
        Self::UnknownTenant { host: host.into() }
    }

    /// Create an ambiguous-tenant error.
    pub fn ambiguous_tenant(host: impl Into<String>, matches: usize) -> Self {
        Self::AmbiguousTenant {
            host: host.into(),
            matches,
        }
    }

    /// Create a session configuration error.
    pub fn session_config(message: impl Into<String>) -> Self {
        Self::SessionConfig(message.into())
    }

    /// Create a connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection(message.into())
    }

    /// Create a database error.
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database(message.into())
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Get the error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::MissingHost => ErrorCode::MissingHost,
            Self::UnknownTenant { .. } => ErrorCode::UnknownTenant,
            Self::AmbiguousTenant { .. } => ErrorCode::AmbiguousTenant,
            Self::SessionConfig(_) => ErrorCode::SessionConfig,
            Self::PoolTimeout => ErrorCode::PoolTimeout,
            Self::PoolClosed => ErrorCode::PoolClosed,
            Self::Connection(_) => ErrorCode::ConnectionFailed,
            Self::Database(_) => ErrorCode::DatabaseError,
            Self::Cancelled => ErrorCode::Cancelled,
            Self::Timeout(_) => ErrorCode::Timeout,
            Self::Config(_) => ErrorCode::InvalidConfiguration,
            Self::Internal(_) => ErrorCode::Internal,
        }
    }

    /// Check if this error was caused by the request rather than the system.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::MissingHost | Self::UnknownTenant { .. })
    }

    /// Check if retrying the whole call may succeed.
    ///
    /// Session setup failures are retryable because no user work ran yet.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::SessionConfig(_) | Self::PoolTimeout | Self::Connection(_) | Self::Timeout(_)
        )
    }

    /// Check if this is a pool or connection error.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::PoolTimeout | Self::PoolClosed | Self::Connection(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(ErrorCode::MissingHost.code(), "T1001");
        assert_eq!(ErrorCode::AmbiguousTenant.code(), "T9002");
        assert_eq!(ErrorCode::SessionConfig.to_string(), "T5001");
    }

    #[test]
    fn test_classification() {
        assert!(TenancyError::MissingHost.is_client_error());
        assert!(TenancyError::unknown_tenant("a.example.com").is_client_error());
        assert!(!TenancyError::ambiguous_tenant("a.example.com", 2).is_client_error());

        assert!(TenancyError::session_config("connection reset").is_retryable());
        assert!(TenancyError::PoolTimeout.is_retryable());
        assert!(!TenancyError::unknown_tenant("a.example.com").is_retryable());
        assert!(!TenancyError::Cancelled.is_retryable());

        assert!(TenancyError::PoolClosed.is_connection_error());
        assert!(!TenancyError::database("syntax").is_connection_error());
    }

    #[test]
    fn test_messages() {
        let err = TenancyError::unknown_tenant("acme.example.com");
        assert_eq!(err.to_string(), "no active tenant for host 'acme.example.com'");

        let err = TenancyError::ambiguous_tenant("acme.example.com", 2);
        assert_eq!(
            err.to_string(),
            "host 'acme.example.com' matches 2 active tenants"
        );
    }
}
