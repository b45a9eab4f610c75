//! Error types for PostgreSQL operations.

use deadpool_postgres::PoolError;
use tenantry_core::TenancyError;
use thiserror::Error;

/// Result type for PostgreSQL operations.
pub type PgResult<T> = Result<T, PgError>;

/// Errors that can occur during PostgreSQL operations.
#[derive(Error, Debug)]
pub enum PgError {
    /// Connection pool error.
    #[error("pool error: {0}")]
    Pool(#[from] PoolError),

    /// PostgreSQL error.
    #[error("postgres error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Connection error.
    #[error("connection error: {0}")]
    Connection(String),

    /// Row deserialization error.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// Timeout error.
    #[error("operation timed out after {0}ms")]
    Timeout(u64),
}

impl PgError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection(message.into())
    }

    /// Create a deserialization error.
    pub fn deserialization(message: impl Into<String>) -> Self {
        Self::Deserialization(message.into())
    }

    /// Check if this is a connection error.
    pub fn is_connection_error(&self) -> bool {
        match self {
            Self::Pool(_) | Self::Connection(_) => true,
            Self::Postgres(e) => e.is_closed(),
            _ => false,
        }
    }

    /// Check if this is a timeout error.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Pool(PoolError::Timeout(_)))
    }
}

impl From<PgError> for TenancyError {
    fn from(err: PgError) -> Self {
        match err {
            PgError::Pool(PoolError::Timeout(_)) => TenancyError::PoolTimeout,
            PgError::Pool(PoolError::Closed) => TenancyError::PoolClosed,
            PgError::Pool(e) => TenancyError::connection(e.to_string()),
            PgError::Postgres(e) if e.is_closed() => TenancyError::connection(e.to_string()),
            PgError::Postgres(e) => TenancyError::database(e.to_string()),
            PgError::Config(msg) => TenancyError::Config(msg),
            PgError::Connection(msg) => TenancyError::Connection(msg),
            PgError::Deserialization(msg) => TenancyError::Database(msg),
            PgError::Timeout(ms) => TenancyError::Timeout(ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deadpool_postgres::TimeoutType;

    #[test]
    fn test_error_creation() {
        let err = PgError::config("invalid URL");
        assert!(matches!(err, PgError::Config(_)));

        let err = PgError::connection("connection refused");
        assert!(err.is_connection_error());

        let err = PgError::Timeout(5000);
        assert!(err.is_timeout());
    }

    #[test]
    fn test_pool_errors_map_to_taxonomy() {
        let err: TenancyError = PgError::Pool(PoolError::Timeout(TimeoutType::Wait)).into();
        assert!(matches!(err, TenancyError::PoolTimeout));

        let err: TenancyError = PgError::Pool(PoolError::Closed).into();
        assert!(matches!(err, TenancyError::PoolClosed));

        let err: TenancyError = PgError::Pool(PoolError::NoRuntimeSpecified).into();
        assert!(matches!(err, TenancyError::Connection(_)));
    }

    #[test]
    fn test_other_errors_map_to_taxonomy() {
        let err: TenancyError = PgError::Timeout(1000).into();
        assert!(matches!(err, TenancyError::Timeout(1000)));

        let err: TenancyError = PgError::config("bad sslmode").into();
        assert!(matches!(err, TenancyError::Config(_)));

        let err: TenancyError = PgError::deserialization("bad column").into();
        assert!(matches!(err, TenancyError::Database(_)));
    }
}
