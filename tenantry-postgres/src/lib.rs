//! # tenantry-postgres
//!
//! PostgreSQL backend for tenantry.
//!
//! This crate provides:
//! - Connection pool management using `deadpool-postgres`
//! - Tenant directory queries over the `tenants` and `domains` tables
//! - Session scoping with `set_config`, read by row-level security policies
//! - [`PgBackend`], the [`SessionBackend`](tenantry_core::SessionBackend)
//!   that ties these together
//!
//! ## Example
//!
//! ```rust,ignore
//! use tenantry_core::{TenancyConfig, TenancyError};
//! use tenantry_postgres::connect;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), TenancyError> {
//!     let scoper = connect(&TenancyConfig::from_env()?)?;
//!
//!     let count = scoper
//!         .run_as_tenant("acme.example.com", |session| {
//!             Box::pin(async move {
//!                 let row = session.query_one("SELECT count(*) FROM contacts", &[]).await?;
//!                 Ok::<i64, TenancyError>(row.get(0))
//!             })
//!         })
//!         .await?;
//!
//!     println!("{count} contacts");
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod config;
pub mod connection;
pub mod directory;
pub mod error;
pub mod pool;
pub mod row;
pub mod session;

pub use backend::PgBackend;
pub use config::{PgConfig, SslMode};
pub use connection::{PgConnection, PgTransaction};
pub use error::{PgError, PgResult};
pub use pool::{PgPool, PoolConfig};
pub use row::{FromPgRow, PgRow};

use tenantry_core::{TenancyConfig, TenancyResult, TenantScoper};

/// Build a scoper over PostgreSQL from shared configuration.
///
/// Applies the configured default work timeout.
pub fn connect(config: &TenancyConfig) -> TenancyResult<TenantScoper<PgBackend>> {
    let scoper = TenantScoper::new(PgBackend::from_config(config)?);
    Ok(match config.work_timeout {
        Some(timeout) => scoper.with_default_timeout(timeout),
        None => scoper,
    })
}

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::backend::PgBackend;
    pub use crate::config::PgConfig;
    pub use crate::connection::PgConnection;
    pub use crate::error::{PgError, PgResult};
    pub use crate::pool::PgPool;
    pub use crate::row::{FromPgRow, PgRow};
}
