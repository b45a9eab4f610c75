//! # Tenantry
//!
//! Host-based tenant resolution and scoped database sessions for
//! applications that keep every customer in one shared database.
//!
//! Tenantry provides:
//! - Canonical host resolution from `x-forwarded-host` / `host` headers
//! - A fresh tenant directory lookup on every call, with no caching
//! - Session settings that row-level security policies read, applied before
//!   work runs and cleared before the connection is reused
//! - A guaranteed return of every borrowed connection, on every exit path
//! - An admin scope for maintenance work that spans tenants
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use tenantry::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), TenancyError> {
//!     tenantry::logging::init();
//!
//!     let scoper = tenantry::postgres::connect(&TenancyConfig::from_env()?)?;
//!     let host = resolve_host(&[("host", "acme.example.com:443")][..])?;
//!
//!     let names = scoper
//!         .run_as_tenant(&host, |session| {
//!             Box::pin(async move {
//!                 let rows = session.query("SELECT name FROM contacts", &[]).await?;
//!                 Ok::<Vec<String>, TenancyError>(rows.iter().map(|r| r.get(0)).collect())
//!             })
//!         })
//!         .await?;
//!
//!     println!("{names:?}");
//!     Ok(())
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub use tenantry_core::*;

/// PostgreSQL backend.
#[cfg(feature = "postgres")]
#[cfg_attr(docsrs, doc(cfg(feature = "postgres")))]
pub mod postgres {
    pub use tenantry_postgres::*;
}

/// Axum integration.
#[cfg(feature = "axum")]
#[cfg_attr(docsrs, doc(cfg(feature = "axum")))]
pub mod axum {
    pub use tenantry_axum::*;
}

/// Prelude module for convenient imports.
pub mod prelude {
    pub use tenantry_core::prelude::*;
    pub use tenantry_core::{TenancyConfig, resolve_host};

    #[cfg(feature = "postgres")]
    pub use tenantry_postgres::{PgBackend, PgConnection};

    #[cfg(feature = "axum")]
    pub use tenantry_axum::{Tenancy, TenancyLayer, TenancyRejection, TenantHost};
}
