//! # tenantry-core
//!
//! Tenant resolution and scoped-session execution for applications that keep
//! every customer in one shared database and isolate them with row-level
//! security.
//!
//! This crate provides:
//! - Host resolution from request headers ([`resolve_host`])
//! - Tenant directory types ([`Tenant`], [`Domain`], [`TenantId`])
//! - Scoped execution ([`TenantScoper::run_as_tenant`],
//!   [`TenantScoper::run_as_admin`]) with guaranteed connection release
//! - A backend seam ([`SessionBackend`]) and an in-memory backend for tests
//! - Environment configuration ([`TenancyConfig`]) and logging setup
//!
//! ## Resolving a request
//!
//! ```rust
//! use tenantry_core::resolve_host;
//!
//! let headers = [("x-forwarded-host", "Acme.Example.com"), ("host", "10.0.0.4:8080")];
//! assert_eq!(resolve_host(&headers[..]).unwrap(), "acme.example.com");
//! ```
//!
//! ## Running scoped work
//!
//! ```rust,ignore
//! use tenantry_core::prelude::*;
//!
//! let host = resolve_host(&request_headers)?;
//! let contacts = scoper
//!     .run_as_tenant(&host, |session| {
//!         Box::pin(async move { list_contacts(&session).await })
//!     })
//!     .await?;
//! ```
//!
//! Nothing is cached between calls: every call performs a fresh directory
//! lookup, so deactivating a tenant or moving a domain takes effect on the
//! next request.

pub mod backend;
pub mod config;
pub mod env;
pub mod error;
pub mod host;
pub mod logging;
pub mod memory;
pub mod scope;
pub mod session;
pub mod tenant;

pub use backend::{PoolStatus, SessionBackend};
pub use config::TenancyConfig;
pub use env::{ConfigError, EnvExpander, EnvSource, MapEnvSource, StdEnvSource};
pub use error::{ErrorCode, TenancyError, TenancyResult};
pub use host::{HeaderLookup, resolve_host};
pub use memory::{MemoryBackend, MemoryConnection, MemoryRow};
pub use scope::{ScopeOptions, ScopedSession, ScopedWork, TenantScoper};
pub use session::{SessionRole, SessionScope, SessionVariables};
pub use tenant::{Domain, Tenant, TenantId, TenantStatus};

pub use tokio_util::sync::CancellationToken;

/// Prelude for common imports.
pub mod prelude {
    pub use crate::backend::SessionBackend;
    pub use crate::error::{TenancyError, TenancyResult};
    pub use crate::host::resolve_host;
    pub use crate::scope::{ScopeOptions, ScopedSession, ScopedWork, TenantScoper};
    pub use crate::session::SessionScope;
    pub use crate::tenant::{Tenant, TenantId};
    pub use tokio_util::sync::CancellationToken;
}
