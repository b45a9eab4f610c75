//! Tenant directory queries.
//!
//! Expected schema:
//!
//! ```sql
//! CREATE TABLE tenants (
//!     id     uuid PRIMARY KEY,
//!     name   text NOT NULL,
//!     plan   text NOT NULL,
//!     status text NOT NULL DEFAULT 'active'
//! );
//!
//! CREATE TABLE domains (
//!     hostname   text NOT NULL,
//!     tenant_id  uuid NOT NULL REFERENCES tenants (id),
//!     is_primary boolean NOT NULL DEFAULT false
//! );
//! CREATE UNIQUE INDEX domains_hostname_key ON domains (lower(hostname));
//! ```
//!
//! Neither table is under row-level security: the lookup runs before any
//! tenant is known.

use tenantry_core::{Domain, Tenant, TenantId};
use tracing::debug;

use crate::connection::PgConnection;
use crate::error::PgResult;
use crate::row::{FromPgRow, PgRow};

/// Active tenants owning a hostname. `LIMIT 2` is enough to detect
/// duplicates.
pub const LOOKUP_SQL: &str = "SELECT DISTINCT t.id FROM tenants t \
     JOIN domains d ON d.tenant_id = t.id \
     WHERE lower(d.hostname) = lower($1) AND t.status = 'active' \
     LIMIT 2";

const FETCH_TENANT_SQL: &str = "SELECT id, name, plan, status FROM tenants WHERE id = $1";

const LIST_DOMAINS_SQL: &str = "SELECT hostname, tenant_id, is_primary FROM domains \
     WHERE tenant_id = $1 ORDER BY is_primary DESC, hostname";

const PRIMARY_DOMAIN_SQL: &str = "SELECT hostname, tenant_id, is_primary FROM domains \
     WHERE tenant_id = $1 AND is_primary LIMIT 1";

/// Ids of active tenants owning `host`, at most two.
pub async fn lookup_tenants(conn: &PgConnection, host: &str) -> PgResult<Vec<TenantId>> {
    let rows = conn.query(LOOKUP_SQL, &[&host]).await?;
    let ids = rows
        .iter()
        .map(|row| row.get_value("id").map(TenantId::new))
        .collect::<PgResult<Vec<_>>>()?;
    debug!(host, matches = ids.len(), "tenant lookup");
    Ok(ids)
}

/// Fetch a tenant by id, whatever its status.
pub async fn fetch_tenant(conn: &PgConnection, id: TenantId) -> PgResult<Option<Tenant>> {
    conn.query_opt(FETCH_TENANT_SQL, &[id.as_uuid()])
        .await?
        .as_ref()
        .map(Tenant::from_row)
        .transpose()
}

/// All domains of a tenant, primary first.
pub async fn list_domains(conn: &PgConnection, id: TenantId) -> PgResult<Vec<Domain>> {
    conn.query(LIST_DOMAINS_SQL, &[id.as_uuid()])
        .await?
        .iter()
        .map(Domain::from_row)
        .collect()
}

/// The tenant's primary domain, if one is marked.
pub async fn primary_domain(conn: &PgConnection, id: TenantId) -> PgResult<Option<Domain>> {
    conn.query_opt(PRIMARY_DOMAIN_SQL, &[id.as_uuid()])
        .await?
        .as_ref()
        .map(Domain::from_row)
        .transpose()
}
