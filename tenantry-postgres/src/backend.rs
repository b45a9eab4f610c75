//! [`SessionBackend`] over a deadpool-managed PostgreSQL pool.

use async_trait::async_trait;
use tenantry_core::{
    PoolStatus, SessionBackend, SessionScope, SessionVariables, TenancyConfig, TenancyError,
    TenancyResult, TenantId,
};
use tracing::debug;

use crate::connection::PgConnection;
use crate::directory;
use crate::error::PgResult;
use crate::pool::PgPool;
use crate::session;

/// PostgreSQL backend: pooled connections, directory lookup over the
/// `tenants` and `domains` tables, and `set_config` session scoping.
#[derive(Clone)]
pub struct PgBackend {
    pool: PgPool,
    variables: SessionVariables,
}

impl PgBackend {
    /// Create a backend over an existing pool.
    pub fn new(pool: PgPool, variables: SessionVariables) -> Self {
        Self { pool, variables }
    }

    /// Create a pool and backend from shared configuration.
    pub fn from_config(config: &TenancyConfig) -> PgResult<Self> {
        let pool = PgPool::from_tenancy_config(config)?;
        Ok(Self::new(pool, config.variables.clone()))
    }

    /// Get the pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// The session setting names in use.
    pub fn variables(&self) -> &SessionVariables {
        &self.variables
    }

    /// Check if the pool can hand out a working connection.
    pub async fn is_healthy(&self) -> bool {
        self.pool.is_healthy().await
    }

    /// Close the pool.
    pub fn close(&self) {
        self.pool.close();
    }
}

#[async_trait]
impl SessionBackend for PgBackend {
    type Connection = PgConnection;

    async fn acquire(&self) -> TenancyResult<PgConnection> {
        Ok(self.pool.get().await?)
    }

    async fn lookup_tenants(
        &self,
        conn: &mut PgConnection,
        host: &str,
    ) -> TenancyResult<Vec<TenantId>> {
        Ok(directory::lookup_tenants(conn, host).await?)
    }

    async fn establish(&self, conn: &mut PgConnection, scope: &SessionScope) -> TenancyResult<()> {
        session::apply(conn, &self.variables.assignments(scope))
            .await
            .map_err(|e| TenancyError::session_config(e.to_string()))
    }

    async fn reset(&self, conn: &mut PgConnection) -> TenancyResult<()> {
        Ok(session::apply(conn, &self.variables.reset_assignments()).await?)
    }

    fn release(&self, conn: PgConnection) {
        drop(conn);
    }

    fn discard(&self, conn: PgConnection) {
        debug!("closing connection instead of pooling it");
        conn.discard();
    }

    fn status(&self) -> PoolStatus {
        self.pool.status()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_from_config() {
        let config = TenancyConfig::new("postgres://crm@127.0.0.1:1/crm")
            .with_max_connections(3)
            .with_acquire_timeout(Duration::from_millis(100));
        let backend = PgBackend::from_config(&config).unwrap();

        assert_eq!(backend.status().max_size, 3);
        assert_eq!(backend.variables().tenant(), "app.tenant_id");
    }

    #[tokio::test]
    async fn test_unreachable_server_is_connection_error() {
        let config = TenancyConfig::new("postgres://crm@127.0.0.1:1/crm?connect_timeout=1")
            .with_acquire_timeout(Duration::from_millis(500));
        let backend = PgBackend::from_config(&config).unwrap();

        let err = backend.acquire().await.err().unwrap();
        assert!(err.is_connection_error());
        assert!(!backend.is_healthy().await);
    }
}
