//! Connection pool for PostgreSQL.

use std::sync::Arc;
use std::time::Duration;

use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod, Runtime};
use tenantry_core::{PoolStatus, TenancyConfig};
use tokio_postgres::NoTls;
use tracing::{debug, info};

use crate::config::{PgConfig, SslMode};
use crate::connection::PgConnection;
use crate::error::{PgError, PgResult};

/// A connection pool for PostgreSQL.
///
/// Connections are recycled with [`RecyclingMethod::Clean`], which resets
/// session settings on top of the explicit reset done after scoped work.
#[derive(Clone)]
pub struct PgPool {
    inner: Pool,
    config: Arc<PgConfig>,
}

impl PgPool {
    /// Create a new connection pool from configuration.
    pub fn new(config: PgConfig) -> PgResult<Self> {
        Self::with_pool_config(config, PoolConfig::default())
    }

    /// Create a pool from shared configuration.
    pub fn from_tenancy_config(config: &TenancyConfig) -> PgResult<Self> {
        Self::with_pool_config(PgConfig::from_tenancy_config(config)?, config.into())
    }

    /// Create a new connection pool with custom pool configuration.
    ///
    /// Connections are opened lazily, so this succeeds without a reachable
    /// server.
    pub fn with_pool_config(config: PgConfig, pool_config: PoolConfig) -> PgResult<Self> {
        if config.ssl_mode == SslMode::Require {
            return Err(PgError::config(
                "sslmode=require needs a TLS connector, this pool connects without TLS",
            ));
        }

        let mgr_config = ManagerConfig {
            recycling_method: RecyclingMethod::Clean,
        };
        let mgr = Manager::from_config(config.to_pg_config(), NoTls, mgr_config);

        let pool = Pool::builder(mgr)
            .max_size(pool_config.max_connections.max(1))
            .wait_timeout(pool_config.acquire_timeout)
            .create_timeout(pool_config.create_timeout)
            .recycle_timeout(pool_config.recycle_timeout)
            .runtime(Runtime::Tokio1)
            .build()
            .map_err(|e| PgError::config(format!("cannot build pool: {e}")))?;

        info!(
            host = %config.host,
            port = %config.port,
            database = %config.database,
            max_connections = pool_config.max_connections,
            "tenant pool ready"
        );

        Ok(Self {
            inner: pool,
            config: Arc::new(config),
        })
    }

    /// Get a connection from the pool.
    pub async fn get(&self) -> PgResult<PgConnection> {
        debug!(waiting = self.inner.status().waiting, "acquiring pooled connection");
        let client = self.inner.get().await?;
        Ok(PgConnection::new(client))
    }

    /// Get the current pool status.
    pub fn status(&self) -> PoolStatus {
        let status = self.inner.status();
        PoolStatus {
            available: status.available,
            size: status.size,
            max_size: status.max_size,
            waiting: status.waiting,
        }
    }

    /// Get the connection configuration.
    pub fn config(&self) -> &PgConfig {
        &self.config
    }

    /// Check if the pool can hand out a working connection.
    pub async fn is_healthy(&self) -> bool {
        match self.get().await {
            Ok(conn) => conn.query_one("SELECT 1", &[]).await.is_ok(),
            Err(_) => false,
        }
    }

    /// Close the pool and all idle connections.
    pub fn close(&self) {
        self.inner.close();
        info!(host = %self.config.host, "tenant pool closed");
    }

    /// Check if the pool has been closed.
    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}

/// Configuration for the connection pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Maximum number of connections in the pool.
    pub max_connections: usize,
    /// Maximum time to wait for a free connection.
    pub acquire_timeout: Option<Duration>,
    /// Maximum time to open a new connection.
    pub create_timeout: Option<Duration>,
    /// Maximum time to recycle a returned connection.
    pub recycle_timeout: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 16,
            acquire_timeout: Some(Duration::from_secs(5)),
            create_timeout: Some(Duration::from_secs(30)),
            recycle_timeout: Some(Duration::from_secs(5)),
        }
    }
}

impl From<&TenancyConfig> for PoolConfig {
    fn from(config: &TenancyConfig) -> Self {
        Self {
            max_connections: config.max_connections,
            acquire_timeout: Some(config.acquire_timeout),
            ..Self::default()
        }
    }
}
