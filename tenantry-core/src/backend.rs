//! The seam between the scoped execution wrapper and a concrete database.

use async_trait::async_trait;

use crate::error::TenancyResult;
use crate::session::SessionScope;
use crate::tenant::TenantId;

/// Snapshot of a connection pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStatus {
    /// Number of available (idle) connections.
    pub available: usize,
    /// Current total size of the pool.
    pub size: usize,
    /// Maximum size of the pool.
    pub max_size: usize,
    /// Number of tasks waiting for a connection.
    pub waiting: usize,
}

impl PoolStatus {
    /// Connections currently lent out.
    pub fn in_use(&self) -> usize {
        self.size.saturating_sub(self.available)
    }
}

/// A pooled database that can resolve tenants and scope sessions.
///
/// Implementations own the pool; [`TenantScoper`](crate::TenantScoper) owns
/// the ordering of calls and the release guarantees.
#[async_trait]
pub trait SessionBackend: Send + Sync {
    /// A borrowed connection.
    type Connection: Send + 'static;

    /// Borrow a connection, waiting up to the pool's configured timeout.
    async fn acquire(&self) -> TenancyResult<Self::Connection>;

    /// Ids of active tenants owning `host`, compared case-insensitively.
    ///
    /// Returns at most two ids; callers only need to tell zero, one and many
    /// apart.
    async fn lookup_tenants(
        &self,
        conn: &mut Self::Connection,
        host: &str,
    ) -> TenancyResult<Vec<TenantId>>;

    /// Apply the session settings for `scope` with session lifetime.
    async fn establish(&self, conn: &mut Self::Connection, scope: &SessionScope)
    -> TenancyResult<()>;

    /// Clear any tenant or role settings left on the session.
    async fn reset(&self, conn: &mut Self::Connection) -> TenancyResult<()>;

    /// Return a connection to the pool for reuse.
    fn release(&self, conn: Self::Connection);

    /// Close a connection whose state is unknown instead of reusing it.
    fn discard(&self, conn: Self::Connection);

    /// Current pool status.
    fn status(&self) -> PoolStatus;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_status_in_use() {
        let status = PoolStatus {
            available: 2,
            size: 5,
            max_size: 10,
            waiting: 0,
        };
        assert_eq!(status.in_use(), 3);
        assert_eq!(PoolStatus::default().in_use(), 0);
    }
}
