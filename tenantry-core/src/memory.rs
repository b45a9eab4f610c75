//! In-memory backend for tests and local development.
//!
//! [`MemoryBackend`] mimics a pooled database with row-level security: a
//! bounded pool with an acquire timeout, a tenant directory, session settings
//! that survive release exactly like real session-lifetime settings, and a
//! row store whose reads and writes follow the same policy a database would
//! enforce from those settings.
//!
//! ```rust
//! use tenantry_core::memory::MemoryBackend;
//! use tenantry_core::{Domain, Tenant, TenantId, TenantScoper, TenancyError};
//!
//! # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
//! let backend = MemoryBackend::new();
//! let acme = TenantId::random();
//! backend.add_tenant(Tenant::new(acme, "Acme", "pro"));
//! backend.add_domain(Domain::new("acme.example.com", acme).primary());
//!
//! let scoper = TenantScoper::new(backend);
//! let seen = scoper
//!     .run_as_tenant("acme.example.com", |session| {
//!         Box::pin(async move { Ok::<_, TenancyError>(session.tenant_id()) })
//!     })
//!     .await
//!     .unwrap();
//! assert_eq!(seen, Some(acme));
//! # });
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, trace};

use crate::backend::{PoolStatus, SessionBackend};
use crate::config::TenancyConfig;
use crate::error::{TenancyError, TenancyResult};
use crate::session::{SessionRole, SessionScope, SessionVariables};
use crate::tenant::{Domain, Tenant, TenantId, TenantStatus};

/// A stored row owned by one tenant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryRow {
    /// Table name.
    pub table: String,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Row contents.
    pub payload: String,
}

/// Builder for [`MemoryBackend`].
#[derive(Debug, Clone)]
pub struct MemoryBackendBuilder {
    max_connections: usize,
    acquire_timeout: Duration,
    variables: SessionVariables,
}

impl Default for MemoryBackendBuilder {
    fn default() -> Self {
        Self {
            max_connections: 16,
            acquire_timeout: Duration::from_secs(5),
            variables: SessionVariables::default(),
        }
    }
}

impl MemoryBackendBuilder {
    /// Set the maximum number of connections.
    pub fn max_connections(mut self, n: usize) -> Self {
        self.max_connections = n.max(1);
        self
    }

    /// Set how long `acquire` waits for a free connection.
    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Set the session setting names.
    pub fn variables(mut self, variables: SessionVariables) -> Self {
        self.variables = variables;
        self
    }

    /// Build the backend.
    pub fn build(self) -> MemoryBackend {
        MemoryBackend {
            inner: Arc::new(Inner {
                directory: RwLock::new(Directory::default()),
                rows: RwLock::new(Vec::new()),
                variables: self.variables,
                permits: Arc::new(Semaphore::new(self.max_connections)),
                max_connections: self.max_connections,
                acquire_timeout: self.acquire_timeout,
                idle: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
                size: AtomicUsize::new(0),
                waiting: AtomicUsize::new(0),
                released: AtomicUsize::new(0),
                discarded: AtomicUsize::new(0),
                faults: Faults::default(),
            }),
        }
    }
}

/// A pooled, policy-enforcing database held in memory.
///
/// Cheap to clone; clones share the pool and data.
#[derive(Debug, Clone)]
pub struct MemoryBackend {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    directory: RwLock<Directory>,
    rows: RwLock<Vec<MemoryRow>>,
    variables: SessionVariables,
    permits: Arc<Semaphore>,
    max_connections: usize,
    acquire_timeout: Duration,
    idle: Mutex<Vec<Session>>,
    next_id: AtomicU64,
    size: AtomicUsize,
    waiting: AtomicUsize,
    released: AtomicUsize,
    discarded: AtomicUsize,
    faults: Faults,
}

#[derive(Debug, Default)]
struct Directory {
    tenants: Vec<Tenant>,
    domains: Vec<Domain>,
}

#[derive(Debug, Default)]
struct Faults {
    lookup: AtomicBool,
    establish: AtomicBool,
    reset: AtomicBool,
    reset_stall: Mutex<Option<Duration>>,
}

#[derive(Debug)]
struct Session {
    id: u64,
    settings: HashMap<String, String>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    /// Create a backend with default pool settings.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Start building a backend.
    pub fn builder() -> MemoryBackendBuilder {
        MemoryBackendBuilder::default()
    }

    /// Build a backend from shared configuration. The URL is ignored.
    pub fn from_config(config: &TenancyConfig) -> Self {
        Self::builder()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .variables(config.variables.clone())
            .build()
    }

    /// The session setting names in use.
    pub fn variables(&self) -> &SessionVariables {
        &self.inner.variables
    }

    /// Register a tenant.
    pub fn add_tenant(&self, tenant: Tenant) {
        self.inner.directory.write().tenants.push(tenant);
    }

    /// Route a hostname to a tenant.
    ///
    /// Duplicate hostnames are accepted so that ambiguity can be exercised.
    pub fn add_domain(&self, domain: Domain) {
        self.inner.directory.write().domains.push(domain);
    }

    /// Change a tenant's status. Returns `false` if the tenant is unknown.
    pub fn set_status(&self, id: TenantId, status: TenantStatus) -> bool {
        let mut directory = self.inner.directory.write();
        match directory.tenants.iter_mut().find(|t| t.id == id) {
            Some(tenant) => {
                tenant.status = status;
                true
            }
            None => false,
        }
    }

    /// Look up a tenant by id.
    pub fn tenant(&self, id: TenantId) -> Option<Tenant> {
        self.inner
            .directory
            .read()
            .tenants
            .iter()
            .find(|t| t.id == id)
            .cloned()
    }

    /// Make the next tenant lookup fail.
    pub fn fail_next_lookup(&self) {
        self.inner.faults.lookup.store(true, Ordering::SeqCst);
    }

    /// Make the next session setup fail after applying its first setting.
    pub fn fail_next_establish(&self) {
        self.inner.faults.establish.store(true, Ordering::SeqCst);
    }

    /// Make the next session reset fail.
    pub fn fail_next_reset(&self) {
        self.inner.faults.reset.store(true, Ordering::SeqCst);
    }

    /// Make the next session reset hang for `delay` before it runs, like a
    /// statement stuck on a half-dead connection.
    pub fn stall_next_reset(&self, delay: Duration) {
        *self.inner.faults.reset_stall.lock() = Some(delay);
    }

    /// Connections returned to the pool so far.
    pub fn released_count(&self) -> usize {
        self.inner.released.load(Ordering::SeqCst)
    }

    /// Connections discarded so far, including ones dropped unreturned.
    pub fn discarded_count(&self) -> usize {
        self.inner.discarded.load(Ordering::SeqCst)
    }

    /// Connections opened so far.
    pub fn opened_count(&self) -> usize {
        (self.inner.next_id.load(Ordering::SeqCst) - 1) as usize
    }

    /// Stop handing out connections. Waiting and later acquires fail with
    /// [`TenancyError::PoolClosed`].
    pub fn close(&self) {
        self.inner.permits.close();
        let drained = self.inner.idle.lock().drain(..).count();
        self.inner.size.fetch_sub(drained, Ordering::SeqCst);
    }

    /// Check if the pool is closed.
    pub fn is_closed(&self) -> bool {
        self.inner.permits.is_closed()
    }

    async fn wait_for_permit(&self) -> TenancyResult<OwnedSemaphorePermit> {
        let inner = &self.inner;
        inner.waiting.fetch_add(1, Ordering::SeqCst);
        let _waiting = WaitGuard(&inner.waiting);

        match tokio::time::timeout(inner.acquire_timeout, inner.permits.clone().acquire_owned())
            .await
        {
            Ok(Ok(permit)) => Ok(permit),
            Ok(Err(_)) => Err(TenancyError::PoolClosed),
            Err(_) => Err(TenancyError::PoolTimeout),
        }
    }
}

struct WaitGuard<'a>(&'a AtomicUsize);

impl Drop for WaitGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A connection borrowed from a [`MemoryBackend`].
///
/// Dropping it without handing it back to the backend closes it.
#[derive(Debug)]
pub struct MemoryConnection {
    session: Option<Session>,
    inner: Arc<Inner>,
    _permit: OwnedSemaphorePermit,
}

impl MemoryConnection {
    fn session(&self) -> TenancyResult<&Session> {
        self.session
            .as_ref()
            .ok_or_else(|| TenancyError::connection("connection is closed"))
    }

    fn session_mut(&mut self) -> TenancyResult<&mut Session> {
        self.session
            .as_mut()
            .ok_or_else(|| TenancyError::connection("connection is closed"))
    }

    /// Connection identifier, stable across pool reuse.
    pub fn id(&self) -> u64 {
        self.session.as_ref().map_or(0, |s| s.id)
    }

    /// Raw value of a session setting, `None` if never set.
    pub fn current_setting(&self, name: &str) -> Option<&str> {
        self.session
            .as_ref()
            .and_then(|s| s.settings.get(name))
            .map(String::as_str)
    }

    /// Apply a session setting.
    pub fn set_config(&mut self, name: &str, value: &str) -> TenancyResult<()> {
        self.session_mut()?
            .settings
            .insert(name.to_string(), value.to_string());
        Ok(())
    }

    /// The tenant the session is scoped to. Empty settings count as unset.
    pub fn session_tenant(&self) -> Option<TenantId> {
        self.current_setting(self.inner.variables.tenant())
            .filter(|v| !v.is_empty())
            .and_then(|v| v.parse().ok())
    }

    /// The session's role marker.
    pub fn session_role(&self) -> Option<SessionRole> {
        match self.current_setting(self.inner.variables.role()) {
            Some("admin") => Some(SessionRole::Admin),
            Some("user") => Some(SessionRole::User),
            _ => None,
        }
    }

    fn can_see(&self, tenant: TenantId) -> bool {
        match self.session_role() {
            Some(SessionRole::Admin) => true,
            _ => self.session_tenant() == Some(tenant),
        }
    }

    /// Rows of `table` visible to the session.
    ///
    /// Admin sessions see every row; tenant sessions see their own rows;
    /// unscoped sessions see nothing.
    pub fn select(&self, table: &str) -> TenancyResult<Vec<MemoryRow>> {
        self.session()?;
        Ok(self
            .inner
            .rows
            .read()
            .iter()
            .filter(|r| r.table == table && self.can_see(r.tenant_id))
            .cloned()
            .collect())
    }

    /// Insert a row owned by the session's tenant.
    pub fn insert(&mut self, table: &str, payload: impl Into<String>) -> TenancyResult<MemoryRow> {
        let tenant = self
            .session_tenant()
            .ok_or_else(|| TenancyError::database("null value in column \"tenant_id\""))?;
        self.insert_for(table, tenant, payload)
    }

    /// Insert a row for an explicit tenant.
    ///
    /// Tenant sessions may only write their own rows.
    pub fn insert_for(
        &mut self,
        table: &str,
        tenant: TenantId,
        payload: impl Into<String>,
    ) -> TenancyResult<MemoryRow> {
        self.session()?;
        if !self.can_see(tenant) {
            return Err(TenancyError::database(format!(
                "new row violates row-level security policy for table \"{}\"",
                table
            )));
        }
        let row = MemoryRow {
            table: table.to_string(),
            tenant_id: tenant,
            payload: payload.into(),
        };
        self.inner.rows.write().push(row.clone());
        Ok(row)
    }
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            self.inner.size.fetch_sub(1, Ordering::SeqCst);
            self.inner.discarded.fetch_add(1, Ordering::SeqCst);
            trace!(connection = session.id, "connection closed");
        }
    }
}

#[async_trait]
impl SessionBackend for MemoryBackend {
    type Connection = MemoryConnection;

    async fn acquire(&self) -> TenancyResult<MemoryConnection> {
        if self.is_closed() {
            return Err(TenancyError::PoolClosed);
        }
        let permit = self.wait_for_permit().await?;

        let reused = self.inner.idle.lock().pop();
        let session = match reused {
            Some(session) => session,
            None => {
                self.inner.size.fetch_add(1, Ordering::SeqCst);
                let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
                debug!(connection = id, "opened connection");
                Session {
                    id,
                    settings: HashMap::new(),
                }
            }
        };

        Ok(MemoryConnection {
            session: Some(session),
            inner: Arc::clone(&self.inner),
            _permit: permit,
        })
    }

    async fn lookup_tenants(
        &self,
        conn: &mut MemoryConnection,
        host: &str,
    ) -> TenancyResult<Vec<TenantId>> {
        conn.session()?;
        if self.inner.faults.lookup.swap(false, Ordering::SeqCst) {
            return Err(TenancyError::database("injected lookup failure"));
        }

        let directory = self.inner.directory.read();
        let mut found = Vec::new();
        for domain in directory.domains.iter().filter(|d| d.matches(host)) {
            let active = directory
                .tenants
                .iter()
                .any(|t| t.id == domain.tenant_id && t.is_active());
            if active && !found.contains(&domain.tenant_id) {
                found.push(domain.tenant_id);
            }
            if found.len() == 2 {
                break;
            }
        }
        Ok(found)
    }

    async fn establish(&self, conn: &mut MemoryConnection, scope: &SessionScope) -> TenancyResult<()> {
        let fail = self.inner.faults.establish.swap(false, Ordering::SeqCst);
        for (name, value) in self.inner.variables.assignments(scope) {
            conn.set_config(name, &value)
                .map_err(|e| TenancyError::session_config(e.to_string()))?;
            if fail {
                return Err(TenancyError::session_config("injected setup failure"));
            }
        }
        Ok(())
    }

    async fn reset(&self, conn: &mut MemoryConnection) -> TenancyResult<()> {
        let stall = self.inner.faults.reset_stall.lock().take();
        if let Some(delay) = stall {
            tokio::time::sleep(delay).await;
        }
        if self.inner.faults.reset.swap(false, Ordering::SeqCst) {
            return Err(TenancyError::database("injected reset failure"));
        }
        for (name, value) in self.inner.variables.reset_assignments() {
            conn.set_config(name, &value)?;
        }
        Ok(())
    }

    fn release(&self, mut conn: MemoryConnection) {
        if let Some(session) = conn.session.take() {
            self.inner.released.fetch_add(1, Ordering::SeqCst);
            if self.is_closed() {
                self.inner.size.fetch_sub(1, Ordering::SeqCst);
            } else {
                self.inner.idle.lock().push(session);
            }
        }
    }

    fn discard(&self, conn: MemoryConnection) {
        drop(conn);
    }

    fn status(&self) -> PoolStatus {
        PoolStatus {
            available: self.inner.idle.lock().len(),
            size: self.inner.size.load(Ordering::SeqCst),
            max_size: self.inner.max_connections,
            waiting: self.inner.waiting.load(Ordering::SeqCst),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn backend_with(hosts: &[(&str, TenantId)]) -> MemoryBackend {
        let backend = MemoryBackend::new();
        for (host, id) in hosts {
            if backend.tenant(*id).is_none() {
                backend.add_tenant(Tenant::new(*id, host.to_string(), "free"));
            }
            backend.add_domain(Domain::new(host, *id));
        }
        backend
    }

    #[tokio::test]
    async fn test_lookup_is_case_insensitive_and_active_only() {
        let acme = TenantId::random();
        let backend = backend_with(&[("acme.example.com", acme)]);
        let mut conn = backend.acquire().await.unwrap();

        let ids = backend
            .lookup_tenants(&mut conn, "ACME.example.com")
            .await
            .unwrap();
        assert_eq!(ids, vec![acme]);

        backend.set_status(acme, TenantStatus::Inactive);
        let ids = backend
            .lookup_tenants(&mut conn, "acme.example.com")
            .await
            .unwrap();
        assert!(ids.is_empty());
    }

    #[tokio::test]
    async fn test_lookup_reports_duplicates() {
        let (a, b) = (TenantId::random(), TenantId::random());
        let backend = backend_with(&[("shared.example.com", a), ("shared.example.com", b)]);
        let mut conn = backend.acquire().await.unwrap();
        let ids = backend
            .lookup_tenants(&mut conn, "shared.example.com")
            .await
            .unwrap();
        assert_eq!(ids.len(), 2);
    }

    #[tokio::test]
    async fn test_settings_survive_release_until_reset() {
        let backend = MemoryBackend::builder().max_connections(1).build();
        let tenant = TenantId::random();

        let mut conn = backend.acquire().await.unwrap();
        backend
            .establish(&mut conn, &SessionScope::Tenant(tenant))
            .await
            .unwrap();
        backend.release(conn);

        let mut conn = backend.acquire().await.unwrap();
        assert_eq!(conn.session_tenant(), Some(tenant));

        backend.reset(&mut conn).await.unwrap();
        assert_eq!(conn.session_tenant(), None);
        assert_eq!(conn.current_setting("app.tenant_id"), Some(""));
        backend.release(conn);
    }

    #[tokio::test]
    async fn test_row_policy() {
        let backend = MemoryBackend::new();
        let (a, b) = (TenantId::random(), TenantId::random());

        let mut conn = backend.acquire().await.unwrap();
        backend.establish(&mut conn, &SessionScope::Tenant(a)).await.unwrap();
        conn.insert("contacts", "alice").unwrap();
        assert!(conn.insert_for("contacts", b, "mallory").is_err());

        backend.establish(&mut conn, &SessionScope::Tenant(b)).await.unwrap();
        conn.insert("contacts", "bob").unwrap();
        let rows = conn.select("contacts").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].payload, "bob");

        backend.reset(&mut conn).await.unwrap();
        assert!(conn.select("contacts").unwrap().is_empty());
        assert!(conn.insert("contacts", "nobody").is_err());

        backend.establish(&mut conn, &SessionScope::Admin).await.unwrap();
        assert_eq!(conn.select("contacts").unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_pool_accounting() {
        let backend = MemoryBackend::builder().max_connections(2).build();

        let first = backend.acquire().await.unwrap();
        let second = backend.acquire().await.unwrap();
        assert_eq!(backend.status().in_use(), 2);

        backend.release(first);
        backend.discard(second);
        let status = backend.status();
        assert_eq!(status.size, 1);
        assert_eq!(status.available, 1);
        assert_eq!(backend.released_count(), 1);
        assert_eq!(backend.discarded_count(), 1);
    }

    #[tokio::test]
    async fn test_acquire_timeout_and_close() {
        let backend = MemoryBackend::builder()
            .max_connections(1)
            .acquire_timeout(Duration::from_millis(20))
            .build();

        let held = backend.acquire().await.unwrap();
        assert!(matches!(
            backend.acquire().await,
            Err(TenancyError::PoolTimeout)
        ));
        assert_eq!(backend.status().waiting, 0);

        backend.release(held);
        backend.close();
        assert!(matches!(
            backend.acquire().await,
            Err(TenancyError::PoolClosed)
        ));
    }
}
