//! Scoped execution: the only way to obtain a tenant-scoped connection.
//!
//! [`TenantScoper`] acquires a connection, resolves the tenant that owns a
//! host, configures the session, runs caller-supplied work and hands the
//! connection back to the pool on every exit path. Work receives a
//! [`ScopedSession`], which cannot be constructed outside this module, so
//! work never sees an unscoped connection.
//!
//! # Example
//!
//! ```rust,ignore
//! use tenantry_core::{TenancyError, TenantScoper};
//!
//! let scoper = TenantScoper::new(backend);
//!
//! let count = scoper
//!     .run_as_tenant("acme.example.com", |session| {
//!         Box::pin(async move {
//!             let rows = session.query("SELECT id FROM contacts", &[]).await?;
//!             Ok::<_, TenancyError>(rows.len())
//!         })
//!     })
//!     .await?;
//! ```
//!
//! # Release rules
//!
//! - Work finished (success or error), lookup failed, or session setup
//!   failed: the session settings are reset and the connection goes back to
//!   the pool. If the reset fails the connection is discarded instead.
//! - Cancelled, timed out, or the call's future was dropped mid-flight: the
//!   connection is discarded, never pooled. This includes the reset itself:
//!   a reset that outlives the deadline discards the connection.

use std::future::Future;
use std::ops::{Deref, DerefMut};
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, debug, field, info_span, warn};

use crate::backend::{PoolStatus, SessionBackend};
use crate::error::{TenancyError, TenancyResult};
use crate::session::SessionScope;
use crate::tenant::TenantId;

/// Future returned by scoped work.
pub type ScopedWork<'c, T, E> = BoxFuture<'c, Result<T, E>>;

/// Per-call cancellation and deadline.
#[derive(Debug, Clone, Default)]
pub struct ScopeOptions {
    timeout: Option<Duration>,
    cancel: Option<CancellationToken>,
}

impl ScopeOptions {
    /// Create options with no deadline and no cancellation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound the whole call, pool wait included.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Abort the call when `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// The configured timeout.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// The configured cancellation token.
    pub fn cancellation(&self) -> Option<&CancellationToken> {
        self.cancel.as_ref()
    }
}

/// A borrowed connection scoped to one tenant, or to the admin role.
///
/// Dereferences to the backend's connection type.
pub struct ScopedSession<'c, C> {
    conn: &'c mut C,
    scope: SessionScope,
}

impl<'c, C> ScopedSession<'c, C> {
    fn new(conn: &'c mut C, scope: SessionScope) -> Self {
        Self { conn, scope }
    }

    /// The scope the session was configured with.
    pub fn scope(&self) -> SessionScope {
        self.scope
    }

    /// The resolved tenant, for explicit `tenant_id` predicates.
    ///
    /// `None` in admin scope.
    pub fn tenant_id(&self) -> Option<TenantId> {
        self.scope.tenant_id()
    }

    /// Check if the session runs with the admin role.
    pub fn is_admin(&self) -> bool {
        self.scope.is_admin()
    }
}

impl<C> Deref for ScopedSession<'_, C> {
    type Target = C;

    fn deref(&self) -> &C {
        self.conn
    }
}

impl<C> DerefMut for ScopedSession<'_, C> {
    fn deref_mut(&mut self) -> &mut C {
        self.conn
    }
}

impl<C> std::fmt::Debug for ScopedSession<'_, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopedSession")
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

/// Runs units of work on tenant-scoped or admin-scoped connections.
///
/// Holds no state besides the backend; every call re-resolves its tenant.
pub struct TenantScoper<B> {
    backend: B,
    default_timeout: Option<Duration>,
}

impl<B: SessionBackend> TenantScoper<B> {
    /// Create a scoper over a backend.
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            default_timeout: None,
        }
    }

    /// Apply `timeout` to calls whose options carry none.
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = Some(timeout);
        self
    }

    /// Get the backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Current pool status.
    pub fn pool_status(&self) -> PoolStatus {
        self.backend.status()
    }

    /// Run `work` on a connection scoped to the tenant owning `host`.
    ///
    /// Fails with [`TenancyError::UnknownTenant`] without invoking `work`
    /// when no active tenant owns the host.
    pub async fn run_as_tenant<F, T, E>(&self, host: &str, work: F) -> Result<T, E>
    where
        F: for<'c> FnOnce(ScopedSession<'c, B::Connection>) -> ScopedWork<'c, T, E>,
        E: From<TenancyError>,
    {
        self.run_as_tenant_with(host, &ScopeOptions::default(), work)
            .await
    }

    /// [`run_as_tenant`](Self::run_as_tenant) with cancellation and deadline.
    pub async fn run_as_tenant_with<F, T, E>(
        &self,
        host: &str,
        options: &ScopeOptions,
        work: F,
    ) -> Result<T, E>
    where
        F: for<'c> FnOnce(ScopedSession<'c, B::Connection>) -> ScopedWork<'c, T, E>,
        E: From<TenancyError>,
    {
        let span = info_span!(
            "tenant_scope",
            scope = "tenant",
            host = %host,
            tenant_id = field::Empty
        );
        self.execute(Target::Host(host), options, work)
            .instrument(span)
            .await
    }

    /// Run `work` on a connection with the admin role and no tenant set.
    pub async fn run_as_admin<F, T, E>(&self, work: F) -> Result<T, E>
    where
        F: for<'c> FnOnce(ScopedSession<'c, B::Connection>) -> ScopedWork<'c, T, E>,
        E: From<TenancyError>,
    {
        self.run_as_admin_with(&ScopeOptions::default(), work).await
    }

    /// [`run_as_admin`](Self::run_as_admin) with cancellation and deadline.
    pub async fn run_as_admin_with<F, T, E>(&self, options: &ScopeOptions, work: F) -> Result<T, E>
    where
        F: for<'c> FnOnce(ScopedSession<'c, B::Connection>) -> ScopedWork<'c, T, E>,
        E: From<TenancyError>,
    {
        let span = info_span!("tenant_scope", scope = "admin");
        self.execute(Target::Admin, options, work)
            .instrument(span)
            .await
    }

    async fn execute<F, T, E>(&self, target: Target<'_>, options: &ScopeOptions, work: F) -> Result<T, E>
    where
        F: for<'c> FnOnce(ScopedSession<'c, B::Connection>) -> ScopedWork<'c, T, E>,
        E: From<TenancyError>,
    {
        let started = Instant::now();
        let interrupt = Interrupt::new(options, self.default_timeout, started);

        let conn = interrupt.guard(self.backend.acquire()).await??;
        let mut lease = Lease {
            backend: &self.backend,
            conn: Some(conn),
        };
        debug!("connection acquired");

        let scope = match target {
            Target::Admin => SessionScope::Admin,
            Target::Host(host) => {
                let found = interrupt
                    .guard(self.backend.lookup_tenants(lease.conn_mut()?, host))
                    .await;
                match found {
                    Err(interrupted) => {
                        lease.discard();
                        return Err(interrupted.into());
                    }
                    Ok(Err(err)) => {
                        let _ = lease.finish(&interrupt).await;
                        return Err(err.into());
                    }
                    Ok(Ok(ids)) => match ids.as_slice() {
                        [id] => {
                            Span::current().record("tenant_id", field::display(id));
                            SessionScope::Tenant(*id)
                        }
                        [] => {
                            warn!(host, "no active tenant for host");
                            let _ = lease.finish(&interrupt).await;
                            return Err(TenancyError::unknown_tenant(host).into());
                        }
                        many => {
                            warn!(host, matches = many.len(), "host resolves to several tenants");
                            let _ = lease.finish(&interrupt).await;
                            return Err(TenancyError::ambiguous_tenant(host, many.len()).into());
                        }
                    },
                }
            }
        };

        let established = interrupt
            .guard(self.backend.establish(lease.conn_mut()?, &scope))
            .await;
        match established {
            Err(interrupted) => {
                lease.discard();
                return Err(interrupted.into());
            }
            Ok(Err(err)) => {
                warn!(error = %err, "session setup failed");
                let _ = lease.finish(&interrupt).await;
                let err = match err {
                    err @ TenancyError::SessionConfig(_) => err,
                    other => TenancyError::session_config(other.to_string()),
                };
                return Err(err.into());
            }
            Ok(Ok(())) => debug!(scope = scope.label(), "session scoped"),
        }

        let outcome = {
            let session = ScopedSession::new(lease.conn_mut()?, scope);
            interrupt.guard(work(session)).await
        };

        match outcome {
            Ok(result) => {
                // a work error stays the caller's error even if the reset
                // was cut short
                if let Err(interrupted) = lease.finish(&interrupt).await {
                    if result.is_ok() {
                        return Err(interrupted.into());
                    }
                }
                debug!(
                    ok = result.is_ok(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "scoped work finished"
                );
                result
            }
            Err(interrupted) => {
                lease.discard();
                Err(interrupted.into())
            }
        }
    }
}

impl<B> std::fmt::Debug for TenantScoper<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantScoper")
            .field("default_timeout", &self.default_timeout)
            .finish_non_exhaustive()
    }
}

enum Target<'a> {
    Host(&'a str),
    Admin,
}

/// Exclusive hold on one connection for the length of a call.
///
/// Dropping a lease that still holds its connection discards it.
struct Lease<'a, B: SessionBackend> {
    backend: &'a B,
    conn: Option<B::Connection>,
}

impl<B: SessionBackend> Lease<'_, B> {
    fn conn_mut(&mut self) -> TenancyResult<&mut B::Connection> {
        self.conn
            .as_mut()
            .ok_or_else(|| TenancyError::internal("connection already returned to the pool"))
    }

    /// Reset the session and return the connection, or discard it if the
    /// reset fails.
    ///
    /// The reset runs under the call's deadline and cancellation. When they
    /// fire the connection is discarded and the interruption is returned.
    async fn finish(mut self, interrupt: &Interrupt<'_>) -> TenancyResult<()> {
        let reset = match self.conn.as_mut() {
            Some(conn) => interrupt.guard(self.backend.reset(conn)).await,
            None => return Ok(()),
        };
        let Some(conn) = self.conn.take() else {
            return Ok(());
        };
        match reset {
            Ok(Ok(())) => {
                self.backend.release(conn);
                debug!("connection released");
                Ok(())
            }
            Ok(Err(err)) => {
                warn!(error = %err, "session reset failed, discarding connection");
                self.backend.discard(conn);
                Ok(())
            }
            Err(interrupted) => {
                warn!(error = %interrupted, "session reset interrupted, discarding connection");
                self.backend.discard(conn);
                Err(interrupted)
            }
        }
    }

    fn discard(mut self) {
        if let Some(conn) = self.conn.take() {
            warn!("discarding connection interrupted mid-operation");
            self.backend.discard(conn);
        }
    }
}

impl<B: SessionBackend> Drop for Lease<'_, B> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            warn!("scoped call dropped mid-flight, discarding connection");
            self.backend.discard(conn);
        }
    }
}

struct Interrupt<'a> {
    cancel: Option<&'a CancellationToken>,
    deadline: Option<(Instant, Duration)>,
}

impl<'a> Interrupt<'a> {
    fn new(options: &'a ScopeOptions, default_timeout: Option<Duration>, started: Instant) -> Self {
        Self {
            cancel: options.cancel.as_ref(),
            deadline: options
                .timeout
                .or(default_timeout)
                .map(|timeout| (started + timeout, timeout)),
        }
    }

    /// Race `fut` against cancellation and the deadline.
    async fn guard<Fut: Future>(&self, fut: Fut) -> TenancyResult<Fut::Output> {
        tokio::select! {
            biased;
            _ = cancelled(self.cancel) => Err(TenancyError::Cancelled),
            _ = expired(self.deadline) => {
                let ms = self.deadline.map_or(0, |(_, t)| t.as_millis() as u64);
                Err(TenancyError::Timeout(ms))
            }
            out = fut => Ok(out),
        }
    }
}

async fn cancelled(token: Option<&CancellationToken>) {
    match token {
        Some(token) => token.cancelled().await,
        None => std::future::pending().await,
    }
}

async fn expired(deadline: Option<(Instant, Duration)>) {
    match deadline {
        Some((at, _)) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
