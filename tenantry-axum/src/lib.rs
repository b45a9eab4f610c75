//! Axum framework integration for tenantry.
//!
//! # Features
//!
//! - **Layer**: [`TenancyLayer`] makes a [`TenantScoper`] available to every
//!   handler
//! - **Extractors**: [`TenantHost`] resolves the request's canonical host,
//!   [`Tenancy`] hands out the scoper
//! - **Error responses**: [`TenancyRejection`] maps every [`TenancyError`] to
//!   a status code and a JSON body
//!
//! # Example
//!
//! ```rust,ignore
//! use axum::{Router, routing::get};
//! use tenantry_axum::{Tenancy, TenancyLayer, TenancyRejection, TenantHost};
//! use tenantry_core::TenancyError;
//! use tenantry_postgres::PgBackend;
//!
//! async fn count_contacts(
//!     tenancy: Tenancy<PgBackend>,
//!     TenantHost(host): TenantHost,
//! ) -> Result<String, TenancyRejection> {
//!     let count = tenancy
//!         .run_as_tenant(&host, |session| {
//!             Box::pin(async move {
//!                 let row = session.query_one("SELECT count(*) FROM contacts", &[]).await?;
//!                 Ok::<i64, TenancyError>(row.get(0))
//!             })
//!         })
//!         .await?;
//!     Ok(count.to_string())
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let scoper = tenantry_postgres::connect(&tenantry_core::TenancyConfig::from_env()?)?;
//!
//!     let app = Router::new()
//!         .route("/contacts/count", get(count_contacts))
//!         .layer(TenancyLayer::new(scoper));
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```

use std::ops::Deref;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::{
    Json,
    extract::FromRequestParts,
    response::{IntoResponse, Response},
};
use http::{Request, StatusCode, request::Parts};
use serde_json::json;
use tenantry_core::{SessionBackend, TenancyError, TenantScoper, resolve_host};
use thiserror::Error;
use tower::{Layer, Service};
use tracing::{debug, error};

/// A [`TenancyError`] rendered as an HTTP response.
#[derive(Error, Debug)]
#[error(transparent)]
pub struct TenancyRejection(pub TenancyError);

impl From<TenancyError> for TenancyRejection {
    fn from(err: TenancyError) -> Self {
        Self(err)
    }
}

/// HTTP status for a tenancy error.
pub fn status_for(err: &TenancyError) -> StatusCode {
    match err {
        TenancyError::MissingHost => StatusCode::BAD_REQUEST,
        TenancyError::UnknownTenant { .. } => StatusCode::NOT_FOUND,
        TenancyError::SessionConfig(_)
        | TenancyError::PoolTimeout
        | TenancyError::PoolClosed
        | TenancyError::Connection(_)
        | TenancyError::Cancelled
        | TenancyError::Timeout(_) => StatusCode::SERVICE_UNAVAILABLE,
        TenancyError::AmbiguousTenant { .. }
        | TenancyError::Database(_)
        | TenancyError::Config(_)
        | TenancyError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for TenancyRejection {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            error!(code = %self.0.code(), error = %self.0, "request failed");
        }

        // server-side detail stays in the log
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            self.0.code().description().to_string()
        } else {
            self.0.to_string()
        };

        let body = json!({
            "error": self.0.code().code(),
            "message": message,
        });
        (status, Json(body)).into_response()
    }
}

/// The canonical host of the request: `x-forwarded-host` or `host`, without
/// port, lower-cased.
///
/// Rejects with `400 Bad Request` when neither header is usable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantHost(pub String);

impl<S> FromRequestParts<S> for TenantHost
where
    S: Send + Sync,
{
    type Rejection = TenancyRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(TenantHost(resolve_host(&parts.headers)?))
    }
}

/// Shared handle to a [`TenantScoper`].
///
/// Extracted from request extensions populated by [`TenancyLayer`], or used
/// directly as router state.
pub struct Tenancy<B>(Arc<TenantScoper<B>>);

impl<B> Tenancy<B> {
    /// Wrap a scoper.
    pub fn new(scoper: TenantScoper<B>) -> Self {
        Self(Arc::new(scoper))
    }
}

impl<B> Clone for Tenancy<B> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<B> Deref for Tenancy<B> {
    type Target = TenantScoper<B>;

    fn deref(&self) -> &TenantScoper<B> {
        &self.0
    }
}

impl<B, S> FromRequestParts<S> for Tenancy<B>
where
    B: SessionBackend + 'static,
    S: Send + Sync,
{
    type Rejection = TenancyRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Tenancy<B>>()
            .cloned()
            .ok_or_else(|| TenancyError::internal("TenancyLayer is not installed").into())
    }
}

/// Tower layer that attaches a [`Tenancy`] to every request.
pub struct TenancyLayer<B> {
    tenancy: Tenancy<B>,
}

impl<B> TenancyLayer<B> {
    /// Create a layer over a scoper.
    pub fn new(scoper: TenantScoper<B>) -> Self {
        Self {
            tenancy: Tenancy::new(scoper),
        }
    }

    /// Create a layer over an existing handle.
    pub fn from_tenancy(tenancy: Tenancy<B>) -> Self {
        Self { tenancy }
    }
}

impl<B> Clone for TenancyLayer<B> {
    fn clone(&self) -> Self {
        Self {
            tenancy: self.tenancy.clone(),
        }
    }
}

impl<S, B> Layer<S> for TenancyLayer<B> {
    type Service = TenancyMiddleware<S, B>;

    fn layer(&self, inner: S) -> Self::Service {
        TenancyMiddleware {
            inner,
            tenancy: self.tenancy.clone(),
        }
    }
}

/// Tower middleware service installed by [`TenancyLayer`].
pub struct TenancyMiddleware<S, B> {
    inner: S,
    tenancy: Tenancy<B>,
}

impl<S: Clone, B> Clone for TenancyMiddleware<S, B> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            tenancy: self.tenancy.clone(),
        }
    }
}

impl<S, B, ReqBody> Service<Request<ReqBody>> for TenancyMiddleware<S, B>
where
    S: Service<Request<ReqBody>>,
    B: SessionBackend + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request<ReqBody>) -> Self::Future {
        debug!(uri = %request.uri(), "attaching tenancy to request");
        request.extensions_mut().insert(self.tenancy.clone());
        self.inner.call(request)
    }
}

/// Prelude for convenient imports.
pub mod prelude {
    pub use super::{Tenancy, TenancyLayer, TenancyMiddleware, TenancyRejection, TenantHost};
}
