//! Logging setup controlled by environment variables.
//!
//! - `TENANTRY_DEBUG=true|1|yes` enables debug logging
//! - `TENANTRY_LOG_LEVEL=trace|debug|info|warn|error` sets the level
//! - `TENANTRY_LOG_FORMAT=json|pretty|compact` sets the format (default: json)
//!
//! Without the `tracing-subscriber` feature [`init`] does nothing and events
//! go to whatever subscriber the application installs.
//!
//! Every scoped call runs inside a `tenant_scope` span carrying `scope`,
//! `host` and, once resolved, `tenant_id`:
//!
//! ```rust,ignore
//! use tracing::{debug, warn};
//!
//! debug!(scope = scope.label(), "session scoped");
//! warn!(error = %err, "session reset failed, discarding connection");
//! ```

use std::env;
use std::sync::Once;

static INIT: Once = Once::new();

/// Check if `TENANTRY_DEBUG` is set to a truthy value.
pub fn is_debug_enabled() -> bool {
    env::var("TENANTRY_DEBUG")
        .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(false)
}

/// The level from `TENANTRY_LOG_LEVEL`, falling back to `debug` when
/// debugging is enabled and `warn` otherwise.
pub fn log_level() -> &'static str {
    let fallback = if is_debug_enabled() { "debug" } else { "warn" };
    match env::var("TENANTRY_LOG_LEVEL") {
        Ok(level) => match level.to_lowercase().as_str() {
            "trace" => "trace",
            "debug" => "debug",
            "info" => "info",
            "warn" => "warn",
            "error" => "error",
            _ => fallback,
        },
        Err(_) => fallback,
    }
}

/// The format from `TENANTRY_LOG_FORMAT`.
pub fn log_format() -> &'static str {
    env::var("TENANTRY_LOG_FORMAT")
        .map(|f| match f.to_lowercase().as_str() {
            "pretty" => "pretty",
            "compact" => "compact",
            _ => "json",
        })
        .unwrap_or("json")
}

/// Install a global subscriber. Later calls are no-ops.
///
/// Does nothing unless `TENANTRY_DEBUG` or `TENANTRY_LOG_LEVEL` is set.
pub fn init() {
    INIT.call_once(|| {
        if !is_debug_enabled() && env::var("TENANTRY_LOG_LEVEL").is_err() {
            return;
        }

        #[cfg(feature = "tracing-subscriber")]
        {
            use tracing_subscriber::{EnvFilter, fmt, prelude::*};

            let level = log_level();
            let filter = EnvFilter::try_new(format!(
                "tenantry={level},tenantry_core={level},tenantry_postgres={level},tenantry_axum={level}"
            ))
            .unwrap_or_else(|_| EnvFilter::new("warn"));

            let registry = tracing_subscriber::registry().with(filter);
            let installed = match log_format() {
                "json" => registry.with(fmt::layer().json()).try_init(),
                "compact" => registry.with(fmt::layer().compact()).try_init(),
                _ => registry.with(fmt::layer().pretty()).try_init(),
            };

            if installed.is_ok() {
                tracing::info!(level, format = log_format(), "tenantry logging initialized");
            }
        }
    });
}
