//! Session scoping for database-enforced row-level security.
//!
//! A scoped session carries two session-local settings that the database's
//! row-level security policies read:
//!
//! - the active tenant id (`app.tenant_id` by default)
//! - a role marker (`app.role`), either `user` or `admin`
//!
//! Tenant scope sets both; admin scope sets only the role, leaving the tenant
//! id unset so policies treat queries as unrestricted.
//!
//! ```rust
//! use tenantry_core::session::{SessionScope, SessionVariables};
//! use tenantry_core::TenantId;
//!
//! let vars = SessionVariables::default();
//! let tenant = TenantId::random();
//!
//! let set = vars.assignments(&SessionScope::Tenant(tenant));
//! assert_eq!(set[0], ("app.tenant_id", tenant.to_string()));
//! assert_eq!(set[1], ("app.role", "user".to_string()));
//!
//! let admin = vars.assignments(&SessionScope::Admin);
//! assert_eq!(admin, vec![("app.role", "admin".to_string())]);
//! ```

use std::fmt;

use crate::error::{TenancyError, TenancyResult};
use crate::tenant::TenantId;

/// Default setting name for the active tenant.
pub const DEFAULT_TENANT_VARIABLE: &str = "app.tenant_id";

/// Default setting name for the role marker.
pub const DEFAULT_ROLE_VARIABLE: &str = "app.role";

/// Role marker written into the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionRole {
    /// Ordinary tenant-restricted access.
    User,
    /// Unrestricted maintenance access.
    Admin,
}

impl SessionRole {
    /// The value written to the role setting.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Admin => "admin",
        }
    }
}

impl fmt::Display for SessionRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a borrowed connection is scoped to for one unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionScope {
    /// Restricted to one tenant's rows.
    Tenant(TenantId),
    /// Elevated role with no tenant restriction.
    Admin,
}

impl SessionScope {
    /// The tenant this scope is restricted to, if any.
    pub fn tenant_id(&self) -> Option<TenantId> {
        match self {
            Self::Tenant(id) => Some(*id),
            Self::Admin => None,
        }
    }

    /// The role marker for this scope.
    pub fn role(&self) -> SessionRole {
        match self {
            Self::Tenant(_) => SessionRole::User,
            Self::Admin => SessionRole::Admin,
        }
    }

    /// Check if this is the admin scope.
    pub fn is_admin(&self) -> bool {
        matches!(self, Self::Admin)
    }

    /// Short label used in logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Tenant(_) => "tenant",
            Self::Admin => "admin",
        }
    }
}

impl fmt::Display for SessionScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tenant(id) => write!(f, "tenant:{}", id),
            Self::Admin => f.write_str("admin"),
        }
    }
}

/// Names of the session settings read by row-level security policies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionVariables {
    tenant: String,
    role: String,
}

impl Default for SessionVariables {
    fn default() -> Self {
        Self {
            tenant: DEFAULT_TENANT_VARIABLE.to_string(),
            role: DEFAULT_ROLE_VARIABLE.to_string(),
        }
    }
}

impl SessionVariables {
    /// Create with custom setting names.
    ///
    /// Custom settings must be two-part names (`prefix.name`) made of ASCII
    /// letters, digits and underscores.
    pub fn new(tenant: impl Into<String>, role: impl Into<String>) -> TenancyResult<Self> {
        let tenant = tenant.into();
        let role = role.into();
        validate_name(&tenant)?;
        validate_name(&role)?;
        if tenant == role {
            return Err(TenancyError::config(format!(
                "tenant and role settings must differ, both are '{}'",
                tenant
            )));
        }
        Ok(Self { tenant, role })
    }

    /// Name of the tenant setting.
    pub fn tenant(&self) -> &str {
        &self.tenant
    }

    /// Name of the role setting.
    pub fn role(&self) -> &str {
        &self.role
    }

    /// Settings to apply for a scope, in application order.
    pub fn assignments(&self, scope: &SessionScope) -> Vec<(&str, String)> {
        match scope {
            SessionScope::Tenant(id) => vec![
                (self.tenant.as_str(), id.to_string()),
                (self.role.as_str(), SessionRole::User.as_str().to_string()),
            ],
            SessionScope::Admin => {
                vec![(self.role.as_str(), SessionRole::Admin.as_str().to_string())]
            }
        }
    }

    /// Settings that clear any scope before a connection is reused.
    pub fn reset_assignments(&self) -> Vec<(&str, String)> {
        vec![
            (self.tenant.as_str(), String::new()),
            (self.role.as_str(), String::new()),
        ]
    }
}

fn validate_name(name: &str) -> TenancyResult<()> {
    let valid_part = |part: &str| {
        !part.is_empty()
            && !part.starts_with(|c: char| c.is_ascii_digit())
            && part.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    };

    match name.split_once('.') {
        Some((prefix, rest)) if valid_part(prefix) && valid_part(rest) => Ok(()),
        _ => Err(TenancyError::config(format!(
            "invalid session setting name '{}', expected 'prefix.name'",
            name
        ))),
    }
}
