//! Tenant identity and directory records.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::TenancyError;

/// A unique identifier for a tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(Uuid);

impl TenantId {
    /// Wrap an existing UUID.
    pub const fn new(id: Uuid) -> Self {
        Self(id)
    }

    /// Generate a fresh random tenant ID.
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Convert to the inner UUID.
    pub fn into_inner(self) -> Uuid {
        self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for TenantId {
    fn from(u: Uuid) -> Self {
        Self(u)
    }
}

impl FromStr for TenantId {
    type Err = TenancyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| TenancyError::internal(format!("invalid tenant id '{}': {}", s, e)))
    }
}

/// Lifecycle status of a tenant. Deactivation replaces deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TenantStatus {
    /// The tenant can be resolved and served.
    #[default]
    Active,
    /// The tenant is suspended; its hosts no longer resolve.
    Inactive,
}

impl TenantStatus {
    /// The value stored in the `tenants.status` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
        }
    }

    /// Check if this status allows resolution.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }
}

impl fmt::Display for TenantStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TenantStatus {
    type Err = TenancyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(Self::Active),
            "inactive" => Ok(Self::Inactive),
            other => Err(TenancyError::internal(format!(
                "unknown tenant status '{}'",
                other
            ))),
        }
    }
}

/// One customer organization sharing the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    /// Tenant identifier.
    pub id: TenantId,
    /// Display name.
    pub name: String,
    /// Billing plan name.
    pub plan: String,
    /// Lifecycle status.
    pub status: TenantStatus,
}

impl Tenant {
    /// Create an active tenant.
    pub fn new(id: TenantId, name: impl Into<String>, plan: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            plan: plan.into(),
            status: TenantStatus::Active,
        }
    }

    /// Set the status.
    pub fn with_status(mut self, status: TenantStatus) -> Self {
        self.status = status;
        self
    }

    /// Check if the tenant is active.
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }
}

/// A hostname routed to exactly one tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Domain {
    /// Hostname, compared case-insensitively.
    pub hostname: String,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Whether this is the tenant's primary domain.
    pub is_primary: bool,
}

impl Domain {
    /// Create a non-primary domain. The hostname is stored lower-cased.
    pub fn new(hostname: impl AsRef<str>, tenant_id: TenantId) -> Self {
        Self {
            hostname: hostname.as_ref().trim().to_ascii_lowercase(),
            tenant_id,
            is_primary: false,
        }
    }

    /// Mark as the tenant's primary domain.
    pub fn primary(mut self) -> Self {
        self.is_primary = true;
        self
    }

    /// Case-insensitive hostname comparison.
    pub fn matches(&self, host: &str) -> bool {
        self.hostname.eq_ignore_ascii_case(host.trim())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tenant_id_parse() {
        let id = TenantId::random();
        let parsed: TenantId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);

        assert!("not-a-uuid".parse::<TenantId>().is_err());
    }

    #[test]
    fn test_tenant_status() {
        assert_eq!("active".parse::<TenantStatus>().unwrap(), TenantStatus::Active);
        assert_eq!(" Inactive ".parse::<TenantStatus>().unwrap(), TenantStatus::Inactive);
        assert!("deleted".parse::<TenantStatus>().is_err());
        assert_eq!(TenantStatus::Inactive.to_string(), "inactive");
    }

    #[test]
    fn test_tenant() {
        let tenant = Tenant::new(TenantId::random(), "Acme Ltd", "pro");
        assert!(tenant.is_active());

        let tenant = tenant.with_status(TenantStatus::Inactive);
        assert!(!tenant.is_active());
    }

    #[test]
    fn test_domain_matches() {
        let domain = Domain::new("Acme.Example.com", TenantId::random()).primary();
        assert_eq!(domain.hostname, "acme.example.com");
        assert!(domain.is_primary);
        assert!(domain.matches("ACME.example.COM"));
        assert!(!domain.matches("beta.example.com"));
    }
}
