//! Row decoding for directory records.

use tenantry_core::{Domain, Tenant, TenantId};
use tokio_postgres::Row;
use tokio_postgres::types::FromSql;
use uuid::Uuid;

use crate::error::{PgError, PgResult};

/// Extension trait for PostgreSQL rows.
pub trait PgRow {
    /// Get a column value by name.
    fn get_value<T>(&self, column: &str) -> PgResult<T>
    where
        T: for<'a> FromSql<'a>;

    /// Get a nullable column value by name.
    fn get_opt<T>(&self, column: &str) -> PgResult<Option<T>>
    where
        T: for<'a> FromSql<'a>;
}

impl PgRow for Row {
    fn get_value<T>(&self, column: &str) -> PgResult<T>
    where
        T: for<'a> FromSql<'a>,
    {
        self.try_get(column).map_err(|e| {
            PgError::deserialization(format!("failed to get column '{}': {}", column, e))
        })
    }

    fn get_opt<T>(&self, column: &str) -> PgResult<Option<T>>
    where
        T: for<'a> FromSql<'a>,
    {
        self.get_value::<Option<T>>(column)
    }
}

/// Trait for decoding a PostgreSQL row into a type.
pub trait FromPgRow: Sized {
    /// Decode from a PostgreSQL row.
    fn from_row(row: &Row) -> PgResult<Self>;
}

impl FromPgRow for Tenant {
    fn from_row(row: &Row) -> PgResult<Self> {
        let status: String = row.get_value("status")?;
        Ok(Tenant::new(
            TenantId::new(row.get_value::<Uuid>("id")?),
            row.get_value::<String>("name")?,
            row.get_value::<String>("plan")?,
        )
        .with_status(
            status
                .parse()
                .map_err(|e| PgError::deserialization(format!("{}", e)))?,
        ))
    }
}

impl FromPgRow for Domain {
    fn from_row(row: &Row) -> PgResult<Self> {
        let domain = Domain::new(
            row.get_value::<String>("hostname")?,
            TenantId::new(row.get_value::<Uuid>("tenant_id")?),
        );
        Ok(if row.get_value::<bool>("is_primary")? {
            domain.primary()
        } else {
            domain
        })
    }
}
