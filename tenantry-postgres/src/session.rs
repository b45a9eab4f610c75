//! Session settings for row-level security.
//!
//! Settings are applied with `set_config(name, value, false)`, so they last
//! for the whole session rather than one transaction, and are parameterized
//! so neither names nor values are spliced into SQL.
//!
//! Policies must treat an empty tenant setting as unset, since resetting a
//! custom setting leaves `''` behind rather than removing it:
//!
//! ```sql
//! USING (
//!     current_setting('app.role', true) = 'admin'
//!     OR tenant_id = nullif(current_setting('app.tenant_id', true), '')::uuid
//! )
//! ```

use tenantry_core::SessionVariables;
use tokio_postgres::types::ToSql;

use crate::connection::PgConnection;
use crate::error::{PgError, PgResult};

/// `SELECT set_config($1, $2, false), ...` for `count` settings.
pub fn set_config_sql(count: usize) -> String {
    let calls: Vec<String> = (0..count)
        .map(|i| format!("set_config(${}, ${}, false)", i * 2 + 1, i * 2 + 2))
        .collect();
    format!("SELECT {}", calls.join(", "))
}

/// Apply settings in one round-trip.
pub async fn apply(conn: &PgConnection, assignments: &[(&str, String)]) -> PgResult<()> {
    if assignments.is_empty() {
        return Ok(());
    }
    let mut params: Vec<&(dyn ToSql + Sync)> = Vec::with_capacity(assignments.len() * 2);
    for (name, value) in assignments {
        params.push(name);
        params.push(value);
    }
    conn.query_one(&set_config_sql(assignments.len()), &params)
        .await?;
    Ok(())
}

/// DDL enabling tenant isolation on `table`, keyed by `column`.
///
/// The policy admits a row when the session role is `admin` or the row's
/// tenant matches the session tenant, for reads and writes alike. `FORCE`
/// makes it apply to the table owner too.
pub fn isolation_policy_sql(
    table: &str,
    column: &str,
    variables: &SessionVariables,
) -> PgResult<String> {
    validate_identifier(table)?;
    validate_identifier(column)?;

    let predicate = format!(
        "current_setting('{role}', true) = 'admin' \
         OR {column} = nullif(current_setting('{tenant}', true), '')::uuid",
        role = variables.role(),
        tenant = variables.tenant(),
        column = column,
    );

    Ok(format!(
        "ALTER TABLE {table} ENABLE ROW LEVEL SECURITY;\n\
         ALTER TABLE {table} FORCE ROW LEVEL SECURITY;\n\
         CREATE POLICY {table}_tenant_isolation ON {table}\n    \
         USING ({predicate})\n    \
         WITH CHECK ({predicate});",
        table = table,
        predicate = predicate,
    ))
}

fn validate_identifier(name: &str) -> PgResult<()> {
    let valid = !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(PgError::config(format!("invalid identifier '{}'", name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_set_config_sql() {
        assert_eq!(set_config_sql(1), "SELECT set_config($1, $2, false)");
        assert_eq!(
            set_config_sql(2),
            "SELECT set_config($1, $2, false), set_config($3, $4, false)"
        );
    }

    #[test]
    fn test_isolation_policy_sql() {
        let sql = isolation_policy_sql("contacts", "tenant_id", &SessionVariables::default())
            .unwrap();
        assert!(sql.contains("ALTER TABLE contacts FORCE ROW LEVEL SECURITY;"));
        assert!(sql.contains("CREATE POLICY contacts_tenant_isolation ON contacts"));
        assert!(sql.contains("current_setting('app.role', true) = 'admin'"));
        assert!(sql.contains("tenant_id = nullif(current_setting('app.tenant_id', true), '')::uuid"));
        assert_eq!(sql.matches("nullif").count(), 2);
    }

    #[test]
    fn test_isolation_policy_rejects_bad_identifiers() {
        let vars = SessionVariables::default();
        assert!(isolation_policy_sql("contacts; drop table tenants", "tenant_id", &vars).is_err());
        assert!(isolation_policy_sql("contacts", "Tenant-Id", &vars).is_err());
    }
}
