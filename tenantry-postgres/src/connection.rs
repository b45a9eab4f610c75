//! Pooled connection handed to scoped work.

use deadpool_postgres::{Object, Transaction};
use tokio_postgres::{Row, Statement};
use tokio_postgres::types::ToSql;
use tracing::debug;

use crate::error::PgResult;

/// Statement parameters.
pub type Params<'a> = &'a [&'a (dyn ToSql + Sync)];

/// A pooled PostgreSQL connection with per-connection statement caching.
///
/// Dropping it returns the connection to its pool.
pub struct PgConnection {
    client: Object,
}

impl PgConnection {
    pub(crate) fn new(client: Object) -> Self {
        Self { client }
    }

    async fn prepared(&self, sql: &str) -> PgResult<Statement> {
        debug!(sql, "prepare (cached)");
        Ok(self.client.prepare_cached(sql).await?)
    }

    /// All rows of a query.
    pub async fn query(&self, sql: &str, params: Params<'_>) -> PgResult<Vec<Row>> {
        let stmt = self.prepared(sql).await?;
        Ok(self.client.query(&stmt, params).await?)
    }

    /// Exactly one row; zero or several rows is an error.
    pub async fn query_one(&self, sql: &str, params: Params<'_>) -> PgResult<Row> {
        let stmt = self.prepared(sql).await?;
        Ok(self.client.query_one(&stmt, params).await?)
    }

    /// At most one row.
    pub async fn query_opt(&self, sql: &str, params: Params<'_>) -> PgResult<Option<Row>> {
        let stmt = self.prepared(sql).await?;
        Ok(self.client.query_opt(&stmt, params).await?)
    }

    /// Run a statement, returning the affected row count.
    pub async fn execute(&self, sql: &str, params: Params<'_>) -> PgResult<u64> {
        let stmt = self.prepared(sql).await?;
        Ok(self.client.execute(&stmt, params).await?)
    }

    /// Run several `;`-separated statements without parameters or caching.
    pub async fn batch_execute(&self, sql: &str) -> PgResult<()> {
        debug!(sql, "batch");
        Ok(self.client.batch_execute(sql).await?)
    }

    /// Begin a transaction.
    ///
    /// Session settings applied before the transaction stay in force inside
    /// it.
    pub async fn transaction(&mut self) -> PgResult<PgTransaction<'_>> {
        Ok(PgTransaction {
            txn: self.client.transaction().await?,
        })
    }

    /// Check if the underlying connection has been closed.
    pub fn is_closed(&self) -> bool {
        self.client.is_closed()
    }

    /// Detach from the pool and close the connection.
    pub(crate) fn discard(self) {
        drop(Object::take(self.client));
    }
}

/// Transaction on a scoped connection. Rolled back on drop unless
/// committed.
pub struct PgTransaction<'a> {
    txn: Transaction<'a>,
}

impl PgTransaction<'_> {
    /// All rows of a query.
    pub async fn query(&self, sql: &str, params: Params<'_>) -> PgResult<Vec<Row>> {
        let stmt = self.txn.prepare_cached(sql).await?;
        Ok(self.txn.query(&stmt, params).await?)
    }

    /// At most one row.
    pub async fn query_opt(&self, sql: &str, params: Params<'_>) -> PgResult<Option<Row>> {
        let stmt = self.txn.prepare_cached(sql).await?;
        Ok(self.txn.query_opt(&stmt, params).await?)
    }

    /// Run a statement, returning the affected row count.
    pub async fn execute(&self, sql: &str, params: Params<'_>) -> PgResult<u64> {
        let stmt = self.txn.prepare_cached(sql).await?;
        Ok(self.txn.execute(&stmt, params).await?)
    }

    /// Make the transaction's writes durable.
    pub async fn commit(self) -> PgResult<()> {
        Ok(self.txn.commit().await?)
    }

    /// Undo the transaction's writes.
    pub async fn rollback(self) -> PgResult<()> {
        Ok(self.txn.rollback().await?)
    }
}
