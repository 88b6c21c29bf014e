//! Per-test transactions that never commit.

use crate::{DbConn, DbHandle, DbTransaction, Result};

/// A transaction opened for one test and rolled back at its end.
///
/// Dropping it without calling [`TestTransaction::rollback`] also rolls back
/// (the driver does so when the connection returns to the pool).
pub struct TestTransaction {
    tx: DbTransaction,
    label: String,
}

impl TestTransaction {
    /// Begin a transaction on `db`.
    ///
    /// # Errors
    /// Returns an error if the transaction cannot be started.
    pub async fn begin(db: &DbHandle, label: impl Into<String>) -> Result<Self> {
        let label = label.into();
        let tx = db.begin().await?;
        tracing::debug!(test = %label, engine = ?db.engine(), "test transaction started");
        Ok(Self { tx, label })
    }

    /// Connection bound to the transaction.
    pub fn conn(&mut self) -> DbConn<'_> {
        self.tx.as_conn()
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Discard everything written through this transaction.
    ///
    /// # Errors
    /// Returns an error if the rollback fails.
    pub async fn rollback(self) -> Result<()> {
        self.tx.rollback().await?;
        tracing::debug!(test = %self.label, "test transaction rolled back");
        Ok(())
    }
}

impl std::fmt::Debug for TestTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestTransaction")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

#[cfg(all(test, feature = "sqlite"))]
mod tests {
    use super::*;
    use crate::{ConnectOpts, Params, QueryTemplate};
    use rowkit::{Materializer, SingleColumnMapper};
    use std::sync::Arc;

    async fn count(template: &QueryTemplate, conn: DbConn<'_>) -> i64 {
        template
            .query(
                conn,
                "SELECT count(*) FROM car",
                &Params::new(),
                &Materializer::MapRows(Arc::new(SingleColumnMapper::<i64>::new())),
            )
            .await
            .unwrap()
            .into_single()
            .unwrap()
    }

    #[tokio::test]
    async fn rollback_discards_writes() {
        let db = DbHandle::connect("sqlite::memory:", ConnectOpts::default())
            .await
            .unwrap();
        let template = QueryTemplate::default();
        {
            let mut conn = db.acquire().await.unwrap();
            conn.as_conn()
                .execute_raw("CREATE TABLE car (id INTEGER)")
                .await
                .unwrap();
        }

        let mut tx = TestTransaction::begin(&db, "rollback_discards_writes").await.unwrap();
        template
            .execute(tx.conn(), "INSERT INTO car (id) VALUES (:id)", &Params::new().bind("id", 1_i64))
            .await
            .unwrap();
        assert_eq!(count(&template, tx.conn()).await, 1);
        tx.rollback().await.unwrap();

        let mut conn = db.acquire().await.unwrap();
        assert_eq!(count(&template, conn.as_conn()).await, 0);
    }
}
