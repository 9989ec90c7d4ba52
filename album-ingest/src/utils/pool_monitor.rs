//! Transaction timing instrumentation
//!
//! Promotions hold a write transaction while files move, so the time a
//! connection stays checked out is worth logging. Everything that needs an
//! explicit transaction goes through [`begin_monitored`].

use album_common::{Error, Result};
use sqlx::{Sqlite, SqliteConnection, Transaction};
use std::time::Instant;

/// Transaction wrapper that logs acquisition and release timing
pub struct MonitoredTransaction<'c> {
    tx: Option<Transaction<'c, Sqlite>>,
    caller: &'static str,
    acquired_at: Instant,
}

impl<'c> MonitoredTransaction<'c> {
    fn new(tx: Transaction<'c, Sqlite>, caller: &'static str, acquired_at: Instant) -> Self {
        Self {
            tx: Some(tx),
            caller,
            acquired_at,
        }
    }

    /// Connection to run statements on inside the transaction
    pub fn conn(&mut self) -> &mut SqliteConnection {
        // commit/rollback consume self, so the transaction is always present here
        self.tx.as_mut().expect("transaction already consumed")
    }

    /// Commit and log how long the connection was held
    pub async fn commit(mut self) -> Result<()> {
        let held_ms = self.acquired_at.elapsed().as_millis();
        let tx = self.tx.take().expect("transaction already consumed");

        tx.commit().await.map_err(Error::Database)?;

        if held_ms > 2000 {
            tracing::warn!(
                caller = self.caller,
                held_ms,
                "Long transaction committed, writers were blocked meanwhile"
            );
        } else {
            tracing::debug!(caller = self.caller, held_ms, "Transaction committed");
        }

        Ok(())
    }

    /// Roll back and log how long the connection was held
    pub async fn rollback(mut self) -> Result<()> {
        let held_ms = self.acquired_at.elapsed().as_millis();
        let tx = self.tx.take().expect("transaction already consumed");

        tx.rollback().await.map_err(Error::Database)?;

        tracing::debug!(caller = self.caller, held_ms, "Transaction rolled back");
        Ok(())
    }
}

impl<'c> Drop for MonitoredTransaction<'c> {
    fn drop(&mut self) {
        if self.tx.is_some() {
            // sqlx rolls back a dropped transaction
            tracing::debug!(
                caller = self.caller,
                held_ms = self.acquired_at.elapsed().as_millis(),
                "Transaction dropped without commit"
            );
        }
    }
}

/// Begin a transaction, logging slow connection acquisition
pub async fn begin_monitored<'c>(
    pool: &'c sqlx::SqlitePool,
    caller: &'static str,
) -> Result<MonitoredTransaction<'c>> {
    let start = Instant::now();
    let tx = pool.begin().await.map_err(Error::Database)?;
    let wait_ms = start.elapsed().as_millis();

    if wait_ms > 1000 {
        tracing::warn!(caller, wait_ms, "Slow connection acquisition, pool may be saturated");
    } else {
        tracing::debug!(caller, wait_ms, "Transaction started");
    }

    Ok(MonitoredTransaction::new(tx, caller, Instant::now()))
}
