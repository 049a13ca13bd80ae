//! The resource store handle and its transaction lifecycle.
//!
//! A [`ResourceStore`] is constructed once at startup, cloned into whoever
//! needs it, and closed by dropping the last clone. Writes go through
//! [`ResourceStore::run_atomic`], which binds every statement of one logical
//! change to a single pooled connection:
//!
//! 1. acquire one connection from the pool
//! 2. `BEGIN IMMEDIATE` (take the store's write lock)
//! 3. run the body against that transaction
//! 4. commit on `Ok`, roll back on `Err` or panic
//! 5. hand the connection back to the pool on every path
//!
//! Steps 2 through 4 run on the blocking pool as one closure. Dropping the
//! caller's future does not interrupt them.

use rusqlite::TransactionBehavior;
use tracing::{debug, warn};

use gallery_core::ParentId;

use crate::connection::{SqliteConnectionManager, StoreConfig};
use crate::error::StorageError;
use crate::unit_of_work::{Snapshot, UnitOfWork};

#[derive(Clone)]
pub struct ResourceStore {
    pool: bb8::Pool<SqliteConnectionManager>,
}

impl ResourceStore {
    pub async fn open(config: &StoreConfig) -> Result<Self, StorageError> {
        let manager = SqliteConnectionManager::new(config);
        let builder = bb8::Pool::builder();
        let builder = match &config.path {
            Some(_) => builder.max_size(config.pool_size.max(1)),
            // Each in-memory connection is its own database: keep exactly one
            // and never let the pool recycle it.
            None => builder.max_size(1).max_lifetime(None).idle_timeout(None),
        };
        let pool = builder.build(manager).await?;
        let store = Self { pool };

        {
            let conn = store.connection().await?;
            conn.with_connection(|c| crate::schema::init_schema(c)).await?;
        }
        debug!(path = ?config.path, pool_size = config.pool_size, "resource store opened");
        Ok(store)
    }

    pub async fn open_in_memory() -> Result<Self, StorageError> {
        Self::open(&StoreConfig::memory()).await
    }

    async fn connection(
        &self,
    ) -> Result<bb8::PooledConnection<'_, SqliteConnectionManager>, StorageError> {
        self.pool
            .get()
            .await
            .map_err(|e| StorageError::Pool(e.to_string()))
    }

    /// Run `body` as one atomic unit of work scoped to `parent_id`.
    ///
    /// Errors returned by `body` are passed through unchanged after the
    /// rollback. Failures to begin or commit surface as
    /// [`StorageError::TransactionFailed`]. Nothing is retried here.
    pub async fn run_atomic<F, T, E>(&self, parent_id: ParentId, body: F) -> Result<T, E>
    where
        F: FnOnce(&UnitOfWork<'_>) -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: From<StorageError> + std::fmt::Display + Send + 'static,
    {
        let conn = self.connection().await?;
        conn.with_connection_mut(move |c| {
            let tx = c
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(|e| StorageError::TransactionFailed(format!("begin: {e}")))?;
            let unit = UnitOfWork {
                tx,
                scope: parent_id,
            };
            let outcome = body(&unit);
            match outcome {
                Ok(value) => {
                    unit.tx
                        .commit()
                        .map_err(|e| StorageError::TransactionFailed(format!("commit: {e}")))?;
                    debug!(%parent_id, "unit of work committed");
                    Ok(value)
                }
                Err(err) => {
                    if let Err(e) = unit.tx.rollback() {
                        warn!(%parent_id, "rollback failed: {e}");
                        return Err(StorageError::TransactionFailed(format!("rollback: {e}")).into());
                    }
                    debug!(%parent_id, "unit of work rolled back: {err}");
                    Err(err)
                }
            }
        })
        .await
    }

    /// Run `body` against one consistent read snapshot. Readers neither block
    /// writers nor wait for them.
    pub async fn read_snapshot<F, T, E>(&self, body: F) -> Result<T, E>
    where
        F: FnOnce(&Snapshot<'_>) -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: From<StorageError> + Send + 'static,
    {
        let conn = self.connection().await?;
        conn.with_connection_mut(move |c| {
            let tx = c
                .transaction_with_behavior(TransactionBehavior::Deferred)
                .map_err(StorageError::from)?;
            let snapshot = Snapshot { tx };
            let value = body(&snapshot)?;
            snapshot.tx.commit().map_err(StorageError::from)?;
            Ok(value)
        })
        .await
    }

    /// Execute raw SQL outside any unit of work. Only built for test fixtures
    /// that install triggers; resource and flag rows change through `run_atomic`.
    #[cfg(any(test, feature = "test-helpers"))]
    pub async fn execute_batch(&self, sql: &str) -> Result<(), StorageError> {
        let sql = sql.to_string();
        let conn = self.connection().await?;
        conn.with_connection(move |c| c.execute_batch(&sql).map_err(StorageError::from))
            .await
    }

    pub fn pool_state(&self) -> bb8::State {
        self.pool.state()
    }
}
