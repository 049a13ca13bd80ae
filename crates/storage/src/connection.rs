//! bb8 connection manager for rusqlite.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use rusqlite::Connection;
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::error::StorageError;

pub const DEFAULT_POOL_SIZE: u32 = 8;
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;

/// Where the resource store lives and how its pool is sized.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Database file. `None` opens a private in-memory database.
    pub path: Option<PathBuf>,
    pub pool_size: u32,
    /// How long a writer waits for the store's write lock before the unit of
    /// work fails with a transaction failure.
    pub busy_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: None,
            pool_size: DEFAULT_POOL_SIZE,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }
}

impl StoreConfig {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }

    pub fn memory() -> Self {
        Self::default()
    }

    pub fn with_pool_size(mut self, pool_size: u32) -> Self {
        self.pool_size = pool_size;
        self
    }

    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout_ms = timeout.as_millis() as u64;
        self
    }
}

pub struct SqliteConnectionManager {
    path: Option<PathBuf>,
    busy_timeout: Duration,
}

impl SqliteConnectionManager {
    pub fn new(config: &StoreConfig) -> Self {
        Self {
            path: config.path.clone(),
            busy_timeout: Duration::from_millis(config.busy_timeout_ms),
        }
    }

    fn create_connection(path: Option<&PathBuf>, busy_timeout: Duration) -> Result<Connection, StorageError> {
        let conn = match path {
            Some(path) => Connection::open(path)?,
            None => Connection::open_in_memory()?,
        };
        conn.busy_timeout(busy_timeout)?;
        crate::schema::configure_connection(&conn)?;
        Ok(conn)
    }
}

/// A pooled connection.
///
/// rusqlite connections are not `Sync`, so the connection sits behind a mutex
/// and every use runs on the blocking pool. The closure keeps its own handle
/// on the connection: if the awaiting future is dropped, the closure still
/// runs to the end.
pub struct PooledConnection {
    inner: Arc<Mutex<Connection>>,
}

impl PooledConnection {
    pub fn new(conn: Connection) -> Self {
        Self {
            inner: Arc::new(Mutex::new(conn)),
        }
    }

    pub async fn with_connection<F, T, E>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Connection) -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: From<StorageError> + Send + 'static,
    {
        let conn = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn.blocking_lock();
            f(&guard)
        })
        .await
        .map_err(|e| E::from(StorageError::TaskJoin(e.to_string())))?
    }

    pub async fn with_connection_mut<F, T, E>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut Connection) -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: From<StorageError> + Send + 'static,
    {
        let conn = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.blocking_lock();
            f(&mut guard)
        })
        .await
        .map_err(|e| E::from(StorageError::TaskJoin(e.to_string())))?
    }
}

impl bb8::ManageConnection for SqliteConnectionManager {
    type Connection = PooledConnection;
    type Error = StorageError;

    fn connect(&self) -> impl std::future::Future<Output = Result<Self::Connection, Self::Error>> + Send {
        let path = self.path.clone();
        let busy_timeout = self.busy_timeout;
        async move {
            tokio::task::spawn_blocking(move || {
                Self::create_connection(path.as_ref(), busy_timeout).map(PooledConnection::new)
            })
            .await
            .map_err(|e| StorageError::TaskJoin(e.to_string()))?
        }
    }

    fn is_valid(&self, conn: &mut Self::Connection) -> impl std::future::Future<Output = Result<(), Self::Error>> + Send {
        let inner = conn.inner.clone();
        async move {
            tokio::task::spawn_blocking(move || {
                let guard = inner.blocking_lock();
                guard.execute_batch("SELECT 1").map_err(StorageError::from)
            })
            .await
            .map_err(|e| StorageError::TaskJoin(e.to_string()))?
        }
    }

    fn has_broken(&self, _conn: &mut Self::Connection) -> bool {
        false
    }
}
