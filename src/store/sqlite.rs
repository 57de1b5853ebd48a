use std::ops::Deref;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use rusqlite::Connection;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::schema::SCHEMA;
use crate::error::{Error, Result};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(10);

/// Exclusive, non-transactional access to the connection.
pub type StoreConn = OwnedMutexGuard<Connection>;

/// Storage handle shared by every component.
///
/// Cloning is cheap. Writers serialize on one connection; reads go through a
/// second, query-only connection so they see the last committed snapshot
/// while a write transaction is open.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    reader: Arc<Mutex<Connection>>,
    lock_timeout: Duration,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref();
        let conn = Connection::open(db_path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        configure(&conn)?;

        let reader = Connection::open(db_path)?;
        configure(&reader)?;
        reader.pragma_update(None, "query_only", "ON")?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            reader: Arc::new(Mutex::new(reader)),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        })
    }

    /// A private in-memory database. It has a single connection, so reads
    /// share the writer's lock.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        configure(&conn)?;

        let conn = Arc::new(Mutex::new(conn));
        Ok(Self {
            reader: conn.clone(),
            conn,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        })
    }

    #[must_use]
    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    pub async fn initialize(&self) -> Result<()> {
        self.connection().await?.execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Returns a guard to the writer connection for single-statement writes.
    pub async fn connection(&self) -> Result<StoreConn> {
        self.lock(&self.conn).await
    }

    /// Returns a guard to the query-only connection. Never waits on an open
    /// write transaction of a file-backed store.
    pub async fn reader(&self) -> Result<StoreConn> {
        self.lock(&self.reader).await
    }

    async fn lock(&self, conn: &Arc<Mutex<Connection>>) -> Result<StoreConn> {
        tokio::time::timeout(self.lock_timeout, conn.clone().lock_owned())
            .await
            .map_err(|_| Error::Timeout("waiting for the storage lock".to_string()))
    }

    /// Starts a write transaction. The transaction rolls back unless
    /// [`StoreTx::commit`] is called.
    pub async fn begin(&self) -> Result<StoreTx> {
        let conn = self.connection().await?;
        conn.execute_batch("BEGIN IMMEDIATE")?;
        Ok(StoreTx {
            conn,
            finished: false,
        })
    }
}

/// A transaction scoped to one unit of work.
///
/// Dropping it without calling [`StoreTx::commit`] rolls back, which covers
/// early returns, `?` propagation, cancellation and unwinding panics alike.
pub struct StoreTx {
    conn: StoreConn,
    finished: bool,
}

impl StoreTx {
    pub fn commit(mut self) -> Result<()> {
        let result = self.conn.execute_batch("COMMIT");
        if result.is_ok() {
            self.finished = true;
        }
        result.map_err(Error::from)
    }

    pub fn rollback(mut self) -> Result<()> {
        self.finished = true;
        self.conn.execute_batch("ROLLBACK").map_err(Error::from)
    }
}

fn configure(conn: &Connection) -> Result<()> {
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    Ok(())
}

impl Deref for StoreTx {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        &self.conn
    }
}

impl Drop for StoreTx {
    fn drop(&mut self) {
        if self.finished || self.conn.is_autocommit() {
            return;
        }
        if let Err(e) = self.conn.execute_batch("ROLLBACK") {
            tracing::error!("Failed to roll back transaction: {e}");
        }
    }
}
