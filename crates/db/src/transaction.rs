//! Transaction primitives
//!
//! Isolation levels and options, the driver capability traits the manager is
//! written against, the shared [`TxHandle`] that work receives through its
//! [`Context`](crate::Context), and the PostgreSQL implementation on top of
//! `sqlx`.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{PgConnection, Postgres, Transaction as SqlxTransaction};
use tokio::sync::{MappedMutexGuard, Mutex, MutexGuard};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{DbError, DbResult};

/// Transaction isolation levels supported by PostgreSQL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IsolationLevel {
    /// Read Uncommitted - behaves as Read Committed on PostgreSQL
    ReadUncommitted,
    /// Read Committed - default PostgreSQL isolation level
    #[default]
    ReadCommitted,
    /// Repeatable Read - stronger consistency guarantees
    RepeatableRead,
    /// Serializable - highest isolation level
    Serializable,
}

impl IsolationLevel {
    /// Convert to SQL string for SET TRANSACTION ISOLATION LEVEL command
    pub fn as_sql(&self) -> &'static str {
        match self {
            IsolationLevel::ReadUncommitted => "READ UNCOMMITTED",
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        }
    }
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// Options applied when a transaction begins
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TxOptions {
    pub isolation_level: IsolationLevel,
    pub read_only: bool,
}

impl TxOptions {
    pub fn new(isolation_level: IsolationLevel) -> Self {
        Self {
            isolation_level,
            read_only: false,
        }
    }

    pub fn read_committed() -> Self {
        Self::new(IsolationLevel::ReadCommitted)
    }

    pub fn serializable() -> Self {
        Self::new(IsolationLevel::Serializable)
    }

    pub fn builder() -> TxOptionsBuilder {
        TxOptionsBuilder::default()
    }

    /// Statement issued right after BEGIN
    pub fn as_sql(&self) -> String {
        let mut sql = format!(
            "SET TRANSACTION ISOLATION LEVEL {}",
            self.isolation_level.as_sql()
        );
        if self.read_only {
            sql.push_str(", READ ONLY");
        }
        sql
    }
}

/// Builder for [`TxOptions`]
#[derive(Debug, Default)]
pub struct TxOptionsBuilder {
    options: TxOptions,
}

impl TxOptionsBuilder {
    pub fn isolation_level(mut self, level: IsolationLevel) -> Self {
        self.options.isolation_level = level;
        self
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.options.read_only = read_only;
        self
    }

    pub fn build(self) -> TxOptions {
        self.options
    }
}

/// An in-flight database transaction
#[async_trait]
pub trait DatabaseTransaction: Send {
    /// Execute a statement within the transaction, returning affected rows
    async fn execute(&mut self, sql: &str) -> DbResult<u64>;

    /// The underlying PostgreSQL connection, for typed `sqlx` queries
    fn connection(&mut self) -> Option<&mut PgConnection> {
        None
    }

    /// Commit the transaction
    async fn commit(self: Box<Self>) -> DbResult<()>;

    /// Rollback the transaction
    async fn rollback(self: Box<Self>) -> DbResult<()>;
}

/// Anything that can begin a transaction
#[async_trait]
pub trait Transactor: Send + Sync {
    async fn begin_tx(&self, options: TxOptions) -> DbResult<Box<dyn DatabaseTransaction>>;
}

/// Exclusive access to the transaction behind a [`TxHandle`]
pub type TxGuard<'a> = MappedMutexGuard<'a, dyn DatabaseTransaction>;

struct TxSlot {
    id: Uuid,
    tx: Mutex<Option<Box<dyn DatabaseTransaction>>>,
}

impl Drop for TxSlot {
    fn drop(&mut self) {
        if self.tx.get_mut().is_some() {
            warn!(
                tx_id = %self.id,
                "Transaction dropped without commit or rollback - the driver will roll it back"
            );
        }
    }
}

/// Shared reference to one in-flight transaction
///
/// Clones point at the same transaction. Once the manager has committed or
/// rolled it back, every access fails with [`DbError::TransactionClosed`].
#[derive(Clone)]
pub struct TxHandle {
    slot: Arc<TxSlot>,
    options: TxOptions,
}

impl TxHandle {
    pub(crate) fn new(tx: Box<dyn DatabaseTransaction>, options: TxOptions) -> Self {
        Self {
            slot: Arc::new(TxSlot {
                id: Uuid::new_v4(),
                tx: Mutex::new(Some(tx)),
            }),
            options,
        }
    }

    pub fn id(&self) -> Uuid {
        self.slot.id
    }

    /// Options the transaction was started with
    pub fn options(&self) -> TxOptions {
        self.options
    }

    pub async fn is_active(&self) -> bool {
        self.slot.tx.lock().await.is_some()
    }

    /// Lock the transaction for exclusive use
    pub async fn lock(&self) -> DbResult<TxGuard<'_>> {
        let guard = self.slot.tx.lock().await;
        MutexGuard::try_map(guard, |slot| slot.as_deref_mut())
            .map_err(|_| DbError::TransactionClosed)
    }

    /// Execute a statement within the transaction
    pub async fn execute(&self, sql: &str) -> DbResult<u64> {
        let mut tx = self.lock().await?;
        tx.execute(sql).await
    }

    /// Detach the transaction for finalization
    pub(crate) async fn take(&self) -> Option<Box<dyn DatabaseTransaction>> {
        self.slot.tx.lock().await.take()
    }
}

impl fmt::Debug for TxHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TxHandle")
            .field("id", &self.slot.id)
            .field("options", &self.options)
            .finish()
    }
}

/// PostgreSQL transaction backed by `sqlx`
pub struct PgTransaction {
    inner: SqlxTransaction<'static, Postgres>,
}

impl PgTransaction {
    /// Apply `options` to a freshly begun transaction
    pub async fn configure(
        mut tx: SqlxTransaction<'static, Postgres>,
        options: TxOptions,
    ) -> DbResult<Self> {
        let sql = options.as_sql();
        sqlx::query(&sql).execute(&mut *tx).await?;
        debug!("Transaction configured: {}", sql);
        Ok(Self { inner: tx })
    }
}

#[async_trait]
impl DatabaseTransaction for PgTransaction {
    async fn execute(&mut self, sql: &str) -> DbResult<u64> {
        let result = sqlx::query(sql).execute(&mut *self.inner).await?;
        Ok(result.rows_affected())
    }

    fn connection(&mut self) -> Option<&mut PgConnection> {
        Some(&mut *self.inner)
    }

    async fn commit(self: Box<Self>) -> DbResult<()> {
        self.inner.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> DbResult<()> {
        self.inner.rollback().await?;
        Ok(())
    }
}
