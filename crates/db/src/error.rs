//! Error types for the data-access layer
//!
//! Every failure is returned to the caller. The variant of a [`DbError`]
//! returned by the transaction manager tells whether the unit of work was
//! committed, rolled back, or never started (see [`DbError::outcome`]).

/// Result type alias for database operations
pub type DbResult<T> = Result<T, DbError>;

/// Errors raised by the connection provider and the transaction manager
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// The pool could not be established (malformed URL, bad credentials,
    /// unreachable host)
    #[error("failed to connect to db: {0}")]
    Connection(#[source] sqlx::Error),

    /// Beginning the transaction failed; the work was never executed
    #[error("can't start transaction: {0}")]
    TransactionStart(#[source] Box<DbError>),

    /// The work returned an error and the transaction was rolled back
    #[error("failed to execute code inside transaction: {0}")]
    WorkExecution(#[source] Box<DbError>),

    /// The work panicked and the transaction was rolled back
    #[error("panic recovered: {0}")]
    WorkPanic(String),

    /// The work failed and rolling back failed as well
    #[error("rollback error: {rollback} (after: {cause})")]
    Rollback {
        cause: Box<DbError>,
        #[source]
        rollback: Box<DbError>,
    },

    /// The work succeeded but the commit failed
    #[error("commit transaction error: {0}")]
    Commit(#[source] Box<DbError>),

    /// The transaction behind a handle was already committed or rolled back
    #[error("transaction is no longer active")]
    TransactionClosed,

    /// The deadline carried by the execution context elapsed
    #[error("context deadline exceeded")]
    DeadlineExceeded,

    /// Pool-level failure
    #[error(transparent)]
    Pool(#[from] PoolError),

    /// Driver error raised while running a statement
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Caller-defined failure inside a unit of work
    #[error("query error: {0}")]
    Query(String),

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Configuration(String),
}

/// What happened to the effects of a unit of work that returned an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxOutcome {
    /// No transaction was started, nothing was executed
    NotStarted,
    /// The transaction was rolled back
    RolledBack,
    /// Rolling back failed; the server discards the transaction once the
    /// connection is released, so nothing was committed
    RollbackFailed,
    /// Commit failed, nothing was committed
    CommitFailed,
    /// The error did not come from transaction finalization
    Unknown,
}

impl DbError {
    /// Shorthand for a caller-defined failure inside a unit of work
    pub fn query(msg: impl Into<String>) -> Self {
        DbError::Query(msg.into())
    }

    /// Classify this error by the fate of the unit of work's effects
    pub fn outcome(&self) -> TxOutcome {
        match self {
            DbError::TransactionStart(_) => TxOutcome::NotStarted,
            DbError::WorkExecution(_) | DbError::WorkPanic(_) => TxOutcome::RolledBack,
            DbError::Rollback { .. } => TxOutcome::RollbackFailed,
            DbError::Commit(_) => TxOutcome::CommitFailed,
            _ => TxOutcome::Unknown,
        }
    }

    /// Whether the work (or a nested failure it caused) panicked
    pub fn is_panic(&self) -> bool {
        match self {
            DbError::WorkPanic(_) => true,
            DbError::WorkExecution(inner) => inner.is_panic(),
            DbError::Rollback { cause, .. } => cause.is_panic(),
            _ => false,
        }
    }
}

/// Connection pool error types
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("Connection acquisition failed: {0}")]
    AcquisitionFailed(#[source] sqlx::Error),

    #[error("Pool is closed")]
    PoolClosed,

    #[error("Connection timeout after {timeout}s")]
    ConnectionTimeout { timeout: u64 },
}
