//! Transaction manager
//!
//! Runs a unit of work inside a transaction. The work receives a [`Context`]
//! carrying the transaction handle; a nested call made with that context
//! joins the ambient transaction instead of beginning a new one, and only the
//! outermost call commits or rolls back.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tracing::{debug, warn};

use crate::context::Context;
use crate::error::{DbError, DbResult};
use crate::transaction::{DatabaseTransaction, Transactor, TxHandle, TxOptions};

/// Executes units of work with transactional guarantees
#[derive(Clone)]
pub struct TxManager {
    db: Arc<dyn Transactor>,
}

impl TxManager {
    pub fn new(db: Arc<dyn Transactor>) -> Self {
        Self { db }
    }

    /// Run `work` in a READ COMMITTED transaction
    pub async fn read_committed<F, Fut, T>(&self, ctx: &Context, work: F) -> DbResult<T>
    where
        F: FnOnce(Context) -> Fut,
        Fut: Future<Output = DbResult<T>>,
    {
        self.run_in_transaction(ctx, TxOptions::read_committed(), work)
            .await
    }

    /// Run `work` inside a transaction started with `options`, or inside the
    /// ambient transaction of `ctx` if there is one.
    ///
    /// On the outermost call the transaction is committed if `work` returns
    /// `Ok` and rolled back if it returns `Err`, panics, or outlives the
    /// context deadline. The returned error tells which of those happened:
    ///
    /// - [`DbError::TransactionStart`]: nothing ran
    /// - [`DbError::WorkExecution`] / [`DbError::WorkPanic`]: rolled back
    /// - [`DbError::Rollback`]: work failed and the rollback failed too
    /// - [`DbError::Commit`]: work succeeded but nothing was committed
    ///
    /// A nested call returns the result of `work` untouched, or
    /// [`DbError::DeadlineExceeded`] if `ctx` carries a deadline that passes
    /// first. The outer call decides whether to roll back.
    pub async fn run_in_transaction<F, Fut, T>(
        &self,
        ctx: &Context,
        options: TxOptions,
        work: F,
    ) -> DbResult<T>
    where
        F: FnOnce(Context) -> Fut,
        Fut: Future<Output = DbResult<T>>,
    {
        if let Some(ambient) = ctx.transaction() {
            if ambient.options() != options {
                // The ambient transaction keeps its own options.
                debug!(
                    tx_id = %ambient.id(),
                    requested = ?options,
                    ambient = ?ambient.options(),
                    "Nested transaction requested different options"
                );
            }
            debug!(tx_id = %ambient.id(), "Joining ambient transaction");
            return match ctx.deadline() {
                Some(deadline) => tokio::time::timeout_at(deadline, work(ctx.clone()))
                    .await
                    .map_err(|_| DbError::DeadlineExceeded)?,
                None => work(ctx.clone()).await,
            };
        }

        let tx = self
            .begin(ctx, options)
            .await
            .map_err(|e| DbError::TransactionStart(Box::new(e)))?;
        let handle = TxHandle::new(tx, options);
        debug!(tx_id = %handle.id(), isolation = %options.isolation_level, "Transaction started");

        let child = ctx.with_transaction(handle.clone());
        let result = execute(&child, work).await;
        drop(child);

        finalize(&handle, result).await
    }

    async fn begin(&self, ctx: &Context, options: TxOptions) -> DbResult<Box<dyn DatabaseTransaction>> {
        match ctx.deadline() {
            Some(deadline) => tokio::time::timeout_at(deadline, self.db.begin_tx(options))
                .await
                .map_err(|_| DbError::DeadlineExceeded)?,
            None => self.db.begin_tx(options).await,
        }
    }
}

/// Run the work, turning a panic or an elapsed deadline into an error
async fn execute<F, Fut, T>(ctx: &Context, work: F) -> DbResult<T>
where
    F: FnOnce(Context) -> Fut,
    Fut: Future<Output = DbResult<T>>,
{
    let fut = match std::panic::catch_unwind(AssertUnwindSafe(|| work(ctx.clone()))) {
        Ok(fut) => fut,
        Err(payload) => return Err(DbError::WorkPanic(panic_message(payload))),
    };

    let guarded = AssertUnwindSafe(fut).catch_unwind();
    let outcome = match ctx.deadline() {
        Some(deadline) => match tokio::time::timeout_at(deadline, guarded).await {
            Ok(outcome) => outcome,
            Err(_) => return Err(DbError::WorkExecution(Box::new(DbError::DeadlineExceeded))),
        },
        None => guarded.await,
    };

    match outcome {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(DbError::WorkExecution(Box::new(e))),
        Err(payload) => Err(DbError::WorkPanic(panic_message(payload))),
    }
}

/// Commit on success, roll back on failure. Runs once per top-level call.
async fn finalize<T>(handle: &TxHandle, result: DbResult<T>) -> DbResult<T> {
    let Some(tx) = handle.take().await else {
        return Err(DbError::TransactionClosed);
    };

    match result {
        Ok(value) => match tx.commit().await {
            Ok(()) => {
                debug!(tx_id = %handle.id(), "Transaction committed");
                Ok(value)
            }
            Err(e) => {
                warn!(tx_id = %handle.id(), "Failed to commit transaction: {}", e);
                Err(DbError::Commit(Box::new(e)))
            }
        },
        Err(cause) => match tx.rollback().await {
            Ok(()) => {
                debug!(tx_id = %handle.id(), "Transaction rolled back: {}", cause);
                Err(cause)
            }
            Err(e) => {
                warn!(tx_id = %handle.id(), "Failed to roll back transaction: {}", e);
                Err(DbError::Rollback {
                    cause: Box::new(cause),
                    rollback: Box::new(e),
                })
            }
        },
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_message_extraction() {
        assert_eq!(panic_message(Box::new("static str")), "static str");
        assert_eq!(panic_message(Box::new(String::from("owned"))), "owned");
        assert_eq!(panic_message(Box::new(42_u8)), "unknown panic payload");
    }
}
