//! Execution context
//!
//! A [`Context`] travels explicitly through a call chain and carries the
//! ambient transaction, request-scoped values and an optional deadline.
//! Extending a context returns a new one; the parent keeps its own view.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::transaction::TxHandle;

type ValueMap = HashMap<TypeId, Arc<dyn Any + Send + Sync>>;

/// Immutable, cheaply cloneable request context
#[derive(Clone, Default)]
pub struct Context {
    tx: Option<TxHandle>,
    values: Arc<ValueMap>,
    deadline: Option<Instant>,
}

impl Context {
    /// Empty root context
    pub fn background() -> Self {
        Self::default()
    }

    /// The ambient transaction, if this call chain is inside one
    pub fn transaction(&self) -> Option<&TxHandle> {
        self.tx.as_ref()
    }

    pub fn in_transaction(&self) -> bool {
        self.tx.is_some()
    }

    /// Child context carrying `tx` as its ambient transaction
    pub fn with_transaction(&self, tx: TxHandle) -> Self {
        Self {
            tx: Some(tx),
            values: Arc::clone(&self.values),
            deadline: self.deadline,
        }
    }

    /// Child context with `value` stored under its type
    pub fn with_value<T: Any + Send + Sync>(&self, value: T) -> Self {
        let mut values = (*self.values).clone();
        values.insert(TypeId::of::<T>(), Arc::new(value));
        Self {
            tx: self.tx.clone(),
            values: Arc::new(values),
            deadline: self.deadline,
        }
    }

    pub fn value<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.values
            .get(&TypeId::of::<T>())
            .and_then(|v| v.downcast_ref::<T>())
    }

    /// Child context that expires at `deadline`. A child never outlives its
    /// parent: the earlier of the two deadlines wins.
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(current) if current < deadline => current,
            _ => deadline,
        };
        Self {
            tx: self.tx.clone(),
            values: Arc::clone(&self.values),
            deadline: Some(deadline),
        }
    }

    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("tx", &self.tx.as_ref().map(TxHandle::id))
            .field("values", &self.values.len())
            .field("deadline", &self.deadline)
            .finish()
    }
}
