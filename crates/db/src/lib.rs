//! # platform-db: PostgreSQL data access
//!
//! A pooled connection wrapper ([`PgClient`]) and a transaction manager
//! ([`TxManager`]) that runs a unit of work inside a transaction, committing
//! on success and rolling back on error or panic.
//!
//! ```ignore
//! let client = PgClient::connect(&std::env::var("DATABASE_URL")?).await?;
//! let manager = client.tx_manager();
//!
//! manager
//!     .read_committed(&Context::background(), |ctx| async move {
//!         let tx = ctx.transaction().ok_or(DbError::TransactionClosed)?;
//!         tx.execute("INSERT INTO audit_log (action) VALUES ('login')").await?;
//!         Ok(())
//!     })
//!     .await?;
//!
//! client.close().await;
//! ```
//!
//! Transactions propagate through the [`Context`]: calling the manager again
//! with the context handed to the work joins the running transaction.

pub mod config;
pub mod context;
pub mod database;
pub mod error;
pub mod logging;
pub mod manager;
pub mod transaction;


pub use config::*;
pub use context::*;
pub use database::*;
pub use error::*;
pub use logging::*;
pub use manager::*;
pub use transaction::*;
