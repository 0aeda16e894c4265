//! # Engine Module
//!
//! The four transactional engines of the ledger. Every mutation of stock
//! quantities, order outstanding amounts, or customer balances goes through
//! exactly one of them, each call one SQLite transaction.
//!
//! ## The Four Engines
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  StockLedger               manual adjust / recount / views / history    │
//! │  CheckoutEngine            order + items + stock decrement + balance    │
//! │  PaymentAllocationEngine   pay one order or the whole balance           │
//! │  ReturnsEngine             restock + refund + debt cancellation         │
//! │                                                                         │
//! │  A business error from any engine guarantees the transaction rolled     │
//! │  back and nothing was mutated.                                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use sqlx::{Sqlite, SqlitePool, Transaction};

use crate::error::DbResult;

pub mod checkout;
pub mod payment;
pub mod returns;
pub mod stock;

pub use checkout::{CheckoutEngine, CheckoutRequest};
pub use payment::PaymentAllocationEngine;
pub use returns::{ReturnsEngine, ReturnRequest};
pub use stock::StockLedger;

/// Opens a mutating engine transaction with the write lock taken up front.
///
/// A deferred transaction that reads before its first write cannot upgrade
/// its lock once another writer has committed in between; SQLite reports
/// SQLITE_BUSY_SNAPSHOT immediately and `busy_timeout` never applies to
/// that upgrade. `BEGIN IMMEDIATE` makes concurrent writers queue on
/// `busy_timeout` instead, so every engine mutation starts here.
pub(crate) async fn begin_write(pool: &SqlitePool) -> DbResult<Transaction<'static, Sqlite>> {
    Ok(pool.begin_with("BEGIN IMMEDIATE").await?)
}
