//! # khata-db: Database Layer for the Khata Ledger
//!
//! This crate provides database access for the khata inventory and credit
//! ledger. It uses SQLite for local storage with sqlx for async operations.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Khata Data Flow                                  │
//! │                                                                         │
//! │  Caller (till, counter, admin screen)                                   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     khata-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │    Engines    │    │ Repositories │  │   │
//! │  │   │   (pool.rs)   │    │  (engine/)    │    │ (repository/)│  │   │
//! │  │   │               │    │               │    │              │  │   │
//! │  │   │ SqlitePool    │    │ StockLedger   │    │ ProductRepo  │  │   │
//! │  │   │ Connection    │◄───│ CheckoutEng.  │    │ CustomerRepo │  │   │
//! │  │   │ Management    │    │ PaymentEng.   │    │ OrderRepo    │  │   │
//! │  │   │               │    │ ReturnsEng.   │    │ LocationRepo │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite Database (WAL mode, embedded migrations)                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The pure rules (money math, checkout planning, payment allocation,
//! return planning) live in khata-core; this crate binds them to storage
//! and owns the transaction boundaries.
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`engine`] - The four transactional engines
//! - [`repository`] - Read and admin-side access
//!
//! ## Usage
//!
//! ```rust,ignore
//! use khata_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("path/to/khata.db")).await?;
//!
//! // Sell 2 units for cash
//! let order = db.checkout().checkout(request).await?;
//!
//! // Settle a customer's whole balance, oldest dues first
//! let (payment, allocations) = db
//!     .payments()
//!     .pay_balance(&customer_id, 12_000, PaymentMethod::Cash)
//!     .await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod engine;
pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

#[cfg(test)]
pub(crate) mod test_support;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

// Engine re-exports for convenience
pub use engine::checkout::{CheckoutEngine, CheckoutRequest};
pub use engine::payment::PaymentAllocationEngine;
pub use engine::returns::{ReturnOutcome, ReturnRequest, ReturnsEngine};
pub use engine::stock::StockLedger;

// Repository re-exports for convenience
pub use repository::customer::{CustomerRepository, NewCustomer};
pub use repository::location::{LocationRepository, NewLocation};
pub use repository::order::OrderRepository;
pub use repository::product::{NewProduct, ProductRepository};
