//! # khata-core: Pure Business Logic for the Khata Ledger
//!
//! This crate is the **heart** of the multi-location inventory and credit
//! settlement ledger. It contains all business logic as pure functions with
//! zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Khata Architecture                              │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │               UI / RPC layer (external consumers)               │   │
//! │  │    Checkout screen ──► Returns screen ──► Overdue screen        │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ khata-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌────────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │   money   │  │  checkout  │  │allocation │  │   │
//! │  │   │  Product  │  │   Money   │  │ CartLine   │  │oldest 1st │  │   │
//! │  │   │   Order   │  │  (cents)  │  │ Tender     │  │tie: created│ │   │
//! │  │   └───────────┘  └───────────┘  └────────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    khata-db (Database Layer)                    │   │
//! │  │        SQLite transactions, migrations, the four engines        │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Product, SalesOrder, Customer, etc.)
//! - [`money`] - Money type with integer arithmetic (no floating point!)
//! - [`error`] - Domain error types
//! - [`validation`] - Business rule validation
//! - [`checkout`] - Pure checkout planning (split, limit, status)
//! - [`allocation`] - Oldest-due-first payment allocation
//! - [`returns`] - Return planning (availability, refund, debt cancellation)
//!
//! ## Design Principles
//!
//! 1. **Pure Functions**: Every function is deterministic - same input = same output
//! 2. **No I/O**: Database, network, file system access is FORBIDDEN here
//! 3. **Integer Money**: All monetary values are in cents (i64) to avoid float errors
//! 4. **Explicit Errors**: All errors are typed, never strings or panics

// =============================================================================
// Module Declarations
// =============================================================================

pub mod allocation;
pub mod checkout;
pub mod error;
pub mod money;
pub mod returns;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================
// These allow users to do `use khata_core::Money` instead of
// `use khata_core::money::Money`

pub use error::{LedgerError, LedgerResult, ValidationError};
pub use money::Money;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum distinct lines allowed in a single checkout cart
///
/// ## Business Reason
/// Prevents runaway carts and ensures reasonable transaction sizes.
/// Can be made configurable per-store in future versions.
pub const MAX_CART_LINES: usize = 100;

/// Maximum quantity of a single line in a cart or return
///
/// ## Business Reason
/// Prevents accidental over-ordering (e.g., typing 1000 instead of 10).
pub const MAX_LINE_QUANTITY: i64 = 999;

/// Tolerance, in cents, when checking that a tendered cash/credit split
/// adds up to the cart total.
///
/// Callers that compute the split in floating point can be off by a
/// rounding step; one cent of slack absorbs that. Within tolerance the
/// credit portion is authoritative and cash is derived as total - credit.
pub const PAYMENT_SPLIT_TOLERANCE_CENTS: i64 = 1;

/// Grace period added to a credit order's due date when the caller does
/// not grant one. `allowed_until == due_date` under this default.
pub const DEFAULT_ALLOWED_DELAY_DAYS: i64 = 0;
