//! # Domain Types
//!
//! Core domain types for the khata ledger.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Product      │   │   StockLevel    │   │ StockAdjustment │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (UUID)      │   │  product_id ┐   │   │  delta          │       │
//! │  │  sku (business) │   │  location_id┴PK │   │  resulting qty  │       │
//! │  │  price cents    │   │  quantity ≥ 0   │   │  reason, actor  │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Customer     │   │   SalesOrder    │   │    Payment      │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  credit_limit   │   │  cash / credit  │   │  order_id or    │       │
//! │  │  balance =      │   │  outstanding    │   │  NULL (balance  │       │
//! │  │  Σ outstanding  │   │  due, allowed   │   │  payment)       │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Dual-Key Identity Pattern
//! Every entity has:
//! - `id`: UUID v4 - immutable, used for database relations
//! - Business ID where one exists: (sku, order_number) - human-readable
//!
//! ## Source of Truth
//! `SalesOrder`, `Payment`, `Return`, and `StockAdjustment` are the event
//! records; `StockLevel.current_quantity` and `Customer.current_balance_cents`
//! are derived-but-cached aggregates that only the engines may write.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::Money;

// =============================================================================
// Location
// =============================================================================

/// The kind of a stock location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum LocationType {
    /// Back-of-house storage, not customer facing.
    Warehouse,
    /// A retail store front.
    Store,
}

/// A warehouse or store where physical quantity is tracked independently.
///
/// Created via admin action; never deleted while stock references it.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Location {
    pub id: String,
    pub name: String,
    pub location_type: LocationType,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Product
// =============================================================================

/// A product available for sale.
///
/// Stock is NOT a field here: quantity lives per-location in [`StockLevel`].
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Product {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Stock Keeping Unit - business identifier, unique.
    pub sku: String,

    /// Display name shown on order lines and returns.
    pub name: String,

    /// Purchase cost in cents (for margin reporting, advisory).
    pub unit_cost_cents: Option<i64>,

    /// Selling price in cents. Order lines snapshot this at checkout.
    pub selling_price_cents: i64,

    /// Whether product is active (soft delete).
    pub is_active: bool,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Returns the selling price as a Money type.
    #[inline]
    pub fn selling_price(&self) -> Money {
        Money::from_cents(self.selling_price_cents)
    }
}

// =============================================================================
// Stock Level
// =============================================================================

/// Per-(product, location) quantity record.
///
/// ## Invariants
/// - `current_quantity >= 0` always
/// - One row per pair, created lazily on first adjustment
/// - Reconstructible by replaying [`StockAdjustment`] records from zero
///
/// `min_level` / `max_level` are advisory reorder bounds, never enforced.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct StockLevel {
    pub product_id: String,
    pub location_id: String,
    pub current_quantity: i64,
    pub min_level: Option<i64>,
    pub max_level: Option<i64>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

/// Immutable append-only record of one stock mutation.
///
/// Every successful StockLedger call writes exactly one of these in the
/// same transaction as the quantity change. Replaying `delta` from zero
/// reproduces `StockLevel.current_quantity`.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct StockAdjustment {
    pub id: String,
    pub product_id: String,
    pub location_id: String,
    /// Relative change applied (negative for sales).
    pub delta: i64,
    /// Quantity after the change, denormalized for audit readability.
    pub resulting_quantity: i64,
    /// Why the stock moved: "sale", "return", "recount", free text for manual.
    pub reason: String,
    /// Who caused the movement (cashier id, "system", etc.).
    pub actor: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// Aggregate stock view for one product across locations.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StockSummary {
    pub product_id: String,
    /// Sum of `current_quantity` over all locations.
    pub total_quantity: i64,
    pub levels: Vec<StockLevel>,
}

// =============================================================================
// Customer
// =============================================================================

/// A customer with a credit line.
///
/// `current_balance_cents` is derived: it equals the sum of
/// `credit_outstanding_cents` over the customer's orders at all times.
/// Only the checkout, payment, and returns engines write it.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Customer {
    pub id: String,
    pub name: String,
    pub phone: Option<String>,
    /// Maximum total credit this customer may carry. Zero means cash only.
    pub credit_limit_cents: i64,
    /// Running unpaid credit across orders. Never negative.
    pub current_balance_cents: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Customer {
    /// Returns the credit limit as Money.
    #[inline]
    pub fn credit_limit(&self) -> Money {
        Money::from_cents(self.credit_limit_cents)
    }

    /// Returns the current balance as Money.
    #[inline]
    pub fn current_balance(&self) -> Money {
        Money::from_cents(self.current_balance_cents)
    }

    /// Credit headroom left before the limit: `limit - balance`.
    #[inline]
    pub fn available_credit(&self) -> Money {
        self.credit_limit().saturating_sub(self.current_balance())
    }
}

// =============================================================================
// Payment Status
// =============================================================================

/// Settlement state of a sales order's credit portion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Fully settled: no outstanding credit (cash sales start here).
    Paid,
    /// Some but not all of the credit portion has been paid.
    PartiallyPaid,
    /// Credit portion exists and nothing has been paid yet.
    Pending,
    /// Outstanding credit past `allowed_until`.
    Overdue,
}

impl Default for PaymentStatus {
    fn default() -> Self {
        PaymentStatus::Pending
    }
}

// =============================================================================
// Payment Method
// =============================================================================

/// How a settlement payment was tendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Card,
    BankTransfer,
    MobileWallet,
}

// =============================================================================
// Sales Order
// =============================================================================

/// A completed sale, created once at checkout.
///
/// Mutated only by the payment engine (`credit_outstanding_cents`,
/// `payment_status`) and the returns engine (outstanding reduction).
/// Never deleted; corrections happen via returns.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct SalesOrder {
    pub id: String,
    /// Human-readable business identifier, `SO-YYYYMMDD-NNNN`.
    pub order_number: String,
    pub customer_id: String,
    /// Location the goods left from (default restock target for returns).
    pub location_id: String,
    /// Σ(unit_price × quantity) over the lines, frozen at checkout.
    pub subtotal_cents: i64,
    /// Cash collected at checkout.
    pub amount_paid_cents: i64,
    /// Portion charged to the customer's credit line at checkout.
    pub amount_to_credit_cents: i64,
    /// Unpaid remainder of the credit portion. Starts equal to
    /// `amount_to_credit_cents`, reduced by payments and returns.
    pub credit_outstanding_cents: i64,
    pub payment_status: PaymentStatus,
    /// Set when a credit portion exists.
    #[ts(as = "Option<String>")]
    pub due_date: Option<DateTime<Utc>>,
    /// `due_date` plus the granted grace days; overdue after this.
    #[ts(as = "Option<String>")]
    pub allowed_until: Option<DateTime<Utc>>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl SalesOrder {
    /// Returns the unpaid credit portion as Money.
    #[inline]
    pub fn credit_outstanding(&self) -> Money {
        Money::from_cents(self.credit_outstanding_cents)
    }

    /// True if any credit remains unpaid.
    #[inline]
    pub fn has_outstanding(&self) -> bool {
        self.credit_outstanding_cents > 0
    }
}

/// A line item in a sales order.
/// Uses snapshot pattern to freeze product data at time of sale.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct OrderItem {
    pub id: String,
    pub order_id: String,
    pub product_id: String,
    /// SKU at time of sale (frozen).
    pub sku_snapshot: String,
    /// Product name at time of sale (frozen).
    pub name_snapshot: String,
    /// Unit price in cents at time of sale (frozen). Refunds always use
    /// this, never the current product price.
    pub unit_price_cents: i64,
    pub quantity: i64,
    /// unit_price × quantity.
    pub line_total_cents: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl OrderItem {
    /// Returns the unit price as Money.
    #[inline]
    pub fn unit_price(&self) -> Money {
        Money::from_cents(self.unit_price_cents)
    }

    /// Returns the line total as Money.
    #[inline]
    pub fn line_total(&self) -> Money {
        Money::from_cents(self.line_total_cents)
    }
}

// =============================================================================
// Payment
// =============================================================================

/// Immutable record of one settlement cash event.
///
/// `order_id` is `Some` for a single-order payment and `None` for a
/// whole-balance payment (the distribution across orders is an internal
/// effect of the allocation engine, not persisted per order).
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Payment {
    pub id: String,
    pub customer_id: String,
    pub order_id: Option<String>,
    pub amount_cents: i64,
    pub method: PaymentMethod,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl Payment {
    /// Returns the payment amount as Money.
    #[inline]
    pub fn amount(&self) -> Money {
        Money::from_cents(self.amount_cents)
    }
}

// =============================================================================
// Return
// =============================================================================

/// Immutable record of a processed return against an order.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Return {
    pub id: String,
    pub order_id: String,
    /// Where the goods went back into stock.
    pub restock_location_id: String,
    /// Total refund value at snapshot prices.
    pub refund_cents: i64,
    /// Portion of the refund that cancelled outstanding credit.
    pub outstanding_reduced_cents: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// One returned line within a [`Return`].
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct ReturnItem {
    pub id: String,
    pub return_id: String,
    pub product_id: String,
    pub quantity: i64,
    /// Unit price carried over from the order-line snapshot.
    pub unit_price_cents: i64,
    pub reason: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Read Models
// =============================================================================

/// How much of an order line can still be returned.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RefundableItem {
    pub product_id: String,
    pub sku: String,
    pub name: String,
    pub quantity_ordered: i64,
    pub quantity_returned: i64,
    /// `quantity_ordered - quantity_returned`; never negative, never above
    /// `quantity_ordered`.
    pub quantity_available: i64,
    pub unit_price_cents: i64,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn customer(limit: i64, balance: i64) -> Customer {
        Customer {
            id: "c1".to_string(),
            name: "Bilal".to_string(),
            phone: None,
            credit_limit_cents: limit,
            current_balance_cents: balance,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_available_credit() {
        assert_eq!(customer(50_000, 30_000).available_credit().cents(), 20_000);
        assert_eq!(customer(50_000, 50_000).available_credit().cents(), 0);
        // Limit lowered below an existing balance must not go negative
        assert_eq!(customer(10_000, 30_000).available_credit().cents(), 0);
    }

    #[test]
    fn test_payment_status_default() {
        assert_eq!(PaymentStatus::default(), PaymentStatus::Pending);
    }

    #[test]
    fn test_order_outstanding() {
        let order = SalesOrder {
            id: "o1".to_string(),
            order_number: "SO-20260829-0001".to_string(),
            customer_id: "c1".to_string(),
            location_id: "l1".to_string(),
            subtotal_cents: 10_000,
            amount_paid_cents: 4_000,
            amount_to_credit_cents: 6_000,
            credit_outstanding_cents: 6_000,
            payment_status: PaymentStatus::Pending,
            due_date: Some(Utc::now()),
            allowed_until: Some(Utc::now()),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(order.has_outstanding());
        assert_eq!(order.credit_outstanding().cents(), 6_000);
    }
}
