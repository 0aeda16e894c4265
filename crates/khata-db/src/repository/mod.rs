//! # Repository Module
//!
//! Read and admin-side database access, one repository per aggregate.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Engines (engine/)            Repositories (this module)                │
//! │  ──────────────────           ──────────────────────────                │
//! │  Transactional writes to      Inserts of master data and all           │
//! │  stock, orders, balances      reads: lookups, lists, histories         │
//! │                                                                         │
//! │  A repository NEVER writes stock_levels, customers.current_balance,     │
//! │  or sales_orders.credit_outstanding_cents. Those columns belong to      │
//! │  the engines.                                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod customer;
pub mod location;
pub mod order;
pub mod product;

pub use customer::{CustomerRepository, NewCustomer};
pub use location::{LocationRepository, NewLocation};
pub use order::OrderRepository;
pub use product::{NewProduct, ProductRepository};
