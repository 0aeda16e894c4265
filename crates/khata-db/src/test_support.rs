//! Shared fixtures for the database tests.
//!
//! Every test gets its own isolated in-memory database; `fixture` seeds the
//! smallest shop that exercises all four engines: one warehouse, one store
//! with 10 units of one product, and one customer with a Rs 500 credit line.

use crate::pool::{Database, DbConfig};
use crate::repository::{NewCustomer, NewLocation, NewProduct};
use khata_core::{Customer, Location, LocationType, Product};

pub(crate) struct Fixture {
    pub warehouse: Location,
    pub store: Location,
    pub customer: Customer,
    pub product: Product,
}

pub(crate) async fn test_db() -> Database {
    Database::new(DbConfig::in_memory())
        .await
        .expect("in-memory database")
}

pub(crate) async fn fixture(db: &Database) -> Fixture {
    let warehouse = db
        .locations()
        .insert(NewLocation {
            name: "Main Warehouse".to_string(),
            location_type: LocationType::Warehouse,
        })
        .await
        .expect("warehouse");
    let store = db
        .locations()
        .insert(NewLocation {
            name: "Anarkali Store".to_string(),
            location_type: LocationType::Store,
        })
        .await
        .expect("store");

    let customer = db
        .customers()
        .insert(NewCustomer {
            name: "Bilal".to_string(),
            phone: Some("0300-1234567".to_string()),
            credit_limit_cents: 50_000,
        })
        .await
        .expect("customer");

    let product = db
        .products()
        .insert(NewProduct {
            sku: "ATTA-10KG".to_string(),
            name: "Atta 10kg".to_string(),
            unit_cost_cents: Some(20_000),
            selling_price_cents: 25_000,
        })
        .await
        .expect("product");

    db.stock()
        .adjust(&product.id, &store.id, 10, "opening-stock", "seed")
        .await
        .expect("opening stock");

    Fixture {
        warehouse,
        store,
        customer,
        product,
    }
}
