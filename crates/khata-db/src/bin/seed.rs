//! # Seed Data Generator
//!
//! Populates a development database with a small kiryana shop: locations,
//! a product catalog, customers with credit lines, opening stock, and a
//! few demo sales.
//!
//! ## Usage
//! ```bash
//! cargo run -p khata-db --bin seed
//!
//! # Specify database path
//! cargo run -p khata-db --bin seed -- --db ./data/khata.db
//! ```

use std::env;

use chrono::{Duration, Utc};
use khata_core::checkout::{CartLine, CreditTerms, Tender};
use khata_core::LocationType;
use khata_db::{CheckoutRequest, Database, DbConfig, NewCustomer, NewLocation, NewProduct};

/// (sku, name, cost cents, price cents, opening stock at the store)
const PRODUCTS: &[(&str, &str, i64, i64, i64)] = &[
    ("ATTA-10KG", "Atta 10kg", 90_000, 120_000, 40),
    ("GHEE-1KG", "Dalda Ghee 1kg", 48_000, 60_000, 25),
    ("SUGAR-5KG", "Sugar 5kg", 62_000, 80_000, 30),
    ("CHAI-250G", "Tapal Danedar 250g", 28_000, 35_000, 50),
    ("RICE-5KG", "Basmati Rice 5kg", 110_000, 145_000, 20),
    ("DAAL-1KG", "Daal Chana 1kg", 24_000, 32_000, 35),
    ("OIL-3L", "Cooking Oil 3L", 130_000, 165_000, 15),
    ("SOAP-4PK", "Lifebuoy 4-Pack", 18_000, 24_000, 60),
    ("MILK-1L", "Olpers Milk 1L", 20_000, 26_000, 48),
    ("BISC-FAM", "Sooper Family Pack", 12_000, 16_000, 70),
];

/// (name, phone, credit limit cents)
const CUSTOMERS: &[(&str, &str, i64)] = &[
    ("Bilal Ahmed", "0300-1234567", 500_000),
    ("Sana Tariq", "0321-7654321", 250_000),
    ("Usman Karim", "0333-1112223", 0),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "khata_db=info".into()),
        )
        .init();

    let args: Vec<String> = env::args().collect();
    let mut db_path = String::from("./khata_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Khata Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>    Database file path (default: ./khata_dev.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("🌱 Khata Seed Data Generator");
    println!("============================");
    println!("Database: {}", db_path);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;
    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    let existing = db.products().count().await?;
    if existing > 0 {
        println!("⚠ Database already has {} products", existing);
        println!("  Skipping seed to avoid duplicates.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    let warehouse = db
        .locations()
        .insert(NewLocation {
            name: "Main Warehouse".to_string(),
            location_type: LocationType::Warehouse,
        })
        .await?;
    let store = db
        .locations()
        .insert(NewLocation {
            name: "Anarkali Store".to_string(),
            location_type: LocationType::Store,
        })
        .await?;
    println!("✓ Created 2 locations");

    let stock = db.stock();
    let mut products = Vec::new();
    for (sku, name, cost, price, opening) in PRODUCTS {
        let product = db
            .products()
            .insert(NewProduct {
                sku: sku.to_string(),
                name: name.to_string(),
                unit_cost_cents: Some(*cost),
                selling_price_cents: *price,
            })
            .await?;

        // Opening stock goes through the ledger so the audit trail starts
        // replayable from day one
        stock
            .adjust(&product.id, &store.id, *opening, "opening-stock", "seed")
            .await?;
        stock
            .adjust(&product.id, &warehouse.id, opening * 2, "opening-stock", "seed")
            .await?;

        products.push(product);
    }
    println!("✓ Created {} products with opening stock", products.len());

    let mut customers = Vec::new();
    for (name, phone, limit) in CUSTOMERS {
        customers.push(
            db.customers()
                .insert(NewCustomer {
                    name: name.to_string(),
                    phone: Some(phone.to_string()),
                    credit_limit_cents: *limit,
                })
                .await?,
        );
    }
    println!("✓ Created {} customers", customers.len());

    // One cash sale and one credit sale so the ledger screens have data
    let cash_order = db
        .checkout()
        .checkout(CheckoutRequest {
            customer_id: customers[2].id.clone(),
            location_id: store.id.clone(),
            lines: vec![CartLine {
                product_id: products[3].id.clone(),
                quantity: 2,
                unit_price_cents: products[3].selling_price_cents,
            }],
            tender: Tender::cash(2 * products[3].selling_price_cents),
            terms: None,
            cashier: "seed".to_string(),
        })
        .await?;

    let credit_total = products[0].selling_price_cents + products[1].selling_price_cents;
    let credit_order = db
        .checkout()
        .checkout(CheckoutRequest {
            customer_id: customers[0].id.clone(),
            location_id: store.id.clone(),
            lines: vec![
                CartLine {
                    product_id: products[0].id.clone(),
                    quantity: 1,
                    unit_price_cents: products[0].selling_price_cents,
                },
                CartLine {
                    product_id: products[1].id.clone(),
                    quantity: 1,
                    unit_price_cents: products[1].selling_price_cents,
                },
            ],
            tender: Tender::credit(credit_total),
            terms: Some(CreditTerms::due_on(Utc::now() + Duration::days(14))),
            cashier: "seed".to_string(),
        })
        .await?;

    println!("✓ Created demo orders {} and {}", cash_order.order_number, credit_order.order_number);
    println!();
    println!("Done.");
    Ok(())
}
