//! # Seed Data Generator
//!
//! Populates a development database with pharmacy products, their
//! categories and the laboratory's test menu.
//!
//! ## Usage
//! ```bash
//! # Seed ./apothecary_dev.db
//! cargo run -p apothecary-db --bin seed
//!
//! # Specify database path
//! cargo run -p apothecary-db --bin seed -- --db ./data/pharmacy.db
//! ```
//!
//! ## Generated Products
//! Every molecule below comes in each of its strengths:
//! - SKU: `{CODE}-{STRENGTH}`, e.g. `AMOX-500`
//! - Price from the molecule's base price scaled by strength
//! - Opening stock 0..=120, recorded as an `in` movement
//! - Antibiotics and other prescription-only drugs flagged as such
//! - Filed under one of [`CATEGORIES`]
//!
//! ## Generated Test Types
//! One per entry in [`TEST_TYPES`], at its listed price.
//!
//! Opening stock needs an actor, so the first admin account is used; a
//! `seed` admin is created when the database has none.

use std::collections::HashMap;
use std::env;

use anyhow::{bail, Context, Result};
use apothecary_core::Role;
use apothecary_db::{Database, DbConfig, NewCategory, NewProduct, NewTestType, NewUser};
use chrono::{Duration, Utc};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// (code, brand name, generic name, base price cents, prescription only, strengths)
const MOLECULES: &[(&str, &str, &str, i64, bool, &[u32])] = &[
    ("PARA", "Panadol", "paracetamol", 250, false, &[500, 1000]),
    ("IBU", "Brufen", "ibuprofen", 300, false, &[200, 400]),
    ("AMOX", "Amoxil", "amoxicillin", 800, true, &[250, 500]),
    ("AUG", "Augmentin", "amoxicillin/clavulanate", 2500, true, &[375, 625]),
    ("CIPRO", "Ciprobay", "ciprofloxacin", 1200, true, &[250, 500]),
    ("MET", "Glucophage", "metformin", 600, true, &[500, 850]),
    ("AML", "Norvasc", "amlodipine", 900, true, &[5, 10]),
    ("OME", "Losec", "omeprazole", 700, false, &[20, 40]),
    ("CET", "Zyrtec", "cetirizine", 350, false, &[10]),
    ("LOR", "Clarityn", "loratadine", 400, false, &[10]),
    ("SALB", "Ventolin", "salbutamol", 1500, true, &[100]),
    ("AZI", "Zithromax", "azithromycin", 1800, true, &[250, 500]),
    ("FLU", "Diflucan", "fluconazole", 1100, true, &[50, 150]),
    ("ORS", "Oralite", "oral rehydration salts", 150, false, &[200]),
    ("ZINC", "Zinkid", "zinc sulfate", 200, false, &[20]),
];

/// (category, molecule codes)
const CATEGORIES: &[(&str, &[&str])] = &[
    ("Analgesics", &["PARA", "IBU"]),
    ("Antibiotics", &["AMOX", "AUG", "CIPRO", "AZI"]),
    ("Antifungals", &["FLU"]),
    ("Antihistamines", &["CET", "LOR"]),
    ("Chronic care", &["MET", "AML", "SALB"]),
    ("Gastro-intestinal", &["OME", "ORS", "ZINC"]),
];

/// (code, name, cost cents)
const TEST_TYPES: &[(&str, &str, i64)] = &[
    ("FBC", "Full Blood Count", 80_000),
    ("MPS", "Malaria Parasite Smear", 30_000),
    ("RBS", "Random Blood Sugar", 20_000),
    ("UA", "Urinalysis", 40_000),
    ("HBA1C", "Glycated Haemoglobin", 150_000),
];

const DEFAULT_DB: &str = "./apothecary_dev.db";
const SEED_ADMIN: &str = "seed";

fn print_help() {
    println!("Apothecary Seed Data Generator");
    println!();
    println!("Usage: seed [OPTIONS]");
    println!();
    println!("Options:");
    println!("  -d, --db <PATH>    Database file path (default: {DEFAULT_DB})");
    println!("  -h, --help         Show this help message");
    println!();
    println!("Environment:");
    println!("  SEED_ADMIN_PASSWORD  password for the '{SEED_ADMIN}' admin if one is created");
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut db_path = String::from(DEFAULT_DB);
    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--db" | "-d" => {
                db_path = args.next().context("--db needs a path")?;
            }
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            other => bail!("unknown argument: {other}"),
        }
    }

    let db = Database::new(DbConfig::new(&db_path))
        .await
        .with_context(|| format!("opening {db_path}"))?;
    info!(path = %db_path, "Connected, migrations applied");

    let existing = db.products().count().await?;
    if existing > 0 {
        warn!(existing, "Database already has products, skipping seed");
        return Ok(());
    }

    let actor = match db.users().list().await?.into_iter().find(|u| u.role == Role::Admin) {
        Some(admin) => admin,
        None => {
            let password = env::var("SEED_ADMIN_PASSWORD").unwrap_or_else(|_| "change-me-now".to_string());
            let admin = db
                .users()
                .create(NewUser {
                    username: SEED_ADMIN.to_string(),
                    full_name: "Seed Administrator".to_string(),
                    password,
                    role: Role::Admin,
                })
                .await
                .context("creating seed admin")?;
            warn!(username = SEED_ADMIN, "Created seed admin; change its password");
            admin
        }
    };

    let start = std::time::Instant::now();
    let mut generated = 0usize;

    let mut category_of = HashMap::new();
    for (name, codes) in CATEGORIES {
        let category = db
            .categories()
            .create(NewCategory {
                name: name.to_string(),
                description: None,
            })
            .await
            .with_context(|| format!("creating category {name}"))?;
        for code in codes.iter() {
            category_of.insert(*code, category.id.clone());
        }
    }

    for (index, (code, brand, generic, base_price, rx_only, strengths)) in MOLECULES.iter().enumerate() {
        for (step, strength) in strengths.iter().enumerate() {
            let seed = index * 10 + step;
            let mut product = generate_product(code, brand, generic, *base_price, *rx_only, *strength, step, seed);
            product.category_id = category_of.get(code).cloned();
            let sku = product.sku.clone();

            match db.products().create(product, &actor.id).await {
                Ok(_) => generated += 1,
                Err(e) => warn!(sku = %sku, error = %e, "Failed to insert product"),
            }
        }
    }

    info!(generated, elapsed = ?start.elapsed(), "Products generated");

    for (code, name, cost_cents) in TEST_TYPES {
        let input = NewTestType {
            name: name.to_string(),
            code: code.to_string(),
            description: None,
            cost_cents: *cost_cents,
        };
        if let Err(e) = db.laboratory().create_test_type(input, &actor.id).await {
            warn!(code = %code, error = %e, "Failed to insert test type");
        }
    }
    info!(count = TEST_TYPES.len(), "Test types generated");

    let hits = db.products().search("amox", 10).await?;
    info!(results = hits.len(), "FTS check: 'amox'");

    let low = db.products().low_stock(100).await?;
    info!(results = low.len(), "Low stock products");

    Ok(())
}

/// Builds one catalog entry for a molecule at a given strength.
#[allow(clippy::too_many_arguments)]
fn generate_product(
    code: &str,
    brand: &str,
    generic: &str,
    base_price: i64,
    rx_only: bool,
    strength: u32,
    step: usize,
    seed: usize,
) -> NewProduct {
    // Each higher strength costs 60% more
    let unit_price_cents = base_price * (10 + 6 * step as i64) / 10;
    let cost_pct = 55 + (seed % 20) as i64;

    NewProduct {
        sku: format!("{code}-{strength}"),
        barcode: Some(format!("616{:010}", seed)),
        name: format!("{brand} {strength}mg"),
        generic_name: Some(generic.to_string()),
        description: None,
        unit_price_cents,
        cost_price_cents: unit_price_cents * cost_pct / 100,
        quantity: ((seed * 37) % 121) as i64,
        reorder_level: 20,
        expiry_date: Some((Utc::now() + Duration::days(180 + (seed as i64 * 29) % 540)).date_naive()),
        batch_number: Some(format!("B{:05}", 10_000 + seed * 7)),
        requires_prescription: rx_only,
        category_id: None,
        supplier_id: None,
    }
}
