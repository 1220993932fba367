//! # Repository Module
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Handler                                                               │
//! │       │  db.products().search("amox", 20)                              │
//! │       ▼                                                                 │
//! │  ProductRepository                                                     │
//! │  ├── search(&self, query, limit)                                       │
//! │  ├── get_by_id(&self, id)                                              │
//! │  ├── create(&self, input)                                              │
//! │  └── update(&self, id, changes)                                        │
//! │       │  SQL                                                            │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Repositories that write numbered document headers or move stock don't
//! exist: those writes belong to [`crate::fulfillment::FulfillmentEngine`].
//! The sale and prescription repositories here are read-only; lab tests are
//! requested through the engine and progressed here.
//!
//! ## Available Repositories
//!
//! - [`product::ProductRepository`] - Catalog CRUD, FTS search, low stock
//! - [`stock::StockRepository`] - Manual movements under the row lock
//! - [`customer::CustomerRepository`] - Patient/customer records
//! - [`user::UserRepository`] - Staff accounts and credentials
//! - [`settings::SettingsRepository`] - Singleton pharmacy settings
//! - [`sale::SaleRepository`] - Sale documents (read)
//! - [`prescription::PrescriptionRepository`] - Prescription documents (read)
//! - [`category::CategoryRepository`] - Product categories
//! - [`supplier::SupplierRepository`] - Suppliers (deactivated, never deleted)
//! - [`laboratory::LaboratoryRepository`] - Test types, lab test progress, measurements
//! - [`expense::ExpenseRepository`] - Expenses, approval, expense categories

pub mod category;
pub mod customer;
pub mod expense;
pub mod laboratory;
pub mod prescription;
pub mod product;
pub mod sale;
pub mod settings;
pub mod stock;
pub mod supplier;
pub mod user;

/// Generates a new entity ID.
pub fn generate_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
