//! # apothecary-db: Database Layer for Apothecary POS
//!
//! SQLite storage via sqlx, the repositories on top of it and the order
//! fulfillment engine.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Apothecary Data Flow                               │
//! │                                                                         │
//! │  HTTP handler (POST /api/v1/sales)                                     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 apothecary-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐   ┌──────────────────┐   ┌──────────────┐  │   │
//! │  │   │   Database    │   │ FulfillmentEngine│   │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │   │  lock → price →  │   │  (embedded)  │  │   │
//! │  │   │               │◄──│  number → commit │   │ 001_init.sql │  │   │
//! │  │   │  SqlitePool   │   └──────────────────┘   └──────────────┘  │   │
//! │  │   │               │   ┌──────────────────┐                     │   │
//! │  │   │               │◄──│   Repositories   │ products, stock,    │   │
//! │  │   └───────────────┘   │                  │ customers, users,   │   │
//! │  │                       └──────────────────┘ settings, lab, etc. │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite (WAL)                                                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use apothecary_db::{Database, DbConfig, FulfillRequest};
//!
//! let db = Database::new(DbConfig::new("pharmacy.db")).await?;
//! let sale = db.fulfillment().fulfill(request, &cashier_id).await?;
//! println!("{}", sale.sale.invoice_number);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod fulfillment;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use fulfillment::{
    CompleteSaleRequest, DispenseOutcome, DispenseRequest, FulfillRequest, FulfillmentEngine, FulfillmentError,
    HoldSaleRequest, LineRequest, NewLabTest, NewPrescription, NewPrescriptionItem, PrescriptionSale,
};
pub use pool::{Database, DbConfig};

pub use repository::category::{CategoryRepository, NewCategory};
pub use repository::customer::{CustomerRepository, NewCustomer};
pub use repository::expense::{
    ExpenseFilter, ExpenseRepository, ExpenseScope, ExpenseUpdate, NewExpense, NewExpenseCategory,
};
pub use repository::laboratory::{
    LabResults, LabTestFilter, LaboratoryRepository, NewMeasurement, NewTestType, TestTypeUpdate,
};
pub use repository::prescription::PrescriptionRepository;
pub use repository::product::{NewProduct, ProductRepository, ProductUpdate};
pub use repository::sale::{SaleFilter, SaleRepository};
pub use repository::settings::SettingsRepository;
pub use repository::stock::{StockAdjustment, StockRepository};
pub use repository::supplier::{NewSupplier, SupplierRepository, SupplierUpdate};
pub use repository::user::{NewUser, UserRepository};
