//! # Product Repository
//!
//! Catalog operations: create, read, FTS5 search, update, soft delete and the
//! low-stock report.
//!
//! ## FTS5 Search
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  User types: "amox"                                                    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  products_fts MATCH '"amox"*'   (sku, name, generic_name, barcode)     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  AMOX-250 | Amoxil 250mg    | amoxicillin │ ← MATCH                    │
//! │  AMOX-500 | Amoxil 500mg    | amoxicillin │ ← MATCH                    │
//! │  PARA-500 | Panadol 500mg   | paracetamol │                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Quantity is not editable here. It only changes through stock movements
//! ([`super::stock`]) and fulfillment, both under the row lock.

use apothecary_core::validation::{
    validate_amount_cents, validate_optional_text, validate_search_query, validate_sku,
    validate_stock_level, validate_text,
};
use apothecary_core::{MovementType, Product, ValidationError};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use sqlx::SqlitePool;
use tracing::{debug, info};

use super::generate_id;
use super::stock::{insert_movement, MovementRecord};
use crate::error::{DbError, DbResult};

/// Column list matching [`Product`]'s `FromRow` layout.
pub(crate) const PRODUCT_COLUMNS: &str = "id, sku, barcode, name, generic_name, description, \
     unit_price_cents, cost_price_cents, quantity, reorder_level, expiry_date, batch_number, \
     requires_prescription, is_active, category_id, supplier_id, created_at, updated_at";

fn default_reorder_level() -> i64 {
    10
}

/// Input for a new catalog entry.
#[derive(Debug, Clone, Deserialize)]
pub struct NewProduct {
    pub sku: String,
    #[serde(default)]
    pub barcode: Option<String>,
    pub name: String,
    #[serde(default)]
    pub generic_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub unit_price_cents: i64,
    #[serde(default)]
    pub cost_price_cents: i64,
    /// Opening stock, recorded as an `in` movement.
    #[serde(default)]
    pub quantity: i64,
    #[serde(default = "default_reorder_level")]
    pub reorder_level: i64,
    #[serde(default)]
    pub expiry_date: Option<NaiveDate>,
    #[serde(default)]
    pub batch_number: Option<String>,
    #[serde(default)]
    pub requires_prescription: bool,
    #[serde(default)]
    pub category_id: Option<String>,
    #[serde(default)]
    pub supplier_id: Option<String>,
}

/// Partial update. `None` leaves the field unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductUpdate {
    pub sku: Option<String>,
    pub barcode: Option<String>,
    pub name: Option<String>,
    pub generic_name: Option<String>,
    pub description: Option<String>,
    pub unit_price_cents: Option<i64>,
    pub cost_price_cents: Option<i64>,
    pub reorder_level: Option<i64>,
    pub expiry_date: Option<NaiveDate>,
    pub batch_number: Option<String>,
    pub requires_prescription: Option<bool>,
    pub is_active: Option<bool>,
    pub category_id: Option<String>,
    pub supplier_id: Option<String>,
}

impl ProductUpdate {
    fn apply(self, product: &mut Product) -> Result<(), ValidationError> {
        if let Some(sku) = self.sku {
            validate_sku(&sku)?;
            product.sku = sku.trim().to_string();
        }
        if let Some(barcode) = self.barcode {
            product.barcode = validate_optional_text("barcode", Some(&barcode), 64)?;
        }
        if let Some(name) = self.name {
            product.name = validate_text("name", &name, 200)?.to_string();
        }
        if let Some(generic_name) = self.generic_name {
            product.generic_name = validate_optional_text("generic_name", Some(&generic_name), 200)?;
        }
        if let Some(description) = self.description {
            product.description = validate_optional_text("description", Some(&description), 2000)?;
        }
        if let Some(cents) = self.unit_price_cents {
            validate_amount_cents("unit_price_cents", cents)?;
            product.unit_price_cents = cents;
        }
        if let Some(cents) = self.cost_price_cents {
            validate_amount_cents("cost_price_cents", cents)?;
            product.cost_price_cents = cents;
        }
        if let Some(level) = self.reorder_level {
            validate_stock_level("reorder_level", level)?;
            product.reorder_level = level;
        }
        if let Some(date) = self.expiry_date {
            product.expiry_date = Some(date);
        }
        if let Some(batch) = self.batch_number {
            product.batch_number = validate_optional_text("batch_number", Some(&batch), 64)?;
        }
        if let Some(flag) = self.requires_prescription {
            product.requires_prescription = flag;
        }
        if let Some(flag) = self.is_active {
            product.is_active = flag;
        }
        if let Some(category_id) = self.category_id {
            product.category_id = validate_optional_text("category_id", Some(&category_id), 64)?;
        }
        if let Some(supplier_id) = self.supplier_id {
            product.supplier_id = validate_optional_text("supplier_id", Some(&supplier_id), 64)?;
        }
        Ok(())
    }
}

/// Repository for product database operations.
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    /// Searches active products by sku, name, generic name or barcode.
    ///
    /// An empty query lists active products by name.
    pub async fn search(&self, query: &str, limit: u32) -> DbResult<Vec<Product>> {
        let query = validate_search_query(query)?;

        debug!(query = %query, limit = %limit, "Searching products");

        if query.is_empty() {
            return self.list(false, limit, 0).await;
        }

        // Quoted phrase with prefix match; quotes inside the term are doubled
        let fts_query = format!("\"{}\"*", query.replace('"', "\"\""));

        let sql = format!(
            "SELECT {} FROM products p \
             INNER JOIN products_fts fts ON p.rowid = fts.rowid \
             WHERE products_fts MATCH ?1 AND p.is_active = 1 \
             ORDER BY rank \
             LIMIT ?2",
            PRODUCT_COLUMNS
                .split(", ")
                .map(|c| format!("p.{}", c.trim()))
                .collect::<Vec<_>>()
                .join(", ")
        );

        let products = sqlx::query_as::<_, Product>(&sql)
            .bind(fts_query)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        debug!(count = products.len(), "Search returned products");
        Ok(products)
    }

    /// Lists products ordered by name.
    pub async fn list(&self, include_inactive: bool, limit: u32, offset: u32) -> DbResult<Vec<Product>> {
        let sql = format!(
            "SELECT {PRODUCT_COLUMNS} FROM products \
             WHERE (?1 OR is_active = 1) \
             ORDER BY name \
             LIMIT ?2 OFFSET ?3"
        );

        let products = sqlx::query_as::<_, Product>(&sql)
            .bind(include_inactive)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        Ok(products)
    }

    /// Active products of one category, ordered by name.
    pub async fn list_by_category(&self, category_id: &str, limit: u32, offset: u32) -> DbResult<Vec<Product>> {
        let sql = format!(
            "SELECT {PRODUCT_COLUMNS} FROM products \
             WHERE category_id = ?1 AND is_active = 1 \
             ORDER BY name \
             LIMIT ?2 OFFSET ?3"
        );

        let products = sqlx::query_as::<_, Product>(&sql)
            .bind(category_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        Ok(products)
    }

    /// Gets a product by its ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Product>> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?1");

        let product = sqlx::query_as::<_, Product>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(product)
    }

    /// Gets a product by its SKU.
    pub async fn get_by_sku(&self, sku: &str) -> DbResult<Option<Product>> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE sku = ?1");

        let product = sqlx::query_as::<_, Product>(&sql)
            .bind(sku.trim())
            .fetch_optional(&self.pool)
            .await?;

        Ok(product)
    }

    /// Creates a product.
    ///
    /// Opening stock is written as an `in` movement by `actor` in the same
    /// transaction, so every unit on the shelf has an audit record.
    ///
    /// ## Returns
    /// * `Err(DbError::UniqueViolation)` - SKU or barcode already exists
    pub async fn create(&self, input: NewProduct, actor: &str) -> DbResult<Product> {
        validate_sku(&input.sku)?;
        let name = validate_text("name", &input.name, 200)?.to_string();
        validate_amount_cents("unit_price_cents", input.unit_price_cents)?;
        validate_amount_cents("cost_price_cents", input.cost_price_cents)?;
        validate_stock_level("quantity", input.quantity)?;
        validate_stock_level("reorder_level", input.reorder_level)?;

        let now = Utc::now();
        let product = Product {
            id: generate_id(),
            sku: input.sku.trim().to_string(),
            barcode: validate_optional_text("barcode", input.barcode.as_deref(), 64)?,
            name,
            generic_name: validate_optional_text("generic_name", input.generic_name.as_deref(), 200)?,
            description: validate_optional_text("description", input.description.as_deref(), 2000)?,
            unit_price_cents: input.unit_price_cents,
            cost_price_cents: input.cost_price_cents,
            quantity: input.quantity,
            reorder_level: input.reorder_level,
            expiry_date: input.expiry_date,
            batch_number: validate_optional_text("batch_number", input.batch_number.as_deref(), 64)?,
            requires_prescription: input.requires_prescription,
            is_active: true,
            category_id: validate_optional_text("category_id", input.category_id.as_deref(), 64)?,
            supplier_id: validate_optional_text("supplier_id", input.supplier_id.as_deref(), 64)?,
            created_at: now,
            updated_at: now,
        };

        debug!(sku = %product.sku, "Inserting product");

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO products (
                id, sku, barcode, name, generic_name, description,
                unit_price_cents, cost_price_cents, quantity, reorder_level,
                expiry_date, batch_number, requires_prescription, is_active,
                category_id, supplier_id, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)
            "#,
        )
        .bind(&product.id)
        .bind(&product.sku)
        .bind(&product.barcode)
        .bind(&product.name)
        .bind(&product.generic_name)
        .bind(&product.description)
        .bind(product.unit_price_cents)
        .bind(product.cost_price_cents)
        .bind(product.quantity)
        .bind(product.reorder_level)
        .bind(product.expiry_date)
        .bind(&product.batch_number)
        .bind(product.requires_prescription)
        .bind(product.is_active)
        .bind(&product.category_id)
        .bind(&product.supplier_id)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&mut *tx)
        .await?;

        if product.quantity > 0 {
            insert_movement(
                &mut *tx,
                MovementRecord {
                    product_id: &product.id,
                    movement_type: MovementType::In,
                    quantity: product.quantity,
                    quantity_after: product.quantity,
                    reference_number: None,
                    notes: Some("Opening stock"),
                    actor,
                },
            )
            .await?;
        }

        tx.commit().await?;

        info!(id = %product.id, sku = %product.sku, "Product created");
        Ok(product)
    }

    /// Applies a partial update and returns the stored product.
    pub async fn update(&self, id: &str, changes: ProductUpdate) -> DbResult<Product> {
        let mut product = self
            .get_by_id(id)
            .await?
            .ok_or_else(|| DbError::not_found("Product", id))?;

        changes.apply(&mut product)?;
        product.updated_at = Utc::now();

        debug!(id = %id, "Updating product");

        // quantity is deliberately absent from the SET list
        let result = sqlx::query(
            r#"
            UPDATE products SET
                sku = ?2,
                barcode = ?3,
                name = ?4,
                generic_name = ?5,
                description = ?6,
                unit_price_cents = ?7,
                cost_price_cents = ?8,
                reorder_level = ?9,
                expiry_date = ?10,
                batch_number = ?11,
                requires_prescription = ?12,
                is_active = ?13,
                category_id = ?14,
                supplier_id = ?15,
                updated_at = ?16
            WHERE id = ?1
            "#,
        )
        .bind(&product.id)
        .bind(&product.sku)
        .bind(&product.barcode)
        .bind(&product.name)
        .bind(&product.generic_name)
        .bind(&product.description)
        .bind(product.unit_price_cents)
        .bind(product.cost_price_cents)
        .bind(product.reorder_level)
        .bind(product.expiry_date)
        .bind(&product.batch_number)
        .bind(product.requires_prescription)
        .bind(product.is_active)
        .bind(&product.category_id)
        .bind(&product.supplier_id)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id));
        }

        // Re-read so the caller sees the current quantity, not the pre-update snapshot
        self.get_by_id(id)
            .await?
            .ok_or_else(|| DbError::not_found("Product", id))
    }

    /// Soft-deletes a product by setting is_active = false.
    ///
    /// Historical sale and prescription lines still reference the row.
    pub async fn soft_delete(&self, id: &str) -> DbResult<()> {
        debug!(id = %id, "Soft-deleting product");

        let result = sqlx::query("UPDATE products SET is_active = 0, updated_at = ?2 WHERE id = ?1")
            .bind(id)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id));
        }

        Ok(())
    }

    /// Active products at or below their reorder level, emptiest first.
    pub async fn low_stock(&self, limit: u32) -> DbResult<Vec<Product>> {
        let sql = format!(
            "SELECT {PRODUCT_COLUMNS} FROM products \
             WHERE is_active = 1 AND quantity <= reorder_level \
             ORDER BY quantity, name \
             LIMIT ?1"
        );

        let products = sqlx::query_as::<_, Product>(&sql)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        Ok(products)
    }

    /// Counts active products.
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products WHERE is_active = 1")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

// =============================================================================
// Tests
// =============================================================================
