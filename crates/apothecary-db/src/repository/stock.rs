//! # Stock Repository
//!
//! Manual stock movements and the row-lock primitive every quantity change
//! goes through.
//!
//! ## Row Locking on SQLite
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  BEGIN                                                                  │
//! │  UPDATE products SET updated_at = updated_at   ◄── first statement is  │
//! │   WHERE id = ? RETURNING ...                       a write: takes the  │
//! │                                                    database write lock │
//! │  (other writers wait here on busy_timeout)                             │
//! │                                                                         │
//! │  read quantity → validate → UPDATE quantity → INSERT stock_movements   │
//! │  COMMIT                                        ◄── lock released       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Locks are taken in product-id order so multi-product transactions
//! acquire them in a consistent order.

use std::collections::{BTreeSet, HashMap};

use apothecary_core::{CoreError, MovementType, Product, StockMovement, ValidationError};
use chrono::Utc;
use serde::Deserialize;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};

use super::generate_id;
use super::product::PRODUCT_COLUMNS;
use crate::error::{DbError, DbResult};

const MOVEMENT_COLUMNS: &str = "id, product_id, movement_type, quantity, quantity_after, \
     reference_number, notes, created_by, created_at";

// =============================================================================
// Shared Primitives
// =============================================================================

/// Locks the given products for the rest of the enclosing transaction.
///
/// Returns the locked rows keyed by id. Unknown ids are simply absent; the
/// caller decides whether that is an error.
pub(crate) async fn lock_products<'a>(
    conn: &mut SqliteConnection,
    ids: impl IntoIterator<Item = &'a str>,
) -> DbResult<HashMap<String, Product>> {
    let ordered: BTreeSet<&str> = ids.into_iter().collect();
    let sql = format!(
        "UPDATE products SET updated_at = updated_at WHERE id = ?1 RETURNING {PRODUCT_COLUMNS}"
    );

    let mut locked = HashMap::with_capacity(ordered.len());
    for id in ordered {
        if let Some(product) = sqlx::query_as::<_, Product>(&sql)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?
        {
            locked.insert(product.id.clone(), product);
        }
    }

    debug!(count = locked.len(), "Locked product rows");
    Ok(locked)
}

/// Writes a new on-hand quantity. Only call with the row locked.
pub(crate) async fn set_quantity(
    conn: &mut SqliteConnection,
    product_id: &str,
    quantity: i64,
) -> DbResult<()> {
    sqlx::query("UPDATE products SET quantity = ?2, updated_at = ?3 WHERE id = ?1")
        .bind(product_id)
        .bind(quantity)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// One row of the movement audit trail.
pub(crate) struct MovementRecord<'a> {
    pub product_id: &'a str,
    pub movement_type: MovementType,
    pub quantity: i64,
    pub quantity_after: i64,
    pub reference_number: Option<&'a str>,
    pub notes: Option<&'a str>,
    pub actor: &'a str,
}

pub(crate) async fn insert_movement(
    conn: &mut SqliteConnection,
    record: MovementRecord<'_>,
) -> DbResult<StockMovement> {
    let movement = StockMovement {
        id: generate_id(),
        product_id: record.product_id.to_string(),
        movement_type: record.movement_type,
        quantity: record.quantity,
        quantity_after: record.quantity_after,
        reference_number: record.reference_number.map(str::to_string),
        notes: record.notes.map(str::to_string),
        created_by: record.actor.to_string(),
        created_at: Utc::now(),
    };

    sqlx::query(
        r#"
        INSERT INTO stock_movements (
            id, product_id, movement_type, quantity, quantity_after,
            reference_number, notes, created_by, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        "#,
    )
    .bind(&movement.id)
    .bind(&movement.product_id)
    .bind(movement.movement_type)
    .bind(movement.quantity)
    .bind(movement.quantity_after)
    .bind(&movement.reference_number)
    .bind(&movement.notes)
    .bind(&movement.created_by)
    .bind(movement.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(movement)
}

// =============================================================================
// Repository
// =============================================================================

/// A manual stock entry.
#[derive(Debug, Clone, Deserialize)]
pub struct StockAdjustment {
    pub movement_type: MovementType,
    /// Units moved, or the counted quantity for `adjustment`.
    pub quantity: i64,
    #[serde(default)]
    pub reference_number: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl StockAdjustment {
    fn validate(&self) -> Result<(), ValidationError> {
        match self.movement_type {
            MovementType::Adjustment if self.quantity < 0 => Err(ValidationError::MustNotBeNegative {
                field: "quantity".to_string(),
            }),
            MovementType::In | MovementType::Out | MovementType::Return if self.quantity <= 0 => {
                Err(ValidationError::MustBePositive {
                    field: "quantity".to_string(),
                })
            }
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StockRepository {
    pool: SqlitePool,
}

impl StockRepository {
    pub fn new(pool: SqlitePool) -> Self {
        StockRepository { pool }
    }

    /// Records a manual movement and returns the updated product.
    ///
    /// ## Errors
    /// * `CoreError::ProductNotFound` - unknown or inactive product
    /// * `CoreError::InsufficientStock` - `out` larger than on-hand quantity
    pub async fn record(
        &self,
        product_id: &str,
        adjustment: StockAdjustment,
        actor: &str,
    ) -> DbResult<(Product, StockMovement)> {
        adjustment.validate()?;

        let mut tx = self.pool.begin().await?;

        let mut locked = lock_products(&mut *tx, [product_id]).await?;
        let mut product = locked
            .remove(product_id)
            .filter(|p| p.is_active)
            .ok_or_else(|| CoreError::ProductNotFound(product_id.to_string()))?;

        let quantity_after = adjustment
            .movement_type
            .resulting_quantity(product.quantity, adjustment.quantity)
            .ok_or_else(|| {
                CoreError::InsufficientStock(
                    product.shortage_for(adjustment.quantity).into_iter().collect(),
                )
            })?;

        set_quantity(&mut *tx, product_id, quantity_after).await?;
        let movement = insert_movement(
            &mut *tx,
            MovementRecord {
                product_id,
                movement_type: adjustment.movement_type,
                quantity: adjustment.quantity,
                quantity_after,
                reference_number: adjustment.reference_number.as_deref(),
                notes: adjustment.notes.as_deref(),
                actor,
            },
        )
        .await?;

        tx.commit().await?;

        info!(
            product_id = %product_id,
            movement = ?adjustment.movement_type,
            from = product.quantity,
            to = quantity_after,
            "Stock movement recorded"
        );

        product.quantity = quantity_after;
        Ok((product, movement))
    }

    /// Movement history for a product, newest first.
    pub async fn history(&self, product_id: &str, limit: u32) -> DbResult<Vec<StockMovement>> {
        let sql = format!(
            "SELECT {MOVEMENT_COLUMNS} FROM stock_movements \
             WHERE product_id = ?1 \
             ORDER BY created_at DESC, rowid DESC \
             LIMIT ?2"
        );

        let movements = sqlx::query_as::<_, StockMovement>(&sql)
            .bind(product_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        Ok(movements)
    }

    /// Movements that reference a document number.
    pub async fn by_reference(&self, reference_number: &str) -> DbResult<Vec<StockMovement>> {
        let sql = format!(
            "SELECT {MOVEMENT_COLUMNS} FROM stock_movements \
             WHERE reference_number = ?1 \
             ORDER BY rowid"
        );

        sqlx::query_as::<_, StockMovement>(&sql)
            .bind(reference_number)
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::from)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::product::tests::new_product;
    use crate::repository::user::tests::create_test_user;
    use crate::{Database, DbConfig};
    use apothecary_core::Role;

    async fn setup(quantity: i64) -> (Database, String, Product) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let user = create_test_user(&db, "pharm1", Role::Pharmacist).await;
        let product = db
            .products()
            .create(new_product("CETI-10", "Cetirizine 10mg", 250, quantity), &user.id)
            .await
            .unwrap();
        (db, user.id, product)
    }

    fn entry(movement_type: MovementType, quantity: i64) -> StockAdjustment {
        StockAdjustment {
            movement_type,
            quantity,
            reference_number: None,
            notes: None,
        }
    }

    #[tokio::test]
    async fn test_in_out_adjustment_return() {
        let (db, actor, product) = setup(10).await;
        let stock = db.stock();

        let (p, _) = stock.record(&product.id, entry(MovementType::In, 5), &actor).await.unwrap();
        assert_eq!(p.quantity, 15);
        let (p, _) = stock.record(&product.id, entry(MovementType::Out, 4), &actor).await.unwrap();
        assert_eq!(p.quantity, 11);
        let (p, _) = stock.record(&product.id, entry(MovementType::Return, 1), &actor).await.unwrap();
        assert_eq!(p.quantity, 12);
        let (p, m) = stock
            .record(&product.id, entry(MovementType::Adjustment, 7), &actor)
            .await
            .unwrap();
        assert_eq!(p.quantity, 7);
        assert_eq!(m.quantity_after, 7);

        let stored = db.products().get_by_id(&product.id).await.unwrap().unwrap();
        assert_eq!(stored.quantity, 7);

        // opening stock + four manual entries
        let history = stock.history(&product.id, 50).await.unwrap();
        assert_eq!(history.len(), 5);
        assert_eq!(history[0].movement_type, MovementType::Adjustment);
    }

    #[tokio::test]
    async fn test_out_cannot_go_negative() {
        let (db, actor, product) = setup(2).await;

        let err = db
            .stock()
            .record(&product.id, entry(MovementType::Out, 3), &actor)
            .await
            .unwrap_err();

        match err {
            DbError::Core(CoreError::InsufficientStock(shortages)) => {
                assert_eq!(shortages.len(), 1);
                assert_eq!(shortages[0].available, 2);
                assert_eq!(shortages[0].requested, 3);
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let stored = db.products().get_by_id(&product.id).await.unwrap().unwrap();
        assert_eq!(stored.quantity, 2);
        assert_eq!(db.stock().history(&product.id, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rejects_bad_input_and_unknown_product() {
        let (db, actor, product) = setup(2).await;

        assert!(matches!(
            db.stock().record(&product.id, entry(MovementType::In, 0), &actor).await,
            Err(DbError::Validation(_))
        ));
        assert!(matches!(
            db.stock().record(&product.id, entry(MovementType::Adjustment, -1), &actor).await,
            Err(DbError::Validation(_))
        ));
        assert!(matches!(
            db.stock().record("nope", entry(MovementType::In, 1), &actor).await,
            Err(DbError::Core(CoreError::ProductNotFound(_)))
        ));
    }
}
