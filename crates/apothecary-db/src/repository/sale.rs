//! # Sale Repository
//!
//! Read access to sale documents. Sales are written only by
//! [`crate::fulfillment::FulfillmentEngine`].

use apothecary_core::{Sale, SaleDocument, SaleItem, SaleStatus};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::{SqliteConnection, SqlitePool};

use crate::error::DbResult;

pub(crate) const SALE_COLUMNS: &str = "id, invoice_number, customer_id, prescription_id, \
     subtotal_cents, tax_cents, discount_cents, total_cents, payment_method, amount_paid_cents, \
     change_cents, status, notes, cashier_id, created_at, updated_at, completed_at";

const SALE_ITEM_COLUMNS: &str = "id, sale_id, position, product_id, name_snapshot, quantity, \
     unit_price_cents, discount_cents, line_total_cents, created_at";

fn default_limit() -> u32 {
    50
}

/// Listing filter. Dates bound `created_at` as `[from, to)`.
#[derive(Debug, Clone, Deserialize)]
pub struct SaleFilter {
    #[serde(default)]
    pub status: Option<SaleStatus>,
    #[serde(default)]
    pub from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub to: Option<DateTime<Utc>>,
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
}

impl Default for SaleFilter {
    fn default() -> Self {
        SaleFilter {
            status: None,
            from: None,
            to: None,
            limit: default_limit(),
            offset: 0,
        }
    }
}

pub(crate) async fn fetch_sale(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Sale>> {
    let sql = format!("SELECT {SALE_COLUMNS} FROM sales WHERE id = ?1");

    let sale = sqlx::query_as::<_, Sale>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(sale)
}

pub(crate) async fn fetch_sale_items(conn: &mut SqliteConnection, sale_id: &str) -> DbResult<Vec<SaleItem>> {
    let sql = format!("SELECT {SALE_ITEM_COLUMNS} FROM sale_items WHERE sale_id = ?1 ORDER BY position");

    let items = sqlx::query_as::<_, SaleItem>(&sql)
        .bind(sale_id)
        .fetch_all(&mut *conn)
        .await?;

    Ok(items)
}

pub(crate) async fn fetch_sale_document(
    conn: &mut SqliteConnection,
    id: &str,
) -> DbResult<Option<SaleDocument>> {
    let Some(sale) = fetch_sale(conn, id).await? else {
        return Ok(None);
    };
    let items = fetch_sale_items(conn, id).await?;
    Ok(Some(SaleDocument { sale, items }))
}

#[derive(Debug, Clone)]
pub struct SaleRepository {
    pool: SqlitePool,
}

impl SaleRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SaleRepository { pool }
    }

    /// Gets a sale with its lines.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<SaleDocument>> {
        let mut conn = self.pool.acquire().await?;
        fetch_sale_document(&mut conn, id).await
    }

    pub async fn get_by_invoice_number(&self, invoice_number: &str) -> DbResult<Option<SaleDocument>> {
        let id: Option<String> = sqlx::query_scalar("SELECT id FROM sales WHERE invoice_number = ?1")
            .bind(invoice_number)
            .fetch_optional(&self.pool)
            .await?;

        match id {
            Some(id) => self.get_by_id(&id).await,
            None => Ok(None),
        }
    }

    /// Sale headers matching the filter, newest first.
    pub async fn list(&self, filter: &SaleFilter) -> DbResult<Vec<Sale>> {
        let sql = format!(
            "SELECT {SALE_COLUMNS} FROM sales \
             WHERE (?1 IS NULL OR status = ?1) \
               AND (?2 IS NULL OR created_at >= ?2) \
               AND (?3 IS NULL OR created_at < ?3) \
             ORDER BY created_at DESC, invoice_number DESC \
             LIMIT ?4 OFFSET ?5"
        );

        let sales = sqlx::query_as::<_, Sale>(&sql)
            .bind(filter.status)
            .bind(filter.from)
            .bind(filter.to)
            .bind(filter.limit)
            .bind(filter.offset)
            .fetch_all(&self.pool)
            .await?;

        Ok(sales)
    }

    /// Number of sales issued under an invoice prefix (e.g. `INV20261016`).
    pub async fn count_with_prefix(&self, prefix: &str) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sales WHERE substr(invoice_number, 1, length(?1)) = ?1")
            .bind(prefix)
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}
