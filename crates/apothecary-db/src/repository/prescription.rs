//! # Prescription Repository
//!
//! Read access to prescriptions. Creation, dispensing and cancellation go
//! through [`crate::fulfillment::FulfillmentEngine`].

use apothecary_core::{Prescription, PrescriptionDocument, PrescriptionItem, PrescriptionStatus};
use sqlx::{SqliteConnection, SqlitePool};

use crate::error::DbResult;

const PRESCRIPTION_COLUMNS: &str = "id, prescription_number, customer_id, doctor_name, \
     doctor_license, diagnosis, prescription_date, status, notes, created_by, dispensed_by, \
     dispensed_at, created_at, updated_at";

const PRESCRIPTION_ITEM_COLUMNS: &str = "id, prescription_id, position, product_id, dosage, \
     frequency, duration, quantity, instructions";

pub(crate) async fn fetch_prescription_document(
    conn: &mut SqliteConnection,
    id: &str,
) -> DbResult<Option<PrescriptionDocument>> {
    let sql = format!("SELECT {PRESCRIPTION_COLUMNS} FROM prescriptions WHERE id = ?1");
    let Some(prescription) = sqlx::query_as::<_, Prescription>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
    else {
        return Ok(None);
    };

    let sql = format!(
        "SELECT {PRESCRIPTION_ITEM_COLUMNS} FROM prescription_items \
         WHERE prescription_id = ?1 ORDER BY position"
    );
    let items = sqlx::query_as::<_, PrescriptionItem>(&sql)
        .bind(id)
        .fetch_all(&mut *conn)
        .await?;

    Ok(Some(PrescriptionDocument {
        prescription,
        items,
    }))
}

#[derive(Debug, Clone)]
pub struct PrescriptionRepository {
    pool: SqlitePool,
}

impl PrescriptionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        PrescriptionRepository { pool }
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<PrescriptionDocument>> {
        let mut conn = self.pool.acquire().await?;
        fetch_prescription_document(&mut conn, id).await
    }

    /// Prescription headers, newest first, optionally filtered by status.
    pub async fn list(
        &self,
        status: Option<PrescriptionStatus>,
        limit: u32,
        offset: u32,
    ) -> DbResult<Vec<Prescription>> {
        let sql = format!(
            "SELECT {PRESCRIPTION_COLUMNS} FROM prescriptions \
             WHERE (?1 IS NULL OR status = ?1) \
             ORDER BY created_at DESC, prescription_number DESC \
             LIMIT ?2 OFFSET ?3"
        );

        let prescriptions = sqlx::query_as::<_, Prescription>(&sql)
            .bind(status)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        Ok(prescriptions)
    }

    /// All prescriptions of one customer, newest first.
    pub async fn for_customer(&self, customer_id: &str) -> DbResult<Vec<Prescription>> {
        let sql = format!(
            "SELECT {PRESCRIPTION_COLUMNS} FROM prescriptions \
             WHERE customer_id = ?1 \
             ORDER BY created_at DESC"
        );

        let prescriptions = sqlx::query_as::<_, Prescription>(&sql)
            .bind(customer_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(prescriptions)
    }
}
