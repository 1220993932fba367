//! # Supplier Repository
//!
//! Wholesalers the pharmacy buys from. Suppliers are deactivated, never
//! deleted: products keep their `supplier_id`.

use apothecary_core::validation::{validate_email, validate_text};
use apothecary_core::{Supplier, ValidationError};
use chrono::Utc;
use serde::Deserialize;
use sqlx::SqlitePool;
use tracing::{debug, info};

use super::generate_id;
use crate::error::{DbError, DbResult};

const SUPPLIER_COLUMNS: &str = "id, name, contact_person, email, phone, address, is_active, created_at";

#[derive(Debug, Clone, Deserialize)]
pub struct NewSupplier {
    pub name: String,
    pub contact_person: String,
    pub email: String,
    pub phone: String,
    pub address: String,
}

/// Partial update. `None` leaves the field unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SupplierUpdate {
    pub name: Option<String>,
    pub contact_person: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub is_active: Option<bool>,
}

impl SupplierUpdate {
    fn apply(self, supplier: &mut Supplier) -> Result<(), ValidationError> {
        if let Some(name) = self.name {
            supplier.name = validate_text("name", &name, 200)?.to_string();
        }
        if let Some(contact) = self.contact_person {
            supplier.contact_person = validate_text("contact_person", &contact, 100)?.to_string();
        }
        if let Some(email) = self.email {
            validate_email("email", &email)?;
            supplier.email = email.trim().to_string();
        }
        if let Some(phone) = self.phone {
            supplier.phone = validate_text("phone", &phone, 30)?.to_string();
        }
        if let Some(address) = self.address {
            supplier.address = validate_text("address", &address, 500)?.to_string();
        }
        if let Some(flag) = self.is_active {
            supplier.is_active = flag;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct SupplierRepository {
    pool: SqlitePool,
}

impl SupplierRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SupplierRepository { pool }
    }

    pub async fn create(&self, input: NewSupplier) -> DbResult<Supplier> {
        validate_email("email", &input.email)?;

        let supplier = Supplier {
            id: generate_id(),
            name: validate_text("name", &input.name, 200)?.to_string(),
            contact_person: validate_text("contact_person", &input.contact_person, 100)?.to_string(),
            email: input.email.trim().to_string(),
            phone: validate_text("phone", &input.phone, 30)?.to_string(),
            address: validate_text("address", &input.address, 500)?.to_string(),
            is_active: true,
            created_at: Utc::now(),
        };

        sqlx::query(
            r#"
            INSERT INTO suppliers (id, name, contact_person, email, phone, address, is_active, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&supplier.id)
        .bind(&supplier.name)
        .bind(&supplier.contact_person)
        .bind(&supplier.email)
        .bind(&supplier.phone)
        .bind(&supplier.address)
        .bind(supplier.is_active)
        .bind(supplier.created_at)
        .execute(&self.pool)
        .await?;

        info!(name = %supplier.name, "Supplier created");
        Ok(supplier)
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Supplier>> {
        let sql = format!("SELECT {SUPPLIER_COLUMNS} FROM suppliers WHERE id = ?1");

        let supplier = sqlx::query_as::<_, Supplier>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(supplier)
    }

    /// Suppliers by name; inactive ones only when asked for.
    pub async fn list(&self, include_inactive: bool) -> DbResult<Vec<Supplier>> {
        let sql = format!(
            "SELECT {SUPPLIER_COLUMNS} FROM suppliers \
             WHERE (?1 OR is_active = 1) \
             ORDER BY name"
        );

        let suppliers = sqlx::query_as::<_, Supplier>(&sql)
            .bind(include_inactive)
            .fetch_all(&self.pool)
            .await?;

        Ok(suppliers)
    }

    pub async fn update(&self, id: &str, changes: SupplierUpdate) -> DbResult<Supplier> {
        let mut supplier = self
            .get_by_id(id)
            .await?
            .ok_or_else(|| DbError::not_found("Supplier", id))?;

        changes.apply(&mut supplier)?;

        debug!(id = %id, "Updating supplier");

        let result = sqlx::query(
            r#"
            UPDATE suppliers SET
                name = ?2,
                contact_person = ?3,
                email = ?4,
                phone = ?5,
                address = ?6,
                is_active = ?7
            WHERE id = ?1
            "#,
        )
        .bind(&supplier.id)
        .bind(&supplier.name)
        .bind(&supplier.contact_person)
        .bind(&supplier.email)
        .bind(&supplier.phone)
        .bind(&supplier.address)
        .bind(supplier.is_active)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Supplier", id));
        }

        Ok(supplier)
    }
}
