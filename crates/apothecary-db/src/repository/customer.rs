//! # Customer Repository
//!
//! Patients and walk-in customers. Prescriptions require one; sales may
//! reference one.

use apothecary_core::validation::{validate_optional_text, validate_search_query, validate_text};
use apothecary_core::Customer;
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use sqlx::SqlitePool;
use tracing::debug;

use super::generate_id;
use crate::error::DbResult;

const CUSTOMER_COLUMNS: &str =
    "id, name, phone, email, address, date_of_birth, allergies, created_at";

#[derive(Debug, Clone, Deserialize)]
pub struct NewCustomer {
    pub name: String,
    pub phone: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub date_of_birth: Option<NaiveDate>,
    /// Free text, shown to the pharmacist before dispensing.
    #[serde(default)]
    pub allergies: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CustomerRepository {
    pool: SqlitePool,
}

impl CustomerRepository {
    pub fn new(pool: SqlitePool) -> Self {
        CustomerRepository { pool }
    }

    pub async fn create(&self, input: NewCustomer) -> DbResult<Customer> {
        let customer = Customer {
            id: generate_id(),
            name: validate_text("name", &input.name, 200)?.to_string(),
            phone: validate_text("phone", &input.phone, 30)?.to_string(),
            email: validate_optional_text("email", input.email.as_deref(), 254)?,
            address: validate_optional_text("address", input.address.as_deref(), 500)?,
            date_of_birth: input.date_of_birth,
            allergies: validate_optional_text("allergies", input.allergies.as_deref(), 1000)?,
            created_at: Utc::now(),
        };

        sqlx::query(
            r#"
            INSERT INTO customers (id, name, phone, email, address, date_of_birth, allergies, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&customer.id)
        .bind(&customer.name)
        .bind(&customer.phone)
        .bind(&customer.email)
        .bind(&customer.address)
        .bind(customer.date_of_birth)
        .bind(&customer.allergies)
        .bind(customer.created_at)
        .execute(&self.pool)
        .await?;

        debug!(id = %customer.id, "Customer created");
        Ok(customer)
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Customer>> {
        let sql = format!("SELECT {CUSTOMER_COLUMNS} FROM customers WHERE id = ?1");

        let customer = sqlx::query_as::<_, Customer>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(customer)
    }

    /// Substring match on name or phone, newest first.
    pub async fn search(&self, query: &str, limit: u32) -> DbResult<Vec<Customer>> {
        let query = validate_search_query(query)?;
        let pattern = format!("%{}%", query);

        let sql = format!(
            "SELECT {CUSTOMER_COLUMNS} FROM customers \
             WHERE name LIKE ?1 OR phone LIKE ?1 \
             ORDER BY created_at DESC \
             LIMIT ?2"
        );

        let customers = sqlx::query_as::<_, Customer>(&sql)
            .bind(pattern)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        Ok(customers)
    }
}
