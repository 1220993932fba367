//! # Order Fulfillment Engine
//!
//! Every operation that numbers a document or moves stock on behalf of one:
//! sales (immediate, held, completed, cancelled), prescriptions (created,
//! dispensed, cancelled) and lab test requests.
//!
//! ## One Primitive, Two Documents
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                   One transaction per operation                         │
//! │                                                                         │
//! │  validate input            ── nothing locked yet, fail fast             │
//! │       │                                                                 │
//! │  BEGIN                                                                  │
//! │       │                                                                 │
//! │  reserve_stock             ── lock rows in id order, ProductNotFound,  │
//! │       │                       aggregate per product, every shortage    │
//! │       │                       reported together                        │
//! │  price_order (core)        ── line totals, subtotal, tax, total, change │
//! │       │                                                                 │
//! │  insert_numbered           ── MAX(number) for today's prefix + 1,      │
//! │       │                       INSERT inside a SAVEPOINT, retry on      │
//! │       │                       UNIQUE conflict (bounded)                │
//! │  lines + stock_out         ── decrement, one `out` movement per line   │
//! │       │                                                                 │
//! │  COMMIT                    ── or ROLLBACK: nothing happened             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Sale fulfillment and prescription dispensing differ only in which header
//! they write; locking, stock checks, numbering and movements are shared.
//!
//! ## State Guards
//! Status changes are conditional updates (`... WHERE status = 'pending'`)
//! issued as the first write of the transaction. Zero affected rows means
//! the document is missing or already terminal; a second dispense of the
//! same prescription can never decrement stock twice.

use std::collections::{BTreeMap, HashMap};

use apothecary_core::error::format_shortages;
use apothecary_core::numbering::{next_number, parse_counter};
use apothecary_core::pricing::{self, price_order, validate_totals, PricedLineInput};
use apothecary_core::types::{ensure_transition, DocumentStatus};
use apothecary_core::validation::{
    validate_age, validate_amount_cents, validate_line_count, validate_optional_text,
    validate_quantity, validate_text,
};
use apothecary_core::{
    CoreError, DocumentKind, Gender, LabTest, LabTestDocument, LabTestStatus, Money, MovementType,
    PaymentMethod, Prescription, PrescriptionDocument, PrescriptionItem, PrescriptionStatus,
    Product, Role, Sale, SaleDocument, SaleItem, SaleStatus, StockShortage, TaxRate,
    ValidationError,
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Connection, SqliteConnection, SqlitePool};
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::error::DbError;
use crate::repository::generate_id;
use crate::repository::laboratory::fetch_test_type;
use crate::repository::prescription::fetch_prescription_document;
use crate::repository::sale::{fetch_sale, fetch_sale_document, fetch_sale_items};
use crate::repository::stock::{insert_movement, lock_products, set_quantity, MovementRecord};

/// Upper bound on number allocation attempts per document.
pub const MAX_NUMBERING_ATTEMPTS: u32 = 5;

// =============================================================================
// Errors
// =============================================================================

/// Outcome of a failed fulfillment operation.
///
/// Every variant leaves the database exactly as it was before the call.
#[derive(Debug, Error)]
pub enum FulfillmentError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Product not found: {0}")]
    ProductNotFound(String),

    /// Lists every product that cannot cover its requested quantity.
    #[error("Insufficient stock for {}", format_shortages(.0))]
    InsufficientStock(Vec<StockShortage>),

    #[error("{document} not found: {id}")]
    DocumentNotFound { document: String, id: String },

    #[error("{document} is {from}, cannot move to {to}")]
    InvalidStateTransition {
        document: String,
        from: String,
        to: String,
    },

    /// Another writer took the number first. Retried internally; only
    /// surfaces through logs.
    #[error("Document number {number} was taken concurrently")]
    NumberingConflict { number: String },

    #[error("Fulfillment failed: {0}")]
    Internal(String),
}

impl From<CoreError> for FulfillmentError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ProductNotFound(id) => FulfillmentError::ProductNotFound(id),
            CoreError::InsufficientStock(shortages) => FulfillmentError::InsufficientStock(shortages),
            CoreError::InvalidStateTransition { document, from, to } => {
                FulfillmentError::InvalidStateTransition { document, from, to }
            }
            CoreError::Validation(e) => FulfillmentError::Validation(e),
            other @ (CoreError::MalformedDocumentNumber(_) | CoreError::NumberSpaceExhausted(_)) => {
                FulfillmentError::Internal(other.to_string())
            }
        }
    }
}

impl From<DbError> for FulfillmentError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Validation(e) => FulfillmentError::Validation(e),
            DbError::Core(e) => e.into(),
            DbError::NotFound { entity, id } => FulfillmentError::DocumentNotFound { document: entity, id },
            DbError::ForeignKeyViolation { .. } => {
                FulfillmentError::Validation(ValidationError::InvalidFormat {
                    field: "reference".to_string(),
                    reason: "refers to a record that does not exist".to_string(),
                })
            }
            other => FulfillmentError::Internal(other.to_string()),
        }
    }
}

impl From<sqlx::Error> for FulfillmentError {
    fn from(err: sqlx::Error) -> Self {
        DbError::from(err).into()
    }
}

pub type FulfillmentResult<T> = Result<T, FulfillmentError>;

// =============================================================================
// Requests
// =============================================================================

/// One requested line.
#[derive(Debug, Clone, Deserialize)]
pub struct LineRequest {
    pub product_id: String,
    pub quantity: i64,
    /// Overrides the product's current price for this line.
    #[serde(default)]
    pub unit_price_cents: Option<i64>,
    #[serde(default)]
    pub discount_cents: i64,
}

/// Immediate sale: priced, paid and decremented in one step.
#[derive(Debug, Clone, Deserialize)]
pub struct FulfillRequest {
    pub items: Vec<LineRequest>,
    pub payment_method: PaymentMethod,
    pub amount_paid_cents: i64,
    /// Absent: the pharmacy's default rate applied to the subtotal.
    #[serde(default)]
    pub tax_cents: Option<i64>,
    #[serde(default)]
    pub discount_cents: i64,
    #[serde(default)]
    pub customer_id: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// A sale parked at the till: priced and numbered, stock untouched.
#[derive(Debug, Clone, Deserialize)]
pub struct HoldSaleRequest {
    pub items: Vec<LineRequest>,
    #[serde(default)]
    pub tax_cents: Option<i64>,
    #[serde(default)]
    pub discount_cents: i64,
    #[serde(default)]
    pub customer_id: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompleteSaleRequest {
    pub payment_method: PaymentMethod,
    pub amount_paid_cents: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewPrescriptionItem {
    pub product_id: String,
    pub dosage: String,
    pub frequency: String,
    pub duration: String,
    pub quantity: i64,
    #[serde(default)]
    pub instructions: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewPrescription {
    pub customer_id: String,
    pub doctor_name: String,
    #[serde(default)]
    pub doctor_license: Option<String>,
    #[serde(default)]
    pub diagnosis: Option<String>,
    /// Defaults to today.
    #[serde(default)]
    pub prescription_date: Option<NaiveDate>,
    #[serde(default)]
    pub notes: Option<String>,
    pub items: Vec<NewPrescriptionItem>,
}

/// Payment details when dispensing also bills the customer.
#[derive(Debug, Clone, Deserialize)]
pub struct PrescriptionSale {
    pub payment_method: PaymentMethod,
    pub amount_paid_cents: i64,
    #[serde(default)]
    pub tax_cents: Option<i64>,
    #[serde(default)]
    pub discount_cents: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DispenseRequest {
    /// When present, a completed sale linked to the prescription is
    /// created in the same transaction.
    #[serde(default)]
    pub sale: Option<PrescriptionSale>,
}

/// Result of dispensing.
#[derive(Debug, Clone, Serialize)]
pub struct DispenseOutcome {
    pub prescription: PrescriptionDocument,
    pub sale: Option<SaleDocument>,
}

/// A lab test request. Patient details fall back to the customer's.
#[derive(Debug, Clone, Deserialize)]
pub struct NewLabTest {
    pub test_type_id: String,
    #[serde(default)]
    pub customer_id: Option<String>,
    #[serde(default)]
    pub patient_name: Option<String>,
    #[serde(default)]
    pub patient_age: Option<i64>,
    #[serde(default)]
    pub patient_gender: Option<Gender>,
    #[serde(default)]
    pub patient_phone: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Defaults to the test type's cost.
    #[serde(default)]
    pub cost_cents: Option<i64>,
    /// An active lab technician.
    #[serde(default)]
    pub assigned_to: Option<String>,
}

// =============================================================================
// Input Validation
// =============================================================================

fn validate_lines(items: &[LineRequest]) -> Result<(), ValidationError> {
    validate_line_count(items.len())?;
    for item in items {
        validate_text("product_id", &item.product_id, 64)?;
        validate_quantity(item.quantity)?;
        validate_amount_cents("discount_cents", item.discount_cents)?;
        if let Some(price) = item.unit_price_cents {
            validate_amount_cents("unit_price_cents", price)?;
        }
    }
    Ok(())
}

fn validate_charges(tax_cents: Option<i64>, discount_cents: i64) -> Result<(), ValidationError> {
    if let Some(tax) = tax_cents {
        validate_amount_cents("tax_cents", tax)?;
    }
    validate_amount_cents("discount_cents", discount_cents)
}

impl FulfillRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        validate_lines(&self.items)?;
        validate_charges(self.tax_cents, self.discount_cents)?;
        validate_amount_cents("amount_paid_cents", self.amount_paid_cents)
    }
}

impl HoldSaleRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        validate_lines(&self.items)?;
        validate_charges(self.tax_cents, self.discount_cents)
    }
}

impl NewPrescription {
    fn validate(&self) -> Result<(), ValidationError> {
        validate_text("customer_id", &self.customer_id, 64)?;
        validate_text("doctor_name", &self.doctor_name, 200)?;
        validate_line_count(self.items.len())?;
        for item in &self.items {
            validate_text("product_id", &item.product_id, 64)?;
            validate_text("dosage", &item.dosage, 100)?;
            validate_text("frequency", &item.frequency, 100)?;
            validate_text("duration", &item.duration, 100)?;
            validate_quantity(item.quantity)?;
        }
        Ok(())
    }
}

impl PrescriptionSale {
    fn validate(&self) -> Result<(), ValidationError> {
        validate_charges(self.tax_cents, self.discount_cents)?;
        validate_amount_cents("amount_paid_cents", self.amount_paid_cents)
    }
}

impl NewLabTest {
    fn validate(&self) -> Result<(), ValidationError> {
        validate_text("test_type_id", &self.test_type_id, 64)?;
        if let Some(age) = self.patient_age {
            validate_age(age)?;
        }
        if let Some(cost) = self.cost_cents {
            validate_amount_cents("cost_cents", cost)?;
        }
        Ok(())
    }
}

// =============================================================================
// Shared Primitive: Stock Reservation
// =============================================================================

/// A quantity of one product, as requested by a document line.
struct StockLine<'a> {
    product_id: &'a str,
    quantity: i64,
}

/// Locks every referenced product and checks availability.
///
/// Fails with the first unknown product (in request order) or with every
/// product whose aggregated request exceeds its on-hand quantity.
async fn reserve_stock(
    conn: &mut SqliteConnection,
    lines: &[StockLine<'_>],
    check_availability: bool,
) -> FulfillmentResult<HashMap<String, Product>> {
    let locked = lock_products(conn, lines.iter().map(|l| l.product_id)).await?;

    if let Some(missing) = lines
        .iter()
        .find(|l| !locked.get(l.product_id).is_some_and(|p| p.is_active))
    {
        return Err(FulfillmentError::ProductNotFound(missing.product_id.to_string()));
    }

    if check_availability {
        let mut requested: BTreeMap<&str, i64> = BTreeMap::new();
        for line in lines {
            *requested.entry(line.product_id).or_default() += line.quantity;
        }

        let shortages: Vec<StockShortage> = requested
            .iter()
            .filter_map(|(id, qty)| locked.get(*id).and_then(|p| p.shortage_for(*qty)))
            .collect();

        if !shortages.is_empty() {
            return Err(FulfillmentError::InsufficientStock(shortages));
        }
    }

    Ok(locked)
}

/// Decrements stock line by line, writing one `out` movement per line.
async fn stock_out(
    conn: &mut SqliteConnection,
    locked: &HashMap<String, Product>,
    lines: &[StockLine<'_>],
    reference_number: &str,
    notes: &str,
    actor: &str,
) -> FulfillmentResult<()> {
    let mut on_hand: HashMap<&str, i64> = locked.iter().map(|(id, p)| (id.as_str(), p.quantity)).collect();

    for line in lines {
        let current = on_hand
            .get_mut(line.product_id)
            .ok_or_else(|| FulfillmentError::ProductNotFound(line.product_id.to_string()))?;

        let after = MovementType::Out
            .resulting_quantity(*current, line.quantity)
            .ok_or_else(|| FulfillmentError::Internal(format!("stock for {} went negative", line.product_id)))?;
        *current = after;

        set_quantity(conn, line.product_id, after).await?;
        insert_movement(
            conn,
            MovementRecord {
                product_id: line.product_id,
                movement_type: MovementType::Out,
                quantity: line.quantity,
                quantity_after: after,
                reference_number: Some(reference_number),
                notes: Some(notes),
                actor,
            },
        )
        .await?;
    }

    Ok(())
}

// =============================================================================
// Shared Primitive: Number Allocation
// =============================================================================

/// A document header waiting for its number.
enum Header<'a> {
    Sale(&'a Sale),
    Prescription(&'a Prescription),
    LabTest(&'a LabTest),
}

impl Header<'_> {
    fn kind(&self) -> DocumentKind {
        match self {
            Header::Sale(_) => DocumentKind::Invoice,
            Header::Prescription(_) => DocumentKind::Prescription,
            Header::LabTest(_) => DocumentKind::LabTest,
        }
    }

    fn number_column(&self) -> &'static str {
        match self {
            Header::Sale(_) => "sales.invoice_number",
            Header::Prescription(_) => "prescriptions.prescription_number",
            Header::LabTest(_) => "lab_tests.test_number",
        }
    }

    fn latest_sql(&self) -> &'static str {
        match self {
            Header::Sale(_) => {
                "SELECT MAX(invoice_number) FROM sales \
                 WHERE substr(invoice_number, 1, length(?1)) = ?1"
            }
            Header::Prescription(_) => {
                "SELECT MAX(prescription_number) FROM prescriptions \
                 WHERE substr(prescription_number, 1, length(?1)) = ?1"
            }
            Header::LabTest(_) => {
                "SELECT MAX(test_number) FROM lab_tests \
                 WHERE substr(test_number, 1, length(?1)) = ?1"
            }
        }
    }

    async fn insert(&self, conn: &mut SqliteConnection, number: &str) -> Result<(), DbError> {
        match self {
            Header::Sale(sale) => {
                sqlx::query(
                    r#"
                    INSERT INTO sales (
                        id, invoice_number, customer_id, prescription_id,
                        subtotal_cents, tax_cents, discount_cents, total_cents,
                        payment_method, amount_paid_cents, change_cents, status, notes,
                        cashier_id, created_at, updated_at, completed_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
                    "#,
                )
                .bind(&sale.id)
                .bind(number)
                .bind(&sale.customer_id)
                .bind(&sale.prescription_id)
                .bind(sale.subtotal_cents)
                .bind(sale.tax_cents)
                .bind(sale.discount_cents)
                .bind(sale.total_cents)
                .bind(sale.payment_method)
                .bind(sale.amount_paid_cents)
                .bind(sale.change_cents)
                .bind(sale.status)
                .bind(&sale.notes)
                .bind(&sale.cashier_id)
                .bind(sale.created_at)
                .bind(sale.updated_at)
                .bind(sale.completed_at)
                .execute(&mut *conn)
                .await?;
            }
            Header::Prescription(rx) => {
                sqlx::query(
                    r#"
                    INSERT INTO prescriptions (
                        id, prescription_number, customer_id, doctor_name, doctor_license,
                        diagnosis, prescription_date, status, notes, created_by,
                        dispensed_by, dispensed_at, created_at, updated_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
                    "#,
                )
                .bind(&rx.id)
                .bind(number)
                .bind(&rx.customer_id)
                .bind(&rx.doctor_name)
                .bind(&rx.doctor_license)
                .bind(&rx.diagnosis)
                .bind(rx.prescription_date)
                .bind(rx.status)
                .bind(&rx.notes)
                .bind(&rx.created_by)
                .bind(&rx.dispensed_by)
                .bind(rx.dispensed_at)
                .bind(rx.created_at)
                .bind(rx.updated_at)
                .execute(&mut *conn)
                .await?;
            }
            Header::LabTest(test) => {
                sqlx::query(
                    r#"
                    INSERT INTO lab_tests (
                        id, test_number, test_type_id, test_name, description, customer_id,
                        patient_name, patient_age, patient_gender, patient_phone, cost_cents,
                        paid, paid_at, payment_method, requested_by, assigned_to, status,
                        started_at, completed_at, results, diagnosis, notes, reviewed_by,
                        reviewed_at, created_at, updated_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                              ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26)
                    "#,
                )
                .bind(&test.id)
                .bind(number)
                .bind(&test.test_type_id)
                .bind(&test.test_name)
                .bind(&test.description)
                .bind(&test.customer_id)
                .bind(&test.patient_name)
                .bind(test.patient_age)
                .bind(test.patient_gender)
                .bind(&test.patient_phone)
                .bind(test.cost_cents)
                .bind(test.paid)
                .bind(test.paid_at)
                .bind(test.payment_method)
                .bind(&test.requested_by)
                .bind(&test.assigned_to)
                .bind(test.status)
                .bind(test.started_at)
                .bind(test.completed_at)
                .bind(&test.results)
                .bind(&test.diagnosis)
                .bind(&test.notes)
                .bind(&test.reviewed_by)
                .bind(test.reviewed_at)
                .bind(test.created_at)
                .bind(test.updated_at)
                .execute(&mut *conn)
                .await?;
            }
        }
        Ok(())
    }
}

/// Inserts `header` with one attempt's number inside a savepoint.
async fn try_insert(conn: &mut SqliteConnection, header: &Header<'_>, number: &str) -> FulfillmentResult<()> {
    let mut savepoint = conn.begin().await?;

    match header.insert(&mut savepoint, number).await {
        Ok(()) => {
            savepoint.commit().await?;
            Ok(())
        }
        Err(err) if err.is_unique_violation_on(header.number_column()) => {
            savepoint.rollback().await?;
            Err(FulfillmentError::NumberingConflict {
                number: number.to_string(),
            })
        }
        Err(err) => Err(err.into()),
    }
}

/// Allocates today's next number for `header` and inserts it.
async fn insert_numbered(
    conn: &mut SqliteConnection,
    header: Header<'_>,
    today: NaiveDate,
) -> FulfillmentResult<String> {
    let kind = header.kind();
    let prefix = kind.prefix(today);
    let mut floor = 0;

    for attempt in 1..=MAX_NUMBERING_ATTEMPTS {
        let latest: Option<String> = sqlx::query_scalar(header.latest_sql())
            .bind(&prefix)
            .fetch_one(&mut *conn)
            .await?;

        let number = next_number(kind, today, latest.as_deref(), floor)?;

        match try_insert(conn, &header, &number).await {
            Ok(()) => return Ok(number),
            Err(FulfillmentError::NumberingConflict { number }) => {
                warn!(number = %number, attempt, "Document number taken, retrying");
                floor = parse_counter(&prefix, &number)? + 1;
            }
            Err(err) => return Err(err),
        }
    }

    Err(FulfillmentError::Internal(format!(
        "could not allocate a {kind} number after {MAX_NUMBERING_ATTEMPTS} attempts"
    )))
}

// =============================================================================
// Pricing Helpers
// =============================================================================

async fn default_tax_rate(conn: &mut SqliteConnection) -> FulfillmentResult<TaxRate> {
    let bps: Option<i64> =
        sqlx::query_scalar("SELECT default_tax_rate_bps FROM pharmacy_settings WHERE id = 1")
            .fetch_optional(&mut *conn)
            .await?;

    Ok(TaxRate::from_bps(bps.and_then(|b| u32::try_from(b).ok()).unwrap_or(0)))
}

/// Explicit tax wins; otherwise the default rate on the subtotal.
async fn resolve_tax(
    conn: &mut SqliteConnection,
    explicit: Option<i64>,
    lines: &[PricedLineInput],
) -> FulfillmentResult<Money> {
    match explicit {
        Some(cents) => Ok(Money::from_cents(cents)),
        None => {
            let rate = default_tax_rate(conn).await?;
            let subtotal = pricing::subtotal(lines)?;
            Ok(subtotal.non_negative().calculate_tax(rate))
        }
    }
}

/// Resolves each request line against its locked product.
fn priced_lines(
    items: &[LineRequest],
    locked: &HashMap<String, Product>,
) -> FulfillmentResult<Vec<PricedLineInput>> {
    items
        .iter()
        .map(|item| {
            let product = locked
                .get(&item.product_id)
                .ok_or_else(|| FulfillmentError::ProductNotFound(item.product_id.clone()))?;
            let unit_price = Money::from_cents(item.unit_price_cents.unwrap_or(product.unit_price_cents));

            Ok(PricedLineInput {
                unit_price,
                quantity: item.quantity,
                discount: Money::from_cents(item.discount_cents),
            })
        })
        .collect()
}

fn sale_items(
    sale_id: &str,
    items: &[LineRequest],
    priced: &[PricedLineInput],
    line_totals: &[Money],
    locked: &HashMap<String, Product>,
) -> Vec<SaleItem> {
    let now = Utc::now();
    items
        .iter()
        .zip(priced.iter().zip(line_totals))
        .enumerate()
        .map(|(position, (item, (line, line_total)))| SaleItem {
            id: generate_id(),
            sale_id: sale_id.to_string(),
            position: position as i64,
            product_id: item.product_id.clone(),
            name_snapshot: locked
                .get(&item.product_id)
                .map(|p| p.name.clone())
                .unwrap_or_default(),
            quantity: line.quantity,
            unit_price_cents: line.unit_price.cents(),
            discount_cents: line.discount.cents(),
            line_total_cents: line_total.cents(),
            created_at: now,
        })
        .collect()
}

async fn insert_sale_items(conn: &mut SqliteConnection, items: &[SaleItem]) -> FulfillmentResult<()> {
    for item in items {
        sqlx::query(
            r#"
            INSERT INTO sale_items (
                id, sale_id, position, product_id, name_snapshot, quantity,
                unit_price_cents, discount_cents, line_total_cents, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&item.id)
        .bind(&item.sale_id)
        .bind(item.position)
        .bind(&item.product_id)
        .bind(&item.name_snapshot)
        .bind(item.quantity)
        .bind(item.unit_price_cents)
        .bind(item.discount_cents)
        .bind(item.line_total_cents)
        .bind(item.created_at)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

fn transition_error<S: DocumentStatus>(document: String, from: S, to: S) -> FulfillmentError {
    match ensure_transition(&document, from, to) {
        Err(err) => err.into(),
        Ok(()) => FulfillmentError::Internal(format!("{document} changed during the operation")),
    }
}

async fn customer_exists(conn: &mut SqliteConnection, id: &str) -> FulfillmentResult<bool> {
    let found: Option<i64> = sqlx::query_scalar("SELECT 1 FROM customers WHERE id = ?1")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(found.is_some())
}

fn unknown_customer() -> FulfillmentError {
    ValidationError::InvalidFormat {
        field: "customer_id".to_string(),
        reason: "no such customer".to_string(),
    }
    .into()
}

// =============================================================================
// Engine
// =============================================================================

/// The order fulfillment engine.
///
/// Obtained from [`crate::Database::fulfillment`].
#[derive(Debug, Clone)]
pub struct FulfillmentEngine {
    pool: SqlitePool,
    today: fn() -> NaiveDate,
}

impl FulfillmentEngine {
    pub fn new(pool: SqlitePool, today: fn() -> NaiveDate) -> Self {
        FulfillmentEngine { pool, today }
    }

    // -------------------------------------------------------------------------
    // Sales
    // -------------------------------------------------------------------------

    /// Sells `request.items` immediately: a completed sale, stock decremented.
    ///
    /// ## Example
    /// ```text
    /// Product P: quantity 5, price 4.50
    /// fulfill([P × 3], cash, paid 20.00)
    ///   → INV202610160001, total 13.50, change 6.50, P quantity 2
    /// ```
    #[instrument(skip(self, request), fields(lines = request.items.len()))]
    pub async fn fulfill(&self, request: FulfillRequest, actor: &str) -> FulfillmentResult<SaleDocument> {
        request.validate()?;
        let today = (self.today)();

        let mut tx = self.pool.begin().await?;

        let stock_lines: Vec<StockLine<'_>> = request
            .items
            .iter()
            .map(|i| StockLine {
                product_id: &i.product_id,
                quantity: i.quantity,
            })
            .collect();
        let locked = reserve_stock(&mut tx, &stock_lines, true).await?;

        if let Some(customer_id) = &request.customer_id {
            if !customer_exists(&mut tx, customer_id).await? {
                return Err(unknown_customer());
            }
        }

        let priced = priced_lines(&request.items, &locked)?;
        let tax = resolve_tax(&mut tx, request.tax_cents, &priced).await?;
        let totals = price_order(
            &priced,
            tax,
            Money::from_cents(request.discount_cents),
            Money::from_cents(request.amount_paid_cents),
        )?;
        validate_totals(&totals)?;

        let now = Utc::now();
        let mut sale = Sale {
            id: generate_id(),
            invoice_number: String::new(),
            customer_id: request.customer_id.clone(),
            prescription_id: None,
            subtotal_cents: totals.subtotal.cents(),
            tax_cents: totals.tax.cents(),
            discount_cents: totals.discount.cents(),
            total_cents: totals.total.cents(),
            payment_method: Some(request.payment_method),
            amount_paid_cents: totals.amount_paid.cents(),
            change_cents: totals.change.cents(),
            status: SaleStatus::Completed,
            notes: validate_optional_text("notes", request.notes.as_deref(), 1000)?,
            cashier_id: actor.to_string(),
            created_at: now,
            updated_at: now,
            completed_at: Some(now),
        };

        sale.invoice_number = insert_numbered(&mut tx, Header::Sale(&sale), today).await?;

        let items = sale_items(&sale.id, &request.items, &priced, &totals.line_totals, &locked);
        insert_sale_items(&mut tx, &items).await?;
        stock_out(&mut tx, &locked, &stock_lines, &sale.invoice_number, "Sale", actor).await?;

        tx.commit().await?;

        info!(
            invoice = %sale.invoice_number,
            total = %totals.total,
            change = %totals.change,
            "Sale fulfilled"
        );

        Ok(SaleDocument { sale, items })
    }

    /// Parks a sale: priced and numbered, stock untouched.
    #[instrument(skip(self, request), fields(lines = request.items.len()))]
    pub async fn hold_sale(&self, request: HoldSaleRequest, actor: &str) -> FulfillmentResult<SaleDocument> {
        request.validate()?;
        let today = (self.today)();

        let mut tx = self.pool.begin().await?;

        let stock_lines: Vec<StockLine<'_>> = request
            .items
            .iter()
            .map(|i| StockLine {
                product_id: &i.product_id,
                quantity: i.quantity,
            })
            .collect();
        // Locking here also takes the write lock before the first read
        let locked = reserve_stock(&mut tx, &stock_lines, false).await?;

        if let Some(customer_id) = &request.customer_id {
            if !customer_exists(&mut tx, customer_id).await? {
                return Err(unknown_customer());
            }
        }

        let priced = priced_lines(&request.items, &locked)?;
        let tax = resolve_tax(&mut tx, request.tax_cents, &priced).await?;
        let totals = price_order(&priced, tax, Money::from_cents(request.discount_cents), Money::zero())?;
        validate_totals(&totals)?;

        let now = Utc::now();
        let mut sale = Sale {
            id: generate_id(),
            invoice_number: String::new(),
            customer_id: request.customer_id.clone(),
            prescription_id: None,
            subtotal_cents: totals.subtotal.cents(),
            tax_cents: totals.tax.cents(),
            discount_cents: totals.discount.cents(),
            total_cents: totals.total.cents(),
            payment_method: None,
            amount_paid_cents: 0,
            change_cents: 0,
            status: SaleStatus::Pending,
            notes: validate_optional_text("notes", request.notes.as_deref(), 1000)?,
            cashier_id: actor.to_string(),
            created_at: now,
            updated_at: now,
            completed_at: None,
        };

        sale.invoice_number = insert_numbered(&mut tx, Header::Sale(&sale), today).await?;

        let items = sale_items(&sale.id, &request.items, &priced, &totals.line_totals, &locked);
        insert_sale_items(&mut tx, &items).await?;

        tx.commit().await?;

        info!(invoice = %sale.invoice_number, total = %totals.total, "Sale held");
        Ok(SaleDocument { sale, items })
    }

    /// Completes a held sale exactly once: takes payment and decrements stock.
    ///
    /// Line prices are the ones frozen when the sale was held.
    #[instrument(skip(self, request))]
    pub async fn complete_sale(
        &self,
        sale_id: &str,
        request: CompleteSaleRequest,
        actor: &str,
    ) -> FulfillmentResult<SaleDocument> {
        validate_amount_cents("amount_paid_cents", request.amount_paid_cents)?;

        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        let claimed = sqlx::query(
            "UPDATE sales SET status = 'completed', updated_at = ?2, completed_at = ?2 \
             WHERE id = ?1 AND status = 'pending'",
        )
        .bind(sale_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        if claimed.rows_affected() == 0 {
            return Err(self.sale_transition_error(&mut tx, sale_id, SaleStatus::Completed).await);
        }

        let sale = fetch_sale(&mut tx, sale_id)
            .await?
            .ok_or_else(|| FulfillmentError::Internal(format!("sale {sale_id} vanished")))?;
        let items = fetch_sale_items(&mut tx, sale_id).await?;

        let stock_lines: Vec<StockLine<'_>> = items
            .iter()
            .map(|i| StockLine {
                product_id: &i.product_id,
                quantity: i.quantity,
            })
            .collect();
        let locked = reserve_stock(&mut tx, &stock_lines, true).await?;

        let paid = Money::from_cents(request.amount_paid_cents);
        let change = paid
            .checked_sub(sale.total())
            .ok_or_else(|| FulfillmentError::Internal(format!("sale {sale_id} has an unusable total")))?
            .non_negative();

        sqlx::query(
            "UPDATE sales SET payment_method = ?2, amount_paid_cents = ?3, change_cents = ?4 WHERE id = ?1",
        )
        .bind(sale_id)
        .bind(request.payment_method)
        .bind(paid.cents())
        .bind(change.cents())
        .execute(&mut *tx)
        .await?;

        stock_out(&mut tx, &locked, &stock_lines, &sale.invoice_number, "Sale", actor).await?;

        let document = fetch_sale_document(&mut tx, sale_id)
            .await?
            .ok_or_else(|| FulfillmentError::Internal(format!("sale {sale_id} vanished")))?;

        tx.commit().await?;

        info!(invoice = %document.sale.invoice_number, change = %change, "Held sale completed");
        Ok(document)
    }

    /// Cancels a held sale. Completed sales cannot be cancelled.
    #[instrument(skip(self))]
    pub async fn cancel_sale(&self, sale_id: &str, actor: &str) -> FulfillmentResult<SaleDocument> {
        let mut tx = self.pool.begin().await?;

        let cancelled = sqlx::query(
            "UPDATE sales SET status = 'cancelled', updated_at = ?2 WHERE id = ?1 AND status = 'pending'",
        )
        .bind(sale_id)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        if cancelled.rows_affected() == 0 {
            return Err(self.sale_transition_error(&mut tx, sale_id, SaleStatus::Cancelled).await);
        }

        let document = fetch_sale_document(&mut tx, sale_id)
            .await?
            .ok_or_else(|| FulfillmentError::Internal(format!("sale {sale_id} vanished")))?;

        tx.commit().await?;

        info!(invoice = %document.sale.invoice_number, actor = %actor, "Sale cancelled");
        Ok(document)
    }

    async fn sale_transition_error(
        &self,
        conn: &mut SqliteConnection,
        sale_id: &str,
        to: SaleStatus,
    ) -> FulfillmentError {
        match fetch_sale(conn, sale_id).await {
            Ok(Some(sale)) => transition_error(format!("Sale {}", sale.invoice_number), sale.status, to),
            Ok(None) => FulfillmentError::DocumentNotFound {
                document: "Sale".to_string(),
                id: sale_id.to_string(),
            },
            Err(err) => err.into(),
        }
    }

    // -------------------------------------------------------------------------
    // Prescriptions
    // -------------------------------------------------------------------------

    /// Records a pending prescription and allocates its RX number.
    ///
    /// Products must exist; stock is not checked until dispensing.
    #[instrument(skip(self, request), fields(items = request.items.len()))]
    pub async fn create_prescription(
        &self,
        request: NewPrescription,
        actor: &str,
    ) -> FulfillmentResult<PrescriptionDocument> {
        request.validate()?;
        let today = (self.today)();

        let mut tx = self.pool.begin().await?;

        let stock_lines: Vec<StockLine<'_>> = request
            .items
            .iter()
            .map(|i| StockLine {
                product_id: &i.product_id,
                quantity: i.quantity,
            })
            .collect();
        reserve_stock(&mut tx, &stock_lines, false).await?;

        if !customer_exists(&mut tx, &request.customer_id).await? {
            return Err(unknown_customer());
        }

        let now = Utc::now();
        let mut prescription = Prescription {
            id: generate_id(),
            prescription_number: String::new(),
            customer_id: request.customer_id.clone(),
            doctor_name: request.doctor_name.trim().to_string(),
            doctor_license: validate_optional_text("doctor_license", request.doctor_license.as_deref(), 100)?,
            diagnosis: validate_optional_text("diagnosis", request.diagnosis.as_deref(), 1000)?,
            prescription_date: request.prescription_date.unwrap_or(today),
            status: PrescriptionStatus::Pending,
            notes: validate_optional_text("notes", request.notes.as_deref(), 1000)?,
            created_by: actor.to_string(),
            dispensed_by: None,
            dispensed_at: None,
            created_at: now,
            updated_at: now,
        };

        prescription.prescription_number =
            insert_numbered(&mut tx, Header::Prescription(&prescription), today).await?;

        let mut items = Vec::with_capacity(request.items.len());
        for (position, item) in request.items.iter().enumerate() {
            let row = PrescriptionItem {
                id: generate_id(),
                prescription_id: prescription.id.clone(),
                position: position as i64,
                product_id: item.product_id.clone(),
                dosage: item.dosage.trim().to_string(),
                frequency: item.frequency.trim().to_string(),
                duration: item.duration.trim().to_string(),
                quantity: item.quantity,
                instructions: validate_optional_text("instructions", item.instructions.as_deref(), 500)?,
            };

            sqlx::query(
                r#"
                INSERT INTO prescription_items (
                    id, prescription_id, position, product_id, dosage,
                    frequency, duration, quantity, instructions
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                "#,
            )
            .bind(&row.id)
            .bind(&row.prescription_id)
            .bind(row.position)
            .bind(&row.product_id)
            .bind(&row.dosage)
            .bind(&row.frequency)
            .bind(&row.duration)
            .bind(row.quantity)
            .bind(&row.instructions)
            .execute(&mut *tx)
            .await?;

            items.push(row);
        }

        tx.commit().await?;

        info!(number = %prescription.prescription_number, "Prescription recorded");
        Ok(PrescriptionDocument { prescription, items })
    }

    /// Dispenses a pending prescription: decrements stock for every item and
    /// marks it dispensed by `actor`. With `request.sale`, also bills it as a
    /// completed sale linked to the prescription.
    #[instrument(skip(self, request))]
    pub async fn dispense(
        &self,
        prescription_id: &str,
        request: DispenseRequest,
        actor: &str,
    ) -> FulfillmentResult<DispenseOutcome> {
        if let Some(sale) = &request.sale {
            sale.validate()?;
        }
        let today = (self.today)();

        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        let claimed = sqlx::query(
            "UPDATE prescriptions SET status = 'dispensed', dispensed_by = ?2, dispensed_at = ?3, \
             updated_at = ?3 WHERE id = ?1 AND status = 'pending'",
        )
        .bind(prescription_id)
        .bind(actor)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        if claimed.rows_affected() == 0 {
            return Err(self
                .prescription_transition_error(&mut tx, prescription_id, PrescriptionStatus::Dispensed)
                .await);
        }

        let document = fetch_prescription_document(&mut tx, prescription_id)
            .await?
            .ok_or_else(|| FulfillmentError::Internal(format!("prescription {prescription_id} vanished")))?;
        let rx_number = document.prescription.prescription_number.clone();

        let stock_lines: Vec<StockLine<'_>> = document
            .items
            .iter()
            .map(|i| StockLine {
                product_id: &i.product_id,
                quantity: i.quantity,
            })
            .collect();
        let locked = reserve_stock(&mut tx, &stock_lines, true).await?;

        let sale = match &request.sale {
            None => None,
            Some(billing) => {
                let lines: Vec<LineRequest> = document
                    .items
                    .iter()
                    .map(|i| LineRequest {
                        product_id: i.product_id.clone(),
                        quantity: i.quantity,
                        unit_price_cents: None,
                        discount_cents: 0,
                    })
                    .collect();

                let priced = priced_lines(&lines, &locked)?;
                let tax = resolve_tax(&mut tx, billing.tax_cents, &priced).await?;
                let totals = price_order(
                    &priced,
                    tax,
                    Money::from_cents(billing.discount_cents),
                    Money::from_cents(billing.amount_paid_cents),
                )?;
                validate_totals(&totals)?;

                let mut sale = Sale {
                    id: generate_id(),
                    invoice_number: String::new(),
                    customer_id: Some(document.prescription.customer_id.clone()),
                    prescription_id: Some(prescription_id.to_string()),
                    subtotal_cents: totals.subtotal.cents(),
                    tax_cents: totals.tax.cents(),
                    discount_cents: totals.discount.cents(),
                    total_cents: totals.total.cents(),
                    payment_method: Some(billing.payment_method),
                    amount_paid_cents: totals.amount_paid.cents(),
                    change_cents: totals.change.cents(),
                    status: SaleStatus::Completed,
                    notes: Some(format!("Prescription {rx_number}")),
                    cashier_id: actor.to_string(),
                    created_at: now,
                    updated_at: now,
                    completed_at: Some(now),
                };

                sale.invoice_number = insert_numbered(&mut tx, Header::Sale(&sale), today).await?;

                let items = sale_items(&sale.id, &lines, &priced, &totals.line_totals, &locked);
                insert_sale_items(&mut tx, &items).await?;
                Some(SaleDocument { sale, items })
            }
        };

        stock_out(&mut tx, &locked, &stock_lines, &rx_number, "Dispensed", actor).await?;

        let prescription = fetch_prescription_document(&mut tx, prescription_id)
            .await?
            .ok_or_else(|| FulfillmentError::Internal(format!("prescription {prescription_id} vanished")))?;

        tx.commit().await?;

        info!(
            number = %rx_number,
            invoice = sale.as_ref().map(|s| s.sale.invoice_number.as_str()).unwrap_or("-"),
            "Prescription dispensed"
        );

        Ok(DispenseOutcome { prescription, sale })
    }

    /// Cancels a pending prescription.
    #[instrument(skip(self))]
    pub async fn cancel_prescription(
        &self,
        prescription_id: &str,
        actor: &str,
    ) -> FulfillmentResult<PrescriptionDocument> {
        let mut tx = self.pool.begin().await?;

        let cancelled = sqlx::query(
            "UPDATE prescriptions SET status = 'cancelled', updated_at = ?2 \
             WHERE id = ?1 AND status = 'pending'",
        )
        .bind(prescription_id)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        if cancelled.rows_affected() == 0 {
            return Err(self
                .prescription_transition_error(&mut tx, prescription_id, PrescriptionStatus::Cancelled)
                .await);
        }

        let document = fetch_prescription_document(&mut tx, prescription_id)
            .await?
            .ok_or_else(|| FulfillmentError::Internal(format!("prescription {prescription_id} vanished")))?;

        tx.commit().await?;

        info!(number = %document.prescription.prescription_number, actor = %actor, "Prescription cancelled");
        Ok(document)
    }

    // -------------------------------------------------------------------------
    // Laboratory
    // -------------------------------------------------------------------------

    /// Records a pending lab test and allocates its LAB number.
    ///
    /// The test type must be active. Its name is copied onto the test and its
    /// cost applies unless `request.cost_cents` overrides it.
    #[instrument(skip(self, request))]
    pub async fn request_lab_test(&self, request: NewLabTest, actor: &str) -> FulfillmentResult<LabTestDocument> {
        request.validate()?;
        let today = (self.today)();

        let mut tx = self.pool.begin().await?;

        let test_type = fetch_test_type(&mut tx, &request.test_type_id)
            .await?
            .filter(|t| t.is_active)
            .ok_or_else(|| ValidationError::InvalidFormat {
                field: "test_type_id".to_string(),
                reason: "no such active test type".to_string(),
            })?;

        let customer = match &request.customer_id {
            Some(id) => {
                let row: Option<(String, String)> =
                    sqlx::query_as("SELECT name, phone FROM customers WHERE id = ?1")
                        .bind(id)
                        .fetch_optional(&mut *tx)
                        .await?;
                Some(row.ok_or_else(unknown_customer)?)
            }
            None => None,
        };

        let patient_name = match validate_optional_text("patient_name", request.patient_name.as_deref(), 200)? {
            Some(name) => name,
            None => customer
                .as_ref()
                .map(|(name, _)| name.clone())
                .ok_or_else(|| ValidationError::Required {
                    field: "patient_name".to_string(),
                })?,
        };
        let patient_phone = validate_optional_text("patient_phone", request.patient_phone.as_deref(), 30)?
            .or_else(|| customer.as_ref().map(|(_, phone)| phone.clone()));

        if let Some(user_id) = &request.assigned_to {
            let role: Option<Role> = sqlx::query_scalar("SELECT role FROM users WHERE id = ?1 AND is_active = 1")
                .bind(user_id)
                .fetch_optional(&mut *tx)
                .await?;
            if role != Some(Role::LabTechnician) {
                return Err(ValidationError::InvalidFormat {
                    field: "assigned_to".to_string(),
                    reason: "not an active lab technician".to_string(),
                }
                .into());
            }
        }

        let now = Utc::now();
        let mut test = LabTest {
            id: generate_id(),
            test_number: String::new(),
            test_type_id: test_type.id.clone(),
            test_name: test_type.name.clone(),
            description: validate_optional_text("description", request.description.as_deref(), 2000)?,
            customer_id: request.customer_id.clone(),
            patient_name,
            patient_age: request.patient_age,
            patient_gender: request.patient_gender,
            patient_phone,
            cost_cents: request.cost_cents.unwrap_or(test_type.cost_cents),
            paid: false,
            paid_at: None,
            payment_method: None,
            requested_by: actor.to_string(),
            assigned_to: request.assigned_to.clone(),
            status: LabTestStatus::Pending,
            started_at: None,
            completed_at: None,
            results: None,
            diagnosis: None,
            notes: None,
            reviewed_by: None,
            reviewed_at: None,
            created_at: now,
            updated_at: now,
        };

        test.test_number = insert_numbered(&mut tx, Header::LabTest(&test), today).await?;

        tx.commit().await?;

        info!(number = %test.test_number, test = %test.test_name, "Lab test requested");
        Ok(LabTestDocument {
            test,
            measurements: Vec::new(),
        })
    }

    async fn prescription_transition_error(
        &self,
        conn: &mut SqliteConnection,
        prescription_id: &str,
        to: PrescriptionStatus,
    ) -> FulfillmentError {
        match fetch_prescription_document(conn, prescription_id).await {
            Ok(Some(doc)) => transition_error(
                format!("Prescription {}", doc.prescription.prescription_number),
                doc.prescription.status,
                to,
            ),
            Ok(None) => FulfillmentError::DocumentNotFound {
                document: "Prescription".to_string(),
                id: prescription_id.to_string(),
            },
            Err(err) => err.into(),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::customer::tests::new_customer;
    use crate::repository::laboratory::tests::{fbc, lab_request};
    use crate::repository::laboratory::TestTypeUpdate;
    use crate::repository::product::tests::new_product;
    use crate::repository::user::tests::create_test_user;
    use crate::{Database, DbConfig};

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 16).unwrap()
    }

    async fn engine_with_product(quantity: i64) -> (Database, String, Product) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap().with_today(day);
        let user = create_test_user(&db, "cashier1", Role::Cashier).await;
        let product = db
            .products()
            .create(new_product("ORS-1", "Oral rehydration salts", 120, quantity), &user.id)
            .await
            .unwrap();
        (db, user.id, product)
    }

    /// Makes every INSERT of a matching invoice number collide with a row
    /// that appears just before it, as a concurrent writer would.
    async fn install_rival_writer(db: &Database, when: &str) {
        let sql = format!(
            "CREATE TRIGGER rival_invoice BEFORE INSERT ON sales WHEN {when} BEGIN \
               INSERT INTO sales (id, invoice_number, subtotal_cents, total_cents, status, \
                                  cashier_id, created_at, updated_at) \
               VALUES (NEW.id || '-rival', NEW.invoice_number, 0, 0, 'pending', \
                       NEW.cashier_id, NEW.created_at, NEW.updated_at); \
             END"
        );
        sqlx::query(&sql).execute(db.pool()).await.unwrap();
    }

    fn one_unit(product_id: &str) -> FulfillRequest {
        FulfillRequest {
            items: vec![LineRequest {
                product_id: product_id.to_string(),
                quantity: 1,
                unit_price_cents: None,
                discount_cents: 0,
            }],
            payment_method: PaymentMethod::Cash,
            amount_paid_cents: 120,
            tax_cents: Some(0),
            discount_cents: 0,
            customer_id: None,
            notes: None,
        }
    }

    #[tokio::test]
    async fn test_number_conflict_is_retried_with_the_next_number() {
        let (db, actor, product) = engine_with_product(3).await;
        install_rival_writer(&db, "NEW.invoice_number = 'INV202610160001'").await;

        let doc = db.fulfillment().fulfill(one_unit(&product.id), &actor).await.unwrap();

        assert_eq!(doc.sale.invoice_number, "INV202610160002");
        let stored: Vec<String> = sqlx::query_scalar("SELECT invoice_number FROM sales")
            .fetch_all(db.pool())
            .await
            .unwrap();
        assert_eq!(stored, vec!["INV202610160002".to_string()]);
        assert_eq!(db.products().get_by_id(&product.id).await.unwrap().unwrap().quantity, 2);
    }

    #[tokio::test]
    async fn test_numbering_gives_up_after_bounded_attempts() {
        let (db, actor, product) = engine_with_product(3).await;
        install_rival_writer(&db, "NEW.id NOT LIKE '%-rival'").await;

        let err = db
            .fulfillment()
            .fulfill(one_unit(&product.id), &actor)
            .await
            .unwrap_err();

        assert!(
            matches!(&err, FulfillmentError::Internal(msg) if msg.contains(&MAX_NUMBERING_ATTEMPTS.to_string())),
            "{err}"
        );
        let sales: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sales")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(sales, 0);
        assert_eq!(db.products().get_by_id(&product.id).await.unwrap().unwrap().quantity, 3);
    }

    #[tokio::test]
    async fn test_lab_tests_share_the_numbering_primitive() {
        let (db, actor, _) = engine_with_product(1).await;
        let test_type = db
            .laboratory()
            .create_test_type(fbc(), &actor)
            .await
            .unwrap();

        let first = db
            .fulfillment()
            .request_lab_test(lab_request(&test_type.id, "Wanjiku Kamau"), &actor)
            .await
            .unwrap();
        let second = db
            .fulfillment()
            .request_lab_test(lab_request(&test_type.id, "Otieno Okoth"), &actor)
            .await
            .unwrap();

        assert_eq!(first.test.test_number, "LAB202610160001");
        assert_eq!(second.test.test_number, "LAB202610160002");
        assert_eq!(first.test.status, LabTestStatus::Pending);
        assert_eq!(first.test.requested_by, actor);
    }

    #[tokio::test]
    async fn test_lab_patient_defaults_to_the_customer() {
        let (db, actor, _) = engine_with_product(1).await;
        let test_type = db
            .laboratory()
            .create_test_type(fbc(), &actor)
            .await
            .unwrap();
        let customer = db
            .customers()
            .create(new_customer("Achieng Odhiambo", "+254711000111"))
            .await
            .unwrap();

        let mut request = lab_request(&test_type.id, "ignored");
        request.patient_name = None;
        request.customer_id = Some(customer.id.clone());
        request.cost_cents = Some(50_000);

        let doc = db.fulfillment().request_lab_test(request, &actor).await.unwrap();
        assert_eq!(doc.test.patient_name, "Achieng Odhiambo");
        assert_eq!(doc.test.patient_phone.as_deref(), Some("+254711000111"));
        assert_eq!(doc.test.cost_cents, 50_000);

        let mut anonymous = lab_request(&test_type.id, "ignored");
        anonymous.patient_name = None;
        assert!(matches!(
            db.fulfillment().request_lab_test(anonymous, &actor).await,
            Err(FulfillmentError::Validation(ValidationError::Required { ref field })) if field == "patient_name"
        ));
    }

    #[tokio::test]
    async fn test_lab_request_checks_type_and_assignee() {
        let (db, actor, _) = engine_with_product(1).await;
        let tech = create_test_user(&db, "lab1", Role::LabTechnician).await;
        let test_type = db
            .laboratory()
            .create_test_type(fbc(), &actor)
            .await
            .unwrap();

        let mut assigned = lab_request(&test_type.id, "Wanjiku Kamau");
        assigned.assigned_to = Some(tech.id.clone());
        let doc = db.fulfillment().request_lab_test(assigned, &actor).await.unwrap();
        assert_eq!(doc.test.assigned_to.as_deref(), Some(tech.id.as_str()));

        // The cashier is not a lab technician
        let mut misassigned = lab_request(&test_type.id, "Wanjiku Kamau");
        misassigned.assigned_to = Some(actor.clone());
        assert!(matches!(
            db.fulfillment().request_lab_test(misassigned, &actor).await,
            Err(FulfillmentError::Validation(ValidationError::InvalidFormat { ref field, .. })) if field == "assigned_to"
        ));

        db.laboratory()
            .update_test_type(
                &test_type.id,
                TestTypeUpdate {
                    is_active: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(matches!(
            db.fulfillment().request_lab_test(lab_request(&test_type.id, "Wanjiku Kamau"), &actor).await,
            Err(FulfillmentError::Validation(ValidationError::InvalidFormat { ref field, .. })) if field == "test_type_id"
        ));

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM lab_tests")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_core_errors_map_to_engine_errors() {
        let err: FulfillmentError = CoreError::NumberSpaceExhausted("INV20261016".to_string()).into();
        assert!(matches!(err, FulfillmentError::Internal(_)));

        let err: FulfillmentError = CoreError::ProductNotFound("p1".to_string()).into();
        assert!(matches!(err, FulfillmentError::ProductNotFound(id) if id == "p1"));
    }

    #[test]
    fn test_db_errors_map_to_engine_errors() {
        let err: FulfillmentError = DbError::not_found("Sale", "s1").into();
        assert!(matches!(err, FulfillmentError::DocumentNotFound { .. }));

        let err: FulfillmentError = DbError::ForeignKeyViolation {
            message: "FOREIGN KEY constraint failed".to_string(),
        }
        .into();
        assert!(matches!(err, FulfillmentError::Validation(_)));
    }

    #[test]
    fn test_line_validation_happens_before_any_io() {
        let request = FulfillRequest {
            items: vec![LineRequest {
                product_id: "p1".to_string(),
                quantity: 0,
                unit_price_cents: None,
                discount_cents: 0,
            }],
            payment_method: PaymentMethod::Cash,
            amount_paid_cents: 0,
            tax_cents: None,
            discount_cents: 0,
            customer_id: None,
            notes: None,
        };
        assert!(matches!(
            request.validate(),
            Err(ValidationError::MustBePositive { .. })
        ));

        let empty = HoldSaleRequest {
            items: vec![],
            tax_cents: None,
            discount_cents: 0,
            customer_id: None,
            notes: None,
        };
        assert!(empty.validate().is_err());
    }
}
