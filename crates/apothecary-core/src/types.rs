//! # Domain Types
//!
//! Core domain types used throughout Apothecary POS.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌──────────────────┐   ┌────────────────────┐   │
//! │  │    Product      │   │   SaleDocument   │   │PrescriptionDocument│   │
//! │  │  ─────────────  │   │  ──────────────  │   │  ────────────────  │   │
//! │  │  id (UUID)      │◄──│  Sale            │   │  Prescription      │   │
//! │  │  sku            │   │  Vec<SaleItem>   │   │  Vec<Prescription- │   │
//! │  │  quantity       │   │  invoice_number  │   │      Item>         │   │
//! │  │  reorder_level  │   │  INV20261016NNNN │   │  RX20261016NNNN    │   │
//! │  └─────────────────┘   └──────────────────┘   └────────────────────┘   │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌──────────────────┐   ┌────────────────────┐   │
//! │  │ StockMovement   │   │   SaleStatus     │   │ PrescriptionStatus │   │
//! │  │  in / out       │   │  Pending         │   │  Pending           │   │
//! │  │  adjustment     │   │  Completed  ■    │   │  Dispensed  ■      │   │
//! │  │  return         │   │  Cancelled  ■    │   │  Cancelled  ■      │   │
//! │  └─────────────────┘   └──────────────────┘   └────────────────────┘   │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌──────────────────┐   ┌────────────────────┐   │
//! │  │ Category        │   │  LabTestDocument │   │  Expense           │   │
//! │  │ Supplier        │   │  LabTest         │   │  unapproved ⇄      │   │
//! │  │  (classify      │   │  Vec<LabMeasure- │   │    approved        │   │
//! │  │   products)     │   │      ment>       │   │  ExpenseCategory   │   │
//! │  └─────────────────┘   │  LAB20261016NNNN │   └────────────────────┘   │
//! │                        └──────────────────┘                            │
//! │  LabTestStatus: Pending → InProgress → Completed → Reviewed ■          │
//! │                                          ■ = terminal                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Dual-Key Identity Pattern
//! Every entity has a UUID `id` used for relations and, where people need to
//! read it aloud, a business number (sku, invoice number, prescription number).

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, StockShortage};
use crate::money::Money;
use crate::policy::Role;

// =============================================================================
// Tax Rate
// =============================================================================

/// Tax rate in basis points (750 = 7.5%).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TaxRate(u32);

impl TaxRate {
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        TaxRate(bps)
    }

    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn zero() -> Self {
        TaxRate(0)
    }
}

// =============================================================================
// Document Status
// =============================================================================

/// One-way status machine shared by sales, prescriptions and lab tests.
pub trait DocumentStatus: Copy + Eq + fmt::Display {
    /// Terminal states have no outgoing transitions.
    fn is_terminal(self) -> bool;

    /// Whether `self -> next` is a legal transition.
    fn can_transition_to(self, next: Self) -> bool;
}

/// Checks a transition, naming the document in the error.
///
/// ```rust
/// use apothecary_core::types::{ensure_transition, SaleStatus};
///
/// assert!(ensure_transition("Sale INV202610160001", SaleStatus::Pending, SaleStatus::Completed).is_ok());
/// assert!(ensure_transition("Sale INV202610160001", SaleStatus::Completed, SaleStatus::Cancelled).is_err());
/// ```
pub fn ensure_transition<S: DocumentStatus>(document: &str, from: S, to: S) -> CoreResult<()> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(CoreError::InvalidStateTransition {
            document: document.to_string(),
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

/// The status of a sale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum SaleStatus {
    /// Held: priced and numbered, stock untouched.
    #[default]
    Pending,
    /// Paid; stock has been decremented.
    Completed,
    /// Abandoned before completion.
    Cancelled,
}

impl SaleStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            SaleStatus::Pending => "pending",
            SaleStatus::Completed => "completed",
            SaleStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for SaleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl DocumentStatus for SaleStatus {
    fn is_terminal(self) -> bool {
        !matches!(self, SaleStatus::Pending)
    }

    fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (SaleStatus::Pending, SaleStatus::Completed) | (SaleStatus::Pending, SaleStatus::Cancelled)
        )
    }
}

/// The status of a prescription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PrescriptionStatus {
    #[default]
    Pending,
    Dispensed,
    Cancelled,
}

impl PrescriptionStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            PrescriptionStatus::Pending => "pending",
            PrescriptionStatus::Dispensed => "dispensed",
            PrescriptionStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for PrescriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl DocumentStatus for PrescriptionStatus {
    fn is_terminal(self) -> bool {
        !matches!(self, PrescriptionStatus::Pending)
    }

    fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (PrescriptionStatus::Pending, PrescriptionStatus::Dispensed)
                | (PrescriptionStatus::Pending, PrescriptionStatus::Cancelled)
        )
    }
}

// =============================================================================
// Payment Method
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Card,
    /// Mobile money transfer.
    Mobile,
    /// Billed to the customer's insurer; amount paid is often zero at the till.
    Insurance,
}

// =============================================================================
// Product
// =============================================================================

/// A stocked item: medicine, consumable or retail good.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Product {
    pub id: String,
    pub sku: String,
    pub barcode: Option<String>,
    pub name: String,
    /// International non-proprietary name (e.g. "paracetamol").
    pub generic_name: Option<String>,
    pub description: Option<String>,
    pub unit_price_cents: i64,
    pub cost_price_cents: i64,
    /// On-hand quantity. Never negative after commit.
    pub quantity: i64,
    /// At or below this quantity the product is reported as low stock.
    pub reorder_level: i64,
    #[ts(as = "Option<String>")]
    pub expiry_date: Option<NaiveDate>,
    pub batch_number: Option<String>,
    pub requires_prescription: bool,
    pub is_active: bool,
    pub category_id: Option<String>,
    pub supplier_id: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Product {
    #[inline]
    pub fn unit_price(&self) -> Money {
        Money::from_cents(self.unit_price_cents)
    }

    #[inline]
    pub fn is_low_stock(&self) -> bool {
        self.quantity <= self.reorder_level
    }

    /// Markup over cost in basis points, `None` when cost is zero.
    pub fn profit_margin_bps(&self) -> Option<i64> {
        if self.cost_price_cents <= 0 {
            return None;
        }
        Some((self.unit_price_cents - self.cost_price_cents) * 10_000 / self.cost_price_cents)
    }

    /// Returns the shortage if `requested` exceeds on-hand quantity.
    pub fn shortage_for(&self, requested: i64) -> Option<StockShortage> {
        (requested > self.quantity).then(|| StockShortage {
            product_id: self.id.clone(),
            product_name: self.name.clone(),
            available: self.quantity,
            requested,
        })
    }
}

// =============================================================================
// Stock Movement
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum MovementType {
    /// Goods received.
    In,
    /// Goods leaving (sales, dispensing, write-offs).
    Out,
    /// Stock count: quantity is set to the counted value.
    Adjustment,
    /// Customer return put back on the shelf.
    Return,
}

impl MovementType {
    /// Computes the on-hand quantity after this movement.
    ///
    /// ```rust
    /// use apothecary_core::types::MovementType;
    ///
    /// assert_eq!(MovementType::In.resulting_quantity(4, 6), Some(10));
    /// assert_eq!(MovementType::Out.resulting_quantity(4, 6), None);
    /// assert_eq!(MovementType::Adjustment.resulting_quantity(4, 6), Some(6));
    /// ```
    pub fn resulting_quantity(self, current: i64, quantity: i64) -> Option<i64> {
        let next = match self {
            MovementType::In | MovementType::Return => current.checked_add(quantity)?,
            MovementType::Out => current.checked_sub(quantity)?,
            MovementType::Adjustment => quantity,
        };
        (next >= 0).then_some(next)
    }
}

/// Audit record of one change to a product's on-hand quantity.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct StockMovement {
    pub id: String,
    pub product_id: String,
    pub movement_type: MovementType,
    pub quantity: i64,
    pub quantity_after: i64,
    /// Document number for fulfillment movements, supplier ref for receipts.
    pub reference_number: Option<String>,
    pub notes: Option<String>,
    pub created_by: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Sale
// =============================================================================

/// Sale header.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Sale {
    pub id: String,
    pub invoice_number: String,
    pub customer_id: Option<String>,
    /// Set when the sale was created by dispensing a prescription.
    pub prescription_id: Option<String>,
    pub subtotal_cents: i64,
    pub tax_cents: i64,
    pub discount_cents: i64,
    pub total_cents: i64,
    /// Unknown until the sale is completed.
    pub payment_method: Option<PaymentMethod>,
    pub amount_paid_cents: i64,
    pub change_cents: i64,
    pub status: SaleStatus,
    pub notes: Option<String>,
    pub cashier_id: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Sale {
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }
}

/// A line in a sale. Price fields are frozen at transaction time.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct SaleItem {
    pub id: String,
    pub sale_id: String,
    /// Zero-based order within the sale.
    pub position: i64,
    pub product_id: String,
    pub name_snapshot: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
    pub discount_cents: i64,
    /// `unit_price × quantity − discount`.
    pub line_total_cents: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// A sale with its lines, as returned by every sale operation.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SaleDocument {
    #[serde(flatten)]
    pub sale: Sale,
    pub items: Vec<SaleItem>,
}

// =============================================================================
// Prescription
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Prescription {
    pub id: String,
    pub prescription_number: String,
    pub customer_id: String,
    pub doctor_name: String,
    pub doctor_license: Option<String>,
    pub diagnosis: Option<String>,
    #[ts(as = "String")]
    pub prescription_date: NaiveDate,
    pub status: PrescriptionStatus,
    pub notes: Option<String>,
    pub created_by: String,
    pub dispensed_by: Option<String>,
    #[ts(as = "Option<String>")]
    pub dispensed_at: Option<DateTime<Utc>>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct PrescriptionItem {
    pub id: String,
    pub prescription_id: String,
    pub position: i64,
    pub product_id: String,
    /// e.g. "500mg"
    pub dosage: String,
    /// e.g. "3 times daily"
    pub frequency: String,
    /// e.g. "7 days"
    pub duration: String,
    pub quantity: i64,
    pub instructions: Option<String>,
}

/// A prescription with its items.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PrescriptionDocument {
    #[serde(flatten)]
    pub prescription: Prescription,
    pub items: Vec<PrescriptionItem>,
}

// =============================================================================
// Customer
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Customer {
    pub id: String,
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
    pub address: Option<String>,
    #[ts(as = "Option<String>")]
    pub date_of_birth: Option<NaiveDate>,
    pub allergies: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// User
// =============================================================================

/// A staff account. The password hash never leaves apothecary-db.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct User {
    pub id: String,
    pub username: String,
    pub full_name: String,
    pub role: Role,
    pub is_active: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Pharmacy Settings
// =============================================================================

/// Pharmacy identity and receipt configuration.
///
/// Exactly one record exists once the installation has been set up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct PharmacySettings {
    pub pharmacy_name: String,
    pub registration_number: Option<String>,
    pub tax_id: Option<String>,
    pub phone: String,
    pub email: String,
    pub address_line1: String,
    pub address_line2: Option<String>,
    pub city: String,
    pub state_province: String,
    pub postal_code: String,
    pub country: String,
    pub receipt_header: Option<String>,
    pub receipt_footer: Option<String>,
    pub currency_symbol: String,
    pub currency_code: String,
    pub default_tax_rate_bps: i64,
}

// =============================================================================
// Catalog Classification
// =============================================================================

/// Product grouping shown on shelves and in catalog filters.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Category {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Supplier {
    pub id: String,
    pub name: String,
    pub contact_person: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    /// Inactive suppliers stay linked to their products but are hidden from pickers.
    pub is_active: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Laboratory
// =============================================================================

/// A test the laboratory offers, with its default price.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct TestType {
    pub id: String,
    pub name: String,
    /// Short unique code, e.g. "FBC" or "MPS".
    pub code: String,
    pub description: Option<String>,
    pub cost_cents: i64,
    pub is_active: bool,
    pub created_by: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

/// Progress of a lab test.
///
/// ```text
/// pending ──start──► in_progress ──complete──► completed ──review──► reviewed ■
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum LabTestStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    /// Results signed off by a pharmacist.
    Reviewed,
}

impl LabTestStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            LabTestStatus::Pending => "pending",
            LabTestStatus::InProgress => "in_progress",
            LabTestStatus::Completed => "completed",
            LabTestStatus::Reviewed => "reviewed",
        }
    }
}

impl fmt::Display for LabTestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl DocumentStatus for LabTestStatus {
    fn is_terminal(self) -> bool {
        matches!(self, LabTestStatus::Reviewed)
    }

    fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (LabTestStatus::Pending, LabTestStatus::InProgress)
                | (LabTestStatus::InProgress, LabTestStatus::Completed)
                | (LabTestStatus::Completed, LabTestStatus::Reviewed)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
    Other,
}

/// A laboratory test requested for a patient (kind LAB).
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct LabTest {
    pub id: String,
    pub test_number: String,
    pub test_type_id: String,
    /// Test type name at request time.
    pub test_name: String,
    pub description: Option<String>,
    pub customer_id: Option<String>,
    pub patient_name: String,
    pub patient_age: Option<i64>,
    pub patient_gender: Option<Gender>,
    pub patient_phone: Option<String>,
    pub cost_cents: i64,
    pub paid: bool,
    #[ts(as = "Option<String>")]
    pub paid_at: Option<DateTime<Utc>>,
    pub payment_method: Option<PaymentMethod>,
    pub requested_by: String,
    pub assigned_to: Option<String>,
    pub status: LabTestStatus,
    #[ts(as = "Option<String>")]
    pub started_at: Option<DateTime<Utc>>,
    #[ts(as = "Option<String>")]
    pub completed_at: Option<DateTime<Utc>>,
    pub results: Option<String>,
    pub diagnosis: Option<String>,
    pub notes: Option<String>,
    pub reviewed_by: Option<String>,
    #[ts(as = "Option<String>")]
    pub reviewed_at: Option<DateTime<Utc>>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

/// One parameter read during a test, e.g. "Glucose: 5.4 mmol/L".
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct LabMeasurement {
    pub id: String,
    pub lab_test_id: String,
    pub parameter_name: String,
    pub value: String,
    pub unit: String,
    pub reference_range: Option<String>,
    pub is_normal: bool,
    pub measured_by: String,
    #[ts(as = "String")]
    pub measured_at: DateTime<Utc>,
}

/// A lab test with its measurements in the order they were taken.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct LabTestDocument {
    #[serde(flatten)]
    pub test: LabTest,
    pub measurements: Vec<LabMeasurement>,
}

// =============================================================================
// Expenses
// =============================================================================

/// How an expense was paid. Wider than [`PaymentMethod`]: suppliers take
/// transfers and cheques.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ExpensePaymentMethod {
    #[default]
    Cash,
    BankTransfer,
    Cheque,
    MobileMoney,
    Card,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct ExpenseCategory {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

/// Money leaving the pharmacy outside of stock purchases (rent, power, wages).
///
/// Approved expenses are frozen for everyone but administrators.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Expense {
    pub id: String,
    /// Name of an expense category.
    pub category: String,
    pub description: String,
    pub amount_cents: i64,
    #[ts(as = "String")]
    pub expense_date: NaiveDate,
    pub payment_method: ExpensePaymentMethod,
    pub reference_number: Option<String>,
    pub notes: Option<String>,
    pub is_approved: bool,
    pub approved_by: Option<String>,
    #[ts(as = "Option<String>")]
    pub approved_at: Option<DateTime<Utc>>,
    pub created_by: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Expense {
    pub const fn approval_state(&self) -> &'static str {
        if self.is_approved {
            "approved"
        } else {
            "unapproved"
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn product(quantity: i64, reorder_level: i64) -> Product {
        let now = Utc::now();
        Product {
            id: "p1".to_string(),
            sku: "AMOX-500".to_string(),
            barcode: None,
            name: "Amoxicillin 500mg".to_string(),
            generic_name: Some("amoxicillin".to_string()),
            description: None,
            unit_price_cents: 1200,
            cost_price_cents: 800,
            quantity,
            reorder_level,
            expiry_date: None,
            batch_number: None,
            requires_prescription: true,
            is_active: true,
            category_id: None,
            supplier_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_sale_status_machine() {
        use SaleStatus::*;

        assert!(Pending.can_transition_to(Completed));
        assert!(Pending.can_transition_to(Cancelled));
        for terminal in [Completed, Cancelled] {
            assert!(terminal.is_terminal());
            for next in [Pending, Completed, Cancelled] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn test_prescription_cannot_return_to_pending() {
        use PrescriptionStatus::*;

        assert!(Pending.can_transition_to(Dispensed));
        assert!(!Dispensed.can_transition_to(Pending));
        assert!(!Dispensed.can_transition_to(Cancelled));
        assert!(!Cancelled.can_transition_to(Dispensed));
    }

    #[test]
    fn test_lab_test_moves_one_step_at_a_time() {
        use LabTestStatus::*;

        assert!(Pending.can_transition_to(InProgress));
        assert!(InProgress.can_transition_to(Completed));
        assert!(Completed.can_transition_to(Reviewed));

        assert!(!Pending.can_transition_to(Completed));
        assert!(!Pending.can_transition_to(Reviewed));
        assert!(!Completed.can_transition_to(Completed));
        assert!(!Reviewed.can_transition_to(Pending));
        assert!(Reviewed.is_terminal());
        assert!(!Completed.is_terminal());
    }

    #[test]
    fn test_low_stock_and_margin() {
        assert!(product(10, 10).is_low_stock());
        assert!(!product(11, 10).is_low_stock());
        // (1200 - 800) / 800 = 50%
        assert_eq!(product(5, 1).profit_margin_bps(), Some(5000));
    }

    #[test]
    fn test_shortage_for() {
        let p = product(2, 0);
        assert!(p.shortage_for(2).is_none());
        let shortage = p.shortage_for(5).unwrap();
        assert_eq!(shortage.available, 2);
        assert_eq!(shortage.requested, 5);
    }

    #[test]
    fn test_movement_never_goes_negative() {
        assert_eq!(MovementType::Out.resulting_quantity(5, 5), Some(0));
        assert_eq!(MovementType::Out.resulting_quantity(5, 6), None);
        assert_eq!(MovementType::Return.resulting_quantity(0, 2), Some(2));
        assert_eq!(MovementType::Adjustment.resulting_quantity(9, -1), None);
    }

    #[test]
    fn test_status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&PrescriptionStatus::Dispensed).unwrap(),
            "\"dispensed\""
        );
        assert_eq!(
            serde_json::to_string(&PaymentMethod::Insurance).unwrap(),
            "\"insurance\""
        );
        assert_eq!(
            serde_json::to_string(&LabTestStatus::InProgress).unwrap(),
            "\"in_progress\""
        );
        assert_eq!(
            serde_json::to_string(&ExpensePaymentMethod::BankTransfer).unwrap(),
            "\"bank_transfer\""
        );
    }
}
