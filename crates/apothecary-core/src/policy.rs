//! # Authorization Policy
//!
//! The single `(Role, Action) → allow/deny` table. Handlers never inspect
//! roles themselves; the API resolves the caller once per request and asks
//! [`is_allowed`].
//!
//! ```text
//! ┌───────────────────────┬───────┬─────────┬────────────┬─────────┬─────┐
//! │ Action                │ admin │ manager │ pharmacist │ cashier │ lab │
//! ├───────────────────────┼───────┼─────────┼────────────┼─────────┼─────┤
//! │ view catalog/settings │   ✓   │    ✓    │     ✓      │    ✓    │  ✓  │
//! │ view/manage customers │   ✓   │    ✓    │     ✓      │    ✓    │ view│
//! │ create/view sales     │   ✓   │    ✓    │     ✓      │    ✓    │     │
//! │ cancel sale           │   ✓   │    ✓    │            │         │     │
//! │ prescriptions         │   ✓   │    ✓    │     ✓      │  view   │     │
//! │ catalog, stock        │   ✓   │    ✓    │   stock    │         │     │
//! │ view/request lab tests│   ✓   │    ✓    │     ✓      │    ✓    │  ✓  │
//! │ perform lab tests     │   ✓   │    ✓    │            │         │  ✓  │
//! │ review lab tests      │   ✓   │    ✓    │     ✓      │         │     │
//! │ charge lab tests      │   ✓   │    ✓    │     ✓      │    ✓    │     │
//! │ test types            │   ✓   │    ✓    │            │         │     │
//! │ record own expenses   │   ✓   │    ✓    │     ✓      │    ✓    │  ✓  │
//! │ view all expenses     │   ✓   │    ✓    │            │         │     │
//! │ approve expenses      │   ✓   │         │            │         │     │
//! │ settings              │   ✓   │    ✓    │            │         │     │
//! │ users                 │   ✓   │         │            │         │     │
//! └───────────────────────┴───────┴─────────┴────────────┴─────────┴─────┘
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;

use crate::error::ValidationError;

/// Staff role carried in the access token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Manager,
    Pharmacist,
    Cashier,
    LabTechnician,
}

impl Role {
    pub const fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Manager => "manager",
            Role::Pharmacist => "pharmacist",
            Role::Cashier => "cashier",
            Role::LabTechnician => "lab_technician",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "manager" => Ok(Role::Manager),
            "pharmacist" => Ok(Role::Pharmacist),
            "cashier" => Ok(Role::Cashier),
            "lab_technician" => Ok(Role::LabTechnician),
            other => Err(ValidationError::InvalidFormat {
                field: "role".to_string(),
                reason: format!("unknown role '{other}'"),
            }),
        }
    }
}

/// Something a caller may attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    ViewCatalog,
    ManageCatalog,
    AdjustStock,
    ViewCustomers,
    ManageCustomers,
    ViewSales,
    CreateSale,
    CancelSale,
    ViewPrescriptions,
    CreatePrescription,
    DispensePrescription,
    CancelPrescription,
    ViewLabTests,
    RequestLabTest,
    /// Start, record measurements, complete.
    PerformLabTest,
    ReviewLabTest,
    ChargeLabTest,
    ManageTestTypes,
    /// Create and edit one's own unapproved expenses.
    RecordExpense,
    /// See every user's expenses.
    ViewExpenses,
    /// Approve, unapprove, and edit approved expenses.
    ApproveExpenses,
    ViewSettings,
    ManageSettings,
    ManageUsers,
}

/// Returns whether `role` may perform `action`.
///
/// ```rust
/// use apothecary_core::policy::{is_allowed, Action, Role};
///
/// assert!(is_allowed(Role::Pharmacist, Action::DispensePrescription));
/// assert!(!is_allowed(Role::Cashier, Action::DispensePrescription));
/// ```
pub fn is_allowed(role: Role, action: Action) -> bool {
    use Action::*;

    match role {
        Role::Admin => true,
        Role::Manager => !matches!(action, ManageUsers | ApproveExpenses),
        Role::Pharmacist => matches!(
            action,
            ViewCatalog
                | AdjustStock
                | ViewCustomers
                | ManageCustomers
                | ViewSales
                | CreateSale
                | ViewPrescriptions
                | CreatePrescription
                | DispensePrescription
                | CancelPrescription
                | ViewLabTests
                | RequestLabTest
                | ReviewLabTest
                | ChargeLabTest
                | RecordExpense
                | ViewSettings
        ),
        Role::Cashier => matches!(
            action,
            ViewCatalog
                | ViewCustomers
                | ManageCustomers
                | ViewSales
                | CreateSale
                | ViewPrescriptions
                | ViewLabTests
                | RequestLabTest
                | ChargeLabTest
                | RecordExpense
                | ViewSettings
        ),
        Role::LabTechnician => matches!(
            action,
            ViewCatalog
                | ViewCustomers
                | ViewLabTests
                | RequestLabTest
                | PerformLabTest
                | RecordExpense
                | ViewSettings
        ),
    }
}
