//! # Expense Repository
//!
//! Day-to-day spending (rent, electricity, wages) and its approval.
//!
//! ## Ownership and Approval
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  ExpenseScope::Any             admin: every expense, any state         │
//! │  ExpenseScope::OwnUnapproved   everyone else: own expenses, and only   │
//! │                                while unapproved                         │
//! │                                                                         │
//! │  unapproved ──approve──► approved ──unapprove──► unapproved            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Someone else's expense reads as not found; an approved one reports a
//! state conflict.

use apothecary_core::validation::{
    validate_optional_text, validate_positive_amount_cents, validate_text,
};
use apothecary_core::{CoreError, Expense, ExpenseCategory, ExpensePaymentMethod, ValidationError};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use sqlx::SqlitePool;
use tracing::{debug, info};

use super::generate_id;
use crate::error::{DbError, DbResult};

const EXPENSE_COLUMNS: &str = "id, category, description, amount_cents, expense_date, \
     payment_method, reference_number, notes, is_approved, approved_by, approved_at, \
     created_by, created_at, updated_at";

const EXPENSE_CATEGORY_COLUMNS: &str = "id, name, description, created_at, updated_at";

// =============================================================================
// Inputs
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct NewExpense {
    /// Free text; usually the name of an expense category.
    pub category: String,
    pub description: String,
    pub amount_cents: i64,
    pub expense_date: NaiveDate,
    #[serde(default)]
    pub payment_method: ExpensePaymentMethod,
    #[serde(default)]
    pub reference_number: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Partial update. `None` leaves the field unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExpenseUpdate {
    pub category: Option<String>,
    pub description: Option<String>,
    pub amount_cents: Option<i64>,
    pub expense_date: Option<NaiveDate>,
    pub payment_method: Option<ExpensePaymentMethod>,
    pub reference_number: Option<String>,
    pub notes: Option<String>,
}

impl ExpenseUpdate {
    fn apply(self, expense: &mut Expense) -> Result<(), ValidationError> {
        if let Some(category) = self.category {
            expense.category = validate_text("category", &category, 100)?.to_string();
        }
        if let Some(description) = self.description {
            expense.description = validate_text("description", &description, 500)?.to_string();
        }
        if let Some(cents) = self.amount_cents {
            validate_positive_amount_cents("amount_cents", cents)?;
            expense.amount_cents = cents;
        }
        if let Some(date) = self.expense_date {
            expense.expense_date = date;
        }
        if let Some(method) = self.payment_method {
            expense.payment_method = method;
        }
        if let Some(reference) = self.reference_number {
            expense.reference_number = validate_optional_text("reference_number", Some(&reference), 100)?;
        }
        if let Some(notes) = self.notes {
            expense.notes = validate_optional_text("notes", Some(&notes), 1000)?;
        }
        Ok(())
    }
}

/// Filters for [`ExpenseRepository::list`]. Dates are inclusive.
#[derive(Debug, Clone, Default)]
pub struct ExpenseFilter {
    pub category: Option<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub payment_method: Option<ExpensePaymentMethod>,
    pub created_by: Option<String>,
    pub is_approved: Option<bool>,
}

/// Which expenses a caller may change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpenseScope<'a> {
    Any,
    /// Expenses created by this user that are not yet approved.
    OwnUnapproved(&'a str),
}

impl ExpenseScope<'_> {
    fn check(self, expense: &Expense, to: &str) -> DbResult<()> {
        match self {
            ExpenseScope::Any => Ok(()),
            ExpenseScope::OwnUnapproved(user) if expense.created_by != user => {
                Err(DbError::not_found("Expense", &expense.id))
            }
            ExpenseScope::OwnUnapproved(_) if expense.is_approved => Err(state_conflict(expense, to)),
            ExpenseScope::OwnUnapproved(_) => Ok(()),
        }
    }

    fn unapproved_only(self) -> bool {
        matches!(self, ExpenseScope::OwnUnapproved(_))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewExpenseCategory {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

fn state_conflict(expense: &Expense, to: &str) -> DbError {
    CoreError::InvalidStateTransition {
        document: format!("Expense '{}'", expense.description),
        from: expense.approval_state().to_string(),
        to: to.to_string(),
    }
    .into()
}

// =============================================================================
// Repository
// =============================================================================

#[derive(Debug, Clone)]
pub struct ExpenseRepository {
    pool: SqlitePool,
}

impl ExpenseRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ExpenseRepository { pool }
    }

    pub async fn create(&self, input: NewExpense, actor: &str) -> DbResult<Expense> {
        validate_positive_amount_cents("amount_cents", input.amount_cents)?;

        let now = Utc::now();
        let expense = Expense {
            id: generate_id(),
            category: validate_text("category", &input.category, 100)?.to_string(),
            description: validate_text("description", &input.description, 500)?.to_string(),
            amount_cents: input.amount_cents,
            expense_date: input.expense_date,
            payment_method: input.payment_method,
            reference_number: validate_optional_text("reference_number", input.reference_number.as_deref(), 100)?,
            notes: validate_optional_text("notes", input.notes.as_deref(), 1000)?,
            is_approved: false,
            approved_by: None,
            approved_at: None,
            created_by: actor.to_string(),
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO expenses (
                id, category, description, amount_cents, expense_date, payment_method,
                reference_number, notes, is_approved, approved_by, approved_at,
                created_by, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            "#,
        )
        .bind(&expense.id)
        .bind(&expense.category)
        .bind(&expense.description)
        .bind(expense.amount_cents)
        .bind(expense.expense_date)
        .bind(expense.payment_method)
        .bind(&expense.reference_number)
        .bind(&expense.notes)
        .bind(expense.is_approved)
        .bind(&expense.approved_by)
        .bind(expense.approved_at)
        .bind(&expense.created_by)
        .bind(expense.created_at)
        .bind(expense.updated_at)
        .execute(&self.pool)
        .await?;

        info!(category = %expense.category, amount_cents = expense.amount_cents, "Expense recorded");
        Ok(expense)
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Expense>> {
        let sql = format!("SELECT {EXPENSE_COLUMNS} FROM expenses WHERE id = ?1");

        let expense = sqlx::query_as::<_, Expense>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(expense)
    }

    async fn require(&self, id: &str) -> DbResult<Expense> {
        self.get_by_id(id)
            .await?
            .ok_or_else(|| DbError::not_found("Expense", id))
    }

    /// Expenses, most recent spending first.
    pub async fn list(&self, filter: &ExpenseFilter, limit: u32, offset: u32) -> DbResult<Vec<Expense>> {
        let sql = format!(
            "SELECT {EXPENSE_COLUMNS} FROM expenses \
             WHERE (?1 IS NULL OR category = ?1) \
               AND (?2 IS NULL OR expense_date >= ?2) \
               AND (?3 IS NULL OR expense_date <= ?3) \
               AND (?4 IS NULL OR payment_method = ?4) \
               AND (?5 IS NULL OR created_by = ?5) \
               AND (?6 IS NULL OR is_approved = ?6) \
             ORDER BY expense_date DESC, created_at DESC \
             LIMIT ?7 OFFSET ?8"
        );

        let expenses = sqlx::query_as::<_, Expense>(&sql)
            .bind(&filter.category)
            .bind(filter.from)
            .bind(filter.to)
            .bind(filter.payment_method)
            .bind(&filter.created_by)
            .bind(filter.is_approved)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        Ok(expenses)
    }

    pub async fn update(&self, id: &str, changes: ExpenseUpdate, scope: ExpenseScope<'_>) -> DbResult<Expense> {
        let mut expense = self.require(id).await?;
        scope.check(&expense, "edited")?;

        changes.apply(&mut expense)?;
        expense.updated_at = Utc::now();

        debug!(id = %id, "Updating expense");

        let result = sqlx::query(
            r#"
            UPDATE expenses SET
                category = ?2,
                description = ?3,
                amount_cents = ?4,
                expense_date = ?5,
                payment_method = ?6,
                reference_number = ?7,
                notes = ?8,
                updated_at = ?9
            WHERE id = ?1 AND (?10 = 0 OR is_approved = 0)
            "#,
        )
        .bind(&expense.id)
        .bind(&expense.category)
        .bind(&expense.description)
        .bind(expense.amount_cents)
        .bind(expense.expense_date)
        .bind(expense.payment_method)
        .bind(&expense.reference_number)
        .bind(&expense.notes)
        .bind(expense.updated_at)
        .bind(scope.unapproved_only())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            // Approved (or deleted) since it was read
            let current = self.require(id).await?;
            return Err(state_conflict(&current, "edited"));
        }

        Ok(expense)
    }

    pub async fn delete(&self, id: &str, scope: ExpenseScope<'_>) -> DbResult<()> {
        let expense = self.require(id).await?;
        scope.check(&expense, "deleted")?;

        let result = sqlx::query("DELETE FROM expenses WHERE id = ?1 AND (?2 = 0 OR is_approved = 0)")
            .bind(id)
            .bind(scope.unapproved_only())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            let current = self.require(id).await?;
            return Err(state_conflict(&current, "deleted"));
        }

        info!(id = %id, "Expense deleted");
        Ok(())
    }

    /// `unapproved → approved`, signed by `actor`.
    pub async fn approve(&self, id: &str, actor: &str) -> DbResult<Expense> {
        let now = Utc::now();

        let result = sqlx::query(
            "UPDATE expenses SET is_approved = 1, approved_by = ?2, approved_at = ?3, updated_at = ?3 \
             WHERE id = ?1 AND is_approved = 0",
        )
        .bind(id)
        .bind(actor)
        .bind(now)
        .execute(&self.pool)
        .await?;

        let expense = self.require(id).await?;
        if result.rows_affected() == 0 {
            return Err(state_conflict(&expense, "approved"));
        }

        info!(id = %id, actor = %actor, "Expense approved");
        Ok(expense)
    }

    /// `approved → unapproved`; clears the approver.
    pub async fn unapprove(&self, id: &str, actor: &str) -> DbResult<Expense> {
        let result = sqlx::query(
            "UPDATE expenses SET is_approved = 0, approved_by = NULL, approved_at = NULL, updated_at = ?2 \
             WHERE id = ?1 AND is_approved = 1",
        )
        .bind(id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        let expense = self.require(id).await?;
        if result.rows_affected() == 0 {
            return Err(state_conflict(&expense, "unapproved"));
        }

        info!(id = %id, actor = %actor, "Expense approval withdrawn");
        Ok(expense)
    }

    // -------------------------------------------------------------------------
    // Categories
    // -------------------------------------------------------------------------

    /// ## Returns
    /// * `Err(DbError::UniqueViolation)` - name taken
    pub async fn create_category(&self, input: NewExpenseCategory) -> DbResult<ExpenseCategory> {
        let now = Utc::now();
        let category = ExpenseCategory {
            id: generate_id(),
            name: validate_text("name", &input.name, 100)?.to_string(),
            description: validate_optional_text("description", input.description.as_deref(), 1000)?,
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            "INSERT INTO expense_categories (id, name, description, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(&category.id)
        .bind(&category.name)
        .bind(&category.description)
        .bind(category.created_at)
        .bind(category.updated_at)
        .execute(&self.pool)
        .await?;

        info!(name = %category.name, "Expense category created");
        Ok(category)
    }

    pub async fn list_categories(&self) -> DbResult<Vec<ExpenseCategory>> {
        let sql = format!("SELECT {EXPENSE_CATEGORY_COLUMNS} FROM expense_categories ORDER BY name");

        let categories = sqlx::query_as::<_, ExpenseCategory>(&sql)
            .fetch_all(&self.pool)
            .await?;

        Ok(categories)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::user::tests::create_test_user;
    use crate::{Database, DbConfig};
    use apothecary_core::Role;

    fn rent(amount_cents: i64) -> NewExpense {
        NewExpense {
            category: "Rent".to_string(),
            description: "October rent".to_string(),
            amount_cents,
            expense_date: NaiveDate::from_ymd_opt(2026, 10, 1).unwrap(),
            payment_method: ExpensePaymentMethod::BankTransfer,
            reference_number: Some("TRX-001".to_string()),
            notes: None,
        }
    }

    #[tokio::test]
    async fn test_owner_edits_until_approved() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let admin = create_test_user(&db, "admin1", Role::Admin).await.id;
        let cashier = create_test_user(&db, "cashier1", Role::Cashier).await.id;
        let repo = db.expenses();

        let expense = repo.create(rent(4_500_000), &cashier).await.unwrap();
        assert!(!expense.is_approved);

        let edited = repo
            .update(
                &expense.id,
                ExpenseUpdate {
                    amount_cents: Some(4_800_000),
                    ..Default::default()
                },
                ExpenseScope::OwnUnapproved(&cashier),
            )
            .await
            .unwrap();
        assert_eq!(edited.amount_cents, 4_800_000);

        let approved = repo.approve(&expense.id, &admin).await.unwrap();
        assert!(approved.is_approved);
        assert_eq!(approved.approved_by.as_deref(), Some(admin.as_str()));

        let err = repo
            .update(&expense.id, ExpenseUpdate::default(), ExpenseScope::OwnUnapproved(&cashier))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Expense 'October rent' is approved, cannot move to edited");
        assert!(matches!(
            repo.delete(&expense.id, ExpenseScope::OwnUnapproved(&cashier)).await,
            Err(DbError::Core(CoreError::InvalidStateTransition { .. }))
        ));

        // Admin is not bound by approval
        repo.update(
            &expense.id,
            ExpenseUpdate {
                notes: Some("Paid late".to_string()),
                ..Default::default()
            },
            ExpenseScope::Any,
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_other_peoples_expenses_are_not_found() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let owner = create_test_user(&db, "cashier1", Role::Cashier).await.id;
        let other = create_test_user(&db, "cashier2", Role::Cashier).await.id;
        let repo = db.expenses();

        let expense = repo.create(rent(100_000), &owner).await.unwrap();

        assert!(matches!(
            repo.delete(&expense.id, ExpenseScope::OwnUnapproved(&other)).await,
            Err(DbError::NotFound { .. })
        ));
        repo.delete(&expense.id, ExpenseScope::OwnUnapproved(&owner)).await.unwrap();
        assert!(repo.get_by_id(&expense.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_approval_toggles_once_each_way() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let admin = create_test_user(&db, "admin1", Role::Admin).await.id;
        let repo = db.expenses();

        let expense = repo.create(rent(100_000), &admin).await.unwrap();

        assert!(matches!(
            repo.unapprove(&expense.id, &admin).await,
            Err(DbError::Core(CoreError::InvalidStateTransition { ref from, .. })) if from == "unapproved"
        ));
        repo.approve(&expense.id, &admin).await.unwrap();
        assert!(matches!(
            repo.approve(&expense.id, &admin).await,
            Err(DbError::Core(CoreError::InvalidStateTransition { ref from, .. })) if from == "approved"
        ));

        let withdrawn = repo.unapprove(&expense.id, &admin).await.unwrap();
        assert!(!withdrawn.is_approved);
        assert!(withdrawn.approved_by.is_none());
        assert!(withdrawn.approved_at.is_none());

        assert!(matches!(repo.approve("missing", &admin).await, Err(DbError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_list_filters_and_amount_rules() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let cashier = create_test_user(&db, "cashier1", Role::Cashier).await.id;
        let manager = create_test_user(&db, "manager1", Role::Manager).await.id;
        let repo = db.expenses();

        repo.create(rent(4_500_000), &cashier).await.unwrap();
        let mut power = rent(350_000);
        power.category = "Utilities".to_string();
        power.description = "Electricity token".to_string();
        power.expense_date = NaiveDate::from_ymd_opt(2026, 10, 12).unwrap();
        power.payment_method = ExpensePaymentMethod::MobileMoney;
        repo.create(power, &manager).await.unwrap();

        let all = repo.list(&ExpenseFilter::default(), 10, 0).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].category, "Utilities");

        let since = ExpenseFilter {
            from: NaiveDate::from_ymd_opt(2026, 10, 10),
            ..Default::default()
        };
        assert_eq!(repo.list(&since, 10, 0).await.unwrap().len(), 1);

        let mine = ExpenseFilter {
            created_by: Some(cashier.clone()),
            ..Default::default()
        };
        assert_eq!(repo.list(&mine, 10, 0).await.unwrap()[0].category, "Rent");

        let mobile = ExpenseFilter {
            payment_method: Some(ExpensePaymentMethod::MobileMoney),
            ..Default::default()
        };
        assert_eq!(repo.list(&mobile, 10, 0).await.unwrap().len(), 1);

        assert!(matches!(
            repo.create(rent(0), &cashier).await,
            Err(DbError::Validation(ValidationError::MustBePositive { .. }))
        ));
    }

    #[tokio::test]
    async fn test_categories_are_unique() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.expenses();

        let category = NewExpenseCategory {
            name: "Utilities".to_string(),
            description: None,
        };
        repo.create_category(category.clone()).await.unwrap();
        let err = repo.create_category(category).await.unwrap_err();
        assert!(err.is_unique_violation_on("expense_categories.name"));
        assert_eq!(repo.list_categories().await.unwrap().len(), 1);
    }
}
