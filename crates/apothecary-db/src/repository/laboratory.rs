//! # Laboratory Repository
//!
//! Test types, lab test progress and measurements. Requesting a test
//! allocates a `LAB` number, so it goes through
//! [`crate::fulfillment::FulfillmentEngine::request_lab_test`]; everything
//! after that lives here.
//!
//! ## Lab Test Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  request_lab_test (engine)    → pending, LAB20261016NNNN                │
//! │       │                                                                 │
//! │  start                        → in_progress, assigned to the starter    │
//! │       │                         unless already assigned                 │
//! │  record_measurement (0..n)    ── only while in_progress                 │
//! │       │                                                                 │
//! │  complete                     → completed, results/diagnosis/notes     │
//! │       │                                                                 │
//! │  review                       → reviewed ■                              │
//! │                                                                         │
//! │  mark_paid                    ── any status, exactly once               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every step is a conditional `UPDATE ... WHERE status = <from>`; zero
//! affected rows means the test is missing or in the wrong state.

use apothecary_core::types::ensure_transition;
use apothecary_core::validation::{
    validate_amount_cents, validate_code, validate_optional_text, validate_text,
};
use apothecary_core::{
    CoreError, LabMeasurement, LabTest, LabTestDocument, LabTestStatus, PaymentMethod, TestType,
    ValidationError,
};
use chrono::Utc;
use serde::Deserialize;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};

use super::generate_id;
use crate::error::{DbError, DbResult};

pub(crate) const TEST_TYPE_COLUMNS: &str =
    "id, name, code, description, cost_cents, is_active, created_by, created_at, updated_at";

const LAB_TEST_COLUMNS: &str = "id, test_number, test_type_id, test_name, description, \
     customer_id, patient_name, patient_age, patient_gender, patient_phone, cost_cents, paid, \
     paid_at, payment_method, requested_by, assigned_to, status, started_at, completed_at, \
     results, diagnosis, notes, reviewed_by, reviewed_at, created_at, updated_at";

const MEASUREMENT_COLUMNS: &str = "id, lab_test_id, parameter_name, value, unit, \
     reference_range, is_normal, measured_by, measured_at";

// =============================================================================
// Shared Reads
// =============================================================================

pub(crate) async fn fetch_test_type(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<TestType>> {
    let sql = format!("SELECT {TEST_TYPE_COLUMNS} FROM test_types WHERE id = ?1");
    let test_type = sqlx::query_as::<_, TestType>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(test_type)
}

async fn fetch_lab_test(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<LabTest>> {
    let sql = format!("SELECT {LAB_TEST_COLUMNS} FROM lab_tests WHERE id = ?1");
    let test = sqlx::query_as::<_, LabTest>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(test)
}

pub(crate) async fn fetch_lab_test_document(
    conn: &mut SqliteConnection,
    id: &str,
) -> DbResult<Option<LabTestDocument>> {
    let Some(test) = fetch_lab_test(conn, id).await? else {
        return Ok(None);
    };

    let sql = format!(
        "SELECT {MEASUREMENT_COLUMNS} FROM lab_measurements \
         WHERE lab_test_id = ?1 ORDER BY measured_at, rowid"
    );
    let measurements = sqlx::query_as::<_, LabMeasurement>(&sql)
        .bind(id)
        .fetch_all(&mut *conn)
        .await?;

    Ok(Some(LabTestDocument { test, measurements }))
}

fn document_name(test: &LabTest) -> String {
    format!("Lab test {}", test.test_number)
}

/// Explains why a guarded status update matched no row.
async fn transition_error(conn: &mut SqliteConnection, id: &str, to: LabTestStatus) -> DbError {
    match fetch_lab_test(conn, id).await {
        Ok(Some(test)) => match ensure_transition(&document_name(&test), test.status, to) {
            Err(err) => err.into(),
            Ok(()) => DbError::Internal(format!("{} changed during the operation", document_name(&test))),
        },
        Ok(None) => DbError::not_found("Lab test", id),
        Err(err) => err,
    }
}

/// Finishes a guarded update: the updated document, or why nothing matched.
async fn after_transition(
    conn: &mut SqliteConnection,
    id: &str,
    rows_affected: u64,
    to: LabTestStatus,
) -> DbResult<LabTestDocument> {
    if rows_affected == 0 {
        return Err(transition_error(conn, id, to).await);
    }

    fetch_lab_test_document(conn, id)
        .await?
        .ok_or_else(|| DbError::Internal(format!("lab test {id} vanished")))
}

// =============================================================================
// Inputs
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct NewTestType {
    pub name: String,
    pub code: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub cost_cents: i64,
}

/// Partial update. `None` leaves the field unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TestTypeUpdate {
    pub name: Option<String>,
    pub code: Option<String>,
    pub description: Option<String>,
    pub cost_cents: Option<i64>,
    pub is_active: Option<bool>,
}

impl TestTypeUpdate {
    fn apply(self, test_type: &mut TestType) -> Result<(), ValidationError> {
        if let Some(name) = self.name {
            test_type.name = validate_text("name", &name, 200)?.to_string();
        }
        if let Some(code) = self.code {
            validate_code("code", &code, 20)?;
            test_type.code = code.trim().to_uppercase();
        }
        if let Some(description) = self.description {
            test_type.description = validate_optional_text("description", Some(&description), 2000)?;
        }
        if let Some(cents) = self.cost_cents {
            validate_amount_cents("cost_cents", cents)?;
            test_type.cost_cents = cents;
        }
        if let Some(flag) = self.is_active {
            test_type.is_active = flag;
        }
        Ok(())
    }
}

/// Filters for [`LaboratoryRepository::list`]. Absent fields match all.
#[derive(Debug, Clone, Default)]
pub struct LabTestFilter {
    pub status: Option<LabTestStatus>,
    pub assigned_to: Option<String>,
    pub requested_by: Option<String>,
    pub customer_id: Option<String>,
}

/// Findings written when a test is completed. `None` keeps what is stored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LabResults {
    #[serde(default)]
    pub results: Option<String>,
    #[serde(default)]
    pub diagnosis: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

fn default_is_normal() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewMeasurement {
    pub parameter_name: String,
    pub value: String,
    pub unit: String,
    #[serde(default)]
    pub reference_range: Option<String>,
    #[serde(default = "default_is_normal")]
    pub is_normal: bool,
}

// =============================================================================
// Repository
// =============================================================================

#[derive(Debug, Clone)]
pub struct LaboratoryRepository {
    pool: SqlitePool,
}

impl LaboratoryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        LaboratoryRepository { pool }
    }

    // -------------------------------------------------------------------------
    // Test Types
    // -------------------------------------------------------------------------

    /// ## Returns
    /// * `Err(DbError::UniqueViolation)` - name or code taken
    pub async fn create_test_type(&self, input: NewTestType, actor: &str) -> DbResult<TestType> {
        validate_code("code", &input.code, 20)?;
        validate_amount_cents("cost_cents", input.cost_cents)?;

        let now = Utc::now();
        let test_type = TestType {
            id: generate_id(),
            name: validate_text("name", &input.name, 200)?.to_string(),
            code: input.code.trim().to_uppercase(),
            description: validate_optional_text("description", input.description.as_deref(), 2000)?,
            cost_cents: input.cost_cents,
            is_active: true,
            created_by: Some(actor.to_string()),
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO test_types (id, name, code, description, cost_cents, is_active, created_by, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&test_type.id)
        .bind(&test_type.name)
        .bind(&test_type.code)
        .bind(&test_type.description)
        .bind(test_type.cost_cents)
        .bind(test_type.is_active)
        .bind(&test_type.created_by)
        .bind(test_type.created_at)
        .bind(test_type.updated_at)
        .execute(&self.pool)
        .await?;

        info!(code = %test_type.code, "Test type created");
        Ok(test_type)
    }

    pub async fn get_test_type(&self, id: &str) -> DbResult<Option<TestType>> {
        let mut conn = self.pool.acquire().await?;
        fetch_test_type(&mut conn, id).await
    }

    /// Test types by name; retired ones only when asked for.
    pub async fn list_test_types(&self, include_inactive: bool) -> DbResult<Vec<TestType>> {
        let sql = format!(
            "SELECT {TEST_TYPE_COLUMNS} FROM test_types \
             WHERE (?1 OR is_active = 1) \
             ORDER BY name"
        );

        let types = sqlx::query_as::<_, TestType>(&sql)
            .bind(include_inactive)
            .fetch_all(&self.pool)
            .await?;

        Ok(types)
    }

    /// Existing lab tests keep the name and cost they were requested with.
    pub async fn update_test_type(&self, id: &str, changes: TestTypeUpdate) -> DbResult<TestType> {
        let mut test_type = self
            .get_test_type(id)
            .await?
            .ok_or_else(|| DbError::not_found("Test type", id))?;

        changes.apply(&mut test_type)?;
        test_type.updated_at = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE test_types SET
                name = ?2,
                code = ?3,
                description = ?4,
                cost_cents = ?5,
                is_active = ?6,
                updated_at = ?7
            WHERE id = ?1
            "#,
        )
        .bind(&test_type.id)
        .bind(&test_type.name)
        .bind(&test_type.code)
        .bind(&test_type.description)
        .bind(test_type.cost_cents)
        .bind(test_type.is_active)
        .bind(test_type.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Test type", id));
        }

        Ok(test_type)
    }

    // -------------------------------------------------------------------------
    // Lab Tests
    // -------------------------------------------------------------------------

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<LabTestDocument>> {
        let mut conn = self.pool.acquire().await?;
        fetch_lab_test_document(&mut conn, id).await
    }

    /// Lab test headers, newest first.
    pub async fn list(&self, filter: &LabTestFilter, limit: u32, offset: u32) -> DbResult<Vec<LabTest>> {
        let sql = format!(
            "SELECT {LAB_TEST_COLUMNS} FROM lab_tests \
             WHERE (?1 IS NULL OR status = ?1) \
               AND (?2 IS NULL OR assigned_to = ?2) \
               AND (?3 IS NULL OR requested_by = ?3) \
               AND (?4 IS NULL OR customer_id = ?4) \
             ORDER BY created_at DESC, test_number DESC \
             LIMIT ?5 OFFSET ?6"
        );

        let tests = sqlx::query_as::<_, LabTest>(&sql)
            .bind(filter.status)
            .bind(&filter.assigned_to)
            .bind(&filter.requested_by)
            .bind(&filter.customer_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        Ok(tests)
    }

    /// `pending → in_progress`. An unassigned test is assigned to `actor`.
    pub async fn start(&self, id: &str, actor: &str) -> DbResult<LabTestDocument> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        let result = sqlx::query(
            "UPDATE lab_tests SET status = 'in_progress', started_at = ?2, \
                 assigned_to = COALESCE(assigned_to, ?3), updated_at = ?2 \
             WHERE id = ?1 AND status = 'pending'",
        )
        .bind(id)
        .bind(now)
        .bind(actor)
        .execute(&mut *tx)
        .await?;

        let document = after_transition(&mut tx, id, result.rows_affected(), LabTestStatus::InProgress).await?;
        tx.commit().await?;

        info!(number = %document.test.test_number, actor = %actor, "Lab test started");
        Ok(document)
    }

    /// `in_progress → completed`, storing the findings.
    pub async fn complete(&self, id: &str, findings: LabResults, actor: &str) -> DbResult<LabTestDocument> {
        let results = validate_optional_text("results", findings.results.as_deref(), 10_000)?;
        let diagnosis = validate_optional_text("diagnosis", findings.diagnosis.as_deref(), 2000)?;
        let notes = validate_optional_text("notes", findings.notes.as_deref(), 2000)?;

        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        let result = sqlx::query(
            "UPDATE lab_tests SET status = 'completed', completed_at = ?2, \
                 results = COALESCE(?3, results), diagnosis = COALESCE(?4, diagnosis), \
                 notes = COALESCE(?5, notes), updated_at = ?2 \
             WHERE id = ?1 AND status = 'in_progress'",
        )
        .bind(id)
        .bind(now)
        .bind(&results)
        .bind(&diagnosis)
        .bind(&notes)
        .execute(&mut *tx)
        .await?;

        let document = after_transition(&mut tx, id, result.rows_affected(), LabTestStatus::Completed).await?;
        tx.commit().await?;

        info!(number = %document.test.test_number, actor = %actor, "Lab test completed");
        Ok(document)
    }

    /// `completed → reviewed`, signed by `actor`.
    pub async fn review(&self, id: &str, actor: &str) -> DbResult<LabTestDocument> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        let result = sqlx::query(
            "UPDATE lab_tests SET status = 'reviewed', reviewed_by = ?2, reviewed_at = ?3, updated_at = ?3 \
             WHERE id = ?1 AND status = 'completed'",
        )
        .bind(id)
        .bind(actor)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let document = after_transition(&mut tx, id, result.rows_affected(), LabTestStatus::Reviewed).await?;
        tx.commit().await?;

        info!(number = %document.test.test_number, actor = %actor, "Lab test reviewed");
        Ok(document)
    }

    /// Records payment. Allowed in any status, once.
    pub async fn mark_paid(&self, id: &str, method: PaymentMethod, actor: &str) -> DbResult<LabTestDocument> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        let result = sqlx::query(
            "UPDATE lab_tests SET paid = 1, paid_at = ?2, payment_method = ?3, updated_at = ?2 \
             WHERE id = ?1 AND paid = 0",
        )
        .bind(id)
        .bind(now)
        .bind(method)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(match fetch_lab_test(&mut tx, id).await? {
                Some(test) => CoreError::InvalidStateTransition {
                    document: document_name(&test),
                    from: "paid".to_string(),
                    to: "paid".to_string(),
                }
                .into(),
                None => DbError::not_found("Lab test", id),
            });
        }

        let document = fetch_lab_test_document(&mut tx, id)
            .await?
            .ok_or_else(|| DbError::Internal(format!("lab test {id} vanished")))?;
        tx.commit().await?;

        info!(number = %document.test.test_number, ?method, actor = %actor, "Lab test paid");
        Ok(document)
    }

    /// Adds one reading to a test that is in progress.
    pub async fn record_measurement(
        &self,
        id: &str,
        input: NewMeasurement,
        actor: &str,
    ) -> DbResult<LabMeasurement> {
        let measurement = LabMeasurement {
            id: generate_id(),
            lab_test_id: id.to_string(),
            parameter_name: validate_text("parameter_name", &input.parameter_name, 200)?.to_string(),
            value: validate_text("value", &input.value, 100)?.to_string(),
            unit: validate_text("unit", &input.unit, 50)?.to_string(),
            reference_range: validate_optional_text("reference_range", input.reference_range.as_deref(), 100)?,
            is_normal: input.is_normal,
            measured_by: actor.to_string(),
            measured_at: Utc::now(),
        };

        let mut tx = self.pool.begin().await?;

        // Takes the write lock and pins the status until commit
        let open = sqlx::query("UPDATE lab_tests SET updated_at = ?2 WHERE id = ?1 AND status = 'in_progress'")
            .bind(id)
            .bind(measurement.measured_at)
            .execute(&mut *tx)
            .await?;

        if open.rows_affected() == 0 {
            return Err(match fetch_lab_test(&mut tx, id).await? {
                Some(test) => CoreError::InvalidStateTransition {
                    document: document_name(&test),
                    from: test.status.to_string(),
                    to: "measured".to_string(),
                }
                .into(),
                None => DbError::not_found("Lab test", id),
            });
        }

        sqlx::query(
            r#"
            INSERT INTO lab_measurements (
                id, lab_test_id, parameter_name, value, unit, reference_range,
                is_normal, measured_by, measured_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&measurement.id)
        .bind(&measurement.lab_test_id)
        .bind(&measurement.parameter_name)
        .bind(&measurement.value)
        .bind(&measurement.unit)
        .bind(&measurement.reference_range)
        .bind(measurement.is_normal)
        .bind(&measurement.measured_by)
        .bind(measurement.measured_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        debug!(lab_test = %id, parameter = %measurement.parameter_name, "Measurement recorded");
        Ok(measurement)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::fulfillment::NewLabTest;
    use crate::repository::user::tests::create_test_user;
    use crate::{Database, DbConfig};
    use apothecary_core::Role;

    pub(crate) fn fbc() -> NewTestType {
        NewTestType {
            name: "Full Blood Count".to_string(),
            code: "fbc".to_string(),
            description: None,
            cost_cents: 80_000,
        }
    }

    pub(crate) fn lab_request(test_type_id: &str, patient: &str) -> NewLabTest {
        NewLabTest {
            test_type_id: test_type_id.to_string(),
            customer_id: None,
            patient_name: Some(patient.to_string()),
            patient_age: Some(34),
            patient_gender: None,
            patient_phone: None,
            description: None,
            cost_cents: None,
            assigned_to: None,
        }
    }

    struct Lab {
        db: Database,
        admin: String,
        tech: String,
        pharmacist: String,
        test: LabTestDocument,
    }

    async fn lab_with_pending_test() -> Lab {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let admin = create_test_user(&db, "admin1", Role::Admin).await.id;
        let tech = create_test_user(&db, "lab1", Role::LabTechnician).await.id;
        let pharmacist = create_test_user(&db, "pharm1", Role::Pharmacist).await.id;

        let test_type = db.laboratory().create_test_type(fbc(), &admin).await.unwrap();
        let test = db
            .fulfillment()
            .request_lab_test(lab_request(&test_type.id, "Wanjiku Kamau"), &pharmacist)
            .await
            .unwrap();

        Lab {
            db,
            admin,
            tech,
            pharmacist,
            test,
        }
    }

    fn measurement(name: &str, value: &str) -> NewMeasurement {
        NewMeasurement {
            parameter_name: name.to_string(),
            value: value.to_string(),
            unit: "g/dL".to_string(),
            reference_range: Some("12-16".to_string()),
            is_normal: true,
        }
    }

    #[tokio::test]
    async fn test_full_lifecycle() {
        let lab = lab_with_pending_test().await;
        let repo = lab.db.laboratory();
        let id = lab.test.test.id.clone();

        assert_eq!(lab.test.test.status, LabTestStatus::Pending);
        assert_eq!(lab.test.test.cost_cents, 80_000);
        assert_eq!(lab.test.test.test_name, "Full Blood Count");

        let started = repo.start(&id, &lab.tech).await.unwrap();
        assert_eq!(started.test.status, LabTestStatus::InProgress);
        assert_eq!(started.test.assigned_to.as_deref(), Some(lab.tech.as_str()));
        assert!(started.test.started_at.is_some());

        repo.record_measurement(&id, measurement("Haemoglobin", "13.2"), &lab.tech)
            .await
            .unwrap();
        repo.record_measurement(&id, measurement("Platelets", "250"), &lab.tech)
            .await
            .unwrap();

        let completed = repo
            .complete(
                &id,
                LabResults {
                    results: Some("Within normal limits".to_string()),
                    ..Default::default()
                },
                &lab.tech,
            )
            .await
            .unwrap();
        assert_eq!(completed.test.status, LabTestStatus::Completed);
        assert_eq!(completed.test.results.as_deref(), Some("Within normal limits"));
        let names: Vec<_> = completed.measurements.iter().map(|m| m.parameter_name.as_str()).collect();
        assert_eq!(names, vec!["Haemoglobin", "Platelets"]);

        let reviewed = repo.review(&id, &lab.pharmacist).await.unwrap();
        assert_eq!(reviewed.test.status, LabTestStatus::Reviewed);
        assert_eq!(reviewed.test.reviewed_by.as_deref(), Some(lab.pharmacist.as_str()));
    }

    #[tokio::test]
    async fn test_steps_cannot_be_skipped_or_repeated() {
        let lab = lab_with_pending_test().await;
        let repo = lab.db.laboratory();
        let id = lab.test.test.id.clone();

        // Not started yet
        assert!(matches!(
            repo.complete(&id, LabResults::default(), &lab.tech).await,
            Err(DbError::Core(CoreError::InvalidStateTransition { .. }))
        ));
        assert!(matches!(
            repo.review(&id, &lab.pharmacist).await,
            Err(DbError::Core(CoreError::InvalidStateTransition { .. }))
        ));
        assert!(matches!(
            repo.record_measurement(&id, measurement("Hb", "12"), &lab.tech).await,
            Err(DbError::Core(CoreError::InvalidStateTransition { ref from, .. })) if from == "pending"
        ));

        repo.start(&id, &lab.tech).await.unwrap();
        let err = repo.start(&id, &lab.admin).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            format!("Lab test {} is in_progress, cannot move to in_progress", lab.test.test.test_number)
        );

        // First starter keeps the assignment
        let stored = repo.get_by_id(&id).await.unwrap().unwrap();
        assert_eq!(stored.test.assigned_to.as_deref(), Some(lab.tech.as_str()));

        assert!(matches!(
            repo.start("missing", &lab.tech).await,
            Err(DbError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_payment_is_taken_once() {
        let lab = lab_with_pending_test().await;
        let repo = lab.db.laboratory();
        let id = lab.test.test.id.clone();

        let paid = repo.mark_paid(&id, PaymentMethod::Mobile, &lab.pharmacist).await.unwrap();
        assert!(paid.test.paid);
        assert!(paid.test.paid_at.is_some());
        assert_eq!(paid.test.payment_method, Some(PaymentMethod::Mobile));

        assert!(matches!(
            repo.mark_paid(&id, PaymentMethod::Cash, &lab.pharmacist).await,
            Err(DbError::Core(CoreError::InvalidStateTransition { .. }))
        ));
        let stored = repo.get_by_id(&id).await.unwrap().unwrap();
        assert_eq!(stored.test.payment_method, Some(PaymentMethod::Mobile));
    }

    #[tokio::test]
    async fn test_list_filters() {
        let lab = lab_with_pending_test().await;
        let repo = lab.db.laboratory();
        let test_type = lab.test.test.test_type_id.clone();

        let second = lab
            .db
            .fulfillment()
            .request_lab_test(lab_request(&test_type, "Otieno Okoth"), &lab.admin)
            .await
            .unwrap();
        repo.start(&second.test.id, &lab.tech).await.unwrap();

        let all = repo.list(&LabTestFilter::default(), 10, 0).await.unwrap();
        assert_eq!(all.len(), 2);

        let pending = LabTestFilter {
            status: Some(LabTestStatus::Pending),
            ..Default::default()
        };
        let listed = repo.list(&pending, 10, 0).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].patient_name, "Wanjiku Kamau");

        let mine = LabTestFilter {
            assigned_to: Some(lab.tech.clone()),
            ..Default::default()
        };
        assert_eq!(repo.list(&mine, 10, 0).await.unwrap()[0].id, second.test.id);

        let by_pharmacist = LabTestFilter {
            requested_by: Some(lab.pharmacist.clone()),
            ..Default::default()
        };
        assert_eq!(repo.list(&by_pharmacist, 10, 0).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_test_type_codes_are_normalised_and_unique() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let admin = create_test_user(&db, "admin1", Role::Admin).await.id;
        let repo = db.laboratory();

        let created = repo.create_test_type(fbc(), &admin).await.unwrap();
        assert_eq!(created.code, "FBC");

        let mut clash = fbc();
        clash.name = "Blood count".to_string();
        let err = repo.create_test_type(clash, &admin).await.unwrap_err();
        assert!(err.is_unique_violation_on("test_types.code"));

        let retired = repo
            .update_test_type(
                &created.id,
                TestTypeUpdate {
                    is_active: Some(false),
                    cost_cents: Some(90_000),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(retired.cost_cents, 90_000);
        assert!(repo.list_test_types(false).await.unwrap().is_empty());
        assert_eq!(repo.list_test_types(true).await.unwrap().len(), 1);
    }
}
