//! # Settings Repository
//!
//! The singleton pharmacy settings record (row id 1).
//!
//! ```text
//!   setup binary ──► initialize()   INSERT id = 1   (once)
//!   GET  /settings ──► get()        NotConfigured if the row is missing
//!   PUT  /settings ──► update()     NotConfigured if the row is missing
//! ```
//!
//! Reads never create the row.

use apothecary_core::validation::{validate_tax_rate_bps, validate_text};
use apothecary_core::{PharmacySettings, ValidationError};
use chrono::Utc;
use sqlx::SqlitePool;
use tracing::info;

use crate::error::{DbError, DbResult};

const SETTINGS_COLUMNS: &str = "pharmacy_name, registration_number, tax_id, phone, email, \
     address_line1, address_line2, city, state_province, postal_code, country, \
     receipt_header, receipt_footer, currency_symbol, currency_code, default_tax_rate_bps";

fn validate_settings(settings: &PharmacySettings) -> Result<(), ValidationError> {
    validate_text("pharmacy_name", &settings.pharmacy_name, 200)?;
    validate_text("phone", &settings.phone, 30)?;
    validate_text("email", &settings.email, 254)?;
    validate_text("address_line1", &settings.address_line1, 200)?;
    validate_text("city", &settings.city, 100)?;
    validate_text("state_province", &settings.state_province, 100)?;
    validate_text("postal_code", &settings.postal_code, 20)?;
    validate_text("country", &settings.country, 100)?;
    validate_text("currency_symbol", &settings.currency_symbol, 5)?;

    if settings.currency_code.len() != 3 || !settings.currency_code.chars().all(|c| c.is_ascii_uppercase()) {
        return Err(ValidationError::InvalidFormat {
            field: "currency_code".to_string(),
            reason: "must be a 3-letter ISO 4217 code".to_string(),
        });
    }

    validate_tax_rate_bps(settings.default_tax_rate_bps)
}

#[derive(Debug, Clone)]
pub struct SettingsRepository {
    pool: SqlitePool,
}

impl SettingsRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SettingsRepository { pool }
    }

    /// Returns the settings, or `DbError::NotConfigured`.
    pub async fn get(&self) -> DbResult<PharmacySettings> {
        let sql = format!("SELECT {SETTINGS_COLUMNS} FROM pharmacy_settings WHERE id = 1");

        sqlx::query_as::<_, PharmacySettings>(&sql)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(DbError::NotConfigured)
    }

    pub async fn is_configured(&self) -> DbResult<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM pharmacy_settings")
            .fetch_one(&self.pool)
            .await?;
        Ok(count > 0)
    }

    /// Creates the settings record. Fails if it already exists.
    pub async fn initialize(&self, settings: &PharmacySettings, actor: Option<&str>) -> DbResult<PharmacySettings> {
        validate_settings(settings)?;

        let result = self
            .write(
                "INSERT INTO pharmacy_settings (id, {cols}, updated_by, updated_at) \
                 VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
                settings,
                actor,
            )
            .await;

        match result {
            Err(err) if err.is_unique_violation_on("pharmacy_settings.id") => {
                Err(DbError::duplicate("pharmacy_settings", "already initialized"))
            }
            Err(err) => Err(err),
            Ok(_) => {
                info!(pharmacy = %settings.pharmacy_name, "Pharmacy settings initialized");
                self.get().await
            }
        }
    }

    /// Replaces the settings record.
    pub async fn update(&self, settings: &PharmacySettings, actor: &str) -> DbResult<PharmacySettings> {
        validate_settings(settings)?;

        let affected = self
            .write(
                "UPDATE pharmacy_settings SET ({cols}, updated_by, updated_at) = \
                 (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18) \
                 WHERE id = 1",
                settings,
                Some(actor),
            )
            .await?;

        if affected == 0 {
            return Err(DbError::NotConfigured);
        }

        info!(actor = %actor, "Pharmacy settings updated");
        self.get().await
    }

    async fn write(&self, template: &str, s: &PharmacySettings, actor: Option<&str>) -> DbResult<u64> {
        let sql = template.replace("{cols}", SETTINGS_COLUMNS);

        let result = sqlx::query(&sql)
            .bind(s.pharmacy_name.trim())
            .bind(&s.registration_number)
            .bind(&s.tax_id)
            .bind(s.phone.trim())
            .bind(s.email.trim())
            .bind(s.address_line1.trim())
            .bind(&s.address_line2)
            .bind(s.city.trim())
            .bind(s.state_province.trim())
            .bind(s.postal_code.trim())
            .bind(s.country.trim())
            .bind(&s.receipt_header)
            .bind(&s.receipt_footer)
            .bind(s.currency_symbol.trim())
            .bind(&s.currency_code)
            .bind(s.default_tax_rate_bps)
            .bind(actor)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::{Database, DbConfig};

    pub(crate) fn sample_settings() -> PharmacySettings {
        PharmacySettings {
            pharmacy_name: "Mji Pharmacy".to_string(),
            registration_number: Some("PPB/1234".to_string()),
            tax_id: None,
            phone: "+254700000000".to_string(),
            email: "info@mji.example".to_string(),
            address_line1: "12 Moi Avenue".to_string(),
            address_line2: None,
            city: "Nairobi".to_string(),
            state_province: "Nairobi".to_string(),
            postal_code: "00100".to_string(),
            country: "Kenya".to_string(),
            receipt_header: None,
            receipt_footer: Some("Get well soon".to_string()),
            currency_symbol: "KSh".to_string(),
            currency_code: "KES".to_string(),
            default_tax_rate_bps: 1600,
        }
    }

    #[tokio::test]
    async fn test_get_before_setup_is_not_configured() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        assert!(matches!(db.settings().get().await, Err(DbError::NotConfigured)));
        // Reading must not have created anything
        assert!(!db.settings().is_configured().await.unwrap());
    }

    #[tokio::test]
    async fn test_initialize_once_then_update() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.settings();

        let stored = repo.initialize(&sample_settings(), None).await.unwrap();
        assert_eq!(stored, sample_settings());

        assert!(matches!(
            repo.initialize(&sample_settings(), None).await,
            Err(DbError::UniqueViolation { .. })
        ));

        let mut changed = sample_settings();
        changed.receipt_footer = Some("Asante".to_string());
        let user = crate::repository::user::tests::create_test_user(&db, "boss", apothecary_core::Role::Admin).await;
        let updated = repo.update(&changed, &user.id).await.unwrap();
        assert_eq!(updated.receipt_footer.as_deref(), Some("Asante"));
    }

    #[tokio::test]
    async fn test_update_without_setup_fails() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let user = crate::repository::user::tests::create_test_user(&db, "boss", apothecary_core::Role::Admin).await;

        assert!(matches!(
            db.settings().update(&sample_settings(), &user.id).await,
            Err(DbError::NotConfigured)
        ));
    }

    #[test]
    fn test_rejects_bad_currency_code() {
        let mut s = sample_settings();
        s.currency_code = "kes".to_string();
        assert!(validate_settings(&s).is_err());
    }
}
