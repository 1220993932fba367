//! # Category Repository
//!
//! Product categories ("Antibiotics", "Analgesics", ...). Products point at
//! a category through `products.category_id`.

use apothecary_core::validation::{validate_optional_text, validate_text};
use apothecary_core::Category;
use chrono::Utc;
use serde::Deserialize;
use sqlx::SqlitePool;
use tracing::info;

use super::generate_id;
use crate::error::{DbError, DbResult};

const CATEGORY_COLUMNS: &str = "id, name, description, created_at";

#[derive(Debug, Clone, Deserialize)]
pub struct NewCategory {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CategoryRepository {
    pool: SqlitePool,
}

impl CategoryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        CategoryRepository { pool }
    }

    /// ## Returns
    /// * `Err(DbError::UniqueViolation)` - name taken
    pub async fn create(&self, input: NewCategory) -> DbResult<Category> {
        let category = Category {
            id: generate_id(),
            name: validate_text("name", &input.name, 100)?.to_string(),
            description: validate_optional_text("description", input.description.as_deref(), 1000)?,
            created_at: Utc::now(),
        };

        sqlx::query("INSERT INTO categories (id, name, description, created_at) VALUES (?1, ?2, ?3, ?4)")
            .bind(&category.id)
            .bind(&category.name)
            .bind(&category.description)
            .bind(category.created_at)
            .execute(&self.pool)
            .await?;

        info!(name = %category.name, "Category created");
        Ok(category)
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Category>> {
        let sql = format!("SELECT {CATEGORY_COLUMNS} FROM categories WHERE id = ?1");

        let category = sqlx::query_as::<_, Category>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(category)
    }

    pub async fn list(&self) -> DbResult<Vec<Category>> {
        let sql = format!("SELECT {CATEGORY_COLUMNS} FROM categories ORDER BY name");

        let categories = sqlx::query_as::<_, Category>(&sql).fetch_all(&self.pool).await?;

        Ok(categories)
    }

    /// Renames a category or replaces its description.
    pub async fn update(&self, id: &str, input: NewCategory) -> DbResult<Category> {
        let name = validate_text("name", &input.name, 100)?;
        let description = validate_optional_text("description", input.description.as_deref(), 1000)?;

        let result = sqlx::query("UPDATE categories SET name = ?2, description = ?3 WHERE id = ?1")
            .bind(id)
            .bind(name)
            .bind(&description)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Category", id));
        }

        self.get_by_id(id)
            .await?
            .ok_or_else(|| DbError::not_found("Category", id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::product::tests::new_product;
    use crate::repository::user::tests::create_test_user;
    use crate::{Database, DbConfig};
    use apothecary_core::Role;

    fn category(name: &str) -> NewCategory {
        NewCategory {
            name: name.to_string(),
            description: None,
        }
    }

    #[tokio::test]
    async fn test_products_are_listed_by_category() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let admin = create_test_user(&db, "admin1", Role::Admin).await;
        let antibiotics = db.categories().create(category("Antibiotics")).await.unwrap();
        db.categories().create(category("Analgesics")).await.unwrap();

        let mut amox = new_product("AMOX-500", "Amoxil 500mg", 1200, 10);
        amox.category_id = Some(antibiotics.id.clone());
        db.products().create(amox, &admin.id).await.unwrap();
        db.products()
            .create(new_product("PARA-500", "Panadol 500mg", 350, 10), &admin.id)
            .await
            .unwrap();

        let listed = db.products().list_by_category(&antibiotics.id, 10, 0).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].sku, "AMOX-500");

        let names: Vec<_> = db.categories().list().await.unwrap().into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["Analgesics", "Antibiotics"]);
    }

    #[tokio::test]
    async fn test_unknown_category_is_rejected_by_the_schema() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let admin = create_test_user(&db, "admin1", Role::Admin).await;

        let mut product = new_product("ZINC-20", "Zinkid 20mg", 200, 1);
        product.category_id = Some("missing".to_string());

        let err = db.products().create(product, &admin.id).await.unwrap_err();
        assert!(matches!(err, DbError::ForeignKeyViolation { .. }));
    }

    #[tokio::test]
    async fn test_duplicate_name_and_rename() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.categories();

        let created = repo.create(category("Vitamins")).await.unwrap();
        let err = repo.create(category("Vitamins")).await.unwrap_err();
        assert!(err.is_unique_violation_on("categories.name"));

        let renamed = repo
            .update(
                &created.id,
                NewCategory {
                    name: "Supplements".to_string(),
                    description: Some("Vitamins and minerals".to_string()),
                },
            )
            .await
            .unwrap();
        assert_eq!(renamed.name, "Supplements");
        assert!(matches!(
            repo.update("missing", category("X")).await,
            Err(DbError::NotFound { .. })
        ));
    }
}
