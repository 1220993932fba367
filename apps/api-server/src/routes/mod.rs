//! Route definitions.
//!
//! Every protected handler takes an [`Actor`](crate::Actor) and calls
//! `actor.require(..)` exactly once before touching the database. The
//! `/auth/me` pair only ever touches the caller's own account and needs no
//! action.

mod auth;
mod catalog;
mod customers;
mod expenses;
mod health;
mod laboratory;
mod prescriptions;
mod products;
mod sales;
mod settings;

use std::sync::Arc;

use axum::{
    routing::{get, post, put},
    Router,
};
use serde::Deserialize;

use crate::AppState;

/// Upper bound for any `limit` query parameter.
pub const MAX_PAGE_SIZE: u32 = 200;

fn default_limit() -> u32 {
    50
}

/// `?limit=&offset=` with a capped limit.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Page {
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
}

impl Page {
    pub fn limit(&self) -> u32 {
        self.limit.min(MAX_PAGE_SIZE)
    }
}

/// Create API routes
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/auth/login", post(auth::login))
        .route("/auth/me", get(auth::me))
        .route("/auth/change-password", post(auth::change_password))
        .route("/users", post(auth::create_user))
        .nest("/products", product_routes())
        .route("/categories", get(catalog::list_categories).post(catalog::create_category))
        .route("/categories/:id", put(catalog::update_category))
        .route("/suppliers", get(catalog::list_suppliers).post(catalog::create_supplier))
        .route("/suppliers/:id", get(catalog::get_supplier).put(catalog::update_supplier))
        .nest("/customers", customer_routes())
        .nest("/sales", sale_routes())
        .nest("/prescriptions", prescription_routes())
        .route(
            "/test-types",
            get(laboratory::list_test_types).post(laboratory::create_test_type),
        )
        .route("/test-types/:id", put(laboratory::update_test_type))
        .nest("/lab-tests", lab_test_routes())
        .nest("/expenses", expense_routes())
        .route(
            "/expense-categories",
            get(expenses::list_categories).post(expenses::create_category),
        )
        .route("/settings", get(settings::get_settings).put(settings::update_settings))
}

fn product_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(products::list_products).post(products::create_product))
        .route("/low-stock", get(products::low_stock))
        .route(
            "/:id",
            get(products::get_product)
                .put(products::update_product)
                .delete(products::delete_product),
        )
        .route("/:id/stock", post(products::adjust_stock))
        .route("/:id/movements", get(products::movements))
}

fn customer_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(customers::search_customers).post(customers::create_customer))
        .route("/:id", get(customers::get_customer))
        .route("/:id/prescriptions", get(customers::customer_prescriptions))
}

fn sale_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(sales::list_sales).post(sales::fulfill))
        .route("/hold", post(sales::hold))
        .route("/:id", get(sales::get_sale))
        .route("/:id/complete", post(sales::complete))
        .route("/:id/cancel", post(sales::cancel))
}

fn prescription_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/",
            get(prescriptions::list_prescriptions).post(prescriptions::create_prescription),
        )
        .route("/:id", get(prescriptions::get_prescription))
        .route("/:id/dispense", post(prescriptions::dispense))
        .route("/:id/cancel", post(prescriptions::cancel))
}

fn lab_test_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(laboratory::list_lab_tests).post(laboratory::request_lab_test))
        .route("/:id", get(laboratory::get_lab_test))
        .route("/:id/start", post(laboratory::start))
        .route("/:id/measurements", post(laboratory::record_measurement))
        .route("/:id/complete", post(laboratory::complete))
        .route("/:id/review", post(laboratory::review))
        .route("/:id/pay", post(laboratory::pay))
}

fn expense_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(expenses::list_expenses).post(expenses::create_expense))
        .route(
            "/:id",
            get(expenses::get_expense)
                .put(expenses::update_expense)
                .delete(expenses::delete_expense),
        )
        .route("/:id/approve", post(expenses::approve))
        .route("/:id/unapprove", post(expenses::unapprove))
}
