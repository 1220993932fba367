use std::sync::Arc;

use apothecary_core::{Action, Customer, Prescription};
use apothecary_db::NewCustomer;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use super::{default_limit, MAX_PAGE_SIZE};
use crate::error::{ApiError, ApiResult};
use crate::{Actor, AppState};

#[derive(Debug, Deserialize)]
pub struct CustomerQuery {
    /// Substring of name or phone; empty lists the newest customers
    #[serde(default)]
    pub q: String,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

pub async fn search_customers(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Query(query): Query<CustomerQuery>,
) -> ApiResult<Json<Vec<Customer>>> {
    actor.require(Action::ViewCustomers)?;

    let customers = state
        .db
        .customers()
        .search(&query.q, query.limit.min(MAX_PAGE_SIZE))
        .await?;
    Ok(Json(customers))
}

pub async fn create_customer(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Json(request): Json<NewCustomer>,
) -> ApiResult<(StatusCode, Json<Customer>)> {
    actor.require(Action::ManageCustomers)?;

    let customer = state.db.customers().create(request).await?;
    Ok((StatusCode::CREATED, Json(customer)))
}

pub async fn get_customer(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<String>,
) -> ApiResult<Json<Customer>> {
    actor.require(Action::ViewCustomers)?;

    state
        .db
        .customers()
        .get_by_id(&id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Customer", &id))
}

/// A customer's prescription history, newest first.
pub async fn customer_prescriptions(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<Prescription>>> {
    actor.require(Action::ViewPrescriptions)?;

    if state.db.customers().get_by_id(&id).await?.is_none() {
        return Err(ApiError::not_found("Customer", &id));
    }
    Ok(Json(state.db.prescriptions().for_customer(&id).await?))
}
