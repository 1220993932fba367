//! Product categories and suppliers.

use std::sync::Arc;

use apothecary_core::{Action, Category, Supplier};
use apothecary_db::{NewCategory, NewSupplier, SupplierUpdate};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use crate::error::{ApiError, ApiResult};
use crate::{Actor, AppState};

pub async fn list_categories(
    State(state): State<Arc<AppState>>,
    actor: Actor,
) -> ApiResult<Json<Vec<Category>>> {
    actor.require(Action::ViewCatalog)?;

    Ok(Json(state.db.categories().list().await?))
}

pub async fn create_category(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Json(request): Json<NewCategory>,
) -> ApiResult<(StatusCode, Json<Category>)> {
    actor.require(Action::ManageCatalog)?;

    let category = state.db.categories().create(request).await?;
    Ok((StatusCode::CREATED, Json(category)))
}

pub async fn update_category(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<String>,
    Json(request): Json<NewCategory>,
) -> ApiResult<Json<Category>> {
    actor.require(Action::ManageCatalog)?;

    Ok(Json(state.db.categories().update(&id, request).await?))
}

#[derive(Debug, Deserialize)]
pub struct SupplierQuery {
    #[serde(default)]
    pub include_inactive: bool,
}

pub async fn list_suppliers(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Query(query): Query<SupplierQuery>,
) -> ApiResult<Json<Vec<Supplier>>> {
    actor.require(Action::ViewCatalog)?;

    Ok(Json(state.db.suppliers().list(query.include_inactive).await?))
}

pub async fn create_supplier(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Json(request): Json<NewSupplier>,
) -> ApiResult<(StatusCode, Json<Supplier>)> {
    actor.require(Action::ManageCatalog)?;

    let supplier = state.db.suppliers().create(request).await?;
    Ok((StatusCode::CREATED, Json(supplier)))
}

pub async fn get_supplier(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<String>,
) -> ApiResult<Json<Supplier>> {
    actor.require(Action::ViewCatalog)?;

    state
        .db
        .suppliers()
        .get_by_id(&id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Supplier", &id))
}

pub async fn update_supplier(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<String>,
    Json(changes): Json<SupplierUpdate>,
) -> ApiResult<Json<Supplier>> {
    actor.require(Action::ManageCatalog)?;

    Ok(Json(state.db.suppliers().update(&id, changes).await?))
}
