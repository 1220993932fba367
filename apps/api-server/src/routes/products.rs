//! Catalog and manual stock movements.

use std::sync::Arc;

use apothecary_core::{Action, Product, StockMovement};
use apothecary_db::{NewProduct, ProductUpdate, StockAdjustment};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use super::{default_limit, Page, MAX_PAGE_SIZE};
use crate::error::{ApiError, ApiResult};
use crate::{Actor, AppState};

#[derive(Debug, Deserialize)]
pub struct ProductQuery {
    /// FTS prefix search over sku, name, generic name and barcode
    #[serde(default)]
    pub q: Option<String>,
    #[serde(default)]
    pub category_id: Option<String>,
    #[serde(default)]
    pub include_inactive: bool,
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
}

pub async fn list_products(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Query(query): Query<ProductQuery>,
) -> ApiResult<Json<Vec<Product>>> {
    actor.require(Action::ViewCatalog)?;

    let limit = query.limit.min(MAX_PAGE_SIZE);
    let products = match (query.q.as_deref(), query.category_id.as_deref()) {
        (Some(q), _) if !q.trim().is_empty() => state.db.products().search(q, limit).await?,
        (_, Some(category)) => {
            state
                .db
                .products()
                .list_by_category(category, limit, query.offset)
                .await?
        }
        _ => {
            state
                .db
                .products()
                .list(query.include_inactive, limit, query.offset)
                .await?
        }
    };

    Ok(Json(products))
}

pub async fn create_product(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Json(request): Json<NewProduct>,
) -> ApiResult<(StatusCode, Json<Product>)> {
    actor.require(Action::ManageCatalog)?;

    let product = state.db.products().create(request, &actor.user_id).await?;
    Ok((StatusCode::CREATED, Json(product)))
}

pub async fn low_stock(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Query(page): Query<Page>,
) -> ApiResult<Json<Vec<Product>>> {
    actor.require(Action::ViewCatalog)?;

    Ok(Json(state.db.products().low_stock(page.limit()).await?))
}

pub async fn get_product(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<String>,
) -> ApiResult<Json<Product>> {
    actor.require(Action::ViewCatalog)?;

    state
        .db
        .products()
        .get_by_id(&id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Product", &id))
}

pub async fn update_product(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<String>,
    Json(changes): Json<ProductUpdate>,
) -> ApiResult<Json<Product>> {
    actor.require(Action::ManageCatalog)?;

    Ok(Json(state.db.products().update(&id, changes).await?))
}

pub async fn delete_product(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    actor.require(Action::ManageCatalog)?;

    state.db.products().soft_delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize)]
pub struct StockAdjusted {
    pub product: Product,
    pub movement: StockMovement,
}

pub async fn adjust_stock(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<String>,
    Json(adjustment): Json<StockAdjustment>,
) -> ApiResult<(StatusCode, Json<StockAdjusted>)> {
    actor.require(Action::AdjustStock)?;

    let (product, movement) = state.db.stock().record(&id, adjustment, &actor.user_id).await?;
    Ok((StatusCode::CREATED, Json(StockAdjusted { product, movement })))
}

pub async fn movements(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<String>,
    Query(page): Query<Page>,
) -> ApiResult<Json<Vec<StockMovement>>> {
    actor.require(Action::ViewCatalog)?;

    Ok(Json(state.db.stock().history(&id, page.limit()).await?))
}
