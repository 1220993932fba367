//! Sales: immediate fulfillment, held sales, reads.

use std::sync::Arc;

use apothecary_core::{Action, Sale, SaleDocument};
use apothecary_db::{CompleteSaleRequest, FulfillRequest, HoldSaleRequest, SaleFilter};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};

use super::MAX_PAGE_SIZE;
use crate::error::{ApiError, ApiResult};
use crate::{Actor, AppState};

pub async fn list_sales(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Query(mut filter): Query<SaleFilter>,
) -> ApiResult<Json<Vec<Sale>>> {
    actor.require(Action::ViewSales)?;

    filter.limit = filter.limit.min(MAX_PAGE_SIZE);
    Ok(Json(state.db.sales().list(&filter).await?))
}

/// `POST /sales`: sells and decrements stock in one step.
pub async fn fulfill(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Json(request): Json<FulfillRequest>,
) -> ApiResult<(StatusCode, Json<SaleDocument>)> {
    actor.require(Action::CreateSale)?;

    let document = state.db.fulfillment().fulfill(request, &actor.user_id).await?;
    Ok((StatusCode::CREATED, Json(document)))
}

pub async fn hold(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Json(request): Json<HoldSaleRequest>,
) -> ApiResult<(StatusCode, Json<SaleDocument>)> {
    actor.require(Action::CreateSale)?;

    let document = state.db.fulfillment().hold_sale(request, &actor.user_id).await?;
    Ok((StatusCode::CREATED, Json(document)))
}

pub async fn get_sale(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<String>,
) -> ApiResult<Json<SaleDocument>> {
    actor.require(Action::ViewSales)?;

    state
        .db
        .sales()
        .get_by_id(&id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Sale", &id))
}

pub async fn complete(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<String>,
    Json(request): Json<CompleteSaleRequest>,
) -> ApiResult<Json<SaleDocument>> {
    actor.require(Action::CreateSale)?;

    Ok(Json(
        state.db.fulfillment().complete_sale(&id, request, &actor.user_id).await?,
    ))
}

pub async fn cancel(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<String>,
) -> ApiResult<Json<SaleDocument>> {
    actor.require(Action::CancelSale)?;

    Ok(Json(state.db.fulfillment().cancel_sale(&id, &actor.user_id).await?))
}
