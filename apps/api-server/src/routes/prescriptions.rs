use std::sync::Arc;

use apothecary_core::{Action, Prescription, PrescriptionDocument, PrescriptionStatus};
use apothecary_db::{DispenseOutcome, DispenseRequest, NewPrescription};
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
pub struct PrescriptionQuery {
    #[serde(default)]
    pub status: Option<PrescriptionStatus>,
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
}

pub async fn list_prescriptions(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Query(query): Query<PrescriptionQuery>,
) -> ApiResult<Json<Vec<Prescription>>> {
    actor.require(Action::ViewPrescriptions)?;

    let prescriptions = state
        .db
        .prescriptions()
        .list(query.status, query.limit.min(MAX_PAGE_SIZE), query.offset)
        .await?;
    Ok(Json(prescriptions))
}

pub async fn create_prescription(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Json(request): Json<NewPrescription>,
) -> ApiResult<(StatusCode, Json<PrescriptionDocument>)> {
    actor.require(Action::CreatePrescription)?;

    let document = state
        .db
        .fulfillment()
        .create_prescription(request, &actor.user_id)
        .await?;
    Ok((StatusCode::CREATED, Json(document)))
}

pub async fn get_prescription(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<String>,
) -> ApiResult<Json<PrescriptionDocument>> {
    actor.require(Action::ViewPrescriptions)?;

    state
        .db
        .prescriptions()
        .get_by_id(&id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Prescription", &id))
}

/// Body `{}` dispenses only; `{"sale": {...}}` also bills it.
pub async fn dispense(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<String>,
    Json(request): Json<DispenseRequest>,
) -> ApiResult<Json<DispenseOutcome>> {
    actor.require(Action::DispensePrescription)?;

    Ok(Json(
        state.db.fulfillment().dispense(&id, request, &actor.user_id).await?,
    ))
}

pub async fn cancel(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<String>,
) -> ApiResult<Json<PrescriptionDocument>> {
    actor.require(Action::CancelPrescription)?;

    Ok(Json(
        state.db.fulfillment().cancel_prescription(&id, &actor.user_id).await?,
    ))
}
