//! Test types and lab tests.

use std::sync::Arc;

use apothecary_core::{Action, LabMeasurement, LabTest, LabTestDocument, LabTestStatus, PaymentMethod, TestType};
use apothecary_db::{LabResults, LabTestFilter, NewLabTest, NewMeasurement, NewTestType, TestTypeUpdate};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use super::{default_limit, MAX_PAGE_SIZE};
use crate::error::{ApiError, ApiResult};
use crate::{Actor, AppState};

// =============================================================================
// Test Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct TestTypeQuery {
    #[serde(default)]
    pub include_inactive: bool,
}

pub async fn list_test_types(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Query(query): Query<TestTypeQuery>,
) -> ApiResult<Json<Vec<TestType>>> {
    actor.require(Action::ViewLabTests)?;

    Ok(Json(state.db.laboratory().list_test_types(query.include_inactive).await?))
}

pub async fn create_test_type(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Json(request): Json<NewTestType>,
) -> ApiResult<(StatusCode, Json<TestType>)> {
    actor.require(Action::ManageTestTypes)?;

    let test_type = state.db.laboratory().create_test_type(request, &actor.user_id).await?;
    Ok((StatusCode::CREATED, Json(test_type)))
}

pub async fn update_test_type(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<String>,
    Json(changes): Json<TestTypeUpdate>,
) -> ApiResult<Json<TestType>> {
    actor.require(Action::ManageTestTypes)?;

    Ok(Json(state.db.laboratory().update_test_type(&id, changes).await?))
}

// =============================================================================
// Lab Tests
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct LabTestQuery {
    #[serde(default)]
    pub status: Option<LabTestStatus>,
    /// A user id, or `me`.
    #[serde(default)]
    pub assigned_to: Option<String>,
    #[serde(default)]
    pub requested_by: Option<String>,
    #[serde(default)]
    pub customer_id: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
}

pub async fn list_lab_tests(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Query(query): Query<LabTestQuery>,
) -> ApiResult<Json<Vec<LabTest>>> {
    actor.require(Action::ViewLabTests)?;

    let resolve = |who: Option<String>| {
        if who.as_deref() == Some("me") {
            Some(actor.user_id.clone())
        } else {
            who
        }
    };
    let filter = LabTestFilter {
        status: query.status,
        assigned_to: resolve(query.assigned_to),
        requested_by: resolve(query.requested_by),
        customer_id: query.customer_id,
    };

    let tests = state
        .db
        .laboratory()
        .list(&filter, query.limit.min(MAX_PAGE_SIZE), query.offset)
        .await?;
    Ok(Json(tests))
}

pub async fn request_lab_test(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Json(request): Json<NewLabTest>,
) -> ApiResult<(StatusCode, Json<LabTestDocument>)> {
    actor.require(Action::RequestLabTest)?;

    let document = state
        .db
        .fulfillment()
        .request_lab_test(request, &actor.user_id)
        .await?;
    Ok((StatusCode::CREATED, Json(document)))
}

pub async fn get_lab_test(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<String>,
) -> ApiResult<Json<LabTestDocument>> {
    actor.require(Action::ViewLabTests)?;

    state
        .db
        .laboratory()
        .get_by_id(&id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Lab test", &id))
}

pub async fn start(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<String>,
) -> ApiResult<Json<LabTestDocument>> {
    actor.require(Action::PerformLabTest)?;

    Ok(Json(state.db.laboratory().start(&id, &actor.user_id).await?))
}

pub async fn record_measurement(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<String>,
    Json(request): Json<NewMeasurement>,
) -> ApiResult<(StatusCode, Json<LabMeasurement>)> {
    actor.require(Action::PerformLabTest)?;

    let measurement = state
        .db
        .laboratory()
        .record_measurement(&id, request, &actor.user_id)
        .await?;
    Ok((StatusCode::CREATED, Json(measurement)))
}

pub async fn complete(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<String>,
    Json(findings): Json<LabResults>,
) -> ApiResult<Json<LabTestDocument>> {
    actor.require(Action::PerformLabTest)?;

    Ok(Json(state.db.laboratory().complete(&id, findings, &actor.user_id).await?))
}

pub async fn review(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<String>,
) -> ApiResult<Json<LabTestDocument>> {
    actor.require(Action::ReviewLabTest)?;

    Ok(Json(state.db.laboratory().review(&id, &actor.user_id).await?))
}

fn cash() -> PaymentMethod {
    PaymentMethod::Cash
}

#[derive(Debug, Deserialize)]
pub struct PayRequest {
    #[serde(default = "cash")]
    pub payment_method: PaymentMethod,
}

pub async fn pay(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<String>,
    Json(request): Json<PayRequest>,
) -> ApiResult<Json<LabTestDocument>> {
    actor.require(Action::ChargeLabTest)?;

    Ok(Json(
        state
            .db
            .laboratory()
            .mark_paid(&id, request.payment_method, &actor.user_id)
            .await?,
    ))
}
