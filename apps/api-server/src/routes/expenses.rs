//! Expenses and expense categories.
//!
//! Without [`Action::ViewExpenses`] a caller only ever sees their own
//! expenses; without [`Action::ApproveExpenses`] they can only change the
//! ones still awaiting approval.

use std::sync::Arc;

use apothecary_core::{Action, Expense, ExpenseCategory, ExpensePaymentMethod};
use apothecary_db::{ExpenseFilter, ExpenseScope, ExpenseUpdate, NewExpense, NewExpenseCategory};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::NaiveDate;
use serde::Deserialize;

use super::{default_limit, MAX_PAGE_SIZE};
use crate::error::{ApiError, ApiResult};
use crate::{Actor, AppState};

fn scope(actor: &Actor) -> ExpenseScope<'_> {
    if actor.can(Action::ApproveExpenses) {
        ExpenseScope::Any
    } else {
        ExpenseScope::OwnUnapproved(&actor.user_id)
    }
}

#[derive(Debug, Deserialize)]
pub struct ExpenseQuery {
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub from: Option<NaiveDate>,
    #[serde(default)]
    pub to: Option<NaiveDate>,
    #[serde(default)]
    pub payment_method: Option<ExpensePaymentMethod>,
    #[serde(default)]
    pub is_approved: Option<bool>,
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
}

pub async fn list_expenses(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Query(query): Query<ExpenseQuery>,
) -> ApiResult<Json<Vec<Expense>>> {
    actor.require(Action::RecordExpense)?;

    let filter = ExpenseFilter {
        category: query.category,
        from: query.from,
        to: query.to,
        payment_method: query.payment_method,
        created_by: (!actor.can(Action::ViewExpenses)).then(|| actor.user_id.clone()),
        is_approved: query.is_approved,
    };

    let expenses = state
        .db
        .expenses()
        .list(&filter, query.limit.min(MAX_PAGE_SIZE), query.offset)
        .await?;
    Ok(Json(expenses))
}

pub async fn create_expense(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Json(request): Json<NewExpense>,
) -> ApiResult<(StatusCode, Json<Expense>)> {
    actor.require(Action::RecordExpense)?;

    let expense = state.db.expenses().create(request, &actor.user_id).await?;
    Ok((StatusCode::CREATED, Json(expense)))
}

pub async fn get_expense(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<String>,
) -> ApiResult<Json<Expense>> {
    actor.require(Action::RecordExpense)?;

    state
        .db
        .expenses()
        .get_by_id(&id)
        .await?
        .filter(|e| e.created_by == actor.user_id || actor.can(Action::ViewExpenses))
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Expense", &id))
}

pub async fn update_expense(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<String>,
    Json(changes): Json<ExpenseUpdate>,
) -> ApiResult<Json<Expense>> {
    actor.require(Action::RecordExpense)?;

    Ok(Json(state.db.expenses().update(&id, changes, scope(&actor)).await?))
}

pub async fn delete_expense(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    actor.require(Action::RecordExpense)?;

    state.db.expenses().delete(&id, scope(&actor)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn approve(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<String>,
) -> ApiResult<Json<Expense>> {
    actor.require(Action::ApproveExpenses)?;

    Ok(Json(state.db.expenses().approve(&id, &actor.user_id).await?))
}

pub async fn unapprove(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<String>,
) -> ApiResult<Json<Expense>> {
    actor.require(Action::ApproveExpenses)?;

    Ok(Json(state.db.expenses().unapprove(&id, &actor.user_id).await?))
}

// =============================================================================
// Categories
// =============================================================================

pub async fn list_categories(
    State(state): State<Arc<AppState>>,
    actor: Actor,
) -> ApiResult<Json<Vec<ExpenseCategory>>> {
    actor.require(Action::RecordExpense)?;

    Ok(Json(state.db.expenses().list_categories().await?))
}

pub async fn create_category(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Json(request): Json<NewExpenseCategory>,
) -> ApiResult<(StatusCode, Json<ExpenseCategory>)> {
    actor.require(Action::ManageSettings)?;

    let category = state.db.expenses().create_category(request).await?;
    Ok((StatusCode::CREATED, Json(category)))
}
