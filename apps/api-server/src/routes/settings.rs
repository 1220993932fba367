use std::sync::Arc;

use apothecary_core::{Action, PharmacySettings};
use axum::{extract::State, Json};

use crate::error::ApiResult;
use crate::{Actor, AppState};

/// 503 `NOT_CONFIGURED` until the setup binary has run.
pub async fn get_settings(State(state): State<Arc<AppState>>, actor: Actor) -> ApiResult<Json<PharmacySettings>> {
    actor.require(Action::ViewSettings)?;

    Ok(Json(state.db.settings().get().await?))
}

pub async fn update_settings(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Json(settings): Json<PharmacySettings>,
) -> ApiResult<Json<PharmacySettings>> {
    actor.require(Action::ManageSettings)?;

    Ok(Json(state.db.settings().update(&settings, &actor.user_id).await?))
}
