//! User zone (JWT) and public zone handlers.

use axum::extract::State;
use axum::response::Json;

use crate::api::models::entitlements::{
    ActivateTrialBody, ActivateTrialResponse, TrialConfigResponse, TrialStatusResponse,
};
use crate::api::models::nodes::{
    CreateNodeBody, CreateNodeResult, DeleteNodeResult, RegionListResponse, UserNodeStatusResponse,
};
use crate::api::models::vpn::{VpnStatusResponse, VpnSubscribeResponse};
use crate::auth::CurrentUser;
use crate::errors::{Error, Result};
use crate::AppState;

#[tracing::instrument(skip_all)]
pub async fn get_my_node(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<UserNodeStatusResponse>> {
    Ok(Json(state.hosting.get_user_node_status(&user.id).await?))
}

#[tracing::instrument(skip_all)]
pub async fn create_my_node(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(body): Json<CreateNodeBody>,
) -> Result<Json<CreateNodeResult>> {
    if body.region.is_empty() {
        return Err(Error::BadRequest {
            message: "region is required".to_string(),
        });
    }

    state.limiters.node_create.check(&user.id)?;

    Ok(Json(
        state.hosting.create_user_node(&user.id, &body.region).await?,
    ))
}

#[tracing::instrument(skip_all)]
pub async fn delete_my_node(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<DeleteNodeResult>> {
    Ok(Json(state.hosting.delete_user_node(&user.id).await?))
}

#[tracing::instrument(skip_all)]
pub async fn get_my_vpn(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<VpnStatusResponse>> {
    Ok(Json(state.vpn.get_user_vpn_status(&user.id).await?))
}

#[tracing::instrument(skip_all)]
pub async fn get_my_vpn_subscribe(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<VpnSubscribeResponse>> {
    Ok(Json(state.vpn.get_user_vpn_subscribe_config(&user.id).await?))
}

#[tracing::instrument(skip_all)]
pub async fn get_my_trial_status(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<TrialStatusResponse>> {
    Ok(Json(state.entitlements.get_trial_status(&user.id).await?))
}

#[tracing::instrument(skip_all)]
pub async fn activate_my_trial(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(body): Json<ActivateTrialBody>,
) -> Result<Json<ActivateTrialResponse>> {
    state.limiters.trial_activate.check(&user.id)?;

    Ok(Json(
        state
            .entitlements
            .activate_trial(&user.id, &body.email, &body.device_id)
            .await?,
    ))
}

#[tracing::instrument(skip_all)]
pub async fn get_regions(State(state): State<AppState>) -> Result<Json<RegionListResponse>> {
    Ok(Json(state.hosting.get_available_regions().await?))
}

/// Public, unauthenticated trial parameters.
#[tracing::instrument(skip_all)]
pub async fn get_trial_config(State(state): State<AppState>) -> Json<TrialConfigResponse> {
    Json(state.entitlements.trial_config())
}
