//! Internal zone: called by the subscription service and the user portal.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::api::models::entitlements::{
    EntitlementListQuery, EntitlementListResponse, GiftEntitlementBody, GiftEntitlementResponse,
};
use crate::api::models::nodes::RegionUpsertBody;
use crate::api::models::provisions::{
    DeprovisionRequest, DeprovisionResponse, ProvisionRequest, ProvisionResponse,
    ResourceStatusResponse,
};
use crate::api::models::vpn::UpdateVpnUserBody;
use crate::db::handlers::Regions;
use crate::db::models::regions::RegionUpsertDBRequest;
use crate::db::models::vpn_provisions::VpnStatus;
use crate::errors::{Error, Result};
use crate::AppState;

/// Dispatcher: route by app source, falling back to the legacy resource type.
#[tracing::instrument(skip_all)]
pub async fn provision(
    State(state): State<AppState>,
    Json(request): Json<ProvisionRequest>,
) -> Result<Json<ProvisionResponse>> {
    if request.user_id.is_empty() {
        return Err(Error::BadRequest {
            message: "user_id is required".to_string(),
        });
    }

    let response = if request.is_vpn() {
        state.vpn.provision_vpn_user(&request).await?
    } else {
        state.hosting.provision(&request).await?
    };

    Ok(Json(response))
}

#[tracing::instrument(skip_all)]
pub async fn deprovision(
    State(state): State<AppState>,
    Json(request): Json<DeprovisionRequest>,
) -> Result<Json<DeprovisionResponse>> {
    if request.subscription_id.is_empty() {
        return Err(Error::BadRequest {
            message: "subscription_id is required".to_string(),
        });
    }

    match state.hosting.deprovision(&request).await {
        Ok(response) => Ok(Json(response)),
        Err(Error::NotFound { .. }) => {
            // not a hosting resource; try the VPN side before giving up
            let resource_id = state
                .vpn
                .deprovision_by(&request.subscription_id, request.resource_id, &request.reason)
                .await?;
            Ok(Json(DeprovisionResponse {
                resource_id,
                status: VpnStatus::Disabled.to_string(),
                message: "VPN user deprovisioned".to_string(),
            }))
        }
        Err(e) => Err(e),
    }
}

#[tracing::instrument(skip_all)]
pub async fn get_resource_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ResourceStatusResponse>> {
    Ok(Json(state.hosting.get_resource_status(id).await?))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LogsQuery {
    pub limit: i64,
}

#[tracing::instrument(skip_all)]
pub async fn get_resource_logs(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<LogsQuery>,
) -> Result<Json<serde_json::Value>> {
    let logs = state.hosting.get_logs(id, query.limit).await?;
    Ok(Json(json!({ "logs": logs })))
}

#[tracing::instrument(skip_all)]
pub async fn get_resources_by_subscription(
    State(state): State<AppState>,
    Path(subscription_id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    let resources = state
        .hosting
        .get_resources_by_subscription(&subscription_id)
        .await?;
    Ok(Json(json!({ "resources": resources })))
}

/// User portal view: node status with subscription context.
#[tracing::instrument(skip_all)]
pub async fn get_user_resources(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    let status = state.hosting.get_user_node_status(&user_id).await?;
    Ok(Json(json!({ "success": true, "data": status })))
}

#[tracing::instrument(skip_all)]
pub async fn get_user_vpn_subscribe(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    let config = state.vpn.get_user_vpn_subscribe_config(&user_id).await?;
    Ok(Json(json!({ "success": true, "data": config })))
}

#[tracing::instrument(skip_all)]
pub async fn get_user_vpn_quick_status(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    let status = state.vpn.get_user_vpn_quick_status(&user_id).await?;
    Ok(Json(json!({ "success": true, "data": status })))
}

#[tracing::instrument(skip_all)]
pub async fn update_vpn_resource(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateVpnUserBody>,
) -> Result<Json<serde_json::Value>> {
    state.vpn.update_vpn_user(id, &body).await?;
    Ok(Json(json!({
        "status": "ok",
        "message": "VPN user updated successfully"
    })))
}

#[tracing::instrument(skip_all)]
pub async fn gift_entitlement(
    State(state): State<AppState>,
    Json(body): Json<GiftEntitlementBody>,
) -> Result<(StatusCode, Json<GiftEntitlementResponse>)> {
    let response = state.entitlements.gift_entitlement(&body).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

#[tracing::instrument(skip_all)]
pub async fn list_entitlements(
    State(state): State<AppState>,
    Query(query): Query<EntitlementListQuery>,
) -> Result<Json<EntitlementListResponse>> {
    let entitlements = state
        .entitlements
        .list_entitlements(&query.user_id, query.business_type(), &query.status)
        .await?;
    Ok(Json(EntitlementListResponse { entitlements }))
}

#[tracing::instrument(skip_all)]
pub async fn upsert_region(
    State(state): State<AppState>,
    Json(body): Json<RegionUpsertBody>,
) -> Result<Json<serde_json::Value>> {
    if body.code.is_empty() || body.name.is_empty() {
        return Err(Error::BadRequest {
            message: "code and name are required".to_string(),
        });
    }

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Regions::new(&mut conn);
    let region = repo
        .upsert(&RegionUpsertDBRequest {
            code: body.code,
            name: body.name,
            provider: body.provider,
            available: body.available,
        })
        .await?;

    Ok(Json(json!({ "region": region })))
}
