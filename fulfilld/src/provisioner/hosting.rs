//! Hosting node provisioning: the long-lived state machine that takes a
//! provision row from `pending` through `creating` to `active` (or `failed`),
//! driving the hosting provider and reporting progress to the subscription
//! service.
//!
//! `provision` returns as soon as the row exists; the external work runs on a
//! detached task that survives the originating request. Ready/failed signals
//! can also arrive out-of-band through the callback endpoints and are applied
//! idempotently.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sqlx::PgPool;
use tokio_util::task::TaskTracker;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::api::models::nodes::{
    CreateNodeResult, DeleteNodeResult, HostingState, NodeCreationProgress, NodeCreationStep,
    RegionInfo, RegionListResponse, SubscriptionInfo, UserNodeInfo, UserNodeStatusResponse,
};
use crate::api::models::provisions::{
    DeprovisionRequest, DeprovisionResponse, NodeFailedCallback, NodeReadyCallback,
    ProvisionRequest, ProvisionResponse, ResourceStatusResponse,
};
use crate::clients::{CallbackApp, CreateNodeRequest, HostingClient, SubscriptionClient};
use crate::config::Config;
use crate::db::handlers::{HostingProvisions, ProvisionLogs, Regions};
use crate::db::models::hosting_provisions::{
    HostingProvision, HostingProvisionCreateDBRequest, HostingStatus,
};
use crate::db::models::provision_logs::ProvisionType;
use crate::errors::{Error, Result};
use crate::provisioner::{policy, traffic_stats};
use crate::types::abbrev_uuid;

const READY_WAIT: Duration = Duration::from_secs(10 * 60);
const ESTIMATED_READY_SECONDS: u32 = 300;

#[derive(Clone)]
pub struct HostingProvisioner {
    db: PgPool,
    config: Arc<Config>,
    hosting: HostingClient,
    subscriptions: SubscriptionClient,
    tasks: TaskTracker,
}

impl HostingProvisioner {
    pub fn new(
        db: PgPool,
        config: Arc<Config>,
        hosting: HostingClient,
        subscriptions: SubscriptionClient,
        tasks: TaskTracker,
    ) -> Self {
        Self {
            db,
            config,
            hosting,
            subscriptions,
            tasks,
        }
    }

    /// Start provisioning a node. Validates preconditions, writes the
    /// `pending` row, spawns the background workflow and returns immediately.
    #[instrument(skip_all, fields(user_id = %req.user_id), err)]
    pub async fn provision(&self, req: &ProvisionRequest) -> Result<ProvisionResponse> {
        if req.user_id.is_empty() {
            return Err(Error::BadRequest {
                message: "user_id is required".to_string(),
            });
        }

        let region = if req.region.is_empty() {
            self.config.hosting.default_region.clone()
        } else {
            req.region.clone()
        };

        let mut conn = self.db.acquire().await.map_err(|e| Error::Database(e.into()))?;

        let mut repo = HostingProvisions::new(&mut conn);
        if repo.get_active_by_user(&req.user_id).await?.is_some() {
            return Err(Error::Conflict {
                message: "user already has an active hosting node".to_string(),
            });
        }

        let traffic_limit = if req.traffic_limit > 0 {
            req.traffic_limit
        } else {
            policy::hosting_traffic_limit(&req.plan_tier)
        };

        let provision = repo
            .create(&HostingProvisionCreateDBRequest {
                id: Uuid::new_v4(),
                subscription_id: req.subscription_id.clone(),
                user_id: req.user_id.clone(),
                channel: req.channel.clone(),
                provider: self.config.hosting.cloud_provider.clone(),
                region: region.clone(),
                status: HostingStatus::Pending,
                plan_tier: req.plan_tier.clone(),
                traffic_limit,
            })
            .await?;

        let mut logs = ProvisionLogs::new(&mut conn);
        if let Err(e) = logs
            .log_action(
                provision.id,
                ProvisionType::Hosting,
                "provision_started",
                "pending",
                &format!("Provisioning started in region {region}"),
            )
            .await
        {
            warn!(error = %e, "Failed to write provision_started log");
        }
        drop(conn);

        let this = self.clone();
        let req = req.clone();
        self.tasks.spawn(async move {
            this.run_provision_workflow(provision.id, req, region).await;
        });

        Ok(ProvisionResponse {
            resource_id: provision.id,
            status: HostingStatus::Pending.to_string(),
            estimated_ready_seconds: Some(ESTIMATED_READY_SECONDS),
            vpn_user_id: None,
            message: "Provisioning started".to_string(),
        })
    }

    /// The background workflow for one provisioning attempt. Spawned exactly
    /// once per provision id.
    async fn run_provision_workflow(&self, provision_id: Uuid, req: ProvisionRequest, region: String) {
        if let Err(e) = self
            .subscriptions
            .notify_provisioning_started(&req.subscription_id, CallbackApp::Obox)
            .await
        {
            warn!(error = %e, "Failed to notify subscription-service (started)");
        }

        self.set_status(provision_id, HostingStatus::Creating, None).await;

        let bundle = policy::bundle_id(&req.plan_tier);
        let created = match self
            .hosting
            .create_node(&CreateNodeRequest {
                cloud_provider: &self.config.hosting.cloud_provider,
                region: &region,
                bundle_id: bundle,
                subscription_id: &req.subscription_id,
                user_id: &req.user_id,
            })
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                self.handle_provision_error(
                    &req.subscription_id,
                    provision_id,
                    &format!("create node via hosting-service: {e}"),
                )
                .await;
                return;
            }
        };

        let node_id = created.node_id.clone();
        if let Ok(mut conn) = self.db.acquire().await {
            let mut repo = HostingProvisions::new(&mut conn);
            if let Ok(Some(mut hp)) = repo.get_by_id(provision_id).await {
                hp.hosting_node_id = Some(node_id.clone());
                hp.status = HostingStatus::Creating;
                if let Err(e) = repo.update(&hp).await {
                    warn!(error = %e, "Failed to persist node id");
                }
            }
            let mut logs = ProvisionLogs::new(&mut conn);
            let _ = logs
                .log_action(
                    provision_id,
                    ProvisionType::Hosting,
                    "node_creating",
                    "creating",
                    &format!("Node {node_id} created, waiting for active state"),
                )
                .await;
        }

        let node = match self.hosting.wait_for_node_ready(&node_id, READY_WAIT).await {
            Ok(node) => node,
            Err(e) => {
                self.handle_provision_error(
                    &req.subscription_id,
                    provision_id,
                    &format!("wait for node ready: {e}"),
                )
                .await;
                return;
            }
        };

        let now = Utc::now();
        match self.db.acquire().await {
            Ok(mut conn) => {
                let mut repo = HostingProvisions::new(&mut conn);
                match repo.get_by_id(provision_id).await {
                    Ok(Some(mut hp)) => {
                        hp.public_ip = Some(node.public_ip.clone());
                        hp.api_port = Some(self.config.node.api_port);
                        hp.api_key = Some(node.node_api_key);
                        hp.vless_port = Some(node.vless_port);
                        hp.ss_port = Some(node.ss_port);
                        hp.public_key = Some(node.public_key);
                        hp.short_id = Some(node.short_id);
                        hp.status = HostingStatus::Active;
                        hp.ready_at = Some(now);
                        if let Err(e) = repo.update(&hp).await {
                            error!(error = %e, "Failed to persist ready node config");
                        }
                    }
                    other => {
                        error!(?other, "Provision row disappeared while waiting for node");
                        return;
                    }
                }
                let mut logs = ProvisionLogs::new(&mut conn);
                let _ = logs
                    .log_action(
                        provision_id,
                        ProvisionType::Hosting,
                        "node_ready",
                        "active",
                        &format!("Node active at {}", node.public_ip),
                    )
                    .await;
            }
            Err(e) => {
                error!(error = %e, "Failed to acquire connection for ready update");
                return;
            }
        }

        if let Err(e) = self
            .subscriptions
            .notify_active(&req.subscription_id, CallbackApp::Obox, None)
            .await
        {
            warn!(error = %e, "Failed to notify subscription-service (active)");
        }

        info!(
            provision_id = %abbrev_uuid(&provision_id),
            "Provisioning complete, node active"
        );
    }

    /// Node agent callback: the networking daemon is installed and serving.
    /// A repeated callback for an already-active provision is a no-op.
    #[instrument(skip_all, fields(provision_id = %abbrev_uuid(&callback.resource_id)), err)]
    pub async fn handle_node_ready(&self, callback: &NodeReadyCallback) -> Result<()> {
        let mut conn = self.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
        let mut repo = HostingProvisions::new(&mut conn);

        let mut hp = repo
            .get_by_id(callback.resource_id)
            .await?
            .ok_or_else(|| Error::NotFound {
                resource: "resource".to_string(),
                id: callback.resource_id.to_string(),
            })?;

        if hp.status == HostingStatus::Active {
            info!("Node ready callback for already-active provision, ignoring");
            return Ok(());
        }

        hp.public_ip = Some(callback.public_ip.clone());
        hp.api_port = Some(callback.api_port);
        hp.api_key = Some(callback.api_key.clone());
        hp.vless_port = Some(callback.vless_port);
        hp.ss_port = Some(callback.ss_port);
        hp.public_key = Some(callback.public_key.clone());
        hp.short_id = Some(callback.short_id.clone());
        hp.status = HostingStatus::Active;
        hp.ready_at = Some(Utc::now());
        repo.update(&hp).await?;

        let mut logs = ProvisionLogs::new(&mut conn);
        if let Err(e) = logs
            .log_action(
                hp.id,
                ProvisionType::Hosting,
                "node_ready",
                "active",
                &format!("Node software installed, resource active at {}", callback.public_ip),
            )
            .await
        {
            warn!(error = %e, "Failed to write node_ready log");
        }
        drop(conn);

        if let Err(e) = self
            .subscriptions
            .notify_active(&hp.subscription_id, CallbackApp::Obox, None)
            .await
        {
            warn!(error = %e, "Failed to notify subscription-service (active)");
        }

        Ok(())
    }

    /// Node agent callback: installation failed. Routed to the common error
    /// path; repeated callbacks for an already-failed provision are no-ops.
    #[instrument(skip_all, fields(provision_id = %abbrev_uuid(&callback.resource_id)), err)]
    pub async fn handle_node_failed(&self, callback: &NodeFailedCallback) -> Result<()> {
        let mut conn = self.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
        let mut repo = HostingProvisions::new(&mut conn);

        let hp = repo
            .get_by_id(callback.resource_id)
            .await?
            .ok_or_else(|| Error::NotFound {
                resource: "resource".to_string(),
                id: callback.resource_id.to_string(),
            })?;
        drop(conn);

        if hp.status == HostingStatus::Failed {
            info!("Node failed callback for already-failed provision, ignoring");
            return Ok(());
        }

        self.handle_provision_error(&hp.subscription_id, hp.id, &callback.error_message)
            .await;
        Ok(())
    }

    /// Start deprovisioning; resolves the target by `resource_id` or by the
    /// newest provision of the subscription. Deleting an already-deleted
    /// resource is a no-op rather than an error.
    #[instrument(skip_all, fields(subscription_id = %req.subscription_id), err)]
    pub async fn deprovision(&self, req: &DeprovisionRequest) -> Result<DeprovisionResponse> {
        let mut conn = self.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
        let mut repo = HostingProvisions::new(&mut conn);

        let hp = if let Some(resource_id) = req.resource_id {
            repo.get_by_id(resource_id).await?
        } else {
            repo.get_by_subscription_id(&req.subscription_id)
                .await?
                .into_iter()
                .next()
        };
        drop(conn);

        let hp = hp.ok_or_else(|| Error::NotFound {
            resource: "resource".to_string(),
            id: req
                .resource_id
                .map(|id| id.to_string())
                .unwrap_or_else(|| req.subscription_id.clone()),
        })?;

        if hp.status == HostingStatus::Deleted {
            return Ok(DeprovisionResponse {
                resource_id: hp.id,
                status: HostingStatus::Deleted.to_string(),
                message: "Resource already deprovisioned".to_string(),
            });
        }

        let resource_id = hp.id;
        let this = self.clone();
        let reason = req.reason.clone();
        self.tasks.spawn(async move {
            this.run_deprovision_workflow(hp, reason).await;
        });

        Ok(DeprovisionResponse {
            resource_id,
            status: HostingStatus::Stopping.to_string(),
            message: "Deprovisioning started".to_string(),
        })
    }

    async fn run_deprovision_workflow(&self, mut hp: HostingProvision, reason: String) {
        self.set_status(hp.id, HostingStatus::Stopping, None).await;

        if let Some(node_id) = hp.hosting_node_id.as_deref() {
            if !node_id.is_empty() {
                if let Err(e) = self.hosting.delete_node(node_id).await {
                    warn!(error = %e, "Failed to delete node, continuing");
                }
            }
        }

        hp.status = HostingStatus::Deleted;
        hp.deleted_at = Some(Utc::now());
        match self.db.acquire().await {
            Ok(mut conn) => {
                let mut repo = HostingProvisions::new(&mut conn);
                if let Err(e) = repo.update(&hp).await {
                    error!(error = %e, "Failed to mark provision deleted");
                    return;
                }
                let mut logs = ProvisionLogs::new(&mut conn);
                let _ = logs
                    .log_action(
                        hp.id,
                        ProvisionType::Hosting,
                        "deprovisioned",
                        "deleted",
                        &format!("Resource deprovisioned. Reason: {reason}"),
                    )
                    .await;
            }
            Err(e) => {
                error!(error = %e, "Failed to acquire connection for deprovision");
                return;
            }
        }

        if let Err(e) = self
            .subscriptions
            .notify_deleted(&hp.subscription_id, CallbackApp::Obox)
            .await
        {
            warn!(error = %e, "Failed to notify subscription-service (deleted)");
        }

        info!(provision_id = %abbrev_uuid(&hp.id), "Resource deprovisioned");
    }

    pub async fn get_resource_status(&self, resource_id: Uuid) -> Result<ResourceStatusResponse> {
        let mut conn = self.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
        let mut repo = HostingProvisions::new(&mut conn);

        let hp = repo.get_by_id(resource_id).await?.ok_or_else(|| Error::NotFound {
            resource: "resource".to_string(),
            id: resource_id.to_string(),
        })?;

        Ok(to_status_response(&hp))
    }

    pub async fn get_resources_by_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<Vec<ResourceStatusResponse>> {
        let mut conn = self.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
        let mut repo = HostingProvisions::new(&mut conn);

        let provisions = repo.get_by_subscription_id(subscription_id).await?;
        Ok(provisions.iter().map(to_status_response).collect())
    }

    pub async fn get_logs(
        &self,
        resource_id: Uuid,
        limit: i64,
    ) -> Result<Vec<crate::db::models::provision_logs::ProvisionLog>> {
        let mut conn = self.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
        let mut logs = ProvisionLogs::new(&mut conn);
        Ok(logs.get_by_provision_id(resource_id, limit).await?)
    }

    /// Node status with subscription context, as shown to the user.
    #[instrument(skip(self), err)]
    pub async fn get_user_node_status(&self, user_id: &str) -> Result<UserNodeStatusResponse> {
        let subscription = match self.subscriptions.get_user_hosting_subscription(user_id).await {
            Ok(status) => Some(status),
            Err(e) => {
                warn!(error = %e, "Failed to check hosting subscription");
                None
            }
        };

        let has_active_subscription = subscription.as_ref().is_some_and(|s| s.has_active);
        if !has_active_subscription {
            return Ok(UserNodeStatusResponse {
                hosting_status: HostingState::NoSubscription,
                has_subscription: false,
                subscription: None,
                has_node: false,
                node: None,
                creation_progress: None,
                message: "No active hosting subscription. Please subscribe to create a node."
                    .to_string(),
            });
        }
        let sub = subscription.unwrap_or_default();
        let subscription_info = SubscriptionInfo {
            subscription_id: sub.subscription_id.clone(),
            status: sub.status.clone(),
            plan_tier: sub.plan_tier.clone(),
            expires_at: sub.expires_at.clone(),
            auto_renew: sub.auto_renew,
        };

        let mut conn = self.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
        let mut repo = HostingProvisions::new(&mut conn);
        let hp = repo.get_latest_by_user(user_id).await?;

        let Some(hp) = hp else {
            return Ok(UserNodeStatusResponse {
                hosting_status: HostingState::SubscribedNoNode,
                has_subscription: true,
                subscription: Some(subscription_info),
                has_node: false,
                node: None,
                creation_progress: None,
                message: "You have an active subscription. You can create a node now.".to_string(),
            });
        };

        let region_name = {
            let mut regions = Regions::new(&mut conn);
            match regions.get_by_code(&hp.region).await {
                Ok(Some(region)) => region.name,
                _ => hp.region.clone(),
            }
        };

        let (state, progress, message) = derive_node_state(hp.status);
        let include_node = state != HostingState::SubscribedNoNode;

        Ok(UserNodeStatusResponse {
            hosting_status: state,
            has_subscription: true,
            subscription: Some(subscription_info),
            has_node: include_node,
            node: include_node.then(|| to_user_node_info(&hp, region_name)),
            creation_progress: progress,
            message: message.to_string(),
        })
    }

    pub async fn get_available_regions(&self) -> Result<RegionListResponse> {
        let mut conn = self.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
        let mut repo = Regions::new(&mut conn);

        let regions = repo.get_available().await?;
        Ok(RegionListResponse {
            regions: regions
                .into_iter()
                .map(|r| RegionInfo {
                    code: r.code,
                    name: r.name,
                    provider: r.provider,
                    available: r.available,
                })
                .collect(),
        })
    }

    /// User-initiated node creation. Verifies the subscription, reports
    /// in-progress creation as success, auto-cleans a failed previous attempt
    /// and then provisions fresh.
    #[instrument(skip(self), err)]
    pub async fn create_user_node(&self, user_id: &str, region: &str) -> Result<CreateNodeResult> {
        let sub = match self.subscriptions.get_user_hosting_subscription(user_id).await {
            Ok(sub) => sub,
            Err(e) => {
                warn!(error = %e, "Failed to verify subscription");
                return Ok(CreateNodeResult {
                    success: false,
                    resource_id: None,
                    status: "failed".to_string(),
                    creation_progress: None,
                    message: "Unable to verify subscription status. Please try again later."
                        .to_string(),
                });
            }
        };

        if !sub.has_active {
            return Ok(CreateNodeResult {
                success: false,
                resource_id: None,
                status: "failed".to_string(),
                creation_progress: None,
                message: "No active hosting subscription found. Please subscribe first."
                    .to_string(),
            });
        }

        let existing = {
            let mut conn = self.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
            let mut repo = HostingProvisions::new(&mut conn);
            repo.get_latest_by_user(user_id).await?
        };

        if let Some(existing) = existing {
            match existing.status {
                HostingStatus::Active => {
                    return Ok(CreateNodeResult {
                        success: false,
                        resource_id: None,
                        status: "failed".to_string(),
                        creation_progress: None,
                        message:
                            "You already have an active node. Please delete it first if you want to create a new one."
                                .to_string(),
                    });
                }
                status if status.is_in_progress() => {
                    return Ok(CreateNodeResult {
                        success: true,
                        resource_id: Some(existing.id),
                        status: "creating".to_string(),
                        creation_progress: Some(build_creation_progress(status)),
                        message: "Node is already being created. Please wait.".to_string(),
                    });
                }
                HostingStatus::Failed => {
                    info!(provision_id = %abbrev_uuid(&existing.id), "Auto-cleaning failed node");
                    if let Err(e) = self.cleanup_failed_provision(existing).await {
                        warn!(error = %e, "Failed to clean up failed node");
                    }
                }
                _ => {}
            }
        }

        let request = ProvisionRequest {
            app_source: "obox".to_string(),
            subscription_id: sub.subscription_id.clone(),
            user_id: user_id.to_string(),
            resource_type: "hosting_node".to_string(),
            plan_tier: sub.plan_tier.clone(),
            region: region.to_string(),
            traffic_limit: policy::hosting_traffic_limit(&sub.plan_tier),
            ..Default::default()
        };

        match self.provision(&request).await {
            Ok(response) => Ok(CreateNodeResult {
                success: true,
                resource_id: Some(response.resource_id),
                status: "creating".to_string(),
                creation_progress: Some(build_creation_progress(HostingStatus::Pending)),
                message: "Node creation started. This may take a few minutes.".to_string(),
            }),
            Err(e) => Ok(CreateNodeResult {
                success: false,
                resource_id: None,
                status: "failed".to_string(),
                creation_progress: None,
                message: format!("Failed to start node creation: {}", e.user_message()),
            }),
        }
    }

    /// User-initiated node deletion. Refused while the node is mid-creation.
    #[instrument(skip(self), err)]
    pub async fn delete_user_node(&self, user_id: &str) -> Result<DeleteNodeResult> {
        let sub = match self.subscriptions.get_user_hosting_subscription(user_id).await {
            Ok(sub) => Some(sub),
            Err(e) => {
                warn!(error = %e, "Failed to check subscription");
                None
            }
        };

        let hp = {
            let mut conn = self.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
            let mut repo = HostingProvisions::new(&mut conn);
            repo.get_latest_by_user(user_id).await?
        };

        let Some(hp) = hp else {
            return Ok(DeleteNodeResult {
                success: false,
                message: "No node found to delete.".to_string(),
            });
        };

        if matches!(hp.status, HostingStatus::Creating | HostingStatus::Running) {
            return Ok(DeleteNodeResult {
                success: false,
                message:
                    "Cannot delete node while it's being created. Please wait until creation completes or fails."
                        .to_string(),
            });
        }

        let subscription_id = match &sub {
            Some(s) if s.has_active => s.subscription_id.clone(),
            _ => hp.subscription_id.clone(),
        };

        match self
            .deprovision(&DeprovisionRequest {
                subscription_id,
                resource_id: Some(hp.id),
                reason: "User initiated deletion".to_string(),
            })
            .await
        {
            Ok(_) => Ok(DeleteNodeResult {
                success: true,
                message: "Node deletion started. You can create a new node once deletion is complete."
                    .to_string(),
            }),
            Err(e) => Ok(DeleteNodeResult {
                success: false,
                message: format!("Failed to delete node: {}", e.user_message()),
            }),
        }
    }

    /// The one allowed backward transition: a failed attempt is soft-deleted
    /// (with a best-effort external delete) so the user can retry.
    async fn cleanup_failed_provision(&self, mut hp: HostingProvision) -> Result<()> {
        if let Some(node_id) = hp.hosting_node_id.as_deref() {
            if !node_id.is_empty() {
                if let Err(e) = self.hosting.delete_node(node_id).await {
                    warn!(error = %e, "Failed to delete external node during cleanup");
                }
            }
        }

        hp.status = HostingStatus::Deleted;
        hp.deleted_at = Some(Utc::now());

        let mut conn = self.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
        let mut repo = HostingProvisions::new(&mut conn);
        repo.update(&hp).await?;

        let mut logs = ProvisionLogs::new(&mut conn);
        if let Err(e) = logs
            .log_action(
                hp.id,
                ProvisionType::Hosting,
                "auto_cleanup",
                "deleted",
                "Auto-cleaned failed resource to allow retry",
            )
            .await
        {
            warn!(error = %e, "Failed to write auto_cleanup log");
        }

        Ok(())
    }

    async fn set_status(&self, provision_id: Uuid, status: HostingStatus, error_msg: Option<&str>) {
        match self.db.acquire().await {
            Ok(mut conn) => {
                let mut repo = HostingProvisions::new(&mut conn);
                if let Err(e) = repo.update_status(provision_id, status, error_msg).await {
                    warn!(error = %e, "Failed to update provision status");
                }
            }
            Err(e) => warn!(error = %e, "Failed to acquire connection for status update"),
        }
    }

    /// Common error path: mark failed, log, tell the subscription service.
    /// No automatic retry.
    async fn handle_provision_error(&self, subscription_id: &str, provision_id: Uuid, message: &str) {
        error!(
            provision_id = %abbrev_uuid(&provision_id),
            "Provisioning failed: {message}"
        );

        self.set_status(provision_id, HostingStatus::Failed, Some(message))
            .await;

        if let Ok(mut conn) = self.db.acquire().await {
            let mut logs = ProvisionLogs::new(&mut conn);
            let _ = logs
                .log_action(
                    provision_id,
                    ProvisionType::Hosting,
                    "provision_failed",
                    "failed",
                    message,
                )
                .await;
        }

        if let Err(e) = self
            .subscriptions
            .notify_failed(subscription_id, CallbackApp::Obox, message)
            .await
        {
            warn!(error = %e, "Failed to notify subscription-service (failed)");
        }
    }
}

/// Map a row status to the user-facing state, the creation progress (when
/// mid-creation) and the standard message.
fn derive_node_state(
    status: HostingStatus,
) -> (HostingState, Option<NodeCreationProgress>, &'static str) {
    match status {
        s if s.is_in_progress() => (
            HostingState::NodeCreating,
            Some(build_creation_progress(s)),
            "Node is being created. Please wait...",
        ),
        HostingStatus::Active => (
            HostingState::NodeActive,
            None,
            "Node is active and ready to use.",
        ),
        HostingStatus::Failed => (
            HostingState::NodeFailed,
            None,
            "Node creation failed. You can delete and recreate the node.",
        ),
        _ => (
            HostingState::SubscribedNoNode,
            None,
            "You can create a node now.",
        ),
    }
}

/// 4-step creation progress: payment -> VPS -> install -> ready.
fn build_creation_progress(status: HostingStatus) -> NodeCreationProgress {
    let mut steps = vec![
        NodeCreationStep {
            step: 1,
            name: "Payment confirmed".to_string(),
            status: "completed".to_string(),
        },
        NodeCreationStep {
            step: 2,
            name: "VPS creating".to_string(),
            status: "pending".to_string(),
        },
        NodeCreationStep {
            step: 3,
            name: "Installing sing-box".to_string(),
            status: "pending".to_string(),
        },
        NodeCreationStep {
            step: 4,
            name: "Node ready".to_string(),
            status: "pending".to_string(),
        },
    ];

    let (current_step, step_name) = match status {
        HostingStatus::Pending => (1, "Payment confirmed"),
        HostingStatus::Creating => {
            steps[1].status = "in_progress".to_string();
            (2, "VPS creating")
        }
        HostingStatus::Running => {
            steps[1].status = "completed".to_string();
            (2, "VPS created")
        }
        HostingStatus::Installing => {
            steps[1].status = "completed".to_string();
            steps[2].status = "in_progress".to_string();
            (3, "Installing sing-box")
        }
        HostingStatus::Active => {
            for step in &mut steps {
                step.status = "completed".to_string();
            }
            (4, "Node ready")
        }
        _ => (1, "Payment confirmed"),
    };

    NodeCreationProgress {
        current_step,
        total_steps: 4,
        step_name: step_name.to_string(),
        steps,
    }
}

fn to_user_node_info(hp: &HostingProvision, region_name: String) -> UserNodeInfo {
    let (limit_gb, used_gb, percent) = traffic_stats(hp.traffic_limit, hp.traffic_used);
    UserNodeInfo {
        resource_id: hp.id,
        region: hp.region.clone(),
        region_name,
        status: hp.status.to_string(),
        public_ip: hp.public_ip.clone(),
        api_port: hp.api_port,
        api_key: hp.api_key.clone(),
        vless_port: hp.vless_port,
        ss_port: hp.ss_port,
        public_key: hp.public_key.clone(),
        short_id: hp.short_id.clone(),
        plan_tier: hp.plan_tier.clone(),
        traffic_limit_gb: limit_gb,
        traffic_used_gb: used_gb,
        traffic_percent: percent,
        created_at: hp.created_at.to_rfc3339(),
    }
}

fn to_status_response(hp: &HostingProvision) -> ResourceStatusResponse {
    let (limit_gb, used_gb, percent) = traffic_stats(hp.traffic_limit, hp.traffic_used);
    ResourceStatusResponse {
        resource_id: hp.id,
        subscription_id: hp.subscription_id.clone(),
        user_id: hp.user_id.clone(),
        resource_type: "hosting_node".to_string(),
        provider: hp.provider.clone(),
        region: hp.region.clone(),
        status: hp.status.to_string(),
        public_ip: hp.public_ip.clone(),
        api_port: hp.api_port,
        api_key: hp.api_key.clone(),
        vless_port: hp.vless_port,
        ss_port: hp.ss_port,
        public_key: hp.public_key.clone(),
        short_id: hp.short_id.clone(),
        plan_tier: hp.plan_tier.clone(),
        traffic_limit_gb: limit_gb,
        traffic_used_gb: used_gb,
        traffic_percent: percent,
        ready_at: hp.ready_at.map(|t| t.to_rfc3339()),
        created_at: hp.created_at.to_rfc3339(),
        error_message: hp.error_message.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_node_state_table() {
        for status in [
            HostingStatus::Pending,
            HostingStatus::Creating,
            HostingStatus::Running,
            HostingStatus::Installing,
        ] {
            let (state, progress, _) = derive_node_state(status);
            assert_eq!(state, HostingState::NodeCreating, "{status} should be creating");
            assert!(progress.is_some());
        }

        let (state, progress, _) = derive_node_state(HostingStatus::Active);
        assert_eq!(state, HostingState::NodeActive);
        assert!(progress.is_none());

        let (state, _, _) = derive_node_state(HostingStatus::Failed);
        assert_eq!(state, HostingState::NodeFailed);

        for status in [HostingStatus::Stopping, HostingStatus::Stopped, HostingStatus::Deleted] {
            let (state, _, _) = derive_node_state(status);
            assert_eq!(state, HostingState::SubscribedNoNode);
        }
    }

    #[test]
    fn test_creation_progress_steps() {
        let progress = build_creation_progress(HostingStatus::Pending);
        assert_eq!(progress.current_step, 1);
        assert_eq!(progress.total_steps, 4);
        assert_eq!(progress.steps[0].status, "completed");
        assert_eq!(progress.steps[1].status, "pending");

        let progress = build_creation_progress(HostingStatus::Creating);
        assert_eq!(progress.current_step, 2);
        assert_eq!(progress.steps[1].status, "in_progress");

        let progress = build_creation_progress(HostingStatus::Installing);
        assert_eq!(progress.current_step, 3);
        assert_eq!(progress.steps[1].status, "completed");
        assert_eq!(progress.steps[2].status, "in_progress");

        let progress = build_creation_progress(HostingStatus::Active);
        assert_eq!(progress.current_step, 4);
        assert!(progress.steps.iter().all(|s| s.status == "completed"));
    }
}
