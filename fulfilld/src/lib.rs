//! # fulfilld: fulfillment orchestrator
//!
//! `fulfilld` sits between the subscription/billing service and two external
//! resource providers: a hosting service that creates VPS nodes and installs
//! the networking daemon, and the VPN manager (otun-manager) that owns VPN
//! user accounts. For each subscription event it drives a provisioning
//! workflow (creating external resources, polling for readiness, persisting
//! the result, posting status callbacks) and serves lifecycle queries and
//! user-facing status APIs on top.
//!
//! ## Architecture
//!
//! The HTTP layer is [Axum](https://github.com/tokio-rs/axum); persistence is
//! PostgreSQL via sqlx. Three route zones exist with different auth:
//!
//! - `/api/internal/*`: subscription-service and user-portal calls,
//!   authenticated by the `X-Internal-Secret` header;
//! - `/api/callback/*`: node-agent ready/failed callbacks, same secret;
//! - `/api/v1/*`: end-user APIs behind a bearer JWT, rate limited per user;
//!   plus an unauthenticated `/api/v1/public/*` slice.
//!
//! Hosting provisioning is asynchronous: the handler writes a `pending` row
//! and returns, while a detached task drives the external provider and walks
//! the row through `creating` to `active` or `failed`. Those tasks live on a
//! [`tokio_util::task::TaskTracker`], and shutdown drains them for up to 30
//! seconds after the listener closes. VPN provisioning completes within the
//! request.

pub mod api;
pub mod auth;
pub mod clients;
pub mod config;
mod crypto;
pub mod db;
pub mod errors;
pub mod limits;
pub mod provisioner;
pub mod telemetry;
pub mod types;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use bon::Builder;
use sqlx::PgPool;
use tokio::net::TcpListener;
use tokio_util::task::TaskTracker;
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{info, Level};

pub use config::Config;

use crate::clients::{HostingClient, OtunClient, SubscriptionClient};
use crate::limits::Limiters;
use crate::provisioner::{EntitlementEngine, HostingProvisioner, VpnProvisioner};

/// Shared state for all request handlers.
#[derive(Clone, Builder)]
pub struct AppState {
    pub db: PgPool,
    pub config: Arc<Config>,
    pub hosting: HostingProvisioner,
    pub vpn: VpnProvisioner,
    pub entitlements: EntitlementEngine,
    pub limiters: Arc<Limiters>,
}

/// Wire up clients, provisioners and shared state from a connected pool.
pub fn build_state(config: Config, db: PgPool, tasks: TaskTracker) -> AppState {
    let config = Arc::new(config);

    let hosting_client = HostingClient::new(
        config.hosting.service_url.clone(),
        config.hosting.admin_key.clone(),
    );
    let otun_client = OtunClient::new(config.services.otun_manager_url.clone());
    let subscription_client = SubscriptionClient::new(
        config.services.subscription_service_url.clone(),
        config.internal_secret.clone(),
    );

    let hosting = HostingProvisioner::new(
        db.clone(),
        config.clone(),
        hosting_client,
        subscription_client.clone(),
        tasks,
    );
    let vpn = VpnProvisioner::new(
        db.clone(),
        config.clone(),
        otun_client.clone(),
        subscription_client,
    );
    let entitlements = EntitlementEngine::new(db.clone(), config.clone(), otun_client);

    AppState::builder()
        .db(db)
        .config(config)
        .hosting(hosting)
        .vpn(vpn)
        .entitlements(entitlements)
        .limiters(Arc::new(Limiters::default()))
        .build()
}

/// Build the full application router.
pub fn build_router(state: AppState) -> Router {
    use api::handlers::{callbacks, db_admin, internal, user};

    let internal_routes = Router::new()
        .route("/provision", post(internal::provision))
        .route("/deprovision", post(internal::deprovision))
        .route("/resources/{id}", get(internal::get_resource_status))
        .route("/resources/{id}/logs", get(internal::get_resource_logs))
        .route("/resources/{id}/vpn", put(internal::update_vpn_resource))
        .route(
            "/subscriptions/{subscription_id}/resources",
            get(internal::get_resources_by_subscription),
        )
        .route("/users/{user_id}/resources", get(internal::get_user_resources))
        .route("/vpn/user/{user_id}/subscribe", get(internal::get_user_vpn_subscribe))
        .route(
            "/vpn/user/{user_id}/quick-status",
            get(internal::get_user_vpn_quick_status),
        )
        .route("/entitlements/gift", post(internal::gift_entitlement))
        .route("/entitlements", get(internal::list_entitlements))
        .route("/admin/regions", put(internal::upsert_region))
        .route("/admin/db/tables", get(db_admin::list_tables))
        .route("/admin/db/tables/{table}/schema", get(db_admin::get_table_schema))
        .route("/admin/db/tables/{table}/rows", get(db_admin::query_rows))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::internal_auth_middleware,
        ));

    let callback_routes = Router::new()
        .route("/node/ready", post(callbacks::node_ready))
        .route("/node/failed", post(callbacks::node_failed))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::internal_auth_middleware,
        ));

    let user_routes = Router::new()
        .route(
            "/my/node",
            get(user::get_my_node)
                .post(user::create_my_node)
                .delete(user::delete_my_node),
        )
        .route("/my/vpn", get(user::get_my_vpn))
        .route("/my/vpn/subscribe", get(user::get_my_vpn_subscribe))
        .route("/my/trial/status", get(user::get_my_trial_status))
        .route("/my/trial/activate", post(user::activate_my_trial))
        .route("/regions", get(user::get_regions))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::jwt_auth_middleware,
        ));

    let public_routes = Router::new()
        .route("/regions", get(user::get_regions))
        .route("/trial/config", get(user::get_trial_config));

    Router::new()
        .route(
            "/health",
            get(|| async { axum::Json(serde_json::json!({ "status": "ok", "service": "fulfilld" })) }),
        )
        .nest("/api/internal", internal_routes)
        .nest("/api/callback", callback_routes)
        .nest("/api/v1/public", public_routes)
        .nest("/api/v1", user_routes)
        .with_state(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
}

/// Connect, serve, and shut down gracefully on SIGINT/SIGTERM. Returns an
/// error (and therefore a non-zero exit) on bind or database failure.
pub async fn run(config: Config) -> anyhow::Result<()> {
    config.validate()?;

    let db = db::connect(&config.database).await?;

    let tasks = TaskTracker::new();
    let port = config.server.port;
    let state = build_state(config, db, tasks.clone());
    let router = build_router(state);

    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "Server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // in-flight provisioning tasks get a drain window before we exit
    tasks.close();
    info!("Waiting for background tasks to finish");
    if tokio::time::timeout(Duration::from_secs(30), tasks.wait())
        .await
        .is_err()
    {
        tracing::warn!("Background tasks did not finish within drain window");
    }

    info!("Server exited");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn test_state() -> AppState {
        let mut config = Config::default();
        config.jwt.secret_key = "0123456789abcdef0123456789abcdef".to_string();
        config.internal_secret = "fedcba9876543210fedcba9876543210".to_string();

        // lazy pool: no database needed for routes that reject before DB access
        let db = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy(&config.database.url())
            .expect("lazy pool");

        build_state(config, db, TaskTracker::new())
    }

    #[tokio::test]
    async fn test_health() {
        let router = build_router(test_state());
        let response = router
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_user_routes_require_jwt() {
        let router = build_router(test_state());
        let response = router
            .oneshot(Request::get("/api/v1/my/node").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_user_routes_reject_malformed_bearer() {
        let router = build_router(test_state());
        let response = router
            .oneshot(
                Request::get("/api/v1/my/vpn")
                    .header("Authorization", "Token abc")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_internal_routes_require_secret() {
        let router = build_router(test_state());
        let response = router
            .oneshot(
                Request::post("/api/internal/provision")
                    .header("Content-Type", "application/json")
                    .body(Body::from(r#"{"user_id":"u1"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_internal_routes_reject_wrong_secret() {
        let router = build_router(test_state());
        let response = router
            .oneshot(
                Request::post("/api/callback/node/ready")
                    .header("X-Internal-Secret", "wrong")
                    .header("Content-Type", "application/json")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_public_trial_config_needs_no_auth() {
        let router = build_router(test_state());
        let response = router
            .oneshot(
                Request::get("/api/v1/public/trial/config")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
