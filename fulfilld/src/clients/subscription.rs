//! Client for the subscription service: active-subscription queries and
//! fulfillment status callbacks.
//!
//! Callbacks use the minimal payload shape `{subscription_id, app, status,
//! error?, message?}`. Node configuration is never pushed through a callback;
//! the subscription service reads it back via the resource status endpoint.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::{ClientError, Result};
use crate::types::body_excerpt;

const SERVICE: &str = "subscription-service";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct SubscriptionClient {
    base_url: String,
    internal_secret: String,
    http: reqwest::Client,
}

/// Which application a callback or query concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallbackApp {
    /// Hosting nodes
    Obox,
    /// VPN accounts
    Otun,
}

impl CallbackApp {
    fn as_str(&self) -> &'static str {
        match self {
            CallbackApp::Obox => "obox",
            CallbackApp::Otun => "otun",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallbackStatus {
    Creating,
    Active,
    Failed,
    Deleted,
}

#[derive(Debug, Clone, Serialize)]
struct FulfillmentCallback<'a> {
    subscription_id: &'a str,
    app: CallbackApp,
    status: CallbackStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'a str>,
}

/// A user's active subscription for one app/service pair, or the explicit
/// absence of one.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubscriptionStatus {
    #[serde(default)]
    pub has_active: bool,
    #[serde(default)]
    pub subscription_id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub plan_tier: String,
    #[serde(default)]
    pub expires_at: String,
    #[serde(default)]
    pub auto_renew: bool,
}

impl SubscriptionClient {
    pub fn new(base_url: impl Into<String>, internal_secret: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            internal_secret: internal_secret.into(),
            http: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .expect("failed to build subscription HTTP client"),
        }
    }

    async fn notify(
        &self,
        subscription_id: &str,
        app: CallbackApp,
        status: CallbackStatus,
        error: Option<&str>,
        message: Option<&str>,
    ) -> Result<()> {
        let callback = FulfillmentCallback {
            subscription_id,
            app,
            status,
            error,
            message,
        };

        let response = self
            .http
            .post(format!("{}/api/internal/fulfillment/callback", self.base_url))
            .header("X-Internal-Secret", &self.internal_secret)
            .json(&callback)
            .send()
            .await?;

        let http_status = response.status();
        if http_status.as_u16() >= 400 {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::UnexpectedStatus {
                service: SERVICE,
                status: http_status.as_u16(),
                body: body_excerpt(&body),
            });
        }

        Ok(())
    }

    pub async fn notify_provisioning_started(
        &self,
        subscription_id: &str,
        app: CallbackApp,
    ) -> Result<()> {
        self.notify(subscription_id, app, CallbackStatus::Creating, None, None)
            .await
    }

    pub async fn notify_active(
        &self,
        subscription_id: &str,
        app: CallbackApp,
        message: Option<&str>,
    ) -> Result<()> {
        self.notify(subscription_id, app, CallbackStatus::Active, None, message)
            .await
    }

    pub async fn notify_failed(
        &self,
        subscription_id: &str,
        app: CallbackApp,
        error: &str,
    ) -> Result<()> {
        self.notify(subscription_id, app, CallbackStatus::Failed, Some(error), None)
            .await
    }

    pub async fn notify_deleted(&self, subscription_id: &str, app: CallbackApp) -> Result<()> {
        self.notify(subscription_id, app, CallbackStatus::Deleted, None, None)
            .await
    }

    pub async fn get_user_hosting_subscription(&self, user_id: &str) -> Result<SubscriptionStatus> {
        self.get_user_subscription(user_id, CallbackApp::Obox, "hosting")
            .await
    }

    pub async fn get_user_vpn_subscription(&self, user_id: &str) -> Result<SubscriptionStatus> {
        self.get_user_subscription(user_id, CallbackApp::Otun, "vpn").await
    }

    /// 404 from the subscription service means "no active subscription", not
    /// an error.
    async fn get_user_subscription(
        &self,
        user_id: &str,
        app: CallbackApp,
        service_type: &str,
    ) -> Result<SubscriptionStatus> {
        let response = self
            .http
            .get(format!(
                "{}/api/internal/users/{user_id}/active/{}/{service_type}",
                self.base_url,
                app.as_str()
            ))
            .header("X-Internal-Secret", &self.internal_secret)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(SubscriptionStatus::default());
        }

        let body = response.text().await?;
        if status.as_u16() >= 400 {
            return Err(ClientError::UnexpectedStatus {
                service: SERVICE,
                status: status.as_u16(),
                body: body_excerpt(&body),
            });
        }

        let mut parsed: SubscriptionStatus =
            serde_json::from_str(&body).map_err(|e| ClientError::UnexpectedStatus {
                service: SERVICE,
                status: status.as_u16(),
                body: format!("decode response: {e}"),
            })?;
        parsed.has_active = true;

        info!(app = app.as_str(), "Active subscription found");
        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_callback_payload_and_secret() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/internal/fulfillment/callback"))
            .and(header("X-Internal-Secret", "secret-value"))
            .and(body_partial_json(json!({
                "subscription_id": "s1",
                "app": "obox",
                "status": "active"
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        SubscriptionClient::new(server.uri(), "secret-value")
            .notify_active("s1", CallbackApp::Obox, None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_failed_callback_carries_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({
                "status": "failed",
                "error": "create node: capacity exhausted"
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        SubscriptionClient::new(server.uri(), "s")
            .notify_failed("s1", CallbackApp::Obox, "create node: capacity exhausted")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_subscription_query_404_means_no_active() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let status = SubscriptionClient::new(server.uri(), "s")
            .get_user_hosting_subscription("u1")
            .await
            .unwrap();

        assert!(!status.has_active);
    }

    #[tokio::test]
    async fn test_subscription_query_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/internal/users/u1/active/otun/vpn"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "subscription_id": "s1",
                "status": "active",
                "plan_tier": "premium",
                "auto_renew": true
            })))
            .mount(&server)
            .await;

        let status = SubscriptionClient::new(server.uri(), "s")
            .get_user_vpn_subscription("u1")
            .await
            .unwrap();

        assert!(status.has_active);
        assert_eq!(status.subscription_id, "s1");
        assert_eq!(status.plan_tier, "premium");
    }

    #[tokio::test]
    async fn test_callback_5xx_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let err = SubscriptionClient::new(server.uri(), "s")
            .notify_deleted("s1", CallbackApp::Otun)
            .await
            .unwrap_err();

        assert!(matches!(err, ClientError::UnexpectedStatus { status: 502, .. }));
    }
}
