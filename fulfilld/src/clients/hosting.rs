//! Client for the hosting provider's admin API (VPS node lifecycle).

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{ClientError, Result};
use crate::types::body_excerpt;

const SERVICE: &str = "hosting-service";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const POLL_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct HostingClient {
    base_url: String,
    admin_key: String,
    http: reqwest::Client,
    poll_interval: Duration,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateNodeRequest<'a> {
    pub cloud_provider: &'a str,
    pub region: &'a str,
    pub bundle_id: &'a str,
    pub subscription_id: &'a str,
    pub user_id: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateNodeResponse {
    pub node_id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeInfo {
    pub node_id: String,
    #[serde(default)]
    pub public_ip: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub node_api_key: String,
    #[serde(default)]
    pub vless_port: i32,
    #[serde(default)]
    pub ss_port: i32,
    #[serde(default)]
    pub public_key: String,
    #[serde(default)]
    pub short_id: String,
    #[serde(default)]
    pub error_message: String,
}

impl HostingClient {
    pub fn new(base_url: impl Into<String>, admin_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            admin_key: admin_key.into(),
            http: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .expect("failed to build hosting HTTP client"),
            poll_interval: POLL_INTERVAL,
        }
    }

    #[cfg(test)]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Submit a node creation request; returns once the provider accepts it.
    pub async fn create_node(
        &self,
        request: &CreateNodeRequest<'_>,
    ) -> Result<CreateNodeResponse> {
        info!(
            provider = request.cloud_provider,
            region = request.region,
            bundle = request.bundle_id,
            "Creating node"
        );

        let response = self
            .http
            .post(format!("{}/api/admin/nodes", self.base_url))
            .header("X-Admin-Key", &self.admin_key)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ClientError::UnexpectedStatus {
                service: SERVICE,
                status: status.as_u16(),
                body: body_excerpt(&body),
            });
        }

        let created: CreateNodeResponse =
            serde_json::from_str(&body).map_err(|e| ClientError::UnexpectedStatus {
                service: SERVICE,
                status: status.as_u16(),
                body: format!("decode response: {e}"),
            })?;

        info!(node_id = %created.node_id, status = %created.status, "Node created");
        Ok(created)
    }

    pub async fn get_node(&self, node_id: &str) -> Result<NodeInfo> {
        let response = self
            .http
            .get(format!("{}/api/admin/nodes/{node_id}", self.base_url))
            .header("X-Admin-Key", &self.admin_key)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ClientError::NotFound);
        }

        let body = response.text().await?;
        if !status.is_success() {
            return Err(ClientError::UnexpectedStatus {
                service: SERVICE,
                status: status.as_u16(),
                body: body_excerpt(&body),
            });
        }

        serde_json::from_str(&body).map_err(|e| ClientError::UnexpectedStatus {
            service: SERVICE,
            status: status.as_u16(),
            body: format!("decode response: {e}"),
        })
    }

    /// Best-effort, idempotent delete.
    pub async fn delete_node(&self, node_id: &str) -> Result<()> {
        info!(node_id, "Deleting node");

        let response = self
            .http
            .delete(format!("{}/api/admin/nodes/{node_id}", self.base_url))
            .header("X-Admin-Key", &self.admin_key)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() && status != reqwest::StatusCode::NOT_FOUND {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::UnexpectedStatus {
                service: SERVICE,
                status: status.as_u16(),
                body: body_excerpt(&body),
            });
        }

        Ok(())
    }

    /// Poll until the node is active, the provider reports it failed or
    /// deleted, or `max_wait` elapses. Transient poll errors are logged and
    /// retried at the next interval.
    pub async fn wait_for_node_ready(&self, node_id: &str, max_wait: Duration) -> Result<NodeInfo> {
        info!(node_id, ?max_wait, "Waiting for node to become ready");

        let deadline = tokio::time::Instant::now() + max_wait;

        loop {
            if tokio::time::Instant::now() >= deadline {
                return Err(ClientError::ReadyTimeout(max_wait));
            }

            match self.get_node(node_id).await {
                Ok(node) => match node.status.as_str() {
                    "active" => return Ok(node),
                    "failed" => {
                        return Err(ClientError::NodeFailed {
                            message: node.error_message,
                        })
                    }
                    "deleted" => return Err(ClientError::NodeDeleted),
                    other => {
                        tracing::debug!(node_id, status = other, "Node not ready yet");
                    }
                },
                Err(e) => {
                    // transient: keep polling until the deadline
                    warn!(node_id, error = %e, "Error polling node status, will retry");
                }
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> HostingClient {
        HostingClient::new(server.uri(), "test-admin-key")
            .with_poll_interval(Duration::from_millis(10))
    }

    #[tokio::test]
    async fn test_create_node_sends_admin_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/admin/nodes"))
            .and(header("X-Admin-Key", "test-admin-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "node_id": "node_42",
                "status": "creating",
                "message": "accepted"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let response = client(&server)
            .create_node(&CreateNodeRequest {
                cloud_provider: "lightsail",
                region: "us-east-1",
                bundle_id: "micro_3_0",
                subscription_id: "s1",
                user_id: "u9",
            })
            .await
            .unwrap();

        assert_eq!(response.node_id, "node_42");
        assert_eq!(response.status, "creating");
    }

    #[tokio::test]
    async fn test_create_node_error_carries_status_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("capacity exhausted"))
            .mount(&server)
            .await;

        let err = client(&server)
            .create_node(&CreateNodeRequest {
                cloud_provider: "lightsail",
                region: "us-east-1",
                bundle_id: "nano_3_0",
                subscription_id: "s1",
                user_id: "u9",
            })
            .await
            .unwrap_err();

        match err {
            ClientError::UnexpectedStatus { status, body, .. } => {
                assert_eq!(status, 500);
                assert!(body.contains("capacity exhausted"));
            }
            other => panic!("expected UnexpectedStatus, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_get_node_404_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = client(&server).get_node("missing").await.unwrap_err();
        assert!(matches!(err, ClientError::NotFound));
    }

    #[tokio::test]
    async fn test_delete_node_tolerates_404() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        assert!(client(&server).delete_node("gone").await.is_ok());
    }

    #[tokio::test]
    async fn test_wait_for_node_ready_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/admin/nodes/node_42"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "node_id": "node_42",
                "public_ip": "1.2.3.4",
                "status": "active",
                "vless_port": 443,
                "ss_port": 8388
            })))
            .mount(&server)
            .await;

        let node = client(&server)
            .wait_for_node_ready("node_42", Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(node.public_ip, "1.2.3.4");
    }

    #[tokio::test]
    async fn test_wait_for_node_ready_polls_past_creating() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "node_id": "node_42",
                "status": "creating"
            })))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "node_id": "node_42",
                "public_ip": "1.2.3.4",
                "status": "active"
            })))
            .mount(&server)
            .await;

        let node = client(&server)
            .wait_for_node_ready("node_42", Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(node.status, "active");
    }

    #[tokio::test]
    async fn test_wait_for_node_ready_provider_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "node_id": "node_42",
                "status": "failed",
                "error_message": "instance quota exceeded"
            })))
            .mount(&server)
            .await;

        let err = client(&server)
            .wait_for_node_ready("node_42", Duration::from_secs(5))
            .await
            .unwrap_err();

        match err {
            ClientError::NodeFailed { message } => {
                assert_eq!(message, "instance quota exceeded");
            }
            other => panic!("expected NodeFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_wait_for_node_ready_times_out_while_creating() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "node_id": "node_42",
                "status": "creating"
            })))
            .mount(&server)
            .await;

        let err = client(&server)
            .wait_for_node_ready("node_42", Duration::from_millis(50))
            .await
            .unwrap_err();

        assert!(matches!(err, ClientError::ReadyTimeout(_)));
    }

    #[tokio::test]
    async fn test_wait_for_node_ready_tolerates_transient_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500).set_body_string("flaky"))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "node_id": "node_42",
                "status": "active"
            })))
            .mount(&server)
            .await;

        let node = client(&server)
            .wait_for_node_ready("node_42", Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(node.status, "active");
    }
}
