//! Client for the VPN manager (otun-manager) user API.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::{ClientError, Result};
use crate::types::body_excerpt;

const SERVICE: &str = "otun-manager";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct OtunClient {
    base_url: String,
    http: reqwest::Client,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateVpnUserRequest {
    pub uuid: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub email: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub auth_user_id: String,
    pub protocols: Vec<String>,
    pub ss_password: String,
    pub traffic_limit: i64,
    pub expire_at: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub service_tier: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VpnUserInfo {
    pub uuid: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub protocols: Vec<String>,
    #[serde(default)]
    pub traffic_limit: i64,
    #[serde(default)]
    pub traffic_used: i64,
    #[serde(default)]
    pub expire_at: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub primary_node_id: Option<String>,
    #[serde(default)]
    pub backup_node_id: Option<String>,
}

/// Sparse update: only fields that are `Some` are sent.
#[derive(Debug, Clone, Default, Serialize)]
pub struct UpdateVpnUserFields {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub traffic_limit: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub traffic_used: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expire_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubscribeRequest<'a> {
    pub device_id: &'a str,
    pub traffic_gb: i64,
    pub days_valid: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubscribeConfig {
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub traffic_limit: i64,
    #[serde(default)]
    pub traffic_used: i64,
    #[serde(default)]
    pub expire_at: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub protocols: Vec<Protocol>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Protocol {
    pub protocol: String,
    pub url: String,
    #[serde(default)]
    pub node: String,
}

impl OtunClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            http: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .expect("failed to build otun HTTP client"),
        }
    }

    pub async fn create_user(&self, request: &CreateVpnUserRequest) -> Result<VpnUserInfo> {
        info!(uuid = %request.uuid, "Creating VPN user");

        let response = self
            .http
            .post(format!("{}/api/users", self.base_url))
            .json(request)
            .send()
            .await?;

        let user: VpnUserInfo = decode(response, &[200, 201]).await?;
        info!(uuid = %user.uuid, "VPN user created");
        Ok(user)
    }

    pub async fn get_user(&self, uuid: &str) -> Result<VpnUserInfo> {
        let response = self
            .http
            .get(format!("{}/api/users/{uuid}", self.base_url))
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(ClientError::NotFound);
        }
        decode(response, &[200]).await
    }

    pub async fn update_user(&self, uuid: &str, fields: &UpdateVpnUserFields) -> Result<()> {
        info!(uuid, "Updating VPN user");

        let response = self
            .http
            .put(format!("{}/api/users/{uuid}", self.base_url))
            .json(fields)
            .send()
            .await?;

        expect_success(response, &[200]).await
    }

    pub async fn disable_user(&self, uuid: &str) -> Result<()> {
        self.update_user(
            uuid,
            &UpdateVpnUserFields {
                enabled: Some(false),
                ..Default::default()
            },
        )
        .await
    }

    pub async fn enable_user(&self, uuid: &str) -> Result<()> {
        self.update_user(
            uuid,
            &UpdateVpnUserFields {
                enabled: Some(true),
                ..Default::default()
            },
        )
        .await
    }

    pub async fn delete_user(&self, uuid: &str) -> Result<()> {
        info!(uuid, "Deleting VPN user");

        let response = self
            .http
            .delete(format!("{}/api/users/{uuid}", self.base_url))
            .send()
            .await?;

        expect_success(response, &[200, 204]).await
    }

    pub async fn get_subscribe_config(&self, request: &SubscribeRequest<'_>) -> Result<SubscribeConfig> {
        let response = self
            .http
            .post(format!("{}/api/subscribe", self.base_url))
            .json(request)
            .send()
            .await?;

        decode(response, &[200]).await
    }

    /// Refresh live traffic / expiry / protocol state for a user.
    pub async fn sync_user(&self, uuid: &str) -> Result<SubscribeConfig> {
        let response = self
            .http
            .get(format!("{}/api/users/{uuid}/stats", self.base_url))
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(ClientError::NotFound);
        }
        decode(response, &[200]).await
    }
}

async fn decode<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
    ok_statuses: &[u16],
) -> Result<T> {
    let status = response.status();
    let body = response.text().await?;

    if !ok_statuses.contains(&status.as_u16()) {
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

async fn expect_success(response: reqwest::Response, ok_statuses: &[u16]) -> Result<()> {
    let status = response.status();
    if !ok_statuses.contains(&status.as_u16()) {
        let body = response.text().await.unwrap_or_default();
        return Err(ClientError::UnexpectedStatus {
            service: SERVICE,
            status: status.as_u16(),
            body: body_excerpt(&body),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_create_user() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/users"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "uuid": "otun-u1",
                "traffic_limit": 1073741824i64,
                "enabled": true,
                "expire_at": "2026-09-01T00:00:00Z"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let user = OtunClient::new(server.uri())
            .create_user(&CreateVpnUserRequest {
                uuid: "otun-u1".to_string(),
                email: String::new(),
                auth_user_id: "u1".to_string(),
                protocols: vec!["vless".to_string(), "shadowsocks".to_string()],
                ss_password: "deadbeefdeadbeef".to_string(),
                traffic_limit: 1073741824,
                expire_at: "2026-09-01T00:00:00Z".to_string(),
                service_tier: "standard".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(user.uuid, "otun-u1");
        assert!(user.enabled);
    }

    #[tokio::test]
    async fn test_get_user_404_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = OtunClient::new(server.uri()).get_user("missing").await.unwrap_err();
        assert!(matches!(err, ClientError::NotFound));
    }

    #[tokio::test]
    async fn test_update_user_is_sparse() {
        let server = MockServer::start().await;
        // only the fields that were set may appear in the payload
        Mock::given(method("PUT"))
            .and(path("/api/users/otun-u1"))
            .and(body_json(json!({ "enabled": false })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        OtunClient::new(server.uri())
            .disable_user("otun-u1")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_error_carries_body_excerpt() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(422).set_body_string("invalid expire_at"))
            .mount(&server)
            .await;

        let err = OtunClient::new(server.uri())
            .update_user(
                "otun-u1",
                &UpdateVpnUserFields {
                    expire_at: Some("not-a-date".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();

        match err {
            ClientError::UnexpectedStatus { status, body, .. } => {
                assert_eq!(status, 422);
                assert!(body.contains("invalid expire_at"));
            }
            other => panic!("expected UnexpectedStatus, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_get_subscribe_config() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/subscribe"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "uuid": "otun-u1",
                "traffic_limit": 214748364800i64,
                "traffic_used": 1024,
                "expire_at": "2026-09-01T00:00:00Z",
                "enabled": true,
                "protocols": [
                    {"protocol": "vless", "url": "vless://...", "node": "primary"},
                    {"protocol": "shadowsocks", "url": "ss://...", "node": "backup"}
                ]
            })))
            .mount(&server)
            .await;

        let config = OtunClient::new(server.uri())
            .get_subscribe_config(&SubscribeRequest {
                device_id: "u1",
                traffic_gb: 200,
                days_valid: 30,
            })
            .await
            .unwrap();

        assert_eq!(config.protocols.len(), 2);
        assert_eq!(config.protocols[0].protocol, "vless");
    }
}
