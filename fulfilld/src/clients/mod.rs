//! Outbound HTTP clients for the external collaborators: the hosting
//! provider's admin API, the VPN manager, and the subscription service.

mod hosting;
mod otun;
mod subscription;

pub use hosting::{CreateNodeRequest, CreateNodeResponse, HostingClient, NodeInfo};
pub use otun::{
    CreateVpnUserRequest, OtunClient, Protocol, SubscribeConfig, SubscribeRequest,
    UpdateVpnUserFields, VpnUserInfo,
};
pub use subscription::{
    CallbackApp, CallbackStatus, SubscriptionClient, SubscriptionStatus,
};

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("resource not found")]
    NotFound,

    /// Non-success response with a body excerpt for diagnostics.
    #[error("{service} returned status {status}: {body}")]
    UnexpectedStatus {
        service: &'static str,
        status: u16,
        body: String,
    },

    /// The provider reported the node creation as failed.
    #[error("node creation failed: {message}")]
    NodeFailed { message: String },

    /// The node disappeared while we were waiting for it.
    #[error("node was deleted")]
    NodeDeleted,

    /// The ready-wait deadline was exhausted with the node still pending.
    #[error("timed out after {0:?} waiting for node to become ready")]
    ReadyTimeout(Duration),

    #[error(transparent)]
    Transport(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, ClientError>;
