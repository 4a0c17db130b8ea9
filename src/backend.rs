/// reqwest client for the `/unblind` HTTP surface
pub mod http;

use anyhow::Result;
use async_trait::async_trait;
pub use http::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::render::RenderMode;

/// Identity issued by the signup endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupResponse {
    pub user_id: String,
    /// Linking code for the secondary channel, as an image or link
    pub qr_code: String,
    pub bot_link: String,
}

/// Full per-user record, including the still-valid linking code.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    pub user_id: String,
    pub qr_code: String,
    pub bot_link: String,
    #[serde(default)]
    pub tg_linked: bool,
}

/// Linking status only.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserState {
    pub tg_linked: bool,
}

/// Request/response contract of the attestation backend.
///
/// Every call is a single round trip. Implementations must not retry
/// internally; retry policy belongs to the caller.
#[async_trait]
pub trait UnblindApi: Send + Sync {
    /// Renders base64 `data` into an SVG document on the server.
    async fn render_qr(&self, data: &str, mode: RenderMode) -> Result<String>;

    /// Creates a fresh, unlinked user.
    async fn signup(&self) -> Result<SignupResponse>;

    async fn user_info(&self, user_id: &str) -> Result<UserInfo>;

    async fn user_state(&self, user_id: &str) -> Result<UserState>;

    /// Hex digest of a message being signed.
    async fn message_hash(&self, message: &Value) -> Result<String>;

    /// Hex digest of a transaction's fields.
    async fn transaction_hash(&self, transaction: &Value) -> Result<String>;

    /// Telemetry upload of a transaction plus the current user id.
    async fn upload_transaction(&self, upload: &Value) -> Result<()>;

    /// Telemetry upload of a signature request plus the current user id.
    async fn upload_message(&self, upload: &Value) -> Result<()>;
}
