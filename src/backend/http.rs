use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{json, Value};

use crate::{
    backend::{SignupResponse, UnblindApi, UserInfo, UserState},
    codec::CompressedBlob,
    config::Config,
    render::RenderMode,
};

/// Backend client speaking JSON over HTTP.
#[derive(Clone, Debug)]
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Serialize, Debug)]
struct RenderRequest<'a> {
    data: &'a str,
    #[serde(rename = "type")]
    mode: u8,
    encoding: &'static str,
}

#[derive(serde::Deserialize, Debug)]
struct HashResponse {
    hash: String,
}

impl HttpBackend {
    /// Creates a client for `base_url` whose every request is bounded by `timeout`.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        let base_url = base_url.into().trim_end_matches('/').to_owned();
        log::info!("Using attestation backend at {base_url}");

        Ok(Self { client, base_url })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(config.base_url.clone(), config.request_timeout())
    }

    fn url(&self, path: &str) -> String {
        format!("{}/unblind/{path}", self.base_url)
    }

    /// Sends the request and returns the body text of a successful, non-empty response.
    async fn send(&self, request: reqwest::RequestBuilder) -> Result<String> {
        log::trace!("Backend request '{:?}'", request);

        let response = request.send().await?;

        let status = response.status();
        let text = response.text().await?;

        log::trace!("Response status: {status}, body: {text}");

        if !status.is_success() {
            return Err(anyhow!("Request failed with status {status}: {text}"));
        }

        if text.is_empty() {
            return Err(anyhow!("Server returned empty response"));
        }

        Ok(text)
    }

    async fn send_json<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Result<T> {
        let text = self.send(request).await?;
        serde_json::from_str(&text)
            .map_err(|e| anyhow!("Failed to parse JSON response: {e}. Response body: {text}"))
    }

    async fn hash(&self, path: &str, body: &Value) -> Result<String> {
        let response: HashResponse = self
            .send_json(self.client.post(self.url(path)).json(body))
            .await?;
        Ok(response.hash)
    }

    /// Telemetry endpoints may answer with an empty body.
    async fn upload(&self, path: &str, body: &Value) -> Result<()> {
        let response = self.client.post(self.url(path)).json(body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow!("Upload failed with status {status}: {text}"));
        }
        Ok(())
    }
}

#[async_trait]
impl UnblindApi for HttpBackend {
    async fn render_qr(&self, data: &str, mode: RenderMode) -> Result<String> {
        let request = RenderRequest {
            data,
            mode: mode.code(),
            encoding: CompressedBlob::TRANSFORM,
        };
        self.send(self.client.post(self.url("qr")).json(&request)).await
    }

    async fn signup(&self) -> Result<SignupResponse> {
        self.send_json(self.client.post(self.url("userSignup"))).await
    }

    async fn user_info(&self, user_id: &str) -> Result<UserInfo> {
        self.send_json(self.client.get(self.url(&format!("userInfo/{user_id}")))).await
    }

    async fn user_state(&self, user_id: &str) -> Result<UserState> {
        self.send_json(self.client.get(self.url(&format!("userState/{user_id}")))).await
    }

    async fn message_hash(&self, message: &Value) -> Result<String> {
        self.hash("messageHash", &json!({ "message": message })).await
    }

    async fn transaction_hash(&self, transaction: &Value) -> Result<String> {
        self.hash("transactionHash", transaction).await
    }

    async fn upload_transaction(&self, upload: &Value) -> Result<()> {
        self.upload("transaction", upload).await
    }

    async fn upload_message(&self, upload: &Value) -> Result<()> {
        self.upload("message", upload).await
    }
}
