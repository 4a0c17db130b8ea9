use std::{fmt, sync::Arc};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::{
    backend::UnblindApi,
    payload::{AttestationPayload, PayloadKind},
};

/// Hex digest shown to the user for cross-checking on the secondary channel.
///
/// Advisory only. It is not a MAC and proves nothing about the payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerificationHash(String);

impl VerificationHash {
    /// Accepts a non-empty hex string, with or without a `0x` prefix.
    pub fn new(hash: impl Into<String>) -> Result<Self> {
        let hash = hash.into();
        let digits = hash.strip_prefix("0x").unwrap_or(&hash);
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(anyhow!("Verification hash is not a hex string: '{hash}'"));
        }
        Ok(Self(hash))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Splits the hash for display; the first half is `floor(len / 2)` characters.
    pub fn halves(&self) -> (&str, &str) {
        self.0.split_at(self.0.len() / 2)
    }
}

impl fmt::Display for VerificationHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Produces the verification hash for a payload.
#[async_trait]
pub trait VerificationHasher: Send + Sync {
    async fn hash(&self, payload: &AttestationPayload) -> Result<VerificationHash>;
}

/// Requests the digest from the backend's hash endpoints.
pub struct RemoteHasher {
    api: Arc<dyn UnblindApi>,
}

impl RemoteHasher {
    pub fn new(api: Arc<dyn UnblindApi>) -> Self {
        Self { api }
    }
}

/// The message a signature request asks to sign: its `data` field when present.
pub fn signature_message(signature: &Value) -> &Value {
    signature.get("data").unwrap_or(signature)
}

#[async_trait]
impl VerificationHasher for RemoteHasher {
    async fn hash(&self, payload: &AttestationPayload) -> Result<VerificationHash> {
        let hash = match payload.kind() {
            PayloadKind::Transaction => {
                self.api
                    .transaction_hash(&payload.canonical_value())
                    .await?
            }
            PayloadKind::Signature => {
                self.api
                    .message_hash(signature_message(payload.body()))
                    .await?
            }
        };

        log::debug!("Remote {} hash: {hash}", payload.kind());

        VerificationHash::new(hash)
    }
}

/// SHA-256 over the canonical payload string, computed in-process.
///
/// Not a stand-in for [`RemoteHasher`]: the digest differs from the backend's,
/// so it is only meaningful when the secondary channel hashes the same way.
#[derive(Clone, Copy, Debug, Default)]
pub struct LocalHasher;

#[async_trait]
impl VerificationHasher for LocalHasher {
    async fn hash(&self, payload: &AttestationPayload) -> Result<VerificationHash> {
        let canonical = payload.canonical_string()?;
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        VerificationHash::new(hex::encode(hasher.finalize()))
    }
}
