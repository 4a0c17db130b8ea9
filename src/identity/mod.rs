/// In-memory identity store
pub mod in_memory;
/// File-backed identity store
pub mod local_fs;
/// Signup, linking and link-prompt lifecycle
pub mod manager;

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
pub use in_memory::InMemoryStore;
pub use local_fs::LocalFsStore;
pub use manager::{IdentityManager, LinkPrompt};
use serde::{Deserialize, Serialize};

use crate::backend::SignupResponse;

/// Per-installation user identity.
///
/// Created once by signup and never removed. Only `tg_linked` and the linking
/// code change afterwards.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserIdentity {
    pub user_id: String,
    /// Whether the secondary channel has been linked
    #[serde(default)]
    pub tg_linked: bool,
    pub qr_code: String,
    pub bot_link: String,
}

impl From<SignupResponse> for UserIdentity {
    fn from(response: SignupResponse) -> Self {
        let SignupResponse {
            user_id,
            qr_code,
            bot_link,
        } = response;

        Self {
            user_id,
            tg_linked: false,
            qr_code,
            bot_link,
        }
    }
}

/// Durable storage for the single identity of this installation.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Returns the persisted identity, if one exists.
    async fn load(&self) -> Result<Option<UserIdentity>>;

    /// Persists `identity` only if no identity exists yet.
    ///
    /// Atomic with respect to other callers of the same store. Returns the
    /// identity that is persisted afterwards, which is the existing one when
    /// another caller won.
    async fn insert_if_absent(&self, identity: UserIdentity) -> Result<UserIdentity>;

    /// Overwrites the persisted identity. The user id must match the stored one.
    async fn update(&self, identity: &UserIdentity) -> Result<()>;
}

/// Bounded signup retries with linear backoff.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_step_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_step_ms: 300,
        }
    }
}

impl RetryPolicy {
    /// Delay before the 1-based `attempt`: `backoff_step * (attempt - 1)`.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.backoff_step_ms * u64::from(attempt.saturating_sub(1)))
    }
}
