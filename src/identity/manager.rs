use std::sync::Arc;

use anyhow::{anyhow, Result};
use serde::Serialize;
use tokio::sync::Mutex;

use crate::{
    backend::{SignupResponse, UnblindApi},
    identity::{IdentityStore, RetryPolicy, UserIdentity},
};

/// Linking code to show while the secondary channel is not linked.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkPrompt {
    pub qr_code: String,
    pub bot_link: String,
}

impl From<&UserIdentity> for LinkPrompt {
    fn from(identity: &UserIdentity) -> Self {
        Self {
            qr_code: identity.qr_code.clone(),
            bot_link: identity.bot_link.clone(),
        }
    }
}

/// Sole owner and writer of the installation's [`UserIdentity`].
///
/// States: no identity, signed up but unlinked, signed up and linked. Signup
/// happens lazily on the first event that needs an identity; linking is
/// detected by polling the backend whenever the link prompt is computed.
pub struct IdentityManager {
    api: Arc<dyn UnblindApi>,
    store: Arc<dyn IdentityStore>,
    retry: RetryPolicy,
    signup_lock: Mutex<()>,
}

impl IdentityManager {
    pub fn new(api: Arc<dyn UnblindApi>, store: Arc<dyn IdentityStore>, retry: RetryPolicy) -> Self {
        Self {
            api,
            store,
            retry,
            signup_lock: Mutex::new(()),
        }
    }

    /// The persisted identity, without signing up.
    pub async fn current(&self) -> Result<Option<UserIdentity>> {
        self.store.load().await
    }

    /// The persisted user id, if any. Store errors are logged and read as `None`.
    pub async fn current_user_id(&self) -> Option<String> {
        match self.store.load().await {
            Ok(identity) => identity.map(|i| i.user_id),
            Err(e) => {
                log::warn!("Failed to read identity: {e:#}");
                None
            }
        }
    }

    /// Returns the persisted identity, signing up first if there is none.
    ///
    /// Concurrent callers share one signup: the first takes the signup lock,
    /// the rest wait and then read its result. The store's insert-if-absent
    /// settles races with other managers over the same store.
    pub async fn ensure_identity(&self) -> Result<UserIdentity> {
        if let Some(identity) = self.store.load().await? {
            return Ok(identity);
        }

        let _guard = self.signup_lock.lock().await;
        if let Some(identity) = self.store.load().await? {
            return Ok(identity);
        }

        let response = self.signup_with_retry().await?;
        let candidate = UserIdentity::from(response);
        let stored = self.store.insert_if_absent(candidate.clone()).await?;

        if stored.user_id == candidate.user_id {
            log::info!("Signed up as user {}", stored.user_id);
        } else {
            log::info!(
                "Discarded user {}; identity {} was stored first",
                candidate.user_id,
                stored.user_id
            );
        }

        Ok(stored)
    }

    /// Calls signup up to `max_attempts` times with linear backoff between attempts.
    ///
    /// # Errors
    ///
    /// After the final attempt fails, an error carrying the last failure's message.
    pub async fn signup_with_retry(&self) -> Result<SignupResponse> {
        let max_attempts = self.retry.max_attempts;
        let mut last_error = None;

        for attempt in 1..=max_attempts {
            let delay = self.retry.delay_before(attempt);
            if !delay.is_zero() {
                log::debug!("Retrying signup in {delay:?} (attempt {attempt}/{max_attempts})");
                tokio::time::sleep(delay).await;
            }

            match self.api.signup().await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    log::warn!("Signup attempt {attempt}/{max_attempts} failed: {e:#}");
                    last_error = Some(e);
                }
            }
        }

        let last = last_error
            .map(|e| format!("{e:#}"))
            .unwrap_or_else(|| "no attempts were made".to_owned());
        Err(anyhow!("Signup failed after {max_attempts} attempts: {last}"))
    }

    /// The linking code to show, or `None` when linked.
    ///
    /// Never fails: any lookup error is logged and treated as "no prompt", so
    /// link status can never block an attestation.
    pub async fn link_prompt(&self) -> Option<LinkPrompt> {
        match self.try_link_prompt().await {
            Ok(prompt) => prompt,
            Err(e) => {
                log::warn!("Link status lookup failed: {e:#}");
                None
            }
        }
    }

    async fn try_link_prompt(&self) -> Result<Option<LinkPrompt>> {
        let identity = match self.store.load().await? {
            Some(identity) => identity,
            None => {
                let identity = self.ensure_identity().await?;
                return Ok((!identity.tg_linked).then(|| LinkPrompt::from(&identity)));
            }
        };

        if identity.tg_linked {
            return Ok(None);
        }

        let state = self.api.user_state(&identity.user_id).await?;
        if state.tg_linked {
            let linked = UserIdentity {
                tg_linked: true,
                ..identity
            };
            self.store.update(&linked).await?;
            log::info!("User {} linked a secondary channel", linked.user_id);
            return Ok(None);
        }

        // the linking code may have been rotated since signup
        let refreshed = self.refresh_from(identity).await?;
        Ok((!refreshed.tg_linked).then(|| LinkPrompt::from(&refreshed)))
    }

    /// Re-reads the persisted identity's user info from the backend and stores
    /// any change. Returns `None` without a backend call when there is no identity.
    pub async fn refresh(&self) -> Result<Option<UserIdentity>> {
        match self.store.load().await? {
            Some(identity) => Ok(Some(self.refresh_from(identity).await?)),
            None => Ok(None),
        }
    }

    async fn refresh_from(&self, identity: UserIdentity) -> Result<UserIdentity> {
        let info = self.api.user_info(&identity.user_id).await?;
        let refreshed = UserIdentity {
            user_id: identity.user_id.clone(),
            tg_linked: identity.tg_linked || info.tg_linked,
            qr_code: info.qr_code,
            bot_link: info.bot_link,
        };
        if refreshed != identity {
            self.store.update(&refreshed).await?;
        }
        Ok(refreshed)
    }
}
