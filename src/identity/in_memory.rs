use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::identity::{IdentityStore, UserIdentity};

/// In-memory identity storage
///
/// Not persistent. Used for testing and for hosts that persist state themselves.
#[derive(Default)]
pub struct InMemoryStore {
    identity: Mutex<Option<UserIdentity>>,
}

impl InMemoryStore {
    pub fn with_identity(identity: UserIdentity) -> Self {
        Self {
            identity: Mutex::new(Some(identity)),
        }
    }

    fn slot(&self) -> Result<std::sync::MutexGuard<'_, Option<UserIdentity>>> {
        self.identity
            .lock()
            .map_err(|_| anyhow!("Identity store lock poisoned"))
    }
}

#[async_trait]
impl IdentityStore for InMemoryStore {
    async fn load(&self) -> Result<Option<UserIdentity>> {
        Ok(self.slot()?.clone())
    }

    async fn insert_if_absent(&self, identity: UserIdentity) -> Result<UserIdentity> {
        let mut slot = self.slot()?;
        let stored = slot.get_or_insert(identity);
        Ok(stored.clone())
    }

    async fn update(&self, identity: &UserIdentity) -> Result<()> {
        let mut slot = self.slot()?;
        match slot.as_mut() {
            Some(stored) if stored.user_id == identity.user_id => {
                *stored = identity.clone();
                Ok(())
            }
            Some(stored) => Err(anyhow!(
                "Refusing to replace identity '{}' with '{}'",
                stored.user_id,
                identity.user_id
            )),
            None => Err(anyhow!("No identity to update")),
        }
    }
}
