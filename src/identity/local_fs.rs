use std::{
    fs::{self, OpenOptions},
    io::{self, ErrorKind, Write},
    path::{Path, PathBuf},
    sync::atomic::{AtomicU64, Ordering},
};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use base64::engine::{general_purpose::STANDARD as BASE64, Engine};
use log::{debug, trace};

use crate::identity::{IdentityStore, UserIdentity};

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Identity persisted as a single base64-encoded JSON file.
///
/// Insertion is a hard link from a fully written temporary file, so it either
/// wins atomically or observes the existing file. Where hard links are not
/// supported it falls back to an exclusive create. Updates replace the file by
/// rename.
pub struct LocalFsStore {
    path: PathBuf,
}

impl LocalFsStore {
    /// Opens a store at `path`, creating its parent directory if needed.
    pub fn new(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let n = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(format!(".{}.{n}.tmp", std::process::id()));
        self.path.with_file_name(name)
    }

    fn write_temp(&self, identity: &UserIdentity) -> Result<PathBuf> {
        let encoded = encode(identity)?;

        let temp = self.temp_path();
        fs::write(&temp, encoded).map_err(|e| anyhow!("Failed to write to file: {e}"))?;
        Ok(temp)
    }

    /// Writes the identity only if no file exists yet. Not atomic for readers:
    /// a concurrent `load` may see a partly written file.
    fn create_exclusive(&self, identity: &UserIdentity) -> io::Result<()> {
        let encoded = encode(identity)?;
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)?;

        if let Err(e) = file.write_all(encoded.as_bytes()).and_then(|()| file.sync_all()) {
            let _ = fs::remove_file(&self.path);
            return Err(e);
        }
        Ok(())
    }

    async fn insert_with(
        &self,
        identity: UserIdentity,
        link: fn(&Path, &Path) -> io::Result<()>,
    ) -> Result<UserIdentity> {
        let temp = self.write_temp(&identity)?;
        let linked = link(&temp, &self.path);
        let _ = fs::remove_file(&temp);

        let inserted = match linked {
            Err(e) if e.kind() != ErrorKind::AlreadyExists => {
                debug!(
                    "hard link into {} failed ({e}), creating it exclusively",
                    self.path.display()
                );
                self.create_exclusive(&identity)
            }
            linked => linked,
        };

        match inserted {
            Ok(()) => {
                debug!("persisted identity {}", identity.user_id);
                Ok(identity)
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                debug!(
                    "identity already present, discarding {}",
                    identity.user_id
                );
                self.load()
                    .await?
                    .ok_or_else(|| anyhow!("Identity file vanished during insert"))
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn encode(identity: &UserIdentity) -> Result<String, serde_json::Error> {
    let identity_str = serde_json::to_string(identity)?;
    Ok(BASE64.encode(identity_str))
}

fn decode(encoded: &str) -> Result<UserIdentity> {
    let bytes = BASE64.decode(encoded.trim())?;
    let identity_str = String::from_utf8(bytes)?;
    let identity = serde_json::from_str(&identity_str)?;
    Ok(identity)
}

#[async_trait]
impl IdentityStore for LocalFsStore {
    async fn load(&self) -> Result<Option<UserIdentity>> {
        trace!("load identity from {}", self.path.display());

        match fs::read_to_string(&self.path) {
            Ok(encoded) => {
                let identity = decode(&encoded)
                    .with_context(|| format!("Corrupt identity file {}", self.path.display()))?;
                Ok(Some(identity))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn insert_if_absent(&self, identity: UserIdentity) -> Result<UserIdentity> {
        self.insert_with(identity, |from, to| fs::hard_link(from, to))
            .await
    }

    async fn update(&self, identity: &UserIdentity) -> Result<()> {
        let stored = self
            .load()
            .await?
            .ok_or_else(|| anyhow!("No identity to update"))?;
        if stored.user_id != identity.user_id {
            return Err(anyhow!(
                "Refusing to replace identity '{}' with '{}'",
                stored.user_id,
                identity.user_id
            ));
        }

        let temp = self.write_temp(identity)?;
        fs::rename(&temp, &self.path).map_err(|e| {
            let _ = fs::remove_file(&temp);
            anyhow!("Failed to replace identity file: {e}")
        })?;
        Ok(())
    }
}
