use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

use crate::{identity::LinkPrompt, orchestrator::AttestationRecord};

/// How urgently the host should present a response.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Severity {
    /// The user must explicitly acknowledge the content before approving
    Critical,
}

/// Status shown on the host's home page.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HomeView {
    pub user_id: Option<String>,
    /// Present while the secondary channel is not linked
    pub link: Option<LinkPrompt>,
}

impl HomeView {
    pub fn linked(&self) -> bool {
        self.user_id.is_some() && self.link.is_none()
    }
}

/// What the host should display. Turning it into markup is the host's job.
#[derive(Clone, Debug, PartialEq)]
pub enum Content {
    /// Scannable code and verification hash for a pending operation
    Attestation(AttestationRecord),
    Home(HomeView),
    /// Shown once after installation
    Installed { link: Option<LinkPrompt> },
    /// Non-fatal problem the user should know about
    Warning { message: String },
}

/// Value returned from every event handler.
#[derive(Clone, Debug, PartialEq)]
pub struct HandlerResponse {
    pub content: Content,
    pub severity: Option<Severity>,
}

/// Dialog surface of the host runtime.
#[async_trait]
pub trait HostDialog: Send + Sync {
    async fn show(&self, content: &Content) -> Result<()>;
}
