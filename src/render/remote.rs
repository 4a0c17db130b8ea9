use std::{sync::Arc, time::Duration};

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::{
    backend::UnblindApi,
    codec::CompressedBlob,
    render::{CodeRenderer, RenderMode, RenderOrigin, RenderedCode},
};

/// Delegates rendering to the backend's `/unblind/qr` endpoint.
///
/// A response slower than `timeout` counts as a failure.
pub struct RemoteRenderer {
    api: Arc<dyn UnblindApi>,
    timeout: Duration,
}

impl RemoteRenderer {
    pub fn new(api: Arc<dyn UnblindApi>, timeout: Duration) -> Self {
        Self { api, timeout }
    }
}

#[async_trait]
impl CodeRenderer for RemoteRenderer {
    async fn render(&self, blob: &CompressedBlob, mode: RenderMode) -> Result<RenderedCode> {
        let svg = tokio::time::timeout(self.timeout, self.api.render_qr(&blob.to_base64(), mode))
            .await
            .map_err(|_| anyhow!("Remote renderer timed out after {:?}", self.timeout))??;

        if !svg.contains("<svg") {
            return Err(anyhow!("Remote renderer did not return an SVG document"));
        }

        Ok(RenderedCode {
            svg,
            origin: RenderOrigin::Remote,
            grid: None,
            style: None,
        })
    }
}
