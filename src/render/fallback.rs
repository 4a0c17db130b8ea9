use anyhow::Result;
use async_trait::async_trait;

use crate::{
    codec::CompressedBlob,
    render::{CodeRenderer, RenderMode, RenderedCode},
};

/// Tries `primary` and, if it fails, renders with `secondary`.
///
/// The primary failure is logged and never returned. Only a failure of the
/// secondary renderer reaches the caller.
pub struct FallbackRenderer<P, S> {
    primary: P,
    secondary: S,
}

impl<P, S> FallbackRenderer<P, S>
where
    P: CodeRenderer,
    S: CodeRenderer,
{
    pub fn new(primary: P, secondary: S) -> Self {
        Self { primary, secondary }
    }
}

#[async_trait]
impl<P, S> CodeRenderer for FallbackRenderer<P, S>
where
    P: CodeRenderer,
    S: CodeRenderer,
{
    async fn render(&self, blob: &CompressedBlob, mode: RenderMode) -> Result<RenderedCode> {
        match self.primary.render(blob, mode).await {
            Ok(code) => Ok(code),
            Err(e) => {
                log::warn!("Primary renderer failed, falling back: {e:#}");
                self.secondary.render(blob, mode).await
            }
        }
    }
}
