use anyhow::{Context, Result};
use async_trait::async_trait;
use unblind_qr::{to_svg_string, QrCode, QrCodeEcc};

use crate::{
    codec::CompressedBlob,
    render::{CodeRenderer, CodeStyle, RenderMode, RenderOrigin, RenderedCode},
};

/// Renders codes in-process with no network access.
///
/// Uses the lowest error-correction tier so the base64 blob fits the smallest
/// possible grid. The mode does not change the local output.
#[derive(Clone, Debug, Default)]
pub struct LocalRenderer {
    style: CodeStyle,
}

impl LocalRenderer {
    pub fn new(style: CodeStyle) -> Self {
        Self { style }
    }

    pub fn style(&self) -> &CodeStyle {
        &self.style
    }
}

#[async_trait]
impl CodeRenderer for LocalRenderer {
    async fn render(&self, blob: &CompressedBlob, mode: RenderMode) -> Result<RenderedCode> {
        log::trace!("Rendering {mode} code locally from {} byte blob", blob.len());
        render_text(&blob.to_base64(), &self.style)
    }
}

/// Encodes `text` into a QR grid and wraps it in an SVG document.
///
/// # Errors
///
/// Fails with [`unblind_qr::QrError::BorderOutOfRange`] for a negative border
/// and [`unblind_qr::QrError::DataTooLong`] beyond version 40 capacity.
pub fn render_text(text: &str, style: &CodeStyle) -> Result<RenderedCode> {
    let qr = QrCode::encode_text(text, QrCodeEcc::Low)
        .with_context(|| format!("Failed to encode {} characters", text.len()))?;

    let svg = to_svg_string(&qr, style.border, &style.light, &style.dark)?;

    log::debug!(
        "Rendered local code: version {}, {}x{} modules, mask {}",
        qr.version(),
        qr.size(),
        qr.size(),
        qr.mask()
    );

    Ok(RenderedCode {
        svg,
        origin: RenderOrigin::Local,
        grid: Some(qr),
        style: Some(style.clone()),
    })
}
