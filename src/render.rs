/// Falls back from one renderer to another on failure
pub mod fallback;
/// Pure in-process renderer
pub mod local;
/// Backend-hosted renderer
pub mod remote;

use anyhow::Result;
use async_trait::async_trait;
pub use fallback::*;
pub use local::*;
pub use remote::*;
use serde::{Deserialize, Serialize};
use unblind_qr::QrCode;

use crate::codec::CompressedBlob;

/// Selects the rendering variant on the backend (wire field `type`).
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "lowercase")]
pub enum RenderMode {
    Transaction,
    Signature,
}

impl RenderMode {
    /// Integer sent to the backend.
    pub fn code(self) -> u8 {
        match self {
            RenderMode::Transaction => 0,
            RenderMode::Signature => 1,
        }
    }
}

/// Quiet zone and two-colour palette of a rendered code.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CodeStyle {
    /// Light modules around the grid; must be non-negative
    pub border: i32,
    pub light: String,
    pub dark: String,
}

impl Default for CodeStyle {
    fn default() -> Self {
        Self {
            border: 4,
            light: "white".to_owned(),
            dark: "black".to_owned(),
        }
    }
}

/// Where a [`RenderedCode`] was produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display)]
pub enum RenderOrigin {
    #[strum(serialize = "remote")]
    Remote,
    #[strum(serialize = "local")]
    Local,
}

/// A scannable code as an SVG document.
///
/// Locally rendered codes also carry the module grid and style they were drawn
/// with. Remote codes carry neither; the backend chooses its own styling.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderedCode {
    pub svg: String,
    pub origin: RenderOrigin,
    pub grid: Option<QrCode>,
    pub style: Option<CodeStyle>,
}

/// Turns a compressed payload into a scannable code.
#[async_trait]
pub trait CodeRenderer: Send + Sync {
    async fn render(&self, blob: &CompressedBlob, mode: RenderMode) -> Result<RenderedCode>;
}
