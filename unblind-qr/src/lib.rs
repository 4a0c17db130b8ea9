//! Local QR Model 2 encoder for attestation payloads.
//!
//! Text is encoded in byte mode at a caller-chosen error-correction tier. The
//! smallest version (grid size) that fits the data is selected, the mask with
//! the lowest penalty score is applied, and the finished matrix can be emitted
//! as a self-contained SVG document.

/// Matrix construction, version selection and masking
mod code;
/// GF(2^8) Reed-Solomon error-correction codewords
mod reed_solomon;
/// SVG path emission
mod svg;

pub use code::{byte_capacity, QrCode, QrCodeEcc, MAX_VERSION, MIN_VERSION};
pub use svg::to_svg_string;

/// Errors raised while encoding or emitting a QR code.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QrError {
    /// The payload does not fit in the largest version at the requested tier.
    #[error("data length {len} exceeds the maximum capacity of {capacity} bytes")]
    DataTooLong {
        /// Payload length in bytes
        len: usize,
        /// Capacity of version 40 at the requested tier
        capacity: usize,
    },
    /// A negative quiet-zone width was requested.
    #[error("border must be non-negative, got {0}")]
    BorderOutOfRange(i32),
}
