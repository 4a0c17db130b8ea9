//! Out-of-band attestation for wallet operations.
//!
//! A pending transaction or signature is canonicalized, compressed and drawn as
//! a scannable code, paired with a verification hash, and handed to the host
//! dialog so the user can compare it against a linked secondary device.

/// Client for the `/unblind` backend
pub mod backend;

/// Raw DEFLATE and base64 transport encoding
pub mod codec;

/// Runtime configuration
pub mod config;

/// Verification hash derivation
pub mod hasher;

/// Types exchanged with the host runtime
pub mod host;

/// User identity persistence and lifecycle
pub mod identity;

/// Per-event fan-out of render, hash and link-status calls
pub mod orchestrator;

/// Canonical transaction and signature payloads
pub mod payload;

/// Scannable code renderers
pub mod render;

#[cfg(test)]
pub(crate) mod testing;

pub use config::Config;
pub use host::{Content, HandlerResponse, HomeView, HostDialog, Severity};
pub use orchestrator::{AttestationRecord, Orchestrator};
pub use payload::{AttestationPayload, PayloadKind};
