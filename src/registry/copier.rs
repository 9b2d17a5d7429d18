//! The image transfer seam.
//!
//! The byte-level copy (manifest resolution, media-type handling, layer
//! dedup, in-copier retries) is an external concern. The replicator hands
//! a [`CopyRequest`] to a [`Copier`] and interprets only the
//! [`CopyOutcome`].

use async_trait::async_trait;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::reference::{ImageReference, RemoteOptions};

/// Errors surfaced by a copier after its internal retries are exhausted.
#[derive(Debug, Error, Diagnostic)]
pub enum CopyError {
    /// The transfer failed (network, manifest, or layer push errors).
    #[error("image copy failed: {message}")]
    #[diagnostic(
        code(mirrortree::copier::transfer),
        help("The copier retries internally; this failure is final for the tag.")
    )]
    Transfer {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The destination already holds the image and overwrite was not forced.
    #[error("destination already exists: {reference}")]
    #[diagnostic(code(mirrortree::copier::exists))]
    AlreadyExists { reference: String },
}

/// Behaviour knobs for one image copy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopyOptions {
    /// Resolve and report without transferring bytes.
    pub dry_run: bool,
    /// Overwrite the destination tag even when it already exists.
    pub force_overwrite: bool,
    /// Source registry name, for the copier's own logging.
    pub source: String,
    /// Destination registry name, for the copier's own logging.
    pub destination: String,
}

/// Everything a copier needs to transfer one tagged image.
#[derive(Debug, Clone)]
pub struct CopyRequest {
    pub source_ref: ImageReference,
    pub dest_ref: ImageReference,
    pub source_options: RemoteOptions,
    pub dest_options: RemoteOptions,
    pub options: CopyOptions,
}

/// Transfer statistics reported by the copier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopyStats {
    pub bytes_transferred: u64,
    pub layers: u32,
}

/// Result of one copy attempt.
///
/// `success = false` with no accompanying error is still treated as a
/// failed copy by the replicator.
#[derive(Debug, Clone, Copy, Default)]
pub struct CopyOutcome {
    pub success: bool,
    pub stats: CopyStats,
}

/// Transfers a single tagged image between registries.
#[async_trait]
pub trait Copier: Send + Sync {
    /// Copy one image, retrying internally as the implementation sees fit.
    ///
    /// # Errors
    ///
    /// Returns [`CopyError`] once the copier considers the failure final.
    async fn copy_image(&self, request: CopyRequest) -> Result<CopyOutcome, CopyError>;
}
