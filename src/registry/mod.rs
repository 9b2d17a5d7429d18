//! The consumed registry capability surface.
//!
//! The replicator never sees a concrete registry implementation. It works
//! against three narrow seams: [`RegistryClient`] for enumeration,
//! [`Repository`] for tag listing and reference construction, and
//! [`Copier`] for the byte-level image transfer. Client construction,
//! authentication, pagination, and retry policy all live behind these
//! traits.

mod client;
mod copier;
mod reference;

pub use client::{RegistryClient, RegistryError, Repository};
pub use copier::{Copier, CopyError, CopyOptions, CopyOutcome, CopyRequest, CopyStats};
pub use reference::{ImageReference, RemoteOptions};
