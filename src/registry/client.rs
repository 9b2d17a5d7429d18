//! Registry enumeration traits consumed by the replicator.

use std::sync::Arc;

use async_trait::async_trait;
use miette::Diagnostic;
use thiserror::Error;

use super::reference::{ImageReference, RemoteOptions};

/// Errors surfaced by registry clients.
///
/// Concrete clients map their transport-level failures onto these
/// variants; the replicator treats every variant as a per-repository
/// fault except when repository enumeration itself fails, which is fatal
/// to the run.
#[derive(Debug, Error, Diagnostic)]
pub enum RegistryError {
    /// The named repository does not exist in the registry.
    #[error("repository not found: {name}")]
    #[diagnostic(
        code(mirrortree::registry::not_found),
        help("Verify the repository name `{name}` and the client's registry scope.")
    )]
    NotFound { name: String },

    /// Network, authentication, or API failure while talking to the registry.
    #[error("registry transport failure: {message}")]
    #[diagnostic(
        code(mirrortree::registry::transport),
        help("Check connectivity and credentials for the registry endpoint.")
    )]
    Transport {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Other client-side failures.
    #[error("registry client error: {message}")]
    #[diagnostic(code(mirrortree::registry::other))]
    Other { message: String },
}

impl RegistryError {
    /// Convenience constructor for transport failures with a cause chain.
    pub fn transport(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Transport {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// A registry that can enumerate repositories under a name prefix.
///
/// Implementations must page through the registry API internally;
/// [`list_repositories`](Self::list_repositories) returns the complete
/// set of names matching the prefix.
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// Stable name identifying this registry (used in checkpoints and logs).
    fn registry_name(&self) -> &str;

    /// List every repository whose name starts with `prefix`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Transport`] when the registry cannot be
    /// reached or the listing API fails.
    async fn list_repositories(&self, prefix: &str) -> Result<Vec<String>, RegistryError>;

    /// Resolve a handle to the named repository.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] for unknown names and
    /// [`RegistryError::Transport`] for transport failures.
    async fn repository(&self, name: &str) -> Result<Arc<dyn Repository>, RegistryError>;
}

/// One repository inside a registry.
#[async_trait]
pub trait Repository: Send + Sync {
    /// List every tag in this repository.
    async fn list_tags(&self) -> Result<Vec<String>, RegistryError>;

    /// Build the fully-qualified reference for one tag.
    fn image_reference(&self, tag: &str) -> ImageReference;

    /// Transport options the copier needs for this repository's side of a
    /// transfer.
    fn remote_options(&self) -> RemoteOptions;
}
