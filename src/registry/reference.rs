//! Image references and per-registry transfer options.

use std::fmt;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Fully-qualified pointer to a tagged image in one registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageReference {
    /// Registry host (e.g. `123456789012.dkr.ecr.us-east-1.amazonaws.com`).
    pub registry: String,
    /// Repository name within the registry (e.g. `prod/api`).
    pub repository: String,
    /// Tag within the repository (e.g. `v1.4.2`).
    pub tag: String,
}

impl ImageReference {
    /// Build a reference from its three components.
    #[must_use]
    pub fn new(
        registry: impl Into<String>,
        repository: impl Into<String>,
        tag: impl Into<String>,
    ) -> Self {
        Self {
            registry: registry.into(),
            repository: repository.into(),
            tag: tag.into(),
        }
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}:{}", self.registry, self.repository, self.tag)
    }
}

/// Opaque transfer options a [`Repository`](crate::registry::Repository)
/// hands to the copier for its side of a transfer.
///
/// The replicator never interprets these; it only threads them through to
/// [`Copier::copy_image`](crate::registry::Copier::copy_image). Concrete
/// clients stash whatever their transport needs (endpoint overrides,
/// scoped credentials handles, TLS toggles) in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteOptions {
    /// Allow plain-HTTP / self-signed endpoints.
    #[serde(default)]
    pub insecure: bool,
    /// Client-defined transport settings, passed through untouched.
    #[serde(default)]
    pub extra: FxHashMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_registry_repo_tag() {
        let r = ImageReference::new("registry.example.com", "prod/api", "v1");
        assert_eq!(r.to_string(), "registry.example.com/prod/api:v1");
    }
}
