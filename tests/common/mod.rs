//! Shared fixtures: in-memory registry and copier test doubles.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use mirrortree::registry::{
    Copier, CopyError, CopyOutcome, CopyRequest, CopyStats, ImageReference, RegistryClient,
    RegistryError, RemoteOptions, Repository,
};

/// Install a test subscriber once; `RUST_LOG` controls verbosity.
pub fn init_tracing() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Registry double backed by a static `repo → tags` table.
pub struct MockRegistry {
    name: String,
    repos: BTreeMap<String, Vec<String>>,
    fail_listing: bool,
    fail_repos: BTreeSet<String>,
}

impl MockRegistry {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            repos: BTreeMap::new(),
            fail_listing: false,
            fail_repos: BTreeSet::new(),
        }
    }

    pub fn with_repo(mut self, repo: &str, tags: &[&str]) -> Self {
        self.repos
            .insert(repo.to_string(), tags.iter().map(|t| t.to_string()).collect());
        self
    }

    /// Make `list_repositories` fail with a transport error.
    pub fn with_failing_listing(mut self) -> Self {
        self.fail_listing = true;
        self
    }

    /// Make `repository(name)` fail for one repository.
    pub fn with_failing_repo(mut self, repo: &str) -> Self {
        self.fail_repos.insert(repo.to_string());
        self
    }
}

#[async_trait]
impl RegistryClient for MockRegistry {
    fn registry_name(&self) -> &str {
        &self.name
    }

    async fn list_repositories(&self, prefix: &str) -> Result<Vec<String>, RegistryError> {
        if self.fail_listing {
            return Err(RegistryError::Transport {
                message: "listing unavailable".into(),
                source: None,
            });
        }
        Ok(self
            .repos
            .keys()
            .filter(|name| name.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn repository(&self, name: &str) -> Result<Arc<dyn Repository>, RegistryError> {
        if self.fail_repos.contains(name) {
            return Err(RegistryError::NotFound {
                name: name.to_string(),
            });
        }
        // Unknown destination repositories are created on first push, so
        // a handle resolves even when the table has no entry.
        Ok(Arc::new(MockRepository {
            registry: self.name.clone(),
            name: name.to_string(),
            tags: self.repos.get(name).cloned().unwrap_or_default(),
        }))
    }
}

pub struct MockRepository {
    registry: String,
    name: String,
    tags: Vec<String>,
}

#[async_trait]
impl Repository for MockRepository {
    async fn list_tags(&self) -> Result<Vec<String>, RegistryError> {
        Ok(self.tags.clone())
    }

    fn image_reference(&self, tag: &str) -> ImageReference {
        ImageReference::new(&self.registry, &self.name, tag)
    }

    fn remote_options(&self) -> RemoteOptions {
        RemoteOptions::default()
    }
}

/// Copier double that records every request it sees.
#[derive(Default)]
pub struct MockCopier {
    copies: Mutex<Vec<(ImageReference, ImageReference)>>,
    attempts: AtomicU64,
    fail_tags: BTreeSet<String>,
    existing_refs: BTreeSet<String>,
    delay: Option<Duration>,
}

impl MockCopier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every copy whose source tag is `tag`.
    pub fn with_failing_tag(mut self, tag: &str) -> Self {
        self.fail_tags.insert(tag.to_string());
        self
    }

    /// Report the destination reference as already present.
    pub fn with_existing(mut self, dest_ref: &str) -> Self {
        self.existing_refs.insert(dest_ref.to_string());
        self
    }

    /// Sleep this long inside every copy (for cancellation tests).
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// `(source, destination)` pairs of every successful request, in
    /// completion order.
    pub fn copied(&self) -> Vec<(ImageReference, ImageReference)> {
        self.copies.lock().unwrap().clone()
    }

    pub fn copied_dest_repos(&self) -> BTreeSet<String> {
        self.copied()
            .into_iter()
            .map(|(_, dest)| dest.repository)
            .collect()
    }

    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Copier for MockCopier {
    async fn copy_image(&self, request: CopyRequest) -> Result<CopyOutcome, CopyError> {
        self.attempts.fetch_add(1, Ordering::Relaxed);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_tags.contains(&request.source_ref.tag) {
            return Err(CopyError::Transfer {
                message: format!("simulated failure for {}", request.source_ref),
                source: None,
            });
        }
        if !request.options.force_overwrite
            && self.existing_refs.contains(&request.dest_ref.to_string())
        {
            return Err(CopyError::AlreadyExists {
                reference: request.dest_ref.to_string(),
            });
        }
        self.copies
            .lock()
            .unwrap()
            .push((request.source_ref, request.dest_ref));
        Ok(CopyOutcome {
            success: true,
            stats: CopyStats {
                bytes_transferred: 1024,
                layers: 3,
            },
        })
    }
}
