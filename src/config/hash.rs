//! Configuration and resource hashing for change detection.
//!
//! Hashes are hex SHA-256 digests. Resources are hashed over their rendered
//! JSON, whose object keys `serde_json` keeps sorted, so equal inputs always
//! produce equal hashes.

use sha2::{Digest, Sha256};

use crate::descriptor::{ProviderConfig, Resource};

use super::spec::DeployConfig;

/// Hasher for computing configuration and resource hashes.
#[derive(Debug, Default)]
pub struct ConfigHasher;

impl ConfigHasher {
    /// Creates a new hasher.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Computes a hash of the project and site sections.
    ///
    /// State and engine settings are excluded: moving the state backend does
    /// not change what is deployed.
    #[must_use]
    pub fn hash_config(&self, config: &DeployConfig) -> String {
        let mut hasher = Sha256::new();

        // Project identity and placement
        field(&mut hasher, &config.project.name);
        field(&mut hasher, &config.project.environment);
        field(&mut hasher, &config.project.region);

        // Site inputs
        let site = &config.site;
        field(&mut hasher, &site.path);
        field(&mut hasher, &site.index_document);
        field(&mut hasher, &site.error_document);
        field(&mut hasher, site.domain.as_deref().unwrap_or_default());
        field(&mut hasher, site.subdomain.as_deref().unwrap_or_default());

        hex::encode(hasher.finalize())
    }

    /// Computes the hash of a declared resource.
    ///
    /// Covers the rendered properties, explicit dependencies, provider
    /// binding and preconditions, plus the region and alias of the provider
    /// configuration the resource resolves to. Moving the deployment region
    /// therefore updates every resource on the default provider.
    #[must_use]
    pub fn hash_resource(&self, resource: &Resource, provider: Option<&ProviderConfig>) -> String {
        let mut hasher = Sha256::new();
        field(&mut hasher, &resource.render().to_string());

        if let Some(provider) = provider {
            field(&mut hasher, &provider.region);
            field(&mut hasher, provider.alias.as_deref().unwrap_or_default());
        }

        hex::encode(hasher.finalize())
    }

    /// Computes a short hash (first 8 characters) for display purposes.
    #[must_use]
    pub fn short_hash(&self, hash: &str) -> String {
        hash.chars().take(8).collect()
    }

    /// Compares two hashes to determine if they are equal.
    #[must_use]
    pub fn hashes_match(hash1: &str, hash2: &str) -> bool {
        // Constant-time comparison
        if hash1.len() != hash2.len() {
            return false;
        }

        hash1
            .bytes()
            .zip(hash2.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

/// Feeds one length-prefixed field, so adjacent fields cannot run together.
fn field(hasher: &mut Sha256, value: &str) {
    hasher.update((value.len() as u64).to_be_bytes());
    hasher.update(value.as_bytes());
}
