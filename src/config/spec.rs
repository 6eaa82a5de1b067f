//! Configuration specification types for the deployment tool.
//!
//! This module defines all the structs that map to the `edgesite.deploy.yaml`
//! file. These types describe the desired site; the descriptor is derived
//! from them.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::descriptor::S3Backend;
use crate::error::{ConfigError, Result};
use crate::state::engine_state_key;

/// The root configuration structure for an edgesite deployment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeployConfig {
    /// Project-level configuration.
    pub project: ProjectConfig,
    /// The site to publish.
    pub site: SiteConfig,
    /// State backend configuration.
    #[serde(default)]
    pub state: StateConfig,
    /// Apply engine configuration.
    #[serde(default)]
    pub engine: EngineConfig,
}

/// Project-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProjectConfig {
    /// Unique name for the project.
    pub name: String,
    /// Environment (e.g., "dev", "staging", "prod").
    #[serde(default = "default_environment")]
    pub environment: String,
    /// AWS region for everything except the certificate.
    #[serde(default = "default_region")]
    pub region: String,
}

/// Site inputs, keyed the way the deployment file spells them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SiteConfig {
    /// Root directory of the static content.
    #[serde(default = "default_content_path")]
    pub path: String,
    /// Website index document name.
    #[serde(default = "default_index_document")]
    pub index_document: String,
    /// Website error document name, also the 403 rewrite target.
    #[serde(default = "default_error_document")]
    pub error_document: String,
    /// Existing hosted zone name.
    #[serde(default)]
    pub domain: Option<String>,
    /// Label prepended to `domain`.
    #[serde(default)]
    pub subdomain: Option<String>,
}

/// State backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct StateConfig {
    /// Backend type (local or s3).
    #[serde(default)]
    pub backend: StateBackend,
    /// S3 bucket name (required for s3 backend).
    #[serde(default)]
    pub bucket: Option<String>,
    /// S3 key prefix (optional).
    #[serde(default)]
    pub prefix: Option<String>,
    /// S3 region (optional, uses AWS default if not specified).
    #[serde(default)]
    pub region: Option<String>,
    /// Local state directory (for local backend).
    #[serde(default)]
    pub path: Option<String>,
}

/// State backend types.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StateBackend {
    /// Local file-based state storage.
    #[default]
    Local,
    /// AWS S3-based state storage.
    S3,
}

/// Apply engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EngineConfig {
    /// Engine executable.
    #[serde(default = "default_engine_binary")]
    pub binary: String,
    /// Directory holding the rendered descriptor and the engine's working files.
    #[serde(default = "default_engine_workdir")]
    pub workdir: String,
}

/// Fully resolved site inputs handed to the descriptor builder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteInputs {
    /// Content root, resolved against the configuration directory.
    pub content_root: PathBuf,
    /// Website index document name.
    pub index_document: String,
    /// Website error document name.
    pub error_document: String,
    /// Root DNS zone name.
    pub domain: String,
    /// Label prepended to the domain.
    pub subdomain: String,
    /// Deployment region.
    pub region: String,
}

// Default value functions

fn default_environment() -> String {
    String::from("dev")
}

fn default_region() -> String {
    String::from("us-west-2")
}

fn default_content_path() -> String {
    String::from("./www")
}

fn default_index_document() -> String {
    String::from("index.html")
}

fn default_error_document() -> String {
    String::from("error.html")
}

fn default_engine_binary() -> String {
    String::from("terraform")
}

fn default_engine_workdir() -> String {
    String::from(".edgesite/stack")
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            binary: default_engine_binary(),
            workdir: default_engine_workdir(),
        }
    }
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            path: default_content_path(),
            index_document: default_index_document(),
            error_document: default_error_document(),
            domain: None,
            subdomain: None,
        }
    }
}

impl DeployConfig {
    /// Returns the fully qualified stack name including environment.
    #[must_use]
    pub fn qualified_name(&self) -> String {
        format!("{}-{}", self.project.name, self.project.environment)
    }

    /// Resolves the site inputs, failing on missing required values.
    ///
    /// Relative content paths are resolved against `base_dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if `site.domain` or `site.subdomain` is unset or blank.
    pub fn site_inputs(&self, base_dir: &Path) -> Result<SiteInputs> {
        let domain = required(self.site.domain.as_deref(), "site.domain")?;
        let subdomain = required(self.site.subdomain.as_deref(), "site.subdomain")?;

        let path = Path::new(&self.site.path);
        let content_root = if path.is_absolute() {
            path.to_path_buf()
        } else {
            base_dir.join(path)
        };

        Ok(SiteInputs {
            content_root,
            index_document: self.site.index_document.clone(),
            error_document: self.site.error_document.clone(),
            domain,
            subdomain,
            region: self.project.region.clone(),
        })
    }
}

impl DeployConfig {
    /// Where the engine keeps its own state.
    ///
    /// `None` for the local backend. The s3 backend places the engine state
    /// next to the deployment state, in the state region or else the
    /// project region.
    ///
    /// # Errors
    ///
    /// Returns an error if the s3 backend has no `state.bucket`.
    pub fn engine_backend(&self) -> Result<Option<S3Backend>> {
        if self.state.backend != StateBackend::S3 {
            return Ok(None);
        }

        let bucket = required(self.state.bucket.as_deref(), "state.bucket")?;
        Ok(Some(S3Backend {
            bucket,
            key: engine_state_key(
                self.state.prefix.as_deref(),
                &self.project.name,
                &self.project.environment,
            ),
            region: self
                .state
                .region
                .clone()
                .unwrap_or_else(|| self.project.region.clone()),
        }))
    }
}

impl SiteInputs {
    /// Returns the served hostname, `<subdomain>.<domain>`.
    #[must_use]
    pub fn domain_name(&self) -> String {
        format!("{}.{}", self.subdomain, self.domain)
    }
}

fn required(value: Option<&str>, key: &str) -> Result<String> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.trim_end_matches('.').to_string()),
        _ => Err(ConfigError::missing(key).into()),
    }
}
