//! Deployment descriptor.
//!
//! A descriptor is a set of resource declarations with typed properties,
//! provider configurations and named outputs. References between resources
//! are carried as deferred [`Output`] values; together with explicit
//! `depends_on` constraints they form the [`DependencyGraph`].
//!
//! The descriptor renders to Terraform's JSON configuration syntax and is
//! handed to the engine as-is.

mod builder;
mod graph;
mod policy;
mod render;
mod resource;
mod value;

pub use builder::{SiteDescriptorBuilder, object_name};
pub use graph::DependencyGraph;
pub use policy::bucket_read_policy;
pub use resource::{Precondition, Resource};
pub use value::{Address, Mode, Output, Prop, Props, Template};

use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

use crate::error::{DescriptorError, EdgesiteError, Result};

/// Resource types that must be declared exactly once.
pub const SINGLETON_TYPES: [&str; 3] = [
    "aws_s3_bucket",
    "aws_acm_certificate",
    "aws_cloudfront_distribution",
];

/// A provider configuration block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    /// Region the provider operates in.
    pub region: String,
    /// Alias for non-default configurations, referenced as `aws.<alias>`.
    pub alias: Option<String>,
}

/// Remote location of the engine's own state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Backend {
    /// Bucket holding the state object.
    pub bucket: String,
    /// Object key of the state.
    pub key: String,
    /// Region of the bucket.
    pub region: String,
}

/// A complete deployment descriptor.
#[derive(Debug, Clone, Default)]
pub struct Descriptor {
    resources: BTreeMap<Address, Resource>,
    providers: Vec<ProviderConfig>,
    outputs: BTreeMap<String, Template>,
    backend: Option<S3Backend>,
}

impl Descriptor {
    /// Creates an empty descriptor.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a resource.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is already declared.
    pub fn add(&mut self, resource: Resource) -> Result<()> {
        let address = resource.address().clone();
        if self.resources.contains_key(&address) {
            return Err(DescriptorError::DuplicateResource {
                address: address.to_string(),
            }
            .into());
        }
        debug!("Declared {address}");
        self.resources.insert(address, resource);
        Ok(())
    }

    /// Adds a provider configuration.
    pub fn add_provider(&mut self, region: impl Into<String>, alias: Option<&str>) {
        self.providers.push(ProviderConfig {
            region: region.into(),
            alias: alias.map(str::to_string),
        });
    }

    /// Adds a named output.
    pub fn add_output(&mut self, name: impl Into<String>, value: impl Into<Template>) {
        self.outputs.insert(name.into(), value.into());
    }

    /// Stores the engine's state in S3 instead of its working directory.
    pub fn set_backend(&mut self, backend: S3Backend) {
        self.backend = Some(backend);
    }

    /// The engine state backend, if not local.
    #[must_use]
    pub const fn backend(&self) -> Option<&S3Backend> {
        self.backend.as_ref()
    }

    /// Gets a resource by address.
    #[must_use]
    pub fn get(&self, address: &Address) -> Option<&Resource> {
        self.resources.get(address)
    }

    /// All declarations, sorted by address.
    pub fn resources(&self) -> impl Iterator<Item = &Resource> {
        self.resources.values()
    }

    /// Managed resources only, sorted by address.
    pub fn managed_resources(&self) -> impl Iterator<Item = &Resource> {
        self.resources.values().filter(|r| !r.address().is_data())
    }

    /// Declarations of one engine type.
    pub fn resources_of_type<'a>(&'a self, resource_type: &'a str) -> impl Iterator<Item = &'a Resource> {
        self.resources
            .values()
            .filter(move |r| r.address().resource_type == resource_type)
    }

    /// Provider configurations in declaration order.
    #[must_use]
    pub fn providers(&self) -> &[ProviderConfig] {
        &self.providers
    }

    /// The provider configuration `resource` is bound to.
    ///
    /// Resources without an explicit binding use the configuration without
    /// an alias; `aws.<alias>` bindings use the matching aliased one.
    #[must_use]
    pub fn provider_for(&self, resource: &Resource) -> Option<&ProviderConfig> {
        let alias = resource
            .provider()
            .map(|p| p.split_once('.').map_or(p, |(_, alias)| alias));
        self.providers.iter().find(|p| p.alias.as_deref() == alias)
    }

    /// Named outputs.
    #[must_use]
    pub const fn outputs(&self) -> &BTreeMap<String, Template> {
        &self.outputs
    }

    /// Number of declarations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Returns true when nothing is declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Builds the dependency graph.
    ///
    /// # Errors
    ///
    /// Returns an error on a dangling reference.
    pub fn graph(&self) -> Result<DependencyGraph> {
        DependencyGraph::from_resources(self.resources.values())
    }

    /// Checks structural invariants.
    ///
    /// Every reference must resolve, the graph must be acyclic, singleton
    /// types must be declared once, and each certificate must cover exactly
    /// one name.
    ///
    /// # Errors
    ///
    /// Returns the first violated invariant.
    pub fn validate(&self) -> Result<()> {
        self.graph()?.resolve_order()?;

        for (name, value) in &self.outputs {
            if let Some(missing) = value.references().into_iter().find(|a| !self.resources.contains_key(a)) {
                return Err(DescriptorError::DanglingReference {
                    from: format!("output.{name}"),
                    to: missing.to_string(),
                }
                .into());
            }
        }

        for resource_type in SINGLETON_TYPES {
            let count = self.resources_of_type(resource_type).count();
            if count != 1 {
                return Err(DescriptorError::SingletonViolated {
                    resource_type: resource_type.to_string(),
                    count,
                }
                .into());
            }
        }

        for certificate in self.resources_of_type("aws_acm_certificate") {
            let count = certificate_name_count(certificate);
            if count != 1 {
                return Err(DescriptorError::ValidationOptionCardinality { count }.into());
            }
        }

        Ok(())
    }

    /// Renders the descriptor in Terraform's JSON syntax.
    #[must_use]
    pub fn render(&self) -> Value {
        render::render(self)
    }

    /// Renders as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(&self.render())
            .map_err(|e| EdgesiteError::internal(format!("Failed to render descriptor: {e}")))
    }
}

/// Names a certificate covers: its domain name plus any alternative names.
fn certificate_name_count(certificate: &Resource) -> usize {
    let primary = usize::from(certificate.props().get("domain_name").is_some());
    let alternatives = match certificate.props().get("subject_alternative_names") {
        Some(Prop::List(names)) => names.len(),
        Some(_) => 1,
        None => 0,
    };
    primary + alternatives
}
