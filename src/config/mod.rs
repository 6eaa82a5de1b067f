//! Configuration module for the edgesite deployment tool.
//!
//! This module handles all configuration-related functionality:
//! - Parsing and deserializing `edgesite.deploy.yaml`
//! - Validation of configuration values
//! - Computing configuration and resource hashes for change detection

mod hash;
mod parser;
mod spec;
mod validator;

pub use hash::ConfigHasher;
pub use parser::{ConfigParser, DEFAULT_CONFIG_FILES, find_config_file};
pub use spec::{
    DeployConfig, EngineConfig, ProjectConfig, SiteConfig, SiteInputs, StateBackend, StateConfig,
};
pub use validator::{ConfigValidator, ValidationError, ValidationResult};
