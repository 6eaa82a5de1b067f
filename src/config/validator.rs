//! Configuration validation for deployment files.
//!
//! Collects every problem in a configuration before anything is declared,
//! so a single `validate` run reports them all.

use crate::error::{ConfigError, EdgesiteError, Result};
use std::path::Path;
use tracing::debug;

use super::spec::{DeployConfig, ProjectConfig, SiteConfig, StateBackend, StateConfig};

/// Validator for deployment configurations.
#[derive(Debug, Default)]
pub struct ConfigValidator;

/// Validation result containing all errors found.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// List of validation errors.
    pub errors: Vec<ValidationError>,
    /// List of warnings (non-fatal issues).
    pub warnings: Vec<String>,
}

/// A single validation error.
#[derive(Debug)]
pub struct ValidationError {
    /// The field path that failed validation.
    pub field: String,
    /// The error message.
    pub message: String,
}

impl ConfigValidator {
    /// Creates a new validator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Validates a deployment configuration.
    ///
    /// `base_dir` is the directory the configuration was loaded from; the
    /// content root is checked relative to it.
    ///
    /// # Errors
    ///
    /// Returns the first error if validation fails. Missing `site.domain` or
    /// `site.subdomain` is reported as [`ConfigError::MissingRequired`].
    pub fn validate(&self, config: &DeployConfig, base_dir: &Path) -> Result<ValidationResult> {
        let mut result = ValidationResult::default();

        if config.site.domain.as_deref().is_none_or(|d| d.trim().is_empty()) {
            return Err(ConfigError::missing("site.domain").into());
        }
        if config.site.subdomain.as_deref().is_none_or(|s| s.trim().is_empty()) {
            return Err(ConfigError::missing("site.subdomain").into());
        }

        Self::validate_project(&config.project, &mut result);
        Self::validate_site(&config.site, base_dir, &mut result);
        Self::validate_state(&config.state, &mut result);

        if result.errors.is_empty() {
            debug!("Configuration validation passed");
            Ok(result)
        } else {
            let first_error = &result.errors[0];
            Err(EdgesiteError::Config(ConfigError::ValidationError {
                message: first_error.message.clone(),
                field: Some(first_error.field.clone()),
            }))
        }
    }

    /// Validates project configuration.
    fn validate_project(project: &ProjectConfig, result: &mut ValidationResult) {
        if project.name.is_empty() {
            result.push_error("project.name", "Project name cannot be empty");
        } else if !is_valid_name(&project.name) {
            result.push_error(
                "project.name",
                format!(
                    "Project name '{}' is invalid. Must be lowercase alphanumeric with hyphens.",
                    project.name
                ),
            );
        }

        if project.environment.is_empty() {
            result.push_error("project.environment", "Environment cannot be empty");
        }

        if !is_valid_region(&project.region) {
            result.push_error(
                "project.region",
                format!("Region '{}' does not look like an AWS region", project.region),
            );
        }
    }

    /// Validates the site inputs.
    fn validate_site(site: &SiteConfig, base_dir: &Path, result: &mut ValidationResult) {
        // Presence was checked by the caller.
        let domain = site.domain.as_deref().unwrap_or_default();
        let subdomain = site.subdomain.as_deref().unwrap_or_default();

        if !is_valid_hostname(domain.trim_end_matches('.')) {
            result.push_error("site.domain", format!("Invalid domain name: {domain}"));
        }

        if !is_valid_label(subdomain) {
            result.push_error(
                "site.subdomain",
                format!("Subdomain '{subdomain}' must be a single DNS label"),
            );
        }

        for (field, document) in [
            ("site.indexDocument", &site.index_document),
            ("site.errorDocument", &site.error_document),
        ] {
            if document.is_empty() {
                result.push_error(field, "Document name cannot be empty");
            } else if document.starts_with('/') || document.contains('\\') {
                result.push_error(
                    field,
                    format!("Document '{document}' must be a path relative to the content root"),
                );
            }
        }

        let root = base_dir.join(&site.path);
        if !root.is_dir() {
            result.push_error(
                "site.path",
                format!("Content root does not exist: {}", root.display()),
            );
            return;
        }

        for document in [&site.index_document, &site.error_document] {
            if !document.is_empty() && !root.join(document).is_file() {
                result.warnings.push(format!(
                    "{document} is not present under {}; the distribution will serve errors for it",
                    root.display()
                ));
            }
        }
    }

    /// Validates state configuration.
    fn validate_state(state: &StateConfig, result: &mut ValidationResult) {
        match state.backend {
            StateBackend::S3 => {
                if state.bucket.as_ref().is_none_or(String::is_empty) {
                    result.push_error(
                        "state.bucket",
                        "S3 bucket name is required when using S3 backend",
                    );
                }
            }
            StateBackend::Local => {
                if state.bucket.is_some() {
                    result
                        .warnings
                        .push(String::from("state.bucket is ignored by the local backend"));
                }
            }
        }
    }
}

/// Validates that a name follows the naming convention.
/// Names must be lowercase alphanumeric with hyphens, starting with a letter.
fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();

    match chars.next() {
        Some(first) if first.is_ascii_lowercase() => {}
        _ => return false,
    }

    if !chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-') {
        return false;
    }

    !name.ends_with('-') && !name.contains("--")
}

/// A single DNS label: 1-63 alphanumerics or hyphens, no leading or trailing hyphen.
fn is_valid_label(label: &str) -> bool {
    !label.is_empty()
        && label.len() <= 63
        && !label.starts_with('-')
        && !label.ends_with('-')
        && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

fn is_valid_hostname(name: &str) -> bool {
    name.len() <= 253 && name.contains('.') && name.split('.').all(is_valid_label)
}

/// Accepts region identifiers such as `us-east-1` or `ap-southeast-2`.
fn is_valid_region(region: &str) -> bool {
    let parts: Vec<&str> = region.split('-').collect();
    parts.len() >= 3
        && parts[..parts.len() - 1]
            .iter()
            .all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_lowercase()))
        && parts[parts.len() - 1].parse::<u8>().is_ok()
}

impl ValidationResult {
    fn push_error(&mut self, field: &str, message: impl Into<String>) {
        self.errors.push(ValidationError {
            field: field.to_string(),
            message: message.into(),
        });
    }

    /// Returns true if validation passed (no errors).
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns the number of warnings.
    #[must_use]
    pub const fn warning_count(&self) -> usize {
        self.warnings.len()
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}
