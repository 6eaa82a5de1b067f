// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![deny(missing_docs)]                // All public items must be documented
#![deny(dead_code)]                   // Unused code is forbidden
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention

// Additional strictness - Leave nothing unchecked
#![deny(unused_imports)]              // Unused imports are forbidden
#![deny(unused_variables)]            // Unused variables are forbidden
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::module_inception)]    // Module with same name as crate warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::too_many_arguments)]  // Limit function arguments
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Crate Documentation
// ============================================================================

//! # edgesite
//!
//! A declarative deployment descriptor for static websites on AWS.
//!
//! ## Overview
//!
//! Given a content directory, a hosted domain and a subdomain, edgesite
//! declares everything needed to serve the site over HTTPS:
//!
//! - A private S3 bucket holding one object per content file
//! - A CloudFront distribution reading the bucket through an origin access identity
//! - An ACM certificate in `us-east-1`, validated through a Route 53 DNS record
//! - A Route 53 alias record pointing the hostname at the distribution
//!
//! ## Architecture
//!
//! Declaration and provisioning are separate:
//!
//! 1. **Descriptor**: resources with typed properties and deferred references,
//!    forming a dependency graph
//! 2. **Rendering**: the descriptor becomes Terraform JSON (`main.tf.json`)
//! 3. **Engine**: Terraform resolves values and converges real infrastructure
//!
//! A descriptor-level plan (hash per resource, compared with recorded state)
//! shows what changed between runs.
//!
//! ## Modules
//!
//! - [`config`]: Configuration parsing and validation
//! - [`content`]: Content directory enumeration
//! - [`descriptor`]: Resource declarations, dependency graph and rendering
//! - [`engine`]: Hand-off to the provisioning engine
//! - [`planner`]: Diff computation and execution planning
//! - [`state`]: State storage backends (local, S3)
//! - [`cli`]: Command-line interface
//!
//! ## Example
//!
//! ```yaml
//! project:
//!   name: my-site
//!   environment: prod
//!   region: eu-west-1
//!
//! site:
//!   path: ./www
//!   domain: example.com
//!   subdomain: shop
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod cli;
pub mod config;
pub mod content;
pub mod descriptor;
pub mod engine;
pub mod error;
pub mod planner;
pub mod state;

// ============================================================================
// Re-exports
// ============================================================================

pub use cli::{Cli, Commands, OutputFormatter};
pub use config::{ConfigHasher, ConfigParser, ConfigValidator, DeployConfig};
pub use descriptor::{Descriptor, SiteDescriptorBuilder};
pub use engine::{ApplyEngine, TerraformEngine};
pub use error::{EdgesiteError, Result};
pub use planner::{DeploymentPlan, DiffEngine, PlanExecutor};
pub use state::{DeploymentState, LocalStateStore, S3StateStore, StateStore};
