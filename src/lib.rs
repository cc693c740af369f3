// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![warn(missing_docs)]                // Public items should be documented
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention

// Additional strictness - Leave nothing unchecked
#![deny(unused_imports)]              // Unused imports are forbidden
#![deny(unused_variables)]            // Unused variables are forbidden
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity

// ============================================================================
// Crate Documentation
// ============================================================================

//! # op-sync
//!
//! Keeps copies of 1Password secrets in sync with the vault.
//!
//! ## Overview
//!
//! Each entry of the configuration file names a secret, the place it should
//! be copied to, and the `op://` reference it comes from. `op-sync plan`
//! shows what is out of date; `op-sync apply` fixes it. Supported targets:
//!
//! - local files rendered from templates (`template`)
//! - AWS SSM Parameter Store (`aws-ssm`)
//! - AWS Secrets Manager JSON secrets (`aws-secrets-manager`)
//! - GitHub repository, environment and organization secrets (`github`)
//!
//! ## Modules
//!
//! - [`config`]: configuration loading and parameter decoding
//! - [`backend`]: one reconciliation strategy per target type
//! - [`services`]: the `op` CLI, AWS and GitHub clients
//! - [`planner`]: spec selection, planning and apply
//! - [`cli`]: command-line interface
//!
//! ## Example
//!
//! ```yaml
//! secrets:
//!   dotenv:
//!     type: template
//!     output: .env
//!     template: |
//!       DATABASE_URL={{ op://dev/postgres/url }}
//!
//!   api-token:
//!     type: aws-ssm
//!     account: "123456789012"
//!     region: ap-northeast-1
//!     name: /app/api-token
//!     source: op://prod/api/token
//!
//!   db:
//!     type: aws-secrets-manager
//!     account: "123456789012"
//!     region: ap-northeast-1
//!     name: app/db
//!     template:
//!       username: app
//!       password: "{{ op://prod/postgres/password }}"
//!
//!   deploy-key:
//!     type: github
//!     repository: octo/app
//!     environment: production
//!     name: DEPLOY_KEY
//!     source: op://prod/deploy/private-key
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod backend;
pub mod cli;
pub mod config;
pub mod error;
pub mod planner;
pub mod seal;
pub mod services;
pub mod vault;

// ============================================================================
// Re-exports
// ============================================================================

pub use backend::{
    Action, Backend, GitHubBackend, Plan, PlanOutcome, SecretsManagerBackend, SsmBackend,
    TemplateBackend,
};
pub use cli::{Cli, Commands, OutputFormatter};
pub use config::{ConfigHasher, ConfigParser, SyncConfig};
pub use error::{Result, SyncError};
pub use planner::{ExecutionResult, PendingChange, PlanExecutor, Planner};
pub use services::{AwsServices, GitHubClient, OpCli};
pub use vault::VaultRef;
