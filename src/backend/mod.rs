//! Sync backends.
//!
//! A [`Backend`] turns one spec's parameters into the changes needed to
//! bring its target in line with the vault. Planning only reads; every
//! mutation lives in a [`Plan`]'s `apply`.
//!
//! | Type | Target | Converged when |
//! |------|--------|----------------|
//! | `template` | local file | rendered bytes equal the file |
//! | `aws-ssm` | SSM parameter | decrypted value equals the vault value |
//! | `aws-secrets-manager` | Secrets Manager secret | parsed JSON documents are equal |
//! | `github` | repo, environment or org secret | remote updated after the vault item |

mod github;
mod secrets_manager;
mod ssm;
mod template;

pub use github::GitHubBackend;
pub use secrets_manager::SecretsManagerBackend;
pub use ssm::SsmBackend;
pub use template::TemplateBackend;

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;

use crate::config::Params;
use crate::error::Result;

/// Kind of mutation a plan performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// The target does not exist yet.
    Create,
    /// The target exists but differs.
    Update,
}

impl Action {
    /// Past-tense verb used in previews.
    #[must_use]
    pub const fn verb(self) -> &'static str {
        match self {
            Self::Create => "created",
            Self::Update => "updated",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => f.write_str("create"),
            Self::Update => f.write_str("update"),
        }
    }
}

/// One resolved, not yet applied mutation.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Plan: Send + Sync {
    /// Human readable description. Pure.
    fn preview(&self) -> String;

    /// Whether this creates or updates the target.
    fn action(&self) -> Action;

    /// Performs the mutation. Called at most once.
    async fn apply(&self) -> Result<()>;
}

/// What planning decided for one spec.
pub enum PlanOutcome {
    /// The spec applies here; an empty list means already converged.
    Applicable(Vec<Box<dyn Plan>>),
    /// The spec is scoped to another account and was skipped.
    NotApplicable {
        /// Why it was skipped.
        reason: String,
    },
}

impl PlanOutcome {
    /// The already-converged outcome.
    #[must_use]
    pub const fn converged() -> Self {
        Self::Applicable(Vec::new())
    }

    /// A single pending change.
    #[must_use]
    pub fn single(plan: impl Plan + 'static) -> Self {
        Self::Applicable(vec![Box::new(plan)])
    }

    /// The pending changes; empty for converged and skipped specs.
    #[cfg(test)]
    pub(crate) fn into_plans(self) -> Vec<Box<dyn Plan>> {
        match self {
            Self::Applicable(plans) => plans,
            Self::NotApplicable { .. } => Vec::new(),
        }
    }
}

impl fmt::Debug for PlanOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Applicable(plans) => f
                .debug_tuple("Applicable")
                .field(&plans.iter().map(|p| p.preview()).collect::<Vec<_>>())
                .finish(),
            Self::NotApplicable { reason } => f
                .debug_struct("NotApplicable")
                .field("reason", reason)
                .finish(),
        }
    }
}

/// Reconciliation strategy for one target type.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Backend: Send + Sync {
    /// The `type` value this backend handles.
    fn name(&self) -> &'static str;

    /// Decodes the parameters without any I/O.
    ///
    /// # Errors
    ///
    /// Returns every missing or mistyped field at once.
    fn validate(&self, params: &Params) -> Result<()>;

    /// Reads remote state and decides what to change. Never mutates.
    ///
    /// # Errors
    ///
    /// Returns validation, service or crypto errors for this spec.
    async fn plan(&self, params: &Params) -> Result<PlanOutcome>;
}

/// Checks the current account against the one a spec is pinned to.
async fn account_guard(
    identity: &dyn crate::services::CallerIdentity,
    region: &str,
    account: &str,
) -> Result<Option<PlanOutcome>> {
    let current = identity.account_id(region).await?;
    if current == account {
        Ok(None)
    } else {
        tracing::info!("Skipping: account {} is not {}", current, account);
        Ok(Some(PlanOutcome::NotApplicable {
            reason: format!("current account {current} is not {account}"),
        }))
    }
}

/// Text targets cannot hold arbitrary bytes.
fn secret_text(reference: &str, bytes: Vec<u8>) -> Result<String> {
    String::from_utf8(bytes).map_err(|_| {
        crate::error::ServiceError::invalid_response(
            "1Password CLI",
            format!("value of {reference} is not valid UTF-8"),
        )
        .into()
    })
}

/// Records an error on `source` unless it is a vault reference.
fn check_reference(reader: &mut crate::config::ParamReader<'_>, key: &str, reference: &str) {
    if reader.has_errors_for(key) {
        return;
    }
    if let Err(e) = crate::vault::VaultRef::parse(reference) {
        reader.reject(key, e.reason);
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Helpers shared by backend tests.

    use serde_json::Value;

    use crate::config::Params;

    /// Builds a parameter bag from a JSON object literal.
    pub fn params(value: Value) -> Params {
        value.as_object().cloned().expect("params must be an object")
    }
}
