//! External collaborators.
//!
//! Backends only see the traits in this module. The real implementations
//! shell out to the `op` CLI ([`OpCli`]), call AWS through the SDK
//! ([`AwsServices`]) and call the GitHub REST API ([`GitHubClient`]).
//! Every "does not exist" answer is reported as
//! [`ServiceError::NotFound`](crate::error::ServiceError::NotFound) so
//! backends never inspect SDK or HTTP error shapes.

mod aws;
mod cache;
mod github;
mod op;

pub use aws::AwsServices;
pub use cache::ClientCache;
pub use github::{GITHUB_API_URL_ENV, GitHubClient};
pub use op::{OP_PATH_ENV, OpCli};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use crate::error::Result;

// ============================================================================
// Vault
// ============================================================================

/// Signed-in vault account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct VaultUser {
    /// Account sign-in address.
    #[serde(default)]
    pub url: String,
    /// Account e-mail.
    #[serde(default)]
    pub email: String,
}

/// Vault item metadata.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct VaultItem {
    /// Item id.
    pub id: String,
    /// Item title.
    #[serde(default)]
    pub title: String,
    /// Last time any field of the item changed.
    pub updated_at: DateTime<Utc>,
}

/// Reads a single secret value.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VaultReader: Send + Sync {
    /// Reads the raw bytes behind an `op://` reference.
    async fn read(&self, reference: &str) -> Result<Vec<u8>>;
}

/// Fetches item metadata.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VaultItemGetter: Send + Sync {
    /// Gets `item` from `vault`.
    async fn get_item(&self, vault: &str, item: &str) -> Result<VaultItem>;
}

/// Renders templates containing vault references.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VaultInjector: Send + Sync {
    /// Replaces every reference in `template` with its secret value.
    async fn inject(&self, template: &str) -> Result<Vec<u8>>;
}

/// Vault session introspection.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VaultAccount: Send + Sync {
    /// Returns the signed-in account, failing if the vault is unreachable.
    async fn whoami(&self) -> Result<VaultUser>;
}

// ============================================================================
// AWS
// ============================================================================

/// Cloud identity introspection.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CallerIdentity: Send + Sync {
    /// Returns the account id of the current credentials.
    async fn account_id(&self, region: &str) -> Result<String>;
}

/// Parameter store reads and writes.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ParameterStore: Send + Sync {
    /// Returns the decrypted parameter value.
    async fn get_parameter(&self, region: &str, name: &str) -> Result<String>;

    /// Writes a secure string parameter.
    async fn put_parameter(
        &self,
        region: &str,
        name: &str,
        value: &str,
        overwrite: bool,
    ) -> Result<()>;
}

/// A secret read back from the secret manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteSecret {
    /// Full ARN of the secret.
    pub arn: String,
    /// Current secret string.
    pub value: String,
}

/// Secret manager reads and writes.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SecretsManager: Send + Sync {
    /// Returns the current value of `name`.
    async fn get_secret(&self, region: &str, name: &str) -> Result<RemoteSecret>;

    /// Creates a new secret.
    async fn create_secret(
        &self,
        region: &str,
        name: &str,
        description: &str,
        value: &str,
    ) -> Result<()>;

    /// Stores a new value for the secret identified by `arn`.
    async fn put_secret_value(&self, region: &str, arn: &str, value: &str) -> Result<()>;
}

// ============================================================================
// GitHub
// ============================================================================

/// GitHub subsystem that owns a secret.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Application {
    /// GitHub Actions.
    #[default]
    Actions,
    /// Dependabot.
    Dependabot,
    /// Codespaces.
    Codespaces,
}

impl Application {
    /// Path segment used by the REST API.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Actions => "actions",
            Self::Dependabot => "dependabot",
            Self::Codespaces => "codespaces",
        }
    }
}

impl fmt::Display for Application {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Application {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "actions" => Ok(Self::Actions),
            "dependabot" => Ok(Self::Dependabot),
            "codespaces" => Ok(Self::Codespaces),
            other => Err(format!(
                "unknown application \"{other}\" (want actions, dependabot or codespaces)"
            )),
        }
    }
}

/// Which repositories can use an organization secret.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    /// Every repository in the organization.
    All,
    /// Private and internal repositories.
    #[default]
    Private,
    /// Only the listed repositories.
    Selected,
}

impl FromStr for Visibility {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "all" => Ok(Self::All),
            "private" => Ok(Self::Private),
            "selected" => Ok(Self::Selected),
            other => Err(format!(
                "unknown visibility \"{other}\" (want all, private or selected)"
            )),
        }
    }
}

/// The secret collection a GitHub secret lives in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretScope {
    /// `repos/{owner}/{repo}/{application}/secrets`
    Repository {
        /// Owning subsystem.
        application: Application,
        /// Repository owner.
        owner: String,
        /// Repository name.
        repo: String,
    },
    /// `repositories/{repository_id}/environments/{environment}/secrets`
    Environment {
        /// Numeric repository id.
        repository_id: u64,
        /// Repository owner, for display.
        owner: String,
        /// Repository name, for display.
        repo: String,
        /// Environment name.
        environment: String,
    },
    /// `orgs/{org}/{application}/secrets`
    Organization {
        /// Owning subsystem.
        application: Application,
        /// Organization login.
        org: String,
    },
}

impl SecretScope {
    /// API path of the secret collection, without a leading slash.
    ///
    /// Owner, repository, environment and organization names are
    /// percent-encoded.
    #[must_use]
    pub fn secrets_path(&self) -> String {
        match self {
            Self::Repository {
                application,
                owner,
                repo,
            } => format!(
                "repos/{}/{}/{application}/secrets",
                path_segment(owner),
                path_segment(repo)
            ),
            Self::Environment {
                repository_id,
                environment,
                ..
            } => format!(
                "repositories/{repository_id}/environments/{}/secrets",
                path_segment(environment)
            ),
            Self::Organization { application, org } => {
                format!("orgs/{}/{application}/secrets", path_segment(org))
            }
        }
    }
}

/// Percent-encodes a single URL path segment.
pub(crate) fn path_segment(segment: &str) -> Cow<'_, str> {
    urlencoding::encode(segment)
}

impl fmt::Display for SecretScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Repository { owner, repo, .. } => write!(f, "{owner}/{repo}"),
            Self::Environment {
                owner,
                repo,
                environment,
                ..
            } => write!(f, "{owner}/{repo} environment {environment}"),
            Self::Organization { org, .. } => write!(f, "organization {org}"),
        }
    }
}

/// Secret metadata; GitHub never returns the value.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SecretMetadata {
    /// Secret name.
    pub name: String,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
    /// Organization secrets only.
    #[serde(default)]
    pub visibility: Option<Visibility>,
}

/// Scope public key used for sealing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ScopePublicKey {
    /// Key identifier sent back with the ciphertext.
    pub key_id: String,
    /// Base64 Curve25519 public key.
    pub key: String,
}

/// A sealed secret ready to be stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EncryptedSecret {
    /// Secret name.
    #[serde(skip)]
    pub name: String,
    /// Identifier of the key the value was sealed with.
    pub key_id: String,
    /// Base64 sealed box.
    pub encrypted_value: String,
    /// Organization secrets only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visibility: Option<Visibility>,
    /// Organization secrets with `selected` visibility only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected_repository_ids: Option<Vec<i64>>,
}

/// GitHub secret operations.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GitHubSecrets: Send + Sync {
    /// Looks up the numeric id of `owner/repo`.
    async fn repository_id(&self, owner: &str, repo: &str) -> Result<u64>;

    /// Gets secret metadata.
    async fn get_secret(&self, scope: &SecretScope, name: &str) -> Result<SecretMetadata>;

    /// Gets the public key of a scope.
    async fn public_key(&self, scope: &SecretScope) -> Result<ScopePublicKey>;

    /// Creates or updates a secret.
    async fn put_secret(&self, scope: &SecretScope, secret: &EncryptedSecret) -> Result<()>;

    /// Lists the repositories an organization secret is shared with.
    async fn selected_repository_ids(&self, scope: &SecretScope, name: &str) -> Result<Vec<i64>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secrets_path_per_scope() {
        let repo = SecretScope::Repository {
            application: Application::Dependabot,
            owner: "octo".to_string(),
            repo: "app".to_string(),
        };
        assert_eq!(repo.secrets_path(), "repos/octo/app/dependabot/secrets");

        let org = SecretScope::Organization {
            application: Application::Actions,
            org: "octo-org".to_string(),
        };
        assert_eq!(org.secrets_path(), "orgs/octo-org/actions/secrets");
    }

    #[test]
    fn test_secrets_path_encodes_environment() {
        let scope = SecretScope::Environment {
            repository_id: 42,
            owner: "octo".to_string(),
            repo: "app".to_string(),
            environment: "qa #1/blue?".to_string(),
        };
        assert_eq!(
            scope.secrets_path(),
            "repositories/42/environments/qa%20%231%2Fblue%3F/secrets"
        );
    }
}
