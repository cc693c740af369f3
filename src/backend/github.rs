//! Syncs one vault value into a GitHub repository, environment or
//! organization secret.
//!
//! GitHub never returns secret values, so staleness is decided by time: the
//! remote secret is current only if it was updated strictly after the vault
//! item. Values are sealed with the scope's public key during planning, so
//! applying is a single PUT.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use crate::config::{ParamReader, Params};
use crate::error::{Result, ServiceError, ValidationError};
use crate::seal::seal;
use crate::services::{
    Application, EncryptedSecret, GitHubSecrets, SecretMetadata, SecretScope, VaultItemGetter,
    VaultReader, Visibility,
};
use crate::vault::VaultRef;

use super::{Action, Backend, Plan, PlanOutcome};

/// Backend for `type: github`.
pub struct GitHubBackend {
    vault: Arc<dyn VaultReader>,
    items: Arc<dyn VaultItemGetter>,
    github: Arc<dyn GitHubSecrets>,
}

#[derive(Debug)]
enum Target {
    Repository {
        owner: String,
        repo: String,
        environment: Option<String>,
    },
    Organization {
        org: String,
        visibility: Visibility,
        repositories: Vec<String>,
    },
}

#[derive(Debug)]
struct GitHubArgs {
    target: Target,
    application: Application,
    name: String,
    source: VaultRef,
}

impl GitHubArgs {
    fn decode(params: &Params) -> std::result::Result<Self, ValidationError> {
        let mut reader = ParamReader::new(params);
        let repository: Option<String> = reader.optional("repository");
        let organization: Option<String> = reader.optional("organization");
        let environment: Option<String> = reader.optional("environment");
        let application: Option<String> = reader.optional("application");
        let visibility: Option<String> = reader.optional("visibility");
        let repositories: Option<Vec<String>> = reader.optional("repositories");
        let name: String = reader.required("name");
        let source: String = reader.required("source");

        let application = match application.as_deref().map(str::parse::<Application>) {
            None => Application::default(),
            Some(Ok(app)) => app,
            Some(Err(e)) => {
                reader.reject("application", e);
                Application::default()
            }
        };

        let source = if reader.has_errors_for("source") {
            None
        } else {
            VaultRef::parse(&source)
                .map_err(|e| reader.reject("source", e.reason))
                .ok()
        };

        let target = match (repository, organization) {
            (Some(_), Some(_)) => {
                reader.reject("organization", "cannot be combined with repository");
                None
            }
            (None, None) => {
                if !reader.has_errors_for("repository") && !reader.has_errors_for("organization") {
                    reader.reject("repository", "one of repository or organization is required");
                }
                None
            }
            (Some(repository), None) => {
                let org_only = [
                    ("visibility", visibility.is_some()),
                    ("repositories", repositories.is_some()),
                ];
                for (key, _) in org_only.into_iter().filter(|(_, present)| *present) {
                    reader.reject(key, "is only allowed for organization secrets");
                }
                decode_repository(&mut reader, &repository, environment, application)
            }
            (None, Some(org)) => decode_organization(
                &mut reader,
                org,
                environment.as_deref(),
                visibility,
                repositories,
            ),
        };

        let (Some(target), Some(source)) = (target, source) else {
            return Err(reader.finish().err().unwrap_or_default());
        };
        reader.finish()?;
        Ok(Self {
            target,
            application,
            name,
            source,
        })
    }

    /// Vault and item whose update time the remote secret is compared to.
    fn item(&self) -> (&str, &str) {
        (&self.source.vault, &self.source.item)
    }
}

fn decode_repository(
    reader: &mut ParamReader<'_>,
    repository: &str,
    environment: Option<String>,
    application: Application,
) -> Option<Target> {
    let Some((owner, repo)) = repository
        .split_once('/')
        .filter(|(o, r)| !o.is_empty() && !r.is_empty() && !r.contains('/'))
    else {
        reader.reject("repository", format!("\"{repository}\" is not in owner/repo form"));
        return None;
    };
    if environment.is_some() && application != Application::Actions {
        let message = format!("{application} secrets cannot be scoped to an environment");
        reader.reject("environment", message);
        return None;
    }
    Some(Target::Repository {
        owner: owner.to_string(),
        repo: repo.to_string(),
        environment,
    })
}

fn decode_organization(
    reader: &mut ParamReader<'_>,
    org: String,
    environment: Option<&str>,
    visibility: Option<String>,
    repositories: Option<Vec<String>>,
) -> Option<Target> {
    if environment.is_some() {
        reader.reject("environment", "requires repository");
        return None;
    }
    let visibility = match visibility.as_deref().map(str::parse::<Visibility>) {
        None => Visibility::default(),
        Some(Ok(v)) => v,
        Some(Err(e)) => {
            reader.reject("visibility", e);
            return None;
        }
    };
    let repositories = match (visibility, repositories) {
        (Visibility::Selected, Some(repos)) if !repos.is_empty() => repos,
        (Visibility::Selected, _) => {
            reader.reject("repositories", "is required when visibility is selected");
            return None;
        }
        (_, Some(_)) => {
            reader.reject("repositories", "is only allowed when visibility is selected");
            return None;
        }
        (_, None) => Vec::new(),
    };
    Some(Target::Organization {
        org,
        visibility,
        repositories,
    })
}

impl GitHubBackend {
    /// Type name in configuration files.
    pub const NAME: &'static str = "github";

    /// Creates the backend.
    #[must_use]
    pub fn new(
        vault: Arc<dyn VaultReader>,
        items: Arc<dyn VaultItemGetter>,
        github: Arc<dyn GitHubSecrets>,
    ) -> Self {
        Self {
            vault,
            items,
            github,
        }
    }

    async fn scope(&self, args: &GitHubArgs) -> Result<SecretScope> {
        Ok(match &args.target {
            Target::Repository {
                owner,
                repo,
                environment: None,
            } => SecretScope::Repository {
                application: args.application,
                owner: owner.clone(),
                repo: repo.clone(),
            },
            Target::Repository {
                owner,
                repo,
                environment: Some(environment),
            } => SecretScope::Environment {
                repository_id: self.github.repository_id(owner, repo).await?,
                owner: owner.clone(),
                repo: repo.clone(),
                environment: environment.clone(),
            },
            Target::Organization { org, .. } => SecretScope::Organization {
                application: args.application,
                org: org.clone(),
            },
        })
    }

    /// Visibility and repository access to submit for organization secrets.
    async fn access(
        &self,
        args: &GitHubArgs,
        scope: &SecretScope,
        remote: Option<&SecretMetadata>,
    ) -> Result<(Option<Visibility>, Option<Vec<i64>>)> {
        let Target::Organization {
            org,
            visibility,
            repositories,
        } = &args.target
        else {
            return Ok((None, None));
        };

        // Updates keep whatever access the secret already has.
        if let Some(remote) = remote {
            let visibility = remote.visibility.unwrap_or(*visibility);
            let ids = if visibility == Visibility::Selected {
                Some(self.github.selected_repository_ids(scope, &args.name).await?)
            } else {
                None
            };
            return Ok((Some(visibility), ids));
        }

        if *visibility != Visibility::Selected {
            return Ok((Some(*visibility), None));
        }
        let mut ids = Vec::with_capacity(repositories.len());
        for repo in repositories {
            let id = self.github.repository_id(org, repo).await?;
            ids.push(i64::try_from(id).map_err(|_| {
                ServiceError::invalid_response("GitHub", format!("repository id {id} out of range"))
            })?);
        }
        Ok((Some(Visibility::Selected), Some(ids)))
    }
}

#[async_trait]
impl Backend for GitHubBackend {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn validate(&self, params: &Params) -> Result<()> {
        GitHubArgs::decode(params)?;
        Ok(())
    }

    async fn plan(&self, params: &Params) -> Result<PlanOutcome> {
        let args = GitHubArgs::decode(params)?;
        let scope = self.scope(&args).await?;

        let remote = match self.github.get_secret(&scope, &args.name).await {
            Ok(remote) => Some(remote),
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(e),
        };

        if let Some(remote) = &remote {
            let (vault, item) = args.item();
            let item = self.items.get_item(vault, item).await?;
            if remote.updated_at > item.updated_at {
                debug!("Secret {} in {} is newer than the vault item", args.name, scope);
                return Ok(PlanOutcome::converged());
            }
        }

        let key = self.github.public_key(&scope).await?;
        let value = self.vault.read(args.source.as_str()).await?;
        let encrypted_value = seal(&value, &key.key)?;
        let (visibility, selected_repository_ids) =
            self.access(&args, &scope, remote.as_ref()).await?;

        Ok(PlanOutcome::single(GitHubSecretPlan {
            github: Arc::clone(&self.github),
            application: args.application,
            secret: EncryptedSecret {
                name: args.name,
                key_id: key.key_id,
                encrypted_value,
                visibility,
                selected_repository_ids,
            },
            scope,
            action: if remote.is_some() {
                Action::Update
            } else {
                Action::Create
            },
        }))
    }
}

/// Stores a sealed secret.
pub struct GitHubSecretPlan {
    github: Arc<dyn GitHubSecrets>,
    application: Application,
    scope: SecretScope,
    secret: EncryptedSecret,
    action: Action,
}

#[async_trait]
impl Plan for GitHubSecretPlan {
    fn preview(&self) -> String {
        let prefix = if self.application == Application::Actions {
            String::new()
        } else {
            format!("{} ", self.application)
        };
        format!(
            "{prefix}secret \"{}\" in {} will be {}",
            self.secret.name,
            self.scope,
            self.action.verb()
        )
    }

    fn action(&self) -> Action {
        self.action
    }

    async fn apply(&self) -> Result<()> {
        self.github.put_secret(&self.scope, &self.secret).await
    }
}
