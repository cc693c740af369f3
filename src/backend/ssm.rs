//! Syncs one vault value into an SSM Parameter Store secure string.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use crate::config::{ParamReader, Params};
use crate::error::{Result, ValidationError};
use crate::services::{CallerIdentity, ParameterStore, VaultReader};

use super::{Action, Backend, Plan, PlanOutcome, account_guard, check_reference, secret_text};

/// Backend for `type: aws-ssm`.
pub struct SsmBackend {
    vault: Arc<dyn VaultReader>,
    identity: Arc<dyn CallerIdentity>,
    store: Arc<dyn ParameterStore>,
}

#[derive(Debug)]
struct SsmArgs {
    account: String,
    region: String,
    name: String,
    source: String,
}

impl SsmArgs {
    fn decode(params: &Params) -> std::result::Result<Self, ValidationError> {
        let mut reader = ParamReader::new(params);
        let account: String = reader.required("account");
        let region: String = reader.required("region");
        let name: String = reader.required("name");
        let source: String = reader.required("source");
        check_reference(&mut reader, "source", &source);
        reader.finish()?;
        Ok(Self {
            account,
            region,
            name,
            source,
        })
    }
}

impl SsmBackend {
    /// Type name in configuration files.
    pub const NAME: &'static str = "aws-ssm";

    /// Creates the backend.
    #[must_use]
    pub fn new(
        vault: Arc<dyn VaultReader>,
        identity: Arc<dyn CallerIdentity>,
        store: Arc<dyn ParameterStore>,
    ) -> Self {
        Self {
            vault,
            identity,
            store,
        }
    }
}

#[async_trait]
impl Backend for SsmBackend {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn validate(&self, params: &Params) -> Result<()> {
        SsmArgs::decode(params)?;
        Ok(())
    }

    async fn plan(&self, params: &Params) -> Result<PlanOutcome> {
        let args = SsmArgs::decode(params)?;

        let guard = account_guard(self.identity.as_ref(), &args.region, &args.account).await?;
        if let Some(skip) = guard {
            return Ok(skip);
        }

        let secret = secret_text(&args.source, self.vault.read(&args.source).await?)?;

        let action = match self.store.get_parameter(&args.region, &args.name).await {
            Ok(current) if current == secret => {
                debug!("Parameter {} is up to date", args.name);
                return Ok(PlanOutcome::converged());
            }
            Ok(_) => Action::Update,
            Err(e) if e.is_not_found() => Action::Create,
            Err(e) => return Err(e),
        };

        Ok(PlanOutcome::single(SsmPlan {
            store: Arc::clone(&self.store),
            account: args.account,
            region: args.region,
            name: args.name,
            value: secret,
            action,
        }))
    }
}

/// Puts the parameter, overwriting only when it already exists.
pub struct SsmPlan {
    store: Arc<dyn ParameterStore>,
    account: String,
    region: String,
    name: String,
    value: String,
    action: Action,
}

#[async_trait]
impl Plan for SsmPlan {
    fn preview(&self) -> String {
        format!(
            "aws ssm parameter store {} on account {} will be {}",
            self.name,
            self.account,
            self.action.verb()
        )
    }

    fn action(&self) -> Action {
        self.action
    }

    async fn apply(&self) -> Result<()> {
        let overwrite = self.action == Action::Update;
        self.store
            .put_parameter(&self.region, &self.name, &self.value, overwrite)
            .await
    }
}
