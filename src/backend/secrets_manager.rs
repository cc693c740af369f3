//! Syncs a rendered JSON document into an AWS Secrets Manager secret.
//!
//! The `template` parameter is an arbitrary map. Any string inside it that
//! is exactly `{{ op://... }}` is replaced by the referenced vault value;
//! lists and maps are walked, every other value is kept as is. The rendered
//! document is compared structurally with the stored one.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::config::{ParamReader, Params};
use crate::error::{Result, ServiceError, SyncError, ValidationError};
use crate::services::{CallerIdentity, SecretsManager, VaultReader};
use crate::vault::VaultRef;

use super::{Action, Backend, Plan, PlanOutcome, account_guard, secret_text};

const DESCRIPTION_PREFIX: &str = "managed by op-sync:\n";

/// Backend for `type: aws-secrets-manager`.
pub struct SecretsManagerBackend {
    vault: Arc<dyn VaultReader>,
    identity: Arc<dyn CallerIdentity>,
    secrets: Arc<dyn SecretsManager>,
}

#[derive(Debug)]
struct SecretsManagerArgs {
    account: String,
    region: String,
    name: String,
    template: Map<String, Value>,
    description: Option<String>,
}

impl SecretsManagerArgs {
    fn decode(params: &Params) -> std::result::Result<Self, ValidationError> {
        let mut reader = ParamReader::new(params);
        let account: String = reader.required("account");
        let region: String = reader.required("region");
        let name: String = reader.required("name");
        let template: Map<String, Value> = reader.required("template");
        let description: Option<String> = reader.optional("description");

        let mut references = Vec::new();
        collect_references(&Value::Object(template.clone()), &mut references);
        for reference in &references {
            if let Err(e) = VaultRef::parse(reference) {
                reader.reject("template", e.to_string());
            }
        }

        reader.finish()?;
        Ok(Self {
            account,
            region,
            name,
            template,
            description,
        })
    }

    fn description(&self) -> Result<String> {
        if let Some(description) = &self.description {
            return Ok(description.clone());
        }
        let pretty = serde_json::to_string_pretty(&self.template)
            .map_err(|e| SyncError::internal(format!("failed to marshal the template: {e}")))?;
        Ok(format!("{DESCRIPTION_PREFIX}{pretty}"))
    }
}

/// Returns the reference inside a `{{ ... }}` placeholder.
fn placeholder(value: &str) -> Option<&str> {
    value
        .strip_prefix("{{")
        .and_then(|rest| rest.strip_suffix("}}"))
        .map(str::trim)
}

/// Appends every placeholder reference in `value`, in traversal order.
fn collect_references(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(s) => {
            if let Some(reference) = placeholder(s) {
                if !out.iter().any(|r| r == reference) {
                    out.push(reference.to_string());
                }
            }
        }
        Value::Array(items) => items.iter().for_each(|v| collect_references(v, out)),
        Value::Object(map) => map.values().for_each(|v| collect_references(v, out)),
        Value::Null | Value::Bool(_) | Value::Number(_) => {}
    }
}

/// Rebuilds `value` with every placeholder replaced from `secrets`.
fn substitute(value: &Value, secrets: &HashMap<String, String>) -> Value {
    match value {
        Value::String(s) => placeholder(s)
            .and_then(|reference| secrets.get(reference))
            .map_or_else(|| value.clone(), |secret| Value::String(secret.clone())),
        Value::Array(items) => Value::Array(items.iter().map(|v| substitute(v, secrets)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), substitute(v, secrets)))
                .collect(),
        ),
        Value::Null | Value::Bool(_) | Value::Number(_) => value.clone(),
    }
}

impl SecretsManagerBackend {
    /// Type name in configuration files.
    pub const NAME: &'static str = "aws-secrets-manager";

    /// Creates the backend.
    #[must_use]
    pub fn new(
        vault: Arc<dyn VaultReader>,
        identity: Arc<dyn CallerIdentity>,
        secrets: Arc<dyn SecretsManager>,
    ) -> Self {
        Self {
            vault,
            identity,
            secrets,
        }
    }

    /// Reads every referenced secret once, then renders the template.
    async fn render(&self, template: &Map<String, Value>) -> Result<Value> {
        let template = Value::Object(template.clone());
        let mut references = Vec::new();
        collect_references(&template, &mut references);

        let mut secrets = HashMap::with_capacity(references.len());
        for reference in references {
            let value = secret_text(&reference, self.vault.read(&reference).await?)?;
            secrets.insert(reference, value);
        }

        Ok(substitute(&template, &secrets))
    }
}

#[async_trait]
impl Backend for SecretsManagerBackend {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn validate(&self, params: &Params) -> Result<()> {
        SecretsManagerArgs::decode(params)?;
        Ok(())
    }

    async fn plan(&self, params: &Params) -> Result<PlanOutcome> {
        let args = SecretsManagerArgs::decode(params)?;
        let description = args.description()?;

        let guard = account_guard(self.identity.as_ref(), &args.region, &args.account).await?;
        if let Some(skip) = guard {
            return Ok(skip);
        }

        let rendered = self.render(&args.template).await?;
        let value = serde_json::to_string(&rendered)
            .map_err(|e| SyncError::internal(format!("failed to marshal the secret value: {e}")))?;

        let remote = match self.secrets.get_secret(&args.region, &args.name).await {
            Ok(remote) => remote,
            Err(e) if e.is_not_found() => {
                return Ok(PlanOutcome::single(CreateSecretPlan {
                    secrets: Arc::clone(&self.secrets),
                    account: args.account,
                    region: args.region,
                    name: args.name,
                    description,
                    value,
                }));
            }
            Err(e) => return Err(e),
        };

        let current: Value = serde_json::from_str(&remote.value).map_err(|e| {
            ServiceError::invalid_response(
                "AWS Secrets Manager",
                format!("secret {} is not a JSON document: {e}", args.name),
            )
        })?;
        if current == rendered {
            debug!("Secret {} is up to date", args.name);
            return Ok(PlanOutcome::converged());
        }

        Ok(PlanOutcome::single(UpdateSecretPlan {
            secrets: Arc::clone(&self.secrets),
            region: args.region,
            arn: remote.arn,
            value,
        }))
    }
}

/// Creates a secret that does not exist yet.
pub struct CreateSecretPlan {
    secrets: Arc<dyn SecretsManager>,
    account: String,
    region: String,
    name: String,
    description: String,
    value: String,
}

#[async_trait]
impl Plan for CreateSecretPlan {
    fn preview(&self) -> String {
        format!(
            "create AWS Secrets Manager secret {} on account {}",
            self.name, self.account
        )
    }

    fn action(&self) -> Action {
        Action::Create
    }

    async fn apply(&self) -> Result<()> {
        self.secrets
            .create_secret(&self.region, &self.name, &self.description, &self.value)
            .await
    }
}

/// Stores a new value for an existing secret, addressed by ARN.
pub struct UpdateSecretPlan {
    secrets: Arc<dyn SecretsManager>,
    region: String,
    arn: String,
    value: String,
}

#[async_trait]
impl Plan for UpdateSecretPlan {
    fn preview(&self) -> String {
        format!("update AWS Secrets Manager secret {}", self.arn)
    }

    fn action(&self) -> Action {
        Action::Update
    }

    async fn apply(&self) -> Result<()> {
        self.secrets
            .put_secret_value(&self.region, &self.arn, &self.value)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::testing::params;
    use crate::services::{MockCallerIdentity, MockSecretsManager, MockVaultReader, RemoteSecret};
    use mockall::predicate::eq;
    use serde_json::json;

    const ACCOUNT: &str = "123456789012";
    const ARN: &str = "arn:aws:secretsmanager:us-east-1:123456789012:secret:app/db-AbCdEf";

    fn identity() -> Arc<MockCallerIdentity> {
        let mut identity = MockCallerIdentity::new();
        identity
            .expect_account_id()
            .returning(|_| Ok(ACCOUNT.to_string()));
        Arc::new(identity)
    }

    fn vault() -> Arc<MockVaultReader> {
        let mut vault = MockVaultReader::new();
        vault
            .expect_read()
            .with(eq("op://vault/item/field"))
            .returning(|_| Ok(b"secret".to_vec()));
        Arc::new(vault)
    }

    fn spec(template: Value) -> Params {
        params(json!({
            "type": "aws-secrets-manager",
            "account": ACCOUNT,
            "region": "us-east-1",
            "name": "app/db",
            "template": template
        }))
    }

    #[tokio::test]
    async fn test_absent_secret_is_created_with_generated_description() {
        let template = json!({"password": "{{ op://vault/item/field }}"});
        let expected_description = format!(
            "managed by op-sync:\n{}",
            serde_json::to_string_pretty(&template).expect("json")
        );

        let mut secrets = MockSecretsManager::new();
        secrets
            .expect_get_secret()
            .with(eq("us-east-1"), eq("app/db"))
            .returning(|_, name| Err(ServiceError::not_found("AWS Secrets Manager", name).into()));
        secrets
            .expect_create_secret()
            .withf(move |region, name, description, value| {
                region == "us-east-1"
                    && name == "app/db"
                    && description == expected_description
                    && value == r#"{"password":"secret"}"#
            })
            .times(1)
            .returning(|_, _, _, _| Ok(()));
        secrets.expect_put_secret_value().never();

        let backend = SecretsManagerBackend::new(vault(), identity(), Arc::new(secrets));
        let plans = backend.plan(&spec(template)).await.expect("plan").into_plans();

        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].action(), Action::Create);
        assert_eq!(
            plans[0].preview(),
            "create AWS Secrets Manager secret app/db on account 123456789012"
        );
        plans[0].apply().await.expect("apply");
    }

    #[tokio::test]
    async fn test_structurally_equal_secret_is_noop() {
        let mut secrets = MockSecretsManager::new();
        secrets.expect_get_secret().returning(|_, _| {
            Ok(RemoteSecret {
                arn: ARN.to_string(),
                value: r#"{ "port": 5432, "hosts": ["a", "b"], "password": "secret" }"#.to_string(),
            })
        });

        let backend = SecretsManagerBackend::new(vault(), identity(), Arc::new(secrets));
        let outcome = backend
            .plan(&spec(json!({
                "password": "{{ op://vault/item/field }}",
                "hosts": ["a", "b"],
                "port": 5432
            })))
            .await
            .expect("plan");

        assert!(outcome.into_plans().is_empty());
    }

    #[tokio::test]
    async fn test_changed_secret_is_updated_by_arn() {
        let mut secrets = MockSecretsManager::new();
        secrets.expect_get_secret().returning(|_, _| {
            Ok(RemoteSecret {
                arn: ARN.to_string(),
                value: r#"{"password":"old"}"#.to_string(),
            })
        });
        secrets
            .expect_put_secret_value()
            .with(eq("us-east-1"), eq(ARN), eq(r#"{"password":"secret"}"#))
            .times(1)
            .returning(|_, _, _| Ok(()));
        secrets.expect_create_secret().never();

        let backend = SecretsManagerBackend::new(vault(), identity(), Arc::new(secrets));
        let plans = backend
            .plan(&spec(json!({"password": "{{ op://vault/item/field }}"})))
            .await
            .expect("plan")
            .into_plans();

        assert_eq!(plans[0].preview(), format!("update AWS Secrets Manager secret {ARN}"));
        plans[0].apply().await.expect("apply");
    }

    #[tokio::test]
    async fn test_other_account_is_skipped_without_reads() {
        let mut identity = MockCallerIdentity::new();
        identity
            .expect_account_id()
            .with(eq("us-east-1"))
            .returning(|_| Ok("999999999999".to_string()));
        let mut vault = MockVaultReader::new();
        vault.expect_read().never();
        let mut secrets = MockSecretsManager::new();
        secrets.expect_get_secret().never();
        secrets.expect_create_secret().never();
        secrets.expect_put_secret_value().never();

        let backend =
            SecretsManagerBackend::new(Arc::new(vault), Arc::new(identity), Arc::new(secrets));
        let outcome = backend
            .plan(&spec(json!({"password": "{{ op://vault/item/field }}"})))
            .await
            .expect("plan");

        assert!(matches!(outcome, PlanOutcome::NotApplicable { .. }));
        assert!(outcome.into_plans().is_empty());
    }

    #[tokio::test]
    async fn test_non_json_remote_value_fails() {
        let mut secrets = MockSecretsManager::new();
        secrets.expect_get_secret().returning(|_, _| {
            Ok(RemoteSecret {
                arn: ARN.to_string(),
                value: "plain text".to_string(),
            })
        });

        let backend = SecretsManagerBackend::new(vault(), identity(), Arc::new(secrets));
        let err = backend
            .plan(&spec(json!({"password": "{{ op://vault/item/field }}"})))
            .await
            .expect_err("not json");
        assert!(err.to_string().contains("not a JSON document"));
    }

    #[test]
    fn test_render_walks_nested_structures() {
        let template = json!({
            "db": {"user": "admin", "password": "{{op://vault/item/field}}"},
            "list": ["{{ op://vault/item/field }}", 1, true, null],
            "literal": "not {{ a placeholder }} here"
        });
        let secrets = HashMap::from([("op://vault/item/field".to_string(), "s".to_string())]);

        let rendered = substitute(&template, &secrets);

        assert_eq!(
            rendered,
            json!({
                "db": {"user": "admin", "password": "s"},
                "list": ["s", 1, true, null],
                "literal": "not {{ a placeholder }} here"
            })
        );
    }

    #[test]
    fn test_references_are_collected_once() {
        let mut refs = Vec::new();
        collect_references(
            &json!({"a": "{{ op://v/i/f }}", "b": ["{{ op://v/i/f }}", "{{ op://v/i/g }}"]}),
            &mut refs,
        );
        assert_eq!(refs, vec!["op://v/i/f", "op://v/i/g"]);
    }

    #[test]
    fn test_explicit_description_wins() {
        let mut p = spec(json!({"k": "v"}));
        p.insert("description".to_string(), json!("database credentials"));
        let args = SecretsManagerArgs::decode(&p).expect("valid");
        assert_eq!(args.description().expect("description"), "database credentials");
    }

    #[test]
    fn test_template_must_be_map_and_references_valid() {
        let backend = SecretsManagerBackend::new(
            Arc::new(MockVaultReader::new()),
            Arc::new(MockCallerIdentity::new()),
            Arc::new(MockSecretsManager::new()),
        );

        assert!(backend.validate(&spec(json!("string template"))).is_err());
        assert!(backend.validate(&spec(json!({"k": "{{ https://x/y/z }}"}))).is_err());
        assert!(backend.validate(&spec(json!({"k": "{{ op://v/i/f }}"}))).is_ok());
    }
}
