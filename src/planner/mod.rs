//! Planning and applying sync changes.
//!
//! The [`Planner`] dispatches each selected spec to the backend named by
//! its `type` and collects the resulting plans. Planning is all-or-nothing:
//! every spec is attempted, and if any of them fails the whole pass fails
//! and no plans are returned. The [`PlanExecutor`] then applies plans in
//! order and stops at the first failure.

mod executor;

pub use executor::{ExecutionResult, PlanExecutor};

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::backend::{Action, Backend, Plan, PlanOutcome};
use crate::config::{Spec, SyncConfig};
use crate::error::{PlanError, Result, SpecFailure, SyncError};
use crate::services::VaultAccount;

/// A plan together with the spec it came from.
pub struct PendingChange {
    /// Spec name.
    pub spec: String,
    /// The change itself.
    pub plan: Box<dyn Plan>,
}

impl PendingChange {
    /// Human readable description of the change.
    #[must_use]
    pub fn preview(&self) -> String {
        self.plan.preview()
    }

    /// Whether the change creates or updates its target.
    #[must_use]
    pub fn action(&self) -> Action {
        self.plan.action()
    }
}

impl fmt::Debug for PendingChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingChange")
            .field("spec", &self.spec)
            .field("preview", &self.plan.preview())
            .finish()
    }
}

/// Dispatches specs to backends.
pub struct Planner {
    backends: BTreeMap<&'static str, Arc<dyn Backend>>,
    account: Arc<dyn VaultAccount>,
    cancel: CancellationToken,
}

impl Planner {
    /// Creates a planner with no backends registered.
    #[must_use]
    pub fn new(account: Arc<dyn VaultAccount>, cancel: CancellationToken) -> Self {
        Self {
            backends: BTreeMap::new(),
            account,
            cancel,
        }
    }

    /// Registers a backend under its own name, replacing any previous one.
    #[must_use]
    pub fn with_backend(mut self, backend: Arc<dyn Backend>) -> Self {
        self.backends.insert(backend.name(), backend);
        self
    }

    /// Plans every configured spec.
    ///
    /// # Errors
    ///
    /// Returns an error if the vault is unreachable, if any spec fails to
    /// plan, or if the pass is cancelled.
    pub async fn plan_all(&self, config: &SyncConfig) -> Result<Vec<PendingChange>> {
        let names: Vec<&str> = config.names().collect();
        self.plan_specs(config, &names).await
    }

    /// Plans the named specs, in lexicographic order.
    ///
    /// # Errors
    ///
    /// Returns [`PlanError::UnknownSpecs`] listing every name that is not
    /// configured, before anything is planned. Otherwise fails like
    /// [`Planner::plan_all`].
    pub async fn plan_names<S: AsRef<str>>(
        &self,
        config: &SyncConfig,
        names: &[S],
    ) -> Result<Vec<PendingChange>> {
        let selected: BTreeSet<&str> = names.iter().map(AsRef::as_ref).collect();
        let unknown: Vec<String> = selected
            .iter()
            .filter(|name| !config.secrets.contains_key(**name))
            .map(|name| (*name).to_string())
            .collect();
        if !unknown.is_empty() {
            return Err(PlanError::UnknownSpecs { names: unknown }.into());
        }
        let names: Vec<&str> = selected.into_iter().collect();
        self.plan_specs(config, &names).await
    }

    /// Plans every spec of one backend type.
    ///
    /// # Errors
    ///
    /// Returns [`PlanError::UnknownBackend`] if no backend handles
    /// `backend`. Otherwise fails like [`Planner::plan_all`].
    pub async fn plan_type(
        &self,
        config: &SyncConfig,
        backend: &str,
    ) -> Result<Vec<PendingChange>> {
        self.backend(backend)?;
        let names = config.names_of_type(backend)?;
        self.plan_specs(config, &names).await
    }

    /// Decodes every spec without any I/O.
    ///
    /// Returns the number of specs checked.
    ///
    /// # Errors
    ///
    /// Returns [`PlanError::SpecsFailed`] with one entry per invalid spec.
    pub fn validate_all(&self, config: &SyncConfig) -> Result<usize> {
        let mut failures = Vec::new();
        let mut checked = 0;
        for name in config.names() {
            checked += 1;
            let result = self
                .resolve(config, name)
                .and_then(|(spec, backend)| backend.validate(spec.params));
            if let Err(error) = result {
                failures.push(SpecFailure {
                    spec: name.to_string(),
                    error,
                });
            }
        }
        if failures.is_empty() {
            Ok(checked)
        } else {
            Err(PlanError::SpecsFailed { failures }.into())
        }
    }

    async fn plan_specs(&self, config: &SyncConfig, names: &[&str]) -> Result<Vec<PendingChange>> {
        let user = tokio::select! {
            biased;
            () = self.cancel.cancelled() => return Err(SyncError::Cancelled),
            user = self.account.whoami() => user?,
        };
        info!("Signed in to {} as {}", user.url, user.email);

        let mut changes = Vec::new();
        let mut failures = Vec::new();

        for name in names {
            match self.plan_spec(config, name).await {
                Ok(PlanOutcome::Applicable(plans)) => {
                    if plans.is_empty() {
                        debug!("Spec {} is up to date", name);
                    }
                    changes.extend(plans.into_iter().map(|plan| PendingChange {
                        spec: (*name).to_string(),
                        plan,
                    }));
                }
                Ok(PlanOutcome::NotApplicable { reason }) => {
                    info!("Spec {} skipped: {}", name, reason);
                }
                Err(SyncError::Cancelled) => return Err(SyncError::Cancelled),
                Err(error) => failures.push(SpecFailure {
                    spec: (*name).to_string(),
                    error,
                }),
            }
        }

        if failures.is_empty() {
            info!("Planned {} change(s) across {} spec(s)", changes.len(), names.len());
            Ok(changes)
        } else {
            Err(PlanError::SpecsFailed { failures }.into())
        }
    }

    async fn plan_spec(&self, config: &SyncConfig, name: &str) -> Result<PlanOutcome> {
        let (spec, backend) = self.resolve(config, name)?;
        debug!("Planning {} with backend {}", spec.name, spec.backend);
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(SyncError::Cancelled),
            outcome = backend.plan(spec.params) => outcome,
        }
    }

    fn resolve<'c>(
        &self,
        config: &'c SyncConfig,
        name: &str,
    ) -> Result<(Spec<'c>, &Arc<dyn Backend>)> {
        let spec = config
            .spec(name)?
            .ok_or_else(|| PlanError::UnknownSpecs {
                names: vec![name.to_string()],
            })?;
        let backend = self.backend(spec.backend)?;
        Ok((spec, backend))
    }

    fn backend(&self, name: &str) -> Result<&Arc<dyn Backend>> {
        self.backends.get(name).ok_or_else(|| {
            PlanError::UnknownBackend {
                backend: name.to_string(),
            }
            .into()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MockBackend, MockPlan};
    use crate::error::{FieldError, ValidationError};
    use crate::services::{MockVaultAccount, VaultUser};
    use serde_json::json;

    fn config(value: serde_json::Value) -> SyncConfig {
        serde_json::from_value(value).expect("valid config")
    }

    fn account() -> Arc<MockVaultAccount> {
        let mut account = MockVaultAccount::new();
        account.expect_whoami().returning(|| {
            Ok(VaultUser {
                url: "my.1password.com".to_string(),
                email: "ops@example.com".to_string(),
            })
        });
        Arc::new(account)
    }

    fn plan(preview: &'static str) -> Box<dyn Plan> {
        let mut plan = MockPlan::new();
        plan.expect_preview().return_const(preview.to_string());
        plan.expect_action().return_const(Action::Create);
        Box::new(plan)
    }

    /// A backend that requires `name` and plans one change named after it.
    fn backend(type_name: &'static str) -> Arc<MockBackend> {
        let mut backend = MockBackend::new();
        backend.expect_name().return_const(type_name);
        let check = |params: &crate::config::Params| -> Result<()> {
            if params.contains_key("name") {
                Ok(())
            } else {
                Err(ValidationError {
                    errors: vec![FieldError::Missing {
                        key: "name".to_string(),
                    }],
                }
                .into())
            }
        };
        backend.expect_validate().returning(check);
        backend.expect_plan().returning(move |params| {
            check(params)?;
            let name = params["name"].as_str().unwrap_or_default();
            Ok(PlanOutcome::Applicable(vec![plan(if name == "a" { "plan a" } else { "plan b" })]))
        });
        Arc::new(backend)
    }

    fn planner() -> Planner {
        Planner::new(account(), CancellationToken::new())
            .with_backend(backend("template"))
            .with_backend(backend("aws-ssm"))
    }

    #[tokio::test]
    async fn test_plans_in_lexicographic_order() {
        let cfg = config(json!({"secrets": {
            "zeta": {"type": "template", "name": "b"},
            "alpha": {"type": "aws-ssm", "name": "a"}
        }}));

        let changes = planner().plan_all(&cfg).await.expect("plan");

        let specs: Vec<_> = changes.iter().map(|c| c.spec.as_str()).collect();
        assert_eq!(specs, vec!["alpha", "zeta"]);
        assert_eq!(changes[0].preview(), "plan a");
    }

    #[tokio::test]
    async fn test_one_invalid_spec_discards_all_plans() {
        let cfg = config(json!({"secrets": {
            "bad": {"type": "template"},
            "good": {"type": "template", "name": "a"}
        }}));

        let err = planner().plan_all(&cfg).await.expect_err("bad spec");

        let message = err.to_string();
        assert!(message.contains("spec \"bad\""), "{message}");
        assert!(!message.contains("good"), "{message}");
        match err {
            SyncError::Plan(PlanError::SpecsFailed { failures }) => assert_eq!(failures.len(), 1),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_unregistered_type_is_a_spec_failure() {
        let cfg = config(json!({"secrets": {"x": {"type": "ftp", "name": "a"}}}));

        let err = planner().plan_all(&cfg).await.expect_err("unknown type");
        assert!(err.to_string().contains("backend for type \"ftp\" not found"));
    }

    #[tokio::test]
    async fn test_unknown_names_rejected_together() {
        let cfg = config(json!({"secrets": {"a": {"type": "template", "name": "a"}}}));

        let err = planner()
            .plan_names(&cfg, &["zz", "a", "bb"])
            .await
            .expect_err("unknown names");
        assert_eq!(err.to_string(), "unknown secrets [\"bb\" \"zz\"]");
    }

    #[tokio::test]
    async fn test_plan_names_selects_subset() {
        let cfg = config(json!({"secrets": {
            "a": {"type": "template", "name": "a"},
            "b": {"type": "template", "name": "b"}
        }}));

        let changes = planner().plan_names(&cfg, &["b"]).await.expect("plan");
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].spec, "b");
    }

    #[tokio::test]
    async fn test_plan_type_filters_and_rejects_unknown_type() {
        let cfg = config(json!({"secrets": {
            "a": {"type": "template", "name": "a"},
            "b": {"type": "aws-ssm", "name": "b"}
        }}));
        let planner = planner();

        let changes = planner.plan_type(&cfg, "aws-ssm").await.expect("plan");
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].spec, "b");

        let err = planner.plan_type(&cfg, "github").await.expect_err("no backend");
        assert!(matches!(err, SyncError::Plan(PlanError::UnknownBackend { .. })));
    }

    #[tokio::test]
    async fn test_not_applicable_spec_is_skipped() {
        let mut skipper = MockBackend::new();
        skipper.expect_name().return_const("aws-ssm");
        skipper.expect_plan().returning(|_| {
            Ok(PlanOutcome::NotApplicable {
                reason: "other account".to_string(),
            })
        });
        let planner =
            Planner::new(account(), CancellationToken::new()).with_backend(Arc::new(skipper));
        let cfg = config(json!({"secrets": {"a": {"type": "aws-ssm"}}}));

        let changes = planner.plan_all(&cfg).await.expect("plan");
        assert!(changes.is_empty());
    }

    #[tokio::test]
    async fn test_vault_failure_aborts_before_planning() {
        let mut account = MockVaultAccount::new();
        account
            .expect_whoami()
            .returning(|| Err(SyncError::internal("not signed in")));
        let mut backend = MockBackend::new();
        backend.expect_name().return_const("template");
        backend.expect_plan().never();
        let planner = Planner::new(Arc::new(account), CancellationToken::new())
            .with_backend(Arc::new(backend));
        let cfg = config(json!({"secrets": {"a": {"type": "template"}}}));

        assert!(planner.plan_all(&cfg).await.is_err());
    }

    #[tokio::test]
    async fn test_cancelled_pass_returns_cancelled() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let planner = Planner::new(account(), cancel).with_backend(backend("template"));
        let cfg = config(json!({"secrets": {"a": {"type": "template", "name": "a"}}}));

        let err = planner.plan_all(&cfg).await.expect_err("cancelled");
        assert!(matches!(err, SyncError::Cancelled));
    }

    /// A backend whose plans never finish.
    struct Stalled;

    #[async_trait::async_trait]
    impl Backend for Stalled {
        fn name(&self) -> &'static str {
            "template"
        }

        fn validate(&self, _params: &crate::config::Params) -> Result<()> {
            Ok(())
        }

        async fn plan(&self, _params: &crate::config::Params) -> Result<PlanOutcome> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_cancel_interrupts_pending_plan() {
        let cancel = CancellationToken::new();
        let planner = Planner::new(account(), cancel.clone()).with_backend(Arc::new(Stalled));
        let cfg = config(json!({"secrets": {"a": {"type": "template", "name": "a"}}}));
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            cancel.cancel();
        });

        let err = tokio::time::timeout(std::time::Duration::from_secs(5), planner.plan_all(&cfg))
            .await
            .expect("cancellation ends planning")
            .expect_err("cancelled");
        assert!(matches!(err, SyncError::Cancelled));
    }

    #[test]
    fn test_validate_all_aggregates() {
        let cfg = config(json!({"secrets": {
            "a": {"type": "template", "name": "a"},
            "b": {"type": "template"},
            "c": {"name": "c"}
        }}));

        let err = planner().validate_all(&cfg).expect_err("two invalid");
        match err {
            SyncError::Plan(PlanError::SpecsFailed { failures }) => {
                let specs: Vec<_> = failures.iter().map(|f| f.spec.as_str()).collect();
                assert_eq!(specs, vec!["b", "c"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
