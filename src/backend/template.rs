//! Renders a template through the vault into a local file.

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::config::{ParamReader, Params};
use crate::error::{Result, ValidationError};
use crate::services::VaultInjector;

use super::{Action, Backend, Plan, PlanOutcome};

/// Backend for `type: template`.
pub struct TemplateBackend {
    injector: Arc<dyn VaultInjector>,
}

#[derive(Debug)]
struct TemplateArgs {
    output: PathBuf,
    template: String,
}

impl TemplateArgs {
    fn decode(params: &Params) -> std::result::Result<Self, ValidationError> {
        let mut reader = ParamReader::new(params);
        let output: String = reader.required("output");
        let template: String = reader.required("template");
        reader.finish()?;
        Ok(Self {
            output: PathBuf::from(output),
            template,
        })
    }
}

impl TemplateBackend {
    /// Type name in configuration files.
    pub const NAME: &'static str = "template";

    /// Creates the backend.
    #[must_use]
    pub fn new(injector: Arc<dyn VaultInjector>) -> Self {
        Self { injector }
    }
}

#[async_trait]
impl Backend for TemplateBackend {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn validate(&self, params: &Params) -> Result<()> {
        TemplateArgs::decode(params)?;
        Ok(())
    }

    async fn plan(&self, params: &Params) -> Result<PlanOutcome> {
        let args = TemplateArgs::decode(params)?;

        let content = self.injector.inject(&args.template).await?;

        let action = match fs::read(&args.output).await {
            Ok(existing) if existing == content => {
                debug!("{} is up to date", args.output.display());
                return Ok(PlanOutcome::converged());
            }
            Ok(_) => Action::Update,
            Err(e) if e.kind() == ErrorKind::NotFound => Action::Create,
            Err(e) => return Err(e.into()),
        };

        Ok(PlanOutcome::single(TemplatePlan {
            output: args.output,
            content,
            action,
        }))
    }
}

/// Writes rendered content to the output path.
pub struct TemplatePlan {
    output: PathBuf,
    content: Vec<u8>,
    action: Action,
}

#[async_trait]
impl Plan for TemplatePlan {
    fn preview(&self) -> String {
        format!("file \"{}\" will be {}", self.output.display(), self.action.verb())
    }

    fn action(&self) -> Action {
        self.action
    }

    async fn apply(&self) -> Result<()> {
        write_atomic(&self.output, &self.content).await
    }
}

/// Writes `content` to `path` so readers only ever see the old or new file.
///
/// Content goes to `<path>.<pid>.tmp` (mode 0600 on Unix), is synced, then
/// renamed over `path`. The temp file is removed on failure.
pub async fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
    let mut temp = path.as_os_str().to_owned();
    temp.push(format!(".{}.tmp", std::process::id()));
    let temp = PathBuf::from(temp);

    let result = write_and_rename(&temp, path, content).await;
    if result.is_err() {
        // The temp path may not exist, or may not be ours to remove.
        let _ = fs::remove_file(&temp).await;
    }
    result
}

async fn write_and_rename(temp: &Path, path: &Path, content: &[u8]) -> Result<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);

    let mut file = options.open(temp).await?;
    file.write_all(content).await?;
    file.sync_all().await?;
    drop(file);

    fs::rename(temp, path).await?;
    debug!("Wrote {}", path.display());
    Ok(())
}
