//! 1Password CLI (`op`) integration.
//!
//! Every vault access shells out to the locally installed `op` binary.
//! Authentication is handled by `op` itself (desktop app integration,
//! service account token or an existing session).

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::error::{Result, ServiceError, SyncError};

use super::{VaultAccount, VaultInjector, VaultItem, VaultItemGetter, VaultReader, VaultUser};

/// Environment variable overriding the path to the `op` binary.
pub const OP_PATH_ENV: &str = "OP_SYNC_OP_PATH";

const SERVICE: &str = "1Password CLI";

/// Client that shells out to the `op` CLI binary.
#[derive(Debug, Clone)]
pub struct OpCli {
    program: String,
}

impl Default for OpCli {
    fn default() -> Self {
        Self::new()
    }
}

impl OpCli {
    /// Creates a client using `OP_SYNC_OP_PATH` or `op` from `PATH`.
    #[must_use]
    pub fn new() -> Self {
        let program = std::env::var(OP_PATH_ENV).unwrap_or_else(|_| "op".to_string());
        Self { program }
    }

    /// Creates a client for an explicit binary.
    #[must_use]
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Runs `op` with `args`, optionally feeding `stdin`, and returns stdout.
    ///
    /// The child is killed if the returned future is dropped.
    async fn run(&self, args: &[&str], stdin: Option<&[u8]>) -> Result<Vec<u8>> {
        let command_line = format!("{} {}", self.program, args.join(" "));
        debug!("Running {}", command_line);

        let failed = |message: String| -> SyncError {
            ServiceError::CommandFailed {
                command: command_line.clone(),
                message,
            }
            .into()
        };

        let mut child = Command::new(&self.program)
            .args(args)
            .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| failed(e.to_string()))?;

        if let Some(input) = stdin {
            let mut pipe = child
                .stdin
                .take()
                .ok_or_else(|| failed("stdin was not captured".to_string()))?;
            pipe.write_all(input).await.map_err(|e| failed(e.to_string()))?;
            // Closing stdin signals end of input.
            drop(pipe);
        }

        let output = child.wait_with_output().await.map_err(|e| failed(e.to_string()))?;

        if output.status.success() {
            Ok(output.stdout)
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let message = stderr
                .lines()
                .map(str::trim)
                .find(|l| !l.is_empty())
                .unwrap_or("unknown error")
                .to_owned();
            Err(failed(message))
        }
    }

    async fn run_json<T: DeserializeOwned>(&self, args: &[&str]) -> Result<T> {
        let stdout = self.run(args, None).await?;
        parse_json(&stdout)
    }
}

fn parse_json<T: DeserializeOwned>(stdout: &[u8]) -> Result<T> {
    serde_json::from_slice(stdout).map_err(|e| {
        ServiceError::invalid_response(SERVICE, format!("failed to parse output: {e}")).into()
    })
}

#[async_trait]
impl VaultReader for OpCli {
    async fn read(&self, reference: &str) -> Result<Vec<u8>> {
        self.run(&["read", "--no-newline", reference], None).await
    }
}

#[async_trait]
impl VaultInjector for OpCli {
    async fn inject(&self, template: &str) -> Result<Vec<u8>> {
        self.run(&["inject"], Some(template.as_bytes())).await
    }
}

#[async_trait]
impl VaultItemGetter for OpCli {
    async fn get_item(&self, vault: &str, item: &str) -> Result<VaultItem> {
        self.run_json(&["item", "get", item, "--vault", vault, "--format=json"])
            .await
    }
}

#[async_trait]
impl VaultAccount for OpCli {
    async fn whoami(&self) -> Result<VaultUser> {
        self.run_json(&["whoami", "--format=json"]).await
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn sh() -> OpCli {
        OpCli::with_program("sh")
    }

    #[tokio::test]
    async fn test_run_returns_stdout() {
        let out = sh().run(&["-c", "printf 'hello'"], None).await.expect("command succeeds");
        assert_eq!(out, b"hello");
    }

    #[tokio::test]
    async fn test_run_feeds_stdin() {
        let out = sh()
            .run(&["-c", "cat"], Some(b"TOKEN={{ op://v/i/f }}"))
            .await
            .expect("command succeeds");
        assert_eq!(out, b"TOKEN={{ op://v/i/f }}");
    }

    #[tokio::test]
    async fn test_run_reports_first_stderr_line() {
        let err = sh()
            .run(&["-c", "echo '' >&2; echo '[ERROR] not signed in' >&2; exit 1"], None)
            .await
            .expect_err("command fails");

        match err {
            SyncError::Service(ServiceError::CommandFailed { message, .. }) => {
                assert_eq!(message, "[ERROR] not signed in");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_missing_binary() {
        let cli = OpCli::with_program("/nonexistent/op-binary");
        let err = cli.read("op://v/i/f").await.expect_err("spawn fails");
        assert!(matches!(err, SyncError::Service(ServiceError::CommandFailed { .. })));
    }

    #[test]
    fn test_parse_item() {
        let json = br#"{
            "id": "abc123",
            "title": "github",
            "vault": {"id": "v1", "name": "Private"},
            "updated_at": "2024-03-01T10:00:00Z",
            "fields": []
        }"#;
        let item: VaultItem = parse_json(json).expect("valid item");
        assert_eq!(item.id, "abc123");
        assert_eq!(
            item.updated_at,
            Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).single().expect("valid time")
        );
    }

    #[test]
    fn test_parse_whoami() {
        let json =
            br#"{"url": "my.1password.com", "email": "dev@example.com", "user_type": "HUMAN"}"#;
        let user: VaultUser = parse_json(json).expect("valid user");
        assert_eq!(user.email, "dev@example.com");
        assert_eq!(user.url, "my.1password.com");
    }
}
