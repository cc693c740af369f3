//! GitHub REST API client for secrets.
//!
//! Only the endpoints needed to read secret metadata and store sealed
//! values are wrapped. Raw response bodies are folded into error messages
//! but secret values never leave this module unencrypted.

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode, header};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::OnceCell;
use tracing::debug;

use crate::error::{Result, ServiceError, SyncError};

use super::{
    EncryptedSecret, GitHubSecrets, ScopePublicKey, SecretMetadata, SecretScope, path_segment,
};

/// Environment variable overriding the API base URL (GitHub Enterprise, tests).
pub const GITHUB_API_URL_ENV: &str = "OP_SYNC_GITHUB_API_URL";

const DEFAULT_API_URL: &str = "https://api.github.com";
const API_VERSION: &str = "2022-11-28";
const ACCEPT: &str = "application/vnd.github+json";
const TOKEN_ENVS: &[&str] = &["GITHUB_TOKEN", "GH_TOKEN"];
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const PER_PAGE: usize = 100;
const SERVICE: &str = "GitHub";

#[derive(Debug, Deserialize)]
struct RepositoryResponse {
    id: u64,
}

#[derive(Debug, Deserialize)]
struct SelectedRepositoriesResponse {
    #[serde(default)]
    total_count: usize,
    repositories: Vec<RepositoryResponse>,
}

/// GitHub REST API client.
#[derive(Debug)]
pub struct GitHubClient {
    http: Client,
    base_url: String,
    token: OnceCell<String>,
}

impl GitHubClient {
    /// Creates a client for `OP_SYNC_GITHUB_API_URL` or the public API.
    ///
    /// The token is resolved on first request.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new() -> Result<Self> {
        let base_url =
            std::env::var(GITHUB_API_URL_ENV).unwrap_or_else(|_| DEFAULT_API_URL.to_string());
        Self::build(base_url, OnceCell::new())
    }

    #[cfg(test)]
    fn with_base_url(base_url: impl Into<String>, token: impl Into<String>) -> Result<Self> {
        Self::build(base_url.into(), OnceCell::new_with(Some(token.into())))
    }

    fn build(base_url: String, token: OnceCell<String>) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("op-sync/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .map_err(|e| ServiceError::api(SERVICE, format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    async fn token(&self) -> Result<&str> {
        self.token.get_or_try_init(resolve_token).await.map(String::as_str)
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Response> {
        let token = self.token().await?;
        request
            .bearer_auth(token)
            .header(header::ACCEPT, ACCEPT)
            .header("X-GitHub-Api-Version", API_VERSION)
            .send()
            .await
            .map_err(|e| ServiceError::api(SERVICE, format!("Request failed: {e}")).into())
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, resource: &str) -> Result<T> {
        debug!("GET {}", path);
        let response = self.send(self.http.get(self.url(path))).await?;
        let response = check_status(response, resource).await?;
        response.json().await.map_err(|e| {
            ServiceError::invalid_response(SERVICE, format!("Failed to parse response: {e}")).into()
        })
    }
}

/// Turns non-success statuses into errors; 404 becomes the not-found sentinel.
async fn check_status(response: Response, resource: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::NOT_FOUND {
        return Err(ServiceError::not_found(SERVICE, resource).into());
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(ToOwned::to_owned))
        .unwrap_or(body);
    Err(ServiceError::http(SERVICE, status.as_u16(), message).into())
}

/// Finds a token in the environment, then asks the `gh` CLI.
async fn resolve_token() -> Result<String> {
    for name in TOKEN_ENVS {
        if let Ok(token) = std::env::var(name) {
            if !token.trim().is_empty() {
                debug!("Using GitHub token from {}", name);
                return Ok(token.trim().to_string());
            }
        }
    }

    debug!("Asking gh for a token");
    let missing = |message: String| -> SyncError {
        ServiceError::MissingCredentials {
            service: SERVICE.to_string(),
            message,
        }
        .into()
    };
    let output = Command::new("gh")
        .args(["auth", "token"])
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| missing(format!("set GITHUB_TOKEN or install gh ({e})")))?;
    if !output.status.success() {
        return Err(missing("set GITHUB_TOKEN or run `gh auth login`".to_string()));
    }

    let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if token.is_empty() {
        return Err(missing("gh returned an empty token".to_string()));
    }
    Ok(token)
}

#[async_trait]
impl GitHubSecrets for GitHubClient {
    async fn repository_id(&self, owner: &str, repo: &str) -> Result<u64> {
        let path = format!("repos/{}/{}", path_segment(owner), path_segment(repo));
        let repository: RepositoryResponse = self
            .get_json(&path, &format!("repository {owner}/{repo}"))
            .await?;
        Ok(repository.id)
    }

    async fn get_secret(&self, scope: &SecretScope, name: &str) -> Result<SecretMetadata> {
        self.get_json(
            &format!("{}/{}", scope.secrets_path(), path_segment(name)),
            &format!("secret {name} in {scope}"),
        )
        .await
    }

    async fn public_key(&self, scope: &SecretScope) -> Result<ScopePublicKey> {
        self.get_json(
            &format!("{}/public-key", scope.secrets_path()),
            &format!("public key of {scope}"),
        )
        .await
    }

    async fn put_secret(&self, scope: &SecretScope, secret: &EncryptedSecret) -> Result<()> {
        let path = format!("{}/{}", scope.secrets_path(), path_segment(&secret.name));
        debug!("PUT {}", path);
        let response = self.send(self.http.put(self.url(&path)).json(secret)).await?;
        check_status(response, &format!("secret {} in {scope}", secret.name)).await?;
        Ok(())
    }

    async fn selected_repository_ids(&self, scope: &SecretScope, name: &str) -> Result<Vec<i64>> {
        let mut ids = Vec::new();
        for page in 1.. {
            let path = format!(
                "{}/{}/repositories?per_page={PER_PAGE}&page={page}",
                scope.secrets_path(),
                path_segment(name)
            );
            let response: SelectedRepositoriesResponse = self
                .get_json(&path, &format!("repositories of secret {name} in {scope}"))
                .await?;

            let fetched = response.repositories.len();
            for repository in response.repositories {
                let id = i64::try_from(repository.id).map_err(|_| {
                    ServiceError::invalid_response(
                        SERVICE,
                        format!("repository id {} out of range", repository.id),
                    )
                })?;
                ids.push(id);
            }
            if fetched < PER_PAGE || ids.len() >= response.total_count {
                break;
            }
        }
        Ok(ids)
    }
}
