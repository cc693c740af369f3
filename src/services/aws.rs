//! AWS collaborators backed by the SDK.
//!
//! Clients are built once per region and shared through a [`ClientCache`].

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_config::retry::RetryConfig;
use aws_sdk_secretsmanager::error::{DisplayErrorContext, SdkError};
use aws_sdk_secretsmanager::operation::get_secret_value::GetSecretValueError;
use aws_sdk_ssm::operation::get_parameter::GetParameterError;
use aws_sdk_ssm::types::ParameterType;
use tracing::debug;

use crate::error::{Result, ServiceError, SyncError};

use super::cache::ClientCache;
use super::{CallerIdentity, ParameterStore, RemoteSecret, SecretsManager};

const STS: &str = "AWS STS";
const SSM: &str = "AWS SSM";
const SECRETS_MANAGER: &str = "AWS Secrets Manager";

/// SDK clients for one region.
#[derive(Debug, Clone)]
struct RegionClients {
    sts: aws_sdk_sts::Client,
    ssm: aws_sdk_ssm::Client,
    secrets_manager: aws_sdk_secretsmanager::Client,
}

/// STS, SSM and Secrets Manager access with per-region client reuse.
#[derive(Debug, Default)]
pub struct AwsServices {
    clients: ClientCache<String, RegionClients>,
}

impl AwsServices {
    /// Creates the service set. No credentials are resolved until first use.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    async fn clients(&self, region: &str) -> RegionClients {
        let key = region.to_string();
        self.clients
            .get_or_init(&key, || async {
                let config = region_config(&key).load().await;
                RegionClients {
                    sts: aws_sdk_sts::Client::new(&config),
                    ssm: aws_sdk_ssm::Client::new(&config),
                    secrets_manager: aws_sdk_secretsmanager::Client::new(&config),
                }
            })
            .await
    }
}

/// SDK configuration for one region. A failed call is never retried.
fn region_config(region: &str) -> aws_config::ConfigLoader {
    aws_config::defaults(BehaviorVersion::latest())
        .region(aws_config::Region::new(region.to_string()))
        .retry_config(RetryConfig::disabled())
}

/// Maps a `GetParameter` failure to the not-found sentinel or an API error.
fn classify_get_parameter<R>(name: &str, err: SdkError<GetParameterError, R>) -> SyncError
where
    R: std::fmt::Debug + Send + Sync + 'static,
{
    let service_err = err.into_service_error();
    if service_err.is_parameter_not_found() {
        ServiceError::not_found(SSM, format!("parameter {name}")).into()
    } else {
        ServiceError::api(SSM, DisplayErrorContext(&service_err).to_string()).into()
    }
}

/// Maps a `GetSecretValue` failure to the not-found sentinel or an API error.
fn classify_get_secret_value<R>(name: &str, err: SdkError<GetSecretValueError, R>) -> SyncError
where
    R: std::fmt::Debug + Send + Sync + 'static,
{
    let service_err = err.into_service_error();
    if service_err.is_resource_not_found_exception() {
        ServiceError::not_found(SECRETS_MANAGER, format!("secret {name}")).into()
    } else {
        ServiceError::api(SECRETS_MANAGER, DisplayErrorContext(&service_err).to_string()).into()
    }
}

fn api_error(service: &str, err: &impl std::error::Error) -> SyncError {
    ServiceError::api(service, DisplayErrorContext(err).to_string()).into()
}

#[async_trait]
impl CallerIdentity for AwsServices {
    async fn account_id(&self, region: &str) -> Result<String> {
        debug!("Resolving caller identity in {}", region);
        let output = self
            .clients(region)
            .await
            .sts
            .get_caller_identity()
            .send()
            .await
            .map_err(|e| api_error(STS, &e))?;

        output
            .account()
            .map(ToOwned::to_owned)
            .ok_or_else(|| {
                ServiceError::invalid_response(STS, "no account in caller identity").into()
            })
    }
}

#[async_trait]
impl ParameterStore for AwsServices {
    async fn get_parameter(&self, region: &str, name: &str) -> Result<String> {
        debug!("Getting parameter {} in {}", name, region);
        let output = self
            .clients(region)
            .await
            .ssm
            .get_parameter()
            .name(name)
            .with_decryption(true)
            .send()
            .await
            .map_err(|e| classify_get_parameter(name, e))?;

        output
            .parameter()
            .and_then(|p| p.value())
            .map(ToOwned::to_owned)
            .ok_or_else(|| {
                ServiceError::invalid_response(SSM, format!("parameter {name} has no value")).into()
            })
    }

    async fn put_parameter(
        &self,
        region: &str,
        name: &str,
        value: &str,
        overwrite: bool,
    ) -> Result<()> {
        debug!("Putting parameter {} in {} (overwrite: {})", name, region, overwrite);
        self.clients(region)
            .await
            .ssm
            .put_parameter()
            .name(name)
            .value(value)
            .r#type(ParameterType::SecureString)
            .overwrite(overwrite)
            .send()
            .await
            .map_err(|e| api_error(SSM, &e))?;
        Ok(())
    }
}

#[async_trait]
impl SecretsManager for AwsServices {
    async fn get_secret(&self, region: &str, name: &str) -> Result<RemoteSecret> {
        debug!("Getting secret {} in {}", name, region);
        let output = self
            .clients(region)
            .await
            .secrets_manager
            .get_secret_value()
            .secret_id(name)
            .send()
            .await
            .map_err(|e| classify_get_secret_value(name, e))?;

        let invalid = |what: &str| {
            ServiceError::invalid_response(SECRETS_MANAGER, format!("secret {name} has no {what}"))
        };
        let arn = output.arn().ok_or_else(|| invalid("ARN"))?;
        let value = output.secret_string().ok_or_else(|| invalid("string value"))?;

        Ok(RemoteSecret {
            arn: arn.to_string(),
            value: value.to_string(),
        })
    }

    async fn create_secret(
        &self,
        region: &str,
        name: &str,
        description: &str,
        value: &str,
    ) -> Result<()> {
        debug!("Creating secret {} in {}", name, region);
        self.clients(region)
            .await
            .secrets_manager
            .create_secret()
            .name(name)
            .description(description)
            .secret_string(value)
            .send()
            .await
            .map_err(|e| api_error(SECRETS_MANAGER, &e))?;
        Ok(())
    }

    async fn put_secret_value(&self, region: &str, arn: &str, value: &str) -> Result<()> {
        debug!("Putting new value for {}", arn);
        self.clients(region)
            .await
            .secrets_manager
            .put_secret_value()
            .secret_id(arn)
            .secret_string(value)
            .send()
            .await
            .map_err(|e| api_error(SECRETS_MANAGER, &e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_secretsmanager::types::error::ResourceNotFoundException;
    use aws_sdk_ssm::types::error::{InternalServerError, ParameterNotFound};

    #[tokio::test]
    async fn test_region_config_disables_retries() {
        let config = region_config("eu-west-1").load().await;
        assert_eq!(config.region().map(ToString::to_string).as_deref(), Some("eu-west-1"));
        assert_eq!(config.retry_config().map(RetryConfig::max_attempts), Some(1));
    }

    #[test]
    fn test_parameter_not_found_is_classified() {
        let err: SdkError<GetParameterError, ()> = SdkError::service_error(
            GetParameterError::ParameterNotFound(ParameterNotFound::builder().build()),
            (),
        );
        assert!(classify_get_parameter("/app/token", err).is_not_found());
    }

    #[test]
    fn test_other_parameter_errors_are_not_not_found() {
        let err: SdkError<GetParameterError, ()> = SdkError::service_error(
            GetParameterError::InternalServerError(InternalServerError::builder().build()),
            (),
        );
        let err = classify_get_parameter("/app/token", err);
        assert!(!err.is_not_found());
        assert!(err.to_string().contains("AWS SSM"));
    }

    #[test]
    fn test_secret_not_found_is_classified() {
        let err: SdkError<GetSecretValueError, ()> = SdkError::service_error(
            GetSecretValueError::ResourceNotFoundException(
                ResourceNotFoundException::builder().build(),
            ),
            (),
        );
        assert!(classify_get_secret_value("app/db", err).is_not_found());
    }

    #[test]
    fn test_secret_timeout_is_not_not_found() {
        let err: SdkError<GetSecretValueError, ()> = SdkError::timeout_error("deadline exceeded");
        assert!(!classify_get_secret_value("app/db", err).is_not_found());
    }
}
