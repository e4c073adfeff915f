use crate::config::{SecretStoreConfig, SsmConfig};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_ssm::error::{DisplayErrorContext, ProvideErrorMetadata};
use pgcfn_config::registry::{Injectable, Registry};
use pgcfn_config::Configurable;
use pgcfn_error::{ErrorCodes, ProviderError};
use pgcfn_types::Secret;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SecretError {
    #[error("Parameter {0:?} was not found")]
    NotFound(String),
    #[error("Access to parameter {name:?} was denied: {message}")]
    AccessDenied { name: String, message: String },
    #[error("Could not read parameter {name:?}: {message}")]
    Unavailable { name: String, message: String },
}

impl ProviderError for SecretError {
    fn code(&self) -> ErrorCodes {
        match self {
            SecretError::NotFound(_) => ErrorCodes::NotFound,
            SecretError::AccessDenied { .. } => ErrorCodes::PermissionDenied,
            SecretError::Unavailable { .. } => ErrorCodes::Unavailable,
        }
    }
}

/// Resolves `PasswordParameterName` references.
#[derive(Clone)]
pub enum SecretStore {
    Ssm(SsmSecretStore),
    Static(StaticSecretStore),
}

impl SecretStore {
    pub async fn resolve(&self, name: &str) -> Result<Secret, SecretError> {
        match self {
            SecretStore::Ssm(store) => store.resolve(name).await,
            SecretStore::Static(store) => store.resolve(name),
        }
    }
}

impl Injectable for SecretStore {}

#[async_trait]
impl Configurable<SecretStoreConfig> for SecretStore {
    async fn try_from_config(
        config: &SecretStoreConfig,
        registry: &Registry,
    ) -> Result<Self, Box<dyn ProviderError>> {
        let store = match config {
            SecretStoreConfig::Ssm(ssm_config) => {
                SecretStore::Ssm(SsmSecretStore::from_config(ssm_config).await)
            }
            SecretStoreConfig::Static(static_config) => {
                SecretStore::Static(StaticSecretStore::new(static_config.parameters.clone()))
            }
        };
        registry.register(store.clone());
        Ok(store)
    }
}

/// AWS Systems Manager Parameter Store. SecureString parameters are
/// decrypted on read.
#[derive(Clone)]
pub struct SsmSecretStore {
    client: aws_sdk_ssm::Client,
}

impl SsmSecretStore {
    pub fn new(client: aws_sdk_ssm::Client) -> Self {
        Self { client }
    }

    pub async fn from_config(config: &SsmConfig) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = &config.region {
            loader = loader.region(aws_sdk_ssm::config::Region::new(region.clone()));
        }
        if let Some(endpoint_url) = &config.endpoint_url {
            loader = loader.endpoint_url(endpoint_url);
        }
        let sdk_config = loader.load().await;
        Self::new(aws_sdk_ssm::Client::new(&sdk_config))
    }

    pub async fn resolve(&self, name: &str) -> Result<Secret, SecretError> {
        tracing::debug!(parameter = name, "Reading password from parameter store");
        let output = self
            .client
            .get_parameter()
            .name(name)
            .with_decryption(true)
            .send()
            .await;
        match output {
            Ok(output) => output
                .parameter()
                .and_then(|parameter| parameter.value())
                .map(Secret::new)
                .ok_or_else(|| SecretError::NotFound(name.to_string())),
            Err(err) => {
                let err = err.into_service_error();
                if err.is_parameter_not_found() {
                    return Err(SecretError::NotFound(name.to_string()));
                }
                let message = DisplayErrorContext(&err).to_string();
                match err.code() {
                    Some("AccessDeniedException") => Err(SecretError::AccessDenied {
                        name: name.to_string(),
                        message,
                    }),
                    _ => Err(SecretError::Unavailable {
                        name: name.to_string(),
                        message,
                    }),
                }
            }
        }
    }
}

/// Parameters supplied inline through configuration. Used for local runs
/// and tests where no parameter store is reachable.
#[derive(Clone, Default)]
pub struct StaticSecretStore {
    parameters: Arc<HashMap<String, String>>,
}

impl StaticSecretStore {
    pub fn new(parameters: HashMap<String, String>) -> Self {
        Self {
            parameters: Arc::new(parameters),
        }
    }

    pub fn resolve(&self, name: &str) -> Result<Secret, SecretError> {
        self.parameters
            .get(name)
            .map(|value| Secret::new(value.clone()))
            .ok_or_else(|| SecretError::NotFound(name.to_string()))
    }
}
