use crate::config::ConnectionConfig;
use crate::postgres::PgConnector;
use crate::secrets::{SecretError, SecretStore};
use crate::session::Session;
use async_trait::async_trait;
use pgcfn_config::registry::Registry;
use pgcfn_config::Configurable;
use pgcfn_error::{ErrorCodes, ProviderError};
use pgcfn_types::{ConnectionSpec, Identifier, PasswordSource, Secret};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// A fully resolved connection target.
#[derive(Clone, Debug)]
pub struct ConnectTarget {
    pub host: String,
    pub port: u16,
    pub dbname: Identifier,
    pub user: Identifier,
    pub password: Secret,
}

impl fmt::Display for ConnectTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}/{} as {}",
            self.host, self.port, self.dbname, self.user
        )
    }
}

#[derive(Debug, Error)]
pub enum ConnectError {
    #[error(transparent)]
    Secret(#[from] SecretError),
    #[error("Could not connect to {target}: {message}")]
    Refused {
        target: String,
        message: String,
        code: ErrorCodes,
    },
    #[error("Timed out after {seconds}s connecting to {target}")]
    Timeout { target: String, seconds: u64 },
}

impl ProviderError for ConnectError {
    fn code(&self) -> ErrorCodes {
        match self {
            ConnectError::Secret(err) => err.code(),
            ConnectError::Refused { code, .. } => *code,
            ConnectError::Timeout { .. } => ErrorCodes::Unavailable,
        }
    }
}

/// Opens sessions. Implementations must not leave a socket open when
/// `connect` fails.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, target: &ConnectTarget) -> Result<Box<dyn Session>, ConnectError>;
}

/// Turns a `Database` property block into a live session.
#[derive(Clone)]
pub struct ConnectionResolver {
    secrets: SecretStore,
    connector: Arc<dyn Connector>,
}

impl ConnectionResolver {
    pub fn new(secrets: SecretStore, connector: Arc<dyn Connector>) -> Self {
        Self { secrets, connector }
    }

    pub async fn resolve_password(&self, source: &PasswordSource) -> Result<Secret, SecretError> {
        match source {
            PasswordSource::Literal(secret) => Ok(secret.clone()),
            PasswordSource::Parameter(name) => self.secrets.resolve(name).await,
        }
    }

    pub async fn connect(&self, spec: &ConnectionSpec) -> Result<Box<dyn Session>, ConnectError> {
        let target = ConnectTarget {
            host: spec.host.clone(),
            port: spec.port,
            dbname: spec.dbname.clone(),
            user: spec.user.clone(),
            password: self.resolve_password(&spec.password).await?,
        };
        tracing::debug!(target = %target, "Connecting");
        self.connector.connect(&target).await
    }
}

#[async_trait]
impl Configurable<ConnectionConfig> for ConnectionResolver {
    async fn try_from_config(
        config: &ConnectionConfig,
        registry: &Registry,
    ) -> Result<Self, Box<dyn ProviderError>> {
        let secrets = registry.get::<SecretStore>().map_err(|e| e.boxed())?;
        let connector = PgConnector::new(config.clone());
        Ok(Self::new(secrets, Arc::new(connector)))
    }
}
