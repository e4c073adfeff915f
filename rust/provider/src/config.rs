use figment::providers::{Env, Format, Yaml};
use pgcfn_config::helpers::{deserialize_duration_from_seconds, serialize_duration_to_seconds};
use pgcfn_error::{ErrorCodes, ProviderError};
use pgcfn_tracing::{LogFormat, OtelFilter, OtelFilterLevel};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

pub(crate) const DEFAULT_CONFIG_PATH: &str = "./pgcfn_config.yaml";
const ENV_PREFIX: &str = "PGCFN_";

#[derive(Debug, Error)]
#[error("Error loading config: {0}")]
pub struct ConfigError(#[from] Box<figment::Error>);

impl ProviderError for ConfigError {
    fn code(&self) -> ErrorCodes {
        ErrorCodes::InvalidArgument
    }
}

/// Root of the YAML file. Values from `PGCFN_`-prefixed environment
/// variables take precedence over the file, with `__` separating nested
/// keys (`PGCFN_PROVIDER__LOG_FORMAT=pretty`).
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct RootConfig {
    #[serde(default)]
    pub provider: ProviderServiceConfig,
}

impl RootConfig {
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path(DEFAULT_CONFIG_PATH)
    }

    /// A missing file is not an error: defaults and environment variables
    /// still apply. The file is not echoed since it may hold static secrets.
    pub fn load_from_path(path: &str) -> Result<Self, ConfigError> {
        // Figment cannot express nesting with single underscores, so `__` is mapped to `.`.
        let mut f = figment::Figment::from(
            Env::prefixed(ENV_PREFIX).map(|k| k.as_str().replace("__", ".").into()),
        );
        if std::path::Path::new(path).exists() {
            tracing::debug!("Loading config from {path}");
            f = figment::Figment::from(Yaml::file(path)).merge(f);
        }
        f.extract().map_err(|e| ConfigError(Box::new(e)))
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderServiceConfig {
    #[serde(default = "ProviderServiceConfig::default_service_name")]
    pub service_name: String,
    #[serde(default)]
    pub otel_endpoint: Option<String>,
    #[serde(default = "ProviderServiceConfig::default_otel_filters")]
    pub otel_filters: Vec<OtelFilter>,
    #[serde(default)]
    pub log_format: LogFormat,
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub secrets: SecretStoreConfig,
}

impl ProviderServiceConfig {
    fn default_service_name() -> String {
        "pgcfn-provider".to_string()
    }

    fn default_otel_filters() -> Vec<OtelFilter> {
        vec![OtelFilter {
            crate_name: "pgcfn_provider".to_string(),
            filter_level: OtelFilterLevel::Debug,
        }]
    }
}

impl Default for ProviderServiceConfig {
    fn default() -> Self {
        Self {
            service_name: Self::default_service_name(),
            otel_endpoint: None,
            otel_filters: Self::default_otel_filters(),
            log_format: LogFormat::default(),
            connection: ConnectionConfig::default(),
            secrets: SecretStoreConfig::default(),
        }
    }
}

/// libpq `sslmode` values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SslMode {
    Disable,
    Allow,
    #[default]
    Prefer,
    Require,
    VerifyCa,
    VerifyFull,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ConnectionConfig {
    #[serde(
        rename = "connect_timeout_seconds",
        default = "ConnectionConfig::default_connect_timeout",
        deserialize_with = "deserialize_duration_from_seconds",
        serialize_with = "serialize_duration_to_seconds"
    )]
    pub connect_timeout: Duration,
    #[serde(default)]
    pub ssl_mode: SslMode,
    #[serde(default = "ConnectionConfig::default_application_name")]
    pub application_name: String,
}

impl ConnectionConfig {
    fn default_connect_timeout() -> Duration {
        Duration::from_secs(30)
    }

    fn default_application_name() -> String {
        "pgcfn-provider".to_string()
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Self::default_connect_timeout(),
            ssl_mode: SslMode::default(),
            application_name: Self::default_application_name(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct SsmConfig {
    #[serde(default)]
    pub region: Option<String>,
    /// Overrides the service endpoint, e.g. for LocalStack.
    #[serde(default)]
    pub endpoint_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct StaticSecretsConfig {
    #[serde(default)]
    pub parameters: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SecretStoreConfig {
    Ssm(SsmConfig),
    Static(StaticSecretsConfig),
}

impl Default for SecretStoreConfig {
    fn default() -> Self {
        SecretStoreConfig::Ssm(SsmConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_defaults_without_file() {
        Jail::expect_with(|_| {
            let config = RootConfig::load().unwrap();
            let provider = config.provider;
            assert_eq!(provider.service_name, "pgcfn-provider");
            assert_eq!(provider.otel_endpoint, None);
            assert_eq!(provider.log_format, LogFormat::Json);
            assert_eq!(provider.connection.connect_timeout, Duration::from_secs(30));
            assert_eq!(provider.connection.ssl_mode, SslMode::Prefer);
            assert_eq!(provider.secrets, SecretStoreConfig::Ssm(SsmConfig::default()));
            Ok(())
        });
    }

    #[test]
    #[serial]
    fn test_env_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "pgcfn_config.yaml",
                r#"
                provider:
                    service_name: "db-provisioner"
                    log_format: pretty
                    connection:
                        connect_timeout_seconds: 5
                        ssl_mode: require
                    secrets:
                        ssm:
                            region: "eu-west-1"
                "#,
            )?;
            jail.set_env("PGCFN_PROVIDER__CONNECTION__SSL_MODE", "verify_full");
            jail.set_env("PGCFN_PROVIDER__OTEL_ENDPOINT", "http://collector:4317");
            let provider = RootConfig::load().unwrap().provider;
            assert_eq!(provider.service_name, "db-provisioner");
            assert_eq!(provider.log_format, LogFormat::Pretty);
            assert_eq!(provider.connection.connect_timeout, Duration::from_secs(5));
            assert_eq!(provider.connection.ssl_mode, SslMode::VerifyFull);
            assert_eq!(
                provider.otel_endpoint.as_deref(),
                Some("http://collector:4317")
            );
            assert_eq!(
                provider.secrets,
                SecretStoreConfig::Ssm(SsmConfig {
                    region: Some("eu-west-1".to_string()),
                    endpoint_url: None,
                })
            );
            Ok(())
        });
    }

    #[test]
    #[serial]
    fn test_invalid_value_is_an_error() {
        Jail::expect_with(|jail| {
            jail.set_env("PGCFN_PROVIDER__CONNECTION__SSL_MODE", "sometimes");
            let err = RootConfig::load().unwrap_err();
            assert_eq!(err.code(), ErrorCodes::InvalidArgument);
            assert!(err.to_string().starts_with("Error loading config"));
            Ok(())
        });
    }
}
