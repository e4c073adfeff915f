use figment::Jail;
use pgcfn_provider::config::{RootConfig, SecretStoreConfig, SslMode, StaticSecretsConfig};
use serial_test::serial;
use std::collections::HashMap;
use std::time::Duration;

#[test]
#[serial]
fn test_config_from_specific_path() {
    Jail::expect_with(|jail| {
        let _ = jail.create_file(
            "random_path.yaml",
            r#"
            provider:
                service_name: "db-provisioner"
                otel_endpoint: "http://jaeger:4317"
                otel_filters:
                    - crate_name: "pgcfn_provider"
                      filter_level: "info"
                log_format: pretty
                connection:
                    connect_timeout_seconds: 10
                    ssl_mode: verify_ca
                    application_name: "stack-provisioner"
                secrets:
                    static:
                        parameters:
                            "/db/admin": "admin-pw"
            "#,
        );
        let config = RootConfig::load_from_path("random_path.yaml").unwrap();
        let provider = config.provider;
        assert_eq!(provider.service_name, "db-provisioner");
        assert_eq!(provider.otel_endpoint.as_deref(), Some("http://jaeger:4317"));
        assert_eq!(provider.otel_filters.len(), 1);
        assert_eq!(provider.otel_filters[0].crate_name, "pgcfn_provider");
        assert_eq!(provider.connection.connect_timeout, Duration::from_secs(10));
        assert_eq!(provider.connection.ssl_mode, SslMode::VerifyCa);
        assert_eq!(provider.connection.application_name, "stack-provisioner");
        assert_eq!(
            provider.secrets,
            SecretStoreConfig::Static(StaticSecretsConfig {
                parameters: HashMap::from([("/db/admin".to_string(), "admin-pw".to_string())]),
            })
        );
        Ok(())
    });
}

#[test]
#[serial]
fn test_config_path_env_var() {
    Jail::expect_with(|jail| {
        let _ = jail.create_file(
            "elsewhere.yaml",
            r#"
            provider:
                service_name: "from-config-path"
            "#,
        );
        jail.set_env("CONFIG_PATH", "elsewhere.yaml");
        let config = pgcfn_provider::load_config(None).unwrap();
        assert_eq!(config.provider.service_name, "from-config-path");

        let explicit = pgcfn_provider::load_config(Some("missing.yaml")).unwrap();
        assert_eq!(explicit.provider.service_name, "pgcfn-provider");
        Ok(())
    });
}

#[test]
#[serial]
fn test_malformed_file_is_reported() {
    Jail::expect_with(|jail| {
        let _ = jail.create_file(
            "broken.yaml",
            r#"
            provider:
                connection:
                    connect_timeout_seconds: "soon"
            "#,
        );
        let err = RootConfig::load_from_path("broken.yaml").unwrap_err();
        assert!(err.to_string().starts_with("Error loading config"));
        Ok(())
    });
}
