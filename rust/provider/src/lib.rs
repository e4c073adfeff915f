pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod postgres;
pub mod reconciler;
pub mod secrets;
pub mod session;

#[cfg(test)]
mod test_session;

use config::{ConfigError, ProviderServiceConfig, RootConfig};
use dispatcher::LifecycleDispatcher;
use pgcfn_config::registry::Registry;
use pgcfn_config::Configurable;
use pgcfn_types::{PhysicalResourceId, ReconciliationResult, ResourceRequest};

const CONFIG_PATH_ENV_VAR: &str = "CONFIG_PATH";

/// Loads from `path`, else from `$CONFIG_PATH`, else from the default location.
pub fn load_config(path: Option<&str>) -> Result<RootConfig, ConfigError> {
    match path {
        Some(path) => RootConfig::load_from_path(path),
        None => match std::env::var(CONFIG_PATH_ENV_VAR) {
            Ok(config_path) => RootConfig::load_from_path(&config_path),
            Err(_) => RootConfig::load(),
        },
    }
}

fn init_tracing(config: &ProviderServiceConfig) {
    pgcfn_tracing::init_provider_tracing(
        &config.service_name,
        &config.otel_filters,
        config.otel_endpoint.as_deref(),
        config.log_format,
    );
}

/// A FAILED result for errors raised before the dispatcher exists,
/// correlated with the event when it parses.
fn setup_failure(event: &str, reason: String) -> ReconciliationResult {
    match ResourceRequest::from_json(event) {
        Ok(request) => ReconciliationResult::failed(request.failure_physical_id(), reason)
            .for_request(&request),
        Err(_) => ReconciliationResult::failed(PhysicalResourceId::could_not_create(), reason),
    }
}

/// Handles one CloudFormation event end to end. Always yields a result,
/// including when configuration cannot be loaded.
pub async fn provider_entrypoint(event: &str, config_path: Option<&str>) -> ReconciliationResult {
    let config = match load_config(config_path) {
        Ok(config) => config.provider,
        Err(err) => {
            init_tracing(&ProviderServiceConfig::default());
            tracing::error!("Failed to load provider config: {err}");
            return setup_failure(event, format!("Provider is misconfigured, {err}"));
        }
    };
    init_tracing(&config);

    let registry = Registry::new();
    let dispatcher = match LifecycleDispatcher::try_from_config(&config, &registry).await {
        Ok(dispatcher) => dispatcher,
        Err(err) => {
            tracing::error!("Failed to create dispatcher component: {err}");
            return setup_failure(event, format!("Provider is misconfigured, {err}"));
        }
    };
    dispatcher.handle_json(event).await
}

/// Flushes buffered spans before the process exits. The batch exporter runs
/// on this runtime, so the flush must not block a worker thread.
pub async fn flush_tracing() -> Result<(), tokio::task::JoinError> {
    tokio::task::spawn_blocking(pgcfn_tracing::shutdown_provider_tracing).await
}
