use opentelemetry::trace::TracerProvider;
use opentelemetry::global;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::propagation::TraceContextPropagator;
use serde::{Deserialize, Serialize};
use tracing_subscriber::fmt;
use tracing_subscriber::Registry;
use tracing_subscriber::{layer::SubscriberExt, EnvFilter, Layer};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OtelFilterLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl std::fmt::Display for OtelFilterLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OtelFilterLevel::Trace => f.write_str("trace"),
            OtelFilterLevel::Debug => f.write_str("debug"),
            OtelFilterLevel::Info => f.write_str("info"),
            OtelFilterLevel::Warn => f.write_str("warn"),
            OtelFilterLevel::Error => f.write_str("error"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OtelFilter {
    pub crate_name: String,
    pub filter_level: OtelFilterLevel,
}

/// Output format of the stdout layer. CloudWatch and most log shippers
/// prefer one JSON object per line; `pretty` is meant for local runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

pub(crate) fn global_filter_directives(custom_filters: &[OtelFilter]) -> String {
    // Crate names use underscores, hyphens in package names are converted by rustc.
    let default_crate_names = [
        "pgcfn_config",
        "pgcfn_error",
        "pgcfn_provider",
        "pgcfn_tracing",
        "pgcfn_types",
    ];

    let mut directives = vec!["warn".to_string(), "sqlx=warn".to_string()];
    directives.extend(default_crate_names.iter().map(|s| format!("{s}=info")));
    directives.extend(
        custom_filters
            .iter()
            .map(|custom_filter| format!("{}={}", custom_filter.crate_name, custom_filter.filter_level)),
    );
    directives.join(",")
}

pub fn init_global_filter_layer(
    custom_filters: &[OtelFilter],
) -> Box<dyn Layer<Registry> + Send + Sync> {
    EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| global_filter_directives(custom_filters)),
    )
    .boxed()
}

pub fn init_otel_layer(
    service_name: &str,
    otel_endpoint: &str,
) -> Box<dyn Layer<Registry> + Send + Sync> {
    tracing::info!(
        "Registering OTLP span exporter for {} at endpoint {}",
        service_name,
        otel_endpoint
    );
    let resource = opentelemetry_sdk::Resource::new(vec![
        opentelemetry::KeyValue::new("service.name", service_name.to_string()),
        opentelemetry::KeyValue::new(
            "faas.name",
            std::env::var("AWS_LAMBDA_FUNCTION_NAME").unwrap_or("unknown".to_string()),
        ),
    ]);

    let span_exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(otel_endpoint)
        .build()
        .expect("could not build span exporter for tracing");
    let trace_config = opentelemetry_sdk::trace::Config::default().with_resource(resource);
    let tracer_provider = opentelemetry_sdk::trace::TracerProvider::builder()
        .with_batch_exporter(span_exporter, opentelemetry_sdk::runtime::Tokio)
        .with_config(trace_config)
        .build();
    let tracer = tracer_provider.tracer(service_name.to_string());
    global::set_tracer_provider(tracer_provider);
    tracing_opentelemetry::OpenTelemetryLayer::new(tracer).boxed()
}

pub fn init_stdout_layer(format: LogFormat) -> Box<dyn Layer<Registry> + Send + Sync> {
    match format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .boxed(),
        LogFormat::Pretty => fmt::layer().pretty().with_target(false).boxed(),
    }
}

pub fn init_tracing(layers: Vec<Box<dyn Layer<Registry> + Send + Sync>>) {
    global::set_text_map_propagator(TraceContextPropagator::new());
    let layers = layers
        .into_iter()
        .reduce(|a, b| Box::new(a.and_then(b)))
        .expect("Should be able to create tracing layers");
    let subscriber = tracing_subscriber::registry().with(layers);
    // A second initialisation (tests, warm lambda containers) keeps the first subscriber.
    if tracing::subscriber::set_global_default(subscriber).is_ok() {
        tracing::debug!("Global tracing subscriber set");
    }
}

pub fn init_panic_tracing_hook() {
    let prev_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let payload = panic_info.payload();

        let payload = if let Some(s) = payload.downcast_ref::<&str>() {
            Some(&**s)
        } else {
            payload.downcast_ref::<String>().map(|s| s.as_str())
        };

        tracing::error!(
            panic.payload = payload,
            panic.location = panic_info.location().map(|l| l.to_string()),
            panic.backtrace = tracing::field::display(std::backtrace::Backtrace::capture()),
            "A panic occurred"
        );

        prev_hook(panic_info);
    }));
}

/// Installs the global subscriber: filter, optional OTLP export, stdout.
///
/// The OTLP layer needs a running tokio runtime for its batch exporter.
pub fn init_provider_tracing(
    service_name: &str,
    custom_filters: &[OtelFilter],
    otel_endpoint: Option<&str>,
    format: LogFormat,
) {
    let mut layers = vec![
        // The global filter applies to all subsequent layers
        init_global_filter_layer(custom_filters),
    ];
    if let Some(endpoint) = otel_endpoint {
        layers.push(init_otel_layer(service_name, endpoint));
    }
    layers.push(init_stdout_layer(format));
    init_tracing(layers);
    init_panic_tracing_hook();
}

/// Flushes spans still buffered by the batch exporter. Short-lived
/// processes must call this before exiting or the last spans are lost.
pub fn shutdown_provider_tracing() {
    global::shutdown_tracer_provider();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_directives_include_custom_filters() {
        let directives = global_filter_directives(&[OtelFilter {
            crate_name: "sqlx".to_string(),
            filter_level: OtelFilterLevel::Debug,
        }]);
        assert!(directives.starts_with("warn,"));
        assert!(directives.contains("pgcfn_provider=info"));
        assert!(directives.ends_with("sqlx=debug"));
        assert!(EnvFilter::try_new(&directives).is_ok());
    }

    #[test]
    fn test_log_format_deserializes_snake_case() {
        let format: LogFormat = serde_json::from_str(r#""pretty""#).unwrap();
        assert_eq!(format, LogFormat::Pretty);
        assert_eq!(LogFormat::default(), LogFormat::Json);
    }
}
