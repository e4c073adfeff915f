pub mod init_tracer;

pub use init_tracer::{
    init_provider_tracing, shutdown_provider_tracing, LogFormat, OtelFilter, OtelFilterLevel,
};
