use tracing_subscriber::{EnvFilter, fmt};

/// Installs the global subscriber. Output goes to stderr; stdout carries reports.
pub fn init_tracing(service_name: &str) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = fmt()
        .with_target(false)
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .compact()
        .try_init();

    tracing::info!(service = service_name, "tracing initialized");
}
