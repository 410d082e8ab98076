//! Sets up global tracing for whichever binary links gallery-core

use tracing_subscriber::EnvFilter;

/// Initialize a global tracing subscriber
///
/// # Arguments
///
/// * `service_name` - The name of the binary initializing tracing, added as a span field
/// * `default_level` - The filter directive to use if `RUST_LOG` is unset
pub fn setup(service_name: &str, default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        tracing::event!(
            tracing::Level::DEBUG,
            service = service_name,
            "tracing subscriber already set"
        );
    }
}
