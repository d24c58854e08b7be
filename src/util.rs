/// Install the global tracing subscriber. `RUST_LOG` wins over the
/// configured filter. Also captures `log` records, such as actix-web's access
/// log
pub fn init_tracing(default_filter: &str) {
    use tracing_subscriber::EnvFilter;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
