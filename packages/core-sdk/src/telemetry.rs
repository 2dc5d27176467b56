use tracing_subscriber::EnvFilter;

/**
 * \brief Installs the global tracing subscriber; `RUST_LOG` wins over `default_filter`.
 */
pub fn init(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    if let Err(err) = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
    {
        eprintln!("tracing init skipped: {}", err);
    }
}
