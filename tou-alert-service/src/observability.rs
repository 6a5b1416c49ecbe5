use tracing_subscriber::EnvFilter;

const DEFAULT_DIRECTIVES: &str = "info,tou_alert_service=info";

/// `RUST_LOG` when set and valid, otherwise `info` for everything.
fn env_filter(rust_log: Option<&str>) -> EnvFilter {
    rust_log
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_DIRECTIVES))
}

/// Install the fmt subscriber, filtered by `RUST_LOG`.
pub fn init_tracing() {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter(rust_log.as_deref()))
        .with_target(false)
        .init();
}
