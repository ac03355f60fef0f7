use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Environment variable that overrides the verbosity-derived filter.
pub const LOG_ENV: &str = "DPSTASH_LOG";

/// Install the global subscriber. Logs go to stderr so command output on
/// stdout stays clean.
pub fn init(verbosity: u8) {
    let default_level = match verbosity {
        0 => "dpstash=warn",
        1 => "dpstash=info",
        2 => "dpstash=debug",
        _ => "dpstash=trace,sqlx=debug",
    };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_level));

    let result = tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(verbosity > 1),
        )
        .try_init();

    if let Err(e) = result {
        eprintln!("Warning: logging already initialised: {}", e);
    }
}
