use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Target used by every ad-path log line.
pub const ADS_TARGET: &str = "ads";

/// Build the log filter: `RUST_LOG` when set, otherwise `info`. With
/// `ads_debug` the ad path is raised to `debug`.
pub fn build_filter(ads_debug: bool) -> EnvFilter {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if !ads_debug {
        return filter;
    }
    match format!("{}=debug", ADS_TARGET).parse() {
        Ok(directive) => filter.add_directive(directive),
        Err(_) => filter,
    }
}

/// Install the global subscriber. Safe to call more than once; later calls
/// return an error instead of replacing the first subscriber.
pub fn init_logging(ads_debug: bool) -> Result<(), tracing_subscriber::util::TryInitError> {
    tracing_subscriber::registry()
        .with(build_filter(ads_debug))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .compact(),
        )
        .try_init()
}
