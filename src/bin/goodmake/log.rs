use color_eyre::Result;
use tracing_error::ErrorLayer;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{Layer as _, layer::SubscriberExt as _};

/// Build (but do not install) the subscriber. Level comes from the `LOG`
/// environment variable, defaulting to `warn`, matching the external
/// interface's documented default.
pub fn make_logger() -> Result<impl tracing::Subscriber> {
    let filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(tracing::level_filters::LevelFilter::WARN.into())
        .with_env_var(goodmake::env::LOG)
        .from_env_lossy();

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_level(true)
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(std::io::stderr)
        .with_filter(filter);

    Ok(tracing_subscriber::registry()
        .with(ErrorLayer::default())
        .with(fmt_layer))
}
