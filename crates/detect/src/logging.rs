use crate::config::Environment;
use anyhow::Context;
use opentelemetry::global;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Used when `RUST_LOG` is unset. ONNX Runtime reports every session setup
/// step at info level.
pub const DEFAULT_DIRECTIVES: &str = "info,ort=warn";

fn filter() -> anyhow::Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(DEFAULT_DIRECTIVES).context("Invalid default log filter"),
    }
}

/// Console logging for the detect binary: pretty output in development, JSON
/// lines in production. Both name the emitting thread, so capture and
/// inference events can be told apart.
///
/// With `export_spans`, spans also go to the global OpenTelemetry tracer;
/// install it first with [`crate::telemetry::TelemetryGuard::init`].
pub fn setup_logging(environment: Environment, export_spans: bool) -> anyhow::Result<()> {
    let otel = export_spans
        .then(|| tracing_opentelemetry::layer().with_tracer(global::tracer("detect")));
    let json = (environment == Environment::Production).then(|| {
        fmt::layer()
            .json()
            .with_level(true)
            .with_thread_names(true)
    });
    let pretty = (environment == Environment::Development).then(|| {
        fmt::layer()
            .pretty()
            .with_ansi(true)
            .with_thread_names(true)
    });

    tracing_subscriber::registry()
        .with(filter()?)
        .with(otel)
        .with(json)
        .with(pretty)
        .try_init()
        .context("A tracing subscriber is already installed")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directives_parse() {
        let filter = EnvFilter::try_new(DEFAULT_DIRECTIVES).unwrap();
        assert!(filter.to_string().contains("ort=warn"));
    }

    #[test]
    fn test_second_install_is_an_error() {
        // Whichever call comes first in this process wins; the next must fail.
        let _ = setup_logging(Environment::Development, false);
        assert!(setup_logging(Environment::Production, false).is_err());
    }
}
