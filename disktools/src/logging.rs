//! Logging initialization for the `disktools` binary.
//!
//! Diagnostics go to stderr through `tracing`, leaving stdout to the
//! progress bar and result lines. The level can be overridden at runtime via
//! the `RUST_LOG` environment variable.
use tracing::Level;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Configuration for the logging system.
#[derive(Default)]
pub struct LogConfig {
    /// Output logs as JSON (for machine parsing)
    pub json: bool,
    /// Enable verbose logging (sets default level to DEBUG)
    pub verbose: bool,
}

/// Default filter directives.
///
/// The core library records its warnings in each report, which the CLI prints
/// itself, so by default only its errors are logged.
fn default_directives(verbose: bool) -> String {
    if verbose {
        let level = Level::DEBUG.as_str().to_lowercase();
        format!("disktools={level},disktools_core={level}")
    } else {
        "disktools=info,disktools_core=error".to_string()
    }
}

/// Initialize the tracing subscriber with the given configuration.
///
/// This should be called once, early in `main()`.
pub fn init(config: LogConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(config.verbose)));

    if config.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_target(true),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false)
                    .without_time(),
            )
            .init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbose_enables_debug_for_both_crates() {
        assert_eq!(
            default_directives(true),
            "disktools=debug,disktools_core=debug"
        );
    }

    #[test]
    fn quiet_default_keeps_core_to_errors() {
        let directives = default_directives(false);
        assert!(directives.contains("disktools_core=error"));
        assert!(EnvFilter::try_new(directives).is_ok());
    }
}
