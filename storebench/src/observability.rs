//! Logging setup.

use std::env;
use std::io::IsTerminal;

use tracing::Level;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{EnvFilter, Layer, prelude::*};

use crate::config::{LogFormat, Logging};

/// Installs the global subscriber. Logs go to stderr so they never mix with the report on stdout.
pub fn init_tracing(logging: &Logging) {
    let (level, env_filter) = parse_rust_log(logging.level);

    let format = match logging.format {
        LogFormat::Auto if std::io::stderr().is_terminal() => LogFormat::Pretty,
        LogFormat::Auto => LogFormat::Simplified,
        format => format,
    };

    let fmt = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true);
    let fmt = match format {
        LogFormat::Json => fmt.json().boxed(),
        LogFormat::Simplified => fmt.with_ansi(false).compact().boxed(),
        LogFormat::Pretty | LogFormat::Auto => fmt.compact().boxed(),
    };

    tracing_subscriber::registry()
        .with(fmt.with_filter(level))
        .with(env_filter)
        .try_init()
        .ok();
}

/// Determines the effective level and filter from `RUST_LOG`, falling back to `default`.
pub fn parse_rust_log(default: LevelFilter) -> (LevelFilter, EnvFilter) {
    // Try to parse RUST_LOG as a simple level filter and apply default levels internally.
    // Otherwise, use it literally if the user knows which overrides they want to run.
    let level = match env::var(EnvFilter::DEFAULT_ENV) {
        Ok(value) => match value.parse::<Level>() {
            Ok(level) => LevelFilter::from(level),
            Err(_) => return (LevelFilter::TRACE, EnvFilter::new(value)),
        },
        Err(_) => default,
    };

    // This is the maximum verbosity that will be logged, we filter this down to `level`.
    let env_filter = EnvFilter::new(
        "INFO,\
        reqwest=WARN,\
        hyper=WARN,\
        storebench=TRACE,\
        storebench_backend=TRACE,\
        ",
    );

    (level, env_filter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rust_log_overrides_configured_level() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("RUST_LOG", "debug");
            let (level, _) = parse_rust_log(LevelFilter::INFO);
            assert_eq!(level, LevelFilter::DEBUG);

            jail.set_env("RUST_LOG", "storebench=trace");
            let (level, filter) = parse_rust_log(LevelFilter::INFO);
            assert_eq!(level, LevelFilter::TRACE);
            assert!(filter.to_string().contains("storebench=trace"));

            Ok(())
        });
    }
}
