//! Tracing subscriber setup

use anyhow::{Result, anyhow};
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Install the global subscriber. `RUST_LOG` wins over the configured level;
/// `verbose` forces `debug` for this crate.
pub fn init_tracing(logging: &LoggingConfig, verbose: bool) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_directive(logging, verbose))?,
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    let installed = if logging.format == "json" {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| anyhow!("Failed to install tracing subscriber: {e}"))
}

fn default_directive(logging: &LoggingConfig, verbose: bool) -> String {
    let level = if verbose { "debug" } else { logging.level.as_str() };
    format!("warn,metarmap={level}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directive() {
        let logging = LoggingConfig::default();
        assert_eq!(default_directive(&logging, false), "warn,metarmap=info");
        assert_eq!(default_directive(&logging, true), "warn,metarmap=debug");
        assert!(EnvFilter::try_new(default_directive(&logging, false)).is_ok());
    }
}
