// src/logging.rs

//! Logging setup for `assetdag` using `tracing` + `tracing-subscriber`.
//!
//! The filter comes from the first of:
//! 1. `--log-level` CLI flag
//! 2. `ASSETDAG_LOG`, either a bare level ("debug") or full directives
//!    ("assetdag::watch=trace,info")
//! 3. `info`
//!
//! Logs go to stderr; stdout carries `list` output and task notifications.

use anyhow::Result;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;

use crate::cli::LogLevel;

pub const LOG_ENV_VAR: &str = "ASSETDAG_LOG";

/// Install the global subscriber. Call once at startup.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let filter = build_filter(cli_level, std::env::var(LOG_ENV_VAR).ok().as_deref());

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))?;

    Ok(())
}

fn build_filter(cli_level: Option<LogLevel>, env_value: Option<&str>) -> EnvFilter {
    if let Some(lvl) = cli_level {
        return EnvFilter::new(directive_for(lvl));
    }

    match env_value.map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => EnvFilter::try_new(raw.to_lowercase()).unwrap_or_else(|err| {
            eprintln!("assetdag: ignoring invalid {LOG_ENV_VAR}={raw:?}: {err}");
            EnvFilter::new("info")
        }),
        None => EnvFilter::new("info"),
    }
}

fn directive_for(lvl: LogLevel) -> &'static str {
    match lvl {
        LogLevel::Error => "error",
        LogLevel::Warn => "warn",
        LogLevel::Info => "info",
        LogLevel::Debug => "debug",
        LogLevel::Trace => "trace",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_level_wins_over_env() {
        let filter = build_filter(Some(LogLevel::Warn), Some("trace"));
        assert_eq!(filter.to_string().to_lowercase(), "warn");
    }

    #[test]
    fn env_accepts_bare_levels_and_directives() {
        assert_eq!(build_filter(None, Some(" DEBUG ")).to_string().to_lowercase(), "debug");
        assert!(
            build_filter(None, Some("assetdag::watch=trace,info"))
                .to_string()
                .contains("assetdag::watch=trace")
        );
    }

    #[test]
    fn missing_env_defaults_to_info() {
        assert_eq!(build_filter(None, None).to_string().to_lowercase(), "info");
        assert_eq!(build_filter(None, Some("  ")).to_string().to_lowercase(), "info");
    }
}
