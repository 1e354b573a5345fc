//! Logging setup for the offline layer.
//!
//! The page-side `debug` switch decides how chatty the layer is: with it on,
//! every cache hit and lifecycle transition is logged; with it off only
//! warnings and failures get through. Third-party crates stay at `warn`
//! either way unless `RUST_LOG` or an explicit filter says otherwise.

use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::PwaConfig;

/// Crates whose level follows [`LogConfig::level`].
pub const LOUDER_TARGETS: &[&str] = &[
    "louder_core",
    "louder_net",
    "louder_sw",
    "louder_pwa",
    "offline_check",
];

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Multi-line, for a developer console.
    Pretty,
    /// One line per event.
    #[default]
    Compact,
    /// Structured output for log collectors.
    Json,
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Level for the offline layer's own crates.
    pub level: Level,
    pub format: LogFormat,
    /// Print file and line of each event.
    pub include_location: bool,
    /// Full filter directive, replacing the per-crate defaults.
    pub filter: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::WARN,
            format: LogFormat::Compact,
            include_location: false,
            filter: None,
        }
    }
}

impl LogConfig {
    /// Settings matching the lifecycle manager's `debug` switch.
    pub fn for_pwa(config: &PwaConfig) -> Self {
        if config.debug {
            Self {
                level: Level::DEBUG,
                format: LogFormat::Pretty,
                include_location: true,
                filter: None,
            }
        } else {
            Self::default()
        }
    }

    /// Raise the layer's level to `debug` when `verbose` is set.
    pub fn verbose(mut self, verbose: bool) -> Self {
        if verbose {
            self.level = Level::DEBUG;
        }
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Filter directive this configuration installs when `RUST_LOG` is unset.
    pub fn directives(&self) -> String {
        if let Some(filter) = &self.filter {
            return filter.clone();
        }
        let level = self.level.as_str().to_ascii_lowercase();
        let mut directives = vec!["warn".to_string()];
        directives.extend(LOUDER_TARGETS.iter().map(|target| format!("{target}={level}")));
        directives.join(",")
    }

    fn env_filter(&self) -> EnvFilter {
        let fallback = || EnvFilter::new(self.directives());
        match self.filter {
            Some(ref custom) => EnvFilter::try_new(custom).unwrap_or_else(|_| fallback()),
            None => EnvFilter::try_from_default_env().unwrap_or_else(|_| fallback()),
        }
    }
}

/// Install the global subscriber.
///
/// Returns `false` if one was already installed; the first caller wins.
pub fn init_logging(config: LogConfig) -> bool {
    let registry = tracing_subscriber::registry().with(config.env_filter());
    let result = match config.format {
        LogFormat::Pretty => registry
            .with(
                fmt::layer()
                    .pretty()
                    .with_file(config.include_location)
                    .with_line_number(config.include_location),
            )
            .try_init(),
        LogFormat::Compact => registry
            .with(
                fmt::layer()
                    .compact()
                    .with_file(config.include_location)
                    .with_line_number(config.include_location),
            )
            .try_init(),
        LogFormat::Json => registry.with(fmt::layer().json()).try_init(),
    };
    result.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_switch_sets_level() {
        let verbose = LogConfig::for_pwa(&PwaConfig::default());
        assert_eq!(verbose.level, Level::DEBUG);
        assert_eq!(verbose.format, LogFormat::Pretty);

        let quiet = LogConfig::for_pwa(&PwaConfig {
            debug: false,
            ..Default::default()
        });
        assert_eq!(quiet.level, Level::WARN);
        assert!(!quiet.include_location);
    }

    #[test]
    fn test_directives_scope_layer_crates() {
        let directives = LogConfig::default().verbose(true).directives();
        assert!(directives.starts_with("warn,"));
        assert!(directives.contains("louder_sw=debug"));
        assert!(directives.contains("louder_pwa=debug"));
        assert!(!directives.contains("reqwest"));
    }

    #[test]
    fn test_verbose_false_keeps_level() {
        let config = LogConfig::default().verbose(false);
        assert_eq!(config.level, Level::WARN);
    }

    #[test]
    fn test_explicit_filter_wins() {
        let config = LogConfig::default().with_filter("louder_sw=trace");
        assert_eq!(config.directives(), "louder_sw=trace");
    }
}
