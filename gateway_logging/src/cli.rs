//! Common CLI flags for logging
use tracing_subscriber::fmt::{MakeWriter, writer::BoxMakeWriter};

use crate::{Builder, LogDestination, LogFormat, Result};

/// CLI config for the logging related subset of options.
#[derive(Debug, Clone, clap::Parser)]
pub struct LoggingConfig {
    /// Logs: filter directive
    ///
    /// Configures log severity level filter, by target.
    ///
    /// Simplest options: error, warn, info, debug, trace
    ///
    /// Levels for different modules can be specified. For example
    /// `debug,h2=info` specifies debug logging for all modules except for
    /// the `h2` crate which will only display info level logging.
    ///
    /// Overridden by `-v`.
    #[clap(long = "log-filter", env = "LOG_FILTER", action)]
    pub log_filter: Option<String>,

    /// Logs: filter short-hand
    ///
    /// Convenient way to set log severity level filter.
    /// Overrides `--log-filter`.
    ///
    /// -v   'info'
    ///
    /// -vv  'debug,h2=info,hyper=info,tower=info'
    ///
    /// -vvv 'trace,h2=info,hyper=info,tower=info'
    #[clap(
        short = 'v',
        long = "verbose",
        action = clap::ArgAction::Count,
        verbatim_doc_comment
    )]
    pub log_verbose_count: u8,

    /// Logs: destination
    ///
    /// Can be one of: stdout, stderr
    #[clap(
        long = "log-destination",
        env = "LOG_DESTINATION",
        default_value_t = LogDestination::Stdout,
        action
    )]
    pub log_destination: LogDestination,

    /// Logs: message format
    ///
    /// Can be one of: full (single line), pretty (multi line), json
    #[clap(
        long = "log-format",
        env = "LOG_FORMAT",
        default_value_t = LogFormat::Full,
        action
    )]
    pub log_format: LogFormat,
}

impl LoggingConfig {
    pub fn with_builder<W>(&self, builder: Builder<W>) -> Result<Builder<BoxMakeWriter>>
    where
        W: for<'writer> MakeWriter<'writer> + Send + Sync + 'static,
    {
        Ok(builder
            .with_log_filter(self.log_filter.as_deref())?
            // with_log_verbose_count goes after with_log_filter because -v
            // overrides --log-filter.
            .with_log_verbose_count(self.log_verbose_count)
            .with_log_destination(self.log_destination)
            .with_log_format(self.log_format))
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;
    use crate::test_util::simple_test;

    #[test]
    fn verbose_count() {
        let cfg = LoggingConfig::parse_from(["cli"]);
        assert_eq!(cfg.log_verbose_count, 0);
        assert_eq!(
            simple_test(cfg.with_builder(Builder::new()).unwrap()).without_timestamps(),
            "ERROR foo\nWARN woo\n"
        );

        let cfg = LoggingConfig::parse_from(["cli", "-vv"]);
        assert_eq!(cfg.log_verbose_count, 2);
        assert_eq!(
            simple_test(cfg.with_builder(Builder::new()).unwrap()).without_timestamps(),
            "ERROR foo\nWARN woo\nINFO bar\nDEBUG baz\n"
        );
    }

    #[test]
    fn custom_default_log_level() {
        let cfg = LoggingConfig::parse_from(["cli", "--log-filter=info"]);
        let builder = cfg
            .with_builder(Builder::new().with_default_log_filter("debug").unwrap())
            .unwrap();
        assert_eq!(
            simple_test(builder).without_timestamps(),
            "ERROR foo\nWARN woo\nINFO bar\n"
        );
    }

    #[test]
    fn format_and_destination() {
        let cfg = LoggingConfig::parse_from(["cli", "--log-format", "json", "--log-destination", "stderr"]);
        assert_eq!(cfg.log_format, LogFormat::Json);
        assert_eq!(cfg.log_destination, LogDestination::Stderr);

        assert!(LoggingConfig::try_parse_from(["cli", "--log-format", "logfmt"]).is_err());
    }
}
