//! Log initialization and setup

#![deny(rustdoc::broken_intra_doc_links, rustdoc::bare_urls, rust_2018_idioms)]
#![warn(
    missing_copy_implementations,
    missing_debug_implementations,
    clippy::explicit_iter_loop,
    clippy::future_not_send,
    clippy::use_self,
    clippy::clone_on_ref_ptr
)]

#[cfg(feature = "clap")]
pub mod cli;
pub mod config;

pub use config::*;

use std::io;

use tracing::Subscriber;
use tracing_subscriber::{
    EnvFilter, Layer, Registry,
    filter::ParseError,
    fmt::{self, MakeWriter, writer::BoxMakeWriter},
    layer::SubscriberExt,
};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid log filter '{filter}': {source}")]
    InvalidFilter {
        filter: String,
        #[source]
        source: ParseError,
    },

    #[error("Cannot set global tracing subscriber")]
    SetGlobalDefault(#[from] tracing::subscriber::SetGlobalDefaultError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

fn parse_filter(filter: &str) -> Result<EnvFilter> {
    EnvFilter::try_new(filter).map_err(|source| Error::InvalidFilter {
        filter: filter.to_string(),
        source,
    })
}

/// Builder for logging.
#[derive(Debug)]
pub struct Builder<W = fn() -> io::Stdout> {
    log_format: LogFormat,
    log_filter: Option<EnvFilter>,
    // applies when no explicit filter was given
    default_log_filter: EnvFilter,
    make_writer: W,
    with_target: bool,
    with_ansi: bool,
}

impl Default for Builder {
    fn default() -> Self {
        Self {
            log_format: LogFormat::Full,
            log_filter: None,
            default_log_filter: EnvFilter::new(Self::DEFAULT_LOG_FILTER),
            make_writer: io::stdout,
            with_target: true,
            with_ansi: true,
        }
    }
}

impl Builder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<W> Builder<W> {
    pub const DEFAULT_LOG_FILTER: &'static str = "warn";

    pub fn with_writer<W2>(self, make_writer: W2) -> Builder<W2>
    where
        W2: for<'writer> MakeWriter<'writer> + Send + Sync + 'static,
    {
        Builder::<W2> {
            make_writer,
            // the writer type changes, so every field is moved by hand
            log_format: self.log_format,
            log_filter: self.log_filter,
            default_log_filter: self.default_log_filter,
            with_target: self.with_target,
            with_ansi: self.with_ansi,
        }
    }

    pub fn with_log_destination(self, log_destination: LogDestination) -> Builder<BoxMakeWriter> {
        let make_writer = match log_destination {
            LogDestination::Stdout => BoxMakeWriter::new(io::stdout),
            LogDestination::Stderr => BoxMakeWriter::new(io::stderr),
        };
        self.with_writer(make_writer)
    }

    /// Replace the filter by a preset for `-v` (info), `-vv` (debug) and
    /// `-vvv` (trace). A count of zero leaves the filter alone.
    pub fn with_log_verbose_count(self, log_verbose_count: u8) -> Self {
        let log_filter = match log_verbose_count {
            0 => self.log_filter,
            1 => Some(EnvFilter::new("info")),
            2 => Some(EnvFilter::new("debug,h2=info,hyper=info,tower=info")),
            _ => Some(EnvFilter::new("trace,h2=info,hyper=info,tower=info")),
        };
        Self { log_filter, ..self }
    }

    pub fn with_log_filter(self, log_filter: Option<&str>) -> Result<Self> {
        let log_filter = log_filter.map(parse_filter).transpose()?;
        Ok(Self { log_filter, ..self })
    }

    pub fn with_default_log_filter(self, default_log_filter: impl AsRef<str>) -> Result<Self> {
        let default_log_filter = parse_filter(default_log_filter.as_ref())?;
        Ok(Self {
            default_log_filter,
            ..self
        })
    }

    pub fn with_log_format(self, log_format: LogFormat) -> Self {
        Self { log_format, ..self }
    }

    /// Sets whether or not an event's target is displayed.
    pub fn with_target(self, with_target: bool) -> Self {
        Self {
            with_target,
            ..self
        }
    }

    /// Colour output with ANSI escapes.
    pub fn with_ansi(self, with_ansi: bool) -> Self {
        Self { with_ansi, ..self }
    }
}

impl<W> Builder<W>
where
    W: for<'writer> MakeWriter<'writer> + Send + Sync + 'static,
{
    pub fn build(self) -> impl Subscriber + Send + Sync {
        let writer = self.make_writer;
        let with_target = self.with_target;
        let with_ansi = self.with_ansi;

        let layer: Box<dyn Layer<Registry> + Send + Sync> = match self.log_format {
            LogFormat::Full => fmt::layer()
                .with_writer(writer)
                .with_target(with_target)
                .with_ansi(with_ansi)
                .boxed(),
            LogFormat::Pretty => fmt::layer()
                .pretty()
                .with_writer(writer)
                .with_target(with_target)
                .with_ansi(with_ansi)
                .boxed(),
            LogFormat::Json => fmt::layer()
                .json()
                .with_writer(writer)
                .with_target(with_target)
                .with_ansi(with_ansi)
                .boxed(),
        };

        let log_filter = self.log_filter.unwrap_or(self.default_log_filter);
        tracing_subscriber::registry().with(layer.with_filter(log_filter))
    }

    /// Build a subscriber and install it as the global default for all
    /// threads. Fails if a global default is already set.
    pub fn install_global(self) -> Result<()> {
        tracing::subscriber::set_global_default(self.build())?;
        Ok(())
    }
}
