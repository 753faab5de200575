//! Benchmark the backends behind a running gateway
use std::num::NonZeroUsize;

use clap::Parser;
use gateway_bench::{DEFAULT_BACKENDS, Harness};
use gateway_clap_blocks::client::ClientConfig;
use gateway_client::ClientBuilder;
use gateway_logging::cli::LoggingConfig;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("cannot connect to the gateway: {0}")]
    Connect(#[from] gateway_client::Error),

    #[error(transparent)]
    Bench(#[from] gateway_bench::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Parser)]
pub struct Config {
    /// logging options
    #[clap(flatten)]
    pub(crate) logging_config: LoggingConfig,

    #[clap(flatten)]
    client_config: ClientConfig,

    /// Requests per measurement; reported times are the mean.
    #[clap(
        long = "iterations",
        short = 'n',
        env = "GATEWAY_BENCH_ITERATIONS",
        default_value = "1",
        action
    )]
    iterations: NonZeroUsize,

    /// Backends to compare, in the order they are requested.
    #[clap(
        long = "backends",
        env = "GATEWAY_BENCH_BACKENDS",
        value_delimiter = ',',
        default_values_t = DEFAULT_BACKENDS.map(String::from),
        action
    )]
    backends: Vec<String>,
}

pub(crate) async fn command(config: Config) -> Result<()> {
    let client = ClientBuilder::default()
        .max_message_size(config.client_config.max_message_size)
        .build(config.client_config.host_url.as_str())
        .await?;

    let report = Harness::new(client, config.backends, config.iterations)
        .run()
        .await?;
    print!("{report}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::parse_from(["bench"]);
        assert_eq!(config.iterations.get(), 1);
        assert_eq!(config.backends, DEFAULT_BACKENDS);
    }

    #[test]
    fn backend_list() {
        let config = Config::parse_from(["bench", "--backends", "duckdb,mongo", "-n", "5"]);
        assert_eq!(config.backends, ["duckdb", "mongo"]);
        assert_eq!(config.iterations.get(), 5);

        assert!(Config::try_parse_from(["bench", "-n", "0"]).is_err());
    }
}
