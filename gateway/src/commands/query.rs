//! Fetch one ticket from a running gateway
use std::time::Duration;

use arrow::{error::ArrowError, util::pretty::pretty_format_batches};
use clap::{Parser, ValueEnum};
use gateway_clap_blocks::client::ClientConfig;
use gateway_client::ClientBuilder;
use gateway_table::Table;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Client(#[from] gateway_client::Error),

    #[error("cannot render table: {0}")]
    Render(#[from] ArrowError),

    #[error("cannot render table: {0}")]
    Table(#[from] gateway_table::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Parser)]
#[clap(visible_alias = "q")]
pub struct Config {
    #[clap(flatten)]
    client_config: ClientConfig,

    /// The format in which to print the table
    #[clap(value_enum, long = "format", default_value_t = Format::Pretty)]
    output_format: Format,

    /// The ticket to fetch, e.g. `postgres`, `mongo_values` or `duckdb_json`
    ticket: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    /// An ASCII table. Text payloads are printed as their raw JSON.
    Pretty,
    /// One JSON array holding every row.
    Json,
}

pub(crate) async fn command(config: Config) -> Result<()> {
    let mut client = ClientBuilder::default()
        .max_message_size(config.client_config.max_message_size)
        .build(config.client_config.host_url.as_str())
        .await?;

    let fetched = client.request(&config.ticket).await?;
    println!("{}", render(&fetched.table, config.output_format)?);
    eprintln!(
        "{} rows in {}",
        fetched.table.num_rows(),
        humantime::format_duration(round_to_micros(fetched.elapsed))
    );
    Ok(())
}

fn render(table: &Table, format: Format) -> Result<String> {
    Ok(match format {
        Format::Pretty => match table.text_payload() {
            Ok(text) => text.to_string(),
            Err(_) => pretty_format_batches(table.batches())?.to_string(),
        },
        Format::Json => table.to_json_text()?,
    })
}

fn round_to_micros(elapsed: Duration) -> Duration {
    Duration::from_micros(elapsed.as_micros() as u64)
}

#[cfg(test)]
mod tests {
    use gateway_table::test_util::sensor_table;

    use super::*;

    #[test]
    fn ticket_is_required() {
        assert!(Config::try_parse_from(["query"]).is_err());
        let config = Config::parse_from(["query", "duckdb_values"]);
        assert_eq!(config.ticket, "duckdb_values");
        assert_eq!(config.output_format, Format::Pretty);
    }

    #[test]
    fn text_payload_is_printed_raw() {
        let table = sensor_table(&[(1, "Sensor_1", 20.0), (2, "Sensor_2", 40.0)]);
        let payload = table.to_text_payload().unwrap();
        let rendered = render(&payload, Format::Pretty).unwrap();
        assert!(rendered.starts_with('['), "{rendered}");

        let rendered = render(&table, Format::Pretty).unwrap();
        assert!(rendered.starts_with("+--"), "{rendered}");
    }
}
