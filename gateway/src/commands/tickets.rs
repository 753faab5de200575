//! List the tickets a running gateway serves
use arrow::datatypes::Schema;
use clap::Parser;
use gateway_clap_blocks::client::ClientConfig;
use gateway_client::{ClientBuilder, TicketInfo};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Client(#[from] gateway_client::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Parser)]
pub struct Config {
    #[clap(flatten)]
    client_config: ClientConfig,
}

pub(crate) async fn command(config: Config) -> Result<()> {
    let mut client = ClientBuilder::default()
        .max_message_size(config.client_config.max_message_size)
        .build(config.client_config.host_url.as_str())
        .await?;

    for ticket in client.list_tickets().await? {
        println!("{}", describe(&ticket));
    }
    Ok(())
}

fn describe(info: &TicketInfo) -> String {
    match &info.schema {
        Some(schema) => format!("{:<16} {}", info.ticket, columns(schema)),
        None => format!("{:<16} (schema depends on the store)", info.ticket),
    }
}

fn columns(schema: &Schema) -> String {
    schema
        .fields()
        .iter()
        .map(|f| format!("{}: {}", f.name(), f.data_type()))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use arrow::datatypes::{DataType, Field};

    use super::*;

    #[test]
    fn describes_fixed_and_open_schemas() {
        let fixed = TicketInfo {
            ticket: "duckdb_json".to_string(),
            schema: Some(Schema::new(vec![Field::new("json", DataType::Utf8, true)])),
        };
        assert_eq!(describe(&fixed), "duckdb_json      json: Utf8");

        let open = TicketInfo {
            ticket: "mongo_values".to_string(),
            schema: None,
        };
        assert_eq!(
            describe(&open),
            "mongo_values     (schema depends on the store)"
        );
    }
}
