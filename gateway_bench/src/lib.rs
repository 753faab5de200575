//! Benchmark harness for the sensor gateway.
//!
//! For every backend the harness fetches the full table, the values-only
//! projection, a streamed single-pass aggregate and the JSON payload, then
//! concatenates the full tables and compares a columnar mean against a
//! row-oriented one. Every request is a single attempt; the first error
//! ends the run.

#![deny(rustdoc::broken_intra_doc_links, rustdoc::bare_urls, rust_2018_idioms)]
#![warn(
    missing_debug_implementations,
    clippy::explicit_iter_loop,
    clippy::use_self,
    clippy::clone_on_ref_ptr,
    clippy::future_not_send
)]

mod measure;
mod report;

use std::num::NonZeroUsize;

use futures::TryStreamExt;
use gateway_client::Client;
use gateway_table::{
    ColumnStats, Table, rows::mean_of_rows, schema::VALUE_COLUMN, text::parse_rows,
};
use tracing::info;

pub use measure::{Timed, ratio, repeat, repeat_sync};
pub use report::{Aggregate, CombinedReport, Report, SourceReport, TextMeasurement};

/// Backends benchmarked when none are named.
pub const DEFAULT_BACKENDS: [&str; 3] = ["postgres", "mongo", "duckdb"];

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("request for '{ticket}' failed: {source}")]
    Request {
        ticket: String,
        #[source]
        source: gateway_client::Error,
    },

    #[error("unexpected result for '{ticket}': {source}")]
    Table {
        ticket: String,
        #[source]
        source: gateway_table::Error,
    },

    #[error("cannot combine sources: {0}")]
    Combine(#[source] gateway_table::Error),

    #[error("no backends to benchmark")]
    NoBackends,
}

impl Error {
    /// True when a table did not have the schema it was required to have.
    pub fn is_schema_mismatch(&self) -> bool {
        match self {
            Self::Request { source, .. } => source.is_schema_mismatch(),
            Self::Table { source, .. } | Self::Combine(source) => source.is_schema_mismatch(),
            Self::NoBackends => false,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

fn request_error(ticket: &str) -> impl FnOnce(gateway_client::Error) -> Error + '_ {
    move |source| Error::Request {
        ticket: ticket.to_string(),
        source,
    }
}

fn table_error(ticket: &str) -> impl FnOnce(gateway_table::Error) -> Error + '_ {
    move |source| Error::Table {
        ticket: ticket.to_string(),
        source,
    }
}

/// Runs the benchmark against one gateway.
#[derive(Debug, Clone)]
pub struct Harness {
    client: Client,
    backends: Vec<String>,
    iterations: NonZeroUsize,
}

impl Harness {
    pub fn new(client: Client, backends: Vec<String>, iterations: NonZeroUsize) -> Self {
        Self {
            client,
            backends,
            iterations,
        }
    }

    pub async fn run(&self) -> Result<Report> {
        if self.backends.is_empty() {
            return Err(Error::NoBackends);
        }

        let mut sources = Vec::with_capacity(self.backends.len());
        let mut tables = Vec::with_capacity(self.backends.len());
        for backend in &self.backends {
            let (source, table) = self.source(backend).await?;
            info!(
                %backend,
                rows = source.full.rows,
                elapsed = ?source.full.elapsed,
                "benchmarked source"
            );
            sources.push(source);
            tables.push(table);
        }

        let combined = self.combine(&tables, &sources)?;
        Ok(Report {
            iterations: self.iterations.get(),
            sources,
            combined,
        })
    }

    async fn source(&self, backend: &str) -> Result<(SourceReport, Table)> {
        let full = self.fetch(backend).await?;
        let full_stats = aggregate(backend, &full)?;

        let values_ticket = format!("{backend}_values");
        let values = self.fetch(&values_ticket).await?;
        let values_stats = aggregate(&values_ticket, &values)?;
        let values_idx = values
            .value
            .column_index(VALUE_COLUMN)
            .map_err(table_error(&values_ticket))?;
        let values_type = values
            .value
            .schema()
            .field(values_idx)
            .data_type()
            .clone();

        let streamed = self.streamed(backend).await?;
        let text = self.text(&format!("{backend}_json")).await?;

        let report = SourceReport {
            backend: backend.to_string(),
            full: full_stats,
            values: values_stats,
            values_type,
            streamed,
            text,
        };
        Ok((report, full.value))
    }

    async fn fetch(&self, ticket: &str) -> Result<Timed<Table>> {
        repeat(self.iterations, || {
            let mut client = self.client.clone();
            async move {
                let fetched = client.request(ticket).await.map_err(request_error(ticket))?;
                Ok::<_, Error>(fetched.table)
            }
        })
        .await
    }

    /// Row count and mean of `value` without materializing the table.
    async fn streamed(&self, ticket: &str) -> Result<Aggregate> {
        let timed = repeat(self.iterations, || {
            let mut client = self.client.clone();
            async move {
                let mut batches = client.stream(ticket).await.map_err(request_error(ticket))?;
                let mut rows = 0;
                let mut stats = ColumnStats::default();
                while let Some(batch) = batches.try_next().await.map_err(request_error(ticket))? {
                    rows += batch.num_rows();
                    let idx = batch
                        .schema()
                        .index_of(VALUE_COLUMN)
                        .map_err(|e| table_error(ticket)(e.into()))?;
                    stats.merge(
                        ColumnStats::from_array(batch.column(idx)).map_err(table_error(ticket))?,
                    );
                }
                Ok::<_, Error>((rows, stats))
            }
        })
        .await?;

        let (rows, stats) = timed.value;
        Ok(Aggregate {
            rows,
            mean: stats.mean(),
            elapsed: timed.elapsed,
        })
    }

    /// Transfer plus full JSON parse of a text payload.
    async fn text(&self, ticket: &str) -> Result<TextMeasurement> {
        let timed = repeat(self.iterations, || {
            let mut client = self.client.clone();
            async move {
                let fetched = client.request(ticket).await.map_err(request_error(ticket))?;
                let text = fetched.table.text_payload().map_err(table_error(ticket))?;
                let records = parse_rows(text).map_err(table_error(ticket))?;
                Ok::<_, Error>(records.len())
            }
        })
        .await?;

        Ok(TextMeasurement {
            records: timed.value,
            elapsed: timed.elapsed,
        })
    }

    fn combine(&self, tables: &[Table], sources: &[SourceReport]) -> Result<CombinedReport> {
        let combined = Table::concat(tables).map_err(Error::Combine)?;

        let columnar = repeat_sync(self.iterations, || combined.mean(VALUE_COLUMN))
            .map_err(Error::Combine)?;
        let row_oriented = repeat_sync(self.iterations, || {
            combined.to_rows().map(|rows| mean_of_rows(&rows))
        })
        .map_err(Error::Combine)?;

        Ok(CombinedReport {
            rows: combined.num_rows(),
            mean: columnar.value,
            mean_of_means: mean_of_means(sources),
            columnar: columnar.elapsed,
            row_oriented: row_oriented.elapsed,
        })
    }
}

fn aggregate(ticket: &str, table: &Timed<Table>) -> Result<Aggregate> {
    Ok(Aggregate {
        rows: table.value.num_rows(),
        mean: table.value.mean(VALUE_COLUMN).map_err(table_error(ticket))?,
        elapsed: table.elapsed,
    })
}

/// `None` if any source had no values.
fn mean_of_means(sources: &[SourceReport]) -> Option<f64> {
    let means = sources
        .iter()
        .map(|s| s.full.mean)
        .collect::<Option<Vec<_>>>()?;
    (!means.is_empty()).then(|| means.iter().sum::<f64>() / means.len() as f64)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use arrow::datatypes::DataType;

    use super::*;

    fn source(mean: Option<f64>) -> SourceReport {
        let aggregate = Aggregate {
            rows: 3,
            mean,
            elapsed: Duration::ZERO,
        };
        SourceReport {
            backend: "duckdb".to_string(),
            full: aggregate,
            values: aggregate,
            values_type: DataType::Float64,
            streamed: aggregate,
            text: TextMeasurement {
                records: 3,
                elapsed: Duration::ZERO,
            },
        }
    }

    #[test]
    fn mean_of_source_means() {
        assert_eq!(
            mean_of_means(&[source(Some(20.0)), source(Some(40.0))]),
            Some(30.0)
        );
        assert_eq!(mean_of_means(&[source(Some(20.0)), source(None)]), None);
        assert_eq!(mean_of_means(&[]), None);
    }

    #[test]
    fn schema_mismatch_classification() {
        let err = Error::Combine(gateway_table::Error::SchemaMismatch {
            expected: "a".to_string(),
            actual: "b".to_string(),
        });
        assert!(err.is_schema_mismatch());
        assert!(!Error::NoBackends.is_schema_mismatch());
    }
}
