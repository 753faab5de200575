use async_trait::async_trait;
use gateway_table::Table;
use sqlx::{
    Column, Connection, Row, TypeInfo,
    postgres::{PgConnection, PgRow},
};
use tracing::{debug, warn};

use super::{NativeValue, SourceError, SqlQuery, SqlSource, native_table};

/// A PostgreSQL database, reached through a fresh connection per query.
#[derive(Debug, Clone)]
pub struct PostgresSource {
    dsn: String,
}

impl PostgresSource {
    pub fn new(dsn: impl Into<String>) -> Self {
        Self { dsn: dsn.into() }
    }
}

#[async_trait]
impl SqlSource for PostgresSource {
    async fn query(&self, query: &SqlQuery) -> Result<Table, SourceError> {
        let mut conn = PgConnection::connect(&self.dsn)
            .await
            .map_err(SourceError::connect)?;

        let result = run(&mut conn, query).await;

        if let Err(e) = conn.close().await {
            warn!(%e, "error closing postgres connection");
        }
        result
    }
}

async fn run(conn: &mut PgConnection, query: &SqlQuery) -> Result<Table, SourceError> {
    let sql = query.sql();
    debug!(%sql, "querying postgres");

    let rows = sqlx::query(&sql)
        .fetch_all(&mut *conn)
        .await
        .map_err(SourceError::query)?;

    let rows = rows
        .iter()
        .map(decode_row)
        .collect::<Result<Vec<_>, _>>()?;

    native_table(&query.columns, rows)
}

fn decode_row(row: &PgRow) -> Result<Vec<NativeValue>, SourceError> {
    row.columns()
        .iter()
        .map(|column| {
            let idx = column.ordinal();
            let value = match column.type_info().name() {
                "BOOL" => row
                    .try_get::<Option<bool>, _>(idx)
                    .map(|v| v.map_or(NativeValue::Null, NativeValue::Boolean)),
                "INT2" => row
                    .try_get::<Option<i16>, _>(idx)
                    .map(|v| v.map_or(NativeValue::Null, NativeValue::Int16)),
                "INT4" => row
                    .try_get::<Option<i32>, _>(idx)
                    .map(|v| v.map_or(NativeValue::Null, NativeValue::Int32)),
                "INT8" => row
                    .try_get::<Option<i64>, _>(idx)
                    .map(|v| v.map_or(NativeValue::Null, NativeValue::Int64)),
                "FLOAT4" => row
                    .try_get::<Option<f32>, _>(idx)
                    .map(|v| v.map_or(NativeValue::Null, NativeValue::Float32)),
                "FLOAT8" => row
                    .try_get::<Option<f64>, _>(idx)
                    .map(|v| v.map_or(NativeValue::Null, NativeValue::Float64)),
                "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => row
                    .try_get::<Option<String>, _>(idx)
                    .map(|v| v.map_or(NativeValue::Null, NativeValue::Utf8)),
                "TIMESTAMP" => row
                    .try_get::<Option<chrono::NaiveDateTime>, _>(idx)
                    .map(|v| {
                        v.map_or(NativeValue::Null, |t| {
                            NativeValue::TimestampMicros(t.and_utc().timestamp_micros())
                        })
                    }),
                "TIMESTAMPTZ" => row
                    .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(idx)
                    .map(|v| {
                        v.map_or(NativeValue::Null, |t| {
                            NativeValue::TimestampMicros(t.timestamp_micros())
                        })
                    }),
                other => {
                    return Err(SourceError::UnsupportedType {
                        column: column.name().to_string(),
                        found: other.to_string(),
                    });
                }
            };
            value.map_err(SourceError::query)
        })
        .collect()
}
