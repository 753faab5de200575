//! In-memory columnar tables for the sensor gateway.
//!
//! A [`Table`] is an ordered set of equally long, typed columns stored as a
//! sequence of Arrow [`RecordBatch`]es sharing one schema. Tables are
//! produced per request by a backend adapter and rebuilt by the client from
//! a chunked stream; they are never mutated after construction.

#![deny(rustdoc::broken_intra_doc_links, rustdoc::bare_urls, rust_2018_idioms)]
#![warn(
    missing_debug_implementations,
    clippy::explicit_iter_loop,
    clippy::use_self,
    clippy::clone_on_ref_ptr
)]

pub mod rows;
pub mod schema;
pub mod test_util;
pub mod text;

use std::sync::Arc;

use arrow::{
    array::{Array, ArrayRef, AsArray},
    compute::{CastOptions, cast_with_options, concat_batches, kernels::aggregate::sum},
    datatypes::{DataType, Float64Type, Schema, SchemaRef},
    error::ArrowError,
    record_batch::RecordBatch,
};

pub use schema::{canonical_schema, is_compatible};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("schema mismatch: expected [{expected}], found [{actual}]")]
    SchemaMismatch { expected: String, actual: String },

    #[error("cannot cast column '{column}' from {from} to {to}: {source}")]
    Cast {
        column: String,
        from: DataType,
        to: DataType,
        #[source]
        source: ArrowError,
    },

    #[error("column '{0}' not found")]
    ColumnNotFound(String),

    #[error("column '{column}' has non-numeric type {found}")]
    NotNumeric { column: String, found: DataType },

    #[error("at least one table is required for concatenation")]
    NothingToConcat,

    #[error("table is not a text payload: expected one row in a single Utf8 column")]
    NotATextPayload,

    #[error("text payload is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("arrow error: {0}")]
    Arrow(#[from] ArrowError),
}

impl Error {
    fn mismatch(expected: &Schema, actual: &Schema) -> Self {
        Self::SchemaMismatch {
            expected: schema::describe(expected),
            actual: schema::describe(actual),
        }
    }

    /// True for errors raised because a table does not fit a schema, either
    /// structurally or because a column could not be coerced.
    pub fn is_schema_mismatch(&self) -> bool {
        matches!(self, Self::SchemaMismatch { .. } | Self::Cast { .. })
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// An immutable columnar query result.
#[derive(Debug, Clone)]
pub struct Table {
    schema: SchemaRef,
    batches: Vec<RecordBatch>,
}

impl Table {
    /// Create a table from batches which must all be compatible with
    /// `schema`.
    pub fn try_new(schema: SchemaRef, batches: Vec<RecordBatch>) -> Result<Self> {
        if let Some(bad) = batches
            .iter()
            .find(|b| !is_compatible(&schema, b.schema().as_ref()))
        {
            return Err(Error::mismatch(&schema, &bad.schema()));
        }
        Ok(Self { schema, batches })
    }

    /// A table with `schema` and zero rows.
    pub fn empty(schema: SchemaRef) -> Self {
        Self {
            schema,
            batches: vec![],
        }
    }

    pub fn from_batch(batch: RecordBatch) -> Self {
        Self {
            schema: batch.schema(),
            batches: vec![batch],
        }
    }

    pub fn schema(&self) -> SchemaRef {
        Arc::clone(&self.schema)
    }

    pub fn batches(&self) -> &[RecordBatch] {
        &self.batches
    }

    pub fn into_batches(self) -> Vec<RecordBatch> {
        self.batches
    }

    pub fn num_rows(&self) -> usize {
        self.batches.iter().map(|b| b.num_rows()).sum()
    }

    pub fn num_columns(&self) -> usize {
        self.schema.fields().len()
    }

    pub fn is_empty(&self) -> bool {
        self.num_rows() == 0
    }

    pub fn column_index(&self, name: &str) -> Result<usize> {
        self.schema
            .index_of(name)
            .map_err(|_| Error::ColumnNotFound(name.to_string()))
    }

    /// Fails with [`Error::SchemaMismatch`] unless this table's schema is
    /// compatible with `expected`.
    pub fn ensure_schema(&self, expected: &Schema) -> Result<()> {
        if is_compatible(&self.schema, expected) {
            Ok(())
        } else {
            Err(Error::mismatch(expected, &self.schema))
        }
    }

    /// Coerce every column to the type `target` declares for it.
    ///
    /// Columns are matched by name and emitted in `target` order. A missing
    /// or extra column, or a value that does not survive the cast, is a
    /// schema mismatch; values are never silently nulled.
    pub fn cast_to(&self, target: &SchemaRef) -> Result<Self> {
        if self.schema.fields().len() != target.fields().len() {
            return Err(Error::mismatch(target, &self.schema));
        }
        let indices = target
            .fields()
            .iter()
            .map(|f| self.schema.index_of(f.name()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| Error::mismatch(target, &self.schema))?;

        let options = CastOptions {
            safe: false,
            ..Default::default()
        };

        let batches = self
            .batches
            .iter()
            .map(|batch| -> Result<RecordBatch> {
                let columns = target
                    .fields()
                    .iter()
                    .zip(&indices)
                    .map(|(field, &idx)| {
                        let column = batch.column(idx);
                        if column.data_type() == field.data_type() {
                            return Ok(Arc::clone(column));
                        }
                        cast_with_options(column, field.data_type(), &options).map_err(|source| {
                            Error::Cast {
                                column: field.name().clone(),
                                from: column.data_type().clone(),
                                to: field.data_type().clone(),
                                source,
                            }
                        })
                    })
                    .collect::<Result<Vec<ArrayRef>>>()?;
                Ok(RecordBatch::try_new(Arc::clone(target), columns)?)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            schema: Arc::clone(target),
            batches,
        })
    }

    /// Concatenate tables which share one schema.
    ///
    /// Rows keep their order: all rows of `tables[0]` first, then all rows of
    /// `tables[1]`, and so on.
    pub fn concat(tables: &[Self]) -> Result<Self> {
        let first = tables.first().ok_or(Error::NothingToConcat)?;
        for t in &tables[1..] {
            t.ensure_schema(&first.schema)?;
        }
        let batches = tables
            .iter()
            .flat_map(|t| t.batches.iter().cloned())
            .collect();
        Ok(Self {
            schema: first.schema(),
            batches,
        })
    }

    /// Collapse all batches into a single [`RecordBatch`].
    pub fn combine(&self) -> Result<RecordBatch> {
        Ok(concat_batches(&self.schema, &self.batches)?)
    }

    /// Single pass over the named numeric column. The column may have any
    /// numeric type; values are widened to `f64`.
    pub fn column_stats(&self, name: &str) -> Result<ColumnStats> {
        let idx = self.column_index(name)?;
        let mut stats = ColumnStats::default();
        for batch in &self.batches {
            let array = batch.column(idx);
            let stats_of_batch = ColumnStats::from_array(array).map_err(|e| match e {
                Error::NotNumeric { found, .. } => Error::NotNumeric {
                    column: name.to_string(),
                    found,
                },
                e => e,
            })?;
            stats.merge(stats_of_batch);
        }
        Ok(stats)
    }

    /// Arithmetic mean of the named numeric column, `None` if it holds no
    /// non-null values.
    pub fn mean(&self, name: &str) -> Result<Option<f64>> {
        Ok(self.column_stats(name)?.mean())
    }
}

/// Running count and sum of a numeric column.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct ColumnStats {
    /// Number of non-null values seen.
    pub count: usize,
    pub sum: f64,
}

impl ColumnStats {
    /// Count and sum `array`, which must be numeric or entirely null.
    pub fn from_array(array: &ArrayRef) -> Result<Self> {
        let values = match array.data_type() {
            DataType::Float64 => Arc::clone(array),
            DataType::Null => return Ok(Self::default()),
            data_type if data_type.is_numeric() => {
                let options = CastOptions {
                    safe: false,
                    ..Default::default()
                };
                cast_with_options(array, &DataType::Float64, &options)?
            }
            data_type => {
                return Err(Error::NotNumeric {
                    column: String::new(),
                    found: data_type.clone(),
                });
            }
        };
        let values = values.as_primitive::<Float64Type>();
        Ok(Self {
            count: values.len() - values.null_count(),
            sum: sum(values).unwrap_or_default(),
        })
    }

    pub fn merge(&mut self, other: Self) {
        self.count += other.count;
        self.sum += other.sum;
    }

    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }
}
