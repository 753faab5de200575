use std::{num::NonZeroUsize, sync::Arc};

use arrow::{
    array::ArrayRef,
    datatypes::{DataType, Field, Schema, SchemaRef},
    ipc::writer::IpcWriteOptions,
    record_batch::RecordBatch,
};
use arrow_flight::FlightData;
use futures::{StreamExt, stream::BoxStream};
use gateway_table::Table;

use crate::{Chunk, FlightError, Result};

/// Default target size for data chunks: half of tonic's 4 MiB message
/// limit, since the size estimate ignores IPC framing.
pub const GRPC_TARGET_MAX_CHUNK_BYTES: usize = 2 * 1024 * 1024;

/// Creates a stream which encodes a [`Table`] into a stream of
/// [`FlightData`]: one schema chunk, then the table's rows split into data
/// chunks in order.
///
/// Chunks are encoded lazily as the stream is polled, so a consumer that
/// stops polling (e.g. a gRPC transport waiting for flow-control credit)
/// holds the producer back.
///
/// Dictionary columns leave the encoder as plain arrays of their value
/// type.
#[derive(Debug, Clone)]
pub struct ChunkEncoderBuilder {
    /// The approximate maximum chunk size (see [`Self::with_max_chunk_bytes`]).
    max_chunk_bytes: usize,
    /// Hard cap on rows per data chunk.
    max_chunk_rows: Option<NonZeroUsize>,
    /// Ipc writer options
    options: IpcWriteOptions,
}

impl Default for ChunkEncoderBuilder {
    fn default() -> Self {
        Self {
            max_chunk_bytes: GRPC_TARGET_MAX_CHUNK_BYTES,
            max_chunk_rows: None,
            options: IpcWriteOptions::default(),
        }
    }
}

impl ChunkEncoderBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Approximate byte budget of one data chunk. Batches larger than this
    /// are sliced, in order, into several chunks; the estimate counts
    /// array memory, not encoded bytes.
    pub fn with_max_chunk_bytes(mut self, max_chunk_bytes: usize) -> Self {
        self.max_chunk_bytes = max_chunk_bytes.max(1);
        self
    }

    /// Limit every data chunk to at most `max_chunk_rows` rows.
    pub fn with_max_chunk_rows(mut self, max_chunk_rows: Option<NonZeroUsize>) -> Self {
        self.max_chunk_rows = max_chunk_rows;
        self
    }

    /// IPC writer options used for every chunk.
    pub fn with_options(mut self, options: IpcWriteOptions) -> Self {
        self.options = options;
        self
    }

    /// Return a stream that converts `table` to [`FlightData`], consuming
    /// self.
    pub fn build(self, table: Table) -> BoxStream<'static, Result<FlightData>> {
        let Self {
            max_chunk_bytes,
            max_chunk_rows,
            options,
        } = self;

        // every data chunk is encoded against this schema
        let schema = prepare_schema_for_flight(&table.schema());
        let schema_chunk = Chunk::Schema(Arc::clone(&schema)).encode(&options);

        let data = table
            .into_batches()
            .into_iter()
            .flat_map(move |batch| {
                match prepare_batch_for_flight(&batch, Arc::clone(&schema)) {
                    Ok(batch) => split_batch_for_grpc_response(batch, max_chunk_bytes, max_chunk_rows)
                        .into_iter()
                        .map(Ok)
                        .collect::<Vec<_>>(),
                    Err(e) => vec![Err(e)],
                }
            })
            .map(move |batch| batch.and_then(|batch| Chunk::Data(batch).encode(&options)));

        futures::stream::once(async move { schema_chunk })
            .chain(futures::stream::iter(data))
            .boxed()
    }
}

/// The schema a table is sent with: dictionary fields become fields of
/// their value type, metadata is kept.
pub fn prepare_schema_for_flight(schema: &Schema) -> SchemaRef {
    let fields = schema
        .fields()
        .iter()
        .map(|field| match field.data_type() {
            DataType::Dictionary(_, value_type) => Arc::new(
                Field::new(
                    field.name(),
                    value_type.as_ref().clone(),
                    field.is_nullable(),
                )
                .with_metadata(field.metadata().clone()),
            ),
            _ => Arc::clone(field),
        })
        .collect::<Vec<_>>();

    Arc::new(Schema::new(fields).with_metadata(schema.metadata().clone()))
}

/// Slice `batch` into pieces of roughly `max_batch_size_bytes` each and at
/// most `max_rows` rows each, keeping row order.
///
/// Slices share the input's buffers. An empty batch yields nothing.
pub fn split_batch_for_grpc_response(
    batch: RecordBatch,
    max_batch_size_bytes: usize,
    max_rows: Option<NonZeroUsize>,
) -> Vec<RecordBatch> {
    let num_rows = batch.num_rows();
    if num_rows == 0 {
        return vec![];
    }

    let max_batch_size_bytes = max_batch_size_bytes.max(1);
    let size = batch
        .columns()
        .iter()
        .map(|col| col.get_array_memory_size())
        .sum::<usize>();

    let n_batches =
        (size / max_batch_size_bytes + usize::from(size % max_batch_size_bytes != 0)).max(1);
    let mut rows_per_batch = num_rows.div_ceil(n_batches).max(1);
    if let Some(max_rows) = max_rows {
        rows_per_batch = rows_per_batch.min(max_rows.get());
    }

    let mut out = Vec::with_capacity(num_rows.div_ceil(rows_per_batch));
    let mut offset = 0;
    while offset < num_rows {
        let length = rows_per_batch.min(num_rows - offset);
        out.push(batch.slice(offset, length));
        offset += length;
    }

    out
}

/// Rebuild `batch` under `schema` (from [`prepare_schema_for_flight`]) with
/// its dictionary columns hydrated.
pub fn prepare_batch_for_flight(batch: &RecordBatch, schema: SchemaRef) -> Result<RecordBatch> {
    let columns = batch
        .columns()
        .iter()
        .map(hydrate_dictionary)
        .collect::<Result<Vec<_>>>()?;

    Ok(RecordBatch::try_new(schema, columns)?)
}

/// Dictionary arrays are cast to their value type; anything else is
/// returned as is.
fn hydrate_dictionary(array: &ArrayRef) -> Result<ArrayRef> {
    if let DataType::Dictionary(_, value) = array.data_type() {
        arrow::compute::cast(array, value).map_err(FlightError::from)
    } else {
        Ok(Arc::clone(array))
    }
}

#[cfg(test)]
mod tests {
    use arrow::{
        array::{AsArray, DictionaryArray, StringArray, UInt8Array, UInt32Array},
        compute::concat_batches,
        datatypes::Int32Type,
    };
    use futures::TryStreamExt;
    use gateway_table::test_util::sensor_table;

    use super::*;

    #[test]
    fn split_by_bytes() {
        let budget = 1024;

        let small = RecordBatch::try_from_iter(vec![(
            "reading",
            Arc::new(UInt32Array::from(vec![7, 8, 9])) as ArrayRef,
        )])
        .unwrap();
        let split = split_batch_for_grpc_response(small.clone(), budget, None);
        assert_eq!(split, vec![small]);

        // one byte per row, one row over budget
        let rows = budget + 1;
        let large = RecordBatch::try_from_iter(vec![(
            "reading",
            Arc::new(UInt8Array::from_iter_values((0..rows).map(|i| (i % 200) as u8))) as ArrayRef,
        )])
        .unwrap();
        let split = split_batch_for_grpc_response(large.clone(), budget, None);
        assert_eq!(split.len(), 2);
        assert_eq!(split.iter().map(RecordBatch::num_rows).sum::<usize>(), rows);
        assert_eq!(concat_batches(&large.schema(), &split).unwrap(), large);
    }

    #[test]
    fn split_by_rows() {
        let c = UInt32Array::from((0..10).collect::<Vec<u32>>());
        let batch = RecordBatch::try_from_iter(vec![("a", Arc::new(c) as ArrayRef)]).unwrap();

        let split = split_batch_for_grpc_response(batch.clone(), usize::MAX, NonZeroUsize::new(3));
        let sizes: Vec<_> = split.iter().map(|b| b.num_rows()).collect();
        assert_eq!(sizes, vec![3, 3, 3, 1]);
        assert_eq!(concat_batches(&batch.schema(), &split).unwrap(), batch);

        // a tiny byte budget never yields empty slices
        let split = split_batch_for_grpc_response(batch, 1, None);
        assert_eq!(split.len(), 10);
        assert!(split.iter().all(|b| b.num_rows() == 1));
    }

    #[test]
    fn split_empty_batch() {
        let c = UInt32Array::from(Vec::<u32>::new());
        let batch = RecordBatch::try_from_iter(vec![("a", Arc::new(c) as ArrayRef)]).unwrap();
        assert!(split_batch_for_grpc_response(batch, 1024, None).is_empty());
    }

    #[test]
    fn dictionary_names_are_hydrated() {
        let ids = UInt32Array::from(vec![1, 2, 3, 4]);
        let names: DictionaryArray<Int32Type> =
            [Some("Sensor_1"), None, Some("Sensor_2"), Some("Sensor_1")]
                .into_iter()
                .collect();
        let batch = RecordBatch::try_from_iter(vec![
            ("id", Arc::new(ids) as ArrayRef),
            ("name", Arc::new(names) as ArrayRef),
        ])
        .unwrap();

        let schema = prepare_schema_for_flight(&batch.schema());
        assert_eq!(schema.field(1).data_type(), &DataType::Utf8);

        let hydrated = prepare_batch_for_flight(&batch, Arc::clone(&schema)).unwrap();
        assert_eq!(
            hydrated.column(1).as_string::<i32>(),
            &StringArray::from(vec![Some("Sensor_1"), None, Some("Sensor_2"), Some("Sensor_1")])
        );
    }

    #[tokio::test]
    async fn schema_chunk_first() {
        let table = sensor_table(&[(1, "a", 1.0), (2, "b", 2.0), (3, "c", 3.0)]);
        let builder = ChunkEncoderBuilder::new().with_max_chunk_rows(NonZeroUsize::new(2));

        let encoded: Vec<FlightData> = builder.build(table).try_collect().await.unwrap();
        assert_eq!(encoded.len(), 3);

        let mut decoder = crate::TableDecoder::new();
        let chunks: Vec<Chunk> = encoded
            .iter()
            .map(|data| decoder.decode(data).unwrap().unwrap())
            .collect();
        assert!(matches!(chunks[0], Chunk::Schema(_)));
        let rows: Vec<_> = chunks[1..]
            .iter()
            .map(|chunk| match chunk {
                Chunk::Data(batch) => batch.num_rows(),
                Chunk::Schema(_) => panic!("second schema chunk"),
            })
            .collect();
        assert_eq!(rows, vec![2, 1]);
    }

    #[tokio::test]
    async fn empty_table_is_schema_only() {
        let table = Table::empty(gateway_table::canonical_schema());
        let encoded: Vec<FlightData> = ChunkEncoderBuilder::new()
            .build(table)
            .try_collect()
            .await
            .unwrap();
        assert_eq!(encoded.len(), 1);
    }
}
