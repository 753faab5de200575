use arrow::{
    datatypes::SchemaRef,
    ipc::writer::{DictionaryTracker, IpcDataGenerator, IpcWriteOptions},
    record_batch::RecordBatch,
};
use arrow_flight::{FlightData, SchemaAsIpc};

use crate::Result;

/// The unit of wire transfer.
#[derive(Debug, Clone, PartialEq)]
pub enum Chunk {
    /// Column names and types, sent once as the first chunk of a stream.
    Schema(SchemaRef),
    /// A contiguous slice of rows covering every column.
    Data(RecordBatch),
}

impl Chunk {
    /// Encode this chunk as an Arrow IPC message wrapped in [`FlightData`].
    ///
    /// Data chunks must not contain dictionary columns; see
    /// [`prepare_batch_for_flight`](crate::prepare_batch_for_flight).
    pub fn encode(&self, options: &IpcWriteOptions) -> Result<FlightData> {
        match self {
            Self::Schema(schema) => Ok(SchemaAsIpc::new(schema, options).into()),
            Self::Data(batch) => {
                let generator = IpcDataGenerator::default();
                let mut tracker = DictionaryTracker::new(false);
                let (dictionaries, encoded) =
                    generator.encoded_batch(batch, &mut tracker, options)?;
                debug_assert!(dictionaries.is_empty(), "dictionaries must be hydrated");
                Ok(encoded.into())
            }
        }
    }
}
