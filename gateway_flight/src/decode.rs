use std::{collections::HashMap, sync::Arc};

use arrow::{
    datatypes::{Schema, SchemaRef},
    ipc::{MessageHeader, root_as_message},
    record_batch::RecordBatch,
};
use arrow_flight::{FlightData, utils::flight_data_to_arrow_batch};
use futures::{Stream, StreamExt, stream::BoxStream};
use gateway_table::Table;

use crate::{Chunk, FlightError, Result};

/// Rebuilds a [`Table`] from the [`FlightData`] messages of one stream.
///
/// Enforces the stream order: exactly one schema chunk, then any number of
/// data chunks. Messages without an IPC header are keep-alives and are
/// skipped.
#[derive(Debug, Default)]
pub struct TableDecoder {
    schema: Option<SchemaRef>,
    batches: Vec<RecordBatch>,
}

impl TableDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// The schema, once the schema chunk has been seen.
    pub fn schema(&self) -> Option<&SchemaRef> {
        self.schema.as_ref()
    }

    /// Decode one message without accumulating it.
    ///
    /// Returns `Ok(None)` for keep-alive messages.
    pub fn decode(&mut self, data: &FlightData) -> Result<Option<Chunk>> {
        if data.data_header.is_empty() {
            return Ok(None);
        }

        let message = root_as_message(&data.data_header[..])
            .map_err(|e| FlightError::protocol(format!("invalid IPC message header: {e}")))?;

        match message.header_type() {
            MessageHeader::Schema => {
                if self.schema.is_some() {
                    return Err(FlightError::protocol("received a second schema chunk"));
                }
                let schema = Schema::try_from(data).map_err(|e| {
                    FlightError::protocol(format!("cannot decode schema chunk: {e}"))
                })?;
                let schema = Arc::new(schema);
                self.schema = Some(Arc::clone(&schema));
                Ok(Some(Chunk::Schema(schema)))
            }
            MessageHeader::RecordBatch => {
                let schema = self.schema.as_ref().ok_or_else(|| {
                    FlightError::protocol("received a data chunk before the schema chunk")
                })?;
                let batch = flight_data_to_arrow_batch(data, Arc::clone(schema), &HashMap::new())
                    .map_err(|e| FlightError::protocol(format!("cannot decode data chunk: {e}")))?;
                Ok(Some(Chunk::Data(batch)))
            }
            MessageHeader::DictionaryBatch => Err(FlightError::protocol(
                "dictionary batches are not part of a table stream",
            )),
            other => Err(FlightError::protocol(format!(
                "unexpected IPC message header {other:?}"
            ))),
        }
    }

    /// Decode one message and keep any data it carries.
    pub fn push(&mut self, data: &FlightData) -> Result<()> {
        if let Some(Chunk::Data(batch)) = self.decode(data)? {
            self.batches.push(batch);
        }
        Ok(())
    }

    /// Assemble the table from every chunk pushed so far.
    pub fn finish(self) -> Result<Table> {
        let schema = self
            .schema
            .ok_or_else(|| FlightError::protocol("stream ended without a schema chunk"))?;
        Ok(Table::try_new(schema, self.batches)?)
    }
}

/// Drain `stream` and rebuild the table it carries.
///
/// The result does not depend on how the producer chunked the rows.
pub async fn decode_table<S, E>(stream: S) -> Result<Table>
where
    S: Stream<Item = Result<FlightData, E>> + Send,
    FlightError: From<E>,
{
    let mut stream = std::pin::pin!(stream);
    let mut decoder = TableDecoder::new();
    while let Some(data) = stream.next().await {
        decoder.push(&data?)?;
    }
    decoder.finish()
}

/// Decode `stream` chunk by chunk, without retaining data chunks.
///
/// The first item is always [`Chunk::Schema`]. The stream ends after the
/// first error.
pub fn decode_batches<S, E>(stream: S) -> BoxStream<'static, Result<Chunk>>
where
    S: Stream<Item = Result<FlightData, E>> + Send + 'static,
    E: Send + 'static,
    FlightError: From<E>,
{
    let state = Some((stream.boxed(), TableDecoder::new()));
    futures::stream::unfold(state, |state| async move {
        let (mut stream, mut decoder) = state?;
        loop {
            match stream.next().await {
                Some(Ok(data)) => match decoder.decode(&data) {
                    Ok(Some(chunk)) => return Some((Ok(chunk), Some((stream, decoder)))),
                    Ok(None) => continue,
                    Err(e) => return Some((Err(e), None)),
                },
                Some(Err(e)) => return Some((Err(FlightError::from(e)), None)),
                None => {
                    return decoder.schema().is_none().then(|| {
                        (
                            Err(FlightError::protocol("stream ended without a schema chunk")),
                            None,
                        )
                    });
                }
            }
        }
    })
    .boxed()
}
