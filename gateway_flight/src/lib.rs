//! Chunked transfer of [`Table`]s over Arrow Flight.
//!
//! A stream carries exactly one schema chunk followed by zero or more data
//! chunks, each a contiguous row slice of every column. See
//! [`ChunkEncoderBuilder`] for the producing side and [`TableDecoder`] for
//! the consuming side.
//!
//! [`Table`]: gateway_table::Table

#![deny(rustdoc::broken_intra_doc_links, rustdoc::bare_urls, rust_2018_idioms)]
#![warn(
    missing_debug_implementations,
    clippy::explicit_iter_loop,
    clippy::use_self,
    clippy::clone_on_ref_ptr
)]

mod chunk;
mod decode;
mod encode;
mod error;

pub use chunk::Chunk;
pub use decode::{TableDecoder, decode_batches, decode_table};
pub use encode::{
    ChunkEncoderBuilder, GRPC_TARGET_MAX_CHUNK_BYTES, prepare_batch_for_flight,
    prepare_schema_for_flight, split_batch_for_grpc_response,
};
pub use error::{FlightError, Result};
