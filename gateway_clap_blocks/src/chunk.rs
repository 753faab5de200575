//! Sizing of the data chunks a response is split into.

use std::num::NonZeroUsize;

/// Default upper bound on the size of one data chunk: 2 MiB.
pub const DEFAULT_MAX_CHUNK_BYTES: usize = 2 * 1024 * 1024;

#[derive(Debug, Clone, Copy, clap::Parser)]
pub struct ChunkConfig {
    /// Maximum rows per data chunk. Unlimited by default, chunks are then
    /// bounded by size only.
    #[clap(long = "max-chunk-rows", env = "GATEWAY_MAX_CHUNK_ROWS", action)]
    pub max_chunk_rows: Option<NonZeroUsize>,

    /// Approximate maximum bytes per data chunk.
    #[clap(
        long = "max-chunk-bytes",
        env = "GATEWAY_MAX_CHUNK_BYTES",
        default_value_t = DEFAULT_MAX_CHUNK_BYTES,
        action
    )]
    pub max_chunk_bytes: usize,
}
