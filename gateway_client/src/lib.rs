//! Arrow Flight client for the sensor gateway.
//!
//! ```no_run
//! # async fn run() -> Result<(), gateway_client::Error> {
//! use gateway_client::ClientBuilder;
//!
//! let mut client = ClientBuilder::default()
//!     .build("http://127.0.0.1:8888")
//!     .await?;
//!
//! let fetched = client.request("postgres").await?;
//! println!("{} rows in {:?}", fetched.table.num_rows(), fetched.elapsed);
//! # Ok(())
//! # }
//! ```

#![deny(rustdoc::broken_intra_doc_links, rustdoc::bare_urls, rust_2018_idioms)]
#![warn(
    missing_debug_implementations,
    clippy::explicit_iter_loop,
    clippy::use_self,
    clippy::clone_on_ref_ptr,
    clippy::future_not_send
)]

mod builder;
mod client;
mod error;

pub use builder::{ClientBuilder, DEFAULT_MAX_MESSAGE_SIZE};
pub use client::{BatchStream, Client, Fetched, TicketInfo};
pub use error::{Error, Result};
