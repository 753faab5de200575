//! Building blocks for [`clap`]-driven configuration options.
//!
//! Each block is a `clap::Parser` struct meant to be `#[clap(flatten)]`ed
//! into a command, with an environment variable fallback for every flag.

#![deny(rustdoc::broken_intra_doc_links, rustdoc::bare_urls, rust_2018_idioms)]
#![warn(
    missing_debug_implementations,
    clippy::explicit_iter_loop,
    clippy::use_self,
    clippy::clone_on_ref_ptr
)]

pub mod backend;
pub mod chunk;
pub mod client;
pub mod socket_addr;
pub mod tokio;
