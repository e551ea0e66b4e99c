//! Storage tier for filewatcher.
//!
//! Keeps one bucket of root-relative paths per node, applies the operation
//! batches nodes post, and lists every bucket for the master.
//!
//! - [`Store`]: the buckets, optionally persisted to a JSON snapshot
//! - [`StorageServer`]: the HTTP API over a store, driven through the
//!   [`Service`](fw_core::Service) lifecycle
//!
//! # Crate Dependencies
//!
//! ```text
//! fw-cli ──► fw-storage ──► fw-core
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod error;
pub mod server;
pub mod store;

pub use error::StorageError;
pub use server::StorageServer;
pub use store::Store;
