//! Master tier for filewatcher: the aggregated inventory endpoint.
//!
//! # Overview
//!
//! - [`Aggregator`] fetches every node's paths from an [`InventorySource`],
//!   orders them, and keeps the last good result to serve while the source
//!   is unreachable
//! - [`StorageClient`] is the source backed by the storage tier's
//!   `GET /paths`
//! - [`MasterServer`] serves `GET /list` behind the
//!   [`Service`](fw_core::Service) lifecycle
//!
//! # Responses
//!
//! | Storage    | Cache   | `GET /list`                 |
//! |------------|---------|-----------------------------|
//! | reachable  | any     | `200`, fresh inventory      |
//! | down       | present | `200`, cached inventory     |
//! | down       | empty   | `502`, empty body           |
//!
//! # Crate Dependencies
//!
//! ```text
//! fw-cli ──► fw-master ──► fw-core
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod aggregator;
pub mod error;
pub mod server;
pub mod source;

pub use aggregator::Aggregator;
pub use error::{BoxError, MasterError};
pub use server::MasterServer;
pub use source::{InventorySource, Listing, StorageClient};
