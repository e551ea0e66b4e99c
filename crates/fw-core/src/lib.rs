//! Core types, configuration and errors for filewatcher.
//!
//! This crate provides the foundational types shared by the node, storage and
//! master tiers:
//!
//! - [`Operation`] / [`OperationBatch`]: path-level change events produced by
//!   a node watcher
//! - [`Node`] / [`InventoryResponse`]: the aggregated inventory served by the
//!   master
//! - [`Config`] and its per-tier sections, merged against explicit
//!   [`AddressDefaults`]
//! - [`Service`]: the configure/run/stop lifecycle shared by long-lived
//!   components
//!
//! # Crate Dependencies
//!
//! ```text
//! fw-cli ──► fw-master ──► fw-core
//!        ├─► fw-watcher ─► fw-core
//!        └─► fw-storage ─► fw-core
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod service;
pub mod types;

pub use config::{AddressDefaults, Config, MasterConfig, NodeConfig, StorageConfig};
pub use error::ConfigError;
pub use service::Service;
pub use types::{InventoryResponse, Node, Operation, OperationBatch, OperationEvent};
