//! Domain types shared by every tier.
//!
//! - [`operation`] - Change events produced by a node watcher
//! - [`inventory`] - Aggregated per-node file sets served by the master
//!
//! All public types are re-exported here and at the crate root:
//!
//! ```
//! use fw_core::{InventoryResponse, Node, Operation, OperationBatch, OperationEvent};
//! ```

mod inventory;
mod operation;

pub use inventory::{InventoryResponse, Node};
pub use operation::{Operation, OperationBatch, OperationEvent};
