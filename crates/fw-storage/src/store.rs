//! Per-node path store with optional snapshot persistence.
//!
//! This module provides [`Store`], the storage tier's only state: one bucket
//! of root-relative paths per node.
//!
//! # Remove Semantics
//!
//! Removing a path also removes every path below it. Nodes report a removed
//! directory as a single `Remove`, so its descendants must go with it. The
//! root path `/` is the ancestor of everything.
//!
//! # Examples
//!
//! ```
//! use fw_core::{Operation, OperationBatch};
//! use fw_storage::Store;
//!
//! let store = Store::in_memory();
//!
//! let batch: OperationBatch = [
//!     Operation::create("/docs"),
//!     Operation::create("/docs/a.txt"),
//!     Operation::create("/docs-old"),
//!     Operation::remove("/docs"),
//! ]
//! .into_iter()
//! .collect();
//! store.apply("node-1", &batch).unwrap();
//!
//! assert_eq!(store.files("node-1"), ["/docs-old"]);
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use fw_core::{OperationBatch, OperationEvent};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};

use crate::error::StorageError;

/// Buckets keyed by node ID.
type Buckets = BTreeMap<String, BTreeSet<String>>;

/// Thread-safe store of the paths each node reported.
///
/// # Thread Safety
///
/// Reads take a shared lock; applying a batch takes the exclusive lock for
/// the in-memory update only. Snapshot writes are serialized separately so
/// that the file never goes back to an older state.
#[derive(Debug, Default)]
pub struct Store {
    /// Path sets per node.
    buckets: RwLock<Buckets>,

    /// Snapshot file, if persistent.
    snapshot: Option<Utf8PathBuf>,

    /// Serializes snapshot writes.
    persist: Mutex<()>,
}

impl Store {
    /// Creates an empty store that lives in memory only.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Opens a persistent store backed by `path`.
    ///
    /// A missing file yields an empty store; the file is created on the first
    /// applied batch.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Io`] if the file exists but cannot be read and
    /// [`StorageError::Serialize`] if it is not a valid snapshot.
    pub fn open(path: &Utf8Path) -> Result<Self, StorageError> {
        let buckets = match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content)?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => Buckets::new(),
            Err(e) => return Err(StorageError::io(path, e)),
        };
        info!(path = %path, nodes = buckets.len(), "Opened snapshot");

        Ok(Self {
            buckets: RwLock::new(buckets),
            snapshot: Some(path.to_owned()),
            persist: Mutex::new(()),
        })
    }

    /// Applies a batch to the bucket of `node`, left to right.
    ///
    /// `Create` inserts the path, creating the bucket on first use. `Remove`
    /// deletes the path and everything below it. Removing an unknown path is
    /// a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error only if the snapshot cannot be written. The batch is
    /// applied in memory regardless.
    pub fn apply(&self, node: &str, batch: &OperationBatch) -> Result<(), StorageError> {
        let _persist = self.persist.lock();

        {
            let mut buckets = self.buckets.write();
            let bucket = buckets.entry(node.to_owned()).or_default();
            for op in batch {
                match op.event {
                    OperationEvent::Create => {
                        bucket.insert(op.path.clone());
                    }
                    OperationEvent::Remove => remove_subtree(bucket, &op.path),
                }
            }
            debug!(
                node,
                operations = batch.len(),
                files = bucket.len(),
                "Applied batch"
            );
        }

        match &self.snapshot {
            Some(path) => self.write_snapshot(path),
            None => Ok(()),
        }
    }

    /// Returns every node's paths, nodes and paths in ascending order.
    #[must_use]
    pub fn list(&self) -> BTreeMap<String, Vec<String>> {
        self.buckets
            .read()
            .iter()
            .map(|(node, paths)| (node.clone(), paths.iter().cloned().collect()))
            .collect()
    }

    /// Returns the paths of one node in ascending order.
    #[must_use]
    pub fn files(&self, node: &str) -> Vec<String> {
        self.buckets
            .read()
            .get(node)
            .map(|paths| paths.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns the number of known nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.buckets.read().len()
    }

    /// Returns the snapshot file, if persistent.
    #[must_use]
    pub fn snapshot_path(&self) -> Option<&Utf8Path> {
        self.snapshot.as_deref()
    }

    /// Rewrites the snapshot through a temporary file and a rename.
    fn write_snapshot(&self, path: &Utf8Path) -> Result<(), StorageError> {
        let encoded = serde_json::to_vec(&*self.buckets.read())?;

        let temp = Utf8PathBuf::from(format!("{path}.tmp"));
        std::fs::write(&temp, encoded).map_err(|e| StorageError::io(&temp, e))?;
        std::fs::rename(&temp, path).map_err(|e| StorageError::io(path, e))?;
        Ok(())
    }
}

/// Removes `path` and every path below it from `bucket`.
fn remove_subtree(bucket: &mut BTreeSet<String>, path: &str) {
    if path == "/" {
        bucket.clear();
        return;
    }
    bucket.remove(path);

    let prefix = format!("{path}/");
    let below: Vec<String> = bucket
        .range(prefix.clone()..)
        .take_while(|candidate| candidate.starts_with(&prefix))
        .cloned()
        .collect();
    for candidate in below {
        bucket.remove(&candidate);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fw_core::Operation;
    use tempfile::TempDir;

    fn batch(ops: impl IntoIterator<Item = Operation>) -> OperationBatch {
        ops.into_iter().collect()
    }

    #[test]
    fn test_create_and_list() {
        let store = Store::in_memory();
        store
            .apply("b", &batch([Operation::create("/z"), Operation::create("/y")]))
            .unwrap();
        store.apply("a", &batch([Operation::create("/x")])).unwrap();

        let listing = store.list();
        let nodes: Vec<&String> = listing.keys().collect();
        assert_eq!(nodes, ["a", "b"]);
        assert_eq!(listing["b"], ["/y", "/z"]);
        assert_eq!(store.node_count(), 2);
    }

    #[test]
    fn test_remove_takes_descendants() {
        let store = Store::in_memory();
        store
            .apply(
                "n",
                &batch([
                    Operation::create("/dir"),
                    Operation::create("/dir/a"),
                    Operation::create("/dir/sub/b"),
                    Operation::create("/dir2"),
                    Operation::create("/dir.txt"),
                ]),
            )
            .unwrap();

        store.apply("n", &batch([Operation::remove("/dir")])).unwrap();
        assert_eq!(store.files("n"), ["/dir.txt", "/dir2"]);
    }

    #[test]
    fn test_remove_root_clears_node() {
        let store = Store::in_memory();
        store
            .apply("n", &batch([Operation::create("/"), Operation::create("/a")]))
            .unwrap();
        store.apply("n", &batch([Operation::remove("/")])).unwrap();

        assert!(store.files("n").is_empty());
        assert_eq!(store.node_count(), 1);
    }

    #[test]
    fn test_operations_apply_in_order() {
        let store = Store::in_memory();
        store
            .apply(
                "n",
                &batch([
                    Operation::create("/a"),
                    Operation::remove("/a"),
                    Operation::create("/b"),
                    Operation::remove("/b"),
                    Operation::create("/b"),
                ]),
            )
            .unwrap();
        assert_eq!(store.files("n"), ["/b"]);
    }

    #[test]
    fn test_remove_unknown_path_is_noop() {
        let store = Store::in_memory();
        store.apply("n", &batch([Operation::remove("/ghost")])).unwrap();
        assert!(store.files("n").is_empty());
        assert!(store.files("other").is_empty());
    }

    #[test]
    fn test_snapshot_survives_reload() {
        let temp_dir = TempDir::new().unwrap();
        let path = Utf8PathBuf::try_from(temp_dir.path().join("store.json")).unwrap();

        let store = Store::open(&path).unwrap();
        assert_eq!(store.node_count(), 0);
        store
            .apply("n", &batch([Operation::create("/a"), Operation::create("/b")]))
            .unwrap();
        store.apply("n", &batch([Operation::remove("/a")])).unwrap();
        drop(store);

        let reopened = Store::open(&path).unwrap();
        assert_eq!(reopened.files("n"), ["/b"]);
        assert_eq!(reopened.snapshot_path(), Some(path.as_path()));
        assert!(!Utf8PathBuf::from(format!("{path}.tmp")).exists());
    }

    #[test]
    fn test_corrupt_snapshot_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = Utf8PathBuf::try_from(temp_dir.path().join("store.json")).unwrap();
        std::fs::write(&path, "{not json").unwrap();

        assert!(matches!(
            Store::open(&path),
            Err(StorageError::Serialize(_))
        ));
    }

    #[test]
    fn test_snapshot_write_failure_keeps_memory_state() {
        let temp_dir = TempDir::new().unwrap();
        let path = Utf8PathBuf::try_from(temp_dir.path().join("missing/store.json")).unwrap();

        let store = Store::open(&path).unwrap();
        let result = store.apply("n", &batch([Operation::create("/a")]));

        assert!(matches!(result, Err(StorageError::Io { .. })));
        assert_eq!(store.files("n"), ["/a"]);
    }
}
