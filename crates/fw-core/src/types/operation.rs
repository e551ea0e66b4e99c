//! Change events reported by a node.
//!
//! An [`Operation`] records that a root-relative path appeared or disappeared.
//! Operations travel in [`OperationBatch`]es whose order is significant: the
//! storage tier applies them left to right.

use std::fmt;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// The kind of change an [`Operation`] reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationEvent {
    /// A file or directory appeared.
    Create,
    /// A file or directory was removed or renamed away.
    Remove,
}

impl OperationEvent {
    /// Returns a short label for display.
    #[inline]
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Remove => "remove",
        }
    }
}

impl fmt::Display for OperationEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A single path-level change.
///
/// `path` is relative to the watched root, slash-separated, with a leading
/// `/`. The root itself is `/`. It never contains the root's absolute prefix,
/// so a node can be re-rooted without changing identifiers.
///
/// # Examples
///
/// ```
/// use fw_core::{Operation, OperationEvent};
///
/// let op = Operation::create("/docs/readme.md");
/// assert_eq!(op.event, OperationEvent::Create);
/// assert_eq!(
///     serde_json::to_string(&op).unwrap(),
///     r#"{"Path":"/docs/readme.md","Event":"Create"}"#
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Operation {
    /// Root-relative path.
    pub path: String,
    /// What happened to the path.
    pub event: OperationEvent,
}

impl Operation {
    /// Creates a new operation.
    #[inline]
    #[must_use]
    pub fn new(path: impl Into<String>, event: OperationEvent) -> Self {
        Self {
            path: path.into(),
            event,
        }
    }

    /// Creates a [`OperationEvent::Create`] operation.
    #[inline]
    #[must_use]
    pub fn create(path: impl Into<String>) -> Self {
        Self::new(path, OperationEvent::Create)
    }

    /// Creates a [`OperationEvent::Remove`] operation.
    #[inline]
    #[must_use]
    pub fn remove(path: impl Into<String>) -> Self {
        Self::new(path, OperationEvent::Remove)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.event, self.path)
    }
}

/// An ordered group of operations delivered as a unit.
///
/// Live watcher events are singleton batches, so the operations are kept in a
/// [`SmallVec`] with a little inline storage. Serialized as a plain JSON
/// array.
///
/// # Examples
///
/// ```
/// use fw_core::{Operation, OperationBatch};
///
/// let mut pending = OperationBatch::singleton(Operation::create("/a"));
/// pending.append(OperationBatch::singleton(Operation::remove("/b")));
///
/// assert_eq!(pending.len(), 2);
/// let paths: Vec<_> = pending.iter().map(|op| op.path.as_str()).collect();
/// assert_eq!(paths, ["/a", "/b"]);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationBatch {
    /// The operations, in application order.
    pub operations: SmallVec<[Operation; 4]>,
}

impl OperationBatch {
    /// Creates a new empty batch.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a batch holding one operation.
    #[must_use]
    pub fn singleton(operation: Operation) -> Self {
        let mut batch = Self::new();
        batch.push(operation);
        batch
    }

    /// Adds an operation to the end of the batch.
    #[inline]
    pub fn push(&mut self, operation: Operation) {
        self.operations.push(operation);
    }

    /// Moves every operation of `other` to the end of this batch.
    pub fn append(&mut self, other: Self) {
        self.operations.extend(other.operations);
    }

    /// Inserts every operation of `front` ahead of the current operations.
    pub fn prepend(&mut self, front: Self) {
        let rest = std::mem::replace(&mut self.operations, front.operations);
        self.operations.extend(rest);
    }

    /// Takes every operation out of the batch, leaving it empty.
    #[must_use]
    pub fn take(&mut self) -> Self {
        std::mem::take(self)
    }

    /// Returns the number of operations in this batch.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Returns `true` if the batch contains no operations.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Returns an iterator over the operations.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &Operation> {
        self.operations.iter()
    }
}

impl IntoIterator for OperationBatch {
    type Item = Operation;
    type IntoIter = smallvec::IntoIter<[Operation; 4]>;

    fn into_iter(self) -> Self::IntoIter {
        self.operations.into_iter()
    }
}

impl<'a> IntoIterator for &'a OperationBatch {
    type Item = &'a Operation;
    type IntoIter = std::slice::Iter<'a, Operation>;

    fn into_iter(self) -> Self::IntoIter {
        self.operations.iter()
    }
}

impl FromIterator<Operation> for OperationBatch {
    fn from_iter<T: IntoIterator<Item = Operation>>(iter: T) -> Self {
        Self {
            operations: iter.into_iter().collect(),
        }
    }
}

impl Extend<Operation> for OperationBatch {
    fn extend<T: IntoIterator<Item = Operation>>(&mut self, iter: T) {
        self.operations.extend(iter);
    }
}
