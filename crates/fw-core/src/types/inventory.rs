//! The aggregated inventory served by the master.

use serde::{Deserialize, Serialize};

/// One reporting node and the files the backend currently knows about.
///
/// `files` is always sorted ascending and free of duplicates; the
/// constructor enforces it regardless of the order paths arrive in.
///
/// # Examples
///
/// ```
/// use fw_core::Node;
///
/// let node = Node::new("1", ["/my/b", "/my/a", "/my/b"]);
/// assert_eq!(node.files, ["/my/a", "/my/b"]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Node identifier.
    #[serde(rename = "ID")]
    pub id: String,

    /// Root-relative paths, sorted and unique.
    #[serde(rename = "Files")]
    pub files: Vec<String>,
}

impl Node {
    /// Creates a node, sorting and deduplicating `files`.
    #[must_use]
    pub fn new<I, S>(id: impl Into<String>, files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut files: Vec<String> = files.into_iter().map(Into::into).collect();
        files.sort_unstable();
        files.dedup();
        Self {
            id: id.into(),
            files,
        }
    }
}

/// The externally served inventory: every node, ordered by ID ascending.
///
/// Serialized as a plain JSON array of nodes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InventoryResponse {
    nodes: Vec<Node>,
}

impl InventoryResponse {
    /// Builds a response from a per-node listing in any order.
    ///
    /// Nodes are ordered by ID and every file list is sorted and
    /// deduplicated. A node ID appearing twice has its file sets merged.
    ///
    /// # Examples
    ///
    /// ```
    /// use fw_core::InventoryResponse;
    ///
    /// let response = InventoryResponse::from_listing([
    ///     ("b".to_owned(), vec!["/z".to_owned()]),
    ///     ("a".to_owned(), vec!["/y".to_owned(), "/x".to_owned()]),
    /// ]);
    ///
    /// let ids: Vec<_> = response.nodes().iter().map(|n| n.id.as_str()).collect();
    /// assert_eq!(ids, ["a", "b"]);
    /// assert_eq!(response.nodes()[0].files, ["/x", "/y"]);
    /// ```
    #[must_use]
    pub fn from_listing<I, F>(listing: I) -> Self
    where
        I: IntoIterator<Item = (String, F)>,
        F: IntoIterator<Item = String>,
    {
        let mut nodes: Vec<Node> = listing
            .into_iter()
            .map(|(id, files)| Node::new(id, files))
            .collect();
        nodes.sort_by(|a, b| a.id.cmp(&b.id));
        nodes.dedup_by(|later, kept| {
            if later.id != kept.id {
                return false;
            }
            kept.files.append(&mut later.files);
            kept.files.sort_unstable();
            kept.files.dedup();
            true
        });
        Self { nodes }
    }

    /// Returns the nodes, ordered by ID.
    #[inline]
    #[must_use]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Returns the number of nodes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if no node is known.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_sorts_in_any_insertion_order() {
        let forward = Node::new("n", ["/a", "/b", "/c"]);
        let backward = Node::new("n", ["/c", "/b", "/a"]);
        let shuffled = Node::new("n", ["/b", "/c", "/a", "/c"]);
        assert_eq!(forward, backward);
        assert_eq!(forward, shuffled);
    }

    #[test]
    fn test_node_serialized_field_names() {
        let node = Node::new("1", ["/my/b", "/my/a"]);
        assert_eq!(
            serde_json::to_string(&node).unwrap(),
            r#"{"ID":"1","Files":["/my/a","/my/b"]}"#
        );
    }

    #[test]
    fn test_response_merges_duplicate_ids() {
        let response = InventoryResponse::from_listing([
            ("n".to_owned(), vec!["/b".to_owned()]),
            ("m".to_owned(), vec![]),
            ("n".to_owned(), vec!["/a".to_owned(), "/b".to_owned()]),
        ]);
        assert_eq!(response.len(), 2);
        assert_eq!(response.nodes()[0], Node::new("m", Vec::<String>::new()));
        assert_eq!(response.nodes()[1], Node::new("n", ["/a", "/b"]));
    }

    #[test]
    fn test_empty_response_serializes_as_empty_array() {
        let response = InventoryResponse::default();
        assert!(response.is_empty());
        assert_eq!(serde_json::to_string(&response).unwrap(), "[]");
    }
}
