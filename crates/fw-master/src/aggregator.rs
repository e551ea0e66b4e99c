//! Inventory aggregation with a last-known-good cache.
//!
//! Each query asks the [`InventorySource`] for a fresh listing. A successful
//! listing becomes the new cached inventory as a whole; a failed one falls
//! back to the cached inventory, if there is any.
//!
//! # Cache Ordering
//!
//! Every query draws a generation number before calling the source. A result
//! only replaces the cache if its generation is newer than the cached one, so
//! a slow query finishing late never rolls the cache back.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use fw_core::InventoryResponse;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::MasterError;
use crate::source::InventorySource;

/// One cached inventory and the query that produced it.
#[derive(Debug)]
struct Cached {
    generation: u64,
    response: Arc<InventoryResponse>,
}

/// Serves the aggregated inventory, falling back to the last good one.
///
/// # Thread Safety
///
/// `Aggregator` is shared by all request handlers. The cache slot is the only
/// mutable state and is read and replaced under one mutex, never patched.
#[derive(Debug)]
pub struct Aggregator<S> {
    source: S,
    cache: Mutex<Option<Cached>>,
    next_generation: AtomicU64,
}

impl<S: InventorySource> Aggregator<S> {
    /// Creates an aggregator with an empty cache.
    pub fn new(source: S) -> Self {
        Self {
            source,
            cache: Mutex::new(None),
            next_generation: AtomicU64::new(0),
        }
    }

    /// Fetches a fresh inventory without touching the cache.
    ///
    /// Nodes are ordered by ID; each node's files are sorted and unique.
    ///
    /// # Errors
    ///
    /// Returns [`MasterError::BackendUnavailable`] if the listing call fails.
    pub async fn fetch_inventory(&self) -> Result<InventoryResponse, MasterError> {
        let listing = self.source.list().await.map_err(MasterError::backend)?;
        Ok(InventoryResponse::from_listing(listing))
    }

    /// Answers one inventory query.
    ///
    /// Returns the fresh inventory and caches it, or the cached inventory when
    /// the source is unavailable. `None` means there is nothing to serve.
    pub async fn inventory(&self) -> Option<Arc<InventoryResponse>> {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);

        match self.fetch_inventory().await {
            Ok(response) => {
                let response = Arc::new(response);
                self.remember(generation, Arc::clone(&response));
                debug!(nodes = response.len(), "Fetched inventory");
                Some(response)
            }
            Err(error) => {
                let cached = self.cached();
                warn!(
                    error = %error,
                    cached = cached.is_some(),
                    "Inventory fetch failed"
                );
                cached
            }
        }
    }

    /// Returns the cached inventory, if any.
    #[must_use]
    pub fn cached(&self) -> Option<Arc<InventoryResponse>> {
        self.cache
            .lock()
            .as_ref()
            .map(|cached| Arc::clone(&cached.response))
    }

    /// Returns the inventory source.
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Replaces the cache unless it already holds a newer result.
    fn remember(&self, generation: u64, response: Arc<InventoryResponse>) {
        let mut cache = self.cache.lock();
        if cache
            .as_ref()
            .is_some_and(|cached| cached.generation > generation)
        {
            debug!(generation, "Discarding superseded inventory");
            return;
        }
        *cache = Some(Cached {
            generation,
            response,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::Listing;
    use std::io;

    /// Source whose listing can be swapped out, `None` meaning unreachable.
    #[derive(Default)]
    struct FakeSource {
        listing: parking_lot::Mutex<Option<Listing>>,
    }

    impl FakeSource {
        /// Replaces the listing with `(node, path)` pairs.
        fn set(&self, pairs: Option<&[(&str, &str)]>) {
            *self.listing.lock() = pairs.map(|pairs| {
                let mut listing = Listing::default();
                for (node, path) in pairs {
                    listing
                        .entry((*node).to_owned())
                        .or_default()
                        .push((*path).to_owned());
                }
                listing
            });
        }
    }

    impl InventorySource for FakeSource {
        type Error = io::Error;

        async fn list(&self) -> Result<Listing, io::Error> {
            self.listing
                .lock()
                .clone()
                .ok_or_else(|| io::Error::new(io::ErrorKind::ConnectionRefused, "down"))
        }
    }

    #[tokio::test]
    async fn test_fetch_sorts_nodes_and_files() {
        let source = FakeSource::default();
        source.set(Some(&[("b", "/z"), ("b", "/y"), ("a", "/my/b"), ("a", "/my/a")]));
        let aggregator = Aggregator::new(source);

        let inventory = aggregator.fetch_inventory().await.unwrap();
        let ids: Vec<&str> = inventory.nodes().iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, ["a", "b"]);
        assert_eq!(inventory.nodes()[0].files, ["/my/a", "/my/b"]);
        assert_eq!(inventory.nodes()[1].files, ["/y", "/z"]);
        assert!(aggregator.cached().is_none());
    }

    #[tokio::test]
    async fn test_fetch_failure_is_backend_unavailable() {
        let aggregator = Aggregator::new(FakeSource::default());
        let err = aggregator.fetch_inventory().await.unwrap_err();
        assert!(matches!(err, MasterError::BackendUnavailable(_)));
    }

    #[tokio::test]
    async fn test_cold_failure_has_nothing_to_serve() {
        let aggregator = Aggregator::new(FakeSource::default());
        assert!(aggregator.inventory().await.is_none());
    }

    #[tokio::test]
    async fn test_failure_serves_last_good_inventory() {
        let aggregator = Aggregator::new(FakeSource::default());

        aggregator.source().set(Some(&[("1", "/a")]));
        let first = aggregator.inventory().await.unwrap();

        aggregator.source().set(Some(&[("1", "/a"), ("1", "/b")]));
        let second = aggregator.inventory().await.unwrap();
        assert_ne!(first, second);

        aggregator.source().set(None);
        let fallback = aggregator.inventory().await.unwrap();
        assert!(Arc::ptr_eq(&fallback, &second));
    }

    #[test]
    fn test_older_result_never_replaces_newer() {
        let aggregator = Aggregator::new(FakeSource::default());
        let newer = Arc::new(InventoryResponse::from_listing([(
            "n".to_owned(),
            vec!["/new".to_owned()],
        )]));
        let older = Arc::new(InventoryResponse::default());

        aggregator.remember(5, Arc::clone(&newer));
        aggregator.remember(3, older);

        let cached = aggregator.cached().unwrap();
        assert!(Arc::ptr_eq(&cached, &newer));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_queries_see_whole_responses() {
        const PAIRS: &[(&str, &str)] = &[("1", "/b"), ("2", "/c"), ("1", "/a")];

        let source = FakeSource::default();
        source.set(Some(PAIRS));
        let aggregator = Arc::new(Aggregator::new(source));
        assert!(aggregator.inventory().await.is_some());

        let mut handles = Vec::new();
        for i in 0..32 {
            let aggregator = Arc::clone(&aggregator);
            handles.push(tokio::spawn(async move {
                match i % 4 {
                    0 => aggregator.source().set(None),
                    1 => aggregator.source().set(Some(PAIRS)),
                    _ => {}
                }
                aggregator.inventory().await
            }));
        }

        for handle in handles {
            let inventory = handle.await.unwrap().expect("Cache was primed");
            assert_eq!(inventory.len(), 2);
            assert_eq!(inventory.nodes()[0].files, ["/a", "/b"]);
            assert_eq!(inventory.nodes()[1].files, ["/c"]);
        }
    }
}
