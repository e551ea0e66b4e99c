//! Where the aggregator gets its listing from.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, Url};
use rustc_hash::FxHashMap;
use tracing::trace;

use crate::error::MasterError;

/// Per-node path lists as returned by the storage tier.
///
/// Neither the node order nor the path order is relied upon.
pub type Listing = FxHashMap<String, Vec<String>>;

/// A remote listing of every node's paths.
pub trait InventorySource: Send + Sync + 'static {
    /// Error returned when the listing cannot be produced.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Lists every node and its paths.
    fn list(&self) -> impl Future<Output = Result<Listing, Self::Error>> + Send;
}

impl<T: InventorySource> InventorySource for Arc<T> {
    type Error = T::Error;

    fn list(&self) -> impl Future<Output = Result<Listing, Self::Error>> + Send {
        (**self).list()
    }
}

/// Lists inventory from the storage tier's `GET /paths`.
#[derive(Debug, Clone)]
pub struct StorageClient {
    client: Client,
    url: Url,
}

impl StorageClient {
    /// Creates a client for the storage tier at `address` (`host:port`, or a
    /// full `http://` base URL). Every call is bounded by `timeout`.
    pub fn new(address: &str, timeout: Duration) -> Result<Self, MasterError> {
        let base = if address.contains("://") {
            address.to_owned()
        } else {
            format!("http://{address}")
        };
        let url = Url::parse(&base)
            .and_then(|base| base.join("paths"))
            .map_err(|_| MasterError::InvalidAddress(address.to_owned()))?;

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(MasterError::Client)?;
        Ok(Self { client, url })
    }

    /// Returns the listing URL.
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl InventorySource for StorageClient {
    type Error = reqwest::Error;

    async fn list(&self) -> Result<Listing, reqwest::Error> {
        trace!(url = %self.url, "Listing storage");
        self.client
            .get(self.url.clone())
            .send()
            .await?
            .error_for_status()?
            .json::<Listing>()
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fw_core::{Operation, OperationBatch};
    use fw_storage::{StorageServer, Store};

    #[test]
    fn test_url_from_host_port() {
        let client = StorageClient::new("127.0.0.1:12000", Duration::from_secs(1)).unwrap();
        assert_eq!(client.url().as_str(), "http://127.0.0.1:12000/paths");
    }

    #[test]
    fn test_invalid_address() {
        assert!(matches!(
            StorageClient::new("http://", Duration::from_secs(1)),
            Err(MasterError::InvalidAddress(_))
        ));
    }

    #[tokio::test]
    async fn test_lists_storage_buckets() {
        let store = Arc::new(Store::in_memory());
        let batch: OperationBatch = [Operation::create("/my/b"), Operation::create("/my/a")]
            .into_iter()
            .collect();
        store.apply("1", &batch).unwrap();

        let mut storage = StorageServer::with_store("127.0.0.1:0", Arc::clone(&store));
        storage.start().await.unwrap();
        let address = storage.local_addr().unwrap().to_string();

        let client = StorageClient::new(&address, Duration::from_secs(2)).unwrap();
        let listing = client.list().await.unwrap();
        assert_eq!(listing.len(), 1);
        assert_eq!(listing["1"], ["/my/a", "/my/b"]);

        storage.shutdown().await;
    }
}
