//! HTTP delivery of batches to the storage tier.

use std::time::Duration;

use fw_core::OperationBatch;
use reqwest::{Client, Url};
use tracing::trace;

use crate::batcher::BatchSink;
use crate::error::DeliveryError;

/// Posts batches to `POST http://<storage>/nodes/<id>/operations`.
#[derive(Debug, Clone)]
pub struct StorageSink {
    client: Client,
    endpoint: Url,
}

impl StorageSink {
    /// Creates a sink for `node_id` on the storage tier at `storage_address`
    /// (`host:port`, or a full `http://` base URL).
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::InvalidAddress`] if the address does not form
    /// a base URL, or [`DeliveryError::Request`] if the client cannot be built.
    pub fn new(
        storage_address: &str,
        node_id: &str,
        timeout: Duration,
    ) -> Result<Self, DeliveryError> {
        let base = if storage_address.contains("://") {
            storage_address.to_owned()
        } else {
            format!("http://{storage_address}")
        };
        let mut endpoint = Url::parse(&base)
            .map_err(|_| DeliveryError::InvalidAddress(storage_address.to_owned()))?;
        endpoint
            .path_segments_mut()
            .map_err(|()| DeliveryError::InvalidAddress(storage_address.to_owned()))?
            .pop_if_empty()
            .extend(["nodes", node_id, "operations"]);

        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, endpoint })
    }

    /// Returns the URL batches are posted to.
    #[must_use]
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

impl BatchSink for StorageSink {
    async fn deliver(&self, batch: &OperationBatch) -> Result<(), DeliveryError> {
        trace!(url = %self.endpoint, operations = batch.len(), "Posting batch");
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(batch)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(DeliveryError::Status(status.as_u16()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fw_core::Operation;
    use fw_storage::{Store, StorageServer};
    use std::sync::Arc;

    fn sink_for(address: &str) -> StorageSink {
        StorageSink::new(address, "node-1", Duration::from_secs(2)).expect("Failed to build sink")
    }

    #[test]
    fn test_endpoint_from_host_port() {
        let sink = sink_for("127.0.0.1:12000");
        assert_eq!(
            sink.endpoint().as_str(),
            "http://127.0.0.1:12000/nodes/node-1/operations"
        );
    }

    #[test]
    fn test_endpoint_escapes_node_id() {
        let sink = StorageSink::new("localhost:1", "a b/c", Duration::from_secs(1)).unwrap();
        assert_eq!(
            sink.endpoint().as_str(),
            "http://localhost:1/nodes/a%20b%2Fc/operations"
        );
    }

    #[test]
    fn test_invalid_address() {
        let err = StorageSink::new("http://", "n", Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, DeliveryError::InvalidAddress(_)));
    }

    #[tokio::test]
    async fn test_delivers_to_storage_server() {
        let store = Arc::new(Store::in_memory());
        let mut server = StorageServer::with_store("127.0.0.1:0", Arc::clone(&store));
        server.start().await.expect("Failed to start storage");
        let address = server.local_addr().expect("Server not bound").to_string();

        let sink = sink_for(&address);
        let mut batch = OperationBatch::singleton(Operation::create("/"));
        batch.push(Operation::create("/a.txt"));
        sink.deliver(&batch).await.expect("Delivery failed");

        assert_eq!(store.files("node-1"), ["/", "/a.txt"]);
        server.shutdown().await;
    }

    #[tokio::test]
    async fn test_unreachable_storage_is_an_error() {
        // Bind then release a port so nothing listens on it.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap().to_string();
        drop(listener);

        let sink = sink_for(&address);
        let batch = OperationBatch::singleton(Operation::create("/a"));
        assert!(matches!(
            sink.deliver(&batch).await,
            Err(DeliveryError::Request(_))
        ));
    }
}
