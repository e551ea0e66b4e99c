//! HTTP API of the storage tier.
//!
//! | Route                         | Body             | Response                         |
//! |-------------------------------|------------------|----------------------------------|
//! | `GET /paths`                  |                  | `200` `{"<node>": ["/a", ...]}`  |
//! | `POST /nodes/{id}/operations` | `OperationBatch` | `204`, or `500` if persist fails |

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::{Json, Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use fw_core::{AddressDefaults, OperationBatch, Service, StorageConfig};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::StorageError;
use crate::store::Store;

/// The storage tier's HTTP listener.
#[derive(Debug)]
pub struct StorageServer {
    config: StorageConfig,
    store: Option<Arc<Store>>,
    local_addr: Option<SocketAddr>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl StorageServer {
    /// Creates a stopped server. The store is opened on start.
    #[must_use]
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            store: None,
            local_addr: None,
            shutdown: None,
            task: None,
        }
    }

    /// Creates a stopped server over an existing store.
    #[must_use]
    pub fn with_store(address: impl Into<String>, store: Arc<Store>) -> Self {
        let mut server = Self::new(StorageConfig {
            address: Some(address.into()),
            data_path: store.snapshot_path().map(ToOwned::to_owned),
        });
        server.store = Some(store);
        server
    }

    /// Opens the store if needed, binds the listener and starts serving.
    ///
    /// Starting a running server is a no-op.
    pub async fn start(&mut self) -> Result<(), StorageError> {
        if self.task.is_some() {
            debug!("Storage server already running");
            return Ok(());
        }

        let address = self
            .config
            .address
            .clone()
            .ok_or(StorageError::NotConfigured("storage.address"))?;

        let store = match &self.store {
            Some(store) => Arc::clone(store),
            None => {
                let store = Arc::new(match &self.config.data_path {
                    Some(path) => Store::open(path)?,
                    None => Store::in_memory(),
                });
                self.store = Some(Arc::clone(&store));
                store
            }
        };

        let listener = TcpListener::bind(&address)
            .await
            .map_err(|source| StorageError::Bind {
                address: address.clone(),
                source,
            })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| StorageError::Bind { address, source })?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let app = router(store);
        let task = tokio::spawn(async move {
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await;
            if let Err(error) = served {
                error!(error = %error, "Storage server failed");
            }
        });

        info!(address = %local_addr, "Storage listening");
        self.local_addr = Some(local_addr);
        self.shutdown = Some(shutdown_tx);
        self.task = Some(task);
        Ok(())
    }

    /// Stops serving and waits for in-flight requests to finish.
    pub async fn shutdown(&mut self) {
        Service::stop(self);
        if let Some(task) = self.task.take() {
            if let Err(error) = task.await {
                warn!(error = %error, "Storage server task failed");
            }
        }
    }

    /// Returns the bound address once started.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Returns the store once opened.
    #[must_use]
    pub fn store(&self) -> Option<&Arc<Store>> {
        self.store.as_ref()
    }

    /// Returns the current configuration.
    #[must_use]
    pub fn config(&self) -> &StorageConfig {
        &self.config
    }
}

impl Service for StorageServer {
    type Error = StorageError;

    fn configure(&mut self, defaults: &AddressDefaults) {
        self.config.fill_defaults(defaults);
    }

    async fn run(&mut self) -> Result<(), StorageError> {
        self.start().await
    }

    fn stop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
            info!("Storage server stopping");
        }
    }
}

impl Drop for StorageServer {
    fn drop(&mut self) {
        Service::stop(self);
    }
}

fn router(store: Arc<Store>) -> Router {
    Router::new()
        .route("/paths", get(list_paths))
        .route("/nodes/:id/operations", post(apply_operations))
        .with_state(store)
}

async fn list_paths(State(store): State<Arc<Store>>) -> Json<BTreeMap<String, Vec<String>>> {
    Json(store.list())
}

async fn apply_operations(
    State(store): State<Arc<Store>>,
    Path(node): Path<String>,
    Json(batch): Json<OperationBatch>,
) -> StatusCode {
    let operations = batch.len();
    let applied = tokio::task::spawn_blocking({
        let node = node.clone();
        move || store.apply(&node, &batch)
    })
    .await;

    match applied {
        Ok(Ok(())) => {
            debug!(node = %node, operations, "Batch stored");
            StatusCode::NO_CONTENT
        }
        Ok(Err(error)) => {
            error!(node = %node, error = %error, "Failed to persist batch");
            StatusCode::INTERNAL_SERVER_ERROR
        }
        Err(error) => {
            error!(node = %node, error = %error, "Apply task failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}
