//! The master's query endpoint.
//!
//! `GET /list` answers `200` with the aggregated inventory, fresh or cached,
//! or `502 Bad Gateway` with an empty body when the storage tier is down and
//! nothing was cached yet.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::{Json, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use fw_core::{AddressDefaults, MasterConfig, Service};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::aggregator::Aggregator;
use crate::error::MasterError;
use crate::source::{InventorySource, StorageClient};

/// The master's HTTP listener.
///
/// # Examples
///
/// ```no_run
/// use fw_core::{AddressDefaults, MasterConfig, Service};
/// use fw_master::MasterServer;
///
/// # async fn example() -> Result<(), fw_master::MasterError> {
/// let mut master = MasterServer::new(MasterConfig::default());
/// master.configure(&AddressDefaults::default());
/// master.run().await?;
///
/// tokio::signal::ctrl_c().await.ok();
/// master.shutdown().await;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct MasterServer {
    config: MasterConfig,
    local_addr: Option<SocketAddr>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl MasterServer {
    /// Creates a stopped server.
    #[must_use]
    pub fn new(config: MasterConfig) -> Self {
        Self {
            config,
            local_addr: None,
            shutdown: None,
            task: None,
        }
    }

    /// Returns the current configuration.
    #[must_use]
    pub fn config(&self) -> &MasterConfig {
        &self.config
    }

    /// Returns the bound address once running.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Binds the listener and serves inventory from `source`.
    ///
    /// Running a running server is a no-op.
    pub async fn run_with_source<S: InventorySource>(
        &mut self,
        source: S,
    ) -> Result<(), MasterError> {
        if self.task.is_some() {
            debug!("Master already running");
            return Ok(());
        }

        let address = self
            .config
            .address
            .clone()
            .ok_or(MasterError::NotConfigured("master.address"))?;

        let listener = TcpListener::bind(&address)
            .await
            .map_err(|source| MasterError::Bind {
                address: address.clone(),
                source,
            })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| MasterError::Bind { address, source })?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let app = router(Arc::new(Aggregator::new(source)));
        let task = tokio::spawn(async move {
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await;
            if let Err(error) = served {
                error!(error = %error, "Master server failed");
            }
        });

        info!(address = %local_addr, "Master listening");
        self.local_addr = Some(local_addr);
        self.shutdown = Some(shutdown_tx);
        self.task = Some(task);
        Ok(())
    }

    /// Stops serving and waits for in-flight queries to finish.
    pub async fn shutdown(&mut self) {
        Service::stop(self);
        if let Some(task) = self.task.take() {
            if let Err(error) = task.await {
                warn!(error = %error, "Master server task failed");
            }
        }
    }
}

impl Service for MasterServer {
    type Error = MasterError;

    fn configure(&mut self, defaults: &AddressDefaults) {
        self.config.fill_defaults(defaults);
    }

    async fn run(&mut self) -> Result<(), MasterError> {
        let storage_address = self
            .config
            .storage_address
            .clone()
            .ok_or(MasterError::NotConfigured("master.storageAddress"))?;
        let client = StorageClient::new(
            &storage_address,
            Duration::from_millis(self.config.request_timeout_ms),
        )?;
        info!(storage = %storage_address, "Aggregating from storage");
        self.run_with_source(client).await
    }

    fn stop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
            info!("Master stopping");
        }
    }
}

impl Drop for MasterServer {
    fn drop(&mut self) {
        Service::stop(self);
    }
}

fn router<S: InventorySource>(aggregator: Arc<Aggregator<S>>) -> Router {
    Router::new()
        .route("/list", get(list::<S>))
        .with_state(aggregator)
}

async fn list<S: InventorySource>(State(aggregator): State<Arc<Aggregator<S>>>) -> Response {
    match aggregator.inventory().await {
        Some(inventory) => Json(&*inventory).into_response(),
        None => StatusCode::BAD_GATEWAY.into_response(),
    }
}
