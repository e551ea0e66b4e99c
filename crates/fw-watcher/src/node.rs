//! The node service: one watched directory feeding the storage tier.
//!
//! ```text
//! DirectoryWatcher ──► initial scan batch ──┐
//!        │                                  ├──► OperationBatcher ──► StorageSink
//!        └──────────► live batches ─────────┘
//! ```

use std::time::Duration;

use futures_util::StreamExt;
use fw_core::{AddressDefaults, NodeConfig, OperationBatch, Service};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::batcher::OperationBatcher;
use crate::error::WatchError;
use crate::sink::StorageSink;
use crate::watcher::{DirectoryWatcher, StopHandle};

/// Watches one directory and reports its inventory to the storage tier.
#[derive(Debug)]
pub struct NodeService {
    config: NodeConfig,
    watcher_stop: Option<StopHandle>,
    batcher: Option<OperationBatcher>,
    task: Option<JoinHandle<Result<(), WatchError>>>,
}

impl NodeService {
    /// Creates a stopped node service.
    #[must_use]
    pub fn new(config: NodeConfig) -> Self {
        Self {
            config,
            watcher_stop: None,
            batcher: None,
            task: None,
        }
    }

    /// Returns the current configuration.
    #[must_use]
    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Returns `true` while the watch pipeline is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Waits for the watch pipeline to end.
    ///
    /// Returns immediately when the service was never started. Cancel-safe:
    /// dropping the future leaves the pipeline running and awaitable again.
    pub async fn finished(&mut self) -> Result<(), WatchError> {
        let Some(task) = self.task.as_mut() else {
            return Ok(());
        };
        let result = task.await;
        self.task = None;
        result?
    }
}

impl Service for NodeService {
    type Error = WatchError;

    fn configure(&mut self, defaults: &AddressDefaults) {
        self.config.fill_defaults(defaults);
    }

    async fn run(&mut self) -> Result<(), WatchError> {
        if self.task.is_some() {
            debug!("Node already running");
            return Ok(());
        }

        let dir = self
            .config
            .dir
            .clone()
            .ok_or(WatchError::NotConfigured("node.dir"))?;
        let id = self
            .config
            .id
            .clone()
            .ok_or(WatchError::NotConfigured("node.id"))?;
        let storage_address = self
            .config
            .storage_address
            .clone()
            .ok_or(WatchError::NotConfigured("node.storageAddress"))?;

        let mut watcher = DirectoryWatcher::new(&dir)?;
        watcher.validate_root()?;

        let sink = StorageSink::new(
            &storage_address,
            &id,
            Duration::from_millis(self.config.request_timeout_ms),
        )?;
        let batcher = OperationBatcher::with_options(
            sink,
            self.config.queue_capacity,
            Duration::from_millis(self.config.retry_delay_ms),
        );

        info!(
            node = %id,
            root = %watcher.root(),
            storage = %storage_address,
            "Node started"
        );

        let stop = watcher.stop_handle();
        let tx = batcher.sender();
        self.task = Some(tokio::spawn(run_pipeline(watcher, stop.clone(), tx)));
        self.watcher_stop = Some(stop);
        self.batcher = Some(batcher);
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(stop) = &self.watcher_stop {
            stop.stop();
        }
        if let Some(batcher) = &self.batcher {
            batcher.stop();
        }
    }
}

/// Scans the root, then forwards live batches until the watcher stops.
async fn run_pipeline(
    watcher: DirectoryWatcher,
    stop: StopHandle,
    tx: mpsc::Sender<OperationBatch>,
) -> Result<(), WatchError> {
    let (watcher, report) = tokio::task::spawn_blocking(move || {
        let mut watcher = watcher;
        let report = watcher.initial_scan();
        (watcher, report)
    })
    .await?;

    let (batch, status) = report.into_parts();
    if !batch.is_empty() {
        forward(&tx, &stop, batch).await?;
    }
    if let Err(error) = status {
        info!(error = %error, "Stopped during initial scan");
        return Ok(());
    }

    let live = watcher.watch_loop();
    futures_util::pin_mut!(live);
    while let Some(batch) = live.next().await {
        forward(&tx, &stop, batch).await?;
    }
    debug!("Watch pipeline finished");
    Ok(())
}

/// Hands a batch to the batcher. A closed batcher is only an error when no
/// stop was requested.
async fn forward(
    tx: &mpsc::Sender<OperationBatch>,
    stop: &StopHandle,
    batch: OperationBatch,
) -> Result<(), WatchError> {
    match tx.send(batch).await {
        Ok(()) => Ok(()),
        Err(_) if stop.is_stopped() => Ok(()),
        Err(_) => Err(WatchError::ChannelClosed),
    }
}
