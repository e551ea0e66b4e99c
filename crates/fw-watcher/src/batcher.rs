//! Coalescing, single-flight delivery of operation batches.
//!
//! The [`OperationBatcher`] accepts batches from any number of producers and
//! hands them to a [`BatchSink`] with at most one delivery in flight. Batches
//! that arrive while a delivery is running are appended, in arrival order, to
//! one pending batch that is dispatched as soon as the running delivery
//! finishes.
//!
//! ```text
//! producers ──► mpsc (bounded) ──► control loop ──► pending ──► delivery task ──► sink
//!                                      ▲                             │
//!                                      └──── done (failed batch) ◄───┘
//! ```
//!
//! A failed delivery is retried after a delay: the control loop puts the
//! failed operations back in front of whatever accumulated meanwhile, so the
//! sink always observes operations in submission order.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use fw_core::OperationBatch;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::error::{DeliveryError, WatchError};

/// Default capacity of the input channel.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10;

/// Default delay before a failed batch is delivered again.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Destination of coalesced batches.
pub trait BatchSink: Send + Sync + 'static {
    /// Delivers one batch. An error makes the batcher retry it later.
    fn deliver(
        &self,
        batch: &OperationBatch,
    ) -> impl Future<Output = Result<(), DeliveryError>> + Send;
}

impl BatchSink for mpsc::Sender<OperationBatch> {
    async fn deliver(&self, batch: &OperationBatch) -> Result<(), DeliveryError> {
        self.send(batch.clone())
            .await
            .map_err(|_| DeliveryError::Closed)
    }
}

/// Handle to a running batcher.
///
/// Dropping the handle stops the batcher.
///
/// # Examples
///
/// ```no_run
/// use fw_core::{Operation, OperationBatch};
/// use fw_watcher::OperationBatcher;
/// use tokio::sync::mpsc;
///
/// # async fn example() -> Result<(), fw_watcher::WatchError> {
/// let (sink, mut delivered) = mpsc::channel(8);
/// let batcher = OperationBatcher::new(sink);
///
/// batcher
///     .submit(OperationBatch::singleton(Operation::create("/a")))
///     .await?;
///
/// let batch = delivered.recv().await;
/// assert!(batch.is_some());
/// batcher.shutdown().await;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct OperationBatcher {
    input: mpsc::Sender<OperationBatch>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl OperationBatcher {
    /// Starts a batcher with the default capacity and retry delay.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn new<S: BatchSink>(sink: S) -> Self {
        Self::with_options(sink, DEFAULT_QUEUE_CAPACITY, DEFAULT_RETRY_DELAY)
    }

    /// Starts a batcher.
    ///
    /// `capacity` bounds the input channel; producers wait when it is full.
    /// A capacity of zero is treated as one.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn with_options<S: BatchSink>(sink: S, capacity: usize, retry_delay: Duration) -> Self {
        let (input, rx) = mpsc::channel(capacity.max(1));
        let cancel = CancellationToken::new();

        let control = ControlLoop {
            sink: Arc::new(sink),
            input: rx,
            cancel: cancel.clone(),
            retry_delay,
        };
        let task = tokio::spawn(control.run());

        Self {
            input,
            cancel,
            task: Some(task),
        }
    }

    /// Returns a producer handle. Any number may be held at once.
    #[must_use]
    pub fn sender(&self) -> mpsc::Sender<OperationBatch> {
        self.input.clone()
    }

    /// Submits one batch, waiting while the input channel is full.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::ChannelClosed`] once the batcher has stopped.
    pub async fn submit(&self, batch: OperationBatch) -> Result<(), WatchError> {
        self.input
            .send(batch)
            .await
            .map_err(|_| WatchError::ChannelClosed)
    }

    /// Signals the control loop and any in-flight delivery to end.
    ///
    /// Undelivered operations are discarded. Idempotent.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Stops the batcher and waits for the control loop to finish.
    pub async fn shutdown(mut self) {
        self.stop();
        if let Some(task) = self.task.take() {
            if let Err(error) = task.await {
                warn!(error = %error, "Batcher task failed");
            }
        }
    }

    /// Returns `true` while the control loop runs and no stop was requested.
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.cancel.is_cancelled() && self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl Drop for OperationBatcher {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// State owned by the spawned control task.
struct ControlLoop<S> {
    sink: Arc<S>,
    input: mpsc::Receiver<OperationBatch>,
    cancel: CancellationToken,
    retry_delay: Duration,
}

impl<S: BatchSink> ControlLoop<S> {
    async fn run(mut self) {
        let mut pending = OperationBatch::new();
        let mut in_flight = false;
        let mut input_open = true;

        // A finished delivery reports back here, returning the batch if it
        // has to be retried.
        let (done_tx, mut done_rx) = mpsc::channel::<Option<OperationBatch>>(1);
        let deliveries = self.cancel.child_token();

        loop {
            if !in_flight && !pending.is_empty() {
                let batch = pending.take();
                trace!(operations = batch.len(), "Dispatching batch");
                in_flight = true;
                tokio::spawn(deliver(
                    Arc::clone(&self.sink),
                    batch,
                    self.retry_delay,
                    deliveries.clone(),
                    done_tx.clone(),
                ));
            }

            if !input_open && !in_flight {
                break;
            }

            tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                Some(outcome) = done_rx.recv() => {
                    in_flight = false;
                    if let Some(failed) = outcome {
                        pending.prepend(failed);
                    }
                }
                received = self.input.recv(), if input_open => match received {
                    Some(batch) => pending.append(batch),
                    None => input_open = false,
                },
            }
        }

        deliveries.cancel();
        if !pending.is_empty() {
            debug!(operations = pending.len(), "Discarding undelivered operations");
        }
        debug!("Batcher stopped");
    }
}

/// Runs one delivery attempt and reports the outcome to the control loop.
async fn deliver<S: BatchSink>(
    sink: Arc<S>,
    batch: OperationBatch,
    retry_delay: Duration,
    cancel: CancellationToken,
    done: mpsc::Sender<Option<OperationBatch>>,
) {
    let outcome = tokio::select! {
        biased;
        () = cancel.cancelled() => return,
        outcome = sink.deliver(&batch) => outcome,
    };

    let returned = match outcome {
        Ok(()) => {
            debug!(operations = batch.len(), "Batch delivered");
            None
        }
        Err(error) => {
            warn!(
                error = %error,
                operations = batch.len(),
                retry_in_ms = retry_delay.as_millis(),
                "Delivery failed"
            );
            tokio::select! {
                biased;
                () = cancel.cancelled() => return,
                () = tokio::time::sleep(retry_delay) => {}
            }
            Some(batch)
        }
    };

    let _ = done.send(returned).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use fw_core::Operation;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Semaphore;

    fn single(path: &str) -> OperationBatch {
        OperationBatch::singleton(Operation::create(path))
    }

    fn paths(batch: &OperationBatch) -> Vec<String> {
        batch.iter().map(|op| op.path.clone()).collect()
    }

    /// Collects `count` operations from the receiving end of a channel sink.
    async fn collect_ops(rx: &mut mpsc::Receiver<OperationBatch>, count: usize) -> Vec<String> {
        let mut collected = Vec::new();
        while collected.len() < count {
            let batch = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .expect("Timed out waiting for delivery")
                .expect("Sink closed");
            collected.extend(paths(&batch));
        }
        collected
    }

    /// Sink that blocks every delivery until a permit is released.
    struct GatedSink {
        gate: Semaphore,
        active: AtomicUsize,
        max_active: AtomicUsize,
        started: AtomicUsize,
        delivered: Mutex<Vec<OperationBatch>>,
    }

    impl GatedSink {
        fn closed() -> Arc<Self> {
            Arc::new(Self {
                gate: Semaphore::new(0),
                active: AtomicUsize::new(0),
                max_active: AtomicUsize::new(0),
                started: AtomicUsize::new(0),
                delivered: Mutex::new(Vec::new()),
            })
        }
    }

    impl BatchSink for Arc<GatedSink> {
        async fn deliver(&self, batch: &OperationBatch) -> Result<(), DeliveryError> {
            let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(active, Ordering::SeqCst);
            self.started.fetch_add(1, Ordering::SeqCst);

            let permit = self.gate.acquire().await.map_err(|_| DeliveryError::Closed)?;
            permit.forget();

            self.delivered.lock().unwrap().push(batch.clone());
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Sink that fails its first attempt and forwards afterwards.
    struct FlakySink {
        attempts: AtomicUsize,
        forward: mpsc::Sender<OperationBatch>,
    }

    impl BatchSink for FlakySink {
        async fn deliver(&self, batch: &OperationBatch) -> Result<(), DeliveryError> {
            if self.attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(DeliveryError::Status(503));
            }
            self.forward.deliver(batch).await
        }
    }

    async fn wait_until(condition: impl Fn() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("Condition not reached in time");
    }

    #[tokio::test]
    async fn test_batches_delivered_in_order() {
        let (sink, mut rx) = mpsc::channel(8);
        let batcher = OperationBatcher::new(sink);

        batcher.submit(single("/a")).await.unwrap();
        batcher.submit(single("/b")).await.unwrap();

        assert_eq!(collect_ops(&mut rx, 2).await, ["/a", "/b"]);
        batcher.shutdown().await;
    }

    #[tokio::test]
    async fn test_batches_coalesce_while_in_flight() {
        let sink = GatedSink::closed();
        let batcher = OperationBatcher::new(Arc::clone(&sink));

        batcher.submit(single("/a")).await.unwrap();
        wait_until(|| sink.started.load(Ordering::SeqCst) == 1).await;

        batcher.submit(single("/b")).await.unwrap();
        batcher.submit(single("/c")).await.unwrap();
        // Let the control loop drain both into the pending batch.
        tokio::time::sleep(Duration::from_millis(50)).await;

        sink.gate.add_permits(2);
        wait_until(|| sink.delivered.lock().unwrap().len() == 2).await;

        let delivered: Vec<Vec<String>> =
            sink.delivered.lock().unwrap().iter().map(paths).collect();
        assert_eq!(delivered, [vec!["/a"], vec!["/b", "/c"]]);
        assert_eq!(sink.max_active.load(Ordering::SeqCst), 1);

        batcher.shutdown().await;
    }

    #[tokio::test]
    async fn test_failed_batch_retried_ahead_of_later_ones() {
        let (forward, mut rx) = mpsc::channel(8);
        let sink = FlakySink {
            attempts: AtomicUsize::new(0),
            forward,
        };
        let batcher = OperationBatcher::with_options(sink, 4, Duration::from_millis(20));

        batcher.submit(single("/first")).await.unwrap();
        batcher.submit(single("/second")).await.unwrap();

        assert_eq!(collect_ops(&mut rx, 2).await, ["/first", "/second"]);
        batcher.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_producers_lose_nothing() {
        const PRODUCERS: usize = 4;
        const PER_PRODUCER: usize = 25;

        let (sink, mut rx) = mpsc::channel(8);
        let batcher = OperationBatcher::with_options(sink, 2, Duration::from_millis(10));

        let mut producers = Vec::new();
        for producer in 0..PRODUCERS {
            let tx = batcher.sender();
            producers.push(tokio::spawn(async move {
                for n in 0..PER_PRODUCER {
                    tx.send(single(&format!("/p{producer}/{n:03}"))).await.unwrap();
                }
            }));
        }
        for producer in producers {
            producer.await.unwrap();
        }

        let received = collect_ops(&mut rx, PRODUCERS * PER_PRODUCER).await;
        assert_eq!(received.len(), PRODUCERS * PER_PRODUCER);

        for producer in 0..PRODUCERS {
            let prefix = format!("/p{producer}/");
            let own: Vec<&String> = received.iter().filter(|p| p.starts_with(&prefix)).collect();
            assert_eq!(own.len(), PER_PRODUCER);
            assert!(own.windows(2).all(|pair| pair[0] < pair[1]));
        }

        batcher.shutdown().await;
    }

    #[tokio::test]
    async fn test_stop_is_idempotent_and_closes_input() {
        let (sink, _rx) = mpsc::channel(8);
        let batcher = OperationBatcher::new(sink);
        let tx = batcher.sender();
        assert!(batcher.is_running());

        batcher.stop();
        batcher.stop();
        assert!(!batcher.is_running());
        batcher.shutdown().await;

        assert!(tx.send(single("/late")).await.is_err());
    }

    #[tokio::test]
    async fn test_stop_abandons_in_flight_delivery() {
        let sink = GatedSink::closed();
        let batcher = OperationBatcher::new(Arc::clone(&sink));

        batcher.submit(single("/stuck")).await.unwrap();
        wait_until(|| sink.started.load(Ordering::SeqCst) == 1).await;

        tokio::time::timeout(Duration::from_secs(2), batcher.shutdown())
            .await
            .expect("Shutdown blocked on in-flight delivery");
        assert!(sink.delivered.lock().unwrap().is_empty());
    }
}
