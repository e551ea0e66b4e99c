//! Directory watcher producing root-relative operations.
//!
//! [`DirectoryWatcher`] bridges the synchronous `notify` watcher to the async
//! tokio runtime and turns raw notifications into [`OperationBatch`]es.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                 notify thread (RecommendedWatcher)           │
//! │   one non-recursive registration per directory  ──┐          │
//! └───────────────────────────────────────────────────│──────────┘
//!                                                     │ unbounded send
//!                                                     ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │                 Async Runtime (tokio)                        │
//! │  DirectoryWatcher::next_batch ──► translate ──► classify     │
//! │        │                                          │          │
//! │        └── StopHandle (CancellationToken)         ▼          │
//! │                                          OperationBatch      │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Lifecycle
//!
//! 1. [`DirectoryWatcher::new`] creates the notification source.
//! 2. [`DirectoryWatcher::validate_root`] checks the root and registers it.
//! 3. [`DirectoryWatcher::initial_scan`] walks the tree once, registering
//!    every directory, and returns the full inventory as one batch.
//! 4. [`DirectoryWatcher::watch_loop`] turns the instance into a lazy stream
//!    of live batches that ends on stop or when the source closes.
//!
//! Directories created after the scan are registered, but entries that
//! already exist inside them (a populated directory moved into the tree, for
//! instance) are not inventoried.

use std::collections::VecDeque;
use std::path::PathBuf;

use camino::{Utf8Path, Utf8PathBuf};
use futures_util::Stream;
use fw_core::{Operation, OperationBatch};
use notify::event::{EventKind, ModifyKind, RenameMode};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use rustc_hash::FxHashSet;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use walkdir::WalkDir;

use crate::error::WatchError;
use crate::path::{relative_path, utf8_path};

/// Raw notification as delivered by the `notify` callback.
type RawEvent = notify::Result<notify::Event>;

/// Result of [`DirectoryWatcher::initial_scan`].
///
/// The batch always holds whatever was accumulated, even when the scan was
/// cancelled part way through.
#[derive(Debug, Default)]
pub struct ScanReport {
    /// One `Create` per visited entry, in walk order.
    pub batch: OperationBatch,
    /// Entries skipped, with the reason each one was left out.
    pub skipped: Vec<WatchError>,
    /// Whether a stop interrupted the walk.
    pub cancelled: bool,
}

impl ScanReport {
    /// Splits the report into its batch and a status, mapping an interrupted
    /// walk to [`WatchError::Cancelled`].
    pub fn into_parts(self) -> (OperationBatch, Result<(), WatchError>) {
        let status = if self.cancelled {
            Err(WatchError::Cancelled)
        } else {
            Ok(())
        };
        (self.batch, status)
    }

    fn skip(&mut self, error: WatchError) {
        warn!(error = %error, "Skipping entry");
        self.skipped.push(error);
    }
}

/// Cloneable handle that stops a [`DirectoryWatcher`] from another task.
///
/// Stopping is a one-shot broadcast; repeated calls are no-ops.
#[derive(Debug, Clone)]
pub struct StopHandle(CancellationToken);

impl StopHandle {
    /// Raises the stop signal.
    pub fn stop(&self) {
        self.0.cancel();
    }

    /// Returns `true` once the stop signal has been raised.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.0.is_cancelled()
    }
}

/// Watches a directory tree and reports Create/Remove operations.
///
/// # Examples
///
/// ```no_run
/// use fw_watcher::DirectoryWatcher;
/// use futures_util::StreamExt;
/// use camino::Utf8Path;
///
/// # async fn example() -> Result<(), fw_watcher::WatchError> {
/// let mut watcher = DirectoryWatcher::new(Utf8Path::new("/srv/data"))?;
/// watcher.validate_root()?;
///
/// let report = watcher.initial_scan();
/// println!("{} entries", report.batch.len());
///
/// let live = watcher.watch_loop();
/// futures_util::pin_mut!(live);
/// while let Some(batch) = live.next().await {
///     for op in &batch {
///         println!("{op}");
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub struct DirectoryWatcher {
    /// The watched root, canonical once validated.
    root: Utf8PathBuf,

    /// The notification source. `None` once released.
    watcher: Option<RecommendedWatcher>,

    /// Raw notifications forwarded by the `notify` callback.
    raw_rx: mpsc::UnboundedReceiver<RawEvent>,

    /// Directories currently registered for notifications.
    watched: FxHashSet<Utf8PathBuf>,

    /// Translated batches not yet handed out.
    pending: VecDeque<OperationBatch>,

    /// Stop signal shared with [`StopHandle`]s.
    stop: CancellationToken,
}

impl std::fmt::Debug for DirectoryWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryWatcher")
            .field("root", &self.root)
            .field("watched", &self.watched.len())
            .field("is_running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl DirectoryWatcher {
    /// Creates a watcher for `root` and its notification source.
    ///
    /// The root is not checked here; call [`validate_root`](Self::validate_root).
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::Notify`] if the notification source cannot be
    /// created.
    pub fn new(root: &Utf8Path) -> Result<Self, WatchError> {
        let (raw_tx, raw_rx) = mpsc::unbounded_channel();
        // Unbounded so a slow consumer never blocks notify's thread while the
        // initial scan is still registering directories through it.
        let watcher = notify::recommended_watcher(move |event: RawEvent| {
            let _ = raw_tx.send(event);
        })?;

        Ok(Self {
            root: root.to_owned(),
            watcher: Some(watcher),
            raw_rx,
            watched: FxHashSet::default(),
            pending: VecDeque::new(),
            stop: CancellationToken::new(),
        })
    }

    /// Checks that the root is a directory and registers it.
    ///
    /// The root is resolved to its canonical form so that event paths, which
    /// notify reports under the registered path, translate consistently.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::Access`] if the root is missing or cannot be
    /// resolved, [`WatchError::NotADirectory`] if it is not a directory and
    /// [`WatchError::WatchRegistration`] if it cannot be registered.
    pub fn validate_root(&mut self) -> Result<(), WatchError> {
        let metadata =
            std::fs::metadata(&self.root).map_err(|e| WatchError::access(&self.root, e))?;
        if !metadata.is_dir() {
            return Err(WatchError::NotADirectory(self.root.clone()));
        }

        self.root = self
            .root
            .canonicalize_utf8()
            .map_err(|e| WatchError::access(&self.root, e))?;

        let root = self.root.clone();
        self.register(&root)?;
        info!(root = %self.root, "Watching directory");
        Ok(())
    }

    /// Walks the root recursively and inventories every entry.
    ///
    /// Emits one `Create` per file and per directory, the root included, as a
    /// single batch. Directories are registered for notifications as they are
    /// visited. An entry that cannot be read, named or registered is left
    /// out with its subtree and recorded in [`ScanReport::skipped`]. A stop raised during the walk ends it
    /// immediately; the report then carries the partial batch and
    /// `cancelled = true`.
    ///
    /// This is blocking filesystem work; from async code run it on the
    /// blocking pool.
    pub fn initial_scan(&mut self) -> ScanReport {
        let mut report = ScanReport::default();
        let mut walker = WalkDir::new(&self.root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter();

        loop {
            if self.stop.is_cancelled() {
                debug!(root = %self.root, "Initial scan cancelled");
                report.cancelled = true;
                break;
            }

            let Some(result) = walker.next() else {
                break;
            };

            let entry = match result {
                Ok(entry) => entry,
                Err(error) => {
                    report.skip(WatchError::from(error));
                    continue;
                }
            };
            let is_dir = entry.file_type().is_dir();

            let located = utf8_path(entry.into_path())
                .and_then(|path| relative_path(&path, &self.root).map(|rel| (path, rel)));
            let (path, relative) = match located {
                Ok(located) => located,
                Err(error) => {
                    report.skip(error);
                    if is_dir {
                        walker.skip_current_dir();
                    }
                    continue;
                }
            };

            // A directory that cannot be watched is left out with its subtree.
            if is_dir {
                if let Err(error) = self.register(&path) {
                    report.skip(error);
                    walker.skip_current_dir();
                    continue;
                }
            }
            report.batch.push(Operation::create(relative));
        }

        info!(
            root = %self.root,
            entries = report.batch.len(),
            skipped = report.skipped.len(),
            cancelled = report.cancelled,
            "Initial scan finished"
        );
        report
    }

    /// Waits for the next live batch.
    ///
    /// Returns `None` once the watcher is stopped or the notification source
    /// has closed; the source is released at that point.
    pub async fn next_batch(&mut self) -> Option<OperationBatch> {
        loop {
            if self.stop.is_cancelled() {
                self.release();
                return None;
            }
            if let Some(batch) = self.pending.pop_front() {
                return Some(batch);
            }

            let raw = tokio::select! {
                biased;
                () = self.stop.cancelled() => continue,
                raw = self.raw_rx.recv() => raw,
            };

            match raw {
                Some(Ok(event)) => self.handle_event(event),
                Some(Err(error)) => warn!(error = %error, "Notification error"),
                None => {
                    debug!(root = %self.root, "Notification source closed");
                    self.release();
                    return None;
                }
            }
        }
    }

    /// Turns the watcher into a lazy stream of live batches.
    ///
    /// The stream ends only on stop or when the notification source closes.
    /// Keep a [`StopHandle`] from [`stop_handle`](Self::stop_handle) to end it
    /// from elsewhere.
    pub fn watch_loop(self) -> impl Stream<Item = OperationBatch> + Send {
        futures_util::stream::unfold(self, |mut watcher| async move {
            let batch = watcher.next_batch().await?;
            Some((batch, watcher))
        })
    }

    /// Returns a handle that stops this watcher.
    #[must_use]
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle(self.stop.clone())
    }

    /// Stops the watcher and releases the notification source.
    ///
    /// Idempotent.
    pub fn stop(&mut self) {
        self.stop.cancel();
        self.release();
    }

    /// Returns the watched root.
    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Returns `true` while the notification source is held and no stop was
    /// requested.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.watcher.is_some() && !self.stop.is_cancelled()
    }

    /// Returns `true` if `dir` is registered for notifications.
    #[must_use]
    pub fn is_watching(&self, dir: &Utf8Path) -> bool {
        self.watched.contains(dir)
    }

    /// Registers one directory, non-recursively.
    fn register(&mut self, dir: &Utf8Path) -> Result<(), WatchError> {
        if self.watched.contains(dir) {
            return Ok(());
        }
        let Some(watcher) = self.watcher.as_mut() else {
            return Err(WatchError::ChannelClosed);
        };
        watcher
            .watch(dir.as_std_path(), RecursiveMode::NonRecursive)
            .map_err(|e| WatchError::registration(dir, e))?;
        self.watched.insert(dir.to_owned());
        trace!(dir = %dir, "Registered directory");
        Ok(())
    }

    /// Cancels the registration of `dir` and of every directory below it.
    fn unregister(&mut self, dir: &Utf8Path) {
        if !self.watched.contains(dir) {
            return;
        }
        let below: Vec<Utf8PathBuf> = self
            .watched
            .iter()
            .filter(|watched| watched.starts_with(dir))
            .cloned()
            .collect();

        for path in below {
            self.watched.remove(&path);
            if let Some(watcher) = self.watcher.as_mut() {
                // The kernel usually drops the watch itself once the
                // directory is gone, so a failure here is expected.
                if let Err(error) = watcher.unwatch(path.as_std_path()) {
                    trace!(dir = %path, error = %error, "Unwatch failed");
                }
            }
        }
    }

    /// Translates one raw notification into pending batches.
    fn handle_event(&mut self, event: notify::Event) {
        let paths = event.paths.into_iter();
        match event.kind {
            EventKind::Create(_) => paths.for_each(|path| self.on_created(path)),
            EventKind::Remove(_) => paths.for_each(|path| self.on_removed(path)),
            EventKind::Modify(ModifyKind::Name(mode)) => match mode {
                RenameMode::From => paths.take(1).for_each(|path| self.on_removed(path)),
                RenameMode::To => paths.take(1).for_each(|path| self.on_created(path)),
                // Follows the From and To halves already handled above.
                RenameMode::Both => trace!("Ignoring paired rename"),
                RenameMode::Any | RenameMode::Other => {
                    for path in paths {
                        if path.symlink_metadata().is_ok() {
                            self.on_created(path);
                        } else {
                            self.on_removed(path);
                        }
                    }
                }
            },
            kind => trace!(?kind, "Ignoring notification"),
        }
    }

    /// Handles an entry that appeared.
    fn on_created(&mut self, path: PathBuf) {
        let Some((absolute, relative)) = self.translate(path) else {
            return;
        };
        if is_dir(&absolute) {
            if let Err(error) = self.register(&absolute) {
                warn!(error = %error, "Cannot watch new directory");
            }
        }
        debug!(path = %relative, "Entry created");
        self.pending
            .push_back(OperationBatch::singleton(Operation::create(relative)));
    }

    /// Handles an entry that was removed or renamed away.
    fn on_removed(&mut self, path: PathBuf) {
        let Some((absolute, relative)) = self.translate(path) else {
            return;
        };
        self.unregister(&absolute);
        debug!(path = %relative, "Entry removed");
        self.pending
            .push_back(OperationBatch::singleton(Operation::remove(relative)));
    }

    /// Converts an event path, logging and dropping it on failure.
    fn translate(&self, path: PathBuf) -> Option<(Utf8PathBuf, String)> {
        let translated = utf8_path(path).and_then(|absolute| {
            let relative = relative_path(&absolute, &self.root)?;
            Ok((absolute, relative))
        });
        match translated {
            Ok(pair) => Some(pair),
            Err(error) => {
                warn!(error = %error, "Dropping event");
                None
            }
        }
    }

    /// Drops the notification source, closing the raw channel.
    fn release(&mut self) {
        if self.watcher.take().is_some() {
            self.watched.clear();
            info!(root = %self.root, "Directory watcher stopped");
        }
    }
}

/// Returns `true` if `path` resolves, through symlinks, to a directory.
fn is_dir(path: &Utf8Path) -> bool {
    path.canonicalize_utf8()
        .and_then(|resolved| resolved.symlink_metadata())
        .is_ok_and(|metadata| metadata.is_dir())
}
