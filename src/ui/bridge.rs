// ShellBridge - Coordinates between the tokio runtime and the shell loop
//
// The console shell runs a single-threaded loop on the main thread. Service
// calls run on tokio workers; their results come back as closures that the
// loop applies to its view on the next tick. The view itself never leaves
// the main thread.

use std::future::Future;
use tokio::sync::mpsc;

/// Bound on queued updates so a stalled loop cannot grow memory without limit
const UPDATE_CAPACITY: usize = 100;

/// A deferred change to the shell's view, produced on a tokio worker
pub type ShellUpdate<S> = Box<dyn FnOnce(&mut S) + Send>;

/// Cloneable handle used from the shell and from tokio tasks
///
/// # Example
/// ```ignore
/// let (bridge, mut pending) = ShellBridge::<ShellView>::new(runtime.handle().clone());
///
/// let ui = bridge.clone();
/// bridge.spawn_async(move || async move {
///     let listing = client.list_room_names(&filter).await;
///     ui.update_shell(move |view| view.show_listing(listing));
/// });
///
/// // on the shell thread, every tick:
/// pending.apply_pending(&mut view);
/// ```
pub struct ShellBridge<S> {
    tokio_handle: tokio::runtime::Handle,
    update_tx: mpsc::Sender<ShellUpdate<S>>,
}

/// Receiving side, owned by the shell loop
pub struct PendingUpdates<S> {
    update_rx: mpsc::Receiver<ShellUpdate<S>>,
}

impl<S: 'static> ShellBridge<S> {
    pub fn new(tokio_handle: tokio::runtime::Handle) -> (Self, PendingUpdates<S>) {
        let (update_tx, update_rx) = mpsc::channel::<ShellUpdate<S>>(UPDATE_CAPACITY);
        (
            Self {
                tokio_handle,
                update_tx,
            },
            PendingUpdates { update_rx },
        )
    }

    /// Schedule a view update from any thread
    ///
    /// The update runs on the shell thread during its next tick. Dropped with
    /// a warning if the queue is full or the shell has gone away.
    pub fn update_shell<F>(&self, update: F)
    where
        F: FnOnce(&mut S) + Send + 'static,
    {
        match self.update_tx.try_send(Box::new(update)) {
            Ok(_) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!("Shell update channel full - skipping update to prevent backpressure");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::warn!("Failed to send shell update - shell loop has stopped");
            }
        }
    }

    /// Spawn an async task on the tokio runtime from the shell thread
    pub fn spawn_async<F, Fut>(&self, future_factory: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.tokio_handle.spawn(async move {
            future_factory().await;
        });
    }
}

// Manual Clone implementation to avoid requiring S: Clone
impl<S> Clone for ShellBridge<S> {
    fn clone(&self) -> Self {
        Self {
            tokio_handle: self.tokio_handle.clone(),
            update_tx: self.update_tx.clone(),
        }
    }
}

impl<S> PendingUpdates<S> {
    /// Apply every update queued so far, without waiting for more.
    ///
    /// Returns how many were applied.
    pub fn apply_pending(&mut self, target: &mut S) -> usize {
        let mut applied = 0;
        while let Ok(update) = self.update_rx.try_recv() {
            update(target);
            applied += 1;
        }
        applied
    }
}
