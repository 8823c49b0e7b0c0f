// NotificationBridge - hands broker notifications to the single-threaded UI loop
//
// The bridge owns one consumer thread per start/stop cycle. Only two things
// cross the thread boundary: the DeliveryQueue (consumer pushes, UI pops) and
// the watch channel carrying the stop signal.

use super::amqp::AmqpBroker;
use super::broker::{Broker, SubscriptionHandle};
use super::error::BridgeError;
use super::queue::DeliveryQueue;
use super::worker::{self, WorkerContext, WorkerTiming};
use crate::models::NotificationSettings;
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread::JoinHandle;
use tokio::sync::watch;

const THREAD_NAME: &str = "notification-consumer";

/// Lifecycle of a bridge: `Idle -> Listening -> Stopping -> Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Idle,
    Listening,
    Stopping,
}

struct Worker {
    thread: JoinHandle<()>,
    stop_tx: watch::Sender<bool>,
    // Never sent on; disconnects when the thread exits (even by panic).
    done_rx: mpsc::Receiver<()>,
    handle: SubscriptionHandle,
}

impl Worker {
    fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }
}

/// Delivers broker-published notifications to the UI without blocking it.
///
/// The UI polls [`drain_one()`](Self::drain_one) on a timer. [`start()`](Self::start)
/// and [`stop()`](Self::stop) follow a user-facing switch; `stop()` also runs on drop.
///
/// # Example
/// ```ignore
/// let mut bridge = NotificationBridge::amqp(&config.notifications);
/// if let Err(e) = bridge.start() {
///     tracing::warn!("Running without push notifications: {}", e);
/// }
/// // every poll interval:
/// while let Some(text) = bridge.drain_one() { show(text); }
/// bridge.stop();
/// ```
pub struct NotificationBridge {
    broker: Arc<dyn Broker>,
    exchange: String,
    timing: WorkerTiming,
    queue: DeliveryQueue,
    state: LifecycleState,
    worker: Option<Worker>,
}

impl NotificationBridge {
    pub fn new(broker: Arc<dyn Broker>, settings: &NotificationSettings) -> Self {
        Self {
            broker,
            exchange: settings.exchange.clone(),
            timing: WorkerTiming::from(settings),
            queue: DeliveryQueue::new(),
            state: LifecycleState::Idle,
            worker: None,
        }
    }

    /// Bridge backed by the RabbitMQ server named in `settings`.
    pub fn amqp(settings: &NotificationSettings) -> Self {
        Self::new(Arc::new(AmqpBroker::new(settings.clone())), settings)
    }

    /// Subscribe to the fanout exchange and spawn the consumer thread.
    ///
    /// Blocks until the subscription is in place, at most for the connect
    /// timeout plus a second. On any error the bridge stays `Idle` and no
    /// thread is left running.
    ///
    /// # Errors
    ///
    /// - [`BridgeError::AlreadyListening`] if a consumer thread is alive
    /// - [`BridgeError::Connectivity`] if the broker cannot be reached in time
    /// - [`BridgeError::Protocol`] if declaring, binding or consuming fails
    /// - [`BridgeError::Worker`] if the thread could not be spawned or died during setup
    pub fn start(&mut self) -> Result<(), BridgeError> {
        if let Some(existing) = &self.worker {
            if !existing.is_finished() {
                return Err(BridgeError::AlreadyListening);
            }
            tracing::debug!("Reaping consumer thread that exited on its own");
            self.reap();
        }

        let handle = SubscriptionHandle::generate(&self.exchange);
        let (stop_tx, stop_rx) = watch::channel(false);
        let (ready_tx, ready_rx) = mpsc::sync_channel(1);
        let (done_tx, done_rx) = mpsc::channel::<()>();

        let ctx = WorkerContext {
            broker: Arc::clone(&self.broker),
            handle: handle.clone(),
            queue: self.queue.clone(),
            stop_rx,
            timing: self.timing,
        };

        tracing::info!(
            endpoint = %self.broker.endpoint(),
            exchange = %handle.exchange,
            queue = %handle.queue_name,
            "Starting push notifications"
        );

        let thread = std::thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || {
                let _done = done_tx;
                worker::run(ctx, ready_tx);
            })?;

        let outcome = ready_rx.recv_timeout(self.timing.setup_deadline());
        // From here on a late success report fails to send and the thread cleans up.
        drop(ready_rx);

        let worker = Worker {
            thread,
            stop_tx,
            done_rx,
            handle,
        };

        match outcome {
            Ok(Ok(())) => {
                self.worker = Some(worker);
                self.state = LifecycleState::Listening;
                Ok(())
            }
            Ok(Err(e)) => {
                tracing::warn!("Failed to start push notifications: {}", e);
                self.shutdown(worker);
                Err(e)
            }
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!("Broker subscription did not complete in time");
                self.shutdown(worker);
                Err(BridgeError::Connectivity {
                    endpoint: self.broker.endpoint(),
                    reason: format!(
                        "subscription not ready within {:?}",
                        self.timing.setup_deadline()
                    ),
                })
            }
            Err(RecvTimeoutError::Disconnected) => {
                self.shutdown(worker);
                Err(BridgeError::Worker(std::io::Error::other(
                    "consumer thread exited during setup",
                )))
            }
        }
    }

    /// Stop consuming, release the queue and wait for the consumer thread.
    ///
    /// Idempotent and safe to call before or after a failed `start()`.
    /// Returns within the configured grace period even if the broker hangs.
    pub fn stop(&mut self) {
        let Some(worker) = self.worker.take() else {
            self.state = LifecycleState::Idle;
            return;
        };

        tracing::info!(queue = %worker.handle.queue_name, "Stopping push notifications");
        self.state = LifecycleState::Stopping;
        self.shutdown(worker);
    }

    /// Pop the oldest undelivered notification. Never blocks.
    pub fn drain_one(&self) -> Option<String> {
        self.queue.pop()
    }

    /// Current lifecycle state.
    ///
    /// Reports `Idle` once the consumer thread has given up on its own.
    pub fn state(&self) -> LifecycleState {
        match (&self.worker, self.state) {
            (Some(worker), LifecycleState::Listening) if worker.is_finished() => {
                LifecycleState::Idle
            }
            (_, state) => state,
        }
    }

    pub fn is_listening(&self) -> bool {
        self.state() == LifecycleState::Listening
    }

    /// Notifications waiting to be drained.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// The queue and exchange of the current cycle, if one is running.
    pub fn subscription(&self) -> Option<&SubscriptionHandle> {
        self.worker.as_ref().map(|w| &w.handle)
    }

    fn reap(&mut self) {
        if let Some(worker) = self.worker.take() {
            self.shutdown(worker);
        }
    }

    fn shutdown(&mut self, worker: Worker) {
        // Err means the thread already dropped its receiver
        let _ = worker.stop_tx.send(true);

        let grace = self.timing.stop_grace();
        match worker.done_rx.recv_timeout(grace) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if worker.thread.join().is_err() {
                    tracing::error!("Notification consumer thread panicked");
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!(
                    "Consumer thread still busy after {:?}; detaching it",
                    grace
                );
            }
        }

        self.state = LifecycleState::Idle;
    }
}

impl Drop for NotificationBridge {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for NotificationBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationBridge")
            .field("endpoint", &self.broker.endpoint())
            .field("exchange", &self.exchange)
            .field("state", &self.state())
            .field("pending", &self.pending())
            .finish()
    }
}
