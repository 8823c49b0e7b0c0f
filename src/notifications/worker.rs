// Consumer thread body
//
// Runs on the bridge's dedicated thread inside a current-thread tokio runtime.
// Every await that can block on the network is either raced against the stop
// signal or bounded by a timeout, so the thread always exits within
// `WorkerTiming::stop_grace` once stop is requested.

use super::broker::{Broker, BrokerMessage, Subscription, SubscriptionHandle};
use super::error::BridgeError;
use super::queue::DeliveryQueue;
use crate::models::NotificationSettings;
use std::sync::Arc;
use std::sync::mpsc::SyncSender;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::timeout;

/// Lower bound on the reconnect back-off so a zero setting cannot spin.
const MIN_RECONNECT_DELAY: Duration = Duration::from_millis(50);

/// Timeouts and reconnect policy for one consumer thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerTiming {
    pub connect_timeout: Duration,
    pub close_timeout: Duration,
    pub reconnect_attempts: u32,
    pub reconnect_delay: Duration,
}

impl WorkerTiming {
    /// How long `start()` waits for the subscription before giving up.
    pub fn setup_deadline(&self) -> Duration {
        self.connect_timeout + Duration::from_secs(1)
    }

    /// How long `stop()` waits for the thread to exit.
    ///
    /// Covers one in-flight ack plus the teardown, both bounded by `close_timeout`.
    pub fn stop_grace(&self) -> Duration {
        self.close_timeout * 2 + Duration::from_millis(500)
    }
}

impl From<&NotificationSettings> for WorkerTiming {
    fn from(settings: &NotificationSettings) -> Self {
        Self {
            connect_timeout: settings.connect_timeout(),
            close_timeout: settings.close_timeout(),
            reconnect_attempts: settings.reconnect_attempts,
            reconnect_delay: settings.reconnect_delay().max(MIN_RECONNECT_DELAY),
        }
    }
}

pub(crate) struct WorkerContext {
    pub broker: Arc<dyn Broker>,
    pub handle: SubscriptionHandle,
    pub queue: DeliveryQueue,
    pub stop_rx: watch::Receiver<bool>,
    pub timing: WorkerTiming,
}

enum PumpExit {
    Stopped,
    Dropped(String),
}

/// Thread entry point. Reports the outcome of the initial subscription on
/// `ready_tx`, then consumes until stopped or the broker is lost for good.
pub(crate) fn run(ctx: WorkerContext, ready_tx: SyncSender<Result<(), BridgeError>>) {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            let _ = ready_tx.send(Err(BridgeError::Worker(e)));
            return;
        }
    };

    runtime.block_on(consume_until_stopped(ctx, ready_tx));
    tracing::debug!("Notification consumer thread terminated");
}

async fn consume_until_stopped(
    mut ctx: WorkerContext,
    ready_tx: SyncSender<Result<(), BridgeError>>,
) {
    let mut subscription = match connect(
        ctx.broker.as_ref(),
        &ctx.handle,
        ctx.timing.connect_timeout,
    )
    .await
    {
        Ok(subscription) => subscription,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    if ready_tx.send(Ok(())).is_err() {
        // start() stopped waiting for us
        tracing::warn!("Subscription completed after start() gave up; releasing it");
        close_quietly(subscription.as_mut(), true, ctx.timing.close_timeout).await;
        return;
    }

    tracing::info!(queue = %ctx.handle.queue_name, "Listening for push notifications");

    loop {
        let exit = pump(
            subscription.as_mut(),
            &ctx.queue,
            &mut ctx.stop_rx,
            ctx.timing.close_timeout,
        )
        .await;

        match exit {
            PumpExit::Stopped => {
                close_quietly(subscription.as_mut(), true, ctx.timing.close_timeout).await;
                break;
            }
            PumpExit::Dropped(reason) => {
                // Keep the queue so a reconnect picks up what arrived meanwhile
                close_quietly(subscription.as_mut(), false, ctx.timing.close_timeout).await;
                tracing::warn!("Lost connection to message broker: {}", reason);

                match reconnect(&mut ctx).await {
                    Some(fresh) => subscription = fresh,
                    None => {
                        release_orphaned(&ctx).await;
                        break;
                    }
                }
            }
        }
    }
}

async fn connect(
    broker: &dyn Broker,
    handle: &SubscriptionHandle,
    limit: Duration,
) -> Result<Box<dyn Subscription>, BridgeError> {
    match timeout(limit, broker.subscribe(handle)).await {
        Ok(result) => result,
        Err(_) => Err(BridgeError::Connectivity {
            endpoint: broker.endpoint(),
            reason: format!("no answer within {:?}", limit),
        }),
    }
}

/// Move deliveries into the queue until stop is requested or the broker ends consumption.
async fn pump(
    subscription: &mut dyn Subscription,
    queue: &DeliveryQueue,
    stop_rx: &mut watch::Receiver<bool>,
    io_timeout: Duration,
) -> PumpExit {
    loop {
        if *stop_rx.borrow() {
            return PumpExit::Stopped;
        }

        // A closed stop channel means the bridge is gone; treat it as stop.
        let next = tokio::select! {
            biased;
            _ = stop_rx.changed() => return PumpExit::Stopped,
            next = subscription.next_delivery() => next,
        };

        match next {
            Ok(Some(message)) => deliver(subscription, queue, message, io_timeout).await,
            Ok(None) => return PumpExit::Dropped("consumer closed by broker".to_string()),
            Err(e) => return PumpExit::Dropped(e.to_string()),
        }
    }
}

/// Enqueue first, acknowledge second.
async fn deliver(
    subscription: &mut dyn Subscription,
    queue: &DeliveryQueue,
    message: BrokerMessage,
    io_timeout: Duration,
) {
    let tag = message.delivery_tag;

    match message.into_text() {
        Ok(text) => {
            tracing::info!(delivery_tag = tag, "New update: '{}'", text);
            queue.push(text);

            match timeout(io_timeout, subscription.ack(tag)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!(delivery_tag = tag, "Failed to ack: {}", e),
                Err(_) => tracing::warn!(delivery_tag = tag, "Ack timed out after {:?}", io_timeout),
            }
        }
        Err(e) => {
            tracing::warn!("Dropping notification: {}", e);

            match timeout(io_timeout, subscription.reject(tag)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!(delivery_tag = tag, "Failed to reject: {}", e),
                Err(_) => tracing::warn!(delivery_tag = tag, "Reject timed out after {:?}", io_timeout),
            }
        }
    }
}

/// Re-subscribe to the same queue. `None` when stopped or out of attempts.
async fn reconnect(ctx: &mut WorkerContext) -> Option<Box<dyn Subscription>> {
    for attempt in 1..=ctx.timing.reconnect_attempts {
        if *ctx.stop_rx.borrow() {
            return None;
        }

        tokio::select! {
            biased;
            _ = ctx.stop_rx.changed() => return None,
            _ = tokio::time::sleep(ctx.timing.reconnect_delay) => {}
        }

        let result = tokio::select! {
            biased;
            _ = ctx.stop_rx.changed() => return None,
            result = connect(ctx.broker.as_ref(), &ctx.handle, ctx.timing.connect_timeout) => result,
        };

        match result {
            Ok(mut subscription) => {
                if *ctx.stop_rx.borrow() {
                    close_quietly(subscription.as_mut(), false, ctx.timing.close_timeout).await;
                    return None;
                }
                tracing::info!(attempt, "Reconnected to message broker");
                return Some(subscription);
            }
            Err(e) => tracing::warn!(attempt, "Reconnect failed: {}", e),
        }
    }

    tracing::warn!(
        "Giving up on push notifications after {} reconnect attempt(s)",
        ctx.timing.reconnect_attempts
    );
    None
}

/// Delete a queue left behind by a dropped connection.
///
/// Best effort: if the broker is unreachable the queue's expiry reclaims it.
async fn release_orphaned(ctx: &WorkerContext) {
    let queue = &ctx.handle.queue_name;
    match timeout(ctx.timing.close_timeout, ctx.broker.release(&ctx.handle)).await {
        Ok(Ok(())) => tracing::debug!(queue = %queue, "Released queue after losing the subscription"),
        Ok(Err(e)) => tracing::warn!(queue = %queue, "Could not release queue, leaving it to expire: {}", e),
        Err(_) => tracing::warn!(queue = %queue, "Queue release timed out, leaving it to expire"),
    }
}

async fn close_quietly(subscription: &mut dyn Subscription, release_queue: bool, limit: Duration) {
    if timeout(limit, subscription.close(release_queue)).await.is_err() {
        tracing::warn!("Broker teardown exceeded {:?}; abandoning connection", limit);
    }
}
