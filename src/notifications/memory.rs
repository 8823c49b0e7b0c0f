// In-process fanout broker
//
// Behaves like a RabbitMQ fanout exchange as far as the bridge can tell:
// every published message is copied to each bound queue, deliveries carry
// tags, and acks/rejects are recorded so tests can inspect them. Failure
// modes (refused connections, failed declares, dropped connections) can be
// switched on at runtime. Queues left without a consumer are deleted once
// the configured expiry passes, like RabbitMQ's `x-expires`.

use super::broker::{Broker, BrokerMessage, DeliveryTag, Subscription, SubscriptionHandle};
use super::error::BridgeError;
use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

const ENDPOINT: &str = "memory://local";

struct Binding {
    exchange: String,
    queue_name: String,
    tx: mpsc::UnboundedSender<BrokerMessage>,
}

#[derive(Default)]
struct Inner {
    refuse_connections: bool,
    fail_declare: bool,
    bindings: Vec<Binding>,
    next_tag: DeliveryTag,
    connection_attempts: usize,
    acked: Vec<DeliveryTag>,
    rejected: Vec<DeliveryTag>,
    deleted_queues: Vec<String>,
    queue_expiry: Option<Duration>,
    /// Queues that lost their consumer, with the moment they did.
    orphaned: Vec<(String, Instant)>,
}

impl Inner {
    fn delete_queue(&mut self, queue_name: &str) {
        self.orphaned.retain(|(name, _)| name != queue_name);
        if !self.deleted_queues.iter().any(|name| name == queue_name) {
            self.deleted_queues.push(queue_name.to_string());
        }
    }

    fn expire_orphans(&mut self) {
        let Some(expiry) = self.queue_expiry else {
            return;
        };
        let (expired, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.orphaned)
            .into_iter()
            .partition(|(_, since)| since.elapsed() >= expiry);
        self.orphaned = kept;
        for (queue_name, _) in expired {
            tracing::trace!(queue = %queue_name, "Unused queue expired");
            self.delete_queue(&queue_name);
        }
    }
}

/// Shared handle to an in-memory fanout broker. Clones see the same broker.
#[derive(Clone, Default)]
pub struct MemoryBroker {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish `body` to every queue bound to `exchange`.
    ///
    /// Returns the number of queues the message was routed to.
    pub fn publish(&self, exchange: &str, body: impl Into<Vec<u8>>) -> usize {
        let body = body.into();
        let mut inner = self.lock();
        inner.expire_orphans();
        inner.bindings.retain(|b| !b.tx.is_closed());

        let mut routed = 0;
        for index in 0..inner.bindings.len() {
            if inner.bindings[index].exchange != exchange {
                continue;
            }
            inner.next_tag += 1;
            let message = BrokerMessage::new(body.clone(), inner.next_tag);
            if inner.bindings[index].tx.send(message).is_ok() {
                routed += 1;
            }
        }

        tracing::trace!(exchange, routed, "Published to memory broker");
        routed
    }

    /// Refuse (or accept again) new connections.
    pub fn set_refuse_connections(&self, refuse: bool) {
        self.lock().refuse_connections = refuse;
    }

    /// Make queue declaration fail on the next subscriptions.
    pub fn set_fail_declare(&self, fail: bool) {
        self.lock().fail_declare = fail;
    }

    /// Delete queues that have had no consumer for `expiry`.
    pub fn set_queue_expiry(&self, expiry: Duration) {
        self.lock().queue_expiry = Some(expiry);
    }

    /// Sever every open subscription, as if the broker went away.
    pub fn drop_connections(&self) {
        self.lock().bindings.clear();
    }

    pub fn connection_attempts(&self) -> usize {
        self.lock().connection_attempts
    }

    /// Number of queues currently bound and consuming.
    pub fn bound_queues(&self) -> usize {
        let mut inner = self.lock();
        inner.expire_orphans();
        inner.bindings.retain(|b| !b.tx.is_closed());
        inner.bindings.len()
    }

    pub fn acked(&self) -> Vec<DeliveryTag> {
        self.lock().acked.clone()
    }

    pub fn rejected(&self) -> Vec<DeliveryTag> {
        self.lock().rejected.clone()
    }

    pub fn deleted_queues(&self) -> Vec<String> {
        let mut inner = self.lock();
        inner.expire_orphans();
        inner.deleted_queues.clone()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    fn endpoint(&self) -> String {
        ENDPOINT.to_string()
    }

    async fn subscribe(
        &self,
        handle: &SubscriptionHandle,
    ) -> Result<Box<dyn Subscription>, BridgeError> {
        let mut inner = self.lock();
        inner.connection_attempts += 1;

        if inner.refuse_connections {
            return Err(BridgeError::Connectivity {
                endpoint: ENDPOINT.to_string(),
                reason: "connection refused".to_string(),
            });
        }
        if inner.fail_declare {
            return Err(BridgeError::protocol(
                "queue declare",
                format!("cannot declare queue '{}'", handle.queue_name),
            ));
        }

        inner.orphaned.retain(|(name, _)| name != &handle.queue_name);
        let (tx, rx) = mpsc::unbounded_channel();
        inner.bindings.push(Binding {
            exchange: handle.exchange.clone(),
            queue_name: handle.queue_name.clone(),
            tx,
        });

        Ok(Box::new(MemorySubscription {
            queue_name: handle.queue_name.clone(),
            rx,
            broker: self.clone(),
        }))
    }

    async fn release(&self, handle: &SubscriptionHandle) -> Result<(), BridgeError> {
        let mut inner = self.lock();
        if inner.refuse_connections {
            return Err(BridgeError::Connectivity {
                endpoint: ENDPOINT.to_string(),
                reason: "connection refused".to_string(),
            });
        }
        inner.delete_queue(&handle.queue_name);
        Ok(())
    }
}

struct MemorySubscription {
    queue_name: String,
    rx: mpsc::UnboundedReceiver<BrokerMessage>,
    broker: MemoryBroker,
}

#[async_trait]
impl Subscription for MemorySubscription {
    async fn next_delivery(&mut self) -> Result<Option<BrokerMessage>, BridgeError> {
        Ok(self.rx.recv().await)
    }

    async fn ack(&mut self, tag: DeliveryTag) -> Result<(), BridgeError> {
        self.broker.lock().acked.push(tag);
        Ok(())
    }

    async fn reject(&mut self, tag: DeliveryTag) -> Result<(), BridgeError> {
        self.broker.lock().rejected.push(tag);
        Ok(())
    }

    async fn close(&mut self, release_queue: bool) {
        self.rx.close();
        let mut inner = self.broker.lock();
        inner.bindings.retain(|b| b.queue_name != self.queue_name);
        if release_queue {
            inner.delete_queue(&self.queue_name);
        } else {
            inner.orphaned.push((self.queue_name.clone(), Instant::now()));
        }
    }
}
