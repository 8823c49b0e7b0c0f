// Broker seam - the bridge talks to any publish/subscribe broker through these traits
//
// `AmqpBroker` is the production implementation; `MemoryBroker` stands in for
// RabbitMQ in tests and offline runs.

use super::error::BridgeError;
use async_trait::async_trait;
use uuid::Uuid;

/// Broker-assigned identifier of one delivery, used to acknowledge it.
pub type DeliveryTag = u64;

/// A raw delivery as handed over by the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerMessage {
    pub body: Vec<u8>,
    pub delivery_tag: DeliveryTag,
}

impl BrokerMessage {
    pub fn new(body: impl Into<Vec<u8>>, delivery_tag: DeliveryTag) -> Self {
        Self {
            body: body.into(),
            delivery_tag,
        }
    }

    /// Interpret the body as UTF-8 text.
    pub fn into_text(self) -> Result<String, BridgeError> {
        let tag = self.delivery_tag;
        String::from_utf8(self.body).map_err(|source| BridgeError::Decode { tag, source })
    }
}

/// The per-cycle queue a bridge consumes from, and the fanout exchange it is bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionHandle {
    pub queue_name: String,
    pub exchange: String,
}

impl SubscriptionHandle {
    /// Create a handle with a fresh, unique queue name.
    pub fn generate(exchange: &str) -> Self {
        Self {
            queue_name: Uuid::new_v4().to_string(),
            exchange: exchange.to_string(),
        }
    }
}

/// Something that can open a consuming subscription on a fanout exchange.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Human readable address used in logs and connectivity errors.
    fn endpoint(&self) -> String;

    /// Connect, declare the fanout exchange, declare and bind the queue named
    /// by `handle`, and start consuming with manual acknowledgment.
    ///
    /// Connection failures map to [`BridgeError::Connectivity`]; declare, bind
    /// or consume failures map to [`BridgeError::Protocol`].
    async fn subscribe(
        &self,
        handle: &SubscriptionHandle,
    ) -> Result<Box<dyn Subscription>, BridgeError>;

    /// Delete the queue named by `handle` over a short-lived connection.
    ///
    /// Used when a consumer gives up after losing its subscription and no
    /// longer holds a channel to delete the queue through.
    async fn release(&self, handle: &SubscriptionHandle) -> Result<(), BridgeError>;
}

/// A live, consuming subscription. Owned by exactly one consumer thread.
#[async_trait]
pub trait Subscription: Send {
    /// Wait for the next delivery.
    ///
    /// Returns `Ok(None)` once the broker ends consumption (connection closed,
    /// consumer cancelled). Must be cancel-safe: the consumer races it against
    /// the stop signal.
    async fn next_delivery(&mut self) -> Result<Option<BrokerMessage>, BridgeError>;

    async fn ack(&mut self, tag: DeliveryTag) -> Result<(), BridgeError>;

    /// Reject without requeueing so the broker drops the message.
    async fn reject(&mut self, tag: DeliveryTag) -> Result<(), BridgeError>;

    /// Cancel consumption and close the channel and connection.
    ///
    /// With `release_queue` the broker-side queue is deleted as well. Errors
    /// are logged, never returned: teardown is best effort.
    async fn close(&mut self, release_queue: bool);
}
