// Push notification feed
//
// A background consumer thread subscribes to a fanout exchange and moves each
// message into a DeliveryQueue that the UI loop drains on a timer.

mod amqp;
mod bridge;
mod broker;
mod error;
mod memory;
mod queue;
mod worker;

pub use amqp::AmqpBroker;
pub use bridge::{LifecycleState, NotificationBridge};
pub use broker::{Broker, BrokerMessage, DeliveryTag, Subscription, SubscriptionHandle};
pub use error::BridgeError;
pub use memory::MemoryBroker;
pub use queue::DeliveryQueue;
pub use worker::WorkerTiming;
