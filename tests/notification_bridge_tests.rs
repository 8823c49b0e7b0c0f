//! Integration tests for NotificationBridge against the in-memory broker
//!
//! These tests verify:
//! - Ordered, exactly-once handoff of published messages to drain_one()
//! - Bounded-time, idempotent stop
//! - Rejection of a second start while listening
//! - Malformed deliveries are rejected without stopping consumption
//! - Connectivity failures at start and reconnection after a dropped connection
//! - Queue cleanup after giving up on the broker
//! - Bounded stop while the broker hangs mid-read, mid-reconnect or mid-close

use async_trait::async_trait;
use globaldorm::notifications::{
    Broker, BrokerMessage, DeliveryTag, MemoryBroker, Subscription, SubscriptionHandle,
};
use globaldorm::{BridgeError, LifecycleState, NotificationBridge, NotificationSettings};
use proptest::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

const EXCHANGE: &str = "hello";

fn settings() -> NotificationSettings {
    NotificationSettings {
        connect_timeout_secs: 1,
        close_timeout_ms: 200,
        reconnect_attempts: 1,
        reconnect_delay_ms: 50,
        ..NotificationSettings::default()
    }
}

fn bridge_on(broker: &MemoryBroker, settings: &NotificationSettings) -> NotificationBridge {
    let broker: Arc<dyn Broker> = Arc::new(broker.clone());
    NotificationBridge::new(broker, settings)
}

/// Poll until `condition` holds or two seconds pass.
fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}

/// Drain `expected` messages, polling between empty reads the way the shell does.
fn drain(bridge: &NotificationBridge, expected: usize) -> Vec<String> {
    let mut received = Vec::new();
    wait_until(|| {
        while let Some(message) = bridge.drain_one() {
            received.push(message);
        }
        received.len() >= expected
    });
    received
}

#[test]
fn test_end_to_end_single_notification() {
    let broker = MemoryBroker::new();
    let mut bridge = bridge_on(&broker, &settings());
    bridge.start().unwrap();

    assert_eq!(broker.publish(EXCHANGE, "Room X now available"), 1);

    assert!(wait_until(|| bridge.pending() == 1));
    assert_eq!(bridge.drain_one().as_deref(), Some("Room X now available"));
    assert_eq!(bridge.drain_one(), None);

    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(bridge.drain_one(), None);
    bridge.stop();
}

#[test]
fn test_messages_acked_after_enqueue() {
    let broker = MemoryBroker::new();
    let mut bridge = bridge_on(&broker, &settings());
    bridge.start().unwrap();

    broker.publish(EXCHANGE, "first");
    broker.publish(EXCHANGE, "second");

    assert_eq!(drain(&bridge, 2), vec!["first", "second"]);
    assert!(wait_until(|| broker.acked().len() == 2));
    assert!(broker.rejected().is_empty());
    bridge.stop();
}

#[test]
fn test_stop_right_after_start_is_bounded() {
    let broker = MemoryBroker::new();
    let mut bridge = bridge_on(&broker, &NotificationSettings::default());
    bridge.start().unwrap();
    let queue = bridge.subscription().unwrap().queue_name.clone();

    let started = Instant::now();
    bridge.stop();

    assert!(started.elapsed() <= Duration::from_secs(1));
    assert_eq!(bridge.state(), LifecycleState::Idle);
    assert_eq!(broker.bound_queues(), 0);
    assert_eq!(broker.deleted_queues(), vec![queue]);
}

#[test]
fn test_stop_is_idempotent() {
    let broker = MemoryBroker::new();
    let mut bridge = bridge_on(&broker, &settings());
    bridge.start().unwrap();

    bridge.stop();
    bridge.stop();

    assert_eq!(bridge.state(), LifecycleState::Idle);
    assert_eq!(broker.deleted_queues().len(), 1);
    assert_eq!(broker.bound_queues(), 0);
}

#[test]
fn test_second_start_while_listening_is_rejected() {
    let broker = MemoryBroker::new();
    let mut bridge = bridge_on(&broker, &settings());
    bridge.start().unwrap();
    let first_queue = bridge.subscription().unwrap().queue_name.clone();

    let result = bridge.start();

    assert!(matches!(result, Err(BridgeError::AlreadyListening)));
    assert_eq!(bridge.state(), LifecycleState::Listening);
    assert_eq!(broker.connection_attempts(), 1);
    assert_eq!(broker.bound_queues(), 1);
    assert_eq!(bridge.subscription().unwrap().queue_name, first_queue);

    // Still exactly one consumer: one publish, one delivery
    broker.publish(EXCHANGE, "only once");
    assert_eq!(drain(&bridge, 1), vec!["only once"]);
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(bridge.drain_one(), None);
    bridge.stop();
}

#[test]
fn test_malformed_message_rejected_and_consumption_continues() {
    let broker = MemoryBroker::new();
    let mut bridge = bridge_on(&broker, &settings());
    bridge.start().unwrap();

    broker.publish(EXCHANGE, "before");
    broker.publish(EXCHANGE, vec![0xff, 0xfe, 0x00]);
    broker.publish(EXCHANGE, "after");

    assert_eq!(drain(&bridge, 2), vec!["before", "after"]);
    assert!(wait_until(|| broker.rejected().len() == 1));
    assert_eq!(broker.acked().len(), 2);
    assert!(bridge.is_listening());
    bridge.stop();
}

#[test]
fn test_refused_connection_fails_start() {
    let broker = MemoryBroker::new();
    broker.set_refuse_connections(true);
    let mut bridge = bridge_on(&broker, &settings());

    let result = bridge.start();

    match result {
        Err(BridgeError::Connectivity { endpoint, .. }) => assert_eq!(endpoint, "memory://local"),
        other => panic!("Expected Connectivity error, got: {:?}", other),
    }
    assert_eq!(bridge.state(), LifecycleState::Idle);
    assert!(bridge.subscription().is_none());

    // Recovers once the broker is back
    broker.set_refuse_connections(false);
    bridge.start().unwrap();
    assert!(bridge.is_listening());
    bridge.stop();
}

#[test]
fn test_declare_failure_is_protocol_error() {
    let broker = MemoryBroker::new();
    broker.set_fail_declare(true);
    let mut bridge = bridge_on(&broker, &settings());

    let result = bridge.start();

    assert!(matches!(result, Err(BridgeError::Protocol { .. })));
    assert_eq!(bridge.state(), LifecycleState::Idle);
}

#[test]
fn test_reconnects_after_dropped_connection() {
    let broker = MemoryBroker::new();
    let mut bridge = bridge_on(&broker, &settings());
    bridge.start().unwrap();

    broker.drop_connections();
    assert!(wait_until(|| broker.connection_attempts() == 2 && broker.bound_queues() == 1));

    broker.publish(EXCHANGE, "after reconnect");
    assert_eq!(drain(&bridge, 1), vec!["after reconnect"]);
    assert!(bridge.is_listening());
    bridge.stop();
}

#[test]
fn test_gives_up_when_reconnect_fails() {
    let broker = MemoryBroker::new();
    let mut bridge = bridge_on(&broker, &settings());
    bridge.start().unwrap();

    broker.set_refuse_connections(true);
    broker.drop_connections();

    assert!(wait_until(|| bridge.state() == LifecycleState::Idle));
    assert_eq!(broker.connection_attempts(), 2);

    // A fresh start after giving up reaps the old thread and subscribes again
    broker.set_refuse_connections(false);
    bridge.start().unwrap();
    assert!(bridge.is_listening());
    bridge.stop();
}

#[test]
fn test_queue_released_after_giving_up() {
    let broker = MemoryBroker::new();
    let mut bridge = bridge_on(&broker, &settings());
    bridge.start().unwrap();
    let queue = bridge.subscription().unwrap().queue_name.clone();

    // Reachable but unable to re-declare: the worker gives up, then deletes the queue
    broker.set_fail_declare(true);
    broker.drop_connections();

    assert!(wait_until(|| bridge.state() == LifecycleState::Idle));
    bridge.stop();

    assert_eq!(broker.deleted_queues(), vec![queue]);
    assert_eq!(broker.bound_queues(), 0);
}

#[test]
fn test_unreachable_queue_expires_after_giving_up() {
    let broker = MemoryBroker::new();
    broker.set_queue_expiry(Duration::from_millis(100));
    let mut bridge = bridge_on(&broker, &settings());
    bridge.start().unwrap();
    let queue = bridge.subscription().unwrap().queue_name.clone();

    broker.set_refuse_connections(true);
    broker.drop_connections();

    assert!(wait_until(|| bridge.state() == LifecycleState::Idle));
    bridge.stop();

    assert!(wait_until(|| broker.deleted_queues().contains(&queue)));
}

#[test]
fn test_undrained_messages_survive_restart() {
    let broker = MemoryBroker::new();
    let mut bridge = bridge_on(&broker, &settings());
    bridge.start().unwrap();

    broker.publish(EXCHANGE, "kept");
    assert!(wait_until(|| bridge.pending() == 1));
    bridge.stop();

    // Published while idle: no queue is bound, so nothing arrives
    assert_eq!(broker.publish(EXCHANGE, "missed"), 0);

    bridge.start().unwrap();
    assert_eq!(bridge.drain_one().as_deref(), Some("kept"));
    bridge.stop();
}

#[test]
fn test_two_bridges_each_receive_broadcast() {
    let broker = MemoryBroker::new();
    let mut first = bridge_on(&broker, &settings());
    let mut second = bridge_on(&broker, &settings());
    first.start().unwrap();
    second.start().unwrap();

    assert_eq!(broker.publish(EXCHANGE, "Room 7 reopened"), 2);

    assert_eq!(drain(&first, 1), vec!["Room 7 reopened"]);
    assert_eq!(drain(&second, 1), vec!["Room 7 reopened"]);
    first.stop();
    second.stop();
}

/// Which broker call never returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stall {
    /// Waiting for a delivery that never comes.
    Read,
    /// The first subscription ends at once; re-subscribing never answers.
    Reconnect,
    /// Reads wait forever and teardown never completes.
    Close,
}

/// Live count of broker futures that never resolve. Drops back when they are dropped.
#[derive(Clone, Default)]
struct Stalled(Arc<AtomicUsize>);

struct StalledGuard(Arc<AtomicUsize>);

impl Drop for StalledGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Stalled {
    async fn forever<T>(&self) -> T {
        self.0.fetch_add(1, Ordering::SeqCst);
        let _guard = StalledGuard(Arc::clone(&self.0));
        futures::future::pending::<T>().await
    }

    fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Clone)]
struct StallingBroker {
    stall: Stall,
    stalled: Stalled,
    subscribes: Arc<AtomicUsize>,
    released: Arc<Mutex<Vec<String>>>,
}

impl StallingBroker {
    fn new(stall: Stall) -> Self {
        Self {
            stall,
            stalled: Stalled::default(),
            subscribes: Arc::new(AtomicUsize::new(0)),
            released: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn released(&self) -> Vec<String> {
        self.released.lock().unwrap().clone()
    }
}

#[async_trait]
impl Broker for StallingBroker {
    fn endpoint(&self) -> String {
        "stalling://local".to_string()
    }

    async fn subscribe(
        &self,
        _handle: &SubscriptionHandle,
    ) -> Result<Box<dyn Subscription>, BridgeError> {
        let attempt = self.subscribes.fetch_add(1, Ordering::SeqCst) + 1;
        if self.stall == Stall::Reconnect && attempt > 1 {
            return self.stalled.forever().await;
        }

        Ok(Box::new(StallingSubscription {
            stall: self.stall,
            stalled: self.stalled.clone(),
        }))
    }

    async fn release(&self, handle: &SubscriptionHandle) -> Result<(), BridgeError> {
        self.released.lock().unwrap().push(handle.queue_name.clone());
        Ok(())
    }
}

struct StallingSubscription {
    stall: Stall,
    stalled: Stalled,
}

#[async_trait]
impl Subscription for StallingSubscription {
    async fn next_delivery(&mut self) -> Result<Option<BrokerMessage>, BridgeError> {
        match self.stall {
            Stall::Reconnect => Ok(None),
            Stall::Read | Stall::Close => self.stalled.forever().await,
        }
    }

    async fn ack(&mut self, _tag: DeliveryTag) -> Result<(), BridgeError> {
        Ok(())
    }

    async fn reject(&mut self, _tag: DeliveryTag) -> Result<(), BridgeError> {
        Ok(())
    }

    async fn close(&mut self, _release_queue: bool) {
        if self.stall == Stall::Close {
            self.stalled.forever::<()>().await;
        }
    }
}

/// Start against a stalling broker, wait for the stall, then time `stop()`.
fn stop_while_stalled(broker: &StallingBroker) -> (NotificationBridge, Duration) {
    let shared: Arc<dyn Broker> = Arc::new(broker.clone());
    let mut bridge = NotificationBridge::new(shared, &settings());
    bridge.start().unwrap();

    assert!(wait_until(|| broker.stalled.count() == 1));

    let started = Instant::now();
    bridge.stop();
    (bridge, started.elapsed())
}

#[test]
fn test_stop_while_waiting_for_delivery() {
    let broker = StallingBroker::new(Stall::Read);

    let (bridge, elapsed) = stop_while_stalled(&broker);

    assert!(elapsed <= Duration::from_secs(1), "stop took {:?}", elapsed);
    assert_eq!(bridge.state(), LifecycleState::Idle);
    assert_eq!(broker.stalled.count(), 0);
}

#[test]
fn test_stop_while_reconnecting() {
    let broker = StallingBroker::new(Stall::Reconnect);

    let (bridge, elapsed) = stop_while_stalled(&broker);

    assert!(elapsed <= Duration::from_secs(1), "stop took {:?}", elapsed);
    assert_eq!(bridge.state(), LifecycleState::Idle);
    assert_eq!(broker.stalled.count(), 0);
    assert_eq!(broker.subscribes.load(Ordering::SeqCst), 2);
    assert_eq!(broker.released().len(), 1);
}

#[test]
fn test_stop_while_close_hangs() {
    let broker = StallingBroker::new(Stall::Close);

    let (bridge, elapsed) = stop_while_stalled(&broker);

    assert!(elapsed <= Duration::from_secs(1), "stop took {:?}", elapsed);
    assert_eq!(bridge.state(), LifecycleState::Idle);
    assert_eq!(broker.stalled.count(), 0);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_messages_arrive_in_publish_order(
        messages in prop::collection::vec("[a-zA-Z0-9 ]{1,24}", 1..20)
    ) {
        let broker = MemoryBroker::new();
        let mut bridge = bridge_on(&broker, &settings());
        bridge.start().unwrap();

        for message in &messages {
            broker.publish(EXCHANGE, message.as_str());
        }
        let received = drain(&bridge, messages.len());

        std::thread::sleep(Duration::from_millis(20));
        prop_assert_eq!(bridge.drain_one(), None);
        bridge.stop();
        prop_assert_eq!(received, messages);
    }
}
