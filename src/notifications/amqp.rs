// AMQP 0-9-1 adapter (RabbitMQ) built on lapin

use super::broker::{Broker, BrokerMessage, DeliveryTag, Subscription, SubscriptionHandle};
use super::error::BridgeError;
use crate::models::NotificationSettings;
use async_trait::async_trait;
use futures::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicCancelOptions, BasicConsumeOptions, BasicRejectOptions,
    ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions, QueueDeleteOptions,
};
use lapin::types::{AMQPValue, FieldTable, ShortString};
use lapin::{Channel, Connection, ConnectionProperties, Consumer, ExchangeKind};

const REPLY_SUCCESS: u16 = 200;

/// Broker backed by a RabbitMQ server.
#[derive(Debug, Clone)]
pub struct AmqpBroker {
    settings: NotificationSettings,
}

impl AmqpBroker {
    pub fn new(settings: NotificationSettings) -> Self {
        Self { settings }
    }

    /// Build the `amqp://` URI for the configured server.
    ///
    /// The default virtual host `/` has to be percent-encoded in the path.
    pub fn uri(&self) -> String {
        let vhost = match self.settings.virtual_host.as_str() {
            "" | "/" => "%2f".to_string(),
            other => other.trim_start_matches('/').to_string(),
        };

        format!(
            "amqp://{}:{}@{}:{}/{}",
            self.settings.username,
            self.settings.password,
            self.settings.host,
            self.settings.port,
            vhost
        )
    }

    /// Connection properties that run lapin's I/O on the caller's tokio runtime.
    fn connection_properties() -> ConnectionProperties {
        ConnectionProperties::default()
            .with_executor(tokio_executor_trait::Tokio::current())
            .with_reactor(tokio_reactor_trait::Tokio)
    }

    async fn open(&self) -> Result<Connection, BridgeError> {
        tracing::debug!("Connecting to RabbitMQ at {}", self.endpoint());

        Connection::connect(&self.uri(), Self::connection_properties())
            .await
            .map_err(|e| BridgeError::Connectivity {
                endpoint: self.endpoint(),
                reason: e.to_string(),
            })
    }

    /// `x-expires` argument in milliseconds, saturating at the AMQP field width.
    fn queue_arguments(&self) -> FieldTable {
        let millis = u32::try_from(self.settings.queue_expiry().as_millis()).unwrap_or(u32::MAX);
        let mut arguments = FieldTable::default();
        arguments.insert(ShortString::from("x-expires"), AMQPValue::LongUInt(millis.max(1)));
        arguments
    }

    async fn declare_and_consume(
        channel: &Channel,
        queue_arguments: FieldTable,
        handle: &SubscriptionHandle,
        consumer_tag: &str,
    ) -> Result<Consumer, BridgeError> {
        channel
            .exchange_declare(
                &handle.exchange,
                ExchangeKind::Fanout,
                ExchangeDeclareOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| BridgeError::protocol("exchange declare", e))?;

        channel
            .queue_declare(
                &handle.queue_name,
                QueueDeclareOptions {
                    durable: false,
                    exclusive: false,
                    auto_delete: false,
                    ..QueueDeclareOptions::default()
                },
                queue_arguments,
            )
            .await
            .map_err(|e| BridgeError::protocol("queue declare", e))?;

        channel
            .queue_bind(
                &handle.queue_name,
                &handle.exchange,
                "",
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| BridgeError::protocol("queue bind", e))?;

        channel
            .basic_consume(
                &handle.queue_name,
                consumer_tag,
                BasicConsumeOptions {
                    no_ack: false,
                    ..BasicConsumeOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| BridgeError::protocol("basic consume", e))
    }
}

#[async_trait]
impl Broker for AmqpBroker {
    fn endpoint(&self) -> String {
        format!("{}:{}", self.settings.host, self.settings.port)
    }

    async fn subscribe(
        &self,
        handle: &SubscriptionHandle,
    ) -> Result<Box<dyn Subscription>, BridgeError> {
        let connection = self.open().await?;

        let channel = match connection.create_channel().await {
            Ok(channel) => channel,
            Err(e) => {
                let _ = connection.close(REPLY_SUCCESS, "channel open failed").await;
                return Err(BridgeError::protocol("channel open", e));
            }
        };

        let consumer_tag = format!("globaldorm-{}", handle.queue_name);
        let arguments = self.queue_arguments();
        let consumer = match Self::declare_and_consume(&channel, arguments, handle, &consumer_tag).await {
            Ok(consumer) => consumer,
            Err(e) => {
                let _ = connection.close(REPLY_SUCCESS, "subscription setup failed").await;
                return Err(e);
            }
        };

        tracing::info!(
            queue = %handle.queue_name,
            exchange = %handle.exchange,
            "Queue bound to fanout exchange"
        );

        Ok(Box::new(AmqpSubscription {
            connection,
            channel,
            consumer,
            consumer_tag,
            queue_name: handle.queue_name.clone(),
            endpoint: self.endpoint(),
        }))
    }

    async fn release(&self, handle: &SubscriptionHandle) -> Result<(), BridgeError> {
        let connection = self.open().await?;

        let result = match connection.create_channel().await {
            Ok(channel) => channel
                .queue_delete(&handle.queue_name, QueueDeleteOptions::default())
                .await
                .map(|_| ())
                .map_err(|e| BridgeError::protocol("queue delete", e)),
            Err(e) => Err(BridgeError::protocol("channel open", e)),
        };

        if let Err(e) = connection.close(REPLY_SUCCESS, "bye").await {
            tracing::debug!("Connection close failed: {}", e);
        }
        result
    }
}

struct AmqpSubscription {
    connection: Connection,
    channel: Channel,
    consumer: Consumer,
    consumer_tag: String,
    queue_name: String,
    endpoint: String,
}

#[async_trait]
impl Subscription for AmqpSubscription {
    async fn next_delivery(&mut self) -> Result<Option<BrokerMessage>, BridgeError> {
        match self.consumer.next().await {
            Some(Ok(delivery)) => Ok(Some(BrokerMessage::new(
                delivery.data,
                delivery.delivery_tag,
            ))),
            Some(Err(e)) => Err(BridgeError::Connectivity {
                endpoint: self.endpoint.clone(),
                reason: e.to_string(),
            }),
            None => Ok(None),
        }
    }

    async fn ack(&mut self, tag: DeliveryTag) -> Result<(), BridgeError> {
        self.channel
            .basic_ack(tag, BasicAckOptions::default())
            .await
            .map_err(|e| BridgeError::protocol("basic ack", e))
    }

    async fn reject(&mut self, tag: DeliveryTag) -> Result<(), BridgeError> {
        self.channel
            .basic_reject(tag, BasicRejectOptions { requeue: false })
            .await
            .map_err(|e| BridgeError::protocol("basic reject", e))
    }

    async fn close(&mut self, release_queue: bool) {
        if let Err(e) = self
            .channel
            .basic_cancel(&self.consumer_tag, BasicCancelOptions::default())
            .await
        {
            tracing::debug!("basic.cancel failed during teardown: {}", e);
        }

        if release_queue {
            match self
                .channel
                .queue_delete(&self.queue_name, QueueDeleteOptions::default())
                .await
            {
                Ok(_) => tracing::debug!("Deleted queue {}", self.queue_name),
                Err(e) => tracing::debug!("Failed to delete queue {}: {}", self.queue_name, e),
            }
        }

        if let Err(e) = self.channel.close(REPLY_SUCCESS, "bye").await {
            tracing::debug!("Channel close failed: {}", e);
        }
        if let Err(e) = self.connection.close(REPLY_SUCCESS, "bye").await {
            tracing::debug!("Connection close failed: {}", e);
        }
    }
}
