use super::broker::DeliveryTag;
use std::string::FromUtf8Error;
use thiserror::Error;

/// Errors raised by the notification bridge and its broker adapters.
///
/// `Connectivity` and `Protocol` propagate out of
/// [`NotificationBridge::start`](super::NotificationBridge::start). `Decode` never
/// leaves the consumer thread: the offending message is rejected and logged.
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Cannot reach message broker at {endpoint}: {reason}")]
    Connectivity { endpoint: String, reason: String },

    #[error("Broker refused {operation}: {reason}")]
    Protocol {
        operation: &'static str,
        reason: String,
    },

    #[error("Message {tag} is not valid UTF-8: {source}")]
    Decode {
        tag: DeliveryTag,
        #[source]
        source: FromUtf8Error,
    },

    #[error("Push notifications are already listening")]
    AlreadyListening,

    #[error("Consumer thread error: {0}")]
    Worker(#[from] std::io::Error),
}

impl BridgeError {
    pub(crate) fn protocol(operation: &'static str, reason: impl ToString) -> Self {
        Self::Protocol {
            operation,
            reason: reason.to_string(),
        }
    }
}
