use async_trait::async_trait;
use bytes::Bytes;
use tracing::{error, info};

use crate::method::{BasicProperties, DeliveryTag};

use super::channel::{BasicAckArguments, Channel};

/// One delivered message with all of its metadata, handed to a [`Consumer`]
/// as a single value; destructure what you need.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub consumer_tag: String,
    pub delivery_tag: DeliveryTag,
    pub redelivered: bool,
    pub exchange: String,
    pub routing_key: String,
    pub properties: BasicProperties,
    pub body: Bytes,
}

/// Message handler of one subscription. Deliveries arrive in wire order on
/// a task owned by the channel; the channel handle is available for
/// acknowledgements and follow-up operations.
#[async_trait]
pub trait Consumer: Send {
    async fn consume(&mut self, channel: &Channel, delivery: Delivery);
}

/// Logs every delivery, acknowledging unless constructed with `no_ack`.
pub struct DefaultConsumer {
    no_ack: bool,
}

impl DefaultConsumer {
    pub fn new(no_ack: bool) -> Self {
        Self { no_ack }
    }
}

#[async_trait]
impl Consumer for DefaultConsumer {
    async fn consume(&mut self, channel: &Channel, delivery: Delivery) {
        info!(
            "delivery {} ('{}', {} bytes) on {}",
            delivery.delivery_tag,
            delivery.routing_key,
            delivery.body.len(),
            channel
        );
        if !self.no_ack {
            if let Err(err) = channel.basic_ack(BasicAckArguments::new(delivery.delivery_tag)) {
                error!(
                    "failed to ack delivery {} on {}: {}",
                    delivery.delivery_tag, channel, err
                );
            }
        }
    }
}
