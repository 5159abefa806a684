use bytes::Bytes;

use super::{DeliveryTag, FieldTable};

/// Per-message metadata.
///
/// Body content-type handling is the caller's business; the fields here are
/// carried opaquely.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BasicProperties {
    pub content_type: Option<String>,
    pub correlation_id: Option<String>,
    pub reply_to: Option<String>,
    pub message_id: Option<String>,
    pub delivery_mode: Option<u8>,
    pub headers: FieldTable,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Publish {
    pub exchange: String,
    pub routing_key: String,
    pub mandatory: bool,
    pub properties: BasicProperties,
    pub body: Bytes,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Deliver {
    pub consumer_tag: String,
    pub delivery_tag: DeliveryTag,
    pub redelivered: bool,
    pub exchange: String,
    pub routing_key: String,
    pub properties: BasicProperties,
    pub body: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Ack {
    pub delivery_tag: DeliveryTag,
    pub multiple: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Consume {
    pub queue: String,
    pub consumer_tag: String,
    pub no_ack: bool,
    pub exclusive: bool,
    pub no_wait: bool,
    pub arguments: FieldTable,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConsumeOk {
    pub consumer_tag: String,
}

impl ConsumeOk {
    pub fn new(consumer_tag: &str) -> Self {
        Self {
            consumer_tag: consumer_tag.to_string(),
        }
    }
}
