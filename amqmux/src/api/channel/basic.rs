use bytes::Bytes;

use crate::method::{BasicProperties, Consume, DeliveryTag, FieldTable, Method};

use super::super::completion::{Completion, Pending};
use super::super::consumer::Consumer;
use super::super::error::Error;
use super::super::Result;
use super::{Channel, Operation};

/// Arguments for [`basic_publish`]
///
/// [`basic_publish`]: crate::channel::Channel::basic_publish
#[derive(Debug, Clone)]
pub struct BasicPublishArguments {
    pub exchange: String,
    pub routing_key: String,
    pub mandatory: bool,
}

impl BasicPublishArguments {
    pub fn new(exchange: &str, routing_key: &str) -> Self {
        Self {
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
            mandatory: false,
        }
    }
}

/// Arguments for [`basic_consume`]
///
/// [`basic_consume`]: crate::channel::Channel::basic_consume
#[derive(Debug, Clone)]
pub struct BasicConsumeArguments {
    pub queue: String,
    /// Empty asks the broker to assign a tag, learned from the consume-ok.
    pub consumer_tag: String,
    pub no_ack: bool,
    pub exclusive: bool,
    pub no_wait: bool,
    pub arguments: FieldTable,
}

impl BasicConsumeArguments {
    pub fn new(queue: &str, consumer_tag: &str) -> Self {
        Self {
            queue: queue.to_string(),
            consumer_tag: consumer_tag.to_string(),
            no_ack: false,
            exclusive: false,
            no_wait: false,
            arguments: FieldTable::new(),
        }
    }

    pub(crate) fn to_method(&self) -> Method {
        Method::Consume(Consume {
            queue: self.queue.clone(),
            consumer_tag: self.consumer_tag.clone(),
            no_ack: self.no_ack,
            exclusive: self.exclusive,
            no_wait: self.no_wait,
            arguments: self.arguments.clone(),
        })
    }
}

/// Arguments for [`basic_ack`]
///
/// [`basic_ack`]: crate::channel::Channel::basic_ack
#[derive(Debug, Clone)]
pub struct BasicAckArguments {
    pub delivery_tag: DeliveryTag,
    /// Also acknowledge every unacknowledged delivery with a smaller tag.
    pub multiple: bool,
}

impl BasicAckArguments {
    pub fn new(delivery_tag: DeliveryTag) -> Self {
        Self {
            delivery_tag,
            multiple: false,
        }
    }
}

/////////////////////////////////////////////////////////////////////////////
/// API for Basic methods
impl Channel {
    /// Hand one message to the transport. Fire and forget: failures after
    /// the handoff surface through channel or connection signals.
    pub fn basic_publish(
        &self,
        properties: BasicProperties,
        content: Vec<u8>,
        args: BasicPublishArguments,
    ) -> Result<()> {
        self.submit(Operation::Publish {
            args,
            properties,
            body: Bytes::from(content),
        })
    }

    /// Start consuming from a queue. The completion resolves with the final
    /// consumer tag once the consume-ok arrives; deliveries are then fed to
    /// `consumer` in arrival order on a dedicated task.
    pub fn basic_consume<C>(&self, consumer: C, args: BasicConsumeArguments) -> Result<Pending<String>>
    where
        C: Consumer + 'static,
    {
        if args.consumer_tag.is_empty() && args.no_wait {
            return Err(Error::InvalidDeclaration(
                "a server-named consumer tag needs the consume-ok reply; no_wait must not be set"
                    .to_string(),
            ));
        }
        let pending = Completion::new();
        self.submit(Operation::Consume {
            args,
            consumer: Box::new(consumer),
            pending: pending.clone(),
        })?;
        Ok(pending)
    }

    /// Acknowledge a delivery, or with `multiple` every unacknowledged
    /// delivery up to and including `delivery_tag`. The completion resolves
    /// with the settled tags; a tag matching nothing fails before any wire
    /// interaction.
    pub fn basic_ack(&self, args: BasicAckArguments) -> Result<Pending<Vec<DeliveryTag>>> {
        let pending = Completion::new();
        self.submit(Operation::Ack {
            args,
            pending: pending.clone(),
        })?;
        Ok(pending)
    }
}
