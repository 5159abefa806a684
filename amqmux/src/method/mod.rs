//! Method payload model shared between the multiplexing core and the
//! transport collaborator.
//!
//! Wire encoding and decoding are out of scope for this crate: the transport
//! exchanges fully decoded method payloads with this layer, so the types here
//! carry the protocol fields but no codec.

use std::collections::BTreeMap;
use std::fmt;

mod basic;
mod channel;
mod exchange;
mod queue;

pub use basic::*;
pub use channel::*;
pub use exchange::*;
pub use queue::*;

/// Channel identifier, unique among currently open channels of a connection.
pub type ChannelId = u16;

/// Reply code of a normal, non-error close.
pub const REPLY_SUCCESS: u16 = 200;
/// Reply code sent with a close caused by a correlation anomaly.
pub const UNEXPECTED_FRAME: u16 = 505;

/// Per-channel monotonically increasing identifier of a delivered message.
pub type DeliveryTag = u64;

/// A field value of the declaration argument table.
///
/// Only the shapes compared structurally by the entity registry are modeled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Bool(bool),
    Int(i64),
    LongStr(String),
}

/// Server-specific arguments attached to declarations and bindings.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FieldTable(BTreeMap<String, FieldValue>);

impl FieldTable {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn insert(&mut self, key: &str, value: FieldValue) {
        self.0.insert(key.to_owned(), value);
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.0.get(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/////////////////////////////////////////////////////////////////////////////
/// One protocol method, request or reply, exchanged with the transport.
#[derive(Debug, Clone, PartialEq)]
pub enum Method {
    OpenChannel(OpenChannel),
    OpenChannelOk(OpenChannelOk),
    CloseChannel(CloseChannel),
    CloseChannelOk(CloseChannelOk),

    ExchangeDeclare(ExchangeDeclare),
    ExchangeDeclareOk(ExchangeDeclareOk),
    ExchangeDelete(ExchangeDelete),
    ExchangeDeleteOk(ExchangeDeleteOk),

    QueueDeclare(QueueDeclare),
    QueueDeclareOk(QueueDeclareOk),
    QueueBind(QueueBind),
    QueueBindOk(QueueBindOk),
    QueueDelete(QueueDelete),
    QueueDeleteOk(QueueDeleteOk),

    Publish(Publish),
    Deliver(Deliver),
    Ack(Ack),
    Consume(Consume),
    ConsumeOk(ConsumeOk),
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Method::OpenChannel(_) => "channel.open",
            Method::OpenChannelOk(_) => "channel.open-ok",
            Method::CloseChannel(_) => "channel.close",
            Method::CloseChannelOk(_) => "channel.close-ok",
            Method::ExchangeDeclare(_) => "exchange.declare",
            Method::ExchangeDeclareOk(_) => "exchange.declare-ok",
            Method::ExchangeDelete(_) => "exchange.delete",
            Method::ExchangeDeleteOk(_) => "exchange.delete-ok",
            Method::QueueDeclare(_) => "queue.declare",
            Method::QueueDeclareOk(_) => "queue.declare-ok",
            Method::QueueBind(_) => "queue.bind",
            Method::QueueBindOk(_) => "queue.bind-ok",
            Method::QueueDelete(_) => "queue.delete",
            Method::QueueDeleteOk(_) => "queue.delete-ok",
            Method::Publish(_) => "basic.publish",
            Method::Deliver(_) => "basic.deliver",
            Method::Ack(_) => "basic.ack",
            Method::Consume(_) => "basic.consume",
            Method::ConsumeOk(_) => "basic.consume-ok",
        })
    }
}
