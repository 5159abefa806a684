#![allow(dead_code /* not every test binary uses every helper */)]

use std::sync::{Arc, Mutex};

use amqmux::channel::Channel;
use amqmux::connection::{AttachArguments, Connection, InboundHandle};
use amqmux::{ChannelId, Method, MethodTransport, OpenChannelOk, TransportClosed};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

// construct a subscriber that prints formatted traces to stdout
pub fn setup_logging() {
    // global subscriber with log level according to RUST_LOG
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();
}

/// Transport stub that records every outbound method instead of encoding it.
pub struct MockTransport {
    sent: Mutex<Vec<(ChannelId, Method)>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
        })
    }

    pub fn sent(&self) -> Vec<(ChannelId, Method)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    /// Number of sent methods with the given wire name, e.g. "queue.declare".
    pub fn count(&self, name: &str) -> usize {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, method)| method.to_string() == name)
            .count()
    }

    pub fn last(&self) -> Option<(ChannelId, Method)> {
        self.sent.lock().unwrap().last().cloned()
    }
}

impl MethodTransport for MockTransport {
    fn send_method(&self, channel_id: ChannelId, method: Method) -> Result<(), TransportClosed> {
        self.sent.lock().unwrap().push((channel_id, method));
        Ok(())
    }
}

pub fn attach() -> (Connection, InboundHandle, Arc<MockTransport>) {
    setup_logging();
    let transport = MockTransport::new();
    let (connection, inbound) = Connection::attach(transport.clone(), AttachArguments::default());
    (connection, inbound, transport)
}

/// Open a channel and complete its open handshake.
pub fn open_channel(connection: &Connection, inbound: &InboundHandle) -> Channel {
    let channel = connection.open_channel().unwrap();
    inbound.dispatch(
        channel.channel_id(),
        Method::OpenChannelOk(OpenChannelOk::default()),
    );
    assert!(channel.is_open());
    channel
}
