//! Connection-scoped state: the channel route table, the id repository and
//! the inbound dispatch surface the transport collaborator drives.
//!
//! The connection itself (socket, handshake, tuning) lives in the transport;
//! this type begins where an established connection starts multiplexing
//! channels.
//!
//! # Example
//! ```rust
//! use std::sync::Arc;
//! use amqmux::connection::{AttachArguments, Connection};
//! use tokio::sync::mpsc;
//!
//! let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel::<amqmux::OutgoingMethod>();
//! let (connection, inbound) = Connection::attach(Arc::new(outgoing_tx), AttachArguments::default());
//!
//! // the transport's read loop feeds replies through `inbound`,
//! // its write loop drains `outgoing_rx`
//! let channel = connection.open_channel().unwrap();
//! ```

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, error, info};

use crate::method::{ChannelId, Method};
use crate::transport::{ChannelIdRepository, MethodTransport};

use super::channel::Channel;
use super::completion::Completion;
use super::error::Error;
use super::Result;

/////////////////////////////////////////////////////////////////////////////
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct AttachArguments {
    /// Highest channel id the connection negotiated; 0 means the protocol
    /// maximum.
    pub channel_max: u16,
    pub connection_name: String,
}

impl Default for AttachArguments {
    fn default() -> Self {
        Self {
            channel_max: 2047,
            connection_name: String::new(),
        }
    }
}

impl AttachArguments {
    pub fn new(channel_max: u16) -> Self {
        Self {
            channel_max,
            connection_name: String::new(),
        }
    }
}

/////////////////////////////////////////////////////////////////////////////
pub(crate) struct SharedConnection {
    connection_name: String,
    channel_max: u16,
    is_open: AtomicBool,
    transport: Arc<dyn MethodTransport>,
    id_repo: Mutex<ChannelIdRepository>,
    channels: Mutex<BTreeMap<ChannelId, Channel>>,
    opened: Completion<()>,
}

impl SharedConnection {
    fn channels(&self) -> MutexGuard<'_, BTreeMap<ChannelId, Channel>> {
        self.channels.lock().expect("channel table lock poisoned")
    }

    /// Remove the route and recycle the id once a channel is fully closed.
    /// Idempotent; after a connection failure the table is already empty.
    pub(crate) fn release_channel(&self, channel_id: ChannelId) {
        let removed = self.channels().remove(&channel_id).is_some();
        if removed {
            self.id_repo
                .lock()
                .expect("id repository lock poisoned")
                .release(channel_id);
            debug!("channel {} released", channel_id);
        }
    }
}

/// Multiplexing view over one established broker connection.
#[derive(Clone)]
pub struct Connection {
    shared: Arc<SharedConnection>,
}

/// Inbound surface of the core, driven by the transport's read loop.
#[derive(Clone)]
pub struct InboundHandle {
    shared: Arc<SharedConnection>,
}

/////////////////////////////////////////////////////////////////////////////
impl Connection {
    /// Attach the multiplexing core to an established connection's
    /// transport. Returns the connection handle for the application side and
    /// the inbound handle for the transport's read loop.
    pub fn attach(
        transport: Arc<dyn MethodTransport>,
        args: AttachArguments,
    ) -> (Connection, InboundHandle) {
        let channel_max = if args.channel_max == 0 {
            u16::MAX
        } else {
            args.channel_max
        };
        let shared = Arc::new(SharedConnection {
            connection_name: args.connection_name,
            channel_max,
            is_open: AtomicBool::new(true),
            transport,
            id_repo: Mutex::new(ChannelIdRepository::new(channel_max)),
            channels: Mutex::new(BTreeMap::new()),
            opened: Completion::new(),
        });
        (
            Connection {
                shared: Arc::clone(&shared),
            },
            InboundHandle { shared },
        )
    }

    pub fn connection_name(&self) -> &str {
        &self.shared.connection_name
    }

    pub fn channel_max(&self) -> u16 {
        self.shared.channel_max
    }

    pub fn is_open(&self) -> bool {
        self.shared.is_open.load(Ordering::Relaxed)
    }

    /// Resolved when the transport signals the connection open.
    pub fn opened(&self) -> Completion<()> {
        self.shared.opened.clone()
    }

    /// Ids of the currently registered channels, ascending. Diagnostics.
    pub fn channel_ids(&self) -> Vec<ChannelId> {
        self.shared.channels().keys().copied().collect()
    }

    /// Open a new channel: allocate the next free id, register the route and
    /// send `channel.open`. The returned channel buffers operations until
    /// the open-ok arrives.
    pub fn open_channel(&self) -> Result<Channel> {
        let shared = &self.shared;
        let channel = {
            let mut channels = shared.channels();
            if !self.is_open() {
                return Err(Error::ChannelOpenError("connection is closed".to_string()));
            }
            let channel_id = shared
                .id_repo
                .lock()
                .expect("id repository lock poisoned")
                .allocate()
                .ok_or_else(|| {
                    Error::ChannelOpenError(format!(
                        "channel id space exhausted (channel_max = {})",
                        shared.channel_max
                    ))
                })?;
            let channel = Channel::new(
                channel_id,
                Arc::clone(&shared.transport),
                Arc::downgrade(shared),
            );
            channels.insert(channel_id, channel.clone());
            channel
        };
        if let Err(err) = shared
            .transport
            .send_method(channel.channel_id(), Method::OpenChannel(Default::default()))
        {
            channel.teardown("transport closed before channel.open");
            return Err(Error::TransportFailure(format!(
                "channel {}: {}",
                channel.channel_id(),
                err
            )));
        }
        info!("channel {} opening", channel.channel_id());
        Ok(channel)
    }
}

/////////////////////////////////////////////////////////////////////////////
impl InboundHandle {
    /// Route one inbound method, tagged by channel id, to its channel.
    /// Methods for unknown channels are logged and discarded, like frames
    /// that race a completed close.
    pub fn dispatch(&self, channel_id: ChannelId, method: Method) {
        let channel = self.shared.channels().get(&channel_id).cloned();
        match channel {
            Some(channel) => channel.handle_inbound(method),
            None => debug!(
                "no channel {} registered, discard inbound {}",
                channel_id, method
            ),
        }
    }

    /// The transport finished opening the connection.
    pub fn connection_open(&self) {
        self.shared.is_open.store(true, Ordering::Relaxed);
        if self.shared.opened.resolve(()).is_err() {
            debug!("connection open signaled more than once");
        }
    }

    /// Connection-level failure: every channel is torn down, in ascending
    /// channel id order, so no channel is left opening or open. Pending work
    /// on every channel resolves as `ChannelClosed` carrying `reason`.
    pub fn connection_failure(&self, reason: &str) {
        error!("connection failure: {}", reason);
        let channels = {
            let mut guard = self.shared.channels();
            // flip the flag under the table lock: an open_channel racing us
            // either registered before the take, and is torn down here, or
            // observes the closed connection and fails
            self.shared.is_open.store(false, Ordering::Relaxed);
            std::mem::take(&mut *guard)
        };
        for (_, channel) in channels {
            channel.teardown(reason);
        }
    }
}

/////////////////////////////////////////////////////////////////////////////
#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::sync::mpsc;

    use crate::method::Method;
    use crate::test_utils::setup_logging;
    use crate::transport::OutgoingMethod;

    use super::{AttachArguments, Connection, InboundHandle};

    fn attach_over_mpsc() -> (
        Connection,
        InboundHandle,
        mpsc::UnboundedReceiver<OutgoingMethod>,
    ) {
        setup_logging();
        let (tx, rx) = mpsc::unbounded_channel::<OutgoingMethod>();
        let (connection, inbound) = Connection::attach(Arc::new(tx), AttachArguments::new(4));
        (connection, inbound, rx)
    }

    #[test]
    fn test_channel_ids_are_unique_and_increasing() {
        let (connection, _inbound, mut rx) = attach_over_mpsc();

        for expected in 1..=4u16 {
            let channel = connection.open_channel().unwrap();
            assert_eq!(expected, channel.channel_id());
            // channel.open went out tagged with the allocated id
            let (channel_id, method) = rx.try_recv().unwrap();
            assert_eq!(expected, channel_id);
            assert!(matches!(method, Method::OpenChannel(_)));
        }
        // id space exhausted
        assert!(connection.open_channel().is_err());
    }

    #[test]
    fn test_connection_open_signal_resolves_once() {
        let (connection, inbound, _rx) = attach_over_mpsc();

        assert!(!connection.opened().is_resolved());
        inbound.connection_open();
        assert!(connection.opened().is_resolved());
        // a repeated signal is tolerated
        inbound.connection_open();
        assert!(connection.is_open());
    }
}
