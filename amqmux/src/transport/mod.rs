//! Seam between the multiplexing core and the wire-level transport.
//!
//! The transport owns the socket, the frame codec, the connection handshake
//! and heartbeats. This layer hands it fully formed outbound method payloads
//! and receives decoded inbound payloads through
//! [`InboundHandle`](crate::connection::InboundHandle).

use std::fmt;

use tokio::sync::mpsc;

use crate::method::{ChannelId, Method};

mod id_repo;

pub(crate) use id_repo::ChannelIdRepository;

/// One fully formed outbound method request, tagged with its channel.
pub type OutgoingMethod = (ChannelId, Method);

/// The transport refused a method because the underlying connection is gone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportClosed;

impl fmt::Display for TransportClosed {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("transport closed")
    }
}

impl std::error::Error for TransportClosed {}

/// Outbound half of the transport collaborator.
///
/// `send_method` must be a non-blocking enqueue, and calls for the same
/// channel must reach the wire in call order. Channels hand off requests
/// through this trait and never touch the connection otherwise.
pub trait MethodTransport: Send + Sync {
    fn send_method(&self, channel_id: ChannelId, method: Method) -> Result<(), TransportClosed>;
}

/// A plain unbounded mpsc sender is a valid transport: the writer side of
/// the connection drains `OutgoingMethod` tuples in order.
impl MethodTransport for mpsc::UnboundedSender<OutgoingMethod> {
    fn send_method(&self, channel_id: ChannelId, method: Method) -> Result<(), TransportClosed> {
        self.send((channel_id, method)).map_err(|_| TransportClosed)
    }
}
