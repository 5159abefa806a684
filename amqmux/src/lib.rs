//! Channel multiplexing and RPC correlation core for AMQP 0-9-1 style clients.
//!
//! One established broker connection is shared by many logical channels; this
//! crate gives each channel an isolated request/response API, matches every
//! broker reply to the call that expects it, validates redeclarations of
//! shared entities, and propagates channel and connection failures without
//! corrupting sibling channels.
//!
//! Wire framing, socket I/O, handshake and heartbeats belong to a transport
//! collaborator attached through [`MethodTransport`].
//!
mod api;
mod method;
mod transport;

#[cfg(test)]
mod test_utils;

// public API
pub use api::*;
pub use method::*;
pub use transport::{MethodTransport, OutgoingMethod, TransportClosed};
