//! Error types returned by the APIs.

use std::fmt;

use crate::method::{ChannelId, DeliveryTag};

use super::channel::{ChannelState, EntityKind};

/// A redeclaration did not match the options the entity was first declared
/// with. Carries both option sets so the caller can see what diverged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionsConflict {
    pub kind: EntityKind,
    pub name: String,
    pub existing: String,
    pub requested: String,
}

impl fmt::Display for OptionsConflict {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} '{}' redeclared with incompatible options: existing {}, requested {}",
            self.kind, self.name, self.existing, self.requested
        )
    }
}

/// A list of errors that can be returned by the APIs.
///
/// Errors detected before any wire interaction are returned from the call
/// itself; errors discovered asynchronously arrive through the same pending
/// completion that carries the success value. Nothing is retried here.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// Error during opening a channel, e.g. the id space is exhausted.
    ChannelOpenError(String),
    /// Operation attempted while the channel is not open.
    ChannelNotOpen {
        channel_id: ChannelId,
        state: ChannelState,
    },
    /// The channel was torn down while the request was outstanding.
    /// Carries the close or fault reason.
    ChannelClosed(String),
    /// Redeclaration of a known entity with different options.
    IncompatibleOptions(OptionsConflict),
    /// A reply arrived that matches no outstanding request. Fatal for the
    /// channel that received it.
    UnexpectedReply(String),
    /// Declaration arguments rejected before any wire interaction.
    InvalidDeclaration(String),
    /// Acknowledgement of a tag with no unacknowledged delivery.
    UnknownDeliveryTag(DeliveryTag),
    /// A completion was resolved a second time.
    AlreadyResolved,
    /// The transport refused an outbound method.
    TransportFailure(String),
    /// Error in internal communication. Usually due to incorrect usage.
    InternalChannelError(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::ChannelOpenError(msg) => write!(f, "channel open error: {}", msg),
            Error::ChannelNotOpen { channel_id, state } => {
                write!(f, "channel {} is not open (state: {})", channel_id, state)
            }
            Error::ChannelClosed(msg) => write!(f, "channel closed: {}", msg),
            Error::IncompatibleOptions(conflict) => write!(f, "{}", conflict),
            Error::UnexpectedReply(msg) => write!(f, "unexpected reply: {}", msg),
            Error::InvalidDeclaration(msg) => write!(f, "invalid declaration: {}", msg),
            Error::UnknownDeliveryTag(tag) => {
                write!(f, "no unacknowledged delivery with tag {}", tag)
            }
            Error::AlreadyResolved => f.write_str("completion already resolved"),
            Error::TransportFailure(msg) => write!(f, "transport failure: {}", msg),
            Error::InternalChannelError(msg) => {
                write!(f, "internal communication error: {}", msg)
            }
        }
    }
}

impl std::error::Error for Error {}
