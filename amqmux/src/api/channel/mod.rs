//! One logical channel multiplexed over the shared connection.
//!
//! A [`Channel`] is a cloneable handle; the channel's own state (state
//! machine, entity registry, pending continuations, acknowledgement ledger)
//! lives behind one lock and is mutated either by an API call or by the
//! inbound dispatch path, never concurrently. Completions always resolve
//! after that lock is released, so an observer may issue new operations.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::method::{BasicProperties, Method};
use crate::transport::MethodTransport;

use super::completion::{Completion, Pending};
use super::connection::SharedConnection;
use super::consumer::{Consumer, Delivery};
use super::error::Error;
use super::Result;

mod basic;
mod correlator;
mod dispatcher;
mod exchange;
mod ledger;
mod queue;
mod registry;

pub use basic::*;
pub use exchange::*;
pub use queue::*;
pub use registry::{Entity, EntityKind, Exchange, ExchangeOptions, Queue, QueueOptions};

use correlator::{Continuation, RpcCorrelator};
use ledger::DeliveryLedger;
use registry::EntityRegistry;

/// Channel lifecycle, linear once `Closed` is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// `channel.open` sent, confirmation outstanding. Operations are
    /// buffered and replayed in submission order once open.
    Opening,
    /// Normal operating state.
    Open,
    /// `channel.close` sent or a fatal channel error occurred; pending work
    /// has been drained, only the close handshake may still resolve.
    Closing,
    /// Terminal; the channel id is released for reuse.
    Closed,
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            ChannelState::Opening => "opening",
            ChannelState::Open => "open",
            ChannelState::Closing => "closing",
            ChannelState::Closed => "closed",
        })
    }
}

/// A callback to run once the channel lock is released.
pub(crate) type Resolution = Box<dyn FnOnce() + Send>;

/// Resolution closure for a pending completion. A second resolution of the
/// same completion is an internal invariant violation, logged and dropped.
pub(crate) fn fulfil<T: Send + Sync + 'static>(
    pending: Pending<T>,
    outcome: std::result::Result<T, Error>,
) -> Resolution {
    Box::new(move || {
        if pending.resolve(outcome).is_err() {
            error!("completion resolved twice");
        }
    })
}

/// One submitted channel operation, either executed directly (state `Open`)
/// or buffered behind the open confirmation (state `Opening`).
pub(crate) enum Operation {
    DeclareExchange {
        args: ExchangeDeclareArguments,
        pending: Pending<Arc<Exchange>>,
    },
    DeleteExchange {
        args: ExchangeDeleteArguments,
        pending: Pending<()>,
    },
    DeclareQueue {
        args: QueueDeclareArguments,
        pending: Pending<Arc<Queue>>,
    },
    BindQueue {
        args: QueueBindArguments,
        pending: Pending<()>,
    },
    DeleteQueue {
        args: QueueDeleteArguments,
        pending: Pending<()>,
    },
    Publish {
        args: BasicPublishArguments,
        properties: BasicProperties,
        body: Bytes,
    },
    Consume {
        args: BasicConsumeArguments,
        consumer: Box<dyn Consumer>,
        pending: Pending<String>,
    },
    Ack {
        args: BasicAckArguments,
        pending: Pending<Vec<crate::method::DeliveryTag>>,
    },
}

impl Operation {
    /// Fail the operation's completion when it is dropped unexecuted.
    /// Publishes are fire-and-forget and have nothing to resolve.
    pub fn fail(self, reason: &Error) -> Option<Resolution> {
        match self {
            Operation::DeclareExchange { pending, .. } => {
                Some(fulfil(pending, Err(reason.clone())))
            }
            Operation::DeleteExchange { pending, .. } => Some(fulfil(pending, Err(reason.clone()))),
            Operation::DeclareQueue { pending, .. } => Some(fulfil(pending, Err(reason.clone()))),
            Operation::BindQueue { pending, .. } => Some(fulfil(pending, Err(reason.clone()))),
            Operation::DeleteQueue { pending, .. } => Some(fulfil(pending, Err(reason.clone()))),
            Operation::Publish { .. } => None,
            Operation::Consume { pending, .. } => Some(fulfil(pending, Err(reason.clone()))),
            Operation::Ack { pending, .. } => Some(fulfil(pending, Err(reason.clone()))),
        }
    }
}

/////////////////////////////////////////////////////////////////////////////
/// Feed into one spawned consumer task.
pub(crate) struct ConsumerFeed {
    pub tx: mpsc::UnboundedSender<Delivery>,
    /// no_ack consumers never enter the acknowledgement ledger.
    pub no_ack: bool,
}

pub(crate) struct ChannelCore {
    pub state: ChannelState,
    /// Operations submitted while `Opening`, in submission order.
    pub buffer: Vec<Operation>,
    pub registry: EntityRegistry,
    pub correlator: RpcCorrelator,
    pub ledger: DeliveryLedger,
    /// Live consumer feeds, keyed by consumer tag.
    pub consumers: HashMap<String, ConsumerFeed>,
}

impl ChannelCore {
    fn new(opened: &Pending<()>) -> Self {
        let mut correlator = RpcCorrelator::new();
        // the open handshake is the first outstanding request
        correlator.enqueue(Continuation::Open {
            pending: opened.clone(),
        });
        Self {
            state: ChannelState::Opening,
            buffer: Vec::new(),
            registry: EntityRegistry::new(),
            correlator,
            ledger: DeliveryLedger::new(),
            consumers: HashMap::new(),
        }
    }
}

pub(crate) struct ChannelInner {
    channel_id: crate::method::ChannelId,
    transport: Arc<dyn MethodTransport>,
    connection: Weak<SharedConnection>,
    opened: Pending<()>,
    core: Mutex<ChannelCore>,
}

impl ChannelInner {
    pub(crate) fn core(&self) -> MutexGuard<'_, ChannelCore> {
        self.core.lock().expect("channel core lock poisoned")
    }

    /// Hand one fully formed request to the transport.
    pub(crate) fn send(&self, method: Method) -> Result<()> {
        self.transport
            .send_method(self.channel_id, method)
            .map_err(|err| {
                Error::TransportFailure(format!("channel {}: {}", self.channel_id, err))
            })
    }
}

/// Handle onto one channel. Cheap to clone; all clones observe the same
/// channel.
#[derive(Clone)]
pub struct Channel {
    inner: Arc<ChannelInner>,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "channel {}", self.inner.channel_id)
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Channel")
            .field("channel_id", &self.inner.channel_id)
            .finish()
    }
}

/////////////////////////////////////////////////////////////////////////////
impl Channel {
    /// New channels are created through
    /// [`Connection::open_channel`](crate::connection::Connection::open_channel).
    pub(crate) fn new(
        channel_id: crate::method::ChannelId,
        transport: Arc<dyn MethodTransport>,
        connection: Weak<SharedConnection>,
    ) -> Self {
        let opened: Pending<()> = Completion::new();
        let core = ChannelCore::new(&opened);
        Self {
            inner: Arc::new(ChannelInner {
                channel_id,
                transport,
                connection,
                opened,
                core: Mutex::new(core),
            }),
        }
    }

    pub fn channel_id(&self) -> crate::method::ChannelId {
        self.inner.channel_id
    }

    pub fn state(&self) -> ChannelState {
        self.inner.core().state
    }

    pub fn is_open(&self) -> bool {
        self.state() == ChannelState::Open
    }

    /// Resolved once `channel.open-ok` arrives, or with the failure that
    /// ended the channel first.
    pub fn opened(&self) -> Pending<()> {
        self.inner.opened.clone()
    }

    /// Insertion-ordered snapshot of the declared entities. Introspection
    /// only; never consulted for control flow.
    pub fn entities(&self) -> Vec<Entity> {
        self.inner.core().registry.snapshot()
    }

    /// Outstanding delivery tags awaiting acknowledgement, ascending.
    pub fn unacked_tags(&self) -> Vec<crate::method::DeliveryTag> {
        self.inner.core().ledger.tags()
    }

    /// Submit an operation: executed immediately while `Open`, buffered
    /// while `Opening`, rejected otherwise.
    pub(crate) fn submit(&self, operation: Operation) -> Result<()> {
        let mut resolutions = Vec::new();
        let outcome = {
            let mut core = self.inner.core();
            match core.state {
                ChannelState::Opening => {
                    core.buffer.push(operation);
                    Ok(())
                }
                ChannelState::Open => self.execute(&mut core, operation, &mut resolutions),
                ChannelState::Closing | ChannelState::Closed => Err(Error::ChannelNotOpen {
                    channel_id: self.inner.channel_id,
                    state: core.state,
                }),
            }
        };
        for resolution in resolutions {
            resolution();
        }
        outcome
    }

    /// Request a graceful close. Every pending continuation and buffered
    /// operation resolves as a `ChannelClosed` failure; the returned
    /// completion resolves once `channel.close-ok` arrives. Closing an
    /// already closing or closed channel is a no-op that reuses or
    /// short-circuits the handshake completion.
    pub fn close(&self) -> Pending<()> {
        let mut resolutions: Vec<Resolution> = Vec::new();
        let mut finalized = false;
        let pending = {
            let mut core = self.inner.core();
            match core.state {
                ChannelState::Closed => resolved_ok(),
                ChannelState::Closing => match core.correlator.pending_close() {
                    Some(in_flight) => in_flight,
                    None => {
                        // close already on the wire (anomaly abort); ride on
                        // its close-ok
                        let done: Pending<()> = Completion::new();
                        core.correlator.enqueue(Continuation::Close {
                            pending: done.clone(),
                        });
                        done
                    }
                },
                ChannelState::Opening | ChannelState::Open => {
                    core.state = ChannelState::Closing;
                    let reason = Error::ChannelClosed("channel closed by client".to_string());
                    self.drain_locked(&mut core, &reason, true, &mut resolutions);

                    let done: Pending<()> = Completion::new();
                    core.correlator.enqueue(Continuation::Close {
                        pending: done.clone(),
                    });
                    if let Err(err) = self.inner.send(Method::CloseChannel(
                        crate::method::CloseChannel::new(crate::method::REPLY_SUCCESS, "client shutdown"),
                    )) {
                        // the transport is gone, no close-ok will ever arrive
                        core.state = ChannelState::Closed;
                        if let Some(continuation) =
                            core.correlator.pop(correlator::ReplyKind::CloseChannelOk)
                        {
                            resolutions.push(continuation.fail(&err));
                        }
                        finalized = true;
                    }
                    done
                }
            }
        };
        for resolution in resolutions {
            resolution();
        }
        if finalized {
            self.release();
        }
        pending
    }

    /// Fail and discard every outstanding continuation, buffered operation,
    /// consumer feed and unacknowledged delivery. Lock must be held.
    pub(crate) fn drain_locked(
        &self,
        core: &mut ChannelCore,
        reason: &Error,
        keep_close: bool,
        resolutions: &mut Vec<Resolution>,
    ) {
        let outstanding = core.correlator.outstanding();
        if outstanding > 0 {
            debug!("{}: failing {} outstanding continuations", self, outstanding);
        }
        for continuation in core.correlator.drain(keep_close) {
            resolutions.push(continuation.fail(reason));
        }
        for operation in std::mem::take(&mut core.buffer) {
            if let Some(resolution) = operation.fail(reason) {
                resolutions.push(resolution);
            }
        }
        // dropping the senders stops the consumer tasks
        core.consumers.clear();
        core.ledger.clear();
    }

    /// Give the channel id back to the connection once fully closed.
    pub(crate) fn release(&self) {
        if let Some(connection) = self.inner.connection.upgrade() {
            connection.release_channel(self.inner.channel_id);
        }
    }
}

fn resolved_ok() -> Pending<()> {
    let done: Pending<()> = Completion::new();
    let _ = done.resolve(Ok(()));
    done
}
