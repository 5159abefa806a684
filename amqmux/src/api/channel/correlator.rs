//! Matches inbound replies to the outstanding requests that expect them.
//!
//! For every reply kind the broker answers requests of that kind in
//! submission order, so each kind gets one FIFO queue of continuations and a
//! reply always resolves the oldest entry. Kinds are independent and
//! interleave freely. Acknowledgement of deliveries is tag-indexed and lives
//! in the ledger instead (see `ledger.rs`).

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use super::super::completion::Pending;
use super::super::consumer::Consumer;
use super::super::error::Error;
use super::registry::{Exchange, ExchangeOptions, Queue, QueueOptions};
use super::{fulfil, Resolution};

/// Reply method kinds the correlator queues on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum ReplyKind {
    OpenChannelOk,
    CloseChannelOk,
    ExchangeDeclareOk,
    ExchangeDeleteOk,
    QueueDeclareOk,
    QueueBindOk,
    QueueDeleteOk,
    ConsumeOk,
}

/// A queued request for exactly one reply of a specific kind.
///
/// Declarations keep the requested name and options: a redeclaration that
/// arrives before this one resolves is validated against them.
pub(crate) enum Continuation {
    Open {
        pending: Pending<()>,
    },
    Close {
        pending: Pending<()>,
    },
    DeclareExchange {
        name: String,
        options: ExchangeOptions,
        pending: Pending<Arc<Exchange>>,
    },
    DeleteExchange {
        name: String,
        pending: Pending<()>,
    },
    DeclareQueue {
        name: String,
        options: QueueOptions,
        pending: Pending<Arc<Queue>>,
    },
    BindQueue {
        pending: Pending<()>,
    },
    DeleteQueue {
        name: String,
        pending: Pending<()>,
    },
    Consume {
        no_ack: bool,
        consumer: Box<dyn Consumer>,
        pending: Pending<String>,
    },
}

impl Continuation {
    pub fn kind(&self) -> ReplyKind {
        match self {
            Continuation::Open { .. } => ReplyKind::OpenChannelOk,
            Continuation::Close { .. } => ReplyKind::CloseChannelOk,
            Continuation::DeclareExchange { .. } => ReplyKind::ExchangeDeclareOk,
            Continuation::DeleteExchange { .. } => ReplyKind::ExchangeDeleteOk,
            Continuation::DeclareQueue { .. } => ReplyKind::QueueDeclareOk,
            Continuation::BindQueue { .. } => ReplyKind::QueueBindOk,
            Continuation::DeleteQueue { .. } => ReplyKind::QueueDeleteOk,
            Continuation::Consume { .. } => ReplyKind::ConsumeOk,
        }
    }

    /// Resolve the caller's completion as a failure; used when the channel
    /// is drained. The consumer of a pending consume is dropped unstarted.
    pub fn fail(self, reason: &Error) -> Resolution {
        match self {
            Continuation::Open { pending } | Continuation::Close { pending } => {
                fulfil(pending, Err(reason.clone()))
            }
            Continuation::DeclareExchange { pending, .. } => fulfil(pending, Err(reason.clone())),
            Continuation::DeleteExchange { pending, .. } => fulfil(pending, Err(reason.clone())),
            Continuation::DeclareQueue { pending, .. } => fulfil(pending, Err(reason.clone())),
            Continuation::BindQueue { pending } => fulfil(pending, Err(reason.clone())),
            Continuation::DeleteQueue { pending, .. } => fulfil(pending, Err(reason.clone())),
            Continuation::Consume { pending, .. } => fulfil(pending, Err(reason.clone())),
        }
    }
}

/////////////////////////////////////////////////////////////////////////////
pub(crate) struct RpcCorrelator {
    queues: BTreeMap<ReplyKind, VecDeque<Continuation>>,
}

impl RpcCorrelator {
    pub fn new() -> Self {
        Self {
            queues: BTreeMap::new(),
        }
    }

    pub fn enqueue(&mut self, continuation: Continuation) {
        self.queues
            .entry(continuation.kind())
            .or_default()
            .push_back(continuation);
    }

    /// Oldest outstanding continuation of `kind`. `None` means the broker
    /// answered a request that was never sent: fatal for the channel.
    pub fn pop(&mut self, kind: ReplyKind) -> Option<Continuation> {
        self.queues.get_mut(&kind)?.pop_front()
    }

    /// Requested options of a declare still awaiting its declare-ok, plus a
    /// handle to chain a second declaration of the same name onto.
    pub fn pending_exchange_declare(
        &self,
        name: &str,
    ) -> Option<(ExchangeOptions, Pending<Arc<Exchange>>)> {
        self.queues
            .get(&ReplyKind::ExchangeDeclareOk)?
            .iter()
            .find_map(|continuation| match continuation {
                Continuation::DeclareExchange {
                    name: pending_name,
                    options,
                    pending,
                } if pending_name == name => Some((options.clone(), pending.clone())),
                _ => None,
            })
    }

    pub fn pending_queue_declare(&self, name: &str) -> Option<(QueueOptions, Pending<Arc<Queue>>)> {
        self.queues
            .get(&ReplyKind::QueueDeclareOk)?
            .iter()
            .find_map(|continuation| match continuation {
                Continuation::DeclareQueue {
                    name: pending_name,
                    options,
                    pending,
                } if pending_name == name => Some((options.clone(), pending.clone())),
                _ => None,
            })
    }

    /// The close handshake's own completion, if a close is in flight.
    pub fn pending_close(&self) -> Option<Pending<()>> {
        self.queues
            .get(&ReplyKind::CloseChannelOk)?
            .iter()
            .find_map(|continuation| match continuation {
                Continuation::Close { pending } => Some(pending.clone()),
                _ => None,
            })
    }

    pub fn outstanding(&self) -> usize {
        self.queues.values().map(VecDeque::len).sum()
    }

    /// Remove every outstanding continuation, FIFO within each kind, kinds
    /// in a fixed order, so teardown is deterministic. With `keep_close` the
    /// close handshake continuation stays queued.
    pub fn drain(&mut self, keep_close: bool) -> Vec<Continuation> {
        let mut drained = Vec::new();
        for (kind, queue) in self.queues.iter_mut() {
            if keep_close && *kind == ReplyKind::CloseChannelOk {
                continue;
            }
            drained.extend(queue.drain(..));
        }
        drained
    }
}

/////////////////////////////////////////////////////////////////////////////
#[cfg(test)]
mod tests {
    use crate::api::completion::{Completion, Pending};

    use super::{Continuation, ReplyKind, RpcCorrelator};

    fn bind(pending: &Pending<()>) -> Continuation {
        Continuation::BindQueue {
            pending: pending.clone(),
        }
    }

    #[test]
    fn test_fifo_within_kind() {
        let mut correlator = RpcCorrelator::new();
        let first: Pending<()> = Completion::new();
        let second: Pending<()> = Completion::new();
        correlator.enqueue(bind(&first));
        correlator.enqueue(bind(&second));

        let popped = correlator.pop(ReplyKind::QueueBindOk).unwrap();
        match popped {
            Continuation::BindQueue { pending } => {
                pending.resolve(Ok(())).unwrap();
            }
            _ => unreachable!("kind mismatch"),
        }
        assert_eq!(true, first.is_resolved());
        assert_eq!(false, second.is_resolved());
    }

    #[test]
    fn test_pop_on_empty_kind_is_none() {
        let mut correlator = RpcCorrelator::new();
        assert_eq!(true, correlator.pop(ReplyKind::QueueDeclareOk).is_none());
    }

    #[test]
    fn test_drain_keeps_close_handshake() {
        let mut correlator = RpcCorrelator::new();
        let close: Pending<()> = Completion::new();
        correlator.enqueue(bind(&Completion::new()));
        correlator.enqueue(Continuation::Close {
            pending: close.clone(),
        });

        let drained = correlator.drain(true);
        assert_eq!(1, drained.len());
        assert_eq!(1, correlator.outstanding());
        assert_eq!(true, correlator.pending_close().is_some());

        let drained = correlator.drain(false);
        assert_eq!(1, drained.len());
        assert_eq!(0, correlator.outstanding());
    }
}
