//! Inbound method handling and operation execution for one channel.
//!
//! Replies resolve the oldest matching continuation; a reply with no match
//! is fatal for the channel, never ignored. Operation execution validates
//! against the registry, hands the request to the transport and queues the
//! continuation, all under the channel lock so wire order equals submission
//! order.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::method::{
    Ack, CloseChannel, CloseChannelOk, Deliver, Method, Publish, UNEXPECTED_FRAME,
};

use super::super::completion::Pending;
use super::super::consumer::{Consumer, Delivery};
use super::super::error::Error;
use super::super::Result;
use super::correlator::{Continuation, ReplyKind};
use super::ledger::UnackedDelivery;
use super::registry::{
    check_exchange_compatible, check_queue_compatible, EntityKind, Exchange, Queue,
};
use super::{
    fulfil, BasicConsumeArguments, Channel, ChannelCore, ChannelState, ConsumerFeed,
    ExchangeDeclareArguments, Operation, QueueDeclareArguments, Resolution,
};

/////////////////////////////////////////////////////////////////////////////
impl Channel {
    /// Handle one inbound method routed to this channel. Runs on the
    /// transport's dispatch path; completions resolve here, at the reply
    /// boundary, never inside the call that issued the request.
    pub(crate) fn handle_inbound(&self, method: Method) {
        let mut resolutions = Vec::new();
        let (before, after) = {
            let mut core = self.inner.core();
            let before = core.state;
            match core.state {
                ChannelState::Opening => {
                    self.inbound_while_opening(&mut core, method, &mut resolutions)
                }
                ChannelState::Open => self.inbound_while_open(&mut core, method, &mut resolutions),
                ChannelState::Closing => {
                    self.inbound_while_closing(&mut core, method, &mut resolutions)
                }
                ChannelState::Closed => debug!("discard {} on closed {}", method, self),
            }
            (before, core.state)
        };
        for resolution in resolutions {
            resolution();
        }
        if after == ChannelState::Closed && before != ChannelState::Closed {
            self.release();
        }
    }

    /// Terminal teardown from a connection-level failure. Everything
    /// pending, including a close handshake in flight, resolves as a
    /// failure carrying the fault reason.
    pub(crate) fn teardown(&self, reason: &str) {
        let mut resolutions = Vec::new();
        let transitioned = {
            let mut core = self.inner.core();
            if core.state == ChannelState::Closed {
                false
            } else {
                let err = Error::ChannelClosed(reason.to_string());
                self.drain_locked(&mut core, &err, false, &mut resolutions);
                core.state = ChannelState::Closed;
                true
            }
        };
        for resolution in resolutions {
            resolution();
        }
        if transitioned {
            self.release();
        }
    }

    /////////////////////////////////////////////////////////////////////////
    fn inbound_while_opening(
        &self,
        core: &mut ChannelCore,
        method: Method,
        resolutions: &mut Vec<Resolution>,
    ) {
        match method {
            Method::OpenChannelOk(_) => {
                core.state = ChannelState::Open;
                match core.correlator.pop(ReplyKind::OpenChannelOk) {
                    Some(Continuation::Open { pending }) => {
                        resolutions.push(fulfil(pending, Ok(())))
                    }
                    _ => unreachable!("open continuation is enqueued at channel creation"),
                }
                // release buffered operations in submission order
                for operation in std::mem::take(&mut core.buffer) {
                    if let Err(err) = self.execute(core, operation, resolutions) {
                        error!("buffered operation failed on {}: {}", self, err);
                    }
                }
                info!("{} is open", self);
            }
            Method::CloseChannel(close) => self.server_close_locked(core, &close, resolutions),
            other => self.force_abort_locked(
                core,
                format!("{} received while opening", other),
                resolutions,
            ),
        }
    }

    fn inbound_while_open(
        &self,
        core: &mut ChannelCore,
        method: Method,
        resolutions: &mut Vec<Resolution>,
    ) {
        match method {
            Method::ExchangeDeclareOk(_) => {
                if let Some(continuation) =
                    self.pop_or_abort(core, ReplyKind::ExchangeDeclareOk, resolutions)
                {
                    match continuation {
                        Continuation::DeclareExchange {
                            name,
                            options,
                            pending,
                        } => {
                            let exchange = Arc::new(Exchange::new(name, options));
                            core.registry.insert_exchange(Arc::clone(&exchange));
                            resolutions.push(fulfil(pending, Ok(exchange)));
                        }
                        _ => unreachable!("correlator queues are keyed by continuation kind"),
                    }
                }
            }
            Method::ExchangeDeleteOk(_) => {
                if let Some(continuation) =
                    self.pop_or_abort(core, ReplyKind::ExchangeDeleteOk, resolutions)
                {
                    match continuation {
                        Continuation::DeleteExchange { name, pending } => {
                            core.registry.remove(EntityKind::Exchange, &name);
                            resolutions.push(fulfil(pending, Ok(())));
                        }
                        _ => unreachable!("correlator queues are keyed by continuation kind"),
                    }
                }
            }
            Method::QueueDeclareOk(ok) => {
                if let Some(continuation) =
                    self.pop_or_abort(core, ReplyKind::QueueDeclareOk, resolutions)
                {
                    match continuation {
                        Continuation::DeclareQueue {
                            name,
                            options,
                            pending,
                        } => {
                            // the server-assigned name is authoritative; for
                            // named declarations the two agree
                            let assigned = if ok.queue.is_empty() { name } else { ok.queue };
                            if assigned.is_empty() {
                                let detail = "queue.declare-ok carries no queue name".to_string();
                                resolutions.push(fulfil(
                                    pending,
                                    Err(Error::UnexpectedReply(detail.clone())),
                                ));
                                self.force_abort_locked(core, detail, resolutions);
                                return;
                            }
                            debug!(
                                "queue '{}' declared on {} ({} messages, {} consumers)",
                                assigned, self, ok.message_count, ok.consumer_count
                            );
                            let queue = Arc::new(Queue::new(assigned, options));
                            core.registry.insert_queue(Arc::clone(&queue));
                            resolutions.push(fulfil(pending, Ok(queue)));
                        }
                        _ => unreachable!("correlator queues are keyed by continuation kind"),
                    }
                }
            }
            Method::QueueBindOk(_) => {
                if let Some(continuation) =
                    self.pop_or_abort(core, ReplyKind::QueueBindOk, resolutions)
                {
                    match continuation {
                        Continuation::BindQueue { pending } => {
                            resolutions.push(fulfil(pending, Ok(())))
                        }
                        _ => unreachable!("correlator queues are keyed by continuation kind"),
                    }
                }
            }
            Method::QueueDeleteOk(ok) => {
                if let Some(continuation) =
                    self.pop_or_abort(core, ReplyKind::QueueDeleteOk, resolutions)
                {
                    match continuation {
                        Continuation::DeleteQueue { name, pending } => {
                            debug!(
                                "queue '{}' deleted on {}, {} messages purged",
                                name, self, ok.message_count
                            );
                            core.registry.remove(EntityKind::Queue, &name);
                            resolutions.push(fulfil(pending, Ok(())));
                        }
                        _ => unreachable!("correlator queues are keyed by continuation kind"),
                    }
                }
            }
            Method::ConsumeOk(ok) => {
                if let Some(continuation) =
                    self.pop_or_abort(core, ReplyKind::ConsumeOk, resolutions)
                {
                    match continuation {
                        Continuation::Consume {
                            no_ack,
                            consumer,
                            pending,
                        } => {
                            if ok.consumer_tag.is_empty() {
                                let detail =
                                    "basic.consume-ok carries no consumer tag".to_string();
                                resolutions.push(fulfil(
                                    pending,
                                    Err(Error::UnexpectedReply(detail.clone())),
                                ));
                                self.force_abort_locked(core, detail, resolutions);
                                return;
                            }
                            self.start_consumer_locked(core, &ok.consumer_tag, no_ack, consumer);
                            resolutions.push(fulfil(pending, Ok(ok.consumer_tag)));
                        }
                        _ => unreachable!("correlator queues are keyed by continuation kind"),
                    }
                }
            }
            Method::Deliver(deliver) => self.handle_deliver_locked(core, deliver, resolutions),
            Method::CloseChannel(close) => self.server_close_locked(core, &close, resolutions),
            other => self.force_abort_locked(
                core,
                format!("{} matches no outstanding request", other),
                resolutions,
            ),
        }
    }

    fn inbound_while_closing(
        &self,
        core: &mut ChannelCore,
        method: Method,
        resolutions: &mut Vec<Resolution>,
    ) {
        match method {
            Method::CloseChannelOk(_) => self.finalize_close_locked(core, resolutions),
            Method::CloseChannel(_) => {
                // close collision: confirm the server's close, ours is done
                if let Err(err) = self.inner.send(Method::CloseChannelOk(CloseChannelOk)) {
                    debug!("failed to confirm server close on {}: {}", self, err);
                }
                self.finalize_close_locked(core, resolutions);
            }
            other => debug!("discard {} while closing {}", other, self),
        }
    }

    /////////////////////////////////////////////////////////////////////////
    fn pop_or_abort(
        &self,
        core: &mut ChannelCore,
        kind: ReplyKind,
        resolutions: &mut Vec<Resolution>,
    ) -> Option<Continuation> {
        let continuation = core.correlator.pop(kind);
        if continuation.is_none() {
            self.force_abort_locked(
                core,
                format!("{:?} reply matches no outstanding request", kind),
                resolutions,
            );
        }
        continuation
    }

    /// Protocol anomaly: the channel state can no longer be trusted. Fail
    /// everything pending and start a close handshake towards the server.
    fn force_abort_locked(
        &self,
        core: &mut ChannelCore,
        detail: String,
        resolutions: &mut Vec<Resolution>,
    ) {
        error!("protocol anomaly on {}: {}", self, detail);
        let reason = Error::UnexpectedReply(detail.clone());
        self.drain_locked(core, &reason, false, resolutions);
        core.state = ChannelState::Closing;
        if let Err(err) = self
            .inner
            .send(Method::CloseChannel(CloseChannel::new(
                UNEXPECTED_FRAME,
                &detail,
            )))
        {
            debug!("failed to send close after anomaly on {}: {}", self, err);
            core.state = ChannelState::Closed;
        }
    }

    /// Server-initiated close of this channel only. Siblings on the same
    /// connection are unaffected.
    fn server_close_locked(
        &self,
        core: &mut ChannelCore,
        close: &CloseChannel,
        resolutions: &mut Vec<Resolution>,
    ) {
        info!(
            "server closed {}: {} ({})",
            self, close.reply_text, close.reply_code
        );
        if let Err(err) = self.inner.send(Method::CloseChannelOk(CloseChannelOk)) {
            debug!("failed to confirm server close on {}: {}", self, err);
        }
        let reason = Error::ChannelClosed(format!(
            "server closed channel: {} ({})",
            close.reply_text, close.reply_code
        ));
        self.drain_locked(core, &reason, false, resolutions);
        core.state = ChannelState::Closed;
    }

    fn finalize_close_locked(&self, core: &mut ChannelCore, resolutions: &mut Vec<Resolution>) {
        core.state = ChannelState::Closed;
        if let Some(Continuation::Close { pending }) =
            core.correlator.pop(ReplyKind::CloseChannelOk)
        {
            resolutions.push(fulfil(pending, Ok(())));
        }
        info!("{} is closed", self);
    }

    fn handle_deliver_locked(
        &self,
        core: &mut ChannelCore,
        deliver: Deliver,
        resolutions: &mut Vec<Resolution>,
    ) {
        let feed = core.consumers.get(&deliver.consumer_tag);
        let no_ack = feed.map(|feed| feed.no_ack).unwrap_or(false);
        if !no_ack {
            let recorded = core.ledger.record(
                deliver.delivery_tag,
                UnackedDelivery {
                    consumer_tag: deliver.consumer_tag.clone(),
                },
            );
            if !recorded {
                self.force_abort_locked(
                    core,
                    format!("delivery tag {} is not increasing", deliver.delivery_tag),
                    resolutions,
                );
                return;
            }
        }
        match core.consumers.get(&deliver.consumer_tag) {
            Some(feed) => {
                let delivery = Delivery {
                    consumer_tag: deliver.consumer_tag,
                    delivery_tag: deliver.delivery_tag,
                    redelivered: deliver.redelivered,
                    exchange: deliver.exchange,
                    routing_key: deliver.routing_key,
                    properties: deliver.properties,
                    body: deliver.body,
                };
                if feed.tx.send(delivery).is_err() {
                    debug!("consumer task gone on {}, delivery dropped", self);
                }
            }
            None => debug!(
                "no consumer '{}' on {}, delivery {} dropped",
                deliver.consumer_tag, self, deliver.delivery_tag
            ),
        }
    }

    fn start_consumer_locked(
        &self,
        core: &mut ChannelCore,
        consumer_tag: &str,
        no_ack: bool,
        mut consumer: Box<dyn Consumer>,
    ) {
        let (tx, mut rx) = mpsc::unbounded_channel();
        core.consumers
            .insert(consumer_tag.to_owned(), ConsumerFeed { tx, no_ack });
        let channel = self.clone();
        let tag = consumer_tag.to_owned();
        info!("consumer '{}' starts on {}", tag, channel);
        tokio::spawn(async move {
            while let Some(delivery) = rx.recv().await {
                consumer.consume(&channel, delivery).await;
            }
            debug!("consumer '{}' on {} stopped", tag, channel);
        });
    }

    /////////////////////////////////////////////////////////////////////////
    /// Execute one operation while `Open`. Errors resolve the operation's
    /// completion *and* propagate, so direct callers get them synchronously
    /// while replayed buffered operations report through the completion.
    pub(crate) fn execute(
        &self,
        core: &mut ChannelCore,
        operation: Operation,
        resolutions: &mut Vec<Resolution>,
    ) -> Result<()> {
        match operation {
            Operation::DeclareExchange { args, pending } => {
                self.execute_exchange_declare(core, args, pending, resolutions)
            }
            Operation::DeleteExchange { args, pending } => {
                if args.no_wait {
                    if let Err(err) = self.inner.send(args.to_method()) {
                        resolutions.push(fulfil(pending, Err(err.clone())));
                        return Err(err);
                    }
                    core.registry.remove(EntityKind::Exchange, &args.exchange);
                    resolutions.push(fulfil(pending, Ok(())));
                    Ok(())
                } else {
                    if let Err(err) = self.inner.send(args.to_method()) {
                        resolutions.push(fulfil(pending, Err(err.clone())));
                        return Err(err);
                    }
                    core.correlator.enqueue(Continuation::DeleteExchange {
                        name: args.exchange,
                        pending,
                    });
                    Ok(())
                }
            }
            Operation::DeclareQueue { args, pending } => {
                self.execute_queue_declare(core, args, pending, resolutions)
            }
            Operation::BindQueue { args, pending } => {
                if let Err(err) = self.inner.send(args.to_method()) {
                    resolutions.push(fulfil(pending, Err(err.clone())));
                    return Err(err);
                }
                if args.no_wait {
                    resolutions.push(fulfil(pending, Ok(())));
                } else {
                    core.correlator.enqueue(Continuation::BindQueue { pending });
                }
                Ok(())
            }
            Operation::DeleteQueue { args, pending } => {
                if let Err(err) = self.inner.send(args.to_method()) {
                    resolutions.push(fulfil(pending, Err(err.clone())));
                    return Err(err);
                }
                if args.no_wait {
                    core.registry.remove(EntityKind::Queue, &args.queue);
                    resolutions.push(fulfil(pending, Ok(())));
                } else {
                    core.correlator.enqueue(Continuation::DeleteQueue {
                        name: args.queue,
                        pending,
                    });
                }
                Ok(())
            }
            Operation::Publish {
                args,
                properties,
                body,
            } => self.inner.send(Method::Publish(Publish {
                exchange: args.exchange,
                routing_key: args.routing_key,
                mandatory: args.mandatory,
                properties,
                body,
            })),
            Operation::Consume {
                args,
                consumer,
                pending,
            } => self.execute_consume(core, args, consumer, pending, resolutions),
            Operation::Ack { args, pending } => {
                let settled = core.ledger.settle(args.delivery_tag, args.multiple);
                if settled.is_empty() {
                    let err = Error::UnknownDeliveryTag(args.delivery_tag);
                    resolutions.push(fulfil(pending, Err(err.clone())));
                    return Err(err);
                }
                if let Err(err) = self.inner.send(Method::Ack(Ack {
                    delivery_tag: args.delivery_tag,
                    multiple: args.multiple,
                })) {
                    resolutions.push(fulfil(pending, Err(err.clone())));
                    return Err(err);
                }
                resolutions.push(fulfil(pending, Ok(settled)));
                Ok(())
            }
        }
    }

    fn execute_exchange_declare(
        &self,
        core: &mut ChannelCore,
        args: ExchangeDeclareArguments,
        pending: Pending<Arc<Exchange>>,
        resolutions: &mut Vec<Resolution>,
    ) -> Result<()> {
        let options = args.options();
        if let Some(existing) = core.registry.lookup_exchange(&args.exchange) {
            if !args.passive {
                if let Err(err) =
                    check_exchange_compatible(&args.exchange, existing.options(), &options)
                {
                    resolutions.push(fulfil(pending, Err(err.clone())));
                    return Err(err);
                }
            }
            // known entity: no second wire declaration
            resolutions.push(fulfil(pending, Ok(existing)));
            return Ok(());
        }
        if let Some((pending_options, first)) =
            core.correlator.pending_exchange_declare(&args.exchange)
        {
            if !args.passive {
                if let Err(err) =
                    check_exchange_compatible(&args.exchange, &pending_options, &options)
                {
                    resolutions.push(fulfil(pending, Err(err.clone())));
                    return Err(err);
                }
            }
            // chain onto the declaration in flight: still one wire declare
            first.on_resolved(move |outcome| {
                if pending.resolve(outcome.clone()).is_err() {
                    error!("completion resolved twice");
                }
            });
            return Ok(());
        }
        if let Err(err) = self.inner.send(args.to_method()) {
            resolutions.push(fulfil(pending, Err(err.clone())));
            return Err(err);
        }
        if args.no_wait {
            // fire and forget: register speculatively, nothing to correlate
            let exchange = Arc::new(Exchange::new(args.exchange, options));
            core.registry.insert_exchange(Arc::clone(&exchange));
            resolutions.push(fulfil(pending, Ok(exchange)));
        } else {
            core.correlator.enqueue(Continuation::DeclareExchange {
                name: args.exchange,
                options,
                pending,
            });
        }
        Ok(())
    }

    fn execute_queue_declare(
        &self,
        core: &mut ChannelCore,
        args: QueueDeclareArguments,
        pending: Pending<Arc<Queue>>,
        resolutions: &mut Vec<Resolution>,
    ) -> Result<()> {
        let options = args.options();
        if !args.queue.is_empty() {
            if let Some(existing) = core.registry.lookup_queue(&args.queue) {
                if !args.passive {
                    if let Err(err) =
                        check_queue_compatible(&args.queue, existing.options(), &options)
                    {
                        resolutions.push(fulfil(pending, Err(err.clone())));
                        return Err(err);
                    }
                }
                resolutions.push(fulfil(pending, Ok(existing)));
                return Ok(());
            }
            if let Some((pending_options, first)) =
                core.correlator.pending_queue_declare(&args.queue)
            {
                if !args.passive {
                    if let Err(err) =
                        check_queue_compatible(&args.queue, &pending_options, &options)
                    {
                        resolutions.push(fulfil(pending, Err(err.clone())));
                        return Err(err);
                    }
                }
                first.on_resolved(move |outcome| {
                    if pending.resolve(outcome.clone()).is_err() {
                        error!("completion resolved twice");
                    }
                });
                return Ok(());
            }
        }
        if let Err(err) = self.inner.send(args.to_method()) {
            resolutions.push(fulfil(pending, Err(err.clone())));
            return Err(err);
        }
        if args.no_wait {
            // server-named declarations cannot be no_wait, checked upfront
            debug_assert!(!args.queue.is_empty());
            let queue = Arc::new(Queue::new(args.queue, options));
            core.registry.insert_queue(Arc::clone(&queue));
            resolutions.push(fulfil(pending, Ok(queue)));
        } else {
            core.correlator.enqueue(Continuation::DeclareQueue {
                name: args.queue,
                options,
                pending,
            });
        }
        Ok(())
    }

    fn execute_consume(
        &self,
        core: &mut ChannelCore,
        args: BasicConsumeArguments,
        consumer: Box<dyn Consumer>,
        pending: Pending<String>,
        resolutions: &mut Vec<Resolution>,
    ) -> Result<()> {
        if let Err(err) = self.inner.send(args.to_method()) {
            resolutions.push(fulfil(pending, Err(err.clone())));
            return Err(err);
        }
        if args.no_wait {
            // server-named consumer tags cannot be no_wait, checked upfront
            debug_assert!(!args.consumer_tag.is_empty());
            self.start_consumer_locked(core, &args.consumer_tag, args.no_ack, consumer);
            resolutions.push(fulfil(pending, Ok(args.consumer_tag)));
        } else {
            core.correlator.enqueue(Continuation::Consume {
                no_ack: args.no_ack,
                consumer,
                pending,
            });
        }
        Ok(())
    }
}
