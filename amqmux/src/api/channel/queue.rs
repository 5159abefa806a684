use std::sync::Arc;

use crate::method::{FieldTable, Method, QueueBind, QueueDeclare, QueueDelete};

use super::super::completion::{Completion, Pending};
use super::super::error::Error;
use super::super::Result;
use super::registry::{Queue, QueueOptions};
use super::{Channel, Operation};

/// Arguments for [`queue_declare`]
///
/// An empty queue name asks the broker to assign one; the assigned name is
/// learned from the declare-ok, so `no_wait` must not be set with it.
///
/// [`queue_declare`]: crate::channel::Channel::queue_declare
#[derive(Debug, Clone)]
pub struct QueueDeclareArguments {
    pub queue: String,
    pub passive: bool,
    pub durable: bool,
    pub exclusive: bool,
    pub auto_delete: bool,
    pub no_wait: bool,
    pub arguments: FieldTable,
}

impl QueueDeclareArguments {
    pub fn new(queue: &str) -> Self {
        Self {
            queue: queue.to_string(),
            passive: false,
            durable: false,
            exclusive: false,
            auto_delete: false,
            no_wait: false,
            arguments: FieldTable::new(),
        }
    }

    pub(crate) fn options(&self) -> QueueOptions {
        QueueOptions {
            durable: self.durable,
            exclusive: self.exclusive,
            auto_delete: self.auto_delete,
            arguments: self.arguments.clone(),
        }
    }

    pub(crate) fn to_method(&self) -> Method {
        Method::QueueDeclare(QueueDeclare {
            queue: self.queue.clone(),
            passive: self.passive,
            durable: self.durable,
            exclusive: self.exclusive,
            auto_delete: self.auto_delete,
            no_wait: self.no_wait,
            arguments: self.arguments.clone(),
        })
    }
}

/// Arguments for [`queue_bind`]
///
/// [`queue_bind`]: crate::channel::Channel::queue_bind
#[derive(Debug, Clone)]
pub struct QueueBindArguments {
    pub queue: String,
    pub exchange: String,
    pub routing_key: String,
    pub no_wait: bool,
    pub arguments: FieldTable,
}

impl QueueBindArguments {
    pub fn new(queue: &str, exchange: &str, routing_key: &str) -> Self {
        Self {
            queue: queue.to_string(),
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
            no_wait: false,
            arguments: FieldTable::new(),
        }
    }

    pub(crate) fn to_method(&self) -> Method {
        Method::QueueBind(QueueBind {
            queue: self.queue.clone(),
            exchange: self.exchange.clone(),
            routing_key: self.routing_key.clone(),
            no_wait: self.no_wait,
            arguments: self.arguments.clone(),
        })
    }
}

/// Arguments for [`queue_delete`]
///
/// [`queue_delete`]: crate::channel::Channel::queue_delete
#[derive(Debug, Clone)]
pub struct QueueDeleteArguments {
    pub queue: String,
    pub if_unused: bool,
    pub if_empty: bool,
    pub no_wait: bool,
}

impl QueueDeleteArguments {
    pub fn new(queue: &str) -> Self {
        Self {
            queue: queue.to_string(),
            if_unused: false,
            if_empty: false,
            no_wait: false,
        }
    }

    pub(crate) fn to_method(&self) -> Method {
        Method::QueueDelete(QueueDelete {
            queue: self.queue.clone(),
            if_unused: self.if_unused,
            if_empty: self.if_empty,
            no_wait: self.no_wait,
        })
    }
}

/////////////////////////////////////////////////////////////////////////////
/// API for Queue methods
impl Channel {
    /// Declare the queue, or return the known descriptor for an identical
    /// redeclaration. The completion resolves with the descriptor under the
    /// final name, server-assigned for an empty `queue`.
    pub fn queue_declare(&self, args: QueueDeclareArguments) -> Result<Pending<Arc<Queue>>> {
        if args.queue.is_empty() && args.no_wait {
            return Err(Error::InvalidDeclaration(
                "a server-named queue needs the declare-ok reply; no_wait must not be set"
                    .to_string(),
            ));
        }
        let pending = Completion::new();
        self.submit(Operation::DeclareQueue {
            args,
            pending: pending.clone(),
        })?;
        Ok(pending)
    }

    pub fn queue_bind(&self, args: QueueBindArguments) -> Result<Pending<()>> {
        let pending = Completion::new();
        self.submit(Operation::BindQueue {
            args,
            pending: pending.clone(),
        })?;
        Ok(pending)
    }

    /// Delete the queue and drop its descriptor from the registry.
    pub fn queue_delete(&self, args: QueueDeleteArguments) -> Result<Pending<()>> {
        if args.queue.is_empty() {
            return Err(Error::InvalidDeclaration(
                "queue delete needs a queue name".to_string(),
            ));
        }
        let pending = Completion::new();
        self.submit(Operation::DeleteQueue {
            args,
            pending: pending.clone(),
        })?;
        Ok(pending)
    }
}
