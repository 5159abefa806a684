use std::sync::Arc;

use crate::method::{ExchangeDeclare, ExchangeDelete, FieldTable, Method};

use super::super::completion::{Completion, Pending};
use super::super::error::Error;
use super::super::Result;
use super::registry::{Exchange, ExchangeOptions};
use super::{Channel, Operation};

/// Arguments for [`exchange_declare`]
///
/// [`exchange_declare`]: crate::channel::Channel::exchange_declare
#[derive(Debug, Clone)]
pub struct ExchangeDeclareArguments {
    pub exchange: String,
    pub typ: String,
    /// Existence check only: never creates and never validates options
    /// against a known declaration.
    pub passive: bool,
    pub durable: bool,
    pub auto_delete: bool,
    pub internal: bool,
    /// Fire and forget: no declare-ok is expected, the descriptor is
    /// registered speculatively.
    pub no_wait: bool,
    pub arguments: FieldTable,
}

impl ExchangeDeclareArguments {
    /// Create declare arguments with defaults
    pub fn new(exchange: &str, typ: &str) -> Self {
        Self {
            exchange: exchange.to_string(),
            typ: typ.to_string(),
            passive: false,
            durable: false,
            auto_delete: false,
            internal: false,
            no_wait: false,
            arguments: FieldTable::new(),
        }
    }

    pub(crate) fn options(&self) -> ExchangeOptions {
        ExchangeOptions {
            typ: self.typ.clone(),
            durable: self.durable,
            auto_delete: self.auto_delete,
            internal: self.internal,
            arguments: self.arguments.clone(),
        }
    }

    pub(crate) fn to_method(&self) -> Method {
        Method::ExchangeDeclare(ExchangeDeclare {
            exchange: self.exchange.clone(),
            typ: self.typ.clone(),
            passive: self.passive,
            durable: self.durable,
            auto_delete: self.auto_delete,
            internal: self.internal,
            no_wait: self.no_wait,
            arguments: self.arguments.clone(),
        })
    }
}

/// Arguments for [`exchange_delete`]
///
/// [`exchange_delete`]: crate::channel::Channel::exchange_delete
#[derive(Debug, Clone)]
pub struct ExchangeDeleteArguments {
    pub exchange: String,
    pub if_unused: bool,
    pub no_wait: bool,
}

impl ExchangeDeleteArguments {
    /// Create arguments with defaults
    pub fn new(exchange: &str) -> Self {
        Self {
            exchange: exchange.to_string(),
            if_unused: false,
            no_wait: false,
        }
    }

    pub(crate) fn to_method(&self) -> Method {
        Method::ExchangeDelete(ExchangeDelete {
            exchange: self.exchange.clone(),
            if_unused: self.if_unused,
            no_wait: self.no_wait,
        })
    }
}

/////////////////////////////////////////////////////////////////////////////
/// API for Exchange methods
impl Channel {
    /// Declare the exchange, or return the known descriptor if this channel
    /// already declared the same name with the same options. A redeclaration
    /// with different options fails with `IncompatibleOptions` and sends
    /// nothing.
    pub fn exchange_declare(
        &self,
        args: ExchangeDeclareArguments,
    ) -> Result<Pending<Arc<Exchange>>> {
        if args.exchange.is_empty() {
            return Err(Error::InvalidDeclaration(
                "the default exchange cannot be declared".to_string(),
            ));
        }
        let pending = Completion::new();
        self.submit(Operation::DeclareExchange {
            args,
            pending: pending.clone(),
        })?;
        Ok(pending)
    }

    /// Delete the exchange and drop its descriptor from the registry.
    pub fn exchange_delete(&self, args: ExchangeDeleteArguments) -> Result<Pending<()>> {
        if args.exchange.is_empty() {
            return Err(Error::InvalidDeclaration(
                "the default exchange cannot be deleted".to_string(),
            ));
        }
        let pending = Completion::new();
        self.submit(Operation::DeleteExchange {
            args,
            pending: pending.clone(),
        })?;
        Ok(pending)
    }
}
