//! Declaration registry behavior: idempotency, option consistency, passive
//! exemption and server-named entities.

mod common;

use std::sync::Arc;

use amqmux::channel::{
    ExchangeDeclareArguments, ExchangeDeleteArguments, QueueBindArguments, QueueDeclareArguments,
};
use amqmux::error::Error;
use amqmux::{
    ExchangeDeclareOk, ExchangeDeleteOk, Method, QueueBindOk, QueueDeclareOk,
};

use common::{attach, open_channel};

fn orders_args() -> ExchangeDeclareArguments {
    let mut args = ExchangeDeclareArguments::new("orders", "topic");
    args.durable = true;
    args
}

#[test]
fn test_identical_redeclaration_is_cached() {
    let (connection, inbound, transport) = attach();
    let channel = open_channel(&connection, &inbound);

    let first = channel.exchange_declare(orders_args()).unwrap();
    inbound.dispatch(1, Method::ExchangeDeclareOk(ExchangeDeclareOk::default()));
    let first = first.try_get().unwrap().unwrap();
    assert_eq!("orders", first.name());
    assert!(first.durable());

    // identical redeclaration: cached descriptor, no second wire declare
    let second = channel.exchange_declare(orders_args()).unwrap();
    let second = second.try_get().unwrap().unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(1, transport.count("exchange.declare"));
}

#[test]
fn test_mismatched_redeclaration_fails() {
    let (connection, inbound, transport) = attach();
    let channel = open_channel(&connection, &inbound);

    channel.exchange_declare(orders_args()).unwrap();
    inbound.dispatch(1, Method::ExchangeDeclareOk(ExchangeDeclareOk::default()));

    let mut mismatched = orders_args();
    mismatched.durable = false;
    let err = channel.exchange_declare(mismatched).unwrap_err();
    match err {
        Error::IncompatibleOptions(conflict) => {
            assert_eq!("orders", conflict.name);
            assert!(conflict.existing.contains("durable: true"));
            assert!(conflict.requested.contains("durable: false"));
        }
        other => panic!("expected IncompatibleOptions, got {}", other),
    }
    // the conflicting request never reached the wire
    assert_eq!(1, transport.count("exchange.declare"));
}

#[test]
fn test_passive_redeclaration_skips_option_check() {
    let (connection, inbound, transport) = attach();
    let channel = open_channel(&connection, &inbound);

    let first = channel.exchange_declare(orders_args()).unwrap();
    inbound.dispatch(1, Method::ExchangeDeclareOk(ExchangeDeclareOk::default()));
    let first = first.try_get().unwrap().unwrap();

    // passive + mismatched options: exempt from the equality check
    let mut passive = ExchangeDeclareArguments::new("orders", "topic");
    passive.passive = true;
    let checked = channel.exchange_declare(passive).unwrap();
    let checked = checked.try_get().unwrap().unwrap();
    assert!(Arc::ptr_eq(&first, &checked));
    assert_eq!(1, transport.count("exchange.declare"));
}

#[test]
fn test_passive_declare_of_unknown_entity_goes_to_wire() {
    let (connection, inbound, transport) = attach();
    let channel = open_channel(&connection, &inbound);

    let mut passive = ExchangeDeclareArguments::new("upstream", "fanout");
    passive.passive = true;
    let pending = channel.exchange_declare(passive).unwrap();

    assert_eq!(1, transport.count("exchange.declare"));
    match transport.last().unwrap() {
        (1, Method::ExchangeDeclare(declare)) => assert!(declare.passive),
        other => panic!("expected exchange.declare, got {:?}", other),
    }

    inbound.dispatch(1, Method::ExchangeDeclareOk(ExchangeDeclareOk::default()));
    assert_eq!("upstream", pending.try_get().unwrap().unwrap().name());
}

#[test]
fn test_redeclaration_while_first_declare_pending() {
    let (connection, inbound, transport) = attach();
    let channel = open_channel(&connection, &inbound);

    let first = channel.queue_declare(QueueDeclareArguments::new("jobs")).unwrap();
    let second = channel.queue_declare(QueueDeclareArguments::new("jobs")).unwrap();
    // the second declaration chains onto the one in flight
    assert_eq!(1, transport.count("queue.declare"));

    inbound.dispatch(1, Method::QueueDeclareOk(QueueDeclareOk::new("jobs", 0, 0)));
    let first = first.try_get().unwrap().unwrap();
    let second = second.try_get().unwrap().unwrap();
    assert!(Arc::ptr_eq(&first, &second));
}

#[test]
fn test_mismatch_against_pending_declare() {
    let (connection, inbound, transport) = attach();
    let channel = open_channel(&connection, &inbound);

    let mut durable = QueueDeclareArguments::new("jobs");
    durable.durable = true;
    channel.queue_declare(durable).unwrap();

    // validated against the options recorded in the pending continuation
    let err = channel
        .queue_declare(QueueDeclareArguments::new("jobs"))
        .unwrap_err();
    assert!(matches!(err, Error::IncompatibleOptions(_)));
    assert_eq!(1, transport.count("queue.declare"));
}

#[test]
fn test_server_named_queue_registers_under_assigned_name() {
    let (connection, inbound, transport) = attach();
    let channel = open_channel(&connection, &inbound);

    let pending = channel.queue_declare(QueueDeclareArguments::new("")).unwrap();
    inbound.dispatch(
        1,
        Method::QueueDeclareOk(QueueDeclareOk::new("gen-abc123", 0, 0)),
    );
    let queue = pending.try_get().unwrap().unwrap();
    assert_eq!("gen-abc123", queue.name());

    let names: Vec<String> = channel
        .entities()
        .iter()
        .map(|entity| entity.name().to_string())
        .collect();
    assert_eq!(vec!["gen-abc123"], names);

    // the empty name is not a registry key: declaring "" again is a fresh
    // server-named declaration, not a cache hit
    channel.queue_declare(QueueDeclareArguments::new("")).unwrap();
    assert_eq!(2, transport.count("queue.declare"));
}

#[test]
fn test_server_named_queue_requires_reply() {
    let (connection, inbound, transport) = attach();
    let channel = open_channel(&connection, &inbound);

    let mut args = QueueDeclareArguments::new("");
    args.no_wait = true;
    let err = channel.queue_declare(args).unwrap_err();
    assert!(matches!(err, Error::InvalidDeclaration(_)));
    // failed fast, nothing reached the wire
    assert_eq!(0, transport.count("queue.declare"));
}

#[test]
fn test_no_wait_declaration_registers_speculatively() {
    let (connection, inbound, transport) = attach();
    let channel = open_channel(&connection, &inbound);

    let mut args = QueueDeclareArguments::new("jobs");
    args.no_wait = true;
    let pending = channel.queue_declare(args).unwrap();

    // registered before any confirmation
    assert_eq!("jobs", pending.try_get().unwrap().unwrap().name());
    assert_eq!(1, transport.count("queue.declare"));
    assert_eq!(1, channel.entities().len());
}

#[test]
fn test_bind_resolves_on_bind_ok() {
    let (connection, inbound, transport) = attach();
    let channel = open_channel(&connection, &inbound);

    let pending = channel
        .queue_bind(QueueBindArguments::new("jobs", "orders", "order.created"))
        .unwrap();
    assert!(pending.try_get().is_none());
    assert_eq!(1, transport.count("queue.bind"));

    inbound.dispatch(1, Method::QueueBindOk(QueueBindOk::default()));
    assert_eq!(Ok(()), pending.try_get().unwrap());
}

#[test]
fn test_delete_removes_descriptor() {
    let (connection, inbound, transport) = attach();
    let channel = open_channel(&connection, &inbound);

    channel.exchange_declare(orders_args()).unwrap();
    inbound.dispatch(1, Method::ExchangeDeclareOk(ExchangeDeclareOk::default()));
    assert_eq!(1, channel.entities().len());

    let pending = channel
        .exchange_delete(ExchangeDeleteArguments::new("orders"))
        .unwrap();
    inbound.dispatch(1, Method::ExchangeDeleteOk(ExchangeDeleteOk::default()));
    assert_eq!(Ok(()), pending.try_get().unwrap());
    assert!(channel.entities().is_empty());

    // deleted means declarable again
    channel.exchange_declare(orders_args()).unwrap();
    assert_eq!(2, transport.count("exchange.declare"));
}

#[test]
fn test_default_exchange_is_not_declarable() {
    let (connection, inbound, transport) = attach();
    let channel = open_channel(&connection, &inbound);

    let err = channel
        .exchange_declare(ExchangeDeclareArguments::new("", "direct"))
        .unwrap_err();
    assert!(matches!(err, Error::InvalidDeclaration(_)));
    assert_eq!(0, transport.count("exchange.declare"));
}
