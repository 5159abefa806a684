//! Per-channel registry of declared exchanges and queues.
//!
//! A name maps to at most one descriptor per entity kind. Redeclaring a
//! known name must repeat the original options exactly; passive declarations
//! are exempt from that check by design and only look the entity up.

use std::fmt;
use std::sync::Arc;

use crate::method::FieldTable;

use super::super::error::{Error, OptionsConflict};
use super::super::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Exchange,
    Queue,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            EntityKind::Exchange => "exchange",
            EntityKind::Queue => "queue",
        })
    }
}

/// Options an exchange is declared with. Structural equality is the
/// redeclaration compatibility rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeOptions {
    pub typ: String,
    pub durable: bool,
    pub auto_delete: bool,
    pub internal: bool,
    pub arguments: FieldTable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueOptions {
    pub durable: bool,
    pub exclusive: bool,
    pub auto_delete: bool,
    pub arguments: FieldTable,
}

/// Descriptor of a declared exchange.
#[derive(Debug)]
pub struct Exchange {
    name: String,
    options: ExchangeOptions,
}

impl Exchange {
    pub(crate) fn new(name: String, options: ExchangeOptions) -> Self {
        Self { name, options }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn typ(&self) -> &str {
        &self.options.typ
    }

    pub fn durable(&self) -> bool {
        self.options.durable
    }

    pub fn auto_delete(&self) -> bool {
        self.options.auto_delete
    }

    pub fn internal(&self) -> bool {
        self.options.internal
    }

    pub fn arguments(&self) -> &FieldTable {
        &self.options.arguments
    }

    pub(crate) fn options(&self) -> &ExchangeOptions {
        &self.options
    }
}

/// Descriptor of a declared queue. Server-named queues get their descriptor
/// only once the assigned name is known from the declare-ok.
#[derive(Debug)]
pub struct Queue {
    name: String,
    options: QueueOptions,
}

impl Queue {
    pub(crate) fn new(name: String, options: QueueOptions) -> Self {
        Self { name, options }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn durable(&self) -> bool {
        self.options.durable
    }

    pub fn exclusive(&self) -> bool {
        self.options.exclusive
    }

    pub fn auto_delete(&self) -> bool {
        self.options.auto_delete
    }

    pub fn arguments(&self) -> &FieldTable {
        &self.options.arguments
    }

    pub(crate) fn options(&self) -> &QueueOptions {
        &self.options
    }
}

/// A registered entity, for diagnostic snapshots.
#[derive(Debug, Clone)]
pub enum Entity {
    Exchange(Arc<Exchange>),
    Queue(Arc<Queue>),
}

impl Entity {
    pub fn kind(&self) -> EntityKind {
        match self {
            Entity::Exchange(_) => EntityKind::Exchange,
            Entity::Queue(_) => EntityKind::Queue,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Entity::Exchange(exchange) => exchange.name(),
            Entity::Queue(queue) => queue.name(),
        }
    }
}

/////////////////////////////////////////////////////////////////////////////
pub(crate) struct EntityRegistry {
    // insertion order is the snapshot order; registries stay small
    entries: Vec<Entity>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self { entries: vec![] }
    }

    pub fn lookup_exchange(&self, name: &str) -> Option<Arc<Exchange>> {
        self.entries.iter().find_map(|entry| match entry {
            Entity::Exchange(exchange) if exchange.name() == name => Some(Arc::clone(exchange)),
            _ => None,
        })
    }

    pub fn lookup_queue(&self, name: &str) -> Option<Arc<Queue>> {
        self.entries.iter().find_map(|entry| match entry {
            Entity::Queue(queue) if queue.name() == name => Some(Arc::clone(queue)),
            _ => None,
        })
    }

    pub fn insert_exchange(&mut self, exchange: Arc<Exchange>) {
        self.entries.push(Entity::Exchange(exchange));
    }

    pub fn insert_queue(&mut self, queue: Arc<Queue>) {
        self.entries.push(Entity::Queue(queue));
    }

    /// Idempotent: removing an unknown name is not an error.
    pub fn remove(&mut self, kind: EntityKind, name: &str) {
        self.entries
            .retain(|entry| entry.kind() != kind || entry.name() != name);
    }

    /// Insertion-ordered snapshot, for introspection only.
    pub fn snapshot(&self) -> Vec<Entity> {
        self.entries.clone()
    }
}

/////////////////////////////////////////////////////////////////////////////
pub(crate) fn check_exchange_compatible(
    name: &str,
    existing: &ExchangeOptions,
    requested: &ExchangeOptions,
) -> Result<()> {
    if existing == requested {
        Ok(())
    } else {
        Err(Error::IncompatibleOptions(OptionsConflict {
            kind: EntityKind::Exchange,
            name: name.to_owned(),
            existing: format!("{:?}", existing),
            requested: format!("{:?}", requested),
        }))
    }
}

pub(crate) fn check_queue_compatible(
    name: &str,
    existing: &QueueOptions,
    requested: &QueueOptions,
) -> Result<()> {
    if existing == requested {
        Ok(())
    } else {
        Err(Error::IncompatibleOptions(OptionsConflict {
            kind: EntityKind::Queue,
            name: name.to_owned(),
            existing: format!("{:?}", existing),
            requested: format!("{:?}", requested),
        }))
    }
}

/////////////////////////////////////////////////////////////////////////////
#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::method::FieldTable;

    use super::{
        check_queue_compatible, EntityKind, EntityRegistry, Exchange, ExchangeOptions, Queue,
        QueueOptions,
    };

    fn exchange_options() -> ExchangeOptions {
        ExchangeOptions {
            typ: "topic".to_string(),
            durable: true,
            auto_delete: false,
            internal: false,
            arguments: FieldTable::new(),
        }
    }

    fn queue_options() -> QueueOptions {
        QueueOptions {
            durable: false,
            exclusive: false,
            auto_delete: true,
            arguments: FieldTable::new(),
        }
    }

    #[test]
    fn test_lookup_is_per_kind() {
        let mut registry = EntityRegistry::new();
        registry.insert_exchange(Arc::new(Exchange::new("orders".into(), exchange_options())));

        assert_eq!(true, registry.lookup_exchange("orders").is_some());
        assert_eq!(true, registry.lookup_queue("orders").is_none());
    }

    #[test]
    fn test_remove_is_idempotent() {
        let mut registry = EntityRegistry::new();
        registry.insert_queue(Arc::new(Queue::new("jobs".into(), queue_options())));

        registry.remove(EntityKind::Queue, "jobs");
        assert_eq!(true, registry.lookup_queue("jobs").is_none());
        // second removal is a no-op
        registry.remove(EntityKind::Queue, "jobs");
        registry.remove(EntityKind::Exchange, "never-declared");
    }

    #[test]
    fn test_snapshot_keeps_insertion_order() {
        let mut registry = EntityRegistry::new();
        registry.insert_exchange(Arc::new(Exchange::new("e1".into(), exchange_options())));
        registry.insert_queue(Arc::new(Queue::new("q1".into(), queue_options())));
        registry.insert_exchange(Arc::new(Exchange::new("e2".into(), exchange_options())));

        let snapshot = registry.snapshot();
        let names: Vec<String> = snapshot.iter().map(|e| e.name().to_string()).collect();
        assert_eq!(vec!["e1", "q1", "e2"], names);
    }

    #[test]
    fn test_compatibility_is_structural() {
        let existing = queue_options();
        assert_eq!(true, check_queue_compatible("jobs", &existing, &queue_options()).is_ok());

        let mut requested = queue_options();
        requested.durable = true;
        let err = check_queue_compatible("jobs", &existing, &requested).unwrap_err();
        assert_eq!(true, err.to_string().contains("jobs"));
    }
}
