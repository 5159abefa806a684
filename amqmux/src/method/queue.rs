use super::FieldTable;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QueueDeclare {
    pub queue: String,
    pub passive: bool,
    pub durable: bool,
    pub exclusive: bool,
    pub auto_delete: bool,
    pub no_wait: bool,
    pub arguments: FieldTable,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QueueDeclareOk {
    pub queue: String,
    pub message_count: u32,
    pub consumer_count: u32,
}

impl QueueDeclareOk {
    pub fn new(queue: &str, message_count: u32, consumer_count: u32) -> Self {
        Self {
            queue: queue.to_string(),
            message_count,
            consumer_count,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QueueBind {
    pub queue: String,
    pub exchange: String,
    pub routing_key: String,
    pub no_wait: bool,
    pub arguments: FieldTable,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QueueBindOk;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QueueDelete {
    pub queue: String,
    pub if_unused: bool,
    pub if_empty: bool,
    pub no_wait: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QueueDeleteOk {
    pub message_count: u32,
}
