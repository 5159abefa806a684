use super::FieldTable;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExchangeDeclare {
    pub exchange: String,
    pub typ: String,
    pub passive: bool,
    pub durable: bool,
    pub auto_delete: bool,
    pub internal: bool,
    pub no_wait: bool,
    pub arguments: FieldTable,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExchangeDeclareOk;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExchangeDelete {
    pub exchange: String,
    pub if_unused: bool,
    pub no_wait: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExchangeDeleteOk;
