use self::error::Error;
pub(crate) type Result<T> = std::result::Result<T, Error>;

/////////////////////////////////////////////////////////////////////////////
pub mod channel;
pub mod completion;
pub mod connection;
pub mod consumer;
pub mod error;
