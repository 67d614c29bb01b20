pub mod cli;
pub mod config;
pub mod delivery;
pub mod format;
pub mod logger;
pub mod sink;

pub use delivery::{DeliveryManager, StreamIdentity};
pub use format::{Formatter, Message};
pub use logger::{setup_logger, Logger, LoggerError, Severity};
