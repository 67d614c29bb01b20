pub mod clock;
pub mod event;
pub mod manager;
pub mod stats;
mod worker;

pub use clock::{Clock, ManualClock, SystemClock};
pub use event::{default_log_stream_name, Event, StreamIdentity};
pub use manager::{DeliveryError, DeliveryManager};
pub use stats::{DeliveryStats, StatsSnapshot};
pub use worker::WorkerError;
