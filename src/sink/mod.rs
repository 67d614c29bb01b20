pub mod cloudwatch;
pub mod memory;
pub mod sigv4;
pub mod traits;

pub use cloudwatch::{CloudWatchClient, CloudWatchConnector};
pub use memory::{MemorySink, PutCall, PutOutcome};
pub use sigv4::Credentials;
pub use traits::{
    InputLogEvent, PutLogEventsRequest, PutLogEventsResponse, RejectedLogEventsInfo, RemoteSink,
    SinkConnector, SinkError,
};
