use std::time::Duration;

use protocol::RequiredAcks;

/// How long the broker may wait on replica acknowledgement before answering
/// with `RequestTimedOut`.
pub const DEFAULT_ACK_TIMEOUT_MILLIS: u64 = 30_000;

/// How long a batch may linger waiting for company; `0` dispatches on every
/// send.
pub const DEFAULT_LINGER_MILLIS: u64 = 0;

/// Byte size at which a batch stops lingering.
pub const DEFAULT_BATCH_SIZE: usize = 16 * 1024;

/// Message count at which a batch stops lingering.
pub const DEFAULT_BATCH_COUNT: usize = 500;

/// Upper bound on a single serialized record.
pub const DEFAULT_MAX_REQUEST_SIZE: usize = 1024 * 1024;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ProducerConfig {
    pub acks: RequiredAcks,

    /// Broker-side replica wait bound, in milliseconds.
    pub ack_timeout: u64,

    /// Batch linger time, in milliseconds.
    pub linger: u64,

    /// Batch close threshold, in bytes.
    pub batch_size: usize,

    /// Batch close threshold, in messages.
    pub batch_count: usize,

    pub max_request_size: usize,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        ProducerConfig {
            acks: RequiredAcks::default(),
            ack_timeout: DEFAULT_ACK_TIMEOUT_MILLIS,
            linger: DEFAULT_LINGER_MILLIS,
            batch_size: DEFAULT_BATCH_SIZE,
            batch_count: DEFAULT_BATCH_COUNT,
            max_request_size: DEFAULT_MAX_REQUEST_SIZE,
        }
    }
}

impl ProducerConfig {
    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout)
    }

    pub fn linger(&self) -> Duration {
        Duration::from_millis(self.linger)
    }
}
