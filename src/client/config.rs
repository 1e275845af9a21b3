use std::net::SocketAddr;
use std::time::Duration;

use client::KafkaVersion;

/// Default bound on a single request round-trip.
pub const DEFAULT_REQUEST_TIMEOUT_MILLIS: u64 = 5_000;

/// How long a cached metadata view stays fresh before a background refresh.
pub const DEFAULT_METADATA_MAX_AGE_MILLIS: u64 = 60_000;

pub const DEFAULT_MAX_RETRIES: usize = 3;

pub const DEFAULT_RETRY_BACKOFF_MILLIS: u64 = 100;

/// `Duration` predates `as_millis`; every timeout in the public API speaks
/// milliseconds through this.
pub trait ToMilliseconds {
    fn as_millis(&self) -> u64;
}

impl ToMilliseconds for Duration {
    fn as_millis(&self) -> u64 {
        self.as_secs() * 1_000 + u64::from(self.subsec_nanos()) / 1_000_000
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Bootstrap brokers used for metadata discovery.
    pub hosts: Vec<SocketAddr>,

    /// Identifier attached to every request for broker-side logging.
    pub client_id: Option<String>,

    pub broker_version: KafkaVersion,

    /// Request round-trip bound, in milliseconds.
    pub request_timeout: u64,

    /// Metadata refresh period, in milliseconds; `0` disables the periodic
    /// refresh.
    pub metadata_max_age: u64,

    pub max_retries: usize,

    /// Pause before retrying a failed partition batch, in milliseconds.
    pub retry_backoff: u64,

    /// Register prometheus counters for request/response traffic.
    pub metrics: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            hosts: Vec::new(),
            client_id: None,
            broker_version: KafkaVersion::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT_MILLIS,
            metadata_max_age: DEFAULT_METADATA_MAX_AGE_MILLIS,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_backoff: DEFAULT_RETRY_BACKOFF_MILLIS,
            metrics: false,
        }
    }
}

impl ClientConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout)
    }

    pub fn metadata_max_age(&self) -> Duration {
        Duration::from_millis(self.metadata_max_age)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_milliseconds() {
        assert_eq!(ToMilliseconds::as_millis(&Duration::from_secs(2)), 2_000);
        assert_eq!(ToMilliseconds::as_millis(&Duration::new(1, 500_000_000)),
                   1_500);
    }

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();

        assert_eq!(config.request_timeout(), Duration::from_secs(5));
        assert_eq!(config.metadata_max_age(), Duration::from_secs(60));
        assert!(!config.metrics);
    }
}
