mod version;
mod config;
mod cluster;
mod metadata;
mod metrics;
mod service;
mod middleware;
mod future;
mod client;
mod builder;

pub use self::version::KafkaVersion;
pub use self::config::{ClientConfig, DEFAULT_MAX_RETRIES, DEFAULT_METADATA_MAX_AGE_MILLIS,
                       DEFAULT_REQUEST_TIMEOUT_MILLIS, DEFAULT_RETRY_BACKOFF_MILLIS,
                       ToMilliseconds};
pub use self::cluster::{Broker, BrokerRef, Cluster, PartitionInfo};
pub use self::metadata::Metadata;
pub use self::metrics::Metrics;
pub use self::service::KafkaService;
pub use self::middleware::{InFlightMiddleware, LogMiddleware, TimeoutMiddleware, WithAddr};
pub use self::future::{StaticBoxFuture, ToStaticBoxFuture};
pub use self::client::{Client, CommitEntry, CommittedOffset, FetchRecords, FetchedOffset,
                       FetchedPartition, GetMetadata, GroupCoordinator, Heartbeat, JoinGroup,
                       JoinedGroup, KafkaClient, ListOffsets, LoadMetadata, OffsetCommit,
                       OffsetFetch, PartitionOffset, ProduceBatch, ProducedPartition};
pub use self::builder::ClientBuilder;
