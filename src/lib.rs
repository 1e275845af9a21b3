#![recursion_limit = "128"]

#![cfg_attr(feature = "clippy", feature(plugin))]
#![cfg_attr(feature = "clippy", plugin(clippy))]

#![allow(dead_code)]

#[macro_use]
extern crate log;
#[macro_use]
extern crate error_chain;
#[macro_use]
extern crate lazy_static;
extern crate bytes;
#[macro_use]
extern crate nom;
extern crate byteorder;
extern crate crc;
extern crate twox_hash;
extern crate time;
extern crate rand;
extern crate hexplay;
extern crate serde;
#[macro_use]
extern crate serde_derive;
extern crate prometheus;

extern crate futures;
extern crate tokio_core;
extern crate tokio_io;
extern crate tokio_service;
extern crate tokio_timer;
extern crate tokio_retry;

#[cfg(test)]
extern crate pretty_env_logger;

pub mod errors;
mod compression;
mod protocol;
mod network;
mod coordination;
mod client;
mod producer;
mod consumer;
mod serialization;
mod supervisor;

pub mod consts {
    pub use client::{DEFAULT_METADATA_MAX_AGE_MILLIS, DEFAULT_REQUEST_TIMEOUT_MILLIS};
    pub use consumer::{DEFAULT_AUTO_COMMIT_INTERVAL_MILLIS, DEFAULT_SESSION_TIMEOUT_MILLIS};
    pub use producer::{DEFAULT_ACK_TIMEOUT_MILLIS, DEFAULT_BATCH_SIZE, DEFAULT_LINGER_MILLIS};
}

pub use errors::{Error, ErrorKind};
pub use compression::Compression;
pub use protocol::{ApiKeys, FetchOffset, KafkaCode, Offset, PartitionId, RequiredAcks};
pub use network::TopicPartition;
pub use coordination::{CoordinationStore, DistributedLock, InMemoryStore, LockStatus, SessionId,
                       SessionStatus, WatchEvent};
pub use client::{Broker, BrokerRef, Client, ClientBuilder, ClientConfig, Cluster, KafkaClient,
                 KafkaVersion, Metadata, PartitionOffset, StaticBoxFuture, ToMilliseconds,
                 ToStaticBoxFuture};
pub use producer::{KafkaProducer, Murmur2Partitioner, Partitioner, Producer, ProducerBuilder,
                   ProducerConfig, ProducerRecord, RecordMetadata, XxHashPartitioner};
pub use consumer::{Consumer, ConsumerBuilder, ConsumerConfig, ConsumerRecord, KafkaConsumer,
                   MessageHandler, OffsetReset, Verdict};
pub use serialization::{BytesDeserializer, BytesSerializer, Deserializer, NoopDeserializer,
                        NoopSerializer, Serializer, StringDeserializer, StringSerializer};
