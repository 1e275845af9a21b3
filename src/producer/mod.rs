mod record;
mod partitioner;
mod config;
mod batch;
mod accumulator;
mod sender;
mod producer;
mod builder;

pub use self::record::{ProducerRecord, RecordMetadata};
pub use self::partitioner::{Murmur2Partitioner, Partitioner, XxHashPartitioner, murmur2};
pub use self::config::{DEFAULT_ACK_TIMEOUT_MILLIS, DEFAULT_BATCH_COUNT, DEFAULT_BATCH_SIZE,
                       DEFAULT_LINGER_MILLIS, DEFAULT_MAX_REQUEST_SIZE, ProducerConfig};
pub use self::batch::{ProducerBatch, PushRecord, Thunk};
pub use self::accumulator::RecordAccumulator;
pub use self::sender::Sender;
pub use self::producer::{Flush, KafkaProducer, Producer, SendRecord};
pub use self::builder::ProducerBuilder;
