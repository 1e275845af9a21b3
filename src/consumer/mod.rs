mod config;
mod handler;
mod assignment;
mod subscriptions;
mod coordinator;
mod fetcher;
mod consumer;
mod builder;

pub use self::config::{ConsumerConfig, DEFAULT_AUTO_COMMIT_INTERVAL_MILLIS,
                       DEFAULT_COMMIT_MESSAGE_INTERVAL, DEFAULT_FETCH_MAX_BYTES,
                       DEFAULT_FETCH_MAX_WAIT_MILLIS, DEFAULT_FETCH_MIN_BYTES,
                       DEFAULT_PAUSE_MILLIS, DEFAULT_SESSION_TIMEOUT_MILLIS, OffsetReset};
pub use self::handler::{ConsumerRecord, ErasedHandler, MessageHandler, RawHandler,
                        RawConsumerRecord, Verdict};
pub use self::assignment::{MemberAssignment, assign_round_robin};
pub use self::subscriptions::Subscriptions;
pub use self::coordinator::{GroupCoordinator, GroupEvent, WorkerContext};
pub use self::consumer::{Consumer, KafkaConsumer, Start, Stop};
pub use self::builder::ConsumerBuilder;
