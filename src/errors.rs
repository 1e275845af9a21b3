use client::BrokerRef;
use protocol::{ApiKeys, KafkaCode, Offset, PartitionId};

error_chain! {
    foreign_links {
        IoError(::std::io::Error);
        ParseError(::nom::ErrorKind);
    }

    errors {
        /// The codec could not encode a request or decode a response frame.
        CodecError(reason: &'static str) {
            description("codec error")
            display("codec error, {}", reason)
        }
        /// A response arrived whose API does not match the request that produced it.
        UnexpectedResponse(api_key: ApiKeys) {
            description("unexpected response")
            display("unexpected {:?} response", api_key)
        }
        /// A protocol-level error code reported by a broker.
        KafkaError(code: KafkaCode) {
            description("kafka error")
            display("kafka error, {:?}", code)
        }
        /// The peer closed the connection while requests were pending.
        ConnectionClosed {
            description("connection closed")
        }
        TimedOut {
            description("request timed out")
        }
        LeaderNotAvailable(topic_name: String, partition: PartitionId) {
            description("leader not available")
            display("no leader available for `{}#{}`", topic_name, partition)
        }
        BrokerNotFound(broker: BrokerRef) {
            description("broker not found")
            display("broker #{} not found in metadata", broker.index())
        }
        RetriesExhausted(topic_name: String, partition: PartitionId) {
            description("retries exhausted")
            display("gave up retrying `{}#{}`", topic_name, partition)
        }
        /// The coordination store failed or rejected an operation.
        CoordinationError(reason: String) {
            description("coordination error")
            display("coordination error, {}", reason)
        }
        /// The coordination-store session expired, or a held lock was taken away.
        LockLost {
            description("lock lost")
        }
        OffsetOutOfRange(partition: PartitionId, requested: Offset) {
            description("offset out of range")
            display("offset {} out of range for partition {}", requested, partition)
        }
        Canceled(reason: &'static str) {
            description("canceled")
            display("canceled, {}", reason)
        }
        UnsupportedPartitioner(name: String) {
            description("unsupported partitioner")
            display("unsupported partitioner `{}`", name)
        }
        Internal(reason: String) {
            description("internal error")
            display("internal error, {}", reason)
        }
    }
}

impl Error {
    /// Whether the operation that produced this error may be retried as-is.
    pub fn is_retriable(&self) -> bool {
        match *self.kind() {
            ErrorKind::KafkaError(code) => code.is_retriable(),
            ErrorKind::ConnectionClosed | ErrorKind::TimedOut => true,
            _ => false,
        }
    }
}

impl From<KafkaCode> for Error {
    fn from(code: KafkaCode) -> Self {
        ErrorKind::KafkaError(code).into()
    }
}
