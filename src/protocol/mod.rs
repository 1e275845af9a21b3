use std::str;

use bytes::{BufMut, ByteOrder, Bytes, BytesMut};

use nom::{be_i16, be_i32};

use errors::Result;

mod header;
mod message;
mod metadata;
mod produce;
mod fetch;
mod list_offsets;
mod offset_commit;
mod offset_fetch;
mod group_coordinator;
mod join_group;
mod heartbeat;

pub use self::header::{RequestHeader, ResponseHeader, parse_response_header};
pub use self::message::{MAGIC_BYTE, Message, MessageSet, parse_message_set};
pub use self::metadata::{BrokerMetadata, MetadataRequest, MetadataResponse, PartitionMetadata,
                         TopicMetadata, parse_metadata_response};
pub use self::produce::{ProducePartitionData, ProducePartitionStatus, ProduceRequest,
                        ProduceResponse, ProduceTopicData, ProduceTopicStatus,
                        parse_produce_response};
pub use self::fetch::{FetchPartition, FetchPartitionData, FetchRequest, FetchResponse, FetchTopic,
                      FetchTopicData, parse_fetch_response};
pub use self::list_offsets::{ListOffsetsPartition, ListOffsetsRequest, ListOffsetsResponse,
                             ListOffsetsTopic, PartitionOffsets, parse_list_offsets_response};
pub use self::offset_commit::{OffsetCommitPartition, OffsetCommitRequest, OffsetCommitResponse,
                              OffsetCommitTopic, parse_offset_commit_response};
pub use self::offset_fetch::{OffsetFetchPartitionStatus, OffsetFetchRequest, OffsetFetchResponse,
                             OffsetFetchTopic, parse_offset_fetch_response};
pub use self::group_coordinator::{GroupCoordinatorRequest, GroupCoordinatorResponse,
                                  parse_group_coordinator_response};
pub use self::join_group::{JoinGroupMember, JoinGroupProtocol, JoinGroupRequest,
                           JoinGroupResponse, parse_join_group_response};
pub use self::heartbeat::{HeartbeatRequest, HeartbeatResponse, parse_heartbeat_response};

pub type ApiKey = i16;
pub type ApiVersion = i16;
pub type CorrelationId = i32;
pub type PartitionId = i32;
pub type NodeId = i32;
pub type Offset = i64;
pub type ErrorCode = i16;
pub type Timestamp = i64;
pub type GenerationId = i32;

/// The numeric codes the ApiKey in a request can take, per request type.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(i16)]
pub enum ApiKeys {
    Produce = 0,
    Fetch = 1,
    ListOffsets = 2,
    Metadata = 3,
    LeaderAndIsr = 4,
    StopReplica = 5,
    UpdateMetadata = 6,
    ControlledShutdown = 7,
    OffsetCommit = 8,
    OffsetFetch = 9,
    GroupCoordinator = 10,
    JoinGroup = 11,
    Heartbeat = 12,
}

impl ApiKeys {
    pub fn key(&self) -> ApiKey {
        *self as ApiKey
    }

    pub fn name(&self) -> &'static str {
        match *self {
            ApiKeys::Produce => "produce",
            ApiKeys::Fetch => "fetch",
            ApiKeys::ListOffsets => "list_offsets",
            ApiKeys::Metadata => "metadata",
            ApiKeys::LeaderAndIsr => "leader_and_isr",
            ApiKeys::StopReplica => "stop_replica",
            ApiKeys::UpdateMetadata => "update_metadata",
            ApiKeys::ControlledShutdown => "controlled_shutdown",
            ApiKeys::OffsetCommit => "offset_commit",
            ApiKeys::OffsetFetch => "offset_fetch",
            ApiKeys::GroupCoordinator => "group_coordinator",
            ApiKeys::JoinGroup => "join_group",
            ApiKeys::Heartbeat => "heartbeat",
        }
    }
}

/// Acknowledgement requirements the broker applies before answering a produce
/// request.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i16)]
pub enum RequiredAcks {
    /// Fire and forget; the broker sends no response at all.
    None = 0,
    /// Wait until the leader has written the messages to its local log.
    One = 1,
    /// Wait until all in-sync replicas have acknowledged the messages.
    All = -1,
}

impl Default for RequiredAcks {
    fn default() -> Self {
        RequiredAcks::One
    }
}

impl From<i16> for RequiredAcks {
    fn from(v: i16) -> Self {
        match v {
            -1 => RequiredAcks::All,
            1 => RequiredAcks::One,
            _ => RequiredAcks::None,
        }
    }
}

/// Errors reported by a remote Kafka broker, per the 0.8.x protocol.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum KafkaCode {
    /// The server experienced an unexpected error when processing the request.
    Unknown,
    None,
    /// The requested offset is outside the range of offsets maintained by the
    /// server for the given topic/partition.
    OffsetOutOfRange,
    /// A message's contents does not match its CRC.
    CorruptMessage,
    /// The request is for a topic or partition that does not exist on this
    /// broker.
    UnknownTopicOrPartition,
    /// The message has a negative size.
    InvalidMessageSize,
    /// A leadership election is in progress and there is currently no leader
    /// for this partition, so it is unavailable for writes.
    LeaderNotAvailable,
    /// The client attempted to send messages to a replica that is not the
    /// leader for the partition; its metadata is out of date.
    NotLeaderForPartition,
    /// The request exceeded the user-specified time limit.
    RequestTimedOut,
    /// Used by tools when a broker is not alive.
    BrokerNotAvailable,
    /// A replica was expected on a broker but is not there.
    ReplicaNotAvailable,
    /// The client attempted to produce a message larger than the broker's
    /// configured maximum.
    MessageSizeTooLarge,
    /// Internal error code for broker-to-broker communication.
    StaleControllerEpoch,
    /// The annotation attached to an offset commit was larger than the broker
    /// allows.
    OffsetMetadataTooLarge,
    /// The broker is still loading offsets after a leader change for the
    /// offsets topic partition.
    OffsetsLoadInProgress,
    /// The offsets topic has not been created yet, or the group coordinator
    /// is not active.
    ConsumerCoordinatorNotAvailable,
    /// The broker received an offset request for a group it does not
    /// coordinate.
    NotCoordinatorForConsumer,
    /// A code this client does not know about; the raw value is logged where
    /// it is first seen.
    Other(ErrorCode),
}

impl KafkaCode {
    pub fn code(&self) -> ErrorCode {
        match *self {
            KafkaCode::Unknown => -1,
            KafkaCode::None => 0,
            KafkaCode::OffsetOutOfRange => 1,
            KafkaCode::CorruptMessage => 2,
            KafkaCode::UnknownTopicOrPartition => 3,
            KafkaCode::InvalidMessageSize => 4,
            KafkaCode::LeaderNotAvailable => 5,
            KafkaCode::NotLeaderForPartition => 6,
            KafkaCode::RequestTimedOut => 7,
            KafkaCode::BrokerNotAvailable => 8,
            KafkaCode::ReplicaNotAvailable => 9,
            KafkaCode::MessageSizeTooLarge => 10,
            KafkaCode::StaleControllerEpoch => 11,
            KafkaCode::OffsetMetadataTooLarge => 12,
            KafkaCode::OffsetsLoadInProgress => 14,
            KafkaCode::ConsumerCoordinatorNotAvailable => 15,
            KafkaCode::NotCoordinatorForConsumer => 16,
            KafkaCode::Other(code) => code,
        }
    }

    /// Whether the failed operation may be retried against the same broker.
    pub fn is_retriable(&self) -> bool {
        match *self {
            KafkaCode::LeaderNotAvailable |
            KafkaCode::NotLeaderForPartition |
            KafkaCode::UnknownTopicOrPartition |
            KafkaCode::RequestTimedOut |
            KafkaCode::OffsetsLoadInProgress |
            KafkaCode::ConsumerCoordinatorNotAvailable |
            KafkaCode::NotCoordinatorForConsumer => true,
            _ => false,
        }
    }

    /// Whether the error indicates stale metadata that a refresh would fix.
    pub fn needs_metadata_refresh(&self) -> bool {
        match *self {
            KafkaCode::LeaderNotAvailable |
            KafkaCode::NotLeaderForPartition |
            KafkaCode::UnknownTopicOrPartition => true,
            _ => false,
        }
    }
}

impl From<ErrorCode> for KafkaCode {
    fn from(code: ErrorCode) -> Self {
        match code {
            -1 => KafkaCode::Unknown,
            0 => KafkaCode::None,
            1 => KafkaCode::OffsetOutOfRange,
            2 => KafkaCode::CorruptMessage,
            3 => KafkaCode::UnknownTopicOrPartition,
            4 => KafkaCode::InvalidMessageSize,
            5 => KafkaCode::LeaderNotAvailable,
            6 => KafkaCode::NotLeaderForPartition,
            7 => KafkaCode::RequestTimedOut,
            8 => KafkaCode::BrokerNotAvailable,
            9 => KafkaCode::ReplicaNotAvailable,
            10 => KafkaCode::MessageSizeTooLarge,
            11 => KafkaCode::StaleControllerEpoch,
            12 => KafkaCode::OffsetMetadataTooLarge,
            14 => KafkaCode::OffsetsLoadInProgress,
            15 => KafkaCode::ConsumerCoordinatorNotAvailable,
            16 => KafkaCode::NotCoordinatorForConsumer,
            _ => KafkaCode::Other(code),
        }
    }
}

/// The position a ListOffsets request asks about.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FetchOffset {
    /// The first offset present in the partition log.
    Earliest,
    /// The offset one past the last committed message.
    Latest,
    /// Offsets of segments written before the given wall-clock time.
    ByTime(Timestamp),
}

impl FetchOffset {
    pub fn at(ts: ::time::Timespec) -> FetchOffset {
        FetchOffset::ByTime(ts.sec * 1000 + i64::from(ts.nsec) / 1_000_000)
    }

    pub fn value(&self) -> i64 {
        match *self {
            FetchOffset::Earliest => -2,
            FetchOffset::Latest => -1,
            FetchOffset::ByTime(ts) => ts,
        }
    }
}

/// A type that can write itself to a buffer in Kafka's wire format.
pub trait Encodable {
    fn encode<T: ByteOrder>(&self, dst: &mut BytesMut) -> Result<()>;
}

/// Wire-format primitives on top of `BufMut`: length-prefixed strings, byte
/// arrays and counted arrays.
pub trait WriteExt: BufMut + Sized {
    fn put_str<T, S>(&mut self, s: Option<&S>) -> Result<()>
        where T: ByteOrder,
              S: AsRef<str> + ?Sized
    {
        match s {
            Some(s) if s.as_ref().len() > i16::max_value() as usize => {
                bail!(::errors::ErrorKind::CodecError("string exceeds the maximum size"))
            }
            Some(s) => {
                self.put_i16::<T>(s.as_ref().len() as i16);
                self.put_slice(s.as_ref().as_bytes());
            }
            None => self.put_i16::<T>(-1),
        }

        Ok(())
    }

    fn put_bytes<T, D>(&mut self, d: Option<&D>) -> Result<()>
        where T: ByteOrder,
              D: AsRef<[u8]> + ?Sized
    {
        match d {
            Some(d) if d.as_ref().len() > i32::max_value() as usize => {
                bail!(::errors::ErrorKind::CodecError("bytes exceed the maximum size"))
            }
            Some(d) => {
                self.put_i32::<T>(d.as_ref().len() as i32);
                self.put_slice(d.as_ref());
            }
            None => self.put_i32::<T>(-1),
        }

        Ok(())
    }

    fn put_array<T, E, F>(&mut self, items: &[E], mut f: F) -> Result<()>
        where T: ByteOrder,
              F: FnMut(&mut Self, &E) -> Result<()>
    {
        if items.len() > i32::max_value() as usize {
            bail!(::errors::ErrorKind::CodecError("array exceeds the maximum size"));
        }

        self.put_i32::<T>(items.len() as i32);

        for item in items {
            f(self, item)?;
        }

        Ok(())
    }
}

impl WriteExt for BytesMut {}

named!(pub parse_opt_string<Option<String>>,
    do_parse!(
        len: be_i16
     >> s: cond!(len >= 0, map!(map_res!(take!(len as usize), str::from_utf8), str::to_owned))
     >> (s)
    )
);

named!(pub parse_string<String>,
    map!(parse_opt_string, Option::unwrap_or_default)
);

named!(pub parse_bytes<Option<Bytes>>,
    do_parse!(
        len: be_i32
     >> d: cond!(len >= 0, map!(take!(len as usize), Bytes::from))
     >> (d)
    )
);

#[cfg(test)]
mod tests {
    use bytes::BigEndian;
    use nom::{IResult, Needed};

    use super::*;

    #[test]
    fn test_parse_opt_string() {
        assert_eq!(parse_opt_string(b"\0"), IResult::Incomplete(Needed::Size(2)));
        assert_eq!(parse_opt_string(b"\xff\xff"), IResult::Done(&b""[..], None));
        assert_eq!(parse_opt_string(b"\0\0"),
                   IResult::Done(&b""[..], Some(String::new())));
        assert_eq!(parse_opt_string(b"\0\x04test"),
                   IResult::Done(&b""[..], Some("test".to_owned())));
    }

    #[test]
    fn test_parse_string() {
        assert_eq!(parse_string(b"\xff\xff"), IResult::Done(&b""[..], String::new()));
        assert_eq!(parse_string(b"\0\x04test"),
                   IResult::Done(&b""[..], "test".to_owned()));
    }

    #[test]
    fn test_parse_bytes() {
        assert_eq!(parse_bytes(b"\0"), IResult::Incomplete(Needed::Size(4)));
        assert_eq!(parse_bytes(b"\xff\xff\xff\xff"), IResult::Done(&b""[..], None));
        assert_eq!(parse_bytes(b"\0\0\0\0"),
                   IResult::Done(&b""[..], Some(Bytes::new())));
        assert_eq!(parse_bytes(b"\0\0\0\x04test"),
                   IResult::Done(&b""[..], Some(Bytes::from(&b"test"[..]))));
    }

    #[test]
    fn test_put_str() {
        let mut buf = BytesMut::with_capacity(16);

        buf.put_str::<BigEndian, str>(Some("foo")).unwrap();
        buf.put_str::<BigEndian, str>(None).unwrap();
        buf.put_str::<BigEndian, str>(Some("")).unwrap();

        assert_eq!(&buf[..], b"\0\x03foo\xff\xff\0\0");
    }

    #[test]
    fn test_put_bytes() {
        let mut buf = BytesMut::with_capacity(16);

        buf.put_bytes::<BigEndian, [u8]>(Some(b"foo")).unwrap();
        buf.put_bytes::<BigEndian, [u8]>(None).unwrap();

        assert_eq!(&buf[..], b"\0\0\0\x03foo\xff\xff\xff\xff");
    }

    #[test]
    fn test_offset_time_encoding() {
        assert_eq!(FetchOffset::Latest.value(), -1);
        assert_eq!(FetchOffset::Earliest.value(), -2);
        // 2020-01-01T00:00:00Z
        assert_eq!(FetchOffset::at(::time::Timespec::new(1_577_836_800, 0)).value(),
                   1_577_836_800_000);
    }

    #[test]
    fn test_error_code_mapping() {
        assert_eq!(KafkaCode::from(0), KafkaCode::None);
        assert_eq!(KafkaCode::from(6), KafkaCode::NotLeaderForPartition);
        assert_eq!(KafkaCode::from(16), KafkaCode::NotCoordinatorForConsumer);
        assert_eq!(KafkaCode::from(127), KafkaCode::Other(127));
        assert_eq!(KafkaCode::Other(127).code(), 127);

        assert!(KafkaCode::NotLeaderForPartition.needs_metadata_refresh());
        assert!(KafkaCode::RequestTimedOut.is_retriable());
        assert!(!KafkaCode::RequestTimedOut.needs_metadata_refresh());
        assert!(!KafkaCode::MessageSizeTooLarge.is_retriable());
    }
}
