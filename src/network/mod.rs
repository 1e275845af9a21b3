use std::fmt;

use bytes::{ByteOrder, BytesMut};

use nom::IResult;

use errors::{ErrorKind, Result};
use protocol::{ApiKeys, CorrelationId, Encodable, FetchRequest, FetchResponse,
               GroupCoordinatorRequest, GroupCoordinatorResponse, HeartbeatRequest,
               HeartbeatResponse, JoinGroupRequest, JoinGroupResponse, ListOffsetsRequest,
               ListOffsetsResponse, MetadataRequest, MetadataResponse, OffsetCommitRequest,
               OffsetCommitResponse, OffsetFetchRequest, OffsetFetchResponse, PartitionId,
               ProduceRequest, ProduceResponse, RequestHeader, parse_fetch_response,
               parse_group_coordinator_response, parse_heartbeat_response,
               parse_join_group_response, parse_list_offsets_response, parse_metadata_response,
               parse_offset_commit_response, parse_offset_fetch_response, parse_produce_response,
               parse_response_header};

mod codec;
mod conn;

pub use self::codec::KafkaCodec;
pub use self::conn::{Connection, FutureResponse, ResponseSender};

/// A topic name together with one of its partition ids.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TopicPartition {
    pub topic_name: String,
    pub partition: PartitionId,
}

impl TopicPartition {
    pub fn new<S: Into<String>>(topic_name: S, partition: PartitionId) -> Self {
        TopicPartition {
            topic_name: topic_name.into(),
            partition: partition,
        }
    }
}

impl fmt::Display for TopicPartition {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}#{}", self.topic_name, self.partition)
    }
}

/// Union over every request this client can send.
#[derive(Clone, Debug, PartialEq)]
pub enum KafkaRequest {
    Produce(ProduceRequest),
    Fetch(FetchRequest),
    ListOffsets(ListOffsetsRequest),
    Metadata(MetadataRequest),
    OffsetCommit(OffsetCommitRequest),
    OffsetFetch(OffsetFetchRequest),
    GroupCoordinator(GroupCoordinatorRequest),
    JoinGroup(JoinGroupRequest),
    Heartbeat(HeartbeatRequest),
}

impl KafkaRequest {
    pub fn api_key(&self) -> ApiKeys {
        match *self {
            KafkaRequest::Produce(_) => ApiKeys::Produce,
            KafkaRequest::Fetch(_) => ApiKeys::Fetch,
            KafkaRequest::ListOffsets(_) => ApiKeys::ListOffsets,
            KafkaRequest::Metadata(_) => ApiKeys::Metadata,
            KafkaRequest::OffsetCommit(_) => ApiKeys::OffsetCommit,
            KafkaRequest::OffsetFetch(_) => ApiKeys::OffsetFetch,
            KafkaRequest::GroupCoordinator(_) => ApiKeys::GroupCoordinator,
            KafkaRequest::JoinGroup(_) => ApiKeys::JoinGroup,
            KafkaRequest::Heartbeat(_) => ApiKeys::Heartbeat,
        }
    }

    pub fn header(&self) -> &RequestHeader {
        match *self {
            KafkaRequest::Produce(ref req) => &req.header,
            KafkaRequest::Fetch(ref req) => &req.header,
            KafkaRequest::ListOffsets(ref req) => &req.header,
            KafkaRequest::Metadata(ref req) => &req.header,
            KafkaRequest::OffsetCommit(ref req) => &req.header,
            KafkaRequest::OffsetFetch(ref req) => &req.header,
            KafkaRequest::GroupCoordinator(ref req) => &req.header,
            KafkaRequest::JoinGroup(ref req) => &req.header,
            KafkaRequest::Heartbeat(ref req) => &req.header,
        }
    }

    pub fn header_mut(&mut self) -> &mut RequestHeader {
        match *self {
            KafkaRequest::Produce(ref mut req) => &mut req.header,
            KafkaRequest::Fetch(ref mut req) => &mut req.header,
            KafkaRequest::ListOffsets(ref mut req) => &mut req.header,
            KafkaRequest::Metadata(ref mut req) => &mut req.header,
            KafkaRequest::OffsetCommit(ref mut req) => &mut req.header,
            KafkaRequest::OffsetFetch(ref mut req) => &mut req.header,
            KafkaRequest::GroupCoordinator(ref mut req) => &mut req.header,
            KafkaRequest::JoinGroup(ref mut req) => &mut req.header,
            KafkaRequest::Heartbeat(ref mut req) => &mut req.header,
        }
    }

    /// Whether the broker answers this request at all.
    pub fn has_response(&self) -> bool {
        match *self {
            KafkaRequest::Produce(ref req) => req.expects_response(),
            _ => true,
        }
    }
}

impl Encodable for KafkaRequest {
    fn encode<T: ByteOrder>(&self, dst: &mut BytesMut) -> Result<()> {
        match *self {
            KafkaRequest::Produce(ref req) => req.encode::<T>(dst),
            KafkaRequest::Fetch(ref req) => req.encode::<T>(dst),
            KafkaRequest::ListOffsets(ref req) => req.encode::<T>(dst),
            KafkaRequest::Metadata(ref req) => req.encode::<T>(dst),
            KafkaRequest::OffsetCommit(ref req) => req.encode::<T>(dst),
            KafkaRequest::OffsetFetch(ref req) => req.encode::<T>(dst),
            KafkaRequest::GroupCoordinator(ref req) => req.encode::<T>(dst),
            KafkaRequest::JoinGroup(ref req) => req.encode::<T>(dst),
            KafkaRequest::Heartbeat(ref req) => req.encode::<T>(dst),
        }
    }
}

/// A decoded response together with the correlation id from its header.
#[derive(Clone, Debug, PartialEq)]
pub struct KafkaResponse {
    pub correlation_id: CorrelationId,
    pub body: ResponseBody,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ResponseBody {
    Produce(ProduceResponse),
    Fetch(FetchResponse),
    ListOffsets(ListOffsetsResponse),
    Metadata(MetadataResponse),
    OffsetCommit(OffsetCommitResponse),
    OffsetFetch(OffsetFetchResponse),
    GroupCoordinator(GroupCoordinatorResponse),
    JoinGroup(JoinGroupResponse),
    Heartbeat(HeartbeatResponse),
}

impl ResponseBody {
    pub fn api_key(&self) -> ApiKeys {
        match *self {
            ResponseBody::Produce(_) => ApiKeys::Produce,
            ResponseBody::Fetch(_) => ApiKeys::Fetch,
            ResponseBody::ListOffsets(_) => ApiKeys::ListOffsets,
            ResponseBody::Metadata(_) => ApiKeys::Metadata,
            ResponseBody::OffsetCommit(_) => ApiKeys::OffsetCommit,
            ResponseBody::OffsetFetch(_) => ApiKeys::OffsetFetch,
            ResponseBody::GroupCoordinator(_) => ApiKeys::GroupCoordinator,
            ResponseBody::JoinGroup(_) => ApiKeys::JoinGroup,
            ResponseBody::Heartbeat(_) => ApiKeys::Heartbeat,
        }
    }
}

impl KafkaResponse {
    /// Decodes a response frame, excluding the length word; the request that
    /// carried the same correlation id determines the body layout.
    pub fn parse(api_key: ApiKeys, frame: &[u8]) -> Result<KafkaResponse> {
        let (body, header) = complete(parse_response_header(frame))?;

        let body = match api_key {
            ApiKeys::Produce => {
                ResponseBody::Produce(complete(parse_produce_response(body))?.1)
            }
            ApiKeys::Fetch => ResponseBody::Fetch(complete(parse_fetch_response(body))?.1),
            ApiKeys::ListOffsets => {
                ResponseBody::ListOffsets(complete(parse_list_offsets_response(body))?.1)
            }
            ApiKeys::Metadata => {
                ResponseBody::Metadata(complete(parse_metadata_response(body))?.1)
            }
            ApiKeys::OffsetCommit => {
                ResponseBody::OffsetCommit(complete(parse_offset_commit_response(body))?.1)
            }
            ApiKeys::OffsetFetch => {
                ResponseBody::OffsetFetch(complete(parse_offset_fetch_response(body))?.1)
            }
            ApiKeys::GroupCoordinator => {
                ResponseBody::GroupCoordinator(complete(parse_group_coordinator_response(body))?.1)
            }
            ApiKeys::JoinGroup => {
                ResponseBody::JoinGroup(complete(parse_join_group_response(body))?.1)
            }
            ApiKeys::Heartbeat => {
                ResponseBody::Heartbeat(complete(parse_heartbeat_response(body))?.1)
            }
            _ => bail!(ErrorKind::UnexpectedResponse(api_key)),
        };

        Ok(KafkaResponse {
               correlation_id: header.correlation_id,
               body: body,
           })
    }
}

fn complete<T>(result: IResult<&[u8], T>) -> Result<(&[u8], T)> {
    match result {
        IResult::Done(remaining, value) => Ok((remaining, value)),
        IResult::Incomplete(_) => bail!(ErrorKind::CodecError("truncated response")),
        IResult::Error(err) => Err(err.into()),
    }
}
