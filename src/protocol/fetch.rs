use bytes::{BufMut, ByteOrder, BytesMut};

use nom::{be_i16, be_i32, be_i64};

use errors::Result;
use protocol::{ApiKeys, Encodable, ErrorCode, MessageSet, Offset, PartitionId, RequestHeader,
               WriteExt, parse_message_set, parse_string};

/// The replica id of an ordinary consumer.
const CONSUMER_REPLICA_ID: i32 = -1;

/// FetchRequest => ReplicaId MaxWaitTime MinBytes [FetchTopic]
#[derive(Clone, Debug, PartialEq)]
pub struct FetchRequest {
    pub header: RequestHeader,
    /// Node id of the replica initiating this request; `-1` for consumers.
    pub replica_id: i32,
    /// How long the broker may block when less than `min_bytes` is available.
    pub max_wait_time: i32,
    /// The minimum number of bytes that must be available for a response.
    pub min_bytes: i32,
    pub topics: Vec<FetchTopic>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FetchTopic {
    pub topic_name: String,
    pub partitions: Vec<FetchPartition>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FetchPartition {
    pub partition: PartitionId,
    /// The offset to begin this fetch from.
    pub fetch_offset: Offset,
    /// The maximum bytes to include in the message set for this partition.
    pub max_bytes: i32,
}

impl FetchRequest {
    pub fn new(client_id: Option<String>,
               max_wait_time: i32,
               min_bytes: i32,
               topics: Vec<FetchTopic>)
               -> Self {
        FetchRequest {
            header: RequestHeader::new(ApiKeys::Fetch.key(), client_id),
            replica_id: CONSUMER_REPLICA_ID,
            max_wait_time: max_wait_time,
            min_bytes: min_bytes,
            topics: topics,
        }
    }
}

impl Encodable for FetchRequest {
    fn encode<T: ByteOrder>(&self, dst: &mut BytesMut) -> Result<()> {
        self.header.encode::<T>(dst)?;

        dst.put_i32::<T>(self.replica_id);
        dst.put_i32::<T>(self.max_wait_time);
        dst.put_i32::<T>(self.min_bytes);
        dst.put_array::<T, _, _>(&self.topics, |buf, topic| {
            buf.put_str::<T, String>(Some(&topic.topic_name))?;
            buf.put_array::<T, _, _>(&topic.partitions, |buf, partition| {
                buf.put_i32::<T>(partition.partition);
                buf.put_i64::<T>(partition.fetch_offset);
                buf.put_i32::<T>(partition.max_bytes);
                Ok(())
            })
        })
    }
}

/// FetchResponse => [FetchTopicData]
#[derive(Clone, Debug, PartialEq)]
pub struct FetchResponse {
    pub topics: Vec<FetchTopicData>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FetchTopicData {
    pub topic_name: String,
    pub partitions: Vec<FetchPartitionData>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FetchPartitionData {
    pub partition: PartitionId,
    pub error_code: ErrorCode,
    /// The offset at the end of the log for this partition.
    pub highwater_mark_offset: Offset,
    pub message_set: MessageSet,
}

named!(pub parse_fetch_response<FetchResponse>,
    do_parse!(
        topics: length_count!(be_i32, parse_fetch_topic_data)
     >> (FetchResponse {
            topics: topics,
        })
    )
);

named!(parse_fetch_topic_data<FetchTopicData>,
    do_parse!(
        topic_name: parse_string
     >> partitions: length_count!(be_i32, parse_fetch_partition_data)
     >> (FetchTopicData {
            topic_name: topic_name,
            partitions: partitions,
        })
    )
);

named!(parse_fetch_partition_data<FetchPartitionData>,
    do_parse!(
        partition: be_i32
     >> error_code: be_i16
     >> offset: be_i64
     >> message_set: length_value!(be_i32, call!(parse_message_set))
     >> (FetchPartitionData {
            partition: partition,
            error_code: error_code,
            highwater_mark_offset: offset,
            message_set: message_set,
        })
    )
);

#[cfg(test)]
mod tests {
    use bytes::{BigEndian, Bytes};

    use nom::IResult;

    use super::*;
    use protocol::Message;

    lazy_static! {
        static ref TEST_REQUEST_DATA: Vec<u8> = vec![
            // RequestHeader
            0, 1,                               // api_key
            0, 0,                               // api_version
            0, 0, 0, 123,                       // correlation_id
            0, 6, 99, 108, 105, 101, 110, 116,  // client_id
            255, 255, 255, 255,                 // replica_id
            0, 0, 1, 244,                       // max_wait_time
            0, 0, 0, 1,                         // min_bytes
            // topics: [FetchTopic]
            0, 0, 0, 1,
                0, 5, b't', b'o', b'p', b'i', b'c', // topic_name
                // partitions: [FetchPartition]
                0, 0, 0, 1,
                    0, 0, 0, 5,                 // partition
                    0, 0, 0, 0, 0, 0, 1, 0,     // fetch_offset
                    0, 16, 0, 0,                // max_bytes
        ];

        static ref TEST_RESPONSE_DATA: Vec<u8> = vec![
            // topics: [FetchTopicData]
            0, 0, 0, 1,
                0, 5, b't', b'o', b'p', b'i', b'c', // topic_name
                // partitions: [FetchPartitionData]
                0, 0, 0, 1,
                    0, 0, 0, 5,                 // partition
                    0, 0,                       // error_code
                    0, 0, 0, 0, 0, 0, 1, 2,     // highwater_mark_offset
                    0, 0, 0, 34,                // message_set_size
                    // MessageSet
                    0, 0, 0, 0, 0, 0, 1, 0,     // offset
                    0, 0, 0, 22,                // size
                    35, 86, 193, 55,            // crc
                    0,                          // magic
                    0,                          // attributes
                    0, 0, 0, 3, 107, 101, 121,  // key
                    0, 0, 0, 5, 118, 97, 108, 117, 101, // value
        ];
    }

    #[test]
    fn test_encode_fetch_request() {
        let mut request = FetchRequest::new(
            Some("client".to_owned()),
            500,
            1,
            vec![FetchTopic {
                     topic_name: "topic".to_owned(),
                     partitions: vec![FetchPartition {
                                          partition: 5,
                                          fetch_offset: 256,
                                          max_bytes: 1024 * 1024,
                                      }],
                 }]);
        request.header.correlation_id = 123;

        let mut buf = BytesMut::with_capacity(128);

        request.encode::<BigEndian>(&mut buf).unwrap();

        assert_eq!(&buf[..], &TEST_REQUEST_DATA[..]);
    }

    #[test]
    fn test_parse_fetch_response() {
        let response = match parse_fetch_response(TEST_RESPONSE_DATA.as_slice()) {
            IResult::Done(remaining, response) => {
                assert_eq!(remaining.len(), 0);
                response
            }
            result => panic!("unexpected result: {:?}", result),
        };

        assert_eq!(response.topics.len(), 1);

        let partition = &response.topics[0].partitions[0];

        assert_eq!(partition.partition, 5);
        assert_eq!(partition.error_code, 0);
        assert_eq!(partition.highwater_mark_offset, 258);
        assert_eq!(partition.message_set.messages,
                   vec![Message {
                            offset: 256,
                            compression: ::compression::Compression::None,
                            key: Some(Bytes::from(&b"key"[..])),
                            value: Some(Bytes::from(&b"value"[..])),
                        }]);
    }
}
