use bytes::{BufMut, ByteOrder, BytesMut};

use nom::{be_i16, be_i32, be_i64};

use errors::Result;
use protocol::{ApiKeys, Encodable, ErrorCode, MessageSet, Offset, PartitionId, RequestHeader,
               WriteExt, parse_string};

/// ProduceRequest => RequiredAcks Timeout [TopicData]
#[derive(Clone, Debug, PartialEq)]
pub struct ProduceRequest {
    pub header: RequestHeader,
    pub required_acks: i16,
    pub ack_timeout: i32,
    pub topics: Vec<ProduceTopicData>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ProduceTopicData {
    pub topic_name: String,
    pub partitions: Vec<ProducePartitionData>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ProducePartitionData {
    pub partition: PartitionId,
    pub message_set: MessageSet,
}

impl ProduceRequest {
    pub fn new(client_id: Option<String>,
               required_acks: i16,
               ack_timeout: i32,
               topics: Vec<ProduceTopicData>)
               -> Self {
        ProduceRequest {
            header: RequestHeader::new(ApiKeys::Produce.key(), client_id),
            required_acks: required_acks,
            ack_timeout: ack_timeout,
            topics: topics,
        }
    }

    /// A produce request with `required_acks == 0` is answered by silence.
    pub fn expects_response(&self) -> bool {
        self.required_acks != 0
    }
}

impl Encodable for ProduceRequest {
    fn encode<T: ByteOrder>(&self, dst: &mut BytesMut) -> Result<()> {
        self.header.encode::<T>(dst)?;

        dst.put_i16::<T>(self.required_acks);
        dst.put_i32::<T>(self.ack_timeout);
        dst.put_array::<T, _, _>(&self.topics, |buf, topic| {
            buf.put_str::<T, String>(Some(&topic.topic_name))?;
            buf.put_array::<T, _, _>(&topic.partitions, |buf, partition| {
                buf.put_i32::<T>(partition.partition);

                // the message set is sized in bytes, not element count
                let size_off = buf.len();
                buf.put_i32::<T>(0);
                partition.message_set.encode::<T>(buf)?;
                let size = buf.len() - size_off - 4;
                T::write_i32(&mut buf[size_off..], size as i32);

                Ok(())
            })
        })
    }
}

/// ProduceResponse => [TopicStatus]
#[derive(Clone, Debug, PartialEq)]
pub struct ProduceResponse {
    pub topics: Vec<ProduceTopicStatus>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ProduceTopicStatus {
    pub topic_name: String,
    pub partitions: Vec<ProducePartitionStatus>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ProducePartitionStatus {
    pub partition: PartitionId,
    pub error_code: ErrorCode,
    /// Offset assigned to the first message in the produced set.
    pub offset: Offset,
}

named!(pub parse_produce_response<ProduceResponse>,
    do_parse!(
        topics: length_count!(be_i32, parse_produce_topic_status)
     >> (ProduceResponse {
            topics: topics,
        })
    )
);

named!(parse_produce_topic_status<ProduceTopicStatus>,
    do_parse!(
        topic_name: parse_string
     >> partitions: length_count!(be_i32, parse_produce_partition_status)
     >> (ProduceTopicStatus {
            topic_name: topic_name,
            partitions: partitions,
        })
    )
);

named!(parse_produce_partition_status<ProducePartitionStatus>,
    do_parse!(
        partition: be_i32
     >> error_code: be_i16
     >> offset: be_i64
     >> (ProducePartitionStatus {
            partition: partition,
            error_code: error_code,
            offset: offset,
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
            0, 0,                               // api_key
            0, 0,                               // api_version
            0, 0, 0, 123,                       // correlation_id
            0, 6, 99, 108, 105, 101, 110, 116,  // client_id
            0, 1,                               // required_acks
            0, 0, 0, 123,                       // ack_timeout
            // topics: [ProduceTopicData]
            0, 0, 0, 1,
                0, 5, b't', b'o', b'p', b'i', b'c', // topic_name
                // partitions: [ProducePartitionData]
                0, 0, 0, 1,
                    0, 0, 0, 1,                 // partition
                    0, 0, 0, 34,                // message_set_size
                    // MessageSet
                    0, 0, 0, 0, 0, 0, 0, 0,     // offset
                    0, 0, 0, 22,                // size
                    35, 86, 193, 55,            // crc
                    0,                          // magic
                    0,                          // attributes
                    0, 0, 0, 3, 107, 101, 121,  // key
                    0, 0, 0, 5, 118, 97, 108, 117, 101, // value
        ];

        static ref TEST_RESPONSE_DATA: Vec<u8> = vec![
            // topics: [ProduceTopicStatus]
            0, 0, 0, 1,
                0, 5, b't', b'o', b'p', b'i', b'c', // topic_name
                // partitions: [ProducePartitionStatus]
                0, 0, 0, 1,
                    0, 0, 0, 1,                 // partition
                    0, 2,                       // error_code
                    0, 0, 0, 0, 0, 0, 0, 3,     // offset
        ];

        static ref TEST_RESPONSE: ProduceResponse = ProduceResponse {
            topics: vec![ProduceTopicStatus {
                             topic_name: "topic".to_owned(),
                             partitions: vec![ProducePartitionStatus {
                                                  partition: 1,
                                                  error_code: 2,
                                                  offset: 3,
                                              }],
                         }],
        };
    }

    #[test]
    fn test_encode_produce_request() {
        let mut request = ProduceRequest::new(
            Some("client".to_owned()),
            1,
            123,
            vec![ProduceTopicData {
                     topic_name: "topic".to_owned(),
                     partitions: vec![ProducePartitionData {
                                          partition: 1,
                                          message_set: MessageSet {
                                              messages: vec![
                                                  Message::new(Some(Bytes::from(&b"key"[..])),
                                                               Some(Bytes::from(&b"value"[..]))),
                                              ],
                                          },
                                      }],
                 }]);
        request.header.correlation_id = 123;

        let mut buf = BytesMut::with_capacity(128);

        request.encode::<BigEndian>(&mut buf).unwrap();

        assert_eq!(&buf[..], &TEST_REQUEST_DATA[..]);
    }

    #[test]
    fn test_expects_response() {
        let request = ProduceRequest::new(None, 0, 100, Vec::new());
        assert!(!request.expects_response());

        let request = ProduceRequest::new(None, -1, 100, Vec::new());
        assert!(request.expects_response());
    }

    #[test]
    fn test_parse_produce_response() {
        assert_eq!(parse_produce_response(TEST_RESPONSE_DATA.as_slice()),
                   IResult::Done(&b""[..], TEST_RESPONSE.clone()));
    }
}
