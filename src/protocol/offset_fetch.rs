use bytes::{BufMut, ByteOrder, BytesMut};

use nom::{be_i16, be_i32, be_i64};

use errors::Result;
use protocol::{ApiKeys, Encodable, ErrorCode, Offset, PartitionId, RequestHeader, WriteExt,
               parse_opt_string, parse_string};

/// OffsetFetchRequest (v0) => ConsumerGroup [OffsetFetchTopic]
///
/// v0 reads offsets from ZooKeeper-era storage on the broker; the coordinator
/// answers `-1` with `UnknownTopicOrPartition` for partitions that have no
/// commit yet.
#[derive(Clone, Debug, PartialEq)]
pub struct OffsetFetchRequest {
    pub header: RequestHeader,
    pub group_id: String,
    pub topics: Vec<OffsetFetchTopic>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct OffsetFetchTopic {
    pub topic_name: String,
    pub partitions: Vec<PartitionId>,
}

impl OffsetFetchRequest {
    pub fn new(client_id: Option<String>, group_id: String, topics: Vec<OffsetFetchTopic>) -> Self {
        OffsetFetchRequest {
            header: RequestHeader::new(ApiKeys::OffsetFetch.key(), client_id),
            group_id: group_id,
            topics: topics,
        }
    }
}

impl Encodable for OffsetFetchRequest {
    fn encode<T: ByteOrder>(&self, dst: &mut BytesMut) -> Result<()> {
        self.header.encode::<T>(dst)?;

        dst.put_str::<T, String>(Some(&self.group_id))?;
        dst.put_array::<T, _, _>(&self.topics, |buf, topic| {
            buf.put_str::<T, String>(Some(&topic.topic_name))?;
            buf.put_array::<T, _, _>(&topic.partitions, |buf, partition| {
                buf.put_i32::<T>(*partition);
                Ok(())
            })
        })
    }
}

/// OffsetFetchResponse => [TopicStatus]
#[derive(Clone, Debug, PartialEq)]
pub struct OffsetFetchResponse {
    pub topics: Vec<(String, Vec<OffsetFetchPartitionStatus>)>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct OffsetFetchPartitionStatus {
    pub partition: PartitionId,
    pub offset: Offset,
    pub metadata: Option<String>,
    pub error_code: ErrorCode,
}

named!(pub parse_offset_fetch_response<OffsetFetchResponse>,
    do_parse!(
        topics: length_count!(be_i32, parse_offset_fetch_topic_status)
     >> (OffsetFetchResponse {
            topics: topics,
        })
    )
);

named!(parse_offset_fetch_topic_status<(String, Vec<OffsetFetchPartitionStatus>)>,
    do_parse!(
        topic_name: parse_string
     >> partitions: length_count!(be_i32, parse_offset_fetch_partition_status)
     >> ((topic_name, partitions))
    )
);

named!(parse_offset_fetch_partition_status<OffsetFetchPartitionStatus>,
    do_parse!(
        partition: be_i32
     >> offset: be_i64
     >> metadata: parse_opt_string
     >> error_code: be_i16
     >> (OffsetFetchPartitionStatus {
            partition: partition,
            offset: offset,
            metadata: metadata,
            error_code: error_code,
        })
    )
);

#[cfg(test)]
mod tests {
    use bytes::BigEndian;

    use nom::IResult;

    use super::*;
    use protocol::KafkaCode;

    #[test]
    fn test_encode_offset_fetch_request() {
        let mut request = OffsetFetchRequest::new(
            Some("foo".to_owned()),
            "we".to_owned(),
            vec![OffsetFetchTopic {
                     topic_name: "bar".to_owned(),
                     partitions: vec![0, 1],
                 }]);
        request.header.correlation_id = 1;

        let mut buf = BytesMut::with_capacity(64);

        request.encode::<BigEndian>(&mut buf).unwrap();

        assert_eq!(&buf[..],
                   &[0, 9,                      // api_key
                     0, 0,                      // api_version
                     0, 0, 0, 1,                // correlation_id
                     0, 3, b'f', b'o', b'o',    // client_id
                     0, 2, b'w', b'e',          // group_id
                     0, 0, 0, 1,                // topics
                     0, 3, b'b', b'a', b'r',
                     0, 0, 0, 2,                // partitions
                     0, 0, 0, 0,
                     0, 0, 0, 1][..]);
    }

    #[test]
    fn test_parse_offset_fetch_response() {
        let data = vec![
            0, 0, 0, 1,                         // topics
            0, 3, b'b', b'a', b'r',             // topic_name
            0, 0, 0, 2,                         // partitions
            0, 0, 0, 0,                         // partition
            0, 0, 0, 0, 0, 0, 2, 1,             // offset
            0, 0,                               // metadata ("")
            0, 0,                               // error_code
            0, 0, 0, 1,                         // partition
            255, 255, 255, 255, 255, 255, 255, 255, // offset (-1, no commit)
            255, 255,                           // metadata (nil)
            0, 3,                               // error_code
        ];

        let response = match parse_offset_fetch_response(&data[..]) {
            IResult::Done(remaining, response) => {
                assert_eq!(remaining.len(), 0);
                response
            }
            result => panic!("unexpected result: {:?}", result),
        };

        let partitions = &response.topics[0].1;

        assert_eq!(partitions[0],
                   OffsetFetchPartitionStatus {
                       partition: 0,
                       offset: 513,
                       metadata: Some(String::new()),
                       error_code: 0,
                   });

        // no commit yet: offset -1 together with UnknownTopicOrPartition
        assert_eq!(partitions[1].offset, -1);
        assert_eq!(KafkaCode::from(partitions[1].error_code),
                   KafkaCode::UnknownTopicOrPartition);
        assert_eq!(partitions[1].metadata, None);
    }
}
