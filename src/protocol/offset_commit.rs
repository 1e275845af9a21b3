use bytes::{BufMut, ByteOrder, BytesMut};

use nom::{be_i16, be_i32, be_i64};

use errors::Result;
use protocol::{ApiKeys, Encodable, ErrorCode, Offset, PartitionId, RequestHeader, WriteExt,
               parse_string};

/// OffsetCommitRequest (v0) => ConsumerGroup [OffsetCommitTopic]
#[derive(Clone, Debug, PartialEq)]
pub struct OffsetCommitRequest {
    pub header: RequestHeader,
    pub group_id: String,
    pub topics: Vec<OffsetCommitTopic>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct OffsetCommitTopic {
    pub topic_name: String,
    pub partitions: Vec<OffsetCommitPartition>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct OffsetCommitPartition {
    pub partition: PartitionId,
    pub offset: Offset,
    /// Caller-supplied annotation stored next to the offset.
    pub metadata: Option<String>,
}

impl OffsetCommitRequest {
    pub fn new(client_id: Option<String>, group_id: String, topics: Vec<OffsetCommitTopic>) -> Self {
        OffsetCommitRequest {
            header: RequestHeader::new(ApiKeys::OffsetCommit.key(), client_id),
            group_id: group_id,
            topics: topics,
        }
    }
}

impl Encodable for OffsetCommitRequest {
    fn encode<T: ByteOrder>(&self, dst: &mut BytesMut) -> Result<()> {
        self.header.encode::<T>(dst)?;

        dst.put_str::<T, String>(Some(&self.group_id))?;
        dst.put_array::<T, _, _>(&self.topics, |buf, topic| {
            buf.put_str::<T, String>(Some(&topic.topic_name))?;
            buf.put_array::<T, _, _>(&topic.partitions, |buf, partition| {
                buf.put_i32::<T>(partition.partition);
                buf.put_i64::<T>(partition.offset);
                buf.put_str::<T, String>(partition.metadata.as_ref())
            })
        })
    }
}

/// OffsetCommitResponse => [TopicStatus]
#[derive(Clone, Debug, PartialEq)]
pub struct OffsetCommitResponse {
    pub topics: Vec<(String, Vec<(PartitionId, ErrorCode)>)>,
}

named!(pub parse_offset_commit_response<OffsetCommitResponse>,
    do_parse!(
        topics: length_count!(be_i32, parse_offset_commit_topic_status)
     >> (OffsetCommitResponse {
            topics: topics,
        })
    )
);

named!(parse_offset_commit_topic_status<(String, Vec<(PartitionId, ErrorCode)>)>,
    do_parse!(
        topic_name: parse_string
     >> partitions: length_count!(be_i32, pair!(be_i32, be_i16))
     >> ((topic_name, partitions))
    )
);

#[cfg(test)]
mod tests {
    use bytes::BigEndian;

    use nom::IResult;

    use super::*;

    #[test]
    fn test_encode_offset_commit_request() {
        let mut request = OffsetCommitRequest::new(
            Some("foo".to_owned()),
            "we".to_owned(),
            vec![OffsetCommitTopic {
                     topic_name: "bar".to_owned(),
                     partitions: vec![OffsetCommitPartition {
                                          partition: 0,
                                          offset: 513,
                                          metadata: None,
                                      }],
                 }]);
        request.header.correlation_id = 1;

        let mut buf = BytesMut::with_capacity(64);

        request.encode::<BigEndian>(&mut buf).unwrap();

        assert_eq!(&buf[..],
                   &[0, 8,                      // api_key
                     0, 0,                      // api_version
                     0, 0, 0, 1,                // correlation_id
                     0, 3, b'f', b'o', b'o',    // client_id
                     0, 2, b'w', b'e',          // group_id
                     0, 0, 0, 1,                // topics
                     0, 3, b'b', b'a', b'r',
                     0, 0, 0, 1,                // partitions
                     0, 0, 0, 0,                // partition
                     0, 0, 0, 0, 0, 0, 2, 1,    // offset
                     255, 255                   /* metadata (nil) */][..]);
    }

    #[test]
    fn test_parse_offset_commit_response() {
        let data = vec![
            0, 0, 0, 1,                         // topics
            0, 3, b'b', b'a', b'r',             // topic_name
            0, 0, 0, 2,                         // partitions
            0, 0, 0, 0,                         // partition
            0, 0,                               // error_code
            0, 0, 0, 1,                         // partition
            0, 16,                              // error_code
        ];

        let response = OffsetCommitResponse {
            topics: vec![("bar".to_owned(), vec![(0, 0), (1, 16)])],
        };

        assert_eq!(parse_offset_commit_response(&data[..]),
                   IResult::Done(&b""[..], response));
    }
}
