use bytes::{BufMut, ByteOrder, BytesMut};

use nom::{be_i16, be_i32, be_i64};

use errors::Result;
use protocol::{ApiKeys, Encodable, ErrorCode, FetchOffset, Offset, PartitionId, RequestHeader,
               WriteExt, parse_string};

const CONSUMER_REPLICA_ID: i32 = -1;

/// OffsetRequest => ReplicaId [ListOffsetsTopic]
///
/// `time` per partition: `-1` the latest offset, `-2` the earliest, anything
/// else milliseconds since the Unix epoch.
#[derive(Clone, Debug, PartialEq)]
pub struct ListOffsetsRequest {
    pub header: RequestHeader,
    pub replica_id: i32,
    pub topics: Vec<ListOffsetsTopic>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ListOffsetsTopic {
    pub topic_name: String,
    pub partitions: Vec<ListOffsetsPartition>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ListOffsetsPartition {
    pub partition: PartitionId,
    pub time: i64,
    pub max_number_of_offsets: i32,
}

impl ListOffsetsRequest {
    pub fn new(client_id: Option<String>, topics: Vec<ListOffsetsTopic>) -> Self {
        ListOffsetsRequest {
            header: RequestHeader::new(ApiKeys::ListOffsets.key(), client_id),
            replica_id: CONSUMER_REPLICA_ID,
            topics: topics,
        }
    }
}

impl ListOffsetsPartition {
    pub fn new(partition: PartitionId, offset: FetchOffset) -> Self {
        ListOffsetsPartition {
            partition: partition,
            time: offset.value(),
            max_number_of_offsets: 1,
        }
    }
}

impl Encodable for ListOffsetsRequest {
    fn encode<T: ByteOrder>(&self, dst: &mut BytesMut) -> Result<()> {
        self.header.encode::<T>(dst)?;

        dst.put_i32::<T>(self.replica_id);
        dst.put_array::<T, _, _>(&self.topics, |buf, topic| {
            buf.put_str::<T, String>(Some(&topic.topic_name))?;
            buf.put_array::<T, _, _>(&topic.partitions, |buf, partition| {
                buf.put_i32::<T>(partition.partition);
                buf.put_i64::<T>(partition.time);
                buf.put_i32::<T>(partition.max_number_of_offsets);
                Ok(())
            })
        })
    }
}

/// OffsetResponse => [ListOffsetsTopicData]
#[derive(Clone, Debug, PartialEq)]
pub struct ListOffsetsResponse {
    pub topics: Vec<(String, Vec<PartitionOffsets>)>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PartitionOffsets {
    pub partition: PartitionId,
    pub error_code: ErrorCode,
    pub offsets: Vec<Offset>,
}

named!(pub parse_list_offsets_response<ListOffsetsResponse>,
    do_parse!(
        topics: length_count!(be_i32, parse_list_offsets_topic_data)
     >> (ListOffsetsResponse {
            topics: topics,
        })
    )
);

named!(parse_list_offsets_topic_data<(String, Vec<PartitionOffsets>)>,
    do_parse!(
        topic_name: parse_string
     >> partitions: length_count!(be_i32, parse_partition_offsets)
     >> ((topic_name, partitions))
    )
);

named!(parse_partition_offsets<PartitionOffsets>,
    do_parse!(
        partition: be_i32
     >> error_code: be_i16
     >> offsets: length_count!(be_i32, be_i64)
     >> (PartitionOffsets {
            partition: partition,
            error_code: error_code,
            offsets: offsets,
        })
    )
);

#[cfg(test)]
mod tests {
    use bytes::BigEndian;

    use nom::IResult;

    use super::*;

    #[test]
    fn test_encode_list_offsets_request() {
        let mut request = ListOffsetsRequest::new(
            Some("foo".to_owned()),
            vec![ListOffsetsTopic {
                     topic_name: "bar".to_owned(),
                     partitions: vec![ListOffsetsPartition::new(0, FetchOffset::Latest)],
                 }]);
        request.header.correlation_id = 1;

        let mut buf = BytesMut::with_capacity(64);

        request.encode::<BigEndian>(&mut buf).unwrap();

        assert_eq!(&buf[..],
                   &[0, 2,                      // api_key
                     0, 0,                      // api_version
                     0, 0, 0, 1,                // correlation_id
                     0, 3, b'f', b'o', b'o',    // client_id
                     255, 255, 255, 255,        // replica_id
                     0, 0, 0, 1,                // topics
                     0, 3, b'b', b'a', b'r',
                     0, 0, 0, 1,                // partitions
                     0, 0, 0, 0,                // partition
                     255, 255, 255, 255, 255, 255, 255, 255, // time (latest)
                     0, 0, 0, 1                 /* max_number_of_offsets */][..]);
    }

    #[test]
    fn test_encode_earliest_time() {
        let partition = ListOffsetsPartition::new(3, FetchOffset::Earliest);

        assert_eq!(partition.time, -2);
    }

    #[test]
    fn test_parse_list_offsets_response() {
        let data = vec![
            0, 0, 0, 1,                         // topics
            0, 3, b'b', b'a', b'r',             // topic_name
            0, 0, 0, 1,                         // partitions
            0, 0, 0, 0,                         // partition
            0, 0,                               // error_code
            0, 0, 0, 1,                         // offsets
            0, 0, 0, 0, 0, 0, 4, 0,
        ];

        let response = ListOffsetsResponse {
            topics: vec![("bar".to_owned(),
                          vec![PartitionOffsets {
                                   partition: 0,
                                   error_code: 0,
                                   offsets: vec![1024],
                               }])],
        };

        assert_eq!(parse_list_offsets_response(&data[..]),
                   IResult::Done(&b""[..], response));
    }
}
