use bytes::{ByteOrder, BytesMut};

use nom::{be_i16, be_i32};

use errors::Result;
use protocol::{ApiKeys, Encodable, ErrorCode, NodeId, PartitionId, RequestHeader, WriteExt,
               parse_string};

/// MetadataRequest => [TopicName]
///
/// An empty topic list asks for metadata of every topic the cluster knows.
#[derive(Clone, Debug, PartialEq)]
pub struct MetadataRequest {
    pub header: RequestHeader,
    pub topic_names: Vec<String>,
}

impl MetadataRequest {
    pub fn new<S: AsRef<str>>(client_id: Option<String>, topic_names: &[S]) -> Self {
        MetadataRequest {
            header: RequestHeader::new(ApiKeys::Metadata.key(), client_id),
            topic_names: topic_names.iter().map(|s| s.as_ref().to_owned()).collect(),
        }
    }
}

impl Encodable for MetadataRequest {
    fn encode<T: ByteOrder>(&self, dst: &mut BytesMut) -> Result<()> {
        self.header.encode::<T>(dst)?;

        dst.put_array::<T, _, _>(&self.topic_names, |buf, topic_name| {
            buf.put_str::<T, String>(Some(topic_name))
        })
    }
}

/// MetadataResponse => [Broker] [TopicMetadata]
#[derive(Clone, Debug, PartialEq)]
pub struct MetadataResponse {
    pub brokers: Vec<BrokerMetadata>,
    pub topics: Vec<TopicMetadata>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BrokerMetadata {
    pub node_id: NodeId,
    pub host: String,
    pub port: i32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TopicMetadata {
    pub error_code: ErrorCode,
    pub topic_name: String,
    pub partitions: Vec<PartitionMetadata>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PartitionMetadata {
    pub error_code: ErrorCode,
    pub partition_id: PartitionId,
    /// Node id of the leader, `-1` while a leader election is in progress.
    pub leader: NodeId,
    pub replicas: Vec<NodeId>,
    pub isr: Vec<NodeId>,
}

named!(pub parse_metadata_response<MetadataResponse>,
    do_parse!(
        brokers: length_count!(be_i32, parse_broker_metadata)
     >> topics: length_count!(be_i32, parse_topic_metadata)
     >> (MetadataResponse {
            brokers: brokers,
            topics: topics,
        })
    )
);

named!(parse_broker_metadata<BrokerMetadata>,
    do_parse!(
        node_id: be_i32
     >> host: parse_string
     >> port: be_i32
     >> (BrokerMetadata {
            node_id: node_id,
            host: host,
            port: port,
        })
    )
);

named!(parse_topic_metadata<TopicMetadata>,
    do_parse!(
        error_code: be_i16
     >> topic_name: parse_string
     >> partitions: length_count!(be_i32, parse_partition_metadata)
     >> (TopicMetadata {
            error_code: error_code,
            topic_name: topic_name,
            partitions: partitions,
        })
    )
);

named!(parse_partition_metadata<PartitionMetadata>,
    do_parse!(
        error_code: be_i16
     >> partition_id: be_i32
     >> leader: be_i32
     >> replicas: length_count!(be_i32, be_i32)
     >> isr: length_count!(be_i32, be_i32)
     >> (PartitionMetadata {
            error_code: error_code,
            partition_id: partition_id,
            leader: leader,
            replicas: replicas,
            isr: isr,
        })
    )
);

#[cfg(test)]
mod tests {
    use bytes::BigEndian;

    use nom::IResult;

    use super::*;

    #[test]
    fn test_encode_metadata_request_without_topics() {
        let mut request = MetadataRequest::new::<String>(Some("foo".to_owned()), &[]);
        request.header.correlation_id = 1;

        let mut buf = BytesMut::with_capacity(64);

        request.encode::<BigEndian>(&mut buf).unwrap();

        assert_eq!(&buf[..],
                   &[0, 3,                  // api_key
                     0, 0,                  // api_version
                     0, 0, 0, 1,            // correlation_id
                     0, 3, b'f', b'o', b'o', // client_id
                     0, 0, 0, 0             /* topics */][..]);
    }

    #[test]
    fn test_encode_metadata_request_with_topics() {
        let mut request =
            MetadataRequest::new(Some("foo".to_owned()), &["bar", "baz", "food"]);
        request.header.correlation_id = 1;

        let mut buf = BytesMut::with_capacity(64);

        request.encode::<BigEndian>(&mut buf).unwrap();

        assert_eq!(&buf[..],
                   &[0, 3,
                     0, 0,
                     0, 0, 0, 1,
                     0, 3, b'f', b'o', b'o',
                     0, 0, 0, 3,            // topics
                     0, 3, b'b', b'a', b'r',
                     0, 3, b'b', b'a', b'z',
                     0, 4, b'f', b'o', b'o', b'd'][..]);
    }

    #[test]
    fn test_parse_metadata_response() {
        let data = vec![
            // brokers: [BrokerMetadata]
            0, 0, 0, 1,
                0, 0, 0, 1,                         // node_id
                0, 9, b'l', b'o', b'c', b'a', b'l', b'h', b'o', b's', b't', // host
                0, 0, 35, 132,                      // port
            // topics: [TopicMetadata]
            0, 0, 0, 1,
                0, 0,                               // error_code
                0, 3, b'b', b'a', b'r',             // topic_name
                // partitions: [PartitionMetadata]
                0, 0, 0, 1,
                    0, 0,                           // error_code
                    0, 0, 0, 0,                     // partition_id
                    0, 0, 0, 1,                     // leader
                    0, 0, 0, 2, 0, 0, 0, 1, 0, 0, 0, 2, // replicas
                    0, 0, 0, 1, 0, 0, 0, 1,         // isr
        ];

        let response = MetadataResponse {
            brokers: vec![BrokerMetadata {
                              node_id: 1,
                              host: "localhost".to_owned(),
                              port: 9092,
                          }],
            topics: vec![TopicMetadata {
                             error_code: 0,
                             topic_name: "bar".to_owned(),
                             partitions: vec![PartitionMetadata {
                                                  error_code: 0,
                                                  partition_id: 0,
                                                  leader: 1,
                                                  replicas: vec![1, 2],
                                                  isr: vec![1],
                                              }],
                         }],
        };

        assert_eq!(parse_metadata_response(&data[..]),
                   IResult::Done(&b""[..], response));
    }
}
