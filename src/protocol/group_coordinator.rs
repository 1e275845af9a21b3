use bytes::{ByteOrder, BytesMut};

use nom::{be_i16, be_i32};

use errors::Result;
use protocol::{ApiKeys, Encodable, ErrorCode, NodeId, RequestHeader, WriteExt, parse_string};

/// ConsumerMetadataRequest => ConsumerGroup
///
/// Answered by any broker; locates the coordinator that hosts offsets and
/// group state for the group.
#[derive(Clone, Debug, PartialEq)]
pub struct GroupCoordinatorRequest {
    pub header: RequestHeader,
    pub group_id: String,
}

impl GroupCoordinatorRequest {
    pub fn new(client_id: Option<String>, group_id: String) -> Self {
        GroupCoordinatorRequest {
            header: RequestHeader::new(ApiKeys::GroupCoordinator.key(), client_id),
            group_id: group_id,
        }
    }
}

impl Encodable for GroupCoordinatorRequest {
    fn encode<T: ByteOrder>(&self, dst: &mut BytesMut) -> Result<()> {
        self.header.encode::<T>(dst)?;

        dst.put_str::<T, String>(Some(&self.group_id))
    }
}

/// ConsumerMetadataResponse => ErrorCode CoordinatorId CoordinatorHost CoordinatorPort
#[derive(Clone, Debug, PartialEq)]
pub struct GroupCoordinatorResponse {
    pub error_code: ErrorCode,
    pub coordinator_id: NodeId,
    pub coordinator_host: String,
    pub coordinator_port: i32,
}

named!(pub parse_group_coordinator_response<GroupCoordinatorResponse>,
    do_parse!(
        error_code: be_i16
     >> coordinator_id: be_i32
     >> coordinator_host: parse_string
     >> coordinator_port: be_i32
     >> (GroupCoordinatorResponse {
            error_code: error_code,
            coordinator_id: coordinator_id,
            coordinator_host: coordinator_host,
            coordinator_port: coordinator_port,
        })
    )
);

#[cfg(test)]
mod tests {
    use bytes::BigEndian;

    use nom::IResult;

    use super::*;

    #[test]
    fn test_encode_group_coordinator_request() {
        let mut request =
            GroupCoordinatorRequest::new(Some("foo".to_owned()), "we".to_owned());
        request.header.correlation_id = 1;

        let mut buf = BytesMut::with_capacity(64);

        request.encode::<BigEndian>(&mut buf).unwrap();

        assert_eq!(&buf[..],
                   &[0, 10,                     // api_key
                     0, 0,                      // api_version
                     0, 0, 0, 1,                // correlation_id
                     0, 3, b'f', b'o', b'o',    // client_id
                     0, 2, b'w', b'e'           /* group_id */][..]);
    }

    #[test]
    fn test_parse_group_coordinator_response() {
        let data = vec![
            0, 0,                               // error_code
            0, 0, 0x9C, 0x41,                   // coordinator_id
            0, 14, b'1', b'9', b'2', b'.', b'1', b'6', b'8', b'.',
                   b'5', b'9', b'.', b'1', b'0', b'3', // coordinator_host
            0, 0, 0xC0, 0x06,                   // coordinator_port
        ];

        let response = GroupCoordinatorResponse {
            error_code: 0,
            coordinator_id: 40001,
            coordinator_host: "192.168.59.103".to_owned(),
            coordinator_port: 49158,
        };

        assert_eq!(parse_group_coordinator_response(&data[..]),
                   IResult::Done(&b""[..], response));
    }
}
