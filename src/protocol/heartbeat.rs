use bytes::{BufMut, ByteOrder, BytesMut};

use nom::be_i16;

use errors::Result;
use protocol::{ApiKeys, Encodable, ErrorCode, GenerationId, RequestHeader, WriteExt, parse_string};

/// HeartbeatRequest => GroupId GenerationId MemberId
#[derive(Clone, Debug, PartialEq)]
pub struct HeartbeatRequest {
    pub header: RequestHeader,
    pub group_id: String,
    pub generation_id: GenerationId,
    pub member_id: String,
}

impl HeartbeatRequest {
    pub fn new(client_id: Option<String>,
               group_id: String,
               generation_id: GenerationId,
               member_id: String)
               -> Self {
        HeartbeatRequest {
            header: RequestHeader::new(ApiKeys::Heartbeat.key(), client_id),
            group_id: group_id,
            generation_id: generation_id,
            member_id: member_id,
        }
    }
}

impl Encodable for HeartbeatRequest {
    fn encode<T: ByteOrder>(&self, dst: &mut BytesMut) -> Result<()> {
        self.header.encode::<T>(dst)?;

        dst.put_str::<T, String>(Some(&self.group_id))?;
        dst.put_i32::<T>(self.generation_id);
        dst.put_str::<T, String>(Some(&self.member_id))
    }
}

/// HeartbeatResponse => ErrorCode
#[derive(Clone, Debug, PartialEq)]
pub struct HeartbeatResponse {
    pub error_code: ErrorCode,
}

named!(pub parse_heartbeat_response<HeartbeatResponse>,
    do_parse!(
        error_code: be_i16
     >> (HeartbeatResponse {
            error_code: error_code,
        })
    )
);

#[cfg(test)]
mod tests {
    use bytes::{BigEndian, BytesMut};

    use nom::IResult;

    use super::*;

    #[test]
    fn test_encode_heartbeat_request() {
        let mut request = HeartbeatRequest::new(Some("foo".to_owned()),
                                                "we".to_owned(),
                                                3,
                                                "m1".to_owned());
        request.header.correlation_id = 1;

        let mut buf = BytesMut::with_capacity(64);

        request.encode::<BigEndian>(&mut buf).unwrap();

        assert_eq!(&buf[..],
                   &[0, 12,                     // api_key
                     0, 0,                      // api_version
                     0, 0, 0, 1,                // correlation_id
                     0, 3, b'f', b'o', b'o',    // client_id
                     0, 2, b'w', b'e',          // group_id
                     0, 0, 0, 3,                // generation_id
                     0, 2, b'm', b'1'           /* member_id */][..]);
    }

    #[test]
    fn test_parse_heartbeat_response() {
        assert_eq!(parse_heartbeat_response(&[0, 16]),
                   IResult::Done(&b""[..], HeartbeatResponse { error_code: 16 }));
    }
}
