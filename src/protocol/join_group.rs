use bytes::{BufMut, ByteOrder, Bytes, BytesMut};

use nom::{be_i16, be_i32};

use errors::Result;
use protocol::{ApiKeys, Encodable, ErrorCode, GenerationId, RequestHeader, WriteExt, parse_bytes,
               parse_string};

/// JoinGroupRequest (v0) => GroupId SessionTimeout MemberId ProtocolType [GroupProtocol]
///
/// Part of Kafka's native group protocol; kept wire-complete so a
/// native-protocol coordinator can be plugged in as an alternative to the
/// external coordination store.
#[derive(Clone, Debug, PartialEq)]
pub struct JoinGroupRequest {
    pub header: RequestHeader,
    pub group_id: String,
    pub session_timeout: i32,
    /// Empty on the first join; assigned by the coordinator afterwards.
    pub member_id: String,
    pub protocol_type: String,
    pub protocols: Vec<JoinGroupProtocol>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct JoinGroupProtocol {
    pub protocol_name: String,
    pub protocol_metadata: Bytes,
}

impl JoinGroupRequest {
    pub fn new(client_id: Option<String>,
               group_id: String,
               session_timeout: i32,
               member_id: String,
               protocol_type: String,
               protocols: Vec<JoinGroupProtocol>)
               -> Self {
        JoinGroupRequest {
            header: RequestHeader::new(ApiKeys::JoinGroup.key(), client_id),
            group_id: group_id,
            session_timeout: session_timeout,
            member_id: member_id,
            protocol_type: protocol_type,
            protocols: protocols,
        }
    }
}

impl Encodable for JoinGroupRequest {
    fn encode<T: ByteOrder>(&self, dst: &mut BytesMut) -> Result<()> {
        self.header.encode::<T>(dst)?;

        dst.put_str::<T, String>(Some(&self.group_id))?;
        dst.put_i32::<T>(self.session_timeout);
        dst.put_str::<T, String>(Some(&self.member_id))?;
        dst.put_str::<T, String>(Some(&self.protocol_type))?;
        dst.put_array::<T, _, _>(&self.protocols, |buf, protocol| {
            buf.put_str::<T, String>(Some(&protocol.protocol_name))?;
            buf.put_bytes::<T, Bytes>(Some(&protocol.protocol_metadata))
        })
    }
}

/// JoinGroupResponse => ErrorCode GenerationId GroupProtocol LeaderId MemberId [Member]
#[derive(Clone, Debug, PartialEq)]
pub struct JoinGroupResponse {
    pub error_code: ErrorCode,
    pub generation_id: GenerationId,
    pub protocol: String,
    pub leader_id: String,
    pub member_id: String,
    /// Filled in only for the elected leader.
    pub members: Vec<JoinGroupMember>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct JoinGroupMember {
    pub member_id: String,
    pub member_metadata: Bytes,
}

named!(pub parse_join_group_response<JoinGroupResponse>,
    do_parse!(
        error_code: be_i16
     >> generation_id: be_i32
     >> protocol: parse_string
     >> leader_id: parse_string
     >> member_id: parse_string
     >> members: length_count!(be_i32, parse_join_group_member)
     >> (JoinGroupResponse {
            error_code: error_code,
            generation_id: generation_id,
            protocol: protocol,
            leader_id: leader_id,
            member_id: member_id,
            members: members,
        })
    )
);

named!(parse_join_group_member<JoinGroupMember>,
    do_parse!(
        member_id: parse_string
     >> metadata: parse_bytes
     >> (JoinGroupMember {
            member_id: member_id,
            member_metadata: metadata.unwrap_or_default(),
        })
    )
);

#[cfg(test)]
mod tests {
    use bytes::BigEndian;

    use nom::IResult;

    use super::*;

    #[test]
    fn test_encode_join_group_request() {
        let mut request = JoinGroupRequest::new(
            Some("foo".to_owned()),
            "we".to_owned(),
            10_000,
            String::new(),
            "consumer".to_owned(),
            vec![JoinGroupProtocol {
                     protocol_name: "range".to_owned(),
                     protocol_metadata: Bytes::from(&b"\x00\x01"[..]),
                 }]);
        request.header.correlation_id = 1;

        let mut buf = BytesMut::with_capacity(128);

        request.encode::<BigEndian>(&mut buf).unwrap();

        assert_eq!(&buf[..],
                   &[0, 11,                     // api_key
                     0, 0,                      // api_version
                     0, 0, 0, 1,                // correlation_id
                     0, 3, b'f', b'o', b'o',    // client_id
                     0, 2, b'w', b'e',          // group_id
                     0, 0, 39, 16,              // session_timeout
                     0, 0,                      // member_id
                     0, 8, b'c', b'o', b'n', b's', b'u', b'm', b'e', b'r',
                     0, 0, 0, 1,                // protocols
                     0, 5, b'r', b'a', b'n', b'g', b'e',
                     0, 0, 0, 2, 0, 1][..]);
    }

    #[test]
    fn test_parse_join_group_response() {
        let data = vec![
            0, 0,                               // error_code
            0, 0, 0, 2,                         // generation_id
            0, 5, b'r', b'a', b'n', b'g', b'e', // protocol
            0, 2, b'm', b'1',                   // leader_id
            0, 2, b'm', b'2',                   // member_id
            0, 0, 0, 1,                         // members
            0, 2, b'm', b'1',
            0, 0, 0, 2, 0, 1,
        ];

        let response = JoinGroupResponse {
            error_code: 0,
            generation_id: 2,
            protocol: "range".to_owned(),
            leader_id: "m1".to_owned(),
            member_id: "m2".to_owned(),
            members: vec![JoinGroupMember {
                              member_id: "m1".to_owned(),
                              member_metadata: Bytes::from(&b"\x00\x01"[..]),
                          }],
        };

        assert_eq!(parse_join_group_response(&data[..]),
                   IResult::Done(&b""[..], response));
    }
}
