use bytes::{BufMut, ByteOrder, BytesMut};

use nom::be_i32;

use errors::Result;
use protocol::{ApiKey, ApiVersion, CorrelationId, Encodable, WriteExt};

/// Header prepended to every request.
///
/// RequestHeader => ApiKey ApiVersion CorrelationId ClientId
#[derive(Clone, Debug, PartialEq)]
pub struct RequestHeader {
    pub api_key: ApiKey,
    pub api_version: ApiVersion,
    pub correlation_id: CorrelationId,
    pub client_id: Option<String>,
}

impl RequestHeader {
    pub fn new(api_key: ApiKey, client_id: Option<String>) -> Self {
        RequestHeader {
            api_key: api_key,
            api_version: 0,
            correlation_id: 0,
            client_id: client_id,
        }
    }
}

impl Encodable for RequestHeader {
    fn encode<T: ByteOrder>(&self, dst: &mut BytesMut) -> Result<()> {
        dst.put_i16::<T>(self.api_key);
        dst.put_i16::<T>(self.api_version);
        dst.put_i32::<T>(self.correlation_id);
        dst.put_str::<T, String>(self.client_id.as_ref())
    }
}

/// Header of every response; the body layout depends on the request that
/// carried the same correlation id.
#[derive(Clone, Debug, PartialEq)]
pub struct ResponseHeader {
    pub correlation_id: CorrelationId,
}

named!(pub parse_response_header<ResponseHeader>,
    do_parse!(
        correlation_id: be_i32
     >> (ResponseHeader {
            correlation_id: correlation_id,
        })
    )
);

#[cfg(test)]
mod tests {
    use bytes::BigEndian;

    use nom::IResult;

    use super::*;
    use protocol::ApiKeys;

    #[test]
    fn test_encode_request_header() {
        let header = RequestHeader {
            api_key: ApiKeys::Metadata.key(),
            api_version: 0,
            correlation_id: 123,
            client_id: Some("client".to_owned()),
        };

        let mut buf = BytesMut::with_capacity(64);

        header.encode::<BigEndian>(&mut buf).unwrap();

        assert_eq!(&buf[..],
                   &[0, 3,                               // api_key
                     0, 0,                               // api_version
                     0, 0, 0, 123,                       // correlation_id
                     0, 6, 99, 108, 105, 101, 110, 116   /* client_id */][..]);
    }

    #[test]
    fn test_encode_request_header_without_client_id() {
        let header = RequestHeader::new(ApiKeys::Fetch.key(), None);

        let mut buf = BytesMut::with_capacity(64);

        header.encode::<BigEndian>(&mut buf).unwrap();

        assert_eq!(&buf[..], &[0, 1, 0, 0, 0, 0, 0, 0, 255, 255][..]);
    }

    #[test]
    fn test_parse_response_header() {
        assert_eq!(parse_response_header(&[0, 0, 0, 123]),
                   IResult::Done(&b""[..], ResponseHeader { correlation_id: 123 }));
    }
}
