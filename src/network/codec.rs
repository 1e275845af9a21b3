use std::collections::VecDeque;

use byteorder::{BigEndian, ByteOrder};

use bytes::{BufMut, BytesMut};

use hexplay::HexViewBuilder;

use tokio_io::codec::{Decoder, Encoder};

use errors::{Error, ErrorKind, Result};
use network::{KafkaRequest, KafkaResponse};
use protocol::{ApiKeys, CorrelationId, Encodable};

/// Frame codec for one broker connection.
///
/// Requests and responses travel as `length: i32 | payload` frames.  The
/// codec allocates correlation ids (contiguous from 0 for the lifetime of the
/// connection) and keeps the FIFO queue of expected responses: the broker
/// answers requests in send order, so the front of the queue names the parser
/// for the next inbound frame.
#[derive(Debug, Default)]
pub struct KafkaCodec {
    next_correlation_id: CorrelationId,
    in_flight: VecDeque<(ApiKeys, CorrelationId)>,
}

impl KafkaCodec {
    pub fn new() -> Self {
        KafkaCodec::default()
    }

    pub fn in_flight_requests(&self) -> usize {
        self.in_flight.len()
    }

    fn next_correlation_id(&mut self) -> CorrelationId {
        let correlation_id = self.next_correlation_id;
        self.next_correlation_id = self.next_correlation_id.wrapping_add(1);
        correlation_id
    }
}

impl Encoder for KafkaCodec {
    type Item = KafkaRequest;
    type Error = Error;

    fn encode(&mut self, mut request: Self::Item, dst: &mut BytesMut) -> Result<()> {
        let api_key = request.api_key();
        let correlation_id = self.next_correlation_id();

        request.header_mut().correlation_id = correlation_id;

        let size_off = dst.len();
        dst.put_i32::<BigEndian>(0);
        request.encode::<BigEndian>(dst)?;
        let size = dst.len() - size_off - 4;
        BigEndian::write_i32(&mut dst[size_off..], size as i32);

        if request.has_response() {
            self.in_flight.push_back((api_key, correlation_id));
        }

        trace!("encoded {:?} request #{}:\n{}",
               api_key,
               correlation_id,
               HexViewBuilder::new(&dst[size_off..]).row_width(16).finish());

        Ok(())
    }
}

impl Decoder for KafkaCodec {
    type Item = KafkaResponse;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        if src.len() < 4 {
            return Ok(None);
        }

        let size = BigEndian::read_i32(&src[..4]);

        if size < 0 {
            bail!(ErrorKind::CodecError("negative frame length"));
        }

        if src.len() < size as usize + 4 {
            return Ok(None);
        }

        src.split_to(4);
        let frame = src.split_to(size as usize);

        trace!("received frame of {} bytes:\n{}",
               size,
               HexViewBuilder::new(&frame[..]).row_width(16).finish());

        let (api_key, correlation_id) = self.in_flight
            .pop_front()
            .ok_or_else(|| Error::from(ErrorKind::CodecError("response without a request")))?;

        let response = KafkaResponse::parse(api_key, &frame[..])?;

        if response.correlation_id != correlation_id {
            bail!(ErrorKind::CodecError("correlation id mismatch"));
        }

        Ok(Some(response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::{GroupCoordinatorRequest, MetadataRequest};

    fn metadata_request() -> KafkaRequest {
        KafkaRequest::Metadata(MetadataRequest::new::<String>(Some("foo".to_owned()), &[]))
    }

    #[test]
    fn test_correlation_ids_are_contiguous_from_zero() {
        let mut codec = KafkaCodec::new();
        let mut buf = BytesMut::with_capacity(256);

        for expected in 0..4 {
            codec.encode(metadata_request(), &mut buf).unwrap();

            let (_, correlation_id) = *codec.in_flight.back().unwrap();

            assert_eq!(correlation_id, expected);
        }

        assert_eq!(codec.in_flight_requests(), 4);
    }

    #[test]
    fn test_encode_frame_carries_length_prefix() {
        let mut codec = KafkaCodec::new();
        let mut buf = BytesMut::with_capacity(256);

        codec.encode(metadata_request(), &mut buf).unwrap();

        let size = BigEndian::read_i32(&buf[..4]);

        assert_eq!(size as usize, buf.len() - 4);
    }

    #[test]
    fn test_decode_matches_response_to_request() {
        let mut codec = KafkaCodec::new();
        let mut buf = BytesMut::with_capacity(256);

        let request = KafkaRequest::GroupCoordinator(
            GroupCoordinatorRequest::new(Some("foo".to_owned()), "we".to_owned()));

        codec.encode(request, &mut buf).unwrap();

        let mut src = BytesMut::with_capacity(64);
        src.extend_from_slice(&[0, 0, 0, 16,         // frame length
                                0, 0, 0, 0,          // correlation_id
                                0, 0,                // error_code
                                0, 0, 0x9C, 0x41,    // coordinator_id
                                0, 0,                // coordinator_host
                                0, 0, 0xC0, 0x06]);  // coordinator_port

        let response = codec.decode(&mut src).unwrap().unwrap();

        assert_eq!(response.correlation_id, 0);
        assert_eq!(response.body.api_key(), ApiKeys::GroupCoordinator);
        assert_eq!(codec.in_flight_requests(), 0);
    }

    #[test]
    fn test_decode_incomplete_frame() {
        let mut codec = KafkaCodec::new();

        let mut src = BytesMut::with_capacity(16);
        src.extend_from_slice(&[0, 0, 0, 10, 0, 0]);

        assert_eq!(codec.decode(&mut src).unwrap(), None);
        assert_eq!(src.len(), 6);
    }

    #[test]
    fn test_decode_unexpected_response() {
        let mut codec = KafkaCodec::new();

        let mut src = BytesMut::with_capacity(16);
        src.extend_from_slice(&[0, 0, 0, 2, 0, 16]);

        assert!(codec.decode(&mut src).is_err());
    }

    #[test]
    fn test_decode_correlation_mismatch() {
        let mut codec = KafkaCodec::new();
        let mut buf = BytesMut::with_capacity(256);

        codec.encode(metadata_request(), &mut buf).unwrap();

        // correlation id 9 does not match the allocated id 0
        let mut src = BytesMut::with_capacity(16);
        src.extend_from_slice(&[0, 0, 0, 12, 0, 0, 0, 9, 0, 0, 0, 0, 0, 0, 0, 0]);

        assert!(codec.decode(&mut src).is_err());
    }

    #[test]
    fn test_fire_and_forget_produce_expects_no_response() {
        use protocol::ProduceRequest;

        let mut codec = KafkaCodec::new();
        let mut buf = BytesMut::with_capacity(256);

        let request =
            KafkaRequest::Produce(ProduceRequest::new(None, 0, 100, Vec::new()));

        codec.encode(request, &mut buf).unwrap();

        assert_eq!(codec.in_flight_requests(), 0);
    }
}
