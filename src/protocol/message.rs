use std::mem;

use bytes::{BufMut, ByteOrder, Bytes, BytesMut};

use nom::{IResult, be_i32, be_i64, be_i8};

use crc::crc32;

use errors::Result;
use compression::{COMPRESSION_CODEC_MASK, Compression};
use protocol::{Encodable, Offset, WriteExt, parse_bytes};

/// The only message format the 0.8.x wire protocol carries.
pub const MAGIC_BYTE: i8 = 0;

/// A key-value pair with a small amount of associated metadata.
///
/// Message => Crc MagicByte Attributes Key Value
///   Crc => int32
///   MagicByte => int8
///   Attributes => int8
///   Key => bytes
///   Value => bytes
///
/// The CRC is IEEE CRC-32 over everything from the magic byte onward.
#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    pub offset: Offset,
    pub compression: Compression,
    pub key: Option<Bytes>,
    pub value: Option<Bytes>,
}

impl Message {
    pub fn new(key: Option<Bytes>, value: Option<Bytes>) -> Self {
        Message {
            offset: 0,
            compression: Compression::None,
            key: key,
            value: value,
        }
    }

    /// Size of the wire representation, including the offset and size words.
    pub fn wire_size(&self) -> usize {
        mem::size_of::<i64>() + mem::size_of::<i32>() + // offset, size
        mem::size_of::<i32>() + 2 * mem::size_of::<i8>() + // crc, magic, attributes
        2 * mem::size_of::<i32>() + // key and value length words
        self.key.as_ref().map_or(0, |k| k.len()) +
        self.value.as_ref().map_or(0, |v| v.len())
    }
}

impl Encodable for Message {
    fn encode<T: ByteOrder>(&self, dst: &mut BytesMut) -> Result<()> {
        dst.put_i64::<T>(self.offset);
        let size_off = dst.len();
        dst.put_i32::<T>(0);
        let crc_off = dst.len();
        dst.put_i32::<T>(0);
        let data_off = dst.len();
        dst.put_i8(MAGIC_BYTE);
        dst.put_i8(self.compression as i8 & COMPRESSION_CODEC_MASK);
        dst.put_bytes::<T, Bytes>(self.key.as_ref())?;
        dst.put_bytes::<T, Bytes>(self.value.as_ref())?;

        let size = dst.len() - crc_off;
        let crc = crc32::checksum_ieee(&dst[data_off..]);

        T::write_i32(&mut dst[size_off..], size as i32);
        T::write_i32(&mut dst[crc_off..], crc as i32);

        Ok(())
    }
}

/// A sequence of messages with offset and size information; used both for
/// on-disk storage on the broker and the on-the-wire format.
///
/// MessageSet => [Offset MessageSize Message]
///   Offset => int64
///   MessageSize => int32
///
/// A message set is *not* preceded by an element count; it is delimited by
/// the byte size carried next to it in the enclosing request or response.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MessageSet {
    pub messages: Vec<Message>,
}

impl Encodable for MessageSet {
    fn encode<T: ByteOrder>(&self, dst: &mut BytesMut) -> Result<()> {
        for message in &self.messages {
            message.encode::<T>(dst)?;
        }

        Ok(())
    }
}

/// Parses messages until the input is exhausted.
///
/// A partial message at the tail (the broker cuts fetch responses at
/// `max_bytes` regardless of message boundaries) is dropped silently; a
/// corrupt message fails the parse.
pub fn parse_message_set(input: &[u8]) -> IResult<&[u8], MessageSet> {
    let mut messages = Vec::new();
    let mut rest = input;

    while !rest.is_empty() {
        match parse_message(rest) {
            IResult::Done(remaining, message) => {
                messages.push(message);
                rest = remaining;
            }
            IResult::Incomplete(_) => {
                trace!("dropped {} trailing bytes of a partial message", rest.len());
                rest = &rest[rest.len()..];
            }
            IResult::Error(err) => return IResult::Error(err),
        }
    }

    IResult::Done(rest, MessageSet { messages: messages })
}

named!(parse_message<Message>,
    do_parse!(
        offset: be_i64
     >> size: be_i32
     >> data: peek!(take!(size as usize))
     >> _crc: verify!(be_i32, |checksum: i32| {
            let crc = crc32::checksum_ieee(&data[mem::size_of::<i32>()..]);

            if crc != checksum as u32 {
                trace!("message checksum mismatched, expected={}, current={}",
                       crc, checksum as u32);
            }

            crc == checksum as u32
        })
     >> _magic: verify!(be_i8, |v: i8| v == MAGIC_BYTE)
     >> attrs: be_i8
     >> key: parse_bytes
     >> value: parse_bytes
     >> (Message {
            offset: offset,
            compression: Compression::from(attrs),
            key: key,
            value: value,
        })
    )
);

#[cfg(test)]
mod tests {
    use bytes::BigEndian;

    use nom::IResult;

    use super::*;

    lazy_static! {
        static ref TEST_MESSAGE_DATA: Vec<u8> = vec![
            0, 0, 0, 0, 0, 0, 0, 0,             // offset
            0, 0, 0, 22,                        // size
            35, 86, 193, 55,                    // crc
            0,                                  // magic
            0,                                  // attributes
            0, 0, 0, 3, 107, 101, 121,          // key
            0, 0, 0, 5, 118, 97, 108, 117, 101, // value
        ];

        static ref TEST_MESSAGE: Message = Message {
            offset: 0,
            compression: Compression::None,
            key: Some(Bytes::from(&b"key"[..])),
            value: Some(Bytes::from(&b"value"[..])),
        };

        static ref TEST_NULL_KEY_DATA: Vec<u8> = vec![
            0, 0, 0, 0, 0, 0, 0, 0,             // offset
            0, 0, 0, 19,                        // size
            135, 167, 122, 178,                 // crc
            0,                                  // magic
            0,                                  // attributes
            255, 255, 255, 255,                 // key (nil)
            0, 0, 0, 5, 104, 101, 108, 108, 111, // value
        ];
    }

    #[test]
    fn test_encode_message() {
        let mut buf = BytesMut::with_capacity(64);

        TEST_MESSAGE.encode::<BigEndian>(&mut buf).unwrap();

        assert_eq!(&buf[..], &TEST_MESSAGE_DATA[..]);
        assert_eq!(buf.len(), TEST_MESSAGE.wire_size());
    }

    #[test]
    fn test_encode_message_without_key() {
        let message = Message::new(None, Some(Bytes::from(&b"hello"[..])));

        let mut buf = BytesMut::with_capacity(64);

        message.encode::<BigEndian>(&mut buf).unwrap();

        assert_eq!(&buf[..], &TEST_NULL_KEY_DATA[..]);
    }

    #[test]
    fn test_parse_message_set() {
        let mut data = TEST_MESSAGE_DATA.clone();
        data.extend_from_slice(&TEST_NULL_KEY_DATA[..]);

        let message_set = match parse_message_set(&data) {
            IResult::Done(remaining, message_set) => {
                assert_eq!(remaining.len(), 0);
                message_set
            }
            result => panic!("unexpected result: {:?}", result),
        };

        assert_eq!(message_set.messages.len(), 2);
        assert_eq!(message_set.messages[0], *TEST_MESSAGE);
        assert_eq!(message_set.messages[1].key, None);
        assert_eq!(message_set.messages[1].value, Some(Bytes::from(&b"hello"[..])));
    }

    #[test]
    fn test_parse_message_set_drops_trailing_partial_message() {
        let mut data = TEST_MESSAGE_DATA.clone();
        data.extend_from_slice(&TEST_NULL_KEY_DATA[..TEST_NULL_KEY_DATA.len() / 2]);

        match parse_message_set(&data) {
            IResult::Done(remaining, message_set) => {
                assert_eq!(remaining.len(), 0);
                assert_eq!(message_set.messages.len(), 1);
                assert_eq!(message_set.messages[0], *TEST_MESSAGE);
            }
            result => panic!("unexpected result: {:?}", result),
        }
    }

    #[test]
    fn test_parse_message_set_rejects_corrupt_message() {
        let mut data = TEST_MESSAGE_DATA.clone();
        let last = data.len() - 1;
        data[last] ^= 0xff;

        match parse_message_set(&data) {
            IResult::Error(_) => {}
            result => panic!("unexpected result: {:?}", result),
        }
    }

    #[test]
    fn test_parse_empty_message_set() {
        assert_eq!(parse_message_set(b""),
                   IResult::Done(&b""[..], MessageSet::default()));
    }
}
