use std::marker::PhantomData;
use std::str;

use bytes::Bytes;

use errors::{ErrorKind, Result};

/// Turns typed record keys/values into wire bytes.
pub trait Serializer {
    type Item;

    fn serialize(&self, topic_name: &str, data: Self::Item) -> Result<Bytes>;
}

/// Turns wire bytes back into typed record keys/values.
pub trait Deserializer {
    type Item;

    fn deserialize(&self, topic_name: &str, data: &[u8]) -> Result<Self::Item>;
}

/// Discards its input; the unit serializer for records without keys.
#[derive(Clone, Debug, Default)]
pub struct NoopSerializer<T> {
    phantom: PhantomData<T>,
}

impl<T> Serializer for NoopSerializer<T> {
    type Item = T;

    fn serialize(&self, _topic_name: &str, _data: Self::Item) -> Result<Bytes> {
        Ok(Bytes::new())
    }
}

#[derive(Clone, Debug, Default)]
pub struct NoopDeserializer<T> {
    phantom: PhantomData<T>,
}

impl<T: Default> Deserializer for NoopDeserializer<T> {
    type Item = T;

    fn deserialize(&self, _topic_name: &str, _data: &[u8]) -> Result<Self::Item> {
        Ok(T::default())
    }
}

/// Passes raw bytes through untouched.
#[derive(Clone, Debug, Default)]
pub struct BytesSerializer;

impl Serializer for BytesSerializer {
    type Item = Bytes;

    fn serialize(&self, _topic_name: &str, data: Self::Item) -> Result<Bytes> {
        Ok(data)
    }
}

#[derive(Clone, Debug, Default)]
pub struct BytesDeserializer;

impl Deserializer for BytesDeserializer {
    type Item = Bytes;

    fn deserialize(&self, _topic_name: &str, data: &[u8]) -> Result<Self::Item> {
        Ok(Bytes::from(data))
    }
}

/// UTF-8 strings.
#[derive(Clone, Debug, Default)]
pub struct StringSerializer;

impl Serializer for StringSerializer {
    type Item = String;

    fn serialize(&self, _topic_name: &str, data: Self::Item) -> Result<Bytes> {
        Ok(Bytes::from(data.into_bytes()))
    }
}

#[derive(Clone, Debug, Default)]
pub struct StringDeserializer;

impl Deserializer for StringDeserializer {
    type Item = String;

    fn deserialize(&self, _topic_name: &str, data: &[u8]) -> Result<Self::Item> {
        str::from_utf8(data)
            .map(str::to_owned)
            .map_err(|_| ErrorKind::CodecError("invalid utf-8 string").into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_roundtrip() {
        let serialized = StringSerializer
            .serialize("topic", "hello".to_owned())
            .unwrap();

        assert_eq!(&serialized[..], b"hello");

        let deserialized = StringDeserializer.deserialize("topic", &serialized).unwrap();

        assert_eq!(deserialized, "hello");
    }

    #[test]
    fn test_string_deserializer_rejects_invalid_utf8() {
        assert!(StringDeserializer.deserialize("topic", b"\xfe\xff").is_err());
    }

    #[test]
    fn test_bytes_passthrough() {
        let data = Bytes::from(&b"payload"[..]);

        assert_eq!(BytesSerializer.serialize("topic", data.clone()).unwrap(), data);
    }
}
