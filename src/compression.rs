use std::fmt;

pub const COMPRESSION_CODEC_MASK: i8 = 0x07;

/// Compression codec carried in the attribute bits of a message.
///
/// Messages are produced uncompressed; the codec of fetched messages is
/// recognized and surfaced to the caller untouched.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(i8)]
pub enum Compression {
    None = 0,
    Gzip = 1,
    Snappy = 2,
}

impl Default for Compression {
    fn default() -> Self {
        Compression::None
    }
}

impl From<i8> for Compression {
    fn from(attributes: i8) -> Self {
        match attributes & COMPRESSION_CODEC_MASK {
            1 => Compression::Gzip,
            2 => Compression::Snappy,
            _ => Compression::None,
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Compression::None => write!(f, "none"),
            Compression::Gzip => write!(f, "gzip"),
            Compression::Snappy => write!(f, "snappy"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compression_from_attributes() {
        assert_eq!(Compression::from(0), Compression::None);
        assert_eq!(Compression::from(1), Compression::Gzip);
        assert_eq!(Compression::from(2), Compression::Snappy);
        // timestamp-type bit does not leak into the codec
        assert_eq!(Compression::from(0x08 | 1), Compression::Gzip);
    }
}
