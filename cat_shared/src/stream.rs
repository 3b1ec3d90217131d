//! Binary stream codec.
//!
//! Every value is written fixed-width little-endian. Layered types stream
//! their parent layer first, then their own fields, so a reader consumes
//! them in base-to-derived order.
//!
//! Layout summary:
//! - `u8`, `u32`, `u64`, `f32`: little-endian, natural width
//! - `bool`: one byte, `0` or `1`
//! - string: `u32` byte length + UTF-8 bytes (at most [`MAX_STRING_LEN`])
//! - `Vec3`: 3 x `f32`, `Color`: 4 x `f32`

use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::math::{Color, Vec3};

/// Longest string accepted on read.
pub const MAX_STRING_LEN: usize = 64 * 1024;

/// Decoding failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    /// Fewer bytes remain than the next field needs.
    UnexpectedEof { needed: usize, remaining: usize },
    /// A string field is not valid UTF-8.
    InvalidUtf8,
    /// A string length prefix exceeds [`MAX_STRING_LEN`].
    StringTooLong(usize),
    /// A primitive kind code nobody registered.
    UnknownKind(u32),
    /// The encoded version is newer than this build understands.
    UnsupportedVersion { kind: u32, version: u32, supported: u32 },
    /// A bool byte other than 0 or 1.
    InvalidBool(u8),
    /// An element count that cannot fit in the remaining bytes.
    CountTooLarge { count: usize, remaining: usize },
    /// Bytes left over after a complete value.
    TrailingBytes(usize),
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamError::UnexpectedEof { needed, remaining } => {
                write!(f, "unexpected end of stream: need {needed} bytes, {remaining} left")
            }
            StreamError::InvalidUtf8 => write!(f, "string is not valid UTF-8"),
            StreamError::StringTooLong(len) => {
                write!(f, "string of {len} bytes exceeds limit of {MAX_STRING_LEN}")
            }
            StreamError::UnknownKind(code) => write!(f, "unknown primitive kind {code:#010x}"),
            StreamError::UnsupportedVersion {
                kind,
                version,
                supported,
            } => write!(
                f,
                "kind {kind:#010x} version {version} is newer than supported {supported}"
            ),
            StreamError::InvalidBool(b) => write!(f, "invalid bool byte {b}"),
            StreamError::CountTooLarge { count, remaining } => {
                write!(f, "count {count} cannot fit in {remaining} remaining bytes")
            }
            StreamError::TrailingBytes(n) => write!(f, "{n} trailing bytes after value"),
        }
    }
}

impl std::error::Error for StreamError {}

/// A value that can be written to and read back from a binary stream.
pub trait Streamable: Sized {
    fn write(&self, w: &mut StreamWriter);
    fn read(r: &mut StreamReader<'_>) -> Result<Self, StreamError>;
}

/// Encodes a value into a fresh buffer.
pub fn encode<T: Streamable>(value: &T) -> Bytes {
    let mut w = StreamWriter::new();
    value.write(&mut w);
    w.finish()
}

/// Decodes a value that must span the whole buffer.
pub fn decode_exact<T: Streamable>(data: &[u8]) -> Result<T, StreamError> {
    let mut r = StreamReader::new(data);
    let value = T::read(&mut r)?;
    r.finish()?;
    Ok(value)
}

/// Append-only little-endian writer.
#[derive(Debug, Default)]
pub struct StreamWriter {
    buf: BytesMut,
}

impl StreamWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn put_u8(&mut self, v: u8) {
        self.buf.put_u8(v);
    }

    pub fn put_u32(&mut self, v: u32) {
        self.buf.put_u32_le(v);
    }

    pub fn put_u64(&mut self, v: u64) {
        self.buf.put_u64_le(v);
    }

    pub fn put_f32(&mut self, v: f32) {
        self.buf.put_f32_le(v);
    }

    pub fn put_bool(&mut self, v: bool) {
        self.buf.put_u8(u8::from(v));
    }

    /// Strings longer than `u32::MAX` cannot occur for values this crate
    /// builds; the reader enforces [`MAX_STRING_LEN`] anyway.
    pub fn put_str(&mut self, s: &str) {
        self.buf.put_u32_le(s.len() as u32);
        self.buf.put_slice(s.as_bytes());
    }

    pub fn put_vec3(&mut self, v: Vec3) {
        self.put_f32(v.x);
        self.put_f32(v.y);
        self.put_f32(v.z);
    }

    pub fn put_color(&mut self, c: Color) {
        self.put_f32(c.r);
        self.put_f32(c.g);
        self.put_f32(c.b);
        self.put_f32(c.a);
    }

    pub fn finish(self) -> Bytes {
        self.buf.freeze()
    }
}

/// Bounds-checked little-endian reader over a borrowed slice.
#[derive(Debug)]
pub struct StreamReader<'a> {
    buf: &'a [u8],
}

impl<'a> StreamReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    fn need(&self, needed: usize) -> Result<(), StreamError> {
        let remaining = self.buf.remaining();
        if remaining < needed {
            return Err(StreamError::UnexpectedEof { needed, remaining });
        }
        Ok(())
    }

    pub fn get_u8(&mut self) -> Result<u8, StreamError> {
        self.need(1)?;
        Ok(self.buf.get_u8())
    }

    pub fn get_u32(&mut self) -> Result<u32, StreamError> {
        self.need(4)?;
        Ok(self.buf.get_u32_le())
    }

    pub fn get_u64(&mut self) -> Result<u64, StreamError> {
        self.need(8)?;
        Ok(self.buf.get_u64_le())
    }

    pub fn get_f32(&mut self) -> Result<f32, StreamError> {
        self.need(4)?;
        Ok(self.buf.get_f32_le())
    }

    pub fn get_bool(&mut self) -> Result<bool, StreamError> {
        match self.get_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            b => Err(StreamError::InvalidBool(b)),
        }
    }

    pub fn get_string(&mut self) -> Result<String, StreamError> {
        let len = self.get_u32()? as usize;
        if len > MAX_STRING_LEN {
            return Err(StreamError::StringTooLong(len));
        }
        self.need(len)?;
        let (head, tail) = self.buf.split_at(len);
        let s = std::str::from_utf8(head).map_err(|_| StreamError::InvalidUtf8)?;
        self.buf = tail;
        Ok(s.to_string())
    }

    pub fn get_vec3(&mut self) -> Result<Vec3, StreamError> {
        Ok(Vec3::new(self.get_f32()?, self.get_f32()?, self.get_f32()?))
    }

    pub fn get_color(&mut self) -> Result<Color, StreamError> {
        Ok(Color::rgba(
            self.get_f32()?,
            self.get_f32()?,
            self.get_f32()?,
            self.get_f32()?,
        ))
    }

    /// Reads a `u32` element count, rejecting counts that could not possibly
    /// be backed by the remaining bytes at `min_item_len` bytes each.
    pub fn get_count(&mut self, min_item_len: usize) -> Result<usize, StreamError> {
        let count = self.get_u32()? as usize;
        let remaining = self.remaining();
        if count.saturating_mul(min_item_len.max(1)) > remaining {
            return Err(StreamError::CountTooLarge { count, remaining });
        }
        Ok(count)
    }

    /// Fails if any bytes are left unread.
    pub fn finish(self) -> Result<(), StreamError> {
        match self.buf.remaining() {
            0 => Ok(()),
            n => Err(StreamError::TrailingBytes(n)),
        }
    }
}

impl Streamable for Vec3 {
    fn write(&self, w: &mut StreamWriter) {
        w.put_vec3(*self);
    }

    fn read(r: &mut StreamReader<'_>) -> Result<Self, StreamError> {
        r.get_vec3()
    }
}

impl Streamable for Color {
    fn write(&self, w: &mut StreamWriter) {
        w.put_color(*self);
    }

    fn read(r: &mut StreamReader<'_>) -> Result<Self, StreamError> {
        r.get_color()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalars_are_little_endian() {
        let mut w = StreamWriter::new();
        w.put_u32(0x0403_0201);
        w.put_u64(1);
        let bytes = w.finish();
        assert_eq!(&bytes[..4], &[1, 2, 3, 4]);
        assert_eq!(&bytes[4..12], &[1, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn short_read_reports_eof() {
        let mut r = StreamReader::new(&[1, 2]);
        assert_eq!(
            r.get_u32(),
            Err(StreamError::UnexpectedEof {
                needed: 4,
                remaining: 2
            })
        );
    }

    #[test]
    fn string_roundtrip_and_limits() {
        let mut w = StreamWriter::new();
        w.put_str("héllo");
        let bytes = w.finish();
        let mut r = StreamReader::new(&bytes);
        assert_eq!(r.get_string().unwrap(), "héllo");
        assert!(r.finish().is_ok());

        let mut w = StreamWriter::new();
        w.put_u32((MAX_STRING_LEN + 1) as u32);
        let bytes = w.finish();
        assert_eq!(
            StreamReader::new(&bytes).get_string(),
            Err(StreamError::StringTooLong(MAX_STRING_LEN + 1))
        );
    }

    #[test]
    fn invalid_utf8_is_rejected() {
        let data = [2, 0, 0, 0, 0xff, 0xfe];
        assert_eq!(
            StreamReader::new(&data).get_string(),
            Err(StreamError::InvalidUtf8)
        );
    }

    #[test]
    fn bool_accepts_only_zero_and_one() {
        assert_eq!(StreamReader::new(&[1]).get_bool(), Ok(true));
        assert_eq!(
            StreamReader::new(&[7]).get_bool(),
            Err(StreamError::InvalidBool(7))
        );
    }

    #[test]
    fn oversized_count_is_rejected_before_allocation() {
        let data = [0xff, 0xff, 0xff, 0x00, 0, 0];
        let err = StreamReader::new(&data).get_count(8).unwrap_err();
        assert!(matches!(err, StreamError::CountTooLarge { remaining: 2, .. }));
    }

    #[test]
    fn decode_exact_rejects_trailing_bytes() {
        let mut bytes = encode(&Vec3::new(1.0, 2.0, 3.0)).to_vec();
        bytes.push(0);
        assert_eq!(
            decode_exact::<Vec3>(&bytes),
            Err(StreamError::TrailingBytes(1))
        );
    }
}
