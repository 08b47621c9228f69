//! Tagged format (BLR / parameter block) primitives.
//!
//! A compact byte-code layout: a one byte code, a length indicator, then raw
//! bytes. Multi-byte lengths and numeric payloads are little-endian, unlike
//! the record format.
use bytes::{BufMut, BytesMut};

use crate::codec::ProtocolError;

/// The tagged format caps any single part at this many bytes; longer
/// payloads are split into sequenced chunks.
pub const MAX_PART: usize = 254;

/// Tagged format writer.
#[derive(Debug, Default)]
pub struct BlrWriter {
    buf: BytesMut,
}

impl BlrWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_u8(&mut self, code: u8) {
        self.buf.put_u8(code);
    }

    /// Code, 1 byte length, then up to 255 raw bytes.
    pub fn put_small(&mut self, code: u8, bytes: &[u8]) {
        debug_assert!(bytes.len() <= u8::MAX as usize);
        self.buf.put_u8(code);
        self.buf.put_u8(bytes.len() as u8);
        self.buf.put_slice(bytes);
    }

    /// Code, 2 byte length, then raw bytes.
    pub fn put_string2(&mut self, code: u8, bytes: &[u8]) {
        debug_assert!(bytes.len() <= u16::MAX as usize);
        self.buf.put_u8(code);
        self.buf.put_u16_le(bytes.len() as u16);
        self.buf.put_slice(bytes);
    }

    /// Code and a numeric payload, 1 byte when it fits, 4 bytes otherwise.
    pub fn put_numeric(&mut self, code: u8, value: i32) {
        self.buf.put_u8(code);
        if (0..256).contains(&value) {
            self.buf.put_u8(1);
            self.buf.put_u8(value as u8);
        } else {
            self.buf.put_u8(4);
            self.buf.put_i32_le(value);
        }
    }

    /// A payload split into sequenced chunks of at most [`MAX_PART`] bytes,
    /// each prefixed with `(code, chunk length + 1, sequence number)`.
    pub fn put_multipart(&mut self, code: u8, bytes: &[u8]) {
        for (seq, chunk) in bytes.chunks(MAX_PART).enumerate() {
            self.buf.put_u8(code);
            self.buf.put_u8(chunk.len() as u8 + 1);
            self.buf.put_u8(seq as u8);
            self.buf.put_slice(chunk);
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> BytesMut {
        self.buf
    }
}

/// Tagged format reader over a complete buffer.
///
/// Tagged blocks arrive embedded in an already-delimited record format
/// buffer, so a short read here is a structural violation, not an
/// incomplete packet.
#[derive(Debug)]
pub struct BlrReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> BlrReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn is_eof(&self) -> bool {
        self.pos >= self.buf.len()
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], ProtocolError> {
        let end = self.pos + n;
        match self.buf.get(self.pos..end) {
            Some(bytes) => {
                self.pos = end;
                Ok(bytes)
            }
            None => Err(ProtocolError::new("truncated tagged block")),
        }
    }

    pub fn get_u8(&mut self) -> Result<u8, ProtocolError> {
        Ok(self.take(1)?[0])
    }

    fn get_u16(&mut self) -> Result<u16, ProtocolError> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes(b.try_into().unwrap()))
    }

    /// Variable width integer: a 2 byte length field selects a 1, 2 or 4
    /// byte little-endian payload.
    pub fn get_int(&mut self) -> Result<i32, ProtocolError> {
        let len = self.get_u16()? as usize;
        let b = self.take(len)?;
        Ok(match len {
            1 => b[0] as i32,
            2 => u16::from_le_bytes(b.try_into().unwrap()) as i32,
            4 => i32::from_le_bytes(b.try_into().unwrap()),
            n => return Err(ProtocolError::new(format!("bad numeric width {n}"))),
        })
    }

    /// 2 byte length-prefixed string.
    pub fn get_string(&mut self) -> Result<&'a str, ProtocolError> {
        let len = self.get_u16()? as usize;
        let b = self.take(len)?;
        std::str::from_utf8(b).map_err(|e| ProtocolError::new(format!("non UTF-8 string: {e}")))
    }

    /// Reassemble a value split across multiple length-prefixed chunks
    /// (BLOB segments) into one contiguous sequence. Empty, never absent,
    /// when no data is present.
    pub fn get_segments(&mut self) -> Result<Vec<u8>, ProtocolError> {
        let mut out = Vec::new();
        while self.buf.len() - self.pos >= 2 {
            let len = self.get_u16()? as usize;
            out.extend_from_slice(self.take(len)?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn numeric_width_by_magnitude() {
        let mut w = BlrWriter::new();
        w.put_numeric(63, 3);
        w.put_numeric(57, 300);
        assert_eq!(w.as_bytes(), &[63, 1, 3, 57, 4, 44, 1, 0, 0]);
    }

    #[test]
    fn multipart_chunking() {
        // 600 byte payload splits into chunks of 254, 254 and 92 with
        // sequence numbers 0, 1, 2
        let payload: Vec<u8> = (0..600u32).map(|i| i as u8).collect();
        let mut w = BlrWriter::new();
        w.put_multipart(7, &payload);

        let buf = w.as_bytes();
        let mut pos = 0;
        let mut reassembled = Vec::new();
        for seq in 0..3u8 {
            assert_eq!(buf[pos], 7);
            let len = buf[pos + 1] as usize - 1;
            assert_eq!(buf[pos + 2], seq);
            assert_eq!(len, if seq < 2 { 254 } else { 92 });
            reassembled.extend_from_slice(&buf[pos + 3..pos + 3 + len]);
            pos += 3 + len;
        }
        assert_eq!(pos, buf.len());
        assert_eq!(reassembled, payload);
    }

    #[test]
    fn segments_reassemble() {
        let mut raw = BytesMut::new();
        raw.put_u16_le(3);
        raw.put_slice(b"abc");
        raw.put_u16_le(2);
        raw.put_slice(b"de");

        let mut r = BlrReader::new(&raw);
        assert_eq!(r.get_segments().unwrap(), b"abcde");

        let mut empty = BlrReader::new(&[]);
        assert_eq!(empty.get_segments().unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn int_and_string() {
        let mut raw = BytesMut::new();
        raw.put_u16_le(4);
        raw.put_i32_le(70000);
        raw.put_u16_le(5);
        raw.put_slice(b"hello");

        let mut r = BlrReader::new(&raw);
        assert_eq!(r.get_int().unwrap(), 70000);
        assert_eq!(r.get_string().unwrap(), "hello");
        assert!(r.is_eof());
    }
}
