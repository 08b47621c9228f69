//! Record format (XDR) primitives.
//!
//! All integers are big-endian, all variable-length data pads to a 4 byte
//! boundary. Strings travel as a `u32` byte length followed by the bytes and
//! zero filler.
use bytes::{BufMut, BytesMut};

use super::{align4, pad4};
use crate::codec::Incomplete;

/// Record format writer over a growable buffer.
///
/// The buffer grows geometrically and never shrinks; [`position`][1] is the
/// number of bytes written through this writer.
///
/// [1]: XdrWriter::position
#[derive(Debug)]
pub struct XdrWriter<'a> {
    buf: &'a mut BytesMut,
    start: usize,
}

impl<'a> XdrWriter<'a> {
    pub fn new(buf: &'a mut BytesMut) -> Self {
        let start = buf.len();
        Self { buf, start }
    }

    /// Bytes written since this writer was created.
    pub fn position(&self) -> usize {
        self.buf.len() - self.start
    }

    pub fn put_u32(&mut self, n: u32) {
        self.buf.put_u32(n);
    }

    pub fn put_i32(&mut self, n: i32) {
        self.buf.put_i32(n);
    }

    /// 64-bit integer as two big-endian 32-bit halves, high first.
    pub fn put_i64(&mut self, n: i64) {
        self.buf.put_i32((n >> 32) as i32);
        self.buf.put_u32(n as u32);
    }

    /// 128-bit integer as two 64-bit halves, high first.
    pub fn put_i128(&mut self, n: i128) {
        self.put_i64((n >> 64) as i64);
        self.put_i64(n as i64);
    }

    pub fn put_f32(&mut self, n: f32) {
        self.buf.put_f32(n);
    }

    pub fn put_f64(&mut self, n: f64) {
        self.buf.put_f64(n);
    }

    /// Blob or array id: two 32-bit halves, high first.
    pub fn put_quad(&mut self, high: i32, low: i32) {
        self.buf.put_i32(high);
        self.buf.put_i32(low);
    }

    /// Length-prefixed bytes, padded to a 4 byte boundary.
    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.buf.put_u32(bytes.len() as u32);
        self.buf.put_slice(bytes);
        self.pad(bytes.len());
    }

    /// Length-prefixed UTF-8 string, padded to a 4 byte boundary.
    pub fn put_string(&mut self, s: &str) {
        self.put_bytes(s.as_bytes());
    }

    /// Bytes without a length prefix, padded. Used when the length is
    /// already known from metadata.
    pub fn put_text(&mut self, bytes: &[u8]) {
        self.buf.put_slice(bytes);
        self.pad(bytes.len());
    }

    /// An embedded tagged-format block: its length, then its bytes, aligned.
    pub fn put_block(&mut self, block: &[u8]) {
        self.put_bytes(block);
    }

    /// Raw bytes, no prefix, no padding.
    pub fn put_raw(&mut self, bytes: &[u8]) {
        self.buf.put_slice(bytes);
    }

    /// `(4 - n) & 3` zero filler bytes.
    pub fn pad(&mut self, n: usize) {
        self.buf.put_bytes(0, pad4(n));
    }
}

/// Record format reader over an immutable buffer.
///
/// Reads never go past the end of the buffer: an attempted over-read returns
/// [`Incomplete`] carrying the total length the read required, which is the
/// defined "incomplete packet" signal rather than a decoding error.
#[derive(Debug, Clone)]
pub struct XdrReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> XdrReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Bytes consumed so far.
    pub fn position(&self) -> usize {
        self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], Incomplete> {
        let end = self.pos + n;
        match self.buf.get(self.pos..end) {
            Some(bytes) => {
                self.pos = end;
                Ok(bytes)
            }
            None => Err(Incomplete { needed: end }),
        }
    }

    pub fn get_u32(&mut self) -> Result<u32, Incomplete> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes(b.try_into().unwrap()))
    }

    pub fn get_i32(&mut self) -> Result<i32, Incomplete> {
        self.get_u32().map(|n| n as i32)
    }

    pub fn get_i64(&mut self) -> Result<i64, Incomplete> {
        let high = self.get_i32()? as i64;
        let low = self.get_u32()? as i64;
        Ok((high << 32) | low)
    }

    pub fn get_i128(&mut self) -> Result<i128, Incomplete> {
        let high = self.get_i64()? as i128;
        let low = self.get_i64()? as u64 as i128;
        Ok((high << 64) | low)
    }

    pub fn get_f32(&mut self) -> Result<f32, Incomplete> {
        self.get_u32().map(f32::from_bits)
    }

    pub fn get_f64(&mut self) -> Result<f64, Incomplete> {
        let b = self.take(8)?;
        Ok(f64::from_be_bytes(b.try_into().unwrap()))
    }

    pub fn get_quad(&mut self) -> Result<(i32, i32), Incomplete> {
        Ok((self.get_i32()?, self.get_i32()?))
    }

    /// Length-prefixed bytes. `None` when the prefix is zero or negative.
    /// The cursor advances by the aligned length, not the raw length.
    pub fn get_bytes(&mut self) -> Result<Option<&'a [u8]>, Incomplete> {
        let len = self.get_i32()?;
        if len <= 0 {
            return Ok(None);
        }
        self.get_text(len as usize).map(Some)
    }

    /// Like [`get_bytes`][1] but empty instead of `None`.
    ///
    /// [1]: XdrReader::get_bytes
    pub fn get_buffer(&mut self) -> Result<&'a [u8], Incomplete> {
        Ok(self.get_bytes()?.unwrap_or_default())
    }

    /// `len` raw bytes, cursor advanced by the aligned length.
    pub fn get_text(&mut self, len: usize) -> Result<&'a [u8], Incomplete> {
        let end = self.pos + align4(len);
        if self.buf.len() < end {
            return Err(Incomplete { needed: end });
        }
        let bytes = &self.buf[self.pos..self.pos + len];
        self.pos = end;
        Ok(bytes)
    }
}
