//! Reply messages, server to client.
//!
//! Decoders follow the buffered contract: `ControlFlow::Continue` carries the
//! buffered length a retry needs, `Break` the complete message with the
//! buffer advanced past it. The fetch decoder additionally keeps its progress
//! across retries so columns are never decoded twice.
use std::ops::ControlFlow;

use bytes::{Buf, BytesMut};

use crate::{
    codec::{try_get, ProtocolError},
    proto::{op, proto, status::ServerError, FETCH_NO_MORE_ROWS},
    types::{BlobId, SqlType, Value},
    wire::{
        align4,
        bitset::{row_bitmap_len, Bitset},
        xdr::XdrReader,
    },
};

/// One decoded server reply.
#[derive(Debug)]
pub enum Reply {
    Generic(GenericResponse),
    Rows(RowBatch),
    Sql(SqlResponse),
    Accept(Accept),
    ContAuth(ContAuthReply),
}

/// Opcode of the next buffered message, once 4 bytes are in.
pub fn peek_op(buf: &[u8]) -> Option<u32> {
    Some(u32::from_be_bytes(buf.get(..4)?.try_into().ok()?))
}

/// The catch-all `op_response`: an object handle, a blob id, an opaque
/// buffer and the status vector.
#[derive(Debug, Clone, PartialEq)]
pub struct GenericResponse {
    pub handle: i32,
    pub id: BlobId,
    pub buffer: Vec<u8>,
    pub error: Option<ServerError>,
}

impl GenericResponse {
    pub fn decode(buf: &mut BytesMut) -> Result<ControlFlow<Self, usize>, ProtocolError> {
        let mut r = XdrReader::new(buf);
        debug_assert_eq!(try_get!(r.get_u32()), op::RESPONSE);
        let handle = try_get!(r.get_i32());
        let (high, low) = try_get!(r.get_quad());
        let buffer = try_get!(r.get_buffer()).to_vec();
        let error = try_get!(crate::proto::status::decode_status(&mut r));
        let len = r.position();
        buf.advance(len);
        Ok(ControlFlow::Break(Self {
            handle,
            id: BlobId::new(high, low),
            buffer,
            error,
        }))
    }

    /// Split the response into its payload or its error.
    pub fn ok(self) -> Result<Self, ServerError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self),
        }
    }
}

/// Handshake acceptance, in any of its three shapes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accept {
    /// Which accept opcode arrived.
    pub op: u32,
    pub version: u16,
    pub arch: u32,
    pub packet_type: u32,
    /// Server authentication data, empty on a plain accept.
    pub data: Vec<u8>,
    pub plugin: String,
    pub is_authenticated: bool,
    pub keys: Vec<u8>,
}

impl Accept {
    /// Whether the server chose deferred packet delivery.
    pub fn lazy(&self) -> bool {
        self.packet_type == proto::PTYPE_LAZY_SEND
    }

    pub fn decode(buf: &mut BytesMut) -> Result<ControlFlow<Self, usize>, ProtocolError> {
        let mut r = XdrReader::new(buf);
        let op = try_get!(r.get_u32());
        let version = proto::decode_version(try_get!(r.get_u32()));
        let arch = try_get!(r.get_u32());
        let packet_type = try_get!(r.get_u32()) & 0xFF;
        let mut accept = Self {
            op,
            version,
            arch,
            packet_type,
            data: Vec::new(),
            plugin: String::new(),
            is_authenticated: true,
            keys: Vec::new(),
        };
        if op != op::ACCEPT {
            accept.data = try_get!(r.get_buffer()).to_vec();
            accept.plugin = String::from_utf8_lossy(try_get!(r.get_buffer())).into_owned();
            accept.is_authenticated = try_get!(r.get_u32()) != 0;
            accept.keys = try_get!(r.get_buffer()).to_vec();
        }
        let len = r.position();
        buf.advance(len);
        Ok(ControlFlow::Break(accept))
    }
}

/// Server side of a multi round authentication exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContAuthReply {
    pub data: Vec<u8>,
    pub plugin: String,
    pub plugin_list: String,
    pub keys: Vec<u8>,
}

impl ContAuthReply {
    pub fn decode(buf: &mut BytesMut) -> Result<ControlFlow<Self, usize>, ProtocolError> {
        let mut r = XdrReader::new(buf);
        debug_assert_eq!(try_get!(r.get_u32()), op::CONT_AUTH);
        let data = try_get!(r.get_buffer()).to_vec();
        let plugin = String::from_utf8_lossy(try_get!(r.get_buffer())).into_owned();
        let plugin_list = String::from_utf8_lossy(try_get!(r.get_buffer())).into_owned();
        let keys = try_get!(r.get_buffer()).to_vec();
        let len = r.position();
        buf.advance(len);
        Ok(ControlFlow::Break(Self { data, plugin, plugin_list, keys }))
    }
}

/// Decode one data row under a row format.
///
/// Protocol 13+ prefixes the row with a null bitmap and omits null payloads;
/// older versions trail every payload with an indicator word.
fn decode_row(
    r: &mut XdrReader<'_>,
    format: &[SqlType],
    version: u16,
) -> Result<Vec<Value>, crate::codec::Incomplete> {
    let mut row = Vec::with_capacity(format.len());
    if version >= proto::VERSION13 {
        let nulls = Bitset::from_bytes(r.get_text(row_bitmap_len(format.len()))?);
        for (i, ty) in format.iter().enumerate() {
            if nulls.get(i) {
                row.push(Value::Null);
            } else {
                row.push(ty.decode(r, false)?);
            }
        }
    } else {
        for ty in format {
            row.push(ty.decode(r, true)?);
        }
    }
    Ok(row)
}

/// The rows of one fetch round trip.
#[derive(Debug, Clone, PartialEq)]
pub struct RowBatch {
    pub rows: Vec<Vec<Value>>,
    /// Whether the cursor has more rows past this batch.
    pub more: bool,
}

/// The singleton row of an `EXECUTE2` response.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlResponse {
    pub row: Option<Vec<Value>>,
}

impl SqlResponse {
    pub fn decode(
        buf: &mut BytesMut,
        format: &[SqlType],
        version: u16,
    ) -> Result<ControlFlow<Self, usize>, ProtocolError> {
        let mut r = XdrReader::new(buf);
        debug_assert_eq!(try_get!(r.get_u32()), op::SQL_RESPONSE);
        let count = try_get!(r.get_u32());
        let row = match count {
            0 => None,
            _ => Some(try_get!(decode_row(&mut r, format, version))),
        };
        let len = r.position();
        buf.advance(len);
        Ok(ControlFlow::Break(Self { row }))
    }
}

/// Where a fetch reply decode stands between buffer arrivals.
#[derive(Debug)]
enum FetchState {
    /// Expecting an `(opcode, status, count)` row header.
    Header,
    /// Protocol 13+: expecting the row's null bitmap.
    Bitmap,
    /// Mid row at `column`; decoded columns are already in `row`.
    Columns { column: usize, row: Vec<Value> },
}

/// Resumable decoder for a fetch reply.
///
/// A fetch reply is a train of `(op_fetch_response, status, count)` headers,
/// each carrying one row, closed by a header with a zero count. The decoder
/// consumes the buffer column by column and keeps its position across
/// retries, so a packet split mid row costs no rework.
#[derive(Debug)]
pub struct FetchDecoder {
    format: Vec<SqlType>,
    version: u16,
    rows: Vec<Vec<Value>>,
    nulls: Bitset,
    state: FetchState,
}

impl FetchDecoder {
    pub fn new(format: Vec<SqlType>, version: u16) -> Self {
        Self {
            format,
            version,
            rows: Vec::new(),
            nulls: Bitset::new(),
            state: FetchState::Header,
        }
    }

    pub fn decode(
        &mut self,
        buf: &mut BytesMut,
    ) -> Result<ControlFlow<RowBatch, usize>, ProtocolError> {
        loop {
            match &mut self.state {
                FetchState::Header => {
                    if buf.len() < 12 {
                        return Ok(ControlFlow::Continue(12));
                    }
                    let opcode = buf.get_u32();
                    if opcode != op::FETCH_RESPONSE {
                        return Err(ProtocolError::new(format!(
                            "expected fetch response, got opcode {opcode}",
                        )));
                    }
                    let fetch_status = buf.get_u32();
                    let count = buf.get_u32();
                    if count == 0 {
                        let rows = std::mem::take(&mut self.rows);
                        return Ok(ControlFlow::Break(RowBatch {
                            rows,
                            more: fetch_status != FETCH_NO_MORE_ROWS,
                        }));
                    }
                    self.state = if self.version >= proto::VERSION13 {
                        FetchState::Bitmap
                    } else {
                        FetchState::Columns {
                            column: 0,
                            row: Vec::with_capacity(self.format.len()),
                        }
                    };
                }
                FetchState::Bitmap => {
                    let len = align4(row_bitmap_len(self.format.len()));
                    if buf.len() < len {
                        return Ok(ControlFlow::Continue(len));
                    }
                    self.nulls = Bitset::from_bytes(&buf[..row_bitmap_len(self.format.len())]);
                    buf.advance(len);
                    self.state = FetchState::Columns {
                        column: 0,
                        row: Vec::with_capacity(self.format.len()),
                    };
                }
                FetchState::Columns { column, row } => {
                    while *column < self.format.len() {
                        let ty = &self.format[*column];
                        let legacy = self.version < proto::VERSION13;
                        if !legacy && self.nulls.get(*column) {
                            row.push(Value::Null);
                            *column += 1;
                            continue;
                        }
                        let mut r = XdrReader::new(buf);
                        match ty.decode(&mut r, legacy) {
                            Ok(value) => {
                                let len = r.position();
                                buf.advance(len);
                                row.push(value);
                                *column += 1;
                            }
                            Err(incomplete) => {
                                return Ok(ControlFlow::Continue(incomplete.needed));
                            }
                        }
                    }
                    self.rows.push(std::mem::take(row));
                    self.state = FetchState::Header;
                }
            }
        }
    }
}

/// An event notification arriving on the auxiliary connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventNotice {
    pub db_handle: i32,
    /// Raw counted event block, same layout as the request block.
    pub buffer: Vec<u8>,
    pub event_id: u32,
}

impl EventNotice {
    pub fn decode(buf: &mut BytesMut) -> Result<ControlFlow<Self, usize>, ProtocolError> {
        let mut r = XdrReader::new(buf);
        debug_assert_eq!(try_get!(r.get_u32()), op::EVENT);
        let db_handle = try_get!(r.get_i32());
        let buffer = try_get!(r.get_buffer()).to_vec();
        // unused ast pointer pair
        try_get!(r.get_i64());
        let event_id = try_get!(r.get_u32());
        let len = r.position();
        buf.advance(len);
        Ok(ControlFlow::Break(Self { db_handle, buffer, event_id }))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{proto::arg, wire::xdr::XdrWriter};

    fn generic_ok(handle: i32, buffer: &[u8]) -> BytesMut {
        let mut buf = BytesMut::new();
        let mut w = XdrWriter::new(&mut buf);
        w.put_u32(op::RESPONSE);
        w.put_i32(handle);
        w.put_quad(0, 0);
        w.put_bytes(buffer);
        w.put_u32(arg::GDS);
        w.put_u32(0);
        w.put_u32(arg::END);
        buf
    }

    #[test]
    fn generic_response_round_trip() {
        let mut buf = generic_ok(7, b"info");
        let got = GenericResponse::decode(&mut buf).unwrap();
        let ControlFlow::Break(resp) = got else { panic!("incomplete") };
        assert_eq!(resp.handle, 7);
        assert_eq!(resp.buffer, b"info");
        assert!(resp.error.is_none());
        assert!(buf.is_empty());
    }

    #[test]
    fn generic_response_surfaces_error() {
        let mut buf = BytesMut::new();
        let mut w = XdrWriter::new(&mut buf);
        w.put_u32(op::RESPONSE);
        w.put_i32(0);
        w.put_quad(0, 0);
        w.put_bytes(&[]);
        w.put_u32(arg::GDS);
        w.put_u32(335544569);
        w.put_u32(arg::END);
        let ControlFlow::Break(resp) = GenericResponse::decode(&mut buf).unwrap() else {
            panic!("incomplete")
        };
        let err = resp.ok().unwrap_err();
        assert_eq!(err.gds_code, 335544569);
    }

    #[test]
    fn plain_accept() {
        let mut buf = BytesMut::new();
        let mut w = XdrWriter::new(&mut buf);
        w.put_u32(op::ACCEPT);
        w.put_u32(10);
        w.put_u32(proto::ARCH_GENERIC);
        w.put_u32(proto::PTYPE_BATCH_SEND);
        let ControlFlow::Break(accept) = Accept::decode(&mut buf).unwrap() else {
            panic!("incomplete")
        };
        assert_eq!(accept.version, 10);
        assert!(!accept.lazy());
        assert!(accept.data.is_empty());
    }

    #[test]
    fn accept_data_normalizes_flagged_version() {
        let mut buf = BytesMut::new();
        let mut w = XdrWriter::new(&mut buf);
        w.put_u32(op::ACCEPT_DATA);
        w.put_u32(proto::FLAGGED | 13);
        w.put_u32(proto::ARCH_GENERIC);
        w.put_u32(proto::PTYPE_LAZY_SEND);
        w.put_bytes(b"salt+key");
        w.put_string("Srp");
        w.put_u32(0);
        w.put_bytes(&[]);
        let ControlFlow::Break(accept) = Accept::decode(&mut buf).unwrap() else {
            panic!("incomplete")
        };
        assert_eq!(accept.version, 13);
        assert!(accept.lazy());
        assert_eq!(accept.plugin, "Srp");
        assert!(!accept.is_authenticated);
        assert_eq!(accept.data, b"salt+key");
    }

    fn int_pair_row(w: &mut XdrWriter<'_>, a: i32, b: i32) {
        w.put_u32(op::FETCH_RESPONSE);
        w.put_u32(0);
        w.put_u32(1);
        w.put_text(&[0]); // bitmap: both columns present
        w.put_i32(a);
        w.put_i32(b);
    }

    /// Three rows of two integer columns, delivered one byte at a time.
    #[test]
    fn fetch_survives_arbitrary_fragmentation() {
        let mut full = BytesMut::new();
        {
            let mut w = XdrWriter::new(&mut full);
            int_pair_row(&mut w, 1, 2);
            int_pair_row(&mut w, 3, 4);
            int_pair_row(&mut w, 5, 6);
            w.put_u32(op::FETCH_RESPONSE);
            w.put_u32(0);
            w.put_u32(0);
        }

        let format = vec![SqlType::Long { scale: 0 }, SqlType::Long { scale: 0 }];
        let mut dec = FetchDecoder::new(format, proto::VERSION13);
        let mut buf = BytesMut::new();
        let mut batch = None;
        for (i, byte) in full.iter().enumerate() {
            buf.extend_from_slice(&[*byte]);
            match dec.decode(&mut buf).unwrap() {
                ControlFlow::Break(b) => {
                    batch = Some(b);
                    assert_eq!(i, full.len() - 1);
                }
                ControlFlow::Continue(needed) => assert!(needed > buf.len()),
            }
        }
        let batch = batch.unwrap();
        assert_eq!(
            batch.rows,
            vec![
                vec![Value::Int(1), Value::Int(2)],
                vec![Value::Int(3), Value::Int(4)],
                vec![Value::Int(5), Value::Int(6)],
            ],
        );
        assert!(batch.more);
        assert!(buf.is_empty());
    }

    #[test]
    fn fetch_end_of_cursor() {
        let mut buf = BytesMut::new();
        {
            let mut w = XdrWriter::new(&mut buf);
            int_pair_row(&mut w, 9, 10);
            w.put_u32(op::FETCH_RESPONSE);
            w.put_u32(FETCH_NO_MORE_ROWS);
            w.put_u32(0);
        }
        let format = vec![SqlType::Long { scale: 0 }, SqlType::Long { scale: 0 }];
        let mut dec = FetchDecoder::new(format, proto::VERSION13);
        let ControlFlow::Break(batch) = dec.decode(&mut buf).unwrap() else {
            panic!("incomplete")
        };
        assert_eq!(batch.rows.len(), 1);
        assert!(!batch.more);
    }

    #[test]
    fn fetch_null_bitmap_skips_payload() {
        let mut buf = BytesMut::new();
        {
            let mut w = XdrWriter::new(&mut buf);
            w.put_u32(op::FETCH_RESPONSE);
            w.put_u32(0);
            w.put_u32(1);
            w.put_text(&[0b01]); // first column null, no payload for it
            w.put_i32(42);
            w.put_u32(op::FETCH_RESPONSE);
            w.put_u32(FETCH_NO_MORE_ROWS);
            w.put_u32(0);
        }
        let format = vec![SqlType::Long { scale: 0 }, SqlType::Long { scale: 0 }];
        let mut dec = FetchDecoder::new(format, proto::VERSION13);
        let ControlFlow::Break(batch) = dec.decode(&mut buf).unwrap() else {
            panic!("incomplete")
        };
        assert_eq!(batch.rows, vec![vec![Value::Null, Value::Int(42)]]);
    }

    #[test]
    fn legacy_fetch_reads_indicators() {
        let mut buf = BytesMut::new();
        {
            let mut w = XdrWriter::new(&mut buf);
            w.put_u32(op::FETCH_RESPONSE);
            w.put_u32(0);
            w.put_u32(1);
            w.put_i32(11); // payload
            w.put_i32(0); // not null
            w.put_i32(0); // null placeholder
            w.put_i32(1); // null
            w.put_u32(op::FETCH_RESPONSE);
            w.put_u32(FETCH_NO_MORE_ROWS);
            w.put_u32(0);
        }
        let format = vec![SqlType::Long { scale: 0 }, SqlType::Long { scale: 0 }];
        let mut dec = FetchDecoder::new(format, proto::VERSION10);
        let ControlFlow::Break(batch) = dec.decode(&mut buf).unwrap() else {
            panic!("incomplete")
        };
        assert_eq!(batch.rows, vec![vec![Value::Int(11), Value::Null]]);
    }

    #[test]
    fn sql_response_with_and_without_row() {
        let format = vec![SqlType::Long { scale: 0 }];

        let mut buf = BytesMut::new();
        {
            let mut w = XdrWriter::new(&mut buf);
            w.put_u32(op::SQL_RESPONSE);
            w.put_u32(1);
            w.put_text(&[0]);
            w.put_i32(5);
        }
        let ControlFlow::Break(resp) =
            SqlResponse::decode(&mut buf, &format, proto::VERSION13).unwrap()
        else {
            panic!("incomplete")
        };
        assert_eq!(resp.row, Some(vec![Value::Int(5)]));

        let mut buf = BytesMut::new();
        {
            let mut w = XdrWriter::new(&mut buf);
            w.put_u32(op::SQL_RESPONSE);
            w.put_u32(0);
        }
        let ControlFlow::Break(resp) =
            SqlResponse::decode(&mut buf, &format, proto::VERSION13).unwrap()
        else {
            panic!("incomplete")
        };
        assert_eq!(resp.row, None);
    }

    #[test]
    fn partial_generic_response_leaves_buffer_untouched() {
        let full = generic_ok(1, b"abcdef");
        for cut in 1..full.len() {
            let mut buf = BytesMut::from(&full[..cut]);
            match GenericResponse::decode(&mut buf).unwrap() {
                ControlFlow::Continue(needed) => {
                    assert!(needed > cut, "needed {needed} at cut {cut}");
                    assert_eq!(&buf[..], &full[..cut]);
                }
                ControlFlow::Break(_) => panic!("decoded from {cut} bytes"),
            }
        }
    }
}
