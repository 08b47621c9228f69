//! SQL data types: wire descriptors, row decoding and parameter binding.
pub mod datetime;
pub mod value;

use bytes::BytesMut;

pub use value::{BlobId, Value};

use crate::{
    codec::{Incomplete, ProtocolError},
    wire::{
        bitset::Bitset,
        blr::BlrWriter,
        xdr::{XdrReader, XdrWriter},
    },
};

/// Wire type codes from the statement description. Odd means nullable.
pub mod sql {
    pub const TEXT: u16 = 452;
    pub const VARYING: u16 = 448;
    pub const SHORT: u16 = 500;
    pub const LONG: u16 = 496;
    pub const FLOAT: u16 = 482;
    pub const DOUBLE: u16 = 480;
    pub const D_FLOAT: u16 = 530;
    pub const TIMESTAMP: u16 = 510;
    pub const BLOB: u16 = 520;
    pub const ARRAY: u16 = 540;
    pub const QUAD: u16 = 550;
    pub const TIME: u16 = 560;
    pub const DATE: u16 = 570;
    pub const INT64: u16 = 580;
    pub const INT128: u16 = 32752;
    pub const BOOLEAN: u16 = 32764;
    pub const NULL: u16 = 32766;
}

/// Byte codes of the tagged message format.
mod blr_code {
    pub const SHORT: u8 = 7;
    pub const LONG: u8 = 8;
    pub const QUAD: u8 = 9;
    pub const FLOAT: u8 = 10;
    pub const D_FLOAT: u8 = 11;
    pub const DATE: u8 = 12;
    pub const TIME: u8 = 13;
    pub const TEXT: u8 = 14;
    pub const INT64: u8 = 16;
    pub const BOOL: u8 = 23;
    pub const INT128: u8 = 26;
    pub const DOUBLE: u8 = 27;
    pub const TIMESTAMP: u8 = 35;
    pub const VARYING: u8 = 37;
    pub const END: u8 = 255;
    pub const EOC: u8 = 76;
}

/// A column's wire type, with the metadata row codecs need.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    /// Fixed-length text, space padded by the server.
    Text { len: u16 },
    /// Length-prefixed text.
    Varying { len: u16 },
    Short { scale: i16 },
    Long { scale: i16 },
    Int64 { scale: i16 },
    Int128 { scale: i16 },
    Float,
    Double,
    /// Blob or array id.
    Quad,
    Date,
    Time,
    Timestamp,
    Boolean,
    Null,
}

impl SqlType {
    /// Map a statement description entry to a type. The low bit of `code`
    /// only carries nullability and is masked off.
    pub fn from_wire(code: u16, scale: i16, len: u16) -> Result<Self, ProtocolError> {
        Ok(match code & !1 {
            sql::TEXT => Self::Text { len },
            sql::VARYING => Self::Varying { len },
            sql::SHORT => Self::Short { scale },
            sql::LONG => Self::Long { scale },
            sql::INT64 => Self::Int64 { scale },
            sql::INT128 => Self::Int128 { scale },
            sql::FLOAT | sql::D_FLOAT => Self::Float,
            sql::DOUBLE => Self::Double,
            sql::BLOB | sql::ARRAY | sql::QUAD => Self::Quad,
            sql::DATE => Self::Date,
            sql::TIME => Self::Time,
            sql::TIMESTAMP => Self::Timestamp,
            sql::BOOLEAN => Self::Boolean,
            sql::NULL => Self::Null,
            n => return Err(ProtocolError::new(format!("unknown sql type {n}"))),
        })
    }

    /// Decode one column payload from row data.
    ///
    /// With `legacy_nulls` a trailing 32-bit indicator follows every payload
    /// and a nonzero value discards it; newer protocols flag nulls in the
    /// row bitmap and omit the payload entirely, so the caller never gets
    /// here for them.
    pub fn decode(&self, r: &mut XdrReader<'_>, legacy_nulls: bool) -> Result<Value, Incomplete> {
        let value = match *self {
            Self::Text { len } => text(r.get_text(len as usize)?),
            Self::Varying { .. } => text(r.get_buffer()?),
            Self::Short { scale } | Self::Long { scale } => {
                value::scaled(r.get_i32()? as i128, scale)
            }
            Self::Int64 { scale } => value::scaled(r.get_i64()? as i128, scale),
            Self::Int128 { scale } => value::scaled(r.get_i128()?, scale),
            Self::Float => Value::Double(r.get_f32()? as f64),
            Self::Double => Value::Double(r.get_f64()?),
            Self::Quad => {
                let (high, low) = r.get_quad()?;
                Value::Blob(BlobId::new(high, low))
            }
            Self::Date => Value::Date(datetime::decode_date(r.get_i32()?)),
            Self::Time => Value::Time(datetime::decode_time(r.get_u32()?)),
            Self::Timestamp => {
                let days = r.get_i32()?;
                let ticks = r.get_u32()?;
                Value::Timestamp(datetime::decode_timestamp(days, ticks))
            }
            Self::Boolean => Value::Boolean(r.get_text(1)?[0] != 0),
            Self::Null => Value::Null,
        };
        if legacy_nulls && r.get_i32()? != 0 {
            return Ok(Value::Null);
        }
        Ok(value)
    }

    /// Emit this type's byte codes into a message description.
    fn blr(&self, w: &mut BlrWriter) {
        use blr_code as c;
        match *self {
            Self::Text { len } => put_len16(w, c::TEXT, len),
            Self::Varying { len } => put_len16(w, c::VARYING, len),
            Self::Short { scale } => put_scaled(w, c::SHORT, scale),
            Self::Long { scale } => put_scaled(w, c::LONG, scale),
            Self::Int64 { scale } => put_scaled(w, c::INT64, scale),
            Self::Int128 { scale } => put_scaled(w, c::INT128, scale),
            Self::Float => w.put_u8(c::FLOAT),
            Self::Double => w.put_u8(c::DOUBLE),
            Self::Quad => put_scaled(w, c::QUAD, 0),
            Self::Date => w.put_u8(c::DATE),
            Self::Time => w.put_u8(c::TIME),
            Self::Timestamp => w.put_u8(c::TIMESTAMP),
            Self::Boolean => w.put_u8(c::BOOL),
            Self::Null => put_len16(w, c::TEXT, 0),
        }
    }
}

fn put_len16(w: &mut BlrWriter, code: u8, len: u16) {
    w.put_u8(code);
    w.put_u8(len as u8);
    w.put_u8((len >> 8) as u8);
}

fn put_scaled(w: &mut BlrWriter, code: u8, scale: i16) {
    w.put_u8(code);
    w.put_u8(scale as u8);
}

fn text(bytes: &[u8]) -> Value {
    Value::Text(String::from_utf8_lossy(bytes).into_owned())
}

/// Full statement description of one column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub ty: SqlType,
    pub subtype: i16,
    pub nullable: bool,
    pub field: String,
    pub relation: String,
    pub owner: String,
    pub alias: String,
}

impl Column {
    /// Preferred display name.
    pub fn name(&self) -> &str {
        if self.alias.is_empty() { &self.field } else { &self.alias }
    }
}

/// Build the message description for a row of `columns`.
///
/// Layout: version, begin, message 0, a little-endian slot count of two per
/// column (payload plus null indicator short), each column's type codes, and
/// the end markers.
pub fn message_blr(columns: &[SqlType]) -> BlrWriter {
    use blr_code as c;
    let mut w = BlrWriter::new();
    let slots = columns.len() * 2;
    w.put_u8(5); // version 5
    w.put_u8(2); // begin
    w.put_u8(4); // message
    w.put_u8(0);
    w.put_u8(slots as u8);
    w.put_u8((slots >> 8) as u8);
    for ty in columns {
        ty.blr(&mut w);
        put_scaled(&mut w, c::SHORT, 0); // null indicator slot
    }
    w.put_u8(c::END);
    w.put_u8(c::EOC);
    w
}

/// Largest VARCHAR payload the server accepts; longer text travels as a
/// blob.
pub(crate) const MAX_VARYING: usize = 32765;

/// Pick the wire type a bound parameter travels as.
fn param_type(value: &Value) -> SqlType {
    match value {
        Value::Null => SqlType::Long { scale: 0 },
        Value::Int(n) if i32::try_from(*n).is_ok() => SqlType::Long { scale: 0 },
        Value::Int(_) => SqlType::Int64 { scale: 0 },
        Value::Double(_) => SqlType::Double,
        Value::Text(s) => SqlType::Varying { len: s.len() as u16 },
        Value::Bytes(b) => SqlType::Varying { len: b.len() as u16 },
        Value::Decimal(s) => SqlType::Varying { len: s.len() as u16 },
        Value::Boolean(_) => SqlType::Boolean,
        Value::Date(_) => SqlType::Date,
        Value::Time(_) => SqlType::Time,
        Value::Timestamp(_) => SqlType::Timestamp,
        Value::Blob(_) => SqlType::Quad,
    }
}

fn encode_param(w: &mut XdrWriter<'_>, value: &Value) {
    match value {
        Value::Null => w.put_i32(0), // placeholder, width of Long
        Value::Int(n) => match i32::try_from(*n) {
            Ok(n) => w.put_i32(n),
            Err(_) => w.put_i64(*n),
        },
        Value::Double(f) => w.put_f64(*f),
        Value::Text(s) => w.put_string(s),
        Value::Bytes(b) => w.put_bytes(b),
        Value::Decimal(s) => w.put_string(s),
        Value::Boolean(b) => w.put_text(&[*b as u8]),
        Value::Date(d) => w.put_i32(datetime::encode_date(*d)),
        Value::Time(t) => w.put_u32(datetime::encode_time(*t)),
        Value::Timestamp(ts) => {
            let (days, ticks) = datetime::encode_timestamp(*ts);
            w.put_i32(days);
            w.put_u32(ticks);
        }
        Value::Blob(id) => w.put_quad(id.high, id.low),
    }
}

/// Encode bind parameters into a message description and its row data.
///
/// Protocol 13 and later prefix the data with a null bitmap and omit null
/// payloads; older protocols send a zero placeholder plus a `1` in the
/// trailing indicator slot.
pub fn bind_params(values: &[Value], version: u16) -> (BytesMut, BytesMut) {
    // no parameters means no message at all, not an empty one
    if values.is_empty() {
        return (BytesMut::new(), BytesMut::new());
    }
    let types: Vec<SqlType> = values.iter().map(param_type).collect();
    let blr = message_blr(&types).into_bytes();

    let mut data = BytesMut::new();
    let mut w = XdrWriter::new(&mut data);
    if version >= crate::proto::proto::VERSION13 {
        let mut nulls = Bitset::new();
        for (i, value) in values.iter().enumerate() {
            nulls.set(i, value.is_null());
        }
        if !values.is_empty() {
            let bytes = nulls.row_bytes(values.len());
            w.put_text(&bytes);
        }
        for value in values.iter().filter(|v| !v.is_null()) {
            encode_param(&mut w, value);
        }
    } else {
        for value in values {
            encode_param(&mut w, value);
            w.put_i32(value.is_null() as i32);
        }
    }
    (blr, data)
}
