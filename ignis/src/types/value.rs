//! Decoded column values and bind parameters.
use time::{Date, PrimitiveDateTime, Time};

/// A blob or array id: two 32-bit halves of a quad, assigned by the server.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlobId {
    pub high: i32,
    pub low: i32,
}

impl BlobId {
    pub fn new(high: i32, low: i32) -> Self {
        Self { high, low }
    }

    pub fn is_empty(&self) -> bool {
        self.high == 0 && self.low == 0
    }
}

/// A single column value, decoded from a row or bound as a parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int(i64),
    Double(f64),
    Text(String),
    /// Binary payload; on the bind path this is staged into a blob first.
    Bytes(Vec<u8>),
    Boolean(bool),
    Date(Date),
    Time(Time),
    Timestamp(PrimitiveDateTime),
    Blob(BlobId),
    /// Exact scaled value too large for `i64` or `f64`, rendered as a
    /// decimal string.
    Decimal(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.into())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<Date> for Value {
    fn from(v: Date) -> Self {
        Value::Date(v)
    }
}

impl From<Time> for Value {
    fn from(v: Time) -> Self {
        Value::Time(v)
    }
}

impl From<PrimitiveDateTime> for Value {
    fn from(v: PrimitiveDateTime) -> Self {
        Value::Timestamp(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// Interpret a raw scaled integer.
///
/// Scale zero stays integral; a negative scale divides by a power of ten.
/// Values that survive the trip through `f64` use it, anything wider is
/// rendered exactly as a decimal string split at the scale boundary.
pub fn scaled(raw: i128, scale: i16) -> Value {
    if scale == 0 {
        return match i64::try_from(raw) {
            Ok(n) => Value::Int(n),
            Err(_) => Value::Decimal(raw.to_string()),
        };
    }
    if scale > 0 {
        let factor = 10i128.pow(scale as u32);
        return match raw.checked_mul(factor).and_then(|n| i64::try_from(n).ok()) {
            Some(n) => Value::Int(n),
            None => Value::Decimal(decimal_string(raw, scale)),
        };
    }
    // 2^53: the largest magnitude f64 holds exactly
    const SAFE: i128 = 1 << 53;
    if raw.abs() < SAFE {
        Value::Double(raw as f64 / 10f64.powi(-scale as i32))
    } else {
        Value::Decimal(decimal_string(raw, scale))
    }
}

/// Exact decimal rendering of `raw * 10^scale`.
pub fn decimal_string(raw: i128, scale: i16) -> String {
    if scale >= 0 {
        let mut s = raw.to_string();
        s.extend(std::iter::repeat_n('0', scale as usize));
        return s;
    }
    let digits = -scale as usize;
    let sign = if raw < 0 { "-" } else { "" };
    let abs = raw.unsigned_abs();
    let factor = 10u128.pow(digits as u32);
    format!("{sign}{}.{:0width$}", abs / factor, abs % factor, width = digits)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn scale_divides() {
        // scale -2 turns 12345 into 123.45
        assert_eq!(scaled(12345, -2), Value::Double(123.45));
        assert_eq!(scaled(-5, -1), Value::Double(-0.5));
    }

    #[test]
    fn scale_zero_is_integral() {
        assert_eq!(scaled(7, 0), Value::Int(7));
        assert_eq!(scaled(i64::MAX as i128 + 1, 0), Value::Decimal("9223372036854775808".into()));
    }

    #[test]
    fn wide_values_render_exactly() {
        let raw = 123456789012345678901234567890i128;
        assert_eq!(scaled(raw, -4), Value::Decimal("12345678901234567890123456.7890".into()));
        assert_eq!(decimal_string(-1, -3), "-0.001");
        assert_eq!(decimal_string(42, 2), "4200");
    }

    #[test]
    fn null_from_option() {
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(Value::from(Some(3i64)), Value::Int(3));
    }
}
