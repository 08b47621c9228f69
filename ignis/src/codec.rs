//! Buffered protocol encoding and decoding.
use bytes::BytesMut;
use std::ops::ControlFlow;

/// Buffered protocol encoding.
///
/// The message should write itself into the provided `buf`.
pub trait ProtocolEncode {
    fn encode(self, buf: &mut BytesMut);
}

/// Buffered protocol decoding.
///
/// If decode returns [`ControlFlow::Continue`], more read is performed until
/// the *total length* carried in `Continue` is buffered, then decode is
/// retried. This repeats until [`ControlFlow::Break`] is returned with the
/// complete message.
///
/// On `Continue` the given `BytesMut` must be left untouched, so the
/// undecoded tail survives until the next arrival. On `Break` the decoder
/// must have advanced `buf` past exactly the bytes it consumed.
pub trait ProtocolDecode: Sized {
    fn decode(buf: &mut BytesMut) -> Result<ControlFlow<Self, usize>, ProtocolError>;
}

/// Signal that the buffered bytes end before the attempted read.
///
/// This is control flow, not an error: the caller buffers the tail and
/// retries once `needed` bytes are available.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Incomplete {
    /// Total buffered length required for the read to succeed.
    pub needed: usize,
}

/// An error when translating a buffer.
///
/// Unlike [`Incomplete`], this is fatal to the connection.
#[derive(Debug, thiserror::Error)]
#[error("protocol error: {message}")]
pub struct ProtocolError {
    message: String,
}

impl ProtocolError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

/// Map [`Incomplete`] into `ControlFlow::Continue`, propagating the value
/// otherwise.
macro_rules! try_get {
    ($expr:expr) => {
        match $expr {
            Ok(ok) => ok,
            Err($crate::codec::Incomplete { needed }) => {
                return Ok(::std::ops::ControlFlow::Continue(needed))
            }
        }
    };
}

pub(crate) use try_get;
