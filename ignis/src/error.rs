//! `ignis` error types.
use std::{backtrace::Backtrace, fmt, io, str::Utf8Error};

use crate::{
    auth::AuthError,
    codec::ProtocolError,
    config::ParseError,
    proto::status::ServerError,
};

/// A specialized [`Result`] type for `ignis` operation.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The connection is gone; no further operations can be issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("connection closed")]
pub struct ClosedError;

/// A statement was executed with the wrong number of parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("statement takes {expected} parameters, {given} given")]
pub struct ParamCountError {
    pub expected: usize,
    pub given: usize,
}

/// A query expected to return a row returned none.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("no rows returned")]
pub struct RowNotFound;

/// All possible error from `ignis` library.
pub struct Error {
    context: String,
    backtrace: Backtrace,
    kind: ErrorKind,
}

impl Error {
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }

    /// The server error, when the server reported one.
    pub fn as_server(&self) -> Option<&ServerError> {
        match &self.kind {
            ErrorKind::Server(e) => Some(e),
            _ => None,
        }
    }
}

/// All possible error kind from `ignis` library.
pub enum ErrorKind {
    Config(ParseError),
    Protocol(ProtocolError),
    Io(io::Error),
    Server(ServerError),
    Auth(AuthError),
    Utf8(Utf8Error),
    Closed(ClosedError),
    ParamCount(ParamCountError),
    RowNotFound(RowNotFound),
}

macro_rules! from {
    (<$ty:ty>$pat:pat => $body:expr) => {
        impl From<$ty> for Error {
            fn from($pat: $ty) -> Self {
                let backtrace = std::backtrace::Backtrace::capture();
                Self { context: String::new(), backtrace, kind: $body }
            }
        }
    };
}

from!(<ErrorKind>e => e);
from!(<ParseError>e => ErrorKind::Config(e));
from!(<ProtocolError>e => ErrorKind::Protocol(e));
from!(<io::Error>e => ErrorKind::Io(e));
from!(<ServerError>e => ErrorKind::Server(e));
from!(<AuthError>e => ErrorKind::Auth(e));
from!(<Utf8Error>e => ErrorKind::Utf8(e));
from!(<ClosedError>e => ErrorKind::Closed(e));
from!(<ParamCountError>e => ErrorKind::ParamCount(e));
from!(<RowNotFound>e => ErrorKind::RowNotFound(e));

impl std::error::Error for Error { }

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.context.is_empty() {
            write!(f, "{}: ", self.context)?;
        }

        fmt::Display::fmt(&self.kind, f)?;

        if let std::backtrace::BacktraceStatus::Captured = self.backtrace.status() {
            let mut backtrace = self.backtrace.to_string();
            write!(f, "\n\n")?;
            writeln!(f, "Stack backtrace:")?;
            backtrace.truncate(backtrace.trim_end().len());
            write!(f, "{}", backtrace)?;
        }

        Ok(())
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

impl std::error::Error for ErrorKind { }

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => e.fmt(f),
            Self::Protocol(e) => e.fmt(f),
            Self::Io(e) => e.fmt(f),
            Self::Server(e) => e.fmt(f),
            Self::Auth(e) => e.fmt(f),
            Self::Utf8(e) => e.fmt(f),
            Self::Closed(e) => e.fmt(f),
            Self::ParamCount(e) => e.fmt(f),
            Self::RowNotFound(e) => e.fmt(f),
        }
    }
}

impl fmt::Debug for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}
