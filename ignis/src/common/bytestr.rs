use bytes::Bytes;
use std::{fmt, ops::Deref};

/// A cheaply cloneable immutable string, backed by [`Bytes`].
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ByteStr {
    bytes: Bytes,
}

impl ByteStr {
    pub const fn new() -> Self {
        Self { bytes: Bytes::new() }
    }

    pub const fn from_static(s: &'static str) -> Self {
        Self { bytes: Bytes::from_static(s.as_bytes()) }
    }

    pub fn copy_from_str(s: &str) -> Self {
        Self { bytes: Bytes::copy_from_slice(s.as_bytes()) }
    }

    /// Slice that borrows from the same allocation as `self`.
    ///
    /// # Panics
    ///
    /// Panics when `subset` is not contained in `self`.
    pub fn slice_ref(&self, subset: &str) -> Self {
        Self { bytes: self.bytes.slice_ref(subset.as_bytes()) }
    }

    pub fn as_str(&self) -> &str {
        // invariant: construction only accepts `str`
        unsafe { std::str::from_utf8_unchecked(&self.bytes) }
    }
}

impl Deref for ByteStr {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        self.as_str()
    }
}

impl From<String> for ByteStr {
    fn from(s: String) -> Self {
        Self { bytes: Bytes::from(s.into_bytes()) }
    }
}

impl From<&str> for ByteStr {
    fn from(s: &str) -> Self {
        Self::copy_from_str(s)
    }
}

impl fmt::Display for ByteStr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for ByteStr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_str(), f)
    }
}
