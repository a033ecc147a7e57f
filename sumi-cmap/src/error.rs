//! Error types for CMap reading, construction and the predefined registry.

use std::fmt;
use std::io;

/// A specialized [`Result`] type for CMap operations.
pub type Result<T> = std::result::Result<T, Error>;

/// An error surfaced by this crate.
///
/// Lookups never produce errors; a missing mapping yields CID 0. Out-of-range
/// entries inside an otherwise well-formed stream are logged and skipped
/// rather than reported here.
#[derive(Debug)]
pub enum Error {
    /// The input violates the CMap grammar: a stray token, a mismatched
    /// `begin…`/`end…` pair, bad hex, or an unsupported `CMapType`.
    Malformed(&'static str),
    /// A code-space or code range is structurally invalid: empty, longer than
    /// four bytes, bounds of different lengths, or `low > high` at some
    /// position.
    InvalidRange(&'static str),
    /// The requested predefined CMap name is not in the embedded set.
    UnknownCMap(String),
    /// Reading from or writing to the underlying stream failed.
    Io(io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed(what) => write!(f, "malformed CMap: {what}"),
            Self::InvalidRange(what) => write!(f, "invalid range: {what}"),
            Self::UnknownCMap(name) => write!(f, "unknown predefined CMap: {name}"),
            Self::Io(err) => write!(f, "io error: {err}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<sumi_postscript::Error> for Error {
    fn from(err: sumi_postscript::Error) -> Self {
        match err {
            sumi_postscript::Error::SyntaxError => Self::Malformed("syntaxerror"),
            sumi_postscript::Error::TypeCheck => Self::Malformed("typecheck"),
            sumi_postscript::Error::Unsupported => Self::Malformed("unsupported object type"),
            sumi_postscript::Error::EndOfInput => Self::Malformed("unexpected end of input"),
        }
    }
}
