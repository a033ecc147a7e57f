//! Error types for the scanner.

use core::fmt;

/// A specialized [`Result`] type for scanner operations.
pub type Result<T> = core::result::Result<T, Error>;

/// An error encountered while scanning a PostScript token stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A syntax error in the input.
    SyntaxError,
    /// An object of a different type than the requested one was found.
    TypeCheck,
    /// A PostScript type outside the CMap subset was encountered
    /// (procedures, ASCII85 strings, radix numbers).
    Unsupported,
    /// The input ended while an object was expected.
    EndOfInput,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SyntaxError => f.write_str("syntaxerror"),
            Self::TypeCheck => f.write_str("typecheck"),
            Self::Unsupported => f.write_str("unsupported type"),
            Self::EndOfInput => f.write_str("unexpected end of input"),
        }
    }
}

impl core::error::Error for Error {}
