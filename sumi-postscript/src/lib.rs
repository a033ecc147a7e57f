/*!
A scanner for the PostScript subset used by CMap files.

PDF CMap streams are written in a small, fixed slice of the PostScript
language. This crate tokenizes such a stream into typed objects without
running an interpreter: numbers, literal and executable names, literal and
hex strings, arrays, and dictionaries. Procedures, ASCII85 strings and radix
numbers fall outside that slice and are reported as [`Error::Unsupported`].

A [`Scanner`] can be used in two styles. As an [`Iterator`] it yields every
object in the stream in order; the pull methods ([`Scanner::next_object`],
[`Scanner::next_string`], …) are convenient when the grammar dictates what
must come next.

## Safety
This crate forbids unsafe code via a crate-level attribute.
*/

#![no_std]
#![forbid(unsafe_code)]
#![deny(missing_docs)]

extern crate alloc;

mod composite;
mod error;
mod name;
mod number;
mod object;
mod reader;
mod string;

pub use composite::{Array, Dict};
pub use error::{Error, Result};
pub use name::Name;
pub use number::Number;
pub use object::Object;
pub use string::String;

use reader::Reader;

/// A scanner that produces the [`Object`]s of a PostScript byte stream.
#[derive(Clone, Debug)]
pub struct Scanner<'a> {
    reader: Reader<'a>,
}

impl<'a> Scanner<'a> {
    /// Create a new scanner over the given bytes.
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            reader: Reader::new(data),
        }
    }

    /// Whether only white space and comments remain.
    pub fn at_end(&mut self) -> bool {
        object::at_end(&mut self.reader)
    }

    /// Read the next object of any type.
    pub fn next_object(&mut self) -> Result<Object<'a>> {
        object::read(&mut self.reader)
    }

    /// Read the next object, which must be a string.
    pub fn next_string(&mut self) -> Result<String<'a>> {
        match self.next_object()? {
            Object::String(s) => Ok(s),
            _ => Err(Error::TypeCheck),
        }
    }

    /// Read the next object, which must be a number.
    pub fn next_number(&mut self) -> Result<Number> {
        match self.next_object()? {
            Object::Number(n) => Ok(n),
            _ => Err(Error::TypeCheck),
        }
    }

    /// Read the next object, which must be a name (literal or executable).
    pub fn next_name(&mut self) -> Result<Name<'a>> {
        match self.next_object()? {
            Object::Name(n) => Ok(n),
            _ => Err(Error::TypeCheck),
        }
    }
}

impl<'a> Iterator for Scanner<'a> {
    type Item = Result<Object<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.at_end() {
            None
        } else {
            Some(self.next_object())
        }
    }
}
