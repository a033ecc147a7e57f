/*!
Character codes, CMap and ToUnicode files for PDF composite fonts.

This crate implements the translation layer between the three domains a
composite font juggles:

- raw byte sequences in content streams (1 to 4 bytes per character code),
- CIDs, which select glyphs within a character collection,
- Unicode text attached to codes for extraction and copy/paste.

The pieces fit together like this: a [`CodeSpaceRange`] describes which byte
sequences are valid codes, and compiles into a [`Codec`] that segments a byte
stream into codes. A [`CMapFile`] maps the byte form of a code to a CID, with
`usecmap` parent chaining and `.notdef` fallbacks; [`ToUnicodeFile`] is the
same shape with Unicode strings as values. [`read_cmap`]/[`write_cmap`] (and
the `tounicode` twins) convert between these records and the PostScript-style
stream format, and [`predefined`] resolves the standard CMap names from an
embedded resource bundle.

## Safety
This crate forbids unsafe code via a crate-level attribute.
*/

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod codec;
mod error;
mod file;
mod optimize;
#[cfg(feature = "embed-cmaps")]
mod predefined;
mod range;
mod read;
mod tounicode;
mod write;

pub use codec::Codec;
pub use error::{Error, Result};
pub use file::{CMapFile, CidIter, CidRange, CidSingle};
#[cfg(feature = "embed-cmaps")]
pub use predefined::{embedded_names, predefined, predefined_name};
pub use range::{CodeRange, CodeSpaceRange};
pub use read::{extract_cmap, read_cmap, read_tounicode};
pub use tounicode::{BfRange, BfSingle, ToUnicodeFile};
pub use write::{write_cmap, write_tounicode};

use std::fmt;

/// A CID (Character Identifier).
pub type Cid = u32;

/// The compact integer id a [`Codec`] assigns to an accepted byte sequence.
///
/// Codes are only meaningful relative to the codec that produced them and
/// must not be persisted.
pub type Code = u32;

/// The byte form of a character code: one to four raw bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CodeBytes {
    len: u8,
    bytes: [u8; 4],
}

impl CodeBytes {
    /// Wrap a byte sequence of length 1 to 4.
    pub fn new(bytes: &[u8]) -> Option<Self> {
        if bytes.is_empty() || bytes.len() > 4 {
            return None;
        }

        let mut buf = [0; 4];
        buf[..bytes.len()].copy_from_slice(bytes);

        Some(Self {
            len: bytes.len() as u8,
            bytes: buf,
        })
    }

    /// Crate-internal infallible construction; `len` must be 1..=4.
    pub(crate) fn from_fixed(len: usize, bytes: [u8; 4]) -> Self {
        debug_assert!((1..=4).contains(&len));
        Self {
            len: len as u8,
            bytes,
        }
    }

    /// The bytes of the code.
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes[..usize::from(self.len)]
    }

    /// The number of bytes in the code.
    pub fn len(&self) -> usize {
        usize::from(self.len)
    }

    /// Always `false`; present to satisfy the usual slice-like surface.
    pub fn is_empty(&self) -> bool {
        false
    }
}

impl AsRef<[u8]> for CodeBytes {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl fmt::Debug for CodeBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<")?;
        for b in self.as_slice() {
            write!(f, "{b:02x}")?;
        }
        f.write_str(">")
    }
}

/// The writing mode of a CMap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WritingMode {
    /// Horizontal writing mode (`WMode 0`).
    #[default]
    Horizontal,
    /// Vertical writing mode (`WMode 1`).
    Vertical,
}

impl WritingMode {
    pub(crate) fn to_int(self) -> i32 {
        match self {
            Self::Horizontal => 0,
            Self::Vertical => 1,
        }
    }
}

/// The Registry/Ordering/Supplement triple identifying a character
/// collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CidSystemInfo {
    /// The registry name, e.g. `b"Adobe"`.
    pub registry: Vec<u8>,
    /// The ordering name, e.g. `b"Japan1"`.
    pub ordering: Vec<u8>,
    /// The supplement number.
    pub supplement: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_bytes_bounds() {
        assert!(CodeBytes::new(b"").is_none());
        assert!(CodeBytes::new(b"\x01").is_some());
        assert!(CodeBytes::new(b"\x01\x02\x03\x04").is_some());
        assert!(CodeBytes::new(b"\x01\x02\x03\x04\x05").is_none());
    }

    #[test]
    fn code_bytes_slice() {
        let code = CodeBytes::new(&[0x81, 0x40]).unwrap();
        assert_eq!(code.as_slice(), &[0x81, 0x40]);
        assert_eq!(code.len(), 2);
        assert!(!code.is_empty());
    }

    #[test]
    fn code_bytes_debug() {
        let code = CodeBytes::new(&[0x8e, 0xa0]).unwrap();
        assert_eq!(format!("{code:?}"), "<8ea0>");
    }

    #[test]
    fn code_bytes_ordering() {
        // Same length: lexicographic by byte.
        let a = CodeBytes::new(&[0x81, 0x40]).unwrap();
        let b = CodeBytes::new(&[0x81, 0x7e]).unwrap();
        assert!(a < b);
    }
}
