use alloc::vec::Vec;

use crate::error::{Error, Result};
use crate::reader::Reader;

/// A PostScript string object.
///
/// The scanner keeps the raw, still-encoded bytes; [`String::decode`] resolves
/// escape sequences (literal strings) or hex digits (hex strings).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct String<'a> {
    data: &'a [u8],
    hex: bool,
}

impl<'a> String<'a> {
    pub(crate) const fn literal(data: &'a [u8]) -> Self {
        Self { data, hex: false }
    }

    pub(crate) const fn hex(data: &'a [u8]) -> Self {
        Self { data, hex: true }
    }

    /// Decode the string content into `out`, replacing any previous contents.
    pub fn decode_into(&self, out: &mut Vec<u8>) -> Result<()> {
        out.clear();
        if self.hex {
            decode_hex_into(self.data, out)
        } else {
            decode_literal_into(self.data, out)
        }
        .ok_or(Error::SyntaxError)
    }

    /// Decode the string content.
    pub fn decode(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.decode_into(&mut out)?;
        Ok(out)
    }
}

/// Consume a `( … )` string, returning the raw bytes between the outer
/// parentheses. Balanced inner parentheses and escapes are skipped over.
pub(crate) fn parse_literal<'a>(r: &mut Reader<'a>) -> Option<&'a [u8]> {
    if !r.eat(b'(') {
        return None;
    }

    let start = r.offset();
    let mut depth = 1_u32;

    loop {
        match r.next()? {
            b'\\' => {
                let _ = r.next()?;
            }
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return r.slice(start..r.offset() - 1);
                }
            }
            _ => {}
        }
    }
}

/// Consume a `< … >` string, returning the raw hex digits.
pub(crate) fn parse_hex<'a>(r: &mut Reader<'a>) -> Option<&'a [u8]> {
    if !r.eat(b'<') {
        return None;
    }

    let start = r.offset();
    loop {
        if r.next()? == b'>' {
            return r.slice(start..r.offset() - 1);
        }
    }
}

#[inline]
pub(crate) fn decode_hex_digit(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

fn decode_hex_into(data: &[u8], out: &mut Vec<u8>) -> Option<()> {
    let mut hi: Option<u8> = None;

    for &b in data {
        if crate::reader::is_whitespace(b) {
            continue;
        }

        let digit = decode_hex_digit(b)?;
        match hi.take() {
            Some(h) => out.push(h << 4 | digit),
            None => hi = Some(digit),
        }
    }

    // A trailing odd nibble counts as its own byte with a zero low nibble.
    if let Some(h) = hi {
        out.push(h << 4);
    }

    Some(())
}

fn decode_literal_into(data: &[u8], out: &mut Vec<u8>) -> Option<()> {
    let mut r = Reader::new(data);

    while let Some(b) = r.next() {
        match b {
            b'\\' => decode_escape(&mut r, out)?,
            // Any unescaped end-of-line inside a string reads as a single \n.
            b'\r' => {
                r.eat(b'\n');
                out.push(b'\n');
            }
            _ => out.push(b),
        }
    }

    Some(())
}

fn decode_escape(r: &mut Reader<'_>, out: &mut Vec<u8>) -> Option<()> {
    match r.next()? {
        b'n' => out.push(b'\n'),
        b'r' => out.push(b'\r'),
        b't' => out.push(b'\t'),
        b'b' => out.push(0x08),
        b'f' => out.push(0x0c),
        b'(' => out.push(b'('),
        b')' => out.push(b')'),
        b'\\' => out.push(b'\\'),
        // A backslash before an end-of-line continues the line.
        b'\n' => {}
        b'\r' => {
            r.eat(b'\n');
        }
        b @ b'0'..=b'7' => {
            let mut value = u16::from(b - b'0');
            for _ in 0..2 {
                match r.peek() {
                    Some(d @ b'0'..=b'7') => {
                        value = value * 8 + u16::from(d - b'0');
                        r.bump();
                    }
                    _ => break,
                }
            }
            out.push(value as u8);
        }
        // An unknown escape stands for the escaped character itself.
        other => out.push(other),
    }

    Some(())
}

/// Skip over a string without decoding it. Used when scanning the extent of
/// composite objects.
pub(crate) fn skip(r: &mut Reader<'_>) -> Option<()> {
    match r.peek()? {
        b'(' => parse_literal(r).map(|_| ()),
        b'<' => parse_hex(r).map(|_| ()),
        _ => None,
    }
}
