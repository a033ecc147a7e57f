use crate::error::{Error, Result};
use crate::reader::{Reader, is_delimiter, is_whitespace};

/// A PostScript number object (integer or real).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    /// An integer value.
    Integer(i32),
    /// A real value.
    Real(f32),
}

impl Number {
    /// Return the value as an `i32`. Reals are truncated.
    pub fn as_i32(self) -> i32 {
        match self {
            Self::Integer(v) => v,
            Self::Real(v) => v as i32,
        }
    }

    /// Return the value as an `f32`.
    pub fn as_f32(self) -> f32 {
        match self {
            Self::Integer(v) => v as f32,
            Self::Real(v) => v,
        }
    }
}

fn at_token_end(r: &Reader<'_>) -> bool {
    match r.peek() {
        None => true,
        Some(b) => is_whitespace(b) || is_delimiter(b),
    }
}

pub(crate) fn read(r: &mut Reader<'_>) -> Result<Number> {
    let start = r.offset();

    if matches!(r.peek(), Some(b'+' | b'-')) {
        r.bump();
    }

    let digit_start = r.offset();
    r.eat_while(|b| b.is_ascii_digit());
    let has_int_digits = r.offset() > digit_start;

    // Radix numbers (`16#FFFE`) belong to full PostScript, not to the CMap
    // subset accepted here.
    if has_int_digits && r.peek() == Some(b'#') {
        return Err(Error::Unsupported);
    }

    let has_dot = r.eat(b'.');
    if has_dot {
        r.eat_while(|b| b.is_ascii_digit());
    }

    if !has_int_digits && !has_dot {
        return Err(Error::SyntaxError);
    }

    let has_exponent = matches!(r.peek(), Some(b'e' | b'E'));
    if has_exponent {
        r.bump();
        if matches!(r.peek(), Some(b'+' | b'-')) {
            r.bump();
        }
        r.eat_while(|b| b.is_ascii_digit());
    }

    if !at_token_end(r) {
        return Err(Error::SyntaxError);
    }

    let token = r.slice(start..r.offset()).ok_or(Error::SyntaxError)?;
    let token = core::str::from_utf8(token).map_err(|_| Error::SyntaxError)?;

    if has_dot || has_exponent {
        let value = token.parse::<f32>().map_err(|_| Error::SyntaxError)?;
        Ok(Number::Real(value))
    } else {
        let value = token.parse::<i32>().map_err(|_| Error::SyntaxError)?;
        Ok(Number::Integer(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_num(input: &[u8]) -> Result<Number> {
        let mut r = Reader::new(input);
        read(&mut r)
    }

    #[test]
    fn integers() {
        assert_eq!(read_num(b"0 ").unwrap(), Number::Integer(0));
        assert_eq!(read_num(b"633 ").unwrap(), Number::Integer(633));
        assert_eq!(read_num(b"-7 ").unwrap(), Number::Integer(-7));
        assert_eq!(read_num(b"+17 ").unwrap(), Number::Integer(17));
    }

    #[test]
    fn reals() {
        assert_eq!(read_num(b"34.5 ").unwrap(), Number::Real(34.5));
        assert_eq!(read_num(b"-.002 ").unwrap(), Number::Real(-0.002));
        assert_eq!(read_num(b"-1. ").unwrap(), Number::Real(-1.0));
        assert_eq!(read_num(b"1.0E-5 ").unwrap(), Number::Real(1.0e-5));
    }

    #[test]
    fn radix_rejected() {
        assert_eq!(read_num(b"16#FFFE "), Err(Error::Unsupported));
    }

    #[test]
    fn invalid() {
        assert!(read_num(b"abc").is_err());
        assert!(read_num(b"+abc").is_err());
        assert!(read_num(b"12a").is_err());
    }

    #[test]
    fn truncation() {
        assert_eq!(Number::Real(2.9).as_i32(), 2);
        assert_eq!(Number::Integer(5).as_f32(), 5.0);
    }
}
