use crate::composite::{self, Array, Dict};
use crate::error::{Error, Result};
use crate::name::{self, Name};
use crate::number::{self, Number};
use crate::reader::Reader;
use crate::string::{self, String};

/// A PostScript object.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Object<'a> {
    /// A number object.
    Number(Number),
    /// A name object.
    Name(Name<'a>),
    /// A string object.
    String(String<'a>),
    /// An array object.
    Array(Array<'a>),
    /// A dictionary object.
    Dict(Dict<'a>),
}

pub(crate) fn read<'a>(r: &mut Reader<'a>) -> Result<Object<'a>> {
    skip_filler(r);

    let b = r.peek().ok_or(Error::EndOfInput)?;

    match b {
        b'(' => string::parse_literal(r)
            .map(|s| Object::String(String::literal(s)))
            .ok_or(Error::SyntaxError),
        b'<' => {
            if r.peek_pair() == Some(b"<<") {
                composite::parse_dict(r).map(|d| Object::Dict(Dict::new(d)))
            } else {
                string::parse_hex(r)
                    .map(|s| Object::String(String::hex(s)))
                    .ok_or(Error::SyntaxError)
            }
        }
        b'/' => name::parse_literal(r)
            .map(|n| Object::Name(Name::new(n, true)))
            .ok_or(Error::SyntaxError),
        b'[' => composite::parse_array(r).map(|d| Object::Array(Array::new(d))),
        b'{' => {
            r.bump();
            Err(Error::Unsupported)
        }
        b'.' | b'+' | b'-' | b'0'..=b'9' => number::read(r).map(Object::Number),
        _ => name::parse_executable(r)
            .map(|n| Object::Name(Name::new(n, false)))
            .ok_or(Error::SyntaxError),
    }
}

pub(crate) fn at_end(r: &mut Reader<'_>) -> bool {
    skip_filler(r);
    r.peek().is_none()
}

/// Skip white space and `%` comments.
pub(crate) fn skip_filler(r: &mut Reader<'_>) {
    loop {
        match r.peek() {
            Some(b) if crate::reader::is_whitespace(b) => r.bump(),
            Some(b'%') => {
                r.bump();
                r.eat_while(|b| !crate::reader::is_eol(b));
            }
            _ => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_one(input: &[u8]) -> Result<Object<'_>> {
        let mut r = Reader::new(input);
        read(&mut r)
    }

    #[test]
    fn integer() {
        assert_eq!(
            read_one(b"42 ").unwrap(),
            Object::Number(Number::Integer(42))
        );
    }

    #[test]
    fn literal_name() {
        assert_eq!(
            read_one(b"/WMode ").unwrap(),
            Object::Name(Name::new(b"WMode", true))
        );
    }

    #[test]
    fn executable_name() {
        assert_eq!(
            read_one(b"endcmap").unwrap(),
            Object::Name(Name::new(b"endcmap", false))
        );
    }

    #[test]
    fn strings() {
        assert_eq!(
            read_one(b"(Adobe)").unwrap(),
            Object::String(String::literal(b"Adobe"))
        );
        assert_eq!(
            read_one(b"<8140>").unwrap(),
            Object::String(String::hex(b"8140"))
        );
    }

    #[test]
    fn dict() {
        let obj = read_one(b"<</Registry (Adobe)>>").unwrap();
        let Object::Dict(d) = obj else {
            panic!("expected dict, got {obj:?}");
        };

        let mut inner = d.objects();
        assert_eq!(
            inner.next_object().unwrap(),
            Object::Name(Name::new(b"Registry", true))
        );
        assert_eq!(
            inner.next_object().unwrap(),
            Object::String(String::literal(b"Adobe"))
        );
        assert!(inner.at_end());
    }

    #[test]
    fn procedure_unsupported() {
        assert_eq!(read_one(b"{dup}"), Err(Error::Unsupported));
    }

    #[test]
    fn skips_whitespace_and_comments() {
        assert_eq!(
            read_one(b" \t\n% header\n 7 ").unwrap(),
            Object::Number(Number::Integer(7))
        );
    }

    #[test]
    fn eof() {
        assert_eq!(read_one(b""), Err(Error::EndOfInput));
        assert_eq!(read_one(b"  % only\n"), Err(Error::EndOfInput));
    }

    #[test]
    fn stray_delimiters() {
        assert_eq!(read_one(b"]"), Err(Error::SyntaxError));
        assert_eq!(read_one(b">x"), Err(Error::SyntaxError));
    }
}
