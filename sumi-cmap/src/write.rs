//! Writing CMap and ToUnicode files in their canonical stream form.
//!
//! The output layout is fixed down to spacing and case, so equal files
//! serialise to byte-identical streams. Entry sections are emitted in blocks
//! of at most 100 entries, per Adobe's reader recommendation.

use std::io::{self, Write};

use crate::file::{CMapFile, CidRange, CidSingle};
use crate::range::CodeSpaceRange;
use crate::tounicode::{BfRange, BfSingle, ToUnicodeFile};

/// Adobe recommends at most 100 entries per `begin…`/`end…` block.
const BLOCK_LIMIT: usize = 100;

/// Write a CID CMap in canonical form.
///
/// With `pretty` set, a `%!PS-Adobe-3.0 Resource-CMap` header line is
/// prepended.
pub fn write_cmap<W: Write>(w: &mut W, cmap: &CMapFile, pretty: bool) -> io::Result<()> {
    if pretty {
        writeln!(w, "%!PS-Adobe-3.0 Resource-CMap")?;
    }

    writeln!(w, "/CIDInit /ProcSet findresource begin")?;
    writeln!(w, "12 dict begin")?;
    writeln!(w, "begincmap")?;

    if let Some(parent) = cmap.parent() {
        writeln!(w, "/{} usecmap", parent.name())?;
    }

    if let Some(info) = cmap.system_info() {
        writeln!(w, "/CIDSystemInfo 3 dict dup begin")?;
        write!(w, "/Registry ")?;
        write_ps_string(w, &info.registry)?;
        write!(w, " def /Ordering ")?;
        write_ps_string(w, &info.ordering)?;
        writeln!(w, " def /Supplement {} def", info.supplement)?;
        writeln!(w, "end def")?;
    }

    writeln!(w, "/CMapName /{} def", cmap.name())?;
    writeln!(w, "/CMapType 1 def")?;
    writeln!(w, "/WMode {} def", cmap.writing_mode().to_int())?;

    write_code_space(w, cmap.code_space())?;

    write_blocks(w, cmap.cid_singles(), "cidchar", write_cid_single)?;
    write_blocks(w, cmap.cid_ranges(), "cidrange", write_cid_range)?;
    write_blocks(w, cmap.notdef_singles(), "notdefchar", write_cid_single)?;
    write_blocks(w, cmap.notdef_ranges(), "notdefrange", write_cid_range)?;

    write_trailer(w)
}

/// Write a ToUnicode CMap in canonical form.
///
/// The character collection is fixed to `(Adobe) (UCS) 0` and the type to 2,
/// as ToUnicode streams require.
pub fn write_tounicode<W: Write>(w: &mut W, file: &ToUnicodeFile) -> io::Result<()> {
    writeln!(w, "/CIDInit /ProcSet findresource begin")?;
    writeln!(w, "12 dict begin")?;
    writeln!(w, "begincmap")?;

    if let Some(parent) = file.parent() {
        writeln!(w, "/{} usecmap", parent.name())?;
    }

    writeln!(w, "/CIDSystemInfo 3 dict dup begin")?;
    writeln!(
        w,
        "/Registry (Adobe) def /Ordering (UCS) def /Supplement 0 def"
    )?;
    writeln!(w, "end def")?;

    writeln!(w, "/CMapName /{} def", file.name())?;
    writeln!(w, "/CMapType 2 def")?;
    writeln!(w, "/WMode 0 def")?;

    write_code_space(w, file.code_space())?;

    write_blocks(w, file.singles(), "bfchar", write_bf_single)?;
    write_blocks(w, file.ranges(), "bfrange", write_bf_range)?;

    write_trailer(w)
}

fn write_trailer<W: Write>(w: &mut W) -> io::Result<()> {
    writeln!(w, "endcmap")?;
    writeln!(w, "CMapName currentdict /CMap defineresource pop")?;
    writeln!(w, "end")?;
    writeln!(w, "end")
}

fn write_code_space<W: Write>(w: &mut W, code_space: &CodeSpaceRange) -> io::Result<()> {
    if code_space.ranges().is_empty() {
        return Ok(());
    }

    writeln!(w, "{} begincodespacerange", code_space.ranges().len())?;
    for range in code_space.ranges() {
        write_hex(w, range.low())?;
        write!(w, " ")?;
        write_hex(w, range.high())?;
        writeln!(w)?;
    }
    writeln!(w, "endcodespacerange")
}

fn write_blocks<W: Write, T>(
    w: &mut W,
    entries: &[T],
    section: &str,
    entry: impl Fn(&mut W, &T) -> io::Result<()>,
) -> io::Result<()> {
    for block in entries.chunks(BLOCK_LIMIT) {
        writeln!(w, "{} begin{section}", block.len())?;
        for e in block {
            entry(w, e)?;
        }
        writeln!(w, "end{section}")?;
    }

    Ok(())
}

fn write_cid_single<W: Write>(w: &mut W, single: &CidSingle) -> io::Result<()> {
    write_hex(w, single.code.as_slice())?;
    writeln!(w, " {}", single.cid)
}

fn write_cid_range<W: Write>(w: &mut W, range: &CidRange) -> io::Result<()> {
    write_hex(w, range.first.as_slice())?;
    write!(w, " ")?;
    write_hex(w, range.last.as_slice())?;
    writeln!(w, " {}", range.cid)
}

fn write_bf_single<W: Write>(w: &mut W, single: &BfSingle) -> io::Result<()> {
    write_hex(w, single.code.as_slice())?;
    write!(w, " ")?;
    write_utf16_hex(w, &single.value)?;
    writeln!(w)
}

fn write_bf_range<W: Write>(w: &mut W, range: &BfRange) -> io::Result<()> {
    write_hex(w, range.first.as_slice())?;
    write!(w, " ")?;
    write_hex(w, range.last.as_slice())?;
    write!(w, " ")?;

    if let [base] = range.values.as_slice() {
        write_utf16_hex(w, base)?;
    } else {
        write!(w, "[")?;
        for (i, value) in range.values.iter().enumerate() {
            if i > 0 {
                write!(w, " ")?;
            }
            write_utf16_hex(w, value)?;
        }
        write!(w, "]")?;
    }

    writeln!(w)
}

fn write_hex<W: Write>(w: &mut W, bytes: &[u8]) -> io::Result<()> {
    write!(w, "<")?;
    for b in bytes {
        write!(w, "{b:02x}")?;
    }
    write!(w, ">")
}

fn write_utf16_hex<W: Write>(w: &mut W, value: &str) -> io::Result<()> {
    write!(w, "<")?;
    for unit in value.encode_utf16() {
        write!(w, "{unit:04x}")?;
    }
    write!(w, ">")
}

/// Literal strings escape backslashes and unbalanced-parenthesis hazards.
fn write_ps_string<W: Write>(w: &mut W, bytes: &[u8]) -> io::Result<()> {
    w.write_all(b"(")?;
    for &b in bytes {
        match b {
            b'(' | b')' | b'\\' => w.write_all(&[b'\\', b])?,
            _ => w.write_all(&[b])?,
        }
    }
    w.write_all(b")")
}
