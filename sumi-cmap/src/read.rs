//! Reading CMap and ToUnicode files from their PostScript stream form.

use std::sync::Arc;

use log::warn;
use rustc_hash::FxHashSet;
use sumi_postscript::{Object, Scanner};

use crate::error::{Error, Result};
use crate::file::{CMapFile, CidRange, CidSingle};
use crate::range::{CodeRange, CodeSpaceRange};
use crate::tounicode::{self, BfRange, BfSingle, ToUnicodeFile};
use crate::{Cid, CidSystemInfo, CodeBytes, WritingMode};

/// Upper bound on `usecmap` chain length during extraction, over and above
/// the cycle detection.
const MAX_CHAIN_DEPTH: usize = 16;

/// Read a CID CMap from its stream data.
///
/// Returns the file together with the name of its `usecmap` parent, if the
/// stream references one; resolving that name is up to the caller (see
/// [`extract_cmap`]). Entries with out-of-range values are skipped with a
/// warning; grammar violations fail the whole read.
pub fn read_cmap(data: &[u8]) -> Result<(CMapFile, Option<String>)> {
    let raw = parse_raw(data)?;

    match raw.cmap_type {
        None | Some(0) | Some(1) => {}
        Some(2) => return Err(Error::Malformed("CMapType 2 is a ToUnicode CMap")),
        Some(_) => return Err(Error::Malformed("unsupported CMapType")),
    }

    let system_info = raw.system_info();
    let name = raw.name.ok_or(Error::Malformed("missing /CMapName"))?;

    let mut file = CMapFile::new(name, CodeSpaceRange::new(raw.code_space));
    file.system_info = system_info;
    file.writing_mode = raw.writing_mode;
    file.cid_singles = raw.cid_singles;
    file.cid_ranges = raw.cid_ranges;
    file.notdef_singles = raw.notdef_singles;
    file.notdef_ranges = raw.notdef_ranges;

    Ok((file, raw.use_cmap))
}

/// Read a ToUnicode CMap from its stream data.
///
/// A missing `/CMapName` defaults to the conventional `Adobe-Identity-UCS`.
pub fn read_tounicode(data: &[u8]) -> Result<ToUnicodeFile> {
    let raw = parse_raw(data)?;

    match raw.cmap_type {
        None | Some(2) => {}
        Some(0) | Some(1) => return Err(Error::Malformed("CMapType 0/1 is a CID CMap")),
        Some(_) => return Err(Error::Malformed("unsupported CMapType")),
    }

    let name = raw
        .name
        .unwrap_or_else(|| tounicode::DEFAULT_NAME.to_owned());

    let mut file = ToUnicodeFile::new(name, CodeSpaceRange::new(raw.code_space));
    file.singles = raw.bf_singles;
    file.ranges = raw.bf_ranges;

    Ok(file)
}

/// Read a CID CMap and resolve its `usecmap` chain through `resolver`.
///
/// The resolver maps a CMap name to its stream data. Missing parents and
/// cyclic references are never errors: the chain is clipped at the first
/// repeated name and the shortened result is returned.
pub fn extract_cmap<F>(data: &[u8], resolver: F) -> Result<CMapFile>
where
    F: Fn(&str) -> Option<Vec<u8>>,
{
    let mut visited = FxHashSet::default();
    extract_inner(data, &resolver, &mut visited, 0)
}

fn extract_inner<F>(
    data: &[u8],
    resolver: &F,
    visited: &mut FxHashSet<String>,
    depth: usize,
) -> Result<CMapFile>
where
    F: Fn(&str) -> Option<Vec<u8>>,
{
    let (mut file, parent_name) = read_cmap(data)?;
    visited.insert(file.name().to_owned());

    if let Some(parent_name) = parent_name {
        if depth + 1 >= MAX_CHAIN_DEPTH {
            warn!("usecmap chain deeper than {MAX_CHAIN_DEPTH}, clipping");
        } else if visited.contains(&parent_name) {
            warn!("usecmap chain loops back to {parent_name}, clipping");
        } else if let Some(parent_data) = resolver(&parent_name) {
            match extract_inner(&parent_data, resolver, visited, depth + 1) {
                Ok(parent) => file.set_parent(Some(Arc::new(parent))),
                Err(err) => warn!("usecmap parent {parent_name} is unusable ({err}), clipping"),
            }
        } else {
            warn!("usecmap parent {parent_name} not found, clipping");
        }
    }

    Ok(file)
}

#[derive(Default)]
struct Raw {
    name: Option<String>,
    registry: Option<Vec<u8>>,
    ordering: Option<Vec<u8>>,
    supplement: Option<i32>,
    cmap_type: Option<i32>,
    writing_mode: WritingMode,
    use_cmap: Option<String>,
    code_space: Vec<CodeRange>,
    cid_singles: Vec<CidSingle>,
    cid_ranges: Vec<CidRange>,
    notdef_singles: Vec<CidSingle>,
    notdef_ranges: Vec<CidRange>,
    bf_singles: Vec<BfSingle>,
    bf_ranges: Vec<BfRange>,
}

impl Raw {
    /// An incomplete CIDSystemInfo is dropped rather than reported; some
    /// generators emit broken ones.
    fn system_info(&self) -> Option<CidSystemInfo> {
        match (&self.registry, &self.ordering, self.supplement) {
            (Some(registry), Some(ordering), Some(supplement)) => Some(CidSystemInfo {
                registry: registry.clone(),
                ordering: ordering.clone(),
                supplement,
            }),
            _ => None,
        }
    }
}

fn parse_raw(data: &[u8]) -> Result<Raw> {
    let mut scanner = Scanner::new(data);
    let mut raw = Raw::default();
    let mut last_name: Option<Vec<u8>> = None;

    while !scanner.at_end() {
        let obj = scanner.next_object()?;

        let Object::Name(name) = obj else { continue };

        if name.is_literal() {
            match name.as_str() {
                Some("Registry") => raw.registry = string_or_name(&mut scanner),
                Some("Ordering") => raw.ordering = string_or_name(&mut scanner),
                Some("Supplement") => {
                    raw.supplement = scanner.next_number().ok().map(|n| n.as_i32());
                }
                Some("CMapName") => {
                    raw.name = scanner
                        .next_name()
                        .ok()
                        .and_then(|n| n.decode().ok())
                        .map(|n| String::from_utf8_lossy(&n).into_owned());
                }
                Some("CMapType") => {
                    raw.cmap_type = scanner.next_number().ok().map(|n| n.as_i32());
                }
                Some("WMode") => {
                    if let Ok(n) = scanner.next_number() {
                        match n.as_i32() {
                            0 => raw.writing_mode = WritingMode::Horizontal,
                            1 => raw.writing_mode = WritingMode::Vertical,
                            other => warn!("ignoring unknown WMode {other}"),
                        }
                    }
                }
                Some("CIDSystemInfo") => {
                    // The inline dictionary form; the `3 dict dup begin` form
                    // arrives as top-level /Registry etc. tokens instead.
                    if let Ok(Object::Dict(dict)) = scanner.next_object() {
                        parse_system_info_dict(&dict, &mut raw)?;
                    }
                }
                _ => last_name = name.decode().ok(),
            }
        } else {
            match name.as_str() {
                Some("begincodespacerange") => {
                    parse_code_space(&mut scanner, &mut raw.code_space)?;
                }
                Some("begincidrange") => {
                    parse_cid_ranges(&mut scanner, &mut raw.cid_ranges, "endcidrange")?;
                }
                Some("begincidchar") => {
                    parse_cid_chars(&mut scanner, &mut raw.cid_singles, "endcidchar")?;
                }
                Some("beginnotdefrange") => {
                    parse_cid_ranges(&mut scanner, &mut raw.notdef_ranges, "endnotdefrange")?;
                }
                Some("beginnotdefchar") => {
                    parse_cid_chars(&mut scanner, &mut raw.notdef_singles, "endnotdefchar")?;
                }
                Some("beginbfchar") => parse_bf_chars(&mut scanner, &mut raw.bf_singles)?,
                Some("beginbfrange") => parse_bf_ranges(&mut scanner, &mut raw.bf_ranges)?,
                Some("usecmap") => {
                    raw.use_cmap = last_name
                        .take()
                        .map(|n| String::from_utf8_lossy(&n).into_owned());
                }
                _ => {}
            }
        }
    }

    Ok(raw)
}

fn string_or_name(scanner: &mut Scanner<'_>) -> Option<Vec<u8>> {
    match scanner.next_object().ok()? {
        Object::String(s) => s.decode().ok(),
        Object::Name(n) => n.decode().ok(),
        _ => None,
    }
}

fn parse_system_info_dict(dict: &sumi_postscript::Dict<'_>, raw: &mut Raw) -> Result<()> {
    let mut scanner = dict.objects();

    while !scanner.at_end() {
        let Object::Name(key) = scanner.next_object()? else {
            return Err(Error::Malformed("CIDSystemInfo key is not a name"));
        };

        match key.as_str() {
            Some("Registry") => raw.registry = string_or_name(&mut scanner),
            Some("Ordering") => raw.ordering = string_or_name(&mut scanner),
            Some("Supplement") => {
                raw.supplement = scanner.next_number().ok().map(|n| n.as_i32());
            }
            _ => {
                let _ = scanner.next_object()?;
            }
        }
    }

    Ok(())
}

fn is_end_marker(obj: &Object<'_>, marker: &str) -> bool {
    matches!(obj, Object::Name(n) if !n.is_literal() && n.as_str() == Some(marker))
}

fn parse_code_space(scanner: &mut Scanner<'_>, ranges: &mut Vec<CodeRange>) -> Result<()> {
    loop {
        let obj = scanner.next_object()?;
        if is_end_marker(&obj, "endcodespacerange") {
            return Ok(());
        }

        let Object::String(low) = obj else {
            return Err(Error::Malformed("expected hex string in codespacerange"));
        };
        let low = low.decode()?;
        let high = scanner.next_string()?.decode()?;

        match CodeRange::new(&low, &high) {
            Ok(range) => ranges.push(range),
            Err(err) => warn!("skipping codespace range <{low:02x?}> <{high:02x?}>: {err}"),
        }
    }
}

/// Parse the operands of one `cidrange`/`notdefrange` section. Entries whose
/// bounds are unusable are skipped; Adobe's own files contain a few.
fn parse_cid_ranges(
    scanner: &mut Scanner<'_>,
    ranges: &mut Vec<CidRange>,
    end_marker: &str,
) -> Result<()> {
    loop {
        let obj = scanner.next_object()?;
        if is_end_marker(&obj, end_marker) {
            return Ok(());
        }

        let Object::String(first) = obj else {
            return Err(Error::Malformed("expected hex string in cid range"));
        };
        let first = first.decode()?;
        let last = scanner.next_string()?.decode()?;
        let cid = scanner.next_number()?.as_i32();

        let entry = match (CodeBytes::new(&first), CodeBytes::new(&last), to_cid(cid)) {
            (Some(first), Some(last), Some(cid)) => CidRange { first, last, cid },
            _ => {
                warn!("skipping cid range <{first:02x?}> <{last:02x?}> {cid}");
                continue;
            }
        };

        if entry.count() == 0 {
            warn!("skipping empty cid range {:?} {:?}", entry.first, entry.last);
            continue;
        }

        ranges.push(entry);
    }
}

fn parse_cid_chars(
    scanner: &mut Scanner<'_>,
    singles: &mut Vec<CidSingle>,
    end_marker: &str,
) -> Result<()> {
    loop {
        let obj = scanner.next_object()?;
        if is_end_marker(&obj, end_marker) {
            return Ok(());
        }

        let Object::String(code) = obj else {
            return Err(Error::Malformed("expected hex string in cid char"));
        };
        let code = code.decode()?;
        let cid = scanner.next_number()?.as_i32();

        match (CodeBytes::new(&code), to_cid(cid)) {
            (Some(code), Some(cid)) => singles.push(CidSingle { code, cid }),
            _ => warn!("skipping cid char <{code:02x?}> {cid}"),
        }
    }
}

fn parse_bf_chars(scanner: &mut Scanner<'_>, singles: &mut Vec<BfSingle>) -> Result<()> {
    loop {
        let obj = scanner.next_object()?;
        if is_end_marker(&obj, "endbfchar") {
            return Ok(());
        }

        let Object::String(code) = obj else {
            return Err(Error::Malformed("expected hex string in bfchar"));
        };
        let code = code.decode()?;
        let value = scanner.next_string()?.decode()?;

        match (CodeBytes::new(&code), utf16_be_to_string(&value)) {
            (Some(code), Some(value)) => singles.push(BfSingle { code, value }),
            _ => warn!("skipping bfchar <{code:02x?}>"),
        }
    }
}

fn parse_bf_ranges(scanner: &mut Scanner<'_>, ranges: &mut Vec<BfRange>) -> Result<()> {
    loop {
        let obj = scanner.next_object()?;
        if is_end_marker(&obj, "endbfrange") {
            return Ok(());
        }

        let Object::String(first) = obj else {
            return Err(Error::Malformed("expected hex string in bfrange"));
        };
        let first = first.decode()?;
        let last = scanner.next_string()?.decode()?;

        let values = match scanner.next_object()? {
            Object::String(s) => utf16_be_to_string(&s.decode()?).map(|v| vec![v]),
            Object::Array(array) => {
                let mut values = Some(Vec::new());
                let mut inner = array.objects();
                while !inner.at_end() {
                    let raw = inner.next_string()?.decode()?;
                    match utf16_be_to_string(&raw) {
                        Some(value) => {
                            if let Some(list) = values.as_mut() {
                                list.push(value);
                            }
                        }
                        None => values = None,
                    }
                }
                values
            }
            _ => return Err(Error::Malformed("bfrange value is not a string or array")),
        };

        let entry = match (CodeBytes::new(&first), CodeBytes::new(&last), values) {
            (Some(first), Some(last), Some(values)) => BfRange {
                first,
                last,
                values,
            },
            _ => {
                warn!("skipping bfrange <{first:02x?}> <{last:02x?}>");
                continue;
            }
        };

        if entry.count() == 0 {
            warn!("skipping empty bfrange {:?} {:?}", entry.first, entry.last);
            continue;
        }

        ranges.push(entry);
    }
}

fn to_cid(value: i32) -> Option<Cid> {
    Cid::try_from(value).ok()
}

/// Decode a UTF-16BE destination string. Odd-length payloads get the stray
/// leading byte widened to its own unit; unpaired surrogates fail.
fn utf16_be_to_string(bytes: &[u8]) -> Option<String> {
    let mut units = Vec::with_capacity(bytes.len().div_ceil(2));
    let mut chunks = bytes.chunks_exact(2);

    if bytes.len() % 2 == 1 {
        units.push(u16::from(bytes[0]));
        chunks = bytes[1..].chunks_exact(2);
    }

    for pair in chunks {
        units.push(u16::from_be_bytes([pair[0], pair[1]]));
    }

    String::from_utf16(&units).ok()
}
