//! CMap files: the mapping from byte codes to CIDs.

use std::collections::HashMap;
use std::sync::Arc;

use crate::codec::Codec;
use crate::optimize;
use crate::range::{CodeRange, CodeSpaceRange};
use crate::{Cid, CidSystemInfo, Code, CodeBytes, WritingMode};

/// How many parent generations contribute to [`CMapFile::update_name`].
const NAME_HASH_GENERATIONS: u32 = 3;

/// The magic prefix mixed into the name digest, versioned so a change to the
/// serialisation changes every name.
const NAME_HASH_MAGIC: &[u8] = b"cmap-digest:1\0";

/// A single code→CID entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CidSingle {
    /// The byte form of the code.
    pub code: CodeBytes,
    /// The CID it maps to.
    pub cid: Cid,
}

/// A range of codes mapped to consecutive CIDs.
///
/// `first` and `last` bound each byte position separately; the codes of the
/// range are enumerated positionally with the high byte first, and the `i`-th
/// code maps to `cid + i`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CidRange {
    /// The first code of the range.
    pub first: CodeBytes,
    /// The last code of the range.
    pub last: CodeBytes,
    /// The CID of `first`.
    pub cid: Cid,
}

impl CidRange {
    /// The number of codes the range covers. 0 for a malformed range.
    pub(crate) fn count(&self) -> u64 {
        if self.first.len() != self.last.len() {
            return 0;
        }

        let mut n = 1_u64;
        for (f, l) in self.first.as_slice().iter().zip(self.last.as_slice()) {
            if f > l {
                return 0;
            }
            n *= u64::from(l - f) + 1;
        }
        n
    }

    /// The position of `bytes` within the range, or `None` if it lies
    /// outside.
    pub(crate) fn offset_of(&self, bytes: &[u8]) -> Option<u64> {
        if bytes.len() != self.first.len() || self.first.len() != self.last.len() {
            return None;
        }

        let mut offset = 0_u64;
        for ((b, f), l) in bytes
            .iter()
            .zip(self.first.as_slice())
            .zip(self.last.as_slice())
        {
            if b < f || b > l {
                return None;
            }
            offset = offset * (u64::from(l - f) + 1) + u64::from(b - f);
        }

        Some(offset)
    }

    /// The `index`-th code of the range. The index must be below
    /// [`Self::count`].
    pub(crate) fn seq_at(&self, index: u64) -> CodeBytes {
        debug_assert!(index < self.count());

        let len = self.first.len();
        let mut bytes = [0_u8; 4];
        let mut rest = index;

        for pos in (0..len).rev() {
            let f = self.first.as_slice()[pos];
            let l = self.last.as_slice()[pos];
            let width = u64::from(l - f) + 1;
            bytes[pos] = f + (rest % width) as u8;
            rest /= width;
        }

        CodeBytes::from_fixed(len, bytes)
    }
}

/// A CMap: byte codes mapped to CIDs, with an optional `usecmap` parent that
/// is consulted for codes the file itself does not map.
///
/// A file is immutable once constructed from a stream ([`crate::read_cmap`])
/// or filled via [`Self::set_mapping`], and can be shared freely between
/// threads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CMapFile {
    pub(crate) name: String,
    pub(crate) system_info: Option<CidSystemInfo>,
    pub(crate) writing_mode: WritingMode,
    pub(crate) code_space: CodeSpaceRange,
    pub(crate) cid_singles: Vec<CidSingle>,
    pub(crate) cid_ranges: Vec<CidRange>,
    pub(crate) notdef_singles: Vec<CidSingle>,
    pub(crate) notdef_ranges: Vec<CidRange>,
    pub(crate) parent: Option<Arc<CMapFile>>,
}

impl CMapFile {
    /// Create an empty CMap with the given name and code space.
    pub fn new(name: impl Into<String>, code_space: CodeSpaceRange) -> Self {
        Self {
            name: name.into(),
            system_info: None,
            writing_mode: WritingMode::Horizontal,
            code_space,
            cid_singles: Vec::new(),
            cid_ranges: Vec::new(),
            notdef_singles: Vec::new(),
            notdef_ranges: Vec::new(),
            parent: None,
        }
    }

    /// Create the Identity-H CMap without going through the predefined
    /// registry.
    pub fn identity_h() -> Self {
        Self::identity(WritingMode::Horizontal, "Identity-H")
    }

    /// Create the Identity-V CMap without going through the predefined
    /// registry.
    pub fn identity_v() -> Self {
        Self::identity(WritingMode::Vertical, "Identity-V")
    }

    fn identity(writing_mode: WritingMode, name: &str) -> Self {
        let code_space = CodeSpaceRange::new(vec![CodeRange::from_fixed(
            2,
            [0x00, 0x00, 0, 0],
            [0xff, 0xff, 0, 0],
        )]);

        let mut file = Self::new(name, code_space);
        file.writing_mode = writing_mode;
        file.system_info = Some(CidSystemInfo {
            registry: b"Adobe".to_vec(),
            ordering: b"Identity".to_vec(),
            supplement: 0,
        });
        file.cid_ranges.push(CidRange {
            first: CodeBytes::from_fixed(2, [0x00, 0x00, 0, 0]),
            last: CodeBytes::from_fixed(2, [0xff, 0xff, 0, 0]),
            cid: 0,
        });
        file
    }

    /// The CMap name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The character collection, if the file declares one.
    pub fn system_info(&self) -> Option<&CidSystemInfo> {
        self.system_info.as_ref()
    }

    /// Set the character collection.
    pub fn set_system_info(&mut self, info: Option<CidSystemInfo>) {
        self.system_info = info;
    }

    /// The writing mode.
    pub fn writing_mode(&self) -> WritingMode {
        self.writing_mode
    }

    /// Set the writing mode.
    pub fn set_writing_mode(&mut self, mode: WritingMode) {
        self.writing_mode = mode;
    }

    /// The file's own code-space range (excluding the parent's).
    pub fn code_space(&self) -> &CodeSpaceRange {
        &self.code_space
    }

    /// The `usecmap` parent, if any.
    pub fn parent(&self) -> Option<&Arc<CMapFile>> {
        self.parent.as_ref()
    }

    /// Set the `usecmap` parent.
    pub fn set_parent(&mut self, parent: Option<Arc<CMapFile>>) {
        self.parent = parent;
    }

    /// The file's own single-code entries.
    pub fn cid_singles(&self) -> &[CidSingle] {
        &self.cid_singles
    }

    /// The file's own range entries.
    pub fn cid_ranges(&self) -> &[CidRange] {
        &self.cid_ranges
    }

    /// The file's own notdef single entries.
    pub fn notdef_singles(&self) -> &[CidSingle] {
        &self.notdef_singles
    }

    /// The file's own notdef range entries.
    pub fn notdef_ranges(&self) -> &[CidRange] {
        &self.notdef_ranges
    }

    /// The effective code-space range: the file's own ranges followed by all
    /// ancestors'.
    pub fn effective_code_space(&self) -> CodeSpaceRange {
        let mut ranges = self.code_space.ranges().to_vec();
        let mut current = self.parent.as_deref();
        while let Some(file) = current {
            ranges.extend_from_slice(file.code_space.ranges());
            current = file.parent.as_deref();
        }
        CodeSpaceRange::new(ranges)
    }

    /// Look up the CID for the byte form of a code.
    ///
    /// Falls back from the file's own tables to the parent chain, then to the
    /// notdef tables; an unmapped code yields CID 0.
    pub fn lookup_cid(&self, bytes: &[u8]) -> Cid {
        self.lookup_regular(bytes)
            .or_else(|| self.lookup_notdef(bytes))
            .unwrap_or(0)
    }

    /// Look up the notdef CID for a code, consulting only the notdef tables
    /// of this file and its ancestors. An unmapped code yields CID 0.
    pub fn lookup_notdef_cid(&self, bytes: &[u8]) -> Cid {
        self.lookup_notdef(bytes).unwrap_or(0)
    }

    fn lookup_regular(&self, bytes: &[u8]) -> Option<Cid> {
        if let Some(single) = self.cid_singles.iter().find(|s| s.code.as_slice() == bytes) {
            return Some(single.cid);
        }

        for range in &self.cid_ranges {
            if let Some(offset) = range.offset_of(bytes) {
                if let Some(cid) = u32::try_from(offset)
                    .ok()
                    .and_then(|o| range.cid.checked_add(o))
                {
                    return Some(cid);
                }
            }
        }

        self.parent.as_ref()?.lookup_regular(bytes)
    }

    fn lookup_notdef(&self, bytes: &[u8]) -> Option<Cid> {
        if let Some(single) = self
            .notdef_singles
            .iter()
            .find(|s| s.code.as_slice() == bytes)
        {
            return Some(single.cid);
        }

        // All codes of a notdef range map to the same CID.
        for range in &self.notdef_ranges {
            if range.offset_of(bytes).is_some() {
                return Some(range.cid);
            }
        }

        self.parent.as_ref()?.lookup_notdef(bytes)
    }

    /// Whether the file's own cid tables (not the parent's, not notdef)
    /// define `bytes`.
    fn defines(&self, bytes: &[u8]) -> bool {
        self.cid_singles.iter().any(|s| s.code.as_slice() == bytes)
            || self.cid_ranges.iter().any(|r| r.offset_of(bytes).is_some())
    }

    /// Enumerate all `(code, CID)` pairs of this file: the parent's entries
    /// first (minus those this file overrides), then the file's own ranges in
    /// code enumeration order, then its singles. Entries whose byte sequence
    /// `codec` rejects are skipped.
    pub fn iter<'a>(&'a self, codec: &'a Codec) -> CidIter<'a> {
        let state = match &self.parent {
            Some(parent) => State::Parent(Box::new(parent.iter(codec))),
            None => State::Ranges { range: 0, index: 0 },
        };

        CidIter {
            file: self,
            codec,
            state,
            buf: Vec::new(),
        }
    }

    /// Replace the file's own cid tables with the compact encoding of `map`.
    ///
    /// Entries for which the parent chain already yields the same CID are
    /// dropped; entries whose code `codec` cannot encode are dropped as well.
    pub fn set_mapping(&mut self, codec: &Codec, map: &HashMap<Code, Cid>) {
        let mut buf = Vec::new();
        let pairs = map.iter().filter(|&(&code, &cid)| {
            buf.clear();
            match (&self.parent, codec.encode(&mut buf, code)) {
                (Some(parent), true) => parent.lookup_cid(&buf) != cid,
                _ => true,
            }
        });

        let pairs: Vec<(Code, Cid)> = pairs.map(|(&code, &cid)| (code, cid)).collect();
        let (singles, ranges) = optimize::compress_cids(codec, pairs);
        self.cid_singles = singles;
        self.cid_ranges = ranges;
    }

    /// Recompute the CMap name as a digest of the file's content, so that
    /// equal mappings embed under equal names.
    pub fn update_name(&mut self) {
        let mut buf = Vec::from(NAME_HASH_MAGIC);
        hash_into(self, &mut buf, 0);
        self.name = format!("seehuhn-{:x}", md5::compute(&buf));
    }
}

fn hash_into(file: &CMapFile, buf: &mut Vec<u8>, generation: u32) {
    let push_code = |buf: &mut Vec<u8>, code: CodeBytes| {
        buf.push(code.len() as u8);
        buf.extend_from_slice(code.as_slice());
    };

    buf.extend_from_slice(&(file.code_space.ranges().len() as u32).to_be_bytes());
    for r in file.code_space.ranges() {
        buf.push(r.len() as u8);
        buf.extend_from_slice(r.low());
        buf.extend_from_slice(r.high());
    }

    for singles in [&file.cid_singles, &file.notdef_singles] {
        buf.extend_from_slice(&(singles.len() as u32).to_be_bytes());
        for s in singles {
            push_code(buf, s.code);
            buf.extend_from_slice(&s.cid.to_be_bytes());
        }
    }

    for ranges in [&file.cid_ranges, &file.notdef_ranges] {
        buf.extend_from_slice(&(ranges.len() as u32).to_be_bytes());
        for r in ranges {
            push_code(buf, r.first);
            push_code(buf, r.last);
            buf.extend_from_slice(&r.cid.to_be_bytes());
        }
    }

    match &file.parent {
        Some(parent) if generation + 1 < NAME_HASH_GENERATIONS => {
            buf.push(1);
            hash_into(parent, buf, generation + 1);
        }
        Some(_) => buf.push(1),
        None => buf.push(0),
    }
}

/// Iterator over the `(code, CID)` pairs of a [`CMapFile`], created by
/// [`CMapFile::iter`].
pub struct CidIter<'a> {
    file: &'a CMapFile,
    codec: &'a Codec,
    state: State<'a>,
    buf: Vec<u8>,
}

enum State<'a> {
    Parent(Box<CidIter<'a>>),
    Ranges { range: usize, index: u64 },
    Singles(usize),
    Done,
}

impl Iterator for CidIter<'_> {
    type Item = (Code, Cid);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match &mut self.state {
                State::Parent(parent) => match parent.next() {
                    Some((code, cid)) => {
                        self.buf.clear();
                        if !self.codec.encode(&mut self.buf, code) {
                            continue;
                        }
                        if self.file.defines(&self.buf) {
                            continue;
                        }
                        return Some((code, cid));
                    }
                    None => self.state = State::Ranges { range: 0, index: 0 },
                },
                State::Ranges { range, index } => {
                    let Some(r) = self.file.cid_ranges.get(*range) else {
                        self.state = State::Singles(0);
                        continue;
                    };

                    if *index >= r.count() {
                        *range += 1;
                        *index = 0;
                        continue;
                    }

                    let seq = r.seq_at(*index);
                    let cid = u32::try_from(*index)
                        .ok()
                        .and_then(|o| r.cid.checked_add(o));
                    *index += 1;

                    let code = self.codec.code_of(seq.as_slice());
                    if let (Some(code), Some(cid)) = (code, cid) {
                        return Some((code, cid));
                    }
                }
                State::Singles(i) => {
                    let Some(s) = self.file.cid_singles.get(*i) else {
                        self.state = State::Done;
                        continue;
                    };
                    *i += 1;

                    if let Some(code) = self.codec.code_of(s.code.as_slice()) {
                        return Some((code, s.cid));
                    }
                }
                State::Done => return None,
            }
        }
    }
}
