//! ToUnicode files: the mapping from byte codes to replacement text.

use std::collections::HashMap;
use std::sync::Arc;

use crate::codec::Codec;
use crate::optimize;
use crate::range::CodeSpaceRange;
use crate::{Code, CodeBytes};

/// The conventional name for generated ToUnicode CMaps, used when a stream
/// does not declare one.
pub(crate) const DEFAULT_NAME: &str = "Adobe-Identity-UCS";

/// A single code→text entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BfSingle {
    /// The byte form of the code.
    pub code: CodeBytes,
    /// The replacement text.
    pub value: String,
}

/// A range of codes mapped to text.
///
/// With a single value the range is in incremented mode: the i-th code of the
/// range maps to the value with `i` added to its last Unicode scalar. With
/// multiple values the i-th code maps to the i-th value; codes past the end
/// of the list fall back to incrementing the first value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BfRange {
    /// The first code of the range.
    pub first: CodeBytes,
    /// The last code of the range.
    pub last: CodeBytes,
    /// One base value, or one value per code.
    pub values: Vec<String>,
}

impl BfRange {
    pub(crate) fn count(&self) -> u64 {
        crate::file::CidRange {
            first: self.first,
            last: self.last,
            cid: 0,
        }
        .count()
    }

    pub(crate) fn offset_of(&self, bytes: &[u8]) -> Option<u64> {
        crate::file::CidRange {
            first: self.first,
            last: self.last,
            cid: 0,
        }
        .offset_of(bytes)
    }

    fn value_at(&self, offset: u64) -> String {
        if let Ok(i) = usize::try_from(offset) {
            if let Some(value) = self.values.get(i) {
                return value.clone();
            }
        }

        let base = self.values.first().map(String::as_str).unwrap_or("");
        advanced(base, offset)
    }

    fn seq_at_index(&self, index: u64) -> CodeBytes {
        crate::file::CidRange {
            first: self.first,
            last: self.last,
            cid: 0,
        }
        .seq_at(index)
    }
}

/// Copy `base` with `offset` added to its last Unicode scalar value. The base
/// is returned unchanged when it is empty or the addition would leave the
/// scalar range.
fn advanced(base: &str, offset: u64) -> String {
    let Some(last) = base.chars().next_back() else {
        return String::new();
    };

    let advanced = u32::try_from(offset)
        .ok()
        .and_then(|o| (last as u32).checked_add(o))
        .and_then(char::from_u32);

    match advanced {
        Some(c) => {
            let mut out = String::with_capacity(base.len());
            out.push_str(&base[..base.len() - last.len_utf8()]);
            out.push(c);
            out
        }
        None => base.to_owned(),
    }
}

/// A ToUnicode CMap: byte codes mapped to replacement text, with an optional
/// parent consulted for unmapped codes.
///
/// This is the same shape as [`crate::CMapFile`] with text values instead of
/// CIDs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToUnicodeFile {
    pub(crate) name: String,
    pub(crate) code_space: CodeSpaceRange,
    pub(crate) singles: Vec<BfSingle>,
    pub(crate) ranges: Vec<BfRange>,
    pub(crate) parent: Option<Arc<ToUnicodeFile>>,
}

impl ToUnicodeFile {
    /// Create an empty ToUnicode file with the given name and code space.
    pub fn new(name: impl Into<String>, code_space: CodeSpaceRange) -> Self {
        Self {
            name: name.into(),
            code_space,
            singles: Vec::new(),
            ranges: Vec::new(),
            parent: None,
        }
    }

    /// The CMap name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The file's own code-space range.
    pub fn code_space(&self) -> &CodeSpaceRange {
        &self.code_space
    }

    /// The single-code entries.
    pub fn singles(&self) -> &[BfSingle] {
        &self.singles
    }

    /// The range entries.
    pub fn ranges(&self) -> &[BfRange] {
        &self.ranges
    }

    /// The parent file, if any.
    pub fn parent(&self) -> Option<&Arc<ToUnicodeFile>> {
        self.parent.as_ref()
    }

    /// Set the parent file.
    pub fn set_parent(&mut self, parent: Option<Arc<ToUnicodeFile>>) {
        self.parent = parent;
    }

    /// The replacement text for the byte form of a code, or `None` if no
    /// table in the chain maps it.
    pub fn lookup(&self, bytes: &[u8]) -> Option<String> {
        if let Some(single) = self.singles.iter().find(|s| s.code.as_slice() == bytes) {
            return Some(single.value.clone());
        }

        for range in &self.ranges {
            if let Some(offset) = range.offset_of(bytes) {
                return Some(range.value_at(offset));
            }
        }

        self.parent.as_ref()?.lookup(bytes)
    }

    /// Decode a whole PDF string to text.
    ///
    /// The string is segmented into codes by `codec`; every unmapped code and
    /// every unsegmentable byte run contributes U+FFFD. Total on all inputs.
    pub fn decode_string(&self, codec: &Codec, bytes: &[u8]) -> String {
        let mut out = String::new();
        let mut rest = bytes;

        while !rest.is_empty() {
            let (_, consumed, valid) = codec.decode(rest);

            match valid.then(|| self.lookup(&rest[..consumed])).flatten() {
                Some(text) => out.push_str(&text),
                None => out.push('\u{FFFD}'),
            }

            rest = &rest[consumed..];
        }

        out
    }

    /// Whether the file's own tables map `bytes`.
    fn defines(&self, bytes: &[u8]) -> bool {
        self.singles.iter().any(|s| s.code.as_slice() == bytes)
            || self.ranges.iter().any(|r| r.offset_of(bytes).is_some())
    }

    /// Replace the file's own tables with the compact encoding of `map`.
    ///
    /// Runs of codes that differ only in their final byte become one range:
    /// in incremented mode when every value is the single-scalar increment of
    /// its predecessor, with an explicit value list otherwise. Entries the
    /// parent chain already maps to the same text are dropped.
    pub fn set_mapping(&mut self, codec: &Codec, map: &HashMap<Code, String>) {
        let mut buf = Vec::new();
        let pairs: Vec<(Code, String)> = map
            .iter()
            .filter(|&(&code, value)| {
                buf.clear();
                match (&self.parent, codec.encode(&mut buf, code)) {
                    (Some(parent), true) => parent.lookup(&buf).as_ref() != Some(value),
                    _ => true,
                }
            })
            .map(|(&code, value)| (code, value.clone()))
            .collect();

        self.singles.clear();
        self.ranges.clear();

        for (prefix, entries) in optimize::grouped_by_prefix(codec, pairs) {
            let mut run_start = 0;

            for i in 1..=entries.len() {
                let extends = i < entries.len() && entries[i].0 == entries[i - 1].0 + 1;
                if extends {
                    continue;
                }

                let run = &entries[run_start..i];
                run_start = i;

                if run.len() == 1 {
                    self.singles.push(BfSingle {
                        code: prefix.join(run[0].0),
                        value: run[0].1.clone(),
                    });
                    continue;
                }

                let incrementing = run
                    .iter()
                    .enumerate()
                    .all(|(i, (_, value))| *value == advanced(&run[0].1, i as u64));

                let values = if incrementing {
                    vec![run[0].1.clone()]
                } else {
                    run.iter().map(|(_, value)| value.clone()).collect()
                };

                self.ranges.push(BfRange {
                    first: prefix.join(run[0].0),
                    last: prefix.join(run[run.len() - 1].0),
                    values,
                });
            }
        }
    }

    /// Enumerate all `(code, text)` pairs: parent first (minus overrides),
    /// then ranges in code order, then singles, skipping codes `codec`
    /// rejects.
    pub fn iter<'a>(&'a self, codec: &'a Codec) -> Box<dyn Iterator<Item = (Code, String)> + 'a> {
        let parent: Box<dyn Iterator<Item = (Code, String)> + 'a> = match &self.parent {
            Some(p) => Box::new(p.iter(codec).filter(move |&(code, _)| {
                let mut buf = Vec::new();
                codec.encode(&mut buf, code) && !self.defines(&buf)
            })),
            None => Box::new(std::iter::empty()),
        };

        let ranges = self.ranges.iter().flat_map(move |r| {
            (0..r.count()).filter_map(move |i| {
                let seq = r.seq_at_index(i);
                let code = codec.code_of(seq.as_slice())?;
                Some((code, r.value_at(i)))
            })
        });

        let singles = self.singles.iter().filter_map(move |s| {
            let code = codec.code_of(s.code.as_slice())?;
            Some((code, s.value.clone()))
        });

        Box::new(parent.chain(ranges).chain(singles))
    }

    /// Recompute the CMap name as a digest of the file's content.
    pub fn update_name(&mut self) {
        let mut buf = Vec::from(b"tounicode-digest:1\0" as &[u8]);
        hash_into(self, &mut buf, 0);
        self.name = format!("seehuhn-{:x}", md5::compute(&buf));
    }
}

fn hash_into(file: &ToUnicodeFile, buf: &mut Vec<u8>, generation: u32) {
    let push_code = |buf: &mut Vec<u8>, code: CodeBytes| {
        buf.push(code.len() as u8);
        buf.extend_from_slice(code.as_slice());
    };
    let push_str = |buf: &mut Vec<u8>, s: &str| {
        buf.extend_from_slice(&(s.len() as u32).to_be_bytes());
        buf.extend_from_slice(s.as_bytes());
    };

    buf.extend_from_slice(&(file.code_space.ranges().len() as u32).to_be_bytes());
    for r in file.code_space.ranges() {
        buf.push(r.len() as u8);
        buf.extend_from_slice(r.low());
        buf.extend_from_slice(r.high());
    }

    buf.extend_from_slice(&(file.singles.len() as u32).to_be_bytes());
    for s in &file.singles {
        push_code(buf, s.code);
        push_str(buf, &s.value);
    }

    buf.extend_from_slice(&(file.ranges.len() as u32).to_be_bytes());
    for r in &file.ranges {
        push_code(buf, r.first);
        push_code(buf, r.last);
        buf.extend_from_slice(&(r.values.len() as u32).to_be_bytes());
        for value in &r.values {
            push_str(buf, value);
        }
    }

    match &file.parent {
        Some(parent) if generation + 1 < 3 => {
            buf.push(1);
            hash_into(parent, buf, generation + 1);
        }
        Some(_) => buf.push(1),
        None => buf.push(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::range::CodeRange;

    fn two_byte_codec() -> Codec {
        let csr = CodeSpaceRange::new(vec![
            CodeRange::new(&[0x00, 0x00], &[0xff, 0xff]).unwrap(),
        ]);
        Codec::new(csr).unwrap()
    }

    fn code(bytes: &[u8]) -> CodeBytes {
        CodeBytes::new(bytes).unwrap()
    }

    fn two_byte_file() -> ToUnicodeFile {
        ToUnicodeFile::new(
            DEFAULT_NAME,
            CodeSpaceRange::new(vec![
                CodeRange::new(&[0x00, 0x00], &[0xff, 0xff]).unwrap(),
            ]),
        )
    }

    #[test]
    fn incremented_range() {
        let mut file = two_byte_file();
        file.ranges.push(BfRange {
            first: code(&[0x00, 0x00]),
            last: code(&[0x00, 0x5e]),
            values: vec![" ".into()],
        });

        assert_eq!(file.lookup(&[0x00, 0x00]).unwrap(), " ");
        assert_eq!(file.lookup(&[0x00, 0x01]).unwrap(), "!");
        // Base U+0020 advanced by 0x41 is U+0061.
        assert_eq!(file.lookup(&[0x00, 0x41]).unwrap(), "a");
        assert_eq!(file.lookup(&[0x00, 0x5e]).unwrap(), "~");
        assert_eq!(file.lookup(&[0x00, 0x5f]), None);
    }

    #[test]
    fn explicit_list_range() {
        let mut file = two_byte_file();
        file.ranges.push(BfRange {
            first: code(&[0x00, 0x5f]),
            last: code(&[0x00, 0x61]),
            values: vec!["ff".into(), "fi".into(), "ffl".into()],
        });

        assert_eq!(file.lookup(&[0x00, 0x5f]).unwrap(), "ff");
        assert_eq!(file.lookup(&[0x00, 0x60]).unwrap(), "fi");
        assert_eq!(file.lookup(&[0x00, 0x61]).unwrap(), "ffl");
    }

    #[test]
    fn short_list_falls_back_to_incrementing() {
        let mut file = two_byte_file();
        file.ranges.push(BfRange {
            first: code(&[0x00, 0x00]),
            last: code(&[0x00, 0x04]),
            values: vec!["A".into(), "Z".into()],
        });

        assert_eq!(file.lookup(&[0x00, 0x00]).unwrap(), "A");
        assert_eq!(file.lookup(&[0x00, 0x01]).unwrap(), "Z");
        // Past the list: the first value advanced by the offset.
        assert_eq!(file.lookup(&[0x00, 0x02]).unwrap(), "C");
    }

    #[test]
    fn increment_only_touches_the_last_scalar() {
        assert_eq!(advanced("ab", 1), "ac");
        assert_eq!(advanced("ab", 0), "ab");
        assert_eq!(advanced("", 5), "");
    }

    #[test]
    fn increment_does_not_overflow() {
        // Would leave the scalar range entirely.
        assert_eq!(advanced("\u{10FFFF}", 1), "\u{10FFFF}");
        // Would land on a surrogate, which is not a scalar value.
        assert_eq!(advanced("\u{D7FF}", 1), "\u{D7FF}");
        // Astral increments are fine.
        assert_eq!(advanced("\u{1F600}", 2), "\u{1F602}");
    }

    #[test]
    fn singles_take_precedence() {
        let mut file = two_byte_file();
        file.ranges.push(BfRange {
            first: code(&[0x00, 0x40]),
            last: code(&[0x00, 0x4f]),
            values: vec!["@".into()],
        });
        file.singles.push(BfSingle {
            code: code(&[0x00, 0x45]),
            value: "five".into(),
        });

        assert_eq!(file.lookup(&[0x00, 0x45]).unwrap(), "five");
        assert_eq!(file.lookup(&[0x00, 0x44]).unwrap(), "D");
    }

    #[test]
    fn parent_chain() {
        let mut parent = two_byte_file();
        parent.singles.push(BfSingle {
            code: code(&[0x00, 0x01]),
            value: "P".into(),
        });

        let mut child = two_byte_file();
        child.singles.push(BfSingle {
            code: code(&[0x00, 0x02]),
            value: "C".into(),
        });
        child.set_parent(Some(Arc::new(parent)));

        assert_eq!(child.lookup(&[0x00, 0x01]).unwrap(), "P");
        assert_eq!(child.lookup(&[0x00, 0x02]).unwrap(), "C");
        assert_eq!(child.lookup(&[0x00, 0x03]), None);
    }

    #[test]
    fn decode_string_is_total() {
        let codec = Codec::new(CodeSpaceRange::new(vec![
            CodeRange::new(&[0x00], &[0x7f]).unwrap(),
            CodeRange::new(&[0xa1, 0xa1], &[0xfe, 0xfe]).unwrap(),
        ]))
        .unwrap();

        let mut file = ToUnicodeFile::new(DEFAULT_NAME, codec.code_space().clone());
        file.singles.push(BfSingle {
            code: code(&[0x41]),
            value: "A".into(),
        });
        file.ranges.push(BfRange {
            first: code(&[0xa1, 0xa1]),
            last: code(&[0xa1, 0xa3]),
            values: vec!["あ".into()],
        });

        // Valid mapped, valid unmapped, invalid byte, truncated code.
        let text = file.decode_string(&codec, &[0x41, 0x42, 0xa1, 0xa2, 0x80, 0xa1]);
        assert_eq!(text, "A\u{FFFD}い\u{FFFD}\u{FFFD}");

        assert_eq!(file.decode_string(&codec, &[]), "");
    }

    #[test]
    fn compaction_prefers_incremented_ranges() {
        let codec = two_byte_codec();
        let mut file = two_byte_file();

        let mut map: HashMap<Code, String> = HashMap::new();
        for (bytes, text) in [
            (&[0x00_u8, 0x41][..], "A"),
            (&[0x00, 0x42], "B"),
            (&[0x00, 0x43], "C"),
            (&[0x00, 0x50], "ff"),
            (&[0x00, 0x51], "fi"),
            (&[0x00, 0x60], "x"),
        ] {
            map.insert(codec.code_of(bytes).unwrap(), text.to_owned());
        }

        file.set_mapping(&codec, &map);

        assert_eq!(file.ranges.len(), 2);
        assert_eq!(file.ranges[0].values, vec!["A".to_owned()]);
        assert_eq!(
            file.ranges[1].values,
            vec!["ff".to_owned(), "fi".to_owned()]
        );
        assert_eq!(file.singles.len(), 1);
        assert_eq!(file.singles[0].value, "x");

        let collected: HashMap<Code, String> = file.iter(&codec).collect();
        assert_eq!(collected, map);
    }

    #[test]
    fn set_mapping_skips_parent_provided_text() {
        let codec = two_byte_codec();

        let mut parent = two_byte_file();
        parent.singles.push(BfSingle {
            code: code(&[0x00, 0x41]),
            value: "A".into(),
        });

        let mut child = two_byte_file();
        child.set_parent(Some(Arc::new(parent)));

        let mut map: HashMap<Code, String> = HashMap::new();
        map.insert(codec.code_of(&[0x00, 0x41]).unwrap(), "A".into());
        map.insert(codec.code_of(&[0x00, 0x42]).unwrap(), "B".into());

        child.set_mapping(&codec, &map);
        assert_eq!(child.singles.len(), 1);
        assert_eq!(child.singles[0].value, "B");

        let collected: HashMap<Code, String> = child.iter(&codec).collect();
        assert_eq!(collected, map);
    }

    #[test]
    fn update_name_is_content_addressed() {
        let mut a = two_byte_file();
        a.singles.push(BfSingle {
            code: code(&[0x00, 0x41]),
            value: "A".into(),
        });
        a.update_name();
        let name = a.name().to_owned();
        assert!(name.starts_with("seehuhn-"));

        let mut b = two_byte_file();
        b.singles.push(BfSingle {
            code: code(&[0x00, 0x41]),
            value: "B".into(),
        });
        b.update_name();
        assert_ne!(b.name(), name);
    }
}
