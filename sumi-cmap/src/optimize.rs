//! Compaction of flat code maps into singles and ranges.
//!
//! PDF's range syntax can only span codes that differ in their final byte,
//! so compaction first groups codes by everything but the last byte and then
//! finds runs inside each group.

use rustc_hash::FxHashMap;

use crate::codec::Codec;
use crate::file::{CidRange, CidSingle};
use crate::{Cid, Code, CodeBytes};

/// A code with its final byte split off; the grouping key for run detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct Prefix {
    /// Total length of the code, including the final byte.
    len: u8,
    head: [u8; 3],
}

impl Prefix {
    fn split(code: CodeBytes) -> (Self, u8) {
        let bytes = code.as_slice();
        let (head, last) = bytes.split_at(bytes.len() - 1);

        let mut buf = [0; 3];
        buf[..head.len()].copy_from_slice(head);

        (
            Self {
                len: bytes.len() as u8,
                head: buf,
            },
            last[0],
        )
    }

    pub(crate) fn join(&self, last: u8) -> CodeBytes {
        let mut bytes = [0_u8; 4];
        let head_len = usize::from(self.len) - 1;
        bytes[..head_len].copy_from_slice(&self.head[..head_len]);
        bytes[head_len] = last;

        CodeBytes::from_fixed(usize::from(self.len), bytes)
    }
}

/// Encode every code and group the values by code prefix, each group sorted
/// by final byte. Codes the codec cannot encode are dropped. Groups come out
/// in deterministic (length, prefix) order.
pub(crate) fn grouped_by_prefix<V>(
    codec: &Codec,
    pairs: impl IntoIterator<Item = (Code, V)>,
) -> Vec<(Prefix, Vec<(u8, V)>)> {
    let mut groups: FxHashMap<Prefix, Vec<(u8, V)>> = FxHashMap::default();
    let mut buf = Vec::new();

    for (code, value) in pairs {
        buf.clear();
        if !codec.encode(&mut buf, code) {
            continue;
        }
        let Some(code_bytes) = CodeBytes::new(&buf) else {
            continue;
        };

        let (prefix, last) = Prefix::split(code_bytes);
        groups.entry(prefix).or_default().push((last, value));
    }

    let mut groups: Vec<_> = groups.into_iter().collect();
    groups.sort_by_key(|(prefix, _)| *prefix);
    for (_, entries) in &mut groups {
        entries.sort_by_key(|(last, _)| *last);
    }

    groups
}

/// Compress `(code, cid)` pairs into the shortest singles+ranges encoding:
/// maximal runs of consecutive final bytes with consecutive CIDs become one
/// range each, everything else a single.
pub(crate) fn compress_cids(
    codec: &Codec,
    pairs: impl IntoIterator<Item = (Code, Cid)>,
) -> (Vec<CidSingle>, Vec<CidRange>) {
    let mut singles = Vec::new();
    let mut ranges = Vec::new();

    for (prefix, entries) in grouped_by_prefix(codec, pairs) {
        let mut run_start = 0;

        for i in 1..=entries.len() {
            let extends = i < entries.len() && {
                let (prev_last, prev_cid) = entries[i - 1];
                let (last, cid) = entries[i];
                last == prev_last + 1 && cid == prev_cid.wrapping_add(1)
            };

            if extends {
                continue;
            }

            let (first_last, first_cid) = entries[run_start];
            if i - run_start >= 2 {
                let (end_last, _) = entries[i - 1];
                ranges.push(CidRange {
                    first: prefix.join(first_last),
                    last: prefix.join(end_last),
                    cid: first_cid,
                });
            } else {
                singles.push(CidSingle {
                    code: prefix.join(first_last),
                    cid: first_cid,
                });
            }
            run_start = i;
        }
    }

    (singles, ranges)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::range::{CodeRange, CodeSpaceRange};

    fn two_byte_codec() -> Codec {
        let csr = CodeSpaceRange::new(vec![
            CodeRange::new(&[0x00, 0x00], &[0xff, 0xff]).unwrap(),
        ]);
        Codec::new(csr).unwrap()
    }

    fn code(codec: &Codec, bytes: &[u8]) -> Code {
        codec.code_of(bytes).unwrap()
    }

    #[test]
    fn consecutive_cids_form_a_range() {
        let codec = two_byte_codec();
        let pairs = vec![
            (code(&codec, &[0x20, 0x41]), 10),
            (code(&codec, &[0x20, 0x42]), 11),
            (code(&codec, &[0x20, 0x43]), 12),
        ];

        let (singles, ranges) = compress_cids(&codec, pairs);
        assert!(singles.is_empty());
        assert_eq!(ranges.len(), 1);
        assert_eq!(ranges[0].first.as_slice(), &[0x20, 0x41]);
        assert_eq!(ranges[0].last.as_slice(), &[0x20, 0x43]);
        assert_eq!(ranges[0].cid, 10);
    }

    #[test]
    fn cid_jump_breaks_the_run() {
        let codec = two_byte_codec();
        let pairs = vec![
            (code(&codec, &[0x20, 0x41]), 10),
            (code(&codec, &[0x20, 0x42]), 11),
            (code(&codec, &[0x20, 0x43]), 20),
        ];

        let (singles, ranges) = compress_cids(&codec, pairs);
        assert_eq!(ranges.len(), 1);
        assert_eq!(ranges[0].last.as_slice(), &[0x20, 0x42]);
        assert_eq!(singles.len(), 1);
        assert_eq!(singles[0].code.as_slice(), &[0x20, 0x43]);
        assert_eq!(singles[0].cid, 20);
    }

    #[test]
    fn code_gap_breaks_the_run() {
        let codec = two_byte_codec();
        let pairs = vec![
            (code(&codec, &[0x20, 0x41]), 10),
            (code(&codec, &[0x20, 0x43]), 11),
        ];

        let (singles, ranges) = compress_cids(&codec, pairs);
        assert!(ranges.is_empty());
        assert_eq!(singles.len(), 2);
    }

    #[test]
    fn prefix_change_breaks_the_run() {
        let codec = two_byte_codec();
        // 0x20ff and 0x2100 are numerically consecutive but differ in the
        // first byte, which PDF range syntax cannot express.
        let pairs = vec![
            (code(&codec, &[0x20, 0xfe]), 10),
            (code(&codec, &[0x20, 0xff]), 11),
            (code(&codec, &[0x21, 0x00]), 12),
            (code(&codec, &[0x21, 0x01]), 13),
        ];

        let (singles, ranges) = compress_cids(&codec, pairs);
        assert!(singles.is_empty());
        assert_eq!(ranges.len(), 2);
        assert_eq!(ranges[0].first.as_slice(), &[0x20, 0xfe]);
        assert_eq!(ranges[1].first.as_slice(), &[0x21, 0x00]);
        assert_eq!(ranges[1].cid, 12);
    }

    #[test]
    fn deterministic_order() {
        let codec = two_byte_codec();
        let pairs = vec![
            (code(&codec, &[0x30, 0x01]), 7),
            (code(&codec, &[0x10, 0x01]), 3),
            (code(&codec, &[0x20, 0x01]), 5),
        ];

        let (singles, _) = compress_cids(&codec, pairs.clone());
        let mut reversed = pairs;
        reversed.reverse();
        let (singles2, _) = compress_cids(&codec, reversed);

        assert_eq!(singles, singles2);
        assert_eq!(singles[0].code.as_slice(), &[0x10, 0x01]);
        assert_eq!(singles[2].code.as_slice(), &[0x30, 0x01]);
    }

    #[test]
    fn unencodable_codes_are_dropped() {
        let codec = two_byte_codec();
        let total = codec.total_codes() as Code;

        let (singles, ranges) = compress_cids(&codec, vec![(total, 1), (total + 5, 2)]);
        assert!(singles.is_empty());
        assert!(ranges.is_empty());
    }
}
