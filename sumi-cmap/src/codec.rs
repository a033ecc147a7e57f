//! The compiled decoder automaton.

use std::collections::BTreeSet;

use rustc_hash::FxHashMap;

use crate::error::{Error, Result};
use crate::range::{CodeRange, CodeSpaceRange};
use crate::Code;

/// Child index of an invalid leaf that skips no extra bytes. The skip counts
/// 0..=3 occupy four consecutive values below [`LEAF_VALID`].
const LEAF_INVALID_0: u16 = 0xFFFB;
/// Child index of an accepting leaf.
const LEAF_VALID: u16 = 0xFFFF;

/// One arc of the decoder tree: taken for the current byte `b` when this is
/// the first arc of the node with `high >= b`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Node {
    pub(crate) high: u8,
    pub(crate) child: u16,
}

/// A compiled decoder for one [`CodeSpaceRange`].
///
/// The codec segments a byte stream into character codes and gives each
/// accepted byte sequence a dense integer id: the ordered ranges form a
/// mixed-radix numbering system in which each range contributes
/// [`CodeRange::num_codes`] consecutive ids.
///
/// Internally the code space is compiled into a trie with one byte per
/// level, stored as a flat arc vector. Structurally identical subtrees are
/// hash-consed, so e.g. the ninety-four second-byte classes of a typical
/// double-byte CMap share one node.
#[derive(Debug, Clone)]
pub struct Codec {
    code_space: CodeSpaceRange,
    nodes: Vec<Node>,
}

impl Codec {
    /// Compile a code-space range.
    ///
    /// Fails if the range accepts more than 2^32 sequences (ids no longer
    /// fit a [`Code`]) or if the tree grows past its `u16` index space.
    pub fn new(code_space: CodeSpaceRange) -> Result<Self> {
        if code_space.total_codes() > 1_u64 << 32 {
            return Err(Error::InvalidRange("code space exceeds 32-bit code ids"));
        }

        let mut builder = Builder {
            arena: Vec::new(),
            dedup: FxHashMap::default(),
        };
        let root = builder.build_node(code_space.ranges(), 0)?;
        let nodes = flatten(&builder.arena, root)?;

        Ok(Self { code_space, nodes })
    }

    /// The code-space range this codec was compiled from.
    pub fn code_space(&self) -> &CodeSpaceRange {
        &self.code_space
    }

    /// The total number of codes; valid ids are `0..total_codes`.
    pub fn total_codes(&self) -> u64 {
        self.code_space.total_codes()
    }

    #[cfg(test)]
    pub(crate) fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Split the next character code off the front of `bytes`.
    ///
    /// Returns `(code, consumed, valid)`. On a valid code, `consumed` is the
    /// code length. On an invalid or incomplete code, enough bytes are
    /// consumed (at least one, at most the whole input) that decoding can
    /// resume at the next plausible code boundary. Empty input consumes
    /// nothing.
    pub fn decode(&self, bytes: &[u8]) -> (Code, usize, bool) {
        let mut consumed = 0;
        let mut node = 0;

        loop {
            let Some(&b) = bytes.get(consumed) else {
                return (0, consumed, false);
            };
            consumed += 1;

            let mut i = node;
            while self.nodes[i].high < b {
                i += 1;
            }

            match self.nodes[i].child {
                LEAF_VALID => {
                    return match self.ordinal(&bytes[..consumed]) {
                        Some(code) => (code, consumed, true),
                        None => (0, consumed, false),
                    };
                }
                c if c >= LEAF_INVALID_0 => {
                    let skip = usize::from(c - LEAF_INVALID_0);
                    consumed = (consumed + skip).min(bytes.len());
                    return (0, consumed, false);
                }
                c => node = usize::from(c),
            }
        }
    }

    /// The code id of `bytes`, if the codec accepts it as exactly one
    /// character code.
    pub fn code_of(&self, bytes: &[u8]) -> Option<Code> {
        match self.decode(bytes) {
            (code, consumed, true) if consumed == bytes.len() => Some(code),
            _ => None,
        }
    }

    /// Append the byte sequence of `code` to `buf`. Returns `false` (leaving
    /// `buf` untouched) if `code` is not a valid id for this codec.
    pub fn encode(&self, buf: &mut Vec<u8>, code: Code) -> bool {
        let mut rest = u64::from(code);

        for r in self.code_space.ranges() {
            let n = r.num_codes();
            if rest < n {
                r.seq_at(rest, buf);
                return true;
            }
            rest -= n;
        }

        false
    }

    /// The id of `bytes` within the mixed-radix enumeration, ignoring
    /// shadowing by other ranges. Only called for automaton-accepted slices,
    /// for which the first listed length-matching range is the accepting one.
    fn ordinal(&self, bytes: &[u8]) -> Option<Code> {
        let mut base = 0_u64;

        for r in self.code_space.ranges() {
            if r.len() == bytes.len() {
                if let Some(index) = r.index_of(bytes) {
                    return Code::try_from(base + index).ok();
                }
            }
            base += r.num_codes();
        }

        None
    }
}

struct Builder {
    /// Logical nodes; arc children are either sentinels or arena ids.
    arena: Vec<Vec<(u8, u16)>>,
    /// Canonical arc signature of a subtree → its arena id.
    dedup: FxHashMap<Vec<u8>, u16>,
}

impl Builder {
    /// Build the sub-automaton for the ranges still active after `depth`
    /// matched bytes, returning its arena id.
    fn build_node(&mut self, active: &[CodeRange], depth: usize) -> Result<u16> {
        // Break points split [0..=255] into intervals that no active range
        // bound crosses, so each interval is either fully covered by a range
        // or disjoint from it.
        let mut breaks: BTreeSet<u16> = BTreeSet::from([0]);
        for r in active {
            breaks.insert(u16::from(r.low()[depth]));
            breaks.insert(u16::from(r.high()[depth]) + 1);
        }
        breaks.remove(&256);
        let bounds: Vec<u16> = breaks.into_iter().collect();

        let mut arcs: Vec<(u8, u16)> = Vec::with_capacity(bounds.len());

        for (i, &lo) in bounds.iter().enumerate() {
            let hi = bounds.get(i + 1).map_or(255, |&b| (b - 1) as u8);
            let lo = lo as u8;

            let overlapping: Vec<CodeRange> = active
                .iter()
                .filter(|r| r.low()[depth] <= lo && hi <= r.high()[depth])
                .copied()
                .collect();

            let child = if overlapping.is_empty() {
                // Resynchronisation: skip forward to where the shortest code
                // that could have started here would have ended.
                let min_len = active.iter().map(CodeRange::len).min().unwrap_or(depth + 1);
                LEAF_INVALID_0 + (min_len - depth - 1).min(3) as u16
            } else if overlapping[0].len() == depth + 1 {
                // The first-listed matching range ends with this byte.
                LEAF_VALID
            } else {
                let continuing: Vec<CodeRange> = overlapping
                    .iter()
                    .filter(|r| r.len() > depth + 1)
                    .copied()
                    .collect();
                self.build_node(&continuing, depth + 1)?
            };

            match arcs.last_mut() {
                Some(last) if last.1 == child => last.0 = hi,
                _ => arcs.push((hi, child)),
            }
        }

        let mut sig = Vec::with_capacity(arcs.len() * 3);
        for &(high, child) in &arcs {
            sig.push(high);
            sig.extend_from_slice(&child.to_be_bytes());
        }

        if let Some(&id) = self.dedup.get(&sig) {
            return Ok(id);
        }

        let id = self.arena.len();
        if id >= usize::from(LEAF_INVALID_0) {
            return Err(Error::InvalidRange("decoder tree too large"));
        }

        self.arena.push(arcs);
        self.dedup.insert(sig, id as u16);
        Ok(id as u16)
    }
}

/// Lay the arena out as one flat arc vector, root first, children in
/// first-visit breadth order. Every shared subtree is stored once.
fn flatten(arena: &[Vec<(u8, u16)>], root: u16) -> Result<Vec<Node>> {
    let mut order = vec![usize::from(root)];
    let mut seen: Vec<bool> = vec![false; arena.len()];
    seen[usize::from(root)] = true;

    let mut next = 0;
    while next < order.len() {
        for &(_, child) in &arena[order[next]] {
            if child < LEAF_INVALID_0 && !seen[usize::from(child)] {
                seen[usize::from(child)] = true;
                order.push(usize::from(child));
            }
        }
        next += 1;
    }

    let total: usize = order.iter().map(|&id| arena[id].len()).sum();
    if total >= usize::from(LEAF_INVALID_0) {
        return Err(Error::InvalidRange("decoder tree too large"));
    }

    let mut offsets = vec![0_u16; arena.len()];
    let mut acc = 0_u16;
    for &id in &order {
        offsets[id] = acc;
        acc += arena[id].len() as u16;
    }

    let mut nodes = Vec::with_capacity(total);
    for &id in &order {
        for &(high, child) in &arena[id] {
            let child = if child >= LEAF_INVALID_0 {
                child
            } else {
                offsets[usize::from(child)]
            };
            nodes.push(Node { high, child });
        }
    }

    Ok(nodes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(low: &[u8], high: &[u8]) -> CodeRange {
        CodeRange::new(low, high).unwrap()
    }

    fn codec(ranges: &[(&[u8], &[u8])]) -> Codec {
        let csr = ranges
            .iter()
            .map(|(l, h)| range(l, h))
            .collect::<CodeSpaceRange>();
        Codec::new(csr).unwrap()
    }

    /// EUC-H: one-byte <00>..<80>, two-byte <8ea0>..<8edf> and <a1a1>..<fefe>.
    fn euc() -> Codec {
        codec(&[
            (&[0x00], &[0x80]),
            (&[0x8e, 0xa0], &[0x8e, 0xdf]),
            (&[0xa1, 0xa1], &[0xfe, 0xfe]),
        ])
    }

    #[test]
    fn euc_decode() {
        let c = euc();

        let (k1, consumed, valid) = c.decode(&[0x41]);
        assert!(valid);
        assert_eq!(consumed, 1);

        let (k2, consumed, valid) = c.decode(&[0x8e, 0xa0]);
        assert!(valid);
        assert_eq!(consumed, 2);
        assert_ne!(k1, k2);

        assert_eq!(c.decode(&[0x8e, 0x00]), (0, 2, false));
        assert_eq!(c.decode(&[]), (0, 0, false));
    }

    #[test]
    fn euc_decode_prefix_of_longer_input() {
        let c = euc();

        // Decoding takes one code off the front and leaves the rest.
        let (code, consumed, valid) = c.decode(&[0x41, 0xa1, 0xa1]);
        assert!(valid);
        assert_eq!(consumed, 1);
        assert_eq!(code, 0x41);

        let (_, consumed, valid) = c.decode(&[0xa1, 0xa1, 0x41]);
        assert!(valid);
        assert_eq!(consumed, 2);
    }

    #[test]
    fn euc_invalid_recovery() {
        let c = euc();

        // No range starts with 0x81: a single byte is skipped.
        assert_eq!(c.decode(&[0x81, 0x41]), (0, 1, false));
        // 0x8e opens a two-byte code whose second byte is out of class.
        assert_eq!(c.decode(&[0x8e, 0xff, 0x41]), (0, 2, false));
        // Truncated two-byte code.
        assert_eq!(c.decode(&[0x8e]), (0, 1, false));
        assert_eq!(c.decode(&[0xa1]), (0, 1, false));
    }

    #[test]
    fn totality() {
        let c = euc();

        for b0 in 0..=255_u8 {
            for b1 in [0x00, 0x41, 0x80, 0x8e, 0xa0, 0xdf, 0xfe, 0xff] {
                let input = [b0, b1];
                let (_, consumed, _) = c.decode(&input);
                assert!(consumed >= 1, "consumed nothing for {input:02x?}");
                assert!(consumed <= input.len());
            }

            let (_, consumed, _) = c.decode(&[b0]);
            assert_eq!(consumed, 1);
        }
    }

    #[test]
    fn round_trip_all_codes() {
        let cases: Vec<Codec> = vec![
            euc(),
            codec(&[(&[0x00, 0x00], &[0xff, 0xff])]),
            codec(&[
                (&[0x20], &[0x7e]),
                (&[0x01, 0x00, 0x00], &[0x02, 0x10, 0x05]),
            ]),
        ];

        for c in cases {
            let mut buf = Vec::new();
            for code in 0..c.total_codes() as Code {
                buf.clear();
                assert!(c.encode(&mut buf, code));

                let (decoded, consumed, valid) = c.decode(&buf);
                assert!(valid, "rejects own encoding {buf:02x?}");
                assert_eq!(consumed, buf.len());
                assert_eq!(decoded, code);
            }

            buf.clear();
            assert!(!c.encode(&mut buf, c.total_codes() as Code));
            assert!(buf.is_empty());
        }
    }

    #[test]
    fn code_ids_are_dense_and_stable() {
        let c = euc();
        assert_eq!(c.total_codes(), 0x81 + 64 + 94 * 94);

        assert_eq!(c.code_of(&[0x00]), Some(0));
        assert_eq!(c.code_of(&[0x80]), Some(0x80));
        assert_eq!(c.code_of(&[0x8e, 0xa0]), Some(0x81));
        assert_eq!(c.code_of(&[0x8e, 0xdf]), Some(0x81 + 63));
        assert_eq!(c.code_of(&[0xa1, 0xa1]), Some(0x81 + 64));
        assert_eq!(c.code_of(&[0xfe, 0xfe]), Some(0x81 + 64 + 94 * 94 - 1));

        assert_eq!(c.code_of(&[0x8e, 0x00]), None);
        assert_eq!(c.code_of(&[0x41, 0x41]), None);
    }

    #[test]
    fn shared_subtree_dedup() {
        let c = codec(&[
            (&[0x01, 0x0a], &[0x01, 0x14]),
            (&[0x03, 0x0a], &[0x03, 0x14]),
            (&[0x05, 0x0a], &[0x05, 0x14]),
        ]);
        let nodes = c.nodes();

        // Seven root arcs plus one shared three-arc second-byte subtree.
        assert_eq!(nodes.len(), 10);

        let child = nodes[1].child;
        assert!(child < LEAF_INVALID_0);
        assert_eq!(nodes[3].child, child);
        assert_eq!(nodes[5].child, child);

        // The three dead root intervals skip one extra byte.
        assert_eq!(nodes[0].child, LEAF_INVALID_0 + 1);
        assert_eq!(nodes[2].child, LEAF_INVALID_0 + 1);
        assert_eq!(nodes[6].child, LEAF_INVALID_0 + 1);

        // Decoding still resolves each range to its own block of ids.
        assert_eq!(c.code_of(&[0x01, 0x0a]), Some(0));
        assert_eq!(c.code_of(&[0x03, 0x0a]), Some(11));
        assert_eq!(c.code_of(&[0x05, 0x14]), Some(32));
        assert_eq!(c.decode(&[0x02, 0x0a]), (0, 2, false));
    }

    #[test]
    fn first_listed_range_shadows() {
        // The two-byte range is listed first and keeps matching, so the
        // one-byte range behind it never accepts.
        let c = codec(&[(&[0x00, 0x00], &[0xff, 0xff]), (&[0x00], &[0xff])]);

        assert_eq!(c.decode(&[0x41]), (0, 1, false));
        let (_, consumed, valid) = c.decode(&[0x41, 0x42]);
        assert!(valid);
        assert_eq!(consumed, 2);

        assert_eq!(c.code_of(&[0x41]), None);
    }

    #[test]
    fn empty_code_space() {
        let c = Codec::new(CodeSpaceRange::default()).unwrap();
        assert_eq!(c.decode(&[0x41]), (0, 1, false));
        assert_eq!(c.decode(&[]), (0, 0, false));
        assert_eq!(c.total_codes(), 0);
    }

    #[test]
    fn four_byte_codes() {
        let c = codec(&[(&[0x8e, 0xa1, 0xa1, 0xa1], &[0x8e, 0xa1, 0xfe, 0xfe])]);

        let (code, consumed, valid) = c.decode(&[0x8e, 0xa1, 0xa1, 0xa2]);
        assert!(valid);
        assert_eq!(consumed, 4);
        assert_eq!(code, 1);

        // An impossible second byte skips the whole four-byte frame.
        assert_eq!(c.decode(&[0x8e, 0x00, 0x00, 0x00, 0x41]), (0, 4, false));
        // Near the end of input the skip is clamped.
        assert_eq!(c.decode(&[0x8e, 0x00]), (0, 2, false));
    }

    #[test]
    fn oversized_code_space_rejected() {
        let full = range(&[0, 0, 0, 0], &[0xff, 0xff, 0xff, 0xff]);
        assert!(Codec::new(CodeSpaceRange::new(vec![full])).is_ok());
        assert!(matches!(
            Codec::new(CodeSpaceRange::new(vec![full, range(&[0], &[0])])),
            Err(Error::InvalidRange(_))
        ));
    }
}
