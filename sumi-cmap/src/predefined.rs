//! The predefined CMap registry.
//!
//! PDF names a fixed set of CMaps (Identity-H/V and the Adobe-CJK family)
//! that viewers must provide without the PDF embedding them. The resources
//! are carried as one gzip-compressed bundle inside the crate and parsed on
//! first use; every name resolves to one shared, immutable file.

use std::io::Read;
use std::ops::Range;
use std::sync::{Arc, LazyLock, Mutex};

use flate2::read::GzDecoder;
use rustc_hash::FxHashMap;

use crate::error::{Error, Result};
use crate::file::CMapFile;
use crate::read;

/// Every predefined CMap name of the PDF specification.
const PREDEFINED_NAMES: &[&str] = &[
    "83pv-RKSJ-H",
    "90ms-RKSJ-H",
    "90ms-RKSJ-V",
    "90msp-RKSJ-H",
    "90msp-RKSJ-V",
    "90pv-RKSJ-H",
    "Add-RKSJ-H",
    "Add-RKSJ-V",
    "B5pc-H",
    "B5pc-V",
    "CNS-EUC-H",
    "CNS-EUC-V",
    "ETen-B5-H",
    "ETen-B5-V",
    "ETenms-B5-H",
    "ETenms-B5-V",
    "EUC-H",
    "EUC-V",
    "Ext-RKSJ-H",
    "Ext-RKSJ-V",
    "GB-EUC-H",
    "GB-EUC-V",
    "GBK-EUC-H",
    "GBK-EUC-V",
    "GBK2K-H",
    "GBK2K-V",
    "GBKp-EUC-H",
    "GBKp-EUC-V",
    "GBpc-EUC-H",
    "GBpc-EUC-V",
    "H",
    "HKscs-B5-H",
    "HKscs-B5-V",
    "Identity-H",
    "Identity-V",
    "KSC-EUC-H",
    "KSC-EUC-V",
    "KSCms-UHC-H",
    "KSCms-UHC-HW-H",
    "KSCms-UHC-HW-V",
    "KSCms-UHC-V",
    "KSCpc-EUC-H",
    "UniCNS-UCS2-H",
    "UniCNS-UCS2-V",
    "UniCNS-UTF16-H",
    "UniCNS-UTF16-V",
    "UniGB-UCS2-H",
    "UniGB-UCS2-V",
    "UniGB-UTF16-H",
    "UniGB-UTF16-V",
    "UniJIS-UCS2-H",
    "UniJIS-UCS2-HW-H",
    "UniJIS-UCS2-HW-V",
    "UniJIS-UCS2-V",
    "UniJIS-UTF16-H",
    "UniJIS-UTF16-V",
    "UniKS-UCS2-H",
    "UniKS-UCS2-V",
    "UniKS-UTF16-H",
    "UniKS-UTF16-V",
    "V",
];

const BUNDLE_MAGIC: &[u8] = b"bCMP";
const BUNDLE_VERSION: u8 = 1;

/// Resolve a predefined CMap by name.
///
/// The first resolution of each name parses the embedded resource; later
/// calls return the same shared file. A name outside the predefined set, or
/// one whose resource is not in the embedded bundle, reports
/// [`Error::UnknownCMap`].
pub fn predefined(name: &str) -> Result<Arc<CMapFile>> {
    if !PREDEFINED_NAMES.contains(&name) {
        return Err(Error::UnknownCMap(name.to_owned()));
    }

    let mut cache = CACHE.lock().unwrap();

    if let Some(file) = cache.by_name.get(name) {
        return Ok(file.clone());
    }

    let data = load_embedded(name).ok_or_else(|| Error::UnknownCMap(name.to_owned()))?;
    let file = read::extract_cmap(data, |parent| load_embedded(parent).map(<[u8]>::to_vec))?;
    let file = Arc::new(file);

    cache.by_name.insert(name.to_owned(), file.clone());
    cache
        .names
        .insert(Arc::as_ptr(&file) as usize, name.to_owned());

    Ok(file)
}

/// The predefined name under which `file` was resolved, if it came out of
/// [`predefined`]. Used when embedding: a predefined CMap is referenced by
/// name instead of being written into the PDF.
pub fn predefined_name(file: &Arc<CMapFile>) -> Option<String> {
    let cache = CACHE.lock().unwrap();
    cache.names.get(&(Arc::as_ptr(file) as usize)).cloned()
}

/// The names whose resources are present in the embedded bundle.
pub fn embedded_names() -> impl Iterator<Item = &'static str> {
    BUNDLE.entries.iter().map(|(name, _)| name.as_str())
}

/// The raw stream data of an embedded resource.
fn load_embedded(name: &str) -> Option<&'static [u8]> {
    let bundle: &Bundle = &BUNDLE;
    let (_, range) = bundle.entries.iter().find(|(n, _)| n == name)?;
    Some(&bundle.data[range.clone()])
}

#[derive(Default)]
struct Cache {
    by_name: FxHashMap<String, Arc<CMapFile>>,
    /// Reverse map, keyed by the address of the shared allocation.
    names: FxHashMap<usize, String>,
}

static CACHE: LazyLock<Mutex<Cache>> = LazyLock::new(|| Mutex::new(Cache::default()));

struct Bundle {
    data: Vec<u8>,
    entries: Vec<(String, Range<usize>)>,
}

static BUNDLE: LazyLock<Bundle> = LazyLock::new(|| {
    // The bundle ships with the crate and is validated by the tests, so this
    // only unwraps known-good data.
    let compressed: &[u8] = include_bytes!("../assets/cmaps.gz");

    let mut data = Vec::new();
    GzDecoder::new(compressed)
        .read_to_end(&mut data)
        .unwrap();

    parse_bundle(data).unwrap()
});

fn parse_bundle(data: Vec<u8>) -> Option<Bundle> {
    let mut entries = Vec::new();

    {
        let mut r = Reader::new(&data);
        if r.read_bytes(4)? != BUNDLE_MAGIC || r.read_u8()? != BUNDLE_VERSION {
            return None;
        }

        let count = r.read_u16()?;
        for _ in 0..count {
            let name_len = usize::from(r.read_u8()?);
            let name = std::str::from_utf8(r.read_bytes(name_len)?).ok()?.to_owned();

            let data_len = r.read_u32()? as usize;
            let start = r.position();
            r.read_bytes(data_len)?;

            entries.push((name, start..start + data_len));
        }

        if !r.at_end() {
            return None;
        }
    }

    Some(Bundle { data, entries })
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn position(&self) -> usize {
        self.pos
    }

    fn at_end(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn read_bytes(&mut self, n: usize) -> Option<&'a [u8]> {
        let bytes = self.data.get(self.pos..self.pos + n)?;
        self.pos += n;
        Some(bytes)
    }

    fn read_u8(&mut self) -> Option<u8> {
        let b = *self.data.get(self.pos)?;
        self.pos += 1;
        Some(b)
    }

    fn read_u16(&mut self) -> Option<u16> {
        let bytes: [u8; 2] = self.read_bytes(2)?.try_into().ok()?;
        Some(u16::from_be_bytes(bytes))
    }

    fn read_u32(&mut self) -> Option<u32> {
        let bytes: [u8; 4] = self.read_bytes(4)?.try_into().ok()?;
        Some(u32::from_be_bytes(bytes))
    }
}
