//! Cross-reference table parser.
//!
//! Maps object numbers to byte offsets (or object stream slots) so the
//! document can resolve indirect references. Handles classic `xref` tables,
//! cross-reference streams (PDF 1.5+), hybrid files with `/XRefStm`, and the
//! `/Prev` chain left behind by incremental updates.

use crate::decoders::{decode_stream_with_params, DecodeParams};
use crate::error::{Error, Result};
use crate::object::{Dict, Object};
use crate::parser::{parse_indirect_object, parse_object};
use std::collections::{HashMap, HashSet};

/// Longest `/Prev` chain we are willing to follow.
const MAX_PREV_DEPTH: u32 = 100;

/// Cross-reference table entry type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XRefEntryType {
    /// Entry for a free object
    Free,
    /// Object stored at a byte offset
    Uncompressed,
    /// Object stored inside an object stream
    Compressed,
}

/// Cross-reference table entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XRefEntry {
    /// Type of entry
    pub entry_type: XRefEntryType,
    /// Byte offset (uncompressed) or object stream number (compressed)
    pub offset: u64,
    /// Generation number (uncompressed) or index within the stream (compressed)
    pub generation: u16,
}

impl XRefEntry {
    /// Entry for an object stored at `offset`.
    pub fn uncompressed(offset: u64, generation: u16) -> Self {
        Self {
            entry_type: XRefEntryType::Uncompressed,
            offset,
            generation,
        }
    }

    /// Entry for an object stored in object stream `stream_obj_num`.
    pub fn compressed(stream_obj_num: u64, index_in_stream: u16) -> Self {
        Self {
            entry_type: XRefEntryType::Compressed,
            offset: stream_obj_num,
            generation: index_in_stream,
        }
    }

    /// Free entry.
    pub fn free(next_free: u64, generation: u16) -> Self {
        Self {
            entry_type: XRefEntryType::Free,
            offset: next_free,
            generation,
        }
    }

    pub fn is_in_use(&self) -> bool {
        self.entry_type != XRefEntryType::Free
    }
}

/// Cross-reference table that maps object numbers to their locations.
#[derive(Debug, Clone, Default)]
pub struct CrossRefTable {
    entries: HashMap<u32, XRefEntry>,
    trailer: Option<Dict>,
    /// True when the most recent section is a cross-reference stream
    pub uses_xref_stream: bool,
}

impl CrossRefTable {
    /// Create a new empty cross-reference table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the trailer dictionary.
    pub fn set_trailer(&mut self, trailer: Dict) {
        self.trailer = Some(trailer);
    }

    /// Trailer of the most recent section.
    pub fn trailer(&self) -> Option<&Dict> {
        self.trailer.as_ref()
    }

    /// Add an entry, replacing an existing one.
    pub fn add_entry(&mut self, object_number: u32, entry: XRefEntry) {
        self.entries.insert(object_number, entry);
    }

    pub fn get(&self, object_number: u32) -> Option<&XRefEntry> {
        self.entries.get(&object_number)
    }

    pub fn contains(&self, object_number: u32) -> bool {
        self.entries.contains_key(&object_number)
    }

    /// Highest object number with an entry.
    pub fn max_object_number(&self) -> u32 {
        self.entries.keys().copied().max().unwrap_or(0)
    }

    /// Merge an older section into this one. Entries already present win.
    pub fn merge_from(&mut self, older: CrossRefTable) {
        for (obj_num, entry) in older.entries {
            self.entries.entry(obj_num).or_insert(entry);
        }
        if self.trailer.is_none() {
            self.trailer = older.trailer;
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Find the offset recorded after the last `startxref` keyword.
pub fn find_xref_offset(data: &[u8]) -> Result<u64> {
    let tail_start = data.len().saturating_sub(2048);
    let tail = &data[tail_start..];
    let pos = tail
        .windows(b"startxref".len())
        .rposition(|w| w == b"startxref")
        .ok_or(Error::InvalidXref)?;

    let digits: String = tail[pos + b"startxref".len()..]
        .iter()
        .skip_while(|c| c.is_ascii_whitespace())
        .take_while(|c| c.is_ascii_digit())
        .map(|&c| c as char)
        .collect();

    digits.parse::<u64>().map_err(|_| Error::InvalidXref)
}

/// Parse the cross-reference section at `offset` together with every older
/// section reachable through `/Prev` and `/XRefStm`.
pub fn parse_xref(data: &[u8], offset: u64) -> Result<CrossRefTable> {
    let mut visited = HashSet::new();
    let mut table = parse_xref_chain(data, offset, 0, &mut visited)?;
    let latest_is_stream = !section_at(data, offset)?.starts_with(b"xref");
    table.uses_xref_stream = latest_is_stream;
    Ok(table)
}

fn section_at(data: &[u8], offset: u64) -> Result<&[u8]> {
    let start = usize::try_from(offset).map_err(|_| Error::InvalidXref)?;
    if start >= data.len() {
        return Err(Error::InvalidXref);
    }
    let section = &data[start..];
    let skip = section.iter().take_while(|c| c.is_ascii_whitespace()).count();
    Ok(&section[skip..])
}

fn parse_xref_chain(
    data: &[u8],
    offset: u64,
    depth: u32,
    visited: &mut HashSet<u64>,
) -> Result<CrossRefTable> {
    if depth > MAX_PREV_DEPTH {
        return Err(Error::Document(format!(
            "xref /Prev chain deeper than {}",
            MAX_PREV_DEPTH
        )));
    }
    if !visited.insert(offset) {
        log::warn!("xref /Prev chain loops back to offset {}", offset);
        return Ok(CrossRefTable::new());
    }

    let section = section_at(data, offset)?;
    log::debug!("parsing xref section at offset {}", offset);

    let mut xref = if section.starts_with(b"xref") {
        let mut table = parse_traditional_xref(section)?;
        // Hybrid-reference files point at a supplementary xref stream.
        let xref_stm = table
            .trailer()
            .and_then(|t| t.get("XRefStm"))
            .and_then(|o| o.as_integer());
        if let Some(stm_offset) = xref_stm {
            match parse_xref_stream(section_at(data, stm_offset as u64)?) {
                Ok(stream_table) => {
                    for (num, entry) in stream_table.entries {
                        table.entries.entry(num).or_insert(entry);
                    }
                },
                Err(e) => log::warn!("ignoring unreadable /XRefStm at {}: {}", stm_offset, e),
            }
        }
        table
    } else if section.first().is_some_and(|c| c.is_ascii_digit()) {
        parse_xref_stream(section)?
    } else {
        return Err(Error::InvalidXref);
    };

    let prev = xref
        .trailer()
        .and_then(|t| t.get("Prev"))
        .and_then(|o| o.as_integer());
    if let Some(prev_offset) = prev {
        if prev_offset >= 0 {
            let older = parse_xref_chain(data, prev_offset as u64, depth + 1, visited)?;
            xref.merge_from(older);
        }
    }

    Ok(xref)
}

fn next_line(input: &[u8]) -> (&[u8], &[u8]) {
    let end = input
        .iter()
        .position(|&c| c == b'\n' || c == b'\r')
        .unwrap_or(input.len());
    let mut rest = &input[end..];
    while let Some(&c) = rest.first() {
        if c == b'\n' || c == b'\r' {
            rest = &rest[1..];
        } else {
            break;
        }
    }
    (&input[..end], rest)
}

fn parse_u64(field: &[u8]) -> Result<u64> {
    std::str::from_utf8(field)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or(Error::InvalidXref)
}

/// Parse a classic table:
///
/// ```text
/// xref
/// 0 6
/// 0000000000 65535 f
/// 0000000018 00000 n
/// trailer
/// << /Size 6 /Root 1 0 R >>
/// ```
fn parse_traditional_xref(section: &[u8]) -> Result<CrossRefTable> {
    let mut table = CrossRefTable::new();
    let (_, mut rest) = next_line(section);

    loop {
        let (line, after) = next_line(rest);
        let trimmed: Vec<&[u8]> = line
            .split(|c| c.is_ascii_whitespace())
            .filter(|f| !f.is_empty())
            .collect();

        if trimmed.first().is_some_and(|f| f.starts_with(b"trailer")) {
            let trailer_input = &rest[rest
                .windows(7)
                .position(|w| w == b"trailer")
                .ok_or(Error::InvalidXref)?
                + 7..];
            let (_, trailer) = parse_object(trailer_input).map_err(|_| Error::InvalidXref)?;
            match trailer {
                Object::Dictionary(dict) => table.set_trailer(dict),
                _ => return Err(Error::InvalidXref),
            }
            return Ok(table);
        }

        if trimmed.len() != 2 {
            return Err(Error::InvalidXref);
        }
        let start = parse_u64(trimmed[0])? as u32;
        let count = parse_u64(trimmed[1])? as u32;
        rest = after;

        for i in 0..count {
            let (entry_line, after_entry) = next_line(rest);
            let fields: Vec<&[u8]> = entry_line
                .split(|c| c.is_ascii_whitespace())
                .filter(|f| !f.is_empty())
                .collect();
            if fields.len() < 3 {
                return Err(Error::InvalidXref);
            }
            let offset = parse_u64(fields[0])?;
            let generation = parse_u64(fields[1])? as u16;
            let entry = match fields[2] {
                b"n" => XRefEntry::uncompressed(offset, generation),
                b"f" => XRefEntry::free(offset, generation),
                _ => return Err(Error::InvalidXref),
            };
            table.entries.entry(start + i).or_insert(entry);
            rest = after_entry;
        }
    }
}

fn read_field(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64)
}

/// Parse a cross-reference stream object.
fn parse_xref_stream(section: &[u8]) -> Result<CrossRefTable> {
    let (_, object) = parse_indirect_object(section)?;
    let (dict, raw) = match &object {
        Object::Stream { dict, data } => (dict, data),
        _ => return Err(Error::InvalidXref),
    };
    if dict.get("Type").and_then(|o| o.as_name()) != Some("XRef") {
        return Err(Error::InvalidXref);
    }

    let widths: Vec<usize> = dict
        .get("W")
        .and_then(|o| o.as_array())
        .ok_or(Error::InvalidXref)?
        .iter()
        .map(|o| o.as_integer().unwrap_or(0).max(0) as usize)
        .collect();
    if widths.len() != 3 {
        return Err(Error::InvalidXref);
    }
    let size = dict.get("Size").and_then(|o| o.as_integer()).ok_or(Error::InvalidXref)?;

    let index: Vec<(u32, u32)> = match dict.get("Index").and_then(|o| o.as_array()) {
        Some(arr) => arr
            .chunks_exact(2)
            .filter_map(|pair| Some((pair[0].as_integer()? as u32, pair[1].as_integer()? as u32)))
            .collect(),
        None => vec![(0, size as u32)],
    };

    let filters: Vec<String> = match dict.get("Filter") {
        Some(Object::Name(n)) => vec![n.clone()],
        Some(Object::Array(arr)) => arr.iter().filter_map(|o| o.as_name().map(str::to_string)).collect(),
        _ => Vec::new(),
    };
    let params = dict.get("DecodeParms").and_then(DecodeParams::from_object);
    let decoded = decode_stream_with_params(raw, &filters, params.as_ref())?;

    let row_len: usize = widths.iter().sum();
    if row_len == 0 {
        return Err(Error::InvalidXref);
    }

    let mut table = CrossRefTable::new();
    let mut rows = decoded.chunks_exact(row_len);
    for (start, count) in index {
        for i in 0..count {
            let row = match rows.next() {
                Some(row) => row,
                None => {
                    log::warn!("xref stream ended before /Index was exhausted");
                    break;
                },
            };
            let (w0, w1) = (widths[0], widths[1]);
            // Type defaults to 1 when its field width is zero.
            let kind = if w0 == 0 { 1 } else { read_field(&row[..w0]) };
            let field2 = read_field(&row[w0..w0 + w1]);
            let field3 = read_field(&row[w0 + w1..]);

            let entry = match kind {
                0 => XRefEntry::free(field2, field3 as u16),
                1 => XRefEntry::uncompressed(field2, field3 as u16),
                2 => XRefEntry::compressed(field2, field3 as u16),
                other => {
                    log::debug!("skipping xref stream entry of unknown type {}", other);
                    continue;
                },
            };
            table.entries.entry(start + i).or_insert(entry);
        }
    }

    let mut trailer = dict.clone();
    trailer.remove("Length");
    trailer.remove("Filter");
    trailer.remove("DecodeParms");
    table.set_trailer(trailer);
    Ok(table)
}
