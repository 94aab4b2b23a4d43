//! ByteRange calculation for PDF signatures.
//!
//! PDF digital signatures use a ByteRange array to specify which portions
//! of the document are covered by the signature. The signature itself is
//! stored in a placeholder that is excluded from the signed bytes.
//!
//! ## ByteRange Format
//!
//! The ByteRange is an array of four integers:
//! `[offset1, length1, offset2, length2]`
//!
//! Where:
//! - `offset1` = 0 (start of file)
//! - `length1` = byte offset where the signature value begins
//! - `offset2` = byte offset where the signature value ends
//! - `length2` = remaining bytes to end of file
//!
//! The signature value is a hex-encoded string within `<` and `>` delimiters.

use crate::error::{Error, Result};
use crate::lexer::{skip_ws, token, Token};
use crate::object::Object;
use std::ops::Range;

/// Value written into each `/ByteRange` slot before layout is known. Ten digits
/// leave room for any offset the final values can take.
const BYTE_RANGE_PLACEHOLDER: i64 = 9_999_999_999;

/// Calculator for PDF signature byte ranges.
#[derive(Debug)]
pub struct ByteRangeCalculator {
    /// Size of the placeholder for the signature value (hex digits + 2 for angle brackets)
    placeholder_size: usize,
}

impl ByteRangeCalculator {
    /// Create a new ByteRange calculator for a container of up to
    /// `reserved_bytes` bytes.
    ///
    /// The placeholder size is `reserved_bytes * 2 + 2`: the container is
    /// hex-encoded and enclosed in angle brackets.
    pub fn new(reserved_bytes: usize) -> Self {
        Self {
            placeholder_size: reserved_bytes * 2 + 2,
        }
    }

    /// Get the placeholder size (for the /Contents value).
    pub fn placeholder_size(&self) -> usize {
        self.placeholder_size
    }

    /// Number of container bytes that fit in the placeholder.
    pub fn capacity(&self) -> usize {
        (self.placeholder_size - 2) / 2
    }

    /// `/Contents` value that serializes to `<00...00>` of the placeholder size.
    pub fn contents_placeholder(&self) -> Object {
        Object::String(vec![0u8; self.capacity()])
    }

    /// `/ByteRange` value of fixed width, patched by [`patch_byte_range`](Self::patch_byte_range).
    pub fn byte_range_placeholder() -> Object {
        Object::Array(vec![
            Object::Integer(0),
            Object::Integer(BYTE_RANGE_PLACEHOLDER),
            Object::Integer(BYTE_RANGE_PLACEHOLDER),
            Object::Integer(BYTE_RANGE_PLACEHOLDER),
        ])
    }

    /// Calculate the ByteRange array given the position of the /Contents value.
    ///
    /// `contents_offset` is the offset of the opening `<`.
    pub fn calculate_byte_range(&self, file_size: usize, contents_offset: usize) -> [i64; 4] {
        let before_sig = contents_offset as i64;
        let after_sig_start = (contents_offset + self.placeholder_size) as i64;
        let after_sig_len = file_size as i64 - after_sig_start;

        [0, before_sig, after_sig_start, after_sig_len]
    }

    /// Format a ByteRange array as a PDF array string.
    pub fn format_byte_range(byte_range: &[i64; 4]) -> String {
        format!("[{} {} {} {}]", byte_range[0], byte_range[1], byte_range[2], byte_range[3])
    }

    /// Find the `[...]` value of `/ByteRange` in the signature dictionary
    /// written at `sig_object`.
    ///
    /// Returns the span from `[` to `]` inclusive.
    pub fn find_byte_range_span(pdf_data: &[u8], sig_object: Range<usize>) -> Option<Range<usize>> {
        find_key_value(pdf_data, sig_object, "ByteRange").filter(|span| pdf_data[span.start] == b'[')
    }

    /// Overwrite the placeholder array with the final values, padded with
    /// spaces so no byte moves.
    pub fn patch_byte_range(
        pdf_data: &mut [u8],
        span: Range<usize>,
        byte_range: &[i64; 4],
    ) -> Result<()> {
        let formatted = Self::format_byte_range(byte_range);
        if formatted.len() > span.len() || span.end > pdf_data.len() {
            return Err(Error::Document(format!(
                "ByteRange {} does not fit its {}-byte placeholder",
                formatted,
                span.len()
            )));
        }
        let target = &mut pdf_data[span];
        target.fill(b' ');
        let closing = target.len() - 1;
        target[..formatted.len() - 1].copy_from_slice(&formatted.as_bytes()[..formatted.len() - 1]);
        target[closing] = b']';
        Ok(())
    }

    /// Extract the bytes to be signed from a PDF file.
    ///
    /// This returns the concatenation of the two ranges specified by ByteRange.
    pub fn extract_signed_bytes(pdf_data: &[u8], byte_range: &[i64; 4]) -> Result<Vec<u8>> {
        let (first, second) = Self::signed_slices(pdf_data, byte_range)?;
        let mut signed_bytes = Vec::with_capacity(first.len() + second.len());
        signed_bytes.extend_from_slice(first);
        signed_bytes.extend_from_slice(second);
        Ok(signed_bytes)
    }

    /// The two signed ranges, borrowed from the file.
    pub fn signed_slices<'a>(pdf_data: &'a [u8], byte_range: &[i64; 4]) -> Result<(&'a [u8], &'a [u8])> {
        if byte_range.iter().any(|v| *v < 0) {
            return Err(Error::Cryptographic(format!(
                "ByteRange contains negative values: {}",
                Self::format_byte_range(byte_range)
            )));
        }
        let offset1 = byte_range[0] as usize;
        let length1 = byte_range[1] as usize;
        let offset2 = byte_range[2] as usize;
        let length2 = byte_range[3] as usize;

        if offset1.checked_add(length1).map_or(true, |end| end > pdf_data.len()) {
            return Err(Error::Cryptographic(format!(
                "ByteRange first range exceeds file size: {} + {} > {}",
                offset1,
                length1,
                pdf_data.len()
            )));
        }
        if offset2.checked_add(length2).map_or(true, |end| end > pdf_data.len()) {
            return Err(Error::Cryptographic(format!(
                "ByteRange second range exceeds file size: {} + {} > {}",
                offset2,
                length2,
                pdf_data.len()
            )));
        }

        Ok((
            &pdf_data[offset1..offset1 + length1],
            &pdf_data[offset2..offset2 + length2],
        ))
    }

    /// Structural check of a ByteRange against the file it came from.
    ///
    /// The first range must start at 0, both ranges must lie inside the file,
    /// and the gap between them must hold exactly one hex string.
    pub fn validate_byte_range(byte_range: &[i64; 4], pdf_data: &[u8]) -> Result<()> {
        let offset1 = byte_range[0];
        let length1 = byte_range[1];
        let offset2 = byte_range[2];

        // First range must start at 0
        if offset1 != 0 {
            return Err(Error::Cryptographic(format!("ByteRange must start at 0, got {}", offset1)));
        }

        Self::signed_slices(pdf_data, byte_range)?;

        // First range must end before second range starts
        if length1 >= offset2 {
            return Err(Error::Cryptographic(format!(
                "ByteRange first range ({}) overlaps with second range start ({})",
                length1, offset2
            )));
        }

        let gap = &pdf_data[length1 as usize..offset2 as usize];
        let well_formed = gap.len() >= 2
            && gap[0] == b'<'
            && gap[gap.len() - 1] == b'>'
            && gap[1..gap.len() - 1]
                .iter()
                .all(|b| b.is_ascii_hexdigit() || b.is_ascii_whitespace());
        if !well_formed {
            return Err(Error::Cryptographic(
                "ByteRange gap does not hold exactly the /Contents hex string".to_string(),
            ));
        }

        Ok(())
    }

    /// True when the second range reaches the end of the file.
    pub fn covers_whole_document(byte_range: &[i64; 4], file_size: usize) -> bool {
        byte_range[0] == 0 && byte_range[2] + byte_range[3] == file_size as i64
    }

    /// Find the /Contents value position in the signature dictionary
    /// written at `sig_object`.
    ///
    /// Returns the offset of the opening angle bracket of the hex string.
    pub fn find_contents_offset(pdf_data: &[u8], sig_object: Range<usize>) -> Option<usize> {
        find_key_value(pdf_data, sig_object, "Contents")
            .filter(|span| pdf_data[span.start] == b'<')
            .map(|span| span.start)
    }

    /// Replace the placeholder in the PDF with the actual signature.
    ///
    /// The container is hex-encoded and padded with zeros to fill the placeholder.
    pub fn insert_signature(&self, pdf_data: &mut [u8], contents_offset: usize, container: &[u8]) -> Result<()> {
        let signature_hex = crate::decoders::encode_hex_upper(container);

        // Verify the signature fits in the placeholder
        let sig_len = signature_hex.len() + 2;
        if sig_len > self.placeholder_size {
            return Err(Error::Cryptographic(format!(
                "signature container ({} bytes) exceeds reserved space ({} bytes)",
                container.len(),
                self.capacity()
            )));
        }

        if contents_offset + self.placeholder_size > pdf_data.len() {
            return Err(Error::Document("signature insertion would exceed file bounds".to_string()));
        }

        let target = &mut pdf_data[contents_offset..contents_offset + self.placeholder_size];
        if target[0] != b'<' || target[self.placeholder_size - 1] != b'>' {
            return Err(Error::Document("no /Contents placeholder at the expected offset".to_string()));
        }
        target[1..1 + signature_hex.len()].copy_from_slice(signature_hex.as_bytes());
        target[1 + signature_hex.len()..self.placeholder_size - 1].fill(b'0');

        Ok(())
    }
}

/// Extent of the value stored under `key` in the top-level dictionary of the
/// indirect object at `object`.
///
/// Walks tokens rather than bytes, so string values that happen to contain
/// `/Contents` or `endobj` are skipped whole.
fn find_key_value(pdf_data: &[u8], object: Range<usize>, key: &str) -> Option<Range<usize>> {
    let body = pdf_data.get(object.clone())?;
    let mut rest = body;
    let mut depth = 0usize;
    let mut after_key = false;
    let mut value_start = None;

    while !rest.is_empty() {
        let (at, _) = skip_ws(rest).ok()?;
        if at.is_empty() {
            break;
        }
        let (next, tok) = token(at).ok()?;
        let start = object.start + (body.len() - at.len());
        let end = object.start + (body.len() - next.len());
        rest = next;

        if after_key {
            value_start = Some(start);
            after_key = false;
        }
        match tok {
            Token::DictStart | Token::ArrayStart => depth += 1,
            Token::DictEnd | Token::ArrayEnd => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return None;
                }
            },
            Token::Name(name) if depth == 1 && value_start.is_none() && name == key => {
                after_key = true;
                continue;
            },
            Token::ObjEnd => return None,
            _ => {},
        }
        if let Some(value_start) = value_start {
            if depth == 1 {
                return Some(value_start..end);
            }
        }
    }
    None
}
