//! Stream decoders for the filters found in the structural parts of a PDF.
//!
//! Signing only needs to read object streams, xref streams and the odd
//! metadata stream, so only `FlateDecode` and `ASCIIHexDecode` are supported,
//! together with the PNG and TIFF predictors used by xref streams.

use crate::error::{Error, Result};
use crate::object::Object;

mod ascii_hex;
mod flate;
mod predictor;

pub use ascii_hex::{decode_hex_digits, encode_hex_upper, AsciiHexDecoder};
pub use flate::{flate_encode, FlateDecoder};
pub use predictor::decode_predictor;

/// Decompression ratio above which a stream is treated as a decompression bomb.
const MAX_DECOMPRESSION_RATIO: usize = 200;
/// Upper bound on any single decoded stream.
const MAX_DECOMPRESSED_SIZE: usize = 256 * 1024 * 1024;

/// Trait for PDF stream decoders.
pub trait StreamDecoder {
    /// Decode the input data.
    fn decode(&self, input: &[u8]) -> Result<Vec<u8>>;

    /// Name of the filter (e.g. "FlateDecode").
    fn name(&self) -> &str;
}

/// Decode parameters (`/DecodeParms`) relevant to predictors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeParams {
    /// Predictor algorithm (1 = none, 2 = TIFF, 10-15 = PNG)
    pub predictor: i64,
    /// Number of samples per row
    pub columns: usize,
    /// Number of color components per sample
    pub colors: usize,
    /// Bits per component
    pub bits_per_component: usize,
}

impl Default for DecodeParams {
    fn default() -> Self {
        Self {
            predictor: 1,
            columns: 1,
            colors: 1,
            bits_per_component: 8,
        }
    }
}

impl DecodeParams {
    /// Read parameters from a `/DecodeParms` value (dictionary, or the first
    /// dictionary of an array).
    pub fn from_object(obj: &Object) -> Option<Self> {
        let dict = match obj {
            Object::Dictionary(d) => d,
            Object::Array(arr) => arr.iter().find_map(|o| o.as_dict())?,
            _ => return None,
        };
        let get = |key: &str, default: i64| dict.get(key).and_then(|o| o.as_integer()).unwrap_or(default);
        Some(Self {
            predictor: get("Predictor", 1),
            columns: get("Columns", 1).max(1) as usize,
            colors: get("Colors", 1).max(1) as usize,
            bits_per_component: get("BitsPerComponent", 8).max(1) as usize,
        })
    }

    /// Bytes of sample data per row, without the PNG tag byte.
    pub fn pixel_bytes_per_row(&self) -> usize {
        (self.columns * self.colors * self.bits_per_component).div_ceil(8)
    }

    /// Bytes per pixel, at least one.
    pub fn bytes_per_pixel(&self) -> usize {
        (self.colors * self.bits_per_component).div_ceil(8).max(1)
    }
}

fn decoder_for(name: &str) -> Result<Box<dyn StreamDecoder>> {
    match name {
        "FlateDecode" | "Fl" => Ok(Box::new(FlateDecoder)),
        "ASCIIHexDecode" | "AHx" => Ok(Box::new(AsciiHexDecoder)),
        other => Err(Error::UnsupportedFilter(other.to_string())),
    }
}

/// Decode stream data through a filter pipeline, then undo the predictor.
pub fn decode_stream_with_params(
    data: &[u8],
    filters: &[String],
    params: Option<&DecodeParams>,
) -> Result<Vec<u8>> {
    let compressed_size = data.len().max(1);
    let mut current = data.to_vec();

    for filter_name in filters {
        let decoder = decoder_for(filter_name)?;
        current = decoder.decode(&current)?;

        if current.len() / compressed_size > MAX_DECOMPRESSION_RATIO
            && current.len() > 1024 * 1024
        {
            return Err(Error::Decode(format!(
                "decompression bomb detected: {} bytes from {} bytes",
                current.len(),
                compressed_size
            )));
        }
        if current.len() > MAX_DECOMPRESSED_SIZE {
            return Err(Error::Decode(format!(
                "decompressed size {} exceeds limit {}",
                current.len(),
                MAX_DECOMPRESSED_SIZE
            )));
        }
        log::trace!("{} produced {} bytes", decoder.name(), current.len());
    }

    if let Some(params) = params {
        if params.predictor > 1 {
            current = decode_predictor(&current, params)?;
        }
    }

    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_no_filters_is_identity() {
        assert_eq!(decode_stream_with_params(b"abc", &[], None).unwrap(), b"abc");
    }

    #[test]
    fn test_unsupported_filter() {
        match decode_stream_with_params(b"x", &["DCTDecode".to_string()], None) {
            Err(Error::UnsupportedFilter(name)) => assert_eq!(name, "DCTDecode"),
            other => panic!("expected UnsupportedFilter, got {:?}", other),
        }
    }

    #[test]
    fn test_flate_then_hex_pipeline() {
        let compressed = flate_encode(b"signed bytes").unwrap();
        let hex = encode_hex_upper(&compressed);
        let out = decode_stream_with_params(
            hex.as_bytes(),
            &["ASCIIHexDecode".to_string(), "FlateDecode".to_string()],
            None,
        )
        .unwrap();
        assert_eq!(out, b"signed bytes");
    }

    #[test]
    fn test_decode_params_from_object() {
        let mut dict = HashMap::new();
        dict.insert("Predictor".to_string(), Object::Integer(12));
        dict.insert("Columns".to_string(), Object::Integer(5));
        let params = DecodeParams::from_object(&Object::Dictionary(dict)).unwrap();
        assert_eq!(params.predictor, 12);
        assert_eq!(params.columns, 5);
        assert_eq!(params.colors, 1);
        assert!(DecodeParams::from_object(&Object::Null).is_none());
    }
}
