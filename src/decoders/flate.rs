//! FlateDecode (zlib/deflate) in both directions.

use crate::decoders::StreamDecoder;
use crate::error::{Error, Result};
use flate2::read::{DeflateDecoder, ZlibDecoder};
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::{Read, Write};

/// FlateDecode filter implementation.
pub struct FlateDecoder;

impl StreamDecoder for FlateDecoder {
    fn decode(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut output = Vec::new();
        match ZlibDecoder::new(input).read_to_end(&mut output) {
            Ok(_) => Ok(output),
            Err(e) => {
                if !output.is_empty() {
                    log::warn!(
                        "FlateDecode partial recovery: {} bytes before corruption: {}",
                        output.len(),
                        e
                    );
                    return Ok(output);
                }

                // Some writers emit raw deflate without the zlib wrapper.
                log::debug!("zlib decode failed ({}), trying raw deflate", e);
                output.clear();
                DeflateDecoder::new(input)
                    .read_to_end(&mut output)
                    .map_err(|e| Error::Decode(format!("FlateDecode failed: {}", e)))?;
                Ok(output)
            },
        }
    }

    fn name(&self) -> &str {
        "FlateDecode"
    }
}

/// Compress data with zlib for a `/FlateDecode` stream.
pub fn flate_encode(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let data = b"BT /F1 12 Tf (Signed) Tj ET".repeat(10);
        let compressed = flate_encode(&data).unwrap();
        assert!(compressed.len() < data.len());
        assert_eq!(FlateDecoder.decode(&compressed).unwrap(), data);
    }

    #[test]
    fn test_raw_deflate_fallback() {
        let mut encoder = flate2::write::DeflateEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"raw deflate payload").unwrap();
        let raw = encoder.finish().unwrap();
        assert_eq!(FlateDecoder.decode(&raw).unwrap(), b"raw deflate payload");
    }

    #[test]
    fn test_garbage_fails() {
        assert!(FlateDecoder.decode(b"\xff\xfe\xfd\xfc not flate").is_err());
    }
}
