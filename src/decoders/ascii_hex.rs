//! ASCIIHexDecode and the hex helpers shared with the parser and the
//! signature `/Contents` handling.

use crate::decoders::StreamDecoder;
use crate::error::{Error, Result};

/// ASCIIHexDecode filter implementation.
pub struct AsciiHexDecoder;

impl StreamDecoder for AsciiHexDecoder {
    fn decode(&self, input: &[u8]) -> Result<Vec<u8>> {
        let end = input.iter().position(|&c| c == b'>').unwrap_or(input.len());
        decode_hex_digits(&input[..end])
    }

    fn name(&self) -> &str {
        "ASCIIHexDecode"
    }
}

fn hex_value(digit: u8) -> Option<u8> {
    match digit {
        b'0'..=b'9' => Some(digit - b'0'),
        b'A'..=b'F' => Some(digit - b'A' + 10),
        b'a'..=b'f' => Some(digit - b'a' + 10),
        _ => None,
    }
}

/// Decode hex digits, ignoring whitespace. An odd trailing digit is padded
/// with `0`.
pub fn decode_hex_digits(input: &[u8]) -> Result<Vec<u8>> {
    let mut output = Vec::with_capacity(input.len() / 2 + 1);
    let mut digits = input.iter().copied().filter(|c| !c.is_ascii_whitespace());

    while let Some(high) = digits.next() {
        let low = digits.next().unwrap_or(b'0');
        let (h, l) = match (hex_value(high), hex_value(low)) {
            (Some(h), Some(l)) => (h, l),
            _ => {
                return Err(Error::Decode(format!(
                    "invalid hex digit pair '{}{}'",
                    high as char, low as char
                )))
            },
        };
        output.push((h << 4) | l);
    }

    Ok(output)
}

/// Encode bytes as uppercase hex.
pub fn encode_hex_upper(data: &[u8]) -> String {
    const DIGITS: &[u8; 16] = b"0123456789ABCDEF";
    let mut out = String::with_capacity(data.len() * 2);
    for &b in data {
        out.push(DIGITS[(b >> 4) as usize] as char);
        out.push(DIGITS[(b & 0x0F) as usize] as char);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_basic() {
        assert_eq!(AsciiHexDecoder.decode(b"48656C6C6F>").unwrap(), b"Hello");
    }

    #[test]
    fn test_whitespace_and_odd_length() {
        assert_eq!(decode_hex_digits(b"48 65\n6C 6").unwrap(), vec![0x48, 0x65, 0x6C, 0x60]);
    }

    #[test]
    fn test_invalid_digit() {
        assert!(decode_hex_digits(b"4G").is_err());
    }

    #[test]
    fn test_encode_upper() {
        assert_eq!(encode_hex_upper(&[0x00, 0xAB, 0x7F]), "00AB7F");
    }
}
