//! PDF object parser.
//!
//! Turns the token stream from [`crate::lexer`] into [`Object`] values. Parsing
//! works on in-memory slices; indirect objects are framed by
//! [`parse_indirect_object`].

use crate::decoders::decode_hex_digits;
use crate::error::{Error, Result};
use crate::lexer::{skip_ws, token, Token};
use crate::object::{Dict, Object, ObjectRef};
use nom::IResult;

/// Decode the escape sequences of a literal string body.
pub fn decode_literal_string_escapes(raw: &[u8]) -> Vec<u8> {
    let mut result = Vec::with_capacity(raw.len());
    let mut i = 0;

    while i < raw.len() {
        if raw[i] != b'\\' || i + 1 >= raw.len() {
            result.push(raw[i]);
            i += 1;
            continue;
        }

        let next = raw[i + 1];
        i += 2;
        match next {
            b'n' => result.push(b'\n'),
            b'r' => result.push(b'\r'),
            b't' => result.push(b'\t'),
            b'b' => result.push(0x08),
            b'f' => result.push(0x0C),
            b'(' | b')' | b'\\' => result.push(next),
            b'\n' => {},
            b'\r' => {
                if i < raw.len() && raw[i] == b'\n' {
                    i += 1;
                }
            },
            b'0'..=b'7' => {
                let mut value = (next - b'0') as u32;
                let mut digits = 1;
                while digits < 3 && i < raw.len() && (b'0'..=b'7').contains(&raw[i]) {
                    value = value * 8 + (raw[i] - b'0') as u32;
                    i += 1;
                    digits += 1;
                }
                result.push((value & 0xFF) as u8);
            },
            other => result.push(other),
        }
    }

    result
}

fn fail(input: &[u8]) -> nom::Err<nom::error::Error<&[u8]>> {
    nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Tag))
}

/// Parse a single PDF object.
///
/// An integer followed by another integer and `R` is read as an indirect
/// reference; a dictionary followed by `stream` is read as a stream.
pub fn parse_object(input: &[u8]) -> IResult<&[u8], Object> {
    let (rest, tok) = token(input)?;

    match tok {
        Token::Null => Ok((rest, Object::Null)),
        Token::True => Ok((rest, Object::Boolean(true))),
        Token::False => Ok((rest, Object::Boolean(false))),
        Token::Integer(i) => {
            if let Ok((after_gen, Token::Integer(gen))) = token(rest) {
                if let Ok((after_r, Token::R)) = token(after_gen) {
                    if i >= 0 && (0..=u16::MAX as i64).contains(&gen) {
                        return Ok((after_r, Object::Reference(ObjectRef::new(i as u32, gen as u16))));
                    }
                }
            }
            Ok((rest, Object::Integer(i)))
        },
        Token::Real(r) => Ok((rest, Object::Real(r))),
        Token::LiteralString(raw) => Ok((rest, Object::String(decode_literal_string_escapes(raw)))),
        Token::HexString(raw) => match decode_hex_digits(raw) {
            Ok(bytes) => Ok((rest, Object::String(bytes))),
            Err(_) => Err(nom::Err::Failure(nom::error::Error::new(
                input,
                nom::error::ErrorKind::HexDigit,
            ))),
        },
        Token::Name(name) => Ok((rest, Object::Name(name))),
        Token::ArrayStart => parse_array(rest),
        Token::DictStart => {
            let (after_dict, dict) = parse_dictionary(rest)?;
            if let Ok((stream_input, Token::StreamStart)) = token(after_dict) {
                let (after_stream, data) = parse_stream_data(stream_input, &dict)?;
                return Ok((
                    after_stream,
                    Object::Stream {
                        dict,
                        data: bytes::Bytes::from(data),
                    },
                ));
            }
            Ok((after_dict, Object::Dictionary(dict)))
        },
        _ => Err(fail(input)),
    }
}

fn parse_array(input: &[u8]) -> IResult<&[u8], Object> {
    let mut items = Vec::new();
    let mut remaining = input;

    loop {
        let (rest, tok) = token(remaining)?;
        if tok == Token::ArrayEnd {
            return Ok((rest, Object::Array(items)));
        }
        let (rest, obj) = parse_object(remaining)?;
        items.push(obj);
        remaining = rest;
    }
}

fn parse_dictionary(input: &[u8]) -> IResult<&[u8], Dict> {
    let mut dict = Dict::new();
    let mut remaining = input;

    loop {
        let (rest, tok) = token(remaining)?;
        match tok {
            Token::DictEnd => return Ok((rest, dict)),
            Token::Name(key) => {
                let (rest, value) = parse_object(rest)?;
                dict.insert(key, value);
                remaining = rest;
            },
            _ => return Err(fail(remaining)),
        }
    }
}

fn parse_stream_data<'a>(input: &'a [u8], dict: &Dict) -> IResult<&'a [u8], Vec<u8>> {
    let input = if input.starts_with(b"\r\n") {
        &input[2..]
    } else if input.starts_with(b"\n") || input.starts_with(b"\r") {
        &input[1..]
    } else {
        input
    };

    if let Some(length) = dict.get("Length").and_then(|o| o.as_integer()) {
        if length >= 0 && (length as usize) <= input.len() {
            let length = length as usize;
            let (after, _) = skip_ws(&input[length..])?;
            if let Ok((rest, Token::StreamEnd)) = token(after) {
                return Ok((rest, input[..length].to_vec()));
            }
        }
        log::debug!("stream /Length {} does not line up with endstream, scanning", length);
    }

    // /Length missing, indirect or wrong: scan for the keyword instead.
    let pos = input
        .windows(b"endstream".len())
        .position(|w| w == b"endstream")
        .ok_or_else(|| nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Eof)))?;
    let mut data = &input[..pos];
    if data.ends_with(b"\r\n") {
        data = &data[..data.len() - 2];
    } else if data.ends_with(b"\n") || data.ends_with(b"\r") {
        data = &data[..data.len() - 1];
    }
    Ok((&input[pos + b"endstream".len()..], data.to_vec()))
}

/// Parse an indirect object (`id gen obj ... endobj`) at the start of `input`.
pub fn parse_indirect_object(input: &[u8]) -> Result<(ObjectRef, Object)> {
    let err = |reason: &str| Error::ParseError {
        offset: 0,
        reason: reason.to_string(),
    };

    let (rest, id) = match token(input) {
        Ok((rest, Token::Integer(id))) if id >= 0 => (rest, id as u32),
        _ => return Err(err("expected object number")),
    };
    let (rest, gen) = match token(rest) {
        Ok((rest, Token::Integer(gen))) if (0..=u16::MAX as i64).contains(&gen) => (rest, gen as u16),
        _ => return Err(err("expected generation number")),
    };
    let rest = match token(rest) {
        Ok((rest, Token::ObjStart)) => rest,
        _ => return Err(err("expected 'obj' keyword")),
    };
    let (_, object) = parse_object(rest)
        .map_err(|e| err(&format!("object {} {} body: {:?}", id, gen, e.map(|e| e.code))))?;

    Ok((ObjectRef::new(id, gen), object))
}
