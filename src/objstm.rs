//! Object stream parsing (PDF 1.5+).
//!
//! An object stream (`/Type /ObjStm`) packs several objects into one
//! compressed stream:
//!
//! ```text
//! N 0 obj
//! << /Type /ObjStm /N 3 /First 14 /Filter /FlateDecode >>
//! stream
//! 10 0 11 15 12 28      % pairs: object number, offset relative to /First
//! <dict> <array> ...
//! endstream
//! ```

use crate::error::{Error, Result};
use crate::object::Object;
use crate::parser::parse_object;
use std::collections::HashMap;

/// Upper bound on `/N`, to reject absurd headers before allocating.
const MAX_OBJECTS_PER_STREAM: usize = 100_000;

/// Parse an object stream and return every object it contains, keyed by
/// object number.
pub fn parse_object_stream(stream_obj: &Object) -> Result<HashMap<u32, Object>> {
    let dict = match stream_obj {
        Object::Stream { dict, .. } => dict,
        other => {
            return Err(Error::Document(format!(
                "object stream must be a stream, found {}",
                other.type_name()
            )))
        },
    };

    if dict.get("Type").and_then(|o| o.as_name()) != Some("ObjStm") {
        return Err(Error::Document("stream is not /Type /ObjStm".to_string()));
    }

    let count = dict
        .get("N")
        .and_then(|o| o.as_integer())
        .filter(|n| *n >= 0)
        .ok_or_else(|| Error::Document("object stream without valid /N".to_string()))?
        as usize;
    let first = dict
        .get("First")
        .and_then(|o| o.as_integer())
        .filter(|n| *n >= 0)
        .ok_or_else(|| Error::Document("object stream without valid /First".to_string()))?
        as usize;

    if count > MAX_OBJECTS_PER_STREAM {
        return Err(Error::Document(format!("object stream /N {} is too large", count)));
    }

    let data = stream_obj.decode_stream_data()?;
    if first > data.len() {
        return Err(Error::Document(format!(
            "object stream /First {} beyond decoded length {}",
            first,
            data.len()
        )));
    }

    let pairs = parse_object_number_pairs(&data[..first], count)?;
    let mut objects = HashMap::with_capacity(pairs.len());

    for (obj_num, rel_offset) in pairs {
        let start = first + rel_offset;
        if start >= data.len() {
            log::warn!("object {} offset {} outside object stream", obj_num, rel_offset);
            continue;
        }
        match parse_object(&data[start..]) {
            Ok((_, obj)) => {
                objects.insert(obj_num, obj);
            },
            Err(e) => log::warn!("failed to parse object {} in object stream: {:?}", obj_num, e),
        }
    }

    Ok(objects)
}

fn parse_object_number_pairs(header: &[u8], count: usize) -> Result<Vec<(u32, usize)>> {
    let numbers: Vec<u64> = header
        .split(|c| c.is_ascii_whitespace())
        .filter(|f| !f.is_empty())
        .map(|f| {
            std::str::from_utf8(f)
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
                .ok_or_else(|| Error::Document("non-numeric object stream header".to_string()))
        })
        .collect::<Result<_>>()?;

    if numbers.len() < count * 2 {
        return Err(Error::Document(format!(
            "object stream header has {} numbers, expected {}",
            numbers.len(),
            count * 2
        )));
    }

    Ok(numbers
        .chunks_exact(2)
        .take(count)
        .map(|pair| (pair[0] as u32, pair[1] as usize))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::Dict;

    fn objstm(header_and_body: &[u8], n: i64, first: i64) -> Object {
        let mut dict = Dict::new();
        dict.insert("Type".to_string(), Object::name("ObjStm"));
        dict.insert("N".to_string(), Object::Integer(n));
        dict.insert("First".to_string(), Object::Integer(first));
        Object::Stream {
            dict,
            data: bytes::Bytes::copy_from_slice(header_and_body),
        }
    }

    #[test]
    fn test_parse_two_objects() {
        let data = b"10 0 11 15 << /A 1 >>      [1 2]";
        let objects = parse_object_stream(&objstm(data, 2, 11)).unwrap();
        assert_eq!(objects.len(), 2);
        assert!(objects[&10].as_dict().is_some());
        assert_eq!(objects[&11].as_array().map(|a| a.len()), Some(2));
    }

    #[test]
    fn test_short_header_fails() {
        assert!(parse_object_stream(&objstm(b"10 0 ", 2, 5)).is_err());
    }

    #[test]
    fn test_wrong_type_fails() {
        assert!(parse_object_stream(&Object::Integer(3)).is_err());
        let mut obj = objstm(b"", 0, 0);
        obj.as_dict_mut().unwrap().insert("Type".to_string(), Object::name("XRef"));
        assert!(parse_object_stream(&obj).is_err());
    }
}
