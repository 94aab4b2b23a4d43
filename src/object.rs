//! PDF object types.
//!
//! The object model is shared by the reader ([`crate::document`]) and the
//! incremental writer ([`crate::writer`]): objects parsed out of an existing
//! revision can be cloned, modified and written back in a new section.

use crate::decoders::{decode_stream_with_params, DecodeParams};
use crate::error::{Error, Result};
use std::collections::HashMap;

/// Dictionary payload of [`Object::Dictionary`] and [`Object::Stream`].
pub type Dict = HashMap<String, Object>;

/// PDF object.
#[derive(Debug, Clone, PartialEq)]
pub enum Object {
    /// `null`
    Null,
    /// `true` / `false`
    Boolean(bool),
    /// Integer number
    Integer(i64),
    /// Real number
    Real(f64),
    /// String (literal or hex; bytes after escape decoding)
    String(Vec<u8>),
    /// Name without the leading slash
    Name(String),
    /// Array
    Array(Vec<Object>),
    /// Dictionary
    Dictionary(Dict),
    /// Stream: dictionary plus raw (still encoded) data
    Stream {
        /// Stream dictionary
        dict: Dict,
        /// Raw stream data
        data: bytes::Bytes,
    },
    /// Indirect reference
    Reference(ObjectRef),
}

/// Indirect object reference (`id gen R`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectRef {
    /// Object number
    pub id: u32,
    /// Generation number
    pub gen: u16,
}

impl ObjectRef {
    /// Create a new object reference.
    pub fn new(id: u32, gen: u16) -> Self {
        Self { id, gen }
    }
}

impl std::fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} R", self.id, self.gen)
    }
}

impl From<ObjectRef> for Object {
    fn from(r: ObjectRef) -> Self {
        Object::Reference(r)
    }
}

impl Object {
    /// Build a name object.
    pub fn name(name: &str) -> Self {
        Object::Name(name.to_string())
    }

    /// Build a string object from text.
    ///
    /// Non-ASCII text is written as UTF-16BE with a byte order mark, which is the
    /// encoding PDF readers expect for text strings outside PDFDocEncoding.
    pub fn text(text: &str) -> Self {
        if text.is_ascii() {
            Object::String(text.as_bytes().to_vec())
        } else {
            let mut bytes = vec![0xFE, 0xFF];
            for unit in text.encode_utf16() {
                bytes.extend_from_slice(&unit.to_be_bytes());
            }
            Object::String(bytes)
        }
    }

    /// Build an array of reals from a rectangle.
    pub fn rect(rect: [f64; 4]) -> Self {
        Object::Array(rect.iter().map(|v| Object::Real(*v)).collect())
    }

    /// Name of the variant, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Object::Null => "Null",
            Object::Boolean(_) => "Boolean",
            Object::Integer(_) => "Integer",
            Object::Real(_) => "Real",
            Object::String(_) => "String",
            Object::Name(_) => "Name",
            Object::Array(_) => "Array",
            Object::Dictionary(_) => "Dictionary",
            Object::Stream { .. } => "Stream",
            Object::Reference(_) => "Reference",
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Object::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Integer or real, widened to `f64`.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Object::Integer(i) => Some(*i as f64),
            Object::Real(r) => Some(*r),
            _ => None,
        }
    }

    pub fn as_name(&self) -> Option<&str> {
        match self {
            Object::Name(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&Dict> {
        match self {
            Object::Dictionary(d) => Some(d),
            Object::Stream { dict, .. } => Some(dict),
            _ => None,
        }
    }

    pub fn as_dict_mut(&mut self) -> Option<&mut Dict> {
        match self {
            Object::Dictionary(d) => Some(d),
            Object::Stream { dict, .. } => Some(dict),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Vec<Object>> {
        match self {
            Object::Array(arr) => Some(arr),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<ObjectRef> {
        match self {
            Object::Reference(r) => Some(*r),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Object::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&[u8]> {
        match self {
            Object::String(s) => Some(s),
            _ => None,
        }
    }

    /// Decode a string object as text (UTF-16BE with BOM, or PDFDocEncoding
    /// approximated as Latin-1).
    pub fn as_text(&self) -> Option<String> {
        let bytes = self.as_string()?;
        if bytes.starts_with(&[0xFE, 0xFF]) {
            let units: Vec<u16> = bytes[2..]
                .chunks_exact(2)
                .map(|c| u16::from_be_bytes([c[0], c[1]]))
                .collect();
            Some(String::from_utf16_lossy(&units))
        } else {
            Some(bytes.iter().map(|&b| b as char).collect())
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Object::Null)
    }

    /// Decode the data of a stream object by applying its `/Filter` chain and
    /// `/DecodeParms` predictor.
    pub fn decode_stream_data(&self) -> Result<Vec<u8>> {
        let (dict, data) = match self {
            Object::Stream { dict, data } => (dict, data),
            other => {
                return Err(Error::Document(format!(
                    "expected a stream, found {}",
                    other.type_name()
                )))
            },
        };

        let filters: Vec<String> = match dict.get("Filter") {
            None => Vec::new(),
            Some(Object::Name(name)) => vec![name.clone()],
            Some(Object::Array(arr)) => arr
                .iter()
                .filter_map(|f| f.as_name().map(str::to_string))
                .collect(),
            Some(other) => {
                return Err(Error::Decode(format!("invalid /Filter of type {}", other.type_name())))
            },
        };

        let params = dict.get("DecodeParms").and_then(DecodeParams::from_object);
        decode_stream_with_params(data, &filters, params.as_ref())
    }
}
