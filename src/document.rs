//! In-memory PDF document.
//!
//! [`PdfDocument`] keeps the original bytes, the merged cross-reference table
//! and a cache of resolved objects. It is the read side of signing: the signer
//! uses it to find the catalog, pages and form fields before appending an
//! incremental update, and the verifier uses it to discover signature
//! dictionaries.

use crate::error::{Error, Result};
use crate::object::{Dict, Object, ObjectRef};
use crate::objstm::parse_object_stream;
use crate::parser::parse_indirect_object;
use crate::xref::{find_xref_offset, parse_xref, CrossRefTable, XRefEntryType};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// Maximum depth for page tree and field tree walks.
const MAX_TREE_DEPTH: usize = 64;

/// Form field discovered in the AcroForm tree.
#[derive(Debug, Clone)]
pub struct FieldInfo {
    /// Reference of the terminal field dictionary
    pub reference: ObjectRef,
    /// Fully qualified name (`parent.child`)
    pub name: String,
    /// Field type (`/FT`), inherited from ancestors when absent
    pub field_type: Option<String>,
    /// Resolved `/V` value, if any
    pub value: Option<Object>,
}

impl FieldInfo {
    /// Signature dictionary stored in `/V`, when this is a signed signature field.
    pub fn signature_dict(&self) -> Option<&Dict> {
        if self.field_type.as_deref() != Some("Sig") {
            return None;
        }
        self.value.as_ref().and_then(|v| v.as_dict())
    }
}

/// PDF document loaded from memory.
pub struct PdfDocument {
    data: Vec<u8>,
    version: (u8, u8),
    xref: CrossRefTable,
    trailer: Dict,
    startxref: u64,
    object_cache: RefCell<HashMap<ObjectRef, Object>>,
}

impl std::fmt::Debug for PdfDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PdfDocument")
            .field("version", &self.version)
            .field("len", &self.data.len())
            .field("xref_entries", &self.xref.len())
            .field("startxref", &self.startxref)
            .finish_non_exhaustive()
    }
}

impl PdfDocument {
    /// Read a document from disk.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_bytes(std::fs::read(path)?)
    }

    /// Parse a document held in memory.
    pub fn from_bytes(data: impl Into<Vec<u8>>) -> Result<Self> {
        let data = data.into();
        let version = parse_header(&data)?;
        let startxref = find_xref_offset(&data)?;
        let xref = parse_xref(&data, startxref)?;

        let trailer = xref
            .trailer()
            .cloned()
            .ok_or_else(|| Error::Document("missing trailer dictionary".to_string()))?;

        if trailer.contains_key("Encrypt") {
            return Err(Error::Document("encrypted documents are not supported".to_string()));
        }

        let doc = Self {
            data,
            version,
            xref,
            trailer,
            startxref,
            object_cache: RefCell::new(HashMap::new()),
        };

        // Fail early on a missing or broken catalog.
        let catalog = doc.catalog()?;
        if catalog.get("Type").and_then(|o| o.as_name()) != Some("Catalog") {
            log::warn!("document catalog has no /Type /Catalog");
        }

        log::debug!(
            "loaded PDF {}.{} with {} xref entries (xref stream: {})",
            version.0,
            version.1,
            doc.xref.len(),
            doc.xref.uses_xref_stream
        );
        Ok(doc)
    }

    /// Original document bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    pub fn version(&self) -> (u8, u8) {
        self.version
    }

    /// Trailer of the newest revision.
    pub fn trailer(&self) -> &Dict {
        &self.trailer
    }

    /// Offset of the newest cross-reference section.
    pub fn startxref(&self) -> u64 {
        self.startxref
    }

    /// True when the newest revision was written with an xref stream.
    pub fn uses_xref_stream(&self) -> bool {
        self.xref.uses_xref_stream
    }

    /// First object number not used by any revision.
    pub fn next_object_number(&self) -> u32 {
        let size = self
            .trailer
            .get("Size")
            .and_then(|o| o.as_integer())
            .unwrap_or(0)
            .max(0) as u32;
        size.max(self.xref.max_object_number() + 1)
    }

    pub fn root_ref(&self) -> Result<ObjectRef> {
        self.trailer
            .get("Root")
            .and_then(|o| o.as_reference())
            .ok_or_else(|| Error::Document("trailer has no /Root reference".to_string()))
    }

    /// The document catalog.
    pub fn catalog(&self) -> Result<Dict> {
        let root = self.root_ref()?;
        match self.load_object(root)? {
            Object::Dictionary(dict) => Ok(dict),
            other => Err(Error::Document(format!("catalog is a {}", other.type_name()))),
        }
    }

    /// Load an indirect object.
    pub fn load_object(&self, obj_ref: ObjectRef) -> Result<Object> {
        if let Some(cached) = self.object_cache.borrow().get(&obj_ref) {
            return Ok(cached.clone());
        }

        let entry = self
            .xref
            .get(obj_ref.id)
            .cloned()
            .ok_or(Error::ObjectNotFound(obj_ref.id, obj_ref.gen))?;

        let object = match entry.entry_type {
            XRefEntryType::Uncompressed => self.load_uncompressed_object(obj_ref, entry.offset)?,
            XRefEntryType::Compressed => self.load_compressed_object(obj_ref, entry.offset as u32)?,
            XRefEntryType::Free => return Err(Error::ObjectNotFound(obj_ref.id, obj_ref.gen)),
        };

        self.object_cache.borrow_mut().insert(obj_ref, object.clone());
        Ok(object)
    }

    fn load_uncompressed_object(&self, obj_ref: ObjectRef, offset: u64) -> Result<Object> {
        let start = offset as usize;
        if start < self.data.len() {
            match parse_indirect_object(&self.data[start..]) {
                Ok((found, object)) if found.id == obj_ref.id => return Ok(object),
                Ok((found, _)) => log::warn!(
                    "xref offset {} for object {} holds object {}",
                    offset,
                    obj_ref,
                    found
                ),
                Err(e) => log::warn!("object {} at offset {}: {}", obj_ref, offset, e),
            }
        }

        let pos = self
            .scan_for_object(obj_ref)
            .ok_or(Error::ObjectNotFound(obj_ref.id, obj_ref.gen))?;
        log::debug!("recovered object {} by scanning at offset {}", obj_ref, pos);
        let (_, object) = parse_indirect_object(&self.data[pos..]).map_err(|e| match e {
            Error::ParseError { reason, .. } => Error::ParseError { offset: pos, reason },
            other => other,
        })?;
        Ok(object)
    }

    /// Find the last `id gen obj` header that starts a line.
    fn scan_for_object(&self, obj_ref: ObjectRef) -> Option<usize> {
        let pattern = format!("{} {} obj", obj_ref.id, obj_ref.gen);
        let pattern = pattern.as_bytes();
        self.data
            .windows(pattern.len())
            .enumerate()
            .filter(|(pos, w)| {
                *w == pattern && (*pos == 0 || matches!(self.data[pos - 1], b'\n' | b'\r' | b' '))
            })
            .map(|(pos, _)| pos)
            .last()
    }

    fn load_compressed_object(&self, obj_ref: ObjectRef, stream_obj_num: u32) -> Result<Object> {
        let stream_entry = self
            .xref
            .get(stream_obj_num)
            .cloned()
            .ok_or(Error::ObjectNotFound(stream_obj_num, 0))?;
        if stream_entry.entry_type != XRefEntryType::Uncompressed {
            return Err(Error::Document(format!(
                "object stream {} is not an uncompressed object",
                stream_obj_num
            )));
        }

        let stream = self.load_uncompressed_object(ObjectRef::new(stream_obj_num, 0), stream_entry.offset)?;
        let objects = parse_object_stream(&stream)?;
        let object = objects
            .get(&obj_ref.id)
            .cloned()
            .ok_or(Error::ObjectNotFound(obj_ref.id, obj_ref.gen))?;

        let mut cache = self.object_cache.borrow_mut();
        for (num, obj) in objects {
            // Only cache objects the xref still maps to this stream.
            let current = self.xref.get(num).is_some_and(|e| {
                e.entry_type == XRefEntryType::Compressed && e.offset == stream_obj_num as u64
            });
            if current {
                cache.entry(ObjectRef::new(num, 0)).or_insert(obj);
            }
        }
        Ok(object)
    }

    /// Follow a reference (one level) or return a direct object unchanged.
    pub fn resolve(&self, obj: &Object) -> Result<Object> {
        match obj {
            Object::Reference(r) => self.load_object(*r),
            other => Ok(other.clone()),
        }
    }

    /// Resolve an object that must be a dictionary.
    pub fn resolve_dict(&self, obj: &Object) -> Result<Dict> {
        match self.resolve(obj)? {
            Object::Dictionary(d) => Ok(d),
            Object::Stream { dict, .. } => Ok(dict),
            other => Err(Error::Document(format!("expected a dictionary, found {}", other.type_name()))),
        }
    }

    /// Ordered page references from the page tree.
    pub fn pages(&self) -> Result<Vec<ObjectRef>> {
        let catalog = self.catalog()?;
        let root = catalog
            .get("Pages")
            .and_then(|o| o.as_reference())
            .ok_or_else(|| Error::Document("catalog has no /Pages reference".to_string()))?;

        let mut pages = Vec::new();
        let mut visited = HashSet::new();
        self.collect_pages(root, 0, &mut visited, &mut pages)?;
        Ok(pages)
    }

    fn collect_pages(
        &self,
        node_ref: ObjectRef,
        depth: usize,
        visited: &mut HashSet<ObjectRef>,
        pages: &mut Vec<ObjectRef>,
    ) -> Result<()> {
        if depth > MAX_TREE_DEPTH {
            return Err(Error::Document("page tree too deep".to_string()));
        }
        if !visited.insert(node_ref) {
            return Err(Error::CircularReference(node_ref));
        }

        let node = self.resolve_dict(&Object::Reference(node_ref))?;
        match node.get("Type").and_then(|o| o.as_name()) {
            Some("Page") => pages.push(node_ref),
            _ => {
                let kids = match node.get("Kids") {
                    Some(kids) => self.resolve(kids)?,
                    None if node.contains_key("MediaBox") || node.contains_key("Contents") => {
                        pages.push(node_ref);
                        return Ok(());
                    },
                    None => return Ok(()),
                };
                for kid in kids.as_array().into_iter().flatten() {
                    if let Some(kid_ref) = kid.as_reference() {
                        self.collect_pages(kid_ref, depth + 1, visited, pages)?;
                    }
                }
            },
        }
        Ok(())
    }

    /// The AcroForm dictionary and, when it is an indirect object, its reference.
    pub fn acroform(&self) -> Result<Option<(Option<ObjectRef>, Dict)>> {
        let catalog = self.catalog()?;
        match catalog.get("AcroForm") {
            None => Ok(None),
            Some(Object::Reference(r)) => Ok(Some((Some(*r), self.resolve_dict(&Object::Reference(*r))?))),
            Some(Object::Dictionary(d)) => Ok(Some((None, d.clone()))),
            Some(other) => Err(Error::Document(format!("/AcroForm is a {}", other.type_name()))),
        }
    }

    /// All terminal form fields, depth first.
    pub fn fields(&self) -> Result<Vec<FieldInfo>> {
        let Some((_, acroform)) = self.acroform()? else {
            return Ok(Vec::new());
        };
        let roots = match acroform.get("Fields") {
            Some(fields) => self.resolve(fields)?,
            None => return Ok(Vec::new()),
        };

        let mut fields = Vec::new();
        let mut visited = HashSet::new();
        for root in roots.as_array().into_iter().flatten() {
            if let Some(r) = root.as_reference() {
                self.collect_fields(r, "", None, 0, &mut visited, &mut fields)?;
            }
        }
        Ok(fields)
    }

    fn collect_fields(
        &self,
        field_ref: ObjectRef,
        parent_name: &str,
        inherited_type: Option<&str>,
        depth: usize,
        visited: &mut HashSet<ObjectRef>,
        out: &mut Vec<FieldInfo>,
    ) -> Result<()> {
        if depth > MAX_TREE_DEPTH || !visited.insert(field_ref) {
            log::warn!("skipping field {}: cycle or excessive depth", field_ref);
            return Ok(());
        }

        let dict = self.resolve_dict(&Object::Reference(field_ref))?;
        let partial = dict.get("T").and_then(|o| o.as_text());
        let name = match (&partial, parent_name.is_empty()) {
            (Some(t), true) => t.clone(),
            (Some(t), false) => format!("{}.{}", parent_name, t),
            (None, _) => parent_name.to_string(),
        };
        let field_type = dict
            .get("FT")
            .and_then(|o| o.as_name())
            .map(str::to_string)
            .or_else(|| inherited_type.map(str::to_string));

        // Kids without /T are widgets of this field, not child fields.
        let child_fields: Vec<ObjectRef> = match dict.get("Kids") {
            Some(kids) => self
                .resolve(kids)?
                .as_array()
                .into_iter()
                .flatten()
                .filter_map(|k| k.as_reference())
                .filter(|k| {
                    self.resolve_dict(&Object::Reference(*k))
                        .map(|d| d.contains_key("T"))
                        .unwrap_or(false)
                })
                .collect(),
            None => Vec::new(),
        };

        if child_fields.is_empty() {
            let value = match dict.get("V") {
                Some(v) => Some(self.resolve(v)?),
                None => None,
            };
            out.push(FieldInfo {
                reference: field_ref,
                name,
                field_type,
                value,
            });
        } else {
            for child in child_fields {
                self.collect_fields(child, &name, field_type.as_deref(), depth + 1, visited, out)?;
            }
        }
        Ok(())
    }

    /// Signature fields that carry a signature dictionary.
    pub fn signature_fields(&self) -> Result<Vec<FieldInfo>> {
        Ok(self
            .fields()?
            .into_iter()
            .filter(|f| f.signature_dict().is_some())
            .collect())
    }

    /// Fully qualified names of every form field.
    pub fn field_names(&self) -> Result<Vec<String>> {
        Ok(self.fields()?.into_iter().map(|f| f.name).collect())
    }
}

/// Parse the `%PDF-M.m` header. Up to 1 KiB of leading junk is tolerated.
pub fn parse_header(data: &[u8]) -> Result<(u8, u8)> {
    let window = &data[..data.len().min(1024)];
    let pos = window
        .windows(5)
        .position(|w| w == b"%PDF-")
        .ok_or_else(|| {
            Error::InvalidHeader(String::from_utf8_lossy(&data[..data.len().min(8)]).into_owned())
        })?;

    let version = &data[pos + 5..data.len().min(pos + 8)];
    match version {
        [major, b'.', minor] if major.is_ascii_digit() && minor.is_ascii_digit() => {
            Ok((major - b'0', minor - b'0'))
        },
        _ => Err(Error::InvalidHeader(String::from_utf8_lossy(version).into_owned())),
    }
}
