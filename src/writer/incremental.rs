//! Incremental updates.
//!
//! An incremental update appends new and replaced objects after the original
//! bytes, followed by a cross-reference section whose trailer points back to
//! the previous one through `/Prev`. Nothing before the append point changes,
//! so earlier signatures keep covering exactly the bytes they signed.

use crate::decoders::flate_encode;
use crate::document::PdfDocument;
use crate::error::{Error, Result};
use crate::object::{Dict, Object, ObjectRef};
use crate::writer::ObjectSerializer;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::ops::Range;

/// Result of [`IncrementalUpdate::build`].
#[derive(Debug, Clone)]
pub struct UpdatedDocument {
    /// Original bytes followed by the appended section
    pub bytes: Vec<u8>,
    /// Offset of every written object, by object number
    pub offsets: HashMap<u32, usize>,
    /// Exact extent of every written object, from its header through `endobj`
    pub spans: HashMap<u32, Range<usize>>,
    /// Offset of the appended cross-reference section
    pub startxref: usize,
}

impl UpdatedDocument {
    /// Bytes of one written object, from its header to `endobj`.
    pub fn object_span(&self, id: u32) -> Option<Range<usize>> {
        self.spans.get(&id).cloned()
    }
}

/// Collects objects for one incremental section.
#[derive(Debug)]
pub struct IncrementalUpdate<'a> {
    base: &'a PdfDocument,
    next_id: u32,
    objects: BTreeMap<u32, (u16, Object)>,
    serializer: ObjectSerializer,
}

impl<'a> IncrementalUpdate<'a> {
    pub fn new(base: &'a PdfDocument) -> Self {
        Self {
            base,
            next_id: base.next_object_number(),
            objects: BTreeMap::new(),
            serializer: ObjectSerializer::new(),
        }
    }

    /// Reserve an object number without providing the object yet.
    pub fn allocate(&mut self) -> ObjectRef {
        let id = self.next_id;
        self.next_id += 1;
        ObjectRef::new(id, 0)
    }

    /// Add a new object and return its reference.
    pub fn add_object(&mut self, obj: Object) -> ObjectRef {
        let r = self.allocate();
        self.objects.insert(r.id, (r.gen, obj));
        r
    }

    /// Provide (or replace) the object for a reference, either one returned by
    /// [`allocate`](Self::allocate) or an object of the base document.
    pub fn set_object(&mut self, r: ObjectRef, obj: Object) {
        self.objects.insert(r.id, (r.gen, obj));
    }

    /// Object staged for `r`, falling back to the base document.
    pub fn get_object(&self, r: ObjectRef) -> Result<Object> {
        match self.objects.get(&r.id) {
            Some((_, obj)) => Ok(obj.clone()),
            None => self.base.load_object(r),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Serialize the section and append it to the base bytes.
    pub fn build(self) -> Result<UpdatedDocument> {
        if self.objects.is_empty() {
            return Err(Error::Document("incremental update without objects".to_string()));
        }

        let base_data = self.base.data();
        let mut bytes = Vec::with_capacity(base_data.len() + 4096);
        bytes.extend_from_slice(base_data);
        if !bytes.ends_with(b"\n") && !bytes.ends_with(b"\r") {
            bytes.push(b'\n');
        }

        let mut offsets = HashMap::new();
        let mut spans = HashMap::new();
        let mut entries: Vec<(u32, u16, usize)> = Vec::new();
        let section_start = bytes.len();

        for (&id, (gen, obj)) in &self.objects {
            offsets.insert(id, bytes.len());
            entries.push((id, *gen, bytes.len()));
            let start = bytes.len();
            bytes.extend_from_slice(&self.serializer.serialize_indirect(id, *gen, obj));
            // Trailing newline after `endobj` is not part of the object.
            spans.insert(id, start..bytes.len() - 1);
        }

        let mut size = self.next_id.max(self.base.next_object_number());
        let id_array = self.file_id(&bytes[section_start..]);
        let startxref = if self.base.uses_xref_stream() {
            let xref_id = size;
            size += 1;
            let startxref = bytes.len();
            entries.push((xref_id, 0, startxref));
            offsets.insert(xref_id, startxref);
            let stream = self.xref_stream(&entries, size, id_array)?;
            bytes.extend_from_slice(&self.serializer.serialize_indirect(xref_id, 0, &stream));
            startxref
        } else {
            let startxref = bytes.len();
            self.write_xref_table(&mut bytes, &entries, size, id_array);
            startxref
        };

        bytes.extend_from_slice(format!("startxref\n{}\n%%EOF\n", startxref).as_bytes());
        log::debug!(
            "incremental section: {} objects, {} bytes appended",
            entries.len(),
            bytes.len() - base_data.len()
        );

        Ok(UpdatedDocument {
            bytes,
            offsets,
            spans,
            startxref,
        })
    }

    fn trailer_entries(&self, size: u32, id_array: Object) -> Dict {
        let mut trailer = Dict::new();
        trailer.insert("Size".to_string(), Object::Integer(size as i64));
        trailer.insert("Prev".to_string(), Object::Integer(self.base.startxref() as i64));
        for key in ["Root", "Info"] {
            if let Some(value) = self.base.trailer().get(key) {
                trailer.insert(key.to_string(), value.clone());
            }
        }
        trailer.insert("ID".to_string(), id_array);
        trailer
    }

    /// Keep the permanent identifier, refresh the changing one.
    fn file_id(&self, section: &[u8]) -> Object {
        let changing = Sha256::digest(section)[..16].to_vec();
        let permanent = self
            .base
            .trailer()
            .get("ID")
            .and_then(|o| o.as_array())
            .and_then(|a| a.first())
            .and_then(|o| o.as_string())
            .map(<[u8]>::to_vec)
            .unwrap_or_else(|| {
                let digest = Sha256::digest(self.base.data());
                digest[..16].to_vec()
            });
        Object::Array(vec![Object::String(permanent), Object::String(changing)])
    }

    fn write_xref_table(&self, out: &mut Vec<u8>, entries: &[(u32, u16, usize)], size: u32, id_array: Object) {
        out.extend_from_slice(b"xref\n");
        for group in contiguous_groups(entries) {
            out.extend_from_slice(format!("{} {}\n", group[0].0, group.len()).as_bytes());
            for (_, gen, offset) in group {
                out.extend_from_slice(format!("{:010} {:05} n \n", offset, gen).as_bytes());
            }
        }
        let trailer = Object::Dictionary(self.trailer_entries(size, id_array));
        out.extend_from_slice(b"trailer\n");
        out.extend_from_slice(&self.serializer.serialize(&trailer));
        out.push(b'\n');
    }

    fn xref_stream(&self, entries: &[(u32, u16, usize)], size: u32, id_array: Object) -> Result<Object> {
        let max_offset = entries.iter().map(|e| e.2).max().unwrap_or(0);
        let offset_width = (1..=8usize)
            .find(|w| *w == 8 || (max_offset as u64) < 1u64 << (8 * *w as u32))
            .unwrap_or(8);

        let mut rows = Vec::with_capacity(entries.len() * (offset_width + 3));
        let mut index = Vec::new();
        for group in contiguous_groups(entries) {
            index.push(Object::Integer(group[0].0 as i64));
            index.push(Object::Integer(group.len() as i64));
            for (_, gen, offset) in group {
                rows.push(1u8);
                rows.extend_from_slice(&(*offset as u64).to_be_bytes()[8 - offset_width..]);
                rows.extend_from_slice(&gen.to_be_bytes());
            }
        }

        let mut dict = self.trailer_entries(size, id_array);
        dict.insert("Type".to_string(), Object::name("XRef"));
        dict.insert(
            "W".to_string(),
            Object::Array(vec![
                Object::Integer(1),
                Object::Integer(offset_width as i64),
                Object::Integer(2),
            ]),
        );
        dict.insert("Index".to_string(), Object::Array(index));
        dict.insert("Filter".to_string(), Object::name("FlateDecode"));

        Ok(Object::Stream {
            dict,
            data: bytes::Bytes::from(flate_encode(&rows)?),
        })
    }
}

/// Split sorted entries into runs of consecutive object numbers.
fn contiguous_groups(entries: &[(u32, u16, usize)]) -> Vec<&[(u32, u16, usize)]> {
    let mut groups = Vec::new();
    let mut start = 0;
    for i in 1..=entries.len() {
        if i == entries.len() || entries[i].0 != entries[i - 1].0 + 1 {
            groups.push(&entries[start..i]);
            start = i;
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_pdf() -> Vec<u8> {
        let mut out = b"%PDF-1.4\n".to_vec();
        let cat = out.len();
        out.extend_from_slice(b"1 0 obj\n<< /Type /Catalog /Pages 2 0 R >>\nendobj\n");
        let pages = out.len();
        out.extend_from_slice(b"2 0 obj\n<< /Type /Pages /Kids [] /Count 0 >>\nendobj\n");
        let xref = out.len();
        out.extend_from_slice(
            format!(
                "xref\n0 3\n0000000000 65535 f \n{:010} 00000 n \n{:010} 00000 n \ntrailer\n<< /Size 3 /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
                cat, pages, xref
            )
            .as_bytes(),
        );
        out
    }

    #[test]
    fn test_contiguous_groups() {
        let entries = [(1, 0, 0), (2, 0, 0), (5, 0, 0), (6, 0, 0), (9, 0, 0)];
        let groups = contiguous_groups(&entries);
        assert_eq!(groups.iter().map(|g| g.len()).collect::<Vec<_>>(), vec![2, 2, 1]);
    }

    #[test]
    fn test_append_preserves_prefix_and_reloads() {
        let original = base_pdf();
        let doc = PdfDocument::from_bytes(original.clone()).unwrap();

        let mut update = IncrementalUpdate::new(&doc);
        let info = update.add_object(Object::Dictionary(Dict::from([(
            "Title".to_string(),
            Object::text("Updated"),
        )])));
        assert_eq!(info, ObjectRef::new(3, 0));
        let mut catalog = doc.catalog().unwrap();
        catalog.insert("Lang".to_string(), Object::text("en"));
        update.set_object(doc.root_ref().unwrap(), Object::Dictionary(catalog));

        let updated = update.build().unwrap();
        assert!(updated.bytes.starts_with(&original));
        let text = String::from_utf8_lossy(&updated.bytes[original.len()..]).into_owned();
        assert!(text.contains("xref\n1 1\n"));
        assert!(text.contains("3 1\n"));

        let reloaded = PdfDocument::from_bytes(updated.bytes.clone()).unwrap();
        assert_eq!(
            reloaded.catalog().unwrap().get("Lang").and_then(|o| o.as_text()),
            Some("en".to_string())
        );
        assert!(reloaded.load_object(info).is_ok());
        assert_eq!(reloaded.next_object_number(), 4);
        assert!(updated.object_span(3).is_some());
    }

    #[test]
    fn test_object_span_is_exact_when_strings_mention_endobj() {
        let doc = PdfDocument::from_bytes(base_pdf()).unwrap();
        let mut update = IncrementalUpdate::new(&doc);
        let first = update.add_object(Object::text("endobj endobj"));
        let second = update.add_object(Object::Integer(7));
        let updated = update.build().unwrap();

        let span = updated.object_span(first.id).unwrap();
        let text = &updated.bytes[span.clone()];
        assert!(text.starts_with(format!("{} 0 obj", first.id).as_bytes()));
        assert!(text.ends_with(b")\nendobj"));
        assert_eq!(span.start, updated.offsets[&first.id]);
        assert!(span.end < updated.offsets[&second.id]);
    }

    #[test]
    fn test_empty_update_is_rejected() {
        let doc = PdfDocument::from_bytes(base_pdf()).unwrap();
        assert!(IncrementalUpdate::new(&doc).build().is_err());
    }
}
