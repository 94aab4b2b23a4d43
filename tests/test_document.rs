//! Reading documents and appending incremental sections.

mod common;

use bytes::Bytes;
use common::{fixture, fixture_path};
use pdf_pades::object::{Object, ObjectRef};
use pdf_pades::objstm::parse_object_stream;
use pdf_pades::parser::parse_object;
use pdf_pades::writer::IncrementalUpdate;
use pdf_pades::{ErrorKind, PdfDocument};
use proptest::prelude::*;
use std::collections::HashMap;

fn object_stream(n: i64, first: i64, data: &[u8]) -> Object {
    let mut dict = HashMap::new();
    dict.insert("Type".to_string(), Object::name("ObjStm"));
    dict.insert("N".to_string(), Object::Integer(n));
    dict.insert("First".to_string(), Object::Integer(first));
    Object::Stream {
        dict,
        data: Bytes::from(data.to_vec()),
    }
}

#[test]
fn test_open_fixtures() {
    let simple = PdfDocument::open(fixture_path("simple.pdf")).unwrap();
    assert_eq!(simple.version(), (1, 7));
    assert_eq!(simple.pages().unwrap().len(), 1);
    assert!(!simple.uses_xref_stream());

    let form = PdfDocument::open(fixture_path("form.pdf")).unwrap();
    assert_eq!(form.pages().unwrap().len(), 2);

    let compressed = PdfDocument::open(fixture_path("xref_stream.pdf")).unwrap();
    assert!(compressed.uses_xref_stream());
    assert_eq!(compressed.pages().unwrap().len(), 1);
    assert_eq!(
        compressed.catalog().unwrap().get("Type").and_then(|o| o.as_name()),
        Some("Catalog")
    );
}

#[test]
fn test_form_fields() {
    let form = PdfDocument::open(fixture_path("form.pdf")).unwrap();
    assert_eq!(form.field_names().unwrap(), vec!["Signature1".to_string()]);

    let fields = form.fields().unwrap();
    assert_eq!(fields[0].field_type.as_deref(), Some("Tx"));
    assert!(fields[0].signature_dict().is_none());
    // A text field that happens to be named like a signature is not one.
    assert!(form.signature_fields().unwrap().is_empty());

    let simple = PdfDocument::open(fixture_path("simple.pdf")).unwrap();
    assert!(simple.acroform().unwrap().is_none());
    assert!(simple.fields().unwrap().is_empty());
}

#[test]
fn test_missing_object_is_reported() {
    let doc = PdfDocument::open(fixture_path("simple.pdf")).unwrap();
    let err = doc.load_object(ObjectRef::new(99, 0)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Document);
}

#[test]
fn test_rejects_non_pdf() {
    let err = PdfDocument::from_bytes(fixture("not_a_pdf.txt")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Document);
}

#[test]
fn test_incremental_update_preserves_original() {
    let original = fixture("simple.pdf");
    let doc = PdfDocument::from_bytes(original.clone()).unwrap();

    let mut update = IncrementalUpdate::new(&doc);
    let added = update.add_object(Object::text("appended"));
    let mut catalog = doc.catalog().unwrap();
    catalog.insert("Extra".to_string(), Object::Reference(added));
    update.set_object(doc.root_ref().unwrap(), Object::Dictionary(catalog));
    let updated = update.build().unwrap();

    assert!(updated.bytes.starts_with(&original));
    assert!(updated.startxref > original.len());
    assert!(updated.object_span(added.id).is_some());

    let reread = PdfDocument::from_bytes(updated.bytes).unwrap();
    let catalog = reread.catalog().unwrap();
    let extra = reread.resolve(catalog.get("Extra").unwrap()).unwrap();
    assert_eq!(extra.as_text().as_deref(), Some("appended"));
    // Untouched objects still resolve from the first revision.
    assert_eq!(reread.pages().unwrap().len(), 1);
}

#[test]
fn test_incremental_update_on_xref_stream_document() {
    let doc = PdfDocument::open(fixture_path("xref_stream.pdf")).unwrap();
    let mut update = IncrementalUpdate::new(&doc);
    let added = update.add_object(Object::Integer(42));
    let updated = update.build().unwrap();

    let reread = PdfDocument::from_bytes(updated.bytes).unwrap();
    assert_eq!(reread.load_object(added).unwrap(), Object::Integer(42));
    assert_eq!(reread.pages().unwrap().len(), 1);
}

#[test]
fn test_parse_object_stream() {
    let pairs = b"10 0 11 3 ";
    let objects = b"42 /Test";
    let mut data = pairs.to_vec();
    data.extend_from_slice(objects);

    let parsed = parse_object_stream(&object_stream(2, pairs.len() as i64, &data)).unwrap();
    assert_eq!(parsed.len(), 2);
    assert_eq!(parsed[&10].as_integer(), Some(42));
    assert_eq!(parsed[&11].as_name(), Some("Test"));
}

#[test]
fn test_parse_object_stream_rejects_bad_headers() {
    assert!(parse_object_stream(&Object::Integer(1)).is_err());
    // /N larger than the pairs present.
    assert!(parse_object_stream(&object_stream(5, 4, b"10 0 42")).is_err());
    // /First past the end of the data.
    assert!(parse_object_stream(&object_stream(1, 100, b"10 0 42")).is_err());
    assert!(parse_object_stream(&object_stream(-1, 0, b"")).is_err());
}

#[test]
fn test_parse_direct_objects() {
    let (_, obj) = parse_object(b"<< /ByteRange [0 10 20 30] /Name (Jane \\(J\\)) >>").unwrap();
    let dict = obj.as_dict().unwrap();
    let range: Vec<i64> = dict["ByteRange"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(Object::as_integer)
        .collect();
    assert_eq!(range, vec![0, 10, 20, 30]);
    assert_eq!(dict["Name"].as_string(), Some(b"Jane (J)".as_slice()));

    let (_, hex) = parse_object(b"<48656C6C6F>").unwrap();
    assert_eq!(hex.as_string(), Some(b"Hello".as_slice()));
}

proptest! {
    #[test]
    fn prop_arbitrary_bytes_never_panic(data in proptest::collection::vec(any::<u8>(), 0..2048)) {
        let _ = PdfDocument::from_bytes(data);
    }

    #[test]
    fn prop_truncated_documents_never_panic(cut in 0usize..699) {
        let data = fixture("simple.pdf");
        let cut = cut.min(data.len());
        let _ = PdfDocument::from_bytes(data[..cut].to_vec());
    }

    #[test]
    fn prop_object_parser_never_panics(data in proptest::collection::vec(any::<u8>(), 0..512)) {
        let _ = parse_object(&data);
    }
}
