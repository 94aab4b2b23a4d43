//! Document Security Store (`/DSS`).
//!
//! The DSS collects certificates, OCSP responses and CRLs at document level so
//! signatures stay verifiable after the responders are gone. Each blob is a
//! Flate-compressed stream referenced from `/Certs`, `/OCSPs` or `/CRLs`.

use crate::decoders::flate_encode;
use crate::document::PdfDocument;
use crate::error::Result;
use crate::object::{Dict, Object};
use crate::writer::IncrementalUpdate;

/// Contents of a Document Security Store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentSecurityStore {
    pub certs: Vec<Vec<u8>>,
    pub ocsps: Vec<Vec<u8>>,
    pub crls: Vec<Vec<u8>>,
}

impl DocumentSecurityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The store referenced from the document catalog, if any. Entries that
    /// fail to decode are skipped.
    pub fn from_document(doc: &PdfDocument) -> Result<Option<Self>> {
        let catalog = doc.catalog()?;
        let Some(dss) = catalog.get("DSS") else {
            return Ok(None);
        };
        let dss = doc.resolve_dict(dss)?;

        let mut store = Self::new();
        store.certs = read_streams(doc, &dss, "Certs");
        store.ocsps = read_streams(doc, &dss, "OCSPs");
        store.crls = read_streams(doc, &dss, "CRLs");
        log::debug!(
            "DSS holds {} certificate(s), {} OCSP response(s), {} CRL(s)",
            store.certs.len(),
            store.ocsps.len(),
            store.crls.len()
        );
        Ok(Some(store))
    }

    pub fn is_empty(&self) -> bool {
        self.certs.is_empty() && self.ocsps.is_empty() && self.crls.is_empty()
    }

    pub fn add_certificate(&mut self, der: Vec<u8>) {
        push_unique(&mut self.certs, der);
    }

    pub fn add_ocsp(&mut self, der: Vec<u8>) {
        push_unique(&mut self.ocsps, der);
    }

    pub fn add_crl(&mut self, der: Vec<u8>) {
        push_unique(&mut self.crls, der);
    }

    /// Add every entry of `other` not already present.
    pub fn merge(&mut self, other: DocumentSecurityStore) {
        other.certs.into_iter().for_each(|c| self.add_certificate(c));
        other.ocsps.into_iter().for_each(|o| self.add_ocsp(o));
        other.crls.into_iter().for_each(|c| self.add_crl(c));
    }

    /// Write the store into `update` and point `catalog` at it.
    pub fn write(&self, update: &mut IncrementalUpdate<'_>, catalog: &mut Dict) -> Result<()> {
        let mut dss = Dict::new();
        dss.insert("Type".to_string(), Object::name("DSS"));
        for (key, blobs) in [("Certs", &self.certs), ("OCSPs", &self.ocsps), ("CRLs", &self.crls)] {
            if blobs.is_empty() {
                continue;
            }
            let mut refs = Vec::with_capacity(blobs.len());
            for blob in blobs {
                let mut dict = Dict::new();
                dict.insert("Filter".to_string(), Object::name("FlateDecode"));
                refs.push(Object::Reference(update.add_object(Object::Stream {
                    dict,
                    data: bytes::Bytes::from(flate_encode(blob)?),
                })));
            }
            dss.insert(key.to_string(), Object::Array(refs));
        }
        let dss_ref = update.add_object(Object::Dictionary(dss));
        catalog.insert("DSS".to_string(), Object::Reference(dss_ref));
        Ok(())
    }
}

fn push_unique(list: &mut Vec<Vec<u8>>, der: Vec<u8>) {
    if !list.contains(&der) {
        list.push(der);
    }
}

fn read_streams(doc: &PdfDocument, dss: &Dict, key: &str) -> Vec<Vec<u8>> {
    let Some(entries) = dss.get(key).and_then(|o| doc.resolve(o).ok()) else {
        return Vec::new();
    };
    entries
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|entry| match doc.resolve(entry).and_then(|s| s.decode_stream_data()) {
            Ok(data) => Some(data),
            Err(e) => {
                log::warn!("skipping unreadable /DSS /{} entry: {}", key, e);
                None
            },
        })
        .collect()
}
