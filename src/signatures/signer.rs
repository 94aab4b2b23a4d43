//! PAdES signature creation.
//!
//! Every signature is appended as an incremental update, so bytes covered by
//! earlier signatures never move. The flow for one call:
//!
//! 1. Write the signature dictionary with a zeroed `/Contents` placeholder and
//!    a fixed-width `/ByteRange`, plus the widget, page `/Annots` and AcroForm.
//! 2. Patch the real byte range and hash the two covered slices.
//! 3. Build the CMS container, timestamp its signature value for T and above,
//!    and hex-encode it into the placeholder.
//! 4. For LTA, append a second section with the DSS and a document timestamp.

use crate::document::PdfDocument;
use crate::error::{Error, Result};
use crate::object::{Dict, Object, ObjectRef};
use crate::writer::{IncrementalUpdate, UpdatedDocument};
use chrono::{DateTime, Utc};
use der::{Any, Decode, Encode};
use std::path::Path;
use std::sync::Arc;
use x509_cert::Certificate;

use super::appearance::{build_appearance, AppearanceText};
use super::byterange::ByteRangeCalculator;
use super::certificate::SigningCertificate;
use super::chain::verify_issued_by;
use super::cms::{attribute, RevocationInfoArchival, SignedDataBuilder};
use super::dss::DocumentSecurityStore;
use super::oid;
use super::revocation::{collect_revocation_data, HttpRevocationSource, RevocationData, RevocationSource};
use super::timestamp::{TimestampClient, TimestampToken};
use super::transport::{HttpTransport, Transport};
use super::types::{
    CertificationLevel, SignOptions, SignatureAppearance, SignatureLevel, SignatureResult, SignatureSubFilter,
    TsaConfig,
};

/// Fixed part of the CMS estimate: signed attributes, algorithm identifiers, framing.
const CONTAINER_OVERHEAD: usize = 4096;
/// Room for a signature timestamp token, including the TSA's certificates.
const TIMESTAMP_ALLOWANCE: usize = 8192;
/// Reserved `/Contents` size of a document timestamp.
const DOC_TIMESTAMP_SIZE: usize = 16384;
/// Widget flags: Print | Locked.
const WIDGET_FLAGS: i64 = 132;
/// AcroForm `/SigFlags`: SignaturesExist | AppendOnly.
const SIG_FLAGS: i64 = 3;

/// Creates PAdES signatures.
///
/// Holds only shared, immutable collaborators, so one signer can serve
/// concurrent calls on different documents.
#[derive(Clone)]
pub struct PdfSigner {
    timestamps: TimestampClient,
    revocation: Arc<dyn RevocationSource>,
}

impl std::fmt::Debug for PdfSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PdfSigner").field("timestamps", &self.timestamps).finish()
    }
}

impl PdfSigner {
    /// Signer talking to TSAs and revocation endpoints over one pooled HTTP client.
    pub fn new() -> Result<Self> {
        Ok(Self::with_transport(Arc::new(HttpTransport::new()?)))
    }

    /// Signer whose network traffic goes through `transport`.
    pub fn with_transport(transport: Arc<dyn Transport>) -> Self {
        Self {
            timestamps: TimestampClient::new(transport.clone()),
            revocation: Arc::new(HttpRevocationSource::new(transport)),
        }
    }

    pub fn with_timestamp_client(mut self, client: TimestampClient) -> Self {
        self.timestamps = client;
        self
    }

    /// Take OCSP responses and CRLs from `source` instead of the network.
    pub fn with_revocation_source(mut self, source: Arc<dyn RevocationSource>) -> Self {
        self.revocation = source;
        self
    }

    /// Sign a document given as bytes.
    pub fn sign(
        &self,
        document: impl Into<Vec<u8>>,
        certificate: SigningCertificate,
        options: &SignOptions,
    ) -> Result<SignatureResult> {
        let doc = PdfDocument::from_bytes(document)?;
        self.sign_document(&doc, certificate, options)
    }

    /// Sign `input` and write the result to `output`. Nothing is written on failure.
    pub fn sign_file(
        &self,
        input: impl AsRef<Path>,
        output: impl AsRef<Path>,
        certificate: SigningCertificate,
        options: &SignOptions,
    ) -> Result<SignatureResult> {
        let data = std::fs::read(input.as_ref())?;
        let result = self.sign(data, certificate, options)?;
        std::fs::write(output.as_ref(), &result.signed_bytes)?;
        log::info!("wrote signed document to {}", output.as_ref().display());
        Ok(result)
    }

    /// Sign an already parsed document.
    pub fn sign_document(
        &self,
        doc: &PdfDocument,
        certificate: SigningCertificate,
        options: &SignOptions,
    ) -> Result<SignatureResult> {
        options.validate()?;
        if !certificate.has_private_key() {
            return Err(Error::Certificate(
                "signing certificate has no usable private key".to_string(),
            ));
        }

        let existing_names = doc.field_names()?;
        if options.signer.certify_document && !doc.signature_fields()?.is_empty() {
            return Err(Error::Configuration(
                "certification is only allowed on a document without signatures".to_string(),
            ));
        }
        let field_name = match &options.signer.field_name {
            Some(name) if existing_names.iter().any(|n| n == name) => {
                return Err(Error::Configuration(format!("field '{}' already exists", name)));
            },
            Some(name) => name.clone(),
            None => next_field_name(&existing_names),
        };

        let appearance = options
            .appearance
            .clone()
            .unwrap_or_else(|| SignatureAppearance::invisible(1));
        let page_ref = page_reference(doc, appearance.page_number)?;

        let signing_time = Utc::now();
        let signer_name = options
            .signer
            .signer_name
            .clone()
            .or_else(|| certificate.common_name())
            .unwrap_or_else(|| "Unknown".to_string());

        let revocation = if options.level.requires_revocation_data() {
            let issuer = find_issuer(certificate.certificate(), certificate.chain());
            collect_revocation_data(
                self.revocation.as_ref(),
                certificate.certificate(),
                issuer,
                options.embed_ocsp,
                options.embed_crl,
            )?
        } else {
            RevocationData::default()
        };

        let reserved = options
            .contents_size
            .unwrap_or_else(|| estimate_contents_size(&certificate, options.level, &revocation));
        let calc = ByteRangeCalculator::new(reserved);
        log::info!(
            "signing as '{}' at level {} into field '{}' ({} bytes reserved)",
            signer_name,
            options.level,
            field_name,
            reserved
        );

        let mut update = IncrementalUpdate::new(doc);
        let mut catalog = doc.catalog()?;
        let root_ref = doc.root_ref()?;

        let doc_mdp = options
            .signer
            .certify_document
            .then_some(options.signer.certification_level);
        let sig_dict = signature_dictionary(&calc, options, &signer_name, signing_time, doc_mdp);
        let sig_ref = update.add_object(Object::Dictionary(sig_dict));

        let text = AppearanceText {
            signer_name: &signer_name,
            signing_time,
            reason: options.signer.reason.as_deref(),
            location: options.signer.location.as_deref(),
        };
        let ap_ref = build_appearance(&mut update, &appearance, &text)?;
        let rect = if appearance.invisible {
            [0.0; 4]
        } else {
            appearance.rect.to_corners()
        };
        add_signature_field(
            &mut update,
            &mut catalog,
            &FieldPlacement {
                name: &field_name,
                page: page_ref,
                rect,
                appearance: ap_ref,
                value: sig_ref,
            },
        )?;
        if doc_mdp.is_some() {
            let mut perms = Dict::new();
            perms.insert("DocMDP".to_string(), Object::Reference(sig_ref));
            catalog.insert("Perms".to_string(), Object::Dictionary(perms));
        }
        update.set_object(root_ref, Object::Dictionary(catalog));

        let updated = update.build()?;
        let mut signed_bytes = seal(updated, sig_ref, &calc, |first, second| {
            let digest = options.hash_algorithm.digest_parts(&[first, second]);
            self.signature_container(&certificate, options, &revocation, &digest)
        })?;

        if options.level.requires_archive_timestamp() {
            let tsa = require_tsa(options)?;
            let mut dss = DocumentSecurityStore::new();
            for cert in std::iter::once(certificate.certificate()).chain(certificate.chain()) {
                dss.add_certificate(encode_certificate(cert)?);
            }
            revocation.ocsp_responses.iter().for_each(|o| dss.add_ocsp(o.clone()));
            revocation.crls.iter().for_each(|c| dss.add_crl(c.clone()));
            signed_bytes = self.append_document_timestamp(signed_bytes, appearance.page_number, dss, tsa)?;
        }

        log::info!(
            "signed field '{}' at level {}, {} bytes",
            field_name,
            options.level,
            signed_bytes.len()
        );
        Ok(SignatureResult {
            success: true,
            signed_bytes,
            level: options.level,
            signer_name,
            signing_time,
            certificate_serial: certificate.serial_hex(),
            certificate_issuer: certificate.issuer_name(),
            field_name,
        })
    }

    /// Append a DSS and an `ETSI.RFC3161` document timestamp to signed bytes.
    ///
    /// `dss` is merged with any store the document already has.
    pub fn append_document_timestamp(
        &self,
        document: Vec<u8>,
        page_number: usize,
        mut dss: DocumentSecurityStore,
        tsa: &TsaConfig,
    ) -> Result<Vec<u8>> {
        let doc = PdfDocument::from_bytes(document)?;
        if let Some(existing) = DocumentSecurityStore::from_document(&doc)? {
            dss.merge(existing);
        }

        let field_name = next_field_name(&doc.field_names()?);
        let page_ref = page_reference(&doc, page_number)?;
        let calc = ByteRangeCalculator::new(DOC_TIMESTAMP_SIZE);

        let mut update = IncrementalUpdate::new(&doc);
        let mut catalog = doc.catalog()?;
        let root_ref = doc.root_ref()?;

        if !dss.is_empty() {
            dss.write(&mut update, &mut catalog)?;
        }

        let mut ts_dict = Dict::new();
        ts_dict.insert("Type".to_string(), Object::name("DocTimeStamp"));
        ts_dict.insert("Filter".to_string(), Object::name("Adobe.PPKLite"));
        ts_dict.insert(
            "SubFilter".to_string(),
            Object::name(SignatureSubFilter::Rfc3161.as_pdf_name()),
        );
        ts_dict.insert("ByteRange".to_string(), ByteRangeCalculator::byte_range_placeholder());
        ts_dict.insert("Contents".to_string(), calc.contents_placeholder());
        let ts_ref = update.add_object(Object::Dictionary(ts_dict));

        let ap_ref = build_appearance(
            &mut update,
            &SignatureAppearance::invisible(page_number),
            &AppearanceText {
                signer_name: "",
                signing_time: Utc::now(),
                reason: None,
                location: None,
            },
        )?;
        add_signature_field(
            &mut update,
            &mut catalog,
            &FieldPlacement {
                name: &field_name,
                page: page_ref,
                rect: [0.0; 4],
                appearance: ap_ref,
                value: ts_ref,
            },
        )?;
        update.set_object(root_ref, Object::Dictionary(catalog));

        let updated = update.build()?;
        let bytes = seal(updated, ts_ref, &calc, |first, second| {
            let digest = tsa.hash_algorithm.digest_parts(&[first, second]);
            Ok(self.timestamps.request(&digest, tsa.hash_algorithm, tsa)?.into_der())
        })?;
        log::info!("added document timestamp '{}'", field_name);
        Ok(bytes)
    }

    /// CMS container over `digest`, with the signature timestamp when required.
    fn signature_container(
        &self,
        certificate: &SigningCertificate,
        options: &SignOptions,
        revocation: &RevocationData,
        digest: &[u8],
    ) -> Result<Vec<u8>> {
        let mut builder = SignedDataBuilder::new(certificate.key(), certificate.certificate(), options.hash_algorithm)
            .with_chain(certificate.chain());
        if !revocation.is_empty() {
            let archival = RevocationInfoArchival::new(&revocation.crls, &revocation.ocsp_responses)?;
            builder = builder
                .with_signed_attribute(attribute(
                    oid::ADBE_REVOCATION_INFO_ARCHIVAL,
                    Any::encode_from(&archival).map_err(|e| Error::crypto("revocation archival", e))?,
                )?)
                .with_crls(revocation.crls.clone());
        }
        let mut container = builder.build_detached(digest)?;

        if options.level.requires_timestamp() {
            let tsa = require_tsa(options)?;
            let signature_hash = tsa.hash_algorithm.digest(container.signature_value()?);
            let token = self.timestamps.request(&signature_hash, tsa.hash_algorithm, tsa)?;
            container.add_unsigned_attribute(timestamp_attribute(&token)?)?;
        }
        container.to_der()
    }
}

/// Where and how a new signature field is attached.
struct FieldPlacement<'a> {
    name: &'a str,
    page: ObjectRef,
    rect: [f64; 4],
    appearance: ObjectRef,
    value: ObjectRef,
}

/// Add a merged field/widget for `placement.value`, hook it into the page's
/// `/Annots` and the AcroForm. `catalog` is updated when the AcroForm is inline.
fn add_signature_field(
    update: &mut IncrementalUpdate<'_>,
    catalog: &mut Dict,
    placement: &FieldPlacement<'_>,
) -> Result<ObjectRef> {
    let mut ap = Dict::new();
    ap.insert("N".to_string(), Object::Reference(placement.appearance));

    let mut widget = Dict::new();
    widget.insert("Type".to_string(), Object::name("Annot"));
    widget.insert("Subtype".to_string(), Object::name("Widget"));
    widget.insert("FT".to_string(), Object::name("Sig"));
    widget.insert("T".to_string(), Object::text(placement.name));
    widget.insert("V".to_string(), Object::Reference(placement.value));
    widget.insert("F".to_string(), Object::Integer(WIDGET_FLAGS));
    widget.insert("P".to_string(), Object::Reference(placement.page));
    widget.insert("Rect".to_string(), Object::rect(placement.rect));
    widget.insert("AP".to_string(), Object::Dictionary(ap));
    let widget_ref = update.add_object(Object::Dictionary(widget));

    let mut page = update.get_object(placement.page)?;
    let page_dict = page
        .as_dict_mut()
        .ok_or_else(|| Error::Document(format!("page {} is not a dictionary", placement.page)))?;
    if append_to_array(update, page_dict, "Annots", Object::Reference(widget_ref))? {
        update.set_object(placement.page, page);
    }

    let (acroform_ref, mut acroform) = match catalog.get("AcroForm") {
        Some(Object::Reference(r)) => {
            let r = *r;
            let dict = update
                .get_object(r)?
                .as_dict()
                .cloned()
                .ok_or_else(|| Error::Document("/AcroForm is not a dictionary".to_string()))?;
            (Some(r), dict)
        },
        Some(Object::Dictionary(d)) => (None, d.clone()),
        None => (None, Dict::new()),
        Some(other) => return Err(Error::Document(format!("/AcroForm is a {}", other.type_name()))),
    };
    append_to_array(update, &mut acroform, "Fields", Object::Reference(widget_ref))?;
    acroform.insert("SigFlags".to_string(), Object::Integer(SIG_FLAGS));
    match acroform_ref {
        Some(r) => update.set_object(r, Object::Dictionary(acroform)),
        None => {
            catalog.insert("AcroForm".to_string(), Object::Dictionary(acroform));
        },
    }
    Ok(widget_ref)
}

/// Append `value` to the array stored under `key`, following one indirection.
///
/// Returns true when `holder` itself changed and must be rewritten.
fn append_to_array(update: &mut IncrementalUpdate<'_>, holder: &mut Dict, key: &str, value: Object) -> Result<bool> {
    match holder.get(key).cloned() {
        Some(Object::Reference(r)) => {
            let mut target = update.get_object(r)?;
            match &mut target {
                Object::Array(items) => items.push(value),
                other => return Err(Error::Document(format!("/{} is a {}", key, other.type_name()))),
            }
            update.set_object(r, target);
            Ok(false)
        },
        Some(Object::Array(mut items)) => {
            items.push(value);
            holder.insert(key.to_string(), Object::Array(items));
            Ok(true)
        },
        None => {
            holder.insert(key.to_string(), Object::Array(vec![value]));
            Ok(true)
        },
        Some(other) => Err(Error::Document(format!("/{} is a {}", key, other.type_name()))),
    }
}

/// Patch the byte range of the dictionary `sig_ref` and fill its `/Contents`
/// with what `contents` produces from the two covered slices.
fn seal<F>(updated: UpdatedDocument, sig_ref: ObjectRef, calc: &ByteRangeCalculator, contents: F) -> Result<Vec<u8>>
where
    F: FnOnce(&[u8], &[u8]) -> Result<Vec<u8>>,
{
    let span = updated
        .object_span(sig_ref.id)
        .ok_or_else(|| Error::Document(format!("signature dictionary {} was not written", sig_ref)))?;
    let mut bytes = updated.bytes;

    let contents_offset = ByteRangeCalculator::find_contents_offset(&bytes, span.clone())
        .ok_or_else(|| Error::Document("no /Contents placeholder in signature dictionary".to_string()))?;
    let byte_range_span = ByteRangeCalculator::find_byte_range_span(&bytes, span)
        .ok_or_else(|| Error::Document("no /ByteRange placeholder in signature dictionary".to_string()))?;

    let byte_range = calc.calculate_byte_range(bytes.len(), contents_offset);
    ByteRangeCalculator::patch_byte_range(&mut bytes, byte_range_span, &byte_range)?;
    log::debug!("byte range {}", ByteRangeCalculator::format_byte_range(&byte_range));

    let container = {
        let (first, second) = ByteRangeCalculator::signed_slices(&bytes, &byte_range)?;
        contents(first, second)?
    };
    calc.insert_signature(&mut bytes, contents_offset, &container)?;
    log::debug!(
        "embedded {} byte container, {} bytes unused",
        container.len(),
        calc.capacity() - container.len()
    );
    Ok(bytes)
}

fn signature_dictionary(
    calc: &ByteRangeCalculator,
    options: &SignOptions,
    signer_name: &str,
    signing_time: DateTime<Utc>,
    doc_mdp: Option<CertificationLevel>,
) -> Dict {
    let mut dict = Dict::new();
    dict.insert("Type".to_string(), Object::name("Sig"));
    dict.insert("Filter".to_string(), Object::name("Adobe.PPKLite"));
    dict.insert(
        "SubFilter".to_string(),
        Object::name(SignatureSubFilter::CadesDetached.as_pdf_name()),
    );
    dict.insert("ByteRange".to_string(), ByteRangeCalculator::byte_range_placeholder());
    dict.insert("Contents".to_string(), calc.contents_placeholder());
    dict.insert("M".to_string(), Object::text(&format_pdf_date(signing_time)));
    dict.insert("Name".to_string(), Object::text(signer_name));
    let details = [
        ("Reason", &options.signer.reason),
        ("Location", &options.signer.location),
        ("ContactInfo", &options.signer.contact_info),
    ];
    for (key, value) in details {
        if let Some(value) = value {
            dict.insert(key.to_string(), Object::text(value));
        }
    }

    if let Some(level) = doc_mdp {
        let mut params = Dict::new();
        params.insert("Type".to_string(), Object::name("TransformParams"));
        params.insert("P".to_string(), Object::Integer(level.permissions()));
        params.insert("V".to_string(), Object::name("1.2"));
        let mut reference = Dict::new();
        reference.insert("Type".to_string(), Object::name("SigRef"));
        reference.insert("TransformMethod".to_string(), Object::name("DocMDP"));
        reference.insert("TransformParams".to_string(), Object::Dictionary(params));
        dict.insert(
            "Reference".to_string(),
            Object::Array(vec![Object::Dictionary(reference)]),
        );
    }
    dict
}

/// `Signature{n}` with the smallest `n` not already taken.
pub fn next_field_name(existing: &[String]) -> String {
    (1..)
        .map(|n| format!("Signature{}", n))
        .find(|candidate| !existing.iter().any(|name| name == candidate))
        .unwrap_or_else(|| "Signature".to_string())
}

/// PDF date string in UTC, e.g. `D:20270101120000+00'00'`.
pub fn format_pdf_date(time: DateTime<Utc>) -> String {
    time.format("D:%Y%m%d%H%M%S+00'00'").to_string()
}

/// Rough upper bound of the CMS container size.
fn estimate_contents_size(certificate: &SigningCertificate, level: SignatureLevel, revocation: &RevocationData) -> usize {
    let certificates: usize = std::iter::once(certificate.certificate())
        .chain(certificate.chain())
        .map(|c| c.encoded_len().ok().and_then(|l| usize::try_from(l).ok()).unwrap_or(2048))
        .sum();
    let mut size = CONTAINER_OVERHEAD + certificates + certificate.key().max_signature_len();
    if level.requires_timestamp() {
        size += TIMESTAMP_ALLOWANCE;
    }
    // CRLs go into both the archival attribute and the CMS crls set.
    size += revocation.ocsp_responses.iter().map(Vec::len).sum::<usize>();
    size += 2 * revocation.crls.iter().map(Vec::len).sum::<usize>();
    size.div_ceil(1024) * 1024
}

fn page_reference(doc: &PdfDocument, page_number: usize) -> Result<ObjectRef> {
    let pages = doc.pages()?;
    page_number
        .checked_sub(1)
        .and_then(|index| pages.get(index).copied())
        .ok_or_else(|| {
            Error::Configuration(format!(
                "page {} does not exist; document has {} page(s)",
                page_number,
                pages.len()
            ))
        })
}

fn find_issuer<'a>(certificate: &Certificate, chain: &'a [Certificate]) -> Option<&'a Certificate> {
    chain
        .iter()
        .find(|candidate| verify_issued_by(certificate, candidate).is_ok())
}

fn require_tsa(options: &SignOptions) -> Result<&TsaConfig> {
    options.tsa.as_ref().ok_or_else(|| {
        Error::Configuration(format!(
            "signature level {} requires a TSA configuration",
            options.level
        ))
    })
}

fn timestamp_attribute(token: &TimestampToken) -> Result<x509_cert::attr::Attribute> {
    let value = Any::from_der(token.as_der()).map_err(|e| Error::crypto("timestamp token", e))?;
    attribute(oid::ID_AA_SIGNATURE_TIME_STAMP_TOKEN, value)
}

fn encode_certificate(certificate: &Certificate) -> Result<Vec<u8>> {
    certificate
        .to_der()
        .map_err(|e| Error::certificate("failed to encode certificate", e))
}
