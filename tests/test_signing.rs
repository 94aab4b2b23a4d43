//! End-to-end signing at every PAdES level.
//!
//! Each test signs a fixture document and reads the result back with the
//! verifier, using the in-process services from `common`.

mod common;

use common::{
    chained_signer, ec_signer, fixture, fixture_path, root_ca, rsa_signer, signer_with, tsa_config,
    verification_time, FakeServices, TsaBehavior,
};
use pdf_pades::signatures::{
    HashAlgorithm, Rect, SignOptions, SignatureAppearance, SignatureLevel, SignatureVerifier, VerificationStatus,
};
use pdf_pades::{ErrorKind, PdfDocument};

fn verifier() -> SignatureVerifier {
    SignatureVerifier::new().with_verification_time(verification_time())
}

#[test]
fn test_level_b_appends_incremental_update() {
    let services = FakeServices::new(TsaBehavior::Grant);
    let original = fixture("simple.pdf");

    let result = signer_with(&services)
        .sign(original.clone(), rsa_signer(), &SignOptions::new(SignatureLevel::B))
        .unwrap();

    assert!(result.success);
    assert_eq!(result.level, SignatureLevel::B);
    assert_eq!(result.field_name, "Signature1");
    assert_eq!(result.signer_name, "Test Signer");
    // Original bytes are never rewritten.
    assert!(result.signed_bytes.starts_with(&original));
    assert!(result.signed_bytes.len() > original.len());
    assert_eq!(services.timestamp_requests(), 0);
    assert_eq!(services.revocation_requests(), 0);

    let report = verifier().verify(&result.signed_bytes).unwrap();
    assert!(report.is_valid, "{:?}", report);
    let sig = &report.signatures[0];
    assert!(sig.integrity_valid);
    assert!(sig.covers_whole_document);
    assert_eq!(sig.detected_level, Some(SignatureLevel::B));
    assert_eq!(sig.sub_filter.as_deref(), Some("ETSI.CAdES.detached"));
}

#[test]
fn test_level_t_embeds_signature_timestamp() {
    let services = FakeServices::new(TsaBehavior::Grant);
    let options = SignOptions::new(SignatureLevel::T).with_tsa(tsa_config());

    let result = signer_with(&services)
        .sign(fixture("simple.pdf"), rsa_signer(), &options)
        .unwrap();
    assert_eq!(services.timestamp_requests(), 1);

    let report = verifier().verify(&result.signed_bytes).unwrap();
    assert!(report.is_valid, "{:?}", report);
    let sig = &report.signatures[0];
    assert!(sig.has_timestamp);
    let timestamp = sig.timestamp.as_ref().unwrap();
    assert!(timestamp.valid);
    assert_eq!(timestamp.tsa_name.as_deref(), Some("Test TSA"));
    assert_eq!(sig.detected_level, Some(SignatureLevel::T));
}

#[test]
fn test_level_lt_embeds_revocation_data() {
    let services = FakeServices::new(TsaBehavior::Grant);
    let options = SignOptions::new(SignatureLevel::LT).with_tsa(tsa_config());

    let result = signer_with(&services)
        .sign(fixture("simple.pdf"), chained_signer(), &options)
        .unwrap();
    assert_eq!(result.signer_name, "Chained Signer");
    // One OCSP request and one CRL download.
    assert_eq!(services.revocation_requests(), 2);
    assert_eq!(services.timestamp_requests(), 1);

    let report = verifier().verify(&result.signed_bytes).unwrap();
    assert!(report.is_valid, "{:?}", report);
    let sig = &report.signatures[0];
    assert!(sig.has_ocsp);
    assert!(sig.has_crl);
    assert_eq!(sig.chain_length, 2);
    assert!(sig.chain_trusted);
    assert_eq!(sig.detected_level, Some(SignatureLevel::LT));
}

#[test]
fn test_level_lt_with_ocsp_only() {
    let services = FakeServices::new(TsaBehavior::Grant);
    let options = SignOptions::new(SignatureLevel::LT)
        .with_tsa(tsa_config())
        .with_revocation(true, false);

    let result = signer_with(&services)
        .sign(fixture("simple.pdf"), chained_signer(), &options)
        .unwrap();
    assert_eq!(services.revocation_requests(), 1);

    let report = verifier().verify(&result.signed_bytes).unwrap();
    let sig = &report.signatures[0];
    assert!(sig.has_ocsp);
    assert!(!sig.has_crl);
}

#[test]
fn test_level_lt_without_revocation_endpoints_fails() {
    // The self-signed signer names no OCSP responder and no CRL.
    let services = FakeServices::new(TsaBehavior::Grant);
    let options = SignOptions::new(SignatureLevel::LT).with_tsa(tsa_config());

    let err = signer_with(&services)
        .sign(fixture("simple.pdf"), rsa_signer(), &options)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Certificate);
    assert_eq!(services.timestamp_requests(), 0);
}

#[test]
fn test_level_lta_adds_dss_and_document_timestamp() {
    let services = FakeServices::new(TsaBehavior::Grant);
    let options = SignOptions::new(SignatureLevel::LTA).with_tsa(tsa_config());

    let result = signer_with(&services)
        .sign(fixture("simple.pdf"), chained_signer(), &options)
        .unwrap();
    assert_eq!(result.level, SignatureLevel::LTA);
    // Signature timestamp plus document timestamp.
    assert_eq!(services.timestamp_requests(), 2);

    let doc = PdfDocument::from_bytes(result.signed_bytes.clone()).unwrap();
    let catalog = doc.catalog().unwrap();
    let dss = doc.resolve_dict(catalog.get("DSS").unwrap()).unwrap();
    assert!(dss.contains_key("Certs"));
    assert!(dss.contains_key("OCSPs"));
    assert!(dss.contains_key("CRLs"));

    let report = verifier().verify(&result.signed_bytes).unwrap();
    assert!(report.is_valid, "{:?}", report);
    assert_eq!(report.signatures.len(), 2);

    let signature = &report.signatures[0];
    assert!(!signature.is_document_timestamp);
    assert_eq!(signature.detected_level, Some(SignatureLevel::LTA));

    let archive = &report.signatures[1];
    assert!(archive.is_document_timestamp);
    assert_eq!(archive.field_name, "Signature2");
    assert_eq!(archive.sub_filter.as_deref(), Some("ETSI.RFC3161"));
    assert!(archive.integrity_valid);
    assert!(archive.covers_whole_document);
}

#[test]
fn test_dss_evidence_is_not_credited_to_other_signers() {
    let services = FakeServices::new(TsaBehavior::Grant);
    let signer = signer_with(&services);

    let archived = signer
        .sign(
            fixture("simple.pdf"),
            chained_signer(),
            &SignOptions::new(SignatureLevel::LTA).with_tsa(tsa_config()),
        )
        .unwrap();
    let result = signer
        .sign(
            archived.signed_bytes,
            rsa_signer(),
            &SignOptions::new(SignatureLevel::T).with_tsa(tsa_config()),
        )
        .unwrap();
    assert_eq!(result.field_name, "Signature3");

    let report = verifier().verify(&result.signed_bytes).unwrap();
    assert_eq!(report.signatures.len(), 3);
    assert!(report.signatures[0].has_ocsp);
    assert!(report.signatures[0].has_crl);

    // The self-signed certificate has no revocation data in the DSS.
    let latest = &report.signatures[2];
    assert_eq!(latest.field_name, "Signature3");
    assert!(latest.is_valid, "{:?}", latest);
    assert!(!latest.has_ocsp);
    assert!(!latest.has_crl);
    assert_eq!(latest.detected_level, Some(SignatureLevel::T));
}

#[test]
fn test_contact_info_cannot_disturb_placeholders() {
    let services = FakeServices::new(TsaBehavior::Grant);
    let long = "x".repeat(5000);

    for contact in ["endobj", "mail me /Contents <00> /ByteRange [1 2 3 4] endobj", long.as_str()] {
        let options = SignOptions::new(SignatureLevel::B).with_contact_info(contact);
        let result = signer_with(&services)
            .sign(fixture("simple.pdf"), rsa_signer(), &options)
            .unwrap();

        let report = verifier().verify(&result.signed_bytes).unwrap();
        assert!(report.is_valid, "{:?}", report);
        let sig = &report.signatures[0];
        assert!(sig.covers_whole_document);
        assert_eq!(sig.contact_info.as_deref(), Some(contact));
    }
}

#[test]
fn test_second_signature_keeps_first_intact() {
    let services = FakeServices::new(TsaBehavior::Grant);
    let signer = signer_with(&services);

    let first = signer
        .sign(fixture("simple.pdf"), rsa_signer(), &SignOptions::new(SignatureLevel::B))
        .unwrap();
    let second = signer
        .sign(first.signed_bytes.clone(), ec_signer(), &SignOptions::new(SignatureLevel::B))
        .unwrap();
    assert_eq!(second.field_name, "Signature2");
    assert!(second.signed_bytes.starts_with(&first.signed_bytes));

    let report = verifier().verify(&second.signed_bytes).unwrap();
    assert_eq!(report.signatures.len(), 2);
    assert!(report.is_valid, "{:?}", report);
    assert!(report.document_modified);

    let names: Vec<_> = report.signatures.iter().map(|s| s.field_name.as_str()).collect();
    assert_eq!(names, ["Signature1", "Signature2"]);
    assert!(report.signatures.iter().all(|s| s.integrity_valid));
    assert!(!report.signatures[0].covers_whole_document);
    assert!(report.signatures[1].covers_whole_document);
    assert_eq!(report.signatures[1].signer_name.as_deref(), Some("EC Signer"));
}

#[test]
fn test_sign_document_with_xref_stream() {
    let services = FakeServices::new(TsaBehavior::Grant);
    let result = signer_with(&services)
        .sign(fixture("xref_stream.pdf"), rsa_signer(), &SignOptions::new(SignatureLevel::B))
        .unwrap();

    let report = verifier().verify(&result.signed_bytes).unwrap();
    assert!(report.is_valid, "{:?}", report);
    assert_eq!(report.signatures.len(), 1);
}

#[test]
fn test_form_document_gets_unused_field_name() {
    // form.pdf already has a text field called Signature1.
    let services = FakeServices::new(TsaBehavior::Grant);
    let options = SignOptions::new(SignatureLevel::B)
        .with_appearance(SignatureAppearance::visible(2, Rect::new(72.0, 72.0, 200.0, 50.0)))
        .with_reason("Reviewed")
        .with_location("Berlin");

    let result = signer_with(&services)
        .sign(fixture("form.pdf"), rsa_signer(), &options)
        .unwrap();
    assert_eq!(result.field_name, "Signature2");

    let doc = PdfDocument::from_bytes(result.signed_bytes.clone()).unwrap();
    let names = doc.field_names().unwrap();
    assert!(names.contains(&"Signature1".to_string()));
    assert!(names.contains(&"Signature2".to_string()));

    let report = verifier().verify(&result.signed_bytes).unwrap();
    assert_eq!(report.signatures.len(), 1);
    let sig = &report.signatures[0];
    assert_eq!(sig.reason.as_deref(), Some("Reviewed"));
    assert_eq!(sig.location.as_deref(), Some("Berlin"));
}

#[test]
fn test_visible_signature_with_image() {
    let services = FakeServices::new(TsaBehavior::Grant);
    let mut png = Vec::new();
    image::DynamicImage::new_rgb8(8, 4)
        .write_to(&mut std::io::Cursor::new(&mut png), image::ImageOutputFormat::Png)
        .unwrap();
    let appearance = SignatureAppearance::visible(1, Rect::new(50.0, 50.0, 160.0, 60.0)).with_image(png);

    let result = signer_with(&services)
        .sign(
            fixture("simple.pdf"),
            rsa_signer(),
            &SignOptions::new(SignatureLevel::B).with_appearance(appearance),
        )
        .unwrap();

    let report = verifier().verify(&result.signed_bytes).unwrap();
    assert!(report.is_valid, "{:?}", report);
}

#[test]
fn test_sha384_and_sha512_digests() {
    let services = FakeServices::new(TsaBehavior::Grant);
    for hash in [HashAlgorithm::Sha384, HashAlgorithm::Sha512] {
        let options = SignOptions::new(SignatureLevel::T)
            .with_hash_algorithm(hash)
            .with_tsa(tsa_config().with_hash_algorithm(hash));
        let result = signer_with(&services)
            .sign(fixture("simple.pdf"), ec_signer(), &options)
            .unwrap();

        let report = verifier().verify(&result.signed_bytes).unwrap();
        assert!(report.is_valid, "{:?}: {:?}", hash, report);
        let timestamp = report.signatures[0].timestamp.as_ref().unwrap();
        assert_eq!(timestamp.hash_algorithm, Some(hash));
    }
}

#[test]
fn test_trusted_chain_reports_valid_status() {
    let services = FakeServices::new(TsaBehavior::Grant);
    let result = signer_with(&services)
        .sign(fixture("simple.pdf"), chained_signer(), &SignOptions::new(SignatureLevel::B))
        .unwrap();

    let report = verifier()
        .with_trust_anchors(vec![root_ca()])
        .verify(&result.signed_bytes)
        .unwrap();
    let sig = &report.signatures[0];
    assert!(sig.chain_trusted);
    assert_eq!(sig.status(), VerificationStatus::Valid);
}

#[test]
fn test_sign_file_writes_output() {
    let services = FakeServices::new(TsaBehavior::Grant);
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("signed.pdf");

    let result = signer_with(&services)
        .sign_file(
            fixture_path("simple.pdf"),
            &output,
            rsa_signer(),
            &SignOptions::new(SignatureLevel::B),
        )
        .unwrap();

    let written = std::fs::read(&output).unwrap();
    assert_eq!(written, result.signed_bytes);
    assert!(verifier().verify_file(&output).unwrap().is_valid);
}

#[test]
fn test_sign_file_failure_leaves_no_output() {
    let services = FakeServices::new(TsaBehavior::Unreachable);
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("signed.pdf");
    let options = SignOptions::new(SignatureLevel::T).with_tsa(tsa_config());

    let err = signer_with(&services)
        .sign_file(fixture_path("simple.pdf"), &output, rsa_signer(), &options)
        .unwrap_err();
    assert!(err.is_network());
    assert!(!output.exists());
}

#[test]
fn test_rejects_non_pdf_input() {
    let services = FakeServices::new(TsaBehavior::Grant);
    let err = signer_with(&services)
        .sign(fixture("not_a_pdf.txt"), rsa_signer(), &SignOptions::new(SignatureLevel::B))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Document);
}
