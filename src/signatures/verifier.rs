//! PDF signature verification.
//!
//! Each signature field is checked on its own: a broken signature ends up as
//! errors in its own report and never stops the others from being verified.
//! Only a document that cannot be parsed at all fails the call.

use crate::document::{FieldInfo, PdfDocument};
use crate::error::{Error, Result};
use crate::object::{Dict, Object};
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use der::{Any, Decode, Encode};
use std::path::Path;
use x509_cert::Certificate;

use super::byterange::ByteRangeCalculator;
use super::certificate::CertificateSummary;
use super::chain::LocalTrustStoreChainBuilder;
use super::cms::{RevocationInfoArchival, SignedContainer};
use super::dss::DocumentSecurityStore;
use super::oid;
use super::revocation;
use super::timestamp::TimestampToken;
use super::types::{
    CertificateInfo, CertificateStatus, SignatureLevel, SignatureSubFilter, SignatureVerificationInfo, TimestampInfo,
    VerificationResult,
};

/// Verifier for PDF digital signatures.
#[derive(Debug, Clone, Default)]
pub struct SignatureVerifier {
    trust: Option<LocalTrustStoreChainBuilder>,
    verification_time: Option<DateTime<Utc>>,
}

impl SignatureVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate chains up to these certificates instead of only checking that
    /// a chain is present.
    pub fn with_trust_anchors(mut self, anchors: Vec<Certificate>) -> Self {
        self.trust = Some(LocalTrustStoreChainBuilder::new(anchors));
        self
    }

    /// Trust anchors read from every certificate file in `folder`.
    pub fn with_trust_folder(mut self, folder: impl AsRef<Path>) -> Result<Self> {
        self.trust = Some(LocalTrustStoreChainBuilder::from_folder(folder)?);
        Ok(self)
    }

    /// Judge certificate validity at `time` rather than now.
    pub fn with_verification_time(mut self, time: DateTime<Utc>) -> Self {
        self.verification_time = Some(time);
        self
    }

    pub fn verify(&self, document: &[u8]) -> Result<VerificationResult> {
        let doc = PdfDocument::from_bytes(document.to_vec())?;
        self.verify_document(&doc)
    }

    pub fn verify_file(&self, path: impl AsRef<Path>) -> Result<VerificationResult> {
        let doc = PdfDocument::open(path)?;
        self.verify_document(&doc)
    }

    /// Verify every signature and document timestamp of `doc`.
    pub fn verify_document(&self, doc: &PdfDocument) -> Result<VerificationResult> {
        let time = self.verification_time.unwrap_or_else(Utc::now);
        let fields = doc.signature_fields()?;
        let dss = match DocumentSecurityStore::from_document(doc) {
            Ok(dss) => dss,
            Err(e) => {
                log::warn!("ignoring unreadable /DSS: {}", e);
                None
            },
        };

        let mut signatures: Vec<SignatureVerificationInfo> = fields
            .iter()
            .map(|field| self.verify_field(doc.data(), field, dss.as_ref(), time))
            .collect();
        promote_archived(&mut signatures);

        let result = VerificationResult::from_signatures(signatures);
        log::info!("{}", result.summary);
        Ok(result)
    }

    fn verify_field(
        &self,
        data: &[u8],
        field: &FieldInfo,
        dss: Option<&DocumentSecurityStore>,
        time: DateTime<Utc>,
    ) -> SignatureVerificationInfo {
        let mut info = SignatureVerificationInfo {
            field_name: field.name.clone(),
            ..SignatureVerificationInfo::default()
        };
        let Some(dict) = field.signature_dict() else {
            info.errors.push("field carries no signature dictionary".to_string());
            return finish(info);
        };

        info.signer_name = text_entry(dict, "Name");
        info.reason = text_entry(dict, "Reason");
        info.location = text_entry(dict, "Location");
        info.contact_info = text_entry(dict, "ContactInfo");
        info.signing_time = text_entry(dict, "M").and_then(|m| parse_pdf_date(&m));
        info.sub_filter = dict.get("SubFilter").and_then(|o| o.as_name()).map(str::to_string);
        info.is_document_timestamp = dict.get("Type").and_then(|o| o.as_name()) == Some("DocTimeStamp")
            || info.sub_filter.as_deref() == Some(SignatureSubFilter::Rfc3161.as_pdf_name());

        let byte_range = match read_byte_range(dict) {
            Ok(br) => br,
            Err(e) => {
                info.errors.push(e.to_string());
                return finish(info);
            },
        };
        info.byte_range = byte_range.to_vec();
        if let Err(e) = ByteRangeCalculator::validate_byte_range(&byte_range, data) {
            info.errors.push(e.to_string());
            return finish(info);
        }
        info.covers_whole_document = ByteRangeCalculator::covers_whole_document(&byte_range, data.len());
        if !info.covers_whole_document {
            info.warnings
                .push("document has been modified after this signature".to_string());
        }

        let Some(contents) = dict.get("Contents").and_then(|o| o.as_string()) else {
            info.errors.push("signature dictionary has no /Contents".to_string());
            return finish(info);
        };
        let (first, second) = match ByteRangeCalculator::signed_slices(data, &byte_range) {
            Ok(slices) => slices,
            Err(e) => {
                info.errors.push(e.to_string());
                return finish(info);
            },
        };

        if info.is_document_timestamp {
            self.check_document_timestamp(&mut info, contents, &[first, second], time);
        } else {
            self.check_signature(&mut info, contents, &[first, second], dss, time);
        }
        finish(info)
    }

    fn check_signature(
        &self,
        info: &mut SignatureVerificationInfo,
        contents: &[u8],
        signed: &[&[u8]],
        dss: Option<&DocumentSecurityStore>,
        time: DateTime<Utc>,
    ) {
        let container = match SignedContainer::from_der(contents) {
            Ok(container) => container,
            Err(e) => {
                info.errors.push(format!("unreadable signature container: {}", e));
                return;
            },
        };
        match container.verify_detached(signed) {
            Ok(()) => info.integrity_valid = true,
            Err(e) => info.errors.push(format!("integrity check failed: {}", e)),
        }

        let certificates = container.certificates();
        info.chain_length = certificates.len();
        let signer = container.signer_certificate();
        match &signer {
            Some(cert) => {
                info.certificate = certificate_info(cert, time, &mut info.warnings);
                if info.signer_name.is_none() {
                    info.signer_name = info.certificate.as_ref().and_then(|c| c.common_name.clone());
                }
                info.chain_trusted = self.chain_trusted(cert, &certificates);
                if !info.chain_trusted {
                    info.warnings.push("certificate chain is not trusted".to_string());
                }
            },
            None => info.errors.push("signer certificate is not embedded".to_string()),
        }

        if let Some(token) = container.unsigned_attribute(oid::ID_AA_SIGNATURE_TIME_STAMP_TOKEN) {
            info.has_timestamp = true;
            info.timestamp = signature_timestamp(&container, &token, &mut info.warnings);
        }

        if let Some(archival) = container
            .signed_attribute(oid::ADBE_REVOCATION_INFO_ARCHIVAL)
            .and_then(|any| any.to_der().ok())
            .and_then(|der| RevocationInfoArchival::from_der(&der).ok())
        {
            info.has_ocsp |= !archival.ocsp_responses().is_empty();
            info.has_crl |= !archival.crls().is_empty();
        }
        info.has_crl |= !container.crls().is_empty();
        // The DSS is shared by every signature; only evidence about this signer counts.
        if let (Some(dss), Some(cert)) = (dss, &signer) {
            info.has_ocsp |= dss.ocsps.iter().any(|der| revocation::ocsp_covers(der, cert));
            info.has_crl |= dss.crls.iter().any(|der| revocation::crl_covers(der, cert));
        }

        info.detected_level = Some(match (info.has_timestamp, info.has_ocsp || info.has_crl) {
            (true, true) => SignatureLevel::LT,
            (true, false) => SignatureLevel::T,
            (false, _) => SignatureLevel::B,
        });
    }

    fn check_document_timestamp(
        &self,
        info: &mut SignatureVerificationInfo,
        contents: &[u8],
        signed: &[&[u8]],
        time: DateTime<Utc>,
    ) {
        info.has_timestamp = true;
        let token = match TimestampToken::from_der(contents) {
            Ok(token) => token,
            Err(e) => {
                info.errors.push(format!("unreadable timestamp token: {}", e));
                return;
            },
        };
        match token.hash_algorithm() {
            Some(hash) => match token.verify(&hash.digest_parts(signed)) {
                Ok(()) => info.integrity_valid = true,
                Err(e) => info.errors.push(format!("document timestamp invalid: {}", e)),
            },
            None => info
                .errors
                .push("document timestamp uses an unsupported digest".to_string()),
        }

        let certificates = token.container().certificates();
        info.chain_length = certificates.len();
        if let Some(cert) = token.signer_certificate() {
            info.certificate = certificate_info(&cert, time, &mut info.warnings);
            info.chain_trusted = self.chain_trusted(&cert, &certificates);
        }
        if info.signer_name.is_none() {
            info.signer_name = token.tsa_name();
        }
        info.timestamp = Some(TimestampInfo {
            time: token.gen_time(),
            valid: info.integrity_valid,
            tsa_name: token.tsa_name(),
            hash_algorithm: token.hash_algorithm(),
        });
    }

    /// Path validation against the anchors when configured; otherwise any
    /// chain beyond the signer's own certificate counts.
    fn chain_trusted(&self, certificate: &Certificate, certificates: &[Certificate]) -> bool {
        match &self.trust {
            Some(trust) if !trust.is_empty() => trust.trusted_path_len(certificate, certificates).is_some(),
            _ => certificates.len() > 1,
        }
    }
}

fn finish(mut info: SignatureVerificationInfo) -> SignatureVerificationInfo {
    info.is_valid = info.integrity_valid && info.errors.is_empty();
    if !info.is_valid {
        log::warn!("signature '{}' is invalid: {}", info.field_name, info.errors.join("; "));
    }
    info
}

/// Report LT signatures as LTA when a valid document timestamp written later
/// covers all of their bytes.
fn promote_archived(signatures: &mut [SignatureVerificationInfo]) {
    let archive_starts: Vec<i64> = signatures
        .iter()
        .filter(|s| s.is_document_timestamp && s.is_valid)
        .filter_map(|s| s.byte_range.get(1).copied())
        .collect();
    for sig in signatures
        .iter_mut()
        .filter(|s| !s.is_document_timestamp && s.detected_level == Some(SignatureLevel::LT))
    {
        let covered_end = match sig.byte_range.as_slice() {
            [_, _, start, len] => start + len,
            _ => continue,
        };
        if archive_starts.iter().any(|gap| *gap >= covered_end) {
            sig.detected_level = Some(SignatureLevel::LTA);
        }
    }
}

fn signature_timestamp(
    container: &SignedContainer,
    token: &Any,
    warnings: &mut Vec<String>,
) -> Option<TimestampInfo> {
    let token = match token
        .to_der()
        .map_err(|e| Error::crypto("timestamp token", e))
        .and_then(|der| TimestampToken::from_der(&der))
    {
        Ok(token) => token,
        Err(e) => {
            warnings.push(format!("unreadable signature timestamp: {}", e));
            return None;
        },
    };

    let checked = match (token.hash_algorithm(), container.signature_value()) {
        (Some(hash), Ok(value)) => token.verify(&hash.digest(value)),
        (None, _) => Err(Error::Cryptographic("unsupported timestamp digest".to_string())),
        (_, Err(e)) => Err(e),
    };
    let valid = match checked {
        Ok(()) => true,
        Err(e) => {
            log::warn!("signature timestamp rejected: {}", e);
            warnings.push(format!("signature timestamp invalid: {}", e));
            false
        },
    };
    Some(TimestampInfo {
        time: token.gen_time(),
        valid,
        tsa_name: token.tsa_name(),
        hash_algorithm: token.hash_algorithm(),
    })
}

fn certificate_info(
    certificate: &Certificate,
    time: DateTime<Utc>,
    warnings: &mut Vec<String>,
) -> Option<CertificateInfo> {
    let summary = match CertificateSummary::of(certificate) {
        Ok(summary) => summary,
        Err(e) => {
            warnings.push(e.to_string());
            return None;
        },
    };
    let status = if summary.is_valid_at(time) {
        CertificateStatus::Valid
    } else if time < summary.not_before {
        warnings.push(format!("certificate not valid before {}", summary.not_before.to_rfc3339()));
        CertificateStatus::NotYetValid
    } else {
        warnings.push(format!("certificate expired on {}", summary.not_after.to_rfc3339()));
        CertificateStatus::Expired
    };
    Some(CertificateInfo {
        common_name: summary.common_name,
        organization: summary.organization,
        serial: summary.serial_hex,
        subject: summary.subject,
        issuer: summary.issuer,
        not_before: summary.not_before,
        not_after: summary.not_after,
        status,
    })
}

fn read_byte_range(dict: &Dict) -> Result<[i64; 4]> {
    let values = dict
        .get("ByteRange")
        .and_then(|o| o.as_array())
        .ok_or_else(|| Error::Cryptographic("signature dictionary has no /ByteRange".to_string()))?
        .iter()
        .map(Object::as_integer)
        .collect::<Option<Vec<i64>>>()
        .ok_or_else(|| Error::Cryptographic("/ByteRange holds non-integer entries".to_string()))?;
    <[i64; 4]>::try_from(values)
        .map_err(|v| Error::Cryptographic(format!("/ByteRange has {} entries instead of 4", v.len())))
}

fn text_entry(dict: &Dict, key: &str) -> Option<String> {
    dict.get(key).and_then(|o| o.as_text())
}

/// Parse a PDF date string (`D:YYYYMMDDHHmmSSOHH'mm'`). Every part after the
/// year is optional; a missing offset means UTC.
pub fn parse_pdf_date(text: &str) -> Option<DateTime<Utc>> {
    let s = text.strip_prefix("D:").unwrap_or(text);
    let digits = s.bytes().take_while(u8::is_ascii_digit).count();
    if digits < 4 {
        return None;
    }
    let part = |start: usize, default: u32| -> Option<u32> {
        if digits >= start + 2 {
            s.get(start..start + 2)?.parse().ok()
        } else {
            Some(default)
        }
    };

    let year: i32 = s.get(0..4)?.parse().ok()?;
    let local = NaiveDate::from_ymd_opt(year, part(4, 1)?, part(6, 1)?)?.and_hms_opt(
        part(8, 0)?,
        part(10, 0)?,
        part(12, 0)?,
    )?;

    let rest = &s[digits..];
    let offset_minutes = match rest.chars().next() {
        Some(sign @ ('+' | '-')) => {
            let tz: String = rest[1..].chars().filter(char::is_ascii_digit).collect();
            let hours: i64 = tz.get(0..2)?.parse().ok()?;
            let minutes: i64 = tz.get(2..4).and_then(|m| m.parse().ok()).unwrap_or(0);
            let total = hours * 60 + minutes;
            if sign == '-' {
                -total
            } else {
                total
            }
        },
        _ => 0,
    };
    Some(Utc.from_utc_datetime(&local) - Duration::minutes(offset_minutes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signatures::certificate::SigningCertificate;
    use crate::signatures::signer::PdfSigner;
    use crate::signatures::transport::{HttpRequest, HttpResponse, Transport};
    use crate::signatures::types::SignOptions;
    use std::sync::Arc;

    const RSA_CERT: &str = include_str!("../../tests/fixtures/signer_rsa.pem");
    const RSA_KEY: &str = include_str!("../../tests/fixtures/signer_rsa.key");

    struct NoNetwork;

    impl Transport for NoNetwork {
        fn execute(&self, request: &HttpRequest) -> Result<HttpResponse> {
            Err(Error::Network {
                url: request.url.clone(),
                status: None,
                message: "offline".to_string(),
            })
        }
    }

    fn unsigned_pdf() -> Vec<u8> {
        std::fs::read(concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/simple.pdf")).unwrap()
    }

    fn signed_pdf() -> Vec<u8> {
        let cert = SigningCertificate::from_pem(RSA_CERT, RSA_KEY).unwrap();
        PdfSigner::with_transport(Arc::new(NoNetwork))
            .sign(unsigned_pdf(), cert, &SignOptions::default())
            .unwrap()
            .signed_bytes
    }

    fn at_2027() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2027, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_parse_pdf_date() {
        let t = parse_pdf_date("D:20270304050607+00'00'").unwrap();
        assert_eq!(t, Utc.with_ymd_and_hms(2027, 3, 4, 5, 6, 7).unwrap());

        let t = parse_pdf_date("D:20270304050607+02'30'").unwrap();
        assert_eq!(t, Utc.with_ymd_and_hms(2027, 3, 4, 2, 36, 7).unwrap());

        let t = parse_pdf_date("D:20270304050607-05'00").unwrap();
        assert_eq!(t, Utc.with_ymd_and_hms(2027, 3, 4, 10, 6, 7).unwrap());

        assert_eq!(parse_pdf_date("D:2027").unwrap(), Utc.with_ymd_and_hms(2027, 1, 1, 0, 0, 0).unwrap());
        assert!(parse_pdf_date("D:27").is_none());
        assert!(parse_pdf_date("D:20271340").is_none());
    }

    #[test]
    fn test_unsigned_document_is_not_valid() {
        let result = SignatureVerifier::new().verify(&unsigned_pdf()).unwrap();
        assert!(result.signatures.is_empty());
        assert!(!result.is_valid);
        assert_eq!(result.summary, "Document contains no signatures");
    }

    #[test]
    fn test_self_signed_level_b() {
        let result = SignatureVerifier::new()
            .with_verification_time(at_2027())
            .verify(&signed_pdf())
            .unwrap();
        assert!(result.is_valid, "{:?}", result);
        let sig = &result.signatures[0];
        assert_eq!(sig.detected_level, Some(SignatureLevel::B));
        assert!(!sig.has_timestamp);
        assert_eq!(sig.chain_length, 1);
        assert!(!sig.chain_trusted);
        assert_eq!(sig.certificate.as_ref().unwrap().status, CertificateStatus::Valid);
        assert_eq!(sig.signer_name.as_deref(), Some("Test Signer"));
    }

    #[test]
    fn test_trust_anchor_makes_chain_trusted() {
        let anchor = SigningCertificate::from_pem(RSA_CERT, RSA_KEY).unwrap().certificate().clone();
        let result = SignatureVerifier::new()
            .with_trust_anchors(vec![anchor])
            .with_verification_time(at_2027())
            .verify(&signed_pdf())
            .unwrap();
        assert!(result.signatures[0].chain_trusted);
        assert_eq!(result.signatures[0].status(), super::super::types::VerificationStatus::Valid);
    }

    #[test]
    fn test_expired_certificate_is_a_warning() {
        let late = Utc.with_ymd_and_hms(2100, 1, 1, 0, 0, 0).unwrap();
        let result = SignatureVerifier::new()
            .with_verification_time(late)
            .verify(&signed_pdf())
            .unwrap();
        let sig = &result.signatures[0];
        assert!(sig.is_valid);
        assert_eq!(sig.certificate.as_ref().unwrap().status, CertificateStatus::Expired);
        assert!(sig.warnings.iter().any(|w| w.contains("expired")));
    }

    #[test]
    fn test_tampering_invalidates_integrity() {
        let mut signed = signed_pdf();
        // A byte of the binary comment after the header.
        signed[11] ^= 0x01;
        let result = SignatureVerifier::new().verify(&signed).unwrap();
        assert_eq!(result.signatures.len(), 1);
        assert!(!result.signatures[0].integrity_valid);
        assert!(!result.is_valid);
    }

    #[test]
    fn test_promote_archived() {
        let sig = SignatureVerificationInfo {
            byte_range: vec![0, 100, 200, 50],
            detected_level: Some(SignatureLevel::LT),
            ..Default::default()
        };
        let ts = SignatureVerificationInfo {
            byte_range: vec![0, 400, 500, 20],
            is_document_timestamp: true,
            is_valid: true,
            ..Default::default()
        };
        let mut list = vec![sig.clone(), ts.clone()];
        promote_archived(&mut list);
        assert_eq!(list[0].detected_level, Some(SignatureLevel::LTA));

        let mut invalid = vec![sig, SignatureVerificationInfo { is_valid: false, ..ts }];
        promote_archived(&mut invalid);
        assert_eq!(invalid[0].detected_level, Some(SignatureLevel::LT));
    }
}
