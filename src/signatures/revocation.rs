//! Revocation evidence for long-term signatures.
//!
//! OCSP responses are requested from the certificate's AIA responder and CRLs
//! are fetched from its distribution points. Both are stored as DER exactly as
//! received.

use crate::error::{Error, Result};
use const_oid::ObjectIdentifier;
use der::asn1::{BitString, OctetString};
use der::{Any, Decode, Encode, Sequence, Tag, Tagged};
use sha1::{Digest, Sha1};
use spki::AlgorithmIdentifierOwned;
use std::sync::Arc;
use std::time::Duration;
use x509_cert::crl::CertificateList;
use x509_cert::ext::pkix::name::{DistributionPointName, GeneralName};
use x509_cert::ext::pkix::{AuthorityInfoAccessSyntax, CrlDistributionPoints};
use x509_cert::serial_number::SerialNumber;
use x509_cert::Certificate;

use super::oid;
use super::transport::{HttpRequest, HttpTransport, Transport};
use super::types::HashAlgorithm;

const ID_PE_AUTHORITY_INFO_ACCESS: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.6.1.5.5.7.1.1");
const ID_CE_CRL_DISTRIBUTION_POINTS: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.29.31");
const ID_AD_OCSP: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.6.1.5.5.7.48.1");

pub const OCSP_REQUEST: &str = "application/ocsp-request";
pub const OCSP_RESPONSE: &str = "application/ocsp-response";

/// `CertID` of an OCSP request, hashed with SHA-1.
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct CertId {
    pub hash_algorithm: AlgorithmIdentifierOwned,
    pub issuer_name_hash: OctetString,
    pub issuer_key_hash: OctetString,
    pub serial_number: SerialNumber,
}

#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct Request {
    pub req_cert: CertId,
}

#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct TbsRequest {
    pub request_list: Vec<Request>,
}

/// Unsigned `OCSPRequest` for a single certificate.
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct OcspRequest {
    pub tbs_request: TbsRequest,
}

#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct ResponseBytes {
    pub response_type: ObjectIdentifier,
    pub response: OctetString,
}

/// Outer `OCSPResponse`. The basic response stays opaque.
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct OcspResponse {
    pub response_status: Any,
    #[asn1(context_specific = "0", tag_mode = "EXPLICIT", optional = "true")]
    pub response_bytes: Option<ResponseBytes>,
}

/// One entry of `ResponseData.responses`. Status and times stay opaque.
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct SingleResponse {
    pub cert_id: CertId,
    pub cert_status: Any,
    pub this_update: Any,
    #[asn1(context_specific = "0", tag_mode = "EXPLICIT", optional = "true")]
    pub next_update: Option<Any>,
    #[asn1(context_specific = "1", tag_mode = "EXPLICIT", optional = "true")]
    pub single_extensions: Option<Any>,
}

#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct ResponseData {
    #[asn1(context_specific = "0", tag_mode = "EXPLICIT", optional = "true")]
    pub version: Option<Any>,
    pub responder_id: Any,
    pub produced_at: Any,
    pub responses: Vec<SingleResponse>,
    #[asn1(context_specific = "1", tag_mode = "EXPLICIT", optional = "true")]
    pub response_extensions: Option<Any>,
}

#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct BasicOcspResponse {
    pub tbs_response_data: ResponseData,
    pub signature_algorithm: AlgorithmIdentifierOwned,
    pub signature: BitString,
    #[asn1(context_specific = "0", tag_mode = "EXPLICIT", optional = "true")]
    pub certs: Option<Any>,
}

impl OcspRequest {
    pub fn for_certificate(certificate: &Certificate, issuer: &Certificate) -> Result<Self> {
        let issuer_name = issuer
            .tbs_certificate
            .subject
            .to_der()
            .map_err(|e| Error::crypto("failed to encode issuer name", e))?;
        let issuer_key = issuer.tbs_certificate.subject_public_key_info.subject_public_key.raw_bytes();

        let octets = |bytes: Vec<u8>| OctetString::new(bytes).map_err(|e| Error::crypto("OCSP CertID", e));
        Ok(Self {
            tbs_request: TbsRequest {
                request_list: vec![Request {
                    req_cert: CertId {
                        hash_algorithm: AlgorithmIdentifierOwned {
                            oid: oid::ID_SHA1,
                            parameters: Some(Any::null()),
                        },
                        issuer_name_hash: octets(Sha1::digest(&issuer_name).to_vec())?,
                        issuer_key_hash: octets(Sha1::digest(issuer_key).to_vec())?,
                        serial_number: certificate.tbs_certificate.serial_number.clone(),
                    },
                }],
            },
        })
    }
}

/// Accept an OCSP response only when it is `successful` and carries a basic response.
pub fn check_ocsp_response(der: &[u8]) -> Result<()> {
    let response = OcspResponse::from_der(der).map_err(|e| Error::protocol("invalid OCSP response", e))?;
    if response.response_status.tag() != Tag::Enumerated {
        return Err(Error::Protocol("OCSP responseStatus is not ENUMERATED".to_string()));
    }
    if response.response_status.value() != [0] {
        return Err(Error::Protocol(format!(
            "OCSP responder answered status {:?}",
            response.response_status.value()
        )));
    }
    match response.response_bytes {
        Some(bytes) if bytes.response_type == oid::OCSP_BASIC => Ok(()),
        Some(bytes) => Err(Error::Protocol(format!("unsupported OCSP response type {}", bytes.response_type))),
        None => Err(Error::Protocol("OCSP response carries no responseBytes".to_string())),
    }
}

/// True when the OCSP response carries a status for `certificate`, i.e. one
/// of its CertIDs names the certificate's serial and issuer.
pub fn ocsp_covers(der: &[u8], certificate: &Certificate) -> bool {
    let Some(basic) = OcspResponse::from_der(der)
        .ok()
        .and_then(|response| response.response_bytes)
        .filter(|bytes| bytes.response_type == oid::OCSP_BASIC)
        .and_then(|bytes| BasicOcspResponse::from_der(bytes.response.as_bytes()).ok())
    else {
        return false;
    };
    let Ok(issuer_name) = certificate.tbs_certificate.issuer.to_der() else {
        return false;
    };

    basic.tbs_response_data.responses.iter().any(|single| {
        let id = &single.cert_id;
        id.serial_number == certificate.tbs_certificate.serial_number
            && cert_id_digest(&id.hash_algorithm.oid, &issuer_name)
                .map_or(false, |digest| digest == id.issuer_name_hash.as_bytes())
    })
}

/// True when the CRL was issued by the issuer of `certificate`.
pub fn crl_covers(der: &[u8], certificate: &Certificate) -> bool {
    CertificateList::from_der(der)
        .map(|crl| crl.tbs_cert_list.issuer == certificate.tbs_certificate.issuer)
        .unwrap_or(false)
}

fn cert_id_digest(algorithm: &ObjectIdentifier, data: &[u8]) -> Option<Vec<u8>> {
    if *algorithm == oid::ID_SHA1 {
        return Some(Sha1::digest(data).to_vec());
    }
    HashAlgorithm::from_oid(algorithm).map(|hash| hash.digest(data))
}

/// OCSP responder URLs from the AIA extension.
pub fn ocsp_urls(certificate: &Certificate) -> Vec<String> {
    let Some(ext) = find_extension(certificate, ID_PE_AUTHORITY_INFO_ACCESS) else {
        return Vec::new();
    };
    let Ok(aia) = AuthorityInfoAccessSyntax::from_der(ext) else {
        log::warn!("ignoring malformed AuthorityInfoAccess extension");
        return Vec::new();
    };
    aia.0
        .iter()
        .filter(|desc| desc.access_method == ID_AD_OCSP)
        .filter_map(|desc| uri(&desc.access_location))
        .collect()
}

/// HTTP(S) CRL distribution point URLs.
pub fn crl_urls(certificate: &Certificate) -> Vec<String> {
    let Some(ext) = find_extension(certificate, ID_CE_CRL_DISTRIBUTION_POINTS) else {
        return Vec::new();
    };
    let Ok(points) = CrlDistributionPoints::from_der(ext) else {
        log::warn!("ignoring malformed CRLDistributionPoints extension");
        return Vec::new();
    };
    points
        .0
        .iter()
        .filter_map(|dp| match &dp.distribution_point {
            Some(DistributionPointName::FullName(names)) => Some(names),
            _ => None,
        })
        .flatten()
        .filter_map(uri)
        .filter(|url| url.starts_with("http://") || url.starts_with("https://"))
        .collect()
}

fn find_extension(certificate: &Certificate, id: ObjectIdentifier) -> Option<&[u8]> {
    certificate
        .tbs_certificate
        .extensions
        .iter()
        .flatten()
        .find(|ext| ext.extn_id == id)
        .map(|ext| ext.extn_value.as_bytes())
}

fn uri(name: &GeneralName) -> Option<String> {
    match name {
        GeneralName::UniformResourceIdentifier(uri) => Some(uri.to_string()),
        _ => None,
    }
}

/// Revocation evidence collected for one certificate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RevocationData {
    pub ocsp_responses: Vec<Vec<u8>>,
    pub crls: Vec<Vec<u8>>,
}

impl RevocationData {
    pub fn is_empty(&self) -> bool {
        self.ocsp_responses.is_empty() && self.crls.is_empty()
    }

    /// Append `other`, skipping blobs already present.
    pub fn merge(&mut self, other: RevocationData) {
        for ocsp in other.ocsp_responses {
            if !self.ocsp_responses.contains(&ocsp) {
                self.ocsp_responses.push(ocsp);
            }
        }
        for crl in other.crls {
            if !self.crls.contains(&crl) {
                self.crls.push(crl);
            }
        }
    }
}

/// Source of OCSP responses and CRLs.
pub trait RevocationSource: Send + Sync {
    /// OCSP response for `certificate`, or `None` when it names no responder.
    fn ocsp_response(&self, certificate: &Certificate, issuer: &Certificate) -> Result<Option<Vec<u8>>>;

    /// CRLs covering `certificate`.
    fn crls(&self, certificate: &Certificate) -> Result<Vec<Vec<u8>>>;
}

/// Collect the requested kinds of evidence for `certificate`.
///
/// Fetch failures propagate. Finding nothing at all is a certificate error,
/// since the resulting signature could not be validated offline.
pub fn collect_revocation_data(
    source: &dyn RevocationSource,
    certificate: &Certificate,
    issuer: Option<&Certificate>,
    want_ocsp: bool,
    want_crl: bool,
) -> Result<RevocationData> {
    let mut data = RevocationData::default();

    if want_ocsp {
        match issuer {
            Some(issuer) => {
                if let Some(response) = source.ocsp_response(certificate, issuer)? {
                    data.ocsp_responses.push(response);
                }
            },
            None => log::warn!(
                "issuer of '{}' not available, skipping OCSP",
                certificate.tbs_certificate.subject
            ),
        }
    }
    if want_crl {
        data.crls = source.crls(certificate)?;
    }

    if data.is_empty() {
        return Err(Error::Certificate(format!(
            "no revocation data available for '{}'",
            certificate.tbs_certificate.subject
        )));
    }
    log::info!(
        "collected {} OCSP response(s) and {} CRL(s)",
        data.ocsp_responses.len(),
        data.crls.len()
    );
    Ok(data)
}

/// Fetches evidence over HTTP from the URLs named in the certificate.
#[derive(Clone)]
pub struct HttpRevocationSource {
    transport: Arc<dyn Transport>,
    timeout: Duration,
}

impl std::fmt::Debug for HttpRevocationSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpRevocationSource")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl HttpRevocationSource {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            timeout: Duration::from_secs(30),
        }
    }

    pub fn http() -> Result<Self> {
        Ok(Self::new(Arc::new(HttpTransport::new()?)))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl RevocationSource for HttpRevocationSource {
    fn ocsp_response(&self, certificate: &Certificate, issuer: &Certificate) -> Result<Option<Vec<u8>>> {
        let Some(url) = ocsp_urls(certificate).into_iter().next() else {
            return Ok(None);
        };
        let body = OcspRequest::for_certificate(certificate, issuer)?
            .to_der()
            .map_err(|e| Error::crypto("failed to encode OCSP request", e))?;
        let request = HttpRequest::post(&url, OCSP_REQUEST, body, self.timeout).with_accept(OCSP_RESPONSE);

        log::debug!("requesting OCSP status from {}", url);
        let response = self.transport.execute(&request)?.into_success(&url)?;
        check_ocsp_response(&response)?;
        Ok(Some(response))
    }

    fn crls(&self, certificate: &Certificate) -> Result<Vec<Vec<u8>>> {
        let mut crls = Vec::new();
        for url in crl_urls(certificate) {
            log::debug!("downloading CRL from {}", url);
            let body = self
                .transport
                .execute(&HttpRequest::get(&url, self.timeout))?
                .into_success(&url)?;
            let crl = decode_crl(&body).map_err(|e| match e {
                Error::Cryptographic(msg) => Error::Protocol(format!("{}: {}", url, msg)),
                other => other,
            })?;
            crls.push(crl);
        }
        Ok(crls)
    }
}

/// Normalize a downloaded CRL to DER; PEM is accepted as well.
fn decode_crl(body: &[u8]) -> Result<Vec<u8>> {
    let der = if body.starts_with(b"-----BEGIN") {
        let text = std::str::from_utf8(body).map_err(|e| Error::crypto("CRL is not valid PEM", e))?;
        der::pem::decode_vec(text.as_bytes())
            .map_err(|e| Error::crypto("CRL is not valid PEM", e))?
            .1
    } else {
        body.to_vec()
    };
    x509_cert::crl::CertificateList::from_der(&der).map_err(|e| Error::crypto("invalid CRL", e))?;
    Ok(der)
}

/// Evidence supplied up front, for offline signing.
#[derive(Debug, Clone, Default)]
pub struct StaticRevocationSource {
    data: RevocationData,
}

impl StaticRevocationSource {
    pub fn new(ocsp_responses: Vec<Vec<u8>>, crls: Vec<Vec<u8>>) -> Self {
        Self {
            data: RevocationData { ocsp_responses, crls },
        }
    }
}

impl RevocationSource for StaticRevocationSource {
    fn ocsp_response(&self, _certificate: &Certificate, _issuer: &Certificate) -> Result<Option<Vec<u8>>> {
        Ok(self.data.ocsp_responses.first().cloned())
    }

    fn crls(&self, _certificate: &Certificate) -> Result<Vec<Vec<u8>>> {
        Ok(self.data.crls.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signatures::certificate::parse_certificates;
    use crate::signatures::transport::{HttpResponse, Method};
    use std::sync::Mutex;

    fn cert(pem: &str) -> Certificate {
        parse_certificates(pem.as_bytes()).unwrap().remove(0)
    }

    fn leaf() -> Certificate {
        cert(include_str!("../../tests/fixtures/leaf.pem"))
    }

    fn ca() -> Certificate {
        cert(include_str!("../../tests/fixtures/ca.pem"))
    }

    const CRL: &[u8] = include_bytes!("../../tests/fixtures/ca.crl");
    const OCSP: &[u8] = include_bytes!("../../tests/fixtures/leaf_ocsp.der");

    #[derive(Default)]
    struct Recorder {
        requests: Mutex<Vec<HttpRequest>>,
    }

    impl Transport for Recorder {
        fn execute(&self, request: &HttpRequest) -> Result<HttpResponse> {
            self.requests.lock().unwrap().push(request.clone());
            Ok(match request.method {
                Method::Get => HttpResponse::ok(CRL.to_vec()),
                Method::Post => HttpResponse::ok(OCSP.to_vec()),
            })
        }
    }

    #[test]
    fn test_urls_from_extensions() {
        assert_eq!(ocsp_urls(&leaf()), vec!["http://127.0.0.1:9/ocsp".to_string()]);
        assert_eq!(crl_urls(&leaf()), vec!["http://127.0.0.1:9/ca.crl".to_string()]);
        assert!(ocsp_urls(&ca()).is_empty());
        assert!(crl_urls(&ca()).is_empty());
    }

    #[test]
    fn test_ocsp_request_structure() {
        let request = OcspRequest::for_certificate(&leaf(), &ca()).unwrap();
        let der = request.to_der().unwrap();
        let decoded = OcspRequest::from_der(&der).unwrap();
        let cert_id = &decoded.tbs_request.request_list[0].req_cert;
        assert_eq!(cert_id.serial_number, leaf().tbs_certificate.serial_number);
        assert_eq!(cert_id.issuer_name_hash.as_bytes().len(), 20);
        // SHA-1 of the CA key equals its subject key identifier
        assert_eq!(
            crate::decoders::encode_hex_upper(cert_id.issuer_key_hash.as_bytes()),
            "C7A3108F7CA99463EE1496312B5A0C7F7D0A3F0B"
        );
        assert_eq!(cert_id.hash_algorithm.oid, oid::ID_SHA1);
    }

    #[test]
    fn test_check_ocsp_response() {
        check_ocsp_response(OCSP).unwrap();
        // OCSPResponse { responseStatus = unauthorized (6) }
        let unauthorized = [0x30, 0x03, 0x0A, 0x01, 0x06];
        assert!(matches!(check_ocsp_response(&unauthorized), Err(Error::Protocol(_))));
        assert!(check_ocsp_response(b"junk").is_err());
    }

    #[test]
    fn test_evidence_matches_only_its_certificate() {
        let self_signed = cert(include_str!("../../tests/fixtures/signer_rsa.pem"));

        assert!(ocsp_covers(OCSP, &leaf()));
        assert!(!ocsp_covers(OCSP, &ca()));
        assert!(!ocsp_covers(OCSP, &self_signed));
        assert!(!ocsp_covers(b"junk", &leaf()));

        assert!(crl_covers(CRL, &leaf()));
        assert!(!crl_covers(CRL, &self_signed));
        assert!(!crl_covers(b"junk", &leaf()));
    }

    #[test]
    fn test_http_source_fetches_both() {
        let recorder = Arc::new(Recorder::default());
        let source = HttpRevocationSource::new(recorder.clone());
        let data = collect_revocation_data(&source, &leaf(), Some(&ca()), true, true).unwrap();
        assert_eq!(data.ocsp_responses, vec![OCSP.to_vec()]);
        assert_eq!(data.crls, vec![CRL.to_vec()]);

        let requests = recorder.requests.lock().unwrap();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].content_type, Some(OCSP_REQUEST));
        assert_eq!(requests[1].url, "http://127.0.0.1:9/ca.crl");
    }

    #[test]
    fn test_no_endpoints_is_certificate_error() {
        let source = HttpRevocationSource::new(Arc::new(Recorder::default()));
        let err = collect_revocation_data(&source, &ca(), Some(&ca()), true, true).unwrap_err();
        assert!(matches!(err, Error::Certificate(_)));
    }

    #[test]
    fn test_static_source_and_merge() {
        let source = StaticRevocationSource::new(vec![OCSP.to_vec()], vec![CRL.to_vec()]);
        let mut data = collect_revocation_data(&source, &leaf(), None, true, true).unwrap();
        // no issuer, so OCSP is skipped
        assert!(data.ocsp_responses.is_empty());
        data.merge(RevocationData {
            ocsp_responses: vec![OCSP.to_vec()],
            crls: vec![CRL.to_vec()],
        });
        assert_eq!(data.ocsp_responses.len(), 1);
        assert_eq!(data.crls.len(), 1);
    }

    #[test]
    fn test_decode_crl_rejects_garbage() {
        assert!(decode_crl(CRL).is_ok());
        assert!(decode_crl(b"<html>").is_err());
    }
}
