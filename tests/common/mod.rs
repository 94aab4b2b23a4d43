//! Shared fixtures for the integration tests.
//!
//! `FakeServices` answers timestamp, OCSP and CRL requests in-process so that
//! every signature level can be exercised without a network.

#![allow(dead_code)]

use chrono::{TimeZone, Utc};
use der::asn1::{Int, OctetString};
use der::{Any, Decode, Encode, Tag};
use pdf_pades::signatures::cms::SignedDataBuilder;
use pdf_pades::signatures::oid;
use pdf_pades::signatures::timestamp::{PkiStatusInfo, TimeStampReq, TimeStampResp, TstInfo};
use pdf_pades::signatures::{
    HashAlgorithm, HttpRequest, HttpResponse, PdfSigner, SigningCertificate, Transport, TsaConfig,
};
use pdf_pades::{Error, Result};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use x509_cert::Certificate;

pub const TSA_URL: &str = "http://tsa.test/rfc3161";
pub const P12_PASSWORD: &str = "changeit";

const TSA_POLICY: der::asn1::ObjectIdentifier = der::asn1::ObjectIdentifier::new_unwrap("1.3.6.1.4.1.32473.1.1");

pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(name)
}

pub fn fixture(name: &str) -> Vec<u8> {
    std::fs::read(fixture_path(name)).unwrap_or_else(|e| panic!("fixture {}: {}", name, e))
}

fn fixture_text(name: &str) -> String {
    String::from_utf8(fixture(name)).unwrap()
}

/// Self-signed RSA signer.
pub fn rsa_signer() -> SigningCertificate {
    SigningCertificate::from_pem(&fixture_text("signer_rsa.pem"), &fixture_text("signer_rsa.key")).unwrap()
}

/// Self-signed P-256 signer.
pub fn ec_signer() -> SigningCertificate {
    SigningCertificate::from_pem(&fixture_text("signer_ec.pem"), &fixture_text("signer_ec.key")).unwrap()
}

/// Signer issued by the test root, with OCSP and CRL endpoints.
pub fn chained_signer() -> SigningCertificate {
    SigningCertificate::from_pkcs12(&fixture("leaf_chain.p12"), P12_PASSWORD).unwrap()
}

pub fn root_ca() -> Certificate {
    Certificate::from_der(&pem_to_der(&fixture_text("ca.pem"))).unwrap()
}

fn pem_to_der(text: &str) -> Vec<u8> {
    der::pem::decode_vec(text.as_bytes()).unwrap().1
}

/// A moment inside every fixture certificate's validity period.
pub fn verification_time() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2027, 1, 1, 0, 0, 0).unwrap()
}

pub fn tsa_config() -> TsaConfig {
    TsaConfig::new(TSA_URL).with_timeout(5)
}

/// How the fake TSA answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TsaBehavior {
    Grant,
    WrongNonce,
    WrongImprint,
    Reject,
    Unreachable,
}

/// In-process TSA, OCSP responder and CRL server.
pub struct FakeServices {
    behavior: TsaBehavior,
    tsa: SigningCertificate,
    chain: Vec<Certificate>,
    serial: AtomicUsize,
    timestamp_requests: AtomicUsize,
    revocation_requests: AtomicUsize,
}

impl FakeServices {
    pub fn new(behavior: TsaBehavior) -> Arc<Self> {
        let tsa = SigningCertificate::from_pem(&fixture_text("tsa.pem"), &fixture_text("tsa.key")).unwrap();
        Arc::new(Self {
            behavior,
            tsa,
            chain: vec![root_ca()],
            serial: AtomicUsize::new(1),
            timestamp_requests: AtomicUsize::new(0),
            revocation_requests: AtomicUsize::new(0),
        })
    }

    pub fn timestamp_requests(&self) -> usize {
        self.timestamp_requests.load(Ordering::SeqCst)
    }

    pub fn revocation_requests(&self) -> usize {
        self.revocation_requests.load(Ordering::SeqCst)
    }

    fn timestamp(&self, request: &HttpRequest) -> Result<HttpResponse> {
        let req = TimeStampReq::from_der(&request.body).map_err(|e| Error::Protocol(e.to_string()))?;

        if self.behavior == TsaBehavior::Reject {
            let response = TimeStampResp {
                status: PkiStatusInfo {
                    status: 2,
                    status_string: Some(vec!["request rejected by policy".to_string()]),
                    fail_info: None,
                },
                time_stamp_token: None,
            };
            return Ok(HttpResponse::ok(response.to_der().unwrap()));
        }

        let mut message_imprint = req.message_imprint.clone();
        if self.behavior == TsaBehavior::WrongImprint {
            let len = message_imprint.hashed_message.as_bytes().len();
            message_imprint.hashed_message = OctetString::new(vec![0xAB; len]).unwrap();
        }
        let nonce = match self.behavior {
            TsaBehavior::WrongNonce => Some(Int::new(&[0x01, 0x02, 0x03]).unwrap()),
            _ => req.nonce.clone(),
        };

        let serial = self.serial.fetch_add(1, Ordering::SeqCst) as u8;
        let gen_time = Utc::now().format("%Y%m%d%H%M%SZ").to_string();
        let info = TstInfo {
            version: 1,
            policy: TSA_POLICY,
            message_imprint,
            serial_number: Int::new(&[serial]).unwrap(),
            gen_time: Any::new(Tag::GeneralizedTime, gen_time.as_bytes()).unwrap(),
            accuracy: None,
            ordering: false,
            nonce,
            tsa: None,
            extensions: None,
        };

        let token = SignedDataBuilder::new(self.tsa.key(), self.tsa.certificate(), HashAlgorithm::Sha256)
            .with_chain(&self.chain)
            .with_encapsulated_content(oid::ID_CT_TST_INFO, info.to_der().unwrap())
            .build()?
            .to_der()?;
        let response = TimeStampResp {
            status: PkiStatusInfo {
                status: 0,
                status_string: None,
                fail_info: None,
            },
            time_stamp_token: Some(Any::from_der(&token).unwrap()),
        };
        Ok(HttpResponse::ok(response.to_der().unwrap()))
    }
}

impl Transport for FakeServices {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse> {
        if request.url.ends_with("/ocsp") {
            self.revocation_requests.fetch_add(1, Ordering::SeqCst);
            return Ok(HttpResponse::ok(fixture("leaf_ocsp.der")));
        }
        if request.url.ends_with(".crl") {
            self.revocation_requests.fetch_add(1, Ordering::SeqCst);
            return Ok(HttpResponse::ok(fixture("ca.crl")));
        }

        self.timestamp_requests.fetch_add(1, Ordering::SeqCst);
        if self.behavior == TsaBehavior::Unreachable {
            return Err(Error::Network {
                url: request.url.clone(),
                status: None,
                message: "connection refused".to_string(),
            });
        }
        self.timestamp(request)
    }
}

/// Signer wired to `services` for every outgoing request.
pub fn signer_with(services: &Arc<FakeServices>) -> PdfSigner {
    PdfSigner::with_transport(services.clone())
}
