//! RFC 3161 timestamp client behavior against an in-process TSA.

mod common;

use common::{fixture, rsa_signer, signer_with, tsa_config, FakeServices, TsaBehavior, TSA_URL};
use pdf_pades::signatures::timestamp::TIMESTAMP_QUERY;
use pdf_pades::signatures::{
    HashAlgorithm, HttpRequest, HttpResponse, Method, PdfSigner, SignOptions, SignatureLevel, TimestampClient,
    Transport, TsaConfig,
};
use pdf_pades::{Error, ErrorKind, Result};
use std::sync::{Arc, Mutex};

fn client(services: &Arc<FakeServices>) -> TimestampClient {
    TimestampClient::new(services.clone())
}

/// Records the last request and answers with a fixed status.
struct Recorder {
    status: u16,
    last: Mutex<Option<HttpRequest>>,
}

impl Transport for Recorder {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse> {
        *self.last.lock().unwrap() = Some(request.clone());
        Ok(HttpResponse {
            status: self.status,
            body: b"service unavailable".to_vec(),
        })
    }
}

#[test]
fn test_granted_token_matches_request() {
    let services = FakeServices::new(TsaBehavior::Grant);
    let digest = HashAlgorithm::Sha256.digest(b"document bytes");

    let token = client(&services)
        .request(&digest, HashAlgorithm::Sha256, &tsa_config())
        .unwrap();

    assert_eq!(token.message_imprint(), digest.as_slice());
    assert_eq!(token.hash_algorithm(), Some(HashAlgorithm::Sha256));
    assert!(token.nonce().is_some());
    assert_eq!(token.tsa_name().as_deref(), Some("Test TSA"));
    token.verify(&digest).unwrap();

    let der = token.as_der().to_vec();
    assert_eq!(TimestampClient::extract_time(&der).unwrap(), token.gen_time());
    assert!(client(&services).verify(&der, &digest));
    assert!(!client(&services).verify(&der, &HashAlgorithm::Sha256.digest(b"other bytes")));
    assert_eq!(services.timestamp_requests(), 1);
}

#[test]
fn test_timestamp_data_hashes_with_configured_algorithm() {
    let services = FakeServices::new(TsaBehavior::Grant);
    let tsa = tsa_config().with_hash_algorithm(HashAlgorithm::Sha512);

    let token = client(&services).timestamp_data(b"payload", &tsa).unwrap();
    assert_eq!(token.hash_algorithm(), Some(HashAlgorithm::Sha512));
    assert_eq!(token.message_imprint(), HashAlgorithm::Sha512.digest(b"payload").as_slice());
}

#[test]
fn test_nonce_mismatch_is_protocol_error_without_retry() {
    let services = FakeServices::new(TsaBehavior::WrongNonce);
    let err = client(&services)
        .request(&[1u8; 32], HashAlgorithm::Sha256, &tsa_config())
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Protocol);
    assert!(err.to_string().contains("nonce mismatch"));
    assert_eq!(services.timestamp_requests(), 1);
}

#[test]
fn test_imprint_mismatch_is_protocol_error_without_retry() {
    let services = FakeServices::new(TsaBehavior::WrongImprint);
    let err = client(&services)
        .request(&[1u8; 32], HashAlgorithm::Sha256, &tsa_config())
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Protocol);
    assert!(err.to_string().contains("hash mismatch"));
    assert_eq!(services.timestamp_requests(), 1);
}

#[test]
fn test_rejection_carries_status_text() {
    let services = FakeServices::new(TsaBehavior::Reject);
    let err = client(&services)
        .request(&[1u8; 32], HashAlgorithm::Sha256, &tsa_config())
        .unwrap_err();

    match &err {
        Error::TsaRejected { status, text } => {
            assert_eq!(*status, 2);
            assert!(text.contains("rejected by policy"));
        },
        other => panic!("unexpected error {:?}", other),
    }
    assert_eq!(err.kind(), ErrorKind::Protocol);
}

#[test]
fn test_unreachable_tsa_is_network_error() {
    let services = FakeServices::new(TsaBehavior::Unreachable);
    let err = client(&services)
        .request(&[1u8; 32], HashAlgorithm::Sha256, &tsa_config())
        .unwrap_err();
    assert!(err.is_network());
    assert_eq!(services.timestamp_requests(), 1);
}

#[test]
fn test_http_error_status_and_request_shape() {
    let recorder = Arc::new(Recorder {
        status: 503,
        last: Mutex::new(None),
    });
    let tsa = tsa_config().with_credentials("alice", "secret");

    let err = TimestampClient::new(recorder.clone())
        .request(&[7u8; 32], HashAlgorithm::Sha256, &tsa)
        .unwrap_err();
    match err {
        Error::Network { url, status, .. } => {
            assert_eq!(url, TSA_URL);
            assert_eq!(status, Some(503));
        },
        other => panic!("unexpected error {:?}", other),
    }

    let request = recorder.last.lock().unwrap().take().unwrap();
    assert_eq!(request.method, Method::Post);
    assert_eq!(request.content_type, Some(TIMESTAMP_QUERY));
    assert_eq!(request.basic_auth, Some(("alice".to_string(), "secret".to_string())));
    assert_eq!(request.timeout.as_secs(), 5);
}

#[test]
fn test_invalid_requests_never_reach_the_tsa() {
    let services = FakeServices::new(TsaBehavior::Grant);

    // Digest length does not match the algorithm.
    let err = client(&services)
        .request(&[1u8; 20], HashAlgorithm::Sha256, &tsa_config())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);

    let err = client(&services)
        .request(&[1u8; 32], HashAlgorithm::Sha256, &TsaConfig::new("ftp://tsa.test"))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);

    assert_eq!(services.timestamp_requests(), 0);
}

#[test]
fn test_level_t_without_tsa_is_rejected_before_any_request() {
    let services = FakeServices::new(TsaBehavior::Grant);
    let err = signer_with(&services)
        .sign(fixture("simple.pdf"), rsa_signer(), &SignOptions::new(SignatureLevel::T))
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert_eq!(services.timestamp_requests(), 0);
}

#[test]
fn test_rejected_timestamp_fails_signing() {
    let services = FakeServices::new(TsaBehavior::Reject);
    let options = SignOptions::new(SignatureLevel::T).with_tsa(tsa_config());

    let err = PdfSigner::with_transport(services.clone())
        .sign(fixture("simple.pdf"), rsa_signer(), &options)
        .unwrap_err();
    assert!(matches!(err, Error::TsaRejected { .. }));
    assert_eq!(services.timestamp_requests(), 1);
}
