//! RFC 3161 timestamp client and token parsing.
//!
//! One [`TimestampClient::request`] call is one round-trip: build the
//! `TimeStampReq` with a fresh nonce, POST it, and accept the token only after
//! its status, nonce and message imprint check out. Failed round-trips are
//! never retried here.

use crate::error::{Error, Result};
use chrono::{DateTime, NaiveDateTime, TimeZone, Timelike, Utc};
use const_oid::ObjectIdentifier;
use der::asn1::{BitString, Int, OctetString};
use der::{Any, Decode, Encode, Sequence, Tag, Tagged};
use rand::rngs::OsRng;
use rand::RngCore;
use spki::AlgorithmIdentifierOwned;
use std::sync::Arc;
use std::time::Duration;
use x509_cert::ext::pkix::name::GeneralName;
use x509_cert::ext::pkix::ExtendedKeyUsage;
use x509_cert::ext::Extensions;
use x509_cert::Certificate;

use super::certificate::CertificateSummary;
use super::cms::{first_element, SignedContainer};
use super::oid;
use super::transport::{HttpRequest, HttpTransport, Transport};
use super::types::{HashAlgorithm, TsaConfig};

/// Request media type.
pub const TIMESTAMP_QUERY: &str = "application/timestamp-query";
/// Response media type.
pub const TIMESTAMP_REPLY: &str = "application/timestamp-reply";

const ID_CE_EXT_KEY_USAGE: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.29.37");

fn default_false() -> bool {
    false
}

/// Hash algorithm and digest of the timestamped data.
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct MessageImprint {
    pub hash_algorithm: AlgorithmIdentifierOwned,
    pub hashed_message: OctetString,
}

impl MessageImprint {
    pub fn new(hash_algorithm: HashAlgorithm, digest: &[u8]) -> Result<Self> {
        Ok(Self {
            hash_algorithm: AlgorithmIdentifierOwned {
                oid: hash_algorithm.oid(),
                parameters: None,
            },
            hashed_message: OctetString::new(digest).map_err(|e| Error::crypto("message imprint", e))?,
        })
    }
}

/// `TimeStampReq`. Extensions are never sent.
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct TimeStampReq {
    pub version: u8,
    pub message_imprint: MessageImprint,
    #[asn1(optional = "true")]
    pub req_policy: Option<ObjectIdentifier>,
    #[asn1(optional = "true")]
    pub nonce: Option<Int>,
    #[asn1(default = "default_false")]
    pub cert_req: bool,
}

/// `PKIStatusInfo`.
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct PkiStatusInfo {
    pub status: u8,
    #[asn1(optional = "true")]
    pub status_string: Option<Vec<String>>,
    #[asn1(optional = "true")]
    pub fail_info: Option<BitString>,
}

impl PkiStatusInfo {
    /// `granted` or `grantedWithMods`.
    pub fn is_granted(&self) -> bool {
        self.status <= 1
    }

    /// Status text followed by the names of any failure bits.
    pub fn describe(&self) -> String {
        let mut parts: Vec<String> = self.status_string.iter().flatten().cloned().collect();
        if let Some(bits) = &self.fail_info {
            let names: Vec<&str> = bits
                .bits()
                .enumerate()
                .filter(|(_, set)| *set)
                .filter_map(|(index, _)| failure_name(index))
                .collect();
            if !names.is_empty() {
                parts.push(format!("failInfo: {}", names.join(", ")));
            }
        }
        if parts.is_empty() {
            status_name(self.status).to_string()
        } else {
            parts.join("; ")
        }
    }
}

fn status_name(status: u8) -> &'static str {
    match status {
        0 => "granted",
        1 => "grantedWithMods",
        2 => "rejection",
        3 => "waiting",
        4 => "revocationWarning",
        5 => "revocationNotification",
        _ => "unknown status",
    }
}

fn failure_name(bit: usize) -> Option<&'static str> {
    Some(match bit {
        0 => "badAlg",
        2 => "badRequest",
        5 => "badDataFormat",
        14 => "timeNotAvailable",
        15 => "unacceptedPolicy",
        16 => "unacceptedExtension",
        17 => "addInfoNotAvailable",
        25 => "systemFailure",
        _ => return None,
    })
}

/// `Accuracy` of a TSTInfo.
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct Accuracy {
    #[asn1(optional = "true")]
    pub seconds: Option<u64>,
    #[asn1(context_specific = "0", tag_mode = "IMPLICIT", optional = "true")]
    pub millis: Option<u16>,
    #[asn1(context_specific = "1", tag_mode = "IMPLICIT", optional = "true")]
    pub micros: Option<u16>,
}

/// `TSTInfo`, the content signed by the TSA.
///
/// `gen_time` is kept as the raw element because many TSAs emit fractional
/// seconds, which strict DER `GeneralizedTime` decoding refuses.
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct TstInfo {
    pub version: u8,
    pub policy: ObjectIdentifier,
    pub message_imprint: MessageImprint,
    pub serial_number: Int,
    pub gen_time: Any,
    #[asn1(optional = "true")]
    pub accuracy: Option<Accuracy>,
    #[asn1(default = "default_false")]
    pub ordering: bool,
    #[asn1(optional = "true")]
    pub nonce: Option<Int>,
    #[asn1(context_specific = "0", tag_mode = "EXPLICIT", optional = "true")]
    pub tsa: Option<GeneralName>,
    #[asn1(context_specific = "1", tag_mode = "IMPLICIT", optional = "true")]
    pub extensions: Option<Extensions>,
}

/// `TimeStampResp`.
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct TimeStampResp {
    pub status: PkiStatusInfo,
    #[asn1(optional = "true")]
    pub time_stamp_token: Option<Any>,
}

/// 64 random bits as a minimal positive INTEGER encoding.
pub fn generate_nonce() -> Vec<u8> {
    let mut random = [0u8; 8];
    OsRng.fill_bytes(&mut random);
    positive_integer_bytes(&random)
}

/// Minimal two's-complement encoding of an unsigned big-endian value.
pub(crate) fn positive_integer_bytes(value: &[u8]) -> Vec<u8> {
    let start = value.iter().position(|b| *b != 0).unwrap_or(value.len());
    let trimmed = &value[start..];
    match trimmed.first() {
        None => vec![0],
        Some(first) if first & 0x80 != 0 => {
            let mut out = Vec::with_capacity(trimmed.len() + 1);
            out.push(0);
            out.extend_from_slice(trimmed);
            out
        },
        Some(_) => trimmed.to_vec(),
    }
}

/// Parse a `GeneralizedTime` element, accepting fractional seconds.
pub fn parse_generalized_time(element: &Any) -> Result<DateTime<Utc>> {
    if element.tag() != Tag::GeneralizedTime {
        return Err(Error::Protocol(format!("genTime has tag {}, expected GeneralizedTime", element.tag())));
    }
    let text = std::str::from_utf8(element.value())
        .map_err(|_| Error::Protocol("genTime is not ASCII".to_string()))?;
    let text = text
        .strip_suffix('Z')
        .ok_or_else(|| Error::Protocol(format!("genTime '{}' is not in UTC", text)))?;
    let (whole, fraction) = match text.split_once(['.', ',']) {
        Some((whole, fraction)) => (whole, fraction),
        None => (text, ""),
    };

    let naive = NaiveDateTime::parse_from_str(whole, "%Y%m%d%H%M%S")
        .map_err(|e| Error::protocol(&format!("invalid genTime '{}'", text), e))?;

    let mut nanos: u32 = 0;
    if !fraction.is_empty() {
        if !fraction.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::Protocol(format!("invalid genTime fraction '{}'", fraction)));
        }
        let digits: String = fraction.chars().chain(std::iter::repeat('0')).take(9).collect();
        nanos = digits
            .parse()
            .map_err(|e| Error::protocol("invalid genTime fraction", e))?;
    }

    let naive = naive
        .with_nanosecond(nanos)
        .ok_or_else(|| Error::Protocol("invalid genTime fraction".to_string()))?;
    Ok(Utc.from_utc_datetime(&naive))
}

/// A parsed RFC 3161 timestamp token.
#[derive(Debug, Clone)]
pub struct TimestampToken {
    der: Vec<u8>,
    container: SignedContainer,
    info: TstInfo,
    gen_time: DateTime<Utc>,
}

impl TimestampToken {
    /// Parse a token (`ContentInfo` carrying `SignedData` over a TSTInfo).
    pub fn from_der(bytes: &[u8]) -> Result<Self> {
        let container = SignedContainer::from_der(bytes)?;
        let (content_type, content) = container
            .encapsulated_content()
            .ok_or_else(|| Error::Protocol("timestamp token has no encapsulated TSTInfo".to_string()))?;
        if content_type != oid::ID_CT_TST_INFO {
            return Err(Error::Protocol(format!(
                "timestamp token content type {} is not id-ct-TSTInfo",
                content_type
            )));
        }
        let info = TstInfo::from_der(&content).map_err(|e| Error::protocol("invalid TSTInfo", e))?;
        let gen_time = parse_generalized_time(&info.gen_time)?;
        let der = first_element(bytes)?.to_vec();

        Ok(Self {
            der,
            container,
            info,
            gen_time,
        })
    }

    /// DER encoding of the token.
    pub fn as_der(&self) -> &[u8] {
        &self.der
    }

    pub fn into_der(self) -> Vec<u8> {
        self.der
    }

    pub fn info(&self) -> &TstInfo {
        &self.info
    }

    pub fn container(&self) -> &SignedContainer {
        &self.container
    }

    pub fn gen_time(&self) -> DateTime<Utc> {
        self.gen_time
    }

    pub fn nonce(&self) -> Option<&[u8]> {
        self.info.nonce.as_ref().map(|n| n.as_bytes())
    }

    pub fn hash_algorithm(&self) -> Option<HashAlgorithm> {
        HashAlgorithm::from_oid(&self.info.message_imprint.hash_algorithm.oid)
    }

    /// Digest the token attests to.
    pub fn message_imprint(&self) -> &[u8] {
        self.info.message_imprint.hashed_message.as_bytes()
    }

    pub fn serial_hex(&self) -> String {
        crate::decoders::encode_hex_upper(self.info.serial_number.as_bytes())
    }

    pub fn signer_certificate(&self) -> Option<Certificate> {
        self.container.signer_certificate()
    }

    /// TSA name from the TSTInfo, falling back to the signer certificate's CN.
    pub fn tsa_name(&self) -> Option<String> {
        if let Some(GeneralName::DirectoryName(name)) = &self.info.tsa {
            return Some(name.to_string());
        }
        let cert = self.signer_certificate()?;
        CertificateSummary::of(&cert).ok()?.common_name
    }

    /// Check the token's CMS signature with its embedded TSA certificate.
    ///
    /// A TSA certificate carrying an extended key usage must allow timestamping.
    pub fn verify_signature(&self) -> Result<()> {
        self.container.verify_encapsulated()?;

        let cert = self
            .signer_certificate()
            .ok_or_else(|| Error::Cryptographic("TSA certificate not embedded in token".to_string()))?;
        let eku = cert
            .tbs_certificate
            .extensions
            .iter()
            .flatten()
            .find(|ext| ext.extn_id == ID_CE_EXT_KEY_USAGE);
        if let Some(ext) = eku {
            let usages = ExtendedKeyUsage::from_der(ext.extn_value.as_bytes())
                .map_err(|e| Error::crypto("invalid TSA extended key usage", e))?;
            if !usages.0.contains(&oid::KP_TIME_STAMPING) {
                return Err(Error::Cryptographic(
                    "TSA certificate is not authorized for timestamping".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Imprint equals `expected_hash` and the signature verifies.
    pub fn verify(&self, expected_hash: &[u8]) -> Result<()> {
        if self.message_imprint() != expected_hash {
            return Err(Error::Cryptographic(
                "timestamp imprint does not match the timestamped data".to_string(),
            ));
        }
        self.verify_signature()
    }
}

/// RFC 3161 client over an injected [`Transport`].
#[derive(Clone)]
pub struct TimestampClient {
    transport: Arc<dyn Transport>,
}

impl std::fmt::Debug for TimestampClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimestampClient").finish_non_exhaustive()
    }
}

impl TimestampClient {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Client over a fresh pooled HTTP transport.
    pub fn http() -> Result<Self> {
        Ok(Self::new(Arc::new(HttpTransport::new()?)))
    }

    /// Obtain a token for `data_hash`, computed with `hash_algorithm`.
    pub fn request(&self, data_hash: &[u8], hash_algorithm: HashAlgorithm, tsa: &TsaConfig) -> Result<TimestampToken> {
        tsa.validate()?;
        if data_hash.len() != hash_algorithm.output_len() {
            return Err(Error::Configuration(format!(
                "{} hash must be {} bytes, got {}",
                hash_algorithm.name(),
                hash_algorithm.output_len(),
                data_hash.len()
            )));
        }

        let nonce = generate_nonce();
        let request = TimeStampReq {
            version: 1,
            message_imprint: MessageImprint::new(hash_algorithm, data_hash)?,
            req_policy: None,
            nonce: Some(Int::new(&nonce).map_err(|e| Error::crypto("nonce", e))?),
            cert_req: true,
        };
        let body = request.to_der().map_err(|e| Error::crypto("failed to encode TimeStampReq", e))?;

        let mut http = HttpRequest::post(&tsa.url, TIMESTAMP_QUERY, body, Duration::from_secs(tsa.timeout_seconds))
            .with_accept(TIMESTAMP_REPLY);
        if let Some(credentials) = &tsa.credentials {
            http = http.with_basic_auth(&credentials.username, &credentials.password);
        }

        log::debug!("requesting {} timestamp from {}", hash_algorithm.name(), tsa.url);
        let response = self.transport.execute(&http)?.into_success(&tsa.url)?;
        let token = Self::accept_response(&response, &nonce, data_hash)?;
        log::info!("timestamp from {} at {}", tsa.url, token.gen_time().to_rfc3339());
        Ok(token)
    }

    /// Obtain a token over `data`, hashed with the TSA's configured algorithm.
    pub fn timestamp_data(&self, data: &[u8], tsa: &TsaConfig) -> Result<TimestampToken> {
        self.request(&tsa.hash_algorithm.digest(data), tsa.hash_algorithm, tsa)
    }

    fn accept_response(body: &[u8], nonce: &[u8], data_hash: &[u8]) -> Result<TimestampToken> {
        let response = TimeStampResp::from_der(body).map_err(|e| Error::protocol("invalid TimeStampResp", e))?;
        if !response.status.is_granted() {
            return Err(Error::TsaRejected {
                status: response.status.status,
                text: response.status.describe(),
            });
        }
        let token_any = response
            .time_stamp_token
            .ok_or_else(|| Error::Protocol("granted response carries no timestamp token".to_string()))?;
        let token_der = token_any.to_der().map_err(|e| Error::protocol("invalid timestamp token", e))?;
        let token = TimestampToken::from_der(&token_der).map_err(|e| match e {
            Error::Cryptographic(msg) => Error::Protocol(msg),
            other => other,
        })?;

        if token.nonce() != Some(nonce) {
            return Err(Error::Protocol("nonce mismatch".to_string()));
        }
        if token.message_imprint() != data_hash {
            return Err(Error::Protocol("hash mismatch".to_string()));
        }
        token
            .verify_signature()
            .map_err(|e| Error::Protocol(format!("timestamp token signature rejected: {}", e)))?;
        Ok(token)
    }

    /// True when `token` attests to `expected_hash` and its signature verifies.
    pub fn verify(&self, token: &[u8], expected_hash: &[u8]) -> bool {
        match TimestampToken::from_der(token).and_then(|t| t.verify(expected_hash)) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("timestamp token rejected: {}", e);
                false
            },
        }
    }

    /// `genTime` of an encoded token.
    pub fn extract_time(token: &[u8]) -> Result<DateTime<Utc>> {
        Ok(TimestampToken::from_der(token)?.gen_time())
    }
}
