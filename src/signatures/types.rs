//! Digital signature types and data structures.
//!
//! Options going into [`PdfSigner`](super::PdfSigner), results coming out of it, and
//! the per-signature report produced by [`SignatureVerifier`](super::SignatureVerifier).

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use const_oid::ObjectIdentifier;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha384, Sha512};

use super::oid;

/// Assurance level of a signature, from basic to long-term archival.
///
/// Levels are ordered: every level includes everything the lower ones require.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub enum SignatureLevel {
    /// Basic signature
    #[default]
    B,
    /// Basic signature plus a signature timestamp
    T,
    /// Timestamped signature plus embedded revocation data
    LT,
    /// Long-term signature plus a document timestamp
    LTA,
}

impl SignatureLevel {
    pub fn requires_timestamp(self) -> bool {
        self >= SignatureLevel::T
    }

    pub fn requires_revocation_data(self) -> bool {
        self >= SignatureLevel::LT
    }

    pub fn requires_archive_timestamp(self) -> bool {
        self == SignatureLevel::LTA
    }

    /// PAdES profile name, e.g. `PAdES-B-LT`.
    pub fn profile_name(self) -> &'static str {
        match self {
            SignatureLevel::B => "PAdES-B-B",
            SignatureLevel::T => "PAdES-B-T",
            SignatureLevel::LT => "PAdES-B-LT",
            SignatureLevel::LTA => "PAdES-B-LTA",
        }
    }
}

impl std::fmt::Display for SignatureLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SignatureLevel::B => "B",
            SignatureLevel::T => "T",
            SignatureLevel::LT => "LT",
            SignatureLevel::LTA => "LTA",
        };
        f.write_str(name)
    }
}

/// Digest algorithm used for signing and timestamping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum HashAlgorithm {
    /// SHA-256 (recommended)
    #[default]
    #[serde(rename = "SHA256", alias = "Sha256", alias = "sha256")]
    Sha256,
    /// SHA-384
    #[serde(rename = "SHA384", alias = "Sha384", alias = "sha384")]
    Sha384,
    /// SHA-512
    #[serde(rename = "SHA512", alias = "Sha512", alias = "sha512")]
    Sha512,
}

impl HashAlgorithm {
    /// Get the OID for this digest algorithm.
    pub fn oid(&self) -> ObjectIdentifier {
        match self {
            HashAlgorithm::Sha256 => oid::ID_SHA256,
            HashAlgorithm::Sha384 => oid::ID_SHA384,
            HashAlgorithm::Sha512 => oid::ID_SHA512,
        }
    }

    /// Get the name of this algorithm.
    pub fn name(&self) -> &'static str {
        match self {
            HashAlgorithm::Sha256 => "SHA-256",
            HashAlgorithm::Sha384 => "SHA-384",
            HashAlgorithm::Sha512 => "SHA-512",
        }
    }

    /// Digest length in bytes.
    pub fn output_len(&self) -> usize {
        match self {
            HashAlgorithm::Sha256 => 32,
            HashAlgorithm::Sha384 => 48,
            HashAlgorithm::Sha512 => 64,
        }
    }

    pub fn from_oid(oid: &ObjectIdentifier) -> Option<Self> {
        match *oid {
            oid::ID_SHA256 => Some(HashAlgorithm::Sha256),
            oid::ID_SHA384 => Some(HashAlgorithm::Sha384),
            oid::ID_SHA512 => Some(HashAlgorithm::Sha512),
            _ => None,
        }
    }

    pub fn digest(&self, data: &[u8]) -> Vec<u8> {
        self.digest_parts(&[data])
    }

    /// Digest the concatenation of several slices without copying them together.
    pub fn digest_parts(&self, parts: &[&[u8]]) -> Vec<u8> {
        fn run<D: Digest>(parts: &[&[u8]]) -> Vec<u8> {
            let mut hasher = D::new();
            for part in parts {
                hasher.update(part);
            }
            hasher.finalize().to_vec()
        }

        match self {
            HashAlgorithm::Sha256 => run::<Sha256>(parts),
            HashAlgorithm::Sha384 => run::<Sha384>(parts),
            HashAlgorithm::Sha512 => run::<Sha512>(parts),
        }
    }
}

/// Signature sub-filter type (signature format).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SignatureSubFilter {
    /// adbe.pkcs7.detached - PKCS#7 detached signature
    Pkcs7Detached,
    /// ETSI.CAdES.detached - PAdES CAdES signature
    #[default]
    CadesDetached,
    /// ETSI.RFC3161 - Document timestamp token
    Rfc3161,
}

impl SignatureSubFilter {
    /// Get the PDF name for this sub-filter.
    pub fn as_pdf_name(&self) -> &'static str {
        match self {
            SignatureSubFilter::Pkcs7Detached => "adbe.pkcs7.detached",
            SignatureSubFilter::CadesDetached => "ETSI.CAdES.detached",
            SignatureSubFilter::Rfc3161 => "ETSI.RFC3161",
        }
    }

    /// Parse a PDF name into a sub-filter type.
    pub fn from_pdf_name(name: &str) -> Option<Self> {
        match name {
            "adbe.pkcs7.detached" => Some(SignatureSubFilter::Pkcs7Detached),
            "ETSI.CAdES.detached" => Some(SignatureSubFilter::CadesDetached),
            "ETSI.RFC3161" => Some(SignatureSubFilter::Rfc3161),
            _ => None,
        }
    }
}

/// Modifications a certifying signature still permits (DocMDP `/P`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CertificationLevel {
    /// No changes at all
    NoChanges,
    /// Form filling and further signatures
    #[default]
    #[serde(alias = "FormFilling")]
    FormFillingOnly,
    /// Form filling, signing and annotations
    FormFillingAndAnnotations,
}

impl CertificationLevel {
    /// Value of the DocMDP transform's `/P` entry.
    pub fn permissions(&self) -> i64 {
        match self {
            CertificationLevel::NoChanges => 1,
            CertificationLevel::FormFillingOnly => 2,
            CertificationLevel::FormFillingAndAnnotations => 3,
        }
    }
}

/// HTTP Basic credentials for a timestamp authority.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TsaCredentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for TsaCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TsaCredentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

fn default_timeout_seconds() -> u64 {
    30
}

/// Timestamp authority endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TsaConfig {
    pub url: String,
    #[serde(default)]
    pub credentials: Option<TsaCredentials>,
    /// Bound on one request/response round-trip
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    /// Digest algorithm named in the message imprint
    #[serde(default)]
    pub hash_algorithm: HashAlgorithm,
}

impl TsaConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            credentials: None,
            timeout_seconds: default_timeout_seconds(),
            hash_algorithm: HashAlgorithm::Sha256,
        }
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some(TsaCredentials {
            username: username.into(),
            password: password.into(),
        });
        self
    }

    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    pub fn with_hash_algorithm(mut self, hash_algorithm: HashAlgorithm) -> Self {
        self.hash_algorithm = hash_algorithm;
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if !(self.url.starts_with("http://") || self.url.starts_with("https://")) {
            return Err(Error::Configuration(format!("TSA URL must be http(s): '{}'", self.url)));
        }
        if self.timeout_seconds == 0 {
            return Err(Error::Configuration("TSA timeout must be at least one second".to_string()));
        }
        Ok(())
    }
}

/// Descriptive entries written into the signature dictionary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SignerDetails {
    pub reason: Option<String>,
    pub location: Option<String>,
    pub contact_info: Option<String>,
    /// Overrides the certificate common name
    pub signer_name: Option<String>,
    /// Field to create; `Signature{n}` when absent
    pub field_name: Option<String>,
    pub certify_document: bool,
    pub certification_level: CertificationLevel,
}

/// Text lines a visible signature can show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VisibleField {
    Name,
    Date,
    Reason,
    Location,
}

/// Rectangle in default user space: lower-left corner plus size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    /// `[llx lly urx ury]` as used by `/Rect`.
    pub fn to_corners(&self) -> [f64; 4] {
        [self.x, self.y, self.x + self.width, self.y + self.height]
    }
}

/// Widget placement and look of a signature.
#[derive(Debug, Clone, PartialEq)]
pub struct SignatureAppearance {
    /// Page number (1-based)
    pub page_number: usize,
    pub rect: Rect,
    /// PNG or JPEG bytes drawn behind the text
    pub image: Option<Vec<u8>>,
    pub visible_fields: Vec<VisibleField>,
    /// Zero-size widget without appearance stream
    pub invisible: bool,
    pub font_size: f64,
}

impl Default for SignatureAppearance {
    fn default() -> Self {
        Self {
            page_number: 1,
            rect: Rect::new(72.0, 72.0, 200.0, 50.0),
            image: None,
            visible_fields: vec![
                VisibleField::Name,
                VisibleField::Date,
                VisibleField::Reason,
                VisibleField::Location,
            ],
            invisible: false,
            font_size: 9.0,
        }
    }
}

impl SignatureAppearance {
    /// Invisible signature attached to the given page.
    pub fn invisible(page_number: usize) -> Self {
        Self {
            page_number,
            invisible: true,
            ..Self::default()
        }
    }

    pub fn visible(page_number: usize, rect: Rect) -> Self {
        Self {
            page_number,
            rect,
            ..Self::default()
        }
    }

    pub fn with_image(mut self, image: Vec<u8>) -> Self {
        self.image = Some(image);
        self
    }

    pub fn with_fields(mut self, fields: Vec<VisibleField>) -> Self {
        self.visible_fields = fields;
        self
    }
}

/// Options for signing a PDF.
#[derive(Debug, Clone)]
pub struct SignOptions {
    pub level: SignatureLevel,
    pub hash_algorithm: HashAlgorithm,
    /// Fetch and embed OCSP responses (LT and above)
    pub embed_ocsp: bool,
    /// Fetch and embed CRLs (LT and above)
    pub embed_crl: bool,
    pub signer: SignerDetails,
    /// `None` signs invisibly on the first page
    pub appearance: Option<SignatureAppearance>,
    /// Mandatory from level T upwards
    pub tsa: Option<TsaConfig>,
    /// Bytes reserved for the CMS container; estimated when `None`
    pub contents_size: Option<usize>,
}

impl Default for SignOptions {
    fn default() -> Self {
        Self {
            level: SignatureLevel::B,
            hash_algorithm: HashAlgorithm::Sha256,
            embed_ocsp: true,
            embed_crl: true,
            signer: SignerDetails::default(),
            appearance: None,
            tsa: None,
            contents_size: None,
        }
    }
}

impl SignOptions {
    pub fn new(level: SignatureLevel) -> Self {
        Self {
            level,
            ..Self::default()
        }
    }

    pub fn with_hash_algorithm(mut self, hash_algorithm: HashAlgorithm) -> Self {
        self.hash_algorithm = hash_algorithm;
        self
    }

    pub fn with_tsa(mut self, tsa: TsaConfig) -> Self {
        self.tsa = Some(tsa);
        self
    }

    /// Choose which revocation data to embed.
    pub fn with_revocation(mut self, ocsp: bool, crl: bool) -> Self {
        self.embed_ocsp = ocsp;
        self.embed_crl = crl;
        self
    }

    /// Set the reason for signing.
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.signer.reason = Some(reason.into());
        self
    }

    /// Set the signing location.
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.signer.location = Some(location.into());
        self
    }

    pub fn with_contact_info(mut self, contact_info: impl Into<String>) -> Self {
        self.signer.contact_info = Some(contact_info.into());
        self
    }

    pub fn with_signer_name(mut self, name: impl Into<String>) -> Self {
        self.signer.signer_name = Some(name.into());
        self
    }

    pub fn with_field_name(mut self, name: impl Into<String>) -> Self {
        self.signer.field_name = Some(name.into());
        self
    }

    /// Make this a certifying signature.
    pub fn with_certification(mut self, level: CertificationLevel) -> Self {
        self.signer.certify_document = true;
        self.signer.certification_level = level;
        self
    }

    pub fn with_appearance(mut self, appearance: SignatureAppearance) -> Self {
        self.appearance = Some(appearance);
        self
    }

    pub fn with_contents_size(mut self, bytes: usize) -> Self {
        self.contents_size = Some(bytes);
        self
    }

    /// Checks that need no document and no network.
    pub fn validate(&self) -> Result<()> {
        if self.level.requires_timestamp() {
            match &self.tsa {
                Some(tsa) => tsa.validate()?,
                None => {
                    return Err(Error::Configuration(format!(
                        "signature level {} requires a TSA configuration",
                        self.level
                    )))
                },
            }
        }
        if self.level.requires_revocation_data() && !self.embed_ocsp && !self.embed_crl {
            return Err(Error::Configuration(format!(
                "signature level {} requires OCSP or CRL embedding",
                self.level
            )));
        }
        if let Some(name) = &self.signer.field_name {
            if name.is_empty() || name.contains('.') {
                return Err(Error::Configuration(format!("invalid field name '{}'", name)));
            }
        }
        if let Some(appearance) = &self.appearance {
            if appearance.page_number == 0 {
                return Err(Error::Configuration("page numbers start at 1".to_string()));
            }
            let rect = &appearance.rect;
            let usable = |extent: f64| extent.is_finite() && extent > 0.0;
            let placed = rect.x.is_finite() && rect.y.is_finite();
            if !appearance.invisible && !(placed && usable(rect.width) && usable(rect.height)) {
                return Err(Error::Configuration("visible signature needs a non-empty rectangle".to_string()));
            }
        }
        Ok(())
    }
}

/// Outcome of a successful signing call.
#[derive(Clone)]
pub struct SignatureResult {
    pub success: bool,
    /// Complete signed document
    pub signed_bytes: Vec<u8>,
    pub level: SignatureLevel,
    pub signer_name: String,
    pub signing_time: DateTime<Utc>,
    /// Certificate serial number, hex
    pub certificate_serial: String,
    pub certificate_issuer: String,
    pub field_name: String,
}

impl std::fmt::Debug for SignatureResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureResult")
            .field("success", &self.success)
            .field("signed_bytes", &format!("{} bytes", self.signed_bytes.len()))
            .field("level", &self.level)
            .field("signer_name", &self.signer_name)
            .field("signing_time", &self.signing_time)
            .field("certificate_serial", &self.certificate_serial)
            .field("certificate_issuer", &self.certificate_issuer)
            .field("field_name", &self.field_name)
            .finish()
    }
}

/// Validity of a certificate at the verification time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CertificateStatus {
    Valid,
    Expired,
    NotYetValid,
}

/// Certificate metadata reported by the verifier.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateInfo {
    pub common_name: Option<String>,
    pub organization: Option<String>,
    /// Hex serial number
    pub serial: String,
    pub subject: String,
    pub issuer: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    pub status: CertificateStatus,
}

/// Timestamp found in a signature or document timestamp.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimestampInfo {
    pub time: DateTime<Utc>,
    /// Token signature and imprint verified
    pub valid: bool,
    pub tsa_name: Option<String>,
    pub hash_algorithm: Option<HashAlgorithm>,
}

/// Verification status of a signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum VerificationStatus {
    /// Signature is valid
    Valid,
    /// Signature is valid but something deserves attention
    ValidWithWarnings,
    /// Signature is invalid (cryptographically or structurally)
    Invalid,
}

impl VerificationStatus {
    /// Check if the status indicates a valid signature.
    pub fn is_valid(&self) -> bool {
        matches!(self, VerificationStatus::Valid)
    }

    /// Check if the status indicates any form of validity (including warnings).
    pub fn is_ok(&self) -> bool {
        matches!(self, VerificationStatus::Valid | VerificationStatus::ValidWithWarnings)
    }
}

/// Report for one signature or document timestamp.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureVerificationInfo {
    pub field_name: String,
    pub signer_name: Option<String>,
    /// `/M` entry of the signature dictionary
    pub signing_time: Option<DateTime<Utc>>,
    pub reason: Option<String>,
    pub location: Option<String>,
    pub contact_info: Option<String>,
    pub sub_filter: Option<String>,
    pub is_document_timestamp: bool,
    pub byte_range: Vec<i64>,
    /// Digest and signature check out
    pub integrity_valid: bool,
    /// Byte range reaches the end of the current file
    pub covers_whole_document: bool,
    pub certificate: Option<CertificateInfo>,
    pub chain_length: usize,
    pub chain_trusted: bool,
    pub has_timestamp: bool,
    pub timestamp: Option<TimestampInfo>,
    pub has_ocsp: bool,
    pub has_crl: bool,
    pub detected_level: Option<SignatureLevel>,
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl SignatureVerificationInfo {
    pub fn status(&self) -> VerificationStatus {
        if !self.is_valid {
            VerificationStatus::Invalid
        } else if self.warnings.is_empty() {
            VerificationStatus::Valid
        } else {
            VerificationStatus::ValidWithWarnings
        }
    }
}

/// Report for a whole document.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationResult {
    pub signatures: Vec<SignatureVerificationInfo>,
    /// Every entry valid, and at least one present
    pub is_valid: bool,
    /// Some signature does not cover the current file
    pub document_modified: bool,
    pub summary: String,
}

impl VerificationResult {
    pub(crate) fn from_signatures(signatures: Vec<SignatureVerificationInfo>) -> Self {
        let valid = signatures.iter().filter(|s| s.is_valid).count();
        let is_valid = !signatures.is_empty() && valid == signatures.len();
        let document_modified = signatures.iter().any(|s| !s.covers_whole_document);
        let summary = if signatures.is_empty() {
            "Document contains no signatures".to_string()
        } else {
            format!(
                "{} of {} signature(s) valid{}",
                valid,
                signatures.len(),
                if document_modified {
                    "; document modified after signing"
                } else {
                    ""
                }
            )
        };
        Self {
            signatures,
            is_valid,
            document_modified,
            summary,
        }
    }

    /// Signatures only, without document timestamps.
    pub fn signatures_only(&self) -> impl Iterator<Item = &SignatureVerificationInfo> {
        self.signatures.iter().filter(|s| !s.is_document_timestamp)
    }
}
