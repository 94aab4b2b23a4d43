//! Signing certificates and private keys.
//!
//! A [`SigningCertificate`] is the unit the signer consumes: one X.509
//! certificate, the private key belonging to it, and the certificates between it
//! and a root. It can be loaded from a PKCS#12 container, from PEM text, from a
//! [`CertificateStore`], or assembled from parts the caller already holds.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use const_oid::ObjectIdentifier;
use der::{Decode, Encode};
use serde::Deserialize;
use sha1::{Digest, Sha1};
use signature::hazmat::{PrehashSigner, PrehashVerifier};
use spki::{AlgorithmIdentifierOwned, SubjectPublicKeyInfoOwned};
use std::path::{Path, PathBuf};
use x509_cert::Certificate;

use super::chain::ChainBuilder;
use super::oid;
use super::types::HashAlgorithm;

/// Private key usable for signing.
pub enum SigningKey {
    Rsa(Box<rsa::RsaPrivateKey>),
    EcP256(p256::ecdsa::SigningKey),
    EcP384(p384::ecdsa::SigningKey),
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SigningKey::{}([REDACTED])", self.algorithm_name())
    }
}

impl SigningKey {
    /// Decode a PKCS#8 `PrivateKeyInfo`.
    pub fn from_pkcs8_der(der: &[u8]) -> Result<Self> {
        use pkcs8::DecodePrivateKey;

        let info = pkcs8::PrivateKeyInfo::try_from(der)
            .map_err(|e| Error::certificate("invalid PKCS#8 private key", e))?;
        let algorithm = info.algorithm.oid;

        if algorithm == oid::RSA_ENCRYPTION {
            let key = rsa::RsaPrivateKey::from_pkcs8_der(der)
                .map_err(|e| Error::certificate("invalid RSA private key", e))?;
            return Ok(SigningKey::Rsa(Box::new(key)));
        }
        if algorithm == oid::EC_PUBLIC_KEY {
            let curve = info
                .algorithm
                .parameters_oid()
                .map_err(|e| Error::certificate("EC private key without curve", e))?;
            return match curve {
                oid::SECP256R1 => p256::ecdsa::SigningKey::from_pkcs8_der(der)
                    .map(SigningKey::EcP256)
                    .map_err(|e| Error::certificate("invalid P-256 private key", e)),
                oid::SECP384R1 => p384::ecdsa::SigningKey::from_pkcs8_der(der)
                    .map(SigningKey::EcP384)
                    .map_err(|e| Error::certificate("invalid P-384 private key", e)),
                other => Err(Error::Certificate(format!("unsupported EC curve {}", other))),
            };
        }
        Err(Error::Certificate(format!("unsupported private key algorithm {}", algorithm)))
    }

    /// Decode a PEM private key: PKCS#8, PKCS#1 (`RSA PRIVATE KEY`) or SEC1
    /// (`EC PRIVATE KEY`).
    pub fn from_pem(pem: &str) -> Result<Self> {
        let (label, der) = pem_blocks(pem)?
            .into_iter()
            .find(|(label, _)| label.ends_with("PRIVATE KEY"))
            .ok_or_else(|| Error::Certificate("no private key in PEM input".to_string()))?;

        match label.as_str() {
            "PRIVATE KEY" => Self::from_pkcs8_der(&der),
            "RSA PRIVATE KEY" => {
                use pkcs1::DecodeRsaPrivateKey;
                rsa::RsaPrivateKey::from_pkcs1_der(&der)
                    .map(|k| SigningKey::Rsa(Box::new(k)))
                    .map_err(|e| Error::certificate("invalid PKCS#1 private key", e))
            },
            "EC PRIVATE KEY" => {
                if let Ok(secret) = p256::SecretKey::from_sec1_der(&der) {
                    return Ok(SigningKey::EcP256(secret.into()));
                }
                p384::SecretKey::from_sec1_der(&der)
                    .map(|secret| SigningKey::EcP384(secret.into()))
                    .map_err(|e| Error::certificate("invalid SEC1 private key", e))
            },
            other => Err(Error::Certificate(format!("unsupported PEM label '{}'", other))),
        }
    }

    pub fn algorithm_name(&self) -> &'static str {
        match self {
            SigningKey::Rsa(_) => "RSA",
            SigningKey::EcP256(_) => "ECDSA P-256",
            SigningKey::EcP384(_) => "ECDSA P-384",
        }
    }

    /// Upper bound of the encoded signature value.
    pub fn max_signature_len(&self) -> usize {
        match self {
            SigningKey::Rsa(key) => {
                use rsa::traits::PublicKeyParts;
                key.size()
            },
            SigningKey::EcP256(_) => 72,
            SigningKey::EcP384(_) => 104,
        }
    }

    /// `signatureAlgorithm` for a SignerInfo signed with this key.
    pub fn signature_algorithm(&self, hash: HashAlgorithm) -> AlgorithmIdentifierOwned {
        match self {
            SigningKey::Rsa(_) => AlgorithmIdentifierOwned {
                oid: match hash {
                    HashAlgorithm::Sha256 => oid::SHA256_WITH_RSA,
                    HashAlgorithm::Sha384 => oid::SHA384_WITH_RSA,
                    HashAlgorithm::Sha512 => oid::SHA512_WITH_RSA,
                },
                parameters: Some(der::Any::null()),
            },
            SigningKey::EcP256(_) | SigningKey::EcP384(_) => AlgorithmIdentifierOwned {
                oid: match hash {
                    HashAlgorithm::Sha256 => oid::ECDSA_WITH_SHA256,
                    HashAlgorithm::Sha384 => oid::ECDSA_WITH_SHA384,
                    HashAlgorithm::Sha512 => oid::ECDSA_WITH_SHA512,
                },
                parameters: None,
            },
        }
    }

    /// Sign a precomputed digest. RSA uses PKCS#1 v1.5, EC keys produce a
    /// DER-encoded ECDSA signature.
    pub fn sign_digest(&self, hash: HashAlgorithm, digest: &[u8]) -> Result<Vec<u8>> {
        match self {
            SigningKey::Rsa(key) => key
                .sign(pkcs1v15_scheme(hash), digest)
                .map_err(|e| Error::crypto("RSA signing failed", e)),
            SigningKey::EcP256(key) => {
                let sig: p256::ecdsa::Signature =
                    key.sign_prehash(digest).map_err(|e| Error::crypto("ECDSA signing failed", e))?;
                Ok(sig.to_der().as_bytes().to_vec())
            },
            SigningKey::EcP384(key) => {
                let sig: p384::ecdsa::Signature =
                    key.sign_prehash(digest).map_err(|e| Error::crypto("ECDSA signing failed", e))?;
                Ok(sig.to_der().as_bytes().to_vec())
            },
        }
    }

    /// DER `SubjectPublicKeyInfo` of the matching public key.
    pub fn public_key_der(&self) -> Result<Vec<u8>> {
        use pkcs8::EncodePublicKey;

        let doc = match self {
            SigningKey::Rsa(key) => key.to_public_key().to_public_key_der(),
            SigningKey::EcP256(key) => key.verifying_key().to_public_key_der(),
            SigningKey::EcP384(key) => key.verifying_key().to_public_key_der(),
        }
        .map_err(|e| Error::crypto("failed to encode public key", e))?;
        Ok(doc.as_bytes().to_vec())
    }

    /// True when the certificate carries this key's public half.
    pub fn matches_certificate(&self, certificate: &Certificate) -> bool {
        match (self.public_key_der(), certificate.tbs_certificate.subject_public_key_info.to_der()) {
            (Ok(ours), Ok(theirs)) => ours == theirs,
            _ => false,
        }
    }
}

fn pkcs1v15_scheme(hash: HashAlgorithm) -> rsa::Pkcs1v15Sign {
    match hash {
        HashAlgorithm::Sha256 => rsa::Pkcs1v15Sign::new::<sha2::Sha256>(),
        HashAlgorithm::Sha384 => rsa::Pkcs1v15Sign::new::<sha2::Sha384>(),
        HashAlgorithm::Sha512 => rsa::Pkcs1v15Sign::new::<sha2::Sha512>(),
    }
}

/// Digest named by a signature algorithm such as `sha256WithRSAEncryption`.
pub fn hash_for_signature_algorithm(algorithm: &ObjectIdentifier) -> Option<HashAlgorithm> {
    match *algorithm {
        oid::SHA256_WITH_RSA | oid::ECDSA_WITH_SHA256 => Some(HashAlgorithm::Sha256),
        oid::SHA384_WITH_RSA | oid::ECDSA_WITH_SHA384 => Some(HashAlgorithm::Sha384),
        oid::SHA512_WITH_RSA | oid::ECDSA_WITH_SHA512 => Some(HashAlgorithm::Sha512),
        _ => None,
    }
}

/// Verify a signature over a precomputed digest with the given public key.
pub fn verify_digest_signature(
    spki: &SubjectPublicKeyInfoOwned,
    hash: HashAlgorithm,
    digest: &[u8],
    signature: &[u8],
) -> Result<()> {
    use pkcs8::DecodePublicKey;

    let spki_der = spki
        .to_der()
        .map_err(|e| Error::crypto("failed to encode public key", e))?;

    match spki.algorithm.oid {
        oid::RSA_ENCRYPTION => {
            let key = rsa::RsaPublicKey::from_public_key_der(&spki_der)
                .map_err(|e| Error::crypto("invalid RSA public key", e))?;
            key.verify(pkcs1v15_scheme(hash), digest, signature)
                .map_err(|_| Error::Cryptographic("RSA signature does not verify".to_string()))
        },
        oid::EC_PUBLIC_KEY => {
            let curve = spki
                .algorithm
                .parameters
                .as_ref()
                .ok_or_else(|| Error::Cryptographic("EC public key without curve".to_string()))?
                .decode_as::<ObjectIdentifier>()
                .map_err(|e| Error::crypto("invalid EC curve parameter", e))?;
            match curve {
                oid::SECP256R1 => {
                    let key = p256::ecdsa::VerifyingKey::from_public_key_der(&spki_der)
                        .map_err(|e| Error::crypto("invalid P-256 public key", e))?;
                    let sig = p256::ecdsa::Signature::from_der(signature)
                        .map_err(|e| Error::crypto("malformed ECDSA signature", e))?;
                    key.verify_prehash(digest, &sig)
                        .map_err(|_| Error::Cryptographic("ECDSA signature does not verify".to_string()))
                },
                oid::SECP384R1 => {
                    let key = p384::ecdsa::VerifyingKey::from_public_key_der(&spki_der)
                        .map_err(|e| Error::crypto("invalid P-384 public key", e))?;
                    let sig = p384::ecdsa::Signature::from_der(signature)
                        .map_err(|e| Error::crypto("malformed ECDSA signature", e))?;
                    key.verify_prehash(digest, &sig)
                        .map_err(|_| Error::Cryptographic("ECDSA signature does not verify".to_string()))
                },
                other => Err(Error::Cryptographic(format!("unsupported EC curve {}", other))),
            }
        },
        other => Err(Error::Cryptographic(format!("unsupported public key algorithm {}", other))),
    }
}

/// Split PEM text into `(label, der)` blocks.
pub fn pem_blocks(text: &str) -> Result<Vec<(String, Vec<u8>)>> {
    let mut blocks = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find("-----BEGIN ") {
        let after = &rest[start..];
        let label_end = after[11..]
            .find("-----")
            .ok_or_else(|| Error::Certificate("unterminated PEM header".to_string()))?;
        let label = &after[11..11 + label_end];
        let footer = format!("-----END {}-----", label);
        let end = after
            .find(&footer)
            .ok_or_else(|| Error::Certificate(format!("missing PEM footer for {}", label)))?
            + footer.len();

        let (decoded_label, der) = der::pem::decode_vec(after[..end].as_bytes())
            .map_err(|e| Error::certificate("invalid PEM block", e))?;
        blocks.push((decoded_label.to_string(), der));
        rest = &after[end..];
    }
    Ok(blocks)
}

/// Parse certificates from PEM text or a single DER blob.
pub fn parse_certificates(data: &[u8]) -> Result<Vec<Certificate>> {
    let looks_like_pem = data.windows(11).any(|w| w == b"-----BEGIN ");
    if !looks_like_pem {
        return Certificate::from_der(data)
            .map(|cert| vec![cert])
            .map_err(|e| Error::certificate("invalid DER certificate", e));
    }
    let text = std::str::from_utf8(data).map_err(|e| Error::certificate("PEM is not UTF-8", e))?;
    pem_blocks(text)?
        .into_iter()
        .filter(|(label, _)| label == "CERTIFICATE")
        .map(|(_, der)| Certificate::from_der(&der).map_err(|e| Error::certificate("invalid certificate", e)))
        .collect()
}

/// Certificates from every `.pem`, `.crt`, `.cer` and `.der` file of a folder,
/// in file-name order.
pub fn load_certificates_from_folder(folder: &Path) -> Result<Vec<Certificate>> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(folder)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| matches!(ext.to_ascii_lowercase().as_str(), "pem" | "crt" | "cer" | "der"))
                .unwrap_or(false)
        })
        .collect();
    paths.sort();

    let mut certs = Vec::new();
    for path in paths {
        let data = std::fs::read(&path)?;
        match parse_certificates(&data) {
            Ok(found) => certs.extend(found),
            Err(e) => log::warn!("skipping {}: {}", path.display(), e),
        }
    }
    Ok(certs)
}

/// SHA-1 over the DER encoding, uppercase hex without separators.
pub fn thumbprint(certificate: &Certificate) -> Result<String> {
    let der = certificate
        .to_der()
        .map_err(|e| Error::certificate("failed to encode certificate", e))?;
    Ok(crate::decoders::encode_hex_upper(&Sha1::digest(&der)))
}

fn normalize_thumbprint(thumbprint: &str) -> String {
    thumbprint
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':')
        .collect::<String>()
        .to_ascii_uppercase()
}

/// Human-readable fields of a certificate, read with `x509-parser`.
#[derive(Debug, Clone, PartialEq)]
pub struct CertificateSummary {
    pub common_name: Option<String>,
    pub organization: Option<String>,
    pub serial_hex: String,
    pub subject: String,
    pub issuer: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
}

impl CertificateSummary {
    pub fn of(certificate: &Certificate) -> Result<Self> {
        let der = certificate
            .to_der()
            .map_err(|e| Error::certificate("failed to encode certificate", e))?;
        let (_, parsed) = x509_parser::parse_x509_certificate(&der)
            .map_err(|e| Error::certificate("failed to parse certificate", e))?;

        let common_name = parsed
            .subject()
            .iter_common_name()
            .next()
            .and_then(|cn| cn.as_str().ok())
            .map(str::to_string);
        let organization = parsed
            .subject()
            .iter_organization()
            .next()
            .and_then(|o| o.as_str().ok())
            .map(str::to_string);
        let timestamp = |t: i64| {
            DateTime::<Utc>::from_timestamp(t, 0)
                .ok_or_else(|| Error::Certificate(format!("validity time {} out of range", t)))
        };

        Ok(Self {
            common_name,
            organization,
            serial_hex: crate::decoders::encode_hex_upper(parsed.raw_serial()),
            subject: parsed.subject().to_string(),
            issuer: parsed.issuer().to_string(),
            not_before: timestamp(parsed.validity().not_before.timestamp())?,
            not_after: timestamp(parsed.validity().not_after.timestamp())?,
        })
    }

    pub fn is_valid_at(&self, time: DateTime<Utc>) -> bool {
        self.not_before <= time && time <= self.not_after
    }
}

/// Store locations of the platform certificate store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
pub enum StoreLocation {
    #[default]
    CurrentUser,
    LocalMachine,
}

impl StoreLocation {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreLocation::CurrentUser => "CurrentUser",
            StoreLocation::LocalMachine => "LocalMachine",
        }
    }
}

/// A certificate found in a store, with its key when the store holds one.
#[derive(Debug)]
pub struct StoreEntry {
    pub certificate: Certificate,
    pub key: Option<SigningKey>,
}

/// Lookup of certificates by thumbprint.
pub trait CertificateStore: Send + Sync {
    /// Find the entry whose SHA-1 thumbprint matches. Case, spaces and colons
    /// in `thumbprint` are ignored.
    fn find(&self, thumbprint: &str, store: &str, location: StoreLocation) -> Result<Option<StoreEntry>>;
}

/// Certificate store laid out on disk as `<root>/<location>/<store>/*.pem`.
///
/// Each file holds one certificate and optionally its private key.
#[derive(Debug, Clone)]
pub struct DirectoryCertificateStore {
    root: PathBuf,
}

impl DirectoryCertificateStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl CertificateStore for DirectoryCertificateStore {
    fn find(&self, wanted: &str, store: &str, location: StoreLocation) -> Result<Option<StoreEntry>> {
        let folder = self.root.join(location.as_str()).join(store);
        if !folder.is_dir() {
            log::debug!("certificate store {} does not exist", folder.display());
            return Ok(None);
        }
        let wanted = normalize_thumbprint(wanted);

        for entry in std::fs::read_dir(&folder)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("pem") {
                continue;
            }
            let text = std::fs::read_to_string(&path)?;
            let blocks = match pem_blocks(&text) {
                Ok(blocks) => blocks,
                Err(e) => {
                    log::warn!("skipping {}: {}", path.display(), e);
                    continue;
                },
            };
            let Some((_, cert_der)) = blocks.iter().find(|(label, _)| label == "CERTIFICATE") else {
                continue;
            };
            let certificate =
                Certificate::from_der(cert_der).map_err(|e| Error::certificate("invalid certificate in store", e))?;
            if thumbprint(&certificate)? != wanted {
                continue;
            }

            let key = if blocks.iter().any(|(label, _)| label.ends_with("PRIVATE KEY")) {
                Some(SigningKey::from_pem(&text)?)
            } else {
                None
            };
            log::debug!("found {} in {}", wanted, path.display());
            return Ok(Some(StoreEntry { certificate, key }));
        }
        Ok(None)
    }
}

/// Certificate, private key and chain used for one signing call.
///
/// Every constructor guarantees the private key is present and belongs to the
/// certificate.
pub struct SigningCertificate {
    certificate: Certificate,
    key: SigningKey,
    chain: Vec<Certificate>,
}

impl std::fmt::Debug for SigningCertificate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningCertificate")
            .field("subject", &self.certificate.tbs_certificate.subject.to_string())
            .field("key", &self.key)
            .field("chain", &format!("{} certificates", self.chain.len()))
            .finish()
    }
}

impl SigningCertificate {
    /// Assemble from a certificate and key the caller already holds.
    pub fn new(certificate: Certificate, key: Option<SigningKey>) -> Result<Self> {
        let key = key.ok_or_else(|| {
            Error::Certificate(format!(
                "certificate '{}' has no private key",
                certificate.tbs_certificate.subject
            ))
        })?;
        if !key.matches_certificate(&certificate) {
            return Err(Error::Certificate(
                "private key does not belong to the certificate".to_string(),
            ));
        }
        Ok(Self {
            certificate,
            key,
            chain: Vec::new(),
        })
    }

    /// Load from DER certificate bytes and a PKCS#8 DER key.
    pub fn from_der(certificate_der: &[u8], pkcs8_key_der: &[u8]) -> Result<Self> {
        let certificate =
            Certificate::from_der(certificate_der).map_err(|e| Error::certificate("invalid certificate", e))?;
        Self::new(certificate, Some(SigningKey::from_pkcs8_der(pkcs8_key_der)?))
    }

    /// Load from a PKCS#12 (.p12/.pfx) container.
    ///
    /// The certificate matching the private key becomes the signer; the other
    /// certificates of the key's chain are kept as the chain.
    pub fn from_pkcs12(data: &[u8], password: &str) -> Result<Self> {
        let keystore = p12_keystore::KeyStore::from_pkcs12(data, password)
            .map_err(|e| Error::certificate("failed to open PKCS#12 container", e))?;
        let (alias, key_chain) = keystore
            .private_key_chain()
            .ok_or_else(|| Error::Certificate("PKCS#12 container holds no private key".to_string()))?;

        let key = SigningKey::from_pkcs8_der(key_chain.key())?;
        let mut certs = key_chain
            .chain()
            .iter()
            .map(|c| Certificate::from_der(c.as_der()))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::certificate("invalid certificate in PKCS#12 container", e))?;

        let leaf_index = certs
            .iter()
            .position(|c| key.matches_certificate(c))
            .ok_or_else(|| Error::Certificate(format!("no certificate for key '{}'", alias)))?;
        let certificate = certs.remove(leaf_index);
        log::debug!(
            "loaded PKCS#12 entry '{}': {} key, {} chain certificates",
            alias,
            key.algorithm_name(),
            certs.len()
        );

        Ok(Self {
            certificate,
            key,
            chain: certs,
        })
    }

    pub fn from_pkcs12_file(path: impl AsRef<Path>, password: &str) -> Result<Self> {
        let data = std::fs::read(path.as_ref())?;
        Self::from_pkcs12(&data, password)
    }

    /// Load from PEM text: a certificate (plus optional chain certificates) and a key.
    pub fn from_pem(certificate_pem: &str, key_pem: &str) -> Result<Self> {
        let mut certs = parse_certificates(certificate_pem.as_bytes())?;
        if certs.is_empty() {
            return Err(Error::Certificate("no certificate in PEM input".to_string()));
        }
        let certificate = certs.remove(0);
        let mut loaded = Self::new(certificate, Some(SigningKey::from_pem(key_pem)?))?;
        loaded.chain = certs;
        Ok(loaded)
    }

    /// Look the certificate up in a store by thumbprint.
    pub fn from_store(
        store: &dyn CertificateStore,
        thumbprint: &str,
        store_name: &str,
        location: StoreLocation,
    ) -> Result<Self> {
        let entry = store.find(thumbprint, store_name, location)?.ok_or_else(|| {
            Error::Certificate(format!(
                "certificate {} not found in {}/{}",
                thumbprint,
                location.as_str(),
                store_name
            ))
        })?;
        Self::new(entry.certificate, entry.key)
    }

    /// Replace the chain. The signer's own certificate is dropped if present.
    pub fn with_chain(mut self, chain: Vec<Certificate>) -> Self {
        self.chain = chain.into_iter().filter(|c| *c != self.certificate).collect();
        self
    }

    /// Attach every certificate found in a folder as the chain.
    pub fn with_chain_from_folder(self, folder: impl AsRef<Path>) -> Result<Self> {
        let certs = load_certificates_from_folder(folder.as_ref())?;
        Ok(self.with_chain(certs))
    }

    /// Build the chain with `builder`, using the current chain as intermediates.
    pub fn with_auto_chain(mut self, builder: &dyn ChainBuilder) -> Result<Self> {
        let chain = builder.build(&self.certificate, &self.chain)?;
        log::debug!("built chain of {} certificates", chain.len());
        self.chain = chain;
        Ok(self)
    }

    pub fn certificate(&self) -> &Certificate {
        &self.certificate
    }

    pub fn key(&self) -> &SigningKey {
        &self.key
    }

    /// Certificates above the signer, excluding it.
    pub fn chain(&self) -> &[Certificate] {
        &self.chain
    }

    /// Key is present and matches the certificate.
    pub fn has_private_key(&self) -> bool {
        self.key.matches_certificate(&self.certificate)
    }

    pub fn summary(&self) -> Result<CertificateSummary> {
        CertificateSummary::of(&self.certificate)
    }

    pub fn common_name(&self) -> Option<String> {
        self.summary().ok().and_then(|s| s.common_name)
    }

    pub fn serial_hex(&self) -> String {
        self.summary().map(|s| s.serial_hex).unwrap_or_default()
    }

    pub fn issuer_name(&self) -> String {
        self.certificate.tbs_certificate.issuer.to_string()
    }

    pub fn thumbprint(&self) -> Result<String> {
        thumbprint(&self.certificate)
    }

    pub fn not_after(&self) -> Option<DateTime<Utc>> {
        self.summary().ok().map(|s| s.not_after)
    }
}

/// Where a [`SigningCertificate`] comes from, as declared in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum CertificateSource {
    /// PKCS#12 container on disk
    #[serde(rename_all = "camelCase")]
    Pkcs12 {
        path: PathBuf,
        password: String,
        #[serde(default)]
        chain_folder: Option<PathBuf>,
    },
    /// PEM certificate and key files
    #[serde(rename_all = "camelCase")]
    Pem {
        certificate: PathBuf,
        key: PathBuf,
        #[serde(default)]
        chain_folder: Option<PathBuf>,
    },
    /// Certificate store directory
    #[serde(rename_all = "camelCase")]
    Store {
        root: PathBuf,
        thumbprint: String,
        #[serde(default = "default_store_name")]
        store: String,
        #[serde(default)]
        location: StoreLocation,
        /// Folder of trusted certificates to build the chain from
        #[serde(default)]
        trust_folder: Option<PathBuf>,
    },
}

fn default_store_name() -> String {
    "My".to_string()
}

impl CertificateSource {
    pub fn load(&self) -> Result<SigningCertificate> {
        match self {
            CertificateSource::Pkcs12 {
                path,
                password,
                chain_folder,
            } => {
                let cert = SigningCertificate::from_pkcs12_file(path, password)?;
                match chain_folder {
                    Some(folder) => cert.with_chain_from_folder(folder),
                    None => Ok(cert),
                }
            },
            CertificateSource::Pem {
                certificate,
                key,
                chain_folder,
            } => {
                let cert_pem = std::fs::read_to_string(certificate)?;
                let key_pem = std::fs::read_to_string(key)?;
                let cert = SigningCertificate::from_pem(&cert_pem, &key_pem)?;
                match chain_folder {
                    Some(folder) => cert.with_chain_from_folder(folder),
                    None => Ok(cert),
                }
            },
            CertificateSource::Store {
                root,
                thumbprint,
                store,
                location,
                trust_folder,
            } => {
                let store_impl = DirectoryCertificateStore::new(root);
                let cert = SigningCertificate::from_store(&store_impl, thumbprint, store, *location)?;
                match trust_folder {
                    Some(folder) => {
                        let builder = super::chain::LocalTrustStoreChainBuilder::from_folder(folder)?;
                        cert.with_auto_chain(&builder)
                    },
                    None => Ok(cert),
                }
            },
        }
    }
}
