//! PAdES digital signatures.
//!
//! Creation and verification of PDF signatures at the PAdES baseline levels:
//!
//! - **B**: CMS detached signature (`ETSI.CAdES.detached`) with the signer's chain
//! - **T**: plus an RFC 3161 signature timestamp
//! - **LT**: plus embedded OCSP responses and CRLs
//! - **LTA**: plus a Document Security Store and a document timestamp
//!
//! ## Example
//!
//! ```no_run
//! use pdf_pades::signatures::{
//!     PdfSigner, SignOptions, SignatureLevel, SignatureVerifier, SigningCertificate, TsaConfig,
//! };
//!
//! # fn main() -> pdf_pades::Result<()> {
//! let certificate = SigningCertificate::from_pkcs12_file("signer.p12", "changeit")?;
//! let options = SignOptions::new(SignatureLevel::T)
//!     .with_tsa(TsaConfig::new("http://timestamp.example.com/tsa"))
//!     .with_reason("Approved");
//!
//! let signed = PdfSigner::new()?.sign(std::fs::read("input.pdf")?, certificate, &options)?;
//! let report = SignatureVerifier::new().verify(&signed.signed_bytes)?;
//! assert!(report.is_valid);
//! # Ok(())
//! # }
//! ```
//!
//! ## References
//!
//! - ISO 32000-1:2008 Section 12.8 - Digital Signatures
//! - ETSI EN 319 142 - PAdES
//! - RFC 5652 (CMS), RFC 3161 (TSP), RFC 6960 (OCSP)

pub mod appearance;
mod byterange;
pub mod certificate;
pub mod chain;
pub mod cms;
pub mod dss;
pub mod oid;
pub mod revocation;
mod signer;
pub mod timestamp;
pub mod transport;
mod types;
mod verifier;

pub use byterange::ByteRangeCalculator;
pub use certificate::{
    CertificateSource, CertificateStore, CertificateSummary, DirectoryCertificateStore, SigningCertificate,
    SigningKey, StoreEntry, StoreLocation,
};
pub use chain::{ChainBuilder, LocalTrustStoreChainBuilder};
pub use dss::DocumentSecurityStore;
pub use revocation::{HttpRevocationSource, RevocationData, RevocationSource, StaticRevocationSource};
pub use signer::{format_pdf_date, next_field_name, PdfSigner};
pub use timestamp::{TimestampClient, TimestampToken};
pub use transport::{HttpRequest, HttpResponse, HttpTransport, Method, Transport};
pub use types::{
    CertificateInfo, CertificateStatus, CertificationLevel, HashAlgorithm, Rect, SignOptions, SignatureAppearance,
    SignatureLevel, SignatureResult, SignatureSubFilter, SignatureVerificationInfo, SignerDetails, TimestampInfo,
    TsaConfig, TsaCredentials, VerificationResult, VerificationStatus, VisibleField,
};
pub use verifier::{parse_pdf_date, SignatureVerifier};
