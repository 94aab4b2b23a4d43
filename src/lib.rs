// Allow some clippy lints that are too pedantic for this project
#![allow(clippy::too_many_arguments)]
#![allow(clippy::enum_variant_names)]
#![allow(clippy::should_implement_trait)]
#![allow(clippy::new_without_default)]
// Allow unused for tests
#![cfg_attr(test, allow(dead_code))]

//! # PDF PAdES
//!
//! PAdES signing and verification for PDF documents in Rust.
//!
//! ## Core Features
//!
//! - **Signing**: PAdES baseline levels B, T, LT and LTA as incremental updates
//! - **Timestamps**: RFC 3161 client with nonce and imprint checks
//! - **Long-term validation**: OCSP and CRL embedding, Document Security Store
//! - **Certificates**: PKCS#12, PEM and directory certificate stores
//! - **Verification**: per-signature integrity, coverage, chain and level report
//! - **Appearances**: visible widgets with text lines and PNG/JPEG images
//!
//! ## Architecture
//!
//! - [`document`] parses existing documents (classic and stream cross-reference
//!   tables, object streams) without rewriting them
//! - [`writer`] appends incremental sections
//! - [`signatures`] builds and checks the CMS containers
//! - network access goes through the injectable [`signatures::Transport`]
//!
//! ## Quick Start
//!
//! ```no_run
//! use pdf_pades::signatures::{PdfSigner, SignOptions, SignatureVerifier, SigningCertificate};
//!
//! # fn main() -> pdf_pades::Result<()> {
//! let certificate = SigningCertificate::from_pkcs12_file("signer.p12", "changeit")?;
//! let signer = PdfSigner::new()?;
//! let result = signer.sign_file("in.pdf", "signed.pdf", certificate, &SignOptions::default())?;
//! println!("signed field {}", result.field_name);
//!
//! let report = SignatureVerifier::new().verify_file("signed.pdf")?;
//! println!("{}", report.summary);
//! # Ok(())
//! # }
//! ```

// Error handling
pub mod error;

// Core PDF object layer
pub mod document;
pub mod lexer;
pub mod object;
pub mod objstm;
pub mod parser;
pub mod xref;

// Stream filters
pub mod decoders;

// Incremental writing
pub mod writer;

// PAdES signatures
pub mod signatures;

// Configuration
pub mod config;

// Re-exports
pub use config::SigningConfig;
pub use document::PdfDocument;
pub use error::{Error, ErrorKind, Result};
pub use signatures::{PdfSigner, SignOptions, SignatureLevel, SignatureVerifier, SigningCertificate};

// Version info
/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        // VERSION is populated from CARGO_PKG_VERSION at compile time
        assert!(VERSION.starts_with("0."));
    }

    #[test]
    fn test_name() {
        assert_eq!(NAME, "pdf_pades");
    }

    #[test]
    fn test_shared_types_are_thread_safe() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<PdfSigner>();
        assert_send_sync::<SignatureVerifier>();
        assert_send_sync::<SigningConfig>();
    }
}
