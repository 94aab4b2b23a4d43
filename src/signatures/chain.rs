//! Certificate chain construction.
//!
//! Chains are built by following issuer→subject links and checking each
//! issuer's signature over the child's TBS bytes. Revocation is not consulted.

use crate::error::{Error, Result};
use der::Encode;
use std::path::Path;
use x509_cert::Certificate;

use super::certificate::{hash_for_signature_algorithm, load_certificates_from_folder, verify_digest_signature};

/// Longest chain followed before giving up.
const MAX_CHAIN_DEPTH: usize = 10;

/// Builds the certificate chain for a leaf certificate.
pub trait ChainBuilder: Send + Sync {
    /// Chain from the leaf's issuer upwards, excluding the leaf itself.
    fn build(&self, leaf: &Certificate, intermediates: &[Certificate]) -> Result<Vec<Certificate>>;
}

/// Check that `issuer` signed `child`.
pub fn verify_issued_by(child: &Certificate, issuer: &Certificate) -> Result<()> {
    if child.tbs_certificate.issuer != issuer.tbs_certificate.subject {
        return Err(Error::Cryptographic(format!(
            "'{}' is not the issuer of '{}'",
            issuer.tbs_certificate.subject, child.tbs_certificate.subject
        )));
    }
    let hash = hash_for_signature_algorithm(&child.signature_algorithm.oid).ok_or_else(|| {
        Error::Cryptographic(format!(
            "unsupported certificate signature algorithm {}",
            child.signature_algorithm.oid
        ))
    })?;
    let tbs = child
        .tbs_certificate
        .to_der()
        .map_err(|e| Error::crypto("failed to encode TBS certificate", e))?;
    let signature = child
        .signature
        .as_bytes()
        .ok_or_else(|| Error::Cryptographic("certificate signature has unused bits".to_string()))?;

    verify_digest_signature(
        &issuer.tbs_certificate.subject_public_key_info,
        hash,
        &hash.digest(&tbs),
        signature,
    )
}

/// Subject equals issuer and the certificate verifies under its own key.
pub fn is_self_signed(certificate: &Certificate) -> bool {
    verify_issued_by(certificate, certificate).is_ok()
}

/// Chain builder over a fixed set of trusted certificates, such as the local
/// trust store.
#[derive(Debug, Clone, Default)]
pub struct LocalTrustStoreChainBuilder {
    trusted: Vec<Certificate>,
}

impl LocalTrustStoreChainBuilder {
    pub fn new(trusted: Vec<Certificate>) -> Self {
        Self { trusted }
    }

    /// Trust every certificate file in a folder.
    pub fn from_folder(folder: impl AsRef<Path>) -> Result<Self> {
        let trusted = load_certificates_from_folder(folder.as_ref())?;
        log::debug!("loaded {} trusted certificates from {}", trusted.len(), folder.as_ref().display());
        Ok(Self::new(trusted))
    }

    pub fn trusted(&self) -> &[Certificate] {
        &self.trusted
    }

    pub fn is_empty(&self) -> bool {
        self.trusted.is_empty()
    }

    /// Number of certificates from the leaf up to a trusted certificate, when
    /// such a path exists.
    pub fn trusted_path_len(&self, leaf: &Certificate, intermediates: &[Certificate]) -> Option<usize> {
        if self.trusted.contains(leaf) {
            return Some(1);
        }
        let chain = self.build(leaf, intermediates).ok()?;
        let last = chain.last()?;
        self.trusted.contains(last).then_some(chain.len() + 1)
    }

    fn find_issuer<'a>(&'a self, child: &Certificate, intermediates: &'a [Certificate]) -> Option<&'a Certificate> {
        intermediates
            .iter()
            .chain(self.trusted.iter())
            .filter(|candidate| *candidate != child)
            .find(|candidate| verify_issued_by(child, candidate).is_ok())
    }
}

impl ChainBuilder for LocalTrustStoreChainBuilder {
    fn build(&self, leaf: &Certificate, intermediates: &[Certificate]) -> Result<Vec<Certificate>> {
        let mut chain: Vec<Certificate> = Vec::new();
        let mut current = leaf;

        while !is_self_signed(current) {
            if chain.len() >= MAX_CHAIN_DEPTH {
                return Err(Error::Certificate(format!(
                    "certificate chain longer than {} certificates",
                    MAX_CHAIN_DEPTH
                )));
            }
            let Some(issuer) = self.find_issuer(current, intermediates) else {
                log::debug!("no issuer found for '{}'", current.tbs_certificate.subject);
                break;
            };
            if chain.contains(issuer) {
                break;
            }
            chain.push(issuer.clone());
            current = issuer;
        }

        Ok(chain)
    }
}
