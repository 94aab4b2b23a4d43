//! CMS `SignedData` containers.
//!
//! [`SignedDataBuilder`] produces the detached CAdES container embedded in a
//! signature's `/Contents`, and the encapsulated containers used for timestamp
//! tokens. [`SignedContainer`] parses either kind back and verifies it.
//!
//! Signed attributes are verified against their original encoding. Decoding
//! a `SET OF` re-sorts its elements, so re-encoding a parsed container does not
//! reproduce the signed bytes when the producer did not sort them.

use crate::error::{Error, Result};
use cms::cert::{CertificateChoices, IssuerAndSerialNumber};
use cms::content_info::{CmsVersion, ContentInfo};
use cms::revocation::{RevocationInfoChoice, RevocationInfoChoices};
use cms::signed_data::{
    CertificateSet, EncapsulatedContentInfo, SignedData, SignerIdentifier, SignerInfo, SignerInfos,
};
use const_oid::ObjectIdentifier;
use der::asn1::{OctetString, SetOfVec};
use der::{Any, Decode, Encode, Header, Sequence, SliceReader};
use spki::AlgorithmIdentifierOwned;
use x509_cert::attr::Attribute;
use x509_cert::crl::CertificateList;
use x509_cert::ext::pkix::name::{GeneralName, GeneralNames};
use x509_cert::ext::pkix::SubjectKeyIdentifier;
use x509_cert::serial_number::SerialNumber;
use x509_cert::Certificate;

use super::certificate::{verify_digest_signature, SigningKey};
use super::oid;
use super::types::HashAlgorithm;

fn der_err(e: der::Error) -> Error {
    Error::crypto("DER", e)
}

/// `IssuerSerial` of an ESS certificate identifier.
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct IssuerSerial {
    pub issuer: GeneralNames,
    pub serial_number: SerialNumber,
}

/// `ESSCertIDv2`. The hash algorithm is omitted for SHA-256, its default.
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct EssCertIdV2 {
    #[asn1(optional = "true")]
    pub hash_algorithm: Option<AlgorithmIdentifierOwned>,
    pub cert_hash: OctetString,
    #[asn1(optional = "true")]
    pub issuer_serial: Option<IssuerSerial>,
}

/// `SigningCertificateV2` signed attribute value.
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct SigningCertificateV2 {
    pub certs: Vec<EssCertIdV2>,
    #[asn1(optional = "true")]
    pub policies: Option<Vec<Any>>,
}

impl SigningCertificateV2 {
    /// Identifier for `certificate`, hashed with SHA-256.
    pub fn for_certificate(certificate: &Certificate) -> Result<Self> {
        let der = certificate.to_der().map_err(der_err)?;
        Ok(Self {
            certs: vec![EssCertIdV2 {
                hash_algorithm: None,
                cert_hash: OctetString::new(HashAlgorithm::Sha256.digest(&der)).map_err(der_err)?,
                issuer_serial: Some(IssuerSerial {
                    issuer: vec![GeneralName::DirectoryName(certificate.tbs_certificate.issuer.clone())],
                    serial_number: certificate.tbs_certificate.serial_number.clone(),
                }),
            }],
            policies: None,
        })
    }

    /// True when the first identifier names `certificate`.
    pub fn identifies(&self, certificate: &Certificate) -> bool {
        let Some(id) = self.certs.first() else {
            return false;
        };
        let hash = match &id.hash_algorithm {
            None => HashAlgorithm::Sha256,
            Some(alg) => match HashAlgorithm::from_oid(&alg.oid) {
                Some(hash) => hash,
                None => return false,
            },
        };
        certificate
            .to_der()
            .map(|der| hash.digest(&der) == id.cert_hash.as_bytes())
            .unwrap_or(false)
    }
}

/// `adbe-revocationInfoArchival` signed attribute value.
#[derive(Clone, Debug, Default, Eq, PartialEq, Sequence)]
pub struct RevocationInfoArchival {
    #[asn1(context_specific = "0", tag_mode = "EXPLICIT", optional = "true")]
    pub crl: Option<Vec<Any>>,
    #[asn1(context_specific = "1", tag_mode = "EXPLICIT", optional = "true")]
    pub ocsp: Option<Vec<Any>>,
    #[asn1(context_specific = "2", tag_mode = "EXPLICIT", optional = "true")]
    pub other_rev_info: Option<Vec<Any>>,
}

impl RevocationInfoArchival {
    pub fn new(crls: &[Vec<u8>], ocsp_responses: &[Vec<u8>]) -> Result<Self> {
        let wrap = |blobs: &[Vec<u8>]| -> Result<Option<Vec<Any>>> {
            if blobs.is_empty() {
                return Ok(None);
            }
            blobs
                .iter()
                .map(|b| Any::from_der(b).map_err(der_err))
                .collect::<Result<Vec<_>>>()
                .map(Some)
        };
        Ok(Self {
            crl: wrap(crls)?,
            ocsp: wrap(ocsp_responses)?,
            other_rev_info: None,
        })
    }

    pub fn crls(&self) -> Vec<Vec<u8>> {
        Self::unwrap(&self.crl)
    }

    pub fn ocsp_responses(&self) -> Vec<Vec<u8>> {
        Self::unwrap(&self.ocsp)
    }

    fn unwrap(values: &Option<Vec<Any>>) -> Vec<Vec<u8>> {
        values
            .iter()
            .flatten()
            .filter_map(|v| v.to_der().ok())
            .collect()
    }
}

/// Attribute with a single value.
pub fn attribute(oid: ObjectIdentifier, value: Any) -> Result<Attribute> {
    Ok(Attribute {
        oid,
        values: SetOfVec::try_from(vec![value]).map_err(der_err)?,
    })
}

/// Builder for a `SignedData` with one signer.
pub struct SignedDataBuilder<'a> {
    key: &'a SigningKey,
    certificate: &'a Certificate,
    chain: &'a [Certificate],
    hash_algorithm: HashAlgorithm,
    content_type: ObjectIdentifier,
    encapsulated: Option<Vec<u8>>,
    signed_attributes: Vec<Attribute>,
    crls: Vec<Vec<u8>>,
}

impl<'a> SignedDataBuilder<'a> {
    pub fn new(key: &'a SigningKey, certificate: &'a Certificate, hash_algorithm: HashAlgorithm) -> Self {
        Self {
            key,
            certificate,
            chain: &[],
            hash_algorithm,
            content_type: oid::ID_DATA,
            encapsulated: None,
            signed_attributes: Vec::new(),
            crls: Vec::new(),
        }
    }

    /// Certificates embedded next to the signer's own.
    pub fn with_chain(mut self, chain: &'a [Certificate]) -> Self {
        self.chain = chain;
        self
    }

    /// Carry `content` inside the container instead of signing detached.
    pub fn with_encapsulated_content(mut self, content_type: ObjectIdentifier, content: Vec<u8>) -> Self {
        self.content_type = content_type;
        self.encapsulated = Some(content);
        self
    }

    pub fn with_signed_attribute(mut self, attribute: Attribute) -> Self {
        self.signed_attributes.push(attribute);
        self
    }

    /// DER CRLs for the `crls` set.
    pub fn with_crls(mut self, crls: Vec<Vec<u8>>) -> Self {
        self.crls = crls;
        self
    }

    /// Sign the encapsulated content.
    pub fn build(self) -> Result<SignedContainer> {
        let content = self
            .encapsulated
            .as_deref()
            .ok_or_else(|| Error::Cryptographic("no encapsulated content to sign".to_string()))?;
        let digest = self.hash_algorithm.digest(content);
        self.build_with_digest(&digest)
    }

    /// Sign detached content whose digest is already known.
    pub fn build_detached(self, content_digest: &[u8]) -> Result<SignedContainer> {
        self.build_with_digest(content_digest)
    }

    fn build_with_digest(self, content_digest: &[u8]) -> Result<SignedContainer> {
        if content_digest.len() != self.hash_algorithm.output_len() {
            return Err(Error::Cryptographic(format!(
                "{} digest must be {} bytes, got {}",
                self.hash_algorithm.name(),
                self.hash_algorithm.output_len(),
                content_digest.len()
            )));
        }

        let mut attributes = vec![
            attribute(oid::ID_CONTENT_TYPE, Any::encode_from(&self.content_type).map_err(der_err)?)?,
            attribute(
                oid::ID_MESSAGE_DIGEST,
                Any::encode_from(&OctetString::new(content_digest).map_err(der_err)?).map_err(der_err)?,
            )?,
            attribute(
                oid::ID_AA_SIGNING_CERTIFICATE_V2,
                Any::encode_from(&SigningCertificateV2::for_certificate(self.certificate)?).map_err(der_err)?,
            )?,
        ];
        attributes.extend(self.signed_attributes);

        let signed_attrs = SetOfVec::try_from(attributes).map_err(der_err)?;
        let signed_attrs_der = signed_attrs.to_der().map_err(der_err)?;
        let signature = self
            .key
            .sign_digest(self.hash_algorithm, &self.hash_algorithm.digest(&signed_attrs_der))?;

        let digest_alg = AlgorithmIdentifierOwned {
            oid: self.hash_algorithm.oid(),
            parameters: None,
        };
        let signer_info = SignerInfo {
            version: CmsVersion::V1,
            sid: SignerIdentifier::IssuerAndSerialNumber(IssuerAndSerialNumber {
                issuer: self.certificate.tbs_certificate.issuer.clone(),
                serial_number: self.certificate.tbs_certificate.serial_number.clone(),
            }),
            digest_alg: digest_alg.clone(),
            signed_attrs: Some(signed_attrs),
            signature_algorithm: self.key.signature_algorithm(self.hash_algorithm),
            signature: OctetString::new(signature).map_err(der_err)?,
            unsigned_attrs: None,
        };

        let mut certificates: Vec<CertificateChoices> = Vec::with_capacity(self.chain.len() + 1);
        for cert in std::iter::once(self.certificate).chain(self.chain.iter()) {
            let choice = CertificateChoices::Certificate(cert.clone());
            if !certificates.contains(&choice) {
                certificates.push(choice);
            }
        }

        let crls = if self.crls.is_empty() {
            None
        } else {
            let choices = self
                .crls
                .iter()
                .map(|der| CertificateList::from_der(der).map(RevocationInfoChoice::Crl))
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| Error::crypto("invalid CRL", e))?;
            Some(RevocationInfoChoices(SetOfVec::try_from(choices).map_err(der_err)?))
        };

        let econtent = match &self.encapsulated {
            Some(content) => Some(
                Any::encode_from(&OctetString::new(content.as_slice()).map_err(der_err)?).map_err(der_err)?,
            ),
            None => None,
        };

        let signed_data = SignedData {
            version: if self.content_type == oid::ID_DATA {
                CmsVersion::V1
            } else {
                CmsVersion::V3
            },
            digest_algorithms: SetOfVec::try_from(vec![digest_alg]).map_err(der_err)?,
            encap_content_info: EncapsulatedContentInfo {
                econtent_type: self.content_type,
                econtent,
            },
            certificates: Some(CertificateSet(SetOfVec::try_from(certificates).map_err(der_err)?)),
            crls,
            signer_infos: SignerInfos(SetOfVec::try_from(vec![signer_info]).map_err(der_err)?),
        };

        Ok(SignedContainer {
            signed_data,
            raw_signed_attrs: Some(signed_attrs_der),
        })
    }
}

/// A parsed or freshly built `SignedData`.
#[derive(Debug, Clone)]
pub struct SignedContainer {
    signed_data: SignedData,
    /// Signed attributes of the first signer as they were signed, tagged as SET
    raw_signed_attrs: Option<Vec<u8>>,
}

impl SignedContainer {
    /// Parse a DER `ContentInfo`. Bytes after the structure, such as the zero
    /// padding of a `/Contents` placeholder, are ignored.
    pub fn from_der(bytes: &[u8]) -> Result<Self> {
        let mut reader = SliceReader::new(bytes).map_err(der_err)?;
        let content_info =
            ContentInfo::decode(&mut reader).map_err(|e| Error::crypto("invalid CMS ContentInfo", e))?;
        if content_info.content_type != oid::ID_SIGNED_DATA {
            return Err(Error::Cryptographic(format!(
                "CMS content type {} is not signedData",
                content_info.content_type
            )));
        }
        let signed_data = SignedData::from_der(&content_info.content.to_der().map_err(der_err)?)
            .map_err(|e| Error::crypto("invalid CMS SignedData", e))?;
        let raw_signed_attrs = raw_signed_attributes(bytes)?;

        Ok(Self {
            signed_data,
            raw_signed_attrs,
        })
    }

    /// Encode as a `ContentInfo`.
    pub fn to_der(&self) -> Result<Vec<u8>> {
        ContentInfo {
            content_type: oid::ID_SIGNED_DATA,
            content: Any::encode_from(&self.signed_data).map_err(der_err)?,
        }
        .to_der()
        .map_err(der_err)
    }

    pub fn signed_data(&self) -> &SignedData {
        &self.signed_data
    }

    fn signer_info(&self) -> Result<&SignerInfo> {
        self.signed_data
            .signer_infos
            .0
            .get(0)
            .ok_or_else(|| Error::Cryptographic("CMS container without SignerInfo".to_string()))
    }

    /// Digest algorithm of the first signer.
    pub fn digest_algorithm(&self) -> Option<HashAlgorithm> {
        self.signer_info()
            .ok()
            .and_then(|si| HashAlgorithm::from_oid(&si.digest_alg.oid))
    }

    /// Signature value of the first signer.
    pub fn signature_value(&self) -> Result<&[u8]> {
        Ok(self.signer_info()?.signature.as_bytes())
    }

    pub fn certificates(&self) -> Vec<Certificate> {
        self.signed_data
            .certificates
            .iter()
            .flat_map(|set| set.0.iter())
            .filter_map(|choice| match choice {
                CertificateChoices::Certificate(cert) => Some(cert.clone()),
                _ => None,
            })
            .collect()
    }

    /// DER CRLs from the `crls` set.
    pub fn crls(&self) -> Vec<Vec<u8>> {
        self.signed_data
            .crls
            .iter()
            .flat_map(|set| set.0.iter())
            .filter_map(|choice| match choice {
                RevocationInfoChoice::Crl(crl) => crl.to_der().ok(),
                _ => None,
            })
            .collect()
    }

    /// Certificate named by the first signer's identifier.
    pub fn signer_certificate(&self) -> Option<Certificate> {
        let sid = &self.signer_info().ok()?.sid;
        self.certificates().into_iter().find(|cert| match sid {
            SignerIdentifier::IssuerAndSerialNumber(isn) => {
                cert.tbs_certificate.issuer == isn.issuer && cert.tbs_certificate.serial_number == isn.serial_number
            },
            SignerIdentifier::SubjectKeyIdentifier(skid) => subject_key_identifier(cert).as_ref() == Some(skid),
        })
    }

    /// Encapsulated content type and bytes, when not detached.
    pub fn encapsulated_content(&self) -> Option<(ObjectIdentifier, Vec<u8>)> {
        let info = &self.signed_data.encap_content_info;
        let econtent = info.econtent.as_ref()?;
        let octets = econtent.decode_as::<OctetString>().ok()?;
        Some((info.econtent_type, octets.as_bytes().to_vec()))
    }

    /// First value of a signed attribute, DER-encoded.
    pub fn signed_attribute(&self, oid: ObjectIdentifier) -> Option<Any> {
        let attrs = self.signer_info().ok()?.signed_attrs.as_ref()?;
        first_value(attrs.iter(), oid)
    }

    /// First value of an unsigned attribute.
    pub fn unsigned_attribute(&self, oid: ObjectIdentifier) -> Option<Any> {
        let attrs = self.signer_info().ok()?.unsigned_attrs.as_ref()?;
        first_value(attrs.iter(), oid)
    }

    /// Add an unsigned attribute to the first signer. The signature is unaffected.
    pub fn add_unsigned_attribute(&mut self, attr: Attribute) -> Result<()> {
        let mut infos: Vec<SignerInfo> = self.signed_data.signer_infos.0.iter().cloned().collect();
        let first = infos
            .first_mut()
            .ok_or_else(|| Error::Cryptographic("CMS container without SignerInfo".to_string()))?;

        let mut attrs: Vec<Attribute> = first
            .unsigned_attrs
            .as_ref()
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        attrs.push(attr);
        first.unsigned_attrs = Some(SetOfVec::try_from(attrs).map_err(der_err)?);

        self.signed_data.signer_infos = SignerInfos(SetOfVec::try_from(infos).map_err(der_err)?);
        Ok(())
    }

    /// The `messageDigest` signed attribute.
    pub fn message_digest(&self) -> Option<Vec<u8>> {
        self.signed_attribute(oid::ID_MESSAGE_DIGEST)?
            .decode_as::<OctetString>()
            .ok()
            .map(|o| o.as_bytes().to_vec())
    }

    /// Verify the first signer over detached content given as slices.
    pub fn verify_detached(&self, content_parts: &[&[u8]]) -> Result<()> {
        let hash = self.require_digest_algorithm()?;
        self.verify_with_content_digest(&hash.digest_parts(content_parts))
    }

    /// Verify the first signer over the encapsulated content.
    pub fn verify_encapsulated(&self) -> Result<()> {
        let (_, content) = self
            .encapsulated_content()
            .ok_or_else(|| Error::Cryptographic("container has no encapsulated content".to_string()))?;
        let hash = self.require_digest_algorithm()?;
        self.verify_with_content_digest(&hash.digest(&content))
    }

    fn require_digest_algorithm(&self) -> Result<HashAlgorithm> {
        let signer = self.signer_info()?;
        HashAlgorithm::from_oid(&signer.digest_alg.oid).ok_or_else(|| {
            Error::Cryptographic(format!("unsupported digest algorithm {}", signer.digest_alg.oid))
        })
    }

    fn verify_with_content_digest(&self, content_digest: &[u8]) -> Result<()> {
        let signer = self.signer_info()?;
        let hash = self.require_digest_algorithm()?;
        let certificate = self
            .signer_certificate()
            .ok_or_else(|| Error::Cryptographic("signer certificate not found in container".to_string()))?;
        let spki = &certificate.tbs_certificate.subject_public_key_info;
        let signature = signer.signature.as_bytes();

        match &signer.signed_attrs {
            None => verify_digest_signature(spki, hash, content_digest, signature),
            Some(attrs) => {
                let message_digest = self
                    .message_digest()
                    .ok_or_else(|| Error::Cryptographic("messageDigest attribute missing".to_string()))?;
                if message_digest != content_digest {
                    return Err(Error::Cryptographic(
                        "messageDigest does not match the signed content".to_string(),
                    ));
                }
                let encoded = match &self.raw_signed_attrs {
                    Some(raw) => raw.clone(),
                    None => attrs.to_der().map_err(der_err)?,
                };
                verify_digest_signature(spki, hash, &hash.digest(&encoded), signature)
            },
        }
    }
}

fn first_value<'a>(mut attrs: impl Iterator<Item = &'a Attribute>, oid: ObjectIdentifier) -> Option<Any> {
    attrs.find(|a| a.oid == oid)?.values.iter().next().cloned()
}

fn subject_key_identifier(certificate: &Certificate) -> Option<SubjectKeyIdentifier> {
    const ID_CE_SUBJECT_KEY_IDENTIFIER: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.29.14");
    certificate
        .tbs_certificate
        .extensions
        .as_ref()?
        .iter()
        .find(|ext| ext.extn_id == ID_CE_SUBJECT_KEY_IDENTIFIER)
        .and_then(|ext| SubjectKeyIdentifier::from_der(ext.extn_value.as_bytes()).ok())
}

/// Split the next TLV off `input`, returning `(whole element, contents, rest)`.
fn next_tlv(input: &[u8]) -> Result<(&[u8], &[u8], &[u8])> {
    let mut reader = SliceReader::new(input).map_err(der_err)?;
    let header = Header::decode(&mut reader).map_err(der_err)?;
    let header_len = usize::try_from(header.encoded_len().map_err(der_err)?).map_err(der_err)?;
    let body_len = usize::try_from(header.length).map_err(der_err)?;
    let total = header_len
        .checked_add(body_len)
        .filter(|total| *total <= input.len())
        .ok_or_else(|| Error::Cryptographic("truncated DER element".to_string()))?;
    Ok((&input[..total], &input[header_len..total], &input[total..]))
}

/// The first DER element of `bytes`, without trailing data.
pub(crate) fn first_element(bytes: &[u8]) -> Result<&[u8]> {
    Ok(next_tlv(bytes)?.0)
}

/// Original encoding of the first signer's signed attributes, re-tagged from
/// `[0] IMPLICIT` to `SET`.
fn raw_signed_attributes(content_info: &[u8]) -> Result<Option<Vec<u8>>> {
    let (_, ci_body, _) = next_tlv(content_info)?;
    let (_, _, rest) = next_tlv(ci_body)?; // contentType
    let (_, explicit_body, _) = next_tlv(rest)?; // [0] EXPLICIT
    let (_, sd_body, _) = next_tlv(explicit_body)?; // SignedData

    let mut rest = sd_body;
    for _ in 0..3 {
        // version, digestAlgorithms, encapContentInfo
        rest = next_tlv(rest)?.2;
    }
    // optional certificates [0] and crls [1]
    while matches!(rest.first(), Some(0xA0) | Some(0xA1)) {
        rest = next_tlv(rest)?.2;
    }
    let (_, signer_infos, _) = next_tlv(rest)?;
    if signer_infos.is_empty() {
        return Ok(None);
    }
    let (_, signer_info, _) = next_tlv(signer_infos)?;

    let mut fields = signer_info;
    for _ in 0..3 {
        // version, sid, digestAlgorithm
        fields = next_tlv(fields)?.2;
    }
    if fields.first() != Some(&0xA0) {
        return Ok(None);
    }
    let mut raw = next_tlv(fields)?.0.to_vec();
    raw[0] = 0x31;
    Ok(Some(raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signatures::certificate::SigningCertificate;

    fn rsa_signer() -> SigningCertificate {
        SigningCertificate::from_pem(
            include_str!("../../tests/fixtures/signer_rsa.pem"),
            include_str!("../../tests/fixtures/signer_rsa.key"),
        )
        .unwrap()
    }

    fn ec_signer() -> SigningCertificate {
        SigningCertificate::from_pem(
            include_str!("../../tests/fixtures/signer_ec.pem"),
            include_str!("../../tests/fixtures/signer_ec.key"),
        )
        .unwrap()
    }

    #[test]
    fn test_detached_round_trip() {
        let signer = rsa_signer();
        let digest = HashAlgorithm::Sha256.digest(b"part one|part two");
        let container = SignedDataBuilder::new(signer.key(), signer.certificate(), HashAlgorithm::Sha256)
            .build_detached(&digest)
            .unwrap();
        let der = container.to_der().unwrap();

        let mut padded = der.clone();
        padded.extend_from_slice(&[0u8; 64]);
        let parsed = SignedContainer::from_der(&padded).unwrap();

        parsed.verify_detached(&[b"part one|", b"part two"]).unwrap();
        assert!(parsed.verify_detached(&[b"tampered"]).is_err());
        assert_eq!(parsed.digest_algorithm(), Some(HashAlgorithm::Sha256));
        assert_eq!(parsed.signer_certificate().as_ref(), Some(signer.certificate()));
        assert!(parsed.encapsulated_content().is_none());
    }

    #[test]
    fn test_signing_certificate_v2_attribute() {
        let signer = ec_signer();
        let digest = HashAlgorithm::Sha384.digest(b"doc");
        let container = SignedDataBuilder::new(signer.key(), signer.certificate(), HashAlgorithm::Sha384)
            .build_detached(&digest)
            .unwrap();
        let parsed = SignedContainer::from_der(&container.to_der().unwrap()).unwrap();

        let value = parsed.signed_attribute(oid::ID_AA_SIGNING_CERTIFICATE_V2).unwrap();
        let ess = value.decode_as::<SigningCertificateV2>().unwrap();
        assert!(ess.identifies(signer.certificate()));
        parsed.verify_detached(&[b"doc"]).unwrap();
    }

    #[test]
    fn test_encapsulated_content() {
        let signer = ec_signer();
        let container = SignedDataBuilder::new(signer.key(), signer.certificate(), HashAlgorithm::Sha256)
            .with_encapsulated_content(oid::ID_CT_TST_INFO, b"tst info bytes".to_vec())
            .build()
            .unwrap();
        let parsed = SignedContainer::from_der(&container.to_der().unwrap()).unwrap();
        let (content_type, content) = parsed.encapsulated_content().unwrap();
        assert_eq!(content_type, oid::ID_CT_TST_INFO);
        assert_eq!(content, b"tst info bytes");
        parsed.verify_encapsulated().unwrap();
    }

    #[test]
    fn test_unsigned_attribute_keeps_signature_valid() {
        let signer = rsa_signer();
        let digest = HashAlgorithm::Sha256.digest(b"content");
        let mut container = SignedDataBuilder::new(signer.key(), signer.certificate(), HashAlgorithm::Sha256)
            .build_detached(&digest)
            .unwrap();
        let token = Any::encode_from(&OctetString::new(vec![1u8, 2, 3]).unwrap()).unwrap();
        container
            .add_unsigned_attribute(attribute(oid::ID_AA_SIGNATURE_TIME_STAMP_TOKEN, token.clone()).unwrap())
            .unwrap();

        let parsed = SignedContainer::from_der(&container.to_der().unwrap()).unwrap();
        assert_eq!(parsed.unsigned_attribute(oid::ID_AA_SIGNATURE_TIME_STAMP_TOKEN), Some(token));
        parsed.verify_detached(&[b"content"]).unwrap();
    }

    #[test]
    fn test_revocation_archival_and_crls() {
        let signer = rsa_signer();
        let crl = include_bytes!("../../tests/fixtures/ca.crl").to_vec();
        let ocsp = include_bytes!("../../tests/fixtures/leaf_ocsp.der").to_vec();
        let archival = RevocationInfoArchival::new(&[crl.clone()], &[ocsp.clone()]).unwrap();

        let container = SignedDataBuilder::new(signer.key(), signer.certificate(), HashAlgorithm::Sha256)
            .with_signed_attribute(
                attribute(oid::ADBE_REVOCATION_INFO_ARCHIVAL, Any::encode_from(&archival).unwrap()).unwrap(),
            )
            .with_crls(vec![crl.clone()])
            .build_detached(&HashAlgorithm::Sha256.digest(b"x"))
            .unwrap();
        let parsed = SignedContainer::from_der(&container.to_der().unwrap()).unwrap();

        assert_eq!(parsed.crls(), vec![crl.clone()]);
        let decoded = parsed
            .signed_attribute(oid::ADBE_REVOCATION_INFO_ARCHIVAL)
            .unwrap()
            .decode_as::<RevocationInfoArchival>()
            .unwrap();
        assert_eq!(decoded.crls(), vec![crl]);
        assert_eq!(decoded.ocsp_responses(), vec![ocsp]);
        parsed.verify_detached(&[b"x"]).unwrap();
    }

    #[test]
    fn test_wrong_digest_length_rejected() {
        let signer = rsa_signer();
        let result = SignedDataBuilder::new(signer.key(), signer.certificate(), HashAlgorithm::Sha512)
            .build_detached(&[0u8; 32]);
        assert!(matches!(result, Err(Error::Cryptographic(_))));
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(SignedContainer::from_der(&[0x30, 0x03, 0x02, 0x01, 0x01]).is_err());
        assert!(SignedContainer::from_der(b"not der at all").is_err());
    }
}
