//! Signing configuration read from JSON.
//!
//! ```json
//! {
//!   "signatureLevel": "T",
//!   "hashAlgorithm": "SHA256",
//!   "signerInfo": { "reason": "Approved", "location": "Berlin" },
//!   "appearance": { "pageNumber": 1, "rect": { "x": 72, "y": 72, "width": 200, "height": 50 } },
//!   "tsa": { "url": "http://timestamp.example.com/tsa", "timeoutSeconds": 20 },
//!   "certificate": { "type": "pkcs12", "path": "signer.p12", "password": "changeit" }
//! }
//! ```
//!
//! Relative paths in a file loaded with [`SigningConfig::from_file`] are
//! resolved against the file's directory.

use crate::error::{Error, Result};
use crate::signatures::{
    CertificateSource, HashAlgorithm, Rect, SignOptions, SignatureAppearance, SignatureLevel, SignerDetails,
    SigningCertificate, TsaConfig, VisibleField,
};
use serde::Deserialize;
use std::path::{Path, PathBuf};

fn default_true() -> bool {
    true
}

/// Top-level signing configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SigningConfig {
    #[serde(default)]
    pub signature_level: SignatureLevel,
    #[serde(default)]
    pub hash_algorithm: HashAlgorithm,
    #[serde(default = "default_true")]
    pub embed_ocsp: bool,
    #[serde(default = "default_true")]
    pub embed_crl: bool,
    #[serde(default)]
    pub signer_info: SignerDetails,
    #[serde(default)]
    pub appearance: Option<AppearanceConfig>,
    #[serde(default)]
    pub tsa: Option<TsaConfig>,
    /// Bytes reserved for the signature container
    #[serde(default)]
    pub contents_size: Option<usize>,
    #[serde(default)]
    pub certificate: Option<CertificateSource>,
}

/// Appearance section; the image is given as a file path.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppearanceConfig {
    #[serde(default = "default_page_number")]
    pub page_number: usize,
    #[serde(default = "default_rect")]
    pub rect: Rect,
    #[serde(default)]
    pub image: Option<PathBuf>,
    #[serde(default = "default_visible_fields")]
    pub visible_fields: Vec<VisibleField>,
    #[serde(default)]
    pub invisible: bool,
    #[serde(default = "default_font_size")]
    pub font_size: f64,
}

fn default_page_number() -> usize {
    1
}

fn default_rect() -> Rect {
    SignatureAppearance::default().rect
}

fn default_visible_fields() -> Vec<VisibleField> {
    SignatureAppearance::default().visible_fields
}

fn default_font_size() -> f64 {
    SignatureAppearance::default().font_size
}

impl SigningConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Configuration(format!("invalid signing configuration: {}", e)))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let mut config = Self::from_json(&text)?;
        if let Some(dir) = path.parent() {
            config.rebase(dir);
        }
        log::debug!("loaded signing configuration from {}", path.display());
        Ok(config)
    }

    /// Make relative paths relative to `dir`.
    fn rebase(&mut self, dir: &Path) {
        let join = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = dir.join(&*p);
            }
        };
        if let Some(image) = self.appearance.as_mut().and_then(|a| a.image.as_mut()) {
            join(image);
        }
        match &mut self.certificate {
            Some(CertificateSource::Pkcs12 { path, chain_folder, .. }) => {
                join(path);
                chain_folder.iter_mut().for_each(join);
            },
            Some(CertificateSource::Pem {
                certificate,
                key,
                chain_folder,
            }) => {
                join(certificate);
                join(key);
                chain_folder.iter_mut().for_each(join);
            },
            Some(CertificateSource::Store { root, trust_folder, .. }) => {
                join(root);
                trust_folder.iter_mut().for_each(join);
            },
            None => {},
        }
    }

    /// Options for [`PdfSigner`](crate::signatures::PdfSigner). Reads the
    /// appearance image, if any.
    pub fn to_sign_options(&self) -> Result<SignOptions> {
        let appearance = match &self.appearance {
            Some(config) => Some(config.to_appearance()?),
            None => None,
        };
        let options = SignOptions {
            level: self.signature_level,
            hash_algorithm: self.hash_algorithm,
            embed_ocsp: self.embed_ocsp,
            embed_crl: self.embed_crl,
            signer: self.signer_info.clone(),
            appearance,
            tsa: self.tsa.clone(),
            contents_size: self.contents_size,
        };
        options.validate()?;
        Ok(options)
    }

    /// Load the declared signing certificate.
    pub fn load_certificate(&self) -> Result<SigningCertificate> {
        self.certificate
            .as_ref()
            .ok_or_else(|| Error::Configuration("no certificate source configured".to_string()))?
            .load()
    }
}

impl AppearanceConfig {
    pub fn to_appearance(&self) -> Result<SignatureAppearance> {
        let image = match &self.image {
            Some(path) => Some(std::fs::read(path).map_err(|e| {
                Error::Configuration(format!("cannot read appearance image {}: {}", path.display(), e))
            })?),
            None => None,
        };
        Ok(SignatureAppearance {
            page_number: self.page_number,
            rect: self.rect,
            image,
            visible_fields: self.visible_fields.clone(),
            invisible: self.invisible,
            font_size: self.font_size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signatures::CertificationLevel;

    #[test]
    fn test_defaults() {
        let config = SigningConfig::from_json("{}").unwrap();
        assert_eq!(config.signature_level, SignatureLevel::B);
        assert_eq!(config.hash_algorithm, HashAlgorithm::Sha256);
        assert!(config.embed_ocsp && config.embed_crl);
        assert!(config.appearance.is_none());
        let options = config.to_sign_options().unwrap();
        assert!(options.tsa.is_none());
    }

    #[test]
    fn test_full_document() {
        let json = r#"{
            "signatureLevel": "LT",
            "hashAlgorithm": "SHA512",
            "embedOcsp": false,
            "embedCrl": true,
            "signerInfo": {
                "reason": "Contract",
                "location": "Lisbon",
                "fieldName": "Approval",
                "certifyDocument": true,
                "certificationLevel": "NoChanges"
            },
            "appearance": {
                "pageNumber": 2,
                "rect": { "x": 10, "y": 20, "width": 150, "height": 40 },
                "visibleFields": ["Name", "Date"]
            },
            "tsa": {
                "url": "https://tsa.example.com",
                "credentials": { "username": "u", "password": "p" },
                "timeoutSeconds": 5,
                "hashAlgorithm": "SHA384"
            },
            "certificate": { "type": "pem", "certificate": "/certs/a.pem", "key": "/certs/a.key" }
        }"#;
        let config = SigningConfig::from_json(json).unwrap();
        let options = config.to_sign_options().unwrap();
        assert_eq!(options.level, SignatureLevel::LT);
        assert_eq!(options.hash_algorithm, HashAlgorithm::Sha512);
        assert!(!options.embed_ocsp);
        assert_eq!(options.signer.field_name.as_deref(), Some("Approval"));
        assert_eq!(options.signer.certification_level, CertificationLevel::NoChanges);

        let appearance = options.appearance.unwrap();
        assert_eq!(appearance.page_number, 2);
        assert_eq!(appearance.rect, Rect::new(10.0, 20.0, 150.0, 40.0));
        assert_eq!(appearance.visible_fields, vec![VisibleField::Name, VisibleField::Date]);
        assert_eq!(appearance.font_size, 9.0);

        let tsa = options.tsa.unwrap();
        assert_eq!(tsa.timeout_seconds, 5);
        assert_eq!(tsa.hash_algorithm, HashAlgorithm::Sha384);
        assert_eq!(tsa.credentials.unwrap().username, "u");
    }

    #[test]
    fn test_timestamp_level_without_tsa_is_rejected() {
        let config = SigningConfig::from_json(r#"{ "signatureLevel": "T" }"#).unwrap();
        assert!(matches!(config.to_sign_options(), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_malformed_json_is_configuration_error() {
        assert!(matches!(
            SigningConfig::from_json(r#"{ "signatureLevel": "Q" }"#),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_relative_paths_follow_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sign.json");
        std::fs::write(
            &path,
            r#"{ "appearance": { "image": "logo.png" },
                 "certificate": { "type": "pkcs12", "path": "keys/signer.p12", "password": "x" } }"#,
        )
        .unwrap();
        let config = SigningConfig::from_file(&path).unwrap();
        assert_eq!(
            config.appearance.as_ref().unwrap().image.as_deref(),
            Some(dir.path().join("logo.png").as_path())
        );
        match config.certificate.unwrap() {
            CertificateSource::Pkcs12 { path, .. } => assert_eq!(path, dir.path().join("keys/signer.p12")),
            other => panic!("unexpected source {:?}", other),
        }

        // Missing image surfaces when options are built.
        let err = config_with_missing_image(&dir);
        assert!(matches!(err, Error::Configuration(_)));
    }

    fn config_with_missing_image(dir: &tempfile::TempDir) -> Error {
        let path = dir.path().join("missing.json");
        std::fs::write(&path, r#"{ "appearance": { "image": "nope.png" } }"#).unwrap();
        SigningConfig::from_file(&path).unwrap().to_sign_options().unwrap_err()
    }
}
