//! Error types for the signing library.
//!
//! Every failure the signer, the timestamp client, the certificate source or the
//! verifier can report is one variant of [`Error`]. Callers that need to react to
//! the *class* of a failure (retry later, fix the configuration, replace the
//! certificate) branch on [`Error::kind`] instead of matching every variant.

/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Missing or contradictory options.
    Configuration,
    /// Certificate or key material is missing, unusable or could not be loaded.
    Certificate,
    /// The TSA or a revocation responder could not be reached, or timed out.
    Network,
    /// A remote party answered with something malformed, rejected or inconsistent.
    Protocol,
    /// Signing or verification math failed.
    Cryptographic,
    /// The input is not a usable PDF document.
    Document,
    /// Local I/O failure.
    Io,
}

/// Error types that can occur while signing or verifying.
#[derive(Debug, thiserror::Error)]
#[allow(clippy::enum_variant_names)]
pub enum Error {
    /// Missing or contradictory signing options
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Certificate or private key problem
    #[error("Certificate error: {0}")]
    Certificate(String),

    /// Transport failure or non-success HTTP status
    #[error("Network error contacting {url}: {message}")]
    Network {
        /// Endpoint that was contacted
        url: String,
        /// HTTP status, when a response was received
        status: Option<u16>,
        /// Transport error text or response body
        message: String,
    },

    /// Round-trip exceeded the caller-supplied timeout
    #[error("Request to {url} timed out after {seconds}s")]
    Timeout {
        /// Endpoint that was contacted
        url: String,
        /// Timeout that was exceeded
        seconds: u64,
    },

    /// TSA answered with a status other than granted
    #[error("TSA rejected the request (status {status}): {text}")]
    TsaRejected {
        /// PKIStatus value
        status: u8,
        /// Status text and failure info reported by the TSA
        text: String,
    },

    /// Malformed or inconsistent response
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Signing or verification math failure
    #[error("Cryptographic error: {0}")]
    Cryptographic(String),

    /// Input is not a usable PDF document
    #[error("Document error: {0}")]
    Document(String),

    /// Invalid PDF header (expected '%PDF-')
    #[error("Invalid PDF header: expected '%PDF-', found '{0}'")]
    InvalidHeader(String),

    /// Parse error at specific byte offset
    #[error("Failed to parse object at byte {offset}: {reason}")]
    ParseError {
        /// Byte offset where error occurred
        offset: usize,
        /// Reason for parse failure
        reason: String,
    },

    /// Invalid cross-reference table
    #[error("Invalid cross-reference table")]
    InvalidXref,

    /// Referenced object not found in cross-reference table
    #[error("Object not found: {0} {1} R")]
    ObjectNotFound(u32, u16),

    /// Stream decoding error
    #[error("Stream decoding error: {0}")]
    Decode(String),

    /// Unsupported stream filter
    #[error("Unsupported filter: {0}")]
    UnsupportedFilter(String),

    /// Circular reference detected in object graph
    #[error("Circular reference detected: object {0}")]
    CircularReference(crate::object::ObjectRef),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Configuration(_) => ErrorKind::Configuration,
            Error::Certificate(_) => ErrorKind::Certificate,
            Error::Network { .. } | Error::Timeout { .. } => ErrorKind::Network,
            Error::TsaRejected { .. } | Error::Protocol(_) => ErrorKind::Protocol,
            Error::Cryptographic(_) => ErrorKind::Cryptographic,
            Error::Document(_)
            | Error::InvalidHeader(_)
            | Error::ParseError { .. }
            | Error::InvalidXref
            | Error::ObjectNotFound(..)
            | Error::Decode(_)
            | Error::UnsupportedFilter(_)
            | Error::CircularReference(_) => ErrorKind::Document,
            Error::Io(_) => ErrorKind::Io,
        }
    }

    /// True for failures that happened on the wire.
    pub fn is_network(&self) -> bool {
        self.kind() == ErrorKind::Network
    }

    pub(crate) fn crypto(context: &str, err: impl std::fmt::Display) -> Self {
        Error::Cryptographic(format!("{}: {}", context, err))
    }

    pub(crate) fn protocol(context: &str, err: impl std::fmt::Display) -> Self {
        Error::Protocol(format!("{}: {}", context, err))
    }

    pub(crate) fn certificate(context: &str, err: impl std::fmt::Display) -> Self {
        Error::Certificate(format!("{}: {}", context, err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_header_error() {
        let err = Error::InvalidHeader("NotAPDF".to_string());
        let msg = format!("{}", err);
        assert!(msg.contains("Invalid PDF header"));
        assert!(msg.contains("NotAPDF"));
        assert_eq!(err.kind(), ErrorKind::Document);
    }

    #[test]
    fn test_parse_error() {
        let err = Error::ParseError {
            offset: 1234,
            reason: "invalid token".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("1234"));
        assert!(msg.contains("invalid token"));
    }

    #[test]
    fn test_object_not_found_error() {
        let err = Error::ObjectNotFound(10, 0);
        assert!(format!("{}", err).contains("10 0 R"));
    }

    #[test]
    fn test_network_error_carries_status() {
        let err = Error::Network {
            url: "http://tsa.example/".to_string(),
            status: Some(503),
            message: "service unavailable".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("tsa.example"));
        assert!(msg.contains("service unavailable"));
        assert!(err.is_network());
    }

    #[test]
    fn test_timeout_is_network_kind() {
        let err = Error::Timeout {
            url: "http://tsa.example/".to_string(),
            seconds: 5,
        };
        assert_eq!(err.kind(), ErrorKind::Network);
        assert!(format!("{}", err).contains("5s"));
    }

    #[test]
    fn test_tsa_rejection_is_protocol_kind() {
        let err = Error::TsaRejected {
            status: 2,
            text: "bad alg".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::Protocol);
        assert!(format!("{}", err).contains("status 2"));
    }

    #[test]
    fn test_classification() {
        assert_eq!(Error::Configuration("x".into()).kind(), ErrorKind::Configuration);
        assert_eq!(Error::Certificate("x".into()).kind(), ErrorKind::Certificate);
        assert_eq!(Error::Cryptographic("x".into()).kind(), ErrorKind::Cryptographic);
        assert_eq!(Error::InvalidXref.kind(), ErrorKind::Document);
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert_eq!(Error::from(io).kind(), ErrorKind::Io);
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Error>();
    }
}
