//! HTTP transport used for timestamp and revocation round-trips.
//!
//! The signer never opens connections itself. It hands an [`HttpRequest`] to an
//! injected [`Transport`], so a pooled client can be shared between signers and
//! tests can answer requests in-process.

use crate::error::{Error, Result};
use std::time::Duration;

/// HTTP method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// One outgoing request.
#[derive(Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub content_type: Option<&'static str>,
    pub accept: Option<&'static str>,
    pub body: Vec<u8>,
    /// HTTP Basic credentials
    pub basic_auth: Option<(String, String)>,
    pub timeout: Duration,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            content_type: None,
            accept: None,
            body: Vec::new(),
            basic_auth: None,
            timeout,
        }
    }

    pub fn post(url: impl Into<String>, content_type: &'static str, body: Vec<u8>, timeout: Duration) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            content_type: Some(content_type),
            accept: None,
            body,
            basic_auth: None,
            timeout,
        }
    }

    pub fn with_accept(mut self, accept: &'static str) -> Self {
        self.accept = Some(accept);
        self
    }

    pub fn with_basic_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.basic_auth = Some((username.into(), password.into()));
        self
    }
}

impl std::fmt::Debug for HttpRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpRequest")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("content_type", &self.content_type)
            .field("body", &format!("{} bytes", self.body.len()))
            .field("basic_auth", &self.basic_auth.as_ref().map(|(user, _)| (user, "[REDACTED]")))
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Status and body of a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn ok(body: Vec<u8>) -> Self {
        Self { status: 200, body }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body of a 2xx response; any other status becomes a network error
    /// carrying the status and a bounded excerpt of the body.
    pub fn into_success(self, url: &str) -> Result<Vec<u8>> {
        if self.is_success() {
            return Ok(self.body);
        }
        let excerpt: String = String::from_utf8_lossy(&self.body).chars().take(200).collect();
        Err(Error::Network {
            url: url.to_string(),
            status: Some(self.status),
            message: format!("HTTP {}: {}", self.status, excerpt.trim()),
        })
    }
}

/// Performs HTTP exchanges.
///
/// Implementations report transport failures as [`Error::Network`] and
/// exceeded deadlines as [`Error::Timeout`]. Non-2xx answers are returned as
/// responses, not errors.
pub trait Transport: Send + Sync {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse>;
}

/// [`Transport`] backed by a pooled blocking `reqwest` client.
///
/// Cloning shares the connection pool.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::blocking::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("pdf_pades/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Configuration(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self::with_client(client))
    }

    /// Share an existing client.
    pub fn with_client(client: reqwest::blocking::Client) -> Self {
        Self { client }
    }
}

impl Transport for HttpTransport {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse> {
        log::debug!("{:?} {} ({} bytes)", request.method, request.url, request.body.len());

        let mut builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self.client.post(&request.url).body(request.body.clone()),
        };
        builder = builder.timeout(request.timeout);
        if let Some(content_type) = request.content_type {
            builder = builder.header(reqwest::header::CONTENT_TYPE, content_type);
        }
        if let Some(accept) = request.accept {
            builder = builder.header(reqwest::header::ACCEPT, accept);
        }
        if let Some((user, password)) = &request.basic_auth {
            builder = builder.basic_auth(user, Some(password));
        }

        let map_err = |e: reqwest::Error| {
            if e.is_timeout() {
                Error::Timeout {
                    url: request.url.clone(),
                    seconds: request.timeout.as_secs(),
                }
            } else {
                Error::Network {
                    url: request.url.clone(),
                    status: e.status().map(|s| s.as_u16()),
                    message: e.to_string(),
                }
            }
        };

        let response = builder.send().map_err(map_err)?;
        let status = response.status().as_u16();
        let body = response.bytes().map_err(map_err)?;
        log::debug!("{} answered {} ({} bytes)", request.url, status, body.len());

        Ok(HttpResponse {
            status,
            body: body.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_success() {
        assert_eq!(HttpResponse::ok(vec![1, 2]).into_success("http://x/").unwrap(), vec![1, 2]);

        let err = HttpResponse {
            status: 503,
            body: b"busy".to_vec(),
        }
        .into_success("http://tsa.example/")
        .unwrap_err();
        match err {
            Error::Network { url, status, message } => {
                assert_eq!(url, "http://tsa.example/");
                assert_eq!(status, Some(503));
                assert!(message.contains("busy"));
            },
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_request_debug_hides_password() {
        let req = HttpRequest::post("http://tsa.example/", "application/timestamp-query", vec![0; 3], Duration::from_secs(1))
            .with_basic_auth("alice", "secret");
        let debug = format!("{:?}", req);
        assert!(debug.contains("alice"));
        assert!(!debug.contains("secret"));
        assert!(debug.contains("3 bytes"));
    }

    #[test]
    fn test_unreachable_host_is_network_error() {
        let transport = HttpTransport::new().unwrap();
        let req = HttpRequest::get("http://127.0.0.1:9/ca.crl", Duration::from_secs(2));
        let err = transport.execute(&req).unwrap_err();
        assert!(err.is_network());
    }

    #[test]
    fn test_silent_server_times_out() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/tsa", listener.local_addr().unwrap());
        // Accept the connection and never answer.
        let server = std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            std::thread::sleep(Duration::from_secs(3));
            drop(stream);
        });

        let client = reqwest::blocking::Client::builder().no_proxy().build().unwrap();
        let transport = HttpTransport::with_client(client);
        let req = HttpRequest::post(url.clone(), "application/timestamp-query", vec![0; 8], Duration::from_secs(1));
        let err = transport.execute(&req).unwrap_err();

        match &err {
            Error::Timeout { url: timed_out, seconds } => {
                assert_eq!(timed_out, &url);
                assert_eq!(*seconds, 1);
            },
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(err.kind(), crate::error::ErrorKind::Network);
        assert!(err.is_network());
        server.join().unwrap();
    }

    #[test]
    fn test_transport_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<HttpTransport>();
    }
}
