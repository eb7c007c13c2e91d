//! Gemini content retrieval: a small TLS client that issues one request per
//! round trip and a redirect-following loop on top of it. The loop is generic
//! over the transport so it can be exercised without a network.
//!
//! Gemini servers present self-signed certificates as a matter of course, so
//! the TLS transport accepts any server certificate. Retrieval happens before
//! any storage transaction is opened; no transaction waits on the network.

use std::error::Error;
use std::fmt;
use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::sync::Arc;

use rustls::client::danger::{
    HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier,
};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{DigitallySignedStruct, SignatureScheme};
use url::Url;

const GEMINI_PORT: u16 = 1965;
pub const MAX_REDIRECTS: usize = 5;

/// Retrieval capability consumed by the route layer.
pub trait Fetch: Send + Sync {
    fn fetch(&self, url: &str) -> Result<String, FetchError>;
}

/// One parsed Gemini response: two-digit status, meta line, body (empty for
/// non-success statuses).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeminiResponse {
    pub status: u8,
    pub meta: String,
    pub body: String,
}

/// A single request/response exchange with a remote host.
pub trait RoundTrip {
    fn round_trip(&self, url: &Url) -> Result<GeminiResponse, FetchError>;
}

#[derive(Debug)]
pub enum FetchError {
    InvalidUrl(url::ParseError),
    UnsupportedScheme(String),
    InvalidHost(String),
    InputRequired(String),
    TooManyRedirects,
    RemoteFailure(u8, String),
    MalformedResponse(String),
    Io(io::Error),
    Tls(rustls::Error),
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::InvalidUrl(err) => write!(f, "invalid URL: {}", err),
            FetchError::UnsupportedScheme(scheme) => {
                write!(f, "unsupported URL scheme \"{}\"", scheme)
            }
            FetchError::InvalidHost(url) => write!(f, "no usable host in URL {}", url),
            FetchError::InputRequired(meta) => {
                write!(f, "remote host requires input -- not supported ({})", meta)
            }
            FetchError::TooManyRedirects => write!(f, "too many redirects"),
            FetchError::RemoteFailure(status, meta) => {
                write!(f, "remote returned status {}: {}", status, meta)
            }
            FetchError::MalformedResponse(detail) => {
                write!(f, "malformed response: {}", detail)
            }
            FetchError::Io(err) => write!(f, "I/O error: {}", err),
            FetchError::Tls(err) => write!(f, "TLS error: {}", err),
        }
    }
}

impl Error for FetchError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            FetchError::InvalidUrl(err) => Some(err),
            FetchError::Io(err) => Some(err),
            FetchError::Tls(err) => Some(err),
            _ => None,
        }
    }
}

impl From<url::ParseError> for FetchError {
    fn from(value: url::ParseError) -> Self {
        FetchError::InvalidUrl(value)
    }
}

impl From<io::Error> for FetchError {
    fn from(value: io::Error) -> Self {
        FetchError::Io(value)
    }
}

impl From<rustls::Error> for FetchError {
    fn from(value: rustls::Error) -> Self {
        FetchError::Tls(value)
    }
}

/// Follows redirect responses by resolving the new target against the current
/// request URL, bounded to [`MAX_REDIRECTS`] hops. Input-required statuses
/// fail; only a success status yields a body.
pub fn fetch_with_redirects<T: RoundTrip>(transport: &T, url: &Url) -> Result<String, FetchError> {
    let mut target = url.clone();
    let mut hops = 0usize;
    loop {
        let response = transport.round_trip(&target)?;
        match response.status / 10 {
            1 => return Err(FetchError::InputRequired(response.meta)),
            2 => return Ok(response.body),
            3 => {
                hops += 1;
                if hops > MAX_REDIRECTS {
                    return Err(FetchError::TooManyRedirects);
                }
                target = target.join(&response.meta)?;
            }
            _ => return Err(FetchError::RemoteFailure(response.status, response.meta)),
        }
    }
}

pub(crate) fn parse_response(raw: &[u8]) -> Result<GeminiResponse, FetchError> {
    let text = String::from_utf8_lossy(raw);
    let (header, body) = text.split_once("\r\n").ok_or_else(|| {
        FetchError::MalformedResponse("missing status line terminator".to_string())
    })?;
    let (status_text, meta) = match header.split_once(' ') {
        Some((status_text, meta)) => (status_text, meta.trim()),
        None => (header, ""),
    };
    let status: u8 = status_text.parse().map_err(|_| {
        FetchError::MalformedResponse(format!("invalid status \"{status_text}\""))
    })?;
    Ok(GeminiResponse {
        status,
        meta: meta.to_string(),
        body: body.to_string(),
    })
}

/// Production fetcher speaking the Gemini protocol over TLS.
pub struct GeminiFetcher {
    transport: TlsTransport,
}

impl GeminiFetcher {
    pub fn new() -> Self {
        Self {
            transport: TlsTransport::new(),
        }
    }
}

impl Default for GeminiFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Fetch for GeminiFetcher {
    fn fetch(&self, raw: &str) -> Result<String, FetchError> {
        let url = Url::parse(raw)?;
        if url.scheme() != "gemini" {
            return Err(FetchError::UnsupportedScheme(url.scheme().to_string()));
        }
        fetch_with_redirects(&self.transport, &url)
    }
}

struct TlsTransport {
    config: Arc<rustls::ClientConfig>,
}

impl TlsTransport {
    fn new() -> Self {
        let config = rustls::ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert))
            .with_no_client_auth();
        Self {
            config: Arc::new(config),
        }
    }
}

impl RoundTrip for TlsTransport {
    fn round_trip(&self, url: &Url) -> Result<GeminiResponse, FetchError> {
        let host = url
            .host_str()
            .ok_or_else(|| FetchError::InvalidHost(url.to_string()))?;
        let port = url.port().unwrap_or(GEMINI_PORT);
        let server_name = ServerName::try_from(host.to_string())
            .map_err(|_| FetchError::InvalidHost(url.to_string()))?;

        let mut tls_client = rustls::ClientConnection::new(Arc::clone(&self.config), server_name)?;
        let mut socket = TcpStream::connect((host, port))?;
        let mut stream = rustls::Stream::new(&mut tls_client, &mut socket);

        stream.write_all(format!("{}\r\n", url).as_bytes())?;

        let mut raw = Vec::new();
        match stream.read_to_end(&mut raw) {
            Ok(_) => {}
            // Many Gemini servers close the socket without a TLS close_notify.
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => {}
            Err(err) => return Err(err.into()),
        }
        parse_response(&raw)
    }
}

/// Gemini trust model: certificates are almost always self-signed, so server
/// identity is not validated against a CA chain.
#[derive(Debug)]
struct AcceptAnyServerCert;

impl ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        rustls::crypto::ring::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}
