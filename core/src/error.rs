//! Error types for the Kubernetes client factory.
//!
//! # Design
//! One enum per stage so callers can tell a bad address apart from a bad
//! request. `ConnectivityError` carries one variant per TLS failure class;
//! only `ConnectivityError::Tls` is recoverable, and the factory recovers from
//! it by downgrading the address to plain http. Request-level failures land
//! in `ApiError`, where `NotFound` keeps its own variant because callers
//! routinely branch on it.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failure while probing the master address.
#[derive(Debug, Error)]
pub enum ConnectivityError {
    #[error("invalid master URL")]
    InvalidUrl(#[from] url::ParseError),

    /// The server certificate was rejected or the peer aborted the handshake.
    #[error("SSL handshake failed; trust the certificate or set the trust-all-certs option")]
    Handshake(#[source] rustls::Error),

    #[error("SSL protocol error")]
    Protocol(#[source] rustls::Error),

    #[error("bad SSL key")]
    BadKey(#[source] rustls::Error),

    #[error("could not verify server")]
    PeerUnverified(#[source] rustls::Error),

    /// Any other TLS-layer failure, usually a plaintext server answering a
    /// ClientHello.
    #[error("SSL error")]
    Tls(#[source] rustls::Error),

    #[error("failed to connect to master")]
    Io(#[source] io::Error),

    /// The configured trust anchors could not be loaded into a TLS client.
    #[error("invalid trusted root certificate in client configuration")]
    InvalidCertificate(#[from] InvalidCertificate),
}

impl ConnectivityError {
    /// Whether the factory may retry the same host over plain http.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ConnectivityError::Tls(_))
    }
}

/// A trusted root certificate that does not parse as an X.509 trust anchor.
#[derive(Debug, Error)]
#[error("trusted root certificate #{index} is not a valid X.509 certificate")]
pub struct InvalidCertificate {
    pub index: usize,
    #[source]
    pub source: rustls::Error,
}

/// Failure while loading client configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read CA bundle {}", path.display())]
    ReadCaBundle {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("CA bundle {} contains no certificates", path.display())]
    EmptyCaBundle { path: PathBuf },

    #[error("CA bundle {} contains an invalid certificate", path.display())]
    InvalidCaBundle {
        path: PathBuf,
        #[source]
        source: InvalidCertificate,
    },
}

/// Failure while constructing a `KubernetesFactory`.
#[derive(Debug, Error)]
pub enum FactoryError {
    #[error("Invalid kubernetes master address: {address}: {source}")]
    InvalidAddress {
        address: String,
        #[source]
        source: ConnectivityError,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Failure while assembling a REST client.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid base URL {address}")]
    InvalidBaseUrl {
        address: String,
        #[source]
        source: url::ParseError,
    },

    #[error("unsupported URL scheme `{scheme}` in {address}")]
    UnsupportedScheme { address: String, scheme: String },

    #[error(transparent)]
    InvalidCertificate(#[from] InvalidCertificate),
}

/// Errors returned by REST calls made through a built client.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The server returned 404.
    #[error("resource not found")]
    NotFound,

    /// The server returned a non-2xx status with a Kubernetes `Status` body.
    #[error("HTTP {code} {reason}: {message}")]
    Status {
        code: u16,
        reason: String,
        message: String,
    },

    /// The server returned a non-2xx status without a `Status` body.
    #[error("HTTP {status}: {body}")]
    HttpError { status: u16, body: String },

    /// No provider accepts the response content type.
    #[error("no provider accepts media type `{0}`")]
    UnsupportedMediaType(String),

    #[error("deserialization failed: {0}")]
    DeserializationError(String),

    #[error("serialization failed: {0}")]
    SerializationError(String),

    #[error("transport error")]
    Transport(#[from] ureq::Error),
}
