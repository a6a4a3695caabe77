//! Reachability and TLS-trust probe for a master address.
//!
//! # Design
//! `http` addresses get a bare TCP connect. `https` addresses get a full
//! rustls handshake followed by a one-byte write, which is enough to surface
//! certificate, protocol and plaintext-server problems before any client is
//! built. The probe socket lives inside `probe_tls` and is closed on every
//! path. Failures are classified into `ConnectivityError` variants; deciding
//! what to do about them is the factory's job.

use std::io::{self, Read, Write};
use std::net::{IpAddr, TcpStream};
use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{ring, verify_tls12_signature, verify_tls13_signature, CryptoProvider};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{AlertDescription, DigitallySignedStruct, RootCertStore, SignatureScheme};
use tracing::{debug, trace};
use url::{Host, Url};

use crate::config::{root_cert_store, ClientConfig};
use crate::error::ConnectivityError;

/// Probes `config.address()`.
///
/// The TLS probe trusts the config's CA bundle when one is set, the webpki
/// roots otherwise, and everything when `trust_all_certs` is set.
pub fn validate_master(config: &ClientConfig) -> Result<(), ConnectivityError> {
    let url = Url::parse(config.address())?;
    match url.scheme() {
        "http" => connect_plain(&url),
        "https" => probe_tls(&url, config),
        other => {
            debug!(scheme = other, address = %url, "not probing master with unknown scheme");
            Ok(())
        }
    }
}

fn connect_plain(url: &Url) -> Result<(), ConnectivityError> {
    let addrs = url.socket_addrs(|| None).map_err(ConnectivityError::Io)?;
    let stream = TcpStream::connect(&*addrs).map_err(ConnectivityError::Io)?;
    debug!(peer = ?stream.peer_addr().ok(), "connected to master");
    Ok(())
}

fn probe_tls(url: &Url, config: &ClientConfig) -> Result<(), ConnectivityError> {
    let server_name = server_name(url)?;
    let tls_config = Arc::new(tls_client_config(config)?);
    let conn = rustls::ClientConnection::new(tls_config, server_name).map_err(classify_rustls)?;

    let addrs = url.socket_addrs(|| None).map_err(ConnectivityError::Io)?;
    let sock = TcpStream::connect(&*addrs).map_err(ConnectivityError::Io)?;
    let mut tls = rustls::StreamOwned::new(conn, sock);

    let result = write_probe_byte(&mut tls);

    tls.conn.send_close_notify();
    let _ = tls.flush();
    drop(tls);

    result.map_err(classify_io)
}

fn write_probe_byte(tls: &mut rustls::StreamOwned<rustls::ClientConnection, TcpStream>) -> io::Result<()> {
    tls.write_all(&[1])?;
    tls.flush()?;

    // Only drain plaintext that already arrived; never block on the socket.
    let mut buf = [0u8; 512];
    while let Ok(n) = tls.conn.reader().read(&mut buf) {
        if n == 0 {
            break;
        }
        trace!(bytes = ?&buf[..n], "drained probe response");
    }
    Ok(())
}

fn server_name(url: &Url) -> Result<ServerName<'static>, ConnectivityError> {
    match url.host() {
        Some(Host::Domain(domain)) => ServerName::try_from(domain.to_string())
            .map_err(|e| ConnectivityError::Io(io::Error::new(io::ErrorKind::InvalidInput, e))),
        Some(Host::Ipv4(ip)) => Ok(ServerName::from(IpAddr::V4(ip))),
        Some(Host::Ipv6(ip)) => Ok(ServerName::from(IpAddr::V6(ip))),
        None => Err(ConnectivityError::InvalidUrl(url::ParseError::EmptyHost)),
    }
}

/// rustls client config shared by the probe: ring provider, default
/// protocol versions, and the trust policy from `config`.
pub(crate) fn tls_client_config(
    config: &ClientConfig,
) -> Result<rustls::ClientConfig, ConnectivityError> {
    let provider = Arc::new(ring::default_provider());
    // Fails only when the provider supports none of the default versions.
    let builder = rustls::ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()
        .map_err(ConnectivityError::Protocol)?;

    let tls_config = if config.trust_all_certs() {
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert { provider }))
            .with_no_client_auth()
    } else {
        let roots = if config.trusted_root_certs().is_empty() {
            let mut roots = RootCertStore::empty();
            roots.roots = webpki_roots::TLS_SERVER_ROOTS.into();
            roots
        } else {
            root_cert_store(config.trusted_root_certs())?
        };
        builder.with_root_certificates(roots).with_no_client_auth()
    };
    Ok(tls_config)
}

/// Maps an I/O failure from the probe onto a `ConnectivityError`, unwrapping
/// the rustls error that `StreamOwned` tucks inside `InvalidData`.
pub(crate) fn classify_io(err: io::Error) -> ConnectivityError {
    let is_tls = err
        .get_ref()
        .is_some_and(|inner| inner.is::<rustls::Error>());
    if !is_tls {
        return ConnectivityError::Io(err);
    }
    match err.into_inner().map(|inner| inner.downcast::<rustls::Error>()) {
        Some(Ok(tls_err)) => classify_rustls(*tls_err),
        _ => ConnectivityError::Io(io::Error::other("unrecognised TLS failure")),
    }
}

pub(crate) fn classify_rustls(err: rustls::Error) -> ConnectivityError {
    use rustls::Error as E;

    match err {
        E::InvalidCertificate(_) => ConnectivityError::Handshake(err),
        E::AlertReceived(AlertDescription::ProtocolVersion) => ConnectivityError::Protocol(err),
        E::AlertReceived(_) => ConnectivityError::Handshake(err),
        E::InappropriateMessage { .. }
        | E::InappropriateHandshakeMessage { .. }
        | E::PeerMisbehaved(_)
        | E::PeerIncompatible(_) => ConnectivityError::Protocol(err),
        E::DecryptError | E::EncryptError => ConnectivityError::BadKey(err),
        E::NoCertificatesPresented => ConnectivityError::PeerUnverified(err),
        _ => ConnectivityError::Tls(err),
    }
}

/// Verifier installed when `trust_all_certs` is set: any chain and any host
/// name pass, signatures are still checked so the handshake stays well-formed.
#[derive(Debug)]
pub(crate) struct AcceptAnyServerCert {
    provider: Arc<CryptoProvider>,
}

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
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}
