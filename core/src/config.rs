//! Configuration snapshot and per-factory client settings.
//!
//! # Design
//! The process environment is read exactly once, by `KubeEnv::load`. Every
//! other part of the crate takes a `KubeEnv` (or a `ClientConfig` built from
//! one), so resolution and client construction stay testable without touching
//! global state. `ClientConfig` is immutable; changing the address yields a
//! new value.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use rustls::pki_types::CertificateDer;
use rustls::RootCertStore;
use secrecy::SecretString;

use crate::error::{ConfigError, InvalidCertificate};

/// Master URL used when nothing else resolves.
pub const DEFAULT_KUBERNETES_MASTER: &str = "http://localhost:8080";

pub const KUBERNETES_TRUST_ALL_CERTIFICATES: &str = "KUBERNETES_TRUST_CERT";
pub const KUBERNETES_USERNAME: &str = "KUBERNETES_USERNAME";
pub const KUBERNETES_PASSWORD: &str = "KUBERNETES_PASSWORD";
pub const KUBERNETES_SERVICE_HOST_ENV_VAR: &str = "KUBERNETES_SERVICE_HOST";
pub const KUBERNETES_SERVICE_PORT_ENV_VAR: &str = "KUBERNETES_SERVICE_PORT";
pub const KUBERNETES_RO_SERVICE_HOST_ENV_VAR: &str = "KUBERNETES_RO_SERVICE_HOST";
pub const KUBERNETES_RO_SERVICE_PORT_ENV_VAR: &str = "KUBERNETES_RO_SERVICE_PORT";
pub const KUBERNETES_MASTER_ENV_VAR: &str = "KUBERNETES_MASTER";
/// Path to a PEM bundle of extra trusted root certificates.
pub const KUBERNETES_CERTS_CA_FILE_ENV_VAR: &str = "KUBERNETES_CERTS_CA_FILE";

/// Configuration property consulted after the environment.
pub const KUBERNETES_MASTER_PROPERTY: &str = "kubernetes.master";

const ENV_VARS: &[&str] = &[
    KUBERNETES_TRUST_ALL_CERTIFICATES,
    KUBERNETES_USERNAME,
    KUBERNETES_PASSWORD,
    KUBERNETES_SERVICE_HOST_ENV_VAR,
    KUBERNETES_SERVICE_PORT_ENV_VAR,
    KUBERNETES_RO_SERVICE_HOST_ENV_VAR,
    KUBERNETES_RO_SERVICE_PORT_ENV_VAR,
    KUBERNETES_MASTER_ENV_VAR,
    KUBERNETES_CERTS_CA_FILE_ENV_VAR,
];

/// Returns `true` for an empty or whitespace-only string.
pub(crate) fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

/// Snapshot of the environment variables and configuration properties the
/// factory consumes.
#[derive(Clone, Default)]
pub struct KubeEnv {
    vars: BTreeMap<String, String>,
    properties: BTreeMap<String, String>,
}

impl KubeEnv {
    /// Captures the relevant variables from the process environment.
    pub fn load() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Captures the relevant variables from an arbitrary lookup function.
    pub fn from_lookup<F>(mut lookup: F) -> Self
    where
        F: FnMut(&str) -> Option<String>,
    {
        let vars = ENV_VARS
            .iter()
            .filter_map(|name| lookup(name).map(|value| (name.to_string(), value)))
            .collect();
        Self {
            vars,
            properties: BTreeMap::new(),
        }
    }

    pub fn with_var(mut self, name: &str, value: &str) -> Self {
        self.vars.insert(name.to_string(), value.to_string());
        self
    }

    /// Sets a configuration property such as `kubernetes.master`.
    pub fn with_property(mut self, key: &str, value: &str) -> Self {
        self.properties.insert(key.to_string(), value.to_string());
        self
    }

    pub fn var(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }
}

impl fmt::Debug for KubeEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let vars: BTreeMap<&str, &str> = self
            .vars
            .iter()
            .map(|(name, value)| {
                if name == KUBERNETES_PASSWORD {
                    (name.as_str(), "[REDACTED]")
                } else {
                    (name.as_str(), value.as_str())
                }
            })
            .collect();
        f.debug_struct("KubeEnv")
            .field("vars", &vars)
            .field("properties", &self.properties)
            .finish()
    }
}

/// Settings owned by one factory: the master address plus the knobs every
/// client built from it shares.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    address: String,
    verify_address: bool,
    trust_all_certs: bool,
    username: Option<String>,
    password: Option<SecretString>,
    trusted_root_certs: Vec<CertificateDer<'static>>,
}

impl ClientConfig {
    /// A config for `address` with verification on and no credentials.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            verify_address: true,
            trust_all_certs: false,
            username: None,
            password: None,
            trusted_root_certs: Vec::new(),
        }
    }

    /// Builds a config for `address`, applying the trust, credential and CA
    /// bundle overrides found in `env`.
    pub fn from_env(
        address: impl Into<String>,
        verify_address: bool,
        env: &KubeEnv,
    ) -> Result<Self, ConfigError> {
        let mut config = Self::new(address).with_verify_address(verify_address);

        if let Some(trust) = env.var(KUBERNETES_TRUST_ALL_CERTIFICATES) {
            config.trust_all_certs = trust.eq_ignore_ascii_case("true");
        }
        if let Some(username) = env.var(KUBERNETES_USERNAME) {
            config.username = Some(username.to_string());
        }
        if let Some(password) = env.var(KUBERNETES_PASSWORD) {
            config.password = Some(SecretString::new(password.to_string()));
        }
        if let Some(path) = env.var(KUBERNETES_CERTS_CA_FILE_ENV_VAR) {
            if !is_blank(path) {
                config.trusted_root_certs = load_ca_bundle(Path::new(path))?;
            }
        }

        Ok(config)
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn verify_address(&self) -> bool {
        self.verify_address
    }

    pub fn trust_all_certs(&self) -> bool {
        self.trust_all_certs
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn password(&self) -> Option<&SecretString> {
        self.password.as_ref()
    }

    pub fn trusted_root_certs(&self) -> &[CertificateDer<'static>] {
        &self.trusted_root_certs
    }

    /// Basic-auth credentials, present only when both parts are non-blank.
    pub fn credentials(&self) -> Option<(&str, &SecretString)> {
        use secrecy::ExposeSecret;

        let username = self.username.as_deref().filter(|u| !is_blank(u))?;
        let password = self
            .password
            .as_ref()
            .filter(|p| !is_blank(p.expose_secret()))?;
        Some((username, password))
    }

    /// Returns a copy of this config bound to another address.
    pub fn with_address(&self, address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..self.clone()
        }
    }

    pub fn with_verify_address(mut self, verify_address: bool) -> Self {
        self.verify_address = verify_address;
        self
    }

    /// Disables certificate chain and host-name verification for every client
    /// built from this config.
    pub fn with_trust_all_certs(mut self, trust_all_certs: bool) -> Self {
        self.trust_all_certs = trust_all_certs;
        self
    }

    pub fn with_credentials(mut self, username: &str, password: &str) -> Self {
        self.username = Some(username.to_string());
        self.password = Some(SecretString::new(password.to_string()));
        self
    }

    pub fn with_trusted_root_certs(mut self, certs: Vec<CertificateDer<'static>>) -> Self {
        self.trusted_root_certs = certs;
        self
    }
}

/// Parses every certificate in a PEM document.
pub fn parse_pem_certs(pem: &[u8]) -> std::io::Result<Vec<CertificateDer<'static>>> {
    let mut reader = BufReader::new(pem);
    rustls_pemfile::certs(&mut reader).collect()
}

fn load_ca_bundle(path: &Path) -> Result<Vec<CertificateDer<'static>>, ConfigError> {
    let read_error = |source| ConfigError::ReadCaBundle {
        path: PathBuf::from(path),
        source,
    };
    let pem = fs::read(path).map_err(read_error)?;
    let certs = parse_pem_certs(&pem).map_err(read_error)?;
    if certs.is_empty() {
        return Err(ConfigError::EmptyCaBundle {
            path: PathBuf::from(path),
        });
    }
    root_cert_store(&certs).map_err(|source| ConfigError::InvalidCaBundle {
        path: PathBuf::from(path),
        source,
    })?;
    Ok(certs)
}

/// A root store holding exactly `certs`. Fails on the first entry that is not
/// a usable trust anchor.
pub(crate) fn root_cert_store(
    certs: &[CertificateDer<'static>],
) -> Result<RootCertStore, InvalidCertificate> {
    let mut roots = RootCertStore::empty();
    for (index, cert) in certs.iter().enumerate() {
        roots
            .add(cert.clone())
            .map_err(|source| InvalidCertificate { index, source })?;
    }
    Ok(roots)
}
