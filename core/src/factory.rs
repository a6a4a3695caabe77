//! `KubernetesFactory`: resolves and verifies a master address, then mints
//! REST clients bound to it.
//!
//! # Design
//! The factory owns one immutable `ClientConfig`. Assigning an address builds
//! a candidate config, verifies it when `verify_address` is on, and only then
//! replaces the current one, so a failed assignment leaves the factory as it
//! was. An https address whose probe fails with a generic TLS error is
//! retried once as http; any further TLS failure is fatal.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::api::{Kubernetes, KubernetesExtensions};
use crate::client::{FromRestClient, RestClient};
use crate::config::{is_blank, ClientConfig, KubeEnv, KUBERNETES_TRUST_ALL_CERTIFICATES};
use crate::error::{ClientError, ConnectivityError, FactoryError};
use crate::providers::Providers;
use crate::resolver::{kubernetes_master_host, resolve_http_master};
use crate::validator::validate_master;

/// How many https→http downgrades one address assignment may perform.
const MAX_TLS_DOWNGRADES: usize = 1;

/// Creates Kubernetes REST clients for one master.
#[derive(Debug, Clone)]
pub struct KubernetesFactory {
    config: ClientConfig,
    writeable: bool,
    env: KubeEnv,
}

impl KubernetesFactory {
    /// Factory for the resolved read-only master, with address verification.
    pub fn new(env: &KubeEnv) -> Result<Self, FactoryError> {
        Self::with_address(None, false, env)
    }

    /// Factory for `address`, or the resolved master when it is absent or
    /// blank, with address verification.
    pub fn with_address(
        address: Option<&str>,
        writeable: bool,
        env: &KubeEnv,
    ) -> Result<Self, FactoryError> {
        Self::with_options(address, writeable, true, env)
    }

    pub fn with_options(
        address: Option<&str>,
        writeable: bool,
        verify_address: bool,
        env: &KubeEnv,
    ) -> Result<Self, FactoryError> {
        let address = match address.filter(|address| !is_blank(address)) {
            Some(address) => address.to_string(),
            None => resolve_http_master(env, writeable),
        };
        let config = ClientConfig::from_env(address, verify_address, env)?;
        Ok(Self {
            config: verified(config)?,
            writeable,
            env: env.clone(),
        })
    }

    /// Factory over a prepared config. A blank address resolves against an
    /// empty environment, i.e. to the default master.
    pub fn from_config(config: ClientConfig) -> Result<Self, FactoryError> {
        let env = KubeEnv::default();
        let config = if is_blank(config.address()) {
            config.with_address(resolve_http_master(&env, false))
        } else {
            config
        };
        Ok(Self {
            config: verified(config)?,
            writeable: false,
            env,
        })
    }

    pub fn address(&self) -> &str {
        self.config.address()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Points the factory at `address`, verifying it when enabled. A blank
    /// address resolves the master again.
    pub fn set_address(&mut self, address: &str) -> Result<(), FactoryError> {
        let address = if is_blank(address) {
            resolve_http_master(&self.env, self.writeable)
        } else {
            address.to_string()
        };
        self.config = verified(self.config.with_address(address))?;
        Ok(())
    }

    /// Bare host of the configured address.
    pub fn kubernetes_master(&self) -> String {
        kubernetes_master_host(self.config.address())
    }

    pub fn create_kubernetes(&self) -> Result<Kubernetes, ClientError> {
        self.create_client()
    }

    pub fn create_kubernetes_extensions(&self) -> Result<KubernetesExtensions, ClientError> {
        self.create_client()
    }

    /// Builds a REST client with a fresh provider set and adapts it into `T`.
    pub fn create_client<T: FromRestClient>(&self) -> Result<T, ClientError> {
        let providers = Arc::new(Providers::standard());
        let client = RestClient::new(&self.config, providers)?;
        debug!(
            address = %self.config.address(),
            authorized = client.has_authorization(),
            trust_all_certs = self.config.trust_all_certs(),
            "created kubernetes client"
        );
        Ok(T::from_rest_client(client))
    }
}

impl fmt::Display for KubernetesFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KubernetesFactory{{{}}}", self.config.address())
    }
}

/// Returns `config` once its address passed verification, possibly
/// downgraded from https to http.
fn verified(config: ClientConfig) -> Result<ClientConfig, FactoryError> {
    verified_with(config, validate_master)
}

fn verified_with<F>(mut config: ClientConfig, mut validate: F) -> Result<ClientConfig, FactoryError>
where
    F: FnMut(&ClientConfig) -> Result<(), ConnectivityError>,
{
    let mut downgrades = 0;
    loop {
        if !config.verify_address() {
            return Ok(config);
        }
        let err = match validate(&config) {
            Ok(()) => return Ok(config),
            Err(err) => err,
        };
        let fallback = if err.is_recoverable() && downgrades < MAX_TLS_DOWNGRADES {
            downgrade_scheme(config.address())
        } else {
            None
        };
        match fallback {
            Some(fallback) => {
                warn!(
                    address = %config.address(),
                    fallback = %fallback,
                    error = %err,
                    "address does not appear to be SSL-enabled, falling back to http"
                );
                config = config.with_address(fallback);
                downgrades += 1;
            }
            None => {
                log_rejection(config.address(), &err);
                return Err(FactoryError::InvalidAddress {
                    address: config.address().to_string(),
                    source: err,
                });
            }
        }
    }
}

/// `address` with an `https` scheme, in any case, rewritten to `http`. The
/// rest of the address is kept as written.
fn downgrade_scheme(address: &str) -> Option<String> {
    let (scheme, rest) = address.split_once("://")?;
    scheme
        .eq_ignore_ascii_case("https")
        .then(|| format!("http://{rest}"))
}

fn log_rejection(address: &str, err: &ConnectivityError) {
    match err {
        ConnectivityError::Handshake(cause) => error!(
            address,
            error = %cause,
            "SSL handshake failed, trust the kubernetes SSL certificate or set {KUBERNETES_TRUST_ALL_CERTIFICATES}"
        ),
        ConnectivityError::Protocol(cause)
        | ConnectivityError::BadKey(cause)
        | ConnectivityError::PeerUnverified(cause)
        | ConnectivityError::Tls(cause) => error!(address, error = %cause, "{err}"),
        ConnectivityError::InvalidUrl(cause) => {
            warn!(address, error = %cause, "failed to validate kubernetes master address")
        }
        ConnectivityError::Io(cause) => {
            warn!(address, error = %cause, "failed to validate kubernetes master address")
        }
        ConnectivityError::InvalidCertificate(cause) => error!(address, error = %cause, "{err}"),
    }
}
