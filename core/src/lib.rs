//! Factory for blocking Kubernetes REST clients.
//!
//! # Overview
//! Resolves the API server address (explicit argument, service environment
//! variables, `KUBERNETES_MASTER`, the `kubernetes.master` property, or
//! `http://localhost:8080`), optionally probes it for reachability and TLS
//! trust, and builds `RestClient`s with JSON codecs, optional basic auth and
//! an optional trust-all-certificates override.
//!
//! # Design
//! - `KubeEnv::load()` is the only place the process environment is read.
//! - `ClientConfig` is immutable; an https→http downgrade yields a new value.
//! - Requests are built and parsed as plain data (`HttpRequest` /
//!   `HttpResponse`); only `RestClient::execute` does I/O.
//!
//! ```no_run
//! use kube_factory::{KubeEnv, KubernetesFactory};
//!
//! let factory = KubernetesFactory::new(&KubeEnv::load())?;
//! let kube = factory.create_kubernetes()?;
//! println!("{:?}", kube.version()?);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod factory;
pub mod http;
pub mod providers;
pub mod resolver;
pub mod types;
pub mod validator;

pub use api::{Kubernetes, KubernetesExtensions};
pub use client::{FromRestClient, RestClient};
pub use config::{ClientConfig, KubeEnv, DEFAULT_KUBERNETES_MASTER};
pub use error::{
    ApiError, ClientError, ConfigError, ConnectivityError, FactoryError, InvalidCertificate,
};
pub use factory::KubernetesFactory;
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use providers::{BodyCodec, ErrorResponseMapper, JsonCodec, MediaType, PlainTextJsonCodec, Providers};
pub use resolver::{kubernetes_master_host, resolve_http_master, resolve_master};
pub use types::{ObjectList, Status, VersionInfo};
pub use validator::validate_master;
