//! REST client bound to one master address.
//!
//! # Design
//! Every call goes through three steps: `build_request` produces an
//! `HttpRequest` (URL, headers, encoded body), `execute` performs the round
//! trip with a `ureq::Agent`, and `parse` runs the error mapper and the
//! matching codec over the `HttpResponse`. The first and last steps never
//! touch the network, so headers and decoding are testable on their own.
//!
//! Status codes are interpreted by the provider set, not by ureq: the agent
//! is configured with `http_status_as_error(false)`.

use std::fmt;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;
use ureq::tls::{Certificate, RootCerts, TlsConfig};
use ureq::{Agent, RequestBuilder};
use url::Url;

use crate::config::{root_cert_store, ClientConfig};
use crate::error::{ApiError, ClientError};
use crate::http::{HttpMethod, HttpRequest, HttpResponse, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use crate::providers::{MediaType, Providers};

const APPLICATION_JSON: &str = "application/json";

/// Typed client handles that can be minted from a `RestClient`.
pub trait FromRestClient {
    fn from_rest_client(client: RestClient) -> Self;
}

/// Blocking REST client for one API server.
#[derive(Clone)]
pub struct RestClient {
    base_url: String,
    agent: Agent,
    providers: Arc<Providers>,
    authorization: Option<SecretString>,
}

impl RestClient {
    /// Builds a client for `config.address()`.
    ///
    /// Basic auth is attached when both username and password are non-blank.
    /// `trust_all_certs` turns off certificate chain and host-name checks for
    /// this client only.
    pub fn new(config: &ClientConfig, providers: Arc<Providers>) -> Result<Self, ClientError> {
        let address = config.address();
        let url = Url::parse(address).map_err(|source| ClientError::InvalidBaseUrl {
            address: address.to_string(),
            source,
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ClientError::UnsupportedScheme {
                address: address.to_string(),
                scheme: url.scheme().to_string(),
            });
        }

        let agent = Agent::config_builder()
            .http_status_as_error(false)
            .tls_config(tls_config(config)?)
            .build()
            .new_agent();

        let authorization = config.credentials().map(|(username, password)| {
            let token = STANDARD.encode(format!("{username}:{}", password.expose_secret()));
            SecretString::new(format!("Basic {token}"))
        });

        Ok(Self {
            base_url: address.trim_end_matches('/').to_string(),
            agent,
            providers,
            authorization,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn providers(&self) -> &Providers {
        &self.providers
    }

    pub fn has_authorization(&self) -> bool {
        self.authorization.is_some()
    }

    /// Describes a call to `path` (relative to the base URL) as plain data.
    pub fn build_request<B: Serialize + ?Sized>(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<&B>,
    ) -> Result<HttpRequest, ApiError> {
        let mut headers = vec![(ACCEPT.to_string(), APPLICATION_JSON.to_string())];
        if let Some(authorization) = &self.authorization {
            headers.push((
                AUTHORIZATION.to_string(),
                authorization.expose_secret().clone(),
            ));
        }

        let body = match body {
            Some(body) => {
                headers.push((CONTENT_TYPE.to_string(), APPLICATION_JSON.to_string()));
                Some(self.encode(body)?)
            }
            None => None,
        };

        Ok(HttpRequest {
            method,
            url: format!("{}/{}", self.base_url, path.trim_start_matches('/')),
            headers,
            body,
        })
    }

    /// Performs the round trip for `request`.
    pub fn execute(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
        debug!(method = %request.method, url = %request.url, "sending request");

        let HttpRequest {
            method,
            url,
            headers,
            body,
        } = request;
        let mut response = match method {
            HttpMethod::Get => with_headers(self.agent.get(&url), &headers).call(),
            HttpMethod::Delete => with_headers(self.agent.delete(&url), &headers).call(),
            HttpMethod::Post => {
                let builder = with_headers(self.agent.post(&url), &headers);
                match body {
                    Some(body) => builder.send(body.as_bytes()),
                    None => builder.send_empty(),
                }
            }
            HttpMethod::Put => {
                let builder = with_headers(self.agent.put(&url), &headers);
                match body {
                    Some(body) => builder.send(body.as_bytes()),
                    None => builder.send_empty(),
                }
            }
        }?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_string(), value.to_string()))
            })
            .collect();
        let body = response.body_mut().read_to_string()?;

        debug!(status, url = %url, "received response");
        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }

    /// Maps error statuses, then decodes the body with the first codec that
    /// accepts its content type. A missing `Content-Type` is read as JSON.
    pub fn parse<T: DeserializeOwned>(&self, response: HttpResponse) -> Result<T, ApiError> {
        if let Some(err) = self.providers.error_mapper().map(&response) {
            return Err(err);
        }

        let media_type = match response.header(CONTENT_TYPE) {
            Some(raw) => MediaType::parse(raw)
                .ok_or_else(|| ApiError::UnsupportedMediaType(raw.to_string()))?,
            None => MediaType::application_json(),
        };
        let codec = self
            .providers
            .codec_for(&media_type)
            .ok_or_else(|| ApiError::UnsupportedMediaType(media_type.to_string()))?;

        let value = if response.body.trim().is_empty() {
            Value::Null
        } else {
            codec
                .decode(&response.body)
                .map_err(|e| ApiError::DeserializationError(e.to_string()))?
        };
        serde_json::from_value(value).map_err(|e| ApiError::DeserializationError(e.to_string()))
    }

    /// Maps error statuses and ignores the body.
    pub fn parse_empty(&self, response: HttpResponse) -> Result<(), ApiError> {
        match self.providers.error_mapper().map(&response) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    pub fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let request = self.build_request::<Value>(HttpMethod::Get, path, None)?;
        self.parse(self.execute(request)?)
    }

    pub fn post<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = self.build_request(HttpMethod::Post, path, Some(body))?;
        self.parse(self.execute(request)?)
    }

    pub fn put<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = self.build_request(HttpMethod::Put, path, Some(body))?;
        self.parse(self.execute(request)?)
    }

    pub fn delete(&self, path: &str) -> Result<(), ApiError> {
        let request = self.build_request::<Value>(HttpMethod::Delete, path, None)?;
        self.parse_empty(self.execute(request)?)
    }

    fn encode<B: Serialize + ?Sized>(&self, body: &B) -> Result<String, ApiError> {
        let value =
            serde_json::to_value(body).map_err(|e| ApiError::SerializationError(e.to_string()))?;
        let codec = self
            .providers
            .codec_for(&MediaType::application_json())
            .ok_or_else(|| ApiError::UnsupportedMediaType(APPLICATION_JSON.to_string()))?;
        codec
            .encode(&value)
            .map_err(|e| ApiError::SerializationError(e.to_string()))
    }
}

impl FromRestClient for RestClient {
    fn from_rest_client(client: RestClient) -> Self {
        client
    }
}

impl fmt::Debug for RestClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestClient")
            .field("base_url", &self.base_url)
            .field("providers", &self.providers)
            .field("authorization", &self.authorization.as_ref().map(|_| "[REDACTED]"))
            .finish_non_exhaustive()
    }
}

fn with_headers<B>(mut builder: RequestBuilder<B>, headers: &[(String, String)]) -> RequestBuilder<B> {
    for (name, value) in headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder
}

fn tls_config(config: &ClientConfig) -> Result<TlsConfig, ClientError> {
    if config.trust_all_certs() {
        return Ok(TlsConfig::builder().disable_verification(true).build());
    }
    if config.trusted_root_certs().is_empty() {
        return Ok(TlsConfig::default());
    }
    // ureq only parses the roots on first use; reject bad ones now.
    root_cert_store(config.trusted_root_certs())?;
    let certs: Vec<Certificate<'static>> = config
        .trusted_root_certs()
        .iter()
        .map(|der| Certificate::from_der(der.as_ref()).to_owned())
        .collect();
    Ok(TlsConfig::builder()
        .root_certs(RootCerts::new_with_certs(&certs))
        .build())
}
