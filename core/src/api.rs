//! Typed handles over `RestClient`.
//!
//! `Kubernetes` covers reads, `KubernetesExtensions` covers writes. Both are
//! thin: they name the API paths and leave resource bodies as JSON values.

use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use serde_json::Value;

use crate::client::{FromRestClient, RestClient};
use crate::error::ApiError;
use crate::types::{ObjectList, VersionInfo};

/// Characters that would end or split a path segment.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Path of a namespaced collection, or of one object in it when `name` is
/// given. `namespace` and `name` are percent-encoded as single segments.
fn namespaced(namespace: &str, resource: &str, name: Option<&str>) -> String {
    let mut path = format!(
        "/api/v1/namespaces/{}/{resource}",
        utf8_percent_encode(namespace, PATH_SEGMENT)
    );
    if let Some(name) = name {
        path.push('/');
        path.extend(utf8_percent_encode(name, PATH_SEGMENT));
    }
    path
}

/// Read-only view of the core API group.
#[derive(Debug, Clone)]
pub struct Kubernetes {
    client: RestClient,
}

impl Kubernetes {
    pub fn rest_client(&self) -> &RestClient {
        &self.client
    }

    pub fn version(&self) -> Result<VersionInfo, ApiError> {
        self.client.get("/version")
    }

    pub fn namespaces(&self) -> Result<ObjectList, ApiError> {
        self.client.get("/api/v1/namespaces")
    }

    pub fn pods(&self, namespace: &str) -> Result<ObjectList, ApiError> {
        self.client.get(&namespaced(namespace, "pods", None))
    }

    pub fn pod(&self, namespace: &str, name: &str) -> Result<Value, ApiError> {
        self.client.get(&namespaced(namespace, "pods", Some(name)))
    }

    pub fn services(&self, namespace: &str) -> Result<ObjectList, ApiError> {
        self.client.get(&namespaced(namespace, "services", None))
    }

    pub fn service(&self, namespace: &str, name: &str) -> Result<Value, ApiError> {
        self.client.get(&namespaced(namespace, "services", Some(name)))
    }

    /// GET on an arbitrary API path such as `/apis/apps/v1/deployments`.
    pub fn get(&self, path: &str) -> Result<Value, ApiError> {
        self.client.get(path)
    }
}

impl FromRestClient for Kubernetes {
    fn from_rest_client(client: RestClient) -> Self {
        Self { client }
    }
}

/// Write access to the core API group.
#[derive(Debug, Clone)]
pub struct KubernetesExtensions {
    client: RestClient,
}

impl KubernetesExtensions {
    pub fn rest_client(&self) -> &RestClient {
        &self.client
    }

    pub fn create_pod(&self, namespace: &str, pod: &Value) -> Result<Value, ApiError> {
        self.client.post(&namespaced(namespace, "pods", None), pod)
    }

    pub fn update_pod(&self, namespace: &str, name: &str, pod: &Value) -> Result<Value, ApiError> {
        self.client
            .put(&namespaced(namespace, "pods", Some(name)), pod)
    }

    pub fn delete_pod(&self, namespace: &str, name: &str) -> Result<(), ApiError> {
        self.client
            .delete(&namespaced(namespace, "pods", Some(name)))
    }

    pub fn create_service(&self, namespace: &str, service: &Value) -> Result<Value, ApiError> {
        self.client.post(&namespaced(namespace, "services", None), service)
    }

    pub fn delete_service(&self, namespace: &str, name: &str) -> Result<(), ApiError> {
        self.client
            .delete(&namespaced(namespace, "services", Some(name)))
    }

    /// POST `body` to an arbitrary API path.
    pub fn create(&self, path: &str, body: &Value) -> Result<Value, ApiError> {
        self.client.post(path, body)
    }

    /// PUT `body` to an arbitrary API path.
    pub fn replace(&self, path: &str, body: &Value) -> Result<Value, ApiError> {
        self.client.put(path, body)
    }

    pub fn delete(&self, path: &str) -> Result<(), ApiError> {
        self.client.delete(path)
    }
}

impl FromRestClient for KubernetesExtensions {
    fn from_rest_client(client: RestClient) -> Self {
        Self { client }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::config::ClientConfig;
    use crate::http::HttpMethod;
    use crate::providers::Providers;

    use super::*;

    #[test]
    fn namespaced_paths() {
        assert_eq!(namespaced("default", "pods", None), "/api/v1/namespaces/default/pods");
        assert_eq!(
            namespaced("kube-system", "services", Some("dns")),
            "/api/v1/namespaces/kube-system/services/dns"
        );
    }

    #[test]
    fn namespaced_paths_encode_each_segment() {
        assert_eq!(
            namespaced("team a", "pods", Some("a/b?c#d%")),
            "/api/v1/namespaces/team%20a/pods/a%2Fb%3Fc%23d%25"
        );
        assert_eq!(
            namespaced("default", "pods", Some("web-1.v2")),
            "/api/v1/namespaces/default/pods/web-1.v2"
        );
    }

    #[test]
    fn handles_share_the_rest_client() {
        let rest = RestClient::new(
            &ClientConfig::new("http://localhost:8080"),
            Arc::new(Providers::standard()),
        )
        .unwrap();
        let kube = Kubernetes::from_rest_client(rest.clone());
        let ext = KubernetesExtensions::from_rest_client(rest);
        assert_eq!(kube.rest_client().base_url(), "http://localhost:8080");
        let req = ext
            .rest_client()
            .build_request::<Value>(HttpMethod::Delete, &namespaced("default", "pods", Some("web")), None)
            .unwrap();
        assert_eq!(req.url, "http://localhost:8080/api/v1/namespaces/default/pods/web");
    }
}
