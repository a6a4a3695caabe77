//! In-memory stand-in for the slice of the Kubernetes API the client tests
//! exercise: `/version`, namespaces, pods and services.
//!
//! Services are listed with a `text/plain` content type on purpose, the way
//! some proxied API servers label JSON. Errors use the API's `Status` body.

use std::{collections::BTreeMap, sync::Arc};

use axum::{
    extract::{Path, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::RwLock};
use tracing::debug;
use uuid::Uuid;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionInfo {
    pub major: String,
    pub minor: String,
    pub git_version: String,
    pub platform: String,
}

impl Default for VersionInfo {
    fn default() -> Self {
        Self {
            major: "1".to_string(),
            minor: "30".to_string(),
            git_version: "v1.30.0".to_string(),
            platform: "linux/amd64".to_string(),
        }
    }
}

pub const NAMESPACES: &[&str] = &["default", "kube-system"];

/// Objects keyed by `(resource, namespace, name)`.
pub type Db = Arc<RwLock<BTreeMap<(String, String, String), Value>>>;

pub fn app() -> Router {
    let db: Db = Arc::new(RwLock::new(BTreeMap::new()));
    Router::new()
        .route("/version", get(version))
        .route("/api/v1/namespaces", get(list_namespaces))
        .route(
            "/api/v1/namespaces/{namespace}/pods",
            get(list_pods).post(create_pod),
        )
        .route(
            "/api/v1/namespaces/{namespace}/pods/{name}",
            get(get_pod).put(replace_pod).delete(delete_pod),
        )
        .route(
            "/api/v1/namespaces/{namespace}/services",
            get(list_services).post(create_service),
        )
        .route(
            "/api/v1/namespaces/{namespace}/services/{name}",
            get(get_service).delete(delete_service),
        )
        .with_state(db)
}

/// Same routes, rejecting requests without the given basic-auth credentials.
pub fn app_with_basic_auth(username: &str, password: &str) -> Router {
    let expected = Arc::new(format!(
        "Basic {}",
        STANDARD.encode(format!("{username}:{password}"))
    ));
    app().layer(middleware::from_fn_with_state(expected, require_basic_auth))
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    serve(listener, app()).await
}

pub async fn serve(listener: TcpListener, router: Router) -> Result<(), std::io::Error> {
    axum::serve(listener, router).await
}

/// A `Status` failure body with the matching HTTP status.
pub fn status_response(code: StatusCode, reason: &str, message: impl Into<String>) -> Response {
    let body = json!({
        "kind": "Status",
        "apiVersion": "v1",
        "metadata": {},
        "status": "Failure",
        "message": message.into(),
        "reason": reason,
        "code": code.as_u16(),
    });
    (code, Json(body)).into_response()
}

async fn require_basic_auth(
    State(expected): State<Arc<String>>,
    request: Request,
    next: Next,
) -> Response {
    let authorized = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value == expected.as_str());
    if authorized {
        next.run(request).await
    } else {
        status_response(StatusCode::UNAUTHORIZED, "Unauthorized", "Unauthorized")
    }
}

async fn version() -> Json<VersionInfo> {
    Json(VersionInfo::default())
}

async fn list_namespaces() -> Json<Value> {
    let items: Vec<Value> = NAMESPACES
        .iter()
        .map(|name| json!({"metadata": {"name": name}, "status": {"phase": "Active"}}))
        .collect();
    Json(list_body("NamespaceList", items))
}

fn list_body(kind: &str, items: Vec<Value>) -> Value {
    json!({"kind": kind, "apiVersion": "v1", "metadata": {}, "items": items})
}

async fn list_objects(db: &Db, resource: &str, namespace: &str) -> Vec<Value> {
    db.read()
        .await
        .iter()
        .filter(|((r, ns, _), _)| r == resource && ns == namespace)
        .map(|(_, object)| object.clone())
        .collect()
}

async fn create_object(db: &Db, resource: &str, namespace: String, mut object: Value) -> Response {
    let Some(name) = object
        .pointer("/metadata/name")
        .and_then(Value::as_str)
        .map(str::to_string)
    else {
        return status_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            "Invalid",
            format!("{resource}: metadata.name: Required value"),
        );
    };

    let mut objects = db.write().await;
    let key = (resource.to_string(), namespace.clone(), name.clone());
    if objects.contains_key(&key) {
        return status_response(
            StatusCode::CONFLICT,
            "AlreadyExists",
            format!("{resource} \"{name}\" already exists"),
        );
    }

    object["metadata"]["namespace"] = Value::String(namespace);
    object["metadata"]["uid"] = Value::String(Uuid::new_v4().to_string());
    objects.insert(key, object.clone());
    debug!(resource, name = %name, "created object");
    (StatusCode::CREATED, Json(object)).into_response()
}

async fn get_object(db: &Db, resource: &str, namespace: String, name: String) -> Response {
    let objects = db.read().await;
    match objects.get(&(resource.to_string(), namespace, name.clone())) {
        Some(object) => Json(object.clone()).into_response(),
        None => not_found(resource, &name),
    }
}

async fn delete_object(db: &Db, resource: &str, namespace: String, name: String) -> Response {
    let mut objects = db.write().await;
    match objects.remove(&(resource.to_string(), namespace, name.clone())) {
        Some(_) => {
            debug!(resource, name = %name, "deleted object");
            Json(json!({"kind": "Status", "apiVersion": "v1", "status": "Success"})).into_response()
        }
        None => not_found(resource, &name),
    }
}

fn not_found(resource: &str, name: &str) -> Response {
    status_response(
        StatusCode::NOT_FOUND,
        "NotFound",
        format!("{resource} \"{name}\" not found"),
    )
}

async fn list_pods(State(db): State<Db>, Path(namespace): Path<String>) -> Json<Value> {
    let items = list_objects(&db, "pods", &namespace).await;
    Json(list_body("PodList", items))
}

async fn create_pod(
    State(db): State<Db>,
    Path(namespace): Path<String>,
    Json(pod): Json<Value>,
) -> Response {
    create_object(&db, "pods", namespace, pod).await
}

async fn get_pod(State(db): State<Db>, Path((namespace, name)): Path<(String, String)>) -> Response {
    get_object(&db, "pods", namespace, name).await
}

async fn replace_pod(
    State(db): State<Db>,
    Path((namespace, name)): Path<(String, String)>,
    Json(mut pod): Json<Value>,
) -> Response {
    let mut objects = db.write().await;
    let Some(existing) = objects.get_mut(&("pods".to_string(), namespace, name.clone())) else {
        return not_found("pods", &name);
    };
    pod["metadata"]["name"] = Value::String(name);
    pod["metadata"]["namespace"] = existing["metadata"]["namespace"].clone();
    pod["metadata"]["uid"] = existing["metadata"]["uid"].clone();
    *existing = pod.clone();
    Json(pod).into_response()
}

async fn delete_pod(State(db): State<Db>, Path((namespace, name)): Path<(String, String)>) -> Response {
    delete_object(&db, "pods", namespace, name).await
}

async fn list_services(State(db): State<Db>, Path(namespace): Path<String>) -> Response {
    let items = list_objects(&db, "services", &namespace).await;
    let body = list_body("ServiceList", items).to_string();
    ([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], body).into_response()
}

async fn create_service(
    State(db): State<Db>,
    Path(namespace): Path<String>,
    Json(service): Json<Value>,
) -> Response {
    create_object(&db, "services", namespace, service).await
}

async fn get_service(
    State(db): State<Db>,
    Path((namespace, name)): Path<(String, String)>,
) -> Response {
    get_object(&db, "services", namespace, name).await
}

async fn delete_service(
    State(db): State<Db>,
    Path((namespace, name)): Path<(String, String)>,
) -> Response {
    delete_object(&db, "services", namespace, name).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_serializes_camel_case() {
        let json = serde_json::to_value(VersionInfo::default()).unwrap();
        assert_eq!(json["gitVersion"], "v1.30.0");
        assert_eq!(json["major"], "1");
    }

    #[test]
    fn list_body_wraps_items() {
        let body = list_body("PodList", vec![json!({"metadata": {"name": "a"}})]);
        assert_eq!(body["kind"], "PodList");
        assert_eq!(body["items"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn status_response_carries_code() {
        let response = status_response(StatusCode::CONFLICT, "AlreadyExists", "exists");
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }
}
