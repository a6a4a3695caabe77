//! End-to-end tests against the live mock API server.
//!
//! # Design
//! Each test starts the mock server on a random port in a background thread
//! with its own tokio runtime, then drives it through a verified
//! `KubernetesFactory` using the blocking client.

use std::net::SocketAddr;

use kube_factory::config::{KUBERNETES_MASTER_ENV_VAR, KUBERNETES_PASSWORD, KUBERNETES_USERNAME};
use kube_factory::{ApiError, KubeEnv, KubernetesFactory};
use serde_json::json;

fn spawn(router: axum::Router) -> SocketAddr {
    let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = std_listener.local_addr().unwrap();
    std_listener.set_nonblocking(true).unwrap();

    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
            mock_server::serve(listener, router).await
        })
        .unwrap();
    });

    addr
}

fn factory_for(addr: SocketAddr, env: &KubeEnv) -> KubernetesFactory {
    KubernetesFactory::with_address(Some(&format!("http://{addr}")), false, env).unwrap()
}

#[test]
fn reads_version_and_namespaces() {
    let addr = spawn(mock_server::app());
    let factory = factory_for(addr, &KubeEnv::default());
    assert_eq!(factory.kubernetes_master(), "127.0.0.1");

    let kube = factory.create_kubernetes().unwrap();
    let version = kube.version().unwrap();
    assert_eq!(version.major, "1");
    assert_eq!(version.git_version, "v1.30.0");

    let namespaces = kube.namespaces().unwrap();
    assert_eq!(namespaces.kind, "NamespaceList");
    assert_eq!(namespaces.items.len(), 2);
}

#[test]
fn master_resolved_from_env_is_verified() {
    let addr = spawn(mock_server::app());
    let env = KubeEnv::default().with_var(KUBERNETES_MASTER_ENV_VAR, &format!("tcp://{addr}"));
    let factory = KubernetesFactory::new(&env).unwrap();
    assert_eq!(factory.address(), format!("http://{addr}"));
    factory.create_kubernetes().unwrap().version().unwrap();
}

#[test]
fn pod_lifecycle() {
    let addr = spawn(mock_server::app());
    let factory = factory_for(addr, &KubeEnv::default());
    let kube = factory.create_kubernetes().unwrap();
    let ext = factory.create_kubernetes_extensions().unwrap();

    // Step 1: empty namespace.
    assert!(kube.pods("default").unwrap().items.is_empty());

    // Step 2: create.
    let pod = json!({"kind": "Pod", "metadata": {"name": "web"}, "spec": {"image": "nginx"}});
    let created = ext.create_pod("default", &pod).unwrap();
    assert_eq!(created["metadata"]["namespace"], "default");
    let uid = created["metadata"]["uid"].clone();

    // Step 3: read back.
    let fetched = kube.pod("default", "web").unwrap();
    assert_eq!(fetched, created);
    assert_eq!(kube.pods("default").unwrap().items.len(), 1);

    // Step 4: creating twice is a conflict reported through `Status`.
    let err = ext.create_pod("default", &pod).unwrap_err();
    match err {
        ApiError::Status { code, reason, .. } => {
            assert_eq!(code, 409);
            assert_eq!(reason, "AlreadyExists");
        }
        other => panic!("unexpected error: {other:?}"),
    }

    // Step 5: replace.
    let replacement = json!({"kind": "Pod", "metadata": {"name": "web"}, "spec": {"image": "httpd"}});
    let updated = ext.update_pod("default", "web", &replacement).unwrap();
    assert_eq!(updated["spec"]["image"], "httpd");
    assert_eq!(updated["metadata"]["uid"], uid);

    // Step 6: delete, then the pod is gone.
    ext.delete_pod("default", "web").unwrap();
    let err = kube.pod("default", "web").unwrap_err();
    assert!(matches!(err, ApiError::NotFound));
    let err = ext.delete_pod("default", "web").unwrap_err();
    assert!(matches!(err, ApiError::NotFound));
}

#[test]
fn names_with_reserved_characters_stay_one_segment() {
    let addr = spawn(mock_server::app());
    let factory = factory_for(addr, &KubeEnv::default());
    let kube = factory.create_kubernetes().unwrap();
    let ext = factory.create_kubernetes_extensions().unwrap();

    let name = "web?watch=1#top";
    ext.create_pod("default", &json!({"metadata": {"name": name}}))
        .unwrap();
    assert_eq!(kube.pod("default", name).unwrap()["metadata"]["name"], name);
    assert!(matches!(kube.pod("default", "web"), Err(ApiError::NotFound)));

    ext.delete_pod("default", name).unwrap();
    assert!(kube.pods("default").unwrap().items.is_empty());
}

#[test]
fn plain_text_service_list_is_decoded_as_json() {
    let addr = spawn(mock_server::app());
    let factory = factory_for(addr, &KubeEnv::default());
    let kube = factory.create_kubernetes().unwrap();
    let ext = factory.create_kubernetes_extensions().unwrap();

    ext.create_service(
        "default",
        &json!({"kind": "Service", "metadata": {"name": "dns"}, "spec": {"ports": [{"port": 53}]}}),
    )
    .unwrap();

    let services = kube.services("default").unwrap();
    assert_eq!(services.kind, "ServiceList");
    assert_eq!(services.items[0]["metadata"]["name"], "dns");
    assert_eq!(kube.service("default", "dns").unwrap()["spec"]["ports"][0]["port"], 53);

    ext.delete_service("default", "dns").unwrap();
    assert!(kube.services("default").unwrap().items.is_empty());
}

#[test]
fn generic_paths_reach_the_server() {
    let addr = spawn(mock_server::app());
    let factory = factory_for(addr, &KubeEnv::default());
    let kube = factory.create_kubernetes().unwrap();
    let ext = factory.create_kubernetes_extensions().unwrap();

    let path = "/api/v1/namespaces/kube-system/pods";
    ext.create(path, &json!({"metadata": {"name": "coredns"}})).unwrap();
    let list = kube.get(path).unwrap();
    assert_eq!(list["items"][0]["metadata"]["name"], "coredns");

    let replaced = ext
        .replace(
            "/api/v1/namespaces/kube-system/pods/coredns",
            &json!({"metadata": {}, "spec": {"replicas": 2}}),
        )
        .unwrap();
    assert_eq!(replaced["spec"]["replicas"], 2);
    ext.delete("/api/v1/namespaces/kube-system/pods/coredns").unwrap();
}

#[test]
fn basic_auth_credentials_from_env_are_sent() {
    let addr = spawn(mock_server::app_with_basic_auth("admin", "secret"));
    let env = KubeEnv::default()
        .with_var(KUBERNETES_USERNAME, "admin")
        .with_var(KUBERNETES_PASSWORD, "secret");
    let kube = factory_for(addr, &env).create_kubernetes().unwrap();
    assert_eq!(kube.version().unwrap().major, "1");
}

#[test]
fn missing_credentials_are_rejected_by_server() {
    let addr = spawn(mock_server::app_with_basic_auth("admin", "secret"));
    let kube = factory_for(addr, &KubeEnv::default()).create_kubernetes().unwrap();
    let err = kube.version().unwrap_err();
    assert!(matches!(err, ApiError::Status { code: 401, .. }));
}

#[test]
fn set_address_moves_clients_to_the_new_master() {
    let first = spawn(mock_server::app());
    let second = spawn(mock_server::app());
    let mut factory = factory_for(first, &KubeEnv::default());

    factory.set_address(&format!("http://{second}")).unwrap();
    let kube = factory.create_kubernetes().unwrap();
    assert_eq!(kube.rest_client().base_url(), format!("http://{second}"));
    kube.version().unwrap();
}
