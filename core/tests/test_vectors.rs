//! Verify address resolution and host extraction against JSON test vectors
//! stored in `test-vectors/`.

use kube_factory::{kubernetes_master_host, resolve_http_master, KubeEnv};

fn env_from(case: &serde_json::Value) -> KubeEnv {
    let vars = case["env"].as_object().unwrap().clone();
    let mut env = KubeEnv::from_lookup(|name| {
        vars.get(name).and_then(|v| v.as_str()).map(str::to_string)
    });
    for (key, value) in case["properties"].as_object().unwrap() {
        env = env.with_property(key, value.as_str().unwrap());
    }
    env
}

#[test]
fn resolve_test_vectors() {
    let raw = include_str!("../../test-vectors/resolve.json");
    let vectors: serde_json::Value = serde_json::from_str(raw).unwrap();

    for case in vectors["cases"].as_array().unwrap() {
        let name = case["name"].as_str().unwrap();
        let writeable = case["writeable"].as_bool().unwrap();
        let expected = case["expected"].as_str().unwrap();

        let resolved = resolve_http_master(&env_from(case), writeable);
        assert_eq!(resolved, expected, "{name}");
    }
}

#[test]
fn host_test_vectors() {
    let raw = include_str!("../../test-vectors/host.json");
    let vectors: serde_json::Value = serde_json::from_str(raw).unwrap();

    for case in vectors["cases"].as_array().unwrap() {
        let address = case["address"].as_str().unwrap();
        let expected = case["expected"].as_str().unwrap();
        assert_eq!(kubernetes_master_host(address), expected, "{address}");
    }
}
