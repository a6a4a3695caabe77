//! Master address resolution.
//!
//! Pure lookups over a `KubeEnv` snapshot plus string composition; nothing
//! here touches the network.

use crate::config::{
    is_blank, KubeEnv, DEFAULT_KUBERNETES_MASTER, KUBERNETES_MASTER_ENV_VAR,
    KUBERNETES_MASTER_PROPERTY, KUBERNETES_RO_SERVICE_HOST_ENV_VAR,
    KUBERNETES_RO_SERVICE_PORT_ENV_VAR, KUBERNETES_SERVICE_HOST_ENV_VAR,
    KUBERNETES_SERVICE_PORT_ENV_VAR,
};

/// Resolves the master URL.
///
/// Tries, in order: the read-only (or, when `writeable`, read-write) service
/// host/port pair, `KUBERNETES_MASTER`, the `kubernetes.master` property, and
/// finally [`DEFAULT_KUBERNETES_MASTER`].
pub fn resolve_master(env: &KubeEnv, writeable: bool) -> String {
    let (host_var, port_var, scheme) = if writeable {
        (
            KUBERNETES_SERVICE_HOST_ENV_VAR,
            KUBERNETES_SERVICE_PORT_ENV_VAR,
            "https",
        )
    } else {
        (
            KUBERNETES_RO_SERVICE_HOST_ENV_VAR,
            KUBERNETES_RO_SERVICE_PORT_ENV_VAR,
            "http",
        )
    };

    let from_service = env.var(host_var).filter(|host| !is_blank(host)).map(|host| {
        let port = env.var(port_var).unwrap_or_default();
        format!("{scheme}://{host}:{port}")
    });

    from_service
        .or_else(|| non_blank(env.var(KUBERNETES_MASTER_ENV_VAR)))
        .or_else(|| non_blank(env.property(KUBERNETES_MASTER_PROPERTY)))
        .unwrap_or_else(|| DEFAULT_KUBERNETES_MASTER.to_string())
}

/// Resolves the master URL and rewrites a `tcp:` scheme to `http:`.
pub fn resolve_http_master(env: &KubeEnv, writeable: bool) -> String {
    to_http_scheme(&resolve_master(env, writeable))
}

/// Rewrites a leading `tcp:` to `http:`; everything else passes through.
pub fn to_http_scheme(address: &str) -> String {
    match address.strip_prefix("tcp:") {
        Some(rest) => format!("http:{rest}"),
        None => address.to_string(),
    }
}

/// Extracts the bare host from a master address.
///
/// Applies three strips in a fixed order, each only when the separator sits
/// past index 0: cut from the last `:`, keep what follows the new last `:`,
/// keep what follows the last `/`. A well-formed `scheme://host:port` yields
/// `host`; other shapes are stripped the same way rather than parsed.
pub fn kubernetes_master_host(address: &str) -> String {
    let mut answer = address;
    if let Some(idx) = answer.rfind(':').filter(|&idx| idx > 0) {
        answer = &answer[..idx];
    }
    if let Some(idx) = answer.rfind(':').filter(|&idx| idx > 0) {
        answer = &answer[idx + 1..];
    }
    if let Some(idx) = answer.rfind('/').filter(|&idx| idx > 0) {
        answer = &answer[idx + 1..];
    }
    answer.to_string()
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value.filter(|v| !is_blank(v)).map(str::to_string)
}
