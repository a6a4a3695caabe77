//! The few Kubernetes API shapes the client itself needs to understand.
//!
//! # Design
//! The API schema is not modelled here. Resource bodies travel as
//! `serde_json::Value`; only the envelope types the client inspects (error
//! `Status`, list wrapper, version info) get structs.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The `Status` object the API server returns alongside error responses.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub reason: String,
    /// Declared `int32` by the API; `0` when the server left it out.
    #[serde(default)]
    pub code: i32,
}

impl Status {
    /// Parses `body` as a `Status`, or `None` when it is some other document.
    pub fn from_body(body: &str) -> Option<Status> {
        serde_json::from_str::<Status>(body)
            .ok()
            .filter(|status| status.kind == "Status")
    }
}

/// Response of `GET /version`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VersionInfo {
    pub major: String,
    pub minor: String,
    #[serde(default)]
    pub git_version: String,
    #[serde(default)]
    pub platform: String,
}

/// A `*List` resource such as `PodList`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectList<T = Value> {
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub api_version: String,
    #[serde(default)]
    pub metadata: Value,
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
}
