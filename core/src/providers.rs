//! Content providers attached to every REST client.
//!
//! # Design
//! A provider set is an ordered list of body codecs plus one error mapper.
//! Codecs work on `serde_json::Value` so they stay object safe; typed
//! conversion happens once in `RestClient`. Order matters: the first codec
//! that accepts a media type handles it.
//!
//! The plain-text codec exists because some API servers and proxies label
//! JSON bodies as `text/plain`. It decodes any `text/*` payload as JSON.

use std::fmt;

use serde_json::Value;

use crate::error::ApiError;
use crate::http::HttpResponse;
use crate::types::Status;

/// `type/subtype` of a `Content-Type` header, parameters dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaType {
    pub kind: String,
    pub subtype: String,
}

impl MediaType {
    pub fn application_json() -> Self {
        Self {
            kind: "application".to_string(),
            subtype: "json".to_string(),
        }
    }

    /// Parses `type/subtype[; params]`, lower-casing both parts.
    pub fn parse(value: &str) -> Option<Self> {
        let essence = value.split(';').next()?.trim();
        let (kind, subtype) = essence.split_once('/')?;
        let (kind, subtype) = (kind.trim(), subtype.trim());
        if kind.is_empty() || subtype.is_empty() {
            return None;
        }
        Some(Self {
            kind: kind.to_ascii_lowercase(),
            subtype: subtype.to_ascii_lowercase(),
        })
    }

    /// `application/json` or any `+json` structured suffix.
    pub fn is_json(&self) -> bool {
        self.kind == "application" && (self.subtype == "json" || self.subtype.ends_with("+json"))
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.subtype)
    }
}

/// Encodes and decodes request and response bodies for some media types.
pub trait BodyCodec: fmt::Debug + Send + Sync {
    fn accepts(&self, media_type: &MediaType) -> bool;

    fn encode(&self, value: &Value) -> Result<String, serde_json::Error>;

    fn decode(&self, body: &str) -> Result<Value, serde_json::Error>;
}

/// JSON codec. Output is indented when `pretty` is set.
#[derive(Debug, Clone, Copy)]
pub struct JsonCodec {
    pretty: bool,
}

impl JsonCodec {
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }
}

impl BodyCodec for JsonCodec {
    fn accepts(&self, media_type: &MediaType) -> bool {
        media_type.is_json()
    }

    fn encode(&self, value: &Value) -> Result<String, serde_json::Error> {
        if self.pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        }
    }

    fn decode(&self, body: &str) -> Result<Value, serde_json::Error> {
        serde_json::from_str(body)
    }
}

/// JSON codec that also accepts `text/*` payloads.
#[derive(Debug, Clone, Copy)]
pub struct PlainTextJsonCodec {
    inner: JsonCodec,
}

impl PlainTextJsonCodec {
    pub fn new(inner: JsonCodec) -> Self {
        Self { inner }
    }
}

impl BodyCodec for PlainTextJsonCodec {
    fn accepts(&self, media_type: &MediaType) -> bool {
        self.inner.accepts(media_type) || media_type.kind == "text"
    }

    fn encode(&self, value: &Value) -> Result<String, serde_json::Error> {
        self.inner.encode(value)
    }

    fn decode(&self, body: &str) -> Result<Value, serde_json::Error> {
        self.inner.decode(body)
    }
}

/// Turns non-2xx responses into `ApiError`s.
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorResponseMapper;

impl ErrorResponseMapper {
    /// `None` for a 2xx response.
    pub fn map(&self, response: &HttpResponse) -> Option<ApiError> {
        if response.is_success() {
            return None;
        }
        if response.status == 404 {
            return Some(ApiError::NotFound);
        }
        let error = match Status::from_body(&response.body) {
            Some(status) => ApiError::Status {
                // Codes outside the HTTP range fall back to the response status.
                code: u16::try_from(status.code)
                    .ok()
                    .filter(|code| *code != 0)
                    .unwrap_or(response.status),
                reason: status.reason,
                message: status.message,
            },
            None => ApiError::HttpError {
                status: response.status,
                body: response.body.clone(),
            },
        };
        Some(error)
    }
}

/// The ordered provider set shared by clients.
#[derive(Debug)]
pub struct Providers {
    codecs: Vec<Box<dyn BodyCodec>>,
    error_mapper: ErrorResponseMapper,
}

impl Providers {
    /// Pretty JSON, then tolerant plain-text JSON, then the error mapper.
    pub fn standard() -> Self {
        let json = JsonCodec::new(true);
        Self {
            codecs: vec![Box::new(json), Box::new(PlainTextJsonCodec::new(json))],
            error_mapper: ErrorResponseMapper,
        }
    }

    pub fn codecs(&self) -> &[Box<dyn BodyCodec>] {
        &self.codecs
    }

    /// First codec accepting `media_type`.
    pub fn codec_for(&self, media_type: &MediaType) -> Option<&dyn BodyCodec> {
        self.codecs
            .iter()
            .find(|codec| codec.accepts(media_type))
            .map(|codec| codec.as_ref())
    }

    pub fn error_mapper(&self) -> &ErrorResponseMapper {
        &self.error_mapper
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: u16, body: &str) -> HttpResponse {
        HttpResponse {
            status,
            headers: Vec::new(),
            body: body.to_string(),
        }
    }

    #[test]
    fn media_type_drops_parameters() {
        let media = MediaType::parse("Application/JSON; charset=utf-8").unwrap();
        assert_eq!(media, MediaType::application_json());
        assert!(MediaType::parse("garbage").is_none());
        assert!(MediaType::parse("/json").is_none());
    }

    #[test]
    fn structured_json_suffix_counts_as_json() {
        assert!(MediaType::parse("application/merge-patch+json").unwrap().is_json());
        assert!(!MediaType::parse("application/yaml").unwrap().is_json());
    }

    #[test]
    fn strict_codec_rejects_text() {
        let text = MediaType::parse("text/plain").unwrap();
        assert!(!JsonCodec::new(true).accepts(&text));
        assert!(PlainTextJsonCodec::new(JsonCodec::new(true)).accepts(&text));
    }

    #[test]
    fn pretty_codec_indents_output() {
        let value = serde_json::json!({"kind": "Pod"});
        assert!(JsonCodec::new(true).encode(&value).unwrap().contains('\n'));
        assert!(!JsonCodec::new(false).encode(&value).unwrap().contains('\n'));
    }

    #[test]
    fn standard_providers_prefer_strict_json() {
        let providers = Providers::standard();
        assert_eq!(providers.codecs().len(), 2);
        assert!(providers.codec_for(&MediaType::application_json()).is_some());
        assert!(providers.codec_for(&MediaType::parse("text/plain").unwrap()).is_some());
        assert!(providers
            .codec_for(&MediaType::parse("application/octet-stream").unwrap())
            .is_none());
    }

    #[test]
    fn mapper_passes_success() {
        assert!(ErrorResponseMapper.map(&response(200, "{}")).is_none());
        assert!(ErrorResponseMapper.map(&response(204, "")).is_none());
    }

    #[test]
    fn mapper_reports_not_found() {
        let err = ErrorResponseMapper.map(&response(404, "")).unwrap();
        assert!(matches!(err, ApiError::NotFound));
    }

    #[test]
    fn mapper_reads_status_body() {
        let body = r#"{"kind":"Status","status":"Failure","message":"forbidden","reason":"Forbidden","code":403}"#;
        let err = ErrorResponseMapper.map(&response(403, body)).unwrap();
        match err {
            ApiError::Status { code, reason, message } => {
                assert_eq!(code, 403);
                assert_eq!(reason, "Forbidden");
                assert_eq!(message, "forbidden");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn mapper_falls_back_to_http_status_for_odd_codes() {
        for body in [
            r#"{"kind":"Status","reason":"Invalid","code":70000}"#,
            r#"{"kind":"Status","reason":"Invalid","code":-1}"#,
            r#"{"kind":"Status","reason":"Invalid"}"#,
        ] {
            let err = ErrorResponseMapper.map(&response(422, body)).unwrap();
            match err {
                ApiError::Status { code, reason, .. } => {
                    assert_eq!(code, 422, "{body}");
                    assert_eq!(reason, "Invalid");
                }
                other => panic!("unexpected error for {body}: {other:?}"),
            }
        }
    }

    #[test]
    fn mapper_keeps_raw_body_otherwise() {
        let err = ErrorResponseMapper.map(&response(500, "boom")).unwrap();
        assert!(matches!(err, ApiError::HttpError { status: 500, .. }));
    }
}
