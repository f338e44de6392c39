//! Client-side interpretation of error responses.
//!
//! A failed call carries either a typed error DTO exposing a
//! [`ResponseStatus`] or only the raw response body. [`ClientError`] tries
//! the typed DTO first and falls back to parsing the body as JSON. Keys are
//! matched case-insensitively, so `ResponseStatus`, `responseStatus` and
//! `response_status` style payloads from different serializers all work.
//! Parse failures never raise; they leave the fields empty.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

/// Structured error block returned by a service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_type_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_contents: Option<String>,
}

impl ResponseStatus {
    /// Extracts the nested status block from a JSON response body.
    ///
    /// Returns `None` when the body is not JSON, is not an object, or has no
    /// status block.
    #[must_use]
    pub fn from_json_body(body: &str) -> Option<Self> {
        let value: Value = serde_json::from_str(body).ok()?;
        let root = value.as_object()?;
        let status = get_ignore_case(root, "ResponseStatus")?.as_object()?;
        Some(Self::from_object(status))
    }

    fn from_object(obj: &Map<String, Value>) -> Self {
        Self {
            error_code: field_text(obj, "ErrorCode"),
            message: field_text(obj, "Message"),
            stack_trace: field_text(obj, "StackTrace"),
            request_type_name: field_text(obj, "RequestTypeName"),
            request_contents: field_text(obj, "RequestContents"),
        }
    }

    /// Returns true when no field is populated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// Capability of typed error DTOs that carry a status block.
pub trait HasResponseStatus: Send + Sync {
    fn response_status(&self) -> Option<&ResponseStatus>;
}

/// Looks up `key` in `obj`, ignoring ASCII case and underscores.
///
/// An exact match wins over a case-insensitive one.
#[must_use]
pub fn get_ignore_case<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    if let Some(v) = obj.get(key) {
        return Some(v);
    }
    let wanted = normalize_key(key);
    obj.iter()
        .find(|(k, _)| normalize_key(k) == wanted)
        .map(|(_, v)| v)
}

fn normalize_key(key: &str) -> String {
    key.chars()
        .filter(|c| *c != '_')
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

fn field_text(obj: &Map<String, Value>, key: &str) -> Option<String> {
    match get_ignore_case(obj, key)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Error raised on the client side for a failed service call.
pub struct ClientError {
    status_code: u16,
    status_description: String,
    response_body: Option<String>,
    dto: Option<Box<dyn HasResponseStatus>>,
    status: ResponseStatus,
}

impl ClientError {
    /// Builds an error from the raw response only.
    #[must_use]
    pub fn new(
        status_code: u16,
        status_description: impl Into<String>,
        response_body: Option<String>,
    ) -> Self {
        let status = match response_body.as_deref().map(ResponseStatus::from_json_body) {
            Some(Some(status)) => status,
            Some(None) => {
                debug!(status_code, "error body carries no response status");
                ResponseStatus::default()
            }
            None => ResponseStatus::default(),
        };
        Self {
            status_code,
            status_description: status_description.into(),
            response_body,
            dto: None,
            status,
        }
    }

    /// Attaches the typed error DTO. Its status block takes precedence over
    /// the one parsed from the raw body.
    #[must_use]
    pub fn with_dto(mut self, dto: impl HasResponseStatus + 'static) -> Self {
        if let Some(status) = dto.response_status() {
            self.status = status.clone();
        }
        self.dto = Some(Box::new(dto));
        self
    }

    #[must_use]
    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    #[must_use]
    pub fn status_description(&self) -> &str {
        &self.status_description
    }

    #[must_use]
    pub fn response_body(&self) -> Option<&str> {
        self.response_body.as_deref()
    }

    /// The typed error DTO, when one was received.
    #[must_use]
    pub fn dto(&self) -> Option<&dyn HasResponseStatus> {
        self.dto.as_deref()
    }

    #[must_use]
    pub fn response_status(&self) -> &ResponseStatus {
        &self.status
    }

    #[must_use]
    pub fn error_code(&self) -> Option<&str> {
        self.status.error_code.as_deref()
    }

    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        self.status.message.as_deref()
    }

    #[must_use]
    pub fn server_stack_trace(&self) -> Option<&str> {
        self.status.stack_trace.as_deref()
    }

    #[must_use]
    pub fn request_type_name(&self) -> Option<&str> {
        self.status.request_type_name.as_deref()
    }

    #[must_use]
    pub fn request_contents(&self) -> Option<&str> {
        self.status.request_contents.as_deref()
    }
}

impl fmt::Debug for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientError")
            .field("status_code", &self.status_code)
            .field("status_description", &self.status_description)
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.status_code, self.status_description)?;
        match (self.error_code(), self.error_message()) {
            (Some(code), Some(msg)) => write!(f, ": {code}: {msg}"),
            (Some(code), None) => write!(f, ": {code}"),
            (None, Some(msg)) => write!(f, ": {msg}"),
            (None, None) => Ok(()),
        }
    }
}

impl std::error::Error for ClientError {}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    struct ErrorDto {
        status: Option<ResponseStatus>,
    }

    impl HasResponseStatus for ErrorDto {
        fn response_status(&self) -> Option<&ResponseStatus> {
            self.status.as_ref()
        }
    }

    #[test]
    fn typed_dto_status_is_used() {
        let dto = ErrorDto {
            status: Some(ResponseStatus {
                error_code: Some("E1".to_string()),
                message: Some("bad".to_string()),
                ..ResponseStatus::default()
            }),
        };
        let err = ClientError::new(400, "Bad Request", None).with_dto(dto);
        assert_eq!(err.error_code(), Some("E1"));
        assert_eq!(err.error_message(), Some("bad"));
        assert_eq!(err.server_stack_trace(), None);
        assert!(err.dto().is_some());
        assert_eq!(err.to_string(), "400 Bad Request: E1: bad");
    }

    #[test]
    fn typed_dto_wins_over_raw_body() {
        let body = r#"{"responseStatus":{"errorCode":"RAW"}}"#.to_string();
        let dto = ErrorDto {
            status: Some(ResponseStatus {
                error_code: Some("TYPED".to_string()),
                ..ResponseStatus::default()
            }),
        };
        let err = ClientError::new(500, "Internal Server Error", Some(body)).with_dto(dto);
        assert_eq!(err.error_code(), Some("TYPED"));
    }

    #[test]
    fn dto_without_status_falls_back_to_raw_body() {
        let body = r#"{"ResponseStatus":{"ErrorCode":"RAW","Message":"from body"}}"#.to_string();
        let err = ClientError::new(500, "Internal Server Error", Some(body))
            .with_dto(ErrorDto { status: None });
        assert_eq!(err.error_code(), Some("RAW"));
        assert_eq!(err.error_message(), Some("from body"));
    }

    #[test]
    fn raw_body_keys_match_any_case() {
        let body = r#"{
            "RESPONSESTATUS": {
                "errorcode": "NotFound",
                "MESSAGE": "no such user",
                "stack_trace": "at handler",
                "RequestTypeName": "GetUser",
                "requestContents": {"id": 7}
            }
        }"#;
        let err = ClientError::new(404, "Not Found", Some(body.to_string()));
        assert_eq!(err.error_code(), Some("NotFound"));
        assert_eq!(err.error_message(), Some("no such user"));
        assert_eq!(err.server_stack_trace(), Some("at handler"));
        assert_eq!(err.request_type_name(), Some("GetUser"));
        assert_eq!(err.request_contents(), Some(r#"{"id":7}"#));
    }

    #[test]
    fn missing_status_block_yields_empty_fields() {
        let err = ClientError::new(500, "Internal Server Error", Some("{}".to_string()));
        assert!(err.response_status().is_empty());
        assert_eq!(err.error_code(), None);
        assert_eq!(err.error_message(), None);
        assert_eq!(err.to_string(), "500 Internal Server Error");
    }

    #[test]
    fn malformed_body_yields_empty_fields() {
        for body in ["not json", "[1,2]", r#"{"responseStatus": "oops"}"#, ""] {
            let err = ClientError::new(502, "Bad Gateway", Some(body.to_string()));
            assert!(err.response_status().is_empty(), "body: {body}");
        }
    }

    #[test]
    fn null_fields_are_absent() {
        let status =
            ResponseStatus::from_json_body(r#"{"responseStatus":{"errorCode":null,"message":"m"}}"#)
                .unwrap();
        assert_eq!(status.error_code, None);
        assert_eq!(status.message.as_deref(), Some("m"));
    }

    #[test]
    fn exact_key_wins_over_case_insensitive_match() {
        let value: Value = serde_json::from_str(r#"{"message":"lower","Message":"exact"}"#).unwrap();
        let obj = value.as_object().unwrap();
        assert_eq!(get_ignore_case(obj, "Message").unwrap(), "exact");
    }

    proptest! {
        /// Any ASCII casing of the field names resolves to the same value.
        #[test]
        fn status_lookup_ignores_case(mask in proptest::collection::vec(any::<bool>(), 24)) {
            let recase = |s: &str| -> String {
                s.chars()
                    .zip(mask.iter().cycle())
                    .map(|(c, upper)| if *upper { c.to_ascii_uppercase() } else { c.to_ascii_lowercase() })
                    .collect()
            };
            let body = format!(
                r#"{{"{}":{{"{}":"E42"}}}}"#,
                recase("responseStatus"),
                recase("errorCode"),
            );
            let status = ResponseStatus::from_json_body(&body);
            prop_assert_eq!(status.and_then(|s| s.error_code), Some("E42".to_string()));
        }
    }
}
