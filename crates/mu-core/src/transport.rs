//! Transport seam
//!
//! Requests and responses are plain data so the session layer can inspect,
//! re-sign and replay them. A `Transport` only moves bytes; it never attaches
//! credentials on its own.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{UnmixError, UnmixResult};

/// HTTP method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }
}

/// Multipart field value
#[derive(Debug, Clone, PartialEq)]
pub enum FormValue {
    Text(String),
    File {
        file_name: String,
        mime: Option<String>,
        bytes: Vec<u8>,
    },
}

/// Multipart field
#[derive(Debug, Clone, PartialEq)]
pub struct FormPart {
    pub name: String,
    pub value: FormValue,
}

impl FormPart {
    pub fn text(name: &str, value: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            value: FormValue::Text(value.into()),
        }
    }

    pub fn file(name: &str, file_name: &str, mime: Option<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.to_string(),
            value: FormValue::File {
                file_name: file_name.to_string(),
                mime,
                bytes,
            },
        }
    }
}

/// Request body
#[derive(Debug, Clone, PartialEq, Default)]
pub enum RequestBody {
    #[default]
    Empty,
    Json(Value),
    Multipart(Vec<FormPart>),
}

/// Outbound request
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    /// Path relative to the API origin, starting with `/`
    pub path: String,
    pub body: RequestBody,
    /// Bearer token, set by the session layer
    pub bearer: Option<String>,
    /// Already replayed once after a refresh
    pub retried: bool,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: RequestBody::Empty,
            bearer: None,
            retried: false,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::Post, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::Patch, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path)
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = RequestBody::Json(body);
        self
    }

    pub fn multipart(mut self, parts: Vec<FormPart>) -> Self {
        self.body = RequestBody::Multipart(parts);
        self
    }
}

/// Inbound response
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ApiResponse {
    pub status: u16,
    /// Header names are lowercase
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl ApiResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn json_body(status: u16, value: &Value) -> Self {
        Self::new(status, value.to_string())
            .with_header("content-type", "application/json")
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_ascii_lowercase(), value.to_string()));
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status == 401
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn json<T: DeserializeOwned>(&self) -> UnmixResult<T> {
        serde_json::from_slice(&self.body).map_err(|e| {
            UnmixError::Serialization(format!("unexpected response body (HTTP {}): {}", self.status, e))
        })
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Parse a DRF-style error body.
    pub fn error_detail(&self) -> ErrorDetail {
        let value: Value = serde_json::from_slice(&self.body).unwrap_or(Value::Null);
        ErrorDetail::from_value(&value, self.status)
    }

    /// Success passes through, anything else becomes the matching error.
    pub fn into_result(self) -> UnmixResult<ApiResponse> {
        if self.is_success() {
            return Ok(self);
        }
        let detail = self.error_detail();
        Err(UnmixError::from_status(self.status, detail.general, detail.field_errors))
    }
}

/// Error message pulled from a response body
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ErrorDetail {
    pub general: String,
    pub field_errors: BTreeMap<String, String>,
}

impl ErrorDetail {
    /// `detail` and `non_field_errors` feed the general message; every other
    /// key becomes a field error. Lists are joined with spaces.
    pub fn from_value(value: &Value, status: u16) -> Self {
        let mut general = String::new();
        let mut field_errors = BTreeMap::new();

        if let Value::Object(map) = value {
            for (key, v) in map {
                let text = match v {
                    Value::String(s) => s.clone(),
                    Value::Array(items) => items
                        .iter()
                        .filter_map(|item| item.as_str())
                        .collect::<Vec<_>>()
                        .join(" "),
                    _ => continue,
                };
                if text.is_empty() {
                    continue;
                }
                if key == "detail" || key == "non_field_errors" {
                    general = text;
                } else {
                    field_errors.insert(key.clone(), text);
                }
            }
        }

        if general.is_empty() {
            general = field_errors
                .values()
                .next()
                .cloned()
                .unwrap_or_else(|| format!("request failed with HTTP {status}"));
        }

        Self {
            general,
            field_errors,
        }
    }
}

/// Moves a request to the backend and returns whatever it answered.
///
/// Non-2xx answers are `Ok`; only failures to get an answer at all
/// (connect, timeout, body read) are errors, reported as `Transient`.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &ApiRequest) -> UnmixResult<ApiResponse>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_error_detail_general_and_fields() {
        let resp = ApiResponse::json_body(
            400,
            &json!({"email": ["Enter a valid email."], "non_field_errors": ["Bad input."]}),
        );
        let detail = resp.error_detail();
        assert_eq!(detail.general, "Bad input.");
        assert_eq!(detail.field_errors["email"], "Enter a valid email.");
    }

    #[test]
    fn test_error_detail_falls_back() {
        let detail = ApiResponse::new(502, "<html>bad gateway</html>").error_detail();
        assert_eq!(detail.general, "request failed with HTTP 502");

        let only_fields =
            ApiResponse::json_body(400, &json!({"password": "Too short."})).error_detail();
        assert_eq!(only_fields.general, "Too short.");
    }

    #[test]
    fn test_into_result_maps_status() {
        let unauthorized = ApiResponse::json_body(401, &json!({"detail": "Token expired"}));
        match unauthorized.into_result() {
            Err(UnmixError::Auth(reason)) => assert_eq!(reason, "Token expired"),
            other => panic!("expected auth error, got {:?}", other),
        }
        assert!(ApiResponse::new(204, Vec::new()).into_result().is_ok());
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let resp = ApiResponse::new(200, "x").with_header("Content-Disposition", "attachment");
        assert_eq!(resp.header("content-disposition"), Some("attachment"));
        assert_eq!(resp.header("CONTENT-DISPOSITION"), Some("attachment"));
    }

    #[test]
    fn test_request_builders() {
        let req = ApiRequest::post("/api/x/").json(json!({"a": 1}));
        assert_eq!(req.method, Method::Post);
        assert!(matches!(req.body, RequestBody::Json(_)));
        assert!(!req.retried);
        assert!(req.bearer.is_none());
    }
}
