//! Error types for the slyd API client.
//!
//! # Design
//! Every failed round-trip, whether the server answered with a non-2xx
//! status or the request never completed, lands in a single `HttpError`
//! that remembers the request it belongs to. `title()` and `message()`
//! render the two halves a UI shows to the user; `reason()` is there for
//! programmatic inspection.

use thiserror::Error;

use crate::codec::CodecError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};

/// Errors returned by `SlydClient` and `SlydApi`.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request failed at the HTTP level.
    #[error("{}\n{}", .0.title(), .0.message())]
    Http(HttpError),

    /// The response body could not be deserialized into the expected type.
    #[error("deserialization failed: {0}")]
    Deserialization(String),

    /// The request payload could not be serialized to JSON.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// A named collection could not be converted between list and map form.
    #[error(transparent)]
    Codec(#[from] CodecError),
}

impl ApiError {
    /// The wrapped `HttpError`, if this is an HTTP failure.
    pub fn as_http(&self) -> Option<&HttpError> {
        match self {
            ApiError::Http(err) => Some(err),
            _ => None,
        }
    }
}

/// Why an HTTP exchange failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// The server answered with a non-2xx status.
    Status(u16),
    /// The request never produced a response.
    Transport(String),
}

/// A failed HTTP exchange together with the request that caused it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpError {
    pub method: HttpMethod,
    pub url: String,
    pub request_body: Option<String>,
    pub status: Option<u16>,
    pub status_text: String,
    pub detail: String,
    pub response_body: String,
}

impl HttpError {
    pub fn from_response(request: &HttpRequest, response: &HttpResponse) -> Self {
        let reason = ureq::http::StatusCode::from_u16(response.status)
            .ok()
            .and_then(|code| code.canonical_reason())
            .unwrap_or("")
            .to_string();
        Self {
            method: request.method,
            url: request.path.clone(),
            request_body: request.body.clone(),
            status: Some(response.status),
            status_text: "error".to_string(),
            detail: reason,
            response_body: response.body.clone(),
        }
    }

    pub fn from_transport(request: &HttpRequest, err: &TransportError) -> Self {
        Self {
            method: request.method,
            url: request.path.clone(),
            request_body: request.body.clone(),
            status: None,
            status_text: "error".to_string(),
            detail: err.to_string(),
            response_body: String::new(),
        }
    }

    pub fn title(&self) -> String {
        let mut title = format!("Error processing {} to {}", self.method, self.url);
        if let Some(body) = &self.request_body {
            title.push_str("\nwith data ");
            title.push_str(body);
        }
        title
    }

    pub fn message(&self) -> String {
        format!(
            "The server returned {}({})\n{}",
            self.status_text, self.detail, self.response_body
        )
    }

    pub fn reason(&self) -> FailureReason {
        match self.status {
            Some(status) => FailureReason::Status(status),
            None => FailureReason::Transport(self.detail.clone()),
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status == Some(404)
    }
}

/// The transport could not complete the request.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("transport failed: {0}")]
pub struct TransportError(pub String);

#[cfg(test)]
mod tests {
    use super::*;

    fn post() -> HttpRequest {
        HttpRequest::post_json(
            "http://localhost:9001/projects".to_string(),
            r#"{"cmd":"rm","args":["p"]}"#.to_string(),
        )
    }

    #[test]
    fn title_includes_request_body() {
        let response = HttpResponse {
            status: 500,
            headers: Vec::new(),
            body: "boom".to_string(),
        };
        let err = HttpError::from_response(&post(), &response);
        assert_eq!(
            err.title(),
            "Error processing POST to http://localhost:9001/projects\nwith data {\"cmd\":\"rm\",\"args\":[\"p\"]}"
        );
        assert_eq!(
            err.message(),
            "The server returned error(Internal Server Error)\nboom"
        );
        assert_eq!(err.reason(), FailureReason::Status(500));
    }

    #[test]
    fn title_omits_missing_body() {
        let request = HttpRequest::get("http://localhost:9001/projects".to_string());
        let err = HttpError::from_transport(&request, &TransportError("connection refused".to_string()));
        assert_eq!(err.title(), "Error processing GET to http://localhost:9001/projects");
        assert!(err.message().contains("connection refused"));
        assert!(matches!(err.reason(), FailureReason::Transport(_)));
        assert!(!err.is_not_found());
    }
}
