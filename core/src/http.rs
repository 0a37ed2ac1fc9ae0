//! HTTP request and response described as plain data.
//!
//! # Design
//! The client builds an `HttpRequest`, hands it to a `Transport`, and
//! classifies the `HttpResponse` it gets back. Timeout and headers live on
//! the request itself, so nothing about a call depends on process-wide state.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ApiError;

pub const CONTENT_TYPE: &str = "content-type";
pub const AUTH_TOKEN_HEADER: &str = "X-Auth-Token";

/// HTTP verbs the API uses. Anything else is rejected before I/O.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }

    /// DELETE is the only verb sent without a JSON body.
    pub fn sends_body(self) -> bool {
        !matches!(self, HttpMethod::Delete)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "PATCH" => Ok(HttpMethod::Patch),
            "DELETE" => Ok(HttpMethod::Delete),
            other => Err(ApiError::Validation(format!("Unsupported method {other}"))),
        }
    }
}

/// An HTTP request described as plain data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
    pub timeout: Duration,
}

impl HttpRequest {
    /// First value of a header, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// An HTTP response described as plain data. Error statuses are data too.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_supported_verbs() {
        for verb in ["GET", "POST", "PUT", "PATCH", "DELETE"] {
            let method: HttpMethod = verb.parse().unwrap();
            assert_eq!(method.as_str(), verb);
        }
    }

    #[test]
    fn rejects_unsupported_verb_by_name() {
        let err = "TRACE".parse::<HttpMethod>().unwrap_err();
        assert!(err.is_validation());
        assert_eq!(err.to_string(), "Unsupported method TRACE");
    }

    #[test]
    fn verb_names_are_case_sensitive() {
        assert!("get".parse::<HttpMethod>().is_err());
    }

    #[test]
    fn header_lookup_ignores_case() {
        let req = HttpRequest {
            method: HttpMethod::Get,
            url: "http://localhost/servers".to_string(),
            headers: vec![(AUTH_TOKEN_HEADER.to_string(), "abc".to_string())],
            body: None,
            timeout: Duration::from_secs(60),
        };
        assert_eq!(req.header("x-auth-token"), Some("abc"));
        assert_eq!(req.header(CONTENT_TYPE), None);
    }
}
