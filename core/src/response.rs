//! Turning an `HttpResponse` into a JSON envelope or an `ApiError`.
//!
//! # Design
//! Classification happens in a fixed order: decode, status check, then the
//! `"id": "not_found"` anomaly some endpoints return with a 200. DELETE
//! responses are never decoded; their envelope only records the status.

use serde_json::{json, Map, Value};

use crate::error::ApiError;
use crate::http::{HttpMethod, HttpResponse};

/// The single status the service uses for success.
pub const STATUS_OK: u16 = 200;

/// Decode and classify a response, returning the whole envelope on success.
pub fn parse_envelope(method: HttpMethod, response: &HttpResponse) -> Result<Value, ApiError> {
    let envelope = if method == HttpMethod::Delete {
        json!({ "status": response.status })
    } else {
        serde_json::from_str(&response.body).map_err(ApiError::InvalidJson)?
    };

    if response.status != STATUS_OK {
        if let Some(message) = error_message(&envelope) {
            return Err(ApiError::Api(message));
        }
        if (400..600).contains(&response.status) {
            return Err(ApiError::Http {
                status: response.status,
            });
        }
    }

    if envelope.get("id").and_then(Value::as_str) == Some("not_found") {
        let message = envelope
            .get("message")
            .map(message_text)
            .unwrap_or_default();
        return Err(ApiError::Api(message));
    }

    Ok(envelope)
}

/// Take the named field out of an envelope.
pub fn extract_field(envelope: Value, field: &'static str) -> Result<Value, ApiError> {
    match envelope {
        Value::Object(mut map) => map.remove(field).ok_or(ApiError::MissingField(field)),
        _ => Err(ApiError::MissingField(field)),
    }
}

/// `error_message` wins over `message`; empty bodies carry neither.
fn error_message(envelope: &Value) -> Option<String> {
    let map: &Map<String, Value> = envelope.as_object().filter(|m| !m.is_empty())?;
    map.get("error_message")
        .or_else(|| map.get("message"))
        .map(message_text)
}

fn message_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
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
    fn ok_response_returns_whole_envelope() {
        let envelope =
            parse_envelope(HttpMethod::Get, &response(200, r#"{"servers":[]}"#)).unwrap();
        assert_eq!(envelope, json!({ "servers": [] }));
    }

    #[test]
    fn not_found_message_becomes_api_error() {
        let err = parse_envelope(HttpMethod::Get, &response(404, r#"{"message":"not found"}"#))
            .unwrap_err();
        assert!(matches!(err, ApiError::Api(ref m) if m == "not found"));
    }

    #[test]
    fn error_message_takes_precedence_over_message() {
        let body = r#"{"error_message":"Authentication error","message":"other"}"#;
        let err = parse_envelope(HttpMethod::Post, &response(401, body)).unwrap_err();
        assert_eq!(err.to_string(), "Authentication error");
    }

    #[test]
    fn error_status_without_message_is_http_error() {
        let err = parse_envelope(HttpMethod::Get, &response(500, r#"{"type":"boom"}"#)).unwrap_err();
        assert!(matches!(err, ApiError::Http { status: 500 }));
    }

    #[test]
    fn empty_object_on_error_status_is_http_error() {
        let err = parse_envelope(HttpMethod::Put, &response(403, "{}")).unwrap_err();
        assert!(matches!(err, ApiError::Http { status: 403 }));
    }

    #[test]
    fn embedded_not_found_fails_despite_ok_status() {
        let body = r#"{"id":"not_found","message":"gone"}"#;
        let err = parse_envelope(HttpMethod::Get, &response(200, body)).unwrap_err();
        assert!(matches!(err, ApiError::Api(ref m) if m == "gone"));
    }

    #[test]
    fn invalid_json_is_decode_error() {
        let err = parse_envelope(HttpMethod::Get, &response(200, "<html>oops</html>")).unwrap_err();
        assert!(err.is_decode());
        assert!(!err.is_api());
    }

    #[test]
    fn invalid_json_on_error_status_is_still_decode_error() {
        let err = parse_envelope(HttpMethod::Get, &response(502, "Bad Gateway")).unwrap_err();
        assert!(err.is_decode());
    }

    #[test]
    fn delete_ignores_body() {
        let envelope = parse_envelope(HttpMethod::Delete, &response(204, "")).unwrap();
        assert_eq!(envelope, json!({ "status": 204 }));
    }

    #[test]
    fn delete_error_status_is_http_error() {
        let err = parse_envelope(HttpMethod::Delete, &response(404, r#"{"message":"x"}"#))
            .unwrap_err();
        assert!(matches!(err, ApiError::Http { status: 404 }));
    }

    #[test]
    fn non_ok_success_status_with_message_is_api_error() {
        let err = parse_envelope(HttpMethod::Post, &response(202, r#"{"message":"queued"}"#))
            .unwrap_err();
        assert!(matches!(err, ApiError::Api(ref m) if m == "queued"));
    }

    #[test]
    fn non_ok_success_status_without_message_passes() {
        let envelope =
            parse_envelope(HttpMethod::Post, &response(201, r#"{"ip":{"id":"1"}}"#)).unwrap();
        assert_eq!(envelope["ip"]["id"], "1");
    }

    #[test]
    fn extract_field_unwraps_named_field() {
        let value = extract_field(json!({ "server": { "id": "abc" } }), "server").unwrap();
        assert_eq!(value, json!({ "id": "abc" }));
    }

    #[test]
    fn extract_field_reports_missing_field() {
        let err = extract_field(json!({ "volume": {} }), "server").unwrap_err();
        assert!(matches!(err, ApiError::MissingField("server")));
    }
}
