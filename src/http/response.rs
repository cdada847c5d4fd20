//! Deny response construction.
//!
//! Every refusal answers with a small JSON body carrying a stable shape:
//! `{error, message, timestamp}` plus a machine-readable `code` when the
//! denial has one (session violations always do).

use axum::body::Body;
use axum::http::{header, Response, StatusCode};

use crate::defense::Denial;

/// Build the JSON response for a denial. Accumulated stage headers are
/// applied by the middleware afterwards.
pub fn deny_response(denial: &Denial) -> Response<Body> {
    let mut body = serde_json::json!({
        "error": denial.error,
        "message": denial.message,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });
    if let Some(code) = denial.code {
        body["code"] = serde_json::Value::String(code.to_string());
    }

    let serialized = body.to_string();

    Response::builder()
        .status(denial.status)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serialized))
        .unwrap_or_else(|_| {
            let mut fallback = Response::new(Body::from("Forbidden"));
            *fallback.status_mut() = StatusCode::FORBIDDEN;
            fallback
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::SecurityEvent;

    #[test]
    fn test_deny_response_shape() {
        let denial = Denial {
            status: StatusCode::FORBIDDEN,
            error: "Forbidden".to_string(),
            code: Some("SESSION_HIJACK"),
            message: "Session fingerprint mismatch, session terminated".to_string(),
            event: Some(SecurityEvent::IpBlocked {
                ip: "1.2.3.4".to_string(),
            }),
        };
        let response = deny_response(&denial);
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(response.headers()["content-type"], "application/json");
    }

    #[test]
    fn test_code_omitted_when_absent() {
        let denial = Denial {
            status: StatusCode::TOO_MANY_REQUESTS,
            error: "Too Many Requests".to_string(),
            code: None,
            message: "Rate limit exceeded, try again later".to_string(),
            event: None,
        };
        let response = deny_response(&denial);
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }
}
