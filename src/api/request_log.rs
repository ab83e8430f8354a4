//! Structured before/after request logging, extending the reference
//! exporter's span-only `TraceLayer::make_span_with` with full body capture
//! and redaction, per the audit requirement.

use axum::{
    body::{Body, Bytes},
    extract::Request,
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use std::time::Instant;
use tracing::info;

const REDACTED: &str = "<redacted>";
const SENSITIVE_HEADERS: &[&str] = &["authorization", "cookie"];
const SENSITIVE_BODY_KEYS: &[&str] = &["password", "dsn"];

fn filtered_headers(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            let name = name.as_str().to_string();
            let value = if SENSITIVE_HEADERS.contains(&name.to_ascii_lowercase().as_str()) {
                REDACTED.to_string()
            } else {
                value.to_str().unwrap_or("<binary>").to_string()
            };
            (name, value)
        })
        .collect()
}

fn redact_body(bytes: &[u8]) -> String {
    let Ok(mut value) = serde_json::from_slice::<serde_json::Value>(bytes) else {
        return String::from("<non-json body>");
    };
    if let serde_json::Value::Object(map) = &mut value {
        for key in SENSITIVE_BODY_KEYS {
            if map.contains_key(*key) {
                map.insert((*key).to_string(), serde_json::Value::String(REDACTED.to_string()));
            }
        }
    }
    value.to_string()
}

/// `axum::middleware::from_fn` layer. Emits one `tracing::info!` record on
/// arrival and one on completion; never awaits I/O beyond the inner service.
pub async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let client_ip = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();
    let user_agent = request
        .headers()
        .get("user-agent")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();
    let headers = filtered_headers(request.headers());

    let capture_body = matches!(method.as_str(), "POST" | "DELETE");
    let (parts, body) = request.into_parts();
    let body_bytes = if capture_body {
        axum::body::to_bytes(body, usize::MAX).await.unwrap_or_default()
    } else {
        Bytes::new()
    };

    info!(
        method = %method,
        path,
        client_ip,
        user_agent,
        ?headers,
        body = %if capture_body { redact_body(&body_bytes) } else { String::new() },
        "request received"
    );

    let request = Request::from_parts(parts, Body::from(body_bytes));
    let started_at = Instant::now();
    let response = next.run(request).await;
    let elapsed_ms = started_at.elapsed().as_millis();
    let status = response.status();

    if status.is_success() {
        let (parts, body) = response.into_parts();
        let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap_or_default();
        info!(
            status = status.as_u16(),
            elapsed_ms,
            path,
            body = %String::from_utf8_lossy(&bytes),
            "request completed"
        );
        Response::from_parts(parts, Body::from(bytes))
    } else {
        info!(status = status.as_u16(), elapsed_ms, path, "request completed");
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacts_password_field_in_body() {
        let body = br#"{"name":"node1","password":"hunter2"}"#;
        let redacted = redact_body(body);
        assert!(redacted.contains("<redacted>"));
        assert!(!redacted.contains("hunter2"));
    }

    #[test]
    fn non_json_body_is_reported_without_panicking() {
        let redacted = redact_body(b"not json");
        assert_eq!(redacted, "<non-json body>");
    }

    #[test]
    fn filters_authorization_header() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", "Bearer secret".parse().unwrap());
        headers.insert("x-request-id", "abc".parse().unwrap());

        let filtered = filtered_headers(&headers);
        let auth = filtered.iter().find(|(k, _)| k == "authorization").unwrap();
        assert_eq!(auth.1, "<redacted>");
        let reqid = filtered.iter().find(|(k, _)| k == "x-request-id").unwrap();
        assert_eq!(reqid.1, "abc");
    }
}
