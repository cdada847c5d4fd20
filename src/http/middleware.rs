//! Admission middleware.
//!
//! The orchestrator endpoint: runs the stage pipeline, short-circuits on the
//! first deny, invokes the downstream handler exactly once on full pass, and
//! emits exactly one audit record per request once the response exists.

use std::net::{IpAddr, SocketAddr};
use std::time::Instant;

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, Request};
use axum::middleware::Next;
use axum::response::Response;

use crate::defense::{AdmissionContext, Decision};
use crate::guard::GuardHandle;
use crate::http::response::deny_response;
use crate::observability::metrics;

/// Downstream handlers attach this response extension to identify the user
/// in the audit record.
#[derive(Debug, Clone)]
pub struct AuditIdentity(pub String);

/// Resolve the client address, honoring `x-forwarded-for` only when the
/// deployment says the proxy in front is trusted.
fn client_ip(headers: &HeaderMap, peer: SocketAddr, trust_proxy_header: bool) -> IpAddr {
    if trust_proxy_header {
        if let Some(forwarded) = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .and_then(|v| v.trim().parse::<IpAddr>().ok())
        {
            return forwarded;
        }
    }
    peer.ip()
}

/// Session identity: `x-session-id` header first, then a `sid` cookie value.
fn session_id(headers: &HeaderMap) -> Option<String> {
    if let Some(sid) = headers.get("x-session-id").and_then(|v| v.to_str().ok()) {
        if !sid.is_empty() {
            return Some(sid.to_string());
        }
    }
    headers
        .get(axum::http::header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(|cookies| {
            cookies.split(';').find_map(|pair| {
                let (name, value) = pair.trim().split_once('=')?;
                (name == "sid" && !value.is_empty()).then(|| value.to_string())
            })
        })
}

/// Run every admission stage and either answer with a deny or hand the
/// request to the downstream handler.
pub async fn guard_middleware(
    State(handle): State<GuardHandle>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let guard = handle.load();
    if !guard.enabled() {
        return next.run(request).await;
    }

    let start = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let headers = request.headers();

    let ip = client_ip(headers, peer, guard.config().trust_proxy_header);
    let user_agent = headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let header_user_id = headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let ctx = AdmissionContext {
        client_ip: ip,
        method: method.clone(),
        path: path.clone(),
        user_agent,
        session_id: session_id(headers),
        events: guard.events().clone(),
    };

    let verdict = guard.pipeline().evaluate(&ctx).await;

    let mut response = match verdict.decision {
        Decision::Deny(denial) => {
            match guard.rate_limit_handler() {
                // deployment-supplied 429 body, rate-limit denials only
                Some(handler) if denial.code == Some("RATE_LIMITED") => handler(&denial),
                _ => deny_response(&denial),
            }
        }
        // every stage allowed: the continuation runs exactly once, here
        Decision::Allow => next.run(request).await,
    };

    response.headers_mut().extend(verdict.headers);
    guard.security_headers().apply(response.headers_mut());

    // the record reflects the finished response, wherever its status came from
    let status = response.status().as_u16();
    let user_id = response
        .extensions()
        .get::<AuditIdentity>()
        .map(|identity| identity.0.clone())
        .or(header_user_id);
    let duration_ms = start.elapsed().as_millis() as u64;

    guard
        .auditor()
        .emit(method.as_str(), &path, ip, status, duration_ms, user_id, None);
    metrics::record_request(method.as_str(), status, start);

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_ip_prefers_forwarded_when_trusted() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "9.9.9.9, 10.0.0.1".parse().unwrap());
        let peer: SocketAddr = "127.0.0.1:5000".parse().unwrap();

        assert_eq!(
            client_ip(&headers, peer, true),
            "9.9.9.9".parse::<IpAddr>().unwrap()
        );
        assert_eq!(
            client_ip(&headers, peer, false),
            "127.0.0.1".parse::<IpAddr>().unwrap()
        );
    }

    #[test]
    fn test_client_ip_falls_back_on_garbage_header() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "not-an-ip".parse().unwrap());
        let peer: SocketAddr = "127.0.0.1:5000".parse().unwrap();
        assert_eq!(
            client_ip(&headers, peer, true),
            "127.0.0.1".parse::<IpAddr>().unwrap()
        );
    }

    #[test]
    fn test_session_id_header_wins_over_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert("x-session-id", "from-header".parse().unwrap());
        headers.insert(
            axum::http::header::COOKIE,
            "theme=dark; sid=from-cookie".parse().unwrap(),
        );
        assert_eq!(session_id(&headers).as_deref(), Some("from-header"));
    }

    #[test]
    fn test_session_id_from_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::COOKIE,
            "theme=dark; sid=abc123".parse().unwrap(),
        );
        assert_eq!(session_id(&headers).as_deref(), Some("abc123"));
    }

    #[test]
    fn test_session_id_absent() {
        let headers = HeaderMap::new();
        assert_eq!(session_id(&headers), None);
    }
}
