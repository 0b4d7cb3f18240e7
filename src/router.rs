// src/router.rs

use crate::constants::AGENT_UUID_HEADER;
use crate::events::{emit_network_event, model::LogLevel};
use crate::registry::ConnectionRegistry;
use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode};
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Request, Response};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

/// Agent UUID propagated down the handler chain via request extensions.
#[derive(Debug, Clone)]
pub struct AgentUuid(pub String);

/// Pull the agent identity header out of a request. `HeaderMap` lookups are
/// case-insensitive, so the lowercase form HTTP/2 and HTTP/3 deliver matches
/// the canonical `X-Agent-UUID` too.
pub fn agent_uuid_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AGENT_UUID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

/// Entry point for every request on the agent-facing TCP protocols: runs the
/// UUID middleware, then routes.
pub async fn handle_request(
    mut req: Request<Incoming>,
    peer: SocketAddr,
    registry: Arc<ConnectionRegistry>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    if let Some(uuid) = agent_uuid_from_headers(req.headers()) {
        registry.register_uuid(&peer.to_string(), &uuid);
        req.extensions_mut().insert(AgentUuid(uuid));
    }
    let (status, body) = route(req.method(), req.uri().path());
    emit_network_event(
        "router",
        LogLevel::Debug,
        "request",
        Some(peer.to_string()),
        Some(format!("path={} status={}", req.uri().path(), status)),
    );
    Ok(text_response(status, body))
}

/// Shared route table for all five protocols.
pub fn route(method: &Method, path: &str) -> (StatusCode, &'static str) {
    match (method, path) {
        (&Method::GET, "/") => (StatusCode::OK, "pyre: alive\n"),
        _ => (StatusCode::NOT_FOUND, "not found\n"),
    }
}

fn text_response(status: StatusCode, body: &'static str) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header(http::header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .body(Full::new(Bytes::from_static(body.as_bytes())))
        .expect("static response")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_lookup_accepts_both_casings() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-agent-uuid",
            "11111111-1111-1111-1111-111111111111".parse().unwrap(),
        );
        assert_eq!(
            agent_uuid_from_headers(&headers).as_deref(),
            Some("11111111-1111-1111-1111-111111111111")
        );

        let mut headers = HeaderMap::new();
        headers.insert(AGENT_UUID_HEADER, "abc".parse().unwrap());
        assert_eq!(agent_uuid_from_headers(&headers).as_deref(), Some("abc"));
    }

    #[test]
    fn empty_header_is_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert("x-agent-uuid", "  ".parse().unwrap());
        assert!(agent_uuid_from_headers(&headers).is_none());
    }

    #[test]
    fn root_route_is_live() {
        let (status, _) = route(&Method::GET, "/");
        assert_eq!(status, StatusCode::OK);
        let (status, _) = route(&Method::GET, "/nope");
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
