use crate::{
    error::AppError,
    models::{UNKNOWN_CLIENT_ADDRESS, UNKNOWN_USER_AGENT},
    registry::Visitor,
    AppState,
};
use async_trait::async_trait;
use axum::{
    extract::{ConnectInfo, FromRef, FromRequestParts, Path, State},
    http::{header::USER_AGENT, request::Parts, HeaderMap},
    response::Redirect,
};
use std::{convert::Infallible, net::SocketAddr, sync::Arc};

/// GET /:code
///
/// Resolve the short id, record the visit, and redirect to the original URL.
/// Unknown ids are 404; expired ids are purged and answered with 410.
pub async fn redirect(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
    visitor: Visitor,
) -> Result<Redirect, AppError> {
    let original_url = state.registry.resolve(&code, visitor)?;
    Ok(Redirect::temporary(&original_url))
}

// ── Visitor extractor ──────────────────────────────────────────────────────

/// Collects the client address and user agent for the visit log. Never
/// rejects: whatever the transport did not supply is recorded as "unknown".
#[async_trait]
impl<S> FromRequestParts<S> for Visitor
where
    S: Send + Sync,
    Arc<AppState>: FromRef<S>,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = Arc::<AppState>::from_ref(state);

        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);

        let client_address = extract_ip(&parts.headers, peer, state.config.trust_proxy_headers)
            .unwrap_or_else(|| UNKNOWN_CLIENT_ADDRESS.to_owned());

        let user_agent = parts
            .headers
            .get(USER_AGENT)
            .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
            .unwrap_or_else(|| UNKNOWN_USER_AGENT.to_owned());

        Ok(Visitor {
            client_address,
            user_agent,
        })
    }
}

// ── Helpers ────────────────────────────────────────────────────────────────

/// Determine the client IP. Proxy headers are only consulted when the
/// deployment says they can be trusted; otherwise the peer address wins.
fn extract_ip(headers: &HeaderMap, peer: Option<SocketAddr>, trust_proxy: bool) -> Option<String> {
    if trust_proxy {
        // X-Forwarded-For can be a comma-separated list; take the first entry.
        if let Some(xff) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
            if let Some(ip) = xff.split(',').next().map(str::trim) {
                if !ip.is_empty() {
                    return Some(ip.to_owned());
                }
            }
        }

        if let Some(real_ip) = headers.get("x-real-ip").and_then(|v| v.to_str().ok()) {
            if !real_ip.is_empty() {
                return Some(real_ip.to_owned());
            }
        }
    }

    peer.map(|addr| addr.ip().to_string())
}
