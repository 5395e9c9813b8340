//! Caller-IP extraction for quota keys and session ownership.
//!
//! DESIGN
//! ======
//! The portfolio site runs behind a reverse proxy, so `X-Forwarded-For`
//! (first hop) is authoritative when present; `X-Real-Ip` and the socket
//! peer address are fallbacks. Extraction never fails — an unidentifiable
//! caller shares the `"unknown"` quota bucket instead of erroring.

use std::convert::Infallible;
use std::net::SocketAddr;

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::request::Parts;

/// The caller's IP as a quota/ownership key.
#[derive(Debug, Clone)]
pub struct ClientIp(pub String);

fn header_ip(parts: &Parts, name: &str) -> Option<String> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
}

pub(crate) fn client_ip(parts: &Parts) -> String {
    if let Some(ip) = header_ip(parts, "x-forwarded-for") {
        return ip;
    }
    if let Some(ip) = header_ip(parts, "x-real-ip") {
        return ip;
    }
    if let Some(ConnectInfo(addr)) = parts.extensions.get::<ConnectInfo<SocketAddr>>() {
        return addr.ip().to_string();
    }
    "unknown".to_string()
}

impl<S> FromRequestParts<S> for ClientIp
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(client_ip(parts)))
    }
}

#[cfg(test)]
#[path = "client_ip_test.rs"]
mod tests;
