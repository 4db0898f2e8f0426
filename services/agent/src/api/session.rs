//! Session-token authentication.
//!
//! Orchestrators obtain a signed token from `POST /auth/token` and present
//! it as a `Bearer` header. Validation checks the signature, the
//! expiration, and that the request comes from the IP the token was bound
//! to at mint time.

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::{header, request::Parts, Extensions, HeaderMap};
use std::net::SocketAddr;

use crate::api::error::ApiError;
use crate::crypto::{self, TokenData};
use crate::state::AppState;
use crate::util::unix_now;

/// A validated session token's claims.
#[derive(Debug, Clone)]
pub struct SessionToken(pub TokenData);

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
}

/// Client address as recorded by the listener.
pub fn client_ip(extensions: &Extensions) -> Option<String> {
    extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip().to_string())
}

/// Validate the `Authorization` header of a request.
pub fn validate(
    state: &AppState,
    headers: &HeaderMap,
    extensions: &Extensions,
) -> Result<TokenData, ApiError> {
    let Some(token) = bearer_token(headers) else {
        return Err(ApiError::unauthenticated("Missing authentication token."));
    };

    let Some(data) = crypto::verify_token(token, state.token_key()) else {
        return Err(ApiError::unauthenticated("Could not get data from the token."));
    };

    if (data.expiration as f64) < unix_now() {
        return Err(ApiError::unauthenticated("The token has expired."));
    }

    match client_ip(extensions) {
        Some(ip) if ip == data.orchestrator_ip => Ok(data),
        _ => Err(ApiError::unauthenticated(
            "The token was assigned to a different IP.",
        )),
    }
}

impl FromRequestParts<AppState> for SessionToken {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        validate(state, &parts.headers, &parts.extensions).map(SessionToken)
    }
}
