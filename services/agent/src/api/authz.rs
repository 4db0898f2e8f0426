//! Per-request HMAC authorization.
//!
//! Every protected request carries three headers: `authorization-time`,
//! `authorization-nonce`, and `authorization-hmac`, where the hmac is
//! `SHA-256(method || path || query || canonical_body || time || nonce ||
//! secret)` in hex. Verification order is fixed: time window, nonce
//! single-use, then the hmac against the endpoint's keys (the per-test key
//! first when the endpoint has one, then the root key).

use axum::extract::{FromRequestParts, OriginalUri};
use axum::http::request::Parts;

use crate::api::error::ApiError;
use crate::crypto::sha256_hex;
use crate::state::AppState;
use crate::store::nonces;
use crate::util::unix_now;

const TIME_HEADER: &str = "authorization-time";
const NONCE_HEADER: &str = "authorization-nonce";
const HMAC_HEADER: &str = "authorization-hmac";

/// Literal hmac value accepted when `authorization.dev_bypass_bool` is on.
const DEV_BYPASS_HMAC: &str = "xdev";

/// Everything of a request that feeds the hmac, captured before the body
/// is consumed.
#[derive(Debug, Clone)]
pub struct HmacEnvelope {
    pub method: String,
    pub path: String,
    pub query: String,
    pub time: Option<String>,
    pub nonce: String,
    pub hmac: Option<String>,
}

fn header_string(parts: &Parts, name: &str) -> Option<String> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

impl<S> FromRequestParts<S> for HmacEnvelope
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        // Inside nested routers `parts.uri` has the prefix stripped; the
        // hmac covers the path as the client sent it.
        let uri = parts
            .extensions
            .get::<OriginalUri>()
            .map(|original| original.0.clone())
            .unwrap_or_else(|| parts.uri.clone());
        Ok(Self {
            method: parts.method.to_string(),
            path: uri.path().to_string(),
            query: uri.query().unwrap_or("").to_string(),
            time: header_string(parts, TIME_HEADER),
            nonce: header_string(parts, NONCE_HEADER).unwrap_or_default(),
            hmac: header_string(parts, HMAC_HEADER),
        })
    }
}

/// Serialize a JSON value with all object keys sorted recursively.
///
/// This is the canonical body: deterministic for identical logical
/// requests no matter how the client ordered its keys.
pub fn canonical_json(value: &serde_json::Value) -> String {
    fn write(value: &serde_json::Value, out: &mut String) {
        match value {
            serde_json::Value::Object(map) => {
                out.push('{');
                let mut keys: Vec<&String> = map.keys().collect();
                keys.sort();
                for (i, key) in keys.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    out.push_str(&serde_json::to_string(key).expect("string serializes"));
                    out.push(':');
                    write(&map[*key], out);
                }
                out.push('}');
            }
            serde_json::Value::Array(items) => {
                out.push('[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    write(item, out);
                }
                out.push(']');
            }
            other => out.push_str(&other.to_string()),
        }
    }

    let mut out = String::new();
    write(value, &mut out);
    out
}

/// Canonical body string of a request: empty for an empty body, otherwise
/// the key-sorted JSON rendering.
pub fn canonical_body(bytes: &[u8]) -> Result<String, ApiError> {
    if bytes.is_empty() {
        return Ok(String::new());
    }
    let value: serde_json::Value = serde_json::from_slice(bytes)
        .map_err(|_| ApiError::bad_input("bad_input", "Request body is not valid JSON"))?;
    Ok(canonical_json(&value))
}

/// Compute the authorization hmac for a request.
pub fn compute_hmac(
    method: &str,
    path: &str,
    query: &str,
    body: &str,
    time: &str,
    nonce: &str,
    secret: &str,
) -> String {
    sha256_hex(&format!("{method}{path}{query}{body}{time}{nonce}{secret}"))
}

fn verify_hmac(envelope: &HmacEnvelope, body: &str, secret: &str) -> bool {
    let expected = compute_hmac(
        &envelope.method,
        &envelope.path,
        &envelope.query,
        body,
        envelope.time.as_deref().unwrap_or(""),
        &envelope.nonce,
        secret,
    );
    envelope.hmac.as_deref() == Some(expected.as_str())
}

fn verify_request_time(state: &AppState, envelope: &HmacEnvelope) -> Result<(), ApiError> {
    let Some(time) = envelope.time.as_deref() else {
        return Err(ApiError::unauthorized(
            "Missing request time for authorization.",
        ));
    };
    let Ok(time) = time.parse::<f64>() else {
        return Err(ApiError::unauthorized(
            "Request time for authorization has wrong format.",
        ));
    };

    let validity = state
        .config()
        .int("authorization", "request_validity_int")
        .unwrap_or(60) as f64;
    let now = unix_now();
    if time > now || time + validity < now {
        let diff = now - time;
        return Err(ApiError::unauthorized(format!(
            "Wrong request time (diff {diff:.1}s)."
        )));
    }
    Ok(())
}

async fn verify_request_nonce(state: &AppState, envelope: &HmacEnvelope) -> Result<(), ApiError> {
    match nonces::create(state.store().pool(), &envelope.nonce, unix_now()).await {
        Ok(()) => Ok(()),
        Err(e) if e.is_unique_violation() => Err(ApiError::unauthorized(
            "The nonce has already been used.",
        )),
        Err(e) => Err(e.into()),
    }
}

/// Authorize a request against the endpoint's key set.
///
/// `test_key` is the per-resource key (ro/rw or a multi-result key) when
/// the endpoint has one; `root_key` always authorizes.
pub async fn authorize(
    state: &AppState,
    envelope: &HmacEnvelope,
    body: &str,
    test_key: Option<&str>,
    root_key: &str,
) -> Result<(), ApiError> {
    if envelope.hmac.as_deref() == Some(DEV_BYPASS_HMAC)
        && state
            .config()
            .boolean("authorization", "dev_bypass_bool")
            .unwrap_or(false)
    {
        tracing::warn!("Authorization skipped through the development bypass");
        return Ok(());
    }

    verify_request_time(state, envelope)?;
    verify_request_nonce(state, envelope).await?;

    if let Some(test_key) = test_key {
        if verify_hmac(envelope, body, test_key) {
            return Ok(());
        }
        tracing::warn!("The authorization token does not match the value expected by the test");
    }

    if verify_hmac(envelope, body, root_key) {
        return Ok(());
    }

    Err(ApiError::unauthorized("Wrong authorization token."))
}

/// Root authorization password from config.
pub fn root_password(state: &AppState) -> Result<String, ApiError> {
    Ok(state.config().require("authorization", "root_password")?)
}

/// Password gating test creation.
pub fn new_tests_password(state: &AppState) -> Result<String, ApiError> {
    Ok(state.config().require("authorization", "new_tests_password")?)
}
