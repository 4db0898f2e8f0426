//! Authentication endpoints.
//!
//! Endpoints:
//! - POST /auth/token - mint a session token from the login password
//! - GET  /auth/time  - server wall clock for client drift correction

use axum::{
    body::Bytes,
    extract::{ConnectInfo, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

use crate::api::error::ApiError;
use crate::crypto::{self, TokenData};
use crate::state::AppState;
use crate::store::orchestrators;
use crate::util::unix_now;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/token", post(post_token))
        .route("/time", get(get_time))
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    /// Orchestrator name.
    username: String,

    /// `SHA-256(username || authentication_password)` in hex.
    password: String,
}

#[derive(Debug, Serialize)]
struct TokenResponse {
    access_token: String,
    token_type: &'static str,
}

#[derive(Debug, Serialize)]
struct TimeResponse {
    time: f64,
}

async fn post_token(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let login: LoginRequest = serde_json::from_slice(&body)
        .map_err(|_| ApiError::bad_input("bad_input", "Invalid login request body"))?;
    let client_ip = addr.ip().to_string();

    let outcome = mint_token(&state, &login, &client_ip).await;
    let status = match &outcome {
        Ok(_) => 200,
        Err(e) => e.status.as_u16(),
    };
    state.accounting().record(
        &login.username,
        "POST",
        "/auth/token",
        status,
        "",
        &format!("ip={client_ip}"),
    );

    let access_token = outcome?;
    Ok(Json(TokenResponse {
        access_token,
        token_type: "bearer",
    }))
}

async fn mint_token(
    state: &AppState,
    login: &LoginRequest,
    client_ip: &str,
) -> Result<String, ApiError> {
    let expected_password = state.config().require("authentication", "password")?;
    let expected_hash = crypto::sha256_hex(&format!("{}{}", login.username, expected_password));
    if expected_hash != login.password {
        return Err(ApiError::unauthenticated("Wrong login information."));
    }

    orchestrators::upsert(state.store().pool(), &login.username, unix_now()).await?;

    let token_validity = state.config().int("authentication", "token_validity_int")?;
    let data = TokenData {
        orchestrator_name: login.username.clone(),
        orchestrator_ip: client_ip.to_string(),
        expiration: unix_now() as i64 + token_validity,
    };
    Ok(crypto::sign_token(&data, state.token_key()))
}

async fn get_time() -> Json<TimeResponse> {
    Json(TimeResponse { time: unix_now() })
}
