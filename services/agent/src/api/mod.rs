//! HTTP API: routing and middleware.

pub mod authz;
pub mod error;
pub mod logs_processing;
pub mod session;

mod auth;
mod multi_results;
mod system;

use axum::{
    body::{Body, Bytes},
    extract::{Request, State},
    http::header,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    Router,
};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;
use crate::store::orchestrators;
use crate::util::unix_now;

pub use tests::{TestCreate, TestUpdate};

/// Largest request body the accounting middleware will buffer.
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Create the API router with all routes and middleware.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .nest("/auth", auth::routes())
        .nest("/test", tests::routes())
        .nest("/multi-results", multi_results::routes())
        .nest("/system", system::routes())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            accounting_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::new())
        .with_state(state)
}

fn has_bearer(request: &Request) -> bool {
    request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("Bearer"))
}

/// Record every session-authenticated request in the accounting log and
/// refresh the orchestrator's `last_seen`.
async fn accounting_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    if !has_bearer(&request) {
        return next.run(request).await;
    }

    let token = match session::validate(&state, request.headers(), request.extensions()) {
        Ok(token) => token,
        Err(e) => return e.into_response(),
    };

    if let Err(e) =
        orchestrators::touch(state.store().pool(), &token.orchestrator_name, unix_now()).await
    {
        tracing::warn!(error = %e, "Unable to refresh the orchestrator's last_seen");
    }

    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let query = request.uri().query().unwrap_or("").to_string();

    let (parts, body) = request.into_parts();
    let bytes = match axum::body::to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(_) => {
            return error::ApiError::bad_input("bad_input", "Request body is too large")
                .into_response()
        }
    };
    let request = Request::from_parts(parts, Body::from(Bytes::clone(&bytes)));

    let response = next.run(request).await;

    state.accounting().record(
        &token.orchestrator_name,
        &method,
        &path,
        response.status().as_u16(),
        &query,
        &String::from_utf8_lossy(&bytes),
    );
    response
}
