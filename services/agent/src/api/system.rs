//! System endpoints: config, orchestrators, and log extraction.
//!
//! Endpoints:
//! - GET   /system/config        - public config section (any session)
//! - PATCH /system/config        - set options (root)
//! - GET   /system/config/all    - full config snapshot (root)
//! - GET   /system/orchestrators - every orchestrator seen (root)
//! - GET   /system/logs          - paged debug log (root)
//! - GET   /system/logs/stats    - severity counters (root)
//! - GET   /system/accounting    - paged accounting log (root)

use std::collections::BTreeMap;
use std::path::PathBuf;

use axum::{
    body::Bytes,
    extract::{Query, State},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::authz::{self, HmacEnvelope};
use crate::api::error::ApiError;
use crate::api::logs_processing::{self, LogCounters};
use crate::api::session::SessionToken;
use crate::state::AppState;
use crate::store::model::CompressionAlg;
use crate::store::orchestrators;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/config", get(get_config).patch(patch_config))
        .route("/config/all", get(get_config_all))
        .route("/orchestrators", get(get_orchestrators))
        .route("/logs", get(get_logs))
        .route("/logs/stats", get(get_logs_stats))
        .route("/accounting", get(get_accounting))
}

#[derive(Debug, Serialize, Deserialize)]
struct ConfigOptions {
    options: BTreeMap<String, BTreeMap<String, String>>,
}

#[derive(Debug, Serialize)]
struct OrchestratorsResponse {
    orchestrators: Vec<crate::store::model::Orchestrator>,
}

#[derive(Debug, Deserialize)]
struct LogsQuery {
    #[serde(default = "default_since")]
    since: String,
    #[serde(default)]
    max_size: Option<usize>,
    #[serde(default)]
    compression_alg: Option<CompressionAlg>,
}

fn default_since() -> String {
    "1970-01-01".to_string()
}

#[derive(Debug, Deserialize)]
struct LogsStatsQuery {
    #[serde(default = "default_minutes")]
    minutes: i64,
}

fn default_minutes() -> i64 {
    60
}

#[derive(Debug, Serialize)]
struct LogsResponse {
    data: String,
    compression_alg: Option<CompressionAlg>,
    last_datetime: Option<String>,
    more_data: bool,
}

async fn get_config(
    State(state): State<AppState>,
    _session: SessionToken,
    envelope: HmacEnvelope,
) -> Result<impl IntoResponse, ApiError> {
    authz::authorize(&state, &envelope, "", None, "").await?;
    let mut options = BTreeMap::new();
    options.insert("public".to_string(), state.config().section_options("public"));
    Ok(Json(ConfigOptions { options }))
}

async fn patch_config(
    State(state): State<AppState>,
    _session: SessionToken,
    envelope: HmacEnvelope,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let canonical = authz::canonical_body(&body)?;
    authz::authorize(
        &state,
        &envelope,
        &canonical,
        None,
        &authz::root_password(&state)?,
    )
    .await?;

    let wanted: ConfigOptions = serde_json::from_slice(&body)
        .map_err(|e| ApiError::bad_input("bad_input", format!("Invalid request body: {e}")))?;
    let changes = state.config().set_many(&wanted.options)?;
    Ok(Json(ConfigOptions { options: changes }))
}

async fn get_config_all(
    State(state): State<AppState>,
    _session: SessionToken,
    envelope: HmacEnvelope,
) -> Result<impl IntoResponse, ApiError> {
    authz::authorize(&state, &envelope, "", None, &authz::root_password(&state)?).await?;
    Ok(Json(ConfigOptions {
        options: state.config().all_options(),
    }))
}

async fn get_orchestrators(
    State(state): State<AppState>,
    _session: SessionToken,
    envelope: HmacEnvelope,
) -> Result<impl IntoResponse, ApiError> {
    authz::authorize(&state, &envelope, "", None, &authz::root_password(&state)?).await?;
    let orchestrators = orchestrators::list_all(state.store().pool()).await?;
    Ok(Json(OrchestratorsResponse { orchestrators }))
}

/// Shared paging logic of the two log-file endpoints.
async fn page_log_file(
    state: &AppState,
    file: PathBuf,
    query: LogsQuery,
) -> Result<LogsResponse, ApiError> {
    let cap = state.config().int("logging", "api_max_logs_size_int").unwrap_or(1_000_000) as usize;
    let max_size = query.max_size.map_or(cap, |wanted| wanted.min(cap));

    let compression_alg = query.compression_alg;
    let since = query.since;
    let extracted = tokio::task::spawn_blocking(move || {
        logs_processing::get_lines_from_file(&file, &since, max_size, compression_alg)
    })
    .await
    .map_err(|e| {
        tracing::error!(error = %e, "Log extraction task failed");
        ApiError::internal("logs_error", "Unable to read the log file")
    })?
    .map_err(|e| {
        tracing::error!(error = %e, "Unable to extract log lines");
        ApiError::internal("logs_error", "Unable to read the log file")
    })?;

    Ok(LogsResponse {
        data: extracted.lines,
        compression_alg,
        last_datetime: extracted.last_datetime,
        more_data: extracted.more_data,
    })
}

async fn get_logs(
    State(state): State<AppState>,
    _session: SessionToken,
    envelope: HmacEnvelope,
    Query(query): Query<LogsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    authz::authorize(&state, &envelope, "", None, &authz::root_password(&state)?).await?;
    let file = state.config().file("logging", "logs_file")?;
    Ok(Json(page_log_file(&state, file, query).await?))
}

async fn get_accounting(
    State(state): State<AppState>,
    _session: SessionToken,
    envelope: HmacEnvelope,
    Query(query): Query<LogsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    authz::authorize(&state, &envelope, "", None, &authz::root_password(&state)?).await?;
    let file = state.config().file("accounting", "logs_file")?;
    Ok(Json(page_log_file(&state, file, query).await?))
}

async fn get_logs_stats(
    State(state): State<AppState>,
    _session: SessionToken,
    envelope: HmacEnvelope,
    Query(query): Query<LogsStatsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    authz::authorize(&state, &envelope, "", None, &authz::root_password(&state)?).await?;
    let file = state.config().file("logging", "logs_file")?;

    let counters: LogCounters =
        tokio::task::spawn_blocking(move || logs_processing::statistics(&file, query.minutes))
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Log statistics task failed");
                ApiError::internal("logs_error", "Unable to read the log file")
            })?
            .map_err(|e| {
                tracing::error!(error = %e, "Unable to compute log statistics");
                ApiError::internal("logs_error", "Unable to read the log file")
            })?;

    Ok(Json(counters))
}
