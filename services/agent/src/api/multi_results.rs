//! Multi-result endpoints: fetch results of many tests in one call.
//!
//! Endpoints:
//! - POST /multi-results/init - create the caller's aggregator
//! - POST /multi-results/{id} - add a member test (proof-of-key hash)
//! - GET  /multi-results/{id} - aggregated results since an id

use std::collections::BTreeMap;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::authz::{self, HmacEnvelope};
use crate::api::error::ApiError;
use crate::api::session::SessionToken;
use crate::crypto::sha256_hex;
use crate::state::AppState;
use crate::store::model::TestResult;
use crate::store::{multi_results, results, tests, StoreError};
use crate::util::unix_now;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/init", post(post_init))
        .route("/{id_multi_result}", post(post_add_test).get(get_results))
}

#[derive(Debug, Deserialize)]
struct MultiResultCreate {
    /// Aggregation key chosen by the orchestrator; later reads prove
    /// possession of it through the request hmac.
    key: String,
}

#[derive(Debug, Serialize)]
struct MultiResultIdResponse {
    id_multi_result: i64,
}

#[derive(Debug, Deserialize)]
struct MultiResultAddTest {
    id_test: i64,

    /// `SHA-256(key || id_multi_result || id_test)` proving the caller
    /// knows the aggregation key for this member.
    hash: String,
}

#[derive(Debug, Serialize)]
struct MultiResultTestIdsResponse {
    /// Comma-separated member ids (wire format).
    test_ids: String,
}

#[derive(Debug, Serialize)]
struct MemberResults {
    results: Vec<TestResult>,
}

#[derive(Debug, Serialize)]
struct MultiResultResponse {
    results: BTreeMap<i64, MemberResults>,
    last_checked_id: i64,
}

#[derive(Debug, Deserialize)]
struct ResultsQuery {
    #[serde(default)]
    since_id: i64,
}

async fn find_multi(state: &AppState, id: i64) -> Result<crate::store::model::MultiResult, ApiError> {
    multi_results::get(state.store().pool(), id)
        .await?
        .ok_or_else(|| ApiError::not_found("Multi results record doesn't exist"))
}

async fn post_init(
    State(state): State<AppState>,
    session: SessionToken,
    envelope: HmacEnvelope,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let canonical = authz::canonical_body(&body)?;
    authz::authorize(&state, &envelope, &canonical, None, "").await?;
    let create: MultiResultCreate = serde_json::from_slice(&body)
        .map_err(|e| ApiError::bad_input("bad_input", format!("Invalid request body: {e}")))?;

    let orchestrator_name = session.0.orchestrator_name;

    // Each orchestrator holds one aggregator; init replaces the old one.
    let mut tx = state.store().begin().await?;
    multi_results::delete_by_orchestrator(&mut *tx, &orchestrator_name).await?;
    let id_multi_result =
        multi_results::create(&mut *tx, &orchestrator_name, &create.key, unix_now()).await?;
    tx.commit().await.map_err(StoreError::from)?;

    Ok(Json(MultiResultIdResponse { id_multi_result }))
}

async fn post_add_test(
    State(state): State<AppState>,
    _session: SessionToken,
    envelope: HmacEnvelope,
    Path(id_multi_result): Path<i64>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let add: MultiResultAddTest = serde_json::from_slice(&body)
        .map_err(|e| ApiError::bad_input("bad_input", format!("Invalid request body: {e}")))?;

    let test = tests::get(state.store().pool(), add.id_test)
        .await?
        .ok_or_else(|| ApiError::not_found("Test doesn't exist"))?;

    let canonical = authz::canonical_body(&body)?;
    authz::authorize(
        &state,
        &envelope,
        &canonical,
        Some(&test.key_ro),
        &authz::root_password(&state)?,
    )
    .await?;

    let multi = find_multi(&state, id_multi_result).await?;

    let expected = sha256_hex(&format!(
        "{}{}{}",
        multi.key, multi.id_multi_result, add.id_test
    ));
    if add.hash != expected {
        return Err(ApiError::unauthorized("Wrong multi tests hash value."));
    }

    let mut test_ids = multi.test_ids.clone();
    if !test_ids.contains(&add.id_test) {
        test_ids.push(add.id_test);
        multi_results::update_test_ids(state.store().pool(), id_multi_result, &test_ids).await?;
    }

    let wire = test_ids
        .iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(",");
    Ok(Json(MultiResultTestIdsResponse { test_ids: wire }))
}

async fn get_results(
    State(state): State<AppState>,
    _session: SessionToken,
    envelope: HmacEnvelope,
    Path(id_multi_result): Path<i64>,
    Query(query): Query<ResultsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let now = unix_now();
    let multi = find_multi(&state, id_multi_result).await?;
    authz::authorize(
        &state,
        &envelope,
        "",
        Some(&multi.key),
        &authz::root_password(&state)?,
    )
    .await?;

    let pool = state.store().pool();
    multi_results::update_last_used(pool, id_multi_result, now).await?;

    // Snapshot the id bound first so members page consistently even while
    // the manager keeps inserting results.
    let last_checked_id = results::last_id(pool).await?;
    let mut member_results = BTreeMap::new();
    for id_test in &multi.test_ids {
        tests::update_last_downloaded(pool, *id_test, now).await?;
        let rows = results::list_in_range(pool, *id_test, query.since_id, last_checked_id).await?;
        member_results.insert(*id_test, MemberResults { results: rows });
    }

    Ok(Json(MultiResultResponse {
        results: member_results,
        last_checked_id,
    }))
}
