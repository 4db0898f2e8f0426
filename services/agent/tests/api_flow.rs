//! HTTP integration tests: authentication, authorization, resources.

use std::net::SocketAddr;
use std::sync::Arc;

use reqwest::Method;
use serde_json::json;
use tokio::net::TcpListener;

use netmon_agent::accounting::AccountingLog;
use netmon_agent::api;
use netmon_agent::api::authz::{canonical_json, compute_hmac};
use netmon_agent::bootstrap::{self, CONFIG_FILE};
use netmon_agent::config::ConfigStore;
use netmon_agent::crypto::{self, TokenData};
use netmon_agent::state::AppState;
use netmon_agent::store::model::{RequestReason, ResultStatus};
use netmon_agent::store::results::NewResult;
use netmon_agent::store::{requests, results, Store, STORE_FILE};
use netmon_agent::util::unix_now;

struct Api {
    base_url: String,
    client: reqwest::Client,
    store: Store,
    config: Arc<ConfigStore>,
    token: String,
    token_key: String,
    root_password: String,
    new_tests_password: String,
    nonce_counter: u64,
    _dir: tempfile::TempDir,
}

async fn start_api() -> Api {
    let dir = tempfile::tempdir().unwrap();
    let config = Arc::new(ConfigStore::load(&dir.path().join(CONFIG_FILE)).unwrap());
    bootstrap::init_config_defaults(&config, dir.path()).unwrap();

    let store = Store::create(&dir.path().join(STORE_FILE)).await.unwrap();
    store.init_schema().await.unwrap();

    let token_key = config.require("authentication", "token_key").unwrap();
    let accounting = Arc::new(AccountingLog::open(&config));
    let state = AppState::new(store.clone(), config.clone(), accounting, token_key.clone());
    let app = api::create_router(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let base_url = format!("http://{addr}");
    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    let client = reqwest::Client::new();
    let password = config.require("authentication", "password").unwrap();
    let login_hash = crypto::sha256_hex(&format!("orch-1{password}"));
    let response = client
        .post(format!("{base_url}/auth/token"))
        .json(&json!({ "username": "orch-1", "password": login_hash }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    let token = body["access_token"].as_str().unwrap().to_string();

    Api {
        base_url,
        client,
        store,
        token,
        token_key,
        root_password: config.require("authorization", "root_password").unwrap(),
        new_tests_password: config.require("authorization", "new_tests_password").unwrap(),
        config,
        nonce_counter: 0,
        _dir: dir,
    }
}

impl Api {
    fn next_nonce(&mut self) -> String {
        self.nonce_counter += 1;
        format!("nonce-{}", self.nonce_counter)
    }

    /// Send an authorized request signed with the given secret.
    async fn send(
        &mut self,
        method: Method,
        path_and_query: &str,
        body: Option<serde_json::Value>,
        secret: &str,
    ) -> reqwest::Response {
        let time = format!("{}", unix_now() as u64);
        let nonce = self.next_nonce();
        self.send_raw(method, path_and_query, body, secret, &time, &nonce)
            .await
    }

    async fn send_raw(
        &self,
        method: Method,
        path_and_query: &str,
        body: Option<serde_json::Value>,
        secret: &str,
        time: &str,
        nonce: &str,
    ) -> reqwest::Response {
        let (path, query) = path_and_query
            .split_once('?')
            .unwrap_or((path_and_query, ""));
        let body_str = body.as_ref().map(canonical_json).unwrap_or_default();
        let hmac = compute_hmac(method.as_str(), path, query, &body_str, time, nonce, secret);

        let mut request = self
            .client
            .request(method, format!("{}{}", self.base_url, path_and_query))
            .bearer_auth(&self.token)
            .header("authorization-time", time)
            .header("authorization-nonce", nonce)
            .header("authorization-hmac", hmac);
        if let Some(body) = body {
            request = request
                .header("content-type", "application/json")
                .body(serde_json::to_string(&body).unwrap());
        }
        request.send().await.unwrap()
    }

    async fn create_test(&mut self, name: &str, state: &str) -> i64 {
        let body = json!({
            "name": name,
            "description": "api test",
            "state": state,
            "test_params": "{\"probe\":\"params\"}",
            "timeout": 30,
            "scheduling_interval": 60,
            "key_ro": format!("{name}-ro"),
            "key_rw": format!("{name}-rw"),
        });
        let secret = self.new_tests_password.clone();
        let response = self.send(Method::POST, "/test", Some(body), &secret).await;
        assert_eq!(response.status(), 200);
        let created: serde_json::Value = response.json().await.unwrap();
        created["id_test"].as_i64().unwrap()
    }
}

async fn error_description(response: reqwest::Response) -> String {
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["status"], "error");
    body["error"]["description"].as_str().unwrap().to_string()
}

// ===========================================================================
// Authentication
// ===========================================================================

#[tokio::test]
async fn time_endpoint_is_public() {
    let api = start_api().await;
    let response = api
        .client
        .get(format!("{}/auth/time", api.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert!((body["time"].as_f64().unwrap() - unix_now()).abs() < 5.0);
}

#[tokio::test]
async fn wrong_login_password_is_rejected() {
    let api = start_api().await;
    let response = api
        .client
        .post(format!("{}/auth/token", api.base_url))
        .json(&json!({ "username": "orch-1", "password": "not-a-hash" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);
    assert_eq!(error_description(response).await, "Wrong login information.");
}

#[tokio::test]
async fn token_bound_to_another_ip_is_rejected() {
    let mut api = start_api().await;
    let foreign = crypto::sign_token(
        &TokenData {
            orchestrator_name: "orch-1".to_string(),
            orchestrator_ip: "10.0.0.2".to_string(),
            expiration: unix_now() as i64 + 3600,
        },
        &api.token_key,
    );
    api.token = foreign;

    let secret = api.root_password.clone();
    let response = api.send(Method::GET, "/test/all", None, &secret).await;
    assert_eq!(response.status(), 401);
    assert!(error_description(response).await.contains("different IP"));
}

#[tokio::test]
async fn expired_token_is_rejected() {
    let mut api = start_api().await;
    api.token = crypto::sign_token(
        &TokenData {
            orchestrator_name: "orch-1".to_string(),
            orchestrator_ip: "127.0.0.1".to_string(),
            expiration: unix_now() as i64 - 10,
        },
        &api.token_key,
    );

    let secret = api.root_password.clone();
    let response = api.send(Method::GET, "/test/all", None, &secret).await;
    assert_eq!(response.status(), 401);
    assert!(error_description(response).await.contains("expired"));
}

#[tokio::test]
async fn missing_token_is_rejected() {
    let api = start_api().await;
    let response = api
        .client
        .get(format!("{}/test/all", api.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);
}

// ===========================================================================
// Authorization
// ===========================================================================

#[tokio::test]
async fn root_key_authorizes_the_test_listing() {
    let mut api = start_api().await;
    let secret = api.root_password.clone();
    let response = api.send(Method::GET, "/test/all", None, &secret).await;
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["tests"], json!([]));
}

#[tokio::test]
async fn wrong_authorization_key_is_rejected() {
    let mut api = start_api().await;
    let response = api.send(Method::GET, "/test/all", None, "wrong-key").await;
    assert_eq!(response.status(), 403);
    assert_eq!(error_description(response).await, "Wrong authorization token.");
}

#[tokio::test]
async fn replayed_nonce_is_rejected() {
    let api = start_api().await;
    let time = format!("{}", unix_now() as u64);

    let first = api
        .send_raw(Method::GET, "/test/all", None, &api.root_password, &time, "N1")
        .await;
    assert_eq!(first.status(), 200);

    // Identical request, headers included.
    let replay = api
        .send_raw(Method::GET, "/test/all", None, &api.root_password, &time, "N1")
        .await;
    assert_eq!(replay.status(), 403);
    assert!(error_description(replay).await.contains("nonce has already been used"));
}

#[tokio::test]
async fn stale_request_time_is_rejected() {
    let api = start_api().await;
    let stale = format!("{}", unix_now() as u64 - 3600);
    let response = api
        .send_raw(Method::GET, "/test/all", None, &api.root_password, &stale, "N2")
        .await;
    assert_eq!(response.status(), 403);
    assert!(error_description(response).await.contains("Wrong request time"));
}

#[tokio::test]
async fn future_request_time_is_rejected() {
    let api = start_api().await;
    let future = format!("{}", unix_now() as u64 + 3600);
    let response = api
        .send_raw(Method::GET, "/test/all", None, &api.root_password, &future, "N3")
        .await;
    assert_eq!(response.status(), 403);
}

#[tokio::test]
async fn dev_bypass_is_off_by_default() {
    let api = start_api().await;

    // With the bypass disabled, the literal value goes through the full
    // verification chain and fails it.
    let denied = api
        .client
        .get(format!("{}/test/all", api.base_url))
        .bearer_auth(&api.token)
        .header("authorization-hmac", "xdev")
        .send()
        .await
        .unwrap();
    assert_eq!(denied.status(), 403);

    api.config
        .set("authorization", "dev_bypass_bool", "true")
        .unwrap();
    let allowed = api
        .client
        .get(format!("{}/test/all", api.base_url))
        .bearer_auth(&api.token)
        .header("authorization-hmac", "xdev")
        .send()
        .await
        .unwrap();
    assert_eq!(allowed.status(), 200);
}

// ===========================================================================
// Test resources
// ===========================================================================

#[tokio::test]
async fn creating_an_enabled_test_enqueues_a_kickoff_request() {
    let mut api = start_api().await;
    let id_test = api.create_test("dummy", "enabled").await;

    let pending = requests::list_by_test(api.store.pool(), id_test).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].reason, RequestReason::New);
}

#[tokio::test]
async fn creating_a_disabled_test_enqueues_nothing() {
    let mut api = start_api().await;
    let id_test = api.create_test("dummy", "disabled").await;
    assert!(requests::list_by_test(api.store.pool(), id_test).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_is_readable_with_its_ro_key() {
    let mut api = start_api().await;
    let id_test = api.create_test("dummy", "enabled").await;

    let response = api
        .send(Method::GET, &format!("/test/{id_test}"), None, "dummy-ro")
        .await;
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["id_test"].as_i64(), Some(id_test));
    assert_eq!(body["version"].as_i64(), Some(1));
    assert_eq!(body["state"], "enabled");

    let denied = api
        .send(Method::GET, &format!("/test/{id_test}"), None, "dummy-rw")
        .await;
    assert_eq!(denied.status(), 403);
}

#[tokio::test]
async fn missing_test_is_a_404() {
    let mut api = start_api().await;
    let secret = api.root_password.clone();
    let response = api.send(Method::GET, "/test/4242", None, &secret).await;
    assert_eq!(response.status(), 404);
    assert_eq!(error_description(response).await, "Test doesn't exist");
}

#[tokio::test]
async fn patching_params_bumps_the_version_and_snapshots_the_old_ones() {
    let mut api = start_api().await;
    let id_test = api.create_test("dummy", "enabled").await;

    let update = json!({
        "description": "api test",
        "state": "enabled",
        "test_params": "{\"probe\":\"changed\"}",
        "timeout": 30,
    });
    let response = api
        .send(
            Method::PATCH,
            &format!("/test/{id_test}"),
            Some(update),
            "dummy-rw",
        )
        .await;
    assert_eq!(response.status(), 200);
    let updated: serde_json::Value = response.json().await.unwrap();
    assert_eq!(updated["version"].as_i64(), Some(2));
    // The optional window survives an update that omits it.
    assert_eq!(updated["scheduling_interval"].as_i64(), Some(60));

    let history = api
        .send(
            Method::GET,
            &format!("/test/{id_test}/old_params"),
            None,
            "dummy-ro",
        )
        .await;
    assert_eq!(history.status(), 200);
    let history: serde_json::Value = history.json().await.unwrap();
    assert_eq!(history["old_params"][0]["version"].as_i64(), Some(1));
    assert_eq!(
        history["old_params"][0]["test_params"],
        "{\"probe\":\"params\"}"
    );

    let by_version = api
        .send(
            Method::GET,
            &format!("/test/{id_test}/old_params/1"),
            None,
            "dummy-ro",
        )
        .await;
    assert_eq!(by_version.status(), 200);
}

#[tokio::test]
async fn state_change_enqueues_an_update_request() {
    let mut api = start_api().await;
    let id_test = api.create_test("dummy", "enabled").await;

    let update = json!({
        "description": "api test",
        "state": "disabled",
        "test_params": "{\"probe\":\"params\"}",
        "timeout": 30,
    });
    let response = api
        .send(
            Method::PATCH,
            &format!("/test/{id_test}"),
            Some(update),
            "dummy-rw",
        )
        .await;
    assert_eq!(response.status(), 200);

    let pending = requests::list_by_test(api.store.pool(), id_test).await.unwrap();
    let reasons: Vec<RequestReason> = pending.iter().map(|r| r.reason).collect();
    assert!(reasons.contains(&RequestReason::Update));
}

#[tokio::test]
async fn results_page_by_id_and_touch_the_download_time() {
    let mut api = start_api().await;
    let id_test = api.create_test("dummy", "enabled").await;

    for i in 0..5 {
        results::create(
            api.store.pool(),
            &NewResult {
                id_test,
                version: 1,
                planned: 100.0 + i as f64,
                started: 101.0 + i as f64,
                finished: 102.0 + i as f64,
                status: ResultStatus::Success,
                recovery_attempt: 0,
                data: Some("{\"value\":1}".to_string()),
            },
        )
        .await
        .unwrap();
    }

    let response = api
        .send(
            Method::GET,
            &format!("/test/{id_test}/results?since_id=3"),
            None,
            "dummy-ro",
        )
        .await;
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    let listed = body["results"].as_array().unwrap();
    assert_eq!(listed.len(), 2);
    assert!(listed.iter().all(|r| r["id_result"].as_i64().unwrap() > 3));

    let test = netmon_agent::store::tests::get(api.store.pool(), id_test)
        .await
        .unwrap()
        .unwrap();
    assert!(test.last_downloaded_time.is_some());
}

#[tokio::test]
async fn forced_request_needs_the_rw_key() {
    let mut api = start_api().await;
    let id_test = api.create_test("dummy", "enabled").await;

    let denied = api
        .send(
            Method::POST,
            &format!("/test/{id_test}/request"),
            None,
            "dummy-ro",
        )
        .await;
    assert_eq!(denied.status(), 403);

    let response = api
        .send(
            Method::POST,
            &format!("/test/{id_test}/request"),
            None,
            "dummy-rw",
        )
        .await;
    assert_eq!(response.status(), 200);
    let pending = requests::list_by_test(api.store.pool(), id_test).await.unwrap();
    assert_eq!(pending.len(), 2); // kickoff + forced
}

#[tokio::test]
async fn full_view_returns_every_related_table() {
    let mut api = start_api().await;
    let id_test = api.create_test("dummy", "enabled").await;

    let response = api
        .send(
            Method::GET,
            &format!("/test/{id_test}/full"),
            None,
            "dummy-ro",
        )
        .await;
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["test"]["id_test"].as_i64(), Some(id_test));
    assert_eq!(body["requests"].as_array().unwrap().len(), 1);
    assert!(body["events"].as_array().unwrap().is_empty());
    assert!(body["runs"].as_array().unwrap().is_empty());
    assert!(body["results"].as_array().unwrap().is_empty());
    assert!(body["old_params"].as_array().unwrap().is_empty());
}

// ===========================================================================
// Multi-results
// ===========================================================================

#[tokio::test]
async fn multi_result_aggregation_round_trip() {
    let mut api = start_api().await;
    let id_one = api.create_test("alpha", "enabled").await;
    let id_two = api.create_test("beta", "enabled").await;

    for id_test in [id_one, id_two] {
        results::create(
            api.store.pool(),
            &NewResult {
                id_test,
                version: 1,
                planned: 100.0,
                started: 101.0,
                finished: 102.0,
                status: ResultStatus::Success,
                recovery_attempt: 0,
                data: Some("{\"value\":1}".to_string()),
            },
        )
        .await
        .unwrap();
    }

    // Init with the aggregation key.
    let response = api
        .send(
            Method::POST,
            "/multi-results/init",
            Some(json!({ "key": "K" })),
            "",
        )
        .await;
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    let id_multi = body["id_multi_result"].as_i64().unwrap();

    // Add the first test, proving knowledge of the key.
    let hash = crypto::sha256_hex(&format!("K{id_multi}{id_one}"));
    let response = api
        .send(
            Method::POST,
            &format!("/multi-results/{id_multi}"),
            Some(json!({ "id_test": id_one, "hash": hash })),
            "alpha-ro",
        )
        .await;
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["test_ids"], id_one.to_string());

    // A wrong hash is rejected.
    let response = api
        .send(
            Method::POST,
            &format!("/multi-results/{id_multi}"),
            Some(json!({ "id_test": id_two, "hash": "bogus" })),
            "beta-ro",
        )
        .await;
    assert_eq!(response.status(), 403);
    assert_eq!(error_description(response).await, "Wrong multi tests hash value.");

    // Fetch under the aggregation key.
    let response = api
        .send(
            Method::GET,
            &format!("/multi-results/{id_multi}?since_id=0"),
            None,
            "K",
        )
        .await;
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    let member = &body["results"][id_one.to_string()];
    assert_eq!(member["results"].as_array().unwrap().len(), 1);
    assert!(body["results"][id_two.to_string()].is_null());

    let last_checked = body["last_checked_id"].as_i64().unwrap();
    assert_eq!(last_checked, results::last_id(api.store.pool()).await.unwrap());

    // Nothing new since the snapshot.
    let response = api
        .send(
            Method::GET,
            &format!("/multi-results/{id_multi}?since_id={last_checked}"),
            None,
            "K",
        )
        .await;
    let body: serde_json::Value = response.json().await.unwrap();
    assert!(body["results"][id_one.to_string()]["results"]
        .as_array()
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn init_replaces_the_previous_aggregator() {
    let mut api = start_api().await;
    let response = api
        .send(
            Method::POST,
            "/multi-results/init",
            Some(json!({ "key": "K1" })),
            "",
        )
        .await;
    let first: serde_json::Value = response.json().await.unwrap();
    let first_id = first["id_multi_result"].as_i64().unwrap();

    let response = api
        .send(
            Method::POST,
            "/multi-results/init",
            Some(json!({ "key": "K2" })),
            "",
        )
        .await;
    assert_eq!(response.status(), 200);

    let secret = api.root_password.clone();
    let gone = api
        .send(
            Method::GET,
            &format!("/multi-results/{first_id}?since_id=0"),
            None,
            &secret,
        )
        .await;
    assert_eq!(gone.status(), 404);
}

// ===========================================================================
// System
// ===========================================================================

#[tokio::test]
async fn public_config_is_readable_by_any_session() {
    let mut api = start_api().await;
    let response = api.send(Method::GET, "/system/config", None, "").await;
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert!(body["options"]["public"]["uuid"].is_string());
    // Only the public section leaks through this endpoint.
    assert!(body["options"]["authorization"].is_null());
}

#[tokio::test]
async fn config_can_be_patched_by_root() {
    let mut api = start_api().await;
    let secret = api.root_password.clone();
    let patch = json!({ "options": { "public": { "note": "patched" } } });
    let response = api
        .send(Method::PATCH, "/system/config", Some(patch), &secret)
        .await;
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["options"]["public"]["note"], "added");

    let all = api.send(Method::GET, "/system/config/all", None, &secret).await;
    let all: serde_json::Value = all.json().await.unwrap();
    assert_eq!(all["options"]["public"]["note"], "patched");
}

#[tokio::test]
async fn orchestrators_are_listed_for_root() {
    let mut api = start_api().await;
    let secret = api.root_password.clone();
    let response = api
        .send(Method::GET, "/system/orchestrators", None, &secret)
        .await;
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    let names: Vec<&str> = body["orchestrators"]
        .as_array()
        .unwrap()
        .iter()
        .map(|o| o["name"].as_str().unwrap())
        .collect();
    assert!(names.contains(&"orch-1"));
}

#[tokio::test]
async fn logs_page_until_exhausted_and_compress() {
    let mut api = start_api().await;

    // Seed the debug log file the server pages over.
    let log_path = api.config.file("logging", "logs_file").unwrap();
    let lines: Vec<String> = (0..30)
        .map(|i| format!("2025-06-01 10:00:{i:02},000 INFO netmon_agent: payload {i}"))
        .collect();
    std::fs::write(&log_path, lines.join("\n") + "\n").unwrap();

    let secret = api.root_password.clone();
    let mut since = "1970-01-01".to_string();
    let mut collected = String::new();
    let mut pages = 0;
    loop {
        let query = format!(
            "/system/logs?since={}&max_size=400",
            since.replace(' ', "%20")
        );
        let response = api.send(Method::GET, &query, None, &secret).await;
        assert_eq!(response.status(), 200);
        let body: serde_json::Value = response.json().await.unwrap();
        collected.push_str(body["data"].as_str().unwrap());
        pages += 1;
        if !body["more_data"].as_bool().unwrap() {
            break;
        }
        since = body["last_datetime"].as_str().unwrap().to_string();
    }
    assert!(pages > 1);
    assert_eq!(collected, lines.join("\n") + "\n");

    // Same first page, compressed.
    let response = api
        .send(
            Method::GET,
            "/system/logs?since=1970-01-01&max_size=400&compression_alg=zlib_base85",
            None,
            &secret,
        )
        .await;
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    let decoded = netmon_agent::api::logs_processing::decompress_data(
        body["data"].as_str().unwrap(),
        netmon_agent::store::model::CompressionAlg::ZlibBase85,
    )
    .unwrap();
    assert!(decoded.starts_with(&lines[0]));
}

#[tokio::test]
async fn log_statistics_bucket_by_severity() {
    let mut api = start_api().await;

    let log_path = api.config.file("logging", "logs_file").unwrap();
    let now = chrono::Local::now();
    let stamp = |offset: i64, level: &str| {
        format!(
            "{} {level} netmon_agent: line",
            (now - chrono::Duration::seconds(offset)).format("%Y-%m-%d %H:%M:%S,%3f")
        )
    };
    let content = [
        stamp(50, "INFO"),
        stamp(40, "INFO"),
        stamp(30, "WARN"),
        stamp(20, "ERROR"),
        stamp(10, "DEBUG"),
    ]
    .join("\n")
        + "\n";
    std::fs::write(&log_path, content).unwrap();

    let secret = api.root_password.clone();
    let response = api
        .send(Method::GET, "/system/logs/stats?minutes=10", None, &secret)
        .await;
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["info"].as_u64(), Some(2));
    assert_eq!(body["warning"].as_u64(), Some(1));
    assert_eq!(body["error"].as_u64(), Some(1));
    assert_eq!(body["debug"].as_u64(), Some(1));
    assert_eq!(body["unknown"].as_u64(), Some(0));
}

#[tokio::test]
async fn accounting_log_records_authenticated_requests() {
    let mut api = start_api().await;

    // Generate some accounted traffic.
    let secret = api.root_password.clone();
    let response = api.send(Method::GET, "/test/all", None, &secret).await;
    assert_eq!(response.status(), 200);

    let response = api
        .send(
            Method::GET,
            "/system/accounting?since=1970-01-01",
            None,
            &secret,
        )
        .await;
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    let data = body["data"].as_str().unwrap();
    assert!(data.contains("orch-1"));
    assert!(data.contains("/test/all"));
}
