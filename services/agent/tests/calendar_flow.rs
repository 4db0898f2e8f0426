//! Store-level tests of the calendar pipelines.

use netmon_agent::calendar::CalendarWorker;
use netmon_agent::store::model::{EventSource, RequestReason, RunState, TestState};
use netmon_agent::store::{events, requests, runs, tests, Store, STORE_FILE};
use netmon_agent::util::unix_now;

struct Fixture {
    store: Store,
    worker: CalendarWorker,
    _dir: tempfile::TempDir,
}

async fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::create(&dir.path().join(STORE_FILE)).await.unwrap();
    store.init_schema().await.unwrap();
    Fixture {
        worker: CalendarWorker::new(store.clone()),
        store,
        _dir: dir,
    }
}

fn new_test(name: &str) -> tests::NewTest {
    tests::NewTest {
        name: name.to_string(),
        description: "calendar test".to_string(),
        state: TestState::Enabled,
        test_params: "{}".to_string(),
        timeout: 30,
        scheduling_interval: Some(60),
        scheduling_from: None,
        scheduling_until: None,
        recovery_interval: None,
        recovery_attempt_limit: None,
        key_ro: "ro-key".to_string(),
        key_rw: "rw-key".to_string(),
    }
}

async fn create_test(fixture: &Fixture, new: &tests::NewTest) -> i64 {
    tests::create(fixture.store.pool(), new, unix_now())
        .await
        .unwrap()
}

#[tokio::test]
async fn new_request_plans_the_next_periodic_event() {
    let f = fixture().await;
    let id_test = create_test(&f, &new_test("dummy")).await;
    requests::create(f.store.pool(), id_test, RequestReason::New, 0, unix_now())
        .await
        .unwrap();

    f.worker.pass().await.unwrap();

    let planned = events::list_by_test(f.store.pool(), id_test).await.unwrap();
    assert_eq!(planned.len(), 1);
    assert_eq!(planned[0].source, EventSource::Calendar);
    let expected = unix_now() + 60.0;
    assert!((planned[0].run_at - expected).abs() < 2.0);

    // The request was consumed.
    assert!(requests::list_all(f.store.pool()).await.unwrap().is_empty());
}

#[tokio::test]
async fn future_window_plans_the_event_at_its_opening() {
    let f = fixture().await;
    let from = unix_now() + 1000.0;
    let mut spec = new_test("dummy");
    spec.scheduling_from = Some(from);
    let id_test = create_test(&f, &spec).await;
    requests::create(f.store.pool(), id_test, RequestReason::New, 0, unix_now())
        .await
        .unwrap();

    f.worker.pass().await.unwrap();

    let planned = events::list_by_test(f.store.pool(), id_test).await.unwrap();
    assert_eq!(planned.len(), 1);
    assert_eq!(planned[0].source, EventSource::Request);
    assert_eq!(planned[0].run_at, from);
}

#[tokio::test]
async fn closed_window_plans_nothing() {
    let f = fixture().await;
    let mut spec = new_test("dummy");
    spec.scheduling_until = Some(unix_now() - 10.0);
    let id_test = create_test(&f, &spec).await;
    requests::create(f.store.pool(), id_test, RequestReason::New, 0, unix_now())
        .await
        .unwrap();

    f.worker.pass().await.unwrap();

    assert!(events::list_by_test(f.store.pool(), id_test).await.unwrap().is_empty());
    assert!(requests::list_all(f.store.pool()).await.unwrap().is_empty());
}

#[tokio::test]
async fn due_event_becomes_a_waiting_run_with_a_follow_up() {
    let f = fixture().await;
    let id_test = create_test(&f, &new_test("dummy")).await;
    let test = tests::get(f.store.pool(), id_test).await.unwrap().unwrap();

    let run_at = unix_now() - 1.0;
    events::plan(f.store.pool(), &test, run_at, EventSource::Request, 0)
        .await
        .unwrap();

    f.worker.pass().await.unwrap();

    let created = runs::list_by_test(f.store.pool(), id_test).await.unwrap();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].state, RunState::Waiting);
    assert_eq!(created[0].planned, run_at);

    // The due event is gone and the periodic follow-up took its place.
    let planned = events::list_by_test(f.store.pool(), id_test).await.unwrap();
    assert_eq!(planned.len(), 1);
    assert_eq!(planned[0].source, EventSource::Calendar);
    assert!(planned[0].run_at >= run_at + 59.0);
}

#[tokio::test]
async fn only_one_waiting_run_per_test() {
    let f = fixture().await;
    let id_test = create_test(&f, &new_test("dummy")).await;
    let test = tests::get(f.store.pool(), id_test).await.unwrap().unwrap();

    let now = unix_now();
    events::plan(f.store.pool(), &test, now - 2.0, EventSource::Request, 0)
        .await
        .unwrap();
    events::plan(f.store.pool(), &test, now - 1.0, EventSource::Request, 0)
        .await
        .unwrap();

    f.worker.pass().await.unwrap();

    let created = runs::list_by_test(f.store.pool(), id_test).await.unwrap();
    assert_eq!(created.len(), 1);
    assert!(events::list_due(f.store.pool(), unix_now()).await.unwrap().is_empty());
}

#[tokio::test]
async fn recovery_event_does_not_replan() {
    let f = fixture().await;
    let id_test = create_test(&f, &new_test("dummy")).await;
    let test = tests::get(f.store.pool(), id_test).await.unwrap().unwrap();

    events::plan(f.store.pool(), &test, unix_now() - 1.0, EventSource::Recovery, 1)
        .await
        .unwrap();

    f.worker.pass().await.unwrap();

    let created = runs::list_by_test(f.store.pool(), id_test).await.unwrap();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].recovery_attempt, 1);
    assert!(events::list_by_test(f.store.pool(), id_test).await.unwrap().is_empty());
}

#[tokio::test]
async fn failed_requests_respect_the_recovery_budget() {
    let f = fixture().await;
    let mut spec = new_test("dummy");
    spec.recovery_interval = Some(30);
    spec.recovery_attempt_limit = Some(2);
    let id_test = create_test(&f, &spec).await;

    // Attempts within the budget produce recovery events.
    for attempt in [1, 2] {
        requests::create(f.store.pool(), id_test, RequestReason::Failed, attempt, unix_now())
            .await
            .unwrap();
        f.worker.pass().await.unwrap();

        let planned = events::list_by_test(f.store.pool(), id_test).await.unwrap();
        assert_eq!(planned.len(), 1, "attempt {attempt}");
        assert_eq!(planned[0].source, EventSource::Recovery);
        assert_eq!(planned[0].recovery_attempt, attempt);
        assert!((planned[0].run_at - (unix_now() + 30.0)).abs() < 2.0);

        events::delete_by_test(f.store.pool(), id_test).await.unwrap();
    }

    // The budget is exhausted past the limit.
    requests::create(f.store.pool(), id_test, RequestReason::Failed, 3, unix_now())
        .await
        .unwrap();
    f.worker.pass().await.unwrap();
    assert!(events::list_by_test(f.store.pool(), id_test).await.unwrap().is_empty());
}

#[tokio::test]
async fn recovery_is_disabled_without_a_limit() {
    let f = fixture().await;
    let mut spec = new_test("dummy");
    spec.recovery_interval = Some(30);
    let id_test = create_test(&f, &spec).await;

    requests::create(f.store.pool(), id_test, RequestReason::Failed, 1, unix_now())
        .await
        .unwrap();
    f.worker.pass().await.unwrap();

    assert!(events::list_by_test(f.store.pool(), id_test).await.unwrap().is_empty());
}

#[tokio::test]
async fn zero_recovery_limit_means_no_recovery() {
    let f = fixture().await;
    let mut spec = new_test("dummy");
    spec.recovery_interval = Some(30);
    spec.recovery_attempt_limit = Some(0);
    let id_test = create_test(&f, &spec).await;

    requests::create(f.store.pool(), id_test, RequestReason::Failed, 1, unix_now())
        .await
        .unwrap();
    f.worker.pass().await.unwrap();

    assert!(events::list_by_test(f.store.pool(), id_test).await.unwrap().is_empty());
}

#[tokio::test]
async fn disabling_a_test_clears_its_calendar() {
    let f = fixture().await;
    let id_test = create_test(&f, &new_test("dummy")).await;
    let test = tests::get(f.store.pool(), id_test).await.unwrap().unwrap();

    events::plan(f.store.pool(), &test, unix_now() + 500.0, EventSource::Calendar, 0)
        .await
        .unwrap();
    tests::update_state(f.store.pool(), id_test, TestState::Disabled)
        .await
        .unwrap();
    requests::create(f.store.pool(), id_test, RequestReason::Update, 0, unix_now())
        .await
        .unwrap();

    f.worker.pass().await.unwrap();

    assert!(events::list_by_test(f.store.pool(), id_test).await.unwrap().is_empty());
}

#[tokio::test]
async fn events_are_never_planned_for_disabled_tests() {
    let f = fixture().await;
    let id_test = create_test(&f, &new_test("dummy")).await;
    tests::update_state(f.store.pool(), id_test, TestState::Disabled)
        .await
        .unwrap();
    let test = tests::get(f.store.pool(), id_test).await.unwrap().unwrap();

    let planned = events::plan(f.store.pool(), &test, unix_now(), EventSource::Request, 0)
        .await
        .unwrap();
    assert!(!planned);
    assert!(events::list_by_test(f.store.pool(), id_test).await.unwrap().is_empty());
}

#[tokio::test]
async fn request_for_a_deleted_test_is_consumed() {
    let f = fixture().await;
    requests::create(f.store.pool(), 4242, RequestReason::New, 0, unix_now())
        .await
        .unwrap();

    f.worker.pass().await.unwrap();

    assert!(requests::list_all(f.store.pool()).await.unwrap().is_empty());
    assert!(events::list_due(f.store.pool(), unix_now() + 1e9).await.unwrap().is_empty());
}
