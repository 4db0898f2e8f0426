//! Persisted entities and their enums.
//!
//! Enums are stored as lowercase text; rows map through hand-written
//! `FromRow` impls. Timestamps are fractional epoch seconds (`REAL`).

use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

pub use netmon_probes::ResultStatus;

fn decode_error(column: &str, value: &str, kind: &str) -> sqlx::Error {
    sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: format!("unknown {kind} '{value}'").into(),
    }
}

/// Lifecycle state of a test definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestState {
    Enabled,
    Disabled,
    Deleted,
    MigratingFrom,
    MigratingTo,
}

impl TestState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TestState::Enabled => "enabled",
            TestState::Disabled => "disabled",
            TestState::Deleted => "deleted",
            TestState::MigratingFrom => "migrating_from",
            TestState::MigratingTo => "migrating_to",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "enabled" => Some(TestState::Enabled),
            "disabled" => Some(TestState::Disabled),
            "deleted" => Some(TestState::Deleted),
            "migrating_from" => Some(TestState::MigratingFrom),
            "migrating_to" => Some(TestState::MigratingTo),
            _ => None,
        }
    }
}

impl std::fmt::Display for TestState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a request was enqueued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestReason {
    New,
    Update,
    Failed,
}

impl RequestReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestReason::New => "new",
            RequestReason::Update => "update",
            RequestReason::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "new" => Some(RequestReason::New),
            "update" => Some(RequestReason::Update),
            "failed" => Some(RequestReason::Failed),
            _ => None,
        }
    }
}

/// What planned a calendar event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    Request,
    Calendar,
    Recovery,
}

impl EventSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventSource::Request => "request",
            EventSource::Calendar => "calendar",
            EventSource::Recovery => "recovery",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "request" => Some(EventSource::Request),
            "calendar" => Some(EventSource::Calendar),
            "recovery" => Some(EventSource::Recovery),
            _ => None,
        }
    }
}

/// Lifecycle state of an in-flight run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Waiting,
    Running,
    Terminating,
    Killing,
    Zombie,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Waiting => "waiting",
            RunState::Running => "running",
            RunState::Terminating => "terminating",
            RunState::Killing => "killing",
            RunState::Zombie => "zombie",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "waiting" => Some(RunState::Waiting),
            "running" => Some(RunState::Running),
            "terminating" => Some(RunState::Terminating),
            "killing" => Some(RunState::Killing),
            "zombie" => Some(RunState::Zombie),
            _ => None,
        }
    }

    /// Every state, in escalation order.
    pub fn all() -> [RunState; 5] {
        [
            RunState::Waiting,
            RunState::Running,
            RunState::Terminating,
            RunState::Killing,
            RunState::Zombie,
        ]
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Supported log compression algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompressionAlg {
    ZlibBase85,
}

/// A user-visible monitoring definition.
#[derive(Debug, Clone, Serialize)]
pub struct Test {
    pub id_test: i64,
    pub name: String,
    pub description: String,
    pub version: i64,
    pub state: TestState,
    pub created: f64,
    pub last_started_time: Option<f64>,
    pub last_result_time: Option<f64>,
    pub last_result_status: Option<ResultStatus>,
    pub last_downloaded_time: Option<f64>,
    pub test_params: String,
    pub timeout: i64,
    pub scheduling_interval: Option<i64>,
    pub scheduling_from: Option<f64>,
    pub scheduling_until: Option<f64>,
    pub recovery_interval: Option<i64>,
    pub recovery_attempt_limit: Option<i64>,
    pub key_ro: String,
    pub key_rw: String,
}

impl<'r> sqlx::FromRow<'r, SqliteRow> for Test {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let state: String = row.try_get("state")?;
        let last_result_status: Option<String> = row.try_get("last_result_status")?;
        Ok(Self {
            id_test: row.try_get("id_test")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            version: row.try_get("version")?,
            state: TestState::parse(&state)
                .ok_or_else(|| decode_error("state", &state, "test state"))?,
            created: row.try_get("created")?,
            last_started_time: row.try_get("last_started_time")?,
            last_result_time: row.try_get("last_result_time")?,
            last_result_status: last_result_status
                .map(|s| {
                    ResultStatus::parse(&s)
                        .ok_or_else(|| decode_error("last_result_status", &s, "result status"))
                })
                .transpose()?,
            last_downloaded_time: row.try_get("last_downloaded_time")?,
            test_params: row.try_get("test_params")?,
            timeout: row.try_get("timeout")?,
            scheduling_interval: row.try_get("scheduling_interval")?,
            scheduling_from: row.try_get("scheduling_from")?,
            scheduling_until: row.try_get("scheduling_until")?,
            recovery_interval: row.try_get("recovery_interval")?,
            recovery_attempt_limit: row.try_get("recovery_attempt_limit")?,
            key_ro: row.try_get("key_ro")?,
            key_rw: row.try_get("key_rw")?,
        })
    }
}

/// A pending intent to mutate the calendar.
#[derive(Debug, Clone, Serialize)]
pub struct Request {
    pub id_request: i64,
    pub id_test: i64,
    pub reason: RequestReason,
    pub recovery_attempt: i64,
    pub added_time: f64,
}

impl<'r> sqlx::FromRow<'r, SqliteRow> for Request {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let reason: String = row.try_get("reason")?;
        Ok(Self {
            id_request: row.try_get("id_request")?,
            id_test: row.try_get("id_test")?,
            reason: RequestReason::parse(&reason)
                .ok_or_else(|| decode_error("reason", &reason, "request reason"))?,
            recovery_attempt: row.try_get("recovery_attempt")?,
            added_time: row.try_get("added_time")?,
        })
    }
}

/// A scheduled future execution.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub id_event: i64,
    pub id_test: i64,
    pub run_at: f64,
    pub source: EventSource,
    pub recovery_attempt: i64,
}

impl<'r> sqlx::FromRow<'r, SqliteRow> for Event {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let source: String = row.try_get("source")?;
        Ok(Self {
            id_event: row.try_get("id_event")?,
            id_test: row.try_get("id_test")?,
            run_at: row.try_get("run_at")?,
            source: EventSource::parse(&source)
                .ok_or_else(|| decode_error("source", &source, "event source"))?,
            recovery_attempt: row.try_get("recovery_attempt")?,
        })
    }
}

/// A concrete attempt, materialized into OS process space.
#[derive(Debug, Clone, Serialize)]
pub struct Run {
    pub id_run: i64,
    pub id_test: i64,
    pub version: i64,
    pub state: RunState,
    pub pid: Option<i64>,
    pub planned: f64,
    pub started: Option<f64>,
    pub deadline: Option<f64>,
    pub recovery_attempt: i64,
}

impl<'r> sqlx::FromRow<'r, SqliteRow> for Run {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let state: String = row.try_get("state")?;
        Ok(Self {
            id_run: row.try_get("id_run")?,
            id_test: row.try_get("id_test")?,
            version: row.try_get("version")?,
            state: RunState::parse(&state)
                .ok_or_else(|| decode_error("state", &state, "run state"))?,
            pid: row.try_get("pid")?,
            planned: row.try_get("planned")?,
            started: row.try_get("started")?,
            deadline: row.try_get("deadline")?,
            recovery_attempt: row.try_get("recovery_attempt")?,
        })
    }
}

/// Immutable outcome of a completed run.
#[derive(Debug, Clone, Serialize)]
pub struct TestResult {
    pub id_result: i64,
    pub id_test: i64,
    pub version: i64,
    pub planned: f64,
    pub started: f64,
    pub finished: f64,
    pub status: ResultStatus,
    pub recovery_attempt: i64,
    pub data: Option<String>,
}

impl<'r> sqlx::FromRow<'r, SqliteRow> for TestResult {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let status: String = row.try_get("status")?;
        Ok(Self {
            id_result: row.try_get("id_result")?,
            id_test: row.try_get("id_test")?,
            version: row.try_get("version")?,
            planned: row.try_get("planned")?,
            started: row.try_get("started")?,
            finished: row.try_get("finished")?,
            status: ResultStatus::parse(&status)
                .ok_or_else(|| decode_error("status", &status, "result status"))?,
            recovery_attempt: row.try_get("recovery_attempt")?,
            data: row.try_get("data")?,
        })
    }
}

/// Historical snapshot of a test's parameters.
#[derive(Debug, Clone, Serialize)]
pub struct OldParams {
    pub id_old_params: i64,
    pub id_test: i64,
    pub version: i64,
    pub changed: f64,
    pub test_params: String,
}

impl<'r> sqlx::FromRow<'r, SqliteRow> for OldParams {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id_old_params: row.try_get("id_old_params")?,
            id_test: row.try_get("id_test")?,
            version: row.try_get("version")?,
            changed: row.try_get("changed")?,
            test_params: row.try_get("test_params")?,
        })
    }
}

/// Orchestrator-scoped aggregation handle over many tests.
///
/// Member ids are a first-class collection here and a JSON array in the
/// store; the wire format stays a comma-separated string.
#[derive(Debug, Clone)]
pub struct MultiResult {
    pub id_multi_result: i64,
    pub orchestrator_name: String,
    pub test_ids: Vec<i64>,
    pub key: String,
    pub last_used_time: f64,
}

impl MultiResult {
    /// Wire rendering of the member set.
    pub fn test_ids_wire(&self) -> String {
        self.test_ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl<'r> sqlx::FromRow<'r, SqliteRow> for MultiResult {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let test_ids: String = row.try_get("test_ids")?;
        Ok(Self {
            id_multi_result: row.try_get("id_multi_result")?,
            orchestrator_name: row.try_get("orchestrator_name")?,
            test_ids: serde_json::from_str(&test_ids).map_err(|_| {
                decode_error("test_ids", &test_ids, "member id array")
            })?,
            key: row.try_get("key")?,
            last_used_time: row.try_get("last_used_time")?,
        })
    }
}

/// A control-plane client the agent has seen.
#[derive(Debug, Clone, Serialize)]
pub struct Orchestrator {
    pub id_orchestrator: i64,
    pub name: String,
    pub last_seen: f64,
}

impl<'r> sqlx::FromRow<'r, SqliteRow> for Orchestrator {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id_orchestrator: row.try_get("id_orchestrator")?,
            name: row.try_get("name")?,
            last_seen: row.try_get("last_seen")?,
        })
    }
}
