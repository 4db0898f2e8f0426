//! Development probe with scripted behavior.
//!
//! Parameters:
//! - `sleep_ms` (optional): how long the check pretends to work
//! - `status` (optional): `"success"` or `"error"`, default `"success"`
//! - `data` (optional): payload returned on success

use std::time::Duration;

use async_trait::async_trait;

use crate::{Probe, ProbeOutcome, ResultStatus};

pub struct Dummy;

#[async_trait]
impl Probe for Dummy {
    fn name(&self) -> &'static str {
        "dummy"
    }

    async fn run(&self, params: &serde_json::Value, _run_id: i64) -> ProbeOutcome {
        if let Some(sleep_ms) = params.get("sleep_ms").and_then(|v| v.as_u64()) {
            tokio::time::sleep(Duration::from_millis(sleep_ms)).await;
        }

        match params.get("status").and_then(|v| v.as_str()) {
            None | Some("success") => {
                let data = params
                    .get("data")
                    .cloned()
                    .unwrap_or_else(|| serde_json::json!({ "value": 1 }));
                ProbeOutcome::success(data)
            }
            Some("error") => ProbeOutcome::error("scripted failure"),
            Some(other) => ProbeOutcome {
                status: ResultStatus::Error,
                data: serde_json::json!({
                    "description": format!("unsupported scripted status '{other}'"),
                }),
            },
        }
    }
}
