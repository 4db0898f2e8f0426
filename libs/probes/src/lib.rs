//! Probe contract shared between the agent and the probe implementations.
//!
//! A probe is a named piece of code that performs one network/service check
//! and emits exactly one result message. Probes are compiled into the agent
//! binary and resolved through [`find`]; there is no runtime code loading.
//!
//! Probes never touch the database. They receive an opaque parameter value
//! and a run id, and hand back a status plus an arbitrary JSON payload that
//! the agent stores verbatim.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

mod dummy;
mod tcp;

pub use dummy::Dummy;
pub use tcp::TcpConnect;

/// Final status of a completed run.
///
/// `Success` and `Error` are produced by probes themselves; `Terminated`
/// and `Crashed` are assigned by the agent when it has to end a run from
/// the outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    Success,
    Terminated,
    Error,
    Crashed,
}

impl ResultStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultStatus::Success => "success",
            ResultStatus::Terminated => "terminated",
            ResultStatus::Error => "error",
            ResultStatus::Crashed => "crashed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "success" => Some(ResultStatus::Success),
            "terminated" => Some(ResultStatus::Terminated),
            "error" => Some(ResultStatus::Error),
            "crashed" => Some(ResultStatus::Crashed),
            _ => None,
        }
    }
}

impl std::fmt::Display for ResultStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The single message a probe run sends back to the agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultMessage {
    /// Run this message belongs to.
    pub run_id: i64,

    /// Outcome of the check.
    pub status: ResultStatus,

    /// Probe-defined payload, stored verbatim by the agent.
    pub data: serde_json::Value,
}

/// Outcome of a probe invocation, before it is bound to a run id.
#[derive(Debug, Clone)]
pub struct ProbeOutcome {
    pub status: ResultStatus,
    pub data: serde_json::Value,
}

impl ProbeOutcome {
    pub fn success(data: serde_json::Value) -> Self {
        Self {
            status: ResultStatus::Success,
            data,
        }
    }

    /// Error outcome carrying a human-readable description.
    pub fn error(description: impl Into<String>) -> Self {
        Self {
            status: ResultStatus::Error,
            data: serde_json::json!({ "description": description.into() }),
        }
    }

    pub fn into_message(self, run_id: i64) -> ResultMessage {
        ResultMessage {
            run_id,
            status: self.status,
            data: self.data,
        }
    }
}

/// A single network/service check.
///
/// Implementations must resolve to exactly one [`ProbeOutcome`]; the agent
/// enforces deadlines from the outside, so a probe is free to block for as
/// long as its check takes.
#[async_trait]
pub trait Probe: Send + Sync {
    /// Registry name, referenced by `tests.name`.
    fn name(&self) -> &'static str;

    /// Perform the check.
    async fn run(&self, params: &serde_json::Value, run_id: i64) -> ProbeOutcome;
}

/// All probes linked into this build.
static REGISTRY: &[&(dyn Probe + 'static)] = &[&Dummy, &TcpConnect];

/// Look up a probe by its registry name.
pub fn find(name: &str) -> Option<&'static dyn Probe> {
    REGISTRY.iter().find(|p| p.name() == name).copied()
}

/// Names of all registered probes.
pub fn names() -> Vec<&'static str> {
    REGISTRY.iter().map(|p| p.name()).collect()
}
