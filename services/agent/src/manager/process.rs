//! Probe child processes: spawning, signalling, and the result reader.
//!
//! Each probe run is a re-exec of the agent binary with the hidden `probe`
//! task. Parameters go to the child on stdin; the child answers with one
//! JSON result line on stdout, which the reader task forwards into the
//! manager's result queue. Children run in their own process group so the
//! escalation signals reach whatever they spawned in turn.

use std::path::Path;
use std::process::Stdio;

use anyhow::Context;
use netmon_probes::ProbeOutcome;
use nix::errno::Errno;
use nix::sys::signal::{kill, killpg, Signal};
use nix::unistd::Pid;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, warn};

pub fn is_process_alive(pid: i64) -> bool {
    kill(Pid::from_raw(pid as i32), None).is_ok()
}

/// Ask a probe's process group to stop.
pub fn terminate_process(pid: i64) {
    debug!(pid, "Terminating process");
    signal_group(pid, Signal::SIGTERM);
}

/// Kill a probe's process group.
pub fn kill_process(pid: i64) {
    debug!(pid, "Killing process");
    signal_group(pid, Signal::SIGKILL);
}

fn signal_group(pid: i64, signal: Signal) {
    match killpg(Pid::from_raw(pid as i32), signal) {
        Ok(()) => {}
        Err(Errno::ESRCH) => {
            debug!(pid, "Unable to signal the process because it is no longer running");
        }
        Err(e) => {
            warn!(pid, error = %e, "Unable to signal the process");
        }
    }
}

/// Spawn a probe child and return its pid.
///
/// The reader task owns the child: it forwards the first result line into
/// the queue and reaps the process once it exits.
pub async fn spawn_probe(
    agent_exe: &Path,
    persistent: &Path,
    probe_name: &str,
    params: &str,
    run_id: i64,
    queue: UnboundedSender<String>,
) -> anyhow::Result<i64> {
    let mut child = Command::new(agent_exe)
        .arg("--task")
        .arg("probe")
        .arg("--persistent")
        .arg(persistent)
        .arg("--probe-name")
        .arg(probe_name)
        .arg("--run-id")
        .arg(run_id.to_string())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .process_group(0)
        .spawn()
        .with_context(|| format!("unable to start a process for probe '{probe_name}'"))?;

    let pid = child
        .id()
        .context("spawned probe process has no pid")? as i64;

    let mut stdin = child.stdin.take().context("probe child has no stdin")?;
    let params = params.to_string();
    tokio::spawn(async move {
        let _ = stdin.write_all(params.as_bytes()).await;
        // Drop closes the pipe; the child sees EOF after the params.
    });

    let stdout = child.stdout.take().context("probe child has no stdout")?;
    tokio::spawn(read_result(stdout, child, run_id, queue));

    debug!(probe = probe_name, pid, run_id, "Started a probe process");
    Ok(pid)
}

async fn read_result(
    stdout: tokio::process::ChildStdout,
    mut child: Child,
    run_id: i64,
    queue: UnboundedSender<String>,
) {
    let mut lines = BufReader::new(stdout).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                // One message per run; anything after it is noise.
                let _ = queue.send(line);
                break;
            }
            Ok(None) => {
                debug!(run_id, "Probe exited without producing a result");
                break;
            }
            Err(e) => {
                error!(run_id, error = %e, "Unable to read from the probe process");
                break;
            }
        }
    }
    let _ = child.wait().await;
}

/// Entry point of the hidden `probe` task: run one probe and print its
/// result message. Never touches the store.
pub async fn probe_child(probe_name: &str, run_id: i64) -> anyhow::Result<()> {
    let mut input = String::new();
    tokio::io::stdin()
        .read_to_string(&mut input)
        .await
        .context("unable to read probe parameters from stdin")?;

    let outcome = match serde_json::from_str::<serde_json::Value>(if input.trim().is_empty() {
        "{}"
    } else {
        input.trim()
    }) {
        Ok(params) => match netmon_probes::find(probe_name) {
            Some(probe) => probe.run(&params, run_id).await,
            None => ProbeOutcome::error(format!("unknown probe '{probe_name}'")),
        },
        Err(e) => ProbeOutcome::error(format!("probe parameters are not valid JSON: {e}")),
    };

    let message = outcome.into_message(run_id);
    println!("{}", serde_json::to_string(&message)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn liveness_of_the_current_process() {
        assert!(is_process_alive(std::process::id() as i64));
    }

    #[test]
    fn liveness_of_a_nonexistent_pid() {
        // Way above any realistic pid_max.
        assert!(!is_process_alive(999_999_999));
    }

    #[test]
    fn signalling_a_dead_group_is_harmless() {
        terminate_process(999_999_999);
        kill_process(999_999_999);
    }
}
