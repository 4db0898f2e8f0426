//! Tests manager: drives runs through their lifecycle.
//!
//! One pass performs, in order: harvest the result queue, start waiting
//! runs, terminate past-deadline running runs, kill past-deadline
//! terminating runs, zombify past-deadline killing runs, and re-check
//! zombies. Escalation is parent-side; probes only ever produce a result
//! message.

pub mod process;

use std::path::PathBuf;
use std::time::Duration;

use netmon_probes::ResultMessage;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::config::ConfigStore;
use crate::store::model::{ResultStatus, RequestReason, Run, RunState, TestState};
use crate::store::results::NewResult;
use crate::store::{requests, results, runs, tests, Store, StoreError, StoreResult};
use crate::util::unix_now;

/// Poll interval of the manager loop.
const TICK: Duration = Duration::from_millis(100);

/// Re-check period for zombie runs.
const ZOMBIE_RECHECK_SECS: f64 = 10.0;

/// Deadlines and process plumbing for the manager.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Grace after SIGTERM before escalating to SIGKILL.
    pub terminating_grace: i64,

    /// Grace after SIGKILL before declaring the run a zombie.
    pub killing_grace: i64,

    /// Binary re-executed as the probe child.
    pub agent_exe: PathBuf,
}

impl ManagerConfig {
    pub fn from_config(config: &ConfigStore) -> anyhow::Result<Self> {
        Ok(Self {
            terminating_grace: config.int("tests", "process_deadline_terminating_int")?,
            killing_grace: config.int("tests", "process_deadline_killing_int")?,
            agent_exe: std::env::current_exe()?,
        })
    }
}

pub struct TestsManager {
    store: Store,
    config: ManagerConfig,
    persistent: PathBuf,
    queue_tx: UnboundedSender<String>,
    queue_rx: UnboundedReceiver<String>,
}

impl TestsManager {
    pub fn new(store: Store, config: ManagerConfig, persistent: PathBuf) -> Self {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        Self {
            store,
            config,
            persistent,
            queue_tx,
            queue_rx,
        }
    }

    /// Producer handle of the result queue.
    pub fn queue_sender(&self) -> UnboundedSender<String> {
        self.queue_tx.clone()
    }

    /// Run the manager loop until shutdown is signaled.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            tick_ms = TICK.as_millis() as u64,
            terminating_grace = self.config.terminating_grace,
            killing_grace = self.config.killing_grace,
            "Starting tests manager"
        );

        let mut interval = tokio::time::interval(TICK);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.process_tests().await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Tests manager shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// One full pass of the lifecycle state machine.
    pub async fn process_tests(&mut self) {
        if let Err(e) = self.harvest_queue().await {
            error!(error = %e, "Unable to harvest the result queue");
        }
        if let Err(e) = self.start_waiting_runs().await {
            error!(error = %e, "Unable to start waiting runs");
        }
        if let Err(e) = self.terminate_overdue_runs().await {
            error!(error = %e, "Unable to terminate overdue runs");
        }
        if let Err(e) = self.kill_overdue_runs().await {
            error!(error = %e, "Unable to kill overdue runs");
        }
        if let Err(e) = self.zombify_overdue_runs().await {
            error!(error = %e, "Unable to zombify overdue runs");
        }
        if let Err(e) = self.check_zombies().await {
            error!(error = %e, "Unable to check zombie runs");
        }
    }

    // -----------------------------------------------------------------------
    // Step 1: harvest the result queue
    // -----------------------------------------------------------------------

    async fn harvest_queue(&mut self) -> StoreResult<()> {
        while let Ok(line) = self.queue_rx.try_recv() {
            if let Err(e) = self.process_result_line(&line).await {
                error!(error = %e, "Unable to process a queue message, skipping it");
            }
        }
        Ok(())
    }

    async fn process_result_line(&self, line: &str) -> StoreResult<()> {
        let message: ResultMessage = match serde_json::from_str(line) {
            Ok(message) => message,
            Err(e) => {
                error!(line, error = %e, "Message from the queue is malformed, discarding it");
                return Ok(());
            }
        };
        if !message.data.is_object() {
            error!(
                run_id = message.run_id,
                "Message from the queue does not carry its data as an object, discarding it"
            );
            return Ok(());
        }

        let Some(run) = runs::get(self.store.pool(), message.run_id).await? else {
            error!(
                run_id = message.run_id,
                "A result arrived after its run was deleted, discarding it"
            );
            return Ok(());
        };

        debug!(run_id = run.id_run, status = message.status.as_str(), "Processing result from queue");
        let finished = unix_now();

        let mut tx = self.store.begin().await?;
        if message.status != ResultStatus::Success {
            requests::create(
                &mut *tx,
                run.id_test,
                RequestReason::Failed,
                run.recovery_attempt + 1,
                finished,
            )
            .await?;
        }
        tests::update_last_result(&mut *tx, run.id_test, message.status, finished).await?;
        results::create(
            &mut *tx,
            &NewResult {
                id_test: run.id_test,
                version: run.version,
                planned: run.planned,
                started: run.started.unwrap_or(run.planned),
                finished,
                status: message.status,
                recovery_attempt: run.recovery_attempt,
                data: Some(message.data.to_string()),
            },
        )
        .await?;
        runs::delete(&mut *tx, run.id_run).await?;
        tx.commit().await.map_err(StoreError::from)
    }

    // -----------------------------------------------------------------------
    // Step 2: start waiting runs
    // -----------------------------------------------------------------------

    async fn start_waiting_runs(&self) -> StoreResult<()> {
        for run in runs::list_by_state(self.store.pool(), RunState::Waiting).await? {
            if let Err(e) = self.start_run(&run).await {
                error!(id_run = run.id_run, error = %e, "Unable to start the run, disabling its test");
                self.disable_test(run.id_test).await;
            }
        }
        Ok(())
    }

    async fn start_run(&self, run: &Run) -> StoreResult<()> {
        debug!(id_run = run.id_run, "Starting a new test based on the run");

        let Some(test) = tests::get(self.store.pool(), run.id_test).await? else {
            debug!(id_run = run.id_run, "Run references a deleted test, dropping it");
            runs::delete(self.store.pool(), run.id_run).await?;
            return Ok(());
        };
        if test.state != TestState::Enabled {
            debug!(id_test = test.id_test, state = %test.state, "Test is not enabled, dropping the run");
            runs::delete(self.store.pool(), run.id_run).await?;
            return Ok(());
        }

        if netmon_probes::find(&test.name).is_none() {
            error!(id_test = test.id_test, probe = test.name, "Unknown probe, disabling the test");
            runs::delete(self.store.pool(), run.id_run).await?;
            self.disable_test(test.id_test).await;
            return Ok(());
        }
        if serde_json::from_str::<serde_json::Value>(&test.test_params).is_err() {
            error!(
                id_test = test.id_test,
                "Test parameters are not valid JSON, disabling the test"
            );
            runs::delete(self.store.pool(), run.id_run).await?;
            self.disable_test(test.id_test).await;
            return Ok(());
        }

        let started = unix_now();
        let pid = process::spawn_probe(
            &self.config.agent_exe,
            &self.persistent,
            &test.name,
            &test.test_params,
            run.id_run,
            self.queue_tx.clone(),
        )
        .await
        .map_err(|e| StoreError::Decode(format!("probe spawn failed: {e}")))?;

        let deadline = started + test.timeout as f64;
        let mut tx = self.store.begin().await?;
        tests::update_last_started(&mut *tx, run.id_test, started).await?;
        runs::mark_started(&mut *tx, run.id_run, test.version, pid, started, deadline).await?;
        tx.commit().await.map_err(StoreError::from)
    }

    async fn disable_test(&self, id_test: i64) {
        if let Err(e) = tests::update_state(self.store.pool(), id_test, TestState::Disabled).await {
            error!(id_test, error = %e, "Unable to disable the test");
        }
    }

    // -----------------------------------------------------------------------
    // Steps 3-6: deadline escalation
    // -----------------------------------------------------------------------

    async fn terminate_overdue_runs(&self) -> StoreResult<()> {
        for run in runs::list_past_deadline(self.store.pool(), RunState::Running, unix_now()).await? {
            if let Err(e) = self.terminate_run(&run).await {
                error!(id_run = run.id_run, error = %e, "Unable to terminate the run");
            }
        }
        Ok(())
    }

    async fn terminate_run(&self, run: &Run) -> StoreResult<()> {
        debug!(id_run = run.id_run, "Terminating run because of reached deadline");
        let finished = unix_now();
        let pid = run.pid.unwrap_or(0);

        let mut tx = self.store.begin().await?;
        let status = if pid > 0 && process::is_process_alive(pid) {
            process::terminate_process(pid);
            runs::update_state(
                &mut *tx,
                run.id_run,
                RunState::Terminating,
                finished + self.config.terminating_grace as f64,
            )
            .await?;
            ResultStatus::Terminated
        } else {
            runs::delete(&mut *tx, run.id_run).await?;
            ResultStatus::Crashed
        };

        results::create(
            &mut *tx,
            &NewResult {
                id_test: run.id_test,
                version: run.version,
                planned: run.planned,
                started: run.started.unwrap_or(run.planned),
                finished,
                status,
                recovery_attempt: run.recovery_attempt,
                data: None,
            },
        )
        .await?;
        tests::update_last_result(&mut *tx, run.id_test, status, finished).await?;
        tx.commit().await.map_err(StoreError::from)
    }

    async fn kill_overdue_runs(&self) -> StoreResult<()> {
        let pool = self.store.pool();
        for run in runs::list_past_deadline(pool, RunState::Terminating, unix_now()).await? {
            let pid = run.pid.unwrap_or(0);
            if pid > 0 && process::is_process_alive(pid) {
                debug!(id_run = run.id_run, "Killing run because of reached deadline");
                process::kill_process(pid);
                runs::update_state(
                    pool,
                    run.id_run,
                    RunState::Killing,
                    unix_now() + self.config.killing_grace as f64,
                )
                .await?;
            } else {
                runs::delete(pool, run.id_run).await?;
            }
        }
        Ok(())
    }

    async fn zombify_overdue_runs(&self) -> StoreResult<()> {
        let pool = self.store.pool();
        for run in runs::list_past_deadline(pool, RunState::Killing, unix_now()).await? {
            let pid = run.pid.unwrap_or(0);
            if pid > 0 && process::is_process_alive(pid) {
                debug!(id_run = run.id_run, "Marking the run as zombie, it would not be killed");
                runs::update_state(
                    pool,
                    run.id_run,
                    RunState::Zombie,
                    unix_now() + ZOMBIE_RECHECK_SECS,
                )
                .await?;
            } else {
                runs::delete(pool, run.id_run).await?;
            }
        }
        Ok(())
    }

    async fn check_zombies(&self) -> StoreResult<()> {
        let pool = self.store.pool();
        for run in runs::list_past_deadline(pool, RunState::Zombie, unix_now()).await? {
            let pid = run.pid.unwrap_or(0);
            if pid > 0 && process::is_process_alive(pid) {
                runs::update_state(
                    pool,
                    run.id_run,
                    RunState::Zombie,
                    unix_now() + ZOMBIE_RECHECK_SECS,
                )
                .await?;
            } else {
                runs::delete(pool, run.id_run).await?;
            }
        }
        Ok(())
    }
}
