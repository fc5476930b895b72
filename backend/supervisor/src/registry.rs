//! Run registry: at most one installer run at a time.
//!
//! Starting a run terminates the previous one, resets the progress log, spawns
//! the installer on a fresh PTY and starts its relay and watcher. The watcher
//! reaps the child and appends the terminal record.

use boxinstall_core::record::{cancelled_record, done_record, error_record};
use boxinstall_core::{InstallError, OutputMode};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::kill_tree::KillTree;
use crate::progress_log::{ProgressLog, ProgressReader};
use crate::pty_supervisor::PtySupervisor;
use crate::relay::{OutputRelay, RelayEnd};
use crate::timeout_kill::TimeoutKill;

/// Default wait between SIGTERM and SIGKILL.
pub const DEFAULT_GRACE: Duration = Duration::from_secs(5);
/// Upper bound on waiting for a terminated run's watcher to finish.
const WATCHER_JOIN_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Running,
    Done,
    Failed,
    Cancelled,
    Superseded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RunOutcome {
    state: RunState,
    exit_code: Option<i32>,
}

/// Snapshot returned by the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct RunStatus {
    pub active: bool,
    pub run_id: Option<Uuid>,
    pub pid: Option<u32>,
    pub alive: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub state: RunState,
    pub exit_code: Option<i32>,
}

impl RunStatus {
    fn idle() -> Self {
        Self {
            active: false,
            run_id: None,
            pid: None,
            alive: false,
            started_at: None,
            state: RunState::Idle,
            exit_code: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct RunStarted {
    pub run_id: Uuid,
    pub pid: u32,
}

/// What readers need to describe a run.
#[derive(Clone)]
struct RunInfo {
    run_id: Uuid,
    pid: u32,
    started_at: DateTime<Utc>,
    outcome: watch::Receiver<RunOutcome>,
}

/// Registry-side handle. The master descriptor lives in the relay, not here.
struct RunHandle {
    info: RunInfo,
    cancel: Arc<AtomicBool>,
    superseded: Arc<AtomicBool>,
    reaped: Arc<AtomicBool>,
    watcher: JoinHandle<()>,
}

pub struct RunRegistry {
    log: ProgressLog,
    mode: OutputMode,
    grace: Duration,
    slot: Mutex<Option<RunHandle>>,
    current: RwLock<Option<RunInfo>>,
}

impl RunRegistry {
    pub fn new(log: ProgressLog, mode: OutputMode) -> Self {
        Self {
            log,
            mode,
            grace: DEFAULT_GRACE,
            slot: Mutex::new(None),
            current: RwLock::new(None),
        }
    }

    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    pub fn reader(&self) -> ProgressReader {
        self.log.reader()
    }

    /// Replace any current run with a new one.
    pub async fn start_run(&self, program: &str, args: &[String]) -> Result<RunStarted, InstallError> {
        let mut slot = self.slot.lock().await;

        if let Some(previous) = slot.take() {
            info!(run_id = %previous.info.run_id, pid = previous.info.pid, "Replacing active run");
            previous.superseded.store(true, Ordering::Release);
            self.terminate(previous).await;
        }

        let mut writer = self.log.begin_run();
        let process = match PtySupervisor::new(program).args(args.iter().cloned()).spawn() {
            Ok(process) => process,
            Err(e) => {
                error!(error = %e, program, "Failed to start installer");
                writer.append(error_record(&e.to_string(), None));
                writer.finish();
                *self.current.write().unwrap_or_else(PoisonError::into_inner) = None;
                return Err(e);
            }
        };

        let run_id = Uuid::new_v4();
        let pid = process.pid;
        let started_at = Utc::now();

        let relay = OutputRelay::new(process.master, writer, self.mode);
        let cancel = relay.cancel_handle();
        let superseded = Arc::new(AtomicBool::new(false));
        let reaped = Arc::new(AtomicBool::new(false));
        let (outcome_tx, outcome_rx) = watch::channel(RunOutcome {
            state: RunState::Running,
            exit_code: None,
        });

        let relay_task = tokio::task::spawn_blocking(move || relay.run());
        let mut child = process.child;
        let reaped_flag = Arc::clone(&reaped);
        let wait_task = tokio::task::spawn_blocking(move || {
            let status = child.wait();
            reaped_flag.store(true, Ordering::Release);
            status
        });

        let watcher = tokio::spawn(watch_run(
            run_id,
            pid,
            relay_task,
            wait_task,
            Arc::clone(&cancel),
            Arc::clone(&superseded),
            Arc::clone(&reaped),
            self.grace,
            outcome_tx,
        ));

        let info = RunInfo {
            run_id,
            pid,
            started_at,
            outcome: outcome_rx,
        };
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(info.clone());
        *slot = Some(RunHandle {
            info,
            cancel,
            superseded,
            reaped,
            watcher,
        });

        info!(%run_id, pid, "Installation run started");
        Ok(RunStarted { run_id, pid })
    }

    /// Cancel the current run. Returns `false` when nothing was running.
    ///
    /// The run stays visible through [`current_status`](Self::current_status)
    /// with state `cancelled`.
    pub async fn stop_run(&self) -> bool {
        let mut slot = self.slot.lock().await;
        let running = slot
            .as_ref()
            .map(|h| h.info.outcome.borrow().state == RunState::Running)
            .unwrap_or(false);
        if !running {
            return false;
        }
        if let Some(handle) = slot.take() {
            info!(run_id = %handle.info.run_id, "Cancelling run on request");
            self.terminate(handle).await;
        }
        true
    }

    /// Terminate the current run without recording it as cancelled.
    pub async fn shutdown(&self) {
        let mut slot = self.slot.lock().await;
        if let Some(handle) = slot.take() {
            handle.superseded.store(true, Ordering::Release);
            self.terminate(handle).await;
        }
    }

    /// Never waits on the registry lock.
    pub fn current_status(&self) -> RunStatus {
        let current = self.current.read().unwrap_or_else(PoisonError::into_inner);
        let Some(info) = current.as_ref() else {
            return RunStatus::idle();
        };
        let outcome = *info.outcome.borrow();
        let active = outcome.state == RunState::Running;
        RunStatus {
            active,
            run_id: Some(info.run_id),
            pid: Some(info.pid),
            alive: active && KillTree::is_alive(info.pid),
            started_at: Some(info.started_at),
            state: outcome.state,
            exit_code: outcome.exit_code,
        }
    }

    /// Wait until the current run has left the running state.
    ///
    /// Returns `false` on timeout. Returns `true` immediately when idle.
    pub async fn wait_finished(&self, limit: Duration) -> bool {
        let receiver = self
            .current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|info| info.outcome.clone());
        let Some(mut receiver) = receiver else {
            return true;
        };
        let finished = tokio::time::timeout(limit, receiver.wait_for(|o| o.state != RunState::Running))
            .await
            .is_ok();
        finished
    }

    async fn terminate(&self, mut handle: RunHandle) {
        let pid = handle.info.pid;
        handle.cancel.store(true, Ordering::Release);

        let reaped = Arc::clone(&handle.reaped);
        match TimeoutKill::terminate(pid, self.grace, || reaped.load(Ordering::Acquire)).await {
            Ok(how) => debug!(pid, termination = ?how, "Previous run terminated"),
            Err(e) => warn!(pid, error = %e, "Failed to terminate run"),
        }

        if tokio::time::timeout(WATCHER_JOIN_TIMEOUT, &mut handle.watcher)
            .await
            .is_err()
        {
            warn!(pid, "Run watcher did not finish in time; detaching");
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn watch_run(
    run_id: Uuid,
    pid: u32,
    relay_task: JoinHandle<crate::relay::RelayOutcome>,
    wait_task: JoinHandle<std::io::Result<ExitStatus>>,
    cancel: Arc<AtomicBool>,
    superseded: Arc<AtomicBool>,
    reaped: Arc<AtomicBool>,
    grace: Duration,
    outcome_tx: watch::Sender<RunOutcome>,
) {
    let relayed = match relay_task.await {
        Ok(outcome) => Some(outcome),
        Err(e) => {
            error!(%run_id, error = %e, "Output relay task panicked");
            None
        }
    };

    // Nobody drains the terminal any more; make sure the installer cannot
    // linger behind a dead relay.
    let relay_failed = !matches!(
        relayed.as_ref().map(|o| &o.end),
        Some(RelayEnd::Eof | RelayEnd::SlaveClosed | RelayEnd::Cancelled)
    );
    if relay_failed && !cancel.load(Ordering::Acquire) {
        if let Err(e) = TimeoutKill::terminate(pid, grace, || reaped.load(Ordering::Acquire)).await {
            warn!(%run_id, error = %e, "Failed to stop installer after relay failure");
        }
    }

    let status = match wait_task.await {
        Ok(Ok(status)) => Some(status),
        Ok(Err(e)) => {
            warn!(%run_id, error = %e, "Failed to reap installer");
            None
        }
        Err(e) => {
            warn!(%run_id, error = %e, "Reaper task panicked");
            None
        }
    };
    let exit_code = status.and_then(|s| s.code());

    let (state, record) = if superseded.load(Ordering::Acquire) {
        (RunState::Superseded, None)
    } else if cancel.load(Ordering::Acquire) {
        (RunState::Cancelled, Some(cancelled_record()))
    } else if relay_failed {
        // The relay already appended its error record.
        (RunState::Failed, None)
    } else {
        match status {
            Some(s) if s.success() => (RunState::Done, Some(done_record())),
            Some(s) => {
                let message = match (s.code(), s.signal()) {
                    (Some(code), _) => format!("Installer exited with code {code}"),
                    (None, Some(signal)) => format!("Installer killed by signal {signal}"),
                    (None, None) => "Installer exited abnormally".to_string(),
                };
                (RunState::Failed, Some(error_record(&message, s.code())))
            }
            None => (
                RunState::Failed,
                Some(error_record("Installer exit status unknown", None)),
            ),
        }
    };

    if let Some(mut writer) = relayed.map(|o| o.writer) {
        if let Some(record) = record {
            if !writer.append(record) {
                debug!(%run_id, "Run superseded; terminal record dropped");
            }
        }
        writer.finish();
    }

    info!(%run_id, pid, state = ?state, exit_code, "Installation run finished");
    let _ = outcome_tx.send(RunOutcome { state, exit_code });
}

#[cfg(test)]
mod tests {
    use super::*;
    use boxinstall_core::record::terminal_status;
    use boxinstall_core::RecordStatus;
    use serde_json::json;

    fn registry() -> RunRegistry {
        RunRegistry::new(ProgressLog::new(100), OutputMode::Json).with_grace(Duration::from_secs(2))
    }

    fn sh(script: &str) -> Vec<String> {
        vec!["-c".to_string(), script.to_string()]
    }

    #[tokio::test]
    async fn idle_before_any_run() {
        let reg = registry();
        let status = reg.current_status();
        assert!(!status.active);
        assert_eq!(status.state, RunState::Idle);
        assert!(reg.reader().snapshot().is_empty());
        assert!(!reg.stop_run().await);
    }

    #[tokio::test]
    async fn output_in_order_then_done() {
        let reg = registry();
        reg.start_run("/bin/sh", &sh("printf 'A\\n'; printf 'B\\n'"))
            .await
            .unwrap();
        assert!(reg.wait_finished(Duration::from_secs(10)).await);

        let records = reg.reader().snapshot();
        assert_eq!(records[0], json!({ "message": "A" }));
        assert_eq!(records[1], json!({ "message": "B" }));
        assert_eq!(records.last().unwrap(), &done_record());

        let status = reg.current_status();
        assert!(!status.active);
        assert_eq!(status.state, RunState::Done);
        assert_eq!(status.exit_code, Some(0));
    }

    #[tokio::test]
    async fn nonzero_exit_appends_error_with_code() {
        let reg = registry();
        reg.start_run("/bin/sh", &sh("echo failing; exit 3")).await.unwrap();
        assert!(reg.wait_finished(Duration::from_secs(10)).await);

        let last = reg.reader().last().unwrap();
        assert_eq!(terminal_status(&last), Some(RecordStatus::Error));
        assert_eq!(last["exit_code"], 3);
        assert_eq!(reg.current_status().state, RunState::Failed);
    }

    #[tokio::test]
    async fn second_run_replaces_first() {
        let reg = registry();
        let first = reg.start_run("sleep", &["30".to_string()]).await.unwrap();
        assert!(reg.current_status().alive);

        let second = reg.start_run("sleep", &["30".to_string()]).await.unwrap();
        assert_ne!(first.run_id, second.run_id);
        assert!(!KillTree::is_alive(first.pid));

        let status = reg.current_status();
        assert_eq!(status.run_id, Some(second.run_id));
        assert!(status.alive);
        // Nothing from the first run leaks into the new log.
        assert!(reg
            .reader()
            .snapshot()
            .iter()
            .all(|r| terminal_status(r).is_none()));

        reg.shutdown().await;
    }

    #[tokio::test]
    async fn stop_appends_cancelled_record() {
        let reg = registry();
        let started = reg.start_run("sleep", &["30".to_string()]).await.unwrap();
        assert!(reg.stop_run().await);

        let last = reg.reader().last().unwrap();
        assert_eq!(terminal_status(&last), Some(RecordStatus::Cancelled));
        assert!(!KillTree::is_alive(started.pid));

        let status = reg.current_status();
        assert_eq!(status.state, RunState::Cancelled);
        assert!(!status.active);
        assert!(!reg.stop_run().await);
    }

    #[tokio::test]
    async fn missing_program_fails_without_registering() {
        let reg = registry();
        let err = reg
            .start_run("definitely-not-an-installer-binary", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, InstallError::Spawn(_)));
        assert_eq!(reg.current_status().state, RunState::Idle);
        let last = reg.reader().last().unwrap();
        assert_eq!(terminal_status(&last), Some(RecordStatus::Error));
    }
}
