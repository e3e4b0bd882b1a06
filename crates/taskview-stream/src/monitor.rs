//! The per-attach timeout and liveness engine.
//!
//! One monitor runs per attached viewer. It waits for the task's pid file,
//! probes liveness once per second, and enforces the configured deadline by
//! sequencing a soft signal, a grace window, and a hard signal. The
//! `terminated`/`killed` flags live in the supervisor entry and flip only
//! under its lock, so concurrent attaches never re-signal.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use taskview_supervisor::{
    is_process_alive, read_exit_code, read_pid_file, send_sigkill, send_sigterm, Supervisor,
    TimeoutStage,
};

use crate::frame::Frame;
use crate::sink::FrameSink;

/// Engine timings. The defaults are the service contract; tests shrink them.
#[derive(Debug, Clone)]
pub struct MonitorTimings {
    pub pid_wait: Duration,
    pub pid_poll: Duration,
    pub liveness_poll: Duration,
    pub grace: Duration,
    pub flush_pause: Duration,
    pub delete_delay: Duration,
}

impl Default for MonitorTimings {
    fn default() -> Self {
        Self {
            pid_wait: Duration::from_secs(60),
            pid_poll: Duration::from_secs(1),
            liveness_poll: Duration::from_secs(1),
            grace: Duration::from_secs(30),
            flush_pause: Duration::from_secs(2),
            delete_delay: Duration::from_secs(1),
        }
    }
}

enum MonitorState {
    Running,
    Terminated,
    Killed,
}

/// Supervises one task on behalf of one attached viewer until the process
/// ends, emitting timeout and completion notices onto the shared sink and
/// reclaiming the task's on-disk state afterwards.
pub async fn monitor_task(
    cancel: CancellationToken,
    sink: Arc<dyn FrameSink>,
    supervisor: Arc<Supervisor>,
    task_id: Uuid,
    output_dir: PathBuf,
    max_execution_time: Duration,
    timings: MonitorTimings,
) {
    let output_dir = output_dir.as_path();
    let pid_path = output_dir.join("pid");
    let exit_code_path = output_dir.join("exitcode");

    let Some(pid) = wait_for_pid(&cancel, &pid_path, &timings).await else {
        debug!(task_id = %task_id, "pid never appeared; task did not start");
        return;
    };
    debug!(task_id = %task_id, pid, "monitoring process");

    let mut state = MonitorState::Running;
    let mut stage_deadline = (max_execution_time > Duration::ZERO)
        .then(|| Instant::now() + max_execution_time);
    // First liveness probe after one full period, so tailers draining a
    // short-lived task get ahead of the completion notice.
    let mut liveness = tokio::time::interval_at(
        Instant::now() + timings.liveness_poll,
        timings.liveness_poll,
    );
    liveness.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        let wake = stage_deadline.unwrap_or_else(|| Instant::now() + Duration::from_secs(3600));
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = liveness.tick() => {
                if !is_process_alive(pid) {
                    finish(
                        &cancel,
                        sink.as_ref(),
                        &supervisor,
                        task_id,
                        output_dir,
                        &exit_code_path,
                        pid,
                        &timings,
                    )
                    .await;
                    return;
                }
            }
            _ = tokio::time::sleep_until(wake), if stage_deadline.is_some() => {
                match state {
                    MonitorState::Running => {
                        match supervisor.begin_timeout_stage(&task_id, is_process_alive(pid)) {
                            Ok(Some(TimeoutStage::Term)) => {
                                info!(task_id = %task_id, pid, "deadline exceeded, sending SIGTERM");
                                let _ = sink
                                    .send(&Frame::system(
                                        "Process exceeded maximum execution time. \
                                         Sending SIGTERM (graceful shutdown)...",
                                        Some(pid),
                                    ))
                                    .await;
                                send_sigterm(pid);
                                state = MonitorState::Terminated;
                                stage_deadline = Some(Instant::now() + timings.grace);
                            }
                            Ok(Some(TimeoutStage::Kill)) => {
                                // Another attach already sent the soft signal;
                                // skip straight to the hard one.
                                info!(task_id = %task_id, pid, "deadline exceeded, sending SIGKILL");
                                let _ = sink
                                    .send(&Frame::system(
                                        "Process exceeded maximum execution time. \
                                         Sending SIGKILL...",
                                        Some(pid),
                                    ))
                                    .await;
                                send_sigkill(pid);
                                state = MonitorState::Killed;
                                stage_deadline = None;
                            }
                            Ok(None) => {
                                stage_deadline = None;
                            }
                            Err(error) => {
                                warn!(task_id = %task_id, error = %error, "timeout transition failed");
                                stage_deadline = None;
                            }
                        }
                    }
                    MonitorState::Terminated => {
                        match supervisor.begin_timeout_stage(&task_id, is_process_alive(pid)) {
                            Ok(Some(TimeoutStage::Kill)) => {
                                info!(
                                    task_id = %task_id,
                                    pid,
                                    "process survived the grace window, sending SIGKILL"
                                );
                                let _ = sink
                                    .send(&Frame::system(
                                        "Process did not terminate after SIGTERM. \
                                         Sending SIGKILL...",
                                        Some(pid),
                                    ))
                                    .await;
                                send_sigkill(pid);
                            }
                            Ok(_) => {}
                            Err(error) => {
                                warn!(task_id = %task_id, error = %error, "timeout transition failed");
                            }
                        }
                        state = MonitorState::Killed;
                        stage_deadline = None;
                    }
                    MonitorState::Killed => {
                        stage_deadline = None;
                    }
                }
            }
        }
    }
}

async fn wait_for_pid(
    cancel: &CancellationToken,
    pid_path: &Path,
    timings: &MonitorTimings,
) -> Option<u32> {
    let attempts = (timings.pid_wait.as_millis() / timings.pid_poll.as_millis().max(1)).max(1);
    for _ in 0..attempts {
        if let Some(pid) = read_pid_file(pid_path) {
            return Some(pid);
        }
        tokio::select! {
            _ = cancel.cancelled() => return None,
            _ = tokio::time::sleep(timings.pid_poll) => {}
        }
    }
    read_pid_file(pid_path)
}

/// The Done sequence: completion notice, a short pause for in-flight lines,
/// registry removal, sink close, and finally the recursive delete.
#[allow(clippy::too_many_arguments)]
async fn finish(
    cancel: &CancellationToken,
    sink: &dyn FrameSink,
    supervisor: &Supervisor,
    task_id: Uuid,
    output_dir: &Path,
    exit_code_path: &Path,
    pid: u32,
    timings: &MonitorTimings,
) {
    let exit_code = read_exit_code(exit_code_path);
    info!(task_id = %task_id, pid, exit_code, "process ended");
    let _ = sink
        .send(&Frame::system(
            format!("Process ended with exit code: {exit_code}"),
            Some(pid),
        ))
        .await;

    // Let the tailers flush what the wrapper wrote last.
    tokio::time::sleep(timings.flush_pause).await;

    if let Err(error) = supervisor.remove(&task_id) {
        warn!(task_id = %task_id, error = %error, "failed to drop task from registry");
    }
    sink.close().await;
    cancel.cancel();

    tokio::time::sleep(timings.delete_delay).await;
    if let Err(error) = tokio::fs::remove_dir_all(output_dir).await {
        warn!(
            task_id = %task_id,
            error = %error,
            "failed to clean up output directory"
        );
    } else {
        debug!(task_id = %task_id, "output directory removed");
    }
}
