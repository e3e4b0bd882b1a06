//! The live-task registry and supervised launch path.

use std::collections::HashMap;
use std::fs::DirBuilder;
use std::os::unix::fs::{DirBuilderExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use serde_json::{Map, Value};
use thiserror::Error;
use tokio::process::Command;
use tracing::{info, warn};
use uuid::Uuid;

use taskview_core::{
    substitute_parameters, validate_and_normalize_parameters, validate_task_id,
    validate_task_name, write_text_atomic, ValidationError,
};

use crate::definition::TaskDefinition;
use crate::wrapper::render_wrapper_script;

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("invalid task name: {0}")]
    InvalidName(ValidationError),
    #[error("task '{0}' not found in configuration")]
    NotFound(String),
    #[error("parameter validation failed: {0}")]
    InvalidParameters(ValidationError),
    #[error("failed to create output directory: {0}")]
    CreateOutputDir(std::io::Error),
    #[error("failed to create wrapper script: {0}")]
    WriteWrapper(std::io::Error),
    #[error("failed to start task process: {0}")]
    Spawn(std::io::Error),
    #[error("task registry lock poisoned")]
    RegistryPoisoned,
}

impl LaunchError {
    /// True for the submission failures the caller reports as bad input
    /// rather than as a server fault.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::InvalidName(_) | Self::NotFound(_) | Self::InvalidParameters(_)
        )
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SupervisorError {
    #[error("invalid task ID format")]
    InvalidTaskId,
    #[error("task '{0}' not found")]
    NotFound(String),
    #[error("task registry lock poisoned")]
    RegistryPoisoned,
}

/// A currently running task, as tracked by the supervisor. Values handed out
/// by [`Supervisor::get`] and [`Supervisor::list`] are point-in-time copies.
#[derive(Debug, Clone)]
pub struct TaskSnapshot {
    pub id: Uuid,
    pub task_name: String,
    pub start_time: Instant,
    pub output_dir: PathBuf,
    pub max_execution_time: Duration,
    pub terminated: bool,
    pub killed: bool,
}

/// Which escalation step a timeout transition authorized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutStage {
    /// Soft signal: the task was freshly marked terminated.
    Term,
    /// Hard signal: the task was already terminated, still alive, and is now
    /// marked killed.
    Kill,
}

pub struct Supervisor {
    task_root: PathBuf,
    definitions: Vec<TaskDefinition>,
    running: RwLock<HashMap<Uuid, TaskSnapshot>>,
}

impl Supervisor {
    pub fn new(task_root: PathBuf, definitions: Vec<TaskDefinition>) -> Self {
        Self {
            task_root,
            definitions,
            running: RwLock::new(HashMap::new()),
        }
    }

    pub fn definitions(&self) -> &[TaskDefinition] {
        &self.definitions
    }

    /// Launches a predefined task as a detached background process and
    /// registers it. Returns the freshly allocated task id.
    pub fn launch(
        &self,
        task_name: &str,
        parameters: &Map<String, Value>,
    ) -> Result<Uuid, LaunchError> {
        validate_task_name(task_name).map_err(LaunchError::InvalidName)?;

        let definition = self
            .definitions
            .iter()
            .find(|definition| definition.name == task_name)
            .ok_or_else(|| LaunchError::NotFound(task_name.to_string()))?;

        let validated =
            validate_and_normalize_parameters(&definition.parameters, parameters)
                .map_err(LaunchError::InvalidParameters)?;
        let command = substitute_parameters(&definition.command, &validated);

        let task_id = Uuid::new_v4();
        let output_dir = self.task_root.join(task_id.to_string());
        DirBuilder::new()
            .recursive(true)
            .mode(0o700)
            .create(&output_dir)
            .map_err(LaunchError::CreateOutputDir)?;

        match self.start_wrapper(task_id, &output_dir, &command) {
            Ok(pid) => {
                info!(
                    task_id = %task_id,
                    task_name,
                    pid,
                    "task started"
                );
            }
            Err(error) => {
                // Best-effort cleanup of the partially created directory.
                if let Err(cleanup) = std::fs::remove_dir_all(&output_dir) {
                    warn!(
                        task_id = %task_id,
                        error = %cleanup,
                        "failed to remove output directory after launch failure"
                    );
                }
                return Err(error);
            }
        }

        let snapshot = TaskSnapshot {
            id: task_id,
            task_name: task_name.to_string(),
            start_time: Instant::now(),
            output_dir,
            max_execution_time: Duration::from_secs(definition.max_execution_time),
            terminated: false,
            killed: false,
        };
        let mut running = self
            .running
            .write()
            .map_err(|_| LaunchError::RegistryPoisoned)?;
        running.insert(task_id, snapshot);
        Ok(task_id)
    }

    fn start_wrapper(
        &self,
        task_id: Uuid,
        output_dir: &Path,
        command: &str,
    ) -> Result<u32, LaunchError> {
        let script_path = output_dir.join("run.sh");
        let script = render_wrapper_script(output_dir, command);
        std::fs::write(&script_path, script).map_err(LaunchError::WriteWrapper)?;
        std::fs::set_permissions(&script_path, std::fs::Permissions::from_mode(0o700))
            .map_err(LaunchError::WriteWrapper)?;

        let mut child_command = Command::new("bash");
        child_command.arg(&script_path);
        child_command.stdin(Stdio::null());
        child_command.stdout(Stdio::null());
        child_command.stderr(Stdio::null());
        // Detach into a fresh session so the task survives the gateway and
        // never touches the caller's controlling terminal.
        unsafe {
            child_command.pre_exec(|| {
                nix::unistd::setsid()
                    .map(|_| ())
                    .map_err(|errno| std::io::Error::from_raw_os_error(errno as i32))
            });
        }

        let mut child = child_command.spawn().map_err(LaunchError::Spawn)?;
        let pid = child.id().unwrap_or(0);

        // The wrapper writes its own pid as its first action, but recording
        // it here keeps attaches that race the script's first line informed.
        if pid > 0 {
            let pid_path = output_dir.join("pid");
            match write_text_atomic(&pid_path, &pid.to_string()) {
                Ok(()) => {
                    if let Err(error) = std::fs::set_permissions(
                        &pid_path,
                        std::fs::Permissions::from_mode(0o600),
                    ) {
                        warn!(task_id = %task_id, error = %error, "failed to restrict pid file");
                    }
                }
                Err(error) => {
                    warn!(task_id = %task_id, error = %error, "failed to write pid file");
                }
            }
        }

        // Reap in the background to avoid zombies; the wrapper self-records
        // pid and exit code, so the child's status is not needed here.
        tokio::spawn(async move {
            let _ = child.wait().await;
        });

        Ok(pid)
    }

    /// Looks up one running task by its rendered id.
    pub fn get(&self, task_id: &str) -> Result<TaskSnapshot, SupervisorError> {
        let id = validate_task_id(task_id).map_err(|_| SupervisorError::InvalidTaskId)?;
        let running = self
            .running
            .read()
            .map_err(|_| SupervisorError::RegistryPoisoned)?;
        running
            .get(&id)
            .cloned()
            .ok_or_else(|| SupervisorError::NotFound(task_id.to_string()))
    }

    /// Snapshot of every currently tracked task.
    pub fn list(&self) -> Vec<TaskSnapshot> {
        match self.running.read() {
            Ok(running) => running.values().cloned().collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Drops one task from the registry. Disk cleanup is the caller's job.
    pub fn remove(&self, task_id: &Uuid) -> Result<(), SupervisorError> {
        let mut running = self
            .running
            .write()
            .map_err(|_| SupervisorError::RegistryPoisoned)?;
        running.remove(task_id);
        Ok(())
    }

    /// Advances the timeout escalation for one task under the registry lock.
    ///
    /// The first call on a live task authorizes the soft signal and flips
    /// `terminated`. A later call (another deadline firing, or the grace
    /// timer) authorizes the hard signal only while the process is still
    /// alive and `killed` is unset. Anything else is a no-op, so concurrent
    /// attaches never re-signal.
    pub fn begin_timeout_stage(
        &self,
        task_id: &Uuid,
        process_alive: bool,
    ) -> Result<Option<TimeoutStage>, SupervisorError> {
        let mut running = self
            .running
            .write()
            .map_err(|_| SupervisorError::RegistryPoisoned)?;
        let Some(task) = running.get_mut(task_id) else {
            return Ok(None);
        };
        if !task.terminated {
            task.terminated = true;
            return Ok(Some(TimeoutStage::Term));
        }
        if !task.killed && process_alive {
            task.killed = true;
            return Ok(Some(TimeoutStage::Kill));
        }
        Ok(None)
    }

    /// Removes every tracked output directory. Used by the shutdown path
    /// after all sinks have been notified.
    pub fn cleanup_all(&self) {
        let tasks = self.list();
        info!(count = tasks.len(), "cleaning up task directories");
        for task in tasks {
            if let Err(error) = std::fs::remove_dir_all(&task.output_dir) {
                warn!(
                    task_id = %task.id,
                    error = %error,
                    "failed to clean up output directory"
                );
            }
        }
    }
}
