use crate::CoordinatorError;

use async_trait::async_trait;
use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
        Mutex,
    },
};
use tokio::process::Command;
use tracing::{debug, warn};

pub type CommandId = String;

/// The probe-visible state of a worker.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum WorkerStatus {
    Pending,
    Running,
    Stopped,
}

/// The state of a command script dispatched to a worker.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum CommandStatus {
    InProgress,
    Succeeded,
    Failed,
}

/// A controller over isolated compute workers, keyed by worker identifier.
///
/// Worker identifiers are persisted in circuit documents, so a worker left
/// running by an aborted handler can always be reaped later.
#[async_trait]
pub trait WorkerPool: Send + Sync {
    /// Starts the worker with the given identifier.
    async fn start(&self, instance_id: &str) -> Result<(), CoordinatorError>;

    /// Probes the worker's readiness.
    async fn status(&self, instance_id: &str) -> Result<WorkerStatus, CoordinatorError>;

    /// Executes an ordered command script on the worker and returns a
    /// command identifier for polling.
    async fn run_command(&self, instance_id: &str, commands: &[String]) -> Result<CommandId, CoordinatorError>;

    /// Returns the state of a previously dispatched command script.
    async fn command_status(&self, instance_id: &str, command_id: &str) -> Result<CommandStatus, CoordinatorError>;

    /// Returns the combined output of a completed command script.
    async fn fetch_output(&self, instance_id: &str, command_id: &str) -> Result<String, CoordinatorError>;

    /// Stops the worker. Best-effort; attempted on every handler exit path.
    async fn stop(&self, instance_id: &str) -> Result<(), CoordinatorError>;
}

#[derive(Debug, Clone)]
struct CommandRecord {
    status: CommandStatus,
    output: String,
}

/// A worker pool that executes command scripts on the local host.
///
/// Development stand-in for the isolated-VM controller: `start`/`stop`
/// only track liveness, and `run_command` runs the script through the
/// local shell.
#[derive(Default)]
pub struct LocalWorkerPool {
    running: Mutex<HashSet<String>>,
    commands: Arc<Mutex<HashMap<CommandId, CommandRecord>>>,
    next_id: AtomicU64,
}

impl LocalWorkerPool {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkerPool for LocalWorkerPool {
    async fn start(&self, instance_id: &str) -> Result<(), CoordinatorError> {
        debug!("Starting local worker {}", instance_id);
        self.running.lock().unwrap().insert(instance_id.to_string());
        Ok(())
    }

    async fn status(&self, instance_id: &str) -> Result<WorkerStatus, CoordinatorError> {
        match self.running.lock().unwrap().contains(instance_id) {
            true => Ok(WorkerStatus::Running),
            false => Ok(WorkerStatus::Stopped),
        }
    }

    async fn run_command(&self, instance_id: &str, commands: &[String]) -> Result<CommandId, CoordinatorError> {
        if !self.running.lock().unwrap().contains(instance_id) {
            return Err(CoordinatorError::WorkerUnavailable(
                instance_id.to_string(),
                "worker is not running".to_string(),
            ));
        }

        let command_id = format!("command-{:08}", self.next_id.fetch_add(1, Ordering::SeqCst));
        let script = commands.join(" && ");
        debug!("Dispatching to local worker {}: {}", instance_id, script);

        {
            let mut records = self.commands.lock().unwrap();
            records.insert(command_id.clone(), CommandRecord {
                status: CommandStatus::InProgress,
                output: String::new(),
            });
        }

        let records = Arc::clone(&self.commands);
        let id = command_id.clone();
        tokio::spawn(async move {
            let outcome = Command::new("sh").arg("-c").arg(&script).output().await;
            let record = match outcome {
                Ok(output) => {
                    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
                    combined.push_str(&String::from_utf8_lossy(&output.stderr));
                    CommandRecord {
                        status: match output.status.success() {
                            true => CommandStatus::Succeeded,
                            false => CommandStatus::Failed,
                        },
                        output: combined,
                    }
                }
                Err(error) => {
                    warn!("Local worker command failed to spawn: {}", error);
                    CommandRecord {
                        status: CommandStatus::Failed,
                        output: error.to_string(),
                    }
                }
            };
            records.lock().unwrap().insert(id, record);
        });

        Ok(command_id)
    }

    async fn command_status(&self, instance_id: &str, command_id: &str) -> Result<CommandStatus, CoordinatorError> {
        let records = self.commands.lock().unwrap();
        match records.get(command_id) {
            Some(record) => Ok(record.status),
            None => Err(CoordinatorError::CommandFailed(
                command_id.to_string(),
                instance_id.to_string(),
            )),
        }
    }

    async fn fetch_output(&self, instance_id: &str, command_id: &str) -> Result<String, CoordinatorError> {
        let records = self.commands.lock().unwrap();
        match records.get(command_id) {
            Some(record) => Ok(record.output.clone()),
            None => Err(CoordinatorError::CommandFailed(
                command_id.to_string(),
                instance_id.to_string(),
            )),
        }
    }

    async fn stop(&self, instance_id: &str) -> Result<(), CoordinatorError> {
        debug!("Stopping local worker {}", instance_id);
        self.running.lock().unwrap().remove(instance_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    #[tokio::test]
    async fn test_local_worker_runs_script() {
        let pool = LocalWorkerPool::new();
        pool.start("vm-1").await.unwrap();
        assert_eq!(WorkerStatus::Running, pool.status("vm-1").await.unwrap());

        let command_id = pool
            .run_command("vm-1", &["echo $((40 + 2))".to_string()])
            .await
            .unwrap();
        loop {
            match pool.command_status("vm-1", &command_id).await.unwrap() {
                CommandStatus::InProgress => tokio::time::sleep(Duration::from_millis(10)).await,
                status => {
                    assert_eq!(CommandStatus::Succeeded, status);
                    break;
                }
            }
        }
        let output = pool.fetch_output("vm-1", &command_id).await.unwrap();
        assert!(output.contains("42"));

        pool.stop("vm-1").await.unwrap();
        assert_eq!(WorkerStatus::Stopped, pool.status("vm-1").await.unwrap());
    }

    #[tokio::test]
    async fn test_run_command_requires_started_worker() {
        let pool = LocalWorkerPool::new();
        assert!(pool.run_command("vm-2", &["true".to_string()]).await.is_err());
    }
}
