use crate::{
    workers::{CommandId, CommandStatus, WorkerPool, WorkerStatus},
    CoordinatorError,
};

use async_trait::async_trait;
use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Mutex,
};

/// A worker pool returning scripted results, recording every interaction
/// for assertions.
pub struct ScriptedWorkerPool {
    output: Mutex<String>,
    fail_start: AtomicBool,
    fail_command: AtomicBool,
    started: Mutex<Vec<String>>,
    stopped: Mutex<Vec<String>>,
    commands: Mutex<Vec<Vec<String>>>,
    next_id: AtomicU64,
}

impl Default for ScriptedWorkerPool {
    fn default() -> Self {
        Self {
            output: Mutex::new("[INFO]  snarkJS: ZKey Ok!\n".to_string()),
            fail_start: AtomicBool::new(false),
            fail_command: AtomicBool::new(false),
            started: Mutex::new(Vec::new()),
            stopped: Mutex::new(Vec::new()),
            commands: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
        }
    }
}

impl ScriptedWorkerPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts the combined output every command will produce.
    pub fn set_output(&self, output: &str) {
        *self.output.lock().unwrap() = output.to_string();
    }

    /// Makes every subsequent worker start fail.
    pub fn fail_start(&self) {
        self.fail_start.store(true, Ordering::SeqCst);
    }

    /// Makes every subsequent command report failure.
    pub fn fail_command(&self) {
        self.fail_command.store(true, Ordering::SeqCst);
    }

    pub fn started(&self) -> Vec<String> {
        self.started.lock().unwrap().clone()
    }

    pub fn stopped(&self) -> Vec<String> {
        self.stopped.lock().unwrap().clone()
    }

    pub fn commands(&self) -> Vec<Vec<String>> {
        self.commands.lock().unwrap().clone()
    }
}

#[async_trait]
impl WorkerPool for ScriptedWorkerPool {
    async fn start(&self, instance_id: &str) -> Result<(), CoordinatorError> {
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(CoordinatorError::WorkerStartFailed(instance_id.to_string()));
        }
        self.started.lock().unwrap().push(instance_id.to_string());
        Ok(())
    }

    async fn status(&self, _instance_id: &str) -> Result<WorkerStatus, CoordinatorError> {
        Ok(WorkerStatus::Running)
    }

    async fn run_command(&self, _instance_id: &str, commands: &[String]) -> Result<CommandId, CoordinatorError> {
        self.commands.lock().unwrap().push(commands.to_vec());
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        Ok(format!("command-{:08}", n))
    }

    async fn command_status(&self, _instance_id: &str, _command_id: &str) -> Result<CommandStatus, CoordinatorError> {
        match self.fail_command.load(Ordering::SeqCst) {
            true => Ok(CommandStatus::Failed),
            false => Ok(CommandStatus::Succeeded),
        }
    }

    async fn fetch_output(&self, _instance_id: &str, _command_id: &str) -> Result<String, CoordinatorError> {
        Ok(self.output.lock().unwrap().clone())
    }

    async fn stop(&self, instance_id: &str) -> Result<(), CoordinatorError> {
        self.stopped.lock().unwrap().push(instance_id.to_string());
        Ok(())
    }
}
