use crate::engine::{PlaybackIntent, SpeechEngine};
use crate::request::SpeechRequest;
use chrono::Utc;
use serde_json::Value;
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskId(String);

impl TaskId {
    /// Timestamp, process-local sequence number and a random suffix.
    pub fn generate() -> Self {
        let seq = SEQUENCE.fetch_add(1, Ordering::Relaxed);
        TaskId(format!(
            "{}-{}-{:08x}",
            Utc::now().format("%Y%m%dT%H%M%S%3f"),
            seq,
            rand::random::<u32>()
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How a detached run ended. `code` is the exit code the same failure would
/// have produced on the command line.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskStatus {
    Succeeded(PathBuf),
    Failed { code: u8, message: String },
}

#[derive(Debug)]
struct TaskCompletion {
    task_id: TaskId,
    rpc_id: Value,
    status: TaskStatus,
    started: Instant,
}

#[derive(Debug, Default)]
struct Counters {
    launched: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorStats {
    pub launched: u64,
    pub succeeded: u64,
    pub failed: u64,
}

impl SupervisorStats {
    pub fn finished(&self) -> u64 {
        self.succeeded + self.failed
    }
}

/// Starts speech runs detached from the request that asked for them.
#[derive(Clone)]
pub struct TaskSupervisor {
    engine: SpeechEngine,
    intent: PlaybackIntent,
    completions: UnboundedSender<TaskCompletion>,
    counters: Arc<Counters>,
}

impl TaskSupervisor {
    /// Must be called from within a tokio runtime; spawns the observer.
    pub fn new(engine: SpeechEngine, intent: PlaybackIntent) -> Self {
        let (tx, rx) = unbounded_channel();
        let counters = Arc::new(Counters::default());
        tokio::spawn(observe(rx, counters.clone()));
        Self {
            engine,
            intent,
            completions: tx,
            counters,
        }
    }

    /// Starts `request` and returns immediately.
    ///
    /// Fire-and-forget: the run's outcome is logged and counted here and is
    /// never delivered to whoever issued `rpc_id`. Runs are not ordered
    /// against each other and may play over one another.
    pub fn launch(&self, request: SpeechRequest, rpc_id: Value) -> TaskId {
        let task_id = TaskId::generate();
        self.counters.launched.fetch_add(1, Ordering::Relaxed);
        tracing::info!(task = %task_id, rpc_id = %rpc_id, "Launching speech task");

        let engine = self.engine.clone();
        let intent = self.intent.clone();
        let started = Instant::now();
        let run = tokio::spawn(async move { engine.run(&request, &intent).await });

        let tx = self.completions.clone();
        let watched = task_id.clone();
        tokio::spawn(async move {
            let status = match run.await {
                Ok(Ok(path)) => TaskStatus::Succeeded(path),
                Ok(Err(e)) => TaskStatus::Failed {
                    code: e.exit_code(),
                    message: e.to_string(),
                },
                Err(join) => TaskStatus::Failed {
                    code: 1,
                    message: format!("task aborted: {}", join),
                },
            };
            let _ = tx.send(TaskCompletion {
                task_id: watched,
                rpc_id,
                status,
                started,
            });
        });

        task_id
    }

    pub fn stats(&self) -> SupervisorStats {
        SupervisorStats {
            launched: self.counters.launched.load(Ordering::Relaxed),
            succeeded: self.counters.succeeded.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }
}

async fn observe(mut rx: UnboundedReceiver<TaskCompletion>, counters: Arc<Counters>) {
    while let Some(done) = rx.recv().await {
        let elapsed_ms = done.started.elapsed().as_millis() as u64;
        match &done.status {
            TaskStatus::Succeeded(path) => {
                counters.succeeded.fetch_add(1, Ordering::Relaxed);
                tracing::info!(
                    task = %done.task_id,
                    rpc_id = %done.rpc_id,
                    path = %path.display(),
                    elapsed_ms,
                    "Speech task finished"
                );
            }
            TaskStatus::Failed { code, message } => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                tracing::error!(
                    task = %done.task_id,
                    rpc_id = %done.rpc_id,
                    code,
                    elapsed_ms,
                    "Speech task failed: {}",
                    message
                );
            }
        }
    }
}
