// The execution-dispatch engine.
//
// Admission is guarded twice: a bounded FIFO queue feeding a fixed worker
// pool caps pending work and the number of open workspaces, while a
// separate slot semaphore caps concurrent container launches. The two
// limits are independent so a deployment can throttle the container
// runtime below (or above) worker-pool parallelism.
//
// Every submitted job resolves exactly once: rejected synchronously at
// enqueue when the queue is full, or completed through its private
// one-shot channel. Workers survive panicking jobs; each iteration runs
// the job in its own task and converts a panic into a failure result.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use crucible_common::config::Config;
use crucible_common::types::{BatchExecuteRequest, ExecuteRequest};
use tokio::sync::{mpsc, oneshot, Mutex, Semaphore};
use tokio::time::Instant as TokioInstant;
use tracing::{debug, info};

use crate::batch::{BatchOutcome, BatchRunner};
use crate::docker::{ContainerRuntime, DockerCli};
use crate::error::ExecError;
use crate::metrics;
use crate::registry::LanguageRegistry;
use crate::sandbox::SandboxLauncher;
use crate::stats::{ExecutionStats, StatsSink};
use crate::validate;
use crate::workspace::Workspace;

const STATS_BUFFER: usize = 1000;

/// Result of a single-input execution. `error` carries timeout or
/// runtime failure alongside the captured output.
#[derive(Debug)]
pub struct SingleOutcome {
    pub output: String,
    pub error: Option<ExecError>,
    pub duration_ms: u64,
    pub memory_used_kb: Option<i64>,
}

#[derive(Debug)]
pub enum JobOutcome {
    Single(SingleOutcome),
    Batch(BatchOutcome),
}

impl JobOutcome {
    fn error(&self) -> Option<&ExecError> {
        match self {
            JobOutcome::Single(single) => single.error.as_ref(),
            JobOutcome::Batch(_) => None,
        }
    }
}

enum JobPayload {
    Single(ExecuteRequest),
    Batch(BatchExecuteRequest),
}

impl JobPayload {
    fn language(&self) -> &str {
        match self {
            JobPayload::Single(req) => &req.language,
            JobPayload::Batch(req) => &req.language,
        }
    }

    fn code_len(&self) -> usize {
        match self {
            JobPayload::Single(req) => req.code.len(),
            JobPayload::Batch(req) => req.code.len(),
        }
    }
}

/// Internal envelope carried from submit to a worker.
struct ExecutionJob {
    id: String,
    payload: JobPayload,
    timeout: Duration,
    reply: oneshot::Sender<Result<JobOutcome, ExecError>>,
}

struct EngineCore {
    config: Config,
    registry: LanguageRegistry,
    runtime: Arc<dyn ContainerRuntime>,
    launcher: SandboxLauncher,
    batch: BatchRunner,
    slots: Arc<Semaphore>,
    stats: StatsSink,
}

/// The dispatch engine. Created once at startup and shared with the HTTP
/// adapter; tests construct their own instances against a stub runtime.
pub struct Dispatcher {
    queue_tx: mpsc::Sender<ExecutionJob>,
    core: Arc<EngineCore>,
}

impl Dispatcher {
    /// Build a dispatcher over an arbitrary container runtime and start
    /// its worker pool. Must run inside a tokio runtime.
    pub fn new(config: Config, runtime: Arc<dyn ContainerRuntime>) -> Self {
        let (queue_tx, queue_rx) = mpsc::channel(config.max_queue_size.max(1));
        let core = Arc::new(EngineCore {
            registry: LanguageRegistry::builtin(),
            launcher: SandboxLauncher::new(runtime.clone(), config.sandbox_image.clone()),
            batch: BatchRunner::new(runtime.clone(), config.sandbox_image.clone()),
            slots: Arc::new(Semaphore::new(config.max_concurrent)),
            stats: StatsSink::spawn(STATS_BUFFER),
            runtime,
            config,
        });

        let queue_rx = Arc::new(Mutex::new(queue_rx));
        for worker_id in 0..core.config.max_workers {
            tokio::spawn(worker_loop(worker_id, core.clone(), queue_rx.clone()));
        }
        info!(
            workers = core.config.max_workers,
            queue = core.config.max_queue_size,
            slots = core.config.max_concurrent,
            "dispatch engine started"
        );

        Self { queue_tx, core }
    }

    /// Dispatcher over the real docker CLI runtime.
    pub fn with_docker(config: Config) -> Self {
        Self::new(config, Arc::new(DockerCli::new()))
    }

    pub fn stats(&self) -> &StatsSink {
        &self.core.stats
    }

    /// Submit a single-input execution and wait for its result.
    pub async fn submit_single(&self, req: ExecuteRequest) -> Result<SingleOutcome, ExecError> {
        validate::validate_execute(&self.core.registry, &req)?;
        let timeout = self.core.config.exec_timeout;
        match self.submit(JobPayload::Single(req), timeout).await? {
            JobOutcome::Single(outcome) => Ok(outcome),
            JobOutcome::Batch(_) => Err(ExecError::Internal(
                "batch outcome for single job".to_string(),
            )),
        }
    }

    /// Submit a batch execution and wait for its result.
    pub async fn submit_batch(&self, req: BatchExecuteRequest) -> Result<BatchOutcome, ExecError> {
        validate::validate_batch(&self.core.registry, &req)?;
        let timeout = self.core.config.batch_timeout;
        match self.submit(JobPayload::Batch(req), timeout).await? {
            JobOutcome::Batch(outcome) => Ok(outcome),
            JobOutcome::Single(_) => Err(ExecError::Internal(
                "single outcome for batch job".to_string(),
            )),
        }
    }

    async fn submit(
        &self,
        payload: JobPayload,
        timeout: Duration,
    ) -> Result<JobOutcome, ExecError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let job = ExecutionJob {
            id: next_job_id(),
            payload,
            timeout,
            reply: reply_tx,
        };

        // Non-blocking enqueue: a full queue is reported to the caller
        // immediately instead of building up latency.
        match self.queue_tx.try_send(job) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => return Err(ExecError::QueueFull),
            Err(mpsc::error::TrySendError::Closed(_)) => {
                return Err(ExecError::Internal("dispatch engine stopped".to_string()))
            }
        }

        match reply_rx.await {
            Ok(result) => result,
            Err(_) => Err(ExecError::Internal(
                "worker dropped completion channel".to_string(),
            )),
        }
    }
}

async fn worker_loop(
    worker_id: usize,
    core: Arc<EngineCore>,
    queue_rx: Arc<Mutex<mpsc::Receiver<ExecutionJob>>>,
) {
    loop {
        let job = { queue_rx.lock().await.recv().await };
        let Some(job) = job else { break };

        debug!(worker = worker_id, job_id = %job.id, "job dequeued");
        let deadline = TokioInstant::now() + job.timeout;

        // Race slot acquisition against the job deadline; an overloaded
        // runtime must not make a job wait past its own budget.
        let permit = tokio::select! {
            permit = core.slots.clone().acquire_owned() => match permit {
                Ok(permit) => Some(permit),
                Err(_) => break,
            },
            _ = tokio::time::sleep_until(deadline) => None,
        };

        match permit {
            Some(permit) => {
                run_admitted(&core, job, deadline).await;
                drop(permit);
            }
            None => {
                let ExecutionJob { id, payload, reply, .. } = job;
                let now = SystemTime::now();
                core.stats.record(ExecutionStats {
                    job_id: id,
                    language: payload.language().to_string(),
                    code_size: payload.code_len(),
                    start_time: now,
                    end_time: now,
                    success: false,
                    error_message: Some("timed out waiting for an execution slot".to_string()),
                });
                let _ = reply.send(Err(ExecError::Timeout));
            }
        }
    }
    debug!(worker = worker_id, "worker stopped");
}

/// Execute a job that holds a slot, then publish its result and exactly
/// one stats record. The job body runs in its own task so a panic inside
/// it cannot take down the worker.
async fn run_admitted(core: &Arc<EngineCore>, job: ExecutionJob, deadline: TokioInstant) {
    let ExecutionJob { id, payload, reply, .. } = job;
    let language = payload.language().to_string();
    let code_size = payload.code_len();
    let start_time = SystemTime::now();

    let handle = tokio::spawn(execute_job(core.clone(), id.clone(), payload, deadline));
    let result = match handle.await {
        Ok(result) => result,
        Err(join_err) => Err(ExecError::Internal(format!(
            "execution task panicked: {join_err}"
        ))),
    };

    let (success, error_message) = match &result {
        Ok(outcome) => match outcome.error() {
            None => (true, None),
            Some(err) => (false, Some(err.to_string())),
        },
        Err(err) => (false, Some(err.to_string())),
    };
    core.stats.record(ExecutionStats {
        job_id: id,
        language,
        code_size,
        start_time,
        end_time: SystemTime::now(),
        success,
        error_message,
    });

    let _ = reply.send(result);
}

async fn execute_job(
    core: Arc<EngineCore>,
    job_id: String,
    payload: JobPayload,
    deadline: TokioInstant,
) -> Result<JobOutcome, ExecError> {
    core.runtime.ensure_available().await?;
    let spec = core.registry.resolve(payload.language())?;

    match payload {
        JobPayload::Single(req) => {
            let workspace = Workspace::create(&core.config.sandbox_root, &job_id).await?;
            workspace.write_file(spec.filename, &req.code).await?;

            let container_name = format!("exec_{job_id}");
            let started = Instant::now();
            let run = core
                .launcher
                .run_single(
                    workspace.path(),
                    spec,
                    req.input.as_deref().unwrap_or(""),
                    &container_name,
                    deadline,
                )
                .await;
            // Best-effort: the container usually exits (and removes
            // itself) before the sample lands.
            let memory_used_kb = metrics::memory_used_kb(core.runtime.as_ref(), &container_name)
                .await
                .ok();
            workspace.destroy().await;

            Ok(JobOutcome::Single(SingleOutcome {
                output: run.output,
                error: run.error,
                duration_ms: started.elapsed().as_millis() as u64,
                memory_used_kb,
            }))
        }
        JobPayload::Batch(req) => {
            let workspace = Workspace::create(&core.config.sandbox_root, &job_id).await?;
            workspace.write_file(spec.filename, &req.code).await?;

            let container_name = format!("exec_batch_{job_id}");
            let outcome = core
                .batch
                .run(&workspace, spec, &req.test_cases, &container_name, deadline)
                .await;
            workspace.destroy().await;

            outcome.map(JobOutcome::Batch)
        }
    }
}

static JOB_SEQ: AtomicU64 = AtomicU64::new(0);

/// Nanosecond timestamp plus a per-process counter; two submissions in the
/// same nanosecond still get distinct ids.
fn next_job_id() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let seq = JOB_SEQ.fetch_add(1, Ordering::Relaxed);
    format!("{nanos}_{seq}")
}

/// The sandbox root is shared only through disjoint children, so it can be
/// created eagerly at startup.
pub async fn prepare_sandbox_root(root: &Path) -> Result<(), ExecError> {
    tokio::fs::create_dir_all(root).await?;
    Ok(())
}
