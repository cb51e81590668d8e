// Per-execution statistics.
//
// Workers produce one record per terminal job outcome; a single consumer
// task drains the buffer and emits structured log events. Recording is
// lossy on purpose: a full buffer drops the record and bumps a counter
// instead of stalling a worker.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use tokio::sync::mpsc;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct ExecutionStats {
    pub job_id: String,
    pub language: String,
    pub code_size: usize,
    pub start_time: SystemTime,
    pub end_time: SystemTime,
    pub success: bool,
    pub error_message: Option<String>,
}

#[derive(Clone)]
pub struct StatsSink {
    tx: mpsc::Sender<ExecutionStats>,
    recorded: Arc<AtomicU64>,
    dropped: Arc<AtomicU64>,
}

impl StatsSink {
    /// Spawn the consumer task and return the producer handle.
    pub fn spawn(capacity: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<ExecutionStats>(capacity);
        tokio::spawn(async move {
            while let Some(stats) = rx.recv().await {
                let duration_ms = stats
                    .end_time
                    .duration_since(stats.start_time)
                    .unwrap_or_default()
                    .as_millis() as u64;
                info!(
                    job_id = %stats.job_id,
                    language = %stats.language,
                    code_size = stats.code_size,
                    duration_ms,
                    success = stats.success,
                    error = stats.error_message.as_deref().unwrap_or(""),
                    "execution finished"
                );
            }
        });
        Self {
            tx,
            recorded: Arc::new(AtomicU64::new(0)),
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Hand a record to the consumer without blocking.
    pub fn record(&self, stats: ExecutionStats) {
        match self.tx.try_send(stats) {
            Ok(()) => {
                self.recorded.fetch_add(1, Ordering::Relaxed);
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(dropped_total = total, "stats buffer full, dropping record");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }

    /// Records accepted by the sink since startup.
    pub fn recorded(&self) -> u64 {
        self.recorded.load(Ordering::Relaxed)
    }

    /// Records dropped because the buffer was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn record(job_id: &str) -> ExecutionStats {
        let now = SystemTime::now();
        ExecutionStats {
            job_id: job_id.to_string(),
            language: "python".to_string(),
            code_size: 10,
            start_time: now,
            end_time: now + Duration::from_millis(5),
            success: true,
            error_message: None,
        }
    }

    #[tokio::test]
    async fn test_record_counts() {
        let sink = StatsSink::spawn(8);
        sink.record(record("a"));
        sink.record(record("b"));
        assert_eq!(sink.recorded(), 2);
        assert_eq!(sink.dropped(), 0);
    }

    #[tokio::test]
    async fn test_full_buffer_drops_without_blocking() {
        // Capacity 1 with a consumer that cannot keep up deterministically:
        // fill the channel before the consumer task has a chance to run.
        let sink = StatsSink::spawn(1);
        for i in 0..50 {
            sink.record(record(&i.to_string()));
        }
        assert!(sink.dropped() > 0);
        assert_eq!(sink.recorded() + sink.dropped(), 50);
    }
}
