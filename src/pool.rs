//! Generic worker pool shared by every fan-out stage.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use indicatif::ProgressBar;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, error};

use crate::error::{HarvestError, Result};

/// Per-item work of one stage.
///
/// A transient error skips the item; a fatal error stops the pool.
#[async_trait]
pub trait StageHandler: Send + Sync + 'static {
    type Input: Send + 'static;
    type Output: Send + 'static;

    async fn handle(&self, input: Self::Input) -> Result<Vec<Self::Output>>;
}

// ====== STAGE COUNTERS ======
#[derive(Debug, Default)]
pub struct StageCounters {
    pub attempted: AtomicU64,
    pub succeeded: AtomicU64,
    pub failed: AtomicU64,
    pub emitted: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageSnapshot {
    pub attempted: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub emitted: u64,
}

impl StageCounters {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn snapshot(&self) -> StageSnapshot {
        StageSnapshot {
            attempted: self.attempted.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            emitted: self.emitted.load(Ordering::Relaxed),
        }
    }
}

// ====== WORKER POOL ======
pub struct WorkerPool {
    stage: &'static str,
    workers: JoinSet<Result<()>>,
}

impl WorkerPool {
    /// Launches exactly `workers` tasks draining `input` through `handler`.
    ///
    /// Each task holds its own clone of `output`; the queue closes once the
    /// caller drops its sender and every task has finished.
    pub fn spawn<H: StageHandler>(
        stage: &'static str,
        workers: usize,
        handler: Arc<H>,
        input: mpsc::Receiver<H::Input>,
        output: mpsc::Sender<H::Output>,
        counters: Arc<StageCounters>,
        progress: ProgressBar,
    ) -> Self {
        let input = Arc::new(Mutex::new(input));
        let halted = Arc::new(AtomicBool::new(false));
        let mut set = JoinSet::new();

        for worker in 0..workers.max(1) {
            let handler = Arc::clone(&handler);
            let input = Arc::clone(&input);
            let output = output.clone();
            let counters = Arc::clone(&counters);
            let halted = Arc::clone(&halted);
            let progress = progress.clone();

            set.spawn(async move {
                while !halted.load(Ordering::Acquire) {
                    let next = input.lock().await.recv().await;
                    let Some(item) = next else { break };
                    counters.attempted.fetch_add(1, Ordering::Relaxed);

                    match handler.handle(item).await {
                        Ok(records) => {
                            for record in records {
                                if output.send(record).await.is_err() {
                                    halted.store(true, Ordering::Release);
                                    return Err(HarvestError::CollectorClosed { stage });
                                }
                                counters.emitted.fetch_add(1, Ordering::Relaxed);
                            }
                            counters.succeeded.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(e) if e.is_fatal() => {
                            error!(stage, worker, error = %e, "fatal error, halting stage");
                            halted.store(true, Ordering::Release);
                            return Err(e);
                        }
                        Err(e) => {
                            counters.failed.fetch_add(1, Ordering::Relaxed);
                            debug!(stage, worker, error = %e, "item skipped");
                        }
                    }
                    progress.inc(1);
                }
                Ok(())
            });
        }

        Self {
            stage,
            workers: set,
        }
    }

    /// Waits for every worker. Returns the first fatal error, if any.
    pub async fn join(mut self) -> Result<()> {
        let mut first_error = None;
        while let Some(joined) = self.workers.join_next().await {
            let outcome = joined
                .map_err(|source| HarvestError::Join {
                    stage: self.stage,
                    source,
                })
                .and_then(|result| result);
            if let Err(e) = outcome {
                if first_error.is_none() {
                    self.workers.abort_all();
                    first_error = Some(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;

    struct Recording {
        calls: StdMutex<HashMap<u64, usize>>,
    }

    #[async_trait]
    impl StageHandler for Recording {
        type Input = u64;
        type Output = u64;

        async fn handle(&self, input: u64) -> Result<Vec<u64>> {
            *self.calls.lock().unwrap().entry(input).or_default() += 1;
            tokio::task::yield_now().await;
            if input % 3 == 0 {
                return Err(HarvestError::Status {
                    url: format!("item/{input}"),
                    status: 404,
                });
            }
            Ok(vec![input, input * 10])
        }
    }

    struct FailsOn(u64);

    #[async_trait]
    impl StageHandler for FailsOn {
        type Input = u64;
        type Output = u64;

        async fn handle(&self, input: u64) -> Result<Vec<u64>> {
            if input == self.0 {
                return Err(HarvestError::InvalidEntityId {
                    id: input.to_string(),
                });
            }
            Ok(vec![input])
        }
    }

    #[tokio::test]
    async fn every_item_handled_exactly_once() {
        let n = 300u64;
        let handler = Arc::new(Recording {
            calls: StdMutex::new(HashMap::new()),
        });
        let counters = Arc::new(StageCounters::new());
        let (in_tx, in_rx) = mpsc::channel(8);
        let (out_tx, mut out_rx) = mpsc::channel(8);

        let pool = WorkerPool::spawn(
            "test",
            7,
            Arc::clone(&handler),
            in_rx,
            out_tx,
            Arc::clone(&counters),
            ProgressBar::hidden(),
        );
        let drain = tokio::spawn(async move {
            let mut seen = Vec::new();
            while let Some(v) = out_rx.recv().await {
                seen.push(v);
            }
            seen
        });

        for id in 1..=n {
            in_tx.send(id).await.unwrap();
        }
        drop(in_tx);
        pool.join().await.unwrap();
        let emitted = drain.await.unwrap();

        let calls = handler.calls.lock().unwrap();
        assert_eq!(calls.len() as u64, n);
        assert!(calls.values().all(|&c| c == 1));

        let snap = counters.snapshot();
        assert_eq!(snap.attempted, n);
        assert_eq!(snap.succeeded + snap.failed, n);
        assert_eq!(snap.failed, n / 3);
        assert_eq!(snap.emitted, emitted.len() as u64);
        assert_eq!(emitted.len() as u64, 2 * (n - n / 3));
    }

    #[tokio::test]
    async fn fatal_error_halts_pool() {
        let counters = Arc::new(StageCounters::new());
        let (in_tx, in_rx) = mpsc::channel(4);
        let (out_tx, mut out_rx) = mpsc::channel(1024);

        let pool = WorkerPool::spawn(
            "test",
            3,
            Arc::new(FailsOn(5)),
            in_rx,
            out_tx,
            Arc::clone(&counters),
            ProgressBar::hidden(),
        );
        let producer = tokio::spawn(async move {
            let mut sent = 0u64;
            for id in 1..=10_000u64 {
                if in_tx.send(id).await.is_err() {
                    break;
                }
                sent += 1;
            }
            sent
        });

        let err = pool.join().await.unwrap_err();
        assert!(matches!(err, HarvestError::InvalidEntityId { .. }));
        let sent = producer.await.unwrap();
        assert!(sent < 10_000, "producer should see the closed input queue");
        out_rx.close();
    }

    #[tokio::test]
    async fn closed_output_is_fatal() {
        let (in_tx, in_rx) = mpsc::channel(4);
        let (out_tx, out_rx) = mpsc::channel(1);
        drop(out_rx);

        let pool = WorkerPool::spawn(
            "test",
            2,
            Arc::new(FailsOn(u64::MAX)),
            in_rx,
            out_tx,
            Arc::new(StageCounters::new()),
            ProgressBar::hidden(),
        );
        let _ = in_tx.send(1).await;
        drop(in_tx);

        let err = pool.join().await.unwrap_err();
        assert!(matches!(err, HarvestError::CollectorClosed { stage: "test" }));
    }
}
