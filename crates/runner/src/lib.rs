//! Gravity - Runner
//!
//! A fixed worker pool that preserves submission order on output.
//!
//! # Architecture
//!
//! ```text
//! add_task ──→ [bounded task queue] ──→ worker 0 ─┐
//!    (seq)                              worker 1 ─┼──→ [reorder] ──→ output
//!                                       worker N ─┘    by seq         (rx)
//! ```
//!
//! Each task is stamped with a monotonically increasing sequence number.
//! Workers compute results concurrently; a single reorder stage buffers
//! out-of-order completions and releases results to the output channel
//! strictly in submission order, regardless of per-item latency.
//!
//! # Key Design
//!
//! - **Backpressure**: the task queue is bounded; `add_task` blocks when it
//!   is full. A slow output consumer stalls the whole pool rather than
//!   growing memory.
//! - **Ordered release**: downstream publishing relies on input order for
//!   cumulative acknowledgement to be safe, so reordering happens here,
//!   once, instead of at every consumer.
//! - **Deterministic shutdown**: [`Runner::close`] drains in-flight work,
//!   waits for the workers, and closes the output channel. `add_task`
//!   fails afterwards.
//!
//! # Example
//!
//! ```ignore
//! let (runner, mut results) = Runner::spawn(RunnerConfig::default(), |_worker, n: u64| n * 2);
//!
//! runner.add_task(21).await?;
//! assert_eq!(results.recv().await, Some(42));
//! runner.close().await;
//! ```

use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;

/// Default number of parallel workers
pub const DEFAULT_WORKER_COUNT: usize = 8;

/// Default bound of the pending task queue
pub const DEFAULT_MAX_PENDING_COUNT: usize = 2048;

/// Errors from submitting work to a runner
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RunnerError {
    /// The runner has been closed
    #[error("runner is closed")]
    Closed,
}

/// Worker pool sizing
#[derive(Debug, Clone, Copy)]
pub struct RunnerConfig {
    /// Number of parallel workers
    pub worker_count: usize,

    /// Bound of the pending task queue; `add_task` blocks beyond it
    pub max_pending_count: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            worker_count: DEFAULT_WORKER_COUNT,
            max_pending_count: DEFAULT_MAX_PENDING_COUNT,
        }
    }
}

/// A result waiting in the reorder heap
struct Pending<R> {
    seq: u64,
    result: R,
}

impl<R> PartialEq for Pending<R> {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl<R> Eq for Pending<R> {}

impl<R> PartialOrd for Pending<R> {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl<R> Ord for Pending<R> {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        // Min-heap on sequence
        other.seq.cmp(&self.seq)
    }
}

/// Submission side of the pool; results come out of the receiver returned
/// by [`Runner::spawn`]
pub struct Runner<T> {
    /// Sequence stamping and sending happen under this lock so queue order
    /// always equals sequence order
    submit: Mutex<SubmitState<T>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

struct SubmitState<T> {
    tx: Option<crossfire::MAsyncTx<(u64, T)>>,
    next_seq: u64,
}

impl<T: Send + 'static + Unpin> Runner<T> {
    /// Spawn the worker pool
    ///
    /// `worker` runs on every task, receiving the worker index and the
    /// task, and must be pure CPU work (it is called synchronously inside
    /// the worker task). Results arrive on the returned receiver in
    /// submission order.
    pub fn spawn<R, F>(config: RunnerConfig, worker: F) -> (Arc<Self>, mpsc::Receiver<R>)
    where
        R: Send + 'static,
        F: Fn(usize, T) -> R + Send + Sync + 'static,
    {
        let worker_count = config.worker_count.max(1);
        let max_pending = config.max_pending_count.max(1);

        let parallelism = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        if worker_count > parallelism {
            tracing::warn!(
                worker_count,
                parallelism,
                "worker count exceeds available parallelism"
            );
        }

        let (task_tx, task_rx) = crossfire::mpmc::bounded_async::<(u64, T)>(max_pending);
        let (done_tx, done_rx) = mpsc::channel::<(u64, R)>(max_pending);
        let (out_tx, out_rx) = mpsc::channel::<R>(max_pending);

        let worker_fn = Arc::new(worker);
        let mut handles = Vec::with_capacity(worker_count + 1);

        for worker_id in 0..worker_count {
            let rx = task_rx.clone();
            let done = done_tx.clone();
            let f = Arc::clone(&worker_fn);

            handles.push(tokio::spawn(async move {
                while let Ok((seq, task)) = rx.recv().await {
                    let result = f(worker_id, task);
                    if done.send((seq, result)).await.is_err() {
                        break;
                    }
                }
            }));
        }

        // The workers hold the only senders; dropping ours lets the reorder
        // stage observe completion
        drop(done_tx);
        drop(task_rx);

        handles.push(tokio::spawn(Self::reorder(done_rx, out_tx)));

        let runner = Arc::new(Self {
            submit: Mutex::new(SubmitState {
                tx: Some(task_tx),
                next_seq: 0,
            }),
            handles: Mutex::new(handles),
        });

        (runner, out_rx)
    }

    /// Release completed results strictly in sequence order
    async fn reorder<R: Send + 'static>(
        mut done_rx: mpsc::Receiver<(u64, R)>,
        out_tx: mpsc::Sender<R>,
    ) {
        let mut next_seq = 0u64;
        let mut pending: BinaryHeap<Pending<R>> = BinaryHeap::new();

        while let Some((seq, result)) = done_rx.recv().await {
            pending.push(Pending { seq, result });

            while pending.peek().is_some_and(|p| p.seq == next_seq) {
                let Some(p) = pending.pop() else { break };
                if out_tx.send(p.result).await.is_err() {
                    return;
                }
                next_seq += 1;
            }
        }

        // Workers are gone; anything left is contiguous from next_seq
        while let Some(p) = pending.pop() {
            if out_tx.send(p.result).await.is_err() {
                return;
            }
        }
    }

    /// Enqueue a task
    ///
    /// Blocks while the pending queue is full. Fails once the runner has
    /// been closed.
    pub async fn add_task(&self, task: T) -> Result<(), RunnerError> {
        let mut submit = self.submit.lock().await;
        let seq = submit.next_seq;

        let tx = submit.tx.as_ref().ok_or(RunnerError::Closed)?;
        // Holding the submit lock across the send keeps queue order equal
        // to sequence order even with concurrent submitters
        if tx.send((seq, task)).await.is_err() {
            return Err(RunnerError::Closed);
        }

        submit.next_seq = seq + 1;
        Ok(())
    }

    /// Close the runner: reject further tasks, drain in-flight work, and
    /// close the output channel
    pub async fn close(&self) {
        {
            let mut submit = self.submit.lock().await;
            submit.tx = None;
        }

        let handles = std::mem::take(&mut *self.handles.lock().await);
        for handle in handles {
            let _ = handle.await;
        }
    }
}
