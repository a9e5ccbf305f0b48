//! Bounded worker pool.
//!
//! `dispatch` fans a fixed batch of jobs out over N workers pulling from one
//! shared queue. The queue closes once every job is enqueued; workers drain
//! what remains and exit, and `dispatch` returns only after the last worker
//! is done — so every completion callback has already run by then.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;

/// Queue capacity. Enqueueing backs off once this many jobs are waiting.
const JOB_QUEUE_CAPACITY: usize = 100;

/// Opaque job identifier. Ownership moves from the dispatcher to whichever
/// worker dequeues it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Job(pub u64);

type SharedQueue = Arc<Mutex<mpsc::Receiver<Job>>>;
type JobObserver = Arc<dyn Fn(Job) + Send + Sync>;

/// Process `jobs` on `worker_count` concurrent workers.
pub async fn dispatch(worker_count: usize, jobs: impl IntoIterator<Item = Job>) {
    dispatch_with(worker_count, jobs, |_| {}).await;
}

/// Like [`dispatch`], invoking `on_job_done` exactly once per processed job.
///
/// Callbacks run on worker tasks, concurrently with each other; all of them
/// happen before this function returns. A `worker_count` of zero is treated
/// as one — a pool with no workers could never drain its queue.
pub async fn dispatch_with(
    worker_count: usize,
    jobs: impl IntoIterator<Item = Job>,
    on_job_done: impl Fn(Job) + Send + Sync + 'static,
) {
    let (queue_tx, queue_rx) = mpsc::channel(JOB_QUEUE_CAPACITY);
    let queue: SharedQueue = Arc::new(Mutex::new(queue_rx));
    let on_job_done: JobObserver = Arc::new(on_job_done);

    let mut workers = JoinSet::new();
    for id in 1..=worker_count.max(1) {
        workers.spawn(worker(id, queue.clone(), on_job_done.clone()));
    }

    for job in jobs {
        if queue_tx.send(job).await.is_err() {
            break;
        }
    }
    // Closing the queue is the only stop signal workers need.
    drop(queue_tx);

    while workers.join_next().await.is_some() {}
}

/// Worker loop: pull, work, report, repeat until the queue is drained.
async fn worker(id: usize, queue: SharedQueue, on_job_done: JobObserver) {
    loop {
        // Hold the queue lock only while dequeueing, never while working.
        let job = { queue.lock().await.recv().await };
        let Some(job) = job else { break };

        let work = Duration::from_millis(rand::rng().random_range(0..100));
        tokio::time::sleep(work).await;

        on_job_done(job);
        tracing::debug!(worker = id, job = job.0, "job finished");
    }
    tracing::trace!(worker = id, "worker exiting, queue drained");
}
