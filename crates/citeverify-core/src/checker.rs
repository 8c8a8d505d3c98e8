//! Batch driver: verifies many references with a bounded pool of workers.
//!
//! Each worker pulls jobs from a shared queue and runs the whole cascade for
//! one reference. Results travel back over per-job oneshot channels and are
//! reassembled in input order. Every reference that is not skipped by
//! cancellation gets exactly one result, even if its verification panicked.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::cascade::Cascade;
use crate::{ProgressEvent, Reference, VerificationResult};

/// A reference together with its verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckedReference {
    /// Position in the input list.
    pub index: usize,
    pub reference: Reference,
    pub result: VerificationResult,
}

struct RefJob {
    index: usize,
    total: usize,
    reference: Reference,
    result_tx: oneshot::Sender<VerificationResult>,
}

type Progress = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

/// Worker tasks consuming [`RefJob`]s from a shared queue.
struct WorkerPool {
    job_tx: async_channel::Sender<RefJob>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    fn new(
        cascade: Arc<Cascade>,
        num_workers: usize,
        progress: Progress,
        cancel: CancellationToken,
    ) -> Self {
        let (job_tx, job_rx) = async_channel::unbounded::<RefJob>();
        let handles = (0..num_workers.max(1))
            .map(|_| {
                tokio::spawn(worker_loop(
                    job_rx.clone(),
                    cascade.clone(),
                    progress.clone(),
                    cancel.clone(),
                ))
            })
            .collect();
        Self { job_tx, handles }
    }

    async fn submit(&self, job: RefJob) {
        let _ = self.job_tx.send(job).await;
    }

    /// Close the queue and wait for the workers to drain it. Jobs left behind
    /// by a dead worker are dropped along with the queue.
    async fn shutdown(self) {
        self.job_tx.close();
        for handle in self.handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "worker exited abnormally");
            }
        }
    }
}

/// Run the cascade on its own task so a panic costs one reference, not the worker.
async fn verify_isolated(cascade: &Arc<Cascade>, reference: &Reference) -> VerificationResult {
    let cascade = cascade.clone();
    let owned = reference.clone();
    match tokio::spawn(async move { cascade.verify(&owned).await }).await {
        Ok(result) => result,
        Err(e) => {
            tracing::error!(title = %reference.title, error = %e, "verification task failed");
            task_failed()
        }
    }
}

fn task_failed() -> VerificationResult {
    VerificationResult::not_found("Verification task failed.")
}

async fn worker_loop(
    job_rx: async_channel::Receiver<RefJob>,
    cascade: Arc<Cascade>,
    progress: Progress,
    cancel: CancellationToken,
) {
    while let Ok(job) = job_rx.recv().await {
        // Dropping the job closes its oneshot; the collector counts it as skipped
        if cancel.is_cancelled() {
            continue;
        }

        progress(ProgressEvent::Checking {
            index: job.index,
            total: job.total,
            title: job.reference.title.clone(),
        });

        let result = verify_isolated(&cascade, &job.reference).await;

        progress(ProgressEvent::Result {
            index: job.index,
            total: job.total,
            title: job.reference.title.clone(),
            result: result.clone(),
        });

        let _ = job.result_tx.send(result);
    }
}

/// Verify `refs` with up to `num_workers` references in flight.
///
/// Cancellation is checked before each reference starts; references already
/// being verified run to completion. The returned list keeps input order and
/// omits references that were never started. A reference whose verification
/// failed outright is reported as not found.
pub async fn check_references(
    refs: Vec<Reference>,
    cascade: Arc<Cascade>,
    num_workers: usize,
    progress: impl Fn(ProgressEvent) + Send + Sync + 'static,
    cancel: CancellationToken,
) -> Vec<CheckedReference> {
    let total = refs.len();
    if total == 0 {
        return vec![];
    }

    let progress: Progress = Arc::new(progress);
    let pool = WorkerPool::new(cascade, num_workers, progress.clone(), cancel.clone());

    let mut receivers = Vec::with_capacity(total);
    for (index, reference) in refs.into_iter().enumerate() {
        if cancel.is_cancelled() {
            break;
        }
        let (result_tx, result_rx) = oneshot::channel();
        pool.submit(RefJob {
            index,
            total,
            reference: reference.clone(),
            result_tx,
        })
        .await;
        receivers.push((index, reference, result_rx));
    }

    pool.shutdown().await;

    // A closed oneshot is a skip only under cancellation; otherwise the job
    // was lost with its worker and still owes a result.
    let mut checked = Vec::with_capacity(receivers.len());
    for (index, reference, rx) in receivers {
        let result = match rx.await {
            Ok(result) => result,
            Err(_) if cancel.is_cancelled() => continue,
            Err(_) => task_failed(),
        };
        checked.push(CheckedReference {
            index,
            reference,
            result,
        });
    }

    let skipped = total - checked.len();
    if skipped > 0 {
        tracing::info!(skipped, total, "batch cancelled");
        progress(ProgressEvent::Cancelled { skipped });
    }

    checked
}
