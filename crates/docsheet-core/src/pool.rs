//! Bounded worker pool for PDF text extraction.
//!
//! Architecture: `num_workers` worker tasks share one job queue. Each worker
//! pulls a document, runs the blocking decode on tokio's blocking pool and
//! answers on the job's own oneshot channel, so results are keyed by the
//! submitting slot and never by completion order.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{
    DocumentError, DocumentFailure, DocumentHandle, ExtractedText, ExtractionOutcome, PdfBackend,
    ProgressEvent,
};

/// A document extraction job submitted to the pool.
pub struct ExtractJob {
    pub handle: DocumentHandle,
    pub result_tx: oneshot::Sender<ExtractionOutcome>,
    pub total: usize,
    /// Progress callback for this job (emits ExtractionStarted, Extracted, ExtractionFailed).
    pub progress: Arc<dyn Fn(ProgressEvent) + Send + Sync>,
}

/// A pool of worker tasks that decode PDFs.
///
/// Submit jobs via [`submit()`](ExtractionPool::submit), receive results via
/// the oneshot receiver paired with each job.
pub struct ExtractionPool {
    job_tx: async_channel::Sender<ExtractJob>,
    pool_handle: JoinHandle<()>,
}

impl ExtractionPool {
    /// Create a new pool with `num_workers` worker tasks.
    pub fn new(
        backend: Arc<dyn PdfBackend>,
        cancel: CancellationToken,
        num_workers: usize,
    ) -> Self {
        let (job_tx, job_rx) = async_channel::unbounded::<ExtractJob>();

        let pool_handle = tokio::spawn(async move {
            let mut worker_handles = Vec::with_capacity(num_workers.max(1));

            for worker_id in 0..num_workers.max(1) {
                worker_handles.push(tokio::spawn(worker_loop(
                    worker_id,
                    job_rx.clone(),
                    Arc::clone(&backend),
                    cancel.clone(),
                )));
            }

            // Drop our clone so workers are the last holders
            drop(job_rx);

            for h in worker_handles {
                let _ = h.await;
            }
        });

        Self {
            job_tx,
            pool_handle,
        }
    }

    /// Submit a job to the pool.
    pub async fn submit(&self, job: ExtractJob) {
        let _ = self.job_tx.send(job).await;
    }

    /// Stop accepting jobs. Jobs already queued are still handed to workers.
    pub fn close(&self) {
        self.job_tx.close();
    }

    /// Close the queue and wait for every worker to finish.
    pub async fn shutdown(self) {
        self.job_tx.close();
        let _ = self.pool_handle.await;
    }
}

async fn worker_loop(
    worker_id: usize,
    job_rx: async_channel::Receiver<ExtractJob>,
    backend: Arc<dyn PdfBackend>,
    cancel: CancellationToken,
) {
    while let Ok(job) = job_rx.recv().await {
        // Drain without decoding; dropping the job closes its oneshot.
        if cancel.is_cancelled() {
            tracing::debug!(worker_id, ordinal = job.handle.ordinal, "skipping queued job: cancelled");
            continue;
        }

        let ExtractJob {
            handle,
            result_tx,
            total,
            progress,
        } = job;

        progress(ProgressEvent::ExtractionStarted {
            index: handle.ordinal,
            total,
            name: handle.name(),
        });

        let started = Instant::now();
        let outcome = extract_one(&backend, handle).await;

        match &outcome {
            Ok(extracted) => {
                tracing::debug!(
                    worker_id,
                    ordinal = extracted.handle.ordinal,
                    chars = extracted.text.len(),
                    "extracted"
                );
                progress(ProgressEvent::Extracted {
                    index: extracted.handle.ordinal,
                    total,
                    name: extracted.handle.name(),
                    chars: extracted.text.chars().count(),
                    elapsed: started.elapsed(),
                });
            }
            Err(failure) => {
                tracing::warn!(
                    worker_id,
                    document = %failure.handle.path.display(),
                    error = %failure.error,
                    "extraction failed"
                );
                progress(ProgressEvent::ExtractionFailed {
                    index: failure.handle.ordinal,
                    total,
                    name: failure.handle.name(),
                    error: failure.error.clone(),
                });
            }
        }

        let _ = result_tx.send(outcome);
    }
}

/// Decode one document on the blocking pool.
///
/// Decoder errors and decoder panics both become a per-document failure.
pub async fn extract_one(backend: &Arc<dyn PdfBackend>, handle: DocumentHandle) -> ExtractionOutcome {
    let backend = Arc::clone(backend);
    let path = handle.path.clone();

    let joined = tokio::task::spawn_blocking(move || backend.extract_text(&path)).await;

    match joined {
        Ok(Ok(text)) => {
            if text.trim().is_empty() {
                tracing::warn!(document = %handle.path.display(), "document has no extractable text");
            }
            Ok(ExtractedText { handle, text })
        }
        Ok(Err(e)) => Err(DocumentFailure {
            handle,
            error: DocumentError::Extraction(e.to_string()),
        }),
        Err(e) => Err(DocumentFailure {
            handle,
            error: DocumentError::Extraction(format!("decoder task failed: {}", e)),
        }),
    }
}
