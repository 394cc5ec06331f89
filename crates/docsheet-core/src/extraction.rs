use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::pool::{ExtractJob, ExtractionPool};
use crate::{
    DocumentError, DocumentFailure, DocumentHandle, ExtractionOutcome, PdfBackend, ProgressEvent,
};

/// Extract the text of every document through a bounded pool.
///
/// Returns exactly one outcome per input handle, in input order. Each slot is
/// filled from that handle's own oneshot receiver, so the result vector is
/// independent of which worker finished first. A job that never ran (the run
/// was cancelled while it was queued) is reported as an extraction failure.
pub async fn extract_documents(
    handles: &[DocumentHandle],
    backend: Arc<dyn PdfBackend>,
    num_workers: usize,
    progress: Arc<dyn Fn(ProgressEvent) + Send + Sync>,
    cancel: CancellationToken,
) -> Vec<ExtractionOutcome> {
    let total = handles.len();
    if total == 0 {
        return vec![];
    }

    let pool = ExtractionPool::new(backend, cancel.clone(), num_workers.max(1));

    let mut receivers = Vec::with_capacity(total);
    for handle in handles {
        if cancel.is_cancelled() {
            break;
        }

        let (result_tx, result_rx) = tokio::sync::oneshot::channel();
        pool.submit(ExtractJob {
            handle: handle.clone(),
            result_tx,
            total,
            progress: Arc::clone(&progress),
        })
        .await;
        receivers.push(result_rx);
    }
    pool.close();

    let mut slots: Vec<Option<ExtractionOutcome>> = Vec::with_capacity(total);
    slots.resize_with(total, || None);
    for (slot, rx) in slots.iter_mut().zip(receivers) {
        if let Ok(outcome) = rx.await {
            *slot = Some(outcome);
        }
    }

    pool.shutdown().await;

    slots
        .into_iter()
        .zip(handles)
        .map(|(slot, handle)| {
            slot.unwrap_or_else(|| {
                Err(DocumentFailure {
                    handle: handle.clone(),
                    error: DocumentError::Extraction("cancelled before extraction".into()),
                })
            })
        })
        .collect()
}
