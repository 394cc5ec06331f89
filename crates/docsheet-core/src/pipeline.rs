use std::sync::Arc;
use std::time::Instant;

use futures_util::StreamExt;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::consolidate::{Consolidation, consolidate};
use crate::extraction::extract_documents;
use crate::structuring::StructuringService;
use crate::{
    Config, DocumentError, DocumentHandle, DocumentOutcome, ExtractionOutcome, PdfBackend,
    ProgressEvent,
};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PipelineError {
    #[error("no PDF documents were selected")]
    SelectionEmpty,
    #[error("run cancelled")]
    Cancelled,
}

/// Run extraction, structuring and consolidation for a batch.
///
/// Stages:
/// 1. Decode every document through the bounded [`ExtractionPool`](crate::pool::ExtractionPool)
/// 2. Send each decoded text to `service`, at most
///    `config.structuring_concurrency` requests in flight
/// 3. Consolidate all outcomes by selection order
///
/// Per-document failures end up in the returned summary. The run itself only
/// fails when nothing was selected or when `cancel` fires; in-flight work is
/// allowed to finish and its results are discarded.
pub async fn run_pipeline(
    handles: Vec<DocumentHandle>,
    backend: Arc<dyn PdfBackend>,
    service: Arc<dyn StructuringService>,
    config: &Config,
    progress: impl Fn(ProgressEvent) + Send + Sync + 'static,
    cancel: CancellationToken,
) -> Result<Consolidation, PipelineError> {
    if handles.is_empty() {
        return Err(PipelineError::SelectionEmpty);
    }
    if cancel.is_cancelled() {
        return Err(PipelineError::Cancelled);
    }

    let total = handles.len();
    let progress: Arc<dyn Fn(ProgressEvent) + Send + Sync> = Arc::new(progress);
    let started = Instant::now();

    let extracted = extract_documents(
        &handles,
        backend,
        config.num_workers,
        Arc::clone(&progress),
        cancel.clone(),
    )
    .await;
    if cancel.is_cancelled() {
        return Err(PipelineError::Cancelled);
    }
    tracing::info!(
        documents = total,
        failed = extracted.iter().filter(|o| o.is_err()).count(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "extraction stage complete"
    );

    let outcomes = structure_documents(
        extracted,
        service,
        config.structuring_concurrency,
        progress,
        cancel.clone(),
    )
    .await;
    if cancel.is_cancelled() {
        return Err(PipelineError::Cancelled);
    }

    let consolidation = consolidate(outcomes, config.schema_policy);
    tracing::info!(
        documents = consolidation.summary.total(),
        rows = consolidation.report.len(),
        columns = consolidation.report.columns.len(),
        failed = consolidation.summary.failed(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "consolidation complete"
    );
    Ok(consolidation)
}

/// Structure every successfully extracted document.
///
/// Returns one outcome per input slot, in input order. Extraction failures
/// pass straight through without a service call.
pub async fn structure_documents(
    extracted: Vec<ExtractionOutcome>,
    service: Arc<dyn StructuringService>,
    concurrency: usize,
    progress: Arc<dyn Fn(ProgressEvent) + Send + Sync>,
    cancel: CancellationToken,
) -> Vec<DocumentOutcome> {
    let total = extracted.len();
    let mut slots: Vec<Option<DocumentOutcome>> = Vec::with_capacity(total);
    slots.resize_with(total, || None);

    let mut pending = Vec::new();
    for (slot, outcome) in extracted.into_iter().enumerate() {
        match outcome {
            Ok(document) => pending.push((slot, document)),
            Err(failure) => slots[slot] = Some(DocumentOutcome::failed(failure)),
        }
    }

    let mut calls = futures_util::stream::iter(pending.into_iter().map(|(slot, document)| {
        let service = Arc::clone(&service);
        let progress = Arc::clone(&progress);
        let cancel = cancel.clone();
        async move {
            if cancel.is_cancelled() {
                let outcome = DocumentOutcome {
                    handle: document.handle,
                    result: Err(DocumentError::Service {
                        status: None,
                        message: "cancelled before the request was sent".into(),
                    }),
                };
                return (slot, outcome);
            }

            let started = Instant::now();
            let result = service
                .structure(&document)
                .await
                .map_err(DocumentError::from);

            match &result {
                Ok(records) => {
                    tracing::debug!(
                        service = service.name(),
                        document = %document.handle.path.display(),
                        records = records.len(),
                        "structured"
                    );
                    progress(ProgressEvent::Structured {
                        index: document.handle.ordinal,
                        total,
                        name: document.handle.name(),
                        records: records.len(),
                        elapsed: started.elapsed(),
                    });
                }
                Err(error) => {
                    tracing::warn!(
                        service = service.name(),
                        document = %document.handle.path.display(),
                        kind = error.kind(),
                        error = %error,
                        "structuring failed"
                    );
                    progress(ProgressEvent::StructuringFailed {
                        index: document.handle.ordinal,
                        total,
                        name: document.handle.name(),
                        error: error.clone(),
                    });
                }
            }

            (
                slot,
                DocumentOutcome {
                    handle: document.handle,
                    result,
                },
            )
        }
    }))
    .buffer_unordered(concurrency.max(1));

    while let Some((slot, outcome)) = calls.next().await {
        if slots[slot].is_some() {
            tracing::warn!(slot, "structuring slot written twice, keeping the first result");
            continue;
        }
        slots[slot] = Some(outcome);
    }

    slots.into_iter().flatten().collect()
}
