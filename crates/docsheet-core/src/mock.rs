//! Hand-rolled mocks of the extraction backend and the structuring service,
//! for tests that must not touch MuPDF or the network.

use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde_json::Value;

use crate::structuring::{StructuringError, StructuringService};
use crate::{BackendError, ExtractedText, PdfBackend, StructuredRecord};

/// Canned behaviour for one document in [`MockBackend`].
#[derive(Clone, Debug)]
pub enum MockPdf {
    Text(String),
    Corrupt(String),
    Panic,
}

/// A [`PdfBackend`] keyed by file name, with optional blocking latency.
#[derive(Default)]
pub struct MockBackend {
    documents: HashMap<String, MockPdf>,
    delays: HashMap<String, Duration>,
    calls: AtomicUsize,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_text(mut self, file_name: &str, text: &str) -> Self {
        self.documents
            .insert(file_name.to_string(), MockPdf::Text(text.to_string()));
        self
    }

    pub fn with_corrupt(mut self, file_name: &str, reason: &str) -> Self {
        self.documents
            .insert(file_name.to_string(), MockPdf::Corrupt(reason.to_string()));
        self
    }

    pub fn with_panic(mut self, file_name: &str) -> Self {
        self.documents.insert(file_name.to_string(), MockPdf::Panic);
        self
    }

    /// Sleep on the blocking thread before answering for `file_name`.
    pub fn with_delay(mut self, file_name: &str, delay: Duration) -> Self {
        self.delays.insert(file_name.to_string(), delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl PdfBackend for MockBackend {
    fn extract_text(&self, path: &Path) -> Result<String, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        if let Some(delay) = self.delays.get(&name) {
            std::thread::sleep(*delay);
        }

        match self.documents.get(&name) {
            Some(MockPdf::Text(text)) => Ok(text.clone()),
            Some(MockPdf::Corrupt(reason)) => Err(BackendError::OpenError(reason.clone())),
            Some(MockPdf::Panic) => panic!("mock decoder panic for {}", name),
            None => Err(BackendError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no such mock document: {}", name),
            ))),
        }
    }
}

/// Canned response for one document in [`MockService`].
#[derive(Clone, Debug)]
pub enum MockResponse {
    /// Records as JSON objects, in service order.
    Records(Vec<Value>),
    /// A non-2xx answer.
    Status(u16),
    /// A response without the record array.
    MissingRecords,
}

/// A [`StructuringService`] keyed by document text, with optional latency.
///
/// Keying by text (rather than path) lets tests check that the text produced
/// by extraction is what reaches the service.
pub struct MockService {
    responses: HashMap<String, MockResponse>,
    delays: HashMap<String, Duration>,
    fallback: MockResponse,
    calls: AtomicUsize,
    seen: Mutex<Vec<String>>,
}

impl Default for MockService {
    fn default() -> Self {
        Self {
            responses: HashMap::new(),
            delays: HashMap::new(),
            fallback: MockResponse::Records(vec![]),
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }
}

impl MockService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(mut self, text: &str, response: MockResponse) -> Self {
        self.responses.insert(text.to_string(), response);
        self
    }

    pub fn with_delay(mut self, text: &str, delay: Duration) -> Self {
        self.delays.insert(text.to_string(), delay);
        self
    }

    pub fn with_fallback(mut self, response: MockResponse) -> Self {
        self.fallback = response;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Document texts in the order their calls started.
    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl StructuringService for MockService {
    fn name(&self) -> &str {
        "Mock"
    }

    fn structure<'a>(
        &'a self,
        document: &'a ExtractedText,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<StructuredRecord>, StructuringError>> + Send + 'a>>
    {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(document.text.clone());
        let response = self
            .responses
            .get(&document.text)
            .cloned()
            .unwrap_or_else(|| self.fallback.clone());
        let delay = self.delays.get(&document.text).copied();

        Box::pin(async move {
            if let Some(d) = delay {
                tokio::time::sleep(d).await;
            }

            match response {
                MockResponse::Records(values) => values
                    .into_iter()
                    .map(|v| match v {
                        Value::Object(map) => Ok(StructuredRecord::new(map)),
                        other => Err(StructuringError::schema(
                            "mock",
                            format!("mock record is not an object: {}", other),
                        )),
                    })
                    .collect(),
                MockResponse::Status(code) => Err(StructuringError::Service {
                    status: Some(code),
                    message: format!("HTTP {}", code),
                }),
                MockResponse::MissingRecords => Err(StructuringError::schema(
                    "choices[0].message.content",
                    "field is absent",
                )),
            }
        })
    }
}
